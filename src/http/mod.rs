//! Outbound HTTP plumbing: request sender and rate limiter

pub mod client;
pub mod rate_limit;
pub use client::{HttpClient, HttpResponse};
pub use rate_limit::RateLimiter;
