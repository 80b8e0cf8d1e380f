//! Token-bucket rate limiter shared by all injection work
//!
//! One bucket governs outbound pace across every task that sends to the
//! target. Refill uses a monotonic clock, so wall-clock adjustments never
//! dump a burst of tokens. The mutex guards only the refill/decrement; a
//! caller waiting for a token sleeps outside the lock so others can update
//! bucket state meanwhile.

use std::sync::Mutex;
use std::time::Instant;
use tokio::time::{sleep, Duration};

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Thread-safe token bucket: `rate` tokens per second, capacity `burst`.
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// Creates a limiter with a full bucket. The bucket admits `burst`
    /// requests instantly, then sustains `rate` per second.
    pub fn new(rate: f64, burst: u32) -> Self {
        let rate = if rate > 0.0 { rate } else { 1.0 };
        let burst = f64::from(burst.max(1));
        Self {
            rate,
            burst,
            state: Mutex::new(BucketState {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Blocks until one token is available, then consumes it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().expect("rate limiter lock");
                Self::refill(&mut state, self.rate, self.burst);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                (1.0 - state.tokens) / self.rate
            };
            sleep(Duration::from_secs_f64(wait)).await;
        }
    }

    /// Non-blocking variant: takes a token if one is ready.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().expect("rate limiter lock");
        Self::refill(&mut state, self.rate, self.burst);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Approximate count of currently available tokens.
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock().expect("rate limiter lock");
        Self::refill(&mut state, self.rate, self.burst);
        state.tokens
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    fn refill(state: &mut BucketState, rate: f64, burst: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * rate).min(burst);
        state.last_refill = now;
    }
}
