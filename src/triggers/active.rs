//! Active trigger probing
//!
//! Stored payloads in admin panels, log viewers, and moderation queues sit
//! dormant until those pages render. Probing the usual suspects can trip
//! server-side sinks (SSTI, log processors) without waiting for an admin.

use crate::error::Result;
use crate::http::{HttpClient, RateLimiter};

/// Endpoints where second-order payloads commonly render.
pub const TRIGGER_ENDPOINTS: &[&str] = &[
    // Admin / management
    "/admin",
    "/admin/users",
    "/admin/logs",
    "/admin/reports",
    "/dashboard",
    "/manage",
    "/panel",
    "/console",
    // Support / helpdesk
    "/support",
    "/tickets",
    "/helpdesk",
    "/support/tickets",
    "/feedback",
    // Reporting / analytics
    "/analytics",
    "/reports",
    "/stats",
    "/logs",
    "/metrics",
    // Content management
    "/moderation",
    "/content",
    "/posts",
    "/comments",
    "/reviews",
    // Export functions
    "/export",
    "/download",
    "/pdf",
    "/report/generate",
    "/print",
];

/// Outcome of probing one endpoint.
#[derive(Debug, Clone)]
pub struct TriggerResult {
    pub endpoint: String,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub response_size: usize,
}

/// Rate-limited prober over an endpoint catalog.
pub struct ActiveTrigger {
    base_url: String,
    client: HttpClient,
    rate_limiter: RateLimiter,
}

impl ActiveTrigger {
    pub fn new(base_url: &str, client: HttpClient, rate: f64) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            rate_limiter: RateLimiter::new(rate, 1),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probes one endpoint; transport failures land in the result rather
    /// than aborting the sweep.
    pub async fn probe_endpoint(&self, endpoint: &str) -> TriggerResult {
        let endpoint = if endpoint.starts_with('/') {
            endpoint.to_string()
        } else {
            format!("/{endpoint}")
        };
        let url = format!("{}{endpoint}", self.base_url);

        match self.client.send("GET", &url, &[], None).await {
            Ok(response) => TriggerResult {
                endpoint,
                status: Some(response.status),
                error: None,
                response_size: response.body.len(),
            },
            Err(e) => TriggerResult {
                endpoint,
                status: None,
                error: Some(e.to_string()),
                response_size: 0,
            },
        }
    }

    /// Probes the catalog (or a custom endpoint list), invoking `on_result`
    /// after each response so progress is visible during slow sweeps.
    pub async fn probe_all<F>(
        &self,
        endpoints: Option<&[String]>,
        mut on_result: F,
    ) -> Result<Vec<TriggerResult>>
    where
        F: FnMut(&TriggerResult),
    {
        let catalog: Vec<String> = match endpoints {
            Some(list) => list.to_vec(),
            None => TRIGGER_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
        };

        let mut results = Vec::with_capacity(catalog.len());
        for endpoint in &catalog {
            self.rate_limiter.acquire().await;
            let result = self.probe_endpoint(endpoint).await;
            on_result(&result);
            results.push(result);
        }
        Ok(results)
    }
}
