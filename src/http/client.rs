//! HTTP client for payload delivery
//!
//! Wraps reqwest with the posture injection work needs: every HTTP status is
//! data (a 500 from the target is an observation, not a failure), transport
//! errors are tagged, redirects stay off unless asked for, and a configured
//! proxy fully replaces environment proxy discovery.

use crate::config::ClientOptions;
use crate::error::{Result, RicochetError};
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Response record returned for all HTTP statuses, including 4xx/5xx.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    /// URL the response came from (differs from the request URL after
    /// redirects, when following is enabled)
    pub final_url: String,
}

/// Request sender with per-request timeout, proxy, and TLS toggles.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    timeout_secs: f64,
}

impl HttpClient {
    /// Builds a client from options. Fails only on malformed proxy URLs or
    /// TLS backend initialization problems.
    pub fn new(options: &ClientOptions) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs_f64(options.timeout_secs))
            .redirect(if options.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .danger_accept_invalid_certs(!options.verify_tls);

        builder = match &options.proxy {
            Some(proxy_url) => {
                let proxy = reqwest::Proxy::all(proxy_url)
                    .map_err(|e| RicochetError::Config(format!("invalid proxy URL: {e}")))?;
                builder.proxy(proxy)
            }
            // No explicit proxy means no proxy at all; HTTP_PROXY et al.
            // must not silently reroute injection traffic.
            None => builder.no_proxy(),
        };

        let client = builder
            .build()
            .map_err(|e| RicochetError::Config(format!("client build failed: {e}")))?;

        Ok(Self {
            client,
            timeout_secs: options.timeout_secs,
        })
    }

    /// Sends one request and returns the response whatever its status.
    /// Connection, DNS, and TLS failures map to [`RicochetError::Network`];
    /// deadline overruns map to [`RicochetError::Timeout`].
    pub async fn send(
        &self,
        method: &str,
        url: &str,
        headers: &[(String, String)],
        body: Option<Vec<u8>>,
    ) -> Result<HttpResponse> {
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| RicochetError::Config(format!("invalid HTTP method: {method}")))?;

        let mut req = self.client.request(method, url);
        for (key, value) in headers {
            req = req.header(key.as_str(), value.as_str());
        }
        if let Some(b) = body {
            req = req.body(b);
        }

        let response = req.send().await.map_err(|e| self.map_send_error(url, e))?;

        let status = response.status();
        let final_url = response.url().to_string();
        let resp_headers = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    v.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_send_error(url, e))?
            .to_vec();

        debug!("response {} from {}", status.as_u16(), final_url);

        Ok(HttpResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            headers: resp_headers,
            body,
            final_url,
        })
    }

    fn map_send_error(&self, url: &str, e: reqwest::Error) -> RicochetError {
        if e.is_timeout() {
            RicochetError::Timeout(self.timeout_secs)
        } else {
            RicochetError::Network(format!("{url}: {e}"))
        }
    }
}
