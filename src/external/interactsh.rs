//! Interactsh client for external callback infrastructure
//!
//! Generates `<token>.<server>` callback URLs and polls self-hosted
//! Interactsh servers that run with encryption disabled. Public servers
//! (oast.pro and friends) require RSA+AES polling, which is out of scope
//! here; for those, mint URLs with this client and poll with the official
//! interactsh-client.

use crate::error::Result;
use crate::models::unix_now;
use crate::store::Store;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// One interaction reported by an Interactsh server.
#[derive(Debug, Clone)]
pub struct InteractshInteraction {
    pub protocol: String,
    pub unique_id: String,
    pub full_id: String,
    pub raw_request: String,
    pub remote_address: String,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
struct PollResponse {
    #[serde(default)]
    data: Vec<PollItem>,
}

#[derive(Debug, Deserialize)]
struct PollItem {
    #[serde(default)]
    protocol: String,
    #[serde(rename = "unique-id", default)]
    unique_id: String,
    #[serde(rename = "full-id", default)]
    full_id: String,
    #[serde(rename = "raw-request", default)]
    raw_request: String,
    #[serde(rename = "remote-address", default)]
    remote_address: String,
    #[serde(default)]
    timestamp: String,
}

/// Minimal Interactsh client: URL mint plus plaintext polling.
pub struct InteractshClient {
    server: String,
    correlation_id: String,
    secret: Option<String>,
    http: reqwest::Client,
}

impl InteractshClient {
    pub fn new(server: &str, correlation_id: &str, secret: Option<String>) -> Self {
        Self {
            server: server.trim().to_lowercase(),
            correlation_id: correlation_id.to_lowercase(),
            secret,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Callback subdomain: `<correlation_id>.<server>`.
    pub fn subdomain(&self) -> String {
        format!("{}.{}", self.correlation_id, self.server)
    }

    /// Callback URL for the protocol: the bare subdomain for DNS, an HTTP
    /// URL otherwise.
    pub fn generate_url(&self, protocol: &str) -> String {
        if protocol.eq_ignore_ascii_case("dns") {
            self.subdomain()
        } else {
            format!("http://{}/callback", self.subdomain())
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Records a placeholder injection so later interactions have a token
    /// to correlate against.
    pub async fn register_placeholder(&self, store: &Store) -> Result<()> {
        if store.get_injection(&self.correlation_id).await?.is_some() {
            return Ok(());
        }
        store
            .record_injection(&crate::models::Injection {
                token: self.correlation_id.clone(),
                target_url: format!("interactsh://{}", self.server),
                parameter: "external".to_string(),
                payload: self.generate_url("http"),
                context: Some("interactsh external callback".to_string()),
                injected_at: unix_now(),
            })
            .await
    }

    /// Polls the server's plaintext endpoint. Servers that require
    /// encryption answer with errors; those poll attempts yield an empty
    /// list rather than failing the command.
    pub async fn poll(&self, store: Option<&Store>) -> Vec<InteractshInteraction> {
        let mut url = format!(
            "https://{}/poll?id={}",
            self.server, self.correlation_id
        );
        if let Some(secret) = &self.secret {
            url.push_str(&format!("&secret={secret}"));
        }

        let response = match self
            .http
            .get(&url)
            .header("User-Agent", "ricochet")
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                debug!("interactsh poll failed (encryption required?): {e}");
                return Vec::new();
            }
        };

        let parsed: PollResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                debug!("interactsh poll returned unparseable data: {e}");
                return Vec::new();
            }
        };

        let mut interactions = Vec::with_capacity(parsed.data.len());
        for item in parsed.data {
            let interaction = InteractshInteraction {
                protocol: item.protocol,
                unique_id: item.unique_id,
                full_id: item.full_id,
                raw_request: item.raw_request,
                remote_address: item.remote_address,
                timestamp: item.timestamp,
            };

            if let Some(store) = store {
                let mut headers = BTreeMap::new();
                headers.insert(
                    "X-Interactsh-Protocol".to_string(),
                    interaction.protocol.clone(),
                );
                let body = (!interaction.raw_request.is_empty())
                    .then(|| interaction.raw_request.as_bytes());
                let path = format!("/{}/{}", interaction.protocol, interaction.full_id);
                if let Err(e) = store
                    .record_callback(&self.correlation_id, &interaction.remote_address, &path, &headers, body)
                    .await
                {
                    debug!("failed to record interactsh interaction: {e}");
                }
            }

            interactions.push(interaction);
        }
        interactions
    }
}
