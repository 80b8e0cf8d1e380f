//! Injection orchestrator
//!
//! Turns (request, vector, payload template) triples into recorded
//! injections. The ordering invariant is the heart of the tool: the store
//! row exists before the outbound socket write begins, so a callback can
//! never arrive for an injection the store has not seen.

pub mod payloads;
pub use payloads::load_payloads;

use crate::error::{Result, RicochetError};
use crate::http::{HttpClient, RateLimiter};
use crate::models::{unix_now, Injection, InjectionResult};
use crate::request::{RawRequest, Vector, VectorLocation};
use crate::store::Store;
use crate::token;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

/// Placeholder variants accepted in payload templates. The match is literal:
/// whitespace inside the braces defeats it.
static CALLBACK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\{\{CALLBACK\}\}|\{CALLBACK\}|\$\{CALLBACK\}").expect("callback pattern")
});

/// Replaces every callback placeholder with `<base>/<token>`.
pub fn substitute_callback(template: &str, callback_base: &str, token: &str) -> String {
    let full_url = format!("{}/{}", callback_base.trim_end_matches('/'), token);
    CALLBACK_PATTERN
        .replace_all(template, regex::NoExpand(&full_url))
        .into_owned()
}

/// Multi-vector injection orchestrator.
pub struct Injector {
    store: Store,
    client: HttpClient,
    rate_limiter: Arc<RateLimiter>,
    callback_base: String,
    context: Option<String>,
    use_https: bool,
    dry_run: bool,
}

impl Injector {
    pub fn new(
        store: Store,
        client: HttpClient,
        rate_limiter: Arc<RateLimiter>,
        callback_base: String,
    ) -> Self {
        Self {
            store,
            client,
            rate_limiter,
            callback_base,
            context: None,
            use_https: false,
            dry_run: false,
        }
    }

    /// Context tag recorded with each injection (drives severity at query
    /// time, e.g. `xss:html`).
    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    pub fn with_https(mut self, https: bool) -> Self {
        self.use_https = https;
        self
    }

    /// In-place variant for callers that switch scheme between batches.
    pub fn set_https(&mut self, https: bool) {
        self.use_https = https;
    }

    /// Record but never send. The store then reflects the planned batch.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Injects one payload template into one vector.
    pub async fn inject_vector(
        &self,
        request: &RawRequest,
        vector: &Vector,
        template: &str,
    ) -> Result<InjectionResult> {
        let token = token::mint();
        let payload = substitute_callback(template, &self.callback_base, &token);

        let modified = mutate_request(request, vector, &payload);
        // The store keeps the target as given; the mutated URL only matters
        // for the one send.
        let target_url = request.build_url(self.use_https);
        let url = modified.build_url(self.use_https);

        // Record before send: if this write fails there is nothing to
        // correlate, so the request must not go out.
        let injection = Injection {
            token: token.clone(),
            target_url,
            parameter: vector.name.clone(),
            payload: payload.clone(),
            context: self.context.clone(),
            injected_at: unix_now(),
        };
        self.store.record_injection(&injection).await?;

        if self.dry_run {
            debug!("dry-run: recorded {token} for {url}, not sending");
            return Ok(InjectionResult {
                token,
                vector: vector.clone(),
                url,
                status: None,
                error: Some("[dry-run] request not sent".into()),
                dry_run: true,
            });
        }

        self.rate_limiter.acquire().await;

        let headers: Vec<(String, String)> = modified.headers.clone();
        match self
            .client
            .send(&modified.method, &url, &headers, modified.body.clone())
            .await
        {
            Ok(response) => {
                info!(
                    "injected {} into {}:{} -> {}",
                    token, vector.location, vector.name, response.status
                );
                Ok(InjectionResult {
                    token,
                    vector: vector.clone(),
                    url,
                    status: Some(response.status),
                    error: None,
                    dry_run: false,
                })
            }
            Err(e @ (RicochetError::Network(_) | RicochetError::Timeout(_))) => {
                // An injection with no immediate response is normal; the
                // evidence arrives out-of-band or not at all.
                warn!("send failed for {token}: {e}");
                Ok(InjectionResult {
                    token,
                    vector: vector.clone(),
                    url,
                    status: None,
                    error: Some(e.to_string()),
                    dry_run: false,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Injects one template into every vector of the request.
    pub async fn inject_all_vectors(
        &self,
        request: &RawRequest,
        template: &str,
    ) -> Result<Vec<InjectionResult>> {
        let vectors = crate::request::extract_vectors(request);
        self.inject_vectors(request, &vectors, template).await
    }

    /// Injects one template into the named parameter, wherever it lives.
    pub async fn inject_param(
        &self,
        request: &RawRequest,
        param: &str,
        template: &str,
    ) -> Result<Option<InjectionResult>> {
        let vectors = crate::request::extract_vectors(request);
        match vectors.iter().find(|v| v.name == param) {
            Some(vector) => Ok(Some(self.inject_vector(request, vector, template).await?)),
            None => Ok(None),
        }
    }

    /// Full cartesian product: every template from the file into every
    /// vector, a fresh token per combination. Duplicate-token collisions
    /// abort that one injection and the batch continues.
    pub async fn inject_multi(
        &self,
        request: &RawRequest,
        vectors: &[Vector],
        templates: &[String],
    ) -> Result<Vec<InjectionResult>> {
        let mut results = Vec::with_capacity(vectors.len() * templates.len());
        for template in templates {
            for vector in vectors {
                match self.inject_vector(request, vector, template).await {
                    Ok(result) => results.push(result),
                    Err(RicochetError::DuplicateToken(t)) => {
                        warn!("token collision on {t}, skipping injection");
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(results)
    }

    async fn inject_vectors(
        &self,
        request: &RawRequest,
        vectors: &[Vector],
        template: &str,
    ) -> Result<Vec<InjectionResult>> {
        let mut results = Vec::with_capacity(vectors.len());
        for vector in vectors {
            match self.inject_vector(request, vector, template).await {
                Ok(result) => results.push(result),
                Err(RicochetError::DuplicateToken(t)) => {
                    warn!("token collision on {t}, skipping injection");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(results)
    }
}

/// Builds the mutated request for one vector. Query and form values are
/// RFC 3986 percent-encoded; headers and cookies take the payload verbatim;
/// JSON fields are replaced and the document re-serialized. Body mutations
/// recompute Content-Length.
pub fn mutate_request(request: &RawRequest, vector: &Vector, payload: &str) -> RawRequest {
    let mut modified = request.clone();
    match vector.location {
        VectorLocation::Query => {
            if let Some((path, query)) = request.path.split_once('?') {
                let new_query = replace_pair_value(query, &vector.name, payload);
                modified.path = format!("{path}?{new_query}");
            }
        }
        VectorLocation::Header => {
            modified.set_header(&vector.name, payload.to_string());
        }
        VectorLocation::Cookie => {
            if let Some(cookie_header) = request.header("cookie") {
                let rebuilt: Vec<String> = cookie_header
                    .split(';')
                    .map(|cookie| {
                        let trimmed = cookie.trim();
                        match trimmed.split_once('=') {
                            Some((name, _)) if name.trim() == vector.name => {
                                format!("{}={payload}", name.trim())
                            }
                            Some((name, value)) => format!("{}={}", name.trim(), value),
                            None => trimmed.to_string(),
                        }
                    })
                    .collect();
                modified.set_header("Cookie", rebuilt.join("; "));
            }
        }
        VectorLocation::Body => {
            if let Some(body) = request.body.as_deref() {
                if let Ok(body_str) = std::str::from_utf8(body) {
                    let new_body = replace_pair_value(body_str, &vector.name, payload);
                    modified.body = Some(new_body.into_bytes());
                }
            }
        }
        VectorLocation::Json => {
            if let Some(body) = request.body.as_deref() {
                if let Ok(serde_json::Value::Object(mut map)) = serde_json::from_slice(body) {
                    if map.contains_key(&vector.name) {
                        map.insert(
                            vector.name.clone(),
                            serde_json::Value::String(payload.to_string()),
                        );
                        if let Ok(new_body) = serde_json::to_vec(&serde_json::Value::Object(map)) {
                            modified.body = Some(new_body);
                        }
                    }
                }
            }
        }
    }

    // A mutated body invalidates the parsed Content-Length.
    if modified.body != request.body {
        if let Some(body) = modified.body.as_deref() {
            modified.set_header("Content-Length", body.len().to_string());
        }
    }
    modified
}

/// Replaces the value of `name` in a `k=v&k=v` string, percent-encoding the
/// payload and leaving every other pair byte-for-byte untouched.
fn replace_pair_value(pairs: &str, name: &str, payload: &str) -> String {
    pairs
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if key_matches(key, name) => {
                format!("{key}={}", urlencoding::encode(payload))
            }
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn key_matches(raw_key: &str, name: &str) -> bool {
    raw_key == name
        || urlencoding::decode(raw_key)
            .map(|decoded| decoded == name)
            .unwrap_or(false)
}
