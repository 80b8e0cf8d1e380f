//! Core data models for Ricochet

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Severity level for correlated findings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// Derives severity from an injection's context tag.
    ///
    /// This is a pure, total function: the same context always maps to the
    /// same severity, and severity is never stored. A context containing
    /// `ssti` or `sqli` means code ran server-side (high); `xss` means it
    /// ran in a victim browser (medium); anything else is informational.
    pub fn from_context(context: Option<&str>) -> Self {
        let Some(ctx) = context else {
            return Severity::Info;
        };
        let ctx = ctx.to_lowercase();
        if ctx.contains("ssti") || ctx.contains("sqli") {
            Severity::High
        } else if ctx.contains("xss") {
            Severity::Medium
        } else {
            Severity::Info
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::High => write!(f, "high"),
            Severity::Medium => write!(f, "medium"),
            Severity::Low => write!(f, "low"),
            Severity::Info => write!(f, "info"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            "info" => Ok(Severity::Info),
            other => Err(format!(
                "unknown severity '{other}' (use: high, medium, low, info)"
            )),
        }
    }
}

/// A recorded injection attempt, keyed by its correlation token.
///
/// Created once, immediately before the outbound request is sent, and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Injection {
    /// 16-char lowercase-hex correlation token
    pub token: String,
    /// Full URL the payload was sent to
    pub target_url: String,
    /// Name of the injected parameter
    pub parameter: String,
    /// Payload text after callback substitution
    pub payload: String,
    /// Free-form context tag (e.g. `xss:html`, `sqli:mssql`)
    pub context: Option<String>,
    /// Seconds since the Unix epoch
    pub injected_at: f64,
}

/// A callback observed by one of the listeners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Callback {
    /// Store-assigned row id
    pub id: i64,
    /// Correlation token extracted from the callback
    pub token: String,
    /// Source address of the interaction
    pub source_ip: String,
    /// URL path with query, or `DNS:<qname>` for DNS callbacks
    pub request_path: String,
    /// Request headers (DNS callbacks carry a `qtype` entry)
    pub headers: BTreeMap<String, String>,
    /// Raw body bytes, if any
    pub body: Option<Vec<u8>>,
    /// Seconds since the Unix epoch
    pub received_at: f64,
}

/// A correlated finding: one injection joined with one callback.
///
/// An injection that triggers five callbacks surfaces as five findings;
/// every arrival carries new evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub token: String,
    pub target_url: String,
    pub parameter: String,
    pub payload: String,
    pub context: Option<String>,
    pub injected_at: f64,
    pub callback_id: i64,
    pub source_ip: String,
    pub request_path: String,
    pub callback_headers: BTreeMap<String, String>,
    pub callback_body: Option<Vec<u8>>,
    pub received_at: f64,
}

impl Finding {
    /// Severity derived from the injection context (never stored).
    pub fn severity(&self) -> Severity {
        Severity::from_context(self.context.as_deref())
    }

    /// Seconds between injection and callback. Negative deltas from skewed
    /// clocks are surfaced as-is rather than corrected.
    pub fn delay_seconds(&self) -> f64 {
        self.received_at - self.injected_at
    }

    /// Structured metadata exfiltrated in the callback body, when the body
    /// parses as a JSON object. XSS collector payloads post `{url, cookies,
    /// ua, dom}` here; anything non-JSON yields None.
    pub fn metadata(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        let body = self.callback_body.as_deref()?;
        match serde_json::from_slice::<serde_json::Value>(body) {
            Ok(serde_json::Value::Object(map)) => Some(map),
            _ => None,
        }
    }
}

/// Result of a single injection attempt.
#[derive(Debug, Clone)]
pub struct InjectionResult {
    pub token: String,
    pub vector: crate::request::Vector,
    pub url: String,
    /// HTTP status of the target's response, if the send completed
    pub status: Option<u16>,
    /// Transport-level failure, if any (injection stays recorded)
    pub error: Option<String>,
    pub dry_run: bool,
}

/// Current wall-clock time as seconds since the Unix epoch.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
