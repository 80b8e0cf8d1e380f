//! Burp-style raw request parsing
//!
//! Accepts the raw HTTP/1.1 text Burp and similar tools export: request
//! line, CRLF-separated headers, blank-line delimiter, optional body. LF-only
//! files are tolerated; CRLF is canonical.

pub mod vectors;
pub use vectors::{extract_vectors, load_crawl_vectors, CrawlVector, Vector, VectorLocation};

use crate::error::{Result, RicochetError};

/// A parsed HTTP request ready for vector extraction and mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRequest {
    pub method: String,
    /// Origin-form path including the query string
    pub path: String,
    pub http_version: String,
    /// Headers in file order, original casing preserved
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    /// Value of the mandatory Host header
    pub host: String,
}

impl RawRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replaces a header in place (case-insensitive), appending if absent.
    pub fn set_header(&mut self, name: &str, value: String) {
        match self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => *v = value,
            None => self.headers.push((name.to_string(), value)),
        }
    }

    /// Builds the absolute target URL. The scheme is a caller decision; the
    /// request file itself only carries the origin-form path.
    pub fn build_url(&self, https: bool) -> String {
        let scheme = if https { "https" } else { "http" };
        format!("{scheme}://{}{}", self.host, self.path)
    }
}

/// Parses a Burp-style request export.
///
/// Errors carry a diagnostic naming the offending line so a bad export is
/// fixable without opening a hex editor.
pub fn parse_request(content: &str) -> Result<RawRequest> {
    if content.trim().is_empty() {
        return Err(RicochetError::RequestParse("empty request file".into()));
    }

    // Normalize lone LF to CRLF, then split head from body on the first
    // blank line.
    let normalized = content.replace("\r\n", "\n").replace('\n', "\r\n");
    let (head, body) = match normalized.find("\r\n\r\n") {
        Some(pos) => {
            let rest = &normalized[pos + 4..];
            let body = if rest.is_empty() {
                None
            } else {
                Some(rest.as_bytes().to_vec())
            };
            (normalized[..pos].to_string(), body)
        }
        None => (normalized, None),
    };

    let mut lines = head.split("\r\n");
    let request_line = lines
        .next()
        .filter(|l| !l.is_empty())
        .ok_or_else(|| RicochetError::RequestParse("missing request line".into()))?;

    let mut parts = request_line.split(' ').filter(|p| !p.is_empty());
    let method = parts
        .next()
        .ok_or_else(|| RicochetError::RequestParse(format!("bad request line: {request_line:?}")))?
        .to_string();
    let path = parts
        .next()
        .ok_or_else(|| RicochetError::RequestParse(format!("bad request line: {request_line:?}")))?
        .to_string();
    let http_version = parts.next().unwrap_or("HTTP/1.1").to_string();

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line.split_once(':').ok_or_else(|| {
            RicochetError::RequestParse(format!("header without colon: {line:?}"))
        })?;
        if name.trim().is_empty() {
            return Err(RicochetError::RequestParse(format!(
                "header with empty name: {line:?}"
            )));
        }
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    let host = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("host"))
        .map(|(_, v)| v.clone())
        .ok_or_else(|| RicochetError::RequestParse("missing Host header".into()))?;

    Ok(RawRequest {
        method,
        path,
        http_version,
        headers,
        body,
        host,
    })
}
