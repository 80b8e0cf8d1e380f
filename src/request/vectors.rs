//! Injectable-position enumeration
//!
//! A vector is one place in a request where a payload can land: a query
//! parameter, a security-relevant header, a cookie, a url-encoded body field,
//! or a top-level JSON string field. The crawler (an external collaborator)
//! emits the same positions as a JSON file which `load_crawl_vectors`
//! ingests.

use crate::error::{Result, RicochetError};
use crate::request::RawRequest;
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Headers worth injecting into: commonly logged, rendered in dashboards,
/// or trusted by upstream proxies.
pub const INJECTABLE_HEADERS: &[&str] = &[
    "User-Agent",
    "Referer",
    "X-Forwarded-For",
    "X-Forwarded-Host",
    "X-Custom-IP-Authorization",
    "X-Original-URL",
    "X-Rewrite-URL",
    "X-Client-IP",
    "True-Client-IP",
    "Forwarded",
    "Origin",
];

/// Where in the request a vector lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorLocation {
    Query,
    Header,
    Cookie,
    Body,
    Json,
}

impl std::fmt::Display for VectorLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorLocation::Query => write!(f, "query"),
            VectorLocation::Header => write!(f, "header"),
            VectorLocation::Cookie => write!(f, "cookie"),
            VectorLocation::Body => write!(f, "body"),
            VectorLocation::Json => write!(f, "json"),
        }
    }
}

/// A single injectable position within a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    pub location: VectorLocation,
    pub name: String,
    pub original_value: String,
}

/// Enumerates every injectable position in a parsed request.
pub fn extract_vectors(request: &RawRequest) -> Vec<Vector> {
    let mut vectors = Vec::new();
    vectors.extend(query_vectors(request));
    vectors.extend(header_vectors(request));
    vectors.extend(cookie_vectors(request));
    vectors.extend(body_vectors(request));
    vectors
}

fn query_vectors(request: &RawRequest) -> Vec<Vector> {
    let Some((_, query)) = request.path.split_once('?') else {
        return Vec::new();
    };
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(name, value)| Vector {
            location: VectorLocation::Query,
            name: name.into_owned(),
            original_value: value.into_owned(),
        })
        .collect()
}

fn header_vectors(request: &RawRequest) -> Vec<Vector> {
    request
        .headers
        .iter()
        .filter(|(name, _)| {
            INJECTABLE_HEADERS
                .iter()
                .any(|h| h.eq_ignore_ascii_case(name))
        })
        .map(|(name, value)| Vector {
            location: VectorLocation::Header,
            name: name.clone(),
            original_value: value.clone(),
        })
        .collect()
}

fn cookie_vectors(request: &RawRequest) -> Vec<Vector> {
    let Some(cookie_header) = request.header("cookie") else {
        return Vec::new();
    };
    cookie_header
        .split(';')
        .filter_map(|cookie| {
            let (name, value) = cookie.trim().split_once('=')?;
            Some(Vector {
                location: VectorLocation::Cookie,
                name: name.trim().to_string(),
                original_value: value.trim().to_string(),
            })
        })
        .collect()
}

fn body_vectors(request: &RawRequest) -> Vec<Vector> {
    let Some(body) = request.body.as_deref() else {
        return Vec::new();
    };
    let content_type = request.header("content-type").unwrap_or("").to_lowercase();

    if content_type.contains("application/x-www-form-urlencoded") {
        url::form_urlencoded::parse(body)
            .map(|(name, value)| Vector {
                location: VectorLocation::Body,
                name: name.into_owned(),
                original_value: value.into_owned(),
            })
            .collect()
    } else if content_type.contains("application/json") {
        // Top-level string fields only; nested traversal is future work.
        let Ok(serde_json::Value::Object(map)) = serde_json::from_slice(body) else {
            return Vec::new();
        };
        map.iter()
            .filter_map(|(key, value)| {
                value.as_str().map(|s| Vector {
                    location: VectorLocation::Json,
                    name: key.clone(),
                    original_value: s.to_string(),
                })
            })
            .collect()
    } else {
        Vec::new()
    }
}

/// One entry of the crawler's vector export file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlVector {
    pub url: String,
    pub method: String,
    pub param_name: String,
    pub param_type: String,
    pub location: String,
}

/// Loads the crawler's JSON vector file.
pub fn load_crawl_vectors(path: &Path) -> Result<Vec<CrawlVector>> {
    let raw = std::fs::read_to_string(path)?;
    let vectors: Vec<CrawlVector> = serde_json::from_str(&raw)
        .map_err(|e| RicochetError::Config(format!("invalid vector file {}: {e}", path.display())))?;
    Ok(vectors)
}

impl CrawlVector {
    /// Turns a crawl entry into a synthetic request plus the vector pointing
    /// at the parameter to inject. Form parameters become url-encoded POST
    /// bodies; everything else rides the query string.
    pub fn to_request(&self) -> Result<(RawRequest, Vector)> {
        let url = Url::parse(&self.url)?;
        let host = url
            .host_str()
            .ok_or_else(|| RicochetError::Config(format!("vector URL without host: {}", self.url)))?
            .to_string();
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host,
        };

        let use_body = self.method.eq_ignore_ascii_case("post") && self.location != "query";
        let mut path = url.path().to_string();
        let mut headers = vec![("Host".to_string(), host.clone())];
        let mut body = None;

        let original_value = url
            .query_pairs()
            .find(|(name, _)| name == &self.param_name)
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();

        if use_body {
            if let Some(query) = url.query() {
                path.push('?');
                path.push_str(query);
            }
            headers.push((
                "Content-Type".to_string(),
                "application/x-www-form-urlencoded".to_string(),
            ));
            body = Some(format!("{}=", self.param_name).into_bytes());
        } else {
            // Make sure the parameter exists in the query so the injector
            // has something to replace.
            let mut pairs: Vec<String> = url
                .query()
                .unwrap_or("")
                .split('&')
                .filter(|p| !p.is_empty())
                .map(|p| p.to_string())
                .collect();
            if !pairs
                .iter()
                .any(|p| p.split('=').next() == Some(self.param_name.as_str()))
            {
                pairs.push(format!("{}=", self.param_name));
            }
            path.push('?');
            path.push_str(&pairs.join("&"));
        }

        let location = if use_body {
            VectorLocation::Body
        } else {
            VectorLocation::Query
        };

        let request = RawRequest {
            method: self.method.to_uppercase(),
            path,
            http_version: "HTTP/1.1".to_string(),
            headers,
            body,
            host,
        };
        let vector = Vector {
            location,
            name: self.param_name.clone(),
            original_value,
        };
        Ok((request, vector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::parse_request;

    fn sample_request() -> RawRequest {
        parse_request(
            "POST /submit?q=hello&page=2 HTTP/1.1\r\n\
             Host: target.example\r\n\
             User-Agent: Mozilla/5.0\r\n\
             X-Forwarded-For: 1.2.3.4\r\n\
             Cookie: session=abc; lang=en\r\n\
             Content-Type: application/x-www-form-urlencoded\r\n\
             \r\n\
             comment=nice&author=bob",
        )
        .unwrap()
    }

    #[test]
    fn test_extracts_all_locations() {
        let vectors = extract_vectors(&sample_request());
        let count = |loc: VectorLocation| vectors.iter().filter(|v| v.location == loc).count();
        assert_eq!(count(VectorLocation::Query), 2);
        assert_eq!(count(VectorLocation::Header), 2); // User-Agent + XFF
        assert_eq!(count(VectorLocation::Cookie), 2);
        assert_eq!(count(VectorLocation::Body), 2);
    }

    #[test]
    fn test_query_values_decoded() {
        let req = parse_request(
            "GET /?q=a%20b HTTP/1.1\r\nHost: h\r\n\r\n",
        )
        .unwrap();
        let vectors = extract_vectors(&req);
        assert_eq!(vectors[0].original_value, "a b");
    }

    #[test]
    fn test_json_body_top_level_strings_only() {
        let req = parse_request(
            "POST /api HTTP/1.1\r\n\
             Host: h\r\n\
             Content-Type: application/json\r\n\
             \r\n\
             {\"name\":\"bob\",\"age\":3,\"tags\":[\"a\"],\"bio\":\"hi\"}",
        )
        .unwrap();
        let vectors = extract_vectors(&req);
        let json: Vec<&Vector> = vectors
            .iter()
            .filter(|v| v.location == VectorLocation::Json)
            .collect();
        assert_eq!(json.len(), 2);
        assert!(json.iter().all(|v| v.name == "name" || v.name == "bio"));
    }

    #[test]
    fn test_non_injectable_headers_skipped() {
        let req = parse_request(
            "GET / HTTP/1.1\r\nHost: h\r\nAccept: */*\r\n\r\n",
        )
        .unwrap();
        assert!(extract_vectors(&req)
            .iter()
            .all(|v| v.location != VectorLocation::Header));
    }

    #[test]
    fn test_crawl_vector_query_round_trip() {
        let cv = CrawlVector {
            url: "http://t.example/search?q=x".into(),
            method: "GET".into(),
            param_name: "q".into(),
            param_type: "query".into(),
            location: "query".into(),
        };
        let (req, vector) = cv.to_request().unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.host, "t.example");
        assert_eq!(vector.name, "q");
        assert_eq!(vector.original_value, "x");
        assert!(req.path.contains("q=x"));
    }

    #[test]
    fn test_crawl_vector_form_becomes_body() {
        let cv = CrawlVector {
            url: "http://t.example/comment".into(),
            method: "POST".into(),
            param_name: "text".into(),
            param_type: "text".into(),
            location: "form".into(),
        };
        let (req, vector) = cv.to_request().unwrap();
        assert_eq!(vector.location, VectorLocation::Body);
        assert_eq!(req.body.as_deref(), Some(b"text=".as_ref()));
        assert_eq!(
            req.header("content-type"),
            Some("application/x-www-form-urlencoded")
        );
    }

    #[test]
    fn test_crawl_vector_missing_param_added() {
        let cv = CrawlVector {
            url: "http://t.example/page".into(),
            method: "GET".into(),
            param_name: "ref".into(),
            param_type: "query".into(),
            location: "query".into(),
        };
        let (req, _) = cv.to_request().unwrap();
        assert!(req.path.contains("ref="));
    }
}
