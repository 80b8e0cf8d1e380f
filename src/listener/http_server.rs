//! HTTP callback listener
//!
//! Accepts any method on any path, extracts the correlation token from the
//! last non-empty path segment, and records the interaction when the token
//! belongs to a known injection. The response is a fixed `200 OK` / `OK`
//! either way, so probing the listener reveals nothing about which tokens
//! exist.

use crate::listener::ShutdownRx;
use crate::store::Store;
use crate::token;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Upper bound on buffered callback bodies; excess bytes are discarded.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Runs the HTTP callback listener until the shutdown signal fires.
pub async fn run_http_listener(
    host: &str,
    port: u16,
    store: Store,
    mut shutdown: ShutdownRx,
) -> crate::error::Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| crate::error::RicochetError::Config(format!("bad listen address: {e}")))?;
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP callback listener on {addr}");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, remote_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        debug!("accept error: {e}");
                        continue;
                    }
                };
                let store = store.clone();
                let io = TokioIo::new(stream);

                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let store = store.clone();
                        async move { handle_callback(req, remote_addr, store).await }
                    });

                    if let Err(e) = hyper::server::conn::http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        debug!("connection error from {remote_addr}: {e}");
                    }
                });
            }
            _ = shutdown.changed() => {
                info!("HTTP callback listener stopped");
                return Ok(());
            }
        }
    }
}

async fn handle_callback(
    req: Request<Incoming>,
    remote_addr: SocketAddr,
    store: Store,
) -> std::result::Result<Response<String>, hyper::Error> {
    let path = req.uri().path().to_string();
    let full_path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.to_string())
        .unwrap_or_else(|| path.clone());
    let source_ip = remote_addr.ip().to_string();

    match extract_token(&path) {
        Some(candidate) => {
            let headers: BTreeMap<String, String> = req
                .headers()
                .iter()
                .map(|(k, v)| {
                    (
                        k.as_str().to_string(),
                        String::from_utf8_lossy(v.as_bytes()).into_owned(),
                    )
                })
                .collect();

            let body = read_body_capped(req.into_body()).await;
            let body_ref = if body.is_empty() {
                None
            } else {
                Some(body.as_slice())
            };

            match store
                .record_callback(&candidate, &source_ip, &full_path, &headers, body_ref)
                .await
            {
                Ok(true) => {
                    info!("callback received: token={candidate} source={source_ip} path={full_path}");
                }
                Ok(false) => {
                    warn!("unknown token {candidate} from {source_ip}");
                }
                Err(e) => {
                    warn!("failed to record callback {candidate}: {e}");
                }
            }
        }
        None => {
            debug!("request without token from {source_ip}: {full_path}");
        }
    }

    // The response never varies; neither valid tokens nor store state leak.
    let mut response = Response::new("OK".to_string());
    response
        .headers_mut()
        .insert("Content-Type", hyper::header::HeaderValue::from_static("text/plain"));
    Ok(response)
}

/// Takes the last non-empty path segment as a token candidate, requiring
/// the exact 16-char lowercase-hex format.
fn extract_token(path: &str) -> Option<String> {
    let candidate = path.split('/').rev().find(|s| !s.is_empty())?;
    token::is_valid(candidate).then(|| candidate.to_string())
}

async fn read_body_capped(mut body: Incoming) -> Vec<u8> {
    let mut collected = Vec::new();
    while let Some(frame) = body.frame().await {
        let Ok(frame) = frame else { break };
        if let Some(data) = frame.data_ref() {
            if collected.len() < MAX_BODY_BYTES {
                let take = (MAX_BODY_BYTES - collected.len()).min(data.len());
                collected.extend_from_slice(&data[..take]);
            }
        }
    }
    collected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_token_last_segment() {
        assert_eq!(
            extract_token("/callback/aaaaaaaaaaaaaaaa"),
            Some("aaaaaaaaaaaaaaaa".to_string())
        );
        assert_eq!(
            extract_token("/aaaaaaaaaaaaaaaa/"),
            Some("aaaaaaaaaaaaaaaa".to_string())
        );
    }

    #[test]
    fn test_extract_token_rejects_bad_lengths() {
        assert_eq!(extract_token("/callback/aaaaaaaaaaaaaaa"), None); // 15
        assert_eq!(extract_token("/callback/aaaaaaaaaaaaaaaaa"), None); // 17
    }

    #[test]
    fn test_extract_token_rejects_uppercase() {
        assert_eq!(extract_token("/AAAAAAAAAAAAAAAA"), None);
    }

    #[test]
    fn test_extract_token_empty_path() {
        assert_eq!(extract_token("/"), None);
        assert_eq!(extract_token(""), None);
    }
}
