//! Integration tests for the HTTP callback listener

mod common;

use common::{sample_injection, temp_store};
use ricochet::listener::{http_server, shutdown_channel};
use ricochet::store::Store;
use std::time::Duration;

async fn free_tcp_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);
    port
}

/// Starts the listener on a fresh port and waits for it to come up.
async fn spawn_listener(store: Store) -> (u16, tokio::sync::watch::Sender<bool>) {
    let port = free_tcp_port().await;
    let (tx, rx) = shutdown_channel();
    tokio::spawn(async move {
        if let Err(e) = http_server::run_http_listener("127.0.0.1", port, store, rx).await {
            eprintln!("listener error: {e}");
        }
    });
    tokio::time::sleep(Duration::from_millis(150)).await;
    (port, tx)
}

// ── response discipline ──

#[tokio::test]
async fn test_always_200_any_method_any_path() {
    let (store, _dir) = temp_store().await;
    let (port, _tx) = spawn_listener(store).await;
    let client = reqwest::Client::new();

    let methods = [
        reqwest::Method::GET,
        reqwest::Method::POST,
        reqwest::Method::PUT,
        reqwest::Method::DELETE,
        reqwest::Method::OPTIONS,
        reqwest::Method::PATCH,
    ];
    for method in methods {
        let response = client
            .request(method.clone(), format!("http://127.0.0.1:{port}/any/path"))
            .send()
            .await
            .expect("request");
        assert_eq!(response.status(), 200, "{method} must get 200");
        assert_eq!(response.text().await.unwrap(), "OK");
    }

    let response = client
        .head(format!("http://127.0.0.1:{port}/"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_response_identical_for_known_and_unknown_tokens() {
    let (store, _dir) = temp_store().await;
    store
        .record_injection(&sample_injection("aaaaaaaaaaaaaaaa", None))
        .await
        .unwrap();
    let (port, _tx) = spawn_listener(store).await;
    let client = reqwest::Client::new();

    let known = client
        .get(format!("http://127.0.0.1:{port}/aaaaaaaaaaaaaaaa"))
        .send()
        .await
        .unwrap();
    let unknown = client
        .get(format!("http://127.0.0.1:{port}/ffffffffffffffff"))
        .send()
        .await
        .unwrap();

    assert_eq!(known.status(), unknown.status());
    assert_eq!(
        known.headers().get("content-type"),
        unknown.headers().get("content-type")
    );
    assert_eq!(
        known.text().await.unwrap(),
        unknown.text().await.unwrap()
    );
}

// ── recording discipline ──

#[tokio::test]
async fn test_known_token_recorded_with_metadata() {
    let (store, _dir) = temp_store().await;
    store
        .record_injection(&sample_injection("aaaaaaaaaaaaaaaa", None))
        .await
        .unwrap();
    let (port, _tx) = spawn_listener(store.clone()).await;

    reqwest::Client::new()
        .get(format!(
            "http://127.0.0.1:{port}/callback/aaaaaaaaaaaaaaaa?extra=1"
        ))
        .header("X-Probe", "yes")
        .send()
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let callbacks = store
        .get_callbacks_for_injection("aaaaaaaaaaaaaaaa")
        .await
        .unwrap();
    assert_eq!(callbacks.len(), 1);
    assert_eq!(callbacks[0].request_path, "/callback/aaaaaaaaaaaaaaaa?extra=1");
    assert_eq!(callbacks[0].source_ip, "127.0.0.1");
    assert_eq!(callbacks[0].headers.get("x-probe").map(String::as_str), Some("yes"));
}

#[tokio::test]
async fn test_post_body_stored() {
    let (store, _dir) = temp_store().await;
    store
        .record_injection(&sample_injection("aaaaaaaaaaaaaaaa", Some("xss:html")))
        .await
        .unwrap();
    let (port, _tx) = spawn_listener(store.clone()).await;

    let body = r#"{"url":"http://t.example/admin","cookies":"sid=1"}"#;
    reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/aaaaaaaaaaaaaaaa"))
        .body(body)
        .send()
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let callbacks = store
        .get_callbacks_for_injection("aaaaaaaaaaaaaaaa")
        .await
        .unwrap();
    assert_eq!(callbacks[0].body.as_deref(), Some(body.as_bytes()));

    // Exfiltrated JSON surfaces through the metadata projection.
    let findings = store.get_findings(None, None).await.unwrap();
    let metadata = findings[0].metadata().expect("metadata");
    assert_eq!(metadata["url"], "http://t.example/admin");
}

#[tokio::test]
async fn test_unknown_token_not_persisted() {
    let (store, _dir) = temp_store().await;
    let (port, _tx) = spawn_listener(store.clone()).await;

    let response = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{port}/ffffffffffffffff"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "OK");
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(store.get_findings(None, None).await.unwrap().is_empty());
    assert!(store
        .get_callbacks_for_injection("ffffffffffffffff")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_boundary_paths_rejected() {
    let (store, _dir) = temp_store().await;
    store
        .record_injection(&sample_injection("aaaaaaaaaaaaaaaa", None))
        .await
        .unwrap();
    let (port, _tx) = spawn_listener(store.clone()).await;
    let client = reqwest::Client::new();

    // 15 hex chars, uppercase hex, bare root: all 200, none stored.
    for path in ["/callback/aaaaaaaaaaaaaaa", "/AAAAAAAAAAAAAAAA", "/"] {
        let response = client
            .get(format!("http://127.0.0.1:{port}{path}"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200, "path {path}");
    }
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(store
        .get_callbacks_for_injection("aaaaaaaaaaaaaaaa")
        .await
        .unwrap()
        .is_empty());
}

// ── end-to-end correlation (blind fire) ──

#[tokio::test]
async fn test_injection_then_callback_yields_finding() {
    let (store, _dir) = temp_store().await;
    store
        .record_injection(&sample_injection("aaaaaaaaaaaaaaaa", None))
        .await
        .unwrap();
    let (port, _tx) = spawn_listener(store.clone()).await;

    reqwest::Client::new()
        .get(format!("http://127.0.0.1:{port}/aaaaaaaaaaaaaaaa"))
        .send()
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let findings = store.get_findings(None, None).await.unwrap();
    assert_eq!(findings.len(), 1);
    let finding = &findings[0];
    assert_eq!(finding.token, "aaaaaaaaaaaaaaaa");
    assert_eq!(finding.parameter, "q");
    assert!(finding.delay_seconds() >= 0.0);
    assert_eq!(finding.severity(), ricochet::models::Severity::Info);
}

// ── shutdown ──

#[tokio::test]
async fn test_listener_stops_on_shutdown() {
    let (store, _dir) = temp_store().await;
    let port = free_tcp_port().await;
    let (tx, rx) = shutdown_channel();

    let handle = tokio::spawn(async move {
        http_server::run_http_listener("127.0.0.1", port, store, rx).await
    });
    tokio::time::sleep(Duration::from_millis(150)).await;

    tx.send(true).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("listener must stop promptly")
        .expect("join");
    assert!(result.is_ok());
}
