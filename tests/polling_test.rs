//! Integration tests for passive-mode polling

mod common;

use common::{sample_injection, temp_store};
use ricochet::config::PollConfig;
use ricochet::listener::shutdown_channel;
use ricochet::poll::poll_for_callbacks;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

fn quick_config(timeout: f64) -> PollConfig {
    PollConfig {
        base_interval: 0.05,
        max_interval: 0.2,
        factor: 2.0,
        quiet_threshold: 2,
        timeout,
    }
}

#[tokio::test]
async fn test_polling_honors_time_budget() {
    let (store, _dir) = temp_store().await;
    let (_tx, rx) = shutdown_channel();

    let started = Instant::now();
    let total = poll_for_callbacks(&store, &quick_config(0.4), None, None, rx, |_| {})
        .await
        .unwrap();

    assert_eq!(total, 0);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(350), "stopped early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "overran budget: {elapsed:?}");
}

#[tokio::test]
async fn test_polling_observes_mid_session_callback() {
    let (store, _dir) = temp_store().await;
    let (_tx, rx) = shutdown_channel();

    let writer = store.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        writer
            .record_injection(&sample_injection("aaaaaaaaaaaaaaaa", Some("xss:html")))
            .await
            .unwrap();
        writer
            .record_callback(
                "aaaaaaaaaaaaaaaa",
                "10.0.0.1",
                "/aaaaaaaaaaaaaaaa",
                &BTreeMap::new(),
                None,
            )
            .await
            .unwrap();
    });

    let mut seen = Vec::new();
    let total = poll_for_callbacks(&store, &quick_config(1.0), None, None, rx, |findings| {
        seen.extend(findings.iter().map(|f| f.token.clone()));
    })
    .await
    .unwrap();

    assert_eq!(total, 1);
    assert_eq!(seen, vec!["aaaaaaaaaaaaaaaa"]);
}

#[tokio::test]
async fn test_polling_window_excludes_prior_findings() {
    let (store, _dir) = temp_store().await;
    store
        .record_injection(&sample_injection("aaaaaaaaaaaaaaaa", None))
        .await
        .unwrap();
    store
        .record_callback(
            "aaaaaaaaaaaaaaaa",
            "10.0.0.1",
            "/aaaaaaaaaaaaaaaa",
            &BTreeMap::new(),
            None,
        )
        .await
        .unwrap();

    let (_tx, rx) = shutdown_channel();
    // Window opens after the pre-existing callback.
    let since = ricochet::models::unix_now();
    let total = poll_for_callbacks(&store, &quick_config(0.3), None, Some(since), rx, |_| {})
        .await
        .unwrap();
    assert_eq!(total, 0, "old findings stay outside the session window");
}

#[tokio::test]
async fn test_polling_stops_on_shutdown() {
    let (store, _dir) = temp_store().await;
    let (tx, rx) = shutdown_channel();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = tx.send(true);
    });

    let started = Instant::now();
    // Budget far larger than the test; shutdown must cut it short.
    poll_for_callbacks(&store, &quick_config(60.0), None, None, rx, |_| {})
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
}
