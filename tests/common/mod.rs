//! Common test utilities
#![allow(dead_code)]

use ricochet::models::{unix_now, Injection};
use ricochet::store::Store;
use tempfile::TempDir;

/// Opens a fresh store in a temp directory, returning the guard so the
/// file outlives the test.
pub async fn temp_store() -> (Store, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open(&dir.path().join("ricochet.db"))
        .await
        .expect("store open");
    (store, dir)
}

/// Builds an injection with a fixed token and sensible defaults.
pub fn sample_injection(token: &str, context: Option<&str>) -> Injection {
    Injection {
        token: token.to_string(),
        target_url: "http://t.example/?q=X".to_string(),
        parameter: "q".to_string(),
        payload: format!("<img src=\"http://cb.example/{token}\">"),
        context: context.map(String::from),
        injected_at: unix_now(),
    }
}
