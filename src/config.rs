//! Configuration for Ricochet commands

use crate::error::{Result, RicochetError};
use std::path::PathBuf;

/// Default store location under the user's home directory.
const STORE_DIR: &str = ".ricochet";
const STORE_FILE: &str = "ricochet.db";

/// Resolves the store path, defaulting to `~/.ricochet/ricochet.db`.
/// The parent directory is created if missing.
pub fn resolve_db_path(override_path: Option<PathBuf>) -> Result<PathBuf> {
    let path = match override_path {
        Some(p) => p,
        None => {
            let home = home::home_dir()
                .ok_or_else(|| RicochetError::Config("cannot determine home directory".into()))?;
            home.join(STORE_DIR).join(STORE_FILE)
        }
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| RicochetError::StoreIo(format!("cannot create {}: {e}", parent.display())))?;
    }
    Ok(path)
}

/// Options for the outbound injection HTTP client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Per-request timeout in seconds
    pub timeout_secs: f64,
    /// Verify TLS certificates (off is common when testing through proxies)
    pub verify_tls: bool,
    /// Optional HTTP/HTTPS proxy URL; disables environment proxy discovery
    /// entirely when unset
    pub proxy: Option<String>,
    /// Follow redirects. Off by default: a redirect to a different origin
    /// would hand the payload to an unintended host.
    pub follow_redirects: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 10.0,
            verify_tls: true,
            proxy: None,
            follow_redirects: false,
        }
    }
}

/// Parameters for passive-mode polling.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Starting interval between polls (seconds)
    pub base_interval: f64,
    /// Ceiling for the backed-off interval (seconds)
    pub max_interval: f64,
    /// Multiplier applied once the quiet streak passes the threshold
    pub factor: f64,
    /// Consecutive empty polls tolerated before backoff starts
    pub quiet_threshold: u32,
    /// Total wall-time budget for the polling session (seconds)
    pub timeout: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            base_interval: 5.0,
            max_interval: 60.0,
            factor: 1.5,
            quiet_threshold: 5,
            timeout: 3600.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_db_path_override() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("test.db");
        let resolved = resolve_db_path(Some(target.clone())).unwrap();
        assert_eq!(resolved, target);
        assert!(target.parent().unwrap().is_dir(), "parent dir created");
    }

    #[test]
    fn test_client_options_default_redirects_off() {
        assert!(!ClientOptions::default().follow_redirects);
    }
}
