//! Error types for Ricochet

use thiserror::Error;

/// Main error type for Ricochet operations
#[derive(Debug, Error)]
pub enum RicochetError {
    /// Store file unwritable, schema failure, or any backend I/O problem.
    #[error("store error: {0}")]
    StoreIo(String),

    /// An injection was recorded twice under the same token.
    #[error("duplicate correlation token: {0}")]
    DuplicateToken(String),

    /// DNS resolution, TCP connect, or TLS handshake failure.
    #[error("network error: {0}")]
    Network(String),

    /// The outbound request exceeded its deadline.
    #[error("request timed out after {0:.1}s")]
    Timeout(f64),

    #[error("malformed request file: {0}")]
    RequestParse(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
}

/// Result type alias for Ricochet operations
pub type Result<T> = std::result::Result<T, RicochetError>;
