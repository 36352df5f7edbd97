//! Gateway error types
//!
//! The taxonomy mirrors how failures are recovered: transport and parse
//! errors collapse into fail-open verdicts at the sub-check boundary, store
//! errors are logged and swallowed, and only setup problems (bad config,
//! unusable database) surface as hard [`GatewayError`]s at startup.

use thiserror::Error;

/// Failure of one classifier sub-check. Always recovered locally by mapping
/// to a fail-open verdict; the tag ends up in `Verdict::error`.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classifier timed out after {0}ms")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream returned status {0}")]
    Upstream(u16),

    #[error("unparseable classifier response: {0}")]
    Unparseable(String),

    #[error("image fetch failed: {0}")]
    ImageFetch(String),
}

impl ClassifyError {
    /// Short stable tag recorded on the fail-open verdict.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport_error",
            Self::Upstream(_) => "upstream_error",
            Self::Unparseable(_) => "parse_error",
            Self::ImageFetch(_) => "fetch_failed",
        }
    }
}

/// Failure of one cache tier. Best-effort everywhere: never fails a caller.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("cache task failed: {0}")]
    Task(String),
}

/// Failure of a profile or activity store operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("store task failed: {0}")]
    Task(String),
}

/// Hard gateway failures. Only seen at startup / operator level.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("setup failed: {0}")]
    Setup(String),

    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}
