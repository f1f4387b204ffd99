//! Internal error type.
//!
//! Nothing here crosses the hook boundary: component entry points log a
//! `VoxError` and degrade (miss, silence, default message) instead.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum VoxError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache index is malformed: {0}")]
    IndexFormat(#[from] serde_json::Error),

    #[error("render failed: {0}")]
    Render(String),

    #[error("player failed: {0}")]
    Player(String),

    #[error("timed out after {secs}s waiting for audio lock {}", path.display())]
    LockTimeout { path: PathBuf, secs: u64 },

    #[error("push failed: {0}")]
    Push(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, VoxError>;
