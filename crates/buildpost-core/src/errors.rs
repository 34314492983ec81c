use std::path::PathBuf;

/// Core error type for the notifier.
///
/// Adapter crates map their client errors into this type so the binary can
/// report every failure the same way (one diagnostic line, non-zero exit).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("could not resolve chat {chat_id}: {reason}")]
    Resolution { chat_id: i64, reason: String },

    #[error("delivery error: {0}")]
    Delivery(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid path: {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
