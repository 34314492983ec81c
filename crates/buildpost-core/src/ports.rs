use std::path::PathBuf;

use async_trait::async_trait;

use crate::{
    domain::{ChatTarget, ThreadSpec},
    Result,
};

/// Credentials handed to a backend when opening a session.
#[derive(Clone)]
pub struct Credentials {
    pub api_id: Option<i64>,
    pub api_hash: Option<String>,
    pub bot_token: String,
}

/// The bot account a session is authenticated as.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: u64,
    pub username: String,
}

/// A destination after lookup against the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedChat {
    pub target: ChatTarget,
    pub title: Option<String>,
}

/// Limits of a backend's attachment messages.
#[derive(Clone, Copy, Debug)]
pub struct DeliveryCapabilities {
    /// Largest number of files one message (album) may carry.
    pub max_files_per_message: usize,
    pub max_caption_len: usize,
}

/// One outgoing attachment message.
#[derive(Clone, Copy, Debug)]
pub struct Attachment<'a> {
    pub target: ChatTarget,
    pub thread: ThreadSpec,
    pub files: &'a [PathBuf],
    /// Telegram HTML.
    pub caption_html: Option<&'a str>,
}

/// Messaging backend able to open authenticated sessions.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn connect(&self, creds: &Credentials) -> Result<Box<dyn Session>>;
}

/// An authenticated connection. Callers must `close` it on every path.
#[async_trait]
pub trait Session: Send + Sync {
    fn identity(&self) -> &BotIdentity;

    fn capabilities(&self) -> DeliveryCapabilities;

    async fn resolve_chat(&self, target: ChatTarget) -> Result<ResolvedChat>;

    /// Send at most `max_files_per_message` files as a single message.
    async fn send_attachment(&self, attachment: Attachment<'_>) -> Result<()>;

    async fn close(self: Box<Self>) -> Result<()>;
}
