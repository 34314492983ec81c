//! Telegram adapter (teloxide).
//!
//! This crate implements the `buildpost-core` backend port over the Telegram
//! Bot API, either the public endpoint or a self-hosted server.

use std::{
    path::PathBuf,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use reqwest::Url;
use teloxide::{
    prelude::*,
    types::{InputFile, InputMedia, InputMediaDocument, ParseMode},
    ApiError, RequestError,
};

use buildpost_core::{
    config::DeliveryConfig,
    domain::ChatTarget,
    errors::Error,
    ports::{
        Attachment, Backend, BotIdentity, Credentials, DeliveryCapabilities, ResolvedChat,
        Session,
    },
    session::SessionCache,
    Result,
};

/// Bot API limits for `sendMediaGroup` and media captions.
const MAX_ALBUM_SIZE: usize = 10;
const MAX_CAPTION_LEN: usize = 1024;

#[derive(Clone, Debug)]
pub struct TelegramBackend {
    api_url: Option<Url>,
    request_timeout: Duration,
    cache: Option<SessionCache>,
}

impl TelegramBackend {
    pub fn new(cfg: &DeliveryConfig) -> Self {
        Self {
            api_url: cfg.api_url.clone(),
            request_timeout: cfg.request_timeout,
            cache: cfg.session_file.clone().map(SessionCache::new),
        }
    }

    fn build_bot(&self, token: &str) -> Result<Bot> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client build failed: {e}")))?;

        let bot = Bot::with_client(token, client);
        Ok(match &self.api_url {
            Some(url) => bot.set_api_url(url.clone()),
            None => bot,
        })
    }
}

#[async_trait]
impl Backend for TelegramBackend {
    async fn connect(&self, creds: &Credentials) -> Result<Box<dyn Session>> {
        if let Some(url) = &self.api_url {
            tracing::info!(api_url = %url, api_id = ?creds.api_id, "using self-hosted bot api server");
        }

        let bot = self.build_bot(&creds.bot_token)?;

        let cached = self
            .cache
            .as_ref()
            .and_then(|cache| cache.load(&creds.bot_token));
        let from_cache = cached.is_some();

        let identity = match cached {
            Some(identity) => {
                tracing::debug!(bot = %identity.username, "reusing cached session");
                identity
            }
            None => {
                let me = bot.get_me().await.map_err(map_auth_err)?;
                BotIdentity {
                    id: me.user.id.0,
                    username: me.user.username.clone().unwrap_or_default(),
                }
            }
        };

        Ok(Box::new(TelegramSession {
            bot,
            identity,
            token: creds.bot_token.clone(),
            cache: self.cache.clone(),
            from_cache,
            invalidated: AtomicBool::new(false),
        }))
    }
}

pub struct TelegramSession {
    bot: Bot,
    identity: BotIdentity,
    token: String,
    cache: Option<SessionCache>,
    from_cache: bool,
    invalidated: AtomicBool,
}

impl TelegramSession {
    fn tg_chat(target: ChatTarget) -> teloxide::types::ChatId {
        teloxide::types::ChatId(target.0)
    }

    /// A cached identity is only trusted until the backend rejects the token.
    fn invalidate_cache(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.clear() {
                tracing::warn!(path = %cache.path().display(), error = %e, "failed to clear session cache");
            }
        }
    }

    fn map_send_err(&self, e: RequestError) -> Error {
        if is_auth_failure(&e) {
            if self.from_cache {
                self.invalidate_cache();
            }
            return Error::Auth(format!("bot token rejected: {e}"));
        }
        Error::Delivery(format!("telegram error: {e}"))
    }
}

#[async_trait]
impl Session for TelegramSession {
    fn identity(&self) -> &BotIdentity {
        &self.identity
    }

    fn capabilities(&self) -> DeliveryCapabilities {
        DeliveryCapabilities {
            max_files_per_message: MAX_ALBUM_SIZE,
            max_caption_len: MAX_CAPTION_LEN,
        }
    }

    async fn resolve_chat(&self, target: ChatTarget) -> Result<ResolvedChat> {
        let chat = self
            .bot
            .get_chat(Self::tg_chat(target))
            .await
            .map_err(|e| {
                if is_auth_failure(&e) {
                    return self.map_send_err(e);
                }
                Error::Resolution {
                    chat_id: target.0,
                    reason: e.to_string(),
                }
            })?;

        Ok(ResolvedChat {
            target: ChatTarget(chat.id.0),
            title: chat.title().map(str::to_string),
        })
    }

    async fn send_attachment(&self, attachment: Attachment<'_>) -> Result<()> {
        let chat = Self::tg_chat(attachment.target);
        let thread = attachment.thread.thread_id();

        match attachment.files {
            [] => Ok(()),
            [file] => {
                let mut req = self.bot.send_document(chat, InputFile::file(file.clone()));
                if let Some(caption) = attachment.caption_html {
                    req = req.caption(caption.to_string()).parse_mode(ParseMode::Html);
                }
                if let Some(id) = thread {
                    req = req.message_thread_id(id);
                }
                req.await.map_err(|e| self.map_send_err(e))?;
                Ok(())
            }
            files => {
                let mut req = self
                    .bot
                    .send_media_group(chat, album(files, attachment.caption_html));
                if let Some(id) = thread {
                    req = req.message_thread_id(id);
                }
                req.await.map_err(|e| self.map_send_err(e))?;
                Ok(())
            }
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        if self.invalidated.load(Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(cache) = &self.cache {
            cache.store(&self.token, &self.identity)?;
        }
        Ok(())
    }
}

/// Documents for one `sendMediaGroup` call. The caption rides on the first
/// item, which Telegram shows as the album caption.
fn album(files: &[PathBuf], caption_html: Option<&str>) -> Vec<InputMedia> {
    files
        .iter()
        .enumerate()
        .map(|(idx, path)| {
            let mut doc = InputMediaDocument::new(InputFile::file(path.clone()));
            if idx == 0 {
                if let Some(caption) = caption_html {
                    doc = doc.caption(caption.to_string()).parse_mode(ParseMode::Html);
                }
            }
            InputMedia::Document(doc)
        })
        .collect()
}

fn is_auth_failure(e: &RequestError) -> bool {
    match e {
        // teloxide reports the API's "Unauthorized" as `NotFound`.
        RequestError::Api(ApiError::NotFound) => true,
        // Malformed tokens hit a non-existent bot endpoint.
        RequestError::Api(ApiError::Unknown(desc)) => desc.contains("Not Found"),
        _ => false,
    }
}

fn map_auth_err(e: RequestError) -> Error {
    if is_auth_failure(&e) {
        Error::Auth(format!("bot token rejected: {e}"))
    } else {
        Error::Delivery(format!("telegram error: {e}"))
    }
}
