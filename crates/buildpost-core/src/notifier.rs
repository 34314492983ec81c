//! Artifact delivery: authenticate, resolve the destination, send, release.

use std::{future::Future, time::Duration};

use tokio::time::{timeout_at, Instant};

use crate::{
    batch::FileBatch,
    config::DeliveryConfig,
    domain::ChatTarget,
    errors::Error,
    formatting::visible_len,
    ports::{Attachment, Backend, Session},
    Result,
};

pub const NO_FILES_NOTICE: &str = "No files to upload";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryResult {
    /// Nothing to send; no session was opened.
    Skipped { notice: String },
    Sent {
        files: usize,
        messages: usize,
        target: ChatTarget,
    },
}

/// Deliver `batch` to the configured chat in a single attempt.
///
/// The session is closed on every path once it has been opened. A failure to
/// close after a successful send is logged and does not fail the delivery.
pub async fn deliver(
    batch: &FileBatch,
    cfg: &DeliveryConfig,
    backend: &dyn Backend,
) -> Result<DeliveryResult> {
    if batch.is_empty() {
        return Ok(DeliveryResult::Skipped {
            notice: NO_FILES_NOTICE.to_string(),
        });
    }

    let deadline = cfg.timeout.map(|t| Instant::now() + t);

    let session = within(deadline, cfg.timeout, backend.connect(&cfg.credentials())).await?;
    tracing::info!(
        bot = %session.identity().username,
        bot_id = session.identity().id,
        "authenticated"
    );

    let outcome = within(deadline, cfg.timeout, send_batch(session.as_ref(), batch, cfg)).await;
    let released = session.close().await;

    let result = outcome?;
    if let Err(e) = released {
        tracing::warn!(error = %e, "failed to release session");
    }
    Ok(result)
}

async fn send_batch(
    session: &dyn Session,
    batch: &FileBatch,
    cfg: &DeliveryConfig,
) -> Result<DeliveryResult> {
    let target = resolve_target(session, cfg.chat).await?;
    let caps = session.capabilities();
    let caption_html = cfg.caption.as_deref();
    if let Some(html) = caption_html {
        let len = visible_len(html);
        if len > caps.max_caption_len {
            tracing::warn!(len, limit = caps.max_caption_len, "caption exceeds backend limit");
        }
    }

    let mut messages = 0usize;
    for (idx, files) in batch.chunks(caps.max_files_per_message).enumerate() {
        tracing::debug!(chunk = idx, files = files.len(), "sending attachment");
        session
            .send_attachment(Attachment {
                target,
                thread: cfg.thread,
                files,
                caption_html: if idx == 0 { caption_html } else { None },
            })
            .await?;
        messages += 1;
    }

    Ok(DeliveryResult::Sent {
        files: batch.len(),
        messages,
        target,
    })
}

/// Look the chat up, falling back to the configured id when the backend
/// cannot resolve it. A rejected token is not a lookup failure and aborts.
async fn resolve_target(session: &dyn Session, chat: ChatTarget) -> Result<ChatTarget> {
    match session.resolve_chat(chat).await {
        Ok(resolved) => {
            tracing::info!(
                chat = %resolved.target,
                title = resolved.title.as_deref().unwrap_or(""),
                "resolved destination"
            );
            Ok(resolved.target)
        }
        Err(e @ Error::Auth(_)) => Err(e),
        Err(e) => {
            tracing::warn!(chat = %chat, error = %e, "destination lookup failed, using raw id");
            Ok(chat)
        }
    }
}

async fn within<T>(
    deadline: Option<Instant>,
    budget: Option<Duration>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    let Some(deadline) = deadline else {
        return fut.await;
    };
    match timeout_at(deadline, fut).await {
        Ok(res) => res,
        Err(_) => Err(Error::Delivery(format!(
            "timed out after {}s",
            budget.unwrap_or_default().as_secs()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        path::PathBuf,
        sync::{Arc, Mutex},
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        domain::ThreadSpec,
        ports::{BotIdentity, Credentials, DeliveryCapabilities, ResolvedChat},
    };

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Call {
        Connect,
        Resolve(i64),
        Send {
            target: i64,
            thread: ThreadSpec,
            files: usize,
            caption: Option<String>,
        },
        Close,
    }

    #[derive(Clone, Default)]
    struct FakeBackend {
        calls: Arc<Mutex<Vec<Call>>>,
        reject_token: bool,
        fail_resolve: bool,
        reject_on_resolve: bool,
        fail_send: bool,
        send_delay: Option<Duration>,
    }

    impl FakeBackend {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    struct FakeSession {
        backend: FakeBackend,
        identity: BotIdentity,
    }

    #[async_trait]
    impl Backend for FakeBackend {
        async fn connect(&self, creds: &Credentials) -> Result<Box<dyn Session>> {
            self.record(Call::Connect);
            if self.reject_token {
                return Err(Error::Auth(format!(
                    "token rejected ({} chars)",
                    creds.bot_token.len()
                )));
            }
            Ok(Box::new(FakeSession {
                backend: self.clone(),
                identity: BotIdentity {
                    id: 7,
                    username: "fake_bot".to_string(),
                },
            }))
        }
    }

    #[async_trait]
    impl Session for FakeSession {
        fn identity(&self) -> &BotIdentity {
            &self.identity
        }

        fn capabilities(&self) -> DeliveryCapabilities {
            DeliveryCapabilities {
                max_files_per_message: 10,
                max_caption_len: 1024,
            }
        }

        async fn resolve_chat(&self, target: ChatTarget) -> Result<ResolvedChat> {
            self.backend.record(Call::Resolve(target.0));
            if self.backend.reject_on_resolve {
                return Err(Error::Auth("token revoked".to_string()));
            }
            if self.backend.fail_resolve {
                return Err(Error::Resolution {
                    chat_id: target.0,
                    reason: "chat not found".to_string(),
                });
            }
            Ok(ResolvedChat {
                target,
                title: Some("CI".to_string()),
            })
        }

        async fn send_attachment(&self, attachment: Attachment<'_>) -> Result<()> {
            if let Some(d) = self.backend.send_delay {
                tokio::time::sleep(d).await;
            }
            self.backend.record(Call::Send {
                target: attachment.target.0,
                thread: attachment.thread,
                files: attachment.files.len(),
                caption: attachment.caption_html.map(str::to_string),
            });
            if self.backend.fail_send {
                return Err(Error::Delivery("upload failed".to_string()));
            }
            Ok(())
        }

        async fn close(self: Box<Self>) -> Result<()> {
            self.backend.record(Call::Close);
            Ok(())
        }
    }

    fn config(pairs: &[(&str, &str)]) -> DeliveryConfig {
        let mut map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        map.entry("BOT_TOKEN".to_string())
            .or_insert_with(|| "1:token".to_string());
        map.entry("CHAT_ID".to_string())
            .or_insert_with(|| "12345".to_string());
        map.insert("SESSION_FILE".to_string(), String::new());
        DeliveryConfig::from_lookup(|k| map.get(k).cloned()).unwrap()
    }

    fn batch(n: usize) -> FileBatch {
        FileBatch::from_paths(
            (0..n)
                .map(|i| PathBuf::from(format!("/tmp/artifact-{i}.apk")))
                .collect(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn empty_batch_skips_without_authenticating() {
        let backend = FakeBackend::default();
        let res = deliver(&FileBatch::default(), &config(&[]), &backend)
            .await
            .unwrap();
        assert_eq!(
            res,
            DeliveryResult::Skipped {
                notice: NO_FILES_NOTICE.to_string()
            }
        );
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn delivers_single_artifact_with_rendered_caption() {
        let backend = FakeBackend::default();
        let cfg = config(&[
            ("CHAT_ID", "12345"),
            ("NEW_VERSION", "2.1"),
            ("BUILD_TIME", "2024-01-01T00:00"),
        ]);
        let batch = FileBatch::from_paths(vec![PathBuf::from("/tmp/a.apk")]).unwrap();

        let res = deliver(&batch, &cfg, &backend).await.unwrap();
        assert_eq!(
            res,
            DeliveryResult::Sent {
                files: 1,
                messages: 1,
                target: ChatTarget(-10012345),
            }
        );

        let calls = backend.calls();
        assert_eq!(calls[0], Call::Connect);
        assert_eq!(calls[1], Call::Resolve(-10012345));
        let Call::Send {
            target,
            thread,
            files,
            caption: Some(caption),
        } = &calls[2]
        else {
            panic!("expected a captioned send, got {:?}", calls[2]);
        };
        assert_eq!(*target, -10012345);
        assert_eq!(*thread, ThreadSpec::UseDefault);
        assert_eq!(*files, 1);
        assert!(caption.contains("<code>2.1</code>"));
        assert!(caption.contains("<code>2024-01-01T00:00</code>"));
        assert_eq!(calls[3], Call::Close);
    }

    #[tokio::test]
    async fn malformed_thread_id_posts_to_main_conversation() {
        let backend = FakeBackend::default();
        let cfg = config(&[("MESSAGE_THREAD_ID", "not-a-number")]);
        deliver(&batch(1), &cfg, &backend).await.unwrap();

        assert!(backend.calls().iter().any(|c| matches!(
            c,
            Call::Send {
                thread: ThreadSpec::UseDefault,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn topic_id_is_forwarded() {
        let backend = FakeBackend::default();
        let cfg = config(&[("MSGID", "99")]);
        deliver(&batch(2), &cfg, &backend).await.unwrap();

        assert!(backend.calls().iter().any(|c| matches!(
            c,
            Call::Send {
                thread: ThreadSpec::Thread(99),
                files: 2,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn resolution_failure_falls_back_to_raw_id() {
        let backend = FakeBackend {
            fail_resolve: true,
            ..FakeBackend::default()
        };
        let res = deliver(&batch(1), &config(&[]), &backend).await.unwrap();
        assert!(matches!(
            res,
            DeliveryResult::Sent {
                target: ChatTarget(-10012345),
                ..
            }
        ));
        assert_eq!(backend.calls().last(), Some(&Call::Close));
    }

    #[tokio::test]
    async fn token_rejected_during_lookup_aborts_without_sending() {
        let backend = FakeBackend {
            reject_on_resolve: true,
            ..FakeBackend::default()
        };
        let err = deliver(&batch(1), &config(&[]), &backend)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert_eq!(
            backend.calls(),
            vec![Call::Connect, Call::Resolve(-10012345), Call::Close]
        );
    }

    #[tokio::test]
    async fn rejected_token_is_auth_error_before_any_send() {
        let backend = FakeBackend {
            reject_token: true,
            ..FakeBackend::default()
        };
        let err = deliver(&batch(1), &config(&[]), &backend)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert_eq!(backend.calls(), vec![Call::Connect]);
    }

    #[tokio::test]
    async fn send_failure_still_releases_session() {
        let backend = FakeBackend {
            fail_send: true,
            ..FakeBackend::default()
        };
        let err = deliver(&batch(3), &config(&[]), &backend)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Delivery(_)));
        assert_eq!(backend.calls().last(), Some(&Call::Close));
    }

    #[tokio::test]
    async fn large_batches_are_split_into_albums() {
        let backend = FakeBackend::default();
        let res = deliver(&batch(23), &config(&[]), &backend).await.unwrap();
        assert!(matches!(
            res,
            DeliveryResult::Sent {
                files: 23,
                messages: 3,
                ..
            }
        ));

        let sends = backend
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Send { files, caption, .. } => Some((files, caption.is_some())),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(sends, vec![(10, true), (10, false), (3, false)]);
    }

    #[tokio::test]
    async fn disabled_caption_sends_bare_files() {
        let backend = FakeBackend::default();
        deliver(&batch(1), &config(&[("CAPTION_TEMPLATE", "")]), &backend)
            .await
            .unwrap();
        assert!(backend
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Send { caption: None, .. })));
    }

    #[tokio::test]
    async fn deadline_expiry_is_delivery_error_and_releases_session() {
        let backend = FakeBackend {
            send_delay: Some(Duration::from_secs(10)),
            ..FakeBackend::default()
        };
        let mut cfg = config(&[]);
        cfg.timeout = Some(Duration::from_millis(50));

        let err = deliver(&batch(1), &cfg, &backend).await.unwrap_err();
        assert!(matches!(err, Error::Delivery(ref m) if m.contains("timed out")));
        assert_eq!(backend.calls().last(), Some(&Call::Close));
    }
}
