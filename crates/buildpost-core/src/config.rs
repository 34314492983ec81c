use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use reqwest::Url;

use crate::{
    caption::{self, CaptionVars},
    domain::{parse_chat_target, parse_thread_id, ChatTarget, ThreadSpec},
    errors::Error,
    ports::Credentials,
    Result,
};

const BOT_TOKEN_KEYS: &[&str] = &["BOT_TOKEN", "BOTTOKEN", "TELEGRAM_BOT_TOKEN"];
const THREAD_ID_KEYS: &[&str] = &["MESSAGE_THREAD_ID", "MSGID"];
const CAPTION_KEYS: &[&str] = &["CAPTION_TEMPLATE", "CAPTION"];
const SESSION_FILE_NAME: &str = "buildpost-session.json";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Immutable delivery configuration, built once at startup.
#[derive(Clone)]
pub struct DeliveryConfig {
    // Credentials
    pub api_id: Option<i64>,
    pub api_hash: Option<String>,
    pub bot_token: String,

    // Destination
    pub chat: ChatTarget,
    pub thread: ThreadSpec,

    /// Caption as Telegram HTML; `None` sends the files bare.
    pub caption: Option<String>,

    // Backend client
    pub api_url: Option<Url>,
    pub session_file: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub request_timeout: Duration,
}

impl DeliveryConfig {
    /// Load from the process environment, reading `.env` first if present.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key);
        let first = |keys: &[&str]| keys.iter().find_map(|k| lookup(k));

        // Required
        let bot_token = first(BOT_TOKEN_KEYS)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        if bot_token.is_empty() {
            return Err(Error::Config(
                "BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let chat_raw = get("CHAT_ID").unwrap_or_default();
        let chat = parse_chat_target(&chat_raw)?;
        let thread = parse_thread_id(first(THREAD_ID_KEYS).as_deref());

        // Application credentials (only needed by self-hosted Bot API servers)
        let api_id = match get("API_ID").and_then(non_empty) {
            Some(raw) => Some(raw.trim().parse::<i64>().map_err(|_| {
                Error::Config(format!("API_ID must be numeric, got {raw:?}"))
            })?),
            None => None,
        };
        let api_hash = get("API_HASH").and_then(non_empty);

        let api_url = match get("BOT_API_URL").and_then(non_empty) {
            Some(raw) => Some(
                Url::parse(raw.trim())
                    .map_err(|e| Error::Config(format!("BOT_API_URL is invalid: {e}")))?,
            ),
            None => None,
        };
        if api_url.is_some() && (api_id.is_none() || api_hash.is_none()) {
            return Err(Error::Config(
                "API_ID and API_HASH are required when BOT_API_URL is set".to_string(),
            ));
        }

        // Caption
        let vars = CaptionVars::new(get("MODULE_NAME"), get("NEW_VERSION"), get("BUILD_TIME"));
        let caption = match first(CAPTION_KEYS) {
            Some(t) if t.trim().is_empty() => None,
            Some(t) => Some(caption::render(&t, &vars)),
            None => Some(caption::render(caption::DEFAULT_TEMPLATE, &vars)),
        };

        // Session cache: unset means "next to the executable", empty disables it.
        let session_file = match get("SESSION_FILE") {
            Some(p) if p.trim().is_empty() => None,
            Some(p) => Some(PathBuf::from(p.trim())),
            None => default_session_file(),
        };

        let timeout = parse_secs(get("DELIVERY_TIMEOUT_SECS"), "DELIVERY_TIMEOUT_SECS")?;
        let request_timeout = parse_secs(get("REQUEST_TIMEOUT_SECS"), "REQUEST_TIMEOUT_SECS")?
            .unwrap_or(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));

        Ok(Self {
            api_id,
            api_hash,
            bot_token,
            chat,
            thread,
            caption,
            api_url,
            session_file,
            timeout,
            request_timeout,
        })
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            api_id: self.api_id,
            api_hash: self.api_hash.clone(),
            bot_token: self.bot_token.clone(),
        }
    }
}

impl fmt::Debug for DeliveryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryConfig")
            .field("api_id", &self.api_id)
            .field("api_hash", &self.api_hash.as_ref().map(|_| "<redacted>"))
            .field("bot_token", &"<redacted>")
            .field("chat", &self.chat)
            .field("thread", &self.thread)
            .field("caption", &self.caption)
            .field("api_url", &self.api_url)
            .field("session_file", &self.session_file)
            .field("timeout", &self.timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn default_session_file() -> Option<PathBuf> {
    let exe = env::current_exe().ok()?;
    Some(exe.parent()?.join(SESSION_FILE_NAME))
}

fn parse_secs(raw: Option<String>, key: &str) -> Result<Option<Duration>> {
    let Some(raw) = raw.and_then(non_empty) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Ok(None),
        Ok(secs) => Ok(Some(Duration::from_secs(secs))),
        Err(_) => Err(Error::Config(format!(
            "{key} must be a whole number of seconds, got {raw:?}"
        ))),
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = &val[1..val.len() - 1];
        }
        out.push((key.to_string(), val.to_string()));
    }
    out
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
