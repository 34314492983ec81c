use std::fmt;

use crate::{errors::Error, Result};

/// Prefix the Bot API uses to address supergroups and channels.
pub const CHANNEL_PREFIX: &str = "-100";

/// Telegram chat id in its canonical `-100<digits>` form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatTarget(pub i64);

impl fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Forum topic addressing for the outgoing message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadSpec {
    Thread(i32),
    /// Post to the main conversation.
    UseDefault,
}

impl ThreadSpec {
    pub fn thread_id(self) -> Option<i32> {
        match self {
            ThreadSpec::Thread(id) => Some(id),
            ThreadSpec::UseDefault => None,
        }
    }
}

/// Bring a configured chat id into canonical channel form.
///
/// Ids that already carry the prefix are returned unchanged; anything else has
/// its sign stripped and the prefix prepended. The prefix itself is negative,
/// so a negative input ends up with exactly one leading `-`.
pub fn normalize_chat_id(raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::Config("CHAT_ID is required".to_string()));
    }

    let normalized = if raw.starts_with(CHANNEL_PREFIX) {
        raw.to_string()
    } else {
        let digits = raw
            .strip_prefix('-')
            .or_else(|| raw.strip_prefix('+'))
            .unwrap_or(raw);
        format!("{CHANNEL_PREFIX}{digits}")
    };

    normalized
        .parse::<i64>()
        .map_err(|_| Error::Config(format!("CHAT_ID is not a valid chat id: {raw:?}")))?;

    Ok(normalized)
}

/// Normalize and parse a chat id into a [`ChatTarget`].
pub fn parse_chat_target(raw: &str) -> Result<ChatTarget> {
    let normalized = normalize_chat_id(raw)?;
    let id = normalized
        .parse::<i64>()
        .map_err(|_| Error::Config(format!("CHAT_ID is not a valid chat id: {raw:?}")))?;
    Ok(ChatTarget(id))
}

/// Same as [`parse_chat_target`] for ids that arrive as integers.
pub fn chat_target_from_i64(raw: i64) -> Result<ChatTarget> {
    parse_chat_target(&raw.to_string())
}

/// Parse an optional topic id. Blank, malformed and non-positive values all
/// mean "no topic".
pub fn parse_thread_id(raw: Option<&str>) -> ThreadSpec {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return ThreadSpec::UseDefault;
    };

    match raw.parse::<i32>() {
        Ok(id) if id > 0 => ThreadSpec::Thread(id),
        Ok(id) => {
            tracing::warn!(thread_id = id, "ignoring non-positive message thread id");
            ThreadSpec::UseDefault
        }
        Err(e) => {
            tracing::warn!(thread_id = raw, error = %e, "ignoring malformed message thread id");
            ThreadSpec::UseDefault
        }
    }
}
