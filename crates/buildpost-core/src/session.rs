//! On-disk cache of the authenticated bot identity.
//!
//! Lets repeated CI runs skip the identity round-trip. The cache is keyed by a
//! SHA-256 fingerprint of the token and never stores the token itself.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{ports::BotIdentity, Result};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
struct CachedSession {
    token_fingerprint: String,
    bot_id: u64,
    bot_username: String,
    authenticated_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct SessionCache {
    path: PathBuf,
}

impl SessionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached identity for `token`, if any. Missing, unreadable or foreign
    /// caches all read as a miss.
    pub fn load(&self, token: &str) -> Option<BotIdentity> {
        let text = fs::read_to_string(&self.path).ok()?;
        let cached: CachedSession = match serde_json::from_str(&text) {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "ignoring corrupt session cache");
                return None;
            }
        };
        if cached.token_fingerprint != fingerprint(token) {
            return None;
        }
        Some(BotIdentity {
            id: cached.bot_id,
            username: cached.bot_username,
        })
    }

    pub fn store(&self, token: &str, identity: &BotIdentity) -> Result<()> {
        let cached = CachedSession {
            token_fingerprint: fingerprint(token),
            bot_id: identity.id,
            bot_username: identity.username.clone(),
            authenticated_at: Utc::now(),
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&cached)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tmp(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_nanos();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}"))
    }

    fn bot() -> BotIdentity {
        BotIdentity {
            id: 42,
            username: "ci_bot".to_string(),
        }
    }

    #[test]
    fn store_then_load_same_token() {
        let dir = tmp("buildpost-session");
        let cache = SessionCache::new(dir.join("nested").join("session.json"));

        assert_eq!(cache.load("1:abc"), None);
        cache.store("1:abc", &bot()).unwrap();
        assert_eq!(cache.load("1:abc"), Some(bot()));

        let raw = fs::read_to_string(cache.path()).unwrap();
        assert!(!raw.contains("1:abc"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn other_token_misses() {
        let dir = tmp("buildpost-session-other");
        let cache = SessionCache::new(dir.join("session.json"));
        cache.store("1:abc", &bot()).unwrap();
        assert_eq!(cache.load("2:def"), None);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_cache_is_a_miss_and_clear_is_idempotent() {
        let dir = tmp("buildpost-session-corrupt");
        fs::create_dir_all(&dir).unwrap();
        let cache = SessionCache::new(dir.join("session.json"));
        fs::write(cache.path(), b"{not json").unwrap();

        assert_eq!(cache.load("1:abc"), None);
        cache.clear().unwrap();
        cache.clear().unwrap();
        assert!(!cache.path().exists());

        let _ = fs::remove_dir_all(&dir);
    }
}
