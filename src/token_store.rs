use crate::error::GexError;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// -----------------------------------------------
// TOKEN CACHE RECORD
// -----------------------------------------------

/// The single row held by the local token cache. Field names match the
/// cache format the interactive auth flow writes, so a cache produced
/// there is readable here unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token_issued_at: DateTime<Utc>,
    pub refresh_token_issued_at: DateTime<Utc>,
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub id_token: String,
    pub expires_in: i64,
    pub token_type: String,
    pub scope: String,
}

// -----------------------------------------------
// LOCAL TOKEN CACHE
// -----------------------------------------------

/// A one-record JSON file holding the most recent credential bundle.
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when no record has been written yet. A malformed file is NOT
    /// empty: an existing cache always wins over external seeding, even
    /// one we cannot parse.
    pub fn is_empty(&self) -> bool {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => text.trim().is_empty(),
            Err(_) => true,
        }
    }

    /// Read the cached record, if any.
    pub fn load(&self) -> Result<Option<TokenRecord>> {
        if self.is_empty() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read token cache {}", self.path.display()))?;
        let record = serde_json::from_str(&text)
            .map_err(GexError::from)
            .with_context(|| format!("Failed to parse token cache {}", self.path.display()))?;
        Ok(Some(record))
    }

    /// Write the record, replacing whatever is there.
    pub fn save(&self, record: &TokenRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create token cache directory {}", parent.display())
                })?;
            }
        }
        let text = serde_json::to_string_pretty(record)?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("Failed to write token cache {}", self.path.display()))?;
        Ok(())
    }

    // -----------------------------------------------
    // CREDENTIAL STORE BRIDGE
    // -----------------------------------------------

    /// One-time seeding of the local cache from an externally supplied
    /// bundle. Writes only when the cache is empty; an existing record
    /// always wins since it may be fresher than the external copy. A
    /// `None` bundle is the expected case for interactive deployments and
    /// is a silent no-op. Returns whether a write happened.
    pub fn seed_if_empty(&self, bundle: Option<&TokenRecord>) -> Result<bool> {
        let Some(bundle) = bundle else {
            return Ok(false);
        };
        if !self.is_empty() {
            tracing::debug!(path = %self.path.display(), "token cache already populated, not seeding");
            return Ok(false);
        }
        self.save(bundle)?;
        tracing::info!(path = %self.path.display(), "token cache seeded from external bundle");
        Ok(true)
    }
}

/// Assemble an external credential bundle from `SCHWAB_*` environment
/// variables. Returns `None` unless both tokens are present — absence of
/// cloud secrets is normal, not an error.
pub fn bundle_from_env() -> Option<TokenRecord> {
    let access_token = std::env::var("SCHWAB_ACCESS_TOKEN")
        .ok()
        .filter(|t| !t.is_empty())?;
    let refresh_token = std::env::var("SCHWAB_REFRESH_TOKEN")
        .ok()
        .filter(|t| !t.is_empty())?;

    let now = Utc::now();
    let access_token_issued_at = env_datetime("SCHWAB_ACCESS_TOKEN_ISSUED_AT").unwrap_or(now);
    let refresh_token_issued_at = env_datetime("SCHWAB_REFRESH_TOKEN_ISSUED_AT").unwrap_or(now);

    Some(TokenRecord {
        access_token_issued_at,
        refresh_token_issued_at,
        access_token,
        refresh_token,
        id_token: std::env::var("SCHWAB_ID_TOKEN").unwrap_or_default(),
        expires_in: std::env::var("SCHWAB_EXPIRES_IN")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(crate::config::TOKEN_DEFAULT_LIFETIME_SECS),
        token_type: std::env::var("SCHWAB_TOKEN_TYPE").unwrap_or_else(|_| "Bearer".to_string()),
        scope: std::env::var("SCHWAB_TOKEN_SCOPE").unwrap_or_else(|_| "api".to_string()),
    })
}

fn env_datetime(key: &str) -> Option<DateTime<Utc>> {
    std::env::var(key)
        .ok()
        .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> TokenStore {
        let path = std::env::temp_dir().join(format!(
            "gex-token-store-{}-{}.json",
            std::process::id(),
            name
        ));
        let _ = std::fs::remove_file(&path);
        TokenStore::new(path)
    }

    fn bundle(tag: &str) -> TokenRecord {
        TokenRecord {
            access_token_issued_at: Utc::now(),
            refresh_token_issued_at: Utc::now(),
            access_token: format!("access-{}", tag),
            refresh_token: format!("refresh-{}", tag),
            id_token: String::new(),
            expires_in: 1800,
            token_type: "Bearer".to_string(),
            scope: "api".to_string(),
        }
    }

    #[test]
    fn test_load_absent_cache_is_none() {
        let store = temp_store("absent");
        assert!(store.is_empty());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_load_round_trip() {
        let store = temp_store("roundtrip");
        let record = bundle("a");
        store.save(&record).unwrap();
        assert!(!store.is_empty());
        assert_eq!(store.load().unwrap().unwrap(), record);
        let _ = std::fs::remove_file(store.path());
    }

    #[test]
    fn test_seed_only_when_empty() {
        let store = temp_store("seed");
        let first = bundle("first");
        let second = bundle("second");

        assert!(store.seed_if_empty(Some(&first)).unwrap());
        // Second seed with a different bundle: existing row untouched
        assert!(!store.seed_if_empty(Some(&second)).unwrap());
        assert_eq!(store.load().unwrap().unwrap(), first);
        let _ = std::fs::remove_file(store.path());
    }

    #[test]
    fn test_seed_without_bundle_is_noop() {
        let store = temp_store("noop");
        assert!(!store.seed_if_empty(None).unwrap());
        assert!(store.is_empty());
    }
}
