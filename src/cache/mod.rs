//! Shared key-value cache for published datasets.
//!
//! Writers follow a rotate-then-write discipline per key (delete the stale
//! backup, rename current to backup, write the new value), keeping exactly
//! one generation of rollback history. The rotation is not transactional
//! across keys; the global `data_timestamp`, committed last and only on
//! full batch success, is the consistency barrier readers rely on.

mod memory;
mod postgres;

use anyhow::Context;
use chrono::NaiveDateTime;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use memory::MemoryCache;
pub use postgres::PostgresCache;

use crate::config::CacheSettings;
use crate::model::AreaLevel;

/// Timestamp format stored under `data_timestamp`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Cache key layout.
pub mod keys {
    use super::AreaLevel;

    pub const DATA_TIMESTAMP: &str = "data_timestamp";
    pub const WEEKLY: &str = "CasesWeekly";
    pub const SUMMARY: &str = "CasesSummary";
    /// Prefix matching every per-(level, month) daily key and nothing
    /// else; backups carry the `Old.` prefix and never match.
    pub const DAILY_PREFIX: &str = "Cases.";

    /// Key for one month of daily records at one hierarchy level.
    pub fn daily(level: AreaLevel, month: &str) -> String {
        format!("{DAILY_PREFIX}{level}.{month}")
    }

    /// Backup key holding the previous generation of `key`.
    pub fn backup(key: &str) -> String {
        format!("Old.{key}")
    }
}

/// Serializes a record slice for storage.
pub fn encode<T: Serialize>(records: &[T]) -> anyhow::Result<Vec<u8>> {
    serde_json::to_vec(records).context("Failed to serialize records")
}

/// Deserializes a stored record blob.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> anyhow::Result<Vec<T>> {
    serde_json::from_slice(bytes).context("Failed to deserialize records")
}

/// Key-value store handle passed into every component that publishes or
/// reads datasets. Never a hidden process-wide singleton.
pub enum CacheStore {
    Postgres(PostgresCache),
    Memory(MemoryCache),
}

impl CacheStore {
    /// Connects to PostgreSQL and applies the cache schema.
    pub async fn connect(settings: &CacheSettings) -> anyhow::Result<Self> {
        let cache = PostgresCache::new(settings).await?;
        cache.migrate().await?;
        Ok(Self::Postgres(cache))
    }

    pub fn in_memory() -> Self {
        Self::Memory(MemoryCache::new())
    }

    pub async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        match self {
            Self::Postgres(c) => c.get(key).await,
            Self::Memory(c) => Ok(c.get(key).await),
        }
    }

    pub async fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        match self {
            Self::Postgres(c) => c.set(key, value).await,
            Self::Memory(c) => {
                c.set(key, value).await;
                Ok(())
            }
        }
    }

    pub async fn delete(&self, key: &str) -> anyhow::Result<()> {
        match self {
            Self::Postgres(c) => c.delete(key).await,
            Self::Memory(c) => {
                c.delete(key).await;
                Ok(())
            }
        }
    }

    pub async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        match self {
            Self::Postgres(c) => c.exists(key).await,
            Self::Memory(c) => Ok(c.exists(key).await),
        }
    }

    pub async fn rename(&self, from: &str, to: &str) -> anyhow::Result<()> {
        match self {
            Self::Postgres(c) => c.rename(from, to).await,
            Self::Memory(c) => {
                c.rename(from, to).await;
                Ok(())
            }
        }
    }

    pub async fn keys_with_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        match self {
            Self::Postgres(c) => c.keys_with_prefix(prefix).await,
            Self::Memory(c) => Ok(c.keys_with_prefix(prefix).await),
        }
    }

    /// Publishes a value under `key`, first rotating any current value to
    /// its `Old.` backup. At most one backup generation is kept.
    pub async fn publish_rotating(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        let backup = keys::backup(key);

        if self.exists(&backup).await? {
            self.delete(&backup).await?;
        }
        if self.exists(key).await? {
            self.rename(key, &backup).await?;
        }
        self.set(key, value).await
    }

    /// Timestamp of the currently published data generation. A missing
    /// key or unreachable store reads as an epoch-equivalent default, so
    /// any real upstream timestamp counts as newer.
    pub async fn read_timestamp(&self) -> NaiveDateTime {
        match self.get(keys::DATA_TIMESTAMP).await {
            Ok(Some(raw)) => {
                let text = String::from_utf8_lossy(&raw);
                match NaiveDateTime::parse_from_str(&text, TIMESTAMP_FORMAT) {
                    Ok(ts) => ts,
                    Err(e) => {
                        warn!("Invalid stored data_timestamp {text:?}: {e}");
                        default_timestamp()
                    }
                }
            }
            Ok(None) => default_timestamp(),
            Err(e) => {
                warn!("Unable to read data_timestamp, using default: {e}");
                default_timestamp()
            }
        }
    }

    /// Commits a new data generation timestamp. This is the last write of
    /// a successful batch run and the signal consumers reload on.
    pub async fn write_timestamp(&self, timestamp: NaiveDateTime) -> anyhow::Result<()> {
        let text = timestamp.format(TIMESTAMP_FORMAT).to_string();
        self.set(keys::DATA_TIMESTAMP, text.as_bytes()).await
    }
}

fn default_timestamp() -> NaiveDateTime {
    NaiveDateTime::parse_from_str("1970-01-01 12:00:00", TIMESTAMP_FORMAT).unwrap_or_default()
}
