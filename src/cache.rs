//! Shared answer cache
//!
//! Answers to text-only questions are stored in a remote key-value store
//! under `drona_chat_cache/<key>` and served for seven days. The cache is
//! an optimization: reads fail open, writes are detached and best-effort.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Namespace of chat answers in the store
pub const CHAT_NAMESPACE: &str = "drona_chat_cache";

/// An answer is served from cache while younger than this (7 days)
pub const FRESHNESS_WINDOW_MS: i64 = 604_800_000;

/// Path segment standing in for the empty key. Derived keys are
/// `[a-z0-9]*`, so it cannot clash with a real one.
const EMPTY_KEY_SEGMENT: &str = "_";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache transport error: {0}")]
    Transport(String),
    #[error("cache store returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed cache record: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Hierarchical JSON key-value store shared by every session
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read the value at `path`, `None` when nothing is stored there
    async fn get(&self, path: &str) -> Result<Option<serde_json::Value>, CacheError>;

    /// Replace the value at `path`
    async fn put(&self, path: &str, value: serde_json::Value) -> Result<(), CacheError>;
}

/// In-process store, for tests and for running without cache credentials
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }

    pub async fn paths(&self) -> Vec<String> {
        let mut paths: Vec<_> = self.values.read().await.keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<serde_json::Value>, CacheError> {
        Ok(self.values.read().await.get(path).cloned())
    }

    async fn put(&self, path: &str, value: serde_json::Value) -> Result<(), CacheError> {
        self.values.write().await.insert(path.to_string(), value);
        Ok(())
    }
}

/// Stored record: `{ answer, query, type, timestamp }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAnswer {
    pub answer: String,
    pub query: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Epoch milliseconds
    pub timestamp: i64,
}

/// One cached answer
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub answer: String,
    pub source_query: String,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    fn from_stored(key: &str, stored: StoredAnswer) -> Self {
        Self {
            key: key.to_string(),
            answer: stored.answer,
            source_query: stored.query,
            created_at: DateTime::from_timestamp_millis(stored.timestamp)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        }
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at < Duration::milliseconds(FRESHNESS_WINDOW_MS)
    }
}

/// Outcome of a cache read
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(String),
    Miss,
    Stale(String),
    Error,
}

impl CacheLookup {
    /// The answer to serve, only for a fresh hit
    pub fn answer(&self) -> Option<&str> {
        match self {
            CacheLookup::Hit(answer) => Some(answer),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CacheLookup::Hit(_) => "hit",
            CacheLookup::Miss => "miss",
            CacheLookup::Stale(_) => "stale",
            CacheLookup::Error => "error",
        }
    }
}

/// TTL-bound answer cache over a [`CacheStore`]
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    namespace: String,
    kind: String,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            namespace: CHAT_NAMESPACE.to_string(),
            kind: "auto".to_string(),
        }
    }

    /// Value written to the record's `type` field
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Store path for a derived key
    pub fn entry_path(&self, key: &str) -> String {
        let segment = if key.is_empty() { EMPTY_KEY_SEGMENT } else { key };
        format!("{}/{}", self.namespace, segment)
    }

    pub async fn get(&self, key: &str) -> CacheLookup {
        self.get_at(key, Utc::now()).await
    }

    /// Look up `key` judging freshness against `now`
    pub async fn get_at(&self, key: &str, now: DateTime<Utc>) -> CacheLookup {
        let path = self.entry_path(key);
        let value = match self.store.get(&path).await {
            Ok(Some(value)) => value,
            Ok(None) => return CacheLookup::Miss,
            Err(e) => {
                warn!(%path, error = %e, "cache read failed");
                return CacheLookup::Error;
            }
        };

        let stored: StoredAnswer = match serde_json::from_value(value) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(%path, error = %e, "ignoring malformed cache record");
                return CacheLookup::Error;
            }
        };

        let entry = CacheEntry::from_stored(key, stored);
        if entry.is_fresh_at(now) {
            CacheLookup::Hit(entry.answer)
        } else {
            debug!(%path, created_at = %entry.created_at, "cached answer is stale");
            CacheLookup::Stale(entry.answer)
        }
    }

    /// Write an answer in a detached task. Failures are logged and dropped;
    /// the returned handle may be ignored.
    pub fn set(&self, key: &str, answer: &str, source_query: &str) -> JoinHandle<()> {
        let path = self.entry_path(key);
        let record = StoredAnswer {
            answer: answer.to_string(),
            query: source_query.to_string(),
            kind: self.kind.clone(),
            timestamp: Utc::now().timestamp_millis(),
        };
        let store = self.store.clone();

        tokio::spawn(async move {
            let value = match serde_json::to_value(&record) {
                Ok(value) => value,
                Err(e) => {
                    warn!(%path, error = %e, "could not encode cache record");
                    return;
                }
            };
            match store.put(&path, value).await {
                Ok(()) => debug!(%path, "cached answer"),
                Err(e) => warn!(%path, error = %e, "cache write failed"),
            }
        })
    }
}
