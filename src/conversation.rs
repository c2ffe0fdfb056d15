//! Conversation log persistence
//!
//! The whole ordered turn list is stored as one JSON array under a fixed
//! key and rewritten after every append, so a crash loses at most the
//! request in flight. A record that fails to parse is deleted on startup.

use tracing::{debug, warn};

use crate::storage::{LocalStorage, StorageError};
use crate::turn::Turn;

/// Storage key of the conversation record
pub const CONVERSATION_KEY: &str = "drona.conversation";

/// Ordered, append-only turn log backed by local storage
pub struct ConversationStore<S: LocalStorage> {
    turns: Vec<Turn>,
    storage: S,
}

impl<S: LocalStorage> ConversationStore<S> {
    /// Empty log; call [`rehydrate`](Self::rehydrate) to load what was stored
    pub fn new(storage: S) -> Self {
        Self {
            turns: Vec::new(),
            storage,
        }
    }

    /// Build a store and load the stored conversation in one step
    pub fn open(storage: S) -> Self {
        let mut store = Self::new(storage);
        store.turns = store.rehydrate();
        store
    }

    /// Append a turn and persist the log.
    ///
    /// A failed write is logged and absorbed; the in-memory log still grows.
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
        if let Err(e) = self.persist() {
            warn!(error = %e, turns = self.turns.len(), "failed to persist conversation");
        }
    }

    pub fn all(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Drop every turn, in memory and on disk
    pub fn clear(&mut self) {
        self.turns.clear();
        if let Err(e) = self.storage.remove_item(CONVERSATION_KEY) {
            warn!(error = %e, "failed to remove stored conversation");
        }
    }

    /// Write the full log under [`CONVERSATION_KEY`], replacing what was there
    pub fn persist(&mut self) -> Result<(), StorageError> {
        let json = serde_json::to_string(&self.turns)?;
        self.storage.set_item(CONVERSATION_KEY, &json)
    }

    /// Read the stored log.
    ///
    /// Missing record gives an empty log. A record that does not parse
    /// (bad JSON, unknown role, turn without segments) is deleted and an
    /// empty log is returned.
    pub fn rehydrate(&mut self) -> Vec<Turn> {
        let raw = match self.storage.get_item(CONVERSATION_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "could not read stored conversation");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<Turn>>(&raw) {
            Ok(turns) => {
                debug!(turns = turns.len(), "rehydrated conversation");
                turns
            }
            Err(e) => {
                warn!(error = %e, "discarding corrupted conversation record");
                if let Err(e) = self.storage.remove_item(CONVERSATION_KEY) {
                    warn!(error = %e, "failed to remove corrupted conversation record");
                }
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::turn::{Role, Segment};

    #[test]
    fn test_persistence_roundtrip() {
        let storage = MemoryStorage::new();
        let t1 = Turn::user_text("What is federalism?");
        let t2 = Turn::assistant_text("Federalism is...");

        let mut store = ConversationStore::new(storage.clone());
        store.append(t1.clone());
        store.append(t2.clone());
        store.persist().unwrap();

        assert_eq!(store.rehydrate(), vec![t1.clone(), t2.clone()]);

        // A fresh store on the same storage sees the same log
        let reopened = ConversationStore::open(storage);
        assert_eq!(reopened.all(), &[t1, t2]);
    }

    #[test]
    fn test_append_persists_immediately() {
        let storage = MemoryStorage::new();
        let mut store = ConversationStore::new(storage.clone());
        store.append(Turn::user_text("hello"));

        let raw = storage.get_item(CONVERSATION_KEY).unwrap().unwrap();
        assert!(raw.contains("hello"));
    }

    #[test]
    fn test_corruption_recovery() {
        let mut storage = MemoryStorage::new();
        storage.set_item(CONVERSATION_KEY, "not json {").unwrap();

        let mut store = ConversationStore::new(storage.clone());
        assert!(store.rehydrate().is_empty());
        assert_eq!(storage.get_item(CONVERSATION_KEY).unwrap(), None);
    }

    #[test]
    fn test_unknown_role_is_corruption() {
        let mut storage = MemoryStorage::new();
        storage
            .set_item(
                CONVERSATION_KEY,
                r#"[{"role":"user","parts":[{"text":"hi"}]},{"role":"bot","parts":[{"text":"yo"}]}]"#,
            )
            .unwrap();

        let store = ConversationStore::open(storage.clone());
        assert!(store.is_empty());
        assert_eq!(storage.get_item(CONVERSATION_KEY).unwrap(), None);
    }

    #[test]
    fn test_clear_wipes_storage() {
        let storage = MemoryStorage::new();
        let mut store = ConversationStore::new(storage.clone());
        store.append(Turn::user_text("one"));
        store.clear();

        assert!(store.is_empty());
        assert_eq!(storage.get_item(CONVERSATION_KEY).unwrap(), None);
    }

    #[test]
    fn test_quota_failure_keeps_memory_log() {
        let storage = MemoryStorage::new().with_quota(80);
        let mut store = ConversationStore::new(storage.clone());
        store.append(Turn::user_text("short"));
        let saved = storage.get_item(CONVERSATION_KEY).unwrap();

        store.append(Turn::assistant_text("x".repeat(200)));
        assert_eq!(store.len(), 2);
        // Storage still holds the last record that fit
        assert_eq!(storage.get_item(CONVERSATION_KEY).unwrap(), saved);
    }

    #[test]
    fn test_order_preserved_with_images() {
        let storage = MemoryStorage::new();
        let mut store = ConversationStore::new(storage.clone());
        let with_image =
            Turn::new(Role::User, vec![Segment::text("see"), Segment::image("image/png", "aGk=")])
                .unwrap();
        store.append(with_image.clone());
        store.append(Turn::assistant_text("a chart"));

        let reopened = ConversationStore::open(storage);
        assert_eq!(reopened.all()[0], with_image);
        assert_eq!(reopened.all()[1].role(), Role::Assistant);
    }
}
