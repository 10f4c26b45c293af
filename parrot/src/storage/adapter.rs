//! Storage adapter for the session collection and active-session pointer.
//!
//! Two independent slots in the underlying key-value store:
//! - [`SESSIONS_SLOT`] holds the JSON-encoded session collection
//! - [`ACTIVE_SESSION_SLOT`] holds the raw active session id, or is absent
//!
//! Reads never fail: corruption degrades to an empty collection. Writes
//! recover from quota exhaustion by evicting the oldest sessions from the
//! payload; any other write failure is logged and dropped.

use chrono::Utc;
use tracing::warn;

use crate::models::Session;
use crate::sanitize::{sanitize, RawSession};
use crate::storage::kv::{KeyValueStore, StoreError};

/// Slot holding the serialized session collection.
pub const SESSIONS_SLOT: &str = "chatgpt-local-sessions-v1";

/// Slot holding the id of the active session.
pub const ACTIVE_SESSION_SLOT: &str = "chatgpt-local-active-session";

/// Persistence adapter over a [`KeyValueStore`].
pub struct SessionStore<S> {
    store: S,
}

impl<S: KeyValueStore> SessionStore<S> {
    /// Wrap a key-value store.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Load and sanitize the persisted session collection.
    ///
    /// An absent slot or unparseable payload yields an empty collection.
    pub fn load(&self) -> Vec<Session> {
        let Some(raw) = self.store.get(SESSIONS_SLOT) else {
            return Vec::new();
        };

        match serde_json::from_str::<Vec<RawSession>>(&raw) {
            Ok(sessions) => sanitize(sessions, Utc::now()),
            Err(err) => {
                warn!(%err, "discarding unparseable session collection");
                Vec::new()
            }
        }
    }

    /// Persist the session collection.
    ///
    /// When the store reports quota exhaustion, the oldest session is
    /// dropped from the payload and the write retried, until it succeeds or
    /// nothing is left to drop. Other failures are logged and dropped.
    pub fn save(&self, sessions: &[Session]) {
        let mut payload = sessions.to_vec();
        loop {
            let raw = match serde_json::to_string(&payload) {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(%err, "failed to serialize session collection");
                    return;
                }
            };

            match self.store.set(SESSIONS_SLOT, &raw) {
                Ok(()) => return,
                Err(StoreError::QuotaExceeded) => {
                    if payload.pop().is_none() {
                        warn!("store rejected even an empty session collection, giving up");
                        return;
                    }
                    warn!(
                        remaining = payload.len(),
                        "storage quota exceeded, evicting oldest session and retrying"
                    );
                }
                Err(err) => {
                    warn!(%err, "failed to persist session collection");
                    return;
                }
            }
        }
    }

    /// Read the persisted active session id, if any.
    pub fn read_active_id(&self) -> Option<String> {
        self.store.get(ACTIVE_SESSION_SLOT)
    }

    /// Persist the active session id; `None` removes the slot.
    pub fn write_active_id(&self, id: Option<&str>) {
        match id {
            Some(id) => {
                if let Err(err) = self.store.set(ACTIVE_SESSION_SLOT, id) {
                    warn!(%err, "failed to persist active session id");
                }
            }
            None => self.store.remove(ACTIVE_SESSION_SLOT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;
    use crate::storage::kv::MemoryStore;

    fn store() -> SessionStore<MemoryStore> {
        SessionStore::new(MemoryStore::new())
    }

    fn session_with_message(content: &str) -> Session {
        let mut session = Session::new();
        session.messages.push(Message::user(content));
        session.title = content.to_string();
        session
    }

    #[test]
    fn test_load_absent_slot_is_empty() {
        assert!(store().load().is_empty());
    }

    #[test]
    fn test_load_corrupt_slot_is_empty() {
        let store = store();
        store.store.set(SESSIONS_SLOT, "{not json").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let store = store();
        let sessions = vec![session_with_message("alpha"), session_with_message("beta")];

        store.save(&sessions);
        assert_eq!(store.load(), sessions);
    }

    #[test]
    fn test_load_drops_malformed_entries() {
        let store = store();
        let raw = r#"[
            {"title": "no id", "messages": []},
            {"id": "keep", "messages": [{"id": "m1", "role": "user", "content": "hi"}]}
        ]"#;
        store.store.set(SESSIONS_SLOT, raw).unwrap();

        let sessions = store.load();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "keep");
        assert_eq!(sessions[0].title, "hi");
    }

    #[test]
    fn test_save_evicts_oldest_on_quota() {
        let sessions = vec![
            session_with_message("newest"),
            session_with_message("middle"),
            session_with_message("oldest"),
        ];
        let two_newest = serde_json::to_string(&sessions[..2]).unwrap().len();

        // Room for two sessions but not three.
        let store = SessionStore::new(MemoryStore::with_capacity(
            SESSIONS_SLOT.len() + two_newest,
        ));
        store.save(&sessions);

        let loaded = store.load();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].title, "newest");
        assert_eq!(loaded[1].title, "middle");
    }

    #[test]
    fn test_save_gives_up_when_nothing_fits() {
        let store = SessionStore::new(MemoryStore::with_capacity(1));
        store.save(&[session_with_message("doomed")]);
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_active_id_slot() {
        let store = store();
        assert_eq!(store.read_active_id(), None);

        store.write_active_id(Some("s1"));
        assert_eq!(store.read_active_id().as_deref(), Some("s1"));

        store.write_active_id(None);
        assert_eq!(store.read_active_id(), None);
    }
}
