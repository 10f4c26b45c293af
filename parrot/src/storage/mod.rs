//! Persistence: key-value stores and the session storage adapter.

mod adapter;
mod kv;

pub use adapter::{SessionStore, ACTIVE_SESSION_SLOT, SESSIONS_SLOT};
pub use kv::{FileStore, KeyValueStore, MemoryStore, StoreError};
