//! Parrot - local-first chat sessions with simulated assistant replies.
//!
//! The session/persistence core of a chat UI that looks like a hosted AI
//! chat product but never talks to one: replies are composed locally from a
//! fixed template after a short delay, and all history lives in a small
//! key-value store on the user's machine.
//!
//! Architecture:
//! - [`controller::ChatController`] owns the session collection, the active
//!   pointer, and the typing flag; the view observes snapshots plus a change
//!   signal and calls its operations
//! - [`storage`] wraps the key-value store behind a two-slot adapter with
//!   quota-evicting writes
//! - [`sanitize`] repairs and bounds whatever was persisted
//! - [`sync`] reconciles changes written by other instances of the app
//!
//! There is no server, CLI, or network surface; the hosting shell only
//! renders state and forwards user interactions and storage notifications.

pub mod controller;
pub mod debounce;
pub mod models;
pub mod reply;
pub mod sanitize;
pub mod storage;
pub mod sync;

pub use controller::{ChatController, PERSIST_DEBOUNCE};
pub use models::{Message, Role, Session};
pub use reply::REPLY_DELAY;
pub use storage::{FileStore, KeyValueStore, MemoryStore, SessionStore, StoreError};
pub use sync::{spawn_listener, StorageArea, StorageEvent};
