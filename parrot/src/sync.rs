//! Cross-instance storage-change reconciliation.
//!
//! Other instances sharing the same store ("tabs") write the same two
//! slots. The hosting shell wires platform storage notifications into the
//! channel returned by [`spawn_listener`]; the controller re-reads the
//! affected slot rather than merging, so the latest write wins.

use tokio::sync::mpsc;
use tracing::debug;

use crate::controller::ChatController;
use crate::storage::KeyValueStore;

/// Which storage scope a change notification originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageArea {
    /// The persistent local store shared across instances.
    Local,
    /// Per-instance ephemeral storage; never holds session data.
    Session,
}

/// A storage-change notification from another instance.
#[derive(Debug, Clone)]
pub struct StorageEvent {
    /// Scope the change happened in; anything but local is ignored.
    pub area: StorageArea,
    /// Slot name that changed.
    pub key: String,
    /// The new raw value, or `None` when the slot was removed.
    pub new_value: Option<String>,
}

/// Spawn the listener task that applies storage events to a controller.
///
/// Returns the sender the hosting shell feeds platform notifications into;
/// the listener stops when every sender is dropped.
pub fn spawn_listener<S>(controller: ChatController<S>) -> mpsc::Sender<StorageEvent>
where
    S: KeyValueStore + 'static,
{
    let (tx, mut rx) = mpsc::channel::<StorageEvent>(64);
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            controller.apply_storage_event(&event);
        }
        debug!("storage event channel closed");
    });
    tx
}
