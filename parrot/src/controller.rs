//! Session state controller.
//!
//! The single authoritative owner of the session collection, the active
//! pointer, and the typing flag. Every mutation passes through here so the
//! persisted state stays consistent with what the view renders: mutations
//! schedule a debounced write-through of the full collection, while
//! active-pointer changes are written immediately.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::debounce::Debounce;
use crate::models::{Message, Session};
use crate::reply::{compose_reply, REPLY_DELAY};
use crate::sanitize::{derive_title, enforce_capacity};
use crate::storage::{KeyValueStore, SessionStore, ACTIVE_SESSION_SLOT, SESSIONS_SLOT};
use crate::sync::{StorageArea, StorageEvent};

/// Quiet period before a mutation is written through to storage.
pub const PERSIST_DEBOUNCE: Duration = Duration::from_millis(250);

/// Mutable controller state.
#[derive(Debug)]
struct ChatState {
    /// Sessions ordered newest-created first.
    sessions: Vec<Session>,
    /// Id of the session the view is showing, if any.
    active_id: Option<String>,
    /// Whether a simulated reply is pending.
    is_typing: bool,
}

/// Slot holding the pending simulated-reply task.
///
/// At most one reply is in flight; replacing or dropping the slot aborts
/// the previous task.
struct ReplySlot(Mutex<Option<JoinHandle<()>>>);

impl ReplySlot {
    fn replace(&self, task: Option<JoinHandle<()>>) {
        let mut slot = self.0.lock().unwrap();
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = task;
    }
}

impl Drop for ReplySlot {
    fn drop(&mut self) {
        if let Ok(slot) = self.0.get_mut() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

/// Cheaply cloneable handle to the chat state machine.
///
/// Requires a Tokio runtime: the simulated-reply delay and the persistence
/// debounce are spawned tasks. Dropping the last handle cancels both
/// timers without writing; [`ChatController::close`] flushes the pending
/// write first.
pub struct ChatController<S: KeyValueStore + 'static> {
    state: Arc<Mutex<ChatState>>,
    store: Arc<SessionStore<S>>,
    persist: Arc<Debounce>,
    reply: Arc<ReplySlot>,
    changed: Arc<watch::Sender<u64>>,
}

impl<S: KeyValueStore + 'static> Clone for ChatController<S> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            store: Arc::clone(&self.store),
            persist: Arc::clone(&self.persist),
            reply: Arc::clone(&self.reply),
            changed: Arc::clone(&self.changed),
        }
    }
}

impl<S: KeyValueStore + 'static> ChatController<S> {
    /// Load persisted state and become ready.
    ///
    /// An empty store yields one fresh active session. Otherwise the stored
    /// active id is adopted when it still exists, falling back to the
    /// most-recently-updated session. The resolved pointer is written back
    /// immediately and the (possibly synthesized) collection is scheduled
    /// for persistence.
    pub fn new(store: SessionStore<S>) -> Self {
        let mut sessions = store.load();
        let stored_active = store.read_active_id();

        if sessions.is_empty() {
            debug!("no persisted sessions, starting a fresh one");
            sessions.push(Session::new());
        }
        let active_id = stored_active
            .filter(|id| sessions.iter().any(|s| &s.id == id))
            .or_else(|| most_recently_updated(&sessions).map(|s| s.id.clone()));
        store.write_active_id(active_id.as_deref());

        let state = Arc::new(Mutex::new(ChatState {
            sessions,
            active_id,
            is_typing: false,
        }));
        let store = Arc::new(store);
        let (changed, _) = watch::channel(0_u64);
        let changed = Arc::new(changed);

        let persist = {
            let state = Arc::clone(&state);
            let store = Arc::clone(&store);
            let changed = Arc::clone(&changed);
            Arc::new(Debounce::new(PERSIST_DEBOUNCE, move || {
                if persist_now(&state, &store) {
                    bump(&changed);
                }
            }))
        };

        let controller = Self {
            state,
            store,
            persist,
            reply: Arc::new(ReplySlot(Mutex::new(None))),
            changed,
        };
        controller.persist.schedule();
        controller
    }

    /// Snapshot of all sessions, newest-created first.
    pub fn sessions(&self) -> Vec<Session> {
        self.state.lock().unwrap().sessions.clone()
    }

    /// Snapshot of the session the view should display.
    ///
    /// A dangling pointer resolves lazily to the most-recently-updated
    /// session, else the first, without mutating state.
    pub fn active_session(&self) -> Option<Session> {
        let state = self.state.lock().unwrap();
        resolve_active(&state).cloned()
    }

    /// Whether a simulated reply is pending.
    pub fn is_typing(&self) -> bool {
        self.state.lock().unwrap().is_typing
    }

    /// Subscribe to a signal bumped on every state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }

    /// Create a fresh empty session, activate it, and return it.
    ///
    /// Clears the typing flag and cancels any pending simulated reply:
    /// transient conversation state belongs to the session being shown.
    pub fn new_session(&self) -> Session {
        let session = Session::new();
        {
            let mut state = self.state.lock().unwrap();
            state.sessions.insert(0, session.clone());
            state.active_id = Some(session.id.clone());
            state.is_typing = false;
        }
        self.reply.replace(None);
        self.store.write_active_id(Some(&session.id));
        self.persist.schedule();
        self.notify();
        session
    }

    /// Delete a session; unknown ids are a no-op.
    ///
    /// Deleting the last session synthesizes a fresh active replacement;
    /// deleting the active session promotes the first remaining one.
    pub fn delete_session(&self, id: &str) {
        let activated = {
            let mut state = self.state.lock().unwrap();
            let before = state.sessions.len();
            state.sessions.retain(|s| s.id != id);
            if state.sessions.len() == before {
                return;
            }

            let was_active = state.active_id.as_deref() == Some(id);
            let emptied = state.sessions.is_empty();
            if emptied {
                let replacement = Session::new();
                state.active_id = Some(replacement.id.clone());
                state.sessions.push(replacement);
            } else if was_active {
                state.active_id = Some(state.sessions[0].id.clone());
            }
            if was_active || emptied {
                state.active_id.clone()
            } else {
                None
            }
        };

        if let Some(id) = activated {
            self.store.write_active_id(Some(&id));
        }
        self.persist.schedule();
        self.notify();
    }

    /// Append a message to a session; missing sessions are a no-op.
    pub fn append_message(&self, session_id: &str, message: Message) {
        let appended = {
            let mut state = self.state.lock().unwrap();
            append_to(&mut state, session_id, message)
        };
        if appended {
            self.persist.schedule();
            self.notify();
        }
    }

    /// Activate an existing session; unknown ids are a no-op.
    pub fn select_session(&self, id: &str) {
        let found = {
            let mut state = self.state.lock().unwrap();
            if state.sessions.iter().any(|s| s.id == id) {
                state.active_id = Some(id.to_string());
                true
            } else {
                false
            }
        };
        if found {
            self.store.write_active_id(Some(id));
            self.notify();
        }
    }

    /// Send a user message and schedule its simulated reply.
    ///
    /// Blank input is a no-op. A live active session is ensured first,
    /// creating one when nothing resolves. Only one simulated reply is
    /// pending at a time: sending again before the delay elapses cancels
    /// and replaces the previous one.
    pub fn send_user_message(&self, text: &str) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }

        let (session_id, activated) = {
            let mut state = self.state.lock().unwrap();
            let resolved = resolve_active(&state).map(|s| s.id.clone());
            let (session_id, activated) = match resolved {
                Some(id) => {
                    let changed = state.active_id.as_deref() != Some(id.as_str());
                    (id, changed)
                }
                None => {
                    let session = Session::new();
                    let id = session.id.clone();
                    state.sessions.insert(0, session);
                    (id, true)
                }
            };
            if activated {
                state.active_id = Some(session_id.clone());
            }
            append_to(&mut state, &session_id, Message::user(trimmed));
            state.is_typing = true;
            (session_id, activated)
        };

        if activated {
            self.store.write_active_id(Some(&session_id));
        }
        self.persist.schedule();
        self.notify();

        let reply_text = compose_reply(trimmed);
        let state = Arc::clone(&self.state);
        let persist = Arc::clone(&self.persist);
        let changed = Arc::clone(&self.changed);
        self.reply.replace(Some(tokio::spawn(async move {
            tokio::time::sleep(REPLY_DELAY).await;
            {
                let mut state = state.lock().unwrap();
                // The session may have been deleted while the reply was
                // pending; the append is then a no-op.
                append_to(&mut state, &session_id, Message::assistant(reply_text));
                state.is_typing = false;
            }
            persist.schedule();
            bump(&changed);
        })));
    }

    /// Case-insensitive filter over titles and message contents.
    ///
    /// A blank term returns the full collection in order. Pure: no
    /// mutation, no persistence.
    pub fn search(&self, term: &str) -> Vec<Session> {
        let state = self.state.lock().unwrap();
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return state.sessions.clone();
        }
        state
            .sessions
            .iter()
            .filter(|s| session_matches(s, &needle))
            .cloned()
            .collect()
    }

    /// Reconcile a storage change made by another instance.
    ///
    /// Events outside the local area are ignored. A collection change
    /// replaces in-memory sessions with a fresh (sanitized) read; an
    /// active-pointer change adopts the new id unvalidated, leaving
    /// validation to the next [`Self::active_session`] read.
    pub fn apply_storage_event(&self, event: &StorageEvent) {
        if event.area != StorageArea::Local {
            return;
        }

        match event.key.as_str() {
            SESSIONS_SLOT => {
                let sessions = self.store.load();
                debug!(count = sessions.len(), "reloaded sessions after external change");
                self.state.lock().unwrap().sessions = sessions;
                self.notify();
            }
            ACTIVE_SESSION_SLOT => {
                if let Some(id) = &event.new_value {
                    self.state.lock().unwrap().active_id = Some(id.clone());
                    self.notify();
                }
            }
            _ => {}
        }
    }

    /// Tear down cleanly: cancel the pending reply and flush the pending
    /// write so nothing is lost on a clean host shutdown.
    pub fn close(&self) {
        self.reply.replace(None);
        self.persist.flush();
    }

    fn notify(&self) {
        bump(&self.changed);
    }
}

/// Write the collection through to storage, capping it first.
///
/// Returns whether capacity eviction changed the in-memory collection.
fn persist_now<S: KeyValueStore>(state: &Mutex<ChatState>, store: &SessionStore<S>) -> bool {
    let (sessions, evicted) = {
        let mut state = state.lock().unwrap();
        let before = state.sessions.len();
        state.sessions = enforce_capacity(std::mem::take(&mut state.sessions));
        let evicted = state.sessions.len() != before;
        if evicted {
            debug!(
                dropped = before - state.sessions.len(),
                "capacity eviction during persist"
            );
        }
        (state.sessions.clone(), evicted)
    };
    store.save(&sessions);
    evicted
}

fn bump(changed: &watch::Sender<u64>) {
    changed.send_modify(|n| *n = n.wrapping_add(1));
}

/// Append a message, re-deriving the title and bumping `updated_at`.
fn append_to(state: &mut ChatState, session_id: &str, message: Message) -> bool {
    let Some(session) = state.sessions.iter_mut().find(|s| s.id == session_id) else {
        return false;
    };
    session.updated_at = message.created_at;
    session.messages.push(message);
    session.title = derive_title(&session.messages);
    true
}

/// Resolve the session the view should display.
fn resolve_active(state: &ChatState) -> Option<&Session> {
    if let Some(id) = &state.active_id {
        if let Some(session) = state.sessions.iter().find(|s| &s.id == id) {
            return Some(session);
        }
    }
    most_recently_updated(&state.sessions).or_else(|| state.sessions.first())
}

fn most_recently_updated(sessions: &[Session]) -> Option<&Session> {
    sessions.iter().max_by_key(|s| s.updated_at)
}

fn session_matches(session: &Session, needle: &str) -> bool {
    session.title.to_lowercase().contains(needle)
        || session
            .messages
            .iter()
            .any(|m| m.content.to_lowercase().contains(needle))
}
