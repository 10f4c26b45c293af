//! Sanitizing and bounding of persisted session data.
//!
//! Persisted data may come from an older build, a concurrent instance, or a
//! hand-edited store, so every field is treated as optional on the way in.
//! Entries that cannot be repaired are dropped; everything else is filled
//! with defaults. All functions here are pure: deterministic given their
//! input and the supplied `now` timestamp.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::models::{Message, Role, Session, DEFAULT_TITLE};

/// Maximum number of sessions kept when capacity eviction triggers.
pub const MAX_SESSIONS: usize = 75;

/// Maximum messages kept per session when capacity eviction triggers.
pub const MAX_MESSAGES_PER_SESSION: usize = 200;

/// Maximum title length in characters before truncation.
pub const TITLE_MAX_CHARS: usize = 45;

/// Tolerant deserialization shape for a persisted message.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Tolerant deserialization shape for a persisted session.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSession {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub messages: Option<Vec<RawMessage>>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Parse a timestamp string flexibly from various formats.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    // Try common datetime format: "YYYY-MM-DD HH:MM:SS"
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }

    // Try with fractional seconds: "YYYY-MM-DD HH:MM:SS.SSS"
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }

    None
}

/// Repair a raw session list into well-formed sessions.
///
/// Sessions missing an id or a message list are dropped. Surviving sessions
/// get a derived title when theirs is missing or blank, and timestamps fall
/// back created → `now` and updated → created → `now`. Malformed messages
/// (missing id, role, or content) are dropped; missing message timestamps
/// become `now`. Idempotent: sanitizing a sanitized collection changes
/// nothing.
pub fn sanitize(raw: Vec<RawSession>, now: DateTime<Utc>) -> Vec<Session> {
    raw.into_iter()
        .filter_map(|session| sanitize_session(session, now))
        .collect()
}

/// Repair a single raw session, or drop it.
fn sanitize_session(raw: RawSession, now: DateTime<Utc>) -> Option<Session> {
    let id = raw.id.filter(|id| !id.is_empty())?;
    let messages: Vec<Message> = raw
        .messages?
        .into_iter()
        .filter_map(|message| sanitize_message(message, now))
        .collect();

    let created_at = raw
        .created_at
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or(now);
    let updated_at = raw
        .updated_at
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or(created_at);

    let title = match raw.title {
        Some(title) if !title.trim().is_empty() => title,
        _ => derive_title(&messages),
    };

    Some(Session {
        id,
        title,
        messages,
        created_at,
        updated_at,
    })
}

/// Repair a single raw message, or drop it.
fn sanitize_message(raw: RawMessage, now: DateTime<Utc>) -> Option<Message> {
    let id = raw.id.filter(|id| !id.is_empty())?;
    let role = Role::from_str(raw.role.as_deref()?)?;
    let content = raw.content?;
    let created_at = raw
        .created_at
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or(now);

    Some(Message {
        id,
        role,
        content,
        created_at,
    })
}

/// Derive a session title from its messages.
///
/// Uses the first user message with whitespace runs collapsed to single
/// spaces, truncated to [`TITLE_MAX_CHARS`] characters plus an ellipsis when
/// longer. Sessions without a user message keep the default title.
pub fn derive_title(messages: &[Message]) -> String {
    let Some(first_user) = messages.iter().find(|m| m.role == Role::User) else {
        return DEFAULT_TITLE.to_string();
    };

    let collapsed = first_user
        .content
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if collapsed.chars().count() > TITLE_MAX_CHARS {
        let mut title: String = collapsed.chars().take(TITLE_MAX_CHARS).collect();
        title.push('…');
        title
    } else {
        collapsed
    }
}

/// Bound a session collection to its configured capacity.
///
/// The collection is ordered newest-created first, so the oldest sessions
/// sit at the back. Within the maximum the collection passes through
/// untouched; beyond it, only the most recently created [`MAX_SESSIONS`]
/// survive and each kept session is truncated to its most recent
/// [`MAX_MESSAGES_PER_SESSION`] messages.
pub fn enforce_capacity(mut sessions: Vec<Session>) -> Vec<Session> {
    if sessions.len() <= MAX_SESSIONS {
        return sessions;
    }

    sessions.truncate(MAX_SESSIONS);
    for session in &mut sessions {
        if session.messages.len() > MAX_MESSAGES_PER_SESSION {
            let excess = session.messages.len() - MAX_MESSAGES_PER_SESSION;
            session.messages.drain(..excess);
        }
    }
    sessions
}
