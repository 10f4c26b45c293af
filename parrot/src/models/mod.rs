//! Data models for chat sessions and messages.

mod message;
mod session;

pub use message::{Message, Role};
pub use session::{Session, DEFAULT_TITLE};
