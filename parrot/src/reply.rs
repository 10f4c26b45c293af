//! Simulated assistant replies.
//!
//! No model is ever called: the reply is a fixed template reflecting the
//! user's input, composed locally after a short delay so the exchange feels
//! like a real conversation.

use std::time::Duration;

/// How long the simulated assistant "thinks" before replying.
pub const REPLY_DELAY: Duration = Duration::from_millis(1000);

/// Compose the simulated reply for a user message.
///
/// Deterministic: the same input always yields the same reply. Callers
/// validate the input is non-empty before asking for a reply.
pub fn compose_reply(input: &str) -> String {
    format!(
        "You said: \"{input}\". I'm a local stand-in for a real assistant, so everything I say \
         is composed on your machine and nothing leaves it. Try rephrasing your message and \
         watch the reply change with it."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_reflects_input() {
        let reply = compose_reply("Hello");
        assert!(reply.contains("\"Hello\""));
    }

    #[test]
    fn test_reply_is_deterministic() {
        assert_eq!(compose_reply("same input"), compose_reply("same input"));
    }
}
