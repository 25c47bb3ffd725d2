//! Conversation and preference types shared with the request layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Value returned for a user with no recorded preferences.
pub const NONE_SENTINEL: &str = "none";

/// Legacy "nothing" marker still found in older memory files and
/// tokenizer output. Accepted on input, never produced.
pub const LEGACY_NONE_SENTINEL: &str = "无";

/// Value returned when a session has no recorded turns.
pub const NO_HISTORY: &str = "no history";

/// Returns true when `raw` is empty or one of the "nothing" sentinels.
pub fn is_none_sentinel(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case(NONE_SENTINEL)
        || trimmed == LEGACY_NONE_SENTINEL
}

/// One completed exchange between a user and the agent.
///
/// Turns are immutable once built; the session store owns them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub session_id: String,
    pub user_id: String,
    pub input: String,
    pub reply: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    /// Create a turn stamped with the current time and no reply yet
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            input: input.into(),
            reply: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach the agent's reply
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    /// Override the timestamp (replays, tests)
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_builder() {
        let turn = ConversationTurn::new("s1", "u1", "hello").with_reply("hi");
        assert_eq!(turn.session_id, "s1");
        assert_eq!(turn.user_id, "u1");
        assert_eq!(turn.input, "hello");
        assert_eq!(turn.reply.as_deref(), Some("hi"));
    }

    #[test]
    fn test_none_sentinels() {
        assert!(is_none_sentinel(""));
        assert!(is_none_sentinel("   "));
        assert!(is_none_sentinel("none"));
        assert!(is_none_sentinel("NONE"));
        assert!(is_none_sentinel("无"));
        assert!(!is_none_sentinel("fishing"));
    }

    #[test]
    fn test_turn_serialization() {
        let turn = ConversationTurn::new("s1", "u1", "hello");
        let json = serde_json::to_string(&turn).unwrap();
        let back: ConversationTurn = serde_json::from_str(&json).unwrap();
        assert_eq!(turn, back);
    }
}
