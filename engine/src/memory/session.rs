//! Short-term session memory
//!
//! Keeps the most recent conversation turns per session in a bounded
//! window and renders them as a prompt-ready context string. Nothing here
//! is persisted; windows live for the lifetime of the process.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use sdk::types::{ConversationTurn, NO_HISTORY};

/// Default number of turns kept per window
pub const DEFAULT_MAX_TURNS: usize = 10;

/// Which identity a turn is filed under
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKey {
    /// One window per conversation session
    #[default]
    Session,
    /// One window per user, shared across their sessions
    User,
}

impl SessionKey {
    fn key_of<'a>(&self, turn: &'a ConversationTurn) -> &'a str {
        match self {
            SessionKey::Session => &turn.session_id,
            SessionKey::User => &turn.user_id,
        }
    }
}

/// Ordered turns of one session, newest last, never longer than its limit
#[derive(Debug, Clone)]
pub struct SessionWindow {
    turns: VecDeque<ConversationTurn>,
    max_turns: usize,
}

impl SessionWindow {
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(max_turns),
            max_turns,
        }
    }

    /// Append a turn, evicting the oldest ones beyond the limit
    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    /// Render oldest to newest, one labeled line per turn
    pub fn render(&self) -> String {
        if self.turns.is_empty() {
            return NO_HISTORY.to_string();
        }

        self.turns
            .iter()
            .enumerate()
            .map(|(i, turn)| match &turn.reply {
                Some(reply) => format!("[{}] user: {} | assistant: {}", i + 1, turn.input, reply),
                None => format!("[{}] user: {}", i + 1, turn.input),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// All session windows behind one reader/writer lock
#[derive(Debug)]
pub struct SessionContextStore {
    windows: RwLock<HashMap<String, SessionWindow>>,
    max_turns: usize,
    key_by: SessionKey,
}

impl SessionContextStore {
    /// Create a store keeping `max_turns` turns per window
    pub fn new(max_turns: usize, key_by: SessionKey) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            max_turns,
            key_by,
        }
    }

    /// Record a turn in its window, creating the window on first use
    pub fn append_turn(&self, turn: ConversationTurn) {
        let key = self.key_by.key_of(&turn).to_string();
        let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);
        windows
            .entry(key)
            .or_insert_with(|| SessionWindow::new(self.max_turns))
            .push(turn);
    }

    /// Context string for `id`, or the "no history" sentinel
    pub fn render_context(&self, id: &str) -> String {
        let windows = self.windows.read().unwrap_or_else(PoisonError::into_inner);
        windows
            .get(id)
            .map(SessionWindow::render)
            .unwrap_or_else(|| NO_HISTORY.to_string())
    }

    /// Copy of the turns currently held for `id`
    pub fn turns(&self, id: &str) -> Vec<ConversationTurn> {
        let windows = self.windows.read().unwrap_or_else(PoisonError::into_inner);
        windows
            .get(id)
            .map(|w| w.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, id: &str) -> usize {
        let windows = self.windows.read().unwrap_or_else(PoisonError::into_inner);
        windows.get(id).map_or(0, SessionWindow::len)
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn key_by(&self) -> SessionKey {
        self.key_by
    }
}

impl Default for SessionContextStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS, SessionKey::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_unknown_session_is_sentinel() {
        let store = SessionContextStore::default();
        assert_eq!(store.render_context("missing"), NO_HISTORY);
        assert_eq!(store.len("missing"), 0);
        assert!(store.turns("missing").is_empty());
    }

    #[test]
    fn test_window_evicts_oldest() {
        let store = SessionContextStore::default();
        for i in 1..=12 {
            store.append_turn(ConversationTurn::new("s1", "u1", format!("t{}", i)));
        }

        let turns = store.turns("s1");
        assert_eq!(turns.len(), 10);
        assert_eq!(turns.first().unwrap().input, "t3");
        assert_eq!(turns.last().unwrap().input, "t12");

        let rendered = store.render_context("s1");
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], "[1] user: t3");
        assert_eq!(lines[9], "[10] user: t12");
    }

    #[test]
    fn test_render_includes_reply() {
        let store = SessionContextStore::default();
        store.append_turn(ConversationTurn::new("s1", "u1", "hello").with_reply("hi there"));
        assert_eq!(store.render_context("s1"), "[1] user: hello | assistant: hi there");
    }

    #[test]
    fn test_keyed_by_user() {
        let store = SessionContextStore::new(5, SessionKey::User);
        store.append_turn(ConversationTurn::new("s1", "alice", "a"));
        store.append_turn(ConversationTurn::new("s2", "alice", "b"));

        assert_eq!(store.len("alice"), 2);
        assert_eq!(store.len("s1"), 0);
    }

    #[test]
    fn test_sessions_are_independent() {
        let store = SessionContextStore::new(2, SessionKey::Session);
        store.append_turn(ConversationTurn::new("s1", "u1", "a"));
        store.append_turn(ConversationTurn::new("s2", "u1", "b"));
        store.append_turn(ConversationTurn::new("s2", "u1", "c"));
        store.append_turn(ConversationTurn::new("s2", "u1", "d"));

        assert_eq!(store.len("s1"), 1);
        assert_eq!(store.render_context("s2"), "[1] user: c\n[2] user: d");
    }

    #[test]
    fn test_concurrent_appends_stay_bounded() {
        let store = Arc::new(SessionContextStore::default());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store.append_turn(ConversationTurn::new("shared", "u", format!("{}-{}", t, i)));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len("shared"), DEFAULT_MAX_TURNS);
    }
}
