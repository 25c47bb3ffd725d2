//! Mnemo SDK
//!
//! Shared types for the memory engine and the request layer that calls it.
//! The request layer builds `ConversationTurn`s and reads the sentinel
//! strings; the engine owns everything else.

/// Error types and handling
pub mod errors;

/// Conversation types and sentinel values
pub mod types;

// Re-export commonly used types
pub use errors::{MemoryError, MemoryErrorExt};
pub use types::{
    is_none_sentinel, ConversationTurn, LEGACY_NONE_SENTINEL, NONE_SENTINEL, NO_HISTORY,
};
