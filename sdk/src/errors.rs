//! Error types and handling
//!
//! This module provides the error type used throughout the memory engine.
//! Every error implements the `MemoryErrorExt` trait which provides a
//! user-friendly hint and indicates whether retrying can help.
//!
//! None of these errors ever reach a request handler: reads and merges are
//! infallible from the caller's point of view. They surface only from the
//! durable storage path, the configuration loader, and the CLI.

use std::time::Duration;
use thiserror::Error;

/// Extension trait for memory errors
///
/// Provides additional context for errors, including a user-friendly hint
/// and recoverability information.
pub trait MemoryErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is a static string and never echoes file contents or paths.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors may succeed when the same operation is retried
    /// (a busy disk, a slow mount). Non-recoverable errors need the input
    /// itself to change before a retry can succeed.
    fn is_recoverable(&self) -> bool;
}

/// Main memory engine error type
///
/// # Error Categories
///
/// - **Configuration**: invalid or unreadable configuration
/// - **I/O**: the durable file could not be read or written
/// - **Decode**: the durable file exists but is not a valid ledger
/// - **Timeout**: a durable read or write exceeded its time budget
/// - **Task**: the blocking worker running the I/O died
///
/// # Examples
///
/// ```
/// use sdk::errors::{MemoryError, MemoryErrorExt};
/// use std::time::Duration;
///
/// let error = MemoryError::Timeout {
///     operation: "save",
///     budget: Duration::from_secs(5),
/// };
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal = MemoryError::Decode("expected value at line 1".to_string());
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum MemoryError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Durable storage errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("{operation} timed out after {budget:?}")]
    Timeout {
        operation: &'static str,
        budget: Duration,
    },

    // Background worker errors
    #[error("Storage task failed: {0}")]
    Task(String),
}

impl From<serde_json::Error> for MemoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl MemoryErrorExt for MemoryError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Io(_) => "Memory file could not be accessed. Check permissions and free space",
            Self::Decode(_) => "Memory file is corrupt. Restore it from a backup or remove it",
            Self::Timeout { .. } => "Disk is responding slowly. The write will be retried",
            Self::Task(_) => "Storage worker stopped unexpectedly. Try again",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::Decode(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: MemoryError = io.into();
        assert!(matches!(err, MemoryError::Io(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_json_error_becomes_decode() {
        let json_err = serde_json::from_str::<serde_json::Value>("{\"a\":").unwrap_err();
        let err: MemoryError = json_err.into();
        assert!(matches!(err, MemoryError::Decode(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_timeout_display() {
        let err = MemoryError::Timeout {
            operation: "load",
            budget: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "load timed out after 5s");
    }
}
