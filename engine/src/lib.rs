//! Mnemo Engine Library
//!
//! Conversational memory for a chat service: a bounded per-session turn
//! window and a durable per-user preference ledger. Used by the `mnemo`
//! binary and by integration tests.

/// Configuration management module
pub mod config;

/// Session and preference memory
pub mod memory;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
