//! CLI interface for Mnemo
//!
//! Command-line access to the durable preference ledger using clap's
//! derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Mnemo conversational memory
///
/// Inspect and update the long-term preference ledger used by the
/// conversation service.
#[derive(Parser, Debug)]
#[command(name = "mnemo")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show a user's preferences
    Get {
        /// User identity
        user: String,
    },

    /// Merge keywords into a user's preferences
    Merge {
        /// User identity
        user: String,
        /// Keyword blob, e.g. "fishing,reading"
        keywords: String,
    },

    /// List every user in the ledger
    List,

    /// Load the durable file, upgrading older layouts
    Migrate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["mnemo", "list"]);
        assert!(matches!(cli.command, Command::List));
        assert!(!cli.json);
        assert!(cli.log.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["mnemo", "--json", "--log", "debug", "migrate"]);
        assert!(cli.json);
        assert_eq!(cli.log, Some("debug".to_string()));
        assert!(matches!(cli.command, Command::Migrate));
    }

    #[test]
    fn test_merge_command() {
        let cli = Cli::parse_from(["mnemo", "merge", "u1", "fishing,reading"]);
        if let Command::Merge { user, keywords } = cli.command {
            assert_eq!(user, "u1");
            assert_eq!(keywords, "fishing,reading");
        } else {
            panic!("Expected Merge command");
        }
    }

    #[test]
    fn test_get_with_config_path() {
        let cli = Cli::parse_from(["mnemo", "get", "u1", "--config", "/tmp/mnemo.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/mnemo.toml")));
        assert!(matches!(cli.command, Command::Get { user } if user == "u1"));
    }
}
