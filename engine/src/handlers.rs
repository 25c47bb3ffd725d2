//! Command handlers for CLI operations
//!
//! - get: show one user's preference string
//! - merge: fold keywords into a user's preferences and flush
//! - list: show every ledger entry
//! - migrate: load the durable file and report the layout found

use anyhow::{Context, Result};
use serde_json::json;

use crate::config::Config;
use crate::memory::codec::{JsonStorageCodec, SchemaKind};
use crate::memory::ledger::PersistenceLedger;
use crate::memory::MemorySystem;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

fn codec_for(config: &Config) -> JsonStorageCodec {
    JsonStorageCodec::new(
        config.memory_file(),
        config.preferences.merge_policy(),
        config.persistence.io_timeout(),
    )
}

/// Read-only ledger loaded from the durable file
async fn load_ledger(config: &Config) -> PersistenceLedger {
    let codec = codec_for(config);
    let ledger = PersistenceLedger::in_memory(config.preferences.merge_policy());
    ledger.load_from_durable(&codec).await;
    ledger
}

/// Show a user's preferences
pub async fn handle_get(user: String, config: &Config, format: OutputFormat) -> Result<()> {
    let ledger = load_ledger(config).await;
    let preferences = ledger.get(&user);

    match format {
        OutputFormat::Text => println!("{}", preferences),
        OutputFormat::Json => {
            let output = json!({
                "user": user,
                "preferences": preferences,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Merge keywords and wait for them to reach disk
pub async fn handle_merge(
    user: String,
    keywords: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let system = MemorySystem::open(config).await;
    let merged = system.preferences().merge_and_set(&user, &keywords);

    let stats = system
        .close()
        .await
        .context("Failed to shut down memory writer")?;

    if stats.batches_dropped > 0 {
        anyhow::bail!(
            "Preferences for '{}' could not be written to {}",
            user,
            config.memory_file().display()
        );
    }

    match format {
        OutputFormat::Text => println!("{}", merged),
        OutputFormat::Json => {
            let output = json!({
                "user": user,
                "preferences": merged,
                "writer": stats,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// List every user in the ledger
pub async fn handle_list(config: &Config, format: OutputFormat) -> Result<()> {
    let ledger = load_ledger(config).await;
    let entries = ledger.entries();

    match format {
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No stored preferences");
                return Ok(());
            }

            println!("Preferences ({} users):", entries.len());
            println!();

            for entry in &entries {
                println!("User: {}", entry.user_id);
                println!("  Preferences: {}", entry.preferences);
                println!(
                    "  Last modified: {}",
                    entry.last_modified.format("%Y-%m-%d %H:%M:%S")
                );
                println!();
            }
        }
        OutputFormat::Json => {
            let users: Vec<_> = entries
                .iter()
                .map(|entry| {
                    json!({
                        "user": entry.user_id,
                        "items": entry.preferences.items(),
                        "last_modified": entry.last_modified,
                    })
                })
                .collect();
            let output = json!({
                "users": users,
                "count": entries.len(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Load the durable file, upgrading it when it uses an older layout
pub async fn handle_migrate(config: &Config, format: OutputFormat) -> Result<()> {
    let codec = codec_for(config);
    let report = codec
        .load_with_report()
        .await
        .with_context(|| format!("Failed to load {}", codec.path().display()))?;

    match format {
        OutputFormat::Text => {
            let found = match report.schema {
                SchemaKind::Created => "no file, created an empty one".to_string(),
                SchemaKind::Current => "already current".to_string(),
                SchemaKind::Legacy(legacy) => format!("upgraded from {:?} layout", legacy),
            };
            println!("{}: {}", codec.path().display(), found);
            println!("Users: {}", report.snapshot.len());
        }
        OutputFormat::Json => {
            let output = json!({
                "path": codec.path(),
                "schema": report.schema,
                "users": report.snapshot.len(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
