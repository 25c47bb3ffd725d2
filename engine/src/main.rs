// Mnemo conversational memory
// Main entry point for the mnemo binary

use clap::Parser;
use mnemo_engine::cli::{Cli, Command};
use mnemo_engine::config::Config;
use mnemo_engine::handlers::{
    handle_get, handle_list, handle_merge, handle_migrate, OutputFormat,
};
use mnemo_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the configured level; RUST_LOG wins over both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Mnemo v{} ({} - {})", version, commit, timestamp);

    match cli.command {
        Command::Get { user } => handle_get(user, &config, format).await,

        Command::Merge { user, keywords } => {
            tracing::info!(user_id = %user, "Merging preferences");
            handle_merge(user, keywords, &config, format).await
        }

        Command::List => handle_list(&config, format).await,

        Command::Migrate => {
            tracing::info!("Checking durable ledger layout...");
            handle_migrate(&config, format).await
        }
    }
}
