//! Integration tests for configuration management
//!
//! These tests verify that the Config struct can be loaded from disk,
//! validated, and turned into the memory subsystem's runtime settings.

use mnemo_engine::config::Config;
use mnemo_engine::memory::session::SessionKey;
use sdk::errors::MemoryError;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_config_toml_parsing() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    let toml_content = format!(
        r#"
[core]
log_level = "debug"
data_dir = "{}"

[session]
max_turns = 4
key_by = "user"

[preferences]
max_tokens = 8
extra_stop_words = ["weather"]

[persistence]
file_name = "prefs.json"
flush_interval_ms = 250
max_attempts = 5
retry_delay_ms = 10
io_timeout_ms = 2000
queue_capacity = 2
"#,
        data_dir.display()
    );

    let path = write_config(&dir, &toml_content);
    let config = Config::load_from_path(&path).unwrap();

    assert_eq!(config.core.log_level, "debug");
    assert_eq!(config.session.max_turns, 4);
    assert_eq!(config.session.key_by, SessionKey::User);
    assert_eq!(config.memory_file(), data_dir.join("prefs.json"));
    assert!(data_dir.exists(), "data_dir should be created on load");

    let policy = config.preferences.merge_policy();
    assert_eq!(policy.max_tokens(), 8);
    assert!(policy.is_stop_word("weather"));

    let writer = config.persistence.writer_config();
    assert_eq!(writer.flush_interval, Duration::from_millis(250));
    assert_eq!(writer.max_attempts, 5);
    assert_eq!(writer.retry_delay, Duration::from_millis(10));
    assert_eq!(writer.queue_capacity, 2);
    assert_eq!(config.persistence.io_timeout(), Duration::from_secs(2));
}

#[test]
fn test_missing_sections_use_defaults() {
    let dir = TempDir::new().unwrap();
    let toml_content = format!(
        r#"
[core]
data_dir = "{}"
"#,
        dir.path().display()
    );

    let config = Config::from_toml_str(&toml_content).unwrap();

    assert_eq!(config.core.log_level, "info");
    assert_eq!(config.session.max_turns, 10);
    assert_eq!(config.session.key_by, SessionKey::Session);
    assert_eq!(config.preferences.max_tokens, 20);
    assert_eq!(config.persistence.file_name, "long_term_memory.json");
    assert_eq!(config.persistence.retry_delay_ms, 100);
}

#[test]
fn test_invalid_log_level_rejected() {
    let err = Config::from_toml_str(
        r#"
[core]
log_level = "loud"
data_dir = "/tmp"
"#,
    )
    .unwrap_err();

    assert!(matches!(err, MemoryError::Config(_)));
    assert!(err.to_string().contains("Invalid log level"));
}

#[test]
fn test_zero_limits_rejected() {
    let dir = TempDir::new().unwrap();
    let cases = [
        "[session]\nmax_turns = 0",
        "[preferences]\nmax_tokens = 0",
        "[persistence]\nmax_attempts = 0",
        "[persistence]\nqueue_capacity = 0",
        "[persistence]\nflush_interval_ms = 0",
        "[persistence]\nio_timeout_ms = 0",
        "[persistence]\nfile_name = \"  \"",
    ];

    for case in cases {
        let body = format!(
            "[core]\ndata_dir = \"{}\"\n\n{}\n",
            dir.path().display(),
            case
        );
        let result = Config::from_toml_str(&body);
        assert!(
            matches!(result, Err(MemoryError::Config(_))),
            "expected rejection for {:?}",
            case
        );
    }
}

#[test]
fn test_unknown_key_by_rejected() {
    let err = Config::from_toml_str("[core]\ndata_dir = \"/tmp\"\n\n[session]\nkey_by = \"device\"\n")
        .unwrap_err();
    assert!(matches!(err, MemoryError::Config(_)));
    assert!(err.to_string().contains("Failed to parse config"));
}

#[test]
fn test_missing_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let err = Config::load_from_path(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, MemoryError::Config(_)));
}
