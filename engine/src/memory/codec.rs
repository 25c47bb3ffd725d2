//! Durable JSON storage for the preference ledger
//!
//! The on-disk document is versioned:
//!
//! ```json
//! {
//!   "version": 2,
//!   "users": {
//!     "u1": {
//!       "items": [{ "value": "fishing", "created_at": "2024-05-01T08:00:00Z" }],
//!       "last_modified": "2024-05-01T08:00:00Z"
//!     }
//!   }
//! }
//! ```
//!
//! Older unversioned files are still read and upgraded in place:
//!
//! - flat: `{"u1": "fishing,reading"}`
//! - keyed: `{"u1": {"hobby": "fishing", "book": "reading"}}`
//! - items: `{"u1": {"items": [{"key": "...", "value": "...", "create_time": "..."}]}}`
//!
//! Writes go to a uniquely named sibling temp file which is synced and
//! renamed over the target, so a crash never leaves a half-written ledger
//! behind. Saves are serialized and never move backwards in generation: a
//! save that outlives its time budget keeps running, and must not clobber a
//! newer one that finished first.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::ledger::{LedgerEntry, LedgerSnapshot};
use super::normalizer::normalize;
use super::preference::{MergePolicy, PreferenceItem, PreferenceSet};
use sdk::errors::MemoryError;

/// Version written by [`JsonStorageCodec::save`]
pub const CURRENT_VERSION: u32 = 2;

/// Durable home of the ledger
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Read the whole ledger
    async fn load(&self) -> Result<LedgerSnapshot, MemoryError>;

    /// Replace the durable ledger with `snapshot`
    async fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), MemoryError>;
}

/// Unversioned layouts that are upgraded on load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LegacyFormat {
    /// `{}`
    Empty,
    /// User id to preference string
    Flat,
    /// User id to a map of named keywords
    Keyed,
    /// User id to a list of items with optional creation times
    Items,
}

/// What the loader found on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "format")]
pub enum SchemaKind {
    /// The file did not exist and an empty one was created
    Created,
    /// Already the current version
    Current,
    /// An older layout, rewritten in the current one
    Legacy(LegacyFormat),
}

/// Result of a load, including how the file was interpreted
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub snapshot: LedgerSnapshot,
    pub schema: SchemaKind,
}

#[derive(Debug, Serialize, Deserialize)]
struct DurableDocument {
    version: u32,
    #[serde(default)]
    users: BTreeMap<String, DurableUser>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DurableUser {
    #[serde(default)]
    items: Vec<PreferenceItem>,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LegacyUser {
    Flat(String),
    Items { items: Vec<LegacyItem> },
    Keyed(BTreeMap<String, String>),
}

#[derive(Debug, Deserialize)]
struct LegacyItem {
    value: String,
    #[serde(default)]
    create_time: Option<String>,
}

/// JSON file codec with a per-operation I/O budget
#[derive(Debug, Clone)]
pub struct JsonStorageCodec {
    path: PathBuf,
    policy: MergePolicy,
    io_timeout: Duration,
    /// Held for the whole of a blocking save; the generation last written
    last_written: Arc<Mutex<Option<u64>>>,
}

impl JsonStorageCodec {
    pub fn new(path: impl Into<PathBuf>, policy: MergePolicy, io_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            policy,
            io_timeout,
            last_written: Arc::new(Mutex::new(None)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the ledger and report which schema the file was in
    pub async fn load_with_report(&self) -> Result<LoadReport, MemoryError> {
        let codec = self.clone();
        run_blocking("ledger load", self.io_timeout, move || codec.load_blocking()).await
    }

    fn load_blocking(&self) -> Result<LoadReport, MemoryError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "Ledger file missing, creating an empty one");
                let snapshot = LedgerSnapshot::empty();
                self.save_blocking(&snapshot)?;
                return Ok(LoadReport {
                    snapshot,
                    schema: SchemaKind::Created,
                });
            }
            Err(e) => return Err(e.into()),
        };

        if raw.trim().is_empty() {
            return Err(MemoryError::Decode(format!(
                "{} is empty",
                self.path.display()
            )));
        }

        let value: serde_json::Value = serde_json::from_str(&raw)?;
        let report = if is_versioned(&value) {
            let document: DurableDocument = serde_json::from_value(value)?;
            if document.version != CURRENT_VERSION {
                return Err(MemoryError::Decode(format!(
                    "unsupported ledger version {}",
                    document.version
                )));
            }
            LoadReport {
                snapshot: self.decode_document(document),
                schema: SchemaKind::Current,
            }
        } else {
            let legacy: BTreeMap<String, LegacyUser> = serde_json::from_value(value)?;
            let format = detect_legacy_format(&legacy);
            let snapshot = self.upgrade_legacy(legacy);

            info!(
                path = %self.path.display(),
                format = ?format,
                users = snapshot.len(),
                "Upgrading legacy ledger file"
            );
            self.save_blocking(&snapshot)?;

            LoadReport {
                snapshot,
                schema: SchemaKind::Legacy(format),
            }
        };

        debug!(users = report.snapshot.len(), "Ledger decoded");
        Ok(report)
    }

    fn decode_document(&self, document: DurableDocument) -> LedgerSnapshot {
        let entries = document
            .users
            .into_iter()
            .filter_map(|(user_id, user)| {
                let preferences = PreferenceSet::from_items(user.items, &self.policy);
                if preferences.is_empty() {
                    debug!(user_id = %user_id, "Skipping user without preferences");
                    return None;
                }
                let entry = LedgerEntry {
                    user_id: user_id.clone(),
                    preferences,
                    last_modified: user.last_modified,
                };
                Some((user_id, entry))
            })
            .collect();

        LedgerSnapshot {
            entries,
            taken_at: Utc::now(),
            generation: 0,
        }
    }

    fn upgrade_legacy(&self, legacy: BTreeMap<String, LegacyUser>) -> LedgerSnapshot {
        let now = Utc::now();
        let mut entries = HashMap::new();

        for (user_id, user) in legacy {
            let items: Vec<PreferenceItem> = match user {
                LegacyUser::Flat(value) => stamp(&value, now),
                LegacyUser::Keyed(map) => map.values().flat_map(|v| stamp(v, now)).collect(),
                LegacyUser::Items { items } => items
                    .into_iter()
                    .flat_map(|item| {
                        let created_at = item
                            .create_time
                            .as_deref()
                            .and_then(parse_legacy_time)
                            .unwrap_or(now);
                        stamp(&item.value, created_at)
                    })
                    .collect(),
            };

            let preferences = PreferenceSet::from_items(items, &self.policy);
            if preferences.is_empty() {
                continue;
            }

            let last_modified = preferences
                .items()
                .iter()
                .map(|item| item.created_at)
                .max()
                .unwrap_or(now);

            entries.insert(
                user_id.clone(),
                LedgerEntry {
                    user_id,
                    preferences,
                    last_modified,
                },
            );
        }

        LedgerSnapshot {
            entries,
            taken_at: now,
            generation: 0,
        }
    }

    fn save_blocking(&self, snapshot: &LedgerSnapshot) -> Result<(), MemoryError> {
        let document = DurableDocument {
            version: CURRENT_VERSION,
            users: snapshot
                .entries
                .iter()
                .map(|(user_id, entry)| {
                    (
                        user_id.clone(),
                        DurableUser {
                            items: entry.preferences.items().to_vec(),
                            last_modified: entry.last_modified,
                        },
                    )
                })
                .collect(),
        };

        let bytes = serde_json::to_vec_pretty(&document)?;

        let mut last_written = self
            .last_written
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(last) = *last_written {
            if snapshot.generation < last {
                debug!(
                    generation = snapshot.generation,
                    last_written = last,
                    "Skipping save older than the file"
                );
                return Ok(());
            }
        }

        write_atomic(&self.path, &bytes)?;
        *last_written = Some(snapshot.generation);

        debug!(
            path = %self.path.display(),
            users = snapshot.len(),
            generation = snapshot.generation,
            "Ledger written"
        );
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for JsonStorageCodec {
    async fn load(&self) -> Result<LedgerSnapshot, MemoryError> {
        Ok(self.load_with_report().await?.snapshot)
    }

    async fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), MemoryError> {
        let codec = self.clone();
        let snapshot = snapshot.clone();
        run_blocking("ledger save", self.io_timeout, move || {
            codec.save_blocking(&snapshot)
        })
        .await
    }
}

/// Run blocking file I/O off the runtime, bounded by `budget`.
///
/// On timeout the caller stops waiting but the blocking work runs to
/// completion.
async fn run_blocking<T, F>(
    operation: &'static str,
    budget: Duration,
    f: F,
) -> Result<T, MemoryError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, MemoryError> + Send + 'static,
{
    match tokio::time::timeout(budget, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(MemoryError::Task(join.to_string())),
        Err(_) => Err(MemoryError::Timeout { operation, budget }),
    }
}

/// Write to a fresh temp file next to `path`, sync, then rename over `path`
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), MemoryError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn is_versioned(value: &serde_json::Value) -> bool {
    value
        .as_object()
        .map(|obj| {
            obj.get("version").is_some_and(serde_json::Value::is_u64)
                && obj.get("users").is_some_and(serde_json::Value::is_object)
        })
        .unwrap_or(false)
}

fn detect_legacy_format(legacy: &BTreeMap<String, LegacyUser>) -> LegacyFormat {
    match legacy.values().next() {
        None => LegacyFormat::Empty,
        Some(LegacyUser::Flat(_)) => LegacyFormat::Flat,
        Some(LegacyUser::Keyed(_)) => LegacyFormat::Keyed,
        Some(LegacyUser::Items { .. }) => LegacyFormat::Items,
    }
}

fn stamp(raw: &str, created_at: DateTime<Utc>) -> Vec<PreferenceItem> {
    normalize(raw)
        .into_iter()
        .map(|value| PreferenceItem { value, created_at })
        .collect()
}

/// Legacy files carry RFC 3339 or `YYYY-MM-DD HH:MM:SS` local-less times
fn parse_legacy_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
}
