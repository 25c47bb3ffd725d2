//! Long-term preference ledger
//!
//! The in-memory map from user id to preference set is the source of truth
//! for every read. Mutations happen under one write lock; the lock is
//! released before the resulting full-ledger copy is handed to the
//! background writer, so no I/O ever runs while the lock is held.
//!
//! Copies can reach the writer out of order once the lock is released, so
//! each one carries a generation number assigned under the lock. The writer
//! and the codec only ever move forward in generation.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info, warn};

use super::codec::LedgerStore;
use super::normalizer::normalize;
use super::preference::{MergePolicy, PreferenceSet};
use super::writer::WriterHandle;
use sdk::types::NONE_SENTINEL;

/// One user's preferences and when they last changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub user_id: String,
    pub preferences: PreferenceSet,
    pub last_modified: DateTime<Utc>,
}

/// Immutable copy of the whole ledger at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub entries: HashMap<String, LedgerEntry>,
    pub taken_at: DateTime<Utc>,
    /// Mutation count of the ledger when the copy was taken. Zero for
    /// copies that were not produced by a mutation.
    pub generation: u64,
}

impl LedgerSnapshot {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
            taken_at: Utc::now(),
            generation: 0,
        }
    }

    /// Same copy tagged with `generation`
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Preference string per user, the logical content of the snapshot
    pub fn preference_strings(&self) -> HashMap<String, String> {
        self.entries
            .iter()
            .map(|(user, entry)| (user.clone(), entry.preferences.to_preference_string()))
            .collect()
    }
}

/// Authoritative user → preference map
pub struct PersistenceLedger {
    entries: RwLock<HashMap<String, LedgerEntry>>,
    /// Only advanced while `entries` is write-locked
    generation: AtomicU64,
    policy: MergePolicy,
    writer: Option<WriterHandle>,
}

impl PersistenceLedger {
    /// Ledger whose mutations are forwarded to a background writer
    pub fn new(policy: MergePolicy, writer: WriterHandle) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            policy,
            writer: Some(writer),
        }
    }

    /// Ledger without durability; mutations stay in memory
    pub fn in_memory(policy: MergePolicy) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            policy,
            writer: None,
        }
    }

    /// Populate the ledger from durable storage.
    ///
    /// Called once before serving requests. Any failure leaves the ledger
    /// empty and is only logged. Returns the number of users loaded.
    pub async fn load_from_durable(&self, store: &dyn LedgerStore) -> usize {
        let snapshot = match store.load().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Failed to load preference ledger, starting empty");
                return 0;
            }
        };

        let count = snapshot.len();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        *entries = snapshot.entries;
        drop(entries);

        info!(users = count, "Preference ledger loaded");
        count
    }

    /// Current preference string for `user_id`, or the "none" sentinel
    pub fn get(&self, user_id: &str) -> String {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(user_id)
            .map(|entry| entry.preferences.to_preference_string())
            .unwrap_or_else(|| NONE_SENTINEL.to_string())
    }

    /// Merge a raw keyword blob into the user's preferences.
    ///
    /// Returns the merged preference string. The change is visible to
    /// `get` immediately; durability follows on the writer's next flush.
    pub fn merge_and_set(&self, user_id: &str, raw_keywords: &str) -> String {
        let incoming = normalize(raw_keywords);
        if incoming.is_empty() {
            return self.get(user_id);
        }

        let (merged, snapshot) = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            let current = entries
                .get(user_id)
                .map(|entry| entry.preferences.clone());

            let now = Utc::now();
            let updated = current
                .clone()
                .unwrap_or_default()
                .merged(&incoming, &self.policy, now);

            if current.as_ref() == Some(&updated) {
                debug!(user_id = %user_id, "Merge produced no change");
                return updated.to_preference_string();
            }

            // Only stop-words for a user we have never seen
            if current.is_none() && updated.is_empty() {
                debug!(user_id = %user_id, "Merge left no tokens, nothing stored");
                return NONE_SENTINEL.to_string();
            }

            let merged = updated.to_preference_string();
            entries.insert(
                user_id.to_string(),
                LedgerEntry {
                    user_id: user_id.to_string(),
                    preferences: updated,
                    last_modified: now,
                },
            );

            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let snapshot = LedgerSnapshot {
                entries: entries.clone(),
                taken_at: now,
                generation,
            };
            (merged, snapshot)
        };

        if let Some(writer) = &self.writer {
            writer.submit(snapshot);
        }

        debug!(user_id = %user_id, preferences = %merged, "Preferences merged");
        merged
    }

    /// Copy of every entry, sorted by user id
    pub fn entries(&self) -> Vec<LedgerEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<LedgerEntry> = entries.values().cloned().collect();
        list.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        list
    }

    /// Full-ledger copy
    pub fn snapshot(&self) -> LedgerSnapshot {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        LedgerSnapshot {
            entries: entries.clone(),
            taken_at: Utc::now(),
            generation: self.generation.load(Ordering::SeqCst),
        }
    }

    /// Number of mutations applied since the ledger was created
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn policy(&self) -> &MergePolicy {
        &self.policy
    }
}
