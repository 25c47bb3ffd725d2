//! Conversational memory subsystem
//!
//! Two stores with different lifetimes:
//!
//! - [`session::SessionContextStore`] keeps the last few turns of each
//!   session in memory only.
//! - [`ledger::PersistenceLedger`] keeps each user's long-lived preference
//!   tokens, mirrored to disk by the background [`writer::AsyncWriter`]
//!   through [`codec::JsonStorageCodec`].
//!
//! [`MemorySystem`] wires the pieces together and owns their lifecycle.

pub mod codec;
pub mod ledger;
pub mod normalizer;
pub mod preference;
pub mod session;
pub mod writer;

use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use codec::{JsonStorageCodec, LedgerStore};
use ledger::PersistenceLedger;
use preference::MergePolicy;
use sdk::errors::MemoryError;
use session::SessionContextStore;
use writer::{AsyncWriter, WriterConfig, WriterStats};

/// Session store, preference ledger and writer under one handle
pub struct MemorySystem {
    sessions: Arc<SessionContextStore>,
    ledger: Arc<PersistenceLedger>,
    writer: AsyncWriter,
}

impl MemorySystem {
    /// Open the memory system described by `config`.
    ///
    /// Loads the durable ledger before returning. A missing or unreadable
    /// file leaves the ledger empty rather than failing.
    pub async fn open(config: &Config) -> Self {
        let policy = config.preferences.merge_policy();
        let codec = JsonStorageCodec::new(
            config.memory_file(),
            policy.clone(),
            config.persistence.io_timeout(),
        );

        info!(path = %codec.path().display(), "Opening memory system");

        Self::with_store(
            Arc::new(codec),
            SessionContextStore::new(config.session.max_turns, config.session.key_by),
            policy,
            config.persistence.writer_config(),
        )
        .await
    }

    /// Open against any [`LedgerStore`]
    pub async fn with_store(
        store: Arc<dyn LedgerStore>,
        sessions: SessionContextStore,
        policy: MergePolicy,
        writer_config: WriterConfig,
    ) -> Self {
        let writer = AsyncWriter::spawn(Arc::clone(&store), writer_config);
        let ledger = PersistenceLedger::new(policy, writer.handle());
        ledger.load_from_durable(store.as_ref()).await;

        Self {
            sessions: Arc::new(sessions),
            ledger: Arc::new(ledger),
            writer,
        }
    }

    pub fn sessions(&self) -> Arc<SessionContextStore> {
        Arc::clone(&self.sessions)
    }

    pub fn preferences(&self) -> Arc<PersistenceLedger> {
        Arc::clone(&self.ledger)
    }

    pub fn writer_stats(&self) -> WriterStats {
        self.writer.stats()
    }

    /// Flush pending preferences and stop the writer
    pub async fn close(self) -> Result<WriterStats, MemoryError> {
        let stats = self.writer.close().await?;
        info!(
            flushes_ok = stats.flushes_ok,
            batches_dropped = stats.batches_dropped,
            "Memory system closed"
        );
        Ok(stats)
    }
}
