//! Per-worker read replicas
//!
//! Reads serve from worker-local store replicas rather than crossing into
//! the coordinator. A replica is eventually consistent: it catches up from
//! the log on demand, either to the topic tail (`read_sync`, giving
//! read-your-writes for listings) or just to the coordinator's broadcast
//! loaded offset (`sync_to_writer`, the lazy path).

use crate::applier::Applier;
use crate::error::SchemaResult;
use crate::store::SchemaStore;
use crate::writer::{validate_end_offset, SeqWriter};
use futures::StreamExt;
use runnel_log::{LogClient, Offset, TopicPartition};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// A worker-local replica of the registry store.
pub struct StoreReplica {
    store: SchemaStore,
    client: Arc<dyn LogClient>,
    topic: TopicPartition,
    applied: AtomicI64,
    writer_offsets: watch::Receiver<Offset>,
}

impl StoreReplica {
    /// Create an empty replica wired to the writer's log client and offset
    /// broadcast.
    pub fn new(writer: &SeqWriter) -> Self {
        Self {
            store: SchemaStore::with_checker(writer.store().checker()),
            client: writer.client(),
            topic: writer.topic().clone(),
            applied: AtomicI64::new(-1),
            writer_offsets: writer.offset_watch(),
        }
    }

    pub fn store(&self) -> &SchemaStore {
        &self.store
    }

    /// Highest offset applied to this replica; `-1` before the first record.
    pub fn applied_offset(&self) -> Offset {
        self.applied.load(Ordering::SeqCst)
    }

    /// Catch up to the current tail of the internal topic. Establishes
    /// read-your-writes on this worker: everything committed before the call
    /// is visible afterwards.
    pub async fn read_sync(&self) -> SchemaResult<()> {
        let response = self.client.list_offsets(&self.topic).await?;
        let end = validate_end_offset(&self.topic, &response)?;
        let target = (end - 1).max(*self.writer_offsets.borrow());
        self.catch_up(target).await
    }

    /// Catch up only as far as the coordinator has applied. Cheaper than
    /// [`read_sync`](Self::read_sync) because it skips the list-offsets
    /// round trip; used for lazy background propagation.
    pub async fn sync_to_writer(&self) -> SchemaResult<()> {
        let target = *self.writer_offsets.borrow();
        self.catch_up(target).await
    }

    async fn catch_up(&self, offset: Offset) -> SchemaResult<()> {
        let applied = self.applied.load(Ordering::SeqCst);
        if offset <= applied {
            return Ok(());
        }

        debug!(from = applied + 1, to = offset, "replica catching up");
        let applier = Applier::new(&self.store);
        let mut stream = self.client.fetch_stream(&self.topic, applied + 1, offset + 1);
        while let Some(batch) = stream.next().await {
            for record in &batch?.records {
                applier.apply_record(record)?;
                self.applied.fetch_max(record.offset, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}
