//! The sequenced writer
//!
//! All registry mutations funnel through one `SeqWriter` per process, which
//! turns concurrent write requests (from any number of REST handlers and any
//! number of nodes) into a total order on the internal topic.
//!
//! The trick is optimistic sequencing: the writer predicts that its record
//! will land at `loaded_offset + 1`, stamps that prediction into the key's
//! `seq` field, produces, and compares the log's assigned base offset
//! against the prediction. A match means the write is authoritative and is
//! applied locally; a mismatch means another writer got there first, so the
//! writer catches up (which may turn the request into a no-op, e.g. the same
//! schema registered elsewhere) and retries under a bounded budget.
//!
//! Two independent permits serialize the hot paths: the write permit covers
//! a whole mutation (projection through apply), which is what makes offset
//! prediction sound on this node; the wait permit covers catch-up fetches so
//! a slow reader does not starve writers and vice versa.

use crate::applier::Applier;
use crate::compatibility::CompatibilityLevel;
use crate::config::RegistryConfig;
use crate::error::{SchemaError, SchemaResult};
use crate::keys::{
    as_record_batch, encode_key, ConfigKey, ConfigValue, DeleteSubjectKey, DeleteSubjectValue,
    SchemaKey, SchemaValue, TypedKey, TypedValue,
};
use crate::store::SchemaStore;
use crate::types::{KeyType, NodeId, SchemaDefinition, SchemaId, SchemaType, SchemaVersion, Subject};
use futures::StreamExt;
use runnel_log::{ErrorCode, ListOffsetsResponse, LogClient, Offset, RecordBatch, TopicPartition};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

/// Coordinator for all mutations of the registry.
///
/// Holds the authoritative store replica and the loaded offset: the highest
/// offset whose record has been applied to that replica. A successful return
/// from any mutating operation implies the record is durable in the log and
/// visible in this store.
pub struct SeqWriter {
    store: Arc<SchemaStore>,
    client: Arc<dyn LogClient>,
    topic: TopicPartition,
    node_id: NodeId,
    max_write_retries: u32,

    loaded_offset: AtomicI64,
    /// Serializes mutations; held from projection through local apply.
    write_lock: Mutex<()>,
    /// Serializes catch-up fetches, independent of the write permit.
    wait_lock: Mutex<()>,

    /// Broadcasts the loaded offset so read replicas can catch up lazily.
    offset_tx: watch::Sender<Offset>,
    /// Process-wide abort signal; checked at every suspension point.
    shutdown: watch::Sender<bool>,
}

impl SeqWriter {
    pub fn new(
        store: Arc<SchemaStore>,
        client: Arc<dyn LogClient>,
        config: &RegistryConfig,
    ) -> Self {
        Self {
            store,
            client,
            topic: config.topic_partition(),
            node_id: NodeId::new(config.node_id),
            max_write_retries: config.max_write_retries.max(1),
            loaded_offset: AtomicI64::new(-1),
            write_lock: Mutex::new(()),
            wait_lock: Mutex::new(()),
            offset_tx: watch::channel(-1).0,
            shutdown: watch::channel(false).0,
        }
    }

    /// The authoritative store replica.
    pub fn store(&self) -> &Arc<SchemaStore> {
        &self.store
    }

    /// Highest offset applied to the local store; `-1` before the first
    /// record.
    pub fn loaded_offset(&self) -> Offset {
        self.loaded_offset.load(Ordering::SeqCst)
    }

    /// Subscribe to loaded-offset advancement (consumed by read replicas).
    pub fn offset_watch(&self) -> watch::Receiver<Offset> {
        self.offset_tx.subscribe()
    }

    /// Signal shutdown: in-flight and future operations fail with `Aborted`.
    pub fn shutdown(&self) {
        info!("seq writer shutting down");
        self.shutdown.send_replace(true);
    }

    pub(crate) fn client(&self) -> Arc<dyn LogClient> {
        self.client.clone()
    }

    pub(crate) fn topic(&self) -> &TopicPartition {
        &self.topic
    }

    fn ensure_live(&self) -> SchemaResult<()> {
        if *self.shutdown.borrow() {
            return Err(SchemaError::Aborted);
        }
        Ok(())
    }

    // ========================================================================
    // Read synchronization
    // ========================================================================

    /// Catch the local store up to the current tail of the internal topic.
    ///
    /// Call this before serving any endpoint that needs global knowledge of
    /// the latest data (listings in particular): afterwards every record
    /// committed before the call is visible locally.
    pub async fn read_sync(&self) -> SchemaResult<()> {
        let response = self.client.list_offsets(&self.topic).await?;
        let end = validate_end_offset(&self.topic, &response)?;
        self.wait_for(end - 1).await
    }

    /// Ensure every record up to and including `offset` has been applied.
    pub async fn wait_for(&self, offset: Offset) -> SchemaResult<()> {
        let _permit = self.wait_lock.lock().await;
        self.ensure_live()?;

        let loaded = self.loaded_offset.load(Ordering::SeqCst);
        if offset <= loaded {
            debug!(offset, loaded, "wait_for clean");
            return Ok(());
        }

        debug!(from = loaded + 1, to = offset, "wait_for dirty, reading");
        let applier = Applier::new(&self.store);
        let mut stream = self.client.fetch_stream(&self.topic, loaded + 1, offset + 1);
        while let Some(batch) = stream.next().await {
            self.ensure_live()?;
            for record in &batch?.records {
                applier.apply_record(record)?;
                self.advance_offset_inner(record.offset);
            }
        }
        Ok(())
    }

    /// Notify the writer that a record at `offset` has been observed
    /// elsewhere; the coordinator catches up through it if it has not
    /// already.
    pub async fn advance_offset(&self, offset: Offset) -> SchemaResult<()> {
        self.wait_for(offset).await
    }

    fn advance_offset_inner(&self, offset: Offset) {
        let prev = self.loaded_offset.fetch_max(offset, Ordering::SeqCst);
        if prev < offset {
            debug!(from = prev, to = offset, "advancing loaded offset");
            self.offset_tx.send_replace(offset);
        } else {
            debug!(offset, loaded = prev, "ignoring stale offset advance");
        }
    }

    // ========================================================================
    // Sequenced writes
    // ========================================================================

    /// Register a schema under a subject.
    ///
    /// Idempotent: if the subject already holds this `(definition, type)` in
    /// a live version, the existing id comes back and nothing is written.
    pub async fn write_subject_version(
        &self,
        subject: Subject,
        definition: SchemaDefinition,
        schema_type: SchemaType,
    ) -> SchemaResult<SchemaId> {
        self.sequenced_write("write_subject_version", async |write_at| {
            let projected = self.store.project_ids(&subject, &definition, schema_type)?;
            if !projected.inserted {
                debug!(subject = %subject, id = %projected.id, "registration is a no-op");
                return Ok(Some(projected.id));
            }

            debug!(
                offset = write_at,
                subject = %subject,
                id = %projected.id,
                version = %projected.version,
                "writing schema version"
            );
            let key = TypedKey::Schema(SchemaKey {
                seq: write_at,
                node: self.node_id,
                subject: subject.clone(),
                version: projected.version,
            });
            let value = TypedValue::Schema(SchemaValue {
                subject: subject.clone(),
                version: projected.version,
                schema_type,
                id: projected.id,
                schema: definition.clone(),
                deleted: false,
            });

            if self.produce_and_check(write_at, as_record_batch(&key, &value)?).await? {
                self.apply_and_advance(write_at, &key, &value)?;
                Ok(Some(projected.id))
            } else {
                Ok(None)
            }
        })
        .await
    }

    /// Set the global (`subject = None`) or per-subject compatibility level.
    ///
    /// Returns `true` if a record was written, `false` when that level is
    /// already pinned at that scope.
    pub async fn write_config(
        &self,
        subject: Option<Subject>,
        compat: CompatibilityLevel,
    ) -> SchemaResult<bool> {
        self.sequenced_write("write_config", async |write_at| {
            if self.store.get_written_compatibility(subject.as_ref()) == Some(compat) {
                return Ok(Some(false));
            }

            debug!(subject = ?subject, %compat, offset = write_at, "writing config");
            let key = TypedKey::Config(ConfigKey {
                seq: write_at,
                node: self.node_id,
                subject: subject.clone(),
            });
            let value = TypedValue::Config(ConfigValue { compat });

            if self.produce_and_check(write_at, as_record_batch(&key, &value)?).await? {
                self.apply_and_advance(write_at, &key, &value)?;
                Ok(Some(true))
            } else {
                Ok(None)
            }
        })
        .await
    }

    /// Soft-delete one version: rewrite its record with `deleted = true`.
    pub async fn delete_subject_version(
        &self,
        subject: Subject,
        version: SchemaVersion,
    ) -> SchemaResult<bool> {
        self.sequenced_write("delete_subject_version", async |write_at| {
            let existing = self.store.get_subject_schema(&subject, version, true)?;

            debug!(subject = %subject, %version, offset = write_at, "soft-deleting version");
            let key = TypedKey::Schema(SchemaKey {
                seq: write_at,
                node: self.node_id,
                subject: subject.clone(),
                version,
            });
            let value = TypedValue::Schema(SchemaValue {
                subject: subject.clone(),
                version,
                schema_type: existing.schema_type,
                id: existing.id,
                schema: existing.definition.clone(),
                deleted: true,
            });

            if self.produce_and_check(write_at, as_record_batch(&key, &value)?).await? {
                self.apply_and_advance(write_at, &key, &value)?;
                Ok(Some(true))
            } else {
                Ok(None)
            }
        })
        .await
    }

    /// Soft-delete a whole subject. Returns its versions; idempotent once
    /// the subject is flagged deleted.
    pub async fn delete_subject_impermanent(
        &self,
        subject: Subject,
    ) -> SchemaResult<Vec<SchemaVersion>> {
        debug!(subject = %subject, "delete_subject_impermanent");
        self.sequenced_write("delete_subject_impermanent", async |write_at| {
            // Grab the versions before they are flagged.
            let versions = self.store.get_versions(&subject, true)?;
            if self.store.is_subject_deleted(&subject)? {
                return Ok(Some(versions));
            }

            let version = versions.last().copied().ok_or_else(|| {
                SchemaError::Internal(format!("subject {} has no versions", subject))
            })?;
            let key = TypedKey::DeleteSubject(DeleteSubjectKey {
                seq: write_at,
                node: self.node_id,
                subject: subject.clone(),
            });
            let value = TypedValue::DeleteSubject(DeleteSubjectValue {
                subject: subject.clone(),
                version,
            });

            if self.produce_and_check(write_at, as_record_batch(&key, &value)?).await? {
                self.apply_and_advance(write_at, &key, &value)?;
                Ok(Some(versions))
            } else {
                Ok(None)
            }
        })
        .await
    }

    /// Permanently delete a subject (or one of its versions) by tombstoning
    /// every record previously sequenced for it.
    ///
    /// Tombstones do not need sequencing: they are idempotent and
    /// order-insensitive, so the batch is produced without an offset check
    /// and replayed locally at whatever offsets the log assigned.
    pub async fn delete_subject_permanent(
        &self,
        subject: Subject,
        version: Option<SchemaVersion>,
    ) -> SchemaResult<Vec<SchemaVersion>> {
        let _permit = self.write_lock.lock().await;
        self.ensure_live()?;
        debug!(subject = %subject, ?version, "delete_subject_permanent");

        let markers = match version {
            Some(version) => self
                .store
                .get_subject_version_written_at(&subject, version)?,
            None => self.store.get_subject_written_at(&subject)?,
        };

        let mut builder = RecordBatch::builder();
        let mut keys = Vec::with_capacity(markers.len());
        for marker in &markers {
            let key = match marker.key_type {
                KeyType::Schema => {
                    let version = marker.version.ok_or_else(|| {
                        SchemaError::Internal("schema marker without version".to_string())
                    })?;
                    TypedKey::Schema(SchemaKey {
                        seq: marker.seq,
                        node: marker.node,
                        subject: subject.clone(),
                        version,
                    })
                }
                KeyType::Config => TypedKey::Config(ConfigKey {
                    seq: marker.seq,
                    node: marker.node,
                    subject: Some(subject.clone()),
                }),
                KeyType::DeleteSubject => TypedKey::DeleteSubject(DeleteSubjectKey {
                    seq: marker.seq,
                    node: marker.node,
                    subject: subject.clone(),
                }),
            };
            debug!(subject = %subject, %marker, "tombstoning");
            builder.add_raw_kv(encode_key(&key)?, None);
            keys.push(key);
        }

        // Anything present in the store was replayed from the log, so it
        // must have left markers behind.
        if keys.is_empty() {
            return Err(SchemaError::Internal(format!(
                "no sequence markers recorded for subject {}",
                subject
            )));
        }

        let response = self
            .client
            .produce_record_batch(&self.topic, builder.build())
            .await?;
        if !response.error_code.is_none() {
            error!(
                code = %response.error_code,
                message = response.error_message.as_deref().unwrap_or(""),
                "error writing tombstones to schema topic"
            );
            return Err(SchemaError::Backend {
                code: response.error_code,
                message: response.error_message.unwrap_or_default(),
            });
        }

        // Replay the persisted deletions into the local store; the log
        // assigned the batch contiguous offsets from base_offset.
        let applier = Applier::new(&self.store);
        let mut offset = response.base_offset;
        for key in &keys {
            applier.apply(offset, key, None)?;
            self.advance_offset_inner(offset);
            offset += 1;
        }

        let mut deleted: Vec<SchemaVersion> = Vec::new();
        for marker in &markers {
            if marker.key_type == KeyType::Schema {
                if let Some(version) = marker.version {
                    if !deleted.contains(&version) {
                        deleted.push(version);
                    }
                }
            }
        }
        Ok(deleted)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Run `do_write` under the write permit with offset prediction and a
    /// bounded retry budget. `do_write` returns `Ok(None)` when its write
    /// landed at the wrong offset; the loop catches up to the tail (the
    /// colliding record may have satisfied the request) and tries again.
    async fn sequenced_write<T>(
        &self,
        op: &'static str,
        mut do_write: impl AsyncFnMut(Offset) -> SchemaResult<Option<T>>,
    ) -> SchemaResult<T> {
        let _permit = self.write_lock.lock().await;
        for attempt in 0..self.max_write_retries {
            self.ensure_live()?;
            self.read_sync().await?;

            let write_at = self.loaded_offset.load(Ordering::SeqCst) + 1;
            if let Some(result) = do_write(write_at).await? {
                return Ok(result);
            }
            debug!(op, attempt, "lost the optimistic write race, retrying");
        }

        warn!(op, retries = self.max_write_retries, "write retry budget exhausted");
        Err(SchemaError::ExhaustedRetries(self.max_write_retries))
    }

    /// Produce `batch` and report whether it landed at `write_at`.
    async fn produce_and_check(&self, write_at: Offset, batch: RecordBatch) -> SchemaResult<bool> {
        let response = self.client.produce_record_batch(&self.topic, batch).await?;
        if !response.error_code.is_none() {
            return Err(SchemaError::Backend {
                code: response.error_code,
                message: response.error_message.unwrap_or_default(),
            });
        }

        let wrote_at = response.base_offset;
        if wrote_at == write_at {
            debug!(offset = wrote_at, "successful write");
            Ok(true)
        } else {
            debug!(expected = write_at, actual = wrote_at, "write landed at wrong offset");
            Ok(false)
        }
    }

    fn apply_and_advance(
        &self,
        write_at: Offset,
        key: &TypedKey,
        value: &TypedValue,
    ) -> SchemaResult<()> {
        Applier::new(&self.store).apply(write_at, key, Some(value))?;
        self.advance_offset_inner(write_at);
        Ok(())
    }
}

/// Validate a list-offsets response for the single-partition internal topic
/// and extract the end offset.
pub(crate) fn validate_end_offset(
    topic: &TopicPartition,
    response: &ListOffsetsResponse,
) -> SchemaResult<Offset> {
    let [topic_offsets] = response.topics.as_slice() else {
        return Err(SchemaError::UnknownTopicOrPartition(topic.to_string()));
    };
    let [partition] = topic_offsets.partitions.as_slice() else {
        return Err(SchemaError::UnknownTopicOrPartition(topic.to_string()));
    };

    match partition.error_code {
        code if code.is_none() => Ok(partition.offset),
        ErrorCode::UnknownTopicOrPartition => {
            Err(SchemaError::UnknownTopicOrPartition(topic.to_string()))
        }
        code => Err(SchemaError::Backend {
            code,
            message: format!("list_offsets failed for {}", topic),
        }),
    }
}
