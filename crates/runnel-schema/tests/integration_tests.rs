//! Integration tests for runnel-schema
//!
//! These drive the sequenced writer end-to-end over an in-memory log,
//! including the write-race paths: a wrapper log client either lies about
//! the assigned base offset once or keeps injecting competing records from
//! a phantom rival node.

use async_trait::async_trait;
use runnel_log::{
    ListOffsetsResponse, LogClient, LogResult, MemoryLog, ProduceResponse, Record, RecordBatch,
    TopicPartition,
};
use runnel_schema::keys::{encode_key, encode_value};
use runnel_schema::{
    CompatibilityLevel, NodeId, RegistryConfig, SchemaDefinition, SchemaError, SchemaId,
    SchemaKey, SchemaStore, SchemaType, SchemaValue, SchemaVersion, SeqWriter, StoreReplica,
    Subject, TypedKey, TypedValue,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const D1: &str = r#"{"type": "record", "name": "Order", "fields": [{"name": "id", "type": "long"}]}"#;
const D2: &str = r#"{"type": "record", "name": "Order", "fields": [{"name": "id", "type": "long"}, {"name": "note", "type": ["null", "string"], "default": null}]}"#;

fn topic() -> TopicPartition {
    RegistryConfig::default().topic_partition()
}

fn new_writer(log: Arc<dyn LogClient>, node: u32) -> SeqWriter {
    SeqWriter::new(Arc::new(SchemaStore::new()), log, &RegistryConfig::new(node))
}

fn setup() -> (Arc<MemoryLog>, SeqWriter) {
    let log = Arc::new(MemoryLog::new());
    log.create_topic(&topic());
    let writer = new_writer(log.clone(), 0);
    (log, writer)
}

fn subject() -> Subject {
    Subject::from("s1")
}

/// Lies about the assigned base offset for a number of produces, simulating
/// a writer that loses its predicted slot. The records still land where the
/// real log put them.
struct FlakyLog {
    inner: MemoryLog,
    lies_remaining: AtomicU32,
}

#[async_trait]
impl LogClient for FlakyLog {
    async fn list_offsets(&self, tp: &TopicPartition) -> LogResult<ListOffsetsResponse> {
        self.inner.list_offsets(tp).await
    }

    async fn produce_record_batch(
        &self,
        tp: &TopicPartition,
        batch: RecordBatch,
    ) -> LogResult<ProduceResponse> {
        let mut response = self.inner.produce_record_batch(tp, batch).await?;
        if self
            .lies_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            response.base_offset += 1;
        }
        Ok(response)
    }

    fn fetch_stream(
        &self,
        tp: &TopicPartition,
        start: i64,
        end: i64,
    ) -> futures::stream::BoxStream<'_, LogResult<RecordBatch>> {
        self.inner.fetch_stream(tp, start, end)
    }
}

/// Before each produce, appends a schema record from a phantom rival node,
/// stealing the offset the caller predicted.
struct RacingLog {
    inner: MemoryLog,
    races_remaining: AtomicU32,
    rivals: AtomicU32,
}

impl RacingLog {
    fn new(inner: MemoryLog, races: u32) -> Self {
        Self {
            inner,
            races_remaining: AtomicU32::new(races),
            rivals: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl LogClient for RacingLog {
    async fn list_offsets(&self, tp: &TopicPartition) -> LogResult<ListOffsetsResponse> {
        self.inner.list_offsets(tp).await
    }

    async fn produce_record_batch(
        &self,
        tp: &TopicPartition,
        batch: RecordBatch,
    ) -> LogResult<ProduceResponse> {
        if self
            .races_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            let n = self.rivals.fetch_add(1, Ordering::SeqCst);
            let seq = self.inner.record_count(tp) as i64;
            let rival_subject = Subject::from(format!("rival-{n}-value"));
            let key = TypedKey::Schema(SchemaKey {
                seq,
                node: NodeId::new(99),
                subject: rival_subject.clone(),
                version: SchemaVersion::new(1),
            });
            let value = TypedValue::Schema(SchemaValue {
                subject: rival_subject,
                version: SchemaVersion::new(1),
                schema_type: SchemaType::Avro,
                id: SchemaId::new(1000 + n),
                schema: SchemaDefinition::from(format!(r#"{{"type": "rival{n}"}}"#)),
                deleted: false,
            });
            let rival = RecordBatch {
                records: vec![Record::new(
                    encode_key(&key).unwrap(),
                    encode_value(&value).unwrap(),
                )],
            };
            self.inner.produce_record_batch(tp, rival).await?;
        }
        self.inner.produce_record_batch(tp, batch).await
    }

    fn fetch_stream(
        &self,
        tp: &TopicPartition,
        start: i64,
        end: i64,
    ) -> futures::stream::BoxStream<'_, LogResult<RecordBatch>> {
        self.inner.fetch_stream(tp, start, end)
    }
}

#[tokio::test]
async fn concurrent_registration_of_same_schema_writes_once() {
    let (log, writer_a) = setup();
    let writer_b = new_writer(log.clone(), 1);

    let id_a = writer_a
        .write_subject_version(subject(), D1.into(), SchemaType::Avro)
        .await
        .unwrap();

    // Node B registers the same schema: its catch-up makes the request a
    // no-op, so both nodes see one id and the log holds one record.
    let id_b = writer_b
        .write_subject_version(subject(), D1.into(), SchemaType::Avro)
        .await
        .unwrap();

    assert_eq!(id_a, id_b);
    assert_eq!(log.record_count(&topic()), 1);
    assert_eq!(
        writer_b.store().get_versions(&subject(), false).unwrap(),
        vec![SchemaVersion::new(1)]
    );
}

#[tokio::test]
async fn soft_deleted_versions_stay_visible_with_flag() {
    let (_log, writer) = setup();

    writer
        .write_subject_version(subject(), D1.into(), SchemaType::Avro)
        .await
        .unwrap();
    writer
        .write_subject_version(subject(), D2.into(), SchemaType::Avro)
        .await
        .unwrap();

    assert!(writer
        .delete_subject_version(subject(), SchemaVersion::new(1))
        .await
        .unwrap());

    let store = writer.store();
    assert_eq!(
        store.get_versions(&subject(), false).unwrap(),
        vec![SchemaVersion::new(2)]
    );
    assert_eq!(
        store.get_versions(&subject(), true).unwrap(),
        vec![SchemaVersion::new(1), SchemaVersion::new(2)]
    );
    assert!(store
        .get_subject_schema(&subject(), SchemaVersion::new(1), true)
        .unwrap()
        .deleted);
}

#[tokio::test]
async fn writing_same_config_twice_is_a_noop() {
    let (log, writer) = setup();

    assert!(writer
        .write_config(None, CompatibilityLevel::Backward)
        .await
        .unwrap());
    assert!(!writer
        .write_config(None, CompatibilityLevel::Backward)
        .await
        .unwrap());
    assert_eq!(log.record_count(&topic()), 1);

    // Per-subject override is independent of the global level.
    assert!(writer
        .write_config(Some(subject()), CompatibilityLevel::Full)
        .await
        .unwrap());
    assert_eq!(
        writer.store().get_compatibility(Some(&subject())),
        CompatibilityLevel::Full
    );
    assert_eq!(
        writer.store().get_compatibility(None),
        CompatibilityLevel::Backward
    );
}

#[tokio::test]
async fn permanent_delete_tombstones_every_sequenced_record() {
    let (log, writer) = setup();

    writer
        .write_subject_version(subject(), D1.into(), SchemaType::Avro)
        .await
        .unwrap();
    writer
        .write_config(Some(subject()), CompatibilityLevel::Full)
        .await
        .unwrap();
    let soft = writer.delete_subject_impermanent(subject()).await.unwrap();
    assert_eq!(soft, vec![SchemaVersion::new(1)]);

    let hard = writer
        .delete_subject_permanent(subject(), None)
        .await
        .unwrap();
    assert_eq!(hard, vec![SchemaVersion::new(1)]);

    // Three sequenced records, then one tombstone for each of them.
    let records = log.records(&topic());
    assert_eq!(records.len(), 6);
    assert!(records[..3].iter().all(|r| !r.is_tombstone()));
    assert!(records[3..].iter().all(|r| r.is_tombstone()));

    // The subject is gone from the live store...
    assert!(matches!(
        writer.store().get_versions(&subject(), true),
        Err(SchemaError::SubjectNotFound(_))
    ));
    assert!(writer.store().list_subjects(true).is_empty());

    // ...and from any store rebuilt by replaying the topic from offset 0.
    let rebuilt = new_writer(log.clone(), 2);
    rebuilt.read_sync().await.unwrap();
    assert!(rebuilt.store().list_subjects(true).is_empty());
    assert!(rebuilt.store().projection_eq(writer.store()));
}

#[tokio::test]
async fn permanent_delete_of_single_version_keeps_the_rest() {
    let (_log, writer) = setup();

    writer
        .write_subject_version(subject(), D1.into(), SchemaType::Avro)
        .await
        .unwrap();
    writer
        .write_subject_version(subject(), D2.into(), SchemaType::Avro)
        .await
        .unwrap();
    writer
        .delete_subject_version(subject(), SchemaVersion::new(1))
        .await
        .unwrap();

    let hard = writer
        .delete_subject_permanent(subject(), Some(SchemaVersion::new(1)))
        .await
        .unwrap();
    assert_eq!(hard, vec![SchemaVersion::new(1)]);

    assert_eq!(
        writer.store().get_versions(&subject(), true).unwrap(),
        vec![SchemaVersion::new(2)]
    );
}

#[tokio::test]
async fn permanent_delete_of_unknown_subject_is_not_found() {
    let (_log, writer) = setup();
    assert!(matches!(
        writer.delete_subject_permanent(subject(), None).await,
        Err(SchemaError::SubjectNotFound(_))
    ));
}

#[tokio::test]
async fn lost_offset_race_retries_transparently() {
    let inner = MemoryLog::new();
    inner.create_topic(&topic());
    let log = Arc::new(FlakyLog {
        inner,
        lies_remaining: AtomicU32::new(1),
    });
    let writer = new_writer(log.clone(), 0);

    // First produce reports the wrong base offset; the writer catches up,
    // finds its own record won after all, and returns the id. From the
    // caller's side this is indistinguishable from a single-attempt success.
    let id = writer
        .write_subject_version(subject(), D1.into(), SchemaType::Avro)
        .await
        .unwrap();
    assert_eq!(id, SchemaId::new(1));
    assert_eq!(log.inner.record_count(&topic()), 1);
    assert_eq!(
        writer.store().get_versions(&subject(), false).unwrap(),
        vec![SchemaVersion::new(1)]
    );
}

#[tokio::test]
async fn rival_records_are_skipped_and_write_retried() {
    let inner = MemoryLog::new();
    inner.create_topic(&topic());
    let log = Arc::new(RacingLog::new(inner, 1));
    let writer = new_writer(log.clone(), 0);

    let id = writer
        .write_subject_version(subject(), D1.into(), SchemaType::Avro)
        .await
        .unwrap();

    // Offset 0: rival record. Offset 1: our mis-sequenced first attempt,
    // skipped by every replayer. Offset 2: the successful retry.
    assert_eq!(log.inner.record_count(&topic()), 3);
    assert_eq!(
        writer.store().get_versions(&subject(), false).unwrap(),
        vec![SchemaVersion::new(1)]
    );

    // A rebuilt store agrees: the mis-sequenced record changed nothing.
    let rebuilt = new_writer(log.clone(), 1);
    rebuilt.read_sync().await.unwrap();
    assert!(rebuilt.store().projection_eq(writer.store()));
    assert_eq!(
        rebuilt
            .store()
            .get_subject_schema(&subject(), SchemaVersion::new(1), false)
            .unwrap()
            .id,
        id
    );
}

#[tokio::test]
async fn persistent_collisions_exhaust_the_retry_budget() {
    let inner = MemoryLog::new();
    inner.create_topic(&topic());
    let log = Arc::new(RacingLog::new(inner, u32::MAX));
    let store = Arc::new(SchemaStore::new());
    let config = RegistryConfig::new(0).with_max_write_retries(3);
    let writer = SeqWriter::new(store, log, &config);

    let err = writer
        .write_subject_version(subject(), D1.into(), SchemaType::Avro)
        .await
        .unwrap_err();
    assert!(matches!(err, SchemaError::ExhaustedRetries(3)));
}

#[tokio::test]
async fn replica_read_sync_observes_remote_writes() {
    let (_log, writer) = setup();
    let replica = StoreReplica::new(&writer);

    writer
        .write_subject_version(subject(), D1.into(), SchemaType::Avro)
        .await
        .unwrap();

    // Nothing is visible on the replica until it syncs.
    assert!(replica.store().get_versions(&subject(), false).is_err());

    replica.read_sync().await.unwrap();
    assert_eq!(
        replica.store().get_versions(&subject(), false).unwrap(),
        vec![SchemaVersion::new(1)]
    );
    assert_eq!(replica.applied_offset(), writer.loaded_offset());
    assert!(replica.store().projection_eq(writer.store()));
}

#[tokio::test]
async fn replica_lazy_sync_follows_offset_broadcast() {
    let (_log, writer) = setup();
    let replica = StoreReplica::new(&writer);

    writer
        .write_subject_version(subject(), D1.into(), SchemaType::Avro)
        .await
        .unwrap();

    replica.sync_to_writer().await.unwrap();
    assert_eq!(replica.applied_offset(), writer.loaded_offset());
}

#[tokio::test]
async fn advance_offset_catches_the_coordinator_up() {
    let (log, writer_a) = setup();
    let writer_b = new_writer(log.clone(), 1);

    writer_a
        .write_subject_version(subject(), D1.into(), SchemaType::Avro)
        .await
        .unwrap();

    writer_b.advance_offset(writer_a.loaded_offset()).await.unwrap();
    assert_eq!(writer_b.loaded_offset(), writer_a.loaded_offset());
    assert!(writer_b.store().projection_eq(writer_a.store()));
}

#[tokio::test]
async fn soft_delete_then_reregister_returns_original_id() {
    let (_log, writer) = setup();

    let original = writer
        .write_subject_version(subject(), D1.into(), SchemaType::Avro)
        .await
        .unwrap();
    writer.delete_subject_impermanent(subject()).await.unwrap();

    let again = writer
        .write_subject_version(subject(), D1.into(), SchemaType::Avro)
        .await
        .unwrap();
    assert_eq!(again, original);

    // The subject is live again under a fresh version.
    assert!(!writer.store().is_subject_deleted(&subject()).unwrap());
    assert_eq!(
        writer.store().get_versions(&subject(), false).unwrap(),
        vec![SchemaVersion::new(2)]
    );
}

#[tokio::test]
async fn impermanent_delete_is_idempotent() {
    let (log, writer) = setup();

    writer
        .write_subject_version(subject(), D1.into(), SchemaType::Avro)
        .await
        .unwrap();

    let first = writer.delete_subject_impermanent(subject()).await.unwrap();
    let count = log.record_count(&topic());
    let second = writer.delete_subject_impermanent(subject()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(log.record_count(&topic()), count);
}

#[tokio::test]
async fn identical_definition_shares_id_across_subjects() {
    let (_log, writer) = setup();

    let id_a = writer
        .write_subject_version(Subject::from("s1"), D1.into(), SchemaType::Avro)
        .await
        .unwrap();
    let id_b = writer
        .write_subject_version(Subject::from("s2"), D1.into(), SchemaType::Avro)
        .await
        .unwrap();

    assert_eq!(id_a, id_b);
    assert_eq!(
        writer.store().get_versions(&Subject::from("s2"), false).unwrap(),
        vec![SchemaVersion::new(1)]
    );
}

#[tokio::test]
async fn read_sync_fails_without_the_internal_topic() {
    let log = Arc::new(MemoryLog::new());
    let writer = new_writer(log, 0);

    assert!(matches!(
        writer.read_sync().await,
        Err(SchemaError::UnknownTopicOrPartition(_))
    ));
}

#[tokio::test]
async fn shutdown_aborts_pending_operations() {
    let (_log, writer) = setup();
    writer.shutdown();

    assert!(matches!(
        writer
            .write_subject_version(subject(), D1.into(), SchemaType::Avro)
            .await,
        Err(SchemaError::Aborted)
    ));
    assert!(matches!(writer.read_sync().await, Err(SchemaError::Aborted)));
}

#[tokio::test]
async fn bootstrap_rebuilds_full_state() {
    let (log, writer) = setup();

    writer
        .write_subject_version(subject(), D1.into(), SchemaType::Avro)
        .await
        .unwrap();
    writer
        .write_subject_version(subject(), D2.into(), SchemaType::Avro)
        .await
        .unwrap();
    writer
        .write_config(None, CompatibilityLevel::FullTransitive)
        .await
        .unwrap();
    writer
        .delete_subject_version(subject(), SchemaVersion::new(1))
        .await
        .unwrap();

    let rebuilt = new_writer(log.clone(), 3);
    rebuilt.read_sync().await.unwrap();

    assert_eq!(rebuilt.loaded_offset(), writer.loaded_offset());
    assert!(rebuilt.store().projection_eq(writer.store()));
    assert_eq!(
        rebuilt.store().get_compatibility(None),
        CompatibilityLevel::FullTransitive
    );
}
