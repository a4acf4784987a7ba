//! In-process log for development and testing
//!
//! A `MemoryLog` is a map of topic partitions to record vectors with
//! contiguous offset assignment. It implements [`LogClient`] faithfully
//! enough to exercise the registry's sequencing logic: offsets are assigned
//! under a single lock, fetches observe a consistent snapshot, and
//! list-offsets reports the exact end offset at the time of the call.

use crate::client::{
    ErrorCode, ListOffsetsResponse, LogClient, PartitionOffset, ProduceResponse, TopicOffsets,
};
use crate::error::{LogError, LogResult};
use crate::record::{Offset, Record, RecordBatch, TopicPartition};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// How many records a single fetched batch carries.
const FETCH_BATCH_SIZE: usize = 64;

/// In-memory implementation of [`LogClient`].
pub struct MemoryLog {
    partitions: RwLock<HashMap<TopicPartition, Vec<Record>>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a partition with an empty log. Producing to an unknown
    /// partition also creates it; list-offsets and fetch do not.
    pub fn create_topic(&self, tp: &TopicPartition) {
        self.partitions.write().entry(tp.clone()).or_default();
    }

    /// Number of records currently in the partition.
    pub fn record_count(&self, tp: &TopicPartition) -> usize {
        self.partitions.read().get(tp).map_or(0, Vec::len)
    }

    /// Snapshot of the partition's records, in offset order.
    pub fn records(&self, tp: &TopicPartition) -> Vec<Record> {
        self.partitions.read().get(tp).cloned().unwrap_or_default()
    }
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogClient for MemoryLog {
    async fn list_offsets(&self, tp: &TopicPartition) -> LogResult<ListOffsetsResponse> {
        let partitions = self.partitions.read();
        let (offset, error_code) = match partitions.get(tp) {
            Some(records) => (records.len() as Offset, ErrorCode::None),
            None => (-1, ErrorCode::UnknownTopicOrPartition),
        };

        Ok(ListOffsetsResponse {
            topics: vec![TopicOffsets {
                topic: tp.topic.clone(),
                partitions: vec![PartitionOffset {
                    partition: tp.partition,
                    offset,
                    error_code,
                }],
            }],
        })
    }

    async fn produce_record_batch(
        &self,
        tp: &TopicPartition,
        batch: RecordBatch,
    ) -> LogResult<ProduceResponse> {
        let mut partitions = self.partitions.write();
        let records = partitions.entry(tp.clone()).or_default();
        let base_offset = records.len() as Offset;

        for (i, mut record) in batch.records.into_iter().enumerate() {
            record.offset = base_offset + i as Offset;
            records.push(record);
        }

        debug!(%tp, base_offset, end = records.len(), "appended batch");
        Ok(ProduceResponse {
            base_offset,
            error_code: ErrorCode::None,
            error_message: None,
        })
    }

    fn fetch_stream(
        &self,
        tp: &TopicPartition,
        start: Offset,
        end: Offset,
    ) -> BoxStream<'_, LogResult<RecordBatch>> {
        let partitions = self.partitions.read();
        let Some(records) = partitions.get(tp) else {
            let err = LogError::UnknownTopicOrPartition(tp.to_string());
            return Box::pin(stream::iter([Err(err)]));
        };

        let log_end = records.len() as Offset;
        let start = start.max(0);
        let end = end.min(log_end);

        let mut batches = Vec::new();
        if start < end {
            for chunk in records[start as usize..end as usize].chunks(FETCH_BATCH_SIZE) {
                batches.push(Ok(RecordBatch {
                    records: chunk.to_vec(),
                }));
            }
        }

        Box::pin(stream::iter(batches))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::StreamExt;

    fn tp() -> TopicPartition {
        TopicPartition::new("_schemas", 0)
    }

    fn record(key: &str, value: &str) -> Record {
        Record::new(
            Bytes::copy_from_slice(key.as_bytes()),
            Bytes::copy_from_slice(value.as_bytes()),
        )
    }

    #[tokio::test]
    async fn produce_assigns_contiguous_offsets() {
        let log = MemoryLog::new();
        let batch = RecordBatch {
            records: vec![record("a", "1"), record("b", "2")],
        };
        let res = log.produce_record_batch(&tp(), batch).await.unwrap();
        assert_eq!(res.base_offset, 0);
        assert!(res.error_code.is_none());

        let res = log
            .produce_record_batch(
                &tp(),
                RecordBatch {
                    records: vec![record("c", "3")],
                },
            )
            .await
            .unwrap();
        assert_eq!(res.base_offset, 2);

        let records = log.records(&tp());
        let offsets: Vec<_> = records.iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn list_offsets_reports_end_offset() {
        let log = MemoryLog::new();
        log.create_topic(&tp());

        let res = log.list_offsets(&tp()).await.unwrap();
        assert_eq!(res.topics.len(), 1);
        assert_eq!(res.topics[0].partitions[0].offset, 0);
        assert!(res.topics[0].partitions[0].error_code.is_none());

        log.produce_record_batch(
            &tp(),
            RecordBatch {
                records: vec![record("a", "1")],
            },
        )
        .await
        .unwrap();

        let res = log.list_offsets(&tp()).await.unwrap();
        assert_eq!(res.topics[0].partitions[0].offset, 1);
    }

    #[tokio::test]
    async fn list_offsets_unknown_topic_sets_error_code() {
        let log = MemoryLog::new();
        let res = log.list_offsets(&tp()).await.unwrap();
        assert_eq!(
            res.topics[0].partitions[0].error_code,
            ErrorCode::UnknownTopicOrPartition
        );
    }

    #[tokio::test]
    async fn fetch_streams_requested_range() {
        let log = MemoryLog::new();
        let records: Vec<_> = (0..100)
            .map(|i| record(&format!("k{i}"), &format!("v{i}")))
            .collect();
        log.produce_record_batch(&tp(), RecordBatch { records })
            .await
            .unwrap();

        let mut fetched = Vec::new();
        let mut stream = log.fetch_stream(&tp(), 10, 90);
        while let Some(batch) = stream.next().await {
            fetched.extend(batch.unwrap().records);
        }

        assert_eq!(fetched.len(), 80);
        assert_eq!(fetched.first().unwrap().offset, 10);
        assert_eq!(fetched.last().unwrap().offset, 89);
    }

    #[tokio::test]
    async fn fetch_unknown_topic_fails() {
        let log = MemoryLog::new();
        let mut stream = log.fetch_stream(&tp(), 0, 10);
        let first = stream.next().await.unwrap();
        assert!(matches!(first, Err(LogError::UnknownTopicOrPartition(_))));
    }

    #[tokio::test]
    async fn fetch_past_end_is_clamped() {
        let log = MemoryLog::new();
        log.produce_record_batch(
            &tp(),
            RecordBatch {
                records: vec![record("a", "1")],
            },
        )
        .await
        .unwrap();

        let mut stream = log.fetch_stream(&tp(), 0, 1000);
        let mut fetched = Vec::new();
        while let Some(batch) = stream.next().await {
            fetched.extend(batch.unwrap().records);
        }
        assert_eq!(fetched.len(), 1);
    }
}
