//! Records, batches, and topic addressing

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Log offset. Kafka-style: assigned by the log, non-negative once assigned.
/// `-1` is the conventional "nothing loaded yet" sentinel, so that the next
/// offset to read is always `loaded + 1`.
pub type Offset = i64;

/// A topic/partition pair addressing one ordered log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: u32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: u32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl std::fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.topic, self.partition)
    }
}

/// A single log record.
///
/// `offset` is assigned by the log: it is `0` on records handed to
/// `produce_record_batch` and authoritative on records coming back from a
/// fetch. An absent `value` is a tombstone: under compaction it erases every
/// earlier record carrying the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub offset: Offset,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub timestamp: DateTime<Utc>,
}

impl Record {
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            offset: 0,
            key: Some(key.into()),
            value: Some(value.into()),
            timestamp: Utc::now(),
        }
    }

    /// A tombstone for `key`: present key, absent value.
    pub fn tombstone(key: impl Into<Bytes>) -> Self {
        Self {
            offset: 0,
            key: Some(key.into()),
            value: None,
            timestamp: Utc::now(),
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

/// An ordered batch of records produced (and fetched) together.
///
/// The log assigns the batch's records contiguous offsets starting at the
/// produce response's `base_offset`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordBatch {
    pub records: Vec<Record>,
}

impl RecordBatch {
    pub fn builder() -> RecordBatchBuilder {
        RecordBatchBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Builder assembling a [`RecordBatch`] from raw key/value pairs.
#[derive(Debug, Default)]
pub struct RecordBatchBuilder {
    records: Vec<Record>,
}

impl RecordBatchBuilder {
    /// Append a raw key/value pair; `None` value appends a tombstone.
    pub fn add_raw_kv(&mut self, key: Bytes, value: Option<Bytes>) -> &mut Self {
        self.records.push(Record {
            offset: 0,
            key: Some(key),
            value,
            timestamp: Utc::now(),
        });
        self
    }

    pub fn build(self) -> RecordBatch {
        RecordBatch {
            records: self.records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tombstone_has_no_value() {
        let r = Record::tombstone(Bytes::from_static(b"k"));
        assert!(r.is_tombstone());
        assert_eq!(r.key.as_deref(), Some(b"k".as_slice()));
    }

    #[test]
    fn builder_preserves_order_and_tombstones() {
        let mut b = RecordBatch::builder();
        b.add_raw_kv(Bytes::from_static(b"a"), Some(Bytes::from_static(b"1")));
        b.add_raw_kv(Bytes::from_static(b"b"), None);
        let batch = b.build();

        assert_eq!(batch.len(), 2);
        assert!(!batch.records[0].is_tombstone());
        assert!(batch.records[1].is_tombstone());
    }

    #[test]
    fn topic_partition_display() {
        let tp = TopicPartition::new("_schemas", 0);
        assert_eq!(tp.to_string(), "_schemas/0");
    }
}
