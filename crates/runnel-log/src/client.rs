//! The `LogClient` trait and its response envelopes

use crate::error::LogResult;
use crate::record::{Offset, RecordBatch, TopicPartition};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Kafka-style logical error code carried inside responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    #[default]
    None,
    OffsetOutOfRange,
    UnknownTopicOrPartition,
    NotLeader,
    RequestTimedOut,
    Unknown,
}

impl ErrorCode {
    pub fn is_none(&self) -> bool {
        matches!(self, ErrorCode::None)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::None => "none",
            ErrorCode::OffsetOutOfRange => "offset_out_of_range",
            ErrorCode::UnknownTopicOrPartition => "unknown_topic_or_partition",
            ErrorCode::NotLeader => "not_leader",
            ErrorCode::RequestTimedOut => "request_timed_out",
            ErrorCode::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Per-partition entry in a [`ListOffsetsResponse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionOffset {
    pub partition: u32,
    /// End offset: the offset the next produced record will be assigned.
    pub offset: Offset,
    pub error_code: ErrorCode,
}

/// Per-topic entry in a [`ListOffsetsResponse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicOffsets {
    pub topic: String,
    pub partitions: Vec<PartitionOffset>,
}

/// Response to [`LogClient::list_offsets`].
///
/// Shaped like the wire protocol's response: a list of topics each holding a
/// list of partitions. Callers asking about a single partition validate that
/// exactly one of each came back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOffsetsResponse {
    pub topics: Vec<TopicOffsets>,
}

/// Response to [`LogClient::produce_record_batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceResponse {
    /// Offset assigned to the first record of the batch; the rest follow
    /// contiguously.
    pub base_offset: Offset,
    pub error_code: ErrorCode,
    pub error_message: Option<String>,
}

/// Client interface to a replicated log.
///
/// Implementations must be safe for concurrent use from multiple tasks; the
/// registry shares one client across its writer and read replicas.
#[async_trait]
pub trait LogClient: Send + Sync {
    /// Report the end offset of a partition.
    async fn list_offsets(&self, tp: &TopicPartition) -> LogResult<ListOffsetsResponse>;

    /// Append a batch to the log. The batch's records receive contiguous
    /// offsets starting at the returned `base_offset`.
    async fn produce_record_batch(
        &self,
        tp: &TopicPartition,
        batch: RecordBatch,
    ) -> LogResult<ProduceResponse>;

    /// Stream record batches covering `[start, end)`. Fetched records carry
    /// their authoritative offsets. The stream runs without a timeout; a
    /// slow log stalls the consumer rather than failing it.
    fn fetch_stream(
        &self,
        tp: &TopicPartition,
        start: Offset,
        end: Offset,
    ) -> BoxStream<'_, LogResult<RecordBatch>>;
}
