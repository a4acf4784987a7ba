//! Log client errors

use thiserror::Error;

/// Result type for log operations
pub type LogResult<T> = Result<T, LogError>;

/// Errors surfaced by a [`LogClient`](crate::LogClient) implementation.
///
/// Logical per-partition failures (e.g. an unknown topic in a list-offsets
/// response) travel inside the response types as [`ErrorCode`](crate::ErrorCode)
/// values, mirroring the wire protocol; `LogError` is for failures of the
/// operation itself.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("unknown topic or partition: {0}")]
    UnknownTopicOrPartition(String),

    #[error("offset {offset} out of range for {topic_partition} (log end {log_end})")]
    OffsetOutOfRange {
        topic_partition: String,
        offset: i64,
        log_end: i64,
    },

    #[error("log backend error: {0}")]
    Backend(String),

    #[error("log client is shut down")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
