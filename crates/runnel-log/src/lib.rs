//! # Runnel Log
//!
//! The replicated-log client abstraction consumed by the Runnel schema
//! registry. A log is an ordered, single-partition sequence of keyed records
//! with Kafka-style offset assignment. The registry treats it as the single
//! source of truth: every mutation is a record, and every node rebuilds its
//! state by replaying the topic from offset 0.
//!
//! This crate defines:
//!
//! - [`TopicPartition`], [`Record`], [`RecordBatch`] — the data model
//! - [`LogClient`] — the trait the registry consumes (list offsets, produce
//!   a batch, stream-fetch a range)
//! - [`MemoryLog`] — an in-process implementation for development and tests
//!
//! Production deployments implement [`LogClient`] over a real broker; the
//! registry core is agnostic to the transport.

pub mod client;
pub mod error;
pub mod memory;
pub mod record;

pub use client::{
    ErrorCode, ListOffsetsResponse, LogClient, PartitionOffset, ProduceResponse, TopicOffsets,
};
pub use error::{LogError, LogResult};
pub use memory::MemoryLog;
pub use record::{Offset, Record, RecordBatch, RecordBatchBuilder, TopicPartition};
