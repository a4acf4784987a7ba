//! # Runnel Schema Registry
//!
//! The sequenced core of a schema registry built on a replicated log. A
//! single-partition internal topic is the source of truth: every mutation —
//! register a schema, set a compatibility level, soft- or hard-delete — is a
//! record, and every node's in-memory store is a projection of the topic
//! rebuilt by replaying it from offset 0.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     runnel-schema core                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  SeqWriter (coordinator)                                     │
//! │  ├── optimistic sequencing: predict offset, produce, check   │
//! │  ├── write permit: one mutation in flight per process        │
//! │  └── read_sync: catch the store up to the topic tail         │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Applier: (offset, key, value?) → store mutation             │
//! │  ├── drives post-write apply on the coordinator              │
//! │  └── drives catch-up on every replica                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  SchemaStore: subjects, versions, ids, compat, seq markers   │
//! │  StoreReplica: worker-local copies, lazily caught up         │
//! ├──────────────────────────────────────────────────────────────┤
//! │  runnel-log: LogClient (list offsets / produce / fetch)      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Sequencing
//!
//! Multiple nodes may write concurrently; none of them holds a lock over
//! the cluster. Instead each writer predicts the offset its record will
//! land at, stamps the prediction into the record key (`seq`), and compares
//! the log's answer. Losing the race costs one catch-up and retry — and the
//! colliding record frequently turns the retry into a no-op, such as when
//! two nodes register the same schema. Records that lost their race remain
//! in the log but are skipped by every replayer, because their `seq` does
//! not match the offset they landed at.
//!
//! Permanent deletion is the one path that skips sequencing: it tombstones
//! historical records by rebuilding their exact keys from the store's
//! sequence markers, and tombstones are idempotent and order-insensitive.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use runnel_log::MemoryLog;
//! use runnel_schema::{RegistryConfig, SchemaStore, SchemaType, SeqWriter};
//! use std::sync::Arc;
//!
//! let config = RegistryConfig::new(0);
//! let log = Arc::new(MemoryLog::new());
//! log.create_topic(&config.topic_partition());
//!
//! let writer = SeqWriter::new(Arc::new(SchemaStore::new()), log, &config);
//! writer.read_sync().await?; // bootstrap from the topic
//!
//! let id = writer
//!     .write_subject_version(
//!         "orders-value".into(),
//!         r#"{"type": "record", "name": "Order", "fields": []}"#.into(),
//!         SchemaType::Avro,
//!     )
//!     .await?;
//! ```

pub mod applier;
pub mod compatibility;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod keys;
pub mod replica;
pub mod store;
pub mod types;
pub mod writer;

pub use applier::Applier;
pub use compatibility::{
    CompatibilityCheck, CompatibilityLevel, CompatibilityResult, PermissiveChecker,
};
pub use config::RegistryConfig;
pub use error::{error_codes, SchemaError, SchemaResult};
pub use fingerprint::SchemaFingerprint;
pub use keys::{
    ConfigKey, ConfigValue, DeleteSubjectKey, DeleteSubjectValue, SchemaKey, SchemaValue,
    TypedKey, TypedValue,
};
pub use replica::StoreReplica;
pub use store::{ProjectedIds, SchemaStore, StoredSchema, SubjectSchema};
pub use types::{
    KeyType, NodeId, SchemaDefinition, SchemaId, SchemaType, SchemaVersion, SeqMarker, Subject,
};
pub use writer::SeqWriter;
