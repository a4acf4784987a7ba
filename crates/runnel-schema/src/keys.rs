//! Typed keys and values for the internal topic
//!
//! Every record on the internal topic is one of three key kinds, each paired
//! with a matching value or a tombstone. Keys and values are JSON maps
//! tagged by a `keytype` field so the stream is self-describing; tombstone
//! records carry the key bytes and no value at all.
//!
//! The `seq` field of a key is the offset the writer predicted for the
//! record. A non-tombstone record that landed somewhere else is a lost
//! optimistic write and is skipped on replay; the field also lets permanent
//! deletion rebuild a historical key byte-for-byte so its tombstone compacts
//! the original away.

use crate::compatibility::CompatibilityLevel;
use crate::error::{SchemaError, SchemaResult};
use crate::types::{KeyType, NodeId, SchemaDefinition, SchemaId, SchemaType, SchemaVersion, Subject};
use bytes::Bytes;
use runnel_log::{Offset, Record, RecordBatch};
use serde::{Deserialize, Serialize};

/// Key of a schema version record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaKey {
    pub seq: Offset,
    pub node: NodeId,
    pub subject: Subject,
    pub version: SchemaVersion,
}

/// Value of a schema version record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaValue {
    pub subject: Subject,
    pub version: SchemaVersion,
    #[serde(rename = "type")]
    pub schema_type: SchemaType,
    pub id: SchemaId,
    pub schema: SchemaDefinition,
    pub deleted: bool,
}

/// Key of a compatibility configuration record. `subject` is absent for the
/// global level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigKey {
    pub seq: Offset,
    pub node: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,
}

/// Value of a compatibility configuration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigValue {
    pub compat: CompatibilityLevel,
}

/// Key of a subject soft-deletion record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSubjectKey {
    pub seq: Offset,
    pub node: NodeId,
    pub subject: Subject,
}

/// Value of a subject soft-deletion record: the subject is deleted up to and
/// including `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSubjectValue {
    pub subject: Subject,
    pub version: SchemaVersion,
}

/// Any key that can appear on the internal topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "keytype")]
pub enum TypedKey {
    #[serde(rename = "SCHEMA")]
    Schema(SchemaKey),
    #[serde(rename = "CONFIG")]
    Config(ConfigKey),
    #[serde(rename = "DELETE_SUBJECT")]
    DeleteSubject(DeleteSubjectKey),
}

impl TypedKey {
    pub fn seq(&self) -> Offset {
        match self {
            TypedKey::Schema(k) => k.seq,
            TypedKey::Config(k) => k.seq,
            TypedKey::DeleteSubject(k) => k.seq,
        }
    }

    pub fn node(&self) -> NodeId {
        match self {
            TypedKey::Schema(k) => k.node,
            TypedKey::Config(k) => k.node,
            TypedKey::DeleteSubject(k) => k.node,
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            TypedKey::Schema(_) => KeyType::Schema,
            TypedKey::Config(_) => KeyType::Config,
            TypedKey::DeleteSubject(_) => KeyType::DeleteSubject,
        }
    }
}

/// Any value that can appear on the internal topic (tombstones are the
/// absence of one).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "keytype")]
pub enum TypedValue {
    #[serde(rename = "SCHEMA")]
    Schema(SchemaValue),
    #[serde(rename = "CONFIG")]
    Config(ConfigValue),
    #[serde(rename = "DELETE_SUBJECT")]
    DeleteSubject(DeleteSubjectValue),
}

pub fn encode_key(key: &TypedKey) -> SchemaResult<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(key)?))
}

pub fn decode_key(raw: &[u8]) -> SchemaResult<TypedKey> {
    Ok(serde_json::from_slice(raw)?)
}

pub fn encode_value(value: &TypedValue) -> SchemaResult<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}

pub fn decode_value(raw: &[u8]) -> SchemaResult<TypedValue> {
    Ok(serde_json::from_slice(raw)?)
}

/// Build the single-record batch for a sequenced write.
pub fn as_record_batch(key: &TypedKey, value: &TypedValue) -> SchemaResult<RecordBatch> {
    if key.key_type() != value_key_type(value) {
        return Err(SchemaError::Internal(format!(
            "key/value kind mismatch: {:?} vs {:?}",
            key.key_type(),
            value_key_type(value)
        )));
    }
    Ok(RecordBatch {
        records: vec![Record::new(encode_key(key)?, encode_value(value)?)],
    })
}

fn value_key_type(value: &TypedValue) -> KeyType {
    match value {
        TypedValue::Schema(_) => KeyType::Schema,
        TypedValue::Config(_) => KeyType::Config,
        TypedValue::DeleteSubject(_) => KeyType::DeleteSubject,
    }
}
