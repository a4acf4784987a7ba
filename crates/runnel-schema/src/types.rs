//! Core registry types
//!
//! Identifiers follow the newtype convention used across Runnel:
//! [`SchemaId`], [`Subject`], [`SchemaVersion`], [`NodeId`] wrap their raw
//! representation and carry `Display`/`From` impls so call sites and log
//! lines stay readable. [`SeqMarker`] is the bookkeeping tuple recorded for
//! every key persisted to the internal topic; it is what permanent deletion
//! uses to reconstruct tombstone keys byte-for-byte.

use runnel_log::Offset;
use serde::{Deserialize, Serialize};

/// Unique identifier for a schema definition, global across all subjects.
///
/// Assigned the first time a `(definition, type)` pair is registered and
/// stable thereafter: re-registering an identical definition under any
/// subject yields the same id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SchemaId(pub u32);

impl SchemaId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SchemaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SchemaId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Subject: a named family of schema versions (typically `{topic}-key` or
/// `{topic}-value`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Subject(pub String);

impl Subject {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Subject {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Subject {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Subject {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Version of a schema within a subject. Versions are contiguous positive
/// integers starting at 1; soft-deleted versions keep their number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SchemaVersion(pub u32);

impl SchemaVersion {
    pub fn new(version: u32) -> Self {
        Self(version)
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SchemaVersion {
    fn from(version: u32) -> Self {
        Self(version)
    }
}

/// Identifier of a writing node, embedded in every persisted key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Schema format tag. The registry treats definitions as opaque text; the
/// tag only participates in identity (two definitions with different types
/// are different schemas).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchemaType {
    #[default]
    #[serde(alias = "avro", alias = "AVRO")]
    Avro,

    #[serde(alias = "json", alias = "JSON")]
    Json,

    #[serde(alias = "protobuf", alias = "PROTOBUF")]
    Protobuf,
}

impl SchemaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::Avro => "AVRO",
            SchemaType::Json => "JSON",
            SchemaType::Protobuf => "PROTOBUF",
        }
    }
}

impl std::fmt::Display for SchemaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SchemaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "AVRO" => Ok(SchemaType::Avro),
            "JSON" | "JSONSCHEMA" | "JSON_SCHEMA" => Ok(SchemaType::Json),
            "PROTOBUF" | "PROTO" => Ok(SchemaType::Protobuf),
            _ => Err(format!("Unknown schema type: {}", s)),
        }
    }
}

/// Opaque schema definition text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaDefinition(pub String);

impl SchemaDefinition {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SchemaDefinition {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SchemaDefinition {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Which of the three key kinds a sequence marker refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    Schema,
    Config,
    DeleteSubject,
}

/// Where a persisted key landed in the internal topic.
///
/// `seq` is the `seq` field of the key as written (which, for a record that
/// won its optimistic write, equals its offset). Together with `node` and
/// `key_type` (plus `version` for schema keys) it is enough to rebuild the
/// exact key bytes and tombstone them later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqMarker {
    pub seq: Offset,
    pub node: NodeId,
    pub version: Option<SchemaVersion>,
    pub key_type: KeyType,
}

impl std::fmt::Display for SeqMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "seq={} node={} key_type={:?}",
            self.seq, self.node, self.key_type
        )?;
        if let Some(v) = self.version {
            write!(f, " version={}", v)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_type_parse_and_display() {
        assert_eq!("AVRO".parse::<SchemaType>().unwrap(), SchemaType::Avro);
        assert_eq!("proto".parse::<SchemaType>().unwrap(), SchemaType::Protobuf);
        assert_eq!(
            "json_schema".parse::<SchemaType>().unwrap(),
            SchemaType::Json
        );
        assert!("thrift".parse::<SchemaType>().is_err());
        assert_eq!(SchemaType::Json.to_string(), "JSON");
    }

    #[test]
    fn version_next_is_successor() {
        assert_eq!(SchemaVersion::new(1).next(), SchemaVersion::new(2));
    }

    #[test]
    fn subject_conversions() {
        let s: Subject = "orders-value".into();
        assert_eq!(s.as_str(), "orders-value");
        assert_eq!(s.to_string(), "orders-value");
    }
}
