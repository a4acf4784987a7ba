//! Schema fingerprinting for cross-subject deduplication
//!
//! Identity of a schema is the pair `(type, definition)`: the same
//! definition text registered as Avro and as JSON Schema are two schemas.
//! The fingerprint hashes both so the store's dedup index needs a single
//! lookup key.

use crate::types::{SchemaDefinition, SchemaType};
use sha2::{Digest, Sha256};

/// SHA-256 fingerprint of a `(type, definition)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemaFingerprint([u8; 32]);

impl SchemaFingerprint {
    /// Compute the fingerprint of a schema definition.
    pub fn compute(schema_type: SchemaType, definition: &SchemaDefinition) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(schema_type.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(definition.as_str().as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn as_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for SchemaFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_hex())
    }
}
