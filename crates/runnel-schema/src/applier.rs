//! Consume-to-store: replaying log records into the store
//!
//! The applier is the single deterministic path from log records to store
//! mutations. Catch-up readers drive it with fetched records; the writer
//! drives it directly after a successful produce. Both end up with the same
//! store because the function depends only on `(offset, key, value)`.
//!
//! A non-tombstone record whose key `seq` differs from the offset it landed
//! at lost an optimistic write race on some node; it is skipped. Tombstones
//! always apply: they are produced at offsets unrelated to their key's
//! `seq`, and erasing an already-absent entry is a no-op.

use crate::error::{SchemaError, SchemaResult};
use crate::keys::{decode_key, decode_value, TypedKey, TypedValue};
use crate::store::SchemaStore;
use crate::types::{KeyType, SeqMarker};
use runnel_log::{Offset, Record};
use tracing::debug;

/// Applies log records to a store.
pub struct Applier<'a> {
    store: &'a SchemaStore,
}

impl<'a> Applier<'a> {
    pub fn new(store: &'a SchemaStore) -> Self {
        Self { store }
    }

    /// Decode and apply one fetched record.
    pub fn apply_record(&self, record: &Record) -> SchemaResult<()> {
        let key_bytes = record
            .key
            .as_ref()
            .ok_or_else(|| SchemaError::Serialization("record has no key".to_string()))?;
        let key = decode_key(key_bytes)?;
        let value = record
            .value
            .as_deref()
            .map(decode_value)
            .transpose()?;
        self.apply(record.offset, &key, value.as_ref())
    }

    /// Apply one typed record at its authoritative offset.
    pub fn apply(
        &self,
        offset: Offset,
        key: &TypedKey,
        value: Option<&TypedValue>,
    ) -> SchemaResult<()> {
        match value {
            Some(value) => self.apply_value(offset, key, value),
            None => self.apply_tombstone(key),
        }
    }

    fn apply_value(&self, offset: Offset, key: &TypedKey, value: &TypedValue) -> SchemaResult<()> {
        if key.seq() != offset {
            debug!(
                seq = key.seq(),
                offset, "skipping record from lost write race"
            );
            return Ok(());
        }

        match (key, value) {
            (TypedKey::Schema(key), TypedValue::Schema(value)) => {
                self.store.record_written_at(
                    &key.subject,
                    SeqMarker {
                        seq: key.seq,
                        node: key.node,
                        version: Some(key.version),
                        key_type: KeyType::Schema,
                    },
                );
                self.store.upsert_version(
                    &value.subject,
                    value.version,
                    value.id,
                    value.schema_type,
                    &value.schema,
                    value.deleted,
                );
            }
            (TypedKey::Config(key), TypedValue::Config(value)) => {
                if let Some(subject) = &key.subject {
                    self.store.record_written_at(
                        subject,
                        SeqMarker {
                            seq: key.seq,
                            node: key.node,
                            version: None,
                            key_type: KeyType::Config,
                        },
                    );
                }
                self.store.set_compatibility(key.subject.as_ref(), value.compat);
            }
            (TypedKey::DeleteSubject(key), TypedValue::DeleteSubject(value)) => {
                self.store.record_written_at(
                    &key.subject,
                    SeqMarker {
                        seq: key.seq,
                        node: key.node,
                        version: None,
                        key_type: KeyType::DeleteSubject,
                    },
                );
                self.store
                    .mark_subject_deleted(&value.subject, value.version);
            }
            (key, value) => {
                return Err(SchemaError::Serialization(format!(
                    "key/value kind mismatch at offset {}: {:?} vs {:?}",
                    offset, key, value
                )));
            }
        }
        Ok(())
    }

    fn apply_tombstone(&self, key: &TypedKey) -> SchemaResult<()> {
        match key {
            TypedKey::Schema(key) => {
                debug!(subject = %key.subject, version = %key.version, "tombstone: removing version");
                self.store.remove_version(&key.subject, key.version);
            }
            TypedKey::Config(key) => {
                self.store.clear_compatibility(key.subject.as_ref());
            }
            TypedKey::DeleteSubject(key) => {
                self.store.clear_subject_deleted(&key.subject);
            }
        }
        Ok(())
    }
}
