//! In-memory projection of the internal topic
//!
//! The store holds everything the registry knows: subjects and their version
//! lists, canonical definitions by id, compatibility levels, soft-deletion
//! flags, and the sequence markers needed for permanent deletion. It starts
//! empty and is rebuilt from offset 0 on boot; afterwards it is mutated only
//! through the [`Applier`](crate::applier::Applier), either when the
//! coordinator applies its own successful write or when any worker catches
//! up from the log.
//!
//! Lookups (`project_ids` and the `get_*` family) never mutate: a projection
//! is tentative until the corresponding record wins its place in the log.

use crate::compatibility::{CompatibilityCheck, CompatibilityLevel, PermissiveChecker};
use crate::error::{SchemaError, SchemaResult};
use crate::fingerprint::SchemaFingerprint;
use crate::types::{
    KeyType, SchemaDefinition, SchemaId, SchemaType, SchemaVersion, SeqMarker, Subject,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Result of projecting a registration against the current store state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectedIds {
    pub id: SchemaId,
    pub version: SchemaVersion,
    /// `false` when the subject already holds this exact schema and no
    /// record needs to be written.
    pub inserted: bool,
}

/// A schema as seen through a subject version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectSchema {
    pub id: SchemaId,
    pub schema_type: SchemaType,
    pub definition: SchemaDefinition,
    pub deleted: bool,
}

/// A canonical schema looked up by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSchema {
    pub id: SchemaId,
    pub schema_type: SchemaType,
    pub definition: SchemaDefinition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CanonicalSchema {
    schema_type: SchemaType,
    definition: SchemaDefinition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct VersionEntry {
    version: SchemaVersion,
    id: SchemaId,
    deleted: bool,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct SubjectState {
    /// Sorted by version; soft-deleted entries stay in place.
    versions: Vec<VersionEntry>,
    /// Per-subject override; `None` falls through to the global level.
    compatibility: Option<CompatibilityLevel>,
    /// Subject-level soft-deletion flag.
    deleted: bool,
    /// One marker per key persisted for this subject, in applied order.
    written_at: Vec<SeqMarker>,
}

impl SubjectState {
    fn is_empty(&self) -> bool {
        self.versions.is_empty()
            && self.compatibility.is_none()
            && !self.deleted
            && self.written_at.is_empty()
    }
}

#[derive(Debug, Default, PartialEq)]
struct StoreInner {
    subjects: BTreeMap<Subject, SubjectState>,
    schemas: BTreeMap<SchemaId, CanonicalSchema>,
    fingerprints: HashMap<SchemaFingerprint, SchemaId>,
    global_compatibility: Option<CompatibilityLevel>,
}

impl StoreInner {
    fn next_id(&self) -> SchemaId {
        self.schemas
            .keys()
            .next_back()
            .map_or(SchemaId::new(1), |id| SchemaId::new(id.0 + 1))
    }

    fn register_canonical(
        &mut self,
        id: SchemaId,
        schema_type: SchemaType,
        definition: &SchemaDefinition,
    ) {
        let fp = SchemaFingerprint::compute(schema_type, definition);
        self.schemas.entry(id).or_insert_with(|| CanonicalSchema {
            schema_type,
            definition: definition.clone(),
        });
        self.fingerprints.entry(fp).or_insert(id);
    }

    fn prune_if_empty(&mut self, subject: &Subject) {
        if self.subjects.get(subject).is_some_and(SubjectState::is_empty) {
            self.subjects.remove(subject);
        }
    }
}

/// The registry's in-memory state. One replica lives on the coordinator and
/// drives writes; any number of read replicas catch up from the log on
/// demand.
pub struct SchemaStore {
    inner: RwLock<StoreInner>,
    checker: Arc<dyn CompatibilityCheck>,
}

impl SchemaStore {
    pub fn new() -> Self {
        Self::with_checker(Arc::new(PermissiveChecker))
    }

    pub fn with_checker(checker: Arc<dyn CompatibilityCheck>) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            checker,
        }
    }

    /// The compatibility checker this store consults.
    pub fn checker(&self) -> Arc<dyn CompatibilityCheck> {
        self.checker.clone()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Project a registration: the id and version the schema would get, and
    /// whether a record actually needs to be written.
    ///
    /// Identical `(definition, type)` pairs share one global id across all
    /// subjects; a subject that already holds the schema in a live version
    /// projects to that version with `inserted = false`.
    pub fn project_ids(
        &self,
        subject: &Subject,
        definition: &SchemaDefinition,
        schema_type: SchemaType,
    ) -> SchemaResult<ProjectedIds> {
        let inner = self.inner.read();
        let fp = SchemaFingerprint::compute(schema_type, definition);
        let known_id = inner.fingerprints.get(&fp).copied();
        let state = inner.subjects.get(subject);

        if let (Some(state), Some(id)) = (state, known_id) {
            if let Some(entry) = state
                .versions
                .iter()
                .find(|e| !e.deleted && e.id == id)
            {
                return Ok(ProjectedIds {
                    id,
                    version: entry.version,
                    inserted: false,
                });
            }
        }

        let live_definitions: Vec<SchemaDefinition> = state
            .map(|s| {
                s.versions
                    .iter()
                    .filter(|e| !e.deleted)
                    .filter_map(|e| inner.schemas.get(&e.id))
                    .map(|c| c.definition.clone())
                    .collect()
            })
            .unwrap_or_default();

        let level = self.effective_compatibility(&inner, Some(subject));
        let verdict = self
            .checker
            .check(level, schema_type, definition, &live_definitions);
        if !verdict.is_compatible {
            return Err(SchemaError::IncompatibleSchema(
                verdict.messages.join("; "),
            ));
        }

        let id = known_id.unwrap_or_else(|| inner.next_id());
        let version = state
            .and_then(|s| s.versions.last())
            .map_or(SchemaVersion::new(1), |e| e.version.next());

        Ok(ProjectedIds {
            id,
            version,
            inserted: true,
        })
    }

    /// Look up one version of a subject.
    pub fn get_subject_schema(
        &self,
        subject: &Subject,
        version: SchemaVersion,
        include_deleted: bool,
    ) -> SchemaResult<SubjectSchema> {
        let inner = self.inner.read();
        let state = inner
            .subjects
            .get(subject)
            .ok_or_else(|| SchemaError::SubjectNotFound(subject.to_string()))?;

        let entry = state
            .versions
            .iter()
            .find(|e| e.version == version)
            .filter(|e| include_deleted || !e.deleted)
            .ok_or(SchemaError::VersionNotFound {
                subject: subject.to_string(),
                version,
            })?;

        let canonical = inner
            .schemas
            .get(&entry.id)
            .ok_or_else(|| SchemaError::Internal(format!("no definition for id {}", entry.id)))?;

        Ok(SubjectSchema {
            id: entry.id,
            schema_type: canonical.schema_type,
            definition: canonical.definition.clone(),
            deleted: entry.deleted,
        })
    }

    /// All version numbers of a subject, in ascending order.
    pub fn get_versions(
        &self,
        subject: &Subject,
        include_deleted: bool,
    ) -> SchemaResult<Vec<SchemaVersion>> {
        let inner = self.inner.read();
        let state = inner
            .subjects
            .get(subject)
            .ok_or_else(|| SchemaError::SubjectNotFound(subject.to_string()))?;

        let versions: Vec<SchemaVersion> = state
            .versions
            .iter()
            .filter(|e| include_deleted || !e.deleted)
            .map(|e| e.version)
            .collect();

        if versions.is_empty() {
            return Err(SchemaError::SubjectNotFound(subject.to_string()));
        }
        Ok(versions)
    }

    /// Whether the subject carries a soft-deletion marker.
    pub fn is_subject_deleted(&self, subject: &Subject) -> SchemaResult<bool> {
        let inner = self.inner.read();
        inner
            .subjects
            .get(subject)
            .map(|s| s.deleted)
            .ok_or_else(|| SchemaError::SubjectNotFound(subject.to_string()))
    }

    /// Effective compatibility: the subject's override if present, else the
    /// global level, else the default.
    pub fn get_compatibility(&self, subject: Option<&Subject>) -> CompatibilityLevel {
        let inner = self.inner.read();
        self.effective_compatibility(&inner, subject)
    }

    fn effective_compatibility(
        &self,
        inner: &StoreInner,
        subject: Option<&Subject>,
    ) -> CompatibilityLevel {
        subject
            .and_then(|s| inner.subjects.get(s))
            .and_then(|s| s.compatibility)
            .or(inner.global_compatibility)
            .unwrap_or_default()
    }

    /// The level explicitly written at this scope, without fallback. The
    /// writer's no-op check uses this: rewriting the level a scope already
    /// pins is a no-op, but pinning a level that so far only came from a
    /// fallback is a real write.
    pub fn get_written_compatibility(
        &self,
        subject: Option<&Subject>,
    ) -> Option<CompatibilityLevel> {
        let inner = self.inner.read();
        match subject {
            Some(subject) => inner.subjects.get(subject).and_then(|s| s.compatibility),
            None => inner.global_compatibility,
        }
    }

    /// Sequence markers for every key persisted for this subject.
    pub fn get_subject_written_at(&self, subject: &Subject) -> SchemaResult<Vec<SeqMarker>> {
        let inner = self.inner.read();
        inner
            .subjects
            .get(subject)
            .map(|s| s.written_at.clone())
            .ok_or_else(|| SchemaError::SubjectNotFound(subject.to_string()))
    }

    /// Sequence markers for the schema records of one version.
    pub fn get_subject_version_written_at(
        &self,
        subject: &Subject,
        version: SchemaVersion,
    ) -> SchemaResult<Vec<SeqMarker>> {
        let inner = self.inner.read();
        let state = inner
            .subjects
            .get(subject)
            .ok_or_else(|| SchemaError::SubjectNotFound(subject.to_string()))?;

        let markers: Vec<SeqMarker> = state
            .written_at
            .iter()
            .filter(|m| m.key_type == KeyType::Schema && m.version == Some(version))
            .copied()
            .collect();

        if markers.is_empty() {
            return Err(SchemaError::VersionNotFound {
                subject: subject.to_string(),
                version,
            });
        }
        Ok(markers)
    }

    /// Canonical schema lookup by global id.
    pub fn get_schema_by_id(&self, id: SchemaId) -> SchemaResult<StoredSchema> {
        let inner = self.inner.read();
        inner
            .schemas
            .get(&id)
            .map(|c| StoredSchema {
                id,
                schema_type: c.schema_type,
                definition: c.definition.clone(),
            })
            .ok_or(SchemaError::SchemaIdNotFound(id))
    }

    /// Subjects with at least one (live, unless `include_deleted`) version.
    pub fn list_subjects(&self, include_deleted: bool) -> Vec<Subject> {
        let inner = self.inner.read();
        inner
            .subjects
            .iter()
            .filter(|(_, s)| {
                s.versions
                    .iter()
                    .any(|e| include_deleted || !e.deleted)
            })
            .map(|(subject, _)| subject.clone())
            .collect()
    }

    /// The latest live version of a subject.
    pub fn get_latest_version(
        &self,
        subject: &Subject,
    ) -> SchemaResult<(SchemaVersion, SubjectSchema)> {
        let latest = {
            let inner = self.inner.read();
            inner
                .subjects
                .get(subject)
                .and_then(|s| s.versions.iter().rev().find(|e| !e.deleted))
                .map(|e| e.version)
        };
        let version = latest.ok_or_else(|| SchemaError::SubjectNotFound(subject.to_string()))?;
        let schema = self.get_subject_schema(subject, version, false)?;
        Ok((version, schema))
    }

    // ========================================================================
    // Mutations (driven by the Applier)
    // ========================================================================

    pub(crate) fn record_written_at(&self, subject: &Subject, marker: SeqMarker) {
        let mut inner = self.inner.write();
        inner
            .subjects
            .entry(subject.clone())
            .or_default()
            .written_at
            .push(marker);
    }

    pub(crate) fn upsert_version(
        &self,
        subject: &Subject,
        version: SchemaVersion,
        id: SchemaId,
        schema_type: SchemaType,
        definition: &SchemaDefinition,
        deleted: bool,
    ) {
        let mut inner = self.inner.write();
        inner.register_canonical(id, schema_type, definition);

        let state = inner.subjects.entry(subject.clone()).or_default();
        match state
            .versions
            .binary_search_by_key(&version, |e| e.version)
        {
            Ok(i) => {
                state.versions[i].id = id;
                state.versions[i].deleted = deleted;
            }
            Err(i) => state.versions.insert(
                i,
                VersionEntry {
                    version,
                    id,
                    deleted,
                },
            ),
        }

        // A live registration revives a soft-deleted subject.
        if !deleted {
            state.deleted = false;
        }
    }

    /// Tombstone of a schema key: drop the version and its markers.
    pub(crate) fn remove_version(&self, subject: &Subject, version: SchemaVersion) {
        let mut inner = self.inner.write();
        if let Some(state) = inner.subjects.get_mut(subject) {
            state.versions.retain(|e| e.version != version);
            state
                .written_at
                .retain(|m| !(m.key_type == KeyType::Schema && m.version == Some(version)));
        }
        inner.prune_if_empty(subject);
    }

    pub(crate) fn set_compatibility(
        &self,
        subject: Option<&Subject>,
        level: CompatibilityLevel,
    ) {
        let mut inner = self.inner.write();
        match subject {
            Some(subject) => {
                inner
                    .subjects
                    .entry(subject.clone())
                    .or_default()
                    .compatibility = Some(level);
            }
            None => inner.global_compatibility = Some(level),
        }
    }

    /// Tombstone of a config key: clear the override (per-subject reverts to
    /// the global level, global reverts to the default).
    pub(crate) fn clear_compatibility(&self, subject: Option<&Subject>) {
        let mut inner = self.inner.write();
        match subject {
            Some(subject) => {
                if let Some(state) = inner.subjects.get_mut(subject) {
                    state.compatibility = None;
                    state.written_at.retain(|m| m.key_type != KeyType::Config);
                }
                inner.prune_if_empty(subject);
            }
            None => inner.global_compatibility = None,
        }
    }

    /// Soft-delete a subject: flag it and every version up to and including
    /// `version`.
    pub(crate) fn mark_subject_deleted(&self, subject: &Subject, version: SchemaVersion) {
        let mut inner = self.inner.write();
        let state = inner.subjects.entry(subject.clone()).or_default();
        state.deleted = true;
        for entry in state.versions.iter_mut().filter(|e| e.version <= version) {
            entry.deleted = true;
        }
        debug!(%subject, %version, "marked subject soft-deleted");
    }

    /// Tombstone of a delete-subject key: clear the marker.
    pub(crate) fn clear_subject_deleted(&self, subject: &Subject) {
        let mut inner = self.inner.write();
        if let Some(state) = inner.subjects.get_mut(subject) {
            state.deleted = false;
            state
                .written_at
                .retain(|m| m.key_type != KeyType::DeleteSubject);
        }
        inner.prune_if_empty(subject);
    }

    /// Whether two stores project identical state. Replaying the internal
    /// topic from offset 0 into a fresh store must reproduce the coordinator
    /// replica exactly.
    pub fn projection_eq(&self, other: &SchemaStore) -> bool {
        *self.inner.read() == *other.inner.read()
    }
}

impl Default for SchemaStore {
    fn default() -> Self {
        Self::new()
    }
}
