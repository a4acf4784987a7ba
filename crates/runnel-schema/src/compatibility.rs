//! Compatibility levels and the checking seam
//!
//! The registry stores and serves compatibility levels; actually diffing
//! schema definitions belongs to format-aware tooling outside this core.
//! [`CompatibilityCheck`] is the seam: the store consults it while
//! projecting a new registration, and a violation surfaces as
//! [`SchemaError::IncompatibleSchema`](crate::error::SchemaError).

use crate::types::{SchemaDefinition, SchemaType};
use serde::{Deserialize, Serialize};

/// Compatibility level for schema evolution, Confluent-style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompatibilityLevel {
    None,
    #[default]
    Backward,
    BackwardTransitive,
    Forward,
    ForwardTransitive,
    Full,
    FullTransitive,
}

impl CompatibilityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompatibilityLevel::None => "NONE",
            CompatibilityLevel::Backward => "BACKWARD",
            CompatibilityLevel::BackwardTransitive => "BACKWARD_TRANSITIVE",
            CompatibilityLevel::Forward => "FORWARD",
            CompatibilityLevel::ForwardTransitive => "FORWARD_TRANSITIVE",
            CompatibilityLevel::Full => "FULL",
            CompatibilityLevel::FullTransitive => "FULL_TRANSITIVE",
        }
    }
}

impl std::fmt::Display for CompatibilityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CompatibilityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NONE" => Ok(CompatibilityLevel::None),
            "BACKWARD" => Ok(CompatibilityLevel::Backward),
            "BACKWARD_TRANSITIVE" => Ok(CompatibilityLevel::BackwardTransitive),
            "FORWARD" => Ok(CompatibilityLevel::Forward),
            "FORWARD_TRANSITIVE" => Ok(CompatibilityLevel::ForwardTransitive),
            "FULL" => Ok(CompatibilityLevel::Full),
            "FULL_TRANSITIVE" => Ok(CompatibilityLevel::FullTransitive),
            _ => Err(format!("Unknown compatibility level: {}", s)),
        }
    }
}

/// Result of a compatibility check
#[derive(Debug, Clone)]
pub struct CompatibilityResult {
    pub is_compatible: bool,
    pub messages: Vec<String>,
}

impl CompatibilityResult {
    pub fn compatible() -> Self {
        Self {
            is_compatible: true,
            messages: Vec::new(),
        }
    }

    pub fn incompatible(messages: Vec<String>) -> Self {
        Self {
            is_compatible: false,
            messages,
        }
    }
}

/// Format-aware compatibility checking, injected into the store.
///
/// `existing` holds the subject's live definitions, oldest first. For
/// non-transitive levels implementations typically inspect only the last
/// entry.
pub trait CompatibilityCheck: Send + Sync {
    fn check(
        &self,
        level: CompatibilityLevel,
        schema_type: SchemaType,
        new_schema: &SchemaDefinition,
        existing: &[SchemaDefinition],
    ) -> CompatibilityResult;
}

/// Default checker: accepts everything.
///
/// Deployments wire in a format-aware checker; the core only routes its
/// verdict.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissiveChecker;

impl CompatibilityCheck for PermissiveChecker {
    fn check(
        &self,
        _level: CompatibilityLevel,
        _schema_type: SchemaType,
        _new_schema: &SchemaDefinition,
        _existing: &[SchemaDefinition],
    ) -> CompatibilityResult {
        CompatibilityResult::compatible()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_backward() {
        assert_eq!(CompatibilityLevel::default(), CompatibilityLevel::Backward);
    }

    #[test]
    fn parse_round_trip() {
        for level in [
            CompatibilityLevel::None,
            CompatibilityLevel::Backward,
            CompatibilityLevel::BackwardTransitive,
            CompatibilityLevel::Forward,
            CompatibilityLevel::ForwardTransitive,
            CompatibilityLevel::Full,
            CompatibilityLevel::FullTransitive,
        ] {
            assert_eq!(level.as_str().parse::<CompatibilityLevel>(), Ok(level));
        }
        assert!("SIDEWAYS".parse::<CompatibilityLevel>().is_err());
    }

    #[test]
    fn serde_uses_screaming_case() {
        let json = serde_json::to_string(&CompatibilityLevel::FullTransitive).unwrap();
        assert_eq!(json, r#""FULL_TRANSITIVE""#);
        let back: CompatibilityLevel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CompatibilityLevel::FullTransitive);
    }

    #[test]
    fn permissive_checker_accepts() {
        let result = PermissiveChecker.check(
            CompatibilityLevel::Full,
            SchemaType::Avro,
            &SchemaDefinition::from(r#"{"type": "int"}"#),
            &[SchemaDefinition::from(r#"{"type": "string"}"#)],
        );
        assert!(result.is_compatible);
    }
}
