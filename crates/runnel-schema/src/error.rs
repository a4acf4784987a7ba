//! Registry errors

use crate::types::{SchemaId, SchemaVersion};
use runnel_log::{ErrorCode, LogError};
use thiserror::Error;

/// Confluent-compatible error codes
pub mod error_codes {
    pub const SUBJECT_NOT_FOUND: u32 = 40401;
    pub const VERSION_NOT_FOUND: u32 = 40402;
    pub const SCHEMA_NOT_FOUND: u32 = 40403;

    pub const INCOMPATIBLE_SCHEMA: u32 = 409;
    pub const INVALID_COMPATIBILITY_LEVEL: u32 = 42203;

    pub const INTERNAL_ERROR: u32 = 50001;
    pub const BACKEND_ERROR: u32 = 50002;
    pub const WRITE_CONFLICT: u32 = 50003;
    pub const ABORTED: u32 = 50004;
}

/// Registry error types
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("unknown topic or partition: {0}")]
    UnknownTopicOrPartition(String),

    #[error("log backend error: {code}: {message}")]
    Backend { code: ErrorCode, message: String },

    #[error("subject not found: {0}")]
    SubjectNotFound(String),

    #[error("version not found: {subject} version {version}")]
    VersionNotFound {
        subject: String,
        version: SchemaVersion,
    },

    #[error("schema id not found: {0}")]
    SchemaIdNotFound(SchemaId),

    #[error("incompatible schema: {0}")]
    IncompatibleSchema(String),

    #[error("write conflict not resolved after {0} attempts")]
    ExhaustedRetries(u32),

    #[error("operation aborted by shutdown")]
    Aborted,

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SchemaError {
    /// Get the Confluent-compatible error code
    pub fn error_code(&self) -> u32 {
        match self {
            SchemaError::SubjectNotFound(_) => error_codes::SUBJECT_NOT_FOUND,
            SchemaError::VersionNotFound { .. } => error_codes::VERSION_NOT_FOUND,
            SchemaError::SchemaIdNotFound(_) => error_codes::SCHEMA_NOT_FOUND,
            SchemaError::IncompatibleSchema(_) => error_codes::INCOMPATIBLE_SCHEMA,
            SchemaError::Config(_) => error_codes::INVALID_COMPATIBILITY_LEVEL,
            SchemaError::UnknownTopicOrPartition(_) | SchemaError::Backend { .. } => {
                error_codes::BACKEND_ERROR
            }
            SchemaError::ExhaustedRetries(_) => error_codes::WRITE_CONFLICT,
            SchemaError::Aborted => error_codes::ABORTED,
            SchemaError::Serialization(_) | SchemaError::Internal(_) => error_codes::INTERNAL_ERROR,
        }
    }

    /// Get the HTTP status code
    pub fn http_status(&self) -> u16 {
        match self {
            SchemaError::SubjectNotFound(_)
            | SchemaError::VersionNotFound { .. }
            | SchemaError::SchemaIdNotFound(_) => 404,
            SchemaError::IncompatibleSchema(_) => 409,
            SchemaError::Config(_) => 422,
            SchemaError::UnknownTopicOrPartition(_) => 404,
            SchemaError::ExhaustedRetries(_) => 503,
            _ => 500,
        }
    }
}

/// Result type for registry operations
pub type SchemaResult<T> = Result<T, SchemaError>;

impl From<LogError> for SchemaError {
    fn from(e: LogError) -> Self {
        match e {
            LogError::UnknownTopicOrPartition(tp) => SchemaError::UnknownTopicOrPartition(tp),
            other => SchemaError::Backend {
                code: ErrorCode::Unknown,
                message: other.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for SchemaError {
    fn from(e: serde_json::Error) -> Self {
        SchemaError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let err = SchemaError::SubjectNotFound("orders-value".to_string());
        assert_eq!(err.http_status(), 404);
        assert_eq!(err.error_code(), error_codes::SUBJECT_NOT_FOUND);
    }

    #[test]
    fn incompatible_maps_to_409() {
        let err = SchemaError::IncompatibleSchema("field removed".to_string());
        assert_eq!(err.http_status(), 409);
    }

    #[test]
    fn log_error_converts_to_backend() {
        let err: SchemaError = LogError::Backend("connection reset".to_string()).into();
        assert!(matches!(err, SchemaError::Backend { .. }));

        let err: SchemaError =
            LogError::UnknownTopicOrPartition("_schemas/0".to_string()).into();
        assert!(matches!(err, SchemaError::UnknownTopicOrPartition(_)));
    }
}
