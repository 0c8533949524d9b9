use serde_json::{Value, json};
use thiserror::Error;
use tracing::error;

/// Failures raised by a policy store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Policy version already exists: {name}@{version}")]
    Duplicate { name: String, version: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Lookup cancelled before it started")]
    Cancelled,

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Errors surfaced to callers of the catalog and the resolver.
///
/// Storage detail never crosses this boundary: `Storage` only names the
/// operation that failed, the underlying error is logged where it is mapped.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{message}")]
    Validation { message: String, details: Value },

    #[error("{message}")]
    NotFound { message: String, details: Value },

    #[error("Policy version already exists: {name}@{version}")]
    Conflict { name: String, version: String },

    #[error("Database operation failed while {operation}")]
    Storage { operation: &'static str },

    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Operation cancelled")]
    Cancelled,
}

impl CatalogError {
    pub fn validation(message: impl Into<String>, details: Value) -> Self {
        Self::Validation {
            message: message.into(),
            details,
        }
    }

    pub fn not_found(message: impl Into<String>, details: Value) -> Self {
        Self::NotFound {
            message: message.into(),
            details,
        }
    }

    pub fn policy_version_not_found(name: &str, version: &str) -> Self {
        Self::not_found(
            "policy version not found",
            json!({ "policy": name, "version": version }),
        )
    }

    pub fn doc_not_found(name: &str, version: &str, page: &str) -> Self {
        Self::not_found(
            "documentation page not found",
            json!({ "policy": name, "version": version, "page": page }),
        )
    }

    /// Log a store failure and replace it with a sanitized error
    pub fn storage(operation: &'static str, err: &StoreError) -> Self {
        error!("Database error while {}: {}", operation, err);
        Self::Storage { operation }
    }

    /// Stable machine-readable code for the error kind
    pub fn code(&self) -> &'static str {
        match self {
            CatalogError::Validation { .. } => "VALIDATION_ERROR",
            CatalogError::NotFound { .. } => "NOT_FOUND",
            CatalogError::Conflict { .. } => "CONFLICT",
            CatalogError::Storage { .. } => "DATABASE_ERROR",
            CatalogError::Timeout { .. } => "TIMEOUT",
            CatalogError::Cancelled => "CANCELLED",
        }
    }

    /// Structured details attached to validation and not-found errors
    pub fn details(&self) -> Option<&Value> {
        match self {
            CatalogError::Validation { details, .. } | CatalogError::NotFound { details, .. } => {
                Some(details)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_hides_underlying_detail() {
        let underlying = StoreError::InvalidData("secret table layout".to_string());
        let err = CatalogError::storage("listing policies", &underlying);

        let message = err.to_string();
        assert_eq!(message, "Database operation failed while listing policies");
        assert!(!message.contains("secret"));
        assert_eq!(err.code(), "DATABASE_ERROR");
        assert!(err.details().is_none());
    }

    #[test]
    fn validation_error_exposes_details() {
        let err = CatalogError::validation("invalid versionResolution", json!({ "provided": "x" }));

        assert_eq!(err.to_string(), "invalid versionResolution");
        assert_eq!(err.details(), Some(&json!({ "provided": "x" })));
    }
}
