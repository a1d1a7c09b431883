//! Domain error types for permission requests.

use thiserror::Error;

/// Domain-specific errors. All of them describe caller input that can be
/// rejected before any store is contacted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The request did not name a database.
    #[error("databaseId is required")]
    MissingDatabaseId,

    /// The request resolved to an empty user identifier.
    #[error("userId is required")]
    MissingUserId,

    /// The derived secret name violates the secret store's constraints.
    #[error("invalid secret name '{name}': {reason}")]
    InvalidSecretName { name: String, reason: String },

    /// Unknown permission mode text.
    #[error("invalid permission mode: {value}")]
    InvalidPermissionMode { value: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
