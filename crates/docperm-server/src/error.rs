//! Broker error types.

use docperm_domain::DomainError;
use docperm_storage::StorageError;
use thiserror::Error;

/// Errors returned by the permission broker.
///
/// Only [`BrokerError::Validation`] describes a caller mistake; every other
/// variant is a server-side failure.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The request was rejected before any store access.
    #[error("invalid request: {0}")]
    Validation(#[from] DomainError),

    /// The backing database or collection could not be ensured.
    #[error("failed to initialize {path}: {message}")]
    Initialization { path: String, message: String },

    /// Creating a permission conflicted again after the other-mode
    /// permission was removed.
    #[error("permission {permission_id} conflicts with an existing permission")]
    Conflict { permission_id: String },

    /// A store or cache call failed.
    #[error("{context}: {source}")]
    Store {
        context: String,
        #[source]
        source: StorageError,
    },

    /// A permission could not be serialized for the secret cache.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BrokerError {
    /// Wraps a store error with the resource path or identity it concerns.
    pub fn store(context: impl Into<String>, source: StorageError) -> Self {
        BrokerError::Store {
            context: context.into(),
            source,
        }
    }

    /// True when the caller should receive a client-error response.
    pub fn is_client_error(&self) -> bool {
        matches!(self, BrokerError::Validation(_))
    }
}

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;
