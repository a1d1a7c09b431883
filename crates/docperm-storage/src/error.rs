//! Storage error types.

use thiserror::Error;

/// Errors reported by a resource store or secret cache.
///
/// Not-found and conflict outcomes have their own variants because the
/// broker recovers from them locally; everything else is propagated.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database not found.
    #[error("database not found: {database_id}")]
    DatabaseNotFound { database_id: String },

    /// Collection not found.
    #[error("collection not found: {database_id}/{collection_id}")]
    CollectionNotFound {
        database_id: String,
        collection_id: String,
    },

    /// User not found.
    #[error("user not found: {database_id}/{user_id}")]
    UserNotFound {
        database_id: String,
        user_id: String,
    },

    /// Permission not found.
    #[error("permission not found: {database_id}/{user_id}/{permission_id}")]
    PermissionNotFound {
        database_id: String,
        user_id: String,
        permission_id: String,
    },

    /// Secret not found.
    #[error("secret not found: {name}")]
    SecretNotFound { name: String },

    /// A resource with the same identity (or, for permissions, the same
    /// user and resource) already exists (409).
    #[error("conflict: {resource} already exists")]
    Conflict { resource: String },

    /// Request rate exceeded (429).
    #[error("too many requests: {message}")]
    TooManyRequests { message: String },

    /// Malformed request (400).
    #[error("bad request: {message}")]
    BadRequest { message: String },

    /// Operation refused (403).
    #[error("forbidden: {message}")]
    Forbidden { message: String },

    /// Entity exceeds the store's size limit (413).
    #[error("entity too large: {message}")]
    EntityTooLarge { message: String },

    /// Invalid input error.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Serialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },

    /// Connection error.
    #[error("connection error: {message}")]
    ConnectionError { message: String },

    /// Internal error.
    #[error("internal storage error: {message}")]
    InternalError { message: String },
}

impl StorageError {
    /// Returns true for any "resource absent" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::DatabaseNotFound { .. }
                | StorageError::CollectionNotFound { .. }
                | StorageError::UserNotFound { .. }
                | StorageError::PermissionNotFound { .. }
                | StorageError::SecretNotFound { .. }
        )
    }

    /// Returns true for a creation conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }

    /// Operator-facing explanation of the failure class, if there is one.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            StorageError::TooManyRequests { .. } => Some(
                "request units per second exceeded; wait for the retry-after interval before retrying",
            ),
            StorageError::BadRequest { .. } => {
                Some("the resource body was rejected; check that an id was supplied")
            }
            StorageError::Forbidden { .. } => {
                Some("the target collection is likely full")
            }
            StorageError::Conflict { .. } => {
                Some("a resource with a matching id already exists")
            }
            StorageError::EntityTooLarge { .. } => {
                Some("the resource exceeds the maximum entity size")
            }
            _ => None,
        }
    }

    /// Logs the failure together with its hint.
    pub fn log(&self) {
        match self.hint() {
            Some(hint) => tracing::warn!(error = %self, hint, "store operation failed"),
            None => tracing::debug!(error = %self, "store operation failed"),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        let not_found = [
            StorageError::DatabaseNotFound {
                database_id: "db".into(),
            },
            StorageError::CollectionNotFound {
                database_id: "db".into(),
                collection_id: "c".into(),
            },
            StorageError::UserNotFound {
                database_id: "db".into(),
                user_id: "u".into(),
            },
            StorageError::PermissionNotFound {
                database_id: "db".into(),
                user_id: "u".into(),
                permission_id: "p".into(),
            },
            StorageError::SecretNotFound { name: "s".into() },
        ];
        for err in &not_found {
            assert!(err.is_not_found(), "{err}");
            assert!(!err.is_conflict(), "{err}");
        }

        let conflict = StorageError::Conflict {
            resource: "permission p".into(),
        };
        assert!(conflict.is_conflict());
        assert!(!conflict.is_not_found());
    }

    #[test]
    fn test_hints_cover_status_classes() {
        assert!(StorageError::TooManyRequests {
            message: "slow down".into()
        }
        .hint()
        .unwrap()
        .contains("retry"));
        assert!(StorageError::Forbidden {
            message: "full".into()
        }
        .hint()
        .is_some());
        assert!(StorageError::InternalError {
            message: "boom".into()
        }
        .hint()
        .is_none());
    }
}
