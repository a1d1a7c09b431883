//! ResourceStore and SecretCache trait definitions.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docperm_domain::{IssuedPermission, PermissionMode};

use crate::error::StorageResult;

/// Database metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Database {
    pub id: String,
    pub self_link: String,
    pub created_at: DateTime<Utc>,
}

/// Collection metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub database_id: String,
    pub id: String,
    pub self_link: String,
    /// Provisioned throughput requested at creation, if any.
    pub throughput: Option<u32>,
    pub created_at: DateTime<Utc>,
}

/// A user resource; permissions are owned by users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub database_id: String,
    pub id: String,
    pub self_link: String,
    pub created_at: DateTime<Utc>,
}

/// Body of a permission to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPermission {
    pub id: String,
    pub resource_link: String,
    pub mode: PermissionMode,
}

/// A secret and its expiry metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secret {
    pub name: String,
    pub value: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Secret {
    /// Time until expiry, or `None` for secrets that never expire.
    /// Already-expired secrets report zero.
    pub fn time_to_live(&self) -> Option<Duration> {
        self.expires_at
            .map(|expires_at| (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }
}

/// Hierarchical document store holding databases, collections, users and
/// permissions.
///
/// Reads report absence with a not-found error (see
/// [`StorageError::is_not_found`](crate::StorageError::is_not_found));
/// `create_permission` reports an existing permission for the same identity
/// with [`StorageError::Conflict`](crate::StorageError::Conflict).
///
/// Implementations must be thread-safe (Send + Sync) and support
/// async operations.
#[async_trait]
pub trait ResourceStore: Send + Sync + 'static {
    // Database operations

    /// Reads a database.
    async fn read_database(&self, database_id: &str) -> StorageResult<Database>;

    /// Creates a database.
    async fn create_database(&self, database_id: &str) -> StorageResult<Database>;

    // Collection operations

    /// Reads a collection.
    async fn read_collection(
        &self,
        database_id: &str,
        collection_id: &str,
    ) -> StorageResult<Collection>;

    /// Creates a collection with an optional provisioned throughput.
    async fn create_collection(
        &self,
        database_id: &str,
        collection_id: &str,
        throughput: Option<u32>,
    ) -> StorageResult<Collection>;

    // User operations

    /// Reads a user.
    async fn read_user(&self, database_id: &str, user_id: &str) -> StorageResult<User>;

    /// Creates a user.
    async fn create_user(&self, database_id: &str, user_id: &str) -> StorageResult<User>;

    // Permission operations

    /// Reads a permission. The returned token is valid for `duration`;
    /// reading renews it.
    async fn read_permission(
        &self,
        database_id: &str,
        user_id: &str,
        permission_id: &str,
        duration: Duration,
    ) -> StorageResult<IssuedPermission>;

    /// Creates a permission owned by `user` with a token valid for `duration`.
    async fn create_permission(
        &self,
        user: &User,
        permission: &NewPermission,
        duration: Duration,
    ) -> StorageResult<IssuedPermission>;

    /// Deletes a permission.
    async fn delete_permission(
        &self,
        database_id: &str,
        user_id: &str,
        permission_id: &str,
    ) -> StorageResult<()>;
}

/// Durable key-value store for short-lived secrets.
///
/// Names are 1-127 characters of `0-9`, `a-z`, `A-Z` and `-`.
#[async_trait]
pub trait SecretCache: Send + Sync + 'static {
    /// Gets a secret; absence is reported as
    /// [`StorageError::SecretNotFound`](crate::StorageError::SecretNotFound).
    async fn get_secret(&self, name: &str) -> StorageResult<Secret>;

    /// Creates or replaces a secret.
    async fn set_secret(
        &self,
        name: &str,
        value: String,
        expires_at: DateTime<Utc>,
    ) -> StorageResult<Secret>;
}
