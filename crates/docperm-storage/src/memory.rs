//! In-memory resource store for testing and local runs.
//!
//! Behaves like a document database for the operations the broker uses:
//! - Creating an existing database, collection or user is a `Conflict`
//! - A user may hold one permission per resource link; a second one, or a
//!   duplicate id, is a `Conflict`
//! - Reading a permission renews its token for the requested duration
//!
//! Every call is counted per [`StoreOperation`], and calls can be delayed or
//! made to fail, so callers can assert on round trips and failure handling.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use docperm_domain::IssuedPermission;
use tracing::instrument;
use ulid::Ulid;

use crate::error::{StorageError, StorageResult};
use crate::traits::{Collection, Database, NewPermission, ResourceStore, User};

/// Store operations, used for call accounting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    ReadDatabase,
    CreateDatabase,
    ReadCollection,
    CreateCollection,
    ReadUser,
    CreateUser,
    ReadPermission,
    CreatePermission,
    DeletePermission,
}

/// In-memory implementation of ResourceStore.
///
/// Uses DashMap entry locks so that check-then-insert sequences are atomic
/// per key.
#[derive(Debug, Default)]
pub struct MemoryResourceStore {
    databases: DashMap<String, Database>,
    /// Keyed by (database_id, collection_id).
    collections: DashMap<(String, String), Collection>,
    /// Keyed by (database_id, user_id).
    users: DashMap<(String, String), User>,
    /// Permissions per (database_id, user_id), keyed by permission id.
    permissions: DashMap<(String, String), HashMap<String, IssuedPermission>>,
    calls: DashMap<StoreOperation, usize>,
    /// Remaining injected failures per operation.
    failures: DashMap<StoreOperation, usize>,
    latency: Option<Duration>,
}

impl MemoryResourceStore {
    /// Creates a new in-memory resource store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory resource store wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Delays every call by `latency`, simulating a network round trip.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of calls made to `operation` so far.
    pub fn calls(&self, operation: StoreOperation) -> usize {
        self.calls.get(&operation).map(|c| *c).unwrap_or(0)
    }

    /// Makes the next `times` calls to `operation` fail with a connection error.
    pub fn fail_next(&self, operation: StoreOperation, times: usize) {
        *self.failures.entry(operation).or_default() += times;
    }

    /// Returns all permissions currently held by a user.
    pub fn permissions_of(&self, database_id: &str, user_id: &str) -> Vec<IssuedPermission> {
        let mut permissions: Vec<IssuedPermission> = self
            .permissions
            .get(&key(database_id, user_id))
            .map(|p| p.values().cloned().collect())
            .unwrap_or_default();
        permissions.sort_by(|a, b| a.id.cmp(&b.id));
        permissions
    }

    /// Counts the call, applies latency and consumes an injected failure.
    async fn enter(&self, operation: StoreOperation) -> StorageResult<()> {
        *self.calls.entry(operation).or_default() += 1;

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(mut remaining) = self.failures.get_mut(&operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StorageError::ConnectionError {
                    message: format!("injected failure for {operation:?}"),
                });
            }
        }

        Ok(())
    }

    fn ensure_database(&self, database_id: &str) -> StorageResult<()> {
        if self.databases.contains_key(database_id) {
            Ok(())
        } else {
            Err(StorageError::DatabaseNotFound {
                database_id: database_id.to_string(),
            })
        }
    }
}

fn key(a: &str, b: &str) -> (String, String) {
    (a.to_string(), b.to_string())
}

fn validate_id(kind: &str, id: &str) -> StorageResult<()> {
    if id.trim().is_empty() {
        return Err(StorageError::BadRequest {
            message: format!("{kind} id cannot be empty"),
        });
    }
    if id.contains('/') {
        return Err(StorageError::BadRequest {
            message: format!("{kind} id cannot contain '/': {id}"),
        });
    }
    Ok(())
}

fn mint_token() -> String {
    format!("type=resource&ver=1&sig={}", Ulid::new())
}

fn expiry_after(duration: Duration) -> StorageResult<chrono::DateTime<Utc>> {
    let duration = chrono::Duration::from_std(duration).map_err(|e| StorageError::InvalidInput {
        message: format!("token duration out of range: {e}"),
    })?;
    Utc::now()
        .checked_add_signed(duration)
        .ok_or_else(|| StorageError::InvalidInput {
            message: format!(
                "token duration of {}s ends past the latest date",
                duration.num_seconds()
            ),
        })
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    #[instrument(skip(self))]
    async fn read_database(&self, database_id: &str) -> StorageResult<Database> {
        self.enter(StoreOperation::ReadDatabase).await?;

        self.databases
            .get(database_id)
            .map(|d| d.value().clone())
            .ok_or_else(|| StorageError::DatabaseNotFound {
                database_id: database_id.to_string(),
            })
    }

    #[instrument(skip(self))]
    async fn create_database(&self, database_id: &str) -> StorageResult<Database> {
        self.enter(StoreOperation::CreateDatabase).await?;
        validate_id("database", database_id)?;

        match self.databases.entry(database_id.to_string()) {
            Entry::Occupied(_) => Err(StorageError::Conflict {
                resource: format!("database {database_id}"),
            }),
            Entry::Vacant(entry) => {
                let database = Database {
                    id: database_id.to_string(),
                    self_link: format!("dbs/{database_id}"),
                    created_at: Utc::now(),
                };
                entry.insert(database.clone());
                Ok(database)
            }
        }
    }

    #[instrument(skip(self))]
    async fn read_collection(
        &self,
        database_id: &str,
        collection_id: &str,
    ) -> StorageResult<Collection> {
        self.enter(StoreOperation::ReadCollection).await?;
        self.ensure_database(database_id)?;

        self.collections
            .get(&key(database_id, collection_id))
            .map(|c| c.value().clone())
            .ok_or_else(|| StorageError::CollectionNotFound {
                database_id: database_id.to_string(),
                collection_id: collection_id.to_string(),
            })
    }

    #[instrument(skip(self))]
    async fn create_collection(
        &self,
        database_id: &str,
        collection_id: &str,
        throughput: Option<u32>,
    ) -> StorageResult<Collection> {
        self.enter(StoreOperation::CreateCollection).await?;
        validate_id("collection", collection_id)?;
        self.ensure_database(database_id)?;

        match self.collections.entry(key(database_id, collection_id)) {
            Entry::Occupied(_) => Err(StorageError::Conflict {
                resource: format!("collection {database_id}/{collection_id}"),
            }),
            Entry::Vacant(entry) => {
                let collection = Collection {
                    database_id: database_id.to_string(),
                    id: collection_id.to_string(),
                    self_link: format!("dbs/{database_id}/colls/{collection_id}"),
                    throughput,
                    created_at: Utc::now(),
                };
                entry.insert(collection.clone());
                Ok(collection)
            }
        }
    }

    #[instrument(skip(self))]
    async fn read_user(&self, database_id: &str, user_id: &str) -> StorageResult<User> {
        self.enter(StoreOperation::ReadUser).await?;
        self.ensure_database(database_id)?;

        self.users
            .get(&key(database_id, user_id))
            .map(|u| u.value().clone())
            .ok_or_else(|| StorageError::UserNotFound {
                database_id: database_id.to_string(),
                user_id: user_id.to_string(),
            })
    }

    #[instrument(skip(self))]
    async fn create_user(&self, database_id: &str, user_id: &str) -> StorageResult<User> {
        self.enter(StoreOperation::CreateUser).await?;
        validate_id("user", user_id)?;
        self.ensure_database(database_id)?;

        match self.users.entry(key(database_id, user_id)) {
            Entry::Occupied(_) => Err(StorageError::Conflict {
                resource: format!("user {database_id}/{user_id}"),
            }),
            Entry::Vacant(entry) => {
                let user = User {
                    database_id: database_id.to_string(),
                    id: user_id.to_string(),
                    self_link: format!("dbs/{database_id}/users/{user_id}"),
                    created_at: Utc::now(),
                };
                entry.insert(user.clone());
                Ok(user)
            }
        }
    }

    #[instrument(skip(self))]
    async fn read_permission(
        &self,
        database_id: &str,
        user_id: &str,
        permission_id: &str,
        duration: Duration,
    ) -> StorageResult<IssuedPermission> {
        self.enter(StoreOperation::ReadPermission).await?;
        let expires_at = expiry_after(duration)?;

        let not_found = || StorageError::PermissionNotFound {
            database_id: database_id.to_string(),
            user_id: user_id.to_string(),
            permission_id: permission_id.to_string(),
        };

        let mut permissions = self
            .permissions
            .get_mut(&key(database_id, user_id))
            .ok_or_else(not_found)?;
        let permission = permissions.get_mut(permission_id).ok_or_else(not_found)?;

        // Reading hands out a renewed token
        permission.token = mint_token();
        permission.expires_at = expires_at;

        Ok(permission.clone())
    }

    #[instrument(skip(self, user), fields(database_id = %user.database_id, user_id = %user.id))]
    async fn create_permission(
        &self,
        user: &User,
        permission: &NewPermission,
        duration: Duration,
    ) -> StorageResult<IssuedPermission> {
        self.enter(StoreOperation::CreatePermission).await?;
        validate_id("permission", &permission.id)?;
        let expires_at = expiry_after(duration)?;

        if !self
            .users
            .contains_key(&key(&user.database_id, &user.id))
        {
            return Err(StorageError::UserNotFound {
                database_id: user.database_id.clone(),
                user_id: user.id.clone(),
            });
        }

        let mut permissions = self
            .permissions
            .entry(key(&user.database_id, &user.id))
            .or_default();

        if permissions.contains_key(&permission.id) {
            return Err(StorageError::Conflict {
                resource: format!("permission {}", permission.id),
            });
        }

        if let Some(existing) = permissions
            .values()
            .find(|p| p.resource_link == permission.resource_link)
        {
            return Err(StorageError::Conflict {
                resource: format!(
                    "permission {} on {}",
                    existing.id, existing.resource_link
                ),
            });
        }

        let issued = IssuedPermission {
            id: permission.id.clone(),
            resource_link: permission.resource_link.clone(),
            permission_mode: permission.mode,
            token: mint_token(),
            expires_at,
        };
        permissions.insert(permission.id.clone(), issued.clone());

        Ok(issued)
    }

    #[instrument(skip(self))]
    async fn delete_permission(
        &self,
        database_id: &str,
        user_id: &str,
        permission_id: &str,
    ) -> StorageResult<()> {
        self.enter(StoreOperation::DeletePermission).await?;

        let removed = self
            .permissions
            .get_mut(&key(database_id, user_id))
            .and_then(|mut permissions| permissions.remove(permission_id));

        match removed {
            Some(_) => Ok(()),
            None => Err(StorageError::PermissionNotFound {
                database_id: database_id.to_string(),
                user_id: user_id.to_string(),
                permission_id: permission_id.to_string(),
            }),
        }
    }
}
