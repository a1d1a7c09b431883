//! Core permission types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::path::ResourcePath;
use crate::error::{DomainError, DomainResult};

/// Access level granted by a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionMode {
    #[serde(alias = "read", alias = "READ")]
    Read,
    #[serde(alias = "all", alias = "ALL")]
    All,
}

impl PermissionMode {
    /// Upper-case token used inside permission ids.
    pub fn as_token(&self) -> &'static str {
        match self {
            PermissionMode::Read => "READ",
            PermissionMode::All => "ALL",
        }
    }

    /// The other mode (`All` <-> `Read`).
    pub fn opposite(&self) -> PermissionMode {
        match self {
            PermissionMode::Read => PermissionMode::All,
            PermissionMode::All => PermissionMode::Read,
        }
    }

    /// Returns true if a permission with this mode can serve a request for
    /// `requested`. `All` is a superset of `Read`.
    pub fn satisfies(&self, requested: PermissionMode) -> bool {
        *self == PermissionMode::All || *self == requested
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionMode::Read => f.write_str("Read"),
            PermissionMode::All => f.write_str("All"),
        }
    }
}

impl FromStr for PermissionMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "read" => Ok(PermissionMode::Read),
            "all" => Ok(PermissionMode::All),
            _ => Err(DomainError::InvalidPermissionMode {
                value: s.to_string(),
            }),
        }
    }
}

/// Input to the broker: which resource, which user, which access level.
///
/// `collection_id` and `resource_link` are independent. When both are absent
/// the request targets the database itself; an explicit `resource_link`
/// always wins over the link derived from the database or collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRequest {
    pub database_id: String,
    pub collection_id: Option<String>,
    pub resource_link: Option<String>,
    pub user_id: String,
    pub permission_mode: PermissionMode,
    pub requested_duration_secs: i64,
}

impl PermissionRequest {
    /// Creates a database-level request with no requested duration
    /// (the policy minimum applies).
    pub fn new(
        database_id: impl Into<String>,
        user_id: impl Into<String>,
        permission_mode: PermissionMode,
    ) -> Self {
        Self {
            database_id: database_id.into(),
            collection_id: None,
            resource_link: None,
            user_id: user_id.into(),
            permission_mode,
            requested_duration_secs: 0,
        }
    }

    /// Targets a collection inside the database.
    pub fn with_collection(mut self, collection_id: impl Into<String>) -> Self {
        self.collection_id = non_empty(collection_id.into());
        self
    }

    /// Overrides the resource the permission is scoped to.
    pub fn with_resource_link(mut self, resource_link: impl Into<String>) -> Self {
        self.resource_link = non_empty(resource_link.into());
        self
    }

    /// Sets the requested token lifetime in seconds.
    pub fn with_duration_secs(mut self, secs: i64) -> Self {
        self.requested_duration_secs = secs;
        self
    }

    /// Collection id, treating an empty string as absent.
    pub fn collection_id(&self) -> Option<&str> {
        self.collection_id.as_deref().filter(|s| !s.is_empty())
    }

    /// Explicit resource link, treating an empty string as absent.
    pub fn resource_link(&self) -> Option<&str> {
        self.resource_link.as_deref().filter(|s| !s.is_empty())
    }

    /// Checks the request before any store is touched.
    pub fn validate(&self) -> DomainResult<()> {
        if self.database_id.trim().is_empty() {
            return Err(DomainError::MissingDatabaseId);
        }
        if self.user_id.trim().is_empty() {
            return Err(DomainError::MissingUserId);
        }
        Ok(())
    }

    /// The backing resource that must exist before a permission is issued.
    pub fn resource_path(&self) -> ResourcePath {
        match self.collection_id() {
            Some(collection_id) => ResourcePath::collection(&self.database_id, collection_id),
            None => ResourcePath::database(&self.database_id),
        }
    }

    /// Link the permission is scoped to: the explicit override if present,
    /// otherwise the link of the backing resource.
    pub fn target_link(&self) -> String {
        match self.resource_link() {
            Some(link) => link.to_string(),
            None => self.resource_path().link(),
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// A permission minted by the resource store, as handed to callers and
/// persisted in the secret cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedPermission {
    pub id: String,
    pub resource_link: String,
    pub permission_mode: PermissionMode,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl IssuedPermission {
    /// Serializes to the JSON stored in the secret cache.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parses the JSON stored in the secret cache.
    pub fn from_json(value: &str) -> serde_json::Result<Self> {
        serde_json::from_str(value)
    }
}
