//! Hierarchical resource paths (database -> collection).

use std::fmt;

/// Identifies a database, or a collection within a database.
///
/// Used as the key for initialization state, so database-level and
/// collection-level paths are tracked independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourcePath {
    pub database_id: String,
    pub collection_id: Option<String>,
}

impl ResourcePath {
    /// Path of a database.
    pub fn database(database_id: impl Into<String>) -> Self {
        Self {
            database_id: database_id.into(),
            collection_id: None,
        }
    }

    /// Path of a collection inside a database.
    pub fn collection(database_id: impl Into<String>, collection_id: impl Into<String>) -> Self {
        Self {
            database_id: database_id.into(),
            collection_id: Some(collection_id.into()),
        }
    }

    /// Returns true when this path names a collection.
    pub fn is_collection(&self) -> bool {
        self.collection_id.is_some()
    }

    /// The database path that owns this resource (itself for a database).
    pub fn database_path(&self) -> ResourcePath {
        ResourcePath::database(self.database_id.clone())
    }

    /// Address-style link of the resource (`dbs/{db}` or `dbs/{db}/colls/{coll}`).
    ///
    /// Document stores accept these links wherever a resource link is
    /// expected, so permissions can target a resource without reading it back.
    pub fn link(&self) -> String {
        match &self.collection_id {
            Some(collection_id) => format!("dbs/{}/colls/{}", self.database_id, collection_id),
            None => format!("dbs/{}", self.database_id),
        }
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.collection_id {
            Some(collection_id) => write!(f, "{}/{}", self.database_id, collection_id),
            None => write!(f, "{}", self.database_id),
        }
    }
}

/// Initialization state of a single resource path.
///
/// `NotInitialized -> Initializing -> Initialized`, or back to
/// `NotInitialized` when the attempt fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitStatus {
    #[default]
    NotInitialized,
    Initializing,
    Initialized,
}
