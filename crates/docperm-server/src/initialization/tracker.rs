//! Read-or-create of databases and collections, deduplicated per path.

use std::sync::Arc;

use docperm_domain::{InitStatus, ResourcePath};
use docperm_storage::{ResourceStore, StorageError};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use super::singleflight::{InitOutcome, InitSlot, LeaderGuard, PathStates};
use crate::error::{BrokerError, BrokerResult};

/// Makes sure databases and collections exist, issuing at most one
/// read-or-create sequence per path at a time.
///
/// Once a path has been initialized it stays initialized for the lifetime
/// of the tracker; the store is not consulted again for it.
pub struct InitializationTracker<S: ResourceStore> {
    store: Arc<S>,
    states: PathStates,
    collection_throughput: Option<u32>,
}

impl<S: ResourceStore> InitializationTracker<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            states: PathStates::new(),
            collection_throughput: None,
        }
    }

    /// Throughput hint passed when a collection has to be created.
    pub fn with_collection_throughput(mut self, throughput: Option<u32>) -> Self {
        self.collection_throughput = throughput;
        self
    }

    /// Current initialization status of a path.
    pub fn status(&self, path: &ResourcePath) -> InitStatus {
        self.states.status(path)
    }

    /// Ensure a database exists.
    pub async fn ensure_database(&self, database_id: &str) -> BrokerResult<()> {
        self.ensure(ResourcePath::database(database_id)).await
    }

    /// Ensure a collection (and its database) exists.
    pub async fn ensure_collection(
        &self,
        database_id: &str,
        collection_id: &str,
    ) -> BrokerResult<()> {
        let path = ResourcePath::collection(database_id, collection_id);
        if self.states.status(&path) == InitStatus::Initialized {
            return Ok(());
        }

        self.ensure_database(database_id).await?;
        self.ensure(path).await
    }

    /// Ensure whatever `path` names exists.
    pub async fn ensure_path(&self, path: &ResourcePath) -> BrokerResult<()> {
        match &path.collection_id {
            Some(collection_id) => self.ensure_collection(&path.database_id, collection_id).await,
            None => self.ensure_database(&path.database_id).await,
        }
    }

    async fn ensure(&self, path: ResourcePath) -> BrokerResult<()> {
        loop {
            match self.states.acquire(&path) {
                InitSlot::Ready => return Ok(()),
                InitSlot::Follower(mut receiver) => match receiver.recv().await {
                    Ok(outcome) => {
                        return outcome.map_err(|message| BrokerError::Initialization {
                            path: path.to_string(),
                            message,
                        })
                    }
                    Err(RecvError::Closed) | Err(RecvError::Lagged(_)) => {
                        // Leader went away without an outcome; its guard
                        // already cleared the marker, so start over.
                        debug!(%path, "initialization leader vanished, retrying");
                    }
                },
                InitSlot::Leader(sender) => {
                    let guard = LeaderGuard::new(&self.states, path.clone());
                    let result = self.read_or_create(&path).await;

                    let outcome: InitOutcome = match &result {
                        Ok(()) => Ok(()),
                        Err(e) => Err(e.to_string()),
                    };
                    guard.complete(sender, outcome);

                    return result.map_err(|source| {
                        source.log();
                        BrokerError::Initialization {
                            path: path.to_string(),
                            message: source.to_string(),
                        }
                    });
                }
            }
        }
    }

    /// Read the resource; create it when it is absent.
    ///
    /// A creation conflict means another writer created it between our read
    /// and create, which is as good as success.
    async fn read_or_create(&self, path: &ResourcePath) -> Result<(), StorageError> {
        let level = if path.is_collection() {
            "collection"
        } else {
            "database"
        };

        let read = match &path.collection_id {
            Some(collection_id) => self
                .store
                .read_collection(&path.database_id, collection_id)
                .await
                .map(|_| ()),
            None => self.store.read_database(&path.database_id).await.map(|_| ()),
        };

        match read {
            Ok(()) => {
                debug!(%path, kind = level, "resource already exists");
                record(level, "existing");
                return Ok(());
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                record(level, "failed");
                return Err(e);
            }
        }

        let created = match &path.collection_id {
            Some(collection_id) => self
                .store
                .create_collection(&path.database_id, collection_id, self.collection_throughput)
                .await
                .map(|_| ()),
            None => self.store.create_database(&path.database_id).await.map(|_| ()),
        };

        match created {
            Ok(()) => {
                info!(%path, kind = level, "created resource");
                record(level, "created");
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                debug!(%path, kind = level, "resource created concurrently");
                record(level, "existing");
                Ok(())
            }
            Err(e) => {
                record(level, "failed");
                Err(e)
            }
        }
    }
}

fn record(level: &'static str, outcome: &'static str) {
    metrics::counter!(
        "docperm_initializations_total",
        "level" => level,
        "outcome" => outcome
    )
    .increment(1);
}
