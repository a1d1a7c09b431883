//! In-memory secret cache backed by Moka.
//!
//! Each entry is evicted when its `expires_at` passes, using Moka's
//! per-entry expiry policy, so an expired secret reads as not found.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docperm_domain::validate_secret_name;
use moka::future::Cache;
use moka::Expiry;
use tracing::instrument;

use crate::error::{StorageError, StorageResult};
use crate::traits::{Secret, SecretCache};

/// Default maximum number of secrets held.
pub const DEFAULT_SECRET_CAPACITY: u64 = 100_000;

/// Expires each secret at its own `expires_at`.
struct SecretExpiry;

impl Expiry<String, Secret> for SecretExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Secret,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.time_to_live()
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Secret,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.time_to_live()
    }
}

/// In-memory implementation of SecretCache.
pub struct MemorySecretCache {
    cache: Cache<String, Secret>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl std::fmt::Debug for MemorySecretCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySecretCache")
            .field("entry_count", &self.cache.entry_count())
            .field("reads", &self.reads.load(Ordering::Relaxed))
            .field("writes", &self.writes.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MemorySecretCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySecretCache {
    /// Creates a cache with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SECRET_CAPACITY)
    }

    /// Creates a cache holding at most `max_capacity` secrets.
    pub fn with_capacity(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(SecretExpiry)
            .build();

        Self {
            cache,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of `get_secret` calls so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of successful `set_secret` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

fn check_name(name: &str) -> StorageResult<()> {
    validate_secret_name(name).map_err(|e| StorageError::InvalidInput {
        message: e.to_string(),
    })
}

#[async_trait]
impl SecretCache for MemorySecretCache {
    #[instrument(skip(self))]
    async fn get_secret(&self, name: &str) -> StorageResult<Secret> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        check_name(name)?;

        self.cache
            .get(name)
            .await
            .ok_or_else(|| StorageError::SecretNotFound {
                name: name.to_string(),
            })
    }

    #[instrument(skip(self, value))]
    async fn set_secret(
        &self,
        name: &str,
        value: String,
        expires_at: DateTime<Utc>,
    ) -> StorageResult<Secret> {
        check_name(name)?;

        let secret = Secret {
            name: name.to_string(),
            value,
            expires_at: Some(expires_at),
            updated_at: Utc::now(),
        };
        self.cache.insert(name.to_string(), secret.clone()).await;
        self.writes.fetch_add(1, Ordering::Relaxed);

        Ok(secret)
    }
}
