//! The permission broker.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use docperm_domain::{
    secret_name, validate_secret_name, IssuedPermission, PermissionId, PermissionMode,
    PermissionRequest, TokenPolicy,
};
use docperm_storage::{NewPermission, ResourceStore, SecretCache, User};
use tracing::{debug, info, instrument, warn};

use super::lookup::CacheLookup;
use crate::config::BrokerSettings;
use crate::error::{BrokerError, BrokerResult};
use crate::initialization::InitializationTracker;

/// Issues resource tokens, reusing cached ones while they are fresh enough.
///
/// The broker owns its [`InitializationTracker`], so one broker instance per
/// process gives one initialization attempt per resource path.
pub struct PermissionBroker<R: ResourceStore, C: SecretCache> {
    store: Arc<R>,
    secrets: Arc<C>,
    tracker: InitializationTracker<R>,
    policy: TokenPolicy,
}

impl<R: ResourceStore, C: SecretCache> PermissionBroker<R, C> {
    pub fn new(store: Arc<R>, secrets: Arc<C>) -> Self {
        Self {
            tracker: InitializationTracker::new(Arc::clone(&store)),
            store,
            secrets,
            policy: TokenPolicy::default(),
        }
    }

    /// Builds a broker configured from `[broker]` settings.
    pub fn from_settings(store: Arc<R>, secrets: Arc<C>, settings: &BrokerSettings) -> Self {
        Self::new(store, secrets)
            .with_policy(settings.token_policy())
            .with_collection_throughput(settings.collection_throughput)
    }

    pub fn with_policy(mut self, policy: TokenPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_collection_throughput(mut self, throughput: Option<u32>) -> Self {
        self.tracker = self.tracker.with_collection_throughput(throughput);
        self
    }

    pub fn policy(&self) -> &TokenPolicy {
        &self.policy
    }

    pub fn tracker(&self) -> &InitializationTracker<R> {
        &self.tracker
    }

    /// Returns a permission for the request, from the secret cache when a
    /// cached one is fresh and strong enough, otherwise from the store.
    #[instrument(
        skip(self, request),
        fields(
            database_id = %request.database_id,
            collection_id = request.collection_id().unwrap_or(""),
            mode = %request.permission_mode,
        )
    )]
    pub async fn get_permission(
        &self,
        request: &PermissionRequest,
    ) -> BrokerResult<IssuedPermission> {
        request.validate()?;
        let name = secret_name(
            &request.database_id,
            request.collection_id(),
            &request.user_id,
        );
        validate_secret_name(&name)?;

        let now = Utc::now();
        let lookup = self.lookup(&name, request.permission_mode, now).await?;
        if let CacheLookup::Hit(permission) = lookup {
            metrics::counter!("docperm_secret_cache_hits_total").increment(1);
            debug!(secret_name = %name, "serving cached permission");
            return Ok(permission);
        }
        metrics::counter!("docperm_secret_cache_misses_total", "reason" => lookup.reason())
            .increment(1);
        debug!(secret_name = %name, reason = lookup.reason(), "secret cache miss");

        let duration = self.policy.effective_duration(request.requested_duration_secs);
        self.tracker.ensure_path(&request.resource_path()).await?;

        let permission = self.obtain(request, duration).await?;
        self.persist(&name, &permission, expiry(now, duration)).await?;

        Ok(permission)
    }

    /// Returns only the token of an `All` permission issued for the longest
    /// allowed duration. Shares its cache entry with [`get_permission`].
    ///
    /// [`get_permission`]: PermissionBroker::get_permission
    pub async fn get_data_token(
        &self,
        database_id: &str,
        collection_id: Option<&str>,
        user_id: &str,
    ) -> BrokerResult<String> {
        let max_secs = i64::try_from(self.policy.max_duration().as_secs()).unwrap_or(i64::MAX);
        let mut request = PermissionRequest::new(database_id, user_id, PermissionMode::All)
            .with_duration_secs(max_secs);
        if let Some(collection_id) = collection_id {
            request = request.with_collection(collection_id);
        }

        self.get_permission(&request)
            .await
            .map(|permission| permission.token)
    }

    /// Classifies what the secret cache holds under `name`.
    pub async fn lookup(
        &self,
        name: &str,
        requested: PermissionMode,
        now: DateTime<Utc>,
    ) -> BrokerResult<CacheLookup> {
        let secret = match self.secrets.get_secret(name).await {
            Ok(secret) => secret,
            Err(e) if e.is_not_found() => return Ok(CacheLookup::Missing),
            Err(e) => return Err(BrokerError::store(format!("reading secret {name}"), e)),
        };

        let fresh = secret
            .expires_at
            .is_some_and(|expires_at| self.policy.is_fresh(expires_at, now));
        if !fresh {
            return Ok(CacheLookup::Stale);
        }

        let permission = match IssuedPermission::from_json(&secret.value) {
            Ok(permission) => permission,
            Err(e) => {
                warn!(secret_name = %name, error = %e, "discarding undecodable cached permission");
                return Ok(CacheLookup::Unreadable);
            }
        };

        if !permission.permission_mode.satisfies(requested) {
            return Ok(CacheLookup::WeakerMode(permission.permission_mode));
        }

        Ok(CacheLookup::Hit(permission))
    }

    /// Renews the user's existing permission or mints a new one.
    async fn obtain(
        &self,
        request: &PermissionRequest,
        duration: Duration,
    ) -> BrokerResult<IssuedPermission> {
        let (user, created) = self.resolve_user(&request.database_id, &request.user_id).await?;
        let permission_id = PermissionId::new(
            &request.database_id,
            request.collection_id(),
            &request.user_id,
            request.permission_mode,
        );

        if !created {
            match self
                .store
                .read_permission(&user.database_id, &user.id, &permission_id.to_string(), duration)
                .await
            {
                Ok(permission) => {
                    debug!(%permission_id, "renewed existing permission");
                    return Ok(permission);
                }
                Err(e) if e.is_not_found() => {
                    debug!(%permission_id, "no existing permission");
                }
                Err(e) => {
                    e.log();
                    return Err(BrokerError::store(
                        format!("reading permission {permission_id}"),
                        e,
                    ));
                }
            }
        }

        self.create_permission(&user, &permission_id, request.target_link(), duration)
            .await
    }

    /// Reads the user, creating it when absent. The flag is true when this
    /// call created it.
    async fn resolve_user(&self, database_id: &str, user_id: &str) -> BrokerResult<(User, bool)> {
        match self.store.read_user(database_id, user_id).await {
            Ok(user) => return Ok((user, false)),
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                e.log();
                return Err(BrokerError::store(
                    format!("reading user {database_id}/{user_id}"),
                    e,
                ));
            }
        }

        match self.store.create_user(database_id, user_id).await {
            Ok(user) => {
                info!(database_id, user_id, "created user");
                Ok((user, true))
            }
            // Another request created the user first; it may already own
            // permissions, so treat it as existing.
            Err(e) if e.is_conflict() => self
                .store
                .read_user(database_id, user_id)
                .await
                .map(|user| (user, false))
                .map_err(|e| BrokerError::store(format!("reading user {database_id}/{user_id}"), e)),
            Err(e) => {
                e.log();
                Err(BrokerError::store(
                    format!("creating user {database_id}/{user_id}"),
                    e,
                ))
            }
        }
    }

    /// Creates the permission. On conflict the other-mode permission of the
    /// same identity is deleted and the create is retried once; a second
    /// conflict is returned as [`BrokerError::Conflict`].
    async fn create_permission(
        &self,
        user: &User,
        permission_id: &PermissionId,
        resource_link: String,
        duration: Duration,
    ) -> BrokerResult<IssuedPermission> {
        let new = NewPermission {
            id: permission_id.to_string(),
            resource_link,
            mode: permission_id.mode(),
        };

        match self.store.create_permission(user, &new, duration).await {
            Ok(permission) => {
                record_minted(&permission);
                return Ok(permission);
            }
            Err(e) if e.is_conflict() => {
                metrics::counter!("docperm_permission_conflicts_total").increment(1);
            }
            Err(e) => {
                e.log();
                return Err(BrokerError::store(
                    format!("creating permission {permission_id}"),
                    e,
                ));
            }
        }

        // A concurrent request for the same identity may have minted this
        // exact permission between our read and create.
        match self
            .store
            .read_permission(&user.database_id, &user.id, &new.id, duration)
            .await
        {
            Ok(permission) => {
                debug!(%permission_id, "permission minted concurrently");
                return Ok(permission);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                e.log();
                return Err(BrokerError::store(
                    format!("reading permission {permission_id}"),
                    e,
                ));
            }
        }

        let replaced = permission_id.opposite();
        warn!(
            %permission_id,
            replaced = %replaced,
            "permission conflict, replacing other-mode permission"
        );
        match self
            .store
            .delete_permission(&user.database_id, &user.id, &replaced.to_string())
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(%replaced, "other-mode permission already gone");
            }
            Err(e) => {
                e.log();
                return Err(BrokerError::store(
                    format!("deleting permission {replaced}"),
                    e,
                ));
            }
        }

        match self.store.create_permission(user, &new, duration).await {
            Ok(permission) => {
                record_minted(&permission);
                Ok(permission)
            }
            Err(e) if e.is_conflict() => {
                e.log();
                Err(BrokerError::Conflict {
                    permission_id: new.id,
                })
            }
            Err(e) => {
                e.log();
                Err(BrokerError::store(
                    format!("creating permission {permission_id}"),
                    e,
                ))
            }
        }
    }

    async fn persist(
        &self,
        name: &str,
        permission: &IssuedPermission,
        expires_at: DateTime<Utc>,
    ) -> BrokerResult<()> {
        let value = permission.to_json()?;
        self.secrets
            .set_secret(name, value, expires_at)
            .await
            .map_err(|e| BrokerError::store(format!("writing secret {name}"), e))?;
        debug!(secret_name = %name, %expires_at, "cached permission");
        Ok(())
    }
}

fn record_minted(permission: &IssuedPermission) {
    info!(
        permission_id = %permission.id,
        resource_link = %permission.resource_link,
        "minted permission"
    );
    metrics::counter!(
        "docperm_permissions_minted_total",
        "mode" => permission.permission_mode.as_token()
    )
    .increment(1);
}

/// `now + duration`, saturating at the latest representable instant.
fn expiry(now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|duration| now.checked_add_signed(duration))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
