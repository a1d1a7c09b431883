//! Application state for HTTP handlers.

use std::sync::Arc;

use docperm_domain::identity::{ChainResolver, ClaimsResolver, ClientPrincipalResolver};
use docperm_domain::{resolve_user_id, IdentityResolver, Principal, ANONYMOUS_USER_ID};
use docperm_server::{PermissionBroker, ServerConfig};
use docperm_storage::{ResourceStore, SecretCache};

/// Application state shared across all HTTP handlers.
///
/// # Type Parameters
///
/// * `R` - The resource store backing databases, users and permissions
/// * `C` - The secret cache holding issued permissions
pub struct AppState<R: ResourceStore, C: SecretCache> {
    /// Issues and renews permissions.
    pub broker: Arc<PermissionBroker<R, C>>,
    /// Maps the caller's principal to a user id.
    pub resolver: Arc<dyn IdentityResolver>,
    /// User id of callers the resolver cannot identify.
    pub anonymous_user_id: String,
}

impl<R: ResourceStore, C: SecretCache> AppState<R, C> {
    /// Creates state with default token policy and identity resolution.
    pub fn new(store: Arc<R>, secrets: Arc<C>) -> Self {
        Self::with_broker(PermissionBroker::new(store, secrets))
    }

    /// Creates state configured from a loaded [`ServerConfig`].
    pub fn from_config(store: Arc<R>, secrets: Arc<C>, config: &ServerConfig) -> Self {
        let broker = PermissionBroker::from_settings(store, secrets, &config.broker);
        Self {
            anonymous_user_id: config.broker.anonymous_user_id.clone(),
            ..Self::with_broker(broker)
        }
    }

    pub fn with_broker(broker: PermissionBroker<R, C>) -> Self {
        Self {
            broker: Arc::new(broker),
            resolver: Arc::new(default_resolver()),
            anonymous_user_id: ANONYMOUS_USER_ID.to_string(),
        }
    }

    /// Replaces the identity resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// The caller's user id, or the anonymous id.
    pub fn user_id(&self, principal: &Principal) -> String {
        resolve_user_id(self.resolver.as_ref(), principal, &self.anonymous_user_id)
    }
}

/// Client principal headers first, then the claims identity.
pub fn default_resolver() -> ChainResolver {
    ChainResolver::new()
        .with(ClientPrincipalResolver)
        .with(ClaimsResolver)
}
