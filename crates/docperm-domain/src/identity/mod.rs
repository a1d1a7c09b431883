//! Identity resolution: inbound principal -> stable user identifier.
//!
//! Two sources are supported:
//! - App Service authentication headers (`X-MS-CLIENT-PRINCIPAL-IDP` and
//!   `X-MS-CLIENT-PRINCIPAL-ID`)
//! - A claims identity carrying `ver`, `stable_sid`/nameidentifier and the
//!   identity-provider claim
//!
//! Callers that cannot be identified share [`ANONYMOUS_USER_ID`].

mod resolvers;

use std::collections::BTreeMap;

pub use resolvers::{ChainResolver, ClaimsResolver, ClientPrincipalResolver};

/// Sentinel user id for callers that cannot be identified.
pub const ANONYMOUS_USER_ID: &str = "anonymous-user";

/// Header carrying the identity provider of an authenticated caller.
pub const CLIENT_PRINCIPAL_IDP_HEADER: &str = "x-ms-client-principal-idp";
/// Header carrying the provider-scoped id of an authenticated caller.
pub const CLIENT_PRINCIPAL_ID_HEADER: &str = "x-ms-client-principal-id";
/// Header carrying the display name of an authenticated caller.
pub const CLIENT_PRINCIPAL_NAME_HEADER: &str = "x-ms-client-principal-name";

/// Claim type of the (possibly unstable) name identifier.
pub const NAME_IDENTIFIER_CLAIM: &str =
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier";
/// Claim type of the identity provider.
pub const IDENTITY_PROVIDER_CLAIM: &str =
    "http://schemas.microsoft.com/identity/claims/identityprovider";

/// A single `(type, value)` claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub typ: String,
    pub val: String,
}

impl Claim {
    pub fn new(typ: impl Into<String>, val: impl Into<String>) -> Self {
        Self {
            typ: typ.into(),
            val: val.into(),
        }
    }
}

/// Claims attached to an authenticated caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimsIdentity {
    pub authenticated: bool,
    pub claims: Vec<Claim>,
}

impl ClaimsIdentity {
    pub fn authenticated(claims: Vec<Claim>) -> Self {
        Self {
            authenticated: true,
            claims,
        }
    }

    /// Value of the first claim with the given type.
    pub fn find_first(&self, typ: &str) -> Option<&str> {
        self.claims
            .iter()
            .find(|c| c.typ == typ)
            .map(|c| c.val.as_str())
    }
}

/// Transport-independent view of the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    /// Request headers, keyed by lower-case name.
    headers: BTreeMap<String, String>,
    /// Claims identity, if the transport supplied one.
    pub identity: Option<ClaimsIdentity>,
}

impl Principal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header; names are case-insensitive.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_identity(mut self, identity: ClaimsIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Display name from the client principal headers.
    pub fn client_principal_name(&self) -> Option<&str> {
        self.header(CLIENT_PRINCIPAL_NAME_HEADER)
    }
}

/// Extracts a stable user identifier from a principal.
pub trait IdentityResolver: Send + Sync {
    /// Returns the caller's stable id, or `None` if it cannot be established.
    fn resolve(&self, principal: &Principal) -> Option<String>;
}

/// Resolves the user id, falling back to `anonymous_id` when the resolver
/// cannot identify the caller.
pub fn resolve_user_id(
    resolver: &dyn IdentityResolver,
    principal: &Principal,
    anonymous_id: &str,
) -> String {
    match resolver.resolve(principal) {
        Some(user_id) => user_id,
        None => {
            tracing::debug!("caller not identified, using anonymous user id");
            anonymous_id.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_are_case_insensitive() {
        let principal = Principal::new().with_header("X-MS-CLIENT-PRINCIPAL-NAME", "alice");
        assert_eq!(principal.client_principal_name(), Some("alice"));
        assert_eq!(principal.header("x-ms-client-principal-name"), Some("alice"));
    }

    #[test]
    fn test_unidentified_caller_maps_to_anonymous() {
        let resolver = ClientPrincipalResolver;
        let user_id = resolve_user_id(&resolver, &Principal::new(), ANONYMOUS_USER_ID);
        assert_eq!(user_id, ANONYMOUS_USER_ID);
    }
}
