//! Built-in identity resolvers.

use super::{
    IdentityResolver, Principal, CLIENT_PRINCIPAL_IDP_HEADER, CLIENT_PRINCIPAL_ID_HEADER,
    IDENTITY_PROVIDER_CLAIM, NAME_IDENTIFIER_CLAIM,
};

/// Resolves `{provider}|{id}` from the App Service client principal headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientPrincipalResolver;

impl IdentityResolver for ClientPrincipalResolver {
    fn resolve(&self, principal: &Principal) -> Option<String> {
        let provider = principal
            .header(CLIENT_PRINCIPAL_IDP_HEADER)
            .filter(|v| !v.is_empty())?;
        let id = principal
            .header(CLIENT_PRINCIPAL_ID_HEADER)
            .filter(|v| !v.is_empty())?;

        Some(format!("{provider}|{id}"))
    }
}

/// Resolves `{provider}|{stable_sid}` from an authenticated claims identity.
///
/// Token version 3 carries an unstable name identifier, so `stable_sid` is
/// used; version 4 name identifiers are stable.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaimsResolver;

impl IdentityResolver for ClaimsResolver {
    fn resolve(&self, principal: &Principal) -> Option<String> {
        let identity = principal.identity.as_ref().filter(|i| i.authenticated)?;

        let version = identity.find_first("ver").unwrap_or_default();
        let stable_sid = if version.eq_ignore_ascii_case("3") {
            identity.find_first("stable_sid")
        } else if version.eq_ignore_ascii_case("4") {
            identity.find_first(NAME_IDENTIFIER_CLAIM)
        } else {
            None
        };

        let stable_sid = stable_sid.filter(|v| !v.is_empty())?;
        let provider = identity
            .find_first(IDENTITY_PROVIDER_CLAIM)
            .filter(|v| !v.is_empty())?;

        Some(format!("{provider}|{stable_sid}"))
    }
}

/// Tries each resolver in order and returns the first identified user.
#[derive(Default)]
pub struct ChainResolver {
    resolvers: Vec<Box<dyn IdentityResolver>>,
}

impl ChainResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resolver: impl IdentityResolver + 'static) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }
}

impl IdentityResolver for ChainResolver {
    fn resolve(&self, principal: &Principal) -> Option<String> {
        self.resolvers.iter().find_map(|r| r.resolve(principal))
    }
}
