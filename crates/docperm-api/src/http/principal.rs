//! Caller principal extraction from App Service authentication headers.

use std::convert::Infallible;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts, http::HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use tracing::debug;

use docperm_domain::identity::{
    Claim, ClaimsIdentity, CLIENT_PRINCIPAL_ID_HEADER, CLIENT_PRINCIPAL_IDP_HEADER,
    CLIENT_PRINCIPAL_NAME_HEADER,
};
use docperm_domain::Principal;

/// Header carrying the base64-encoded JSON claims of the caller.
pub const CLIENT_PRINCIPAL_HEADER: &str = "x-ms-client-principal";

/// Extractor producing the caller's [`Principal`]. Never rejects; a caller
/// without authentication headers yields an empty principal.
#[derive(Debug, Clone)]
pub struct CallerPrincipal(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for CallerPrincipal
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(CallerPrincipal(principal_from_headers(&parts.headers)))
    }
}

/// Builds a principal from the authentication headers present on a request.
pub fn principal_from_headers(headers: &HeaderMap) -> Principal {
    let mut principal = Principal::new();

    for name in [
        CLIENT_PRINCIPAL_IDP_HEADER,
        CLIENT_PRINCIPAL_ID_HEADER,
        CLIENT_PRINCIPAL_NAME_HEADER,
    ] {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            principal = principal.with_header(name, value);
        }
    }

    if let Some(identity) = headers
        .get(CLIENT_PRINCIPAL_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(decode_client_principal)
    {
        principal = principal.with_identity(identity);
    }

    principal
}

#[derive(Debug, Deserialize)]
struct EncodedPrincipal {
    #[serde(default)]
    claims: Vec<EncodedClaim>,
}

#[derive(Debug, Deserialize)]
struct EncodedClaim {
    typ: String,
    val: String,
}

/// Decodes `X-MS-CLIENT-PRINCIPAL` (`{"claims":[{"typ":..,"val":..}]}`,
/// base64). Malformed values are ignored.
pub fn decode_client_principal(encoded: &str) -> Option<ClaimsIdentity> {
    let bytes = match STANDARD.decode(encoded.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "ignoring client principal that is not base64");
            return None;
        }
    };

    let decoded: EncodedPrincipal = match serde_json::from_slice(&bytes) {
        Ok(decoded) => decoded,
        Err(e) => {
            debug!(error = %e, "ignoring client principal that is not JSON");
            return None;
        }
    };

    let claims = decoded
        .claims
        .into_iter()
        .map(|claim| Claim::new(claim.typ, claim.val))
        .collect();
    Some(ClaimsIdentity::authenticated(claims))
}
