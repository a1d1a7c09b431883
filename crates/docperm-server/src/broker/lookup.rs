//! Secret cache lookup outcomes.

use docperm_domain::{IssuedPermission, PermissionMode};

/// What the secret cache held for a request.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// A fresh permission whose mode covers the request.
    Hit(IssuedPermission),
    /// Nothing cached under the secret name.
    Missing,
    /// Cached, but expiring within the refresh threshold.
    Stale,
    /// Cached and fresh, but `Read` cannot serve an `All` request.
    WeakerMode(PermissionMode),
    /// Cached value could not be decoded.
    Unreadable,
}

impl CacheLookup {
    /// Metric label for a miss.
    pub fn reason(&self) -> &'static str {
        match self {
            CacheLookup::Hit(_) => "hit",
            CacheLookup::Missing => "missing",
            CacheLookup::Stale => "stale",
            CacheLookup::WeakerMode(_) => "weaker_mode",
            CacheLookup::Unreadable => "unreadable",
        }
    }
}
