//! Token issuance with cache reuse, renewal and conflict recovery.
//!
//! For each request the broker walks a fixed sequence:
//!
//! ```text
//! CacheLookup ─hit──────────────────────────────────────────────▶ return
//!     │miss
//!     ▼
//! EnsureResources ─▶ ResolveUser ─created─▶ CreatePermission ─▶ persist, return
//!                        │existing                ▲   │conflict
//!                        ▼                        │   ▼
//!                  ReadPermission ─not found──────┘  DeleteOtherMode ─▶ RetryCreate
//!                        │found
//!                        ▼
//!                  persist, return
//! ```
//!
//! A cached permission is reused while its remaining lifetime exceeds the
//! refresh threshold and its mode covers the requested one (`All` covers
//! `Read`).

mod lookup;
mod service;

pub use lookup::CacheLookup;
pub use service::PermissionBroker;

#[cfg(test)]
mod tests;
