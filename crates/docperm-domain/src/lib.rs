//! docperm-domain: Value types and pure rules for permission brokering
//!
//! This crate holds everything the broker needs that does not touch a store:
//! - Request/result value objects and the permission mode
//! - Resource paths and initialization status
//! - Secret-name and permission-id derivation
//! - Token lifetime policy (refresh threshold, duration clamp)
//! - Identity resolution from an inbound principal
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               docperm-domain                 │
//! ├─────────────────────────────────────────────┤
//! │  model/    - Requests, permissions, paths   │
//! │  naming    - Secret names & permission ids  │
//! │  policy    - Refresh threshold & clamping   │
//! │  identity/ - Principal -> stable user id    │
//! └─────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod identity;
pub mod model;
pub mod naming;
pub mod policy;

// Re-export commonly used types at the crate root
pub use error::{DomainError, DomainResult};
pub use identity::{resolve_user_id, IdentityResolver, Principal, ANONYMOUS_USER_ID};
pub use model::{
    InitStatus, IssuedPermission, PermissionMode, PermissionRequest, ResourcePath,
};
pub use naming::{secret_name, validate_secret_name, PermissionId};
pub use policy::TokenPolicy;
