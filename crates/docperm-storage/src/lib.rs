//! docperm-storage: Store abstractions for the permission broker
//!
//! This crate provides the contracts the broker consumes from its external
//! collaborators, plus in-memory implementations:
//! - ResourceStore trait (databases, collections, users, permissions)
//! - SecretCache trait (short-lived secrets with expiry)
//! - In-memory implementations for tests and local runs
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              docperm-storage                 │
//! ├─────────────────────────────────────────────┤
//! │  traits.rs  - ResourceStore / SecretCache   │
//! │  memory.rs  - In-memory resource store      │
//! │  secrets.rs - In-memory secret cache        │
//! └─────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod memory;
pub mod secrets;
pub mod traits;

// Re-export commonly used types
pub use error::{StorageError, StorageResult};
pub use memory::{MemoryResourceStore, StoreOperation};
pub use secrets::MemorySecretCache;
pub use traits::{
    Collection, Database, NewPermission, ResourceStore, Secret, SecretCache, User,
};

// Re-export chrono types used in the public API
pub use chrono::{DateTime, Utc};
