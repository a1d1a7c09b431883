//! docperm-server: Permission brokering logic
//!
//! This crate contains the coordination layer including:
//! - Initialization tracker deduplicating concurrent "ensure exists" calls
//! - Permission broker (cache lookup, renewal, minting, conflict recovery)
//! - Configuration management
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               docperm-server                 │
//! ├─────────────────────────────────────────────┤
//! │  config.rs       - Configuration management │
//! │  error.rs        - Broker error taxonomy    │
//! │  initialization/ - Database/collection init │
//! │  broker/         - Token issuance & renewal │
//! └─────────────────────────────────────────────┘
//! ```

pub mod broker;
pub mod config;
pub mod error;
pub mod initialization;

// Re-exports for convenience
pub use broker::PermissionBroker;
pub use config::{ConfigLoadError, ServerConfig};
pub use error::{BrokerError, BrokerResult};
pub use initialization::InitializationTracker;
