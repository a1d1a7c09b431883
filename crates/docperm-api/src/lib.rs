//! docperm-api: HTTP API layer
//!
//! This crate provides the outward-facing surface including:
//! - HTTP endpoints via Axum that hand out resource tokens
//! - Caller identity extraction from App Service authentication headers
//! - Observability (structured logging, Prometheus metrics)
//! - The keep-warm heartbeat
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                docperm-api                   │
//! ├─────────────────────────────────────────────┤
//! │  http/          - Routes, state, principals │
//! │  observability/ - Logging and metrics       │
//! │  warm           - Keep-warm heartbeat       │
//! └─────────────────────────────────────────────┘
//! ```

pub mod http;
pub mod observability;
pub mod warm;
