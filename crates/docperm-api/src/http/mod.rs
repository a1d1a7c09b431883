//! HTTP API endpoints.
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/api/data/permission` | POST | Permission for a database, collection or resource link |
//! | `/api/data/{database_id}/{collection_id}/token` | GET | Raw `All` token for a collection |
//! | `/health` | GET | Liveness check |
//! | `/metrics` | GET | Prometheus metrics (observability router only) |
//!
//! The caller's user id comes from the App Service authentication headers;
//! unauthenticated callers share the anonymous user id.

pub mod principal;
pub mod routes;
pub mod state;

pub use principal::CallerPrincipal;
pub use routes::{
    create_router, create_router_with_body_limit, create_router_with_observability,
    ApiError, PermissionRequestBody, DEFAULT_BODY_LIMIT,
};
pub use state::AppState;
