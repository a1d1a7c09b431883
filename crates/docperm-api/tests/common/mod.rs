//! Shared test utilities for docperm API tests.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use tower::ServiceExt;

use docperm_api::http::{create_router, AppState};
use docperm_domain::identity::{CLIENT_PRINCIPAL_IDP_HEADER, CLIENT_PRINCIPAL_ID_HEADER};
use docperm_storage::{MemoryResourceStore, MemorySecretCache};

pub const PERMISSION_URI: &str = "/api/data/permission";

/// Number of concurrent clients for concurrency tests.
pub const CONCURRENT_CLIENT_COUNT: usize = 32;

pub struct TestBackends {
    pub store: Arc<MemoryResourceStore>,
    pub secrets: Arc<MemorySecretCache>,
}

impl TestBackends {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryResourceStore::new()),
            secrets: Arc::new(MemorySecretCache::new()),
        }
    }

    /// A router over these backends. Clones of the router share state.
    pub fn app(&self) -> axum::Router {
        let state = AppState::new(Arc::clone(&self.store), Arc::clone(&self.secrets));
        create_router(state)
    }
}

/// A caller authenticated through the client principal headers.
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub provider: &'static str,
    pub id: &'static str,
}

impl Caller {
    pub const fn new(provider: &'static str, id: &'static str) -> Self {
        Self { provider, id }
    }

    pub fn user_id(&self) -> String {
        format!("{}|{}", self.provider, self.id)
    }
}

/// POSTs a permission request and returns status plus parsed JSON.
pub async fn post_permission(
    app: axum::Router,
    caller: Option<Caller>,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(PERMISSION_URI)
        .header("content-type", "application/json");
    if let Some(caller) = caller {
        builder = builder
            .header(CLIENT_PRINCIPAL_IDP_HEADER, caller.provider)
            .header(CLIENT_PRINCIPAL_ID_HEADER, caller.id);
    }

    let response = app
        .oneshot(
            builder
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = if body.is_empty() {
        serde_json::json!({})
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|_| {
            serde_json::json!({
                "raw_body": String::from_utf8_lossy(&body).to_string()
            })
        })
    };
    (status, json)
}

/// GETs a plain-text path and returns status plus body.
pub async fn get_text(app: axum::Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8_lossy(&body).to_string())
}
