//! HTTP route definitions and handlers.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequest, Path, Request, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info};

use docperm_domain::{DomainError, PermissionMode, PermissionRequest};
use docperm_server::BrokerError;
use docperm_storage::{ResourceStore, SecretCache};

use super::principal::CallerPrincipal;
use super::state::AppState;
use crate::observability::{metrics_handler, MetricsState};

/// Custom JSON extractor that returns 400 Bad Request instead of 422
/// Unprocessable Entity for deserialization errors.
///
/// Preserves 413 Payload Too Large for body limit errors.
pub struct JsonBadRequest<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBadRequest<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ApiError>);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBadRequest(value)),
            Err(rejection) => {
                use axum::extract::rejection::JsonRejection;

                let status = match &rejection {
                    JsonRejection::BytesRejection(_)
                        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE =>
                    {
                        StatusCode::PAYLOAD_TOO_LARGE
                    }
                    _ => StatusCode::BAD_REQUEST,
                };

                let error = if status == StatusCode::PAYLOAD_TOO_LARGE {
                    ApiError::new(error_codes::PAYLOAD_TOO_LARGE, rejection.body_text())
                } else {
                    ApiError::validation_error(format!(
                        "request body must be a JSON permission request: {}",
                        rejection.body_text()
                    ))
                };

                Err((status, Json(error)))
            }
        }
    }
}

/// Default request body size limit (1MB).
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

fn api_routes<R: ResourceStore, C: SecretCache>() -> Router<Arc<AppState<R, C>>> {
    Router::new()
        .route("/api/data/permission", post(get_permission::<R, C>))
        .route(
            "/api/data/:database_id/:collection_id/token",
            get(get_data_token::<R, C>),
        )
}

/// Creates the HTTP router with the default body size limit.
pub fn create_router<R: ResourceStore, C: SecretCache>(state: AppState<R, C>) -> Router {
    create_router_with_body_limit(state, DEFAULT_BODY_LIMIT)
}

/// Creates the HTTP router with a custom body size limit.
pub fn create_router_with_body_limit<R: ResourceStore, C: SecretCache>(
    state: AppState<R, C>,
    body_limit: usize,
) -> Router {
    api_routes::<R, C>()
        .route("/health", get(health_check))
        .with_state(Arc::new(state))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
}

/// Creates the HTTP router plus a Prometheus endpoint at `metrics_path`.
pub fn create_router_with_observability<R: ResourceStore, C: SecretCache>(
    state: AppState<R, C>,
    metrics_state: MetricsState,
    metrics_path: &str,
) -> Router {
    let observability_router = Router::new()
        .route(metrics_path, get(metrics_handler))
        .with_state(metrics_state);

    create_router(state).merge(observability_router)
}

// ============================================================
// Error Handling
// ============================================================

/// Error codes carried in [`ApiError::code`].
pub mod error_codes {
    /// The request was malformed or incomplete (400).
    pub const VALIDATION_ERROR: &str = "validation_error";
    /// Request body exceeds maximum allowed size (413).
    pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";
    /// The permission could not be issued (500).
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// API error response body.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a validation error (400).
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::VALIDATION_ERROR, message)
    }

    /// Creates an internal error (500).
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::INTERNAL_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        use error_codes::*;

        let status = match self.code.as_str() {
            VALIDATION_ERROR => StatusCode::BAD_REQUEST,
            PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::validation_error(err.to_string())
    }
}

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Validation(e) => e.into(),
            other => {
                // Store details stay in the log.
                error!(error = %other, "failed to issue permission");
                ApiError::internal_error("unable to issue a permission for this resource")
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================
// Health Check
// ============================================================

/// Liveness check; does not touch dependencies.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Permissions
// ============================================================

/// Request body of `POST /api/data/permission`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequestBody {
    #[serde(default)]
    pub database_id: Option<String>,
    #[serde(default)]
    pub collection_id: Option<String>,
    #[serde(default)]
    pub resource_link: Option<String>,
    /// Requested token lifetime in seconds; clamped by the broker.
    #[serde(default)]
    pub token_duration: i64,
    /// `Read` or `All` (case-insensitive); `Read` when omitted.
    #[serde(default)]
    pub permission_mode: Option<String>,
}

impl PermissionRequestBody {
    /// Converts the body into a broker request for `user_id`.
    pub fn into_request(self, user_id: String) -> Result<PermissionRequest, DomainError> {
        let database_id = self
            .database_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(DomainError::MissingDatabaseId)?;
        let mode = match self.permission_mode.as_deref() {
            Some(mode) => mode.parse::<PermissionMode>()?,
            None => PermissionMode::Read,
        };

        let mut request = PermissionRequest::new(database_id, user_id, mode)
            .with_duration_secs(self.token_duration);
        if let Some(collection_id) = self.collection_id {
            request = request.with_collection(collection_id);
        }
        if let Some(resource_link) = self.resource_link {
            request = request.with_resource_link(resource_link);
        }
        Ok(request)
    }
}

async fn get_permission<R: ResourceStore, C: SecretCache>(
    State(state): State<Arc<AppState<R, C>>>,
    CallerPrincipal(principal): CallerPrincipal,
    JsonBadRequest(body): JsonBadRequest<PermissionRequestBody>,
) -> ApiResult<impl IntoResponse> {
    let user_id = state.user_id(&principal);
    let request = body.into_request(user_id)?;
    info!(
        database_id = %request.database_id,
        collection_id = request.collection_id().unwrap_or(""),
        mode = %request.permission_mode,
        "permission requested"
    );

    let permission = state.broker.get_permission(&request).await?;
    Ok(Json(permission))
}

async fn get_data_token<R: ResourceStore, C: SecretCache>(
    State(state): State<Arc<AppState<R, C>>>,
    CallerPrincipal(principal): CallerPrincipal,
    Path((database_id, collection_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let user_id = state.user_id(&principal);
    info!(%database_id, %collection_id, "data token requested");

    let token = state
        .broker
        .get_data_token(&database_id, Some(&collection_id), &user_id)
        .await?;
    Ok(token)
}
