//! HTTP API
//!
//! Thin JSON routes over the form store. Reads are open to any caller;
//! mutations require the `Admin` role, which an upstream auth layer passes
//! in the `x-user-role` header.

use crate::form::Form;
use crate::schema::{self, ValidationError};
use crate::store::{Committed, Durability, FormError, FormStore};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Header carrying the caller's role
pub const ROLE_HEADER: &str = "x-user-role";

/// Role allowed to create, edit and delete forms
pub const ADMIN_ROLE: &str = "Admin";

/// Set on mutation responses that were not written to disk
pub const DURABILITY_HEADER: &str = "x-durability";

// =============================================================================
// Router
// =============================================================================

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<FormStore>,
}

/// Build the API router.
pub fn router(store: Arc<FormStore>) -> Router {
    Router::new()
        .route("/api/forms", get(list_forms).post(create_form))
        .route(
            "/api/forms/:id",
            get(get_form).put(update_form).delete(delete_form),
        )
        .route("/healthz", get(|| async { "ok" }))
        .with_state(AppState { store })
}

// =============================================================================
// Handlers
// =============================================================================

async fn list_forms(State(state): State<AppState>) -> Result<Json<Vec<Form>>, ApiError> {
    Ok(Json(state.store.list().await?))
}

async fn get_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Form>, ApiError> {
    state
        .store
        .get(&id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn create_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    require_admin(&headers)?;
    let input = schema::validate_input(&json_body(body)?)?;

    let committed = state.store.create(input).await?;
    tracing::info!(id = %committed.value.id, "form created via API");
    Ok(respond(StatusCode::CREATED, committed))
}

async fn update_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    require_admin(&headers)?;
    let patch = schema::validate_patch(&json_body(body)?)?;

    let committed = state.store.update(&id, patch).await?;
    Ok(respond(StatusCode::OK, committed))
}

async fn delete_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    require_admin(&headers)?;

    let committed = state.store.delete(&id).await?;
    if !committed.value {
        return Err(ApiError::NotFound);
    }
    Ok(respond(
        StatusCode::OK,
        Committed {
            value: json!({ "success": true }),
            durability: committed.durability,
        },
    ))
}

fn require_admin(headers: &HeaderMap) -> Result<(), ApiError> {
    let role = headers.get(ROLE_HEADER).and_then(|v| v.to_str().ok());
    if role == Some(ADMIN_ROLE) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::Invalid(rejection.body_text()))
}

fn respond<T: Serialize>(status: StatusCode, committed: Committed<T>) -> Response {
    let mut response = (status, Json(committed.value)).into_response();
    if committed.durability == Durability::MemoryOnly {
        response
            .headers_mut()
            .insert(DURABILITY_HEADER, HeaderValue::from_static("memory-only"));
    }
    response
}

// =============================================================================
// Errors
// =============================================================================

/// Errors mapped onto HTTP responses with an `{"error": ...}` body
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    Unavailable(String),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::Invalid(err.to_string())
    }
}

impl From<FormError> for ApiError {
    fn from(err: FormError) -> Self {
        match err {
            FormError::Validation(e) => e.into(),
            FormError::NotFound(_) => Self::NotFound,
            FormError::LoadAborted(reason) => Self::Unavailable(reason),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unavailable(reason) => {
                tracing::error!(reason = %reason, "serving 500, form store unavailable");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = match &self {
            ApiError::Unavailable(_) => "Failed to read forms".to_string(),
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

// =============================================================================
// Tests
// =============================================================================
