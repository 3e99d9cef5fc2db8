// src/handlers/mod.rs
pub mod runs;
pub mod system;

use crate::error::{GatewayError, WorkflowError};
use crate::{middleware, AppState};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension, Router,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

/// Errors returned by the HTTP surface
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("Run {0} not found")]
    RunNotFound(Uuid),
    #[error("No rendered {kind} in slot {slot}")]
    AssetNotFound { kind: &'static str, slot: usize },
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Workflow(e) => match e {
                WorkflowError::MissingImage
                | WorkflowError::InvalidImage(_)
                | WorkflowError::InvalidConfig(_)
                | WorkflowError::ConfigOutOfRange(_)
                | WorkflowError::UnknownProposal(_) => StatusCode::BAD_REQUEST,
                WorkflowError::WrongStep { .. } | WorkflowError::NotReady(_) | WorkflowError::NoSelection => {
                    StatusCode::CONFLICT
                }
                WorkflowError::Slot(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Gateway(GatewayError::MissingCredential) => StatusCode::UNAUTHORIZED,
            ApiError::Gateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::RunNotFound(_) | ApiError::AssetNotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("❌ {}", self);
        }
        let message = match &self {
            ApiError::Gateway(e) => e.public_message().to_string(),
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Full application router with logging, CORS and shared state
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(system::system_routes())
        .merge(runs::run_routes())
        .layer(axum::middleware::from_fn(middleware::logging::request_logging_middleware))
        .layer(CorsLayer::permissive())
        .layer(Extension(state))
}
