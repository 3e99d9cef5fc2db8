// src/handlers/system.rs
//! Service status, credential and configuration template endpoints

use super::ApiError;
use crate::config::ArchConfig;
use crate::AppState;
use axum::{
    extract::Extension,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn system_routes() -> Router {
    Router::new()
        .route("/api/status", get(api_status))
        .route("/api/credential", post(connect_credential))
        .route("/api/config/default", get(default_config))
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub credential_configured: bool,
    pub active_runs: usize,
    pub models: ModelsResponse,
}

#[derive(Serialize)]
pub struct ModelsResponse {
    pub analysis: String,
    pub image: String,
    pub video: String,
}

#[derive(Deserialize)]
pub struct CredentialRequest {
    pub api_key: String,
}

#[derive(Serialize)]
pub struct DefaultConfigResponse {
    pub config: ArchConfig,
    /// Pretty JSON used to seed the editor
    pub text: String,
}

/// GET /api/status
pub async fn api_status(Extension(state): Extension<Arc<AppState>>) -> Json<StatusResponse> {
    let models = &state.settings.models;
    Json(StatusResponse {
        service: "archflow",
        version: env!("CARGO_PKG_VERSION"),
        credential_configured: state.gateway.ensure_credential().await.is_ok(),
        active_runs: state.sessions.len().await,
        models: ModelsResponse {
            analysis: models.analysis.clone(),
            image: models.image.clone(),
            video: models.video.clone(),
        },
    })
}

/// POST /api/credential - "Connect Account"
pub async fn connect_credential(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<CredentialRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.gateway.connect(request.api_key).await?;
    Ok(Json(serde_json::json!({ "credential_configured": true })))
}

/// GET /api/config/default
pub async fn default_config() -> Result<Json<DefaultConfigResponse>, ApiError> {
    let config = ArchConfig::default();
    let text = config
        .to_pretty_json()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(Json(DefaultConfigResponse { config, text }))
}
