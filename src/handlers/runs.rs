// src/handlers/runs.rs
//! Run endpoints - create a run from an upload, then drive it step by step

use super::ApiError;
use crate::workflow::video_gen::download_name;
use crate::workflow::{ImageInput, RunSnapshot, Session, SharedSession, UploadForm};
use crate::AppState;
use axum::{
    extract::{DefaultBodyLimit, Extension, FromRequest, Multipart, Path, Request},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

pub fn run_routes() -> Router {
    Router::new()
        .route("/api/runs", post(create_run))
        .route("/api/runs/:run_id", get(get_run))
        .route("/api/runs/:run_id/analysis/proceed", post(proceed_analysis))
        .route("/api/runs/:run_id/proposals/select", post(select_proposal))
        .route("/api/runs/:run_id/proposals/confirm", post(confirm_proposal))
        .route("/api/runs/:run_id/images/approve", post(approve_images))
        .route("/api/runs/:run_id/images/:slot", get(download_image))
        .route("/api/runs/:run_id/videos/:slot", get(download_video))
        .layer(DefaultBodyLimit::max(25 * 1024 * 1024)) // massing images
}

/// JSON variant of the upload step
#[derive(Deserialize)]
pub struct CreateRunRequest {
    /// `data:image/...;base64,` URL
    pub image: String,
    /// Configuration text; the default template when omitted
    pub config: Option<String>,
}

#[derive(Deserialize)]
pub struct SelectProposalRequest {
    pub id: String,
}

async fn find_run(state: &AppState, run_id: Uuid) -> Result<SharedSession, ApiError> {
    state
        .sessions
        .get(&run_id)
        .await
        .ok_or(ApiError::RunNotFound(run_id))
}

async fn read_multipart(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let data = field.bytes().await.map_err(|e| ApiError::BadRequest(e.body_text()))?;
                form = form.with_image(ImageInput::Bytes(data.to_vec()));
            }
            "config" => {
                let text = field.text().await.map_err(|e| ApiError::BadRequest(e.body_text()))?;
                form = form.with_config_text(text);
            }
            other => tracing::debug!("Ignoring upload field '{}'", other),
        }
    }
    Ok(form)
}

/// POST /api/runs - multipart (`image` file, `config` text) or JSON body
pub async fn create_run(
    Extension(state): Extension<Arc<AppState>>,
    request: Request,
) -> Result<(StatusCode, Json<RunSnapshot>), ApiError> {
    // no run starts without a credential
    state.gateway.ensure_credential().await?;

    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let form = if is_multipart {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        read_multipart(multipart).await?
    } else {
        let Json(body) = Json::<CreateRunRequest>::from_request(request, &())
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        let form = UploadForm::new().with_image(ImageInput::DataUrl(body.image));
        match body.config {
            Some(text) => form.with_config_text(text),
            None => form,
        }
    };

    let mut session = Session::new();
    session.submit_upload(&form)?;
    session.activate(&state.gateway);
    let snapshot = session.snapshot().await;
    state.sessions.insert(session).await;

    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// GET /api/runs/:run_id - snapshot, starting the current step's work if needed
pub async fn get_run(
    Path(run_id): Path<Uuid>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<RunSnapshot>, ApiError> {
    let run = find_run(&state, run_id).await?;
    let mut session = run.lock().await;
    session.activate(&state.gateway);
    Ok(Json(session.snapshot().await))
}

/// POST /api/runs/:run_id/analysis/proceed
pub async fn proceed_analysis(
    Path(run_id): Path<Uuid>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<RunSnapshot>, ApiError> {
    let run = find_run(&state, run_id).await?;
    let mut session = run.lock().await;
    session.proceed_analysis().await?;
    session.activate(&state.gateway);
    Ok(Json(session.snapshot().await))
}

/// POST /api/runs/:run_id/proposals/select
pub async fn select_proposal(
    Path(run_id): Path<Uuid>,
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<SelectProposalRequest>,
) -> Result<Json<RunSnapshot>, ApiError> {
    let run = find_run(&state, run_id).await?;
    let mut session = run.lock().await;
    session.select_proposal(&request.id).await?;
    Ok(Json(session.snapshot().await))
}

/// POST /api/runs/:run_id/proposals/confirm
pub async fn confirm_proposal(
    Path(run_id): Path<Uuid>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<RunSnapshot>, ApiError> {
    let run = find_run(&state, run_id).await?;
    let mut session = run.lock().await;
    session.confirm_proposal().await?;
    session.activate(&state.gateway);
    Ok(Json(session.snapshot().await))
}

/// POST /api/runs/:run_id/images/approve
pub async fn approve_images(
    Path(run_id): Path<Uuid>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<RunSnapshot>, ApiError> {
    let run = find_run(&state, run_id).await?;
    let mut session = run.lock().await;
    session.approve_images().await?;
    session.activate(&state.gateway);
    Ok(Json(session.snapshot().await))
}

/// GET /api/runs/:run_id/images/:slot
pub async fn download_image(
    Path((run_id, slot)): Path<(Uuid, usize)>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let run = find_run(&state, run_id).await?;
    let asset = run
        .lock()
        .await
        .image_asset(slot)
        .await
        .ok_or(ApiError::AssetNotFound { kind: "image", slot })?;

    Ok(([(header::CONTENT_TYPE, asset.content.mime_type)], asset.content.data).into_response())
}

/// GET /api/runs/:run_id/videos/:slot
pub async fn download_video(
    Path((run_id, slot)): Path<(Uuid, usize)>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let run = find_run(&state, run_id).await?;
    let asset = run
        .lock()
        .await
        .video_asset(slot)
        .await
        .ok_or(ApiError::AssetNotFound { kind: "video", slot })?;

    let disposition = format!("attachment; filename=\"{}\"", download_name(slot));
    Ok((
        [
            (header::CONTENT_TYPE, asset.content.mime_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        asset.content.data,
    )
        .into_response())
}
