use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use tracing::{instrument, warn};

use super::dto::{AnalyzeRequest, CaptureRequest, DraftEditResponse};
use super::machine::PipelineSnapshot;
use super::review::{MenuItemEdit, NutritionItemEdit};
use crate::{
    auth::AuthUser,
    error::AppError,
    media::{capture, UploadFile, VideoFrame},
    scans::model::Scan,
    state::AppState,
};

pub fn pipeline_routes() -> Router<AppState> {
    Router::new()
        .route("/pipeline", get(get_pipeline).delete(abandon_pipeline))
        .route("/pipeline/upload", post(upload_and_analyze))
        .route("/analyze", post(analyze_url))
        .route("/pipeline/draft/menu-items/:index", patch(edit_menu_item))
        .route("/pipeline/draft/nutrition-items/:index", patch(edit_nutrition_item))
        .route("/pipeline/save", post(save_draft))
        .route("/pipeline/cancel", post(cancel_draft))
        .route("/pipeline/reset", post(reset_pipeline))
        // larger than the 10MB rule so oversized files reach validation
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024))
}

pub fn capture_routes() -> Router<AppState> {
    Router::new()
        .route("/pipeline/capture", post(capture_and_analyze))
        .layer(DefaultBodyLimit::max(32 * 1024 * 1024))
}

#[instrument(skip(state))]
pub async fn get_pipeline(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Json<PipelineSnapshot> {
    Json(state.pipeline.snapshot(user_id))
}

/// POST /pipeline/upload (multipart, field `file`)
#[instrument(skip(state, mp))]
pub async fn upload_and_analyze(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut mp: Multipart,
) -> Result<Json<PipelineSnapshot>, AppError> {
    let mut file = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes: Bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(e.to_string()))?;
        file = Some(UploadFile {
            file_name,
            content_type,
            bytes,
        });
        break;
    }
    let file = file.ok_or_else(|| AppError::Validation("file is required".into()))?;

    state.pipeline.run_upload(user_id, file).await.map(Json)
}

/// POST /pipeline/capture { width, height, rgba_base64 }
#[instrument(skip(state, body), fields(width = body.width, height = body.height))]
pub async fn capture_and_analyze(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<CaptureRequest>,
) -> Result<Json<PipelineSnapshot>, AppError> {
    let rgba = STANDARD
        .decode(body.rgba_base64.trim())
        .map_err(|_| AppError::Validation("invalid base64".into()))?;
    let frame = VideoFrame {
        width: body.width,
        height: body.height,
        rgba,
    };
    let Some(file) = capture(&frame) else {
        warn!(%user_id, "camera frame unusable");
        return Err(AppError::Validation("camera frame is not available".into()));
    };

    state.pipeline.run_upload(user_id, file).await.map(Json)
}

/// POST /analyze { image_url }
#[instrument(skip(state, body))]
pub async fn analyze_url(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<AnalyzeRequest>,
) -> Result<Json<PipelineSnapshot>, AppError> {
    if body.image_url.trim().is_empty() {
        return Err(AppError::Validation("Image URL is required".into()));
    }
    let url = state.image_origin.check(&body.image_url)?;
    state
        .pipeline
        .run_analysis(user_id, url.to_string())
        .await
        .map(Json)
}

#[instrument(skip(state, edit))]
pub async fn edit_menu_item(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(index): Path<usize>,
    Json(edit): Json<MenuItemEdit>,
) -> Result<Json<DraftEditResponse>, AppError> {
    let (applied, draft) = state.pipeline.edit_menu_item(user_id, index, edit)?;
    Ok(Json(DraftEditResponse { applied, draft }))
}

#[instrument(skip(state))]
pub async fn edit_nutrition_item(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(index): Path<usize>,
    Json(edit): Json<NutritionItemEdit>,
) -> Result<Json<DraftEditResponse>, AppError> {
    let (applied, draft) =
        state
            .pipeline
            .edit_nutrition_item(user_id, index, edit.field, edit.value)?;
    Ok(Json(DraftEditResponse { applied, draft }))
}

#[instrument(skip(state))]
pub async fn save_draft(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<(StatusCode, Json<Scan>), AppError> {
    let scan = state.pipeline.save(user_id).await?;
    Ok((StatusCode::CREATED, Json(scan)))
}

#[instrument(skip(state))]
pub async fn cancel_draft(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PipelineSnapshot>, AppError> {
    state.pipeline.cancel(user_id).map(Json)
}

#[instrument(skip(state))]
pub async fn reset_pipeline(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PipelineSnapshot>, AppError> {
    state.pipeline.reset(user_id).map(Json)
}

#[instrument(skip(state))]
pub async fn abandon_pipeline(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Json<PipelineSnapshot> {
    Json(state.pipeline.abandon(user_id))
}
