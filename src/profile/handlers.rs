use axum::{
    extract::{DefaultBodyLimit, State},
    routing::get,
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument};

use super::dto::UpdateProfileRequest;
use super::repo::{Profile, ProfileWithSppg};
use crate::{
    auth::AuthUser,
    error::AppError,
    media::{self, object_key, UploadFile},
    state::AppState,
};

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_profile).put(update_profile))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Option<ProfileWithSppg>>, AppError> {
    Ok(Json(Profile::find_by_user(&state.db, user_id).await?))
}

/// Stores the avatar under `avatars/` with the same key scheme as scan images.
async fn upload_avatar(state: &AppState, data_url: &str) -> Result<String, AppError> {
    let file = UploadFile::from_data_url("avatar", data_url)?;
    media::validate(&file)?;
    let key = format!("avatars/{}", object_key(&file, OffsetDateTime::now_utc()));
    let path = state
        .storage
        .put_object(&key, file.bytes, &file.content_type)
        .await
        .map_err(|e| AppError::Upload(format!("{:#}", e)))?;
    Ok(state.storage.public_url(&path))
}

#[instrument(skip(state, body))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileWithSppg>, AppError> {
    let avatar_url = match body.avatar_file_base64.as_deref() {
        Some(data_url) if !data_url.is_empty() => Some(upload_avatar(&state, data_url).await?),
        _ => None,
    };

    let saved = Profile::save(&state.db, user_id, &body, avatar_url).await?;
    info!(%user_id, sppg = ?saved.profile.sppg_id, "profile saved");
    Ok(Json(saved))
}
