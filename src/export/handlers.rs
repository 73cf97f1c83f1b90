use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use image::DynamicImage;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::card::{card_file_name, render_share_card};
use super::registry::card_url;
use super::share::{share_scan, ResponseClipboard, ShareMessage, ShareOutcome, WebhookShareChannel};
use super::spreadsheet::{export_file_name_now, export_to_spreadsheet};
use crate::{
    auth::AuthUser,
    error::AppError,
    media::{fetch_limited, MAX_UPLOAD_BYTES},
    profile,
    scans::{
        dto::HistoryQuery,
        handlers::{load_history, owned_scan},
    },
    state::AppState,
};

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub fn export_routes() -> Router<AppState> {
    Router::new()
        .route("/scans/export", get(export_history))
        .route("/scans/:id/share-card", post(create_share_card))
        .route("/scans/:id/share", post(share))
        .route("/share-cards/:id", get(get_share_card).delete(revoke_share_card))
}

fn attachment(content_type: &'static str, file_name: &str, body: impl Into<Bytes>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body.into(),
    )
        .into_response()
}

/// GET /scans/export?q=&sort=: the filtered history as a workbook, 204 when empty.
#[instrument(skip(state))]
pub async fn export_history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Response, AppError> {
    let engine = load_history(&state, user_id, &query).await?;
    let scans: Vec<_> = engine.view().filtered().collect();

    let Some(buf) = export_to_spreadsheet(&scans)
        .map_err(|e| AppError::Internal(anyhow::Error::new(e).context("build workbook")))?
    else {
        debug!(%user_id, "nothing to export");
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    info!(%user_id, rows = scans.len(), "history exported");
    Ok(attachment(XLSX_CONTENT_TYPE, &export_file_name_now(), buf))
}

/// Only bucket URLs are fetched, capped at the upload limit.
async fn fetch_photo(state: &AppState, url: &str) -> Option<DynamicImage> {
    let checked = match state.image_origin.check(url) {
        Ok(u) => u,
        Err(e) => {
            warn!(%url, error = %e, "photo outside image bucket; card without photo");
            return None;
        }
    };
    let photo = match fetch_limited(&state.http, checked, MAX_UPLOAD_BYTES).await {
        Ok(p) => p,
        Err(e) => {
            warn!(%url, error = %e, "photo fetch failed; card without photo");
            return None;
        }
    };
    image::load_from_memory(&photo.data)
        .map_err(|e| warn!(%url, error = %e, "photo decode failed; card without photo"))
        .ok()
}

#[derive(Debug, Serialize)]
pub struct ShareCardCreated {
    pub id: Uuid,
    pub url: String,
    pub file_name: String,
}

/// POST /scans/:id/share-card
#[instrument(skip(state))]
pub async fn create_share_card(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(scan_id): Path<Uuid>,
) -> Result<(StatusCode, Json<ShareCardCreated>), AppError> {
    let scan = owned_scan(&state, user_id, scan_id).await?;
    let photo = fetch_photo(&state, &scan.image_url).await;
    let attribution = profile::display_name(&state.db, user_id)
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "display name lookup failed");
            None
        });

    let file_name = card_file_name(&scan);
    let png = tokio::task::spawn_blocking(move || {
        render_share_card(&scan, photo.as_ref(), attribution.as_deref())
    })
    .await
    .map_err(|e| AppError::Internal(anyhow::Error::new(e).context("render task")))?
    .map_err(|e| AppError::Internal(anyhow::Error::new(e).context("render share card")))?;

    let id = state
        .share_cards
        .register(user_id, Bytes::from(png), file_name.clone());
    info!(%user_id, %scan_id, card_id = %id, "share card rendered");
    Ok((
        StatusCode::CREATED,
        Json(ShareCardCreated {
            id,
            url: card_url(id),
            file_name,
        }),
    ))
}

/// GET /share-cards/:id
#[instrument(skip(state))]
pub async fn get_share_card(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let card = state
        .share_cards
        .get(user_id, id)
        .ok_or(AppError::NotFound("Share card"))?;
    Ok(attachment("image/png", &card.file_name, card.png))
}

/// DELETE /share-cards/:id
#[instrument(skip(state))]
pub async fn revoke_share_card(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.share_cards.revoke(user_id, id) {
        return Err(AppError::NotFound("Share card"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct ShareResponse {
    pub outcome: ShareOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clipboard_text: Option<String>,
}

/// POST /scans/:id/share
#[instrument(skip(state))]
pub async fn share(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(scan_id): Path<Uuid>,
) -> Result<Json<ShareResponse>, AppError> {
    let scan = owned_scan(&state, user_id, scan_id).await?;
    let message = ShareMessage::for_scan(&scan, &state.config.public_app_url);

    let channel = WebhookShareChannel::new(state.http.clone(), state.config.share_webhook_url.clone());
    let clipboard = ResponseClipboard::default();
    let outcome = share_scan(&channel, &clipboard, &message, scan_id).await;

    Ok(Json(ShareResponse {
        outcome,
        clipboard_text: clipboard.into_text(),
    }))
}
