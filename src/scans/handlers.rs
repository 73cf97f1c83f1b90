use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::{HistoryQuery, SaveScanRequest, ScanDetail, UpdateScanRequest};
use super::model::{Scan, ScanDraft};
use crate::{
    auth::AuthUser,
    error::AppError,
    history::{HistoryEngine, HistoryPage, HistoryStats},
    profile,
    state::AppState,
};

pub fn scan_routes() -> Router<AppState> {
    Router::new()
        .route("/scans", get(list_scans).post(save_scan))
        .route("/scans/stats", get(scan_stats))
        .route(
            "/scans/:id",
            get(get_scan).put(update_scan).delete(delete_scan),
        )
}

/// Loads the caller's history and applies the list filters.
pub(crate) async fn load_history(
    state: &AppState,
    user_id: Uuid,
    query: &HistoryQuery,
) -> Result<HistoryEngine, AppError> {
    let mut engine = HistoryEngine::new(state.scans.clone(), user_id, state.config.history_page_size);
    engine.load().await?;
    let view = engine.view_mut();
    view.set_query(query.q.clone());
    view.set_sort_order(query.sort);
    if let Some(page) = query.page {
        view.set_page(page);
    }
    Ok(engine)
}

/// Owner-scoped lookup; someone else's scan is indistinguishable from a missing one.
pub(crate) async fn owned_scan(state: &AppState, user_id: Uuid, id: Uuid) -> Result<Scan, AppError> {
    state
        .scans
        .get(user_id, id)
        .await
        .context("get scan")?
        .ok_or(AppError::NotFound("Scan"))
}

#[instrument(skip(state))]
pub async fn list_scans(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryPage>, AppError> {
    let engine = load_history(&state, user_id, &query).await?;
    Ok(Json(HistoryPage::from(engine.view())))
}

#[instrument(skip(state))]
pub async fn scan_stats(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<HistoryStats>, AppError> {
    let scans = state
        .scans
        .list_by_user(user_id)
        .await
        .context("load scan history")?;
    Ok(Json(HistoryStats::of(&scans)))
}

#[instrument(skip(state, body))]
pub async fn save_scan(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<SaveScanRequest>,
) -> Result<(StatusCode, Json<Scan>), AppError> {
    let draft = ScanDraft::from(body);
    draft.validate().map_err(AppError::Validation)?;
    state.image_origin.check(&draft.image_url)?;

    let scan = state
        .scans
        .insert(user_id, &draft)
        .await
        .map_err(|e| AppError::Persistence(format!("{:#}", e)))?;
    info!(%user_id, scan_id = %scan.id, "scan saved");
    Ok((StatusCode::CREATED, Json(scan)))
}

#[instrument(skip(state))]
pub async fn get_scan(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ScanDetail>, AppError> {
    let scan = owned_scan(&state, user_id, id).await?;
    let user_name = profile::display_name(&state.db, user_id)
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "display name lookup failed");
            None
        });
    Ok(Json(ScanDetail { scan, user_name }))
}

#[instrument(skip(state, body))]
pub async fn update_scan(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateScanRequest>,
) -> Result<Json<Scan>, AppError> {
    body.menu_items
        .iter()
        .try_for_each(|i| i.validate())
        .and_then(|_| body.nutrition_facts.validate())
        .map_err(AppError::Validation)?;

    let scan = state
        .scans
        .update(user_id, id, &body.menu_items, &body.nutrition_facts)
        .await
        .map_err(|e| AppError::Persistence(format!("{:#}", e)))?
        .ok_or(AppError::NotFound("Scan"))?;
    info!(%user_id, scan_id = %id, "scan updated");
    Ok(Json(scan))
}

#[instrument(skip(state))]
pub async fn delete_scan(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let mut engine = HistoryEngine::new(state.scans.clone(), user_id, state.config.history_page_size);
    engine.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
