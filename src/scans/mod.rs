pub mod dto;
pub mod handlers;
pub mod model;
pub mod repo;
pub mod store;

#[cfg(test)]
pub mod fixtures;

use crate::state::AppState;
use axum::Router;

pub use model::{MenuItem, NutritionFacts, Scan, ScanDraft};
pub use repo::PgScanStore;
pub use store::ScanStore;

pub fn router() -> Router<AppState> {
    handlers::scan_routes()
}
