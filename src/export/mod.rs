pub mod card;
mod glyphs;
pub mod handlers;
pub mod registry;
pub mod share;
pub mod spreadsheet;

use crate::state::AppState;
use axum::Router;

pub use registry::ShareCardRegistry;

pub fn router() -> Router<AppState> {
    handlers::export_routes()
}
