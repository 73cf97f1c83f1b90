mod dto;
pub mod handlers;
pub mod repo;

use crate::state::AppState;
use axum::Router;

pub use repo::{display_name, Profile, ProfileWithSppg, Sppg};

pub fn router() -> Router<AppState> {
    handlers::profile_routes()
}
