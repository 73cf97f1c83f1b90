mod dto;
pub mod handlers;
pub mod machine;
pub mod orchestrator;
pub mod review;

use crate::state::AppState;
use axum::Router;

pub use machine::{FailureKind, PipelineSnapshot, Stage};
pub use orchestrator::ScanPipeline;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::pipeline_routes())
        .merge(handlers::capture_routes())
}
