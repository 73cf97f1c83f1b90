use serde::{Deserialize, Serialize};

use crate::scans::model::ScanDraft;

/// Request body for `POST /analyze`.
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(alias = "imageUrl")]
    pub image_url: String,
}

/// One camera frame, raw RGBA pixels in base64.
#[derive(Debug, Deserialize)]
pub struct CaptureRequest {
    pub width: u32,
    pub height: u32,
    pub rgba_base64: String,
}

/// Result of a review edit. `applied` is false for an out-of-range index.
#[derive(Debug, Serialize)]
pub struct DraftEditResponse {
    pub applied: bool,
    pub draft: ScanDraft,
}
