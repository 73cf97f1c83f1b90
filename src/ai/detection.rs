use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use super::client::{map_reqwest_error, GeminiClient, InlineImage};
use super::parse::parse_menu_items;
use crate::{
    error::AppError,
    media::{fetch_limited, FetchError, ImageOrigin, MAX_UPLOAD_BYTES},
    scans::model::MenuItem,
};

const DETECTION_PROMPT: &str = r#"You are a food detection expert. Analyze this meal photo and identify visible food items with estimated portion sizes.

Task: Identify all visible food items and estimate their weight in grams.

Output format: Return ONLY a valid JSON array with this exact structure:
[
  {
    "nama_menu": "Food name in Indonesian",
    "estimasi_gram": number,
    "deskripsi": "Brief description of the food item",
    "proses_pengolahan": "Brief description of how the food appears to be prepared"
  }
]

Important:
- Be accurate with portion size estimates
- Use Indonesian names for food items
- Include all visible food items
- Return only the JSON array, no other text"#;

/// Identifies the food items visible on a stored photo.
#[async_trait]
pub trait FoodDetector: Send + Sync {
    async fn detect(&self, image_url: &str) -> Result<Vec<MenuItem>, AppError>;
}

pub struct GeminiFoodDetector {
    client: GeminiClient,
    origin: ImageOrigin,
}

impl GeminiFoodDetector {
    pub fn new(client: GeminiClient, origin: ImageOrigin) -> Self {
        Self { client, origin }
    }

    async fn fetch_image(&self, image_url: &str) -> Result<InlineImage, AppError> {
        let url = self.origin.check(image_url)?;
        let image = fetch_limited(self.client.http(), url, MAX_UPLOAD_BYTES)
            .await
            .map_err(|e| match e {
                FetchError::Http(e) => AppError::Detection(map_reqwest_error(e).to_string()),
                other => AppError::Detection(other.to_string()),
            })?;

        let mime_type = image.mime_type.unwrap_or_else(|| "image/jpeg".to_string());
        debug!(%mime_type, size = image.data.len(), "image fetched for detection");
        Ok(InlineImage {
            mime_type,
            data: image.data,
        })
    }
}

#[async_trait]
impl FoodDetector for GeminiFoodDetector {
    #[instrument(skip(self))]
    async fn detect(&self, image_url: &str) -> Result<Vec<MenuItem>, AppError> {
        let image = self.fetch_image(image_url).await?;
        let text = self
            .client
            .generate(DETECTION_PROMPT, Some(image))
            .await
            .map_err(|e| AppError::Detection(e.to_string()))?;

        let items = parse_menu_items(&text).map_err(|e| {
            warn!(error = %e, "detection response rejected");
            AppError::Detection(e.to_string())
        })?;
        info!(count = items.len(), "food items detected");
        Ok(items)
    }
}
