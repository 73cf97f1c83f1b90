use async_trait::async_trait;
use tracing::{info, instrument, warn};

use super::client::GeminiClient;
use super::parse::parse_nutrition;
use crate::{
    error::AppError,
    scans::model::{MenuItem, Nutrient, NutritionFacts, NutritionSummary, RawNutritionFacts},
};

const NUTRITION_PROMPT: &str = r#"You are a nutrition analysis assistant. Calculate detailed nutritional information for the following food items.

Input: {items}

Task: Calculate calories, protein, fat, carbs, sodium, and fiber for each item and provide a total summary.

Output format: Return ONLY a valid JSON object with this exact structure:
{
  "nutrition_summary": {
    "calories_kcal": number,
    "protein_g": number,
    "fat_g": number,
    "carbs_g": number,
    "sodium_mg": number,
    "fiber_g": number
  },
  "items": [
    {
      "name": "Food name in English",
      "grams": number,
      "calories_kcal": number,
      "protein_g": number,
      "fat_g": number,
      "carbs_g": number,
      "sodium_mg": number,
      "fiber_g": number
    }
  ]
}

Important:
- Use accurate nutritional data based on standard food databases
- Convert Indonesian food names to English for the items array
- Ensure all numbers are realistic and properly calculated
- The summary should be the sum of all individual items
- Return only the JSON object, no other text"#;

/// Reported totals further than this from the item sum are logged.
const DRIFT_TOLERANCE: f64 = 0.5;

/// Computes per-item and total nutrition for detected menu items.
#[async_trait]
pub trait NutritionAnalyzer: Send + Sync {
    async fn analyze(&self, items: &[MenuItem]) -> Result<NutritionFacts, AppError>;
}

pub struct GeminiNutritionAnalyzer {
    client: GeminiClient,
}

impl GeminiNutritionAnalyzer {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

pub(crate) fn nutrition_prompt(items: &[MenuItem]) -> Result<String, AppError> {
    let json = serde_json::to_string(items)
        .map_err(|e| AppError::NutritionComputation(e.to_string()))?;
    Ok(NUTRITION_PROMPT.replace("{items}", &json))
}

/// Builds facts from the parsed items; the model's own totals are only compared.
pub(crate) fn reconcile(raw: RawNutritionFacts) -> NutritionFacts {
    let reported: NutritionSummary = raw.nutrition_summary;
    let facts = NutritionFacts::from_items(raw.items);
    for n in Nutrient::ALL {
        let (got, want) = (reported.get(n), facts.summary().get(n));
        if (got - want).abs() > DRIFT_TOLERANCE {
            warn!(nutrient = ?n, reported = got, computed = want, "model summary drifts from items");
        }
    }
    facts
}

#[async_trait]
impl NutritionAnalyzer for GeminiNutritionAnalyzer {
    #[instrument(skip(self, items), fields(count = items.len()))]
    async fn analyze(&self, items: &[MenuItem]) -> Result<NutritionFacts, AppError> {
        let prompt = nutrition_prompt(items)?;
        let text = self
            .client
            .generate(&prompt, None)
            .await
            .map_err(|e| AppError::NutritionComputation(e.to_string()))?;

        let raw = parse_nutrition(&text).map_err(|e| {
            warn!(error = %e, "nutrition response rejected");
            AppError::NutritionComputation(e.to_string())
        })?;
        let facts = reconcile(raw);
        info!(
            kcal = facts.summary().calories_kcal,
            items = facts.items().len(),
            "nutrition computed"
        );
        Ok(facts)
    }
}
