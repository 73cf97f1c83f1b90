use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::model::{MenuItem, NutritionFacts, Scan, ScanDraft};
use crate::history::SortOrder;

/// `?q=&sort=asc|desc&page=` shared by the list and the export.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub sort: SortOrder,
    pub page: Option<usize>,
}

/// A confirmed scan submitted as a whole by the client.
#[derive(Debug, Clone, Deserialize)]
pub struct SaveScanRequest {
    #[serde(alias = "imageUrl")]
    pub image_url: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub scan_date: Option<OffsetDateTime>,
    pub menu_items: Vec<MenuItem>,
    pub nutrition_facts: NutritionFacts,
}

impl From<SaveScanRequest> for ScanDraft {
    fn from(req: SaveScanRequest) -> Self {
        let mut draft = ScanDraft::new(req.image_url, req.menu_items, req.nutrition_facts);
        if let Some(at) = req.scan_date {
            draft.scan_date = at;
        }
        draft
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateScanRequest {
    pub menu_items: Vec<MenuItem>,
    pub nutrition_facts: NutritionFacts,
}

#[derive(Debug, Serialize)]
pub struct ScanDetail {
    #[serde(flatten)]
    pub scan: Scan,
    pub user_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn save_request_recomputes_summary_and_defaults_date() {
        let req: SaveScanRequest = serde_json::from_value(json!({
            "imageUrl": "https://cdn.test/food-images/1-a.jpg",
            "menu_items": [{ "nama_menu": "Nasi", "estimasi_gram": 150 }],
            "nutrition_facts": {
                "nutrition_summary": {
                    "calories_kcal": 1, "protein_g": 0, "fat_g": 0,
                    "carbs_g": 0, "sodium_mg": 0, "fiber_g": 0
                },
                "items": [{
                    "name": "Nasi", "grams": 150, "calories_kcal": 195, "protein_g": 4,
                    "fat_g": 0.4, "carbs_g": 42, "sodium_mg": 2, "fiber_g": 0.6
                }]
            }
        }))
        .unwrap();
        assert!(req.scan_date.is_none());

        let draft = ScanDraft::from(req);
        assert_eq!(draft.nutrition_facts.summary().calories_kcal, 195.0);
        assert_eq!(draft.menu_items[0].description, "");
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn history_query_defaults() {
        let q: HistoryQuery = serde_json::from_value(json!({})).unwrap();
        assert_eq!(q.q, "");
        assert_eq!(q.sort, SortOrder::Desc);
        assert_eq!(q.page, None);

        let q: HistoryQuery = serde_json::from_value(json!({ "sort": "asc", "page": 3 })).unwrap();
        assert_eq!(q.sort, SortOrder::Asc);
        assert_eq!(q.page, Some(3));
    }
}
