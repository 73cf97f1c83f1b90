//! Builders shared by unit tests across the crate.

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::model::{MenuItem, NutritionFacts, NutritionItem, NutritionSummary, Scan, ScanDraft};

pub fn menu_item(name: &str, grams: f64) -> MenuItem {
    MenuItem {
        name: name.into(),
        estimated_grams: grams,
        description: format!("{} portion", name),
        preparation_note: "steamed".into(),
    }
}

pub fn nutrition_item(name: &str, kcal: f64) -> NutritionItem {
    NutritionItem {
        name: name.into(),
        grams: 100.0,
        values: NutritionSummary {
            calories_kcal: kcal,
            protein_g: 5.0,
            fat_g: 2.0,
            carbs_g: 20.0,
            sodium_mg: 150.0,
            fiber_g: 1.5,
        },
    }
}

pub fn draft(names: &[&str]) -> ScanDraft {
    let menu = names.iter().map(|n| menu_item(n, 120.0)).collect();
    let items = names.iter().map(|n| nutrition_item(n, 100.0)).collect();
    ScanDraft::new(
        "https://cdn.test/food-images/1-abc.jpg",
        menu,
        NutritionFacts::from_items(items),
    )
}

/// A persisted scan dated `days_ago` days before a fixed reference instant.
pub fn scan(user_id: Uuid, names: &[&str], days_ago: i64) -> Scan {
    let reference = OffsetDateTime::from_unix_timestamp(1_760_000_000).expect("valid timestamp");
    let at = reference - Duration::days(days_ago);
    let d = draft(names);
    Scan {
        id: Uuid::new_v4(),
        user_id,
        image_url: d.image_url,
        scan_date: at,
        menu_items: d.menu_items,
        nutrition_facts: d.nutrition_facts,
        created_at: at,
    }
}
