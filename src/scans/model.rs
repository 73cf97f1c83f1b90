use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A food item detected on the photo. Wire names follow the stored JSON documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    #[serde(rename = "nama_menu")]
    pub name: String,
    #[serde(rename = "estimasi_gram")]
    pub estimated_grams: f64,
    #[serde(rename = "deskripsi", default)]
    pub description: String,
    #[serde(rename = "proses_pengolahan", default)]
    pub preparation_note: String,
}

impl MenuItem {
    pub fn validate(&self) -> Result<(), String> {
        non_negative("estimasi_gram", self.estimated_grams)
    }
}

/// The six tracked nutrients, in their canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nutrient {
    CaloriesKcal,
    ProteinG,
    FatG,
    CarbsG,
    SodiumMg,
    FiberG,
}

impl Nutrient {
    pub const ALL: [Nutrient; 6] = [
        Nutrient::CaloriesKcal,
        Nutrient::ProteinG,
        Nutrient::FatG,
        Nutrient::CarbsG,
        Nutrient::SodiumMg,
        Nutrient::FiberG,
    ];
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionSummary {
    pub calories_kcal: f64,
    pub protein_g: f64,
    pub fat_g: f64,
    pub carbs_g: f64,
    pub sodium_mg: f64,
    pub fiber_g: f64,
}

impl NutritionSummary {
    pub fn get(&self, n: Nutrient) -> f64 {
        match n {
            Nutrient::CaloriesKcal => self.calories_kcal,
            Nutrient::ProteinG => self.protein_g,
            Nutrient::FatG => self.fat_g,
            Nutrient::CarbsG => self.carbs_g,
            Nutrient::SodiumMg => self.sodium_mg,
            Nutrient::FiberG => self.fiber_g,
        }
    }

    fn slot(&mut self, n: Nutrient) -> &mut f64 {
        match n {
            Nutrient::CaloriesKcal => &mut self.calories_kcal,
            Nutrient::ProteinG => &mut self.protein_g,
            Nutrient::FatG => &mut self.fat_g,
            Nutrient::CarbsG => &mut self.carbs_g,
            Nutrient::SodiumMg => &mut self.sodium_mg,
            Nutrient::FiberG => &mut self.fiber_g,
        }
    }

    /// Elementwise sum over items, accumulated in `Nutrient::ALL` order.
    pub fn sum_of(items: &[NutritionItem]) -> Self {
        let mut acc = Self::default();
        for item in items {
            for n in Nutrient::ALL {
                *acc.slot(n) += item.values.get(n);
            }
        }
        acc
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionItem {
    pub name: String,
    pub grams: f64,
    #[serde(flatten)]
    pub values: NutritionSummary,
}

/// A numeric field of a `NutritionItem` that review may edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NutritionField {
    Grams,
    CaloriesKcal,
    ProteinG,
    FatG,
    CarbsG,
    SodiumMg,
    FiberG,
}

impl NutritionField {
    pub fn nutrient(self) -> Option<Nutrient> {
        match self {
            NutritionField::Grams => None,
            NutritionField::CaloriesKcal => Some(Nutrient::CaloriesKcal),
            NutritionField::ProteinG => Some(Nutrient::ProteinG),
            NutritionField::FatG => Some(Nutrient::FatG),
            NutritionField::CarbsG => Some(Nutrient::CarbsG),
            NutritionField::SodiumMg => Some(Nutrient::SodiumMg),
            NutritionField::FiberG => Some(Nutrient::FiberG),
        }
    }
}

impl NutritionItem {
    pub fn set(&mut self, field: NutritionField, value: f64) {
        match field.nutrient() {
            None => self.grams = value,
            Some(n) => *self.values.slot(n) = value,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        non_negative("grams", self.grams)?;
        for n in Nutrient::ALL {
            non_negative(nutrient_key(n), self.values.get(n))?;
        }
        Ok(())
    }
}

pub fn nutrient_key(n: Nutrient) -> &'static str {
    match n {
        Nutrient::CaloriesKcal => "calories_kcal",
        Nutrient::ProteinG => "protein_g",
        Nutrient::FatG => "fat_g",
        Nutrient::CarbsG => "carbs_g",
        Nutrient::SodiumMg => "sodium_mg",
        Nutrient::FiberG => "fiber_g",
    }
}

/// Nutrition breakdown with a summary that is always the sum of its items.
///
/// The summary is never deserialized as-is: incoming documents are rebuilt from
/// their items, so a stored or client-supplied summary cannot drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawNutritionFacts")]
pub struct NutritionFacts {
    #[serde(rename = "nutrition_summary")]
    summary: NutritionSummary,
    items: Vec<NutritionItem>,
}

/// Nutrition document exactly as received, before the summary is recomputed.
#[derive(Debug, Clone, Deserialize)]
pub struct RawNutritionFacts {
    pub nutrition_summary: NutritionSummary,
    pub items: Vec<NutritionItem>,
}

impl From<RawNutritionFacts> for NutritionFacts {
    fn from(raw: RawNutritionFacts) -> Self {
        NutritionFacts::from_items(raw.items)
    }
}

impl NutritionFacts {
    pub fn from_items(items: Vec<NutritionItem>) -> Self {
        let summary = NutritionSummary::sum_of(&items);
        Self { summary, items }
    }

    pub fn summary(&self) -> &NutritionSummary {
        &self.summary
    }

    pub fn items(&self) -> &[NutritionItem] {
        &self.items
    }

    /// Sets one field of one item and recomputes the summary. Out-of-range
    /// indices leave the facts untouched and return `false`.
    pub fn set_item_field(&mut self, index: usize, field: NutritionField, value: f64) -> bool {
        let Some(item) = self.items.get_mut(index) else {
            return false;
        };
        item.set(field, value);
        self.summary = NutritionSummary::sum_of(&self.items);
        true
    }

    pub fn validate(&self) -> Result<(), String> {
        self.items.iter().try_for_each(NutritionItem::validate)
    }
}

/// In-progress analysis result, not yet confirmed by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanDraft {
    pub image_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub scan_date: OffsetDateTime,
    pub menu_items: Vec<MenuItem>,
    pub nutrition_facts: NutritionFacts,
}

impl ScanDraft {
    pub fn new(
        image_url: impl Into<String>,
        menu_items: Vec<MenuItem>,
        nutrition_facts: NutritionFacts,
    ) -> Self {
        Self {
            image_url: image_url.into(),
            scan_date: OffsetDateTime::now_utc(),
            menu_items,
            nutrition_facts,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.image_url.trim().is_empty() {
            return Err("image_url is required".into());
        }
        self.menu_items.iter().try_for_each(MenuItem::validate)?;
        self.nutrition_facts.validate()
    }
}

/// A persisted scan owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub image_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub scan_date: OffsetDateTime,
    pub menu_items: Vec<MenuItem>,
    pub nutrition_facts: NutritionFacts,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Scan {
    pub fn item_names(&self) -> Vec<&str> {
        self.menu_items.iter().map(|i| i.name.as_str()).collect()
    }
}

fn non_negative(field: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() || value < 0.0 {
        return Err(format!("{} must be a non-negative number", field));
    }
    Ok(())
}
