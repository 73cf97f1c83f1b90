//! Field-level edits of a draft under review.

use serde::Deserialize;

use crate::{
    error::AppError,
    scans::model::{NutritionField, ScanDraft},
};

/// One field of one detected menu item, as sent by the client:
/// `{"field": "estimasi_gram", "value": 120}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "field", content = "value")]
pub enum MenuItemEdit {
    #[serde(rename = "nama_menu")]
    Name(String),
    #[serde(rename = "estimasi_gram")]
    EstimatedGrams(f64),
    #[serde(rename = "deskripsi")]
    Description(String),
    #[serde(rename = "proses_pengolahan")]
    PreparationNote(String),
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct NutritionItemEdit {
    pub field: NutritionField,
    pub value: f64,
}

fn check_amount(field: &str, value: f64) -> Result<(), AppError> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::Validation(format!(
            "{} must be a non-negative number",
            field
        )));
    }
    Ok(())
}

impl ScanDraft {
    /// Replaces one field of one menu item. Returns `false` (and changes nothing)
    /// when `index` is out of bounds.
    pub fn update_menu_item(&mut self, index: usize, edit: MenuItemEdit) -> Result<bool, AppError> {
        if let MenuItemEdit::EstimatedGrams(g) = edit {
            check_amount("estimasi_gram", g)?;
        }
        let Some(item) = self.menu_items.get_mut(index) else {
            return Ok(false);
        };
        match edit {
            MenuItemEdit::Name(v) => item.name = v,
            MenuItemEdit::EstimatedGrams(v) => item.estimated_grams = v,
            MenuItemEdit::Description(v) => item.description = v,
            MenuItemEdit::PreparationNote(v) => item.preparation_note = v,
        }
        Ok(true)
    }

    /// Replaces one numeric field of one nutrition item; the summary is recomputed
    /// immediately.
    pub fn update_nutrition_item(
        &mut self,
        index: usize,
        field: NutritionField,
        value: f64,
    ) -> Result<bool, AppError> {
        check_amount("value", value)?;
        Ok(self.nutrition_facts.set_item_field(index, field, value))
    }

    /// The payload handed to the save step.
    pub fn confirm(&self) -> ScanDraft {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scans::fixtures::{draft, nutrition_item};
    use crate::scans::model::{Nutrient, NutritionFacts};
    use proptest::prelude::*;
    use serde_json::json;

    fn two_item_draft() -> ScanDraft {
        let mut d = draft(&["Nasi", "Telur"]);
        d.nutrition_facts =
            NutritionFacts::from_items(vec![nutrition_item("rice", 100.0), nutrition_item("egg", 250.0)]);
        d
    }

    #[test]
    fn calorie_edit_updates_total() {
        let mut d = two_item_draft();
        assert!(d
            .update_nutrition_item(0, NutritionField::CaloriesKcal, 150.0)
            .unwrap());
        assert_eq!(d.nutrition_facts.summary().calories_kcal, 400.0);
    }

    #[test]
    fn menu_item_edits() {
        let mut d = two_item_draft();
        let edit: MenuItemEdit =
            serde_json::from_value(json!({"field": "estimasi_gram", "value": 80})).unwrap();
        assert!(d.update_menu_item(1, edit).unwrap());
        assert_eq!(d.menu_items[1].estimated_grams, 80.0);

        let edit: MenuItemEdit =
            serde_json::from_value(json!({"field": "nama_menu", "value": "Telur Dadar"})).unwrap();
        assert!(d.update_menu_item(1, edit).unwrap());
        assert_eq!(d.menu_items[1].name, "Telur Dadar");
    }

    #[test]
    fn out_of_bounds_edits_are_noops() {
        let mut d = two_item_draft();
        let before = d.clone();
        assert!(!d.update_menu_item(5, MenuItemEdit::Name("x".into())).unwrap());
        assert!(!d.update_nutrition_item(5, NutritionField::FatG, 1.0).unwrap());
        assert_eq!(d, before);
    }

    #[test]
    fn negative_values_rejected() {
        let mut d = two_item_draft();
        let before = d.clone();
        assert!(matches!(
            d.update_menu_item(0, MenuItemEdit::EstimatedGrams(-1.0)),
            Err(AppError::Validation(_))
        ));
        assert!(d
            .update_nutrition_item(0, NutritionField::SodiumMg, f64::NAN)
            .is_err());
        assert_eq!(d, before);
    }

    #[test]
    fn confirm_returns_draft_unchanged() {
        let d = two_item_draft();
        assert_eq!(d.confirm(), d);
    }

    fn field() -> impl Strategy<Value = NutritionField> {
        prop_oneof![
            Just(NutritionField::Grams),
            Just(NutritionField::CaloriesKcal),
            Just(NutritionField::ProteinG),
            Just(NutritionField::FatG),
            Just(NutritionField::CarbsG),
            Just(NutritionField::SodiumMg),
            Just(NutritionField::FiberG),
        ]
    }

    proptest! {
        #[test]
        fn summary_always_equals_item_sum(
            edits in prop::collection::vec((0usize..4, field(), 0.0f64..5000.0), 1..40)
        ) {
            let mut d = two_item_draft();
            for (index, field, value) in edits {
                d.update_nutrition_item(index, field, value).unwrap();
                let facts = &d.nutrition_facts;
                for n in Nutrient::ALL {
                    let expected = facts
                        .items()
                        .iter()
                        .fold(0.0, |acc, item| acc + item.values.get(n));
                    prop_assert_eq!(facts.summary().get(n), expected);
                }
            }
        }
    }
}
