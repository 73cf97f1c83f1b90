use serde::Serialize;

use crate::scans::model::Scan;

/// Totals shown on the history dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistoryStats {
    pub total_scans: usize,
    pub total_calories: i64,
    pub total_items: usize,
}

impl HistoryStats {
    pub fn of(scans: &[Scan]) -> Self {
        let calories: f64 = scans
            .iter()
            .map(|s| s.nutrition_facts.summary().calories_kcal)
            .sum();
        Self {
            total_scans: scans.len(),
            total_calories: calories.round() as i64,
            total_items: scans.iter().map(|s| s.menu_items.len()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scans::fixtures::scan;
    use uuid::Uuid;

    #[test]
    fn totals_over_scans() {
        let user = Uuid::new_v4();
        let scans = vec![scan(user, &["Nasi", "Telur"], 0), scan(user, &["Soto"], 1)];
        let stats = HistoryStats::of(&scans);
        assert_eq!(stats.total_scans, 2);
        assert_eq!(stats.total_items, 3);
        assert_eq!(stats.total_calories, 300);
        assert_eq!(HistoryStats::of(&[]).total_calories, 0);
    }
}
