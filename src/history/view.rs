//! Search, sort and pagination over a user's scans.

use serde::{Deserialize, Serialize};
use time::{format_description::FormatItem, macros::format_description, OffsetDateTime};

use crate::scans::model::Scan;

const SEARCH_DATE: &[FormatItem<'static>] =
    format_description!("[month padding:none]/[day padding:none]/[year]");

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Date as matched by search queries, e.g. `10/9/2025` (UTC).
pub fn search_date(at: OffsetDateTime) -> String {
    at.format(SEARCH_DATE)
        .unwrap_or_else(|_| at.date().to_string())
}

fn matches(scan: &Scan, needle: &str) -> bool {
    needle.is_empty()
        || scan
            .menu_items
            .iter()
            .any(|i| i.name.to_lowercase().contains(needle))
        || search_date(scan.scan_date).contains(needle)
}

/// Derived view over `scans`. `filtered` is recomputed whenever scans, query or
/// sort order change; `page` is kept within the filtered range.
#[derive(Debug, Clone)]
pub struct HistoryView {
    scans: Vec<Scan>,
    query: String,
    sort: SortOrder,
    page: usize,
    page_size: usize,
    filtered: Vec<usize>,
}

impl HistoryView {
    pub fn new(page_size: usize) -> Self {
        Self {
            scans: Vec::new(),
            query: String::new(),
            sort: SortOrder::default(),
            page: 1,
            page_size: page_size.max(1),
            filtered: Vec::new(),
        }
    }

    fn recompute(&mut self) {
        let needle = self.query.trim().to_lowercase();
        let mut idx: Vec<usize> = (0..self.scans.len())
            .filter(|&i| matches(&self.scans[i], &needle))
            .collect();
        let scans = &self.scans;
        match self.sort {
            SortOrder::Asc => idx.sort_by(|&a, &b| scans[a].scan_date.cmp(&scans[b].scan_date)),
            SortOrder::Desc => idx.sort_by(|&a, &b| scans[b].scan_date.cmp(&scans[a].scan_date)),
        }
        self.filtered = idx;
        self.clamp_page();
    }

    fn clamp_page(&mut self) {
        self.page = self.page.clamp(1, self.total_pages().max(1));
    }

    pub fn set_scans(&mut self, scans: Vec<Scan>) {
        self.scans = scans;
        self.recompute();
    }

    /// A new query starts again from the first page.
    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.page = 1;
        self.recompute();
    }

    pub fn set_sort_order(&mut self, order: SortOrder) {
        self.sort = order;
        self.recompute();
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page;
        self.clamp_page();
    }

    pub fn all(&self) -> &[Scan] {
        &self.scans
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total(&self) -> usize {
        self.filtered.len()
    }

    pub fn filtered(&self) -> impl Iterator<Item = &Scan> + '_ {
        self.filtered.iter().map(|&i| &self.scans[i])
    }

    pub fn paginated(&self) -> impl Iterator<Item = &Scan> + '_ {
        self.filtered()
            .skip((self.page - 1) * self.page_size)
            .take(self.page_size)
    }

    pub fn total_pages(&self) -> usize {
        self.filtered.len().div_ceil(self.page_size)
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page * self.page_size < self.filtered.len()
    }
}

/// One page of history as returned by `GET /scans`.
#[derive(Debug, Serialize)]
pub struct HistoryPage {
    pub scans: Vec<Scan>,
    pub query: String,
    pub sort: SortOrder,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub total_pages: usize,
    pub has_previous: bool,
    pub has_next: bool,
}

impl From<&HistoryView> for HistoryPage {
    fn from(v: &HistoryView) -> Self {
        Self {
            scans: v.paginated().cloned().collect(),
            query: v.query().to_string(),
            sort: v.sort_order(),
            page: v.page(),
            page_size: v.page_size(),
            total: v.total(),
            total_pages: v.total_pages(),
            has_previous: v.has_previous(),
            has_next: v.has_next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scans::fixtures::scan;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn view_of(n: usize) -> HistoryView {
        let user = Uuid::new_v4();
        let mut v = HistoryView::new(10);
        v.set_scans((0..n).map(|i| scan(user, &["Nasi Putih"], i as i64)).collect());
        v
    }

    #[test]
    fn twenty_three_scans_make_three_pages() {
        let mut v = view_of(23);
        assert_eq!(v.total_pages(), 3);
        assert!(!v.has_previous());
        assert!(v.has_next());

        v.set_page(3);
        assert_eq!(v.page(), 3);
        assert!(!v.has_next());
        assert!(v.has_previous());
        assert_eq!(v.paginated().count(), 3);
    }

    #[test]
    fn page_is_clamped() {
        let mut v = view_of(23);
        v.set_page(9);
        assert_eq!(v.page(), 3);
        v.set_page(0);
        assert_eq!(v.page(), 1);

        v.set_page(3);
        v.set_scans(v.all()[..5].to_vec());
        assert_eq!(v.page(), 1);

        v.set_scans(Vec::new());
        assert_eq!(v.page(), 1);
        assert_eq!(v.total_pages(), 0);
        assert!(!v.has_next());
    }

    #[test]
    fn search_matches_names_case_insensitively_and_dates() {
        let user = Uuid::new_v4();
        let mut v = HistoryView::new(10);
        v.set_scans(vec![
            scan(user, &["Nasi Goreng", "Telur"], 0),
            scan(user, &["Soto Ayam"], 1),
            scan(user, &["Ayam Bakar"], 2),
        ]);

        v.set_query("AYAM");
        let names: Vec<_> = v.filtered().map(|s| s.menu_items[0].name.clone()).collect();
        assert_eq!(names, vec!["Soto Ayam", "Ayam Bakar"]);

        let date = search_date(v.all()[0].scan_date);
        v.set_query(date);
        assert_eq!(v.total(), 1);

        v.set_query("rendang");
        assert_eq!(v.total(), 0);
        assert_eq!(v.paginated().count(), 0);
    }

    #[test]
    fn search_date_has_no_padding() {
        let at = OffsetDateTime::from_unix_timestamp(1_759_968_000).unwrap(); // 2025-10-09
        assert_eq!(search_date(at), "10/9/2025");
    }

    #[test]
    fn new_query_resets_page_but_sort_keeps_it() {
        let mut v = view_of(23);
        v.set_page(2);
        v.set_sort_order(SortOrder::Asc);
        assert_eq!(v.page(), 2);
        v.set_query("nasi");
        assert_eq!(v.page(), 1);
    }

    #[test]
    fn sort_order_by_scan_date() {
        let mut v = view_of(5);
        let desc: Vec<_> = v.filtered().map(|s| s.scan_date).collect();
        assert!(desc.windows(2).all(|w| w[0] >= w[1]));
        v.set_sort_order(SortOrder::Asc);
        let asc: Vec<_> = v.filtered().map(|s| s.scan_date).collect();
        assert!(asc.windows(2).all(|w| w[0] <= w[1]));
    }

    fn names() -> impl Strategy<Value = Vec<&'static str>> {
        prop::collection::vec(
            prop::sample::select(vec!["Nasi Putih", "Telur Rebus", "Sayur Bayam", "Tempe Goreng"]),
            1..4,
        )
    }

    proptest! {
        #[test]
        fn page_is_a_slice_of_sorted_filtered(
            rows in prop::collection::vec((names(), 0i64..60), 0..40),
            query in prop::sample::select(vec!["", "nasi", "GORENG", "telur", "/20", "zzz"]),
            asc in any::<bool>(),
            page in 0usize..8,
            page_size in 1usize..12,
        ) {
            let user = Uuid::new_v4();
            let mut v = HistoryView::new(page_size);
            v.set_scans(rows.iter().map(|(n, d)| scan(user, n, *d)).collect());
            v.set_query(query);
            v.set_sort_order(if asc { SortOrder::Asc } else { SortOrder::Desc });
            v.set_page(page);

            let filtered: Vec<&Scan> = v.filtered().collect();
            let p = v.page();
            prop_assert!(p >= 1);
            if !filtered.is_empty() {
                prop_assert!((p - 1) * page_size < filtered.len());
            }
            let start = ((p - 1) * page_size).min(filtered.len());
            let end = (p * page_size).min(filtered.len());
            let page_ids: Vec<Uuid> = v.paginated().map(|s| s.id).collect();
            let slice_ids: Vec<Uuid> = filtered[start..end].iter().map(|s| s.id).collect();
            prop_assert_eq!(page_ids, slice_ids);

            for w in filtered.windows(2) {
                if asc {
                    prop_assert!(w[0].scan_date <= w[1].scan_date);
                } else {
                    prop_assert!(w[0].scan_date >= w[1].scan_date);
                }
            }
            let needle = query.to_lowercase();
            for s in &filtered {
                prop_assert!(matches(s, &needle));
            }
        }
    }
}
