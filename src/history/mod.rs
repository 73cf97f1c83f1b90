pub mod engine;
pub mod stats;
pub mod view;

pub use engine::HistoryEngine;
pub use stats::HistoryStats;
pub use view::{search_date, HistoryPage, HistoryView, SortOrder};
