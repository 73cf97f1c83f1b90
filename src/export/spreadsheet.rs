//! Spreadsheet export of scan history.

use rust_xlsxwriter::{Format, Workbook, XlsxError};
use time::{format_description::FormatItem, macros::format_description, Date, OffsetDateTime};

use crate::scans::model::{Nutrient, Scan};

pub const SHEET_NAME: &str = "Nutrition History";
pub const HEADER: [&str; 8] = [
    "Date",
    "Food Items",
    "Calories",
    "Protein",
    "Fat",
    "Carbs",
    "Sodium",
    "Fiber",
];
const COLUMN_WIDTH: f64 = 15.0;

const ROW_DATE: &[FormatItem<'static>] = format_description!(
    "[month padding:none]/[day padding:none]/[year], [hour repr:12 padding:none]:[minute]:[second] [period]"
);

#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    pub date: String,
    pub items: String,
    /// Summary values in `Nutrient::ALL` order.
    pub values: [f64; 6],
}

pub fn sheet_row(scan: &Scan) -> SheetRow {
    let summary = scan.nutrition_facts.summary();
    SheetRow {
        date: scan
            .scan_date
            .format(ROW_DATE)
            .unwrap_or_else(|_| scan.scan_date.to_string()),
        items: scan.item_names().join(", "),
        values: Nutrient::ALL.map(|n| summary.get(n)),
    }
}

/// Builds the workbook. `Ok(None)` when there is nothing to export.
pub fn export_to_spreadsheet(scans: &[&Scan]) -> Result<Option<Vec<u8>>, XlsxError> {
    if scans.is_empty() {
        return Ok(None);
    }

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    let bold = Format::new().set_bold();
    for (col, title) in HEADER.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, &bold)?;
        sheet.set_column_width(col as u16, COLUMN_WIDTH)?;
    }

    for (i, scan) in scans.iter().enumerate() {
        let row = (i + 1) as u32;
        let r = sheet_row(scan);
        sheet.write_string(row, 0, r.date)?;
        sheet.write_string(row, 1, r.items)?;
        for (j, v) in r.values.iter().enumerate() {
            sheet.write_number(row, (j + 2) as u16, *v)?;
        }
    }

    workbook.save_to_buffer().map(Some)
}

pub fn export_file_name(today: Date) -> String {
    format!("nutrition-history-{}.xlsx", today)
}

pub fn export_file_name_now() -> String {
    export_file_name(OffsetDateTime::now_utc().date())
}
