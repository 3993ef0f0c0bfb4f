use tracing::{debug, warn};

use crate::table::{CleanTable, RawTable, Row, cell_at};

pub const ANCHOR_NO: &str = "Entry No.";
pub const ANCHOR_DATE: &str = "Entry Date";
pub const BANNER: &str = "Manuhar Amber Sadan";
pub const PLACEHOLDER_PREFIX: &str = "Unnamed";

/// What a single normalize run removed. Logged by the caller.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NormalizeReport {
    pub anchor: Option<usize>,
    pub preamble_rows: usize,
    pub blank_rows: usize,
    pub banner_removed: bool,
    pub invalid_rows: usize,
}

/// Turns a banner-laden export into a header row followed by data rows.
#[derive(Debug, Default)]
pub struct TableNormalizer;

impl TableNormalizer {
    pub fn normalize(&self, raw: RawTable) -> CleanTable {
        self.normalize_with_report(raw).0
    }

    pub fn normalize_with_report(&self, raw: RawTable) -> (CleanTable, NormalizeReport) {
        let mut report = NormalizeReport::default();
        let mut rows = raw.into_rows();

        // Header anchor, first match wins
        report.anchor = rows.iter().position(Self::is_anchor);
        match report.anchor {
            Some(idx) => {
                rows.drain(..idx);
                report.preamble_rows = idx;
            }
            None => warn!("No header anchor found, keeping all {} rows", rows.len()),
        }

        report.blank_rows += Self::drop_blank_rows(&mut rows);

        if rows.first().is_some_and(|r| cell_at(r, 0).is_text(BANNER)) {
            rows.remove(0);
            report.banner_removed = true;
        }

        let before = rows.len();
        rows.retain(Self::has_valid_date_cell);
        report.invalid_rows = before - rows.len();

        // No-op on valid input
        report.blank_rows += Self::drop_blank_rows(&mut rows);

        debug!("Normalized table: {report:?}");
        (CleanTable::from_rows(rows), report)
    }

    fn is_anchor(row: &Row) -> bool {
        cell_at(row, 0).is_text(ANCHOR_NO) && cell_at(row, 1).is_text(ANCHOR_DATE)
    }

    fn drop_blank_rows(rows: &mut Vec<Row>) -> usize {
        let before = rows.len();
        rows.retain(|r| !r.iter().all(|c| c.is_blank()));
        before - rows.len()
    }

    fn has_valid_date_cell(row: &Row) -> bool {
        let cell = cell_at(row, 1);
        !cell.is_blank() && !cell.to_string().starts_with(PLACEHOLDER_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;
    use crate::table::Cell;

    fn normalize(rows: Vec<Row>) -> CleanTable {
        TableNormalizer.normalize(RawTable::new(rows))
    }

    #[test]
    fn store_export_scenario() {
        let clean = normalize(vec![
            row!["Store Banner", "", ""],
            row!["Manuhar Amber Sadan", "", ""],
            row!["Entry No.", "Entry Date", "Qty"],
            row![1, "2024-01-05", 10],
            row!["", "", ""],
            row![2, "Unnamed: 3", 5],
        ]);
        assert_eq!(
            clean,
            CleanTable::from_rows(vec![
                row!["Entry No.", "Entry Date", "Qty"],
                row![1, "2024-01-05", 10]
            ])
        );
    }

    #[test]
    fn anchor_becomes_header() {
        let (clean, report) = TableNormalizer.normalize_with_report(RawTable::new(vec![
            row!["Entry No.", "Entry Date"],
            row!["x", "y"],
            row!["Entry No.", "Entry Date", "Brand"],
            row![7, "2024-02-01", "Acme"],
        ]));
        assert_eq!(report.anchor, Some(0));
        assert_eq!(clean.header(), Some(&row!["Entry No.", "Entry Date"]));
        assert_eq!(clean.len(), 4);
    }

    #[test]
    fn anchor_drops_every_earlier_row() {
        let (clean, report) = TableNormalizer.normalize_with_report(RawTable::new(vec![
            row!["Sales Register", "01-Jan to 31-Jan"],
            row!["Date", "Entry Date"],
            row!["Entry No.", "Entry Date", "Qty"],
            row![1, "2024-01-05", 10],
        ]));
        assert_eq!(report.anchor, Some(2));
        assert_eq!(report.preamble_rows, 2);
        assert_eq!(clean.header(), Some(&row!["Entry No.", "Entry Date", "Qty"]));
        assert_eq!(clean.data_rows(), &[row![1, "2024-01-05", 10]]);
    }

    #[test]
    fn anchor_match_is_exact() {
        let clean = normalize(vec![
            row!["Entry No. ", "Entry Date"],
            row!["entry no.", "Entry Date"],
            row!["Entry No.", "Entry  Date"],
            row![1, "2024-01-05"],
        ]);
        // No anchor: nothing truncated, all rows have a valid column 1
        assert_eq!(clean.len(), 4);
    }

    #[test]
    fn anchor_miss_keeps_table_modulo_blanks() {
        let clean = normalize(vec![
            row!["No", "Date"],
            row!["", ""],
            row![1, "2024-01-05"],
            vec![],
        ]);
        assert_eq!(
            clean,
            CleanTable::from_rows(vec![row!["No", "Date"], row![1, "2024-01-05"]])
        );
    }

    #[test]
    fn normalize_is_idempotent_on_clean_tables() {
        let once = normalize(vec![
            row!["junk"],
            row!["Entry No.", "Entry Date", "Qty"],
            row![1, "2024-01-05", 10],
            row![2, "", 4],
            row![3, "2024-01-07", 1],
        ]);
        let twice = TableNormalizer.normalize(once.clone().into());
        assert_eq!(once, twice);
    }

    #[test]
    fn banner_after_header_is_removed() {
        let (clean, report) = TableNormalizer.normalize_with_report(RawTable::new(vec![
            row!["Manuhar Amber Sadan", "Ward 4"],
            row!["No", "Date"],
            row![1, "2024-03-14"],
        ]));
        assert!(report.banner_removed);
        assert_eq!(clean.header(), Some(&row!["No", "Date"]));
    }

    #[test]
    fn banner_is_dropped_only_once() {
        let clean = normalize(vec![
            row!["Manuhar Amber Sadan", "a"],
            row!["Manuhar Amber Sadan", "b"],
        ]);
        assert_eq!(clean, CleanTable::from_rows(vec![row!["Manuhar Amber Sadan", "b"]]));
    }

    #[test]
    fn invalid_date_cells_are_filtered() {
        let clean = normalize(vec![
            row!["Entry No.", "Entry Date"],
            row![1, "   "],
            row![2],
            row![3, "Unnamed: 1"],
            row![4, "unnamed"],
            row![5, " Unnamed"],
            vec![Cell::Int(6), Cell::Float(45000.0)],
        ]);
        for r in clean.header().into_iter().chain(clean.data_rows()) {
            let c = cell_at(r, 1);
            assert!(!c.is_blank());
            assert!(!c.to_string().starts_with(PLACEHOLDER_PREFIX));
        }
        // Prefix check is case sensitive and anchored at position 0
        assert_eq!(clean.len(), 4);
    }

    #[test]
    fn empty_input_gives_empty_table() {
        assert!(normalize(vec![]).is_empty());
        assert!(normalize(vec![row!["", ""], vec![]]).is_empty());
    }
}
