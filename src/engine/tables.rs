//! Table detection over layout-preserving text.
//!
//! A row is a line that splits into at least `min_columns` cells on gaps of
//! two or more spaces; a table is a run of at least `min_rows` such lines.
//! Ruled borders are not needed, only consistent column gaps.

use super::types::Table;
use regex::Regex;
use std::sync::OnceLock;

fn column_gap() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s{2,}|\t").expect("static regex"))
}

fn split_cells(line: &str) -> Vec<String> {
    column_gap()
        .split(line.trim())
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

pub fn detect_tables(page_text: &str, page: usize, min_columns: usize, min_rows: usize) -> Vec<Table> {
    let min_columns = min_columns.max(2);
    let min_rows = min_rows.max(1);

    let mut tables = Vec::new();
    let mut current: Vec<Vec<String>> = Vec::new();

    for line in page_text.lines() {
        let cells = split_cells(line);
        if cells.len() >= min_columns {
            current.push(cells);
            continue;
        }
        if current.len() >= min_rows {
            tables.push(Table {
                page,
                rows: std::mem::take(&mut current),
            });
        } else {
            current.clear();
        }
    }
    if current.len() >= min_rows {
        tables.push(Table { page, rows: current });
    }

    tables
}
