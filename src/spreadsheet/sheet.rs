use crate::error::SheetSyncError;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::RawRow;
use std::collections::HashSet;

/// Placeholder header for a blank header cell
const EMPTY_HEADER: &str = "__EMPTY";

/// Sparse cell storage for a single worksheet.
#[derive(Debug)]
pub(crate) struct Sheet {
    pub(crate) name: String,
    pub(crate) cells: Vec<Cell>,
    /// Actual data range (determined from cell data)
    pub(crate) col_lower_bound: Option<usize>,
    pub(crate) col_upper_bound: Option<usize>,
}

impl Sheet {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            cells: Vec::new(),
            col_lower_bound: None,
            col_upper_bound: None,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub(crate) fn push(&mut self, cell: Cell) {
        if self.col_lower_bound.map(|col_lower_bound| cell.col < col_lower_bound).unwrap_or(true) {
            self.col_lower_bound = Some(cell.col);
        }
        if self.col_upper_bound.map(|col_upper_bound| col_upper_bound < cell.col).unwrap_or(true) {
            self.col_upper_bound = Some(cell.col);
        }
        self.cells.push(cell);
    }

    /// Orders cells row-major; a later duplicate of the same position wins.
    pub(crate) fn finish(&mut self) {
        self.cells.sort_by_key(|cell| (cell.row, cell.col));
        let mut deduplicated: Vec<Cell> = Vec::with_capacity(self.cells.len());
        for cell in self.cells.drain(..) {
            match deduplicated.last_mut() {
                Some(last) if last.row == cell.row && last.col == cell.col => *last = cell,
                _ => deduplicated.push(cell),
            }
        }
        self.cells = deduplicated;
    }

    /// Turns the sheet into header-keyed rows.
    ///
    /// The first row holding a non-empty value provides the headers for every column
    /// in the sheet's used range. Rows without a single non-empty value are skipped.
    pub(crate) fn to_raw_rows(&self) -> Result<Vec<RawRow>, SheetSyncError> {
        let (Some(col_lower), Some(col_upper)) = (self.col_lower_bound, self.col_upper_bound) else {
            return Ok(Vec::new());
        };
        let width = col_upper - col_lower + 1;

        let mut rows = Vec::<Vec<CellValue>>::new();
        let mut current_row = None::<usize>;
        for cell in &self.cells {
            let value = cell.to_value()?;
            if current_row != Some(cell.row) {
                current_row = Some(cell.row);
                rows.push(vec![CellValue::Empty; width]);
            }
            if let Some(row) = rows.last_mut() {
                row[cell.col - col_lower] = value;
            }
        }

        let mut rows = rows
            .into_iter()
            .filter(|row| row.iter().any(|value| !value.is_empty()));
        let Some(header_row) = rows.next() else {
            return Ok(Vec::new());
        };
        let headers = normalize_headers(&header_row);

        Ok(rows
            .map(|row| headers.iter().cloned().zip(row).collect::<RawRow>())
            .collect())
    }
}

/// Names blank headers `__EMPTY` and suffixes repeats with `_1`, `_2`, ...
fn normalize_headers(row: &[CellValue]) -> Vec<String> {
    let mut seen = HashSet::<String>::new();
    row.iter()
        .map(|value| {
            let base = if value.is_empty() { EMPTY_HEADER.to_owned() } else { value.to_string() };
            let mut header = base.clone();
            let mut counter = 0usize;
            while seen.contains(&header) {
                counter += 1;
                header = format!("{}_{}", base, counter);
            }
            seen.insert(header.clone());
            header
        })
        .collect()
}
