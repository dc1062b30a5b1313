//! # Spreadsheet Decoding
//!
//! Turns the bytes of an uploaded workbook into header-keyed rows. Two container
//! formats are understood, told apart by their leading signature rather than by the
//! file name:
//!
//! - Office Open XML (`.xlsx`): a zip package of XML parts
//! - Excel 97-2003 (`.xls`): a BIFF8 record stream inside an OLE compound file
//!
//! Only the first worksheet is read. Its first non-empty row supplies the headers.

mod cell;
mod excel;
#[cfg(test)]
pub(crate) mod fixtures;
mod reference;
mod sheet;
pub(crate) mod xls;
pub(crate) mod xlsx;

use crate::error::SheetSyncError;
use crate::helpers::cfb;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::xls::XlsWorkbook;
use crate::spreadsheet::xlsx::XlsxWorkbook;
use std::collections::HashMap;
use std::io::Cursor;
use thiserror::Error;
use tracing::debug;

pub use cell::CellValue;

/// Zip local file header
const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";

/// Outcomes of decoding a workbook that the caller can act on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpreadsheetError {
    /// The workbook has no worksheet, or its first worksheet has no data row
    #[error("Excel file is empty")]
    EmptyDocument,

    /// The bytes are not a readable workbook
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// The blocking decode task did not complete
    #[error("Spreadsheet worker failed: {0}")]
    Worker(String),
}

/// One data row keyed by column header. Every header of the sheet is present.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawRow {
    values: HashMap<String, CellValue>,
}

impl RawRow {
    pub fn get(&self, header: &str) -> Option<&CellValue> {
        self.values.get(header)
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, CellValue)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (String, CellValue)>>(iter: I) -> Self {
        RawRow { values: iter.into_iter().collect() }
    }
}

/// A workbook container able to hand out its first worksheet.
pub(crate) trait Workbook {
    /// `None` when the workbook holds no worksheet
    fn first_sheet(&mut self) -> Result<Option<Sheet>, SheetSyncError>;
}

/// Decodes the first worksheet of an `.xlsx` or `.xls` workbook.
pub fn parse(bytes: &[u8]) -> Result<Vec<RawRow>, SpreadsheetError> {
    let rows = read_first_sheet(bytes)
        .and_then(|sheet| sheet.to_raw_rows())
        .map_err(into_spreadsheet_error)?;
    if rows.is_empty() {
        return Err(SpreadsheetError::EmptyDocument);
    }
    debug!(rows = rows.len(), "decoded worksheet");
    Ok(rows)
}

/// Runs [`parse`] on the blocking thread pool.
pub async fn parse_deferred(bytes: Vec<u8>) -> Result<Vec<RawRow>, SpreadsheetError> {
    tokio::task::spawn_blocking(move || parse(&bytes))
        .await
        .map_err(|error| SpreadsheetError::Worker(error.to_string()))?
}

fn read_first_sheet(bytes: &[u8]) -> Result<Sheet, SheetSyncError> {
    let mut workbook: Box<dyn Workbook + '_> = if bytes.starts_with(ZIP_SIGNATURE) {
        debug!(size = bytes.len(), "detected xlsx package");
        Box::new(XlsxWorkbook::open(Cursor::new(bytes))?)
    } else if cfb::has_signature(bytes) {
        debug!(size = bytes.len(), "detected xls compound file");
        Box::new(XlsWorkbook::open(bytes)?)
    } else {
        return Err(SpreadsheetError::MalformedDocument("unrecognized file signature".to_owned()).into());
    };
    let sheet = workbook.first_sheet()?.ok_or(SpreadsheetError::EmptyDocument)?;
    debug!(sheet = %sheet.name, cells = sheet.cells.len(), "loaded first worksheet");
    if sheet.is_empty() {
        Err(SpreadsheetError::EmptyDocument)?
    }
    Ok(sheet)
}

/// Public outcomes pass through, decoder failures become `MalformedDocument`
fn into_spreadsheet_error(error: SheetSyncError) -> SpreadsheetError {
    match error {
        SheetSyncError::SpreadsheetError(error) => error,
        other => SpreadsheetError::MalformedDocument(other.to_string()),
    }
}
