use crate::error::ResultMessage;
use crate::error::ResultOptionChain;
use crate::error::SheetSyncError;
use crate::helpers::biff8::Biff8Reader;
use crate::helpers::cfb::Cfb;
use crate::match_biff8_record;
use crate::spreadsheet::cell::to_error_value;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::excel::is_password_protected;
use crate::spreadsheet::excel::load_number_formats;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::SpreadsheetError;
use crate::spreadsheet::Workbook;
use either::Either;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

// BIFF8 record type identifiers
const FORMULA: u16 = 6;        // Formula record carrying its cached result
const EOF: u16 = 10;           // End of a substream
const DATE1904: u16 = 34;      // Date system flag (1904 vs 1900 base)
const FILE_PASS: u16 = 47;     // Workbook is encrypted
const CODE_PAGE: u16 = 66;     // Character encoding of byte strings
const BOUND_SHEET8: u16 = 133; // Sheet name, type and stream position
const MUL_RK: u16 = 189;       // Run of RK numbers in one row
const XF: u16 = 224;           // Cell format
const SST: u16 = 252;          // Shared string table
const LABEL_SST: u16 = 253;    // Cell referencing the shared string table
const NUMBER: u16 = 515;       // Floating point cell
const LABEL: u16 = 516;        // Inline string cell
const BOOL_ERR: u16 = 517;     // Boolean or error cell
const STRING: u16 = 519;       // String result of the preceding formula
const RK: u16 = 638;           // Compressed number cell
const FORMAT: u16 = 1054;      // Custom number format
const BOF: u16 = 2057;         // Start of a substream

/// BOUNDSHEET8 sheet type for a plain worksheet
const WORKSHEET: u8 = 0;

/// Error types specific to XLS file parsing
#[derive(Error, Debug)]
pub(crate) enum XlsError {
    #[error("Invalid Code page '{0}'")]
    CodePageError(u16),

    #[error("Invalid Formula value '{0:#018x}'")]
    FormulaValueError(u64),

    #[error("Shared string index {0} out of range")]
    SharedStringIndexError(usize),
}

/// An Excel 97-2003 workbook held fully in memory
pub(crate) struct XlsWorkbook {
    reader: Biff8Reader,
    shared_strings: Vec<String>,
    /// Cell type per XF index
    number_formats: Vec<CellType>,
    /// Worksheets in workbook order with their stream positions
    sheets: Vec<(String, usize)>,
}

impl XlsWorkbook {
    /// Reads the workbook globals substream: encoding, formats, shared strings, sheet list
    pub(crate) fn open(bytes: &[u8]) -> Result<XlsWorkbook, SheetSyncError> {
        let cfb = Cfb::from_bytes(bytes.to_vec())?;
        if is_password_protected(&cfb) {
            Err(SpreadsheetError::MalformedDocument("workbook is password protected".to_owned()))?
        }
        let mut reader = cfb.read("Workbook")
            .ok_none_else(|| cfb.read("Book"))?
            .map(Biff8Reader::new)
            .ok_or_else(|| SpreadsheetError::MalformedDocument("missing Workbook stream".to_owned()))?;
        let mut is_1904 = false;
        let mut shared_strings = Vec::new();
        let mut custom_formats: HashMap<String, CellType> = HashMap::new();
        let mut format_indexes: Vec<String> = Vec::new();
        let mut sheets: Vec<(String, usize)> = Vec::new();
        match_biff8_record!(reader => {
            EOF => break,
            FILE_PASS => Err(SpreadsheetError::MalformedDocument("workbook is password protected".to_owned()))?,
            DATE1904 if reader.read_u16()? == 1 => is_1904 = true,
            CODE_PAGE => {
                let code_page = reader.read_u16()?;
                reader.encoding = codepage::to_encoding(code_page).ok_or(XlsError::CodePageError(code_page))?;
            }
            FORMAT => {
                let id = reader.read_u16()?;
                let format = reader.read_xl_unicode_string()?;
                custom_formats.insert(id.to_string(), CellType::parse_custom_number_format(&format, is_1904));
            }
            XF => {
                reader.skip(2)?;
                format_indexes.push(reader.read_u16()?.to_string());
            }
            SST => shared_strings = load_shared_strings(&mut reader).with_prefix("SST")?,
            BOUND_SHEET8 => {
                let position = reader.read_u32()? as usize;
                reader.skip(1)?;
                let sheet_type = reader.read_u8()?;
                let sheet_name = reader.read_short_xl_unicode_string()?;
                if sheet_type == WORKSHEET {
                    sheets.push((sheet_name, position));
                }
            }
        });

        let number_formats = load_number_formats(format_indexes, custom_formats, is_1904);
        Ok(XlsWorkbook { reader, shared_strings, number_formats, sheets })
    }

    fn number_format(&self, index: usize) -> CellType {
        self.number_formats.get(index).copied().unwrap_or(CellType::Number)
    }

    fn read_sheet(&mut self, sheet_name: &str, position: usize) -> Result<Sheet, SheetSyncError> {
        let mut sheet = Sheet::new(sheet_name);
        self.reader.goto(position);
        self.reader.next()?;
        while let Some(tag) = self.reader.next()? {
            match tag {
                BOF | EOF => break,
                MUL_RK => {
                    let row = self.reader.read_u16()? as usize;
                    let col_lower_bound = self.reader.read_u16()? as usize;
                    let col_upper_bound = self.reader.last_u16()? as usize;
                    for col in col_lower_bound..=col_upper_bound {
                        let index = self.reader.read_u16()? as usize;
                        let kind = self.number_format(index);
                        let value = self.reader.read_rk_number()?;
                        sheet.push(Cell { row, col, kind, value: value.to_string() });
                    }
                }
                BOOL_ERR | NUMBER | RK | LABEL_SST | LABEL | FORMULA => {
                    let row = self.reader.read_u16()? as usize;
                    let col = self.reader.read_u16()? as usize;
                    let (either, value) = match tag {
                        BOOL_ERR => read_bool_or_error_cell(&mut self.reader)?,
                        NUMBER => read_number_cell(&mut self.reader)?,
                        RK => read_rk_cell(&mut self.reader)?,
                        LABEL_SST => read_label_sst_cell(&mut self.reader, &self.shared_strings)?,
                        LABEL => read_label_cell(&mut self.reader)?,
                        _ => read_formula_cell(&mut self.reader)?,
                    };
                    let kind = match either {
                        Either::Left(kind) => kind,
                        Either::Right(index) => self.number_format(index),
                    };
                    if !value.is_empty() {
                        sheet.push(Cell { row, col, kind, value });
                    }
                }
                _ => (),
            }
        }
        sheet.finish();
        Ok(sheet)
    }
}

impl Workbook for XlsWorkbook {
    fn first_sheet(&mut self) -> Result<Option<Sheet>, SheetSyncError> {
        let Some((sheet_name, position)) = self.sheets.first().cloned() else {
            return Ok(None);
        };
        debug!(sheet = %sheet_name, position, shared_strings = self.shared_strings.len(), "reading xls worksheet");
        self.read_sheet(&sheet_name, position)
            .with_prefix(&sheet_name)
            .map(Some)
    }
}

/// Loads the shared string table; the count is the second `u32` of the record
fn load_shared_strings(reader: &mut Biff8Reader) -> Result<Vec<String>, SheetSyncError> {
    reader.skip(4)?;
    let count = reader.read_u32()? as usize;
    (0..count)
        .map(|_| reader.read_xl_unicode_rich_extended_string())
        .collect()
}

/// Boolean cells store `1`/`0`, error cells store their literal
fn read_bool_or_error_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SheetSyncError> {
    reader.skip(2)?;
    let value = reader.read_u8()?;
    let is_error = reader.read_u8()? != 0;
    if is_error {
        Ok((Either::Left(CellType::Error), to_error_value(value).to_owned()))
    } else {
        Ok((Either::Left(CellType::Boolean), value.to_string()))
    }
}

fn read_number_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SheetSyncError> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_f64()?;
    Ok((Either::Right(index), value.to_string()))
}

fn read_rk_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SheetSyncError> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_rk_number()?;
    Ok((Either::Right(index), value.to_string()))
}

fn read_label_sst_cell(reader: &mut Biff8Reader, shared_strings: &[String]) -> Result<(Either<CellType, usize>, String), SheetSyncError> {
    reader.skip(2)?;
    let index = reader.read_u32()? as usize;
    let value = shared_strings
        .get(index)
        .cloned()
        .ok_or(XlsError::SharedStringIndexError(index))?;
    Ok((Either::Left(CellType::String), value))
}

fn read_label_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SheetSyncError> {
    reader.skip(2)?;
    let value = reader.read_xl_unicode_string()?;
    Ok((Either::Left(CellType::String), value))
}

/// Reads the cached result of a formula.
/// A result whose top two bytes are `0xFFFF` is not a number; its low byte says what it is,
/// and a string result lives in the STRING record that follows.
fn read_formula_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SheetSyncError> {
    let index = reader.read_u16()? as usize;
    let formula = reader.read_u64()?;
    let is_number = (formula & 0xFFFF_0000_0000_0000) != 0xFFFF_0000_0000_0000;
    if is_number {
        return Ok((Either::Right(index), f64::from_bits(formula).to_string()));
    }
    match formula & 0xFF {
        0 => match reader.next()? {
            Some(STRING) => Ok((Either::Left(CellType::String), reader.read_xl_unicode_string()?)),
            _ => Err(XlsError::FormulaValueError(formula))?,
        },
        1 => {
            let value = if (formula >> 16) & 0xFF > 0 { "1" } else { "0" };
            Ok((Either::Left(CellType::Boolean), value.to_owned()))
        }
        2 => {
            let code = ((formula >> 16) & 0xFF) as u8;
            Ok((Either::Left(CellType::Error), to_error_value(code).to_owned()))
        }
        3 => Ok((Either::Left(CellType::String), String::new())),
        _ => Err(XlsError::FormulaValueError(formula))?,
    }
}
