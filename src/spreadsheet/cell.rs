use crate::error::SheetSyncError;
use crate::spreadsheet::reference::index_to_reference;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::TimeDelta;
use std::fmt::Display;

/// A decoded cell value as handed to the rest of the pipeline.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    #[default]
    Empty,
}

impl CellValue {
    /// True for `Empty` and for text with no characters.
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Text(text) => text.is_empty(),
            CellValue::Number(_) => false,
            CellValue::Empty => true,
        }
    }
}

impl Display for CellValue {
    /// Numbers use the shortest round-trip form, so `120.0` renders as `120`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Text(text) => f.write_str(text),
            CellValue::Number(number) => write!(f, "{}", number),
            CellValue::Empty => Ok(()),
        }
    }
}

/// Storage kinds of a cell as recorded in the workbook.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    Boolean,
    Number,
    /// Date/time values stored as numbers from 1900 epoch
    NumberDateTime1900,
    NumberDate1900,
    NumberTime1900,
    /// Date/time values stored as numbers from 1904 epoch
    NumberDateTime1904,
    NumberDate1904,
    NumberTime1904,
    /// ISO 8601 date/time strings (`t="d"` cells)
    IsoDateTime,
    String,
    Error,
}

impl CellType {
    /// Maps the built-in number format ids that denote dates or times.
    pub(crate) fn parse_builtin_number_format_id(id: &str, is_1904: bool) -> Option<Self> {
        match id {
            "22" => Some(if is_1904 { Self::NumberDateTime1904 } else { Self::NumberDateTime1900 }),
            "14" | "15" | "16" | "17" => Some(if is_1904 { Self::NumberDate1904 } else { Self::NumberDate1900 }),
            "18" | "19" | "20" | "21" | "45" | "46" | "47" => Some(if is_1904 { Self::NumberTime1904 } else { Self::NumberTime1900 }),
            _ => None,
        }
    }

    /// Classifies a custom format code by the date and time tokens outside
    /// quoted literals, escapes and bracketed sections.
    pub(crate) fn parse_custom_number_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_bracket = false;
        let mut is_date = false;
        let mut is_time = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_bracket => is_literal = true,

                ']' if is_bracket => is_bracket = false,
                '[' if !is_literal => is_bracket = true,
                _ if is_literal || is_bracket => (),

                'Y' | 'y' | 'D' | 'd' => is_date = true,
                'H' | 'h' | 'S' | 's' => is_time = true,
                _ => (),
            }
        }

        match (is_date, is_time, is_1904) {
            (true, true, false) => Self::NumberDateTime1900,
            (true, true, true) => Self::NumberDateTime1904,
            (true, false, false) => Self::NumberDate1900,
            (true, false, true) => Self::NumberDate1904,
            (false, true, false) => Self::NumberTime1900,
            (false, true, true) => Self::NumberTime1904,
            (false, false, _) => Self::Number,
        }
    }
}

/// Converts Excel error codes to their literal form.
pub(crate) fn to_error_value(value: u8) -> &'static str {
    match value {
        0x00 => "#NULL!",
        0x07 => "#DIV/0!",
        0x0F => "#VALUE!",
        0x17 => "#REF!",
        0x1D => "#NAME?",
        0x24 => "#NUM!",
        0x2A => "#N/A",
        0x2B => "#GETTING_DATA",
        _ => "#ERROR!",
    }
}

/// A single raw cell in a sheet, zero-based position.
#[derive(Clone, Debug)]
pub(crate) struct Cell {
    pub(crate) row: usize,
    pub(crate) col: usize,
    pub(crate) kind: CellType,
    /// Stored text; numbers as decimal, booleans as `1`/`0`
    pub(crate) value: String,
}

impl Cell {
    pub(crate) fn reference(&self) -> String {
        index_to_reference(self.row, self.col)
    }

    /// Interprets the raw text according to the cell kind.
    pub(crate) fn to_value(&self) -> Result<CellValue, SheetSyncError> {
        let value = match self.kind {
            CellType::Empty => CellValue::Empty,
            CellType::Boolean => {
                let flag = self.value == "1" || self.value.eq_ignore_ascii_case("true");
                CellValue::Text(flag.to_string())
            }
            CellType::Number => CellValue::Number(self.to_double()?),
            CellType::NumberDate1900 => CellValue::Text(self.to_datetime(false)?.format("%Y-%m-%d").to_string()),
            CellType::NumberDate1904 => CellValue::Text(self.to_datetime(true)?.format("%Y-%m-%d").to_string()),
            CellType::NumberTime1900 | CellType::NumberTime1904 => {
                CellValue::Text(self.to_datetime(false)?.format("%H:%M:%S").to_string())
            }
            CellType::NumberDateTime1900 => CellValue::Text(self.to_datetime(false)?.format("%Y-%m-%d %H:%M:%S").to_string()),
            CellType::NumberDateTime1904 => CellValue::Text(self.to_datetime(true)?.format("%Y-%m-%d %H:%M:%S").to_string()),
            CellType::IsoDateTime => CellValue::Text(self.value.replace('T', " ")),
            CellType::String | CellType::Error => CellValue::Text(self.value.to_owned()),
        };
        Ok(value)
    }

    fn to_double(&self) -> Result<f64, SheetSyncError> {
        self.value.trim().parse::<f64>().map_err(|_| {
            SheetSyncError::WithContextError(format!("{}: invalid number '{}'", self.reference(), self.value))
        })
    }

    /// Converts a serial day number to a timestamp, rounded to the second.
    /// Serials below 60 are shifted by a day to undo the phantom 1900-02-29.
    fn to_datetime(&self, is_1904: bool) -> Result<NaiveDateTime, SheetSyncError> {
        let serial = self.to_double()?;
        let offset_days = if is_1904 {
            1462
        } else if serial < 60.0 {
            1
        } else {
            0
        };
        NaiveDate::from_ymd_opt(1899, 12, 30)
            .and_then(|epoch| epoch.and_hms_opt(0, 0, 0))
            .zip(TimeDelta::try_seconds((serial * 86_400.0).round() as i64))
            .zip(TimeDelta::try_days(offset_days))
            .and_then(|((epoch, seconds), days)| epoch.checked_add_signed(seconds)?.checked_add_signed(days))
            .ok_or_else(|| {
                SheetSyncError::WithContextError(format!("{}: invalid date serial '{}'", self.reference(), self.value))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(kind: CellType, value: &str) -> Cell {
        Cell { row: 1, col: 2, kind, value: value.to_owned() }
    }

    #[test]
    fn numbers_render_without_trailing_zero() {
        assert_eq!(cell(CellType::Number, "120").to_value().unwrap(), CellValue::Number(120.0));
        assert_eq!(CellValue::Number(120.0).to_string(), "120");
        assert_eq!(CellValue::Number(2.5).to_string(), "2.5");
    }

    #[test]
    fn dates_render_as_iso_text() {
        let value = cell(CellType::NumberDate1900, "45000").to_value().unwrap();
        assert_eq!(value, CellValue::Text("2023-03-15".to_owned()));

        let value = cell(CellType::NumberDateTime1900, "45000.5").to_value().unwrap();
        assert_eq!(value, CellValue::Text("2023-03-15 12:00:00".to_owned()));

        let value = cell(CellType::NumberTime1900, "0.75").to_value().unwrap();
        assert_eq!(value, CellValue::Text("18:00:00".to_owned()));

        let value = cell(CellType::NumberDate1904, "0").to_value().unwrap();
        assert_eq!(value, CellValue::Text("1904-01-01".to_owned()));

        let value = cell(CellType::NumberDate1900, "1").to_value().unwrap();
        assert_eq!(value, CellValue::Text("1900-01-01".to_owned()));
    }

    #[test]
    fn booleans_errors_and_strings_become_text() {
        assert_eq!(cell(CellType::Boolean, "1").to_value().unwrap(), CellValue::Text("true".to_owned()));
        assert_eq!(cell(CellType::Boolean, "0").to_value().unwrap(), CellValue::Text("false".to_owned()));
        assert_eq!(cell(CellType::Error, "#N/A").to_value().unwrap(), CellValue::Text("#N/A".to_owned()));
        assert_eq!(cell(CellType::IsoDateTime, "2024-01-02T03:04:05").to_value().unwrap(), CellValue::Text("2024-01-02 03:04:05".to_owned()));
    }

    #[test]
    fn invalid_number_names_the_cell() {
        let error = cell(CellType::Number, "abc").to_value().unwrap_err();
        assert_eq!(error.to_string(), "C2: invalid number 'abc'");
    }

    #[test]
    fn classifies_custom_formats() {
        assert_eq!(CellType::parse_custom_number_format("yyyy-mm-dd", false), CellType::NumberDate1900);
        assert_eq!(CellType::parse_custom_number_format("hh:mm", true), CellType::NumberTime1904);
        assert_eq!(CellType::parse_custom_number_format("d/m/yy h:mm", false), CellType::NumberDateTime1900);
        assert_eq!(CellType::parse_custom_number_format("[Red]#,##0.00", false), CellType::Number);
        assert_eq!(CellType::parse_custom_number_format("0.0\"days\"", false), CellType::Number);
    }

    #[test]
    fn empty_values() {
        assert!(CellValue::Empty.is_empty());
        assert!(CellValue::Text(String::new()).is_empty());
        assert!(!CellValue::Number(0.0).is_empty());
    }
}
