//! Projection of raw sheet rows onto the lead record shape.

use crate::spreadsheet::CellValue;
use crate::spreadsheet::RawRow;
use serde::Deserialize;
use serde::Serialize;
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("Unknown lead field '{0}'")]
    UnknownField(String),

    #[error("Invalid column mapping '{0}', expected field=Header")]
    InvalidOverride(String),
}

/// The five fields a lead carries out of the spreadsheet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LeadField {
    CompanyName,
    WebsiteUrl,
    FundingDate,
    FundingAmount,
    FundingRound,
}

impl LeadField {
    pub const ALL: [LeadField; 5] = [
        LeadField::CompanyName,
        LeadField::WebsiteUrl,
        LeadField::FundingDate,
        LeadField::FundingAmount,
        LeadField::FundingRound,
    ];

    /// Column name in the datastore
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadField::CompanyName => "company_name",
            LeadField::WebsiteUrl => "website_url",
            LeadField::FundingDate => "funding_date",
            LeadField::FundingAmount => "funding_amount",
            LeadField::FundingRound => "funding_round",
        }
    }
}

impl Display for LeadField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadField {
    type Err = MappingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        LeadField::ALL
            .into_iter()
            .find(|field| field.as_str() == value)
            .ok_or_else(|| MappingError::UnknownField(value.to_owned()))
    }
}

/// A `field=Header` pair as given on the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnOverride {
    pub field: LeadField,
    pub header: String,
}

impl FromStr for ColumnOverride {
    type Err = MappingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (field, header) = value
            .split_once('=')
            .ok_or_else(|| MappingError::InvalidOverride(value.to_owned()))?;
        if header.is_empty() {
            return Err(MappingError::InvalidOverride(value.to_owned()));
        }
        Ok(ColumnOverride { field: field.trim().parse()?, header: header.to_owned() })
    }
}

/// A lead as produced from one spreadsheet row, serialized with exactly these five keys.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedRecord {
    pub company_name: String,
    pub website_url: String,
    pub funding_date: String,
    pub funding_amount: String,
    pub funding_round: String,
}

impl MappedRecord {
    pub const FIELD_COUNT: usize = LeadField::ALL.len();

    pub fn get(&self, field: LeadField) -> &str {
        match field {
            LeadField::CompanyName => &self.company_name,
            LeadField::WebsiteUrl => &self.website_url,
            LeadField::FundingDate => &self.funding_date,
            LeadField::FundingAmount => &self.funding_amount,
            LeadField::FundingRound => &self.funding_round,
        }
    }

    fn slot(&mut self, field: LeadField) -> &mut String {
        match field {
            LeadField::CompanyName => &mut self.company_name,
            LeadField::WebsiteUrl => &mut self.website_url,
            LeadField::FundingDate => &mut self.funding_date,
            LeadField::FundingAmount => &mut self.funding_amount,
            LeadField::FundingRound => &mut self.funding_round,
        }
    }
}

/// Declarative header-to-field table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldMapper {
    columns: Vec<(LeadField, String)>,
}

impl Default for FieldMapper {
    /// Headers of the lead export sheets this tool was built around
    fn default() -> Self {
        FieldMapper {
            columns: vec![
                (LeadField::CompanyName, "identifier-label".to_owned()),
                (LeadField::WebsiteUrl, "component--field-formatter href".to_owned()),
                (LeadField::FundingDate, "component--field-formatter (4)".to_owned()),
                (LeadField::FundingAmount, "component--field-formatter (6)".to_owned()),
                (LeadField::FundingRound, "component--field-formatter (5)".to_owned()),
            ],
        }
    }
}

impl FieldMapper {
    /// Replaces the source header of one field
    pub fn with_column(mut self, field: LeadField, header: impl Into<String>) -> Self {
        let header = header.into();
        match self.columns.iter_mut().find(|(existing, _)| *existing == field) {
            Some((_, source)) => *source = header,
            None => self.columns.push((field, header)),
        }
        self
    }

    pub fn with_overrides<'a>(self, overrides: impl IntoIterator<Item = &'a ColumnOverride>) -> Self {
        overrides
            .into_iter()
            .fold(self, |mapper, column| mapper.with_column(column.field, column.header.clone()))
    }

    pub fn header(&self, field: LeadField) -> Option<&str> {
        self.columns
            .iter()
            .find(|(existing, _)| *existing == field)
            .map(|(_, header)| header.as_str())
    }

    /// Missing or empty cells become empty strings; numbers lose a trailing `.0`.
    pub fn map_row(&self, row: &RawRow) -> MappedRecord {
        let mut record = MappedRecord::default();
        for (field, header) in &self.columns {
            *record.slot(*field) = row
                .get(header)
                .map(CellValue::to_string)
                .unwrap_or_default();
        }
        record
    }

    pub fn map_rows(&self, rows: &[RawRow]) -> Vec<MappedRecord> {
        rows.iter().map(|row| self.map_row(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[(&str, CellValue)]) -> RawRow {
        cells
            .iter()
            .map(|(header, value)| ((*header).to_owned(), value.clone()))
            .collect()
    }

    fn text(value: &str) -> CellValue {
        CellValue::Text(value.to_owned())
    }

    #[test]
    fn maps_default_headers() {
        let row = row(&[
            ("identifier-label", text("Acme")),
            ("component--field-formatter href", text("https://acme.test")),
            ("component--field-formatter (4)", text("2024-05-01")),
            ("component--field-formatter (6)", CellValue::Number(2_500_000.0)),
            ("component--field-formatter (5)", text("Seed")),
            ("unrelated", text("ignored")),
        ]);

        assert_eq!(FieldMapper::default().map_row(&row), MappedRecord {
            company_name: "Acme".to_owned(),
            website_url: "https://acme.test".to_owned(),
            funding_date: "2024-05-01".to_owned(),
            funding_amount: "2500000".to_owned(),
            funding_round: "Seed".to_owned(),
        });
    }

    #[test]
    fn absent_and_empty_cells_become_empty_strings() {
        let row = row(&[("identifier-label", CellValue::Empty), ("component--field-formatter (6)", CellValue::Number(0.0))]);
        let record = FieldMapper::default().map_row(&row);

        assert_eq!(record.company_name, "");
        assert_eq!(record.website_url, "");
        assert_eq!(record.funding_amount, "0");
    }

    #[test]
    fn overrides_replace_a_single_column() {
        let mapper = FieldMapper::default().with_overrides(&["company_name=Company".parse::<ColumnOverride>().unwrap()]);
        let record = mapper.map_row(&row(&[("Company", text("Globex")), ("identifier-label", text("Acme"))]));

        assert_eq!(record.company_name, "Globex");
        assert_eq!(mapper.header(LeadField::WebsiteUrl), Some("component--field-formatter href"));
    }

    #[test]
    fn parses_overrides() {
        assert_eq!(
            "funding_round=Round = Stage".parse::<ColumnOverride>(),
            Ok(ColumnOverride { field: LeadField::FundingRound, header: "Round = Stage".to_owned() })
        );
        assert_eq!("score=Score".parse::<ColumnOverride>(), Err(MappingError::UnknownField("score".to_owned())));
        assert!(matches!("company_name".parse::<ColumnOverride>(), Err(MappingError::InvalidOverride(_))));
        assert!(matches!("company_name=".parse::<ColumnOverride>(), Err(MappingError::InvalidOverride(_))));
    }

    #[test]
    fn preserves_row_order_and_serializes_five_keys() {
        let rows = vec![row(&[("identifier-label", text("a"))]), row(&[("identifier-label", text("b"))])];
        let records = FieldMapper::default().map_rows(&rows);
        assert_eq!(records.iter().map(|record| record.get(LeadField::CompanyName)).collect::<Vec<_>>(), vec!["a", "b"]);

        let json = serde_json::to_value(&records[0]).unwrap();
        assert_eq!(json.as_object().unwrap().len(), MappedRecord::FIELD_COUNT);
    }
}
