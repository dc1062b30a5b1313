#![allow(dead_code)]

use async_trait::async_trait;
use quick_xml::escape::escape;
use sheet_sync::database::Datastore;
use sheet_sync::database::DatastoreError;
use sheet_sync::database::Direction;
use sheet_sync::database::Record;
use std::io::Cursor;
use std::io::Write;
use std::sync::Mutex;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const HEADERS: [&str; 5] = [
    "identifier-label",
    "component--field-formatter href",
    "component--field-formatter (4)",
    "component--field-formatter (6)",
    "component--field-formatter (5)",
];

/// An `.xlsx` workbook holding the lead export headers and `rows` leads, with inline strings.
pub fn lead_workbook(rows: usize) -> Vec<u8> {
    let mut sheet = String::from("<worksheet><sheetData>");
    sheet.push_str(&row(1, &HEADERS.map(str::to_owned)));
    for index in 0..rows {
        let values = [
            format!("Company {index}"),
            format!("https://company{index}.test"),
            "2024-05-01".to_owned(),
            format!("{}", (index + 1) * 1000),
            if index % 2 == 0 { "Seed".to_owned() } else { "Series A".to_owned() },
        ];
        sheet.push_str(&row(index + 2, &values));
    }
    sheet.push_str("</sheetData></worksheet>");

    let parts = [
        ("xl/_rels/workbook.xml.rels", concat!(
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
            r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>"#,
            r#"</Relationships>"#,
        ).to_owned()),
        ("xl/workbook.xml", concat!(
            r#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
            r#"<sheets><sheet name="Leads" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        ).to_owned()),
        ("xl/worksheets/sheet1.xml", sheet),
    ];
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in parts {
        writer.start_file(name, SimpleFileOptions::default()).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn row(number: usize, values: &[String]) -> String {
    let cells: String = values
        .iter()
        .enumerate()
        .map(|(col, value)| {
            let column = char::from(b'A' + col as u8);
            format!(r#"<c r="{column}{number}" t="inlineStr"><is><t>{}</t></is></c>"#, escape(value.as_str()))
        })
        .collect();
    format!(r#"<row r="{number}">{cells}</row>"#)
}

/// Keeps every inserted chunk and refuses the chunk at `fail_on`, counting from zero.
#[derive(Default)]
pub struct RecordingStore {
    pub chunks: Mutex<Vec<Vec<Record>>>,
    pub fail_on: Option<usize>,
}

impl RecordingStore {
    pub fn failing_on(chunk_index: usize) -> Self {
        RecordingStore { fail_on: Some(chunk_index), ..RecordingStore::default() }
    }

    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.chunks.lock().unwrap().iter().map(Vec::len).collect()
    }
}

#[async_trait]
impl Datastore for RecordingStore {
    async fn insert(&self, _table: &str, records: &[Record]) -> Result<(), DatastoreError> {
        let mut chunks = self.chunks.lock().unwrap();
        chunks.push(records.to_vec());
        if self.fail_on == Some(chunks.len() - 1) {
            return Err(DatastoreError::Rejected { status: 500, message: "insert failed".to_owned() });
        }
        Ok(())
    }

    async fn select(&self, _table: &str, _order_by: &str, _direction: Direction) -> Result<Vec<Record>, DatastoreError> {
        Ok(self.chunks.lock().unwrap().iter().flatten().cloned().collect())
    }
}
