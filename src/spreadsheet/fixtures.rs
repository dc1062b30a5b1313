//! In-memory workbook builders for the decoder tests.

use crate::spreadsheet::reference::index_to_reference;
use quick_xml::escape::escape;
use std::io::Cursor;
use std::io::Write;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
const FREE_SECTOR: u32 = 0xFFFF_FFFF;
const FAT_SECTOR: u32 = 0xFFFF_FFFD;
const SECTOR_SIZE: usize = 512;

/// Builds an `.xlsx` package with a single worksheet named `Sheet1`.
/// Style index 1 carries the built-in date format 14.
pub(crate) struct XlsxBuilder {
    rows: String,
    next_row: usize,
    shared_strings: Vec<String>,
    with_workbook: bool,
}

impl XlsxBuilder {
    pub(crate) fn new() -> Self {
        Self { rows: String::new(), next_row: 0, shared_strings: Vec::new(), with_workbook: true }
    }

    /// Appends a row of shared-string cells
    pub(crate) fn row(mut self, values: &[&str]) -> Self {
        let mut cells = String::new();
        for (col, value) in values.iter().enumerate() {
            let index = self.shared_strings.len();
            self.shared_strings.push((*value).to_owned());
            let reference = index_to_reference(self.next_row, col);
            cells.push_str(&format!(r#"<c r="{reference}" t="s"><v>{index}</v></c>"#));
        }
        self.raw_row(&cells)
    }

    /// Appends a row from raw `<c>` elements
    pub(crate) fn raw_row(mut self, cells: &str) -> Self {
        self.next_row += 1;
        self.rows.push_str(&format!(r#"<row r="{}">{}</row>"#, self.next_row, cells));
        self
    }

    /// Appends arbitrary `sheetData` content
    pub(crate) fn raw_xml(mut self, xml: &str) -> Self {
        self.rows.push_str(xml);
        self
    }

    pub(crate) fn without_workbook(mut self) -> Self {
        self.with_workbook = false;
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let shared_strings: String = self
            .shared_strings
            .iter()
            .map(|value| format!("<si><t>{}</t></si>", escape(value.as_str())))
            .collect();
        let mut parts = vec![
            ("[Content_Types].xml", r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#.to_owned()),
            ("xl/_rels/workbook.xml.rels", concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
                r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>"#,
                r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
                r#"</Relationships>"#,
            ).to_owned()),
            ("xl/styles.xml", r#"<styleSheet><cellXfs count="2"><xf numFmtId="0"/><xf numFmtId="14"/></cellXfs></styleSheet>"#.to_owned()),
            ("xl/sharedStrings.xml", format!("<sst>{shared_strings}</sst>")),
            ("xl/worksheets/sheet1.xml", format!("<worksheet><sheetData>{}</sheetData></worksheet>", self.rows)),
        ];
        if self.with_workbook {
            parts.push(("xl/workbook.xml", concat!(
                r#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
                r#"<workbookPr/><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
            ).to_owned()));
        }

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in parts {
            writer.start_file(name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }
}

/// Encodes one BIFF8 record
pub(crate) fn record(kind: u16, body: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(body.len() + 4);
    bytes.extend(kind.to_le_bytes());
    bytes.extend((body.len() as u16).to_le_bytes());
    bytes.extend(body);
    bytes
}

/// Builds a BIFF8 workbook stream with one worksheet named `Sheet1`.
pub(crate) struct Biff8Builder {
    shared_strings: Vec<String>,
    cells: Vec<u8>,
}

impl Biff8Builder {
    pub(crate) fn new() -> Self {
        Self { shared_strings: Vec::new(), cells: Vec::new() }
    }

    pub(crate) fn shared_strings(mut self, values: &[&str]) -> Self {
        self.shared_strings = values.iter().map(|value| (*value).to_owned()).collect();
        self
    }

    pub(crate) fn label_sst(self, row: u16, col: u16, index: u32) -> Self {
        self.cell(0x00FD, row, col, &index.to_le_bytes())
    }

    pub(crate) fn number(self, row: u16, col: u16, value: f64) -> Self {
        self.cell(0x0203, row, col, &value.to_le_bytes())
    }

    pub(crate) fn rk_integer(self, row: u16, col: u16, value: i32) -> Self {
        let rk = ((value << 2) as u32) | 0x02;
        self.cell(0x027E, row, col, &rk.to_le_bytes())
    }

    pub(crate) fn bool_err(self, row: u16, col: u16, value: u8, is_error: bool) -> Self {
        self.cell(0x0205, row, col, &[value, is_error as u8])
    }

    fn cell(mut self, kind: u16, row: u16, col: u16, payload: &[u8]) -> Self {
        let mut body = Vec::new();
        body.extend(row.to_le_bytes());
        body.extend(col.to_le_bytes());
        body.extend(0u16.to_le_bytes()); // XF index
        body.extend(payload);
        self.cells.extend(record(kind, &body));
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let globals_size = self.globals(0).len();
        let mut stream = self.globals(globals_size as u32);
        stream.extend(bof(0x0010));
        stream.extend(&self.cells);
        stream.extend(record(0x000A, &[]));
        stream
    }

    fn globals(&self, sheet_position: u32) -> Vec<u8> {
        let mut stream = bof(0x0005);

        let mut sheet = Vec::new();
        sheet.extend(sheet_position.to_le_bytes());
        sheet.extend([0, 0]); // visible worksheet
        sheet.extend([6, 0]);
        sheet.extend(b"Sheet1");
        stream.extend(record(0x0085, &sheet));

        let mut sst = Vec::new();
        sst.extend((self.shared_strings.len() as u32).to_le_bytes());
        sst.extend((self.shared_strings.len() as u32).to_le_bytes());
        for value in &self.shared_strings {
            sst.extend((value.len() as u16).to_le_bytes());
            sst.push(0);
            sst.extend(value.as_bytes());
        }
        stream.extend(record(0x00FC, &sst));
        stream.extend(record(0x000A, &[]));
        stream
    }
}

fn bof(substream: u16) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend(0x0600u16.to_le_bytes());
    body.extend(substream.to_le_bytes());
    body.extend([0u8; 12]);
    record(0x0809, &body)
}

/// Wraps `payload` as the only stream of a version 3 compound file.
/// Payloads shorter than the mini stream cutoff are zero padded to 4096 bytes
/// so the stream always lives in regular sectors.
pub(crate) fn compound_file(name: &str, payload: &[u8]) -> Vec<u8> {
    let mut stream = payload.to_vec();
    if stream.len() < 4096 {
        stream.resize(4096, 0);
    }
    let stream_sectors = stream.len().div_ceil(SECTOR_SIZE);
    assert!(stream_sectors + 2 <= SECTOR_SIZE / 4, "payload too large for a single FAT sector");

    let mut header = Vec::with_capacity(SECTOR_SIZE);
    header.extend([0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]);
    header.extend([0u8; 16]);
    header.extend(0x003Eu16.to_le_bytes());
    header.extend(3u16.to_le_bytes());
    header.extend(0xFFFEu16.to_le_bytes());
    header.extend(9u16.to_le_bytes());
    header.extend(6u16.to_le_bytes());
    header.extend([0u8; 6]);
    header.extend(0u32.to_le_bytes()); // directory sectors
    header.extend(1u32.to_le_bytes()); // FAT sectors
    header.extend(1u32.to_le_bytes()); // first directory sector
    header.extend(0u32.to_le_bytes());
    header.extend(4096u32.to_le_bytes());
    header.extend(END_OF_CHAIN.to_le_bytes()); // first mini FAT sector
    header.extend(0u32.to_le_bytes());
    header.extend(END_OF_CHAIN.to_le_bytes()); // first DIFAT sector
    header.extend(0u32.to_le_bytes());
    header.extend(0u32.to_le_bytes()); // DIFAT[0] = sector 0
    while header.len() < SECTOR_SIZE {
        header.extend(FREE_SECTOR.to_le_bytes());
    }

    let mut fat = vec![FAT_SECTOR, END_OF_CHAIN];
    fat.extend((3..stream_sectors as u32 + 2).collect::<Vec<u32>>());
    fat.push(END_OF_CHAIN);
    fat.resize(SECTOR_SIZE / 4, FREE_SECTOR);

    let mut directory = Vec::with_capacity(SECTOR_SIZE);
    directory.extend(directory_entry("Root Entry", 5, 1, END_OF_CHAIN, 0));
    directory.extend(directory_entry(name, 2, FREE_SECTOR, 2, stream.len() as u64));
    directory.resize(SECTOR_SIZE, 0);

    let mut bytes = header;
    bytes.extend(fat.iter().flat_map(|id| id.to_le_bytes()));
    bytes.extend(directory);
    bytes.extend(&stream);
    bytes.resize(SECTOR_SIZE * (stream_sectors + 3), 0);
    bytes
}

fn directory_entry(name: &str, kind: u8, child: u32, start: u32, size: u64) -> Vec<u8> {
    let mut entry = vec![0u8; 128];
    let units: Vec<u16> = name.encode_utf16().collect();
    for (index, unit) in units.iter().enumerate() {
        entry[index * 2..index * 2 + 2].copy_from_slice(&unit.to_le_bytes());
    }
    entry[64..66].copy_from_slice(&(((units.len() + 1) * 2) as u16).to_le_bytes());
    entry[66] = kind;
    entry[68..72].copy_from_slice(&FREE_SECTOR.to_le_bytes());
    entry[72..76].copy_from_slice(&FREE_SECTOR.to_le_bytes());
    entry[76..80].copy_from_slice(&child.to_le_bytes());
    entry[116..120].copy_from_slice(&start.to_le_bytes());
    entry[120..128].copy_from_slice(&size.to_le_bytes());
    entry
}
