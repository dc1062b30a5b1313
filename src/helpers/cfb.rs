//! OLE Compound File Binary (CFB) reader for legacy Excel (.xls) workbooks.
//! The whole file is held in memory and streams are reassembled by following
//! the sector allocation chains.

use crate::error::SheetSyncError;
use crate::helpers::string::u16_at;
use crate::helpers::string::u32_at;
use crate::helpers::string::u32_words;
use crate::helpers::string::u64_at;
use encoding_rs::UTF_16LE;
use std::collections::HashMap;
use thiserror::Error;

const SIGNATURE: u64 = 0xE11A_B1A1_E011_CFD0;
const HEADER_SIZE: usize = 512;
const DIRECTORY_ENTRY_SIZE: usize = 128;
const MINI_SECTOR_SIZE: usize = 64;
const MINI_STREAM_CUTOFF: u64 = 4096;

// Sector ids above this value are markers (free, end of chain, FAT, DIFAT)
const MAX_REG_SECT: u32 = 0xFFFF_FFFA;
const END_OF_CHAIN: u32 = 0xFFFF_FFFE;

// Directory object types
const STORAGE_OBJECT: u8 = 1;
const STREAM_OBJECT: u8 = 2;
const ROOT_STORAGE_OBJECT: u8 = 5;

/// Errors specific to Compound File Binary format parsing
#[derive(Error, Debug)]
pub(crate) enum CfbError {
    #[error("The file is corrupted or has an invalid CFB structure")]
    FileFormatError,

    #[error("Invalid OLE signature (not an office document?)")]
    OleSignatureError,

    #[error("Invalid Sector size '2 ^ {1}' for major version '{0}'")]
    SectorSizeError(u16, u16),

    #[error("Sector '{0}' lies outside the file")]
    SectorOutOfRangeError(u32),

    #[error("Sector chain starting at '{0}' does not terminate")]
    SectorChainLoopError(u32),

    #[error("The number of file allocation table sectors is wrong: expect '{0}', actual '{1}'")]
    FileAllocationTableError(usize, usize),

    #[error("Empty Root directory")]
    RootDirectoryError,
}

/// An in-memory compound file with its allocation tables and directory
pub(crate) struct Cfb {
    data: Vec<u8>,
    sector_size: usize,
    file_allocation_table: Vec<u32>,
    mini_file_allocation_table: Vec<u32>,
    mini_stream: Vec<u8>,
    entries: HashMap<String, Entry>,
}

/// Location of one stream inside the compound file
#[derive(Debug, Clone, Copy)]
struct Entry {
    start: u32,
    size: u64,
}

impl Cfb {
    /// Parses a compound file that is already in memory
    pub(crate) fn from_bytes(data: Vec<u8>) -> Result<Cfb, SheetSyncError> {
        if data.len() < HEADER_SIZE {
            Err(CfbError::FileFormatError)?;
        }
        let header = Header::parse(&data[..HEADER_SIZE])?;
        let mut cfb = Cfb {
            sector_size: header.sector_size()?,
            data,
            file_allocation_table: Vec::new(),
            mini_file_allocation_table: Vec::new(),
            mini_stream: Vec::new(),
            entries: HashMap::new(),
        };
        cfb.file_allocation_table = cfb.load_file_allocation_table(&header)?;
        cfb.entries = cfb.load_entries(header.directory_start)?;
        if header.mini_file_allocation_table_count > 0 {
            let table = cfb.read_chain(header.mini_file_allocation_table_start)?;
            cfb.mini_file_allocation_table = u32_words(&table).collect();
        }
        if let Some(root) = cfb.entries.get("Root Entry").copied() {
            let mut stream = cfb.read_chain(root.start)?;
            stream.truncate(root.size as usize);
            cfb.mini_stream = stream;
        }
        Ok(cfb)
    }

    /// Checks if a stream or storage exists in the directory
    pub(crate) fn exists(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Reads the contents of the named stream
    pub(crate) fn read(&self, name: &str) -> Result<Option<Vec<u8>>, SheetSyncError> {
        let Some(entry) = self.entries.get(name) else {
            return Ok(None);
        };
        let mut bytes = if entry.size < MINI_STREAM_CUTOFF {
            self.read_mini_chain(entry.start)?
        } else {
            self.read_chain(entry.start)?
        };
        if (bytes.len() as u64) < entry.size {
            Err(CfbError::FileFormatError)?;
        }
        bytes.truncate(entry.size as usize);
        Ok(Some(bytes))
    }

    /// Collects the FAT sectors listed by the header DIFAT and any DIFAT sectors chained after it
    fn load_file_allocation_table(&self, header: &Header) -> Result<Vec<u32>, SheetSyncError> {
        let mut sector_ids: Vec<u32> = u32_words(&self.data[76..HEADER_SIZE]).collect();
        let mut next = header.double_indirect_file_allocation_table_start;
        let mut visited = 0usize;
        while next <= MAX_REG_SECT {
            if visited >= header.double_indirect_file_allocation_table_count {
                Err(CfbError::SectorChainLoopError(header.double_indirect_file_allocation_table_start))?;
            }
            let mut words: Vec<u32> = u32_words(self.sector(next)?).collect();
            next = words.pop().unwrap_or(END_OF_CHAIN);
            sector_ids.extend(words);
            visited += 1;
        }

        let mut table = Vec::new();
        let mut loaded = 0usize;
        for id in sector_ids.into_iter().filter(|id| *id <= MAX_REG_SECT) {
            table.extend(u32_words(self.sector(id)?));
            loaded += 1;
        }
        if loaded != header.file_allocation_table_count {
            Err(CfbError::FileAllocationTableError(header.file_allocation_table_count, loaded))?;
        }
        Ok(table)
    }

    /// Reads the directory stream and indexes the entries in use by name
    fn load_entries(&self, start: u32) -> Result<HashMap<String, Entry>, SheetSyncError> {
        let bytes = self.read_chain(start)?;
        let entries: HashMap<String, Entry> = bytes
            .chunks_exact(DIRECTORY_ENTRY_SIZE)
            .filter_map(|raw| self.parse_entry(raw))
            .collect();
        if entries.is_empty() {
            Err(CfbError::RootDirectoryError)?;
        }
        Ok(entries)
    }

    fn parse_entry(&self, raw: &[u8]) -> Option<(String, Entry)> {
        let kind = raw[66];
        if !matches!(kind, STORAGE_OBJECT | STREAM_OBJECT | ROOT_STORAGE_OBJECT) {
            return None;
        }
        let length = (u16_at(raw, 64)? as usize).min(64);
        let (name, _, _) = UTF_16LE.decode(&raw[..length]);
        let name = name.split('\0').next().unwrap_or_default().to_owned();
        let start = u32_at(raw, 116)?;
        let mut size = u64_at(raw, 120)?;
        if self.sector_size == 512 {
            // Version 3 files only define the low 32 bits of the stream size
            size &= 0xFFFF_FFFF;
        }
        Some((name, Entry { start, size }))
    }

    /// Returns the bytes of a regular sector; the final sector may be short
    fn sector(&self, id: u32) -> Result<&[u8], SheetSyncError> {
        let lower = (id as usize + 1)
            .checked_mul(self.sector_size)
            .ok_or(CfbError::SectorOutOfRangeError(id))?;
        if lower >= self.data.len() {
            Err(CfbError::SectorOutOfRangeError(id))?;
        }
        let upper = self.data.len().min(lower + self.sector_size);
        Ok(&self.data[lower..upper])
    }

    /// Concatenates the regular sectors of the chain starting at `start`
    fn read_chain(&self, start: u32) -> Result<Vec<u8>, SheetSyncError> {
        let mut content = Vec::new();
        let mut id = start;
        let mut steps = 0usize;
        while id <= MAX_REG_SECT {
            if steps > self.file_allocation_table.len() {
                Err(CfbError::SectorChainLoopError(start))?;
            }
            content.extend_from_slice(self.sector(id)?);
            id = *self
                .file_allocation_table
                .get(id as usize)
                .ok_or(CfbError::SectorOutOfRangeError(id))?;
            steps += 1;
        }
        Ok(content)
    }

    /// Concatenates the 64-byte mini sectors of the chain starting at `start`
    fn read_mini_chain(&self, start: u32) -> Result<Vec<u8>, SheetSyncError> {
        let mut content = Vec::new();
        let mut id = start;
        let mut steps = 0usize;
        while id <= MAX_REG_SECT {
            if steps > self.mini_file_allocation_table.len() {
                Err(CfbError::SectorChainLoopError(start))?;
            }
            let lower = id as usize * MINI_SECTOR_SIZE;
            let upper = self.mini_stream.len().min(lower + MINI_SECTOR_SIZE);
            if lower >= upper {
                Err(CfbError::SectorOutOfRangeError(id))?;
            }
            content.extend_from_slice(&self.mini_stream[lower..upper]);
            id = *self
                .mini_file_allocation_table
                .get(id as usize)
                .ok_or(CfbError::SectorOutOfRangeError(id))?;
            steps += 1;
        }
        Ok(content)
    }
}

/// The fields of the 512-byte CFB header this reader relies on
#[derive(Debug)]
struct Header {
    major_version: u16,
    sector_shift: u16,
    file_allocation_table_count: usize,
    directory_start: u32,
    mini_file_allocation_table_start: u32,
    mini_file_allocation_table_count: usize,
    double_indirect_file_allocation_table_start: u32,
    double_indirect_file_allocation_table_count: usize,
}

impl Header {
    fn parse(data: &[u8]) -> Result<Self, SheetSyncError> {
        let field = |offset: usize| u32_at(data, offset).ok_or(CfbError::FileFormatError);
        if u64_at(data, 0) != Some(SIGNATURE) {
            Err(CfbError::OleSignatureError)?;
        }
        Ok(Header {
            major_version: u16_at(data, 26).ok_or(CfbError::FileFormatError)?,
            sector_shift: u16_at(data, 30).ok_or(CfbError::FileFormatError)?,
            file_allocation_table_count: field(44)? as usize,
            directory_start: field(48)?,
            mini_file_allocation_table_start: field(60)?,
            mini_file_allocation_table_count: field(64)? as usize,
            double_indirect_file_allocation_table_start: field(68)?,
            double_indirect_file_allocation_table_count: field(72)? as usize,
        })
    }

    fn sector_size(&self) -> Result<usize, SheetSyncError> {
        match (self.major_version, self.sector_shift) {
            (3, 0x0009) => Ok(512),
            // Version 4 pads the rest of the first 4096-byte sector with zeroes
            (4, 0x000C) => Ok(4096),
            (major, shift) => Err(CfbError::SectorSizeError(major, shift))?,
        }
    }
}

/// Tells whether `bytes` starts with the compound file signature
pub(crate) fn has_signature(bytes: &[u8]) -> bool {
    u64_at(bytes, 0) == Some(SIGNATURE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::fixtures::compound_file;

    #[test]
    fn reads_stream_from_regular_sectors() {
        let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let cfb = Cfb::from_bytes(compound_file("Workbook", &payload)).unwrap();

        assert!(cfb.exists("Root Entry"));
        assert!(cfb.exists("Workbook"));
        assert!(!cfb.exists("Book"));
        assert_eq!(cfb.read("Workbook").unwrap().unwrap(), payload);
        assert!(cfb.read("Book").unwrap().is_none());
    }

    #[test]
    fn rejects_foreign_signature() {
        let mut bytes = compound_file("Workbook", &[0u8; 4096]);
        bytes[0] = 0x50;
        assert!(matches!(
            Cfb::from_bytes(bytes),
            Err(SheetSyncError::CfbHelperError(CfbError::OleSignatureError))
        ));
    }

    #[test]
    fn rejects_truncated_file() {
        assert!(matches!(
            Cfb::from_bytes(vec![0u8; 100]),
            Err(SheetSyncError::CfbHelperError(CfbError::FileFormatError))
        ));

        let mut bytes = compound_file("Workbook", &[0u8; 4096]);
        bytes.truncate(HEADER_SIZE + 512);
        assert!(Cfb::from_bytes(bytes).is_err());
    }

    #[test]
    fn detects_signature() {
        assert!(has_signature(&compound_file("Workbook", &[0u8; 4096])));
        assert!(!has_signature(b"PK\x03\x04rest"));
        assert!(!has_signature(b"short"));
    }
}
