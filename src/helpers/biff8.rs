//! Microsoft Office Binary Interchange File Format (BIFF8)
//! Record reader for the Excel 97-2003 workbook stream.
//! A logical record is the record itself plus any CONTINUE records that follow it;
//! reads walk across those fragments transparently.

use crate::error::SheetSyncError;
use crate::helpers::string::f64_at;
use crate::helpers::string::u16_at;
use crate::helpers::string::u32_at;
use crate::helpers::string::u64_at;
use encoding_rs::Encoding;
use std::ops::Range;
use thiserror::Error;

const CONTINUE: u16 = 60;
const RECORD_HEADER_SIZE: usize = 4;

/// Errors specific to BIFF8 format parsing
#[derive(Error, Debug)]
pub(crate) enum Biff8Error {
    #[error("Fewer than {0} bytes remaining in record")]
    NoEnoughDataError(usize),
}

/// Reader for BIFF8 records in a workbook stream
pub(crate) struct Biff8Reader {
    /// Encoding of compressed byte strings, replaced when a CODEPAGE record is seen
    pub(crate) encoding: &'static Encoding,
    stream: Vec<u8>,
    /// Position of the next record header in the stream
    next_record: usize,
    /// Byte ranges of the current record and its CONTINUE fragments
    fragments: Vec<Range<usize>>,
    fragment: usize,
    offset: usize,
}

impl Biff8Reader {
    pub(crate) fn new(stream: Vec<u8>) -> Biff8Reader {
        Biff8Reader {
            encoding: encoding_rs::UTF_16LE,
            stream,
            next_record: 0,
            fragments: Vec::new(),
            fragment: 0,
            offset: 0,
        }
    }

    /// Advances to the next record and returns its type, or `None` at the end of the stream
    pub(crate) fn next(&mut self) -> Result<Option<u16>, SheetSyncError> {
        let Some((kind, body)) = self.record_at(self.next_record) else {
            return Ok(None);
        };
        self.fragment = 0;
        self.offset = 0;
        self.fragments.clear();
        self.next_record = body.end;
        self.fragments.push(body);
        while let Some((CONTINUE, body)) = self.record_at(self.next_record) {
            self.next_record = body.end;
            self.fragments.push(body);
        }
        Ok(Some(kind))
    }

    /// Repositions the reader so the next call to [`next`](Self::next) reads the record at `position`
    pub(crate) fn goto(&mut self, position: usize) {
        self.next_record = position;
        self.fragments.clear();
    }

    /// Type and body range of the record whose header starts at `position`
    fn record_at(&self, position: usize) -> Option<(u16, Range<usize>)> {
        let kind = u16_at(&self.stream, position)?;
        let size = u16_at(&self.stream, position + 2)? as usize;
        let lower = position + RECORD_HEADER_SIZE;
        let upper = lower + size;
        (upper <= self.stream.len()).then_some((kind, lower..upper))
    }

    /// Takes up to `length` bytes from the current fragment only
    fn take(&mut self, length: usize) -> &[u8] {
        let Some(fragment) = self.fragments.get(self.fragment) else {
            return &[];
        };
        let lower = fragment.start + self.offset;
        let upper = fragment.end.min(lower + length);
        if upper == fragment.end {
            self.fragment += 1;
            self.offset = 0;
        } else {
            self.offset += upper - lower;
        }
        &self.stream[lower..upper]
    }

    /// Takes exactly `length` bytes, failing when the fragment runs out
    fn take_exact(&mut self, length: usize) -> Result<&[u8], SheetSyncError> {
        let bytes = self.take(length);
        if bytes.len() == length {
            Ok(bytes)
        } else {
            Err(Biff8Error::NoEnoughDataError(length))?
        }
    }

    pub(crate) fn skip(&mut self, length: usize) -> Result<(), SheetSyncError> {
        self.take_exact(length).map(|_| ())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, SheetSyncError> {
        self.take_exact(1).map(|bytes| bytes[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, SheetSyncError> {
        let bytes = self.take_exact(2)?;
        Ok(u16_at(bytes, 0).unwrap_or_default())
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, SheetSyncError> {
        let bytes = self.take_exact(4)?;
        Ok(u32_at(bytes, 0).unwrap_or_default())
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, SheetSyncError> {
        let bytes = self.take_exact(8)?;
        Ok(u64_at(bytes, 0).unwrap_or_default())
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64, SheetSyncError> {
        let bytes = self.take_exact(8)?;
        Ok(f64_at(bytes, 0).unwrap_or_default())
    }

    /// Reads the last `u16` of the current record, used by MULRK for its last column
    pub(crate) fn last_u16(&self) -> Result<u16, SheetSyncError> {
        self.fragments
            .last()
            .filter(|fragment| fragment.len() >= 2)
            .and_then(|fragment| u16_at(&self.stream, fragment.end - 2))
            .ok_or_else(|| Biff8Error::NoEnoughDataError(2).into())
    }

    /// Reads an RK number, the compressed numeric format of RK and MULRK records
    pub(crate) fn read_rk_number(&mut self) -> Result<f64, SheetSyncError> {
        let raw = self.read_u32()?;
        let is_percentage = raw & 0x01 != 0;
        let is_integer = raw & 0x02 != 0;
        let value = if is_integer {
            ((raw as i32) >> 2) as f64
        } else {
            f64::from_bits(((raw & 0xFFFF_FFFC) as u64) << 32)
        };
        Ok(if is_percentage { value / 100.0 } else { value })
    }

    /// Reads a string with a one byte character count (ShortXLUnicodeString)
    pub(crate) fn read_short_xl_unicode_string(&mut self) -> Result<String, SheetSyncError> {
        let chars = self.read_u8()? as usize;
        let mut string = String::new();
        self.read_characters(chars, false, &mut string)?;
        Ok(string)
    }

    /// Reads a string with a two byte character count (XLUnicodeString)
    pub(crate) fn read_xl_unicode_string(&mut self) -> Result<String, SheetSyncError> {
        let chars = self.read_u16()? as usize;
        let mut string = String::new();
        self.read_characters(chars, false, &mut string)?;
        Ok(string)
    }

    /// Reads a shared string table entry (XLUnicodeRichExtendedString), which may be split
    /// over CONTINUE fragments with a fresh option byte at each split
    pub(crate) fn read_xl_unicode_rich_extended_string(&mut self) -> Result<String, SheetSyncError> {
        let mut remaining = self.read_u16()? as usize;
        let mut string = String::new();
        let mut read = self.read_characters(remaining, true, &mut string)?;
        while read < remaining {
            remaining -= read;
            read = self.read_characters(remaining, false, &mut string)?;
            if read == 0 {
                Err(Biff8Error::NoEnoughDataError(remaining))?;
            }
        }
        Ok(string)
    }

    /// Appends up to `chars` characters to `content` and returns how many were read
    fn read_characters(&mut self, chars: usize, is_extended: bool, content: &mut String) -> Result<usize, SheetSyncError> {
        let options = self.read_u8()?;
        let is_high_byte = options & 0x01 != 0;
        let runs = if is_extended && options & 0x08 != 0 {
            self.read_u16()? as usize
        } else {
            0
        };
        let phonetic_size = if is_extended && options & 0x04 != 0 {
            self.read_u32()? as usize
        } else {
            0
        };
        let encoding = self.encoding;
        let wanted = if is_high_byte { chars * 2 } else { chars };
        let bytes = self.take(wanted);
        let read = if is_high_byte { bytes.len() / 2 } else { bytes.len() };
        if is_high_byte {
            let (decoded, _, _) = encoding_rs::UTF_16LE.decode(bytes);
            content.push_str(&decoded);
        } else if encoding == encoding_rs::UTF_16LE || encoding == encoding_rs::UTF_16BE {
            // Compressed strings store the low byte of each UTF-16 code unit
            content.extend(bytes.iter().map(|byte| char::from(*byte)));
        } else {
            let (decoded, _, _) = encoding.decode(bytes);
            content.push_str(&decoded);
        }
        self.skip(4 * runs)?;
        self.skip(phonetic_size)?;
        Ok(read)
    }
}

#[macro_export]
macro_rules! match_biff8_record {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(kind) = $reader.next()? {
            match kind {
                $($arms)*
                _ => (),
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::fixtures::record;

    #[test]
    fn iterates_records_and_merges_continue_fragments() {
        let mut stream = record(0x0203, &[1, 2, 3, 4]);
        stream.extend(record(CONTINUE, &[5, 6]));
        stream.extend(record(0x000A, &[]));
        let mut reader = Biff8Reader::new(stream);

        assert_eq!(reader.next().unwrap(), Some(0x0203));
        assert_eq!(reader.read_u32().unwrap(), 0x0403_0201);
        assert_eq!(reader.read_u16().unwrap(), 0x0605);
        assert!(reader.read_u8().is_err());
        assert_eq!(reader.next().unwrap(), Some(0x000A));
        assert_eq!(reader.next().unwrap(), None);
    }

    #[test]
    fn decodes_rk_numbers() {
        // Integer 100 with the percentage flag
        let integer = ((100u32) << 2) | 0x02 | 0x01;
        // Double 1.5 stored in the top 30 bits
        let double = ((1.5f64.to_bits() >> 32) as u32) & 0xFFFF_FFFC;
        let mut body = integer.to_le_bytes().to_vec();
        body.extend(double.to_le_bytes());
        let mut reader = Biff8Reader::new(record(0x027E, &body));

        reader.next().unwrap();
        assert_eq!(reader.read_rk_number().unwrap(), 1.0);
        assert_eq!(reader.read_rk_number().unwrap(), 1.5);
    }

    #[test]
    fn reads_compressed_and_wide_strings() {
        let mut body = vec![5, 0x00];
        body.extend(b"Hello");
        body.extend([2, 0x00, 0x01]);
        body.extend([0x4F, 0x00, 0x4B, 0x00]);
        let mut reader = Biff8Reader::new(record(0x0085, &body));

        reader.next().unwrap();
        assert_eq!(reader.read_short_xl_unicode_string().unwrap(), "Hello");
        assert_eq!(reader.read_xl_unicode_string().unwrap(), "OK");
    }

    #[test]
    fn compressed_strings_follow_the_code_page() {
        let body = [3, 0x00, b'c', b'a', 0xE9];
        let mut reader = Biff8Reader::new(record(0x0085, &body));
        reader.encoding = encoding_rs::WINDOWS_1252;

        reader.next().unwrap();
        assert_eq!(reader.read_short_xl_unicode_string().unwrap(), "ca\u{e9}");
    }

    #[test]
    fn reads_rich_string_split_over_continue() {
        let mut head = vec![6, 0, 0x00];
        head.extend(b"Ser");
        let mut tail = vec![0x00];
        tail.extend(b"ies");
        let mut stream = record(0x00FC, &head);
        stream.extend(record(CONTINUE, &tail));
        let mut reader = Biff8Reader::new(stream);

        reader.next().unwrap();
        assert_eq!(reader.read_xl_unicode_rich_extended_string().unwrap(), "Series");
    }

    #[test]
    fn last_u16_reads_record_tail() {
        let mut reader = Biff8Reader::new(record(0x00BD, &[0, 0, 1, 0, 9, 0]));
        reader.next().unwrap();
        assert_eq!(reader.last_u16().unwrap(), 9);
    }
}
