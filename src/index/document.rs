//! Document table records and the per-document data payload.
//!
//! Each document owns one fixed-width record in `document.tab` and,
//! optionally, a variable-length payload in `document.dat` addressed by
//! the record's data ID. All integers are big-endian on disk.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{CallunaError, Result};
use crate::util::varint;

/// Field widths of a document table record.
pub const DOCUMENT_DATA_ID_SIZE: usize = 8;
pub const DOCUMENT_RANK_SIZE: usize = 4;
pub const DOCUMENT_TERM_COUNT_SIZE: usize = 4;
pub const DOCUMENT_DATE_SIZE: usize = 6;
pub const DOCUMENT_LANGUAGE_ID_SIZE: usize = 2;

/// Total record length: the widths above, in order.
pub const DOCUMENT_ENTRY_LENGTH: usize = DOCUMENT_DATA_ID_SIZE
    + DOCUMENT_RANK_SIZE
    + DOCUMENT_TERM_COUNT_SIZE
    + DOCUMENT_DATE_SIZE
    + DOCUMENT_LANGUAGE_ID_SIZE;

/// The fixed-width per-document record.
///
/// `data_id` is the byte offset of the document's payload in
/// `document.dat`, zero when the document has none. `ansi_date` is a
/// packed 14-digit `YYYYMMDDHHMMSS` number, zero when dateless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DocumentEntry {
    pub data_id: u64,
    pub rank: u32,
    pub term_count: u32,
    pub ansi_date: u64,
    pub language_id: u16,
}

impl DocumentEntry {
    /// Encode into the fixed-width on-disk form.
    pub fn encode(&self) -> [u8; DOCUMENT_ENTRY_LENGTH] {
        let mut record = [0u8; DOCUMENT_ENTRY_LENGTH];
        BigEndian::write_u64(&mut record[0..8], self.data_id);
        BigEndian::write_u32(&mut record[8..12], self.rank);
        BigEndian::write_u32(&mut record[12..16], self.term_count);
        BigEndian::write_uint(&mut record[16..22], self.ansi_date, DOCUMENT_DATE_SIZE);
        BigEndian::write_u16(&mut record[22..24], self.language_id);
        record
    }

    /// Decode from the fixed-width on-disk form.
    pub fn decode(record: &[u8]) -> Result<Self> {
        if record.len() != DOCUMENT_ENTRY_LENGTH {
            return Err(CallunaError::misc(format!(
                "document record is {} bytes, expected {}",
                record.len(),
                DOCUMENT_ENTRY_LENGTH
            )));
        }
        Ok(DocumentEntry {
            data_id: BigEndian::read_u64(&record[0..8]),
            rank: BigEndian::read_u32(&record[8..12]),
            term_count: BigEndian::read_u32(&record[12..16]),
            ansi_date: BigEndian::read_uint(&record[16..22], DOCUMENT_DATE_SIZE),
            language_id: BigEndian::read_u16(&record[22..24]),
        })
    }
}

/// The variable-length per-document payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocumentInfo {
    pub title: String,
    pub document_key: String,
    pub url: Option<String>,
    pub file_path: Option<String>,
    /// Byte range of the document inside its source file.
    pub start_offset: u64,
    pub end_offset: u64,
}

impl DocumentInfo {
    /// Encode into the `document.dat` payload form.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_string(&mut out, &self.title);
        write_string(&mut out, &self.document_key);
        write_string(&mut out, self.url.as_deref().unwrap_or(""));
        write_string(&mut out, self.file_path.as_deref().unwrap_or(""));
        varint::write_u64(&mut out, self.start_offset);
        varint::write_u64(&mut out, self.end_offset);
        out
    }

    /// Decode from the `document.dat` payload form.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut position = 0usize;
        let title = read_string(bytes, &mut position)?;
        let document_key = read_string(bytes, &mut position)?;
        let url = read_string(bytes, &mut position)?;
        let file_path = read_string(bytes, &mut position)?;
        let (start_offset, consumed) = varint::read_u64(&bytes[position..])?;
        position += consumed;
        let (end_offset, _) = varint::read_u64(&bytes[position..])?;

        Ok(DocumentInfo {
            title,
            document_key,
            url: if url.is_empty() { None } else { Some(url) },
            file_path: if file_path.is_empty() {
                None
            } else {
                Some(file_path)
            },
            start_offset,
            end_offset,
        })
    }
}

/// A decoded document: the fixed record plus its payload, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    pub entry: DocumentEntry,
    pub info: Option<DocumentInfo>,
}

fn write_string(out: &mut Vec<u8>, value: &str) {
    varint::write_u64(out, value.len() as u64);
    out.extend_from_slice(value.as_bytes());
}

fn read_string(bytes: &[u8], position: &mut usize) -> Result<String> {
    let (length, consumed) = varint::read_u64(&bytes[*position..])?;
    *position += consumed;
    let length = length as usize;
    if *position + length > bytes.len() {
        return Err(CallunaError::misc("document payload is truncated"));
    }
    let value = std::str::from_utf8(&bytes[*position..*position + length])
        .map_err(|_| CallunaError::misc("document payload is not valid utf-8"))?
        .to_string();
    *position += length;
    Ok(value)
}
