//! Key dictionary: external document key → document ID (`key.dct`).

use byteorder::{BigEndian, ByteOrder};

use crate::error::{CallunaError, Result};
use crate::store::dict::{DictReader, DictWriter};

/// Maximum document key length in bytes.
pub const DOCUMENT_KEY_MAXIMUM_LENGTH: usize = 256;

/// Add a key during a build. Returns `true` if the key was new, `false`
/// if it was already present (a duplicate; the mapping is left pointing
/// at the first document).
pub fn add_key(dictionary: &mut DictWriter, key: &str, document_id: u32) -> Result<bool> {
    if key.is_empty() {
        return Err(CallunaError::parameter("document key must not be empty"));
    }
    if dictionary.get(key.as_bytes()).is_some() {
        return Ok(false);
    }
    let mut value = [0u8; 4];
    BigEndian::write_u32(&mut value, document_id);
    dictionary.insert(key.as_bytes(), &value)?;
    Ok(true)
}

/// Look up a document ID by key.
pub fn lookup_key(dictionary: &DictReader, key: &str) -> Result<Option<u32>> {
    match dictionary.get(key.as_bytes())? {
        Some(value) if value.len() == 4 => Ok(Some(BigEndian::read_u32(&value))),
        Some(_) => Err(CallunaError::misc(format!(
            "malformed key dictionary value for key '{key}'"
        ))),
        None => Ok(None),
    }
}
