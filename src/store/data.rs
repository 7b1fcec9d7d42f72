//! Append-only variable-length data store (`document.dat`, `index.dat`).
//!
//! Each entry is self-describing: a big-endian length header, the
//! payload, and a CRC32 trailer verified on read. Entries are addressed
//! either by a full locator (offset + payload length, as the term
//! dictionary stores them) or by offset alone (as document records store
//! their data ID). The file starts with a small magic header so that
//! offset zero never addresses an entry — a zero data-ID in a document
//! record means "no data".

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};
use memmap2::Mmap;

use crate::error::{CallunaError, Result};

const DATA_MAGIC: &[u8; 8] = b"caldat01";

/// Locator for an entry inside a data store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataLocator {
    /// Byte offset of the entry.
    pub offset: u64,
    /// Payload length in bytes.
    pub length: u32,
}

impl DataLocator {
    /// The "no data" locator (offset zero is inside the file header).
    pub fn none() -> Self {
        DataLocator::default()
    }

    pub fn is_none(&self) -> bool {
        self.offset == 0
    }
}

/// A writable data store, used while an index is built.
#[derive(Debug)]
pub struct DataStoreWriter {
    file: File,
    position: u64,
}

impl DataStoreWriter {
    /// Create a new, empty data store.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(path)?;
        file.write_all(DATA_MAGIC)?;
        Ok(DataStoreWriter {
            file,
            position: DATA_MAGIC.len() as u64,
        })
    }

    /// Append a payload, returning its locator.
    pub fn append(&mut self, payload: &[u8]) -> Result<DataLocator> {
        let locator = DataLocator {
            offset: self.position,
            length: payload.len() as u32,
        };

        let mut header = [0u8; 4];
        BigEndian::write_u32(&mut header, payload.len() as u32);
        let mut trailer = [0u8; 4];
        BigEndian::write_u32(&mut trailer, crc32fast::hash(payload));

        self.file.write_all(&header)?;
        self.file.write_all(payload)?;
        self.file.write_all(&trailer)?;
        self.position += 4 + payload.len() as u64 + 4;

        Ok(locator)
    }

    /// Flush and close the store.
    pub fn close(mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

/// A read-only, memory-mapped data store.
#[derive(Debug)]
pub struct DataStoreReader {
    path: PathBuf,
    mmap: Mmap,
}

impl DataStoreReader {
    /// Open an existing data store read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        if mmap.len() < DATA_MAGIC.len() || &mmap[..DATA_MAGIC.len()] != DATA_MAGIC {
            return Err(CallunaError::misc(format!(
                "'{}' is not a data store",
                path.display()
            )));
        }
        Ok(DataStoreReader { path, mmap })
    }

    /// Borrow the payload at an offset, verifying its checksum.
    pub fn read_at(&self, offset: u64) -> Result<&[u8]> {
        let start = offset as usize;
        if start < DATA_MAGIC.len() || start + 4 > self.mmap.len() {
            return Err(CallunaError::misc(format!(
                "offset {} is out of bounds for '{}'",
                offset,
                self.path.display()
            )));
        }
        let length = BigEndian::read_u32(&self.mmap[start..start + 4]) as usize;
        let payload_start = start + 4;
        let payload_end = payload_start + length;
        if payload_end + 4 > self.mmap.len() {
            return Err(CallunaError::misc(format!(
                "entry at offset {} overruns '{}'",
                offset,
                self.path.display()
            )));
        }
        let payload = &self.mmap[payload_start..payload_end];
        let stored = BigEndian::read_u32(&self.mmap[payload_end..payload_end + 4]);
        if crc32fast::hash(payload) != stored {
            return Err(CallunaError::misc(format!(
                "checksum mismatch at offset {} in '{}'",
                offset,
                self.path.display()
            )));
        }
        Ok(payload)
    }

    /// Borrow the payload for a locator, verifying length and checksum.
    pub fn read(&self, locator: DataLocator) -> Result<&[u8]> {
        let payload = self.read_at(locator.offset)?;
        if payload.len() != locator.length as usize {
            return Err(CallunaError::misc(format!(
                "locator length {} does not match stored length {} at offset {} in '{}'",
                locator.length,
                payload.len(),
                locator.offset,
                self.path.display()
            )));
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.dat");

        let mut writer = DataStoreWriter::create(&path).unwrap();
        let first = writer.append(b"quick brown fox").unwrap();
        let second = writer.append(b"").unwrap();
        let third = writer.append(&[0xAB; 1000]).unwrap();
        writer.close().unwrap();

        assert!(first.offset >= 8);
        assert!(!first.is_none());

        let reader = DataStoreReader::open(&path).unwrap();
        assert_eq!(reader.read(first).unwrap(), b"quick brown fox");
        assert_eq!(reader.read(second).unwrap(), b"");
        assert_eq!(reader.read(third).unwrap(), &[0xAB; 1000][..]);
        assert_eq!(reader.read_at(first.offset).unwrap(), b"quick brown fox");
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.dat");

        let mut writer = DataStoreWriter::create(&path).unwrap();
        let locator = writer.append(b"payload").unwrap();
        writer.close().unwrap();

        let reader = DataStoreReader::open(&path).unwrap();
        let wrong = DataLocator {
            offset: locator.offset,
            length: locator.length + 1,
        };
        assert!(reader.read(wrong).is_err());
    }

    #[test]
    fn test_corruption_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.dat");

        let mut writer = DataStoreWriter::create(&path).unwrap();
        let locator = writer.append(b"payload").unwrap();
        writer.close().unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[locator.offset as usize + 4] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        let reader = DataStoreReader::open(&path).unwrap();
        assert!(reader.read(locator).is_err());
    }

    #[test]
    fn test_not_a_data_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.dat");
        std::fs::write(&path, b"not magic").unwrap();
        assert!(DataStoreReader::open(&path).is_err());
    }
}
