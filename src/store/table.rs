//! Headerless fixed-width record table (`document.tab`).
//!
//! Record N lives at byte offset `(N - 1) * record_length`, 1-based and
//! dense. The record length is fixed at create time and known to the
//! caller at compile time, so the file carries no header.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::error::{CallunaError, Result};

/// A writable fixed-width record table, used while an index is built.
#[derive(Debug)]
pub struct RecordTableWriter {
    file: File,
    record_length: usize,
    record_count: u32,
}

impl RecordTableWriter {
    /// Create a new, empty record table.
    pub fn create<P: AsRef<Path>>(path: P, record_length: usize) -> Result<Self> {
        if record_length == 0 {
            return Err(CallunaError::parameter("record length must be non-zero"));
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(path)?;
        Ok(RecordTableWriter {
            file,
            record_length,
            record_count: 0,
        })
    }

    /// Append the record for the next document ID, returning that ID.
    pub fn append(&mut self, record: &[u8]) -> Result<u32> {
        if record.len() != self.record_length {
            return Err(CallunaError::parameter(format!(
                "record is {} bytes, table records are {} bytes",
                record.len(),
                self.record_length
            )));
        }
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(record)?;
        self.record_count += 1;
        Ok(self.record_count)
    }

    /// Overwrite the record for an already-assigned ID.
    pub fn update(&mut self, id: u32, record: &[u8]) -> Result<()> {
        if id == 0 || id > self.record_count {
            return Err(CallunaError::InvalidDocumentId(id));
        }
        if record.len() != self.record_length {
            return Err(CallunaError::parameter(format!(
                "record is {} bytes, table records are {} bytes",
                record.len(),
                self.record_length
            )));
        }
        let offset = (id as u64 - 1) * self.record_length as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(record)?;
        Ok(())
    }

    /// Read back a record written during this build.
    pub fn read(&mut self, id: u32) -> Result<Vec<u8>> {
        if id == 0 || id > self.record_count {
            return Err(CallunaError::InvalidDocumentId(id));
        }
        let offset = (id as u64 - 1) * self.record_length as u64;
        let mut record = vec![0u8; self.record_length];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut record)?;
        Ok(record)
    }

    /// Number of records written so far.
    pub fn record_count(&self) -> u32 {
        self.record_count
    }

    /// Flush and close the table.
    pub fn close(mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

/// A read-only, memory-mapped record table.
#[derive(Debug)]
pub struct RecordTableReader {
    path: PathBuf,
    mmap: Mmap,
    record_length: usize,
}

impl RecordTableReader {
    /// Open an existing record table read-only.
    pub fn open<P: AsRef<Path>>(path: P, record_length: usize) -> Result<Self> {
        if record_length == 0 {
            return Err(CallunaError::parameter("record length must be non-zero"));
        }
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        if mmap.len() % record_length != 0 {
            return Err(CallunaError::misc(format!(
                "record table '{}' is {} bytes, not a multiple of the {} byte record length",
                path.display(),
                mmap.len(),
                record_length
            )));
        }
        Ok(RecordTableReader {
            path,
            mmap,
            record_length,
        })
    }

    /// Number of records in the table.
    pub fn record_count(&self) -> u32 {
        (self.mmap.len() / self.record_length) as u32
    }

    /// Borrow the record for a document ID.
    pub fn record(&self, id: u32) -> Result<&[u8]> {
        if id == 0 || id > self.record_count() {
            return Err(CallunaError::InvalidDocumentId(id));
        }
        let offset = (id as usize - 1) * self.record_length;
        Ok(&self.mmap[offset..offset + self.record_length])
    }

    /// The table's file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
