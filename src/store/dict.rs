//! Keyed dictionary (`term.dct`, `key.dct`).
//!
//! Built in memory while an index is created, then published as a single
//! file: a value blob followed by an FST mapping each key to its value's
//! offset in the blob, with a fixed-size footer locating both regions.
//! Search-intent opens are read-only over a memory map; exact lookups go
//! through the FST, listings stream it in key order.

use std::collections::BTreeMap;
use std::fs;
use std::ops::Bound;
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};
use fst::{IntoStreamer, Map, MapBuilder, Streamer};
use memmap2::Mmap;

use crate::error::{CallunaError, Result};

const DICT_MAGIC: &[u8; 8] = b"caldct01";
const FOOTER_LENGTH: usize = 8 + 8 + 8;

/// A dictionary being built in memory.
#[derive(Debug)]
pub struct DictWriter {
    path: PathBuf,
    maximum_key_length: usize,
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl DictWriter {
    /// Create a new dictionary to be written at `path`.
    pub fn create<P: AsRef<Path>>(path: P, maximum_key_length: usize) -> Result<Self> {
        Ok(DictWriter {
            path: path.as_ref().to_path_buf(),
            maximum_key_length,
            entries: BTreeMap::new(),
        })
    }

    /// Insert a key/value pair. Re-inserting a key replaces its value, so
    /// repeated identical inserts are idempotent.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(CallunaError::parameter("dictionary key must not be empty"));
        }
        if key.len() > self.maximum_key_length {
            return Err(CallunaError::parameter(format!(
                "dictionary key is {} bytes, maximum is {}",
                key.len(),
                self.maximum_key_length
            )));
        }
        self.entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    /// Look up a key inserted during this build.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(key).map(|v| v.as_slice())
    }

    /// Number of keys inserted so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the dictionary file and consume the writer.
    pub fn finish(self) -> Result<()> {
        let mut values = Vec::new();
        let mut builder = MapBuilder::memory();

        for (key, value) in &self.entries {
            let offset = values.len() as u64;

            let mut length = [0u8; 4];
            BigEndian::write_u32(&mut length, value.len() as u32);
            values.extend_from_slice(&length);
            values.extend_from_slice(value);

            let mut crc = [0u8; 4];
            BigEndian::write_u32(&mut crc, crc32fast::hash(value));
            values.extend_from_slice(&crc);

            builder
                .insert(key, offset)
                .map_err(|e| CallunaError::misc(format!("fst build failed: {e}")))?;
        }

        let fst_bytes = builder
            .into_inner()
            .map_err(|e| CallunaError::misc(format!("fst build failed: {e}")))?;

        let mut file_bytes = Vec::with_capacity(values.len() + fst_bytes.len() + FOOTER_LENGTH);
        file_bytes.extend_from_slice(&values);
        file_bytes.extend_from_slice(&fst_bytes);

        let mut footer = [0u8; FOOTER_LENGTH];
        BigEndian::write_u64(&mut footer[0..8], values.len() as u64);
        BigEndian::write_u64(&mut footer[8..16], fst_bytes.len() as u64);
        footer[16..24].copy_from_slice(DICT_MAGIC);
        file_bytes.extend_from_slice(&footer);

        fs::write(&self.path, &file_bytes)?;
        Ok(())
    }
}

/// A read-only dictionary over a memory-mapped file.
pub struct DictReader {
    path: PathBuf,
    mmap: Mmap,
    map: Map<Vec<u8>>,
    values_length: usize,
}

impl std::fmt::Debug for DictReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DictReader")
            .field("path", &self.path)
            .field("len", &self.map.len())
            .finish()
    }
}

impl DictReader {
    /// Open an existing dictionary read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = fs::File::open(&path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < FOOTER_LENGTH {
            return Err(CallunaError::misc(format!(
                "'{}' is not a dictionary",
                path.display()
            )));
        }
        let footer = &mmap[mmap.len() - FOOTER_LENGTH..];
        if &footer[16..24] != DICT_MAGIC {
            return Err(CallunaError::misc(format!(
                "'{}' is not a dictionary",
                path.display()
            )));
        }
        let values_length = BigEndian::read_u64(&footer[0..8]) as usize;
        let fst_length = BigEndian::read_u64(&footer[8..16]) as usize;
        if values_length + fst_length + FOOTER_LENGTH != mmap.len() {
            return Err(CallunaError::misc(format!(
                "dictionary '{}' has inconsistent region lengths",
                path.display()
            )));
        }

        let fst_bytes = mmap[values_length..values_length + fst_length].to_vec();
        let map = Map::new(fst_bytes)
            .map_err(|e| CallunaError::misc(format!("failed to load dictionary fst: {e}")))?;

        Ok(DictReader {
            path,
            mmap,
            map,
            values_length,
        })
    }

    /// Number of keys in the dictionary.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.len() == 0
    }

    /// Look up a key, returning a copy of its value.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.map.get(key) {
            Some(offset) => Ok(Some(self.value_at(offset)?)),
            None => Ok(None),
        }
    }

    /// Collect the entries whose keys fall in the given range, in key order.
    pub fn range(
        &self,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut builder = self.map.range();
        builder = match lower {
            Bound::Included(key) => builder.ge(key),
            Bound::Excluded(key) => builder.gt(key),
            Bound::Unbounded => builder,
        };
        builder = match upper {
            Bound::Included(key) => builder.le(key),
            Bound::Excluded(key) => builder.lt(key),
            Bound::Unbounded => builder,
        };

        let mut entries = Vec::new();
        let mut stream = builder.into_stream();
        while let Some((key, offset)) = stream.next() {
            entries.push((key.to_vec(), self.value_at(offset)?));
        }
        Ok(entries)
    }

    /// Visit every entry in key order.
    pub fn for_each<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<()>,
    {
        let mut stream = self.map.stream();
        while let Some((key, offset)) = stream.next() {
            let value = self.value_at(offset)?;
            visit(key, &value)?;
        }
        Ok(())
    }

    fn value_at(&self, offset: u64) -> Result<Vec<u8>> {
        let start = offset as usize;
        if start + 4 > self.values_length {
            return Err(CallunaError::misc(format!(
                "value offset {} is out of bounds in '{}'",
                offset,
                self.path.display()
            )));
        }
        let length = BigEndian::read_u32(&self.mmap[start..start + 4]) as usize;
        let payload_start = start + 4;
        let payload_end = payload_start + length;
        if payload_end + 4 > self.values_length {
            return Err(CallunaError::misc(format!(
                "value at offset {} overruns '{}'",
                offset,
                self.path.display()
            )));
        }
        let payload = &self.mmap[payload_start..payload_end];
        let stored = BigEndian::read_u32(&self.mmap[payload_end..payload_end + 4]);
        if crc32fast::hash(payload) != stored {
            return Err(CallunaError::misc(format!(
                "checksum mismatch at value offset {} in '{}'",
                offset,
                self.path.display()
            )));
        }
        Ok(payload.to_vec())
    }
}
