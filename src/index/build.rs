//! Build scratch state for a create-intent index.
//!
//! Postings accumulate in memory per term. When the memory ceiling is
//! crossed at a document boundary, the accumulated terms are spilled to
//! a numbered temporary segment file (written under a shadow name, then
//! renamed). Closing the index merges every segment into the final term
//! dictionary and posting store. Each segment covers a contiguous
//! document-ID range, so a term's postings merge by concatenation.

use std::fs;
use std::path::PathBuf;

use ahash::AHashMap;
use bit_vec::BitVec;
use log::info;

use crate::error::{CallunaError, Result};
use crate::index::paths::IndexPaths;
use crate::index::postings::{self, Posting};
use crate::index::termdict::{self, TermEntry, TermType};
use crate::language::stemmer::Stemmer;
use crate::language::stoplist::StopList;
use crate::language::tokenizer::Tokenizer;
use crate::store::data::{DataLocator, DataStoreWriter};
use crate::store::dict::DictWriter;
use crate::util::varint;

/// Default in-memory posting ceiling before a spill, in bytes.
pub const BUILD_MEMORY_CEILING_DEFAULT: usize = 256 * 1024 * 1024;

/// Accumulated postings for one regular term.
#[derive(Debug)]
struct TermAccumulator {
    field_bitmap: BitVec,
    term_count: u64,
    docs: Vec<Posting>,
}

/// Accumulated counts for one stop term. Stop terms carry no postings.
#[derive(Debug)]
struct StopTermAccumulator {
    field_bitmap: BitVec,
    term_count: u64,
    document_count: u32,
    last_document_id: u32,
}

/// Unique-term counts produced by the final merge.
#[derive(Debug, Clone, Copy)]
pub struct MergeCounts {
    pub unique_term_count: u64,
    pub unique_stop_term_count: u64,
}

/// Build-time state owned by a create-intent index.
pub struct BuildState {
    paths: IndexPaths,
    pub tokenizer: Box<dyn Tokenizer>,
    pub stemmer: Box<dyn Stemmer>,
    pub stop_list: Box<dyn StopList>,

    field_id_maximum: u16,
    term_length_minimum: usize,
    term_length_maximum: usize,

    terms: AHashMap<String, TermAccumulator>,
    stop_terms: AHashMap<String, StopTermAccumulator>,
    memory_used: usize,
    memory_ceiling: usize,
    segments: Vec<PathBuf>,
    next_segment_version: u32,

    pub last_document_id: u32,
    pub total_term_count: u64,
    pub total_stop_term_count: u64,
    pub document_term_count_minimum: u32,
    pub document_term_count_maximum: u32,
    pub duplicate_document_key_count: u32,
}

impl std::fmt::Debug for BuildState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildState")
            .field("last_document_id", &self.last_document_id)
            .field("terms", &self.terms.len())
            .field("stop_terms", &self.stop_terms.len())
            .field("memory_used", &self.memory_used)
            .field("segments", &self.segments.len())
            .finish()
    }
}

impl BuildState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        paths: IndexPaths,
        tokenizer: Box<dyn Tokenizer>,
        stemmer: Box<dyn Stemmer>,
        stop_list: Box<dyn StopList>,
        field_id_maximum: u16,
        term_length_minimum: usize,
        term_length_maximum: usize,
        memory_ceiling: usize,
    ) -> Self {
        BuildState {
            paths,
            tokenizer,
            stemmer,
            stop_list,
            field_id_maximum,
            term_length_minimum,
            term_length_maximum,
            terms: AHashMap::new(),
            stop_terms: AHashMap::new(),
            memory_used: 0,
            memory_ceiling,
            segments: Vec::new(),
            next_segment_version: 1,
            last_document_id: 0,
            total_term_count: 0,
            total_stop_term_count: 0,
            document_term_count_minimum: 0,
            document_term_count_maximum: 0,
            duplicate_document_key_count: 0,
        }
    }

    /// Assign the next document ID. IDs are dense and 1-based.
    pub fn new_document_id(&mut self) -> u32 {
        self.last_document_id += 1;
        self.last_document_id
    }

    /// Tokenize and index one field of one document. `position` carries
    /// across fields of the same document. Returns the number of terms
    /// seen (stop terms included).
    pub fn index_text(
        &mut self,
        document_id: u32,
        field_id: u16,
        text: &str,
        position: &mut u32,
    ) -> Result<u32> {
        let tokens = self.tokenizer.tokenize(text);
        let mut seen = 0u32;

        for token in tokens {
            if token.components.is_empty() {
                seen += self.process_term(document_id, field_id, token.text, position)?;
            } else {
                // Undelimited scripts index character components, not the
                // composite token, so adjacency search can reach them.
                for component in &token.components {
                    seen += self.process_term(document_id, field_id, component, position)?;
                }
            }
        }

        Ok(seen)
    }

    fn process_term(
        &mut self,
        document_id: u32,
        field_id: u16,
        raw: &str,
        position: &mut u32,
    ) -> Result<u32> {
        let lowered = raw.to_lowercase();
        if lowered.chars().count() < self.term_length_minimum {
            return Ok(0);
        }
        let lowered = truncate_chars(&lowered, self.term_length_maximum);

        if self.stop_list.is_stop(lowered) {
            self.total_stop_term_count += 1;
            let accumulator =
                self.stop_terms
                    .entry(lowered.to_string())
                    .or_insert_with(|| StopTermAccumulator {
                        field_bitmap: BitVec::from_elem(self.field_id_maximum as usize, false),
                        term_count: 0,
                        document_count: 0,
                        last_document_id: 0,
                    });
            accumulator.term_count += 1;
            if accumulator.last_document_id != document_id {
                accumulator.document_count += 1;
                accumulator.last_document_id = document_id;
            }
            set_field_bit(&mut accumulator.field_bitmap, field_id);
            *position += 1;
            return Ok(1);
        }

        let stemmed = self.stemmer.stem(lowered);
        if stemmed.is_empty() {
            return Ok(0);
        }

        let memory_delta = stemmed.len() + 24;
        let field_id_maximum = self.field_id_maximum;
        let accumulator = self
            .terms
            .entry(stemmed)
            .or_insert_with(|| TermAccumulator {
                field_bitmap: BitVec::from_elem(field_id_maximum as usize, false),
                term_count: 0,
                docs: Vec::new(),
            });
        accumulator.term_count += 1;
        set_field_bit(&mut accumulator.field_bitmap, field_id);
        match accumulator.docs.last_mut() {
            Some(last) if last.document_id == document_id => last.positions.push(*position),
            _ => accumulator.docs.push(Posting {
                document_id,
                positions: vec![*position],
            }),
        }

        self.total_term_count += 1;
        self.memory_used += memory_delta;
        *position += 1;
        Ok(1)
    }

    /// Record a finished document and spill if over the memory ceiling.
    pub fn finish_document(&mut self, term_count: u32) -> Result<()> {
        if self.document_term_count_minimum == 0 || term_count < self.document_term_count_minimum {
            self.document_term_count_minimum = term_count;
        }
        if term_count > self.document_term_count_maximum {
            self.document_term_count_maximum = term_count;
        }
        if self.memory_used > self.memory_ceiling {
            self.spill()?;
        }
        Ok(())
    }

    /// Spill the in-memory postings to the next temporary segment file.
    fn spill(&mut self) -> Result<()> {
        if self.terms.is_empty() {
            return Ok(());
        }

        let version = self.next_segment_version;
        self.next_segment_version += 1;

        let mut sorted: Vec<(String, TermAccumulator)> = self.terms.drain().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        let mut bytes = Vec::new();
        for (term, accumulator) in &sorted {
            let mut docs = Vec::new();
            for posting in &accumulator.docs {
                postings::encode_document_block(&mut docs, posting);
            }
            let bitmap = accumulator.field_bitmap.to_bytes();

            varint::write_u32(&mut bytes, term.len() as u32);
            bytes.extend_from_slice(term.as_bytes());
            varint::write_u32(&mut bytes, bitmap.len() as u32);
            bytes.extend_from_slice(&bitmap);
            varint::write_u64(&mut bytes, accumulator.term_count);
            varint::write_u32(&mut bytes, accumulator.docs.len() as u32);
            varint::write_u64(&mut bytes, docs.len() as u64);
            bytes.extend_from_slice(&docs);
        }

        // Stage under the shadow name, publish under the real one.
        let shadow = self.paths.temp_term_dictionary(version, true);
        let published = self.paths.temp_term_dictionary(version, false);
        fs::write(&shadow, &bytes)?;
        fs::rename(&shadow, &published)?;

        info!(
            "Spilled {} terms to segment '{}'.",
            sorted.len(),
            published.display()
        );

        self.segments.push(published);
        self.memory_used = 0;
        Ok(())
    }

    /// Merge all segments and the stop terms into the final posting store
    /// and term dictionary, deleting the temporary segment files.
    pub fn merge(
        &mut self,
        index_data: &mut DataStoreWriter,
        term_dictionary: &mut DictWriter,
    ) -> Result<MergeCounts> {
        self.spill()?;

        let mut cursors = Vec::new();
        for path in &self.segments {
            cursors.push(SegmentCursor::open(path.clone())?);
        }
        let mut current: Vec<Option<SegmentTerm>> = cursors
            .iter_mut()
            .map(|c| c.next())
            .collect::<Result<Vec<_>>>()?;

        let mut unique_term_count = 0u64;

        loop {
            let minimum = current
                .iter()
                .flatten()
                .map(|t| t.term.clone())
                .min();
            let Some(term) = minimum else {
                break;
            };

            let mut field_bitmap = BitVec::from_elem(self.field_id_maximum as usize, false);
            let mut term_count = 0u64;
            let mut document_count = 0u32;
            let mut docs = Vec::new();

            // Cursor order is spill order, so document IDs stay ascending.
            for (i, slot) in current.iter_mut().enumerate() {
                let matches = matches!(slot, Some(t) if t.term == term);
                if !matches {
                    continue;
                }
                let segment_term = slot.take().unwrap();
                let mut segment_bitmap = segment_term.field_bitmap;
                segment_bitmap.truncate(self.field_id_maximum as usize);
                field_bitmap.or(&segment_bitmap);
                term_count += segment_term.term_count;
                document_count += segment_term.document_count;
                docs.extend_from_slice(&segment_term.docs);
                *slot = cursors[i].next()?;
            }

            let mut posting_bytes = Vec::new();
            varint::write_u32(&mut posting_bytes, document_count);
            posting_bytes.extend_from_slice(&docs);
            let locator = index_data.append(&posting_bytes)?;

            let entry = TermEntry {
                term_type: TermType::Regular,
                term_count,
                document_count,
                locator,
                field_bitmap,
            };
            termdict::add_term(term_dictionary, &term, &entry)?;
            unique_term_count += 1;
        }

        let unique_stop_term_count = self.stop_terms.len() as u64;
        for (term, accumulator) in std::mem::take(&mut self.stop_terms) {
            let entry = TermEntry {
                term_type: TermType::Stop,
                term_count: accumulator.term_count,
                document_count: accumulator.document_count,
                locator: DataLocator::none(),
                field_bitmap: accumulator.field_bitmap,
            };
            termdict::add_term(term_dictionary, &term, &entry)?;
        }

        for path in self.segments.drain(..) {
            if let Err(e) = fs::remove_file(&path) {
                log::warn!("Failed to remove segment '{}': {e}.", path.display());
            }
        }

        Ok(MergeCounts {
            unique_term_count,
            unique_stop_term_count,
        })
    }
}

/// A parsed term record from a spilled segment file.
#[derive(Debug)]
struct SegmentTerm {
    term: String,
    field_bitmap: BitVec,
    term_count: u64,
    document_count: u32,
    docs: Vec<u8>,
}

/// Sequential reader over one spilled segment file.
struct SegmentCursor {
    bytes: Vec<u8>,
    position: usize,
}

impl SegmentCursor {
    fn open(path: PathBuf) -> Result<Self> {
        Ok(SegmentCursor {
            bytes: fs::read(path)?,
            position: 0,
        })
    }

    fn next(&mut self) -> Result<Option<SegmentTerm>> {
        if self.position >= self.bytes.len() {
            return Ok(None);
        }

        let bytes = &self.bytes;
        let mut pos = self.position;

        let (term_length, n) = varint::read_u32(&bytes[pos..])?;
        pos += n;
        let term_bytes = take_bytes(bytes, &mut pos, term_length as usize)?;
        let term = String::from_utf8(term_bytes)
            .map_err(|_| CallunaError::misc("segment term is not valid utf-8"))?;

        let (bitmap_length, n) = varint::read_u32(&bytes[pos..])?;
        pos += n;
        let bitmap_bytes = take_bytes(bytes, &mut pos, bitmap_length as usize)?;
        let field_bitmap = BitVec::from_bytes(&bitmap_bytes);

        let (term_count, n) = varint::read_u64(&bytes[pos..])?;
        pos += n;
        let (document_count, n) = varint::read_u32(&bytes[pos..])?;
        pos += n;
        let (docs_length, n) = varint::read_u64(&bytes[pos..])?;
        pos += n;
        let docs = take_bytes(bytes, &mut pos, docs_length as usize)?;

        self.position = pos;
        Ok(Some(SegmentTerm {
            term,
            field_bitmap,
            term_count,
            document_count,
            docs,
        }))
    }
}

fn take_bytes(bytes: &[u8], position: &mut usize, length: usize) -> Result<Vec<u8>> {
    let end = *position + length;
    if end > bytes.len() {
        return Err(CallunaError::misc("segment file is truncated"));
    }
    let taken = bytes[*position..end].to_vec();
    *position = end;
    Ok(taken)
}

fn set_field_bit(bitmap: &mut BitVec, field_id: u16) {
    if field_id >= 1 && (field_id as usize) <= bitmap.len() {
        bitmap.set(field_id as usize - 1, true);
    }
}

/// Truncate to at most `maximum` characters on a character boundary.
fn truncate_chars(text: &str, maximum: usize) -> &str {
    match text.char_indices().nth(maximum) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::stemmer::NoStemmer;
    use crate::language::stoplist::create_stop_list;
    use crate::language::tokenizer::UnicodeTokenizer;
    use crate::store::dict::DictReader;

    fn build_state(dir: &std::path::Path, memory_ceiling: usize) -> BuildState {
        let paths = IndexPaths::new(dir, "t").unwrap();
        BuildState::new(
            paths,
            Box::new(UnicodeTokenizer),
            Box::new(NoStemmer),
            create_stop_list("english").unwrap(),
            4,
            1,
            64,
            memory_ceiling,
        )
    }

    #[test]
    fn test_accumulate_and_merge() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = build_state(dir.path(), BUILD_MEMORY_CEILING_DEFAULT);

        let doc1 = state.new_document_id();
        let mut position = 0;
        let count = state.index_text(doc1, 1, "the quick brown fox", &mut position).unwrap();
        assert_eq!(count, 4);
        state.finish_document(count).unwrap();

        let doc2 = state.new_document_id();
        let mut position = 0;
        let count = state.index_text(doc2, 2, "fox trot", &mut position).unwrap();
        state.finish_document(count).unwrap();

        let dict_path = dir.path().join("term.dct");
        let mut dict = DictWriter::create(&dict_path, 256).unwrap();
        let mut data = DataStoreWriter::create(dir.path().join("index.dat")).unwrap();
        let counts = state.merge(&mut data, &mut dict).unwrap();
        dict.finish().unwrap();
        data.close().unwrap();

        assert_eq!(counts.unique_term_count, 4); // quick, brown, fox, trot
        assert_eq!(counts.unique_stop_term_count, 1); // the
        assert_eq!(state.total_term_count, 5);
        assert_eq!(state.total_stop_term_count, 1);

        let reader = DictReader::open(&dict_path).unwrap();
        let fox = termdict::lookup(&reader, "fox", None, 4).unwrap();
        assert_eq!(fox.term_type, TermType::Regular);
        assert_eq!(fox.term_count, 2);
        assert_eq!(fox.document_count, 2);
        // Occurs in fields 1 and 2.
        assert!(fox.field_bitmap.get(0).unwrap());
        assert!(fox.field_bitmap.get(1).unwrap());

        let the = termdict::lookup(&reader, "the", None, 4).unwrap();
        assert_eq!(the.term_type, TermType::Stop);
        assert!(the.locator.is_none());
    }

    #[test]
    fn test_spill_and_merge_concatenates_postings() {
        let dir = tempfile::tempdir().unwrap();
        // A one-byte ceiling forces a spill after every document.
        let mut state = build_state(dir.path(), 1);

        for text in ["fox alpha", "fox beta", "fox gamma"] {
            let id = state.new_document_id();
            let mut position = 0;
            let count = state.index_text(id, 1, text, &mut position).unwrap();
            state.finish_document(count).unwrap();
        }

        let dict_path = dir.path().join("term.dct");
        let mut dict = DictWriter::create(&dict_path, 256).unwrap();
        let data_path = dir.path().join("index.dat");
        let mut data = DataStoreWriter::create(&data_path).unwrap();
        state.merge(&mut data, &mut dict).unwrap();
        dict.finish().unwrap();
        data.close().unwrap();

        let reader = DictReader::open(&dict_path).unwrap();
        let fox = termdict::lookup(&reader, "fox", None, 4).unwrap();
        assert_eq!(fox.document_count, 3);

        let data = crate::store::data::DataStoreReader::open(&data_path).unwrap();
        let posting_bytes = data.read(fox.locator).unwrap();
        let postings = postings::decode_postings(posting_bytes).unwrap();
        let ids: Vec<u32> = postings.iter().map(|p| p.document_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        // Temporary segment files were cleaned up.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.contains("-term."))
            .collect();
        assert!(leftovers.is_empty(), "leftover segments: {leftovers:?}");
    }

    #[test]
    fn test_term_length_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path(), "t").unwrap();
        let mut state = BuildState::new(
            paths,
            Box::new(UnicodeTokenizer),
            Box::new(NoStemmer),
            create_stop_list("none").unwrap(),
            1,
            2,
            4,
            BUILD_MEMORY_CEILING_DEFAULT,
        );

        let id = state.new_document_id();
        let mut position = 0;
        // "a" is below the minimum, "elephant" truncates to "elep".
        let count = state.index_text(id, 1, "a elephant ox", &mut position).unwrap();
        assert_eq!(count, 2);
        assert!(state.terms.contains_key("elep"));
        assert!(state.terms.contains_key("ox"));
        assert!(!state.terms.contains_key("a"));
    }
}
