//! Posting list encoding.
//!
//! A term's posting list in `index.dat` is a document count followed by
//! one block per document: the document ID, the in-document frequency,
//! and that many delta-encoded positions. Document blocks are in
//! ascending document-ID order, everything varint encoded.

use crate::error::Result;
use crate::util::varint::{self, VarintReader};

/// One document's occurrences of a term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub document_id: u32,
    /// Term positions within the document, ascending.
    pub positions: Vec<u32>,
}

impl Posting {
    pub fn frequency(&self) -> u32 {
        self.positions.len() as u32
    }
}

/// Append one document block to `out`.
pub fn encode_document_block(out: &mut Vec<u8>, posting: &Posting) {
    varint::write_u32(out, posting.document_id);
    varint::write_u32(out, posting.positions.len() as u32);
    let mut previous = 0u32;
    for &position in &posting.positions {
        varint::write_u32(out, position - previous);
        previous = position;
    }
}

/// Encode a full posting list.
pub fn encode_postings(postings: &[Posting]) -> Vec<u8> {
    let mut out = Vec::new();
    varint::write_u32(&mut out, postings.len() as u32);
    for posting in postings {
        encode_document_block(&mut out, posting);
    }
    out
}

/// Decode a full posting list.
pub fn decode_postings(bytes: &[u8]) -> Result<Vec<Posting>> {
    let mut reader = VarintReader::new(bytes);
    let document_count = reader.read_u32()?;
    let mut postings = Vec::with_capacity(document_count as usize);
    for _ in 0..document_count {
        let document_id = reader.read_u32()?;
        let frequency = reader.read_u32()?;
        let mut positions = Vec::with_capacity(frequency as usize);
        let mut position = 0u32;
        for _ in 0..frequency {
            position += reader.read_u32()?;
            positions.push(position);
        }
        postings.push(Posting {
            document_id,
            positions,
        });
    }
    Ok(postings)
}
