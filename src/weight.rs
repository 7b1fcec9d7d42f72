//! Per-document weight vectors and the term-weight primitive.
//!
//! A [`WeightVector`] accumulates relevance weight per document ID. The
//! ranking formula is frozen: a term contributes
//! `weight × idf × frequency` to each document it occurs in.

use bit_vec::BitVec;

use crate::error::Result;
use crate::index::termdict::TermType;
use crate::index::Index;

/// Relevance weights over dense 1-based document IDs.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightVector {
    /// Slot 0 is unused; slot `d` is document `d`.
    weights: Vec<f32>,
}

impl WeightVector {
    /// Create a zeroed vector for `document_count` documents.
    pub fn new(document_count: u32) -> Self {
        WeightVector {
            weights: vec![0.0; document_count as usize + 1],
        }
    }

    pub fn document_count(&self) -> u32 {
        (self.weights.len() - 1) as u32
    }

    /// Add weight to a document. Out-of-range IDs are ignored.
    pub fn add(&mut self, document_id: u32, delta: f32) {
        if let Some(slot) = self.weights.get_mut(document_id as usize) {
            *slot += delta;
        }
    }

    pub fn get(&self, document_id: u32) -> f32 {
        self.weights
            .get(document_id as usize)
            .copied()
            .unwrap_or(0.0)
    }

    /// Documents with a non-zero weight, ascending by ID.
    pub fn non_zero(&self) -> Vec<(u32, f32)> {
        self.weights
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, &w)| w != 0.0)
            .map(|(id, &w)| (id as u32, w))
            .collect()
    }
}

/// The engine's inverse-document-frequency factor.
pub fn idf_factor(_term_count: u64, document_count: u32, total_document_count: u32) -> f32 {
    if document_count == 0 || total_document_count == 0 {
        return 0.0;
    }
    (total_document_count as f32 / document_count as f32).ln() + 1.0
}

/// Merge one term's postings into a weight vector at the given weight.
///
/// Respects an optional document-ID range and the frequent-term coverage
/// threshold (a term in more than `threshold` percent of documents is
/// skipped when the threshold is non-zero). Stop terms contribute
/// nothing. Errors for an absent term propagate as
/// [`TermNotFound`](crate::error::CallunaError::TermNotFound) /
/// [`TermDoesNotOccur`](crate::error::CallunaError::TermDoesNotOccur)
/// for the caller to classify.
pub fn merge_term_weights(
    index: &Index,
    term: &str,
    weight: f32,
    field_restriction: Option<&BitVec>,
    frequent_term_coverage_threshold: f32,
    document_range: Option<(u32, u32)>,
    vector: &mut WeightVector,
) -> Result<()> {
    let entry = index.lookup_term(term, field_restriction)?;
    if entry.term_type == TermType::Stop {
        return Ok(());
    }

    let total = index.document_count();
    if frequent_term_coverage_threshold > 0.0
        && total > 0
        && entry.document_count as f32 / total as f32 > frequent_term_coverage_threshold / 100.0
    {
        return Ok(());
    }

    let idf = idf_factor(entry.term_count, entry.document_count, total);
    for posting in index.postings(&entry)? {
        if let Some((start, end)) = document_range {
            if posting.document_id < start || posting.document_id > end {
                continue;
            }
        }
        vector.add(posting.document_id, weight * idf * posting.frequency() as f32);
    }

    Ok(())
}
