//! Relevance feedback: turn free text into a weighted query expansion.
//!
//! Positive and negative feedback texts are tokenized and stemmed, the
//! resulting terms are weighted by collection IDF and in-feedback
//! frequency, and the best of them are merged into the caller's weight
//! vector — positively or negatively. The selection is deterministic
//! for identical inputs.

use std::collections::BTreeMap;

use log::info;

use crate::cache::FeedbackCache;
use crate::error::{CallunaError, Result};
use crate::index::termdict::TermType;
use crate::index::Index;
use crate::language;
use crate::language::stemmer;
use crate::language::tokenizer;
use crate::parser::modifiers::FrequentTerms;
use crate::parser::QueryParser;
use crate::report::{
    SearchReport, REPORT_NEGATIVE_FEEDBACK_COUNTS, REPORT_NEGATIVE_FEEDBACK_TERMS,
    REPORT_POSITIVE_FEEDBACK_COUNTS, REPORT_POSITIVE_FEEDBACK_TERMS, REPORT_WARNING,
};
use crate::weight::{self, WeightVector};

/// Use at least this many feedback terms.
pub const FEEDBACK_MINIMUM_TERM_COUNT_DEFAULT: u32 = 10;

/// Or the top percentage of all terms presented, whichever is more.
pub const FEEDBACK_MAXIMUM_TERM_PERCENTAGE_DEFAULT: f32 = 25.0;

/// A term must occur in this percentage of documents or fewer.
pub const FEEDBACK_MAXIMUM_TERM_COVERAGE_THRESHOLD_DEFAULT: f32 = 8.0;

/// Default search term weight.
pub const SEARCH_TERM_WEIGHT_DEFAULT: f32 = 10.0;

/// Default feedback term weight floor.
pub const SEARCH_FEEDBACK_TERM_WEIGHT_DEFAULT: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedbackType {
    Positive,
    Negative,
}

/// A candidate expansion term with its collection statistics. The
/// weight folds the term's in-feedback count into its IDF.
#[derive(Debug)]
struct FeedbackCandidate {
    term: String,
    document_count: u32,
    weight: f32,
}

/// Collect and search relevance feedback terms, merging the result into
/// the passed weight vector.
///
/// `weight` may arrive holding an earlier vector to merge into; when it
/// arrives empty and an error occurs, it leaves empty.
#[allow(clippy::too_many_arguments)]
pub fn search_weight_from_feedback_texts(
    parser: &QueryParser,
    report: &mut SearchReport,
    mut cache: Option<&mut dyn FeedbackCache>,
    index: &Index,
    language_id: u32,
    positive_feedback_text: &str,
    negative_feedback_text: &str,
    document_range: Option<(u32, u32)>,
    weight: &mut Option<WeightVector>,
) -> Result<()> {
    if positive_feedback_text.trim().is_empty() && negative_feedback_text.trim().is_empty() {
        return Err(CallunaError::InvalidFeedbackText);
    }
    if let Some((start, end)) = document_range {
        index.validate_document_id(start)?;
        index.validate_document_id(end)?;
    }

    // Check the cache for a previously computed vector.
    let cache_enabled = parser.modifiers().search_cache_enabled && cache.is_some();
    let cache_key = format!("{positive_feedback_text}{negative_feedback_text}");
    if cache_enabled {
        if let Some((vector, snippet)) = cache
            .as_deref()
            .and_then(|c| c.get(index.name(), &cache_key))
        {
            report.append(&snippet);
            *weight = Some(vector);
            return Ok(());
        }
    }
    let report_start = report.offset();

    // Restrict lookups to the unfielded search fields when configured.
    let field_restriction = index.field_bitmap(index.unfielded_search_field_names());

    let allocated_here = weight.is_none();
    let run = |weight: &mut Option<WeightVector>, report: &mut SearchReport| -> Result<()> {
        if !positive_feedback_text.trim().is_empty() {
            search_weight_from_feedback_text(
                parser,
                report,
                index,
                language_id,
                positive_feedback_text,
                FeedbackType::Positive,
                document_range,
                field_restriction.as_ref(),
                weight,
            )?;
        }
        if !negative_feedback_text.trim().is_empty() {
            search_weight_from_feedback_text(
                parser,
                report,
                index,
                language_id,
                negative_feedback_text,
                FeedbackType::Negative,
                document_range,
                field_restriction.as_ref(),
                weight,
            )?;
        }
        Ok(())
    };

    if let Err(e) = run(weight, report) {
        if allocated_here {
            *weight = None;
        }
        return Err(e);
    }

    // Store the vector and the report lines this run produced.
    if cache_enabled {
        if let (Some(vector), Some(cache)) = (weight.as_ref(), cache.as_deref_mut()) {
            let snippet = report.snippet(report_start, report.offset()).to_string();
            cache.save(index.name(), &cache_key, vector, &snippet);
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn search_weight_from_feedback_text(
    parser: &QueryParser,
    report: &mut SearchReport,
    index: &Index,
    language_id: u32,
    feedback_text: &str,
    feedback_type: FeedbackType,
    document_range: Option<(u32, u32)>,
    field_restriction: Option<&bit_vec::BitVec>,
    weight: &mut Option<WeightVector>,
) -> Result<()> {
    // Tokenize and stem the feedback text into a term count map.
    let (term_counts, total_term_count, unique_term_count) =
        collect_feedback_terms(index, language_id, feedback_text)?;
    if unique_term_count == 0 {
        return Ok(());
    }

    // Look every term up; regular terms become weighted candidates,
    // stop terms and misses are dropped.
    let total_documents = index.document_count();
    let mut candidates = Vec::new();
    for (term, count) in &term_counts {
        match index.lookup_term(term, field_restriction) {
            Ok(entry) if entry.term_type == TermType::Regular => {
                let idf =
                    weight::idf_factor(entry.term_count, entry.document_count, total_documents);
                candidates.push(FeedbackCandidate {
                    term: term.clone(),
                    document_count: entry.document_count,
                    weight: idf * *count as f32,
                });
            }
            Ok(_) => {}
            Err(e) if e.is_term_miss() => {}
            Err(e) => return Err(e),
        }
    }

    // Sort by weight, descending; ties keep term order.
    candidates.sort_by(|a, b| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let modifiers = parser.modifiers();
    let search_term_count = parser.search_term_count();

    let term_weight_default = if modifiers.term_weight > 0.0 {
        modifiers.term_weight
    } else {
        SEARCH_TERM_WEIGHT_DEFAULT
    };
    let feedback_term_weight_default = if modifiers.feedback_term_weight > 0.0 {
        modifiers.feedback_term_weight
    } else {
        SEARCH_FEEDBACK_TERM_WEIGHT_DEFAULT
    };
    let minimum_term_count = if modifiers.feedback_minimum_term_count > 0 {
        modifiers.feedback_minimum_term_count
    } else {
        FEEDBACK_MINIMUM_TERM_COUNT_DEFAULT
    };
    let maximum_term_percentage = if modifiers.feedback_maximum_term_percentage > 0.0 {
        modifiers.feedback_maximum_term_percentage
    } else {
        FEEDBACK_MAXIMUM_TERM_PERCENTAGE_DEFAULT
    };
    let maximum_coverage = if modifiers.feedback_maximum_term_coverage_threshold > 0.0 {
        modifiers.feedback_maximum_term_coverage_threshold
    } else {
        FEEDBACK_MAXIMUM_TERM_COVERAGE_THRESHOLD_DEFAULT
    };

    // The frequent-term coverage threshold does not apply to a one-term
    // search, nor when frequent terms are kept.
    let mut frequent_term_coverage_threshold = modifiers.frequent_term_coverage_threshold;
    if frequent_term_coverage_threshold > 0.0
        && (search_term_count == 1 || modifiers.frequent_terms == FrequentTerms::Keep)
    {
        frequent_term_coverage_threshold = 0.0;
    }

    // Use either the minimum count or the top percentage of all terms
    // presented, whichever is more.
    let maximum_used =
        (unique_term_count as f32 * maximum_term_percentage / 100.0).max(minimum_term_count as f32);

    let coverage_allows = |candidate: &FeedbackCandidate| {
        total_documents > 0
            && candidate.document_count as f32 / total_documents as f32
                <= maximum_coverage / 100.0
    };

    // Count the terms that will be used; the feedback weight depends on
    // that count.
    let mut used_term_count = 0u32;
    for candidate in &candidates {
        if (used_term_count as f32) >= maximum_used {
            break;
        }
        if coverage_allows(candidate) {
            used_term_count += 1;
        }
    }

    if used_term_count == 0 {
        report.append(&format!(
            "{REPORT_WARNING} Feedback was submitted but was not used because it was not useful\n"
        ));
        return Ok(());
    }

    // Weight the feedback terms against the search's own terms: more
    // feedback terms each weigh less, clamped into the default range.
    let mut feedback_term_weight = if search_term_count > 0 {
        let computed = search_term_count as f32 / ((used_term_count as f32).ln() + 1.0);
        computed
            .min(term_weight_default)
            .max(feedback_term_weight_default)
    } else {
        feedback_term_weight_default
    };
    if feedback_type == FeedbackType::Negative {
        feedback_term_weight = -feedback_term_weight;
    }

    let terms_marker = match feedback_type {
        FeedbackType::Positive => REPORT_POSITIVE_FEEDBACK_TERMS,
        FeedbackType::Negative => REPORT_NEGATIVE_FEEDBACK_TERMS,
    };
    report.append(terms_marker);

    let vector = weight.get_or_insert_with(|| WeightVector::new(total_documents));

    let mut applied = 0u32;
    for candidate in &candidates {
        if (applied as f32) >= maximum_used {
            break;
        }
        if !coverage_allows(candidate) {
            continue;
        }

        report.append(&format!(" {}", candidate.term));

        let result = weight::merge_term_weights(
            index,
            &candidate.term,
            feedback_term_weight,
            None,
            frequent_term_coverage_threshold,
            document_range,
            vector,
        );
        match result {
            Ok(()) => {}
            Err(e) if e.is_term_miss() => {}
            Err(e) => return Err(e),
        }

        applied += 1;
    }

    let counts_marker = match feedback_type {
        FeedbackType::Positive => REPORT_POSITIVE_FEEDBACK_COUNTS,
        FeedbackType::Negative => REPORT_NEGATIVE_FEEDBACK_COUNTS,
    };
    report.append(&format!(
        "\n{counts_marker} {total_term_count} {unique_term_count} {applied}\n"
    ));

    info!(
        "Relevance feedback terms, total: {total_term_count}, unique: {unique_term_count}, used: {applied}."
    );

    Ok(())
}

/// Tokenize and stem a feedback text into `(term → count, total, unique)`.
///
/// Tokens starting with a digit are skipped. A fully upper-case token is
/// also counted in its original case; every token is counted in its
/// lowercased, stemmed form.
fn collect_feedback_terms(
    index: &Index,
    language_id: u32,
    feedback_text: &str,
) -> Result<(BTreeMap<String, u32>, u32, u32)> {
    let tokenizer = tokenizer::create_tokenizer(index.tokenizer_id(), language_id)?;
    let stemmer = stemmer::create_stemmer(index.stemmer_id(), language_id)?;

    let mut term_counts: BTreeMap<String, u32> = BTreeMap::new();
    let mut total_term_count = 0u32;
    let mut unique_term_count = 0u32;

    let mut add = |term: &str, counts: &mut BTreeMap<String, u32>| {
        if term.is_empty() {
            return;
        }
        let truncated = truncate_chars(term, index.term_length_maximum());
        let slot = counts.entry(truncated.to_string()).or_insert(0);
        if *slot == 0 {
            unique_term_count += 1;
        }
        *slot += 1;
        total_term_count += 1;
    };

    for token in tokenizer.tokenize(feedback_text) {
        let mut pieces: Vec<&str> = vec![token.text];
        pieces.extend(token.components.iter().copied());

        for piece in pieces {
            if piece.chars().next().is_some_and(|c| c.is_ascii_digit()) {
                continue;
            }
            if language::is_all_upper_case(piece) {
                add(piece, &mut term_counts);
            }
            let stemmed = stemmer.stem(&piece.to_lowercase());
            if stemmed.is_empty() {
                continue;
            }
            add(&stemmed, &mut term_counts);
        }
    }

    Ok((term_counts, total_term_count, unique_term_count))
}

fn truncate_chars(text: &str, maximum: usize) -> &str {
    match text.char_indices().nth(maximum) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("elephant", 4), "elep");
        assert_eq!(truncate_chars("ox", 4), "ox");
    }
}
