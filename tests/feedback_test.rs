use std::path::Path;

use chrono::NaiveDate;

use calluna::feedback::search_weight_from_feedback_texts;
use calluna::{
    DocumentInput, FeedbackCache, Index, IndexIntent, IndexOptions, MemoryFeedbackCache,
    ParserConfig, QueryParser, Result, SearchReport, WeightVector,
};

/// Builds a 1000-document index with engineered term statistics:
/// `quick` tc=500 dc=10, `brown` tc=200 dc=8, `fox` tc=80 dc=2,
/// `jump` tc=1200 dc=300 (via "jumped"), `over` a stop term.
fn build_statistics_index(root: &Path) -> Result<()> {
    let options = IndexOptions {
        field_names: vec!["body".to_string()],
        ..IndexOptions::default()
    };
    let mut index = Index::open_with_options(root, root, "stats", IndexIntent::Create, options)?;

    for doc in 1..=1000u32 {
        let mut words: Vec<&str> = Vec::new();
        if doc <= 10 {
            words.extend(std::iter::repeat("quick").take(50));
        }
        if doc <= 8 {
            words.extend(std::iter::repeat("brown").take(25));
        }
        if doc <= 2 {
            words.extend(std::iter::repeat("fox").take(40));
        }
        if (11..=310).contains(&doc) {
            words.extend(std::iter::repeat("jumped").take(4));
        }
        if doc == 1 {
            words.push("over");
        }
        if words.is_empty() {
            words.push("filler");
        }
        let text = words.join(" ");

        let key = format!("doc-{doc}");
        index.add_document(DocumentInput {
            document_key: &key,
            title: "stats",
            language_id: 1,
            fields: vec![("body", &text)],
            ..Default::default()
        })?;
    }

    index.close()
}

/// A parser carrying five search terms and the feedback modifiers of the
/// selection scenario: fmtc=2, fmtp=50, fmtct=10.
fn scenario_parser() -> QueryParser {
    let mut parser = QueryParser::new(ParserConfig::default());
    parser
        .parse_at(
            "alpha beta gamma delta epsilon {fmtc:2} {fmtp:50} {fmtct:10}",
            NaiveDate::from_ymd_opt(2020, 6, 17).unwrap(),
        )
        .unwrap();
    parser
}

fn idf(document_count: u32, total: u32) -> f32 {
    (total as f32 / document_count as f32).ln() + 1.0
}

fn assert_close(actual: f32, expected: f32, label: &str) {
    let tolerance = expected.abs().max(1.0) * 1e-3;
    assert!(
        (actual - expected).abs() <= tolerance,
        "{label}: expected {expected}, got {actual}"
    );
}

#[test]
fn test_feedback_selection_scenario() -> Result<()> {
    let dir = tempfile::tempdir().unwrap();
    build_statistics_index(dir.path())?;

    let index = Index::open(dir.path(), dir.path(), "stats", IndexIntent::Search)?;
    assert_eq!(index.document_count(), 1000);

    // Confirm the engineered statistics.
    let quick = index.lookup_term("quick", None)?;
    assert_eq!((quick.term_count, quick.document_count), (500, 10));
    let brown = index.lookup_term("brown", None)?;
    assert_eq!((brown.term_count, brown.document_count), (200, 8));
    let fox = index.lookup_term("fox", None)?;
    assert_eq!((fox.term_count, fox.document_count), (80, 2));
    let jump = index.lookup_term("jump", None)?;
    assert_eq!((jump.term_count, jump.document_count), (1200, 300));

    let parser = scenario_parser();
    let mut report = SearchReport::new();
    let mut weight: Option<WeightVector> = None;

    search_weight_from_feedback_texts(
        &parser,
        &mut report,
        None,
        &index,
        1,
        "quick brown fox jumped over",
        "",
        None,
        &mut weight,
    )?;

    // quick (1%), brown (0.8%), fox (0.2%) pass the 10% coverage cap;
    // jump (30%) and the stop term over are dropped. Used count is 3.
    let report_text = report.text();
    assert!(report_text.contains("positive-feedback-terms:"));
    assert!(report_text.contains("quick"));
    assert!(report_text.contains("brown"));
    assert!(report_text.contains("fox"));
    assert!(!report_text.contains("jump "));
    assert!(report_text.contains("positive-feedback-counts: 5 5 3"));

    // The feedback term weight is search_term_count / (ln(used) + 1),
    // inside the default clamp range.
    let w = 5.0f32 / (3.0f32.ln() + 1.0);

    let vector = weight.expect("feedback produced a weight vector");

    // Document 1 holds all three used terms.
    let expected_doc1 =
        w * (idf(10, 1000) * 50.0 + idf(8, 1000) * 25.0 + idf(2, 1000) * 40.0);
    assert_close(vector.get(1), expected_doc1, "document 1");

    // Documents 9 and 10 hold only quick.
    let expected_doc10 = w * idf(10, 1000) * 50.0;
    assert_close(vector.get(10), expected_doc10, "document 10");

    // jump documents got nothing.
    assert_eq!(vector.get(50), 0.0);
    assert_eq!(vector.get(200), 0.0);

    // Filler documents got nothing.
    assert_eq!(vector.get(999), 0.0);

    index.close()
}

#[test]
fn test_feedback_is_deterministic() -> Result<()> {
    let dir = tempfile::tempdir().unwrap();
    build_statistics_index(dir.path())?;
    let index = Index::open(dir.path(), dir.path(), "stats", IndexIntent::Search)?;

    let parser = scenario_parser();

    let mut first: Option<WeightVector> = None;
    let mut report = SearchReport::new();
    search_weight_from_feedback_texts(
        &parser,
        &mut report,
        None,
        &index,
        1,
        "quick brown fox jumped over",
        "",
        None,
        &mut first,
    )?;

    let mut second: Option<WeightVector> = None;
    let mut report = SearchReport::new();
    search_weight_from_feedback_texts(
        &parser,
        &mut report,
        None,
        &index,
        1,
        "quick brown fox jumped over",
        "",
        None,
        &mut second,
    )?;

    let first = first.unwrap();
    let second = second.unwrap();
    for id in 1..=1000 {
        let difference = (first.get(id) - second.get(id)).abs();
        assert!(difference <= f32::EPSILON, "document {id} diverged");
    }

    index.close()
}

#[test]
fn test_negative_feedback_subtracts() -> Result<()> {
    let dir = tempfile::tempdir().unwrap();
    build_statistics_index(dir.path())?;
    let index = Index::open(dir.path(), dir.path(), "stats", IndexIntent::Search)?;

    let parser = scenario_parser();
    let mut report = SearchReport::new();
    let mut weight: Option<WeightVector> = None;

    search_weight_from_feedback_texts(
        &parser,
        &mut report,
        None,
        &index,
        1,
        "",
        "fox",
        None,
        &mut weight,
    )?;

    let vector = weight.unwrap();
    assert!(vector.get(1) < 0.0);
    assert!(vector.get(2) < 0.0);
    assert_eq!(vector.get(3), 0.0);
    assert!(report.text().contains("negative-feedback-terms: fox"));

    index.close()
}

#[test]
fn test_feedback_with_only_stop_words_is_unused() -> Result<()> {
    let dir = tempfile::tempdir().unwrap();
    build_statistics_index(dir.path())?;
    let index = Index::open(dir.path(), dir.path(), "stats", IndexIntent::Search)?;

    let parser = scenario_parser();
    let mut report = SearchReport::new();
    let mut weight: Option<WeightVector> = None;

    search_weight_from_feedback_texts(
        &parser,
        &mut report,
        None,
        &index,
        1,
        "over the and",
        "",
        None,
        &mut weight,
    )?;

    assert!(weight.is_none());
    assert!(report
        .text()
        .contains("Feedback was submitted but was not used"));

    index.close()
}

#[test]
fn test_empty_feedback_rejected() -> Result<()> {
    let dir = tempfile::tempdir().unwrap();
    build_statistics_index(dir.path())?;
    let index = Index::open(dir.path(), dir.path(), "stats", IndexIntent::Search)?;

    let parser = scenario_parser();
    let mut report = SearchReport::new();
    let mut weight: Option<WeightVector> = None;

    let result = search_weight_from_feedback_texts(
        &parser,
        &mut report,
        None,
        &index,
        1,
        "",
        "   ",
        None,
        &mut weight,
    );
    assert!(result.is_err());
    assert!(weight.is_none());

    index.close()
}

#[test]
fn test_document_range_restriction() -> Result<()> {
    let dir = tempfile::tempdir().unwrap();
    build_statistics_index(dir.path())?;
    let index = Index::open(dir.path(), dir.path(), "stats", IndexIntent::Search)?;

    let parser = scenario_parser();
    let mut report = SearchReport::new();
    let mut weight: Option<WeightVector> = None;

    // Restrict to documents 5..=10: fox (docs 1, 2) contributes nothing.
    search_weight_from_feedback_texts(
        &parser,
        &mut report,
        None,
        &index,
        1,
        "quick fox",
        "",
        Some((5, 10)),
        &mut weight,
    )?;

    let vector = weight.unwrap();
    assert_eq!(vector.get(1), 0.0);
    assert_eq!(vector.get(2), 0.0);
    assert!(vector.get(5) > 0.0);
    assert!(vector.get(10) > 0.0);

    index.close()
}

#[test]
fn test_feedback_cache_round_trip() -> Result<()> {
    let dir = tempfile::tempdir().unwrap();
    build_statistics_index(dir.path())?;
    let index = Index::open(dir.path(), dir.path(), "stats", IndexIntent::Search)?;

    let parser = scenario_parser();
    let mut cache = MemoryFeedbackCache::new();

    let mut first: Option<WeightVector> = None;
    let mut report = SearchReport::new();
    search_weight_from_feedback_texts(
        &parser,
        &mut report,
        Some(&mut cache as &mut dyn FeedbackCache),
        &index,
        1,
        "quick brown fox jumped over",
        "",
        None,
        &mut first,
    )?;
    let first_report = report.text().to_string();
    assert_eq!(cache.len(), 1);

    // The second run hits the cache and replays the report lines.
    let mut second: Option<WeightVector> = None;
    let mut report = SearchReport::new();
    search_weight_from_feedback_texts(
        &parser,
        &mut report,
        Some(&mut cache as &mut dyn FeedbackCache),
        &index,
        1,
        "quick brown fox jumped over",
        "",
        None,
        &mut second,
    )?;

    assert_eq!(first.unwrap(), second.unwrap());
    assert_eq!(report.text(), first_report);

    index.close()
}
