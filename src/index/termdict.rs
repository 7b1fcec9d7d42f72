//! Term dictionary: term → type, counts, posting locator, field bitmap.
//!
//! Entries live in the keyed dictionary `term.dct`; posting lists live in
//! `index.dat` and are addressed by the locator stored here. A term's
//! field bitmap has `field_id_maximum` bits; bit `i` is set when the
//! term occurs in field `i + 1` (field ID 0 is reserved for "no field").

use std::ops::Bound;

use bit_vec::BitVec;
use regex::Regex;

use crate::error::{CallunaError, Result};
use crate::language::phonetic;
use crate::parser::term::RangeOp;
use crate::store::data::DataLocator;
use crate::store::dict::{DictReader, DictWriter};
use crate::util::{levenshtein, varint};

/// A term's type in the dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermType {
    /// Fully indexed with postings.
    Regular,
    /// Known but not positionally indexed.
    Stop,
}

impl TermType {
    fn to_u8(self) -> u8 {
        match self {
            TermType::Regular => 1,
            TermType::Stop => 2,
        }
    }

    fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(TermType::Regular),
            2 => Ok(TermType::Stop),
            _ => Err(CallunaError::misc(format!("unknown term type: {value}"))),
        }
    }
}

/// The value stored under a term key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermEntry {
    pub term_type: TermType,
    /// Collection-wide occurrence count.
    pub term_count: u64,
    /// Number of documents containing the term.
    pub document_count: u32,
    /// Posting list location in `index.dat`.
    pub locator: DataLocator,
    /// Field presence, one bit per field ID starting at 1.
    pub field_bitmap: BitVec,
}

impl TermEntry {
    /// Encode for storage in the dictionary.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(self.term_type.to_u8());
        varint::write_u64(&mut out, self.term_count);
        varint::write_u32(&mut out, self.document_count);
        varint::write_u64(&mut out, self.locator.offset);
        varint::write_u32(&mut out, self.locator.length);
        out.extend_from_slice(&self.field_bitmap.to_bytes());
        out
    }

    /// Decode a dictionary value. `field_id_maximum` fixes the bitmap width.
    pub fn decode(bytes: &[u8], field_id_maximum: u16) -> Result<Self> {
        if bytes.is_empty() {
            return Err(CallunaError::misc("empty term entry"));
        }
        let term_type = TermType::from_u8(bytes[0])?;
        let mut reader = varint::VarintReader::new(&bytes[1..]);
        let term_count = reader.read_u64()?;
        let document_count = reader.read_u32()?;
        let offset = reader.read_u64()?;
        let length = reader.read_u32()?;

        let bitmap_bytes = (field_id_maximum as usize).div_ceil(8);
        if bytes.len() < bitmap_bytes {
            return Err(CallunaError::misc("term entry bitmap is truncated"));
        }
        let mut field_bitmap = BitVec::from_bytes(&bytes[bytes.len() - bitmap_bytes..]);
        field_bitmap.truncate(field_id_maximum as usize);

        Ok(TermEntry {
            term_type,
            term_count,
            document_count,
            locator: DataLocator { offset, length },
            field_bitmap,
        })
    }
}

/// How a dictionary listing matches terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermMatch {
    Regular,
    Stop,
    Wildcard,
    Soundex,
    Metaphone,
    Phonix,
    Typo,
    Regex,
    /// Case variants of one term, compared under a range operator.
    Range,
    /// All terms in a lexical range.
    TermRange,
}

/// One term returned by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermInfo {
    pub term: String,
    pub term_type: TermType,
    pub term_count: u64,
    pub document_count: u32,
}

/// Add a term to a dictionary being built. Idempotent for identical
/// repeated inserts within one build.
pub fn add_term(
    dictionary: &mut DictWriter,
    term: &str,
    entry: &TermEntry,
) -> Result<()> {
    if entry.term_count == 0 {
        return Err(CallunaError::parameter(format!(
            "term '{term}' has a zero term count"
        )));
    }
    dictionary.insert(term.as_bytes(), &entry.encode())
}

/// Look up one term.
///
/// Returns [`CallunaError::TermNotFound`] when the term is absent and
/// [`CallunaError::TermDoesNotOccur`] when it exists but the intersection
/// of its field bitmap with `field_restriction` is empty.
pub fn lookup(
    dictionary: &DictReader,
    term: &str,
    field_restriction: Option<&BitVec>,
    field_id_maximum: u16,
) -> Result<TermEntry> {
    let value = dictionary
        .get(term.as_bytes())?
        .ok_or_else(|| CallunaError::TermNotFound(term.to_string()))?;
    let entry = TermEntry::decode(&value, field_id_maximum)?;

    if let Some(restriction) = field_restriction {
        if !bitmaps_intersect(&entry.field_bitmap, restriction) {
            return Err(CallunaError::TermDoesNotOccur(term.to_string()));
        }
    }

    Ok(entry)
}

/// List dictionary terms matching a pattern under a match kind.
///
/// `language_id` is accepted for interface parity with the phonetic
/// keyers; the shipped keyers are language-neutral.
pub fn list(
    dictionary: &DictReader,
    _language_id: u32,
    pattern: Option<&str>,
    field_restriction: Option<&BitVec>,
    match_kind: TermMatch,
    range: Option<RangeOp>,
    field_id_maximum: u16,
) -> Result<Vec<TermInfo>> {
    let mut results = Vec::new();

    let mut take = |term: &str, entry: &TermEntry| {
        if let Some(restriction) = field_restriction {
            if !bitmaps_intersect(&entry.field_bitmap, restriction) {
                return;
            }
        }
        results.push(TermInfo {
            term: term.to_string(),
            term_type: entry.term_type,
            term_count: entry.term_count,
            document_count: entry.document_count,
        });
    };

    match match_kind {
        TermMatch::Regular | TermMatch::Stop => {
            let wanted = if match_kind == TermMatch::Regular {
                TermType::Regular
            } else {
                TermType::Stop
            };
            match pattern {
                Some(term) => {
                    if let Some(value) = dictionary.get(term.as_bytes())? {
                        let entry = TermEntry::decode(&value, field_id_maximum)?;
                        if entry.term_type == wanted {
                            take(term, &entry);
                        }
                    }
                }
                None => {
                    for_each_entry(dictionary, field_id_maximum, |term, entry| {
                        if entry.term_type == wanted {
                            take(term, entry);
                        }
                    })?;
                }
            }
        }

        TermMatch::Wildcard => {
            let pattern = required_pattern(pattern)?;
            let regex = wildcard_regex(pattern)?;
            let prefix = wildcard_literal_prefix(pattern);
            let entries = prefix_bounded_entries(dictionary, prefix.as_bytes())?;
            for (term, value) in entries {
                let term = String::from_utf8_lossy(&term).into_owned();
                if regex.is_match(&term) {
                    let entry = TermEntry::decode(&value, field_id_maximum)?;
                    take(&term, &entry);
                }
            }
        }

        TermMatch::Soundex | TermMatch::Metaphone | TermMatch::Phonix => {
            let pattern = required_pattern(pattern)?;
            let key_of: fn(&str) -> String = match match_kind {
                TermMatch::Soundex => phonetic::soundex,
                TermMatch::Metaphone => phonetic::metaphone,
                _ => phonetic::phonix,
            };
            let wanted_key = key_of(pattern);
            if wanted_key.is_empty() {
                return Ok(results);
            }
            for_each_entry(dictionary, field_id_maximum, |term, entry| {
                if key_of(term) == wanted_key {
                    take(term, entry);
                }
            })?;
        }

        TermMatch::Typo => {
            let pattern = required_pattern(pattern)?;
            for_each_entry(dictionary, field_id_maximum, |term, entry| {
                if levenshtein::within(term, pattern, 1) {
                    take(term, entry);
                }
            })?;
        }

        TermMatch::Regex => {
            let pattern = required_pattern(pattern)?;
            let regex = Regex::new(&format!("^(?:{pattern})$"))
                .map_err(|e| CallunaError::RegexCompileFailed(e.to_string()))?;
            for_each_entry(dictionary, field_id_maximum, |term, entry| {
                if regex.is_match(term) {
                    take(term, entry);
                }
            })?;
        }

        TermMatch::Range => {
            let pattern = required_pattern(pattern)?;
            let range = range.ok_or(CallunaError::InvalidRange)?;
            let wanted = pattern.to_lowercase();
            for_each_entry(dictionary, field_id_maximum, |term, entry| {
                let folded = term.to_lowercase();
                if range_matches(range, folded.as_str().cmp(wanted.as_str())) {
                    take(term, entry);
                }
            })?;
        }

        TermMatch::TermRange => {
            let pattern = required_pattern(pattern)?;
            let range = range.ok_or(CallunaError::InvalidRange)?;
            let key = pattern.as_bytes();
            let (lower, upper): (Bound<&[u8]>, Bound<&[u8]>) = match range {
                RangeOp::Equal => (Bound::Included(key), Bound::Included(key)),
                RangeOp::Greater => (Bound::Excluded(key), Bound::Unbounded),
                RangeOp::GreaterOrEqual => (Bound::Included(key), Bound::Unbounded),
                RangeOp::Less => (Bound::Unbounded, Bound::Excluded(key)),
                RangeOp::LessOrEqual => (Bound::Unbounded, Bound::Included(key)),
                RangeOp::NotEqual => (Bound::Unbounded, Bound::Unbounded),
            };
            for (term, value) in dictionary.range(lower, upper)? {
                if range == RangeOp::NotEqual && term == key {
                    continue;
                }
                let term = String::from_utf8_lossy(&term).into_owned();
                let entry = TermEntry::decode(&value, field_id_maximum)?;
                take(&term, &entry);
            }
        }
    }

    Ok(results)
}

fn required_pattern(pattern: Option<&str>) -> Result<&str> {
    pattern.ok_or_else(|| CallunaError::parameter("listing requires a term pattern"))
}

fn for_each_entry<F>(
    dictionary: &DictReader,
    field_id_maximum: u16,
    mut visit: F,
) -> Result<()>
where
    F: FnMut(&str, &TermEntry),
{
    dictionary.for_each(|key, value| {
        let term = String::from_utf8_lossy(key).into_owned();
        let entry = TermEntry::decode(value, field_id_maximum)?;
        visit(&term, &entry);
        Ok(())
    })
}

fn prefix_bounded_entries(
    dictionary: &DictReader,
    prefix: &[u8],
) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    if prefix.is_empty() {
        return dictionary.range(Bound::Unbounded, Bound::Unbounded);
    }
    match prefix_upper_bound(prefix) {
        Some(upper) => dictionary.range(Bound::Included(prefix), Bound::Excluded(&upper)),
        None => dictionary.range(Bound::Included(prefix), Bound::Unbounded),
    }
}

/// Smallest byte string greater than every string with this prefix.
fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(&last) = upper.last() {
        if last < 0xFF {
            *upper.last_mut().unwrap() = last + 1;
            return Some(upper);
        }
        upper.pop();
    }
    None
}

fn range_matches(range: RangeOp, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match range {
        RangeOp::Equal => ordering == Equal,
        RangeOp::NotEqual => ordering != Equal,
        RangeOp::Less => ordering == Less,
        RangeOp::Greater => ordering == Greater,
        RangeOp::LessOrEqual => ordering != Greater,
        RangeOp::GreaterOrEqual => ordering != Less,
    }
}

/// True if the bitmaps share a set bit.
pub fn bitmaps_intersect(a: &BitVec, b: &BitVec) -> bool {
    a.iter().zip(b.iter()).any(|(x, y)| x && y)
}

/// The literal prefix of a wildcard pattern, up to its first unescaped
/// wildcard metacharacter.
fn wildcard_literal_prefix(pattern: &str) -> String {
    let mut prefix = String::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    prefix.push(escaped);
                }
            }
            '*' | '?' | '@' | '%' => break,
            _ => prefix.push(c),
        }
    }
    prefix
}

/// Compile a wildcard pattern into an anchored regex. `*` matches any
/// run, `?` one character, `@` one alphabetic, `%` one digit.
pub fn wildcard_regex(pattern: &str) -> Result<Regex> {
    let mut expression = String::from("^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    expression.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            '*' => expression.push_str(".*"),
            '?' => expression.push('.'),
            '@' => expression.push_str(r"\p{Alphabetic}"),
            '%' => expression.push_str("[0-9]"),
            _ => expression.push_str(&regex::escape(&c.to_string())),
        }
    }
    expression.push('$');
    Regex::new(&expression).map_err(|e| CallunaError::RegexCompileFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(term_type: TermType, term_count: u64, document_count: u32, fields: &[usize]) -> TermEntry {
        let mut field_bitmap = BitVec::from_elem(8, false);
        for &f in fields {
            field_bitmap.set(f, true);
        }
        TermEntry {
            term_type,
            term_count,
            document_count,
            locator: DataLocator {
                offset: 100,
                length: 10,
            },
            field_bitmap,
        }
    }

    fn build(dir: &std::path::Path, terms: &[(&str, TermEntry)]) -> DictReader {
        let path = dir.join("term.dct");
        let mut writer = DictWriter::create(&path, 256).unwrap();
        for (term, e) in terms {
            add_term(&mut writer, term, e).unwrap();
        }
        writer.finish().unwrap();
        DictReader::open(&path).unwrap()
    }

    #[test]
    fn test_entry_round_trip() {
        let original = entry(TermType::Regular, 42, 7, &[0, 3]);
        let decoded = TermEntry::decode(&original.encode(), 8).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_zero_count_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = DictWriter::create(dir.path().join("term.dct"), 256).unwrap();
        let zero = entry(TermType::Regular, 0, 0, &[0]);
        assert!(add_term(&mut writer, "ghost", &zero).is_err());
    }

    #[test]
    fn test_lookup_found_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let dict = build(dir.path(), &[("fox", entry(TermType::Regular, 5, 2, &[0]))]);

        let found = lookup(&dict, "fox", None, 8).unwrap();
        assert_eq!(found.term_count, 5);
        assert!(matches!(
            lookup(&dict, "wolf", None, 8),
            Err(CallunaError::TermNotFound(_))
        ));
    }

    #[test]
    fn test_lookup_field_restriction() {
        let dir = tempfile::tempdir().unwrap();
        let dict = build(dir.path(), &[("fox", entry(TermType::Regular, 5, 2, &[1]))]);

        let mut matching = BitVec::from_elem(8, false);
        matching.set(1, true);
        assert!(lookup(&dict, "fox", Some(&matching), 8).is_ok());

        let mut disjoint = BitVec::from_elem(8, false);
        disjoint.set(4, true);
        assert!(matches!(
            lookup(&dict, "fox", Some(&disjoint), 8),
            Err(CallunaError::TermDoesNotOccur(_))
        ));
    }

    #[test]
    fn test_wildcard_list() {
        let dir = tempfile::tempdir().unwrap();
        let dict = build(
            dir.path(),
            &[
                ("fog", entry(TermType::Regular, 1, 1, &[0])),
                ("fox", entry(TermType::Regular, 5, 2, &[0])),
                ("foxes", entry(TermType::Regular, 2, 1, &[0])),
                ("ox", entry(TermType::Regular, 1, 1, &[0])),
            ],
        );

        let terms: Vec<_> = list(&dict, 0, Some("fox*"), None, TermMatch::Wildcard, None, 8)
            .unwrap()
            .into_iter()
            .map(|i| i.term)
            .collect();
        assert_eq!(terms, vec!["fox", "foxes"]);

        let single: Vec<_> = list(&dict, 0, Some("fo?"), None, TermMatch::Wildcard, None, 8)
            .unwrap()
            .into_iter()
            .map(|i| i.term)
            .collect();
        assert_eq!(single, vec!["fog", "fox"]);
    }

    #[test]
    fn test_soundex_list() {
        let dir = tempfile::tempdir().unwrap();
        let dict = build(
            dir.path(),
            &[
                ("robert", entry(TermType::Regular, 1, 1, &[0])),
                ("rupert", entry(TermType::Regular, 1, 1, &[0])),
                ("dog", entry(TermType::Regular, 1, 1, &[0])),
            ],
        );

        let terms: Vec<_> = list(&dict, 0, Some("robert"), None, TermMatch::Soundex, None, 8)
            .unwrap()
            .into_iter()
            .map(|i| i.term)
            .collect();
        assert_eq!(terms, vec!["robert", "rupert"]);
    }

    #[test]
    fn test_typo_list() {
        let dir = tempfile::tempdir().unwrap();
        let dict = build(
            dir.path(),
            &[
                ("color", entry(TermType::Regular, 1, 1, &[0])),
                ("colour", entry(TermType::Regular, 1, 1, &[0])),
                ("colours", entry(TermType::Regular, 1, 1, &[0])),
            ],
        );

        let terms: Vec<_> = list(&dict, 0, Some("color"), None, TermMatch::Typo, None, 8)
            .unwrap()
            .into_iter()
            .map(|i| i.term)
            .collect();
        assert_eq!(terms, vec!["color", "colour"]);
    }

    #[test]
    fn test_term_range_list() {
        let dir = tempfile::tempdir().unwrap();
        let dict = build(
            dir.path(),
            &[
                ("alpha", entry(TermType::Regular, 1, 1, &[0])),
                ("beta", entry(TermType::Regular, 1, 1, &[0])),
                ("gamma", entry(TermType::Regular, 1, 1, &[0])),
            ],
        );

        let terms: Vec<_> = list(
            &dict,
            0,
            Some("beta"),
            None,
            TermMatch::TermRange,
            Some(RangeOp::Greater),
            8,
        )
        .unwrap()
        .into_iter()
        .map(|i| i.term)
        .collect();
        assert_eq!(terms, vec!["gamma"]);
    }

    #[test]
    fn test_case_range_list() {
        let dir = tempfile::tempdir().unwrap();
        let dict = build(
            dir.path(),
            &[
                ("Information", entry(TermType::Regular, 1, 1, &[0])),
                ("information", entry(TermType::Regular, 1, 1, &[0])),
                ("informer", entry(TermType::Regular, 1, 1, &[0])),
            ],
        );

        let terms: Vec<_> = list(
            &dict,
            0,
            Some("INFORMATION"),
            None,
            TermMatch::Range,
            Some(RangeOp::Equal),
            8,
        )
        .unwrap()
        .into_iter()
        .map(|i| i.term)
        .collect();
        assert_eq!(terms, vec!["Information", "information"]);
    }

    #[test]
    fn test_bad_regex_reported() {
        let dir = tempfile::tempdir().unwrap();
        let dict = build(dir.path(), &[("a", entry(TermType::Regular, 1, 1, &[0]))]);
        assert!(matches!(
            list(&dict, 0, Some("(unclosed"), None, TermMatch::Regex, None, 8),
            Err(CallunaError::RegexCompileFailed(_))
        ));
    }
}
