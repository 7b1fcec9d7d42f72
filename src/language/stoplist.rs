//! Stop lists.
//!
//! A stop list is selected at index-create time either by built-in name
//! or from a file of one term per line; `index.inf` records which, so a
//! search-intent open can rebuild the same list.

use std::fs;
use std::path::Path;

use ahash::AHashSet;

use crate::error::{CallunaError, Result};

/// Stop list source recorded in the index configuration.
pub const STOP_LIST_TYPE_INTERNAL: u32 = 1;
pub const STOP_LIST_TYPE_FILE: u32 = 2;

/// Tests terms for stop status.
pub trait StopList: Send {
    fn is_stop(&self, term: &str) -> bool;

    /// The list's registered name (or file path for file lists).
    fn name(&self) -> &str;
}

/// The built-in English stop list.
const ENGLISH_STOP_TERMS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "had", "has", "have",
    "he", "her", "his", "if", "in", "into", "is", "it", "its", "no", "not", "of", "on", "or",
    "over", "she", "such", "that", "the", "their", "then", "there", "these", "they", "this", "to",
    "was", "were", "will", "with",
];

/// Empty stop list.
#[derive(Debug, Clone, Copy)]
pub struct NoStopList;

impl StopList for NoStopList {
    fn is_stop(&self, _term: &str) -> bool {
        false
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Stop list backed by a term set.
#[derive(Debug)]
pub struct TermSetStopList {
    name: String,
    terms: AHashSet<String>,
}

impl StopList for TermSetStopList {
    fn is_stop(&self, term: &str) -> bool {
        self.terms.contains(&term.to_lowercase())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Create a built-in stop list by name.
pub fn create_stop_list(name: &str) -> Result<Box<dyn StopList>> {
    match name {
        "none" => Ok(Box::new(NoStopList)),
        "english" => Ok(Box::new(TermSetStopList {
            name: "english".to_string(),
            terms: ENGLISH_STOP_TERMS.iter().map(|t| t.to_string()).collect(),
        })),
        _ => Err(CallunaError::parameter(format!(
            "unknown stop list: '{name}'"
        ))),
    }
}

/// Create a stop list from a file of one term per line.
pub fn create_stop_list_from_file<P: AsRef<Path>>(path: P) -> Result<Box<dyn StopList>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let terms = text
        .lines()
        .map(|line| line.trim().to_lowercase())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();
    Ok(Box::new(TermSetStopList {
        name: path.to_string_lossy().into_owned(),
        terms,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_english_list() {
        let list = create_stop_list("english").unwrap();
        assert!(list.is_stop("the"));
        assert!(list.is_stop("The"));
        assert!(!list.is_stop("fox"));
    }

    #[test]
    fn test_none_list() {
        let list = create_stop_list("none").unwrap();
        assert!(!list.is_stop("the"));
    }

    #[test]
    fn test_unknown_name() {
        assert!(create_stop_list("martian").is_err());
    }

    #[test]
    fn test_file_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stop.txt");
        std::fs::write(&path, "# comment\nfoo\nBar\n\n").unwrap();

        let list = create_stop_list_from_file(&path).unwrap();
        assert!(list.is_stop("foo"));
        assert!(list.is_stop("bar"));
        assert!(!list.is_stop("comment"));
    }
}
