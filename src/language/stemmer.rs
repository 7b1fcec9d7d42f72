//! Stemmers.
//!
//! Stemmer choice is fixed at index-create time and recorded in
//! `index.inf` by name; search and feedback re-create the same stemmer
//! from that name.

use rust_stemmers::Algorithm;

use crate::error::{CallunaError, Result};
use crate::language;

/// Reduces a term to its stem.
pub trait Stemmer: Send {
    fn stem(&self, term: &str) -> String;

    /// The stemmer's registered name.
    fn name(&self) -> &str;
}

/// Stemmers known to the engine: `(name, id)`.
const STEMMERS: &[(&str, u32)] = &[("none", 1), ("snowball", 2)];

/// Convert a stemmer name to its ID.
pub fn stemmer_id_from_name(name: &str) -> Result<u32> {
    STEMMERS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, id)| *id)
        .ok_or_else(|| CallunaError::parameter(format!("unknown stemmer: '{name}'")))
}

/// Convert a stemmer ID to its name.
pub fn stemmer_name_from_id(id: u32) -> Result<&'static str> {
    STEMMERS
        .iter()
        .find(|(_, i)| *i == id)
        .map(|(n, _)| *n)
        .ok_or_else(|| CallunaError::parameter(format!("unknown stemmer ID: {id}")))
}

/// Create a stemmer by ID for a language.
pub fn create_stemmer(stemmer_id: u32, language_id: u32) -> Result<Box<dyn Stemmer>> {
    match stemmer_id {
        1 => Ok(Box::new(NoStemmer)),
        2 => {
            let algorithm = match language::language_code_from_id(language_id).unwrap_or("en") {
                "fr" => Algorithm::French,
                "de" => Algorithm::German,
                "es" => Algorithm::Spanish,
                "it" => Algorithm::Italian,
                "nl" => Algorithm::Dutch,
                "pt" => Algorithm::Portuguese,
                "sv" => Algorithm::Swedish,
                "no" => Algorithm::Norwegian,
                "da" => Algorithm::Danish,
                "fi" => Algorithm::Finnish,
                "ru" => Algorithm::Russian,
                _ => Algorithm::English,
            };
            Ok(Box::new(SnowballStemmer {
                inner: rust_stemmers::Stemmer::create(algorithm),
            }))
        }
        _ => Err(CallunaError::CreateStemmerFailed(format!(
            "unknown stemmer ID: {stemmer_id}"
        ))),
    }
}

/// Identity stemmer.
#[derive(Debug, Clone, Copy)]
pub struct NoStemmer;

impl Stemmer for NoStemmer {
    fn stem(&self, term: &str) -> String {
        term.to_string()
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Snowball stemmer for the index language.
pub struct SnowballStemmer {
    inner: rust_stemmers::Stemmer,
}

impl Stemmer for SnowballStemmer {
    fn stem(&self, term: &str) -> String {
        self.inner.stem(term).into_owned()
    }

    fn name(&self) -> &str {
        "snowball"
    }
}
