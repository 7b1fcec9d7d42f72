//! Language layer: tokenizers, stemmers, stop lists, and phonetic keys.
//!
//! An index records its language, tokenizer, stemmer, and stop list by
//! name in `index.inf`; opening for search converts the names back
//! through the registries here. Unknown names fail the open.

pub mod phonetic;
pub mod stemmer;
pub mod stoplist;
pub mod tokenizer;

use crate::error::{CallunaError, Result};

/// Language ID matching any language.
pub const LANGUAGE_ANY_ID: u32 = 0;

/// Languages known to the engine: `(code, id)`.
const LANGUAGES: &[(&str, u32)] = &[
    ("en", 1),
    ("fr", 2),
    ("de", 3),
    ("es", 4),
    ("it", 5),
    ("nl", 6),
    ("pt", 7),
    ("sv", 8),
    ("no", 9),
    ("da", 10),
    ("fi", 11),
    ("ru", 12),
    ("ja", 13),
    ("zh", 14),
    ("ko", 15),
    ("th", 16),
];

/// Convert a language code to its ID.
pub fn language_id_from_code(code: &str) -> Result<u32> {
    let lowered = code.to_ascii_lowercase();
    LANGUAGES
        .iter()
        .find(|(c, _)| *c == lowered)
        .map(|(_, id)| *id)
        .ok_or_else(|| CallunaError::parameter(format!("unknown language code: '{code}'")))
}

/// Convert a language ID to its code.
pub fn language_code_from_id(id: u32) -> Result<&'static str> {
    LANGUAGES
        .iter()
        .find(|(_, i)| *i == id)
        .map(|(c, _)| *c)
        .ok_or(CallunaError::InvalidLanguageId(id))
}

/// True if the string has at least one cased character and no lowercase ones.
pub fn is_all_upper_case(text: &str) -> bool {
    let mut saw_upper = false;
    for c in text.chars() {
        if c.is_lowercase() {
            return false;
        }
        if c.is_uppercase() {
            saw_upper = true;
        }
    }
    saw_upper
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_round_trip() {
        let id = language_id_from_code("en").unwrap();
        assert_eq!(language_code_from_id(id).unwrap(), "en");
        assert_eq!(language_id_from_code("EN").unwrap(), id);
        assert!(language_id_from_code("xx").is_err());
        assert!(language_code_from_id(9999).is_err());
    }

    #[test]
    fn test_is_all_upper_case() {
        assert!(is_all_upper_case("NASA"));
        assert!(is_all_upper_case("R2D2"));
        assert!(!is_all_upper_case("Nasa"));
        assert!(!is_all_upper_case("nasa"));
        assert!(!is_all_upper_case("1234"));
    }
}
