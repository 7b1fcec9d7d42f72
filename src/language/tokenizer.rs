//! Tokenizers.
//!
//! The default tokenizer segments on Unicode word boundaries. Tokens in
//! scripts without word delimiters (CJK ideographs, kana, hangul, Thai)
//! additionally expose per-character components, which the parser expands
//! into adjacency groups and feedback indexes individually.

use unicode_segmentation::UnicodeSegmentation;

use crate::error::{CallunaError, Result};

/// A token produced from input text, with byte offsets into the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
    /// Subtoken components for undelimited scripts, empty otherwise.
    pub components: Vec<&'a str>,
}

/// Tokenizes text into terms.
pub trait Tokenizer: Send {
    /// Split `text` into tokens.
    fn tokenize<'a>(&self, text: &'a str) -> Vec<Token<'a>>;

    /// The tokenizer's registered name.
    fn name(&self) -> &str;
}

/// Tokenizers known to the engine: `(name, id)`.
const TOKENIZERS: &[(&str, u32)] = &[("unicode", 1), ("whitespace", 2)];

/// Convert a tokenizer name to its ID.
pub fn tokenizer_id_from_name(name: &str) -> Result<u32> {
    TOKENIZERS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, id)| *id)
        .ok_or_else(|| CallunaError::parameter(format!("unknown tokenizer: '{name}'")))
}

/// Convert a tokenizer ID to its name.
pub fn tokenizer_name_from_id(id: u32) -> Result<&'static str> {
    TOKENIZERS
        .iter()
        .find(|(_, i)| *i == id)
        .map(|(n, _)| *n)
        .ok_or_else(|| CallunaError::parameter(format!("unknown tokenizer ID: {id}")))
}

/// Create a tokenizer by ID. The language ID is accepted for parity with
/// the registry interface; the shipped tokenizers are language-neutral.
pub fn create_tokenizer(tokenizer_id: u32, _language_id: u32) -> Result<Box<dyn Tokenizer>> {
    match tokenizer_id {
        1 => Ok(Box::new(UnicodeTokenizer)),
        2 => Ok(Box::new(WhitespaceTokenizer)),
        _ => Err(CallunaError::CreateTokenizerFailed(format!(
            "unknown tokenizer ID: {tokenizer_id}"
        ))),
    }
}

/// True for scripts indexed character by character.
pub fn is_undelimited_char(c: char) -> bool {
    matches!(c,
        '\u{2E80}'..='\u{2EFF}'     // CJK radicals
        | '\u{3040}'..='\u{309F}'   // hiragana
        | '\u{30A0}'..='\u{30FF}'   // katakana
        | '\u{3400}'..='\u{4DBF}'   // CJK extension A
        | '\u{4E00}'..='\u{9FFF}'   // CJK unified
        | '\u{F900}'..='\u{FAFF}'   // CJK compatibility
        | '\u{AC00}'..='\u{D7AF}'   // hangul syllables
        | '\u{0E00}'..='\u{0E7F}'   // Thai
    )
}

fn components_of(text: &str) -> Vec<&str> {
    if text.chars().count() > 1 && text.chars().all(is_undelimited_char) {
        text.grapheme_indices(true)
            .map(|(start, grapheme)| &text[start..start + grapheme.len()])
            .collect()
    } else {
        Vec::new()
    }
}

/// Unicode word-boundary tokenizer, the default.
#[derive(Debug, Clone, Copy)]
pub struct UnicodeTokenizer;

impl Tokenizer for UnicodeTokenizer {
    fn tokenize<'a>(&self, text: &'a str) -> Vec<Token<'a>> {
        text.unicode_word_indices()
            .map(|(start, word)| Token {
                text: word,
                start,
                end: start + word.len(),
                components: components_of(word),
            })
            .collect()
    }

    fn name(&self) -> &str {
        "unicode"
    }
}

/// Whitespace tokenizer, for pre-tokenized input streams.
#[derive(Debug, Clone, Copy)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn tokenize<'a>(&self, text: &'a str) -> Vec<Token<'a>> {
        let mut tokens = Vec::new();
        let mut start = None;
        for (i, c) in text.char_indices() {
            if c.is_whitespace() {
                if let Some(s) = start.take() {
                    tokens.push(Token {
                        text: &text[s..i],
                        start: s,
                        end: i,
                        components: components_of(&text[s..i]),
                    });
                }
            } else if start.is_none() {
                start = Some(i);
            }
        }
        if let Some(s) = start {
            tokens.push(Token {
                text: &text[s..],
                start: s,
                end: text.len(),
                components: components_of(&text[s..]),
            });
        }
        tokens
    }

    fn name(&self) -> &str {
        "whitespace"
    }
}
