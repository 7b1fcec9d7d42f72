//! Error types for Calluna.
//!
//! Every public operation returns [`Result`]. Parser errors carry the
//! engine's fixed user-visible message; lifecycle errors carry context.

use thiserror::Error;

/// The crate-wide error type.
#[derive(Error, Debug)]
pub enum CallunaError {
    // -- Index lifecycle --
    /// The index handle or its state is unusable.
    #[error("invalid index: {0}")]
    InvalidIndex(String),

    /// The index directory path is missing, inaccessible, or not a directory.
    #[error("invalid index path: {0}")]
    InvalidIndexPath(String),

    /// The index name is not a pure base name.
    #[error("invalid index name: {0}")]
    InvalidIndexName(String),

    /// The open intent is not one of Create/Search.
    #[error("invalid index intent")]
    InvalidIntent,

    /// The advisory lock could not be acquired (exclusive holder present).
    #[error("failed to lock index: {0}")]
    LockFailed(String),

    /// The advisory lock acquisition timed out.
    #[error("timed out waiting to lock index: {0}")]
    LockTimeout(String),

    /// The advisory lock could not be released.
    #[error("failed to unlock index: {0}")]
    UnlockFailed(String),

    /// Opening an existing index failed.
    #[error("failed to open index: {0}")]
    OpenFailed(String),

    /// Creating a new index failed.
    #[error("failed to create index: {0}")]
    CreateFailed(String),

    /// Closing an index failed.
    #[error("failed to close index: {0}")]
    CloseFailed(String),

    // -- Term dictionary --
    /// The term is not present in the dictionary.
    #[error("term not found: {0}")]
    TermNotFound(String),

    /// The term exists but does not occur in the requested fields.
    #[error("term does not occur: {0}")]
    TermDoesNotOccur(String),

    // -- Parser (fixed user-visible message table) --
    #[error("Search contains an invalid range")]
    InvalidRange,

    #[error("Search contains an invalid operator")]
    InvalidOperator,

    #[error("Search contains an invalid modifier")]
    InvalidModifier,

    #[error("Search contains an invalid function")]
    InvalidFunction,

    #[error("Search contains an invalid token")]
    InvalidToken,

    #[error("Search contains an uneven number of brackets")]
    InvalidBracket,

    #[error("Search contains an uneven number of quotes")]
    InvalidQuote,

    #[error("Search contains an invalid wildcard")]
    InvalidWildCard,

    #[error("Search contains invalid syntax")]
    InvalidSyntax,

    #[error("Search contains an invalid operator distance")]
    InvalidOperatorDistance,

    #[error("Search contains an invalid 'NOT' operator")]
    InvalidNotOperator,

    #[error("Search contains an invalid sort")]
    InvalidSort,

    #[error("Search contains an invalid sort order")]
    InvalidSortOrder,

    #[error("Search contains an invalid date")]
    InvalidDate,

    #[error("Search contains an invalid term weight")]
    InvalidTermWeight,

    #[error("Search contains an invalid feedback term weight")]
    InvalidFeedbackTermWeight,

    #[error("Search contains an invalid frequent term coverage threshold")]
    InvalidFrequentTermCoverageThreshold,

    #[error("Search contains an invalid feedback minimum term count")]
    InvalidFeedbackMinimumTermCount,

    #[error("Search contains an invalid feedback maximum term percentage")]
    InvalidFeedbackMaximumTermPercentage,

    #[error("Search contains an invalid feedback maximum term coverage threshold")]
    InvalidFeedbackMaximumTermCoverageThreshold,

    #[error("Search contains an invalid connection timeout")]
    InvalidConnectionTimeout,

    #[error("Search contains an invalid search timeout")]
    InvalidSearchTimeout,

    #[error("Search contains an invalid retrieval timeout")]
    InvalidRetrievalTimeout,

    #[error("Search contains an invalid information timeout")]
    InvalidInformationTimeout,

    #[error("Search contains an invalid maximum number of segments searched")]
    InvalidSegmentsSearchedMaximum,

    #[error("Search contains an invalid minimum number of segments searched")]
    InvalidSegmentsSearchedMinimum,

    #[error("Search contains an invalid exclusion filter")]
    InvalidExclusionFilter,

    #[error("Search contains an invalid inclusion filter")]
    InvalidInclusionFilter,

    #[error("Search contains an invalid language")]
    InvalidLanguage,

    /// A `regex[...]` term failed to compile.
    #[error("Search contains a regular expression which failed to compile: {0}")]
    RegexCompileFailed(String),

    #[error("failed to convert character sets: {0}")]
    CharacterSetConversionFailed(String),

    #[error("failed to tokenize text: {0}")]
    TokenizationFailed(String),

    // -- Feedback --
    #[error("invalid search state for feedback")]
    InvalidSearch,

    #[error("invalid feedback text")]
    InvalidFeedbackText,

    #[error("invalid language ID: {0}")]
    InvalidLanguageId(u32),

    #[error("invalid document ID: {0}")]
    InvalidDocumentId(u32),

    #[error("failed to create a tokenizer: {0}")]
    CreateTokenizerFailed(String),

    #[error("failed to create a stemmer: {0}")]
    CreateStemmerFailed(String),

    #[error("failed to create a term trie: {0}")]
    CreateTrieFailed(String),

    #[error("failed to stem a term: {0}")]
    StemmingFailed(String),

    // -- Shared --
    #[error("invalid parameter: {0}")]
    Parameter(String),

    #[error("{0}")]
    Misc(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CallunaError {
    /// Create an invalid-index error.
    pub fn invalid_index<S: Into<String>>(message: S) -> Self {
        CallunaError::InvalidIndex(message.into())
    }

    /// Create an invalid-parameter error.
    pub fn parameter<S: Into<String>>(message: S) -> Self {
        CallunaError::Parameter(message.into())
    }

    /// Create a miscellaneous error.
    pub fn misc<S: Into<String>>(message: S) -> Self {
        CallunaError::Misc(message.into())
    }

    /// True for the two lookup outcomes feedback treats as non-fatal.
    pub fn is_term_miss(&self) -> bool {
        matches!(
            self,
            CallunaError::TermNotFound(_) | CallunaError::TermDoesNotOccur(_)
        )
    }
}

impl From<fst::Error> for CallunaError {
    fn from(err: fst::Error) -> Self {
        CallunaError::Misc(format!("fst error: {err}"))
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CallunaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_error_messages_are_stable() {
        assert_eq!(
            CallunaError::InvalidRange.to_string(),
            "Search contains an invalid range"
        );
        assert_eq!(
            CallunaError::InvalidBracket.to_string(),
            "Search contains an uneven number of brackets"
        );
        assert_eq!(
            CallunaError::InvalidNotOperator.to_string(),
            "Search contains an invalid 'NOT' operator"
        );
    }

    #[test]
    fn test_term_miss_classification() {
        assert!(CallunaError::TermNotFound("x".into()).is_term_miss());
        assert!(CallunaError::TermDoesNotOccur("x".into()).is_term_miss());
        assert!(!CallunaError::InvalidRange.is_term_miss());
    }
}
