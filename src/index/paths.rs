//! File paths for the files that make up an index.
//!
//! Pure string composition: given an index path and a role, return the
//! canonical file path. Temporary build files are numbered and may live
//! in an override directory; a `-` between the role suffix and the
//! version marks a shadow file.

use std::path::{Path, PathBuf};

use crate::error::{CallunaError, Result};

/// Index file names.
pub const TERM_DICTIONARY_FILE_NAME: &str = "term.dct";
pub const KEY_DICTIONARY_FILE_NAME: &str = "key.dct";
pub const DOCUMENT_TABLE_FILE_NAME: &str = "document.tab";
pub const DOCUMENT_DATA_FILE_NAME: &str = "document.dat";
pub const INDEX_DATA_FILE_NAME: &str = "index.dat";
pub const INDEX_INFORMATION_FILE_NAME: &str = "index.inf";
pub const INDEX_LOCK_FILE_NAME: &str = "index.lck";

/// Temporary file role suffixes.
const TEMP_TERM_FILE_ROLE: &str = "term";
const TEMP_KEY_FILE_ROLE: &str = "key";

/// Path composition for one index directory.
#[derive(Debug, Clone)]
pub struct IndexPaths {
    index_path: PathBuf,
    index_name: String,
    temporary_directory: Option<PathBuf>,
}

impl IndexPaths {
    /// Create path composition for the index at `index_path`.
    pub fn new<P: AsRef<Path>>(index_path: P, index_name: &str) -> Result<Self> {
        let index_path = index_path.as_ref();
        if index_path.as_os_str().is_empty() {
            return Err(CallunaError::InvalidIndexPath(
                "index path must not be empty".to_string(),
            ));
        }
        if index_name.is_empty() {
            return Err(CallunaError::InvalidIndexName(
                "index name must not be empty".to_string(),
            ));
        }
        Ok(IndexPaths {
            index_path: index_path.to_path_buf(),
            index_name: index_name.to_string(),
            temporary_directory: None,
        })
    }

    /// Place temporary build files in `directory` instead of beside the index.
    pub fn with_temporary_directory<P: AsRef<Path>>(mut self, directory: P) -> Self {
        self.temporary_directory = Some(directory.as_ref().to_path_buf());
        self
    }

    /// The index directory itself.
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn term_dictionary(&self) -> PathBuf {
        self.index_path.join(TERM_DICTIONARY_FILE_NAME)
    }

    pub fn key_dictionary(&self) -> PathBuf {
        self.index_path.join(KEY_DICTIONARY_FILE_NAME)
    }

    pub fn document_table(&self) -> PathBuf {
        self.index_path.join(DOCUMENT_TABLE_FILE_NAME)
    }

    pub fn document_data(&self) -> PathBuf {
        self.index_path.join(DOCUMENT_DATA_FILE_NAME)
    }

    pub fn index_data(&self) -> PathBuf {
        self.index_path.join(INDEX_DATA_FILE_NAME)
    }

    pub fn index_information(&self) -> PathBuf {
        self.index_path.join(INDEX_INFORMATION_FILE_NAME)
    }

    pub fn index_lock(&self) -> PathBuf {
        self.index_path.join(INDEX_LOCK_FILE_NAME)
    }

    /// Temporary term index file for a build segment.
    pub fn temp_term_dictionary(&self, version: u32, shadow: bool) -> PathBuf {
        self.temp_file(TEMP_TERM_FILE_ROLE, version, shadow)
    }

    /// Temporary key index file for a build segment.
    pub fn temp_key_dictionary(&self, version: u32, shadow: bool) -> PathBuf {
        self.temp_file(TEMP_KEY_FILE_ROLE, version, shadow)
    }

    fn temp_file(&self, role: &str, version: u32, shadow: bool) -> PathBuf {
        let file_name = format!(
            "{}-{}.{}{:03}",
            self.index_name,
            role,
            if shadow { "-" } else { "" },
            version
        );
        match &self.temporary_directory {
            Some(directory) => directory.join(file_name),
            None => self.index_path.join(file_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_paths() {
        let paths = IndexPaths::new("/indexes/news", "news").unwrap();
        assert_eq!(
            paths.term_dictionary(),
            PathBuf::from("/indexes/news/term.dct")
        );
        assert_eq!(
            paths.document_table(),
            PathBuf::from("/indexes/news/document.tab")
        );
        assert_eq!(paths.index_lock(), PathBuf::from("/indexes/news/index.lck"));
    }

    #[test]
    fn test_temp_file_naming() {
        let paths = IndexPaths::new("/indexes/news", "news").unwrap();
        assert_eq!(
            paths.temp_term_dictionary(7, false),
            PathBuf::from("/indexes/news/news-term.007")
        );
        assert_eq!(
            paths.temp_term_dictionary(7, true),
            PathBuf::from("/indexes/news/news-term.-007")
        );
        assert_eq!(
            paths.temp_key_dictionary(12, false),
            PathBuf::from("/indexes/news/news-key.012")
        );
    }

    #[test]
    fn test_temp_directory_override() {
        let paths = IndexPaths::new("/indexes/news", "news")
            .unwrap()
            .with_temporary_directory("/scratch");
        assert_eq!(
            paths.temp_term_dictionary(1, false),
            PathBuf::from("/scratch/news-term.001")
        );
    }

    #[test]
    fn test_empty_arguments_rejected() {
        assert!(IndexPaths::new("", "news").is_err());
        assert!(IndexPaths::new("/indexes/news", "").is_err());
    }
}
