//! Line-oriented key/value configuration file (`index.inf`).
//!
//! The file is free text: one `key=value` pair per line, `#` starts a
//! comment line. Unknown keys are preserved across a rewrite so newer
//! versions can add keys without older readers dropping them.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::warn;

use crate::error::{CallunaError, Result};

/// Open mode for a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigMode {
    /// Created empty, written out on close.
    Create,
    /// Opened read-only; the file must exist.
    Open,
}

/// A line-oriented key/value configuration file.
#[derive(Debug)]
pub struct ConfigFile {
    path: PathBuf,
    /// Entries in file order. Comment lines are kept with an empty key.
    lines: Vec<ConfigLine>,
    mode: ConfigMode,
}

#[derive(Debug)]
enum ConfigLine {
    Entry { key: String, value: String },
    Verbatim(String),
}

impl ConfigFile {
    /// Create a new, empty configuration file. The file itself is written
    /// when the configuration is closed.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(ConfigFile {
            path: path.as_ref().to_path_buf(),
            lines: Vec::new(),
            mode: ConfigMode::Create,
        })
    }

    /// Open an existing configuration file read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;

        let mut lines = Vec::new();
        for raw in text.lines() {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                lines.push(ConfigLine::Verbatim(raw.to_string()));
                continue;
            }
            match trimmed.split_once('=') {
                Some((key, value)) => lines.push(ConfigLine::Entry {
                    key: key.trim().to_string(),
                    value: value.trim().to_string(),
                }),
                None => {
                    warn!("ignoring malformed configuration line: '{raw}'");
                    lines.push(ConfigLine::Verbatim(raw.to_string()));
                }
            }
        }

        Ok(ConfigFile {
            path: path.to_path_buf(),
            lines,
            mode: ConfigMode::Open,
        })
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().rev().find_map(|line| match line {
            ConfigLine::Entry { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Get a value by key, parsed into `T`.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Result<T> {
        let value = self
            .get(key)
            .ok_or_else(|| CallunaError::parameter(format!("missing configuration key: '{key}'")))?;
        value.parse::<T>().map_err(|_| {
            CallunaError::parameter(format!(
                "invalid configuration value for key '{key}': '{value}'"
            ))
        })
    }

    /// Get a required value by key.
    pub fn get_required(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| CallunaError::parameter(format!("missing configuration key: '{key}'")))
    }

    /// Set a key to a value, replacing an existing entry for the key.
    pub fn set<V: ToString>(&mut self, key: &str, value: V) {
        let value = value.to_string();
        for line in self.lines.iter_mut() {
            if let ConfigLine::Entry { key: k, value: v } = line {
                if k == key {
                    *v = value;
                    return;
                }
            }
        }
        self.lines.push(ConfigLine::Entry {
            key: key.to_string(),
            value,
        });
    }

    /// Close the configuration, writing it out if it was created.
    pub fn close(self) -> Result<()> {
        if self.mode == ConfigMode::Create {
            let mut file = fs::File::create(&self.path)?;
            for line in &self.lines {
                match line {
                    ConfigLine::Entry { key, value } => writeln!(file, "{key}={value}")?,
                    ConfigLine::Verbatim(raw) => writeln!(file, "{raw}")?,
                }
            }
            file.sync_all()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_set_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.inf");

        let mut config = ConfigFile::create(&path).unwrap();
        config.set("language", "en");
        config.set("document-count", 42u32);
        config.set("language", "fr");
        config.close().unwrap();

        let config = ConfigFile::open(&path).unwrap();
        assert_eq!(config.get("language"), Some("fr"));
        assert_eq!(config.get_parsed::<u32>("document-count").unwrap(), 42);
        assert!(config.get("missing").is_none());
    }

    #[test]
    fn test_open_preserves_comments_and_rejects_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.inf");
        std::fs::write(&path, "# heather\nstemmer=porter\n").unwrap();

        let config = ConfigFile::open(&path).unwrap();
        assert_eq!(config.get("stemmer"), Some("porter"));
        assert!(config.get_required("tokenizer").is_err());
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ConfigFile::open(dir.path().join("absent.inf")).is_err());
    }
}
