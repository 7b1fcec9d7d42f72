//! Index lifecycle: open, build, search, close, abort.
//!
//! An [`Index`] owns every container handle for one on-disk index plus
//! the advisory lock that guards it. It opens with one of two intents:
//! `Create` builds a new index under an exclusive lock; `Search` opens an
//! existing index read-only under a shared lock. A handle never moves
//! between intents.

pub mod build;
pub mod document;
pub mod keydict;
pub mod lock;
pub mod paths;
pub mod postings;
pub mod termdict;

use std::path::{Path, PathBuf};

use bit_vec::BitVec;
use log::{error, warn};

use crate::error::{CallunaError, Result};
use crate::index::build::{BuildState, BUILD_MEMORY_CEILING_DEFAULT};
use crate::index::document::{DocumentEntry, DocumentInfo, DocumentRecord, DOCUMENT_ENTRY_LENGTH};
use crate::index::lock::{IndexLock, LockKind};
use crate::index::paths::IndexPaths;
use crate::index::postings::Posting;
use crate::index::termdict::{TermEntry, TermInfo, TermMatch};
use crate::language;
use crate::language::stemmer;
use crate::language::stoplist::{self, STOP_LIST_TYPE_FILE, STOP_LIST_TYPE_INTERNAL};
use crate::language::tokenizer;
use crate::parser::term::RangeOp;
use crate::store::config::ConfigFile;
use crate::store::data::{DataStoreReader, DataStoreWriter};
use crate::store::dict::{DictReader, DictWriter};
use crate::store::table::{RecordTableReader, RecordTableWriter};

/// Open intent for an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexIntent {
    /// Build a new index. Exclusive.
    Create,
    /// Search an existing index. Shared.
    Search,
}

/// Three-component index format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// The version written into newly created indexes.
pub const INDEX_VERSION: IndexVersion = IndexVersion {
    major: 0,
    minor: 1,
    patch: 0,
};

// index.inf keys.
const INFO_VERSION_MAJOR: &str = "version-major";
const INFO_VERSION_MINOR: &str = "version-minor";
const INFO_VERSION_PATCH: &str = "version-patch";
const INFO_LANGUAGE: &str = "language";
const INFO_TOKENIZER: &str = "tokenizer";
const INFO_STEMMER: &str = "stemmer";
const INFO_STOP_LIST: &str = "stop-list";
const INFO_STOP_LIST_TYPE: &str = "stop-list-type";
const INFO_TERM_LENGTH_MINIMUM: &str = "term-length-minimum";
const INFO_TERM_LENGTH_MAXIMUM: &str = "term-length-maximum";
const INFO_FIELD_NAMES: &str = "field-names";
const INFO_UNFIELDED_SEARCH_FIELD_NAMES: &str = "unfielded-search-field-names";
const INFO_UNIQUE_TERM_COUNT: &str = "unique-term-count";
const INFO_TOTAL_TERM_COUNT: &str = "total-term-count";
const INFO_UNIQUE_STOP_TERM_COUNT: &str = "unique-stop-term-count";
const INFO_TOTAL_STOP_TERM_COUNT: &str = "total-stop-term-count";
const INFO_DOCUMENT_COUNT: &str = "document-count";
const INFO_DOCUMENT_TERM_COUNT_MINIMUM: &str = "document-term-count-minimum";
const INFO_DOCUMENT_TERM_COUNT_MAXIMUM: &str = "document-term-count-maximum";
const INFO_LAST_UPDATE_TIME: &str = "last-update-time";

/// Options for a create-intent open.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub language: String,
    pub tokenizer: String,
    pub stemmer: String,
    /// Built-in stop list name; ignored when `stop_list_file` is set.
    pub stop_list: String,
    pub stop_list_file: Option<PathBuf>,
    pub term_length_minimum: usize,
    pub term_length_maximum: usize,
    /// Field names; field IDs are assigned from 1 in this order.
    pub field_names: Vec<String>,
    /// Fields an unfielded search is restricted to; empty means all.
    pub unfielded_search_field_names: Vec<String>,
    /// Override directory for temporary build files.
    pub temporary_directory: Option<PathBuf>,
    /// In-memory posting ceiling before a spill, in bytes.
    pub memory_ceiling: usize,
    /// Delete the index directory when a create-intent open is aborted.
    pub delete_on_abort: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        IndexOptions {
            language: "en".to_string(),
            tokenizer: "unicode".to_string(),
            stemmer: "snowball".to_string(),
            stop_list: "english".to_string(),
            stop_list_file: None,
            term_length_minimum: 1,
            term_length_maximum: 255,
            field_names: Vec::new(),
            unfielded_search_field_names: Vec::new(),
            temporary_directory: None,
            memory_ceiling: BUILD_MEMORY_CEILING_DEFAULT,
            delete_on_abort: false,
        }
    }
}

/// One document handed to [`Index::add_document`].
#[derive(Debug, Clone, Default)]
pub struct DocumentInput<'a> {
    pub document_key: &'a str,
    pub title: &'a str,
    pub url: Option<&'a str>,
    pub file_path: Option<&'a str>,
    pub start_offset: u64,
    pub end_offset: u64,
    pub rank: u32,
    /// Packed 14-digit `YYYYMMDDHHMMSS`, zero when dateless.
    pub ansi_date: u64,
    pub language_id: u16,
    /// `(field name, text)` pairs; an empty field name means "no field".
    pub fields: Vec<(&'a str, &'a str)>,
}

struct CreateContainers {
    document_table: RecordTableWriter,
    document_data: DataStoreWriter,
    index_data: DataStoreWriter,
    key_dictionary: DictWriter,
    term_dictionary: DictWriter,
}

struct SearchContainers {
    document_table: RecordTableReader,
    document_data: DataStoreReader,
    index_data: DataStoreReader,
    key_dictionary: DictReader,
    term_dictionary: DictReader,
}

enum Containers {
    Create(Box<CreateContainers>),
    Search(Box<SearchContainers>),
}

/// An open index.
pub struct Index {
    name: String,
    paths: IndexPaths,
    intent: IndexIntent,
    version: IndexVersion,

    language_id: u32,
    tokenizer_id: u32,
    stemmer_id: u32,
    stop_list_name: String,
    stop_list_type: u32,
    term_length_minimum: usize,
    term_length_maximum: usize,
    field_names: Vec<String>,
    unfielded_search_field_names: Vec<String>,

    unique_term_count: u64,
    total_term_count: u64,
    unique_stop_term_count: u64,
    total_stop_term_count: u64,
    document_count: u32,
    document_term_count_minimum: u32,
    document_term_count_maximum: u32,
    last_update_time: i64,

    information: Option<ConfigFile>,
    containers: Option<Containers>,
    lock: Option<IndexLock>,
    build: Option<BuildState>,
    delete_on_abort: bool,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("name", &self.name)
            .field("intent", &self.intent)
            .field("document_count", &self.document_count)
            .field("unique_term_count", &self.unique_term_count)
            .finish()
    }
}

impl Index {
    /// Open an index with default options.
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(
        index_directory_path: P,
        configuration_directory_path: Q,
        index_name: &str,
        intent: IndexIntent,
    ) -> Result<Index> {
        Self::open_with_options(
            index_directory_path,
            configuration_directory_path,
            index_name,
            intent,
            IndexOptions::default(),
        )
    }

    /// Open an index.
    ///
    /// `options` applies to create-intent opens; a search-intent open
    /// reads everything the options carry from `index.inf` instead.
    pub fn open_with_options<P: AsRef<Path>, Q: AsRef<Path>>(
        index_directory_path: P,
        configuration_directory_path: Q,
        index_name: &str,
        intent: IndexIntent,
        options: IndexOptions,
    ) -> Result<Index> {
        let index_directory_path = index_directory_path.as_ref();
        let configuration_directory_path = configuration_directory_path.as_ref();

        if index_directory_path.as_os_str().is_empty() {
            error!("Empty index directory path passed to open.");
            return Err(CallunaError::InvalidIndexPath(
                "index directory path must not be empty".to_string(),
            ));
        }
        if configuration_directory_path.as_os_str().is_empty() {
            error!("Empty configuration directory path passed to open.");
            return Err(CallunaError::InvalidIndexPath(
                "configuration directory path must not be empty".to_string(),
            ));
        }
        if index_name.is_empty() {
            error!("Empty index name passed to open.");
            return Err(CallunaError::InvalidIndexName(
                "index name must not be empty".to_string(),
            ));
        }
        if !is_base_name(index_name) {
            error!("Invalid index name, index: '{index_name}'.");
            return Err(CallunaError::InvalidIndexName(index_name.to_string()));
        }

        let index_path = index_directory_path.join(index_name);
        let mut paths = IndexPaths::new(&index_path, index_name)?;
        if let Some(directory) = &options.temporary_directory {
            paths = paths.with_temporary_directory(directory);
        }

        match intent {
            IndexIntent::Create => Self::open_create(paths, index_name, options),
            IndexIntent::Search => Self::open_search(paths, index_name, options.delete_on_abort),
        }
    }

    fn open_create(paths: IndexPaths, index_name: &str, options: IndexOptions) -> Result<Index> {
        let index_path = paths.index_path().to_path_buf();

        if !index_path.is_dir() {
            create_directory(&index_path).map_err(|e| {
                error!(
                    "Failed to create index directory, index path: '{}', index: '{index_name}'.",
                    index_path.display()
                );
                e
            })?;
        } else if !has_access(&index_path, libc::R_OK | libc::W_OK | libc::X_OK) {
            error!(
                "Insufficient permissions to create index, index path: '{}', index: '{index_name}'.",
                index_path.display()
            );
            return Err(CallunaError::InvalidIndexPath(
                index_path.display().to_string(),
            ));
        }

        // The lock spans the whole build; the index publishes atomically
        // because no reader can get in before close releases it.
        let lock = IndexLock::acquire(paths.index_lock(), LockKind::Exclusive, index_name)?;

        let language_id = language::language_id_from_code(&options.language)
            .map_err(|_| CallunaError::CreateFailed(format!("unknown language: '{}'", options.language)))?;
        let tokenizer_id = tokenizer::tokenizer_id_from_name(&options.tokenizer)
            .map_err(|_| CallunaError::CreateFailed(format!("unknown tokenizer: '{}'", options.tokenizer)))?;
        let stemmer_id = stemmer::stemmer_id_from_name(&options.stemmer)
            .map_err(|_| CallunaError::CreateFailed(format!("unknown stemmer: '{}'", options.stemmer)))?;

        let (stop_list, stop_list_name, stop_list_type) = match &options.stop_list_file {
            Some(file) => (
                stoplist::create_stop_list_from_file(file)?,
                file.display().to_string(),
                STOP_LIST_TYPE_FILE,
            ),
            None => (
                stoplist::create_stop_list(&options.stop_list)?,
                options.stop_list.clone(),
                STOP_LIST_TYPE_INTERNAL,
            ),
        };

        let mut information = ConfigFile::create(paths.index_information())?;
        information.set(INFO_VERSION_MAJOR, INDEX_VERSION.major);
        information.set(INFO_VERSION_MINOR, INDEX_VERSION.minor);
        information.set(INFO_VERSION_PATCH, INDEX_VERSION.patch);

        let document_table = RecordTableWriter::create(paths.document_table(), DOCUMENT_ENTRY_LENGTH)
            .map_err(|e| CallunaError::CreateFailed(e.to_string()))?;
        let document_data = DataStoreWriter::create(paths.document_data())
            .map_err(|e| CallunaError::CreateFailed(e.to_string()))?;
        let index_data = DataStoreWriter::create(paths.index_data())
            .map_err(|e| CallunaError::CreateFailed(e.to_string()))?;
        let key_dictionary =
            DictWriter::create(paths.key_dictionary(), keydict::DOCUMENT_KEY_MAXIMUM_LENGTH)
                .map_err(|e| CallunaError::CreateFailed(e.to_string()))?;
        let term_dictionary =
            DictWriter::create(paths.term_dictionary(), keydict::DOCUMENT_KEY_MAXIMUM_LENGTH)
                .map_err(|e| CallunaError::CreateFailed(e.to_string()))?;

        let field_id_maximum = options.field_names.len() as u16;
        let build = BuildState::new(
            paths.clone(),
            tokenizer::create_tokenizer(tokenizer_id, language_id)?,
            stemmer::create_stemmer(stemmer_id, language_id)?,
            stop_list,
            field_id_maximum,
            options.term_length_minimum,
            options.term_length_maximum,
            options.memory_ceiling,
        );

        Ok(Index {
            name: index_name.to_string(),
            paths,
            intent: IndexIntent::Create,
            version: INDEX_VERSION,
            language_id,
            tokenizer_id,
            stemmer_id,
            stop_list_name,
            stop_list_type,
            term_length_minimum: options.term_length_minimum,
            term_length_maximum: options.term_length_maximum,
            field_names: options.field_names,
            unfielded_search_field_names: options.unfielded_search_field_names,
            unique_term_count: 0,
            total_term_count: 0,
            unique_stop_term_count: 0,
            total_stop_term_count: 0,
            document_count: 0,
            document_term_count_minimum: 0,
            document_term_count_maximum: 0,
            last_update_time: 0,
            information: Some(information),
            containers: Some(Containers::Create(Box::new(CreateContainers {
                document_table,
                document_data,
                index_data,
                key_dictionary,
                term_dictionary,
            }))),
            lock: Some(lock),
            build: Some(build),
            delete_on_abort: options.delete_on_abort,
        })
    }

    fn open_search(paths: IndexPaths, index_name: &str, delete_on_abort: bool) -> Result<Index> {
        let index_path = paths.index_path();

        if !index_path.is_dir() {
            return Err(CallunaError::InvalidIndexPath(
                index_path.display().to_string(),
            ));
        }
        if !has_access(index_path, libc::R_OK | libc::X_OK) {
            error!(
                "Insufficient permissions to access index, index path: '{}', index: '{index_name}'.",
                index_path.display()
            );
            return Err(CallunaError::InvalidIndexPath(
                index_path.display().to_string(),
            ));
        }
        if !paths.index_lock().is_file() {
            return Err(CallunaError::InvalidIndexPath(format!(
                "missing lock file in '{}'",
                index_path.display()
            )));
        }

        let lock = IndexLock::acquire(paths.index_lock(), LockKind::Shared, index_name)?;

        let information = ConfigFile::open(paths.index_information())
            .map_err(|_| CallunaError::OpenFailed(format!("missing index information, index: '{index_name}'")))?;

        let version = IndexVersion {
            major: read_scalar(&information, INFO_VERSION_MAJOR, index_name)?,
            minor: read_scalar(&information, INFO_VERSION_MINOR, index_name)?,
            patch: read_scalar(&information, INFO_VERSION_PATCH, index_name)?,
        };

        let language_code = information
            .get_required(INFO_LANGUAGE)
            .map_err(|_| open_failed(index_name, INFO_LANGUAGE))?
            .to_string();
        let language_id = language::language_id_from_code(&language_code)
            .map_err(|_| open_failed(index_name, INFO_LANGUAGE))?;

        let tokenizer_name = information
            .get_required(INFO_TOKENIZER)
            .map_err(|_| open_failed(index_name, INFO_TOKENIZER))?
            .to_string();
        let tokenizer_id = tokenizer::tokenizer_id_from_name(&tokenizer_name)
            .map_err(|_| open_failed(index_name, INFO_TOKENIZER))?;

        let stemmer_name = information
            .get_required(INFO_STEMMER)
            .map_err(|_| open_failed(index_name, INFO_STEMMER))?
            .to_string();
        let stemmer_id = stemmer::stemmer_id_from_name(&stemmer_name)
            .map_err(|_| open_failed(index_name, INFO_STEMMER))?;

        let stop_list_name = information
            .get_required(INFO_STOP_LIST)
            .map_err(|_| open_failed(index_name, INFO_STOP_LIST))?
            .to_string();
        let stop_list_type: u32 = read_scalar(&information, INFO_STOP_LIST_TYPE, index_name)?;

        let term_length_minimum: usize =
            read_scalar(&information, INFO_TERM_LENGTH_MINIMUM, index_name)?;
        let term_length_maximum: usize =
            read_scalar(&information, INFO_TERM_LENGTH_MAXIMUM, index_name)?;

        let field_names = split_names(information.get(INFO_FIELD_NAMES).unwrap_or(""));
        let unfielded_search_field_names =
            split_names(information.get(INFO_UNFIELDED_SEARCH_FIELD_NAMES).unwrap_or(""));

        let unique_term_count = read_scalar(&information, INFO_UNIQUE_TERM_COUNT, index_name)?;
        let total_term_count = read_scalar(&information, INFO_TOTAL_TERM_COUNT, index_name)?;
        let unique_stop_term_count =
            read_scalar(&information, INFO_UNIQUE_STOP_TERM_COUNT, index_name)?;
        let total_stop_term_count =
            read_scalar(&information, INFO_TOTAL_STOP_TERM_COUNT, index_name)?;
        let document_count = read_scalar(&information, INFO_DOCUMENT_COUNT, index_name)?;
        let document_term_count_minimum =
            read_scalar(&information, INFO_DOCUMENT_TERM_COUNT_MINIMUM, index_name)?;
        let document_term_count_maximum =
            read_scalar(&information, INFO_DOCUMENT_TERM_COUNT_MAXIMUM, index_name)?;
        let last_update_time = read_scalar(&information, INFO_LAST_UPDATE_TIME, index_name)?;

        let document_table = RecordTableReader::open(paths.document_table(), DOCUMENT_ENTRY_LENGTH)
            .map_err(|e| CallunaError::OpenFailed(e.to_string()))?;
        let document_data = DataStoreReader::open(paths.document_data())
            .map_err(|e| CallunaError::OpenFailed(e.to_string()))?;
        let index_data = DataStoreReader::open(paths.index_data())
            .map_err(|e| CallunaError::OpenFailed(e.to_string()))?;
        let key_dictionary = DictReader::open(paths.key_dictionary())
            .map_err(|e| CallunaError::OpenFailed(e.to_string()))?;
        let term_dictionary = DictReader::open(paths.term_dictionary())
            .map_err(|e| CallunaError::OpenFailed(e.to_string()))?;

        Ok(Index {
            name: index_name.to_string(),
            paths,
            intent: IndexIntent::Search,
            version,
            language_id,
            tokenizer_id,
            stemmer_id,
            stop_list_name,
            stop_list_type,
            term_length_minimum,
            term_length_maximum,
            field_names,
            unfielded_search_field_names,
            unique_term_count,
            total_term_count,
            unique_stop_term_count,
            total_stop_term_count,
            document_count,
            document_term_count_minimum,
            document_term_count_maximum,
            last_update_time,
            information: Some(information),
            containers: Some(Containers::Search(Box::new(SearchContainers {
                document_table,
                document_data,
                index_data,
                key_dictionary,
                term_dictionary,
            }))),
            lock: Some(lock),
            build: None,
            delete_on_abort,
        })
    }

    // -- Build operations --

    /// Assign the next document ID during a build.
    pub fn new_document_id(&mut self) -> Result<u32> {
        let build = self.build.as_mut().ok_or(CallunaError::InvalidIntent)?;
        Ok(build.new_document_id())
    }

    /// True iff `1 <= id <= document_count` for the open index.
    pub fn validate_document_id(&self, id: u32) -> Result<()> {
        let count = match self.intent {
            IndexIntent::Search => self.document_count,
            IndexIntent::Create => self
                .build
                .as_ref()
                .map(|b| b.last_document_id)
                .unwrap_or(0),
        };
        if id >= 1 && id <= count {
            Ok(())
        } else {
            Err(CallunaError::InvalidDocumentId(id))
        }
    }

    /// Index one document: key, payload, and field texts.
    pub fn add_document(&mut self, input: DocumentInput<'_>) -> Result<u32> {
        if self.intent != IndexIntent::Create {
            return Err(CallunaError::InvalidIntent);
        }

        // Resolve field names before splitting the mutable borrows below.
        let mut resolved_fields = Vec::with_capacity(input.fields.len());
        for (name, text) in &input.fields {
            let field_id = if name.is_empty() {
                0u16
            } else {
                self.field_id(name).ok_or_else(|| {
                    CallunaError::parameter(format!("unknown field name: '{name}'"))
                })?
            };
            resolved_fields.push((field_id, *text));
        }

        let build = self.build.as_mut().ok_or(CallunaError::InvalidIndex(
            "build state is missing".to_string(),
        ))?;
        let containers = match self.containers.as_mut() {
            Some(Containers::Create(containers)) => containers,
            _ => return Err(CallunaError::InvalidIntent),
        };

        let document_id = build.new_document_id();

        if !keydict::add_key(&mut containers.key_dictionary, input.document_key, document_id)? {
            build.duplicate_document_key_count += 1;
            warn!(
                "Duplicate document key '{}', document: {document_id}.",
                input.document_key
            );
        }

        let mut position = 0u32;
        let mut term_count = 0u32;
        for (field_id, text) in resolved_fields {
            term_count += build.index_text(document_id, field_id, text, &mut position)?;
        }

        let info = DocumentInfo {
            title: input.title.to_string(),
            document_key: input.document_key.to_string(),
            url: input.url.map(str::to_string),
            file_path: input.file_path.map(str::to_string),
            start_offset: input.start_offset,
            end_offset: input.end_offset,
        };
        let locator = containers.document_data.append(&info.encode())?;

        let entry = DocumentEntry {
            data_id: locator.offset,
            rank: input.rank,
            term_count,
            ansi_date: input.ansi_date,
            language_id: input.language_id,
        };
        let assigned = containers.document_table.append(&entry.encode())?;
        debug_assert_eq!(assigned, document_id);

        build.finish_document(term_count)?;
        Ok(document_id)
    }

    // -- Search operations --

    /// Read the fixed-width record for a document.
    pub fn document_entry(&self, document_id: u32) -> Result<DocumentEntry> {
        self.validate_document_id(document_id)?;
        let containers = self.search_containers()?;
        DocumentEntry::decode(containers.document_table.record(document_id)?)
    }

    /// Read a document's record and payload.
    pub fn document_record(&self, document_id: u32) -> Result<DocumentRecord> {
        let entry = self.document_entry(document_id)?;
        let containers = self.search_containers()?;
        let info = if entry.data_id == 0 {
            None
        } else {
            Some(DocumentInfo::decode(
                containers.document_data.read_at(entry.data_id)?,
            )?)
        };
        Ok(DocumentRecord { entry, info })
    }

    /// Look up a document ID by its external key.
    pub fn document_id_by_key(&self, key: &str) -> Result<Option<u32>> {
        let containers = self.search_containers()?;
        keydict::lookup_key(&containers.key_dictionary, key)
    }

    /// Look up a term in the term dictionary.
    pub fn lookup_term(
        &self,
        term: &str,
        field_restriction: Option<&BitVec>,
    ) -> Result<TermEntry> {
        let containers = self.search_containers()?;
        termdict::lookup(
            &containers.term_dictionary,
            term,
            field_restriction,
            self.field_id_maximum(),
        )
    }

    /// List dictionary terms under a match kind.
    pub fn list_terms(
        &self,
        language_id: u32,
        pattern: Option<&str>,
        field_restriction: Option<&BitVec>,
        match_kind: TermMatch,
        range: Option<RangeOp>,
    ) -> Result<Vec<TermInfo>> {
        let containers = self.search_containers()?;
        termdict::list(
            &containers.term_dictionary,
            language_id,
            pattern,
            field_restriction,
            match_kind,
            range,
            self.field_id_maximum(),
        )
    }

    /// Read and decode a term's posting list.
    pub fn postings(&self, entry: &TermEntry) -> Result<Vec<Posting>> {
        let containers = self.search_containers()?;
        let bytes = containers.index_data.read(entry.locator)?;
        postings::decode_postings(bytes)
    }

    // -- Accessors --

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn intent(&self) -> IndexIntent {
        self.intent
    }

    pub fn version(&self) -> IndexVersion {
        self.version
    }

    pub fn language_id(&self) -> u32 {
        self.language_id
    }

    pub fn tokenizer_id(&self) -> u32 {
        self.tokenizer_id
    }

    pub fn stemmer_id(&self) -> u32 {
        self.stemmer_id
    }

    pub fn term_length_minimum(&self) -> usize {
        self.term_length_minimum
    }

    pub fn term_length_maximum(&self) -> usize {
        self.term_length_maximum
    }

    pub fn document_count(&self) -> u32 {
        match self.intent {
            IndexIntent::Search => self.document_count,
            IndexIntent::Create => self.build.as_ref().map(|b| b.last_document_id).unwrap_or(0),
        }
    }

    pub fn unique_term_count(&self) -> u64 {
        self.unique_term_count
    }

    pub fn total_term_count(&self) -> u64 {
        self.total_term_count
    }

    pub fn unique_stop_term_count(&self) -> u64 {
        self.unique_stop_term_count
    }

    pub fn total_stop_term_count(&self) -> u64 {
        self.total_stop_term_count
    }

    pub fn document_term_count_minimum(&self) -> u32 {
        self.document_term_count_minimum
    }

    pub fn document_term_count_maximum(&self) -> u32 {
        self.document_term_count_maximum
    }

    pub fn last_update_time(&self) -> i64 {
        self.last_update_time
    }

    /// Highest assigned field ID; also the field bitmap width in bits.
    pub fn field_id_maximum(&self) -> u16 {
        self.field_names.len() as u16
    }

    /// Field ID for a name, 1-based.
    pub fn field_id(&self, name: &str) -> Option<u16> {
        self.field_names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .map(|i| i as u16 + 1)
    }

    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    pub fn unfielded_search_field_names(&self) -> &[String] {
        &self.unfielded_search_field_names
    }

    /// Bitmap with the bits of the named fields set. Unknown names are
    /// ignored. Returns `None` if no known field was named.
    pub fn field_bitmap(&self, names: &[String]) -> Option<BitVec> {
        let mut bitmap = BitVec::from_elem(self.field_id_maximum() as usize, false);
        let mut any = false;
        for name in names {
            if let Some(id) = self.field_id(name) {
                bitmap.set(id as usize - 1, true);
                any = true;
            }
        }
        any.then_some(bitmap)
    }

    // -- Lifecycle --

    /// Close the index.
    ///
    /// Create intent merges the build, writes `index.inf`, and publishes
    /// the containers; either intent releases the lock last. Container
    /// failures are reported but closing continues for the others.
    pub fn close(mut self) -> Result<()> {
        let result = self.close_files();

        if let Some(lock) = self.lock.take() {
            if let Err(e) = lock.release() {
                error!("Failed to unlock the index: '{}', error: {e}.", self.name);
            }
        }

        result
    }

    fn close_files(&mut self) -> Result<()> {
        let mut first_error: Option<CallunaError> = None;
        let mut note_error = |context: &str, name: &str, e: CallunaError| {
            error!("Failed to close {context}, index: '{name}', error: {e}.");
            if first_error.is_none() {
                first_error = Some(CallunaError::CloseFailed(format!("{context}: {e}")));
            }
        };

        match self.containers.take() {
            Some(Containers::Create(containers)) => {
                let mut containers = *containers;

                if let Some(mut build) = self.build.take() {
                    match build.merge(&mut containers.index_data, &mut containers.term_dictionary) {
                        Ok(counts) => {
                            self.unique_term_count = counts.unique_term_count;
                            self.unique_stop_term_count = counts.unique_stop_term_count;
                            self.total_term_count = build.total_term_count;
                            self.total_stop_term_count = build.total_stop_term_count;
                            self.document_count = build.last_document_id;
                            self.document_term_count_minimum = build.document_term_count_minimum;
                            self.document_term_count_maximum = build.document_term_count_maximum;
                        }
                        Err(e) => note_error("the build merge", &self.name, e),
                    }
                }

                self.last_update_time = chrono::Utc::now().timestamp();
                if let Some(mut information) = self.information.take() {
                    write_information(&mut information, self);
                    self.information = Some(information);
                }

                if let Err(e) = containers.document_table.close() {
                    note_error("the document table", &self.name, e);
                }
                if let Err(e) = containers.document_data.close() {
                    note_error("the document data", &self.name, e);
                }
                if let Err(e) = containers.index_data.close() {
                    note_error("the index data", &self.name, e);
                }
                if let Err(e) = containers.key_dictionary.finish() {
                    note_error("the key dictionary", &self.name, e);
                }
                if let Err(e) = containers.term_dictionary.finish() {
                    note_error("the term dictionary", &self.name, e);
                }
            }
            Some(Containers::Search(_)) => {
                // Read-only handles close on drop.
            }
            None => {}
        }

        if let Some(information) = self.information.take() {
            if let Err(e) = information.close() {
                note_error("the index information", &self.name, e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Abort the index.
    ///
    /// For create intent, optionally deletes the partial index directory
    /// after closing; for search intent this is just a close.
    pub fn abort<P: AsRef<Path>>(mut self, _configuration_directory_path: P) -> Result<()> {
        match self.intent {
            IndexIntent::Create => {
                let index_path = self.paths.index_path().to_path_buf();
                let delete = self.delete_on_abort;
                if delete {
                    error!("Index aborted, deleting index, index: '{}'.", self.name);
                } else {
                    error!("Index aborted, index: '{}'.", self.name);
                }

                // Skip the merge: a partial index must not publish.
                self.build = None;
                let _ = self.close_files();
                if let Some(lock) = self.lock.take() {
                    let _ = lock.release();
                }

                if delete {
                    std::fs::remove_dir_all(&index_path)?;
                }
                Ok(())
            }
            IndexIntent::Search => self.close(),
        }
    }

    fn search_containers(&self) -> Result<&SearchContainers> {
        match self.containers.as_ref() {
            Some(Containers::Search(containers)) => Ok(containers),
            _ => Err(CallunaError::InvalidIntent),
        }
    }
}

fn write_information(information: &mut ConfigFile, index: &Index) {
    information.set(
        INFO_LANGUAGE,
        language::language_code_from_id(index.language_id).unwrap_or("en"),
    );
    information.set(
        INFO_TOKENIZER,
        tokenizer::tokenizer_name_from_id(index.tokenizer_id).unwrap_or("unicode"),
    );
    information.set(
        INFO_STEMMER,
        stemmer::stemmer_name_from_id(index.stemmer_id).unwrap_or("none"),
    );
    information.set(INFO_STOP_LIST, &index.stop_list_name);
    information.set(INFO_STOP_LIST_TYPE, index.stop_list_type);
    information.set(INFO_TERM_LENGTH_MINIMUM, index.term_length_minimum);
    information.set(INFO_TERM_LENGTH_MAXIMUM, index.term_length_maximum);
    information.set(INFO_FIELD_NAMES, index.field_names.join(","));
    information.set(
        INFO_UNFIELDED_SEARCH_FIELD_NAMES,
        index.unfielded_search_field_names.join(","),
    );
    information.set(INFO_UNIQUE_TERM_COUNT, index.unique_term_count);
    information.set(INFO_TOTAL_TERM_COUNT, index.total_term_count);
    information.set(INFO_UNIQUE_STOP_TERM_COUNT, index.unique_stop_term_count);
    information.set(INFO_TOTAL_STOP_TERM_COUNT, index.total_stop_term_count);
    information.set(INFO_DOCUMENT_COUNT, index.document_count);
    information.set(
        INFO_DOCUMENT_TERM_COUNT_MINIMUM,
        index.document_term_count_minimum,
    );
    information.set(
        INFO_DOCUMENT_TERM_COUNT_MAXIMUM,
        index.document_term_count_maximum,
    );
    information.set(INFO_LAST_UPDATE_TIME, index.last_update_time);
}

fn read_scalar<T: std::str::FromStr>(
    information: &ConfigFile,
    key: &str,
    index_name: &str,
) -> Result<T> {
    information
        .get_parsed(key)
        .map_err(|_| open_failed(index_name, key))
}

fn open_failed(index_name: &str, key: &str) -> CallunaError {
    error!("Failed to read '{key}' from the index information, index: '{index_name}'.");
    CallunaError::OpenFailed(format!("index '{index_name}': bad or missing '{key}'"))
}

fn split_names(names: &str) -> Vec<String> {
    names
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

/// True when the name has no path components.
fn is_base_name(name: &str) -> bool {
    !name.contains(std::path::MAIN_SEPARATOR)
        && !name.contains('/')
        && name != "."
        && name != ".."
}

fn create_directory(path: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(path)
        .map_err(|e| CallunaError::InvalidIndexPath(format!("{}: {e}", path.display())))
}

fn has_access(path: &Path, mode: libc::c_int) -> bool {
    use std::os::unix::ffi::OsStrExt;
    let Ok(c_path) = std::ffi::CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    unsafe { libc::access(c_path.as_ptr(), mode) == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_options() -> IndexOptions {
        IndexOptions {
            stemmer: "none".to_string(),
            field_names: vec!["title".to_string(), "body".to_string()],
            ..IndexOptions::default()
        }
    }

    fn build_small_index(root: &Path) {
        let mut index = Index::open_with_options(
            root,
            root,
            "news",
            IndexIntent::Create,
            create_options(),
        )
        .unwrap();

        index
            .add_document(DocumentInput {
                document_key: "doc-1",
                title: "One",
                rank: 10,
                ansi_date: 20200101000000,
                language_id: 1,
                fields: vec![("title", "quick brown fox"), ("body", "the lazy dog")],
                ..Default::default()
            })
            .unwrap();
        index
            .add_document(DocumentInput {
                document_key: "doc-2",
                title: "Two",
                rank: 20,
                ansi_date: 20210630120000,
                language_id: 1,
                fields: vec![("body", "fox hunting season")],
                ..Default::default()
            })
            .unwrap();

        index.close().unwrap();
    }

    #[test]
    fn test_create_then_search_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        build_small_index(dir.path());

        let index = Index::open(dir.path(), dir.path(), "news", IndexIntent::Search).unwrap();
        assert_eq!(index.document_count(), 2);
        assert_eq!(index.field_id_maximum(), 2);
        assert_eq!(index.field_id("title"), Some(1));
        assert!(index.last_update_time() > 0);

        let entry = index.document_entry(1).unwrap();
        assert_eq!(entry.rank, 10);
        assert_eq!(entry.ansi_date, 20200101000000);

        let record = index.document_record(2).unwrap();
        assert_eq!(record.info.unwrap().document_key, "doc-2");

        assert_eq!(index.document_id_by_key("doc-1").unwrap(), Some(1));
        assert_eq!(index.document_id_by_key("doc-9").unwrap(), None);

        let fox = index.lookup_term("fox", None).unwrap();
        assert_eq!(fox.document_count, 2);
        let postings = index.postings(&fox).unwrap();
        assert_eq!(postings.len(), 2);

        // "the" went through the stop list.
        assert!(index.unique_stop_term_count() >= 1);

        index.close().unwrap();
    }

    #[test]
    fn test_validate_document_id_bounds() {
        let dir = tempfile::tempdir().unwrap();
        build_small_index(dir.path());

        let index = Index::open(dir.path(), dir.path(), "news", IndexIntent::Search).unwrap();
        assert!(index.validate_document_id(1).is_ok());
        assert!(index.validate_document_id(2).is_ok());
        assert!(index.validate_document_id(0).is_err());
        assert!(index.validate_document_id(3).is_err());
        index.close().unwrap();
    }

    #[test]
    fn test_search_missing_index_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Index::open(dir.path(), dir.path(), "absent", IndexIntent::Search).is_err());
    }

    #[test]
    fn test_index_name_must_be_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let result = Index::open(dir.path(), dir.path(), "a/b", IndexIntent::Create);
        assert!(matches!(result, Err(CallunaError::InvalidIndexName(_))));
    }

    #[test]
    fn test_abort_with_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = create_options();
        options.delete_on_abort = true;

        let index = Index::open_with_options(
            dir.path(),
            dir.path(),
            "doomed",
            IndexIntent::Create,
            options,
        )
        .unwrap();
        let index_path = dir.path().join("doomed");
        assert!(index_path.is_dir());

        index.abort(dir.path()).unwrap();
        assert!(!index_path.exists());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = Index::open_with_options(
            dir.path(),
            dir.path(),
            "news",
            IndexIntent::Create,
            create_options(),
        )
        .unwrap();

        let result = index.add_document(DocumentInput {
            document_key: "doc-1",
            fields: vec![("caption", "text")],
            ..Default::default()
        });
        assert!(result.is_err());
        index.abort(dir.path()).unwrap();
    }
}
