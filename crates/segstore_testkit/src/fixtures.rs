//! Test fixtures and directory helpers.
//!
//! Provides convenience functions for setting up test directories,
//! fields and segment states.

use segstore_codec::{
    DocValuesType, FieldInfo, FieldInfos, FieldsConsumer, FieldsProducer, IndexOptions, Posting,
    SegmentInfo, SegmentReadState, SegmentWriteState,
};
use segstore_storage::{Directory, DirectoryConfig, FsDirectory, RamDirectory};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Once};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Terms of one field with their postings, in term order.
pub type FieldTerms = BTreeMap<Vec<u8>, Vec<Posting>>;

static TRACING: Once = Once::new();

/// Installs a test log subscriber once per process.
///
/// Honours `RUST_LOG`; output goes through the test harness capture.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A test directory with automatic cleanup.
pub struct TestDirectory {
    /// The directory instance.
    pub dir: Arc<dyn Directory>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestDirectory {
    /// Creates a new in-memory test directory.
    pub fn memory() -> Self {
        init_tracing();
        Self {
            dir: Arc::new(RamDirectory::new()),
            _temp_dir: None,
        }
    }

    /// Creates a new filesystem test directory with the default configuration.
    pub fn file() -> Self {
        Self::file_with_config(DirectoryConfig::default())
    }

    /// Creates a new filesystem test directory.
    pub fn file_with_config(config: DirectoryConfig) -> Self {
        init_tracing();
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = FsDirectory::open_with_config(temp_dir.path(), config)
            .expect("Failed to open filesystem directory");
        Self {
            dir: Arc::new(dir),
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the directory path if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self._temp_dir.as_ref().map(TempDir::path)
    }

    /// Returns a shared handle to the directory.
    pub fn directory(&self) -> Arc<dyn Directory> {
        Arc::clone(&self.dir)
    }
}

impl std::ops::Deref for TestDirectory {
    type Target = dyn Directory;

    fn deref(&self) -> &Self::Target {
        self.dir.as_ref()
    }
}

/// Runs a test with a temporary in-memory directory.
pub fn with_ram_dir<F, R>(f: F) -> R
where
    F: FnOnce(&Arc<dyn Directory>) -> R,
{
    let test_dir = TestDirectory::memory();
    f(&test_dir.dir)
}

/// Runs a test with a temporary filesystem directory.
pub fn with_fs_dir<F, R>(f: F) -> R
where
    F: FnOnce(&Arc<dyn Directory>, &Path) -> R,
{
    let test_dir = TestDirectory::file();
    let path = test_dir
        .path()
        .expect("File directory should have a path")
        .to_path_buf();
    f(&test_dir.dir, &path)
}

/// An indexed field recording documents only.
pub fn docs_field(name: &str, number: u32) -> FieldInfo {
    FieldInfo::new(name, number).with_index_options(IndexOptions::Docs)
}

/// An indexed field recording documents and frequencies.
pub fn freqs_field(name: &str, number: u32) -> FieldInfo {
    FieldInfo::new(name, number).with_index_options(IndexOptions::DocsAndFreqs)
}

/// A field with doc values of type `kind`.
pub fn doc_values_field(name: &str, number: u32, kind: DocValuesType) -> FieldInfo {
    FieldInfo::new(name, number).with_doc_values(kind)
}

/// A top-level write state for `segment` in `dir`.
pub fn write_state(dir: &Arc<dyn Directory>, segment: &Arc<SegmentInfo>) -> SegmentWriteState {
    SegmentWriteState::new(Arc::clone(dir), Arc::clone(segment))
}

/// A top-level read state for `segment` in `dir` with `fields`.
pub fn read_state(
    dir: &Arc<dyn Directory>,
    segment: &Arc<SegmentInfo>,
    fields: Vec<FieldInfo>,
) -> SegmentReadState {
    let infos = FieldInfos::new(fields).expect("Invalid field infos");
    SegmentReadState::new(Arc::clone(dir), Arc::clone(segment), Arc::new(infos))
}

/// Writes all of `terms` to `field` and finishes it.
pub fn write_terms(consumer: &mut dyn FieldsConsumer, field: &mut FieldInfo, terms: &FieldTerms) {
    let mut writer = consumer.add_field(field).expect("Failed to add field");
    for (term, postings) in terms {
        writer.add_term(term, postings).expect("Failed to add term");
    }
    writer.finish().expect("Failed to finish field");
}

/// Reads every term of `field`, or `None` if the producer has no such field.
pub fn read_terms(producer: &dyn FieldsProducer, field: &str) -> Option<FieldTerms> {
    let terms = producer.terms(field).expect("Failed to read terms")?;
    let mut iter = terms.iterator().expect("Failed to iterate terms");
    let mut out = FieldTerms::new();
    while let Some(entry) = iter.next().expect("Failed to read term") {
        out.insert(entry.term, entry.postings);
    }
    assert_eq!(out.len() as u64, terms.size(), "term count mismatch for {field}");
    Some(out)
}

/// A small term map for quick tests: each term occurs once in one document.
pub fn simple_terms(words: &[&str]) -> FieldTerms {
    words
        .iter()
        .enumerate()
        .map(|(doc, word)| (word.as_bytes().to_vec(), vec![Posting::new(doc as u32, 1)]))
        .collect()
}
