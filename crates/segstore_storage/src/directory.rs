//! Directory trait definition.

use crate::error::StoreResult;
use crate::io::{IndexInput, IndexOutput};
use std::fmt;

/// A flat namespace of named, write-once files.
///
/// A directory hands out [`IndexOutput`]s to create new files and
/// [`IndexInput`]s to read sealed ones. It does not interpret file contents.
///
/// # Invariants
///
/// - `create_output` reserves the name immediately; a second create of the
///   same name fails until the file is deleted
/// - once an output is closed its bytes never change; a new version of the
///   data is a new name
/// - `open_input` only ever exposes sealed bytes
///
/// # Thread Safety
///
/// All operations may be called concurrently for *different* names.
/// Concurrent operations on the same name are only as safe as the
/// implementation documents.
///
/// # Implementors
///
/// - [`crate::RamDirectory`] - For testing and ephemeral segments
/// - [`crate::FsDirectory`] - Filesystem files, memory-mapped for reading
/// - [`crate::TrackingDirectory`] - Records the files created through it
pub trait Directory: Send + Sync + fmt::Debug {
    /// Lists every file name, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing cannot be read.
    fn list_all(&self) -> StoreResult<Vec<String>>;

    /// Returns true if a file with this name exists.
    ///
    /// # Errors
    ///
    /// Returns an error if existence cannot be determined.
    fn file_exists(&self, name: &str) -> StoreResult<bool>;

    /// Returns the length of a sealed file in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::NotFound`] if the file does not exist.
    fn file_length(&self, name: &str) -> StoreResult<u64>;

    /// Deletes a file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::NotFound`] if the file does not exist.
    fn delete_file(&self, name: &str) -> StoreResult<()>;

    /// Creates a new file and returns a writer for it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::AlreadyExists`] if the name is taken, or
    /// an I/O error if the storage cannot be written.
    fn create_output(&self, name: &str) -> StoreResult<Box<dyn IndexOutput>>;

    /// Opens a sealed file for random-access reading.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::NotFound`] if the file does not exist, or
    /// an I/O error if it cannot be opened.
    fn open_input(&self, name: &str) -> StoreResult<Box<dyn IndexInput>>;

    /// Makes the named files durable.
    ///
    /// # Errors
    ///
    /// Returns an error if any file cannot be synced.
    fn sync(&self, names: &[String]) -> StoreResult<()>;
}
