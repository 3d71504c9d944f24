//! Contracts for doc values formats.
//!
//! Doc values store one value slot per document for a field. A slot may be
//! empty (`None`). Three kinds exist: numeric, binary and sorted (binary
//! values deduplicated into an ordinal-addressed dictionary).

use crate::error::CodecResult;
use crate::field_info::FieldInfo;
use crate::segment::{SegmentReadState, SegmentWriteState};
use std::fmt::Debug;

/// A pluggable doc values encoding.
pub trait DocValuesFormat: Send + Sync + Debug {
    /// Name recorded in field attributes and used to look the format up again.
    fn name(&self) -> &str;

    /// Opens a writer for the segment described by `state`.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer's files cannot be created.
    fn fields_consumer(&self, state: &SegmentWriteState)
        -> CodecResult<Box<dyn DocValuesConsumer>>;

    /// Opens a reader for the segment described by `state`.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader's files are missing or corrupted.
    fn fields_producer(&self, state: &SegmentReadState)
        -> CodecResult<Box<dyn DocValuesProducer>>;
}

/// Write side of a doc values format.
///
/// Every `values` slice holds exactly one slot per document of the segment.
pub trait DocValuesConsumer: Send {
    /// Writes a numeric field.
    ///
    /// # Errors
    ///
    /// Returns an error if the field cannot be written.
    fn add_numeric_field(&mut self, field: &mut FieldInfo, values: &[Option<i64>])
        -> CodecResult<()>;

    /// Writes a binary field.
    ///
    /// # Errors
    ///
    /// Returns an error if the field cannot be written.
    fn add_binary_field(
        &mut self,
        field: &mut FieldInfo,
        values: &[Option<Vec<u8>>],
    ) -> CodecResult<()>;

    /// Writes a sorted field.
    ///
    /// # Errors
    ///
    /// Returns an error if the field cannot be written.
    fn add_sorted_field(
        &mut self,
        field: &mut FieldInfo,
        values: &[Option<Vec<u8>>],
    ) -> CodecResult<()>;

    /// Flushes and closes every file. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered while closing.
    fn close(&mut self) -> CodecResult<()>;
}

/// Read side of a doc values format.
///
/// Producers are shared between readers, so every method takes `&self`.
/// Accessors return `None` for fields without values of the requested kind.
pub trait DocValuesProducer: Send + Sync + Debug {
    /// Returns numeric values of `field`.
    ///
    /// # Errors
    ///
    /// Returns an error if the producer is closed or on I/O failure.
    fn get_numeric(&self, field: &FieldInfo) -> CodecResult<Option<Box<dyn NumericDocValues>>>;

    /// Returns binary values of `field`.
    ///
    /// # Errors
    ///
    /// Returns an error if the producer is closed or on I/O failure.
    fn get_binary(&self, field: &FieldInfo) -> CodecResult<Option<Box<dyn BinaryDocValues>>>;

    /// Returns sorted values of `field`.
    ///
    /// # Errors
    ///
    /// Returns an error if the producer is closed or on I/O failure.
    fn get_sorted(&self, field: &FieldInfo) -> CodecResult<Option<Box<dyn SortedDocValues>>>;

    /// Verifies checksums of every file.
    ///
    /// # Errors
    ///
    /// Returns a corruption error on mismatch.
    fn check_integrity(&self) -> CodecResult<()>;

    /// Releases every file. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered while closing.
    fn close(&self) -> CodecResult<()>;
}

/// Per-document `i64` values.
pub trait NumericDocValues: Send {
    /// Returns the value of `doc`.
    ///
    /// # Errors
    ///
    /// Returns an error if `doc` is out of range or on I/O failure.
    fn get(&mut self, doc: u32) -> CodecResult<Option<i64>>;
}

/// Per-document byte strings.
pub trait BinaryDocValues: Send {
    /// Returns the value of `doc`.
    ///
    /// # Errors
    ///
    /// Returns an error if `doc` is out of range or on I/O failure.
    fn get(&mut self, doc: u32) -> CodecResult<Option<Vec<u8>>>;
}

/// Per-document byte strings addressed through a sorted dictionary.
pub trait SortedDocValues: Send {
    /// Returns the ordinal of `doc`'s value.
    ///
    /// # Errors
    ///
    /// Returns an error if `doc` is out of range or on I/O failure.
    fn ord(&mut self, doc: u32) -> CodecResult<Option<u32>>;

    /// Returns the value with ordinal `ord`.
    ///
    /// # Errors
    ///
    /// Returns an error if `ord` is not below [`value_count`](Self::value_count).
    fn lookup_ord(&mut self, ord: u32) -> CodecResult<Vec<u8>>;

    /// Number of distinct values.
    fn value_count(&self) -> u32;

    /// Returns the value of `doc`.
    ///
    /// # Errors
    ///
    /// Returns an error if `doc` is out of range or on I/O failure.
    fn get(&mut self, doc: u32) -> CodecResult<Option<Vec<u8>>> {
        match self.ord(doc)? {
            Some(ord) => self.lookup_ord(ord).map(Some),
            None => Ok(None),
        }
    }
}
