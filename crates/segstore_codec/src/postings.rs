//! Contracts for postings formats.
//!
//! A postings format writes, per indexed field, a sorted list of terms and
//! for each term the documents containing it. The per-field multiplexer only
//! relies on these traits; concrete encodings are free to lay out bytes as
//! they wish.

use crate::error::CodecResult;
use crate::field_info::FieldInfo;
use crate::segment::{SegmentReadState, SegmentWriteState};
use std::fmt::Debug;

/// One document in a term's postings list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Posting {
    /// Document number.
    pub doc: u32,
    /// Occurrences of the term in the document.
    pub freq: u32,
}

impl Posting {
    /// Creates a posting.
    #[must_use]
    pub const fn new(doc: u32, freq: u32) -> Self {
        Self { doc, freq }
    }
}

/// A term together with its postings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermEntry {
    /// Term bytes.
    pub term: Vec<u8>,
    /// Postings in increasing document order.
    pub postings: Vec<Posting>,
}

/// A pluggable postings encoding.
pub trait PostingsFormat: Send + Sync + Debug {
    /// Name recorded in field attributes and used to look the format up again.
    fn name(&self) -> &str;

    /// Opens a writer for the segment described by `state`.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer's files cannot be created.
    fn fields_consumer(&self, state: &SegmentWriteState) -> CodecResult<Box<dyn FieldsConsumer>>;

    /// Opens a reader for the segment described by `state`.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader's files are missing or corrupted.
    fn fields_producer(&self, state: &SegmentReadState) -> CodecResult<Box<dyn FieldsProducer>>;
}

/// Write side of a postings format.
///
/// Driven by a single thread: fields are added one after the other, and each
/// field's terms are complete before the next field is added.
pub trait FieldsConsumer: Send {
    /// Starts writing `field`.
    ///
    /// The field is mutable so that codecs can record attributes on it.
    ///
    /// # Errors
    ///
    /// Returns an error if the field cannot be written.
    fn add_field(&mut self, field: &mut FieldInfo) -> CodecResult<Box<dyn TermsConsumer + '_>>;

    /// Flushes and closes every file. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered while closing.
    fn close(&mut self) -> CodecResult<()>;
}

/// Receives the terms of one field, in strictly increasing byte order.
pub trait TermsConsumer {
    /// Adds one term with its postings.
    ///
    /// # Errors
    ///
    /// Returns an error if the term is out of order, has no postings, or on I/O failure.
    fn add_term(&mut self, term: &[u8], postings: &[Posting]) -> CodecResult<()>;

    /// Ends the field.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    fn finish(&mut self) -> CodecResult<()>;
}

/// Read side of a postings format.
///
/// Producers are shared between readers, so every method takes `&self`.
pub trait FieldsProducer: Send + Sync + Debug {
    /// Names of the fields with postings, sorted.
    fn fields(&self) -> Vec<String>;

    /// Returns the terms of `field`, or `None` if the field has no postings here.
    ///
    /// # Errors
    ///
    /// Returns an error if the producer is closed or on I/O failure.
    fn terms(&self, field: &str) -> CodecResult<Option<Box<dyn Terms>>>;

    /// Number of fields with postings.
    fn size(&self) -> usize;

    /// Verifies checksums of every file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CodecError::Store`] wrapping a corruption error on mismatch.
    fn check_integrity(&self) -> CodecResult<()>;

    /// Releases every file. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered while closing.
    fn close(&self) -> CodecResult<()>;
}

/// The terms of one field.
pub trait Terms: Send {
    /// Number of terms.
    fn size(&self) -> u64;

    /// Iterates terms in increasing byte order.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    fn iterator(&self) -> CodecResult<Box<dyn TermsEnum>>;

    /// Returns the postings of `term`, or `None` if the term is absent.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    fn postings(&self, term: &[u8]) -> CodecResult<Option<Vec<Posting>>> {
        let mut terms = self.iterator()?;
        while let Some(entry) = terms.next()? {
            match entry.term.as_slice().cmp(term) {
                std::cmp::Ordering::Less => {}
                std::cmp::Ordering::Equal => return Ok(Some(entry.postings)),
                std::cmp::Ordering::Greater => break,
            }
        }
        Ok(None)
    }
}

/// Cursor over the terms of one field.
pub trait TermsEnum: Send {
    /// Returns the next term, or `None` when exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or corrupted data.
    fn next(&mut self) -> CodecResult<Option<TermEntry>>;
}
