//! Multiplexers that give every field its own sub-format.
//!
//! ## Write path
//!
//! For each field the policy picks a format instance. The first field routed
//! to an instance opens a sub-writer with the segment suffix
//! `<format name>_<n>`, where `n` counts the instances of that name opened so
//! far in this session. The format name and `n` are recorded as field
//! attributes. Later fields routed to the same instance reuse its sub-writer.
//!
//! ## Read path
//!
//! The recorded attributes are read back from the segment's fields. One
//! sub-reader is opened per distinct suffix, with the format resolved by name
//! through a [`FormatRegistry`](crate::FormatRegistry), and fields are routed
//! to it. Fields without attributes have no data here and read as `None`.
//!
//! Per-field formats cannot be nested: a per-field format opened with a
//! non-empty segment suffix fails with a configuration error.

mod arena;
mod doc_values;
mod postings;

pub use doc_values::{PerFieldDocValuesFormat, PerFieldDocValuesReader, PerFieldDocValuesWriter};
pub use postings::{PerFieldFieldsReader, PerFieldFieldsWriter, PerFieldPostingsFormat};
