//! # Segstore Codec
//!
//! Field metadata and per-field codec multiplexing for segments.
//!
//! This crate sits on top of [`segstore_storage`] and provides:
//! - [`FieldInfo`] / [`FieldInfos`] with the attribute store codecs persist
//!   their per-field choices in, and [`FieldInfosFormat`] to write them
//! - [`SegmentWriteState`] / [`SegmentReadState`] handed to every codec
//! - The postings and doc values contracts sub-formats implement
//! - [`PerFieldPostingsFormat`] and [`PerFieldDocValuesFormat`], which route
//!   each field to a sub-format chosen by a policy and isolate every
//!   sub-format's files behind its own segment suffix
//! - Plain reference formats and a [`FormatRegistry`] resolving recorded
//!   format names on the read side
//!
//! ## Example
//!
//! ```rust
//! use segstore_codec::{
//!     FieldInfo, FieldInfos, FieldsConsumer, FieldsProducer, IndexOptions,
//!     PerFieldPostingsFormat, PlainPostingsFormat, Posting, PostingsFormat, SegmentInfo,
//!     SegmentReadState, SegmentWriteState, Terms, TermsConsumer,
//! };
//! use segstore_storage::{Directory, RamDirectory};
//! use std::sync::Arc;
//!
//! let dir: Arc<dyn Directory> = Arc::new(RamDirectory::new());
//! let segment = Arc::new(SegmentInfo::new("_0", 4));
//! let plain: Arc<dyn PostingsFormat> = Arc::new(PlainPostingsFormat::new());
//! let format = PerFieldPostingsFormat::new(move |_: &FieldInfo| Some(Arc::clone(&plain)));
//!
//! let mut title = FieldInfo::new("title", 0).with_index_options(IndexOptions::Docs);
//! let mut writer = format.writer(&SegmentWriteState::new(Arc::clone(&dir), Arc::clone(&segment))).unwrap();
//! {
//!     let mut terms = writer.add_field(&mut title).unwrap();
//!     terms.add_term(b"rust", &[Posting::new(2, 1)]).unwrap();
//!     terms.finish().unwrap();
//! }
//! writer.close().unwrap();
//!
//! let infos = Arc::new(FieldInfos::new(vec![title]).unwrap());
//! let reader = format.reader(&SegmentReadState::new(dir, segment, infos)).unwrap();
//! let terms = reader.terms("title").unwrap().unwrap();
//! assert_eq!(terms.postings(b"rust").unwrap(), Some(vec![Posting::new(2, 1)]));
//! reader.close().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod doc_values;
mod error;
mod field_info;
mod field_infos_format;
pub mod naming;
mod per_field;
mod plain;
mod policy;
mod postings;
mod registry;
mod segment;

pub use doc_values::{
    BinaryDocValues, DocValuesConsumer, DocValuesFormat, DocValuesProducer, NumericDocValues,
    SortedDocValues,
};
pub use error::{CodecError, CodecResult};
pub use field_info::{
    DocValuesType, FieldInfo, FieldInfos, FormatAssignment, IndexOptions, PerFieldKeys,
};
pub use field_infos_format::FieldInfosFormat;
pub use per_field::{
    PerFieldDocValuesFormat, PerFieldDocValuesReader, PerFieldDocValuesWriter,
    PerFieldFieldsReader, PerFieldFieldsWriter, PerFieldPostingsFormat,
};
pub use plain::{PlainDocValuesFormat, PlainPostingsFormat, PLAIN_FORMAT_NAME};
pub use policy::{DocValuesFormatPolicy, FieldFormatMap, PostingsFormatPolicy};
pub use postings::{
    FieldsConsumer, FieldsProducer, Posting, PostingsFormat, TermEntry, Terms, TermsConsumer,
    TermsEnum,
};
pub use registry::FormatRegistry;
pub use segment::{SegmentInfo, SegmentReadState, SegmentWriteState};
