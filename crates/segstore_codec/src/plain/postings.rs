//! Plain postings encoding.
//!
//! ```text
//! field data   | per term: doc freq vint | term len vint | term bytes |
//!              |           per doc: doc delta vlong [freq vlong] |
//!              | 0 vint (end of field)
//! directory    | field count vint | per field: name | index options u8 |
//!              |                                offset vlong | term count vlong |
//! ```
//!
//! Frequencies are only written for fields indexed with
//! [`IndexOptions::DocsAndFreqs`]; otherwise they read back as 1.

use super::{corrupted, seek_to_directory, PLAIN_FORMAT_NAME};
use crate::error::{CodecError, CodecResult};
use crate::field_info::{FieldInfo, IndexOptions};
use crate::naming::check_format_name;
use crate::postings::{
    FieldsConsumer, FieldsProducer, Posting, PostingsFormat, TermEntry, Terms, TermsConsumer,
    TermsEnum,
};
use crate::segment::{SegmentReadState, SegmentWriteState};
use parking_lot::Mutex;
use segstore_storage::close::close_while_handling_errors;
use segstore_storage::codec_util;
use segstore_storage::{IndexInput, IndexOutput, StoreError};
use std::collections::{BTreeMap, HashSet};

const CODEC: &str = "SegstorePlainPostings";
const VERSION_START: i32 = 0;
const VERSION_CURRENT: i32 = VERSION_START;

/// Extension of plain postings files.
pub const EXTENSION: &str = "pst";

/// A simple postings format writing one `.pst` file per segment suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainPostingsFormat {
    name: String,
}

impl PlainPostingsFormat {
    /// Creates the format with the default name.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: PLAIN_FORMAT_NAME.to_string(),
        }
    }

    /// Creates the format under another name.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidArgument`] if the name is not plain ASCII alphanumeric.
    pub fn with_name(name: impl Into<String>) -> CodecResult<Self> {
        let name = name.into();
        check_format_name(&name)?;
        Ok(Self { name })
    }
}

impl Default for PlainPostingsFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl PostingsFormat for PlainPostingsFormat {
    fn name(&self) -> &str {
        &self.name
    }

    fn fields_consumer(&self, state: &SegmentWriteState) -> CodecResult<Box<dyn FieldsConsumer>> {
        Ok(Box::new(PlainFieldsWriter::create(state)?))
    }

    fn fields_producer(&self, state: &SegmentReadState) -> CodecResult<Box<dyn FieldsProducer>> {
        Ok(Box::new(PlainFieldsReader::open(state)?))
    }
}

#[derive(Debug)]
struct FieldEntry {
    name: String,
    index_options: IndexOptions,
    offset: u64,
    term_count: u64,
}

#[derive(Debug)]
struct PlainFieldsWriter {
    out: Option<Box<dyn IndexOutput>>,
    max_doc: u32,
    fields: Vec<FieldEntry>,
    names: HashSet<String>,
    field_open: bool,
}

impl PlainFieldsWriter {
    fn create(state: &SegmentWriteState) -> CodecResult<Self> {
        let mut out = state.directory.create_output(&state.file_name(EXTENSION))?;
        codec_util::write_index_header(
            out.as_mut(),
            CODEC,
            VERSION_CURRENT,
            state.segment_info.id(),
            &state.segment_suffix,
        )?;

        Ok(Self {
            out: Some(out),
            max_doc: state.segment_info.max_doc(),
            fields: Vec::new(),
            names: HashSet::new(),
            field_open: false,
        })
    }

    fn output(&mut self) -> CodecResult<&mut dyn IndexOutput> {
        match self.out.as_mut() {
            Some(out) => Ok(out.as_mut()),
            None => Err(CodecError::invalid_operation("plain postings writer is closed")),
        }
    }

    fn write_directory(&self, out: &mut dyn IndexOutput) -> CodecResult<()> {
        let directory_offset = out.file_pointer();
        out.write_len(self.fields.len())?;
        for field in &self.fields {
            out.write_string(&field.name)?;
            out.write_byte(field.index_options.as_byte())?;
            out.write_vlong(field.offset as i64)?;
            out.write_vlong(field.term_count as i64)?;
        }
        out.write_i64(directory_offset as i64)?;
        codec_util::write_footer(out)?;
        Ok(())
    }
}

impl FieldsConsumer for PlainFieldsWriter {
    fn add_field(&mut self, field: &mut FieldInfo) -> CodecResult<Box<dyn TermsConsumer + '_>> {
        if self.field_open {
            return Err(CodecError::invalid_operation(format!(
                "cannot add field {:?} before the previous field is finished",
                field.name()
            )));
        }
        if !field.is_indexed() {
            return Err(CodecError::invalid_argument(format!(
                "field {:?} is not indexed",
                field.name()
            )));
        }
        if !self.names.insert(field.name().to_string()) {
            return Err(CodecError::invalid_argument(format!(
                "field {:?} was already written",
                field.name()
            )));
        }

        let offset = self.output()?.file_pointer();
        self.fields.push(FieldEntry {
            name: field.name().to_string(),
            index_options: field.index_options(),
            offset,
            term_count: 0,
        });
        self.field_open = true;

        Ok(Box::new(PlainTermsWriter {
            has_freqs: field.index_options() == IndexOptions::DocsAndFreqs,
            writer: self,
            last_term: None,
            term_count: 0,
            finished: false,
        }))
    }

    fn close(&mut self) -> CodecResult<()> {
        let Some(mut out) = self.out.take() else {
            return Ok(());
        };

        if self.field_open {
            close_while_handling_errors(Some(out), |mut out| out.close());
            return Err(CodecError::invalid_operation(
                "plain postings writer closed with an unfinished field",
            ));
        }

        let written = self.write_directory(out.as_mut());
        let closed = out.close();
        written?;
        closed?;
        Ok(())
    }
}

struct PlainTermsWriter<'a> {
    writer: &'a mut PlainFieldsWriter,
    has_freqs: bool,
    last_term: Option<Vec<u8>>,
    term_count: u64,
    finished: bool,
}

impl PlainTermsWriter<'_> {
    fn check_postings(&self, term: &[u8], postings: &[Posting]) -> CodecResult<()> {
        if let Some(last) = &self.last_term {
            if last.as_slice() >= term {
                return Err(CodecError::invalid_argument(format!(
                    "terms out of order: {term:?} after {last:?}"
                )));
            }
        }
        if postings.is_empty() {
            return Err(CodecError::invalid_argument(format!(
                "term {term:?} has no postings"
            )));
        }

        let max_doc = self.writer.max_doc;
        let mut previous: Option<u32> = None;
        for posting in postings {
            if posting.doc >= max_doc || previous.is_some_and(|p| posting.doc <= p) {
                return Err(CodecError::invalid_argument(format!(
                    "invalid doc {} for term {term:?} (max doc {max_doc})",
                    posting.doc
                )));
            }
            if self.has_freqs && posting.freq == 0 {
                return Err(CodecError::invalid_argument(format!(
                    "zero frequency for doc {} of term {term:?}",
                    posting.doc
                )));
            }
            previous = Some(posting.doc);
        }
        Ok(())
    }
}

impl TermsConsumer for PlainTermsWriter<'_> {
    fn add_term(&mut self, term: &[u8], postings: &[Posting]) -> CodecResult<()> {
        if self.finished {
            return Err(CodecError::invalid_operation("field is already finished"));
        }
        self.check_postings(term, postings)?;

        let has_freqs = self.has_freqs;
        let out = self.writer.output()?;
        out.write_len(postings.len())?;
        out.write_len(term.len())?;
        out.write_bytes(term)?;
        let mut previous = 0u32;
        for posting in postings {
            out.write_vlong(i64::from(posting.doc - previous))?;
            if has_freqs {
                out.write_vlong(i64::from(posting.freq))?;
            }
            previous = posting.doc;
        }

        self.last_term = Some(term.to_vec());
        self.term_count += 1;
        Ok(())
    }

    fn finish(&mut self) -> CodecResult<()> {
        if self.finished {
            return Ok(());
        }
        self.writer.output()?.write_vint(0)?;
        if let Some(entry) = self.writer.fields.last_mut() {
            entry.term_count = self.term_count;
        }
        self.writer.field_open = false;
        self.finished = true;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct FieldMeta {
    offset: u64,
    term_count: u64,
    has_freqs: bool,
}

#[derive(Debug)]
struct PlainFieldsReader {
    name: String,
    input: Mutex<Option<Box<dyn IndexInput>>>,
    fields: BTreeMap<String, FieldMeta>,
}

impl PlainFieldsReader {
    fn open(state: &SegmentReadState) -> CodecResult<Self> {
        let name = state.file_name(EXTENSION);
        let mut input = state.directory.open_input(&name)?;

        match Self::read_directory(input.as_mut(), state) {
            Ok(fields) => Ok(Self {
                name,
                input: Mutex::new(Some(input)),
                fields,
            }),
            Err(err) => {
                close_while_handling_errors(Some(input), |mut input| input.close());
                Err(err)
            }
        }
    }

    fn read_directory(
        input: &mut dyn IndexInput,
        state: &SegmentReadState,
    ) -> CodecResult<BTreeMap<String, FieldMeta>> {
        codec_util::check_index_header(
            input,
            CODEC,
            VERSION_START,
            VERSION_CURRENT,
            state.segment_info.id(),
            &state.segment_suffix,
        )?;
        let header_length = codec_util::index_header_length(CODEC, &state.segment_suffix);
        seek_to_directory(input, header_length)?;

        let count = input.read_len()?;
        let mut fields = BTreeMap::new();
        for _ in 0..count {
            let name = input.read_string()?;
            if state.field_infos.field_info(&name).is_none() {
                return Err(corrupted(input, format!("unknown field {name:?}")));
            }
            let options = input.read_byte()?;
            let index_options = IndexOptions::from_byte(options)
                .filter(|o| *o != IndexOptions::None)
                .ok_or_else(|| corrupted(input, format!("invalid index options {options}")))?;
            let offset = read_u64(input)?;
            let term_count = read_u64(input)?;

            let meta = FieldMeta {
                offset,
                term_count,
                has_freqs: index_options == IndexOptions::DocsAndFreqs,
            };
            if fields.insert(name.clone(), meta).is_some() {
                return Err(corrupted(input, format!("duplicate field {name:?}")));
            }
        }
        Ok(fields)
    }
}

fn read_u64(input: &mut dyn IndexInput) -> CodecResult<u64> {
    let value = input.read_vlong()?;
    u64::try_from(value).map_err(|_| corrupted(input, format!("negative value {value}")))
}

fn read_u32(input: &mut dyn IndexInput) -> CodecResult<u32> {
    let value = input.read_vlong()?;
    u32::try_from(value).map_err(|_| corrupted(input, format!("value {value} out of range")))
}

impl FieldsProducer for PlainFieldsReader {
    fn fields(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    fn terms(&self, field: &str) -> CodecResult<Option<Box<dyn Terms>>> {
        let Some(meta) = self.fields.get(field).copied() else {
            return Ok(None);
        };
        let guard = self.input.lock();
        let input = guard
            .as_ref()
            .ok_or_else(|| StoreError::already_closed(&self.name))?;

        Ok(Some(Box::new(PlainTerms {
            input: input.clone_input(),
            meta,
        })))
    }

    fn size(&self) -> usize {
        self.fields.len()
    }

    fn check_integrity(&self) -> CodecResult<()> {
        let guard = self.input.lock();
        let input = guard
            .as_ref()
            .ok_or_else(|| StoreError::already_closed(&self.name))?;
        codec_util::check_footer(input.as_ref())?;
        Ok(())
    }

    fn close(&self) -> CodecResult<()> {
        if let Some(mut input) = self.input.lock().take() {
            input.close()?;
        }
        Ok(())
    }
}

struct PlainTerms {
    input: Box<dyn IndexInput>,
    meta: FieldMeta,
}

impl Terms for PlainTerms {
    fn size(&self) -> u64 {
        self.meta.term_count
    }

    fn iterator(&self) -> CodecResult<Box<dyn TermsEnum>> {
        let mut input = self.input.clone_input();
        input.seek(self.meta.offset)?;
        Ok(Box::new(PlainTermsEnum {
            input,
            remaining: self.meta.term_count,
            has_freqs: self.meta.has_freqs,
        }))
    }
}

struct PlainTermsEnum {
    input: Box<dyn IndexInput>,
    remaining: u64,
    has_freqs: bool,
}

impl TermsEnum for PlainTermsEnum {
    fn next(&mut self) -> CodecResult<Option<TermEntry>> {
        if self.remaining == 0 {
            return Ok(None);
        }

        let input = self.input.as_mut();
        let doc_freq = input.read_len()?;
        if doc_freq == 0 {
            return Err(corrupted(
                input,
                format!("field ended with {} terms missing", self.remaining),
            ));
        }
        let term_len = input.read_len()?;
        let term = input.read_byte_vec(term_len)?;

        let mut postings = Vec::new();
        let mut doc = 0u32;
        for _ in 0..doc_freq {
            let delta = read_u32(input)?;
            doc = doc
                .checked_add(delta)
                .ok_or_else(|| corrupted(input, "doc id overflow"))?;
            let freq = if self.has_freqs { read_u32(input)? } else { 1 };
            postings.push(Posting { doc, freq });
        }

        self.remaining -= 1;
        Ok(Some(TermEntry { term, postings }))
    }
}
