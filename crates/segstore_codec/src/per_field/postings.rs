//! Per-field postings multiplexer.

use super::arena::{closed_error, ReaderTable, WriterArena};
use crate::error::{CodecError, CodecResult};
use crate::field_info::{FieldInfo, FormatAssignment, PerFieldKeys};
use crate::naming::check_format_name;
use crate::policy::PostingsFormatPolicy;
use crate::postings::{FieldsConsumer, FieldsProducer, PostingsFormat, Terms, TermsConsumer};
use crate::registry::FormatRegistry;
use crate::segment::{SegmentReadState, SegmentWriteState};
use segstore_storage::close::close_all;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A postings format that delegates each field to a format chosen by a policy.
///
/// Each distinct sub-format instance writes its own files, named with the
/// suffix `<format name>_<n>` where `n` counts instances sharing a name. The
/// choice is recorded on every field under [`PerFieldKeys::POSTINGS`], so the
/// read side needs only the registry to find the formats again.
#[derive(Clone)]
pub struct PerFieldPostingsFormat {
    policy: Arc<dyn PostingsFormatPolicy>,
    registry: Arc<FormatRegistry>,
}

impl PerFieldPostingsFormat {
    /// Name of the multiplexer itself.
    pub const NAME: &'static str = "PerFieldPostings";

    /// Creates a multiplexer reading formats back from the default registry.
    pub fn new(policy: impl PostingsFormatPolicy + 'static) -> Self {
        Self::with_registry(policy, Arc::new(FormatRegistry::with_defaults()))
    }

    /// Creates a multiplexer reading formats back from `registry`.
    pub fn with_registry(
        policy: impl PostingsFormatPolicy + 'static,
        registry: Arc<FormatRegistry>,
    ) -> Self {
        Self {
            policy: Arc::new(policy),
            registry,
        }
    }

    /// Opens the write side.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Configuration`] if `state` already carries a
    /// segment suffix, i.e. this format is nested inside a per-field format.
    pub fn writer(&self, state: &SegmentWriteState) -> CodecResult<PerFieldFieldsWriter> {
        PerFieldFieldsWriter::new(Arc::clone(&self.policy), state)
    }

    /// Opens the read side.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Configuration`] for nesting or unknown format
    /// names, [`CodecError::Corrupted`] for malformed attributes, and any
    /// error of the sub-readers. Nothing stays open on failure.
    pub fn reader(&self, state: &SegmentReadState) -> CodecResult<PerFieldFieldsReader> {
        PerFieldFieldsReader::open(&self.registry, state)
    }
}

impl fmt::Debug for PerFieldPostingsFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerFieldPostingsFormat")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl PostingsFormat for PerFieldPostingsFormat {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn fields_consumer(&self, state: &SegmentWriteState) -> CodecResult<Box<dyn FieldsConsumer>> {
        Ok(Box::new(self.writer(state)?))
    }

    fn fields_producer(&self, state: &SegmentReadState) -> CodecResult<Box<dyn FieldsProducer>> {
        Ok(Box::new(self.reader(state)?))
    }
}

fn check_not_nested(segment_suffix: &str) -> CodecResult<()> {
    if segment_suffix.is_empty() {
        Ok(())
    } else {
        Err(CodecError::configuration(format!(
            "cannot embed per-field postings format inside itself (segment suffix {segment_suffix:?})"
        )))
    }
}

/// Write side of [`PerFieldPostingsFormat`].
pub struct PerFieldFieldsWriter {
    policy: Arc<dyn PostingsFormatPolicy>,
    state: SegmentWriteState,
    arena: WriterArena<dyn PostingsFormat, Box<dyn FieldsConsumer>>,
    closed: bool,
}

impl PerFieldFieldsWriter {
    fn new(policy: Arc<dyn PostingsFormatPolicy>, state: &SegmentWriteState) -> CodecResult<Self> {
        check_not_nested(&state.segment_suffix)?;
        Ok(Self {
            policy,
            state: state.clone(),
            arena: WriterArena::new(),
            closed: false,
        })
    }

    /// Number of distinct sub-writers opened so far.
    #[must_use]
    pub fn sub_writer_count(&self) -> usize {
        self.arena.len()
    }

    /// Format name and suffix of every sub-writer, in opening order.
    #[must_use]
    pub fn assignments(&self) -> Vec<FormatAssignment> {
        self.arena
            .suffixes()
            .map(|(format, suffix)| FormatAssignment {
                format_name: format.name().to_string(),
                suffix,
            })
            .collect()
    }
}

impl fmt::Debug for PerFieldFieldsWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerFieldFieldsWriter")
            .field("segment", &self.state.segment_info.name())
            .field("arena", &self.arena)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl FieldsConsumer for PerFieldFieldsWriter {
    fn add_field(&mut self, field: &mut FieldInfo) -> CodecResult<Box<dyn TermsConsumer + '_>> {
        if self.closed {
            return Err(closed_error("per-field postings writer"));
        }

        let format = self.policy.format_for_field(field).ok_or_else(|| {
            CodecError::configuration(format!(
                "no postings format for field {:?}",
                field.name()
            ))
        })?;
        let format_name = format.name().to_string();
        check_format_name(&format_name)?;

        let state = &self.state;
        let index = self.arena.assign(
            field,
            PerFieldKeys::POSTINGS,
            format,
            &format_name,
            &state.segment_suffix,
            |format, suffix| format.fields_consumer(&state.with_suffix(suffix)),
        )?;

        self.arena.writer_mut(index).add_field(field)
    }

    fn close(&mut self) -> CodecResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        close_all(self.arena.take_writers(), |mut writer| writer.close())
    }
}

/// Read side of [`PerFieldPostingsFormat`].
///
/// Holds one sub-reader per distinct sub-format instance that was written
/// and routes each field to it.
pub struct PerFieldFieldsReader {
    table: ReaderTable<dyn FieldsProducer>,
    owner: bool,
    closed: AtomicBool,
}

impl PerFieldFieldsReader {
    fn open(registry: &FormatRegistry, state: &SegmentReadState) -> CodecResult<Self> {
        check_not_nested(&state.segment_suffix)?;

        let table: ReaderTable<dyn FieldsProducer> = ReaderTable::open(
            &state.field_infos,
            PerFieldKeys::POSTINGS,
            &state.segment_suffix,
            FieldInfo::is_indexed,
            |format_name, suffix| {
                let format = registry.postings_format(format_name)?;
                let producer = format.fields_producer(&state.with_suffix(suffix))?;
                Ok(Arc::from(producer))
            },
            |producer: &(dyn FieldsProducer + 'static)| producer.close(),
        )?;

        Ok(Self {
            table,
            owner: true,
            closed: AtomicBool::new(false),
        })
    }

    /// Returns a reader sharing this reader's sub-readers.
    ///
    /// No sub-reader is reopened. The snapshot does not own them: closing it
    /// is a no-op, and it stops working once this reader is closed.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        Self {
            table: self.table.share(),
            owner: false,
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the assignment recorded for `field`.
    #[must_use]
    pub fn assignment(&self, field: &str) -> Option<&FormatAssignment> {
        self.table.assignment(field)
    }

    /// Returns the sub-reader serving `field`.
    #[must_use]
    pub fn sub_reader(&self, field: &str) -> Option<&Arc<dyn FieldsProducer>> {
        self.table.reader(field)
    }

    /// Number of distinct sub-readers.
    #[must_use]
    pub fn sub_reader_count(&self) -> usize {
        self.table.readers().len()
    }

    fn ensure_open(&self) -> CodecResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed_error("per-field postings reader"));
        }
        Ok(())
    }
}

impl fmt::Debug for PerFieldFieldsReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerFieldFieldsReader")
            .field("table", &self.table)
            .field("owner", &self.owner)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl FieldsProducer for PerFieldFieldsReader {
    fn fields(&self) -> Vec<String> {
        self.table.field_names()
    }

    fn terms(&self, field: &str) -> CodecResult<Option<Box<dyn Terms>>> {
        self.ensure_open()?;
        match self.table.reader(field) {
            Some(reader) => reader.terms(field),
            None => Ok(None),
        }
    }

    fn size(&self) -> usize {
        self.table.field_count()
    }

    fn check_integrity(&self) -> CodecResult<()> {
        self.ensure_open()?;
        self.table
            .readers()
            .iter()
            .try_for_each(|reader| reader.check_integrity())
    }

    fn close(&self) -> CodecResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) || !self.owner {
            return Ok(());
        }
        close_all(self.table.readers(), |reader| reader.close())
    }
}
