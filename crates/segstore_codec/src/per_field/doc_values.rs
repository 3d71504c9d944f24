//! Per-field doc values multiplexer.

use super::arena::{closed_error, ReaderTable, WriterArena};
use crate::doc_values::{
    BinaryDocValues, DocValuesConsumer, DocValuesFormat, DocValuesProducer, NumericDocValues,
    SortedDocValues,
};
use crate::error::{CodecError, CodecResult};
use crate::field_info::{FieldInfo, FormatAssignment, PerFieldKeys};
use crate::naming::check_format_name;
use crate::policy::DocValuesFormatPolicy;
use crate::registry::FormatRegistry;
use crate::segment::{SegmentReadState, SegmentWriteState};
use segstore_storage::close::close_all;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A doc values format that delegates each field to a format chosen by a policy.
///
/// Same scheme as [`super::PerFieldPostingsFormat`], with its attributes
/// recorded under [`PerFieldKeys::DOC_VALUES`].
#[derive(Clone)]
pub struct PerFieldDocValuesFormat {
    policy: Arc<dyn DocValuesFormatPolicy>,
    registry: Arc<FormatRegistry>,
}

impl PerFieldDocValuesFormat {
    /// Name of the multiplexer itself.
    pub const NAME: &'static str = "PerFieldDocValues";

    /// Creates a multiplexer reading formats back from the default registry.
    pub fn new(policy: impl DocValuesFormatPolicy + 'static) -> Self {
        Self::with_registry(policy, Arc::new(FormatRegistry::with_defaults()))
    }

    /// Creates a multiplexer reading formats back from `registry`.
    pub fn with_registry(
        policy: impl DocValuesFormatPolicy + 'static,
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
    /// Returns [`CodecError::Configuration`] if this format is nested inside
    /// a per-field format.
    pub fn writer(&self, state: &SegmentWriteState) -> CodecResult<PerFieldDocValuesWriter> {
        PerFieldDocValuesWriter::new(Arc::clone(&self.policy), state)
    }

    /// Opens the read side.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Configuration`] for nesting or unknown format
    /// names, [`CodecError::Corrupted`] for malformed attributes, and any
    /// error of the sub-readers. Nothing stays open on failure.
    pub fn reader(&self, state: &SegmentReadState) -> CodecResult<PerFieldDocValuesReader> {
        PerFieldDocValuesReader::open(&self.registry, state)
    }
}

impl fmt::Debug for PerFieldDocValuesFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerFieldDocValuesFormat")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl DocValuesFormat for PerFieldDocValuesFormat {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn fields_consumer(
        &self,
        state: &SegmentWriteState,
    ) -> CodecResult<Box<dyn DocValuesConsumer>> {
        Ok(Box::new(self.writer(state)?))
    }

    fn fields_producer(
        &self,
        state: &SegmentReadState,
    ) -> CodecResult<Box<dyn DocValuesProducer>> {
        Ok(Box::new(self.reader(state)?))
    }
}

fn check_not_nested(segment_suffix: &str) -> CodecResult<()> {
    if segment_suffix.is_empty() {
        Ok(())
    } else {
        Err(CodecError::configuration(format!(
            "cannot embed per-field doc values format inside itself (segment suffix {segment_suffix:?})"
        )))
    }
}

/// Write side of [`PerFieldDocValuesFormat`].
pub struct PerFieldDocValuesWriter {
    policy: Arc<dyn DocValuesFormatPolicy>,
    state: SegmentWriteState,
    arena: WriterArena<dyn DocValuesFormat, Box<dyn DocValuesConsumer>>,
    closed: bool,
}

impl PerFieldDocValuesWriter {
    fn new(policy: Arc<dyn DocValuesFormatPolicy>, state: &SegmentWriteState) -> CodecResult<Self> {
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

    /// Resolves the sub-writer for `field`, recording the assignment.
    fn consumer_for(&mut self, field: &mut FieldInfo) -> CodecResult<&mut dyn DocValuesConsumer> {
        if self.closed {
            return Err(closed_error("per-field doc values writer"));
        }

        let format = self.policy.format_for_field(field).ok_or_else(|| {
            CodecError::configuration(format!(
                "no doc values format for field {:?}",
                field.name()
            ))
        })?;
        let format_name = format.name().to_string();
        check_format_name(&format_name)?;

        let state = &self.state;
        let index = self.arena.assign(
            field,
            PerFieldKeys::DOC_VALUES,
            format,
            &format_name,
            &state.segment_suffix,
            |format, suffix| format.fields_consumer(&state.with_suffix(suffix)),
        )?;
        Ok(self.arena.writer_mut(index).as_mut())
    }
}

impl fmt::Debug for PerFieldDocValuesWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerFieldDocValuesWriter")
            .field("segment", &self.state.segment_info.name())
            .field("arena", &self.arena)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl DocValuesConsumer for PerFieldDocValuesWriter {
    fn add_numeric_field(
        &mut self,
        field: &mut FieldInfo,
        values: &[Option<i64>],
    ) -> CodecResult<()> {
        self.consumer_for(field)?.add_numeric_field(field, values)
    }

    fn add_binary_field(
        &mut self,
        field: &mut FieldInfo,
        values: &[Option<Vec<u8>>],
    ) -> CodecResult<()> {
        self.consumer_for(field)?.add_binary_field(field, values)
    }

    fn add_sorted_field(
        &mut self,
        field: &mut FieldInfo,
        values: &[Option<Vec<u8>>],
    ) -> CodecResult<()> {
        self.consumer_for(field)?.add_sorted_field(field, values)
    }

    fn close(&mut self) -> CodecResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        close_all(self.arena.take_writers(), |mut writer| writer.close())
    }
}

/// Read side of [`PerFieldDocValuesFormat`].
pub struct PerFieldDocValuesReader {
    table: ReaderTable<dyn DocValuesProducer>,
    owner: bool,
    closed: AtomicBool,
}

impl PerFieldDocValuesReader {
    fn open(registry: &FormatRegistry, state: &SegmentReadState) -> CodecResult<Self> {
        check_not_nested(&state.segment_suffix)?;

        let table: ReaderTable<dyn DocValuesProducer> = ReaderTable::open(
            &state.field_infos,
            PerFieldKeys::DOC_VALUES,
            &state.segment_suffix,
            FieldInfo::has_doc_values,
            |format_name, suffix| {
                let format = registry.doc_values_format(format_name)?;
                let producer = format.fields_producer(&state.with_suffix(suffix))?;
                Ok(Arc::from(producer))
            },
            |producer: &(dyn DocValuesProducer + 'static)| producer.close(),
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
    pub fn sub_reader(&self, field: &str) -> Option<&Arc<dyn DocValuesProducer>> {
        self.table.reader(field)
    }

    /// Number of distinct sub-readers.
    #[must_use]
    pub fn sub_reader_count(&self) -> usize {
        self.table.readers().len()
    }

    /// Names of the fields with doc values, sorted.
    #[must_use]
    pub fn fields(&self) -> Vec<String> {
        self.table.field_names()
    }

    fn producer(&self, field: &FieldInfo) -> CodecResult<Option<&Arc<dyn DocValuesProducer>>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed_error("per-field doc values reader"));
        }
        Ok(self.table.reader(field.name()))
    }
}

impl fmt::Debug for PerFieldDocValuesReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerFieldDocValuesReader")
            .field("table", &self.table)
            .field("owner", &self.owner)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl DocValuesProducer for PerFieldDocValuesReader {
    fn get_numeric(&self, field: &FieldInfo) -> CodecResult<Option<Box<dyn NumericDocValues>>> {
        match self.producer(field)? {
            Some(producer) => producer.get_numeric(field),
            None => Ok(None),
        }
    }

    fn get_binary(&self, field: &FieldInfo) -> CodecResult<Option<Box<dyn BinaryDocValues>>> {
        match self.producer(field)? {
            Some(producer) => producer.get_binary(field),
            None => Ok(None),
        }
    }

    fn get_sorted(&self, field: &FieldInfo) -> CodecResult<Option<Box<dyn SortedDocValues>>> {
        match self.producer(field)? {
            Some(producer) => producer.get_sorted(field),
            None => Ok(None),
        }
    }

    fn check_integrity(&self) -> CodecResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed_error("per-field doc values reader"));
        }
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
