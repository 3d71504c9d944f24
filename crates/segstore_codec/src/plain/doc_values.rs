//! Plain doc values encoding.
//!
//! ```text
//! numeric      | per doc: present u8 | value i64 |
//! binary       | per doc: data offset i64 | length i32 (-1 = missing) | data bytes |
//! sorted       | per ord: data offset i64 | length i32 |
//!              | per doc: ord i32 (-1 = missing) | data bytes |
//! directory    | field count vint | per field: name | type u8 | offset vlong |
//!              |                                length vlong | count vlong |
//! ```
//!
//! Every value is addressed directly from the document number, so readers
//! serve lookups from a slice of the file without loading anything.

use super::{corrupted, seek_to_directory, PLAIN_FORMAT_NAME};
use crate::doc_values::{
    BinaryDocValues, DocValuesConsumer, DocValuesFormat, DocValuesProducer, NumericDocValues,
    SortedDocValues,
};
use crate::error::{CodecError, CodecResult};
use crate::field_info::{DocValuesType, FieldInfo};
use crate::naming::check_format_name;
use crate::segment::{SegmentReadState, SegmentWriteState};
use parking_lot::Mutex;
use segstore_storage::close::close_while_handling_errors;
use segstore_storage::codec_util;
use segstore_storage::{IndexInput, IndexOutput, StoreError};
use std::collections::{BTreeSet, HashMap};

const CODEC: &str = "SegstorePlainDocValues";
const VERSION_START: i32 = 0;
const VERSION_CURRENT: i32 = VERSION_START;

/// Extension of plain doc values files.
pub const EXTENSION: &str = "dvd";

const NUMERIC_SLOT: u64 = 9;
const ADDRESS_SLOT: u64 = 12;
const ORD_SLOT: u64 = 4;

/// A simple doc values format writing one `.dvd` file per segment suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainDocValuesFormat {
    name: String,
}

impl PlainDocValuesFormat {
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

impl Default for PlainDocValuesFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl DocValuesFormat for PlainDocValuesFormat {
    fn name(&self) -> &str {
        &self.name
    }

    fn fields_consumer(
        &self,
        state: &SegmentWriteState,
    ) -> CodecResult<Box<dyn DocValuesConsumer>> {
        Ok(Box::new(PlainDocValuesWriter::create(state)?))
    }

    fn fields_producer(
        &self,
        state: &SegmentReadState,
    ) -> CodecResult<Box<dyn DocValuesProducer>> {
        Ok(Box::new(PlainDocValuesReader::open(state)?))
    }
}

#[derive(Debug)]
struct Entry {
    name: String,
    kind: DocValuesType,
    offset: u64,
    length: u64,
    count: u64,
}

#[derive(Debug)]
struct PlainDocValuesWriter {
    out: Option<Box<dyn IndexOutput>>,
    max_doc: u32,
    entries: Vec<Entry>,
}

impl PlainDocValuesWriter {
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
            entries: Vec::new(),
        })
    }

    /// Validates a field before writing, returning the output and the field's offset.
    fn begin<T>(
        &mut self,
        field: &FieldInfo,
        kind: DocValuesType,
        values: &[T],
    ) -> CodecResult<(&mut dyn IndexOutput, u64)> {
        if field.doc_values_type() != kind {
            return Err(CodecError::invalid_argument(format!(
                "field {:?} has doc values type {:?}, cannot write {kind:?} values",
                field.name(),
                field.doc_values_type()
            )));
        }
        if values.len() != self.max_doc as usize {
            return Err(CodecError::invalid_argument(format!(
                "field {:?} has {} values but the segment has {} documents",
                field.name(),
                values.len(),
                self.max_doc
            )));
        }
        if self.entries.iter().any(|e| e.name == field.name()) {
            return Err(CodecError::invalid_argument(format!(
                "field {:?} was already written",
                field.name()
            )));
        }

        let out = self
            .out
            .as_mut()
            .ok_or_else(|| CodecError::invalid_operation("plain doc values writer is closed"))?;
        let offset = out.file_pointer();
        Ok((out.as_mut(), offset))
    }

    fn finish(&mut self, field: &FieldInfo, kind: DocValuesType, offset: u64, count: u64) {
        let length = self.out.as_ref().map_or(0, |out| out.file_pointer() - offset);
        self.entries.push(Entry {
            name: field.name().to_string(),
            kind,
            offset,
            length,
            count,
        });
    }

    fn write_directory(&self, out: &mut dyn IndexOutput) -> CodecResult<()> {
        let directory_offset = out.file_pointer();
        out.write_len(self.entries.len())?;
        for entry in &self.entries {
            out.write_string(&entry.name)?;
            out.write_byte(entry.kind.as_byte())?;
            out.write_vlong(entry.offset as i64)?;
            out.write_vlong(entry.length as i64)?;
            out.write_vlong(entry.count as i64)?;
        }
        out.write_i64(directory_offset as i64)?;
        codec_util::write_footer(out)?;
        Ok(())
    }
}

fn value_length(field: &FieldInfo, value: &[u8]) -> CodecResult<i32> {
    i32::try_from(value.len()).map_err(|_| {
        CodecError::invalid_argument(format!(
            "value of {} bytes is too large for field {:?}",
            value.len(),
            field.name()
        ))
    })
}

/// Writes `(offset, length)` addresses of `values` relative to the data start.
fn write_addresses<'v>(
    out: &mut dyn IndexOutput,
    field: &FieldInfo,
    values: impl Iterator<Item = Option<&'v [u8]>>,
) -> CodecResult<()> {
    let mut data_offset = 0i64;
    for value in values {
        match value {
            Some(bytes) => {
                let len = value_length(field, bytes)?;
                out.write_i64(data_offset)?;
                out.write_i32(len)?;
                data_offset += i64::from(len);
            }
            None => {
                out.write_i64(data_offset)?;
                out.write_i32(-1)?;
            }
        }
    }
    Ok(())
}

impl DocValuesConsumer for PlainDocValuesWriter {
    fn add_numeric_field(
        &mut self,
        field: &mut FieldInfo,
        values: &[Option<i64>],
    ) -> CodecResult<()> {
        let (out, offset) = self.begin(field, DocValuesType::Numeric, values)?;
        for value in values {
            out.write_byte(u8::from(value.is_some()))?;
            out.write_i64(value.unwrap_or(0))?;
        }
        self.finish(field, DocValuesType::Numeric, offset, values.len() as u64);
        Ok(())
    }

    fn add_binary_field(
        &mut self,
        field: &mut FieldInfo,
        values: &[Option<Vec<u8>>],
    ) -> CodecResult<()> {
        let (out, offset) = self.begin(field, DocValuesType::Binary, values)?;
        write_addresses(out, field, values.iter().map(Option::as_deref))?;
        for bytes in values.iter().flatten() {
            out.write_bytes(bytes)?;
        }
        self.finish(field, DocValuesType::Binary, offset, values.len() as u64);
        Ok(())
    }

    fn add_sorted_field(
        &mut self,
        field: &mut FieldInfo,
        values: &[Option<Vec<u8>>],
    ) -> CodecResult<()> {
        let dictionary: Vec<&[u8]> = values
            .iter()
            .flatten()
            .map(Vec::as_slice)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if i32::try_from(dictionary.len()).is_err() {
            return Err(CodecError::invalid_argument(format!(
                "too many distinct values for field {:?}",
                field.name()
            )));
        }

        let (out, offset) = self.begin(field, DocValuesType::Sorted, values)?;
        write_addresses(out, field, dictionary.iter().map(|v| Some(*v)))?;
        for value in values {
            let ord = match value {
                // Present values are always in the dictionary
                Some(bytes) => dictionary
                    .binary_search(&bytes.as_slice())
                    .map_or(-1, |ord| ord as i32),
                None => -1,
            };
            out.write_i32(ord)?;
        }
        for bytes in &dictionary {
            out.write_bytes(bytes)?;
        }
        self.finish(field, DocValuesType::Sorted, offset, dictionary.len() as u64);
        Ok(())
    }

    fn close(&mut self) -> CodecResult<()> {
        let Some(mut out) = self.out.take() else {
            return Ok(());
        };
        let written = self.write_directory(out.as_mut());
        let closed = out.close();
        written?;
        closed?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Meta {
    kind: DocValuesType,
    offset: u64,
    length: u64,
    count: u64,
}

#[derive(Debug)]
struct PlainDocValuesReader {
    name: String,
    input: Mutex<Option<Box<dyn IndexInput>>>,
    entries: HashMap<String, Meta>,
    max_doc: u32,
}

impl PlainDocValuesReader {
    fn open(state: &SegmentReadState) -> CodecResult<Self> {
        let name = state.file_name(EXTENSION);
        let mut input = state.directory.open_input(&name)?;

        match Self::read_directory(input.as_mut(), state) {
            Ok(entries) => Ok(Self {
                name,
                input: Mutex::new(Some(input)),
                entries,
                max_doc: state.segment_info.max_doc(),
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
    ) -> CodecResult<HashMap<String, Meta>> {
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
        let directory_offset = input.position();

        let count = input.read_len()?;
        let mut entries = HashMap::new();
        for _ in 0..count {
            let name = input.read_string()?;
            if state.field_infos.field_info(&name).is_none() {
                return Err(corrupted(input, format!("unknown field {name:?}")));
            }
            let kind_byte = input.read_byte()?;
            let kind = DocValuesType::from_byte(kind_byte)
                .filter(|k| *k != DocValuesType::None)
                .ok_or_else(|| corrupted(input, format!("invalid doc values type {kind_byte}")))?;
            let offset = read_u64(input)?;
            let length = read_u64(input)?;
            let value_count = read_u64(input)?;

            let in_bounds = offset
                .checked_add(length)
                .is_some_and(|end| offset >= header_length && end <= directory_offset);
            if !in_bounds {
                return Err(corrupted(
                    input,
                    format!("field {name:?} data [{offset}, +{length}) out of bounds"),
                ));
            }

            let meta = Meta {
                kind,
                offset,
                length,
                count: value_count,
            };
            if entries.insert(name.clone(), meta).is_some() {
                return Err(corrupted(input, format!("duplicate field {name:?}")));
            }
        }
        Ok(entries)
    }

    /// Returns a slice over `field`'s data if it has values of type `kind`.
    fn slice(&self, field: &FieldInfo, kind: DocValuesType) -> CodecResult<Option<(Box<dyn IndexInput>, Meta)>> {
        let Some(meta) = self.entries.get(field.name()).copied() else {
            return Ok(None);
        };
        if meta.kind != kind {
            return Err(CodecError::invalid_argument(format!(
                "field {:?} has {:?} doc values, not {kind:?}",
                field.name(),
                meta.kind
            )));
        }

        let guard = self.input.lock();
        let input = guard
            .as_ref()
            .ok_or_else(|| StoreError::already_closed(&self.name))?;
        let slice = input.slice(field.name(), meta.offset, meta.length)?;
        Ok(Some((slice, meta)))
    }
}

fn read_u64(input: &mut dyn IndexInput) -> CodecResult<u64> {
    let value = input.read_vlong()?;
    u64::try_from(value).map_err(|_| corrupted(input, format!("negative value {value}")))
}

fn check_doc(doc: u32, max_doc: u32) -> CodecResult<()> {
    if doc >= max_doc {
        return Err(CodecError::invalid_argument(format!(
            "doc {doc} out of range (max doc {max_doc})"
        )));
    }
    Ok(())
}

/// Reads the `(offset, length)` address at `index`, or `None` for a missing value.
fn read_address(input: &mut dyn IndexInput, index: u64) -> CodecResult<Option<(u64, usize)>> {
    input.seek(index * ADDRESS_SLOT)?;
    let offset = input.read_i64()?;
    let length = input.read_i32()?;
    if length == -1 {
        return Ok(None);
    }
    match (u64::try_from(offset), usize::try_from(length)) {
        (Ok(offset), Ok(length)) => Ok(Some((offset, length))),
        _ => Err(corrupted(
            input,
            format!("invalid address ({offset}, {length})"),
        )),
    }
}

impl DocValuesProducer for PlainDocValuesReader {
    fn get_numeric(&self, field: &FieldInfo) -> CodecResult<Option<Box<dyn NumericDocValues>>> {
        let Some((input, _)) = self.slice(field, DocValuesType::Numeric)? else {
            return Ok(None);
        };
        Ok(Some(Box::new(PlainNumeric {
            input,
            max_doc: self.max_doc,
        })))
    }

    fn get_binary(&self, field: &FieldInfo) -> CodecResult<Option<Box<dyn BinaryDocValues>>> {
        let Some((input, _)) = self.slice(field, DocValuesType::Binary)? else {
            return Ok(None);
        };
        Ok(Some(Box::new(PlainBinary {
            input,
            max_doc: self.max_doc,
        })))
    }

    fn get_sorted(&self, field: &FieldInfo) -> CodecResult<Option<Box<dyn SortedDocValues>>> {
        let Some((input, meta)) = self.slice(field, DocValuesType::Sorted)? else {
            return Ok(None);
        };
        let value_count = u32::try_from(meta.count)
            .map_err(|_| corrupted(input.as_ref(), format!("value count {} too large", meta.count)))?;
        Ok(Some(Box::new(PlainSorted {
            input,
            max_doc: self.max_doc,
            value_count,
        })))
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

struct PlainNumeric {
    input: Box<dyn IndexInput>,
    max_doc: u32,
}

impl NumericDocValues for PlainNumeric {
    fn get(&mut self, doc: u32) -> CodecResult<Option<i64>> {
        check_doc(doc, self.max_doc)?;
        self.input.seek(u64::from(doc) * NUMERIC_SLOT)?;
        let present = self.input.read_byte()?;
        let value = self.input.read_i64()?;
        match present {
            0 => Ok(None),
            1 => Ok(Some(value)),
            other => Err(corrupted(
                self.input.as_ref(),
                format!("invalid presence flag {other}"),
            )),
        }
    }
}

struct PlainBinary {
    input: Box<dyn IndexInput>,
    max_doc: u32,
}

impl BinaryDocValues for PlainBinary {
    fn get(&mut self, doc: u32) -> CodecResult<Option<Vec<u8>>> {
        check_doc(doc, self.max_doc)?;
        let Some((offset, length)) = read_address(self.input.as_mut(), u64::from(doc))? else {
            return Ok(None);
        };
        let data_start = u64::from(self.max_doc) * ADDRESS_SLOT;
        self.input.seek(data_start + offset)?;
        Ok(Some(self.input.read_byte_vec(length)?))
    }
}

struct PlainSorted {
    input: Box<dyn IndexInput>,
    max_doc: u32,
    value_count: u32,
}

impl SortedDocValues for PlainSorted {
    fn ord(&mut self, doc: u32) -> CodecResult<Option<u32>> {
        check_doc(doc, self.max_doc)?;
        let ords_start = u64::from(self.value_count) * ADDRESS_SLOT;
        self.input.seek(ords_start + u64::from(doc) * ORD_SLOT)?;
        let ord = self.input.read_i32()?;
        if ord == -1 {
            return Ok(None);
        }
        match u32::try_from(ord) {
            Ok(ord) if ord < self.value_count => Ok(Some(ord)),
            _ => Err(corrupted(
                self.input.as_ref(),
                format!("invalid ord {ord} for doc {doc}"),
            )),
        }
    }

    fn lookup_ord(&mut self, ord: u32) -> CodecResult<Vec<u8>> {
        if ord >= self.value_count {
            return Err(CodecError::invalid_argument(format!(
                "ord {ord} out of range (value count {})",
                self.value_count
            )));
        }
        let (offset, length) = read_address(self.input.as_mut(), u64::from(ord))?
            .ok_or_else(|| corrupted(self.input.as_ref(), format!("missing value for ord {ord}")))?;
        let data_start = u64::from(self.value_count) * ADDRESS_SLOT
            + u64::from(self.max_doc) * ORD_SLOT;
        self.input.seek(data_start + offset)?;
        Ok(self.input.read_byte_vec(length)?)
    }

    fn value_count(&self) -> u32 {
        self.value_count
    }
}
