//! Whole-segment write and verify harness.
//!
//! [`SegmentHarness`] collects fields with their data and chosen formats,
//! writes the segment through the per-field postings and doc values formats
//! plus the field infos file, then reopens it and checks that every value
//! reads back.

use crate::fixtures::{read_terms, FieldTerms};
use segstore_codec::{
    CodecResult, DocValuesConsumer, DocValuesFormat, DocValuesProducer, DocValuesType,
    FieldFormatMap, FieldInfo, FieldInfos, FieldInfosFormat, FieldsConsumer, FieldsProducer,
    FormatAssignment, FormatRegistry, IndexOptions, PerFieldDocValuesFormat,
    PerFieldDocValuesReader, PerFieldFieldsReader, PerFieldPostingsFormat, PostingsFormat,
    SegmentInfo, SegmentReadState, SegmentWriteState, TermsConsumer,
};
use segstore_storage::close::close_while_handling_errors;
use segstore_storage::{Directory, TrackingDirectory};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Expected per-document values of one doc values field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocValuesData {
    /// Numeric values.
    Numeric(Vec<Option<i64>>),
    /// Binary values.
    Binary(Vec<Option<Vec<u8>>>),
    /// Sorted values.
    Sorted(Vec<Option<Vec<u8>>>),
}

impl DocValuesData {
    fn kind(&self) -> DocValuesType {
        match self {
            Self::Numeric(_) => DocValuesType::Numeric,
            Self::Binary(_) => DocValuesType::Binary,
            Self::Sorted(_) => DocValuesType::Sorted,
        }
    }
}

/// A reopened segment.
#[derive(Debug)]
pub struct OpenSegment {
    /// Field infos as read back from the `.fnm` file.
    pub field_infos: Arc<FieldInfos>,
    /// Per-field postings reader.
    pub postings: PerFieldFieldsReader,
    /// Per-field doc values reader.
    pub doc_values: PerFieldDocValuesReader,
}

impl OpenSegment {
    /// Closes both readers, returning the first error.
    pub fn close(&self) -> CodecResult<()> {
        let mut first = None;
        if let Err(err) = self.postings.close() {
            first = Some(err);
        }
        if let Err(err) = self.doc_values.close() {
            match first {
                None => first = Some(err),
                Some(_) => tracing::warn!(error = %err, "suppressed error while closing segment"),
            }
        }
        first.map_or(Ok(()), Err)
    }
}

/// A harness for writing and verifying one segment.
pub struct SegmentHarness {
    directory: Arc<dyn Directory>,
    segment: Arc<SegmentInfo>,
    fields: Vec<FieldInfo>,
    postings_formats: FieldFormatMap<dyn PostingsFormat>,
    doc_values_formats: FieldFormatMap<dyn DocValuesFormat>,
    registry: FormatRegistry,
    registered_postings: BTreeSet<String>,
    registered_doc_values: BTreeSet<String>,
    terms: BTreeMap<String, FieldTerms>,
    doc_values: BTreeMap<String, DocValuesData>,
    written: Option<Vec<FieldInfo>>,
}

impl SegmentHarness {
    /// Creates a harness for a segment named `_0` with `max_doc` documents.
    pub fn new(directory: Arc<dyn Directory>, max_doc: u32) -> Self {
        Self {
            directory,
            segment: Arc::new(SegmentInfo::new("_0", max_doc)),
            fields: Vec::new(),
            postings_formats: FieldFormatMap::new(),
            doc_values_formats: FieldFormatMap::new(),
            registry: FormatRegistry::new(),
            registered_postings: BTreeSet::new(),
            registered_doc_values: BTreeSet::new(),
            terms: BTreeMap::new(),
            doc_values: BTreeMap::new(),
            written: None,
        }
    }

    /// Returns the segment being written.
    pub fn segment(&self) -> &Arc<SegmentInfo> {
        &self.segment
    }

    /// Returns the directory.
    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    /// Adds an indexed field written with `format`.
    pub fn add_postings_field(
        &mut self,
        name: &str,
        options: IndexOptions,
        format: Arc<dyn PostingsFormat>,
        terms: FieldTerms,
    ) -> &mut Self {
        let field = FieldInfo::new(name, self.next_number()).with_index_options(options);
        self.push_field(field);
        if self.registered_postings.insert(format.name().to_string()) {
            self.registry.register_postings(Arc::clone(&format));
        }
        self.postings_formats = self.postings_formats.clone().with_field(name, format);
        self.terms.insert(name.to_string(), terms);
        self
    }

    /// Adds a doc values field written with `format`.
    pub fn add_doc_values_field(
        &mut self,
        name: &str,
        format: Arc<dyn DocValuesFormat>,
        data: DocValuesData,
    ) -> &mut Self {
        let field = FieldInfo::new(name, self.next_number()).with_doc_values(data.kind());
        self.push_field(field);
        if self.registered_doc_values.insert(format.name().to_string()) {
            self.registry.register_doc_values(Arc::clone(&format));
        }
        self.doc_values_formats = self.doc_values_formats.clone().with_field(name, format);
        self.doc_values.insert(name.to_string(), data);
        self
    }

    fn next_number(&self) -> u32 {
        self.fields.len() as u32
    }

    fn push_field(&mut self, field: FieldInfo) {
        assert!(
            self.fields.iter().all(|f| f.name() != field.name()),
            "field {} added twice",
            field.name()
        );
        self.fields.push(field);
    }

    /// The postings multiplexer the harness writes with.
    pub fn postings_format(&self) -> PerFieldPostingsFormat {
        PerFieldPostingsFormat::with_registry(
            self.postings_formats.clone(),
            Arc::new(self.registry.clone()),
        )
    }

    /// The doc values multiplexer the harness writes with.
    pub fn doc_values_format(&self) -> PerFieldDocValuesFormat {
        PerFieldDocValuesFormat::with_registry(
            self.doc_values_formats.clone(),
            Arc::new(self.registry.clone()),
        )
    }

    /// Writes postings, doc values and field infos.
    ///
    /// Returns the assignments of the postings and doc values sub-writers,
    /// in opening order. Every file created on the way is recorded in the
    /// segment's file set.
    pub fn write(&mut self) -> CodecResult<(Vec<FormatAssignment>, Vec<FormatAssignment>)> {
        let tracking = Arc::new(TrackingDirectory::new(Arc::clone(&self.directory)));
        let state = SegmentWriteState::new(
            Arc::clone(&tracking) as Arc<dyn Directory>,
            Arc::clone(&self.segment),
        );
        let mut fields = self.fields.clone();

        let mut postings = self.postings_format().writer(&state)?;
        for field in fields.iter_mut().filter(|f| f.is_indexed()) {
            let mut writer = postings.add_field(field)?;
            for (term, list) in &self.terms[field.name()] {
                writer.add_term(term, list)?;
            }
            writer.finish()?;
        }
        let postings_assignments = postings.assignments();
        postings.close()?;

        let mut doc_values = self.doc_values_format().writer(&state)?;
        for field in fields.iter_mut().filter(|f| f.has_doc_values()) {
            match &self.doc_values[field.name()] {
                DocValuesData::Numeric(values) => doc_values.add_numeric_field(field, values)?,
                DocValuesData::Binary(values) => doc_values.add_binary_field(field, values)?,
                DocValuesData::Sorted(values) => doc_values.add_sorted_field(field, values)?,
            }
        }
        let doc_values_assignments = doc_values.assignments();
        doc_values.close()?;

        let infos = FieldInfos::new(fields.clone())?;
        FieldInfosFormat.write(tracking.as_ref(), &self.segment, "", &infos)?;
        Arc::make_mut(&mut self.segment).set_files(tracking.created_files());
        tracing::debug!(
            segment = self.segment.name(),
            files = self.segment.files().len(),
            "wrote segment"
        );
        self.written = Some(fields);

        Ok((postings_assignments, doc_values_assignments))
    }

    /// Reopens the written segment from its files.
    pub fn open(&self) -> CodecResult<OpenSegment> {
        let field_infos = Arc::new(FieldInfosFormat.read(
            self.directory.as_ref(),
            &self.segment,
            "",
        )?);
        let state = SegmentReadState::new(
            Arc::clone(&self.directory),
            Arc::clone(&self.segment),
            Arc::clone(&field_infos),
        );

        let postings = self.postings_format().reader(&state)?;
        let doc_values = match self.doc_values_format().reader(&state) {
            Ok(reader) => reader,
            Err(err) => {
                close_while_handling_errors(Some(&postings), |reader| reader.close());
                return Err(err);
            }
        };

        Ok(OpenSegment {
            field_infos,
            postings,
            doc_values,
        })
    }

    /// Checks every field of `segment` against the data the harness wrote.
    ///
    /// # Panics
    ///
    /// Panics on the first mismatch.
    pub fn verify(&self, segment: &OpenSegment) {
        let written = self.written.as_ref().expect("Segment was not written");
        assert_eq!(
            segment.field_infos.iter().cloned().collect::<Vec<_>>(),
            *written,
            "field infos do not round-trip"
        );

        for (name, expected) in &self.terms {
            let actual = read_terms(&segment.postings, name).expect("Field has no postings");
            assert_eq!(&actual, expected, "terms mismatch for field {name}");
        }

        for (name, expected) in &self.doc_values {
            let field = segment
                .field_infos
                .field_info(name)
                .expect("Field missing from field infos");
            verify_doc_values(&segment.doc_values, field, expected);
        }

        segment
            .postings
            .check_integrity()
            .expect("Postings integrity check failed");
        segment
            .doc_values
            .check_integrity()
            .expect("Doc values integrity check failed");
    }

    /// Writes, reopens, verifies and closes the segment.
    pub fn round_trip(&mut self) {
        self.write().expect("Failed to write segment");
        let segment = self.open().expect("Failed to open segment");
        self.verify(&segment);
        segment.close().expect("Failed to close segment");
    }
}

fn verify_doc_values(producer: &dyn DocValuesProducer, field: &FieldInfo, expected: &DocValuesData) {
    let name = field.name();
    match expected {
        DocValuesData::Numeric(values) => {
            let mut actual = producer
                .get_numeric(field)
                .expect("Failed to read numeric values")
                .expect("Field has no numeric values");
            for (doc, value) in values.iter().enumerate() {
                assert_eq!(
                    actual.get(doc as u32).expect("Failed to read value"),
                    *value,
                    "numeric mismatch for field {name} doc {doc}"
                );
            }
        }
        DocValuesData::Binary(values) => {
            let mut actual = producer
                .get_binary(field)
                .expect("Failed to read binary values")
                .expect("Field has no binary values");
            for (doc, value) in values.iter().enumerate() {
                assert_eq!(
                    actual.get(doc as u32).expect("Failed to read value"),
                    *value,
                    "binary mismatch for field {name} doc {doc}"
                );
            }
        }
        DocValuesData::Sorted(values) => {
            let mut actual = producer
                .get_sorted(field)
                .expect("Failed to read sorted values")
                .expect("Field has no sorted values");
            let distinct: BTreeSet<&Vec<u8>> = values.iter().flatten().collect();
            assert_eq!(actual.value_count() as usize, distinct.len());
            for (doc, value) in values.iter().enumerate() {
                assert_eq!(
                    actual.get(doc as u32).expect("Failed to read value"),
                    *value,
                    "sorted mismatch for field {name} doc {doc}"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::simple_terms;
    use segstore_codec::{PlainDocValuesFormat, PlainPostingsFormat};
    use segstore_storage::RamDirectory;

    #[test]
    fn harness_round_trip() {
        let mut harness = SegmentHarness::new(Arc::new(RamDirectory::new()), 3);
        let plain: Arc<dyn PostingsFormat> = Arc::new(PlainPostingsFormat::new());
        let dv: Arc<dyn DocValuesFormat> = Arc::new(PlainDocValuesFormat::new());
        harness
            .add_postings_field(
                "title",
                IndexOptions::Docs,
                plain,
                simple_terms(&["a", "b", "c"]),
            )
            .add_doc_values_field("rank", dv, DocValuesData::Numeric(vec![Some(3), None, Some(1)]));
        harness.round_trip();
    }

    #[test]
    fn write_records_segment_files() {
        let dir = Arc::new(RamDirectory::new());
        let mut harness = SegmentHarness::new(Arc::clone(&dir) as Arc<dyn Directory>, 2);
        let id = *harness.segment().id();
        assert!(harness.segment().files().is_empty());

        let plain: Arc<dyn PostingsFormat> = Arc::new(PlainPostingsFormat::new());
        let dv: Arc<dyn DocValuesFormat> = Arc::new(PlainDocValuesFormat::new());
        harness
            .add_postings_field("body", IndexOptions::Docs, plain, simple_terms(&["x", "y"]))
            .add_doc_values_field("size", dv, DocValuesData::Numeric(vec![Some(7), None]));
        harness.write().unwrap();

        let files: Vec<&str> = harness.segment().files().iter().map(String::as_str).collect();
        assert_eq!(files, vec!["_0.fnm", "_0_Plain_0.dvd", "_0_Plain_0.pst"]);
        assert_eq!(harness.segment().id(), &id);

        let mut listed = dir.list_all().unwrap();
        listed.sort();
        assert_eq!(listed, files);

        let segment = harness.open().unwrap();
        harness.verify(&segment);
        segment.close().unwrap();
    }

    #[test]
    #[should_panic(expected = "added twice")]
    fn duplicate_field_panics() {
        let mut harness = SegmentHarness::new(Arc::new(RamDirectory::new()), 1);
        let plain: Arc<dyn PostingsFormat> = Arc::new(PlainPostingsFormat::new());
        harness.add_postings_field("f", IndexOptions::Docs, Arc::clone(&plain), FieldTerms::new());
        harness.add_postings_field("f", IndexOptions::Docs, plain, FieldTerms::new());
    }
}
