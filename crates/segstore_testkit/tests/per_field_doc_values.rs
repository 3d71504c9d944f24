//! Integration tests for the per-field doc values multiplexer.

use segstore_testkit::prelude::*;
use std::sync::Arc;

fn plain() -> Arc<dyn DocValuesFormat> {
    Arc::new(PlainDocValuesFormat::new())
}

fn named(name: &str) -> Arc<dyn DocValuesFormat> {
    Arc::new(PlainDocValuesFormat::with_name(name).unwrap())
}

fn bytes(value: &str) -> Option<Vec<u8>> {
    Some(value.as_bytes().to_vec())
}

struct Fields {
    rank: FieldInfo,
    title: FieldInfo,
    color: FieldInfo,
}

impl Fields {
    fn new() -> Self {
        Self {
            rank: doc_values_field("rank", 0, DocValuesType::Numeric),
            title: doc_values_field("title", 1, DocValuesType::Binary),
            color: doc_values_field("color", 2, DocValuesType::Sorted),
        }
    }

    fn into_vec(self) -> Vec<FieldInfo> {
        vec![self.rank, self.title, self.color]
    }
}

fn write_three_fields(
    dir: &Arc<dyn Directory>,
    segment: &Arc<SegmentInfo>,
    format: &PerFieldDocValuesFormat,
) -> Vec<FieldInfo> {
    let mut fields = Fields::new();
    let mut writer = format.writer(&write_state(dir, segment)).unwrap();
    writer
        .add_numeric_field(&mut fields.rank, &[Some(10), None, Some(-3)])
        .unwrap();
    writer
        .add_binary_field(&mut fields.title, &[bytes("x"), bytes(""), None])
        .unwrap();
    writer
        .add_sorted_field(&mut fields.color, &[bytes("red"), bytes("blue"), bytes("red")])
        .unwrap();
    writer.close().unwrap();
    fields.into_vec()
}

#[test]
fn routes_each_kind_to_its_format() {
    init_tracing();
    let dir = TestDirectory::memory().directory();
    let segment = Arc::new(SegmentInfo::new("_0", 3));

    let shared = plain();
    let policy = FieldFormatMap::new()
        .with_field("rank", Arc::clone(&shared))
        .with_field("title", shared)
        .with_field("color", named("Dict"));
    let mut registry = FormatRegistry::with_defaults();
    registry.register_doc_values(named("Dict"));
    let format = PerFieldDocValuesFormat::with_registry(policy, Arc::new(registry));

    let fields = write_three_fields(&dir, &segment, &format);
    assert_eq!(
        fields[2].get_attribute(PerFieldKeys::DOC_VALUES.format),
        Some("Dict")
    );
    assert!(fields[0]
        .get_attribute(PerFieldKeys::POSTINGS.format)
        .is_none());

    let files = dir.list_all().unwrap();
    assert_eq!(files, vec!["_0_Dict_0.dvd", "_0_Plain_0.dvd"]);

    let reader = format
        .reader(&read_state(&dir, &segment, fields.clone()))
        .unwrap();
    assert_eq!(reader.sub_reader_count(), 2);
    assert_eq!(reader.fields(), vec!["color", "rank", "title"]);
    assert!(Arc::ptr_eq(
        reader.sub_reader("rank").unwrap(),
        reader.sub_reader("title").unwrap()
    ));

    let mut rank = reader.get_numeric(&fields[0]).unwrap().unwrap();
    assert_eq!(rank.get(0).unwrap(), Some(10));
    assert_eq!(rank.get(1).unwrap(), None);
    assert_eq!(rank.get(2).unwrap(), Some(-3));

    let mut title = reader.get_binary(&fields[1]).unwrap().unwrap();
    assert_eq!(title.get(0).unwrap(), bytes("x"));
    assert_eq!(title.get(1).unwrap(), bytes(""));
    assert_eq!(title.get(2).unwrap(), None);

    let mut color = reader.get_sorted(&fields[2]).unwrap().unwrap();
    assert_eq!(color.value_count(), 2);
    assert_eq!(color.ord(0).unwrap(), Some(1));
    assert_eq!(color.ord(1).unwrap(), Some(0));
    assert_eq!(color.lookup_ord(0).unwrap(), b"blue".to_vec());
    assert_eq!(color.get(2).unwrap(), bytes("red"));

    reader.check_integrity().unwrap();
    reader.close().unwrap();
}

#[test]
fn wrong_kind_is_an_invalid_argument() {
    let dir = TestDirectory::memory().directory();
    let segment = Arc::new(SegmentInfo::new("_0", 3));
    let format = PerFieldDocValuesFormat::new(FieldFormatMap::new().with_default(plain()));

    let fields = write_three_fields(&dir, &segment, &format);
    let reader = format
        .reader(&read_state(&dir, &segment, fields.clone()))
        .unwrap();

    let err = reader.get_binary(&fields[0]).err().unwrap();
    assert!(matches!(err, CodecError::InvalidArgument { .. }));
    let err = reader.get_numeric(&fields[2]).err().unwrap();
    assert!(matches!(err, CodecError::InvalidArgument { .. }));
    reader.close().unwrap();
}

#[test]
fn policy_without_format_is_a_configuration_error() {
    let dir = TestDirectory::memory().directory();
    let segment = Arc::new(SegmentInfo::new("_0", 1));
    let format = PerFieldDocValuesFormat::new(FieldFormatMap::new().with_field("known", plain()));

    let mut writer = format.writer(&write_state(&dir, &segment)).unwrap();
    let mut field = doc_values_field("unknown", 0, DocValuesType::Numeric);
    let err = writer.add_numeric_field(&mut field, &[Some(1)]).unwrap_err();
    assert!(err.is_configuration());
    writer.close().unwrap();
    assert!(dir.list_all().unwrap().is_empty());
}

#[test]
fn nested_per_field_format_is_rejected() {
    let dir = TestDirectory::memory().directory();
    let segment = Arc::new(SegmentInfo::new("_0", 1));

    let inner: Arc<dyn DocValuesFormat> =
        Arc::new(PerFieldDocValuesFormat::new(FieldFormatMap::new().with_default(plain())));
    let format = PerFieldDocValuesFormat::new(FieldFormatMap::new().with_default(inner));

    let mut writer = format.writer(&write_state(&dir, &segment)).unwrap();
    let mut field = doc_values_field("f", 0, DocValuesType::Numeric);
    let err = writer.add_numeric_field(&mut field, &[Some(1)]).unwrap_err();
    assert!(err.is_configuration(), "unexpected error: {err}");
    writer.close().unwrap();

    let mut registry = FormatRegistry::with_defaults();
    registry.register_doc_values(Arc::new(PerFieldDocValuesFormat::new(
        FieldFormatMap::<dyn DocValuesFormat>::new(),
    )));
    let reader_format = PerFieldDocValuesFormat::with_registry(
        FieldFormatMap::<dyn DocValuesFormat>::new(),
        Arc::new(registry),
    );
    let mut field = doc_values_field("f", 0, DocValuesType::Numeric);
    field.put_attribute(PerFieldKeys::DOC_VALUES.format, PerFieldDocValuesFormat::NAME);
    field.put_attribute(PerFieldKeys::DOC_VALUES.suffix, "0");
    let err = reader_format
        .reader(&read_state(&dir, &segment, vec![field]))
        .unwrap_err();
    assert!(err.is_configuration(), "unexpected error: {err}");
}

#[test]
fn unknown_format_name_is_a_configuration_error() {
    let dir = TestDirectory::memory().directory();
    let segment = Arc::new(SegmentInfo::new("_0", 1));

    let mut field = doc_values_field("f", 0, DocValuesType::Numeric);
    field.put_attribute(PerFieldKeys::DOC_VALUES.format, "Missing");
    field.put_attribute(PerFieldKeys::DOC_VALUES.suffix, "0");

    let format = PerFieldDocValuesFormat::new(FieldFormatMap::<dyn DocValuesFormat>::new());
    let err = format
        .reader(&read_state(&dir, &segment, vec![field]))
        .unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn failed_open_closes_already_opened_sub_readers() {
    let ram_dir: Arc<dyn Directory> = Arc::new(RamDirectory::new());
    let segment = Arc::new(SegmentInfo::new("_0", 3));

    let policy = FieldFormatMap::new()
        .with_field("rank", plain())
        .with_field("title", named("Second"))
        .with_field("color", named("Third"));
    let mut registry = FormatRegistry::with_defaults();
    registry.register_doc_values(named("Second"));
    registry.register_doc_values(named("Third"));
    let format = PerFieldDocValuesFormat::with_registry(policy, Arc::new(registry));
    let fields = write_three_fields(&ram_dir, &segment, &format);

    let mock = Arc::new(MockDirectory::new(ram_dir));
    mock.fail_on_open("Third");
    let mock_dir: Arc<dyn Directory> = mock.clone();

    let err = format
        .reader(&read_state(&mock_dir, &segment, fields))
        .unwrap_err();
    assert!(err.as_store_error().is_some());
    assert_eq!(
        mock.opened_names(),
        vec!["_0_Plain_0.dvd".to_string(), "_0_Second_0.dvd".to_string()]
    );
    assert_eq!(mock.inputs_closed(), 2);
    assert_eq!(mock.open_inputs(), 0);
    assert_eq!(mock.inputs_leaked(), 0);
}

#[test]
fn field_without_doc_values_returns_none() {
    let dir = TestDirectory::memory().directory();
    let segment = Arc::new(SegmentInfo::new("_0", 3));
    let format = PerFieldDocValuesFormat::new(FieldFormatMap::new().with_default(plain()));

    let mut fields = write_three_fields(&dir, &segment, &format);
    let unwritten = doc_values_field("unwritten", 3, DocValuesType::Numeric);
    fields.push(unwritten.clone());
    fields.push(docs_field("text", 4));

    let reader = format
        .reader(&read_state(&dir, &segment, fields.clone()))
        .unwrap();
    assert!(reader.get_numeric(&unwritten).unwrap().is_none());
    assert!(reader.get_numeric(&fields[4]).unwrap().is_none());
    assert!(reader.assignment("text").is_none());
    assert_eq!(reader.fields(), vec!["color", "rank", "title"]);
    reader.close().unwrap();
}

#[test]
fn snapshot_shares_sub_readers() {
    let mock = Arc::new(MockDirectory::in_memory());
    let dir: Arc<dyn Directory> = mock.clone();
    let segment = Arc::new(SegmentInfo::new("_0", 3));
    let format = PerFieldDocValuesFormat::new(FieldFormatMap::new().with_default(plain()));

    let fields = write_three_fields(&dir, &segment, &format);
    let reader = format
        .reader(&read_state(&dir, &segment, fields.clone()))
        .unwrap();
    let snapshot = reader.snapshot();
    assert_eq!(mock.inputs_opened(), 1);
    assert!(Arc::ptr_eq(
        reader.sub_reader("rank").unwrap(),
        snapshot.sub_reader("rank").unwrap()
    ));

    let mut rank = snapshot.get_numeric(&fields[0]).unwrap().unwrap();
    assert_eq!(rank.get(0).unwrap(), Some(10));

    snapshot.close().unwrap();
    assert_eq!(mock.inputs_closed(), 0);
    assert!(snapshot.get_numeric(&fields[0]).is_err());
    assert!(reader.get_numeric(&fields[0]).unwrap().is_some());

    reader.close().unwrap();
    assert_eq!(mock.open_inputs(), 0);
    assert!(reader.check_integrity().is_err());
}

#[test]
fn adding_a_field_twice_is_a_duplicate_attribute() {
    let dir = TestDirectory::memory().directory();
    let segment = Arc::new(SegmentInfo::new("_0", 1));
    let format = PerFieldDocValuesFormat::new(FieldFormatMap::new().with_default(plain()));

    let mut writer = format.writer(&write_state(&dir, &segment)).unwrap();
    let mut field = doc_values_field("f", 0, DocValuesType::Numeric);
    writer.add_numeric_field(&mut field, &[Some(1)]).unwrap();
    let err = writer.add_numeric_field(&mut field, &[Some(2)]).unwrap_err();
    assert!(matches!(err, CodecError::DuplicateAttribute { .. }));
    writer.close().unwrap();
}

#[test]
fn check_integrity_detects_flipped_bytes() {
    let ram = Arc::new(RamDirectory::new());
    let dir: Arc<dyn Directory> = ram.clone();
    let segment = Arc::new(SegmentInfo::new("_0", 1));
    let format = PerFieldDocValuesFormat::new(FieldFormatMap::new().with_default(plain()));

    let mut field = doc_values_field("payload", 0, DocValuesType::Binary);
    let payload = b"0123456789abcdef".to_vec();
    let mut writer = format.writer(&write_state(&dir, &segment)).unwrap();
    writer
        .add_binary_field(&mut field, &[Some(payload.clone())])
        .unwrap();
    writer.close().unwrap();

    let mut bytes = ram.file_bytes("_0_Plain_0.dvd").unwrap();
    let at = bytes
        .windows(payload.len())
        .position(|window| window == payload.as_slice())
        .unwrap();
    bytes[at] ^= 0x01;
    ram.insert_file("_0_Plain_0.dvd", bytes);

    let reader = format
        .reader(&read_state(&dir, &segment, vec![field]))
        .unwrap();
    let err = reader.check_integrity().unwrap_err();
    assert!(matches!(
        err.as_store_error(),
        Some(StoreError::Corrupted { .. })
    ));
    reader.close().unwrap();
}

#[test]
fn harness_mixes_postings_and_doc_values() {
    let dir = TestDirectory::file_with_config(DirectoryConfig::new().read_mode(ReadMode::Mmap));
    let mut harness = SegmentHarness::new(dir.directory(), 4);
    let postings: Arc<dyn PostingsFormat> = Arc::new(PlainPostingsFormat::new());

    harness
        .add_postings_field(
            "body",
            IndexOptions::DocsAndFreqs,
            Arc::clone(&postings),
            simple_terms(&["w", "x", "y", "z"]),
        )
        .add_doc_values_field(
            "rank",
            plain(),
            DocValuesData::Numeric(vec![Some(1), Some(2), None, Some(4)]),
        )
        .add_doc_values_field(
            "tag",
            named("Tags"),
            DocValuesData::Sorted(vec![bytes("b"), bytes("a"), None, bytes("b")]),
        );

    let (postings_assignments, doc_values_assignments) = harness.write().unwrap();
    assert_eq!(postings_assignments.len(), 1);
    assert_eq!(
        doc_values_assignments
            .iter()
            .map(FormatAssignment::segment_suffix)
            .collect::<Vec<_>>(),
        vec!["Plain_0", "Tags_0"]
    );

    let segment = harness.open().unwrap();
    harness.verify(&segment);
    segment.close().unwrap();
}
