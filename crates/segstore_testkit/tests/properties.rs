//! Property-based tests over random segments and format choices.

use proptest::prelude::*;
use segstore_testkit::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

const MAX_DOC: u32 = 16;

fn postings_formats() -> Vec<Arc<dyn PostingsFormat>> {
    vec![
        Arc::new(PlainPostingsFormat::new()),
        Arc::new(PlainPostingsFormat::new()),
        Arc::new(PlainPostingsFormat::with_name("Alt").unwrap()),
    ]
}

fn doc_values_formats() -> Vec<Arc<dyn DocValuesFormat>> {
    vec![
        Arc::new(PlainDocValuesFormat::new()),
        Arc::new(PlainDocValuesFormat::with_name("Alt").unwrap()),
        Arc::new(PlainDocValuesFormat::with_name("Alt").unwrap()),
    ]
}

fn segment_strategy() -> impl Strategy<
    Value = (
        Vec<(String, FieldTerms, usize)>,
        Vec<(String, DocValuesData, usize)>,
    ),
> {
    let postings = field_names_strategy(1..5).prop_flat_map(|names| {
        let count = names.len();
        (
            Just(names),
            prop::collection::vec(field_terms_strategy(MAX_DOC), count),
            format_choices_strategy(3, count),
        )
            .prop_map(|(names, terms, formats)| {
                names
                    .into_iter()
                    .zip(terms)
                    .zip(formats)
                    .map(|((name, terms), format)| (format!("p_{name}"), terms, format))
                    .collect::<Vec<_>>()
            })
    });

    let doc_values_data = prop_oneof![
        numeric_values_strategy(MAX_DOC).prop_map(DocValuesData::Numeric),
        binary_values_strategy(MAX_DOC).prop_map(DocValuesData::Binary),
        sorted_values_strategy(MAX_DOC).prop_map(DocValuesData::Sorted),
    ]
    .boxed();
    let doc_values = field_names_strategy(0..4).prop_flat_map(move |names| {
        let count = names.len();
        (
            Just(names),
            prop::collection::vec(doc_values_data.clone(), count),
            format_choices_strategy(3, count),
        )
            .prop_map(|(names, data, formats)| {
                names
                    .into_iter()
                    .zip(data)
                    .zip(formats)
                    .map(|((name, data), format)| (format!("d_{name}"), data, format))
                    .collect::<Vec<_>>()
            })
    });

    (postings, doc_values)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn random_segments_round_trip((postings, doc_values) in segment_strategy()) {
        let postings_choices = postings_formats();
        let doc_values_choices = doc_values_formats();
        let mut harness = SegmentHarness::new(Arc::new(RamDirectory::new()), MAX_DOC);

        for (name, terms, choice) in &postings {
            harness.add_postings_field(
                name,
                IndexOptions::DocsAndFreqs,
                Arc::clone(&postings_choices[*choice]),
                terms.clone(),
            );
        }
        for (name, data, choice) in &doc_values {
            harness.add_doc_values_field(
                name,
                Arc::clone(&doc_values_choices[*choice]),
                data.clone(),
            );
        }

        let (postings_assignments, doc_values_assignments) = harness.write().unwrap();

        // One sub-writer per distinct instance used
        let mut used: Vec<usize> = postings.iter().map(|(_, _, choice)| *choice).collect();
        used.sort_unstable();
        used.dedup();
        prop_assert_eq!(postings_assignments.len(), used.len());

        let mut used: Vec<usize> = doc_values.iter().map(|(_, _, choice)| *choice).collect();
        used.sort_unstable();
        used.dedup();
        prop_assert_eq!(doc_values_assignments.len(), used.len());

        let segment = harness.open().unwrap();
        harness.verify(&segment);
        segment.close().unwrap();
    }

    #[test]
    fn suffixes_are_dense_per_format_name(choices in format_choices_strategy(3, 8)) {
        let formats = postings_formats();
        let policy = choices
            .iter()
            .enumerate()
            .fold(FieldFormatMap::new(), |map, (i, choice)| {
                map.with_field(format!("f{i}"), Arc::clone(&formats[*choice]))
            });
        let format = PerFieldPostingsFormat::new(policy);
        let dir: Arc<dyn Directory> = Arc::new(RamDirectory::new());
        let segment = Arc::new(SegmentInfo::new("_0", 1));

        let mut writer = format.writer(&write_state(&dir, &segment)).unwrap();
        let mut seen: BTreeMap<usize, String> = BTreeMap::new();
        for (i, choice) in choices.iter().enumerate() {
            let mut field = docs_field(&format!("f{i}"), i as u32);
            write_terms(&mut writer, &mut field, &simple_terms(&["t"]));

            let suffix = format!(
                "{}_{}",
                field.get_attribute(PerFieldKeys::POSTINGS.format).unwrap(),
                field.get_attribute(PerFieldKeys::POSTINGS.suffix).unwrap()
            );
            // Same instance, same suffix
            let previous = seen.entry(*choice).or_insert_with(|| suffix.clone());
            prop_assert_eq!(previous.as_str(), suffix.as_str());
        }

        let mut per_name: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        for assignment in writer.assignments() {
            per_name.entry(assignment.format_name).or_default().push(assignment.suffix);
        }
        for suffixes in per_name.values() {
            let expected: Vec<u32> = (0..suffixes.len() as u32).collect();
            prop_assert_eq!(suffixes, &expected);
        }
        writer.close().unwrap();
    }

    #[test]
    fn clone_reads_do_not_move_the_original(
        bytes in prop::collection::vec(any::<u8>(), 1..256),
        positions in prop::collection::vec(any::<prop::sample::Index>(), 1..8),
    ) {
        let dir = TestDirectory::file_with_config(DirectoryConfig::new().read_mode(ReadMode::Mmap));
        let mut out = dir.create_output("_0.bin").unwrap();
        out.write_bytes(&bytes).unwrap();
        out.close().unwrap();

        let mut input = dir.open_input("_0.bin").unwrap();
        let start = positions[0].index(bytes.len());
        input.seek(start as u64).unwrap();

        for position in &positions {
            let at = position.index(bytes.len());
            let mut clone = input.clone_input();
            clone.seek(at as u64).unwrap();
            prop_assert_eq!(clone.read_byte().unwrap(), bytes[at]);
            clone.close().unwrap();
            prop_assert_eq!(input.position(), start as u64);
        }

        prop_assert_eq!(input.read_byte().unwrap(), bytes[start]);
        input.close().unwrap();
    }
}
