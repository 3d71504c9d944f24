//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains the invariants writers require.

use crate::fixtures::FieldTerms;
use proptest::prelude::*;
use segstore_codec::Posting;

/// Strategy for generating valid field names.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for generating distinct field names.
pub fn field_names_strategy(count: std::ops::Range<usize>) -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(field_name_strategy(), count)
        .prop_map(|names| names.into_iter().collect())
}

/// Strategy for generating term bytes (never empty).
pub fn term_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..12)
}

/// Strategy for generating a postings list for a segment of `max_doc` documents.
///
/// Documents are strictly increasing and frequencies positive.
pub fn postings_strategy(max_doc: u32) -> impl Strategy<Value = Vec<Posting>> {
    prop::collection::btree_map(0..max_doc, 1u32..20, 1..8).prop_map(|docs| {
        docs.into_iter()
            .map(|(doc, freq)| Posting::new(doc, freq))
            .collect()
    })
}

/// Strategy for generating the terms of one field.
pub fn field_terms_strategy(max_doc: u32) -> impl Strategy<Value = FieldTerms> {
    prop::collection::btree_map(term_strategy(), postings_strategy(max_doc), 0..12)
}

/// Strategy for generating one numeric slot per document.
pub fn numeric_values_strategy(max_doc: u32) -> impl Strategy<Value = Vec<Option<i64>>> {
    prop::collection::vec(prop::option::of(any::<i64>()), max_doc as usize)
}

/// Strategy for generating one binary slot per document.
pub fn binary_values_strategy(max_doc: u32) -> impl Strategy<Value = Vec<Option<Vec<u8>>>> {
    prop::collection::vec(
        prop::option::of(prop::collection::vec(any::<u8>(), 0..32)),
        max_doc as usize,
    )
}

/// Strategy for generating one sorted slot per document, drawn from a few values
/// so that documents share ordinals.
pub fn sorted_values_strategy(max_doc: u32) -> impl Strategy<Value = Vec<Option<Vec<u8>>>> {
    prop::collection::vec(
        prop::option::of(prop::sample::select(vec![
            b"alpha".to_vec(),
            b"beta".to_vec(),
            b"gamma".to_vec(),
            Vec::new(),
        ])),
        max_doc as usize,
    )
}

/// Strategy for choosing one of `formats` format slots for each of `fields` fields.
pub fn format_choices_strategy(formats: usize, fields: usize) -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0..formats, fields)
}
