//! Per-field metadata and its attribute store.

use crate::error::{CodecError, CodecResult};
use std::collections::{BTreeMap, HashMap};

/// What a field's postings record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum IndexOptions {
    /// The field is not indexed.
    #[default]
    None,
    /// Only document ids are recorded.
    Docs,
    /// Document ids and term frequencies are recorded.
    DocsAndFreqs,
}

impl IndexOptions {
    /// Returns the on-disk byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Docs => 1,
            Self::DocsAndFreqs => 2,
        }
    }

    /// Parses the on-disk byte.
    #[must_use]
    pub const fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::None),
            1 => Some(Self::Docs),
            2 => Some(Self::DocsAndFreqs),
            _ => None,
        }
    }
}

/// The kind of per-document values a field stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DocValuesType {
    /// No doc values.
    #[default]
    None,
    /// One `i64` per document.
    Numeric,
    /// One byte string per document.
    Binary,
    /// One byte string per document, deduplicated and ordinal-addressed.
    Sorted,
}

impl DocValuesType {
    /// Returns the on-disk byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Numeric => 1,
            Self::Binary => 2,
            Self::Sorted => 3,
        }
    }

    /// Parses the on-disk byte.
    #[must_use]
    pub const fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::None),
            1 => Some(Self::Numeric),
            2 => Some(Self::Binary),
            3 => Some(Self::Sorted),
            _ => None,
        }
    }
}

/// Descriptor of one field within a segment.
///
/// Besides its schema, a field carries a string attribute map that codecs use
/// to persist per-field decisions alongside the field definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    name: String,
    number: u32,
    index_options: IndexOptions,
    doc_values_type: DocValuesType,
    attributes: BTreeMap<String, String>,
}

impl FieldInfo {
    /// Creates an unindexed field without doc values.
    pub fn new(name: impl Into<String>, number: u32) -> Self {
        Self {
            name: name.into(),
            number,
            index_options: IndexOptions::None,
            doc_values_type: DocValuesType::None,
            attributes: BTreeMap::new(),
        }
    }

    /// Sets what the field's postings record.
    #[must_use]
    pub fn with_index_options(mut self, options: IndexOptions) -> Self {
        self.index_options = options;
        self
    }

    /// Sets the field's doc values type.
    #[must_use]
    pub fn with_doc_values(mut self, doc_values_type: DocValuesType) -> Self {
        self.doc_values_type = doc_values_type;
        self
    }

    /// Returns the field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the field number.
    #[must_use]
    pub const fn number(&self) -> u32 {
        self.number
    }

    /// Returns the index options.
    #[must_use]
    pub const fn index_options(&self) -> IndexOptions {
        self.index_options
    }

    /// Returns the doc values type.
    #[must_use]
    pub const fn doc_values_type(&self) -> DocValuesType {
        self.doc_values_type
    }

    /// Returns true if the field has postings.
    #[must_use]
    pub fn is_indexed(&self) -> bool {
        self.index_options != IndexOptions::None
    }

    /// Returns true if the field has doc values.
    #[must_use]
    pub fn has_doc_values(&self) -> bool {
        self.doc_values_type != DocValuesType::None
    }

    /// Returns an attribute value.
    #[must_use]
    pub fn get_attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Sets an attribute, returning the previous value.
    pub fn put_attribute(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        self.attributes.insert(key.into(), value.into())
    }

    /// Sets an attribute that must not have been set before.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::DuplicateAttribute`] if the key was already
    /// present. The previous value is restored in that case.
    pub fn put_new_attribute(&mut self, key: &str, value: impl Into<String>) -> CodecResult<()> {
        if let Some(previous) = self.attributes.insert(key.to_string(), value.into()) {
            self.attributes.insert(key.to_string(), previous.clone());
            return Err(CodecError::DuplicateAttribute {
                field: self.name.clone(),
                key: key.to_string(),
                previous,
            });
        }
        Ok(())
    }

    /// Returns all attributes.
    #[must_use]
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub(crate) fn set_attributes(&mut self, attributes: BTreeMap<String, String>) {
        self.attributes = attributes;
    }
}

/// Which sub-format, and which instance of it, serves a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FormatAssignment {
    /// Name of the sub-format.
    pub format_name: String,
    /// Per-format-name instance counter, starting at 0.
    pub suffix: u32,
}

impl FormatAssignment {
    /// The segment suffix the sub-format's files are named with.
    #[must_use]
    pub fn segment_suffix(&self) -> String {
        crate::naming::per_field_suffix(&self.format_name, self.suffix)
    }
}

/// The pair of attribute keys one per-field multiplexer records on each field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerFieldKeys {
    /// Key of the sub-format name attribute.
    pub format: &'static str,
    /// Key of the decimal suffix attribute.
    pub suffix: &'static str,
}

impl PerFieldKeys {
    /// Keys used by the per-field postings multiplexer.
    pub const POSTINGS: Self = Self {
        format: "PerFieldPostingsFormat.format",
        suffix: "PerFieldPostingsFormat.suffix",
    };

    /// Keys used by the per-field doc values multiplexer.
    pub const DOC_VALUES: Self = Self {
        format: "PerFieldDocValuesFormat.format",
        suffix: "PerFieldDocValuesFormat.suffix",
    };

    /// Reads the assignment recorded on `field`.
    ///
    /// Returns `None` if the field carries no format attribute, meaning it has
    /// no data for this multiplexer.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Corrupted`] if the format attribute is present but
    /// the suffix attribute is missing or not a decimal number.
    pub fn assignment(&self, field: &FieldInfo) -> CodecResult<Option<FormatAssignment>> {
        let Some(format_name) = field.get_attribute(self.format) else {
            return Ok(None);
        };

        let suffix = field.get_attribute(self.suffix).ok_or_else(|| {
            CodecError::corrupted(format!(
                "missing attribute {} for field {:?}",
                self.suffix,
                field.name()
            ))
        })?;
        let suffix = suffix.parse::<u32>().map_err(|_| {
            CodecError::corrupted(format!(
                "invalid suffix {suffix:?} for field {:?}",
                field.name()
            ))
        })?;

        Ok(Some(FormatAssignment {
            format_name: format_name.to_string(),
            suffix,
        }))
    }
}

/// The fields of one segment, ordered by field number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldInfos {
    fields: Vec<FieldInfo>,
    by_name: HashMap<String, usize>,
}

impl FieldInfos {
    /// Builds the collection.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidArgument`] if two fields share a name or a number.
    pub fn new(mut fields: Vec<FieldInfo>) -> CodecResult<Self> {
        fields.sort_by_key(FieldInfo::number);

        let mut by_name = HashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            if i > 0 && fields[i - 1].number == field.number {
                return Err(CodecError::invalid_argument(format!(
                    "duplicate field number {} ({:?} and {:?})",
                    field.number,
                    fields[i - 1].name,
                    field.name
                )));
            }
            if by_name.insert(field.name.clone(), i).is_some() {
                return Err(CodecError::invalid_argument(format!(
                    "duplicate field name {:?}",
                    field.name
                )));
            }
        }

        Ok(Self { fields, by_name })
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates fields in number order.
    pub fn iter(&self) -> std::slice::Iter<'_, FieldInfo> {
        self.fields.iter()
    }

    /// Iterates fields mutably in number order.
    ///
    /// Only attributes can be changed through the returned references.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, FieldInfo> {
        self.fields.iter_mut()
    }

    /// Looks a field up by name.
    #[must_use]
    pub fn field_info(&self, name: &str) -> Option<&FieldInfo> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    /// Looks a field up by name, mutably.
    pub fn field_info_mut(&mut self, name: &str) -> Option<&mut FieldInfo> {
        let i = *self.by_name.get(name)?;
        Some(&mut self.fields[i])
    }

    /// Looks a field up by number.
    #[must_use]
    pub fn by_number(&self, number: u32) -> Option<&FieldInfo> {
        self.fields
            .binary_search_by_key(&number, FieldInfo::number)
            .ok()
            .map(|i| &self.fields[i])
    }

    /// Returns true if any field is indexed.
    #[must_use]
    pub fn has_postings(&self) -> bool {
        self.fields.iter().any(FieldInfo::is_indexed)
    }

    /// Returns true if any field has doc values.
    #[must_use]
    pub fn has_doc_values(&self) -> bool {
        self.fields.iter().any(FieldInfo::has_doc_values)
    }
}

impl<'a> IntoIterator for &'a FieldInfos {
    type Item = &'a FieldInfo;
    type IntoIter = std::slice::Iter<'a, FieldInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_new_attribute_rejects_overwrite() {
        let mut field = FieldInfo::new("title", 0);
        field.put_new_attribute("k", "v1").unwrap();

        let err = field.put_new_attribute("k", "v2").unwrap_err();
        assert!(matches!(
            err,
            CodecError::DuplicateAttribute { ref previous, .. } if previous == "v1"
        ));
        assert_eq!(field.get_attribute("k"), Some("v1"));
    }

    #[test]
    fn assignment_absent_without_format_key() {
        let field = FieldInfo::new("title", 0);
        assert_eq!(PerFieldKeys::POSTINGS.assignment(&field).unwrap(), None);
    }

    #[test]
    fn assignment_parses_suffix() {
        let mut field = FieldInfo::new("title", 0);
        field.put_attribute(PerFieldKeys::POSTINGS.format, "Plain");
        field.put_attribute(PerFieldKeys::POSTINGS.suffix, "3");

        let assignment = PerFieldKeys::POSTINGS.assignment(&field).unwrap().unwrap();
        assert_eq!(assignment.format_name, "Plain");
        assert_eq!(assignment.suffix, 3);
        assert_eq!(assignment.segment_suffix(), "Plain_3");

        // Doc values keys are a separate namespace
        assert_eq!(PerFieldKeys::DOC_VALUES.assignment(&field).unwrap(), None);
    }

    #[test]
    fn assignment_with_bad_suffix_is_corrupted() {
        let mut field = FieldInfo::new("title", 0);
        field.put_attribute(PerFieldKeys::POSTINGS.format, "Plain");
        assert!(matches!(
            PerFieldKeys::POSTINGS.assignment(&field),
            Err(CodecError::Corrupted { .. })
        ));

        field.put_attribute(PerFieldKeys::POSTINGS.suffix, "x1");
        assert!(matches!(
            PerFieldKeys::POSTINGS.assignment(&field),
            Err(CodecError::Corrupted { .. })
        ));
    }

    #[test]
    fn field_infos_sorted_by_number() {
        let infos = FieldInfos::new(vec![
            FieldInfo::new("body", 2),
            FieldInfo::new("title", 0).with_index_options(IndexOptions::Docs),
            FieldInfo::new("id", 1).with_doc_values(DocValuesType::Numeric),
        ])
        .unwrap();

        let names: Vec<_> = infos.iter().map(FieldInfo::name).collect();
        assert_eq!(names, vec!["title", "id", "body"]);
        assert_eq!(infos.by_number(1).unwrap().name(), "id");
        assert_eq!(infos.field_info("body").unwrap().number(), 2);
        assert!(infos.has_postings());
        assert!(infos.has_doc_values());
    }

    #[test]
    fn field_infos_reject_duplicates() {
        assert!(FieldInfos::new(vec![FieldInfo::new("a", 0), FieldInfo::new("a", 1)]).is_err());
        assert!(FieldInfos::new(vec![FieldInfo::new("a", 0), FieldInfo::new("b", 0)]).is_err());
    }

    #[test]
    fn option_bytes_round_trip() {
        for options in [IndexOptions::None, IndexOptions::Docs, IndexOptions::DocsAndFreqs] {
            assert_eq!(IndexOptions::from_byte(options.as_byte()), Some(options));
        }
        assert_eq!(DocValuesType::from_byte(9), None);
    }
}
