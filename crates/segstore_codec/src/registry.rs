//! Name-based lookup of formats.
//!
//! The read path only knows the format names recorded in field attributes;
//! the registry maps them back to implementations.

use crate::doc_values::DocValuesFormat;
use crate::error::{CodecError, CodecResult};
use crate::plain::{PlainDocValuesFormat, PlainPostingsFormat};
use crate::postings::PostingsFormat;
use std::collections::HashMap;
use std::sync::Arc;

/// Postings and doc values formats by name.
#[derive(Debug, Clone, Default)]
pub struct FormatRegistry {
    postings: HashMap<String, Arc<dyn PostingsFormat>>,
    doc_values: HashMap<String, Arc<dyn DocValuesFormat>>,
}

impl FormatRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the plain formats.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_postings(Arc::new(PlainPostingsFormat::new()));
        registry.register_doc_values(Arc::new(PlainDocValuesFormat::new()));
        registry
    }

    /// Registers a postings format under its name, replacing any previous one.
    pub fn register_postings(&mut self, format: Arc<dyn PostingsFormat>) {
        let name = format.name().to_string();
        if self.postings.insert(name.clone(), format).is_some() {
            tracing::warn!(format = %name, "replaced registered postings format");
        }
    }

    /// Registers a doc values format under its name, replacing any previous one.
    pub fn register_doc_values(&mut self, format: Arc<dyn DocValuesFormat>) {
        let name = format.name().to_string();
        if self.doc_values.insert(name.clone(), format).is_some() {
            tracing::warn!(format = %name, "replaced registered doc values format");
        }
    }

    /// Looks up a postings format.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Configuration`] if no format has that name.
    pub fn postings_format(&self, name: &str) -> CodecResult<Arc<dyn PostingsFormat>> {
        self.postings.get(name).map(Arc::clone).ok_or_else(|| {
            CodecError::configuration(format!(
                "postings format {name:?} does not exist; registered: {:?}",
                sorted_keys(&self.postings)
            ))
        })
    }

    /// Looks up a doc values format.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Configuration`] if no format has that name.
    pub fn doc_values_format(&self, name: &str) -> CodecResult<Arc<dyn DocValuesFormat>> {
        self.doc_values.get(name).map(Arc::clone).ok_or_else(|| {
            CodecError::configuration(format!(
                "doc values format {name:?} does not exist; registered: {:?}",
                sorted_keys(&self.doc_values)
            ))
        })
    }
}

fn sorted_keys<V>(map: &HashMap<String, V>) -> Vec<&str> {
    let mut keys: Vec<_> = map.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys
}
