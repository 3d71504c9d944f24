//! Field-to-format policies used by the per-field multiplexers.

use crate::doc_values::DocValuesFormat;
use crate::field_info::FieldInfo;
use crate::postings::PostingsFormat;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Chooses the postings format of a field at write time.
pub trait PostingsFormatPolicy: Send + Sync {
    /// Returns the format for `field`, or `None` if no format applies.
    fn format_for_field(&self, field: &FieldInfo) -> Option<Arc<dyn PostingsFormat>>;
}

/// Chooses the doc values format of a field at write time.
pub trait DocValuesFormatPolicy: Send + Sync {
    /// Returns the format for `field`, or `None` if no format applies.
    fn format_for_field(&self, field: &FieldInfo) -> Option<Arc<dyn DocValuesFormat>>;
}

impl<F> PostingsFormatPolicy for F
where
    F: Fn(&FieldInfo) -> Option<Arc<dyn PostingsFormat>> + Send + Sync,
{
    fn format_for_field(&self, field: &FieldInfo) -> Option<Arc<dyn PostingsFormat>> {
        self(field)
    }
}

impl<F> DocValuesFormatPolicy for F
where
    F: Fn(&FieldInfo) -> Option<Arc<dyn DocValuesFormat>> + Send + Sync,
{
    fn format_for_field(&self, field: &FieldInfo) -> Option<Arc<dyn DocValuesFormat>> {
        self(field)
    }
}

/// An explicit field name to format map with an optional fallback.
///
/// ```rust
/// use segstore_codec::{FieldFormatMap, PlainPostingsFormat, PostingsFormat};
/// use std::sync::Arc;
///
/// let plain: Arc<dyn PostingsFormat> = Arc::new(PlainPostingsFormat::new());
/// let map = FieldFormatMap::new()
///     .with_field("title", Arc::clone(&plain))
///     .with_default(plain);
/// assert_eq!(map.len(), 1);
/// ```
pub struct FieldFormatMap<F: ?Sized> {
    by_field: HashMap<String, Arc<F>>,
    default: Option<Arc<F>>,
}

impl<F: ?Sized> FieldFormatMap<F> {
    /// Creates an empty map without a fallback.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_field: HashMap::new(),
            default: None,
        }
    }

    /// Assigns `format` to `field`.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, format: Arc<F>) -> Self {
        self.by_field.insert(field.into(), format);
        self
    }

    /// Sets the format used for fields without an explicit entry.
    #[must_use]
    pub fn with_default(mut self, format: Arc<F>) -> Self {
        self.default = Some(format);
        self
    }

    /// Number of explicit entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_field.len()
    }

    /// Returns true if there are no explicit entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_field.is_empty()
    }

    /// Returns the format for the field named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<F>> {
        self.by_field
            .get(name)
            .or(self.default.as_ref())
            .map(Arc::clone)
    }
}

impl<F: ?Sized> Default for FieldFormatMap<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> Clone for FieldFormatMap<F> {
    fn clone(&self) -> Self {
        Self {
            by_field: self.by_field.clone(),
            default: self.default.clone(),
        }
    }
}

impl<F: ?Sized> fmt::Debug for FieldFormatMap<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields: Vec<_> = self.by_field.keys().collect();
        fields.sort();
        f.debug_struct("FieldFormatMap")
            .field("fields", &fields)
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

impl PostingsFormatPolicy for FieldFormatMap<dyn PostingsFormat> {
    fn format_for_field(&self, field: &FieldInfo) -> Option<Arc<dyn PostingsFormat>> {
        self.get(field.name())
    }
}

impl DocValuesFormatPolicy for FieldFormatMap<dyn DocValuesFormat> {
    fn format_for_field(&self, field: &FieldInfo) -> Option<Arc<dyn DocValuesFormat>> {
        self.get(field.name())
    }
}
