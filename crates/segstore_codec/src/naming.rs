//! File naming within a segment.
//!
//! A segment's files share the segment name as their stem. Codecs that need
//! several independent files of the same kind add a suffix:
//!
//! ```text
//! _0.fnm                 segment "_0", no suffix, extension "fnm"
//! _0_Plain_0.pst         segment "_0", suffix "Plain_0", extension "pst"
//! ```

use crate::error::{CodecError, CodecResult};

/// Builds `segment [ "_" suffix ] [ "." ext ]`.
#[must_use]
pub fn segment_file_name(segment: &str, suffix: &str, ext: &str) -> String {
    let mut name = String::with_capacity(segment.len() + suffix.len() + ext.len() + 2);
    name.push_str(segment);
    if !suffix.is_empty() {
        name.push('_');
        name.push_str(suffix);
    }
    if !ext.is_empty() {
        name.push('.');
        name.push_str(ext);
    }
    name
}

/// Returns the extension of `file_name`, if any.
#[must_use]
pub fn file_extension(file_name: &str) -> Option<&str> {
    file_name.rsplit_once('.').map(|(_, ext)| ext)
}

/// Strips the segment name from `file_name`, keeping suffix and extension.
///
/// `_0_Plain_0.pst` becomes `_Plain_0.pst`; `_0.fnm` becomes `.fnm`.
#[must_use]
pub fn strip_segment_name(file_name: &str) -> &str {
    // Segment names start with '_', so search from the second character.
    let start = file_name
        .char_indices()
        .skip(1)
        .find(|&(_, c)| c == '_' || c == '.')
        .map_or(file_name.len(), |(i, _)| i);
    &file_name[start..]
}

/// Returns the segment name `file_name` belongs to.
#[must_use]
pub fn parse_segment_name(file_name: &str) -> &str {
    let stripped = strip_segment_name(file_name);
    &file_name[..file_name.len() - stripped.len()]
}

/// The suffix a per-field multiplexer gives one sub-format instance.
#[must_use]
pub fn per_field_suffix(format_name: &str, suffix: u32) -> String {
    format!("{format_name}_{suffix}")
}

/// Composes a per-field suffix with the suffix of the enclosing state.
///
/// # Errors
///
/// Returns [`CodecError::Configuration`] if `outer` is non-empty: a per-field
/// format cannot be embedded inside itself.
pub fn full_segment_suffix(field: &str, outer: &str, inner: &str) -> CodecResult<String> {
    if outer.is_empty() {
        Ok(inner.to_string())
    } else {
        Err(CodecError::configuration(format!(
            "cannot embed per-field format inside itself (field {field:?} returned a per-field format, outer suffix {outer:?})"
        )))
    }
}

/// Checks that a format name can be used inside a file name.
///
/// # Errors
///
/// Returns [`CodecError::InvalidArgument`] unless the name is non-empty,
/// ASCII alphanumeric and shorter than 128 bytes.
pub fn check_format_name(name: &str) -> CodecResult<()> {
    if name.is_empty() || name.len() >= 128 || !name.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(CodecError::invalid_argument(format!(
            "invalid format name {name:?}: must be 1..128 ASCII letters or digits"
        )));
    }
    Ok(())
}
