//! Plain reference formats.
//!
//! Straightforward, footer-checked encodings used as the default sub-formats
//! of the per-field multiplexers. Both write a single file per segment
//! suffix with the same overall shape:
//!
//! ```text
//! index header | field data ... | directory | directory offset i64 | footer
//! ```
//!
//! The directory lists every field with the offset of its data, so readers
//! only load the directory on open and read field data lazily through
//! cloned inputs.

mod doc_values;
mod postings;

pub use doc_values::PlainDocValuesFormat;
pub use postings::PlainPostingsFormat;

use crate::error::{CodecError, CodecResult};
use segstore_storage::codec_util::{self, FOOTER_LENGTH};
use segstore_storage::{IndexInput, StoreError};

/// Default name of both plain formats.
pub const PLAIN_FORMAT_NAME: &str = "Plain";

/// Validates the footer and positions `input` at the start of the directory.
fn seek_to_directory(input: &mut dyn IndexInput, header_length: u64) -> CodecResult<()> {
    codec_util::retrieve_checksum(input)?;

    let len = input.len();
    if len < header_length + FOOTER_LENGTH + 8 {
        return Err(StoreError::corrupted(
            input.name(),
            format!("file too short ({len} bytes) for header, directory and footer"),
        )
        .into());
    }

    let pointer = len - FOOTER_LENGTH - 8;
    input.seek(pointer)?;
    let offset = input.read_i64()?;
    match u64::try_from(offset) {
        Ok(offset) if offset >= header_length && offset <= pointer => {
            input.seek(offset)?;
            Ok(())
        }
        _ => Err(StoreError::corrupted(
            input.name(),
            format!("invalid directory offset {offset}"),
        )
        .into()),
    }
}

fn corrupted(input: &dyn IndexInput, message: impl Into<String>) -> CodecError {
    StoreError::corrupted(input.name(), message).into()
}
