//! Persistence of [`FieldInfos`], including the attributes codecs record.
//!
//! ```text
//! index header | field count vint |
//! per field: name | number vint | index options u8 | doc values u8 | attributes map |
//! footer
//! ```

use crate::error::{CodecError, CodecResult};
use crate::field_info::{DocValuesType, FieldInfo, FieldInfos, IndexOptions};
use crate::naming;
use crate::segment::SegmentInfo;
use segstore_storage::codec_util::{self, FOOTER_LENGTH};
use segstore_storage::{Directory, IndexInput, StoreError};

const CODEC: &str = "SegstoreFieldInfos";
const VERSION_START: i32 = 1;
const VERSION_CURRENT: i32 = VERSION_START;

/// Reads and writes the `.fnm` file of a segment.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldInfosFormat;

impl FieldInfosFormat {
    /// Extension of field infos files.
    pub const EXTENSION: &'static str = "fnm";

    /// Writes `infos` as `<segment>[_<suffix>].fnm`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists or on I/O failure.
    pub fn write(
        &self,
        directory: &dyn Directory,
        segment_info: &SegmentInfo,
        suffix: &str,
        infos: &FieldInfos,
    ) -> CodecResult<()> {
        let numbers = infos
            .iter()
            .map(|field| {
                i32::try_from(field.number()).map_err(|_| {
                    CodecError::invalid_argument(format!(
                        "field number {} of {:?} exceeds {}",
                        field.number(),
                        field.name(),
                        i32::MAX
                    ))
                })
            })
            .collect::<CodecResult<Vec<i32>>>()?;

        let name = naming::segment_file_name(segment_info.name(), suffix, Self::EXTENSION);
        let mut out = directory.create_output(&name)?;

        codec_util::write_index_header(
            out.as_mut(),
            CODEC,
            VERSION_CURRENT,
            segment_info.id(),
            suffix,
        )?;
        out.write_len(infos.len())?;
        for (field, number) in infos.iter().zip(numbers) {
            out.write_string(field.name())?;
            out.write_vint(number)?;
            out.write_byte(field.index_options().as_byte())?;
            out.write_byte(field.doc_values_type().as_byte())?;
            out.write_string_map(field.attributes())?;
        }
        codec_util::write_footer(out.as_mut())?;
        out.close()?;

        tracing::debug!(file = %name, fields = infos.len(), "wrote field infos");
        Ok(())
    }

    /// Reads `<segment>[_<suffix>].fnm`, verifying header and checksum.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the file is missing, and a corruption
    /// error for a bad header, checksum or field record.
    pub fn read(
        &self,
        directory: &dyn Directory,
        segment_info: &SegmentInfo,
        suffix: &str,
    ) -> CodecResult<FieldInfos> {
        let name = naming::segment_file_name(segment_info.name(), suffix, Self::EXTENSION);
        let mut input = directory.open_input(&name)?;

        let result = read_fields(input.as_mut(), segment_info, suffix);
        let closed = input.close();
        let infos = result?;
        closed?;
        Ok(infos)
    }
}

fn read_fields(
    input: &mut dyn IndexInput,
    segment_info: &SegmentInfo,
    suffix: &str,
) -> CodecResult<FieldInfos> {
    codec_util::check_index_header(
        input,
        CODEC,
        VERSION_START,
        VERSION_CURRENT,
        segment_info.id(),
        suffix,
    )?;
    // Counts and lengths below are only trusted once the checksum holds
    codec_util::check_footer(input)?;

    let count = input.read_len()?;
    let mut fields = Vec::new();
    for _ in 0..count {
        let name = input.read_string()?;
        let number = input.read_vint()?;
        let number = u32::try_from(number)
            .map_err(|_| corrupted(input, format!("invalid field number {number}")))?;
        let options = input.read_byte()?;
        let index_options = IndexOptions::from_byte(options)
            .ok_or_else(|| corrupted(input, format!("invalid index options {options}")))?;
        let dv = input.read_byte()?;
        let doc_values_type = DocValuesType::from_byte(dv)
            .ok_or_else(|| corrupted(input, format!("invalid doc values type {dv}")))?;
        let attributes = input.read_string_map()?;

        let mut field = FieldInfo::new(name, number)
            .with_index_options(index_options)
            .with_doc_values(doc_values_type);
        field.set_attributes(attributes);
        fields.push(field);
    }

    if input.position() + FOOTER_LENGTH != input.len() {
        return Err(corrupted(
            input,
            format!(
                "footer expected at {} but file is {} bytes",
                input.position(),
                input.len()
            ),
        ));
    }

    FieldInfos::new(fields).map_err(|err| corrupted(input, err.to_string()))
}

fn corrupted(input: &dyn IndexInput, message: impl Into<String>) -> CodecError {
    StoreError::corrupted(input.name(), message).into()
}
