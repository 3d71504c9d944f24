//! Versioned file headers and checksummed footers.
//!
//! Every file written through this workspace starts with a header naming
//! the codec that wrote it and ends with a footer carrying a CRC-32 of all
//! preceding bytes.
//!
//! ## Layout
//!
//! ```text
//! header        | magic i32 (0x3fd76c17) | codec string | version i32 |
//! index header  | header | segment id (16) | suffix len u8 | suffix bytes |
//! footer        | !magic i32 | algorithm i32 (0) | checksum i64 |
//! ```
//!
//! All integers are big-endian. The checksum covers every byte of the file
//! up to and including the footer's algorithm id.

use crate::error::{StoreError, StoreResult};
use crate::io::{DataOutput, IndexInput, IndexOutput};
use std::io;

/// Magic number at the start of every header.
pub const CODEC_MAGIC: i32 = 0x3fd7_6c17;

/// Magic number at the start of every footer.
pub const FOOTER_MAGIC: i32 = !CODEC_MAGIC;

/// Length of the footer in bytes.
pub const FOOTER_LENGTH: u64 = 16;

/// Length of a segment id in bytes.
pub const ID_LENGTH: usize = 16;

/// Checksum algorithm id for CRC-32.
const ALGORITHM_CRC32: i32 = 0;

fn invalid_argument(message: String) -> StoreError {
    StoreError::Io(io::Error::new(io::ErrorKind::InvalidInput, message))
}

fn check_ascii(what: &str, value: &str, max_len: usize) -> StoreResult<()> {
    if !value.is_ascii() || value.len() >= max_len {
        return Err(invalid_argument(format!(
            "{what} must be simple ASCII, less than {max_len} characters in length: {value:?}"
        )));
    }
    Ok(())
}

/// Writes a codec header.
///
/// # Errors
///
/// Returns an error if `codec` is not ASCII shorter than 128 bytes, or on I/O failure.
pub fn write_header<O: DataOutput + ?Sized>(
    out: &mut O,
    codec: &str,
    version: i32,
) -> StoreResult<()> {
    check_ascii("codec", codec, 128)?;
    out.write_i32(CODEC_MAGIC)?;
    out.write_string(codec)?;
    out.write_i32(version)
}

/// Writes a codec header followed by the segment id and suffix.
///
/// # Errors
///
/// Returns an error if `codec` or `suffix` are not short ASCII strings, or on I/O failure.
pub fn write_index_header<O: DataOutput + ?Sized>(
    out: &mut O,
    codec: &str,
    version: i32,
    id: &[u8; ID_LENGTH],
    suffix: &str,
) -> StoreResult<()> {
    check_ascii("suffix", suffix, 256)?;
    write_header(out, codec, version)?;
    out.write_bytes(id)?;
    out.write_byte(suffix.len() as u8)?;
    out.write_bytes(suffix.as_bytes())
}

/// Length of a header written by [`write_header`].
#[must_use]
pub fn header_length(codec: &str) -> u64 {
    9 + codec.len() as u64
}

/// Length of a header written by [`write_index_header`].
#[must_use]
pub fn index_header_length(codec: &str, suffix: &str) -> u64 {
    header_length(codec) + ID_LENGTH as u64 + 1 + suffix.len() as u64
}

/// Reads and validates a codec header, returning the file's version.
///
/// # Errors
///
/// Returns [`StoreError::Corrupted`] on a magic or codec mismatch and
/// [`StoreError::IndexFormatTooOld`] / [`StoreError::IndexFormatTooNew`]
/// if the version is outside `min..=max`.
pub fn check_header(
    input: &mut dyn IndexInput,
    codec: &str,
    min_version: i32,
    max_version: i32,
) -> StoreResult<i32> {
    let magic = input.read_i32()?;
    if magic != CODEC_MAGIC {
        return Err(StoreError::corrupted(
            input.name(),
            format!("codec header mismatch: actual header={magic:#x} vs expected header={CODEC_MAGIC:#x}"),
        ));
    }

    let actual_codec = input.read_string()?;
    if actual_codec != codec {
        return Err(StoreError::corrupted(
            input.name(),
            format!("codec mismatch: actual codec={actual_codec} vs expected codec={codec}"),
        ));
    }

    let version = input.read_i32()?;
    if version < min_version {
        return Err(StoreError::IndexFormatTooOld {
            resource: input.name().to_string(),
            version,
            min: min_version,
            max: max_version,
        });
    }
    if version > max_version {
        return Err(StoreError::IndexFormatTooNew {
            resource: input.name().to_string(),
            version,
            min: min_version,
            max: max_version,
        });
    }
    Ok(version)
}

/// Reads and validates an index header, returning the file's version.
///
/// # Errors
///
/// Everything [`check_header`] reports, plus [`StoreError::Corrupted`] if the
/// segment id or suffix differ from the expected ones.
pub fn check_index_header(
    input: &mut dyn IndexInput,
    codec: &str,
    min_version: i32,
    max_version: i32,
    expected_id: &[u8; ID_LENGTH],
    expected_suffix: &str,
) -> StoreResult<i32> {
    let version = check_header(input, codec, min_version, max_version)?;

    let mut id = [0u8; ID_LENGTH];
    input.read_bytes(&mut id)?;
    if &id != expected_id {
        return Err(StoreError::corrupted(
            input.name(),
            format!(
                "file mismatch, expected id={}, got={}",
                hex(expected_id),
                hex(&id)
            ),
        ));
    }

    let suffix_len = usize::from(input.read_byte()?);
    let suffix = input.read_byte_vec(suffix_len)?;
    if suffix != expected_suffix.as_bytes() {
        return Err(StoreError::corrupted(
            input.name(),
            format!(
                "file mismatch, expected suffix={expected_suffix:?}, got={:?}",
                String::from_utf8_lossy(&suffix)
            ),
        ));
    }
    Ok(version)
}

/// Writes the footer, including the checksum of everything written so far.
///
/// # Errors
///
/// Returns an error on I/O failure.
pub fn write_footer<O: IndexOutput + ?Sized>(out: &mut O) -> StoreResult<()> {
    out.write_i32(FOOTER_MAGIC)?;
    out.write_i32(ALGORITHM_CRC32)?;
    let checksum = out.checksum();
    out.write_i64(i64::from(checksum))
}

/// Reads the checksum stored in the footer, validating the footer's shape.
///
/// Leaves the cursor at the end of the input.
///
/// # Errors
///
/// Returns [`StoreError::Corrupted`] if the input is too short or the footer is malformed.
pub fn retrieve_checksum(input: &mut dyn IndexInput) -> StoreResult<u32> {
    if input.len() < FOOTER_LENGTH {
        return Err(StoreError::corrupted(
            input.name(),
            format!(
                "misplaced codec footer (file truncated?): length={} but footer length={FOOTER_LENGTH}",
                input.len()
            ),
        ));
    }
    input.seek(input.len() - FOOTER_LENGTH)?;
    read_footer(input)
}

fn read_footer(input: &mut dyn IndexInput) -> StoreResult<u32> {
    let magic = input.read_i32()?;
    if magic != FOOTER_MAGIC {
        return Err(StoreError::corrupted(
            input.name(),
            format!("codec footer mismatch: actual footer={magic:#x} vs expected footer={FOOTER_MAGIC:#x}"),
        ));
    }

    let algorithm = input.read_i32()?;
    if algorithm != ALGORITHM_CRC32 {
        return Err(StoreError::corrupted(
            input.name(),
            format!("unknown checksum algorithm={algorithm}"),
        ));
    }

    let value = input.read_i64()?;
    u32::try_from(value).map_err(|_| {
        StoreError::corrupted(
            input.name(),
            format!("illegal checksum: {value:#x}"),
        )
    })
}

/// Computes the CRC-32 of everything before the stored checksum.
///
/// Reads through a clone; the cursor of `input` is not moved.
///
/// # Errors
///
/// Returns [`StoreError::Corrupted`] if the input is too short to hold a footer.
pub fn checksum_entire_file(input: &dyn IndexInput) -> StoreResult<u32> {
    let len = input.len();
    if len < FOOTER_LENGTH {
        return Err(StoreError::corrupted(
            input.name(),
            format!("file too short ({len} bytes) to contain a footer"),
        ));
    }

    let mut clone = input.clone_input();
    clone.seek(0)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut remaining = len - 8;
    let mut buf = [0u8; 4096];
    while remaining > 0 {
        let step = remaining.min(buf.len() as u64) as usize;
        clone.read_bytes(&mut buf[..step])?;
        hasher.update(&buf[..step]);
        remaining -= step as u64;
    }
    Ok(hasher.finalize())
}

/// Verifies the footer's checksum against the file contents.
///
/// Returns the checksum. The cursor of `input` is not moved.
///
/// # Errors
///
/// Returns [`StoreError::Corrupted`] on a malformed footer or checksum mismatch.
pub fn check_footer(input: &dyn IndexInput) -> StoreResult<u32> {
    let actual = checksum_entire_file(input)?;
    let mut clone = input.clone_input();
    let expected = retrieve_checksum(clone.as_mut())?;
    if actual != expected {
        return Err(StoreError::corrupted(
            input.name(),
            format!("checksum failed (hardware problem?): expected={expected:#x} actual={actual:#x}"),
        ));
    }
    Ok(actual)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
