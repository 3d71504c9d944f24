//! Byte-level input and output traits.
//!
//! [`DataInput`] and [`DataOutput`] define the primitive encodings every file
//! in a segment is built from. [`IndexInput`] and [`IndexOutput`] add the
//! positional and lifecycle operations a [`crate::Directory`] hands out.
//!
//! ## Encodings
//!
//! ```text
//! i16/i32/i64   big-endian, fixed width
//! vint/vlong    7 bits per byte, low group first, high bit = continuation
//! string        vint byte length | UTF-8 bytes
//! string map    vint count | (key string, value string)* in key order
//! ```

use crate::error::{StoreError, StoreResult};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;

/// Maximum encoded length of a vint.
const MAX_VINT_BYTES: usize = 5;
/// Maximum encoded length of a (non-negative) vlong.
const MAX_VLONG_BYTES: usize = 9;
/// Largest block [`DataInput::read_byte_vec`] allocates ahead of the data.
const READ_CHUNK: usize = 8 * 1024;

/// Sequential reads of primitive values.
pub trait DataInput {
    /// Reads a single byte.
    fn read_byte(&mut self) -> StoreResult<u8>;

    /// Fills `buf` completely.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EndOfInput`] if fewer than `buf.len()` bytes remain.
    fn read_bytes(&mut self, buf: &mut [u8]) -> StoreResult<()>;

    /// Describes this input in error messages.
    fn resource(&self) -> &str {
        "data input"
    }

    /// Reads a big-endian `i16`.
    fn read_i16(&mut self) -> StoreResult<i16> {
        let mut b = [0u8; 2];
        self.read_bytes(&mut b)?;
        Ok(i16::from_be_bytes(b))
    }

    /// Reads a big-endian `i32`.
    fn read_i32(&mut self) -> StoreResult<i32> {
        let mut b = [0u8; 4];
        self.read_bytes(&mut b)?;
        Ok(i32::from_be_bytes(b))
    }

    /// Reads a big-endian `i64`.
    fn read_i64(&mut self) -> StoreResult<i64> {
        let mut b = [0u8; 8];
        self.read_bytes(&mut b)?;
        Ok(i64::from_be_bytes(b))
    }

    /// Reads a variable-length `i32`.
    fn read_vint(&mut self) -> StoreResult<i32> {
        let mut value: u32 = 0;
        for i in 0..MAX_VINT_BYTES {
            let b = self.read_byte()?;
            if i == MAX_VINT_BYTES - 1 && b & 0xF0 != 0 {
                return Err(StoreError::corrupted(self.resource(), "invalid vint"));
            }
            value |= u32::from(b & 0x7F) << (7 * i);
            if b & 0x80 == 0 {
                return Ok(value as i32);
            }
        }
        Err(StoreError::corrupted(self.resource(), "invalid vint"))
    }

    /// Reads a variable-length non-negative `i64`.
    fn read_vlong(&mut self) -> StoreResult<i64> {
        let mut value: u64 = 0;
        for i in 0..MAX_VLONG_BYTES {
            let b = self.read_byte()?;
            value |= u64::from(b & 0x7F) << (7 * i);
            if b & 0x80 == 0 {
                return Ok(value as i64);
            }
        }
        Err(StoreError::corrupted(self.resource(), "invalid vlong"))
    }

    /// Reads a vint length, rejecting negative values.
    fn read_len(&mut self) -> StoreResult<usize> {
        let len = self.read_vint()?;
        usize::try_from(len)
            .map_err(|_| StoreError::corrupted(self.resource(), format!("negative length {len}")))
    }

    /// Reads `len` bytes into a new vector.
    ///
    /// The buffer grows as bytes arrive, so a length decoded from a damaged
    /// file ends in an end-of-input error instead of a huge allocation.
    fn read_byte_vec(&mut self, len: usize) -> StoreResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(len.min(READ_CHUNK));
        while buf.len() < len {
            let start = buf.len();
            let step = (len - start).min(READ_CHUNK);
            buf.resize(start + step, 0);
            self.read_bytes(&mut buf[start..])?;
        }
        Ok(buf)
    }

    /// Reads a length-prefixed UTF-8 string.
    fn read_string(&mut self) -> StoreResult<String> {
        let len = self.read_len()?;
        let bytes = self.read_byte_vec(len)?;
        String::from_utf8(bytes)
            .map_err(|_| StoreError::corrupted(self.resource(), "invalid UTF-8 in string"))
    }

    /// Reads a string-to-string map.
    fn read_string_map(&mut self) -> StoreResult<BTreeMap<String, String>> {
        let count = self.read_len()?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = self.read_string()?;
            let value = self.read_string()?;
            map.insert(key, value);
        }
        Ok(map)
    }

    /// Reads a set of strings.
    fn read_string_set(&mut self) -> StoreResult<BTreeSet<String>> {
        let count = self.read_len()?;
        let mut set = BTreeSet::new();
        for _ in 0..count {
            set.insert(self.read_string()?);
        }
        Ok(set)
    }

    /// Skips over `count` bytes.
    fn skip_bytes(&mut self, count: u64) -> StoreResult<()> {
        let mut scratch = [0u8; 256];
        let mut remaining = count;
        while remaining > 0 {
            let step = remaining.min(scratch.len() as u64) as usize;
            self.read_bytes(&mut scratch[..step])?;
            remaining -= step as u64;
        }
        Ok(())
    }
}

/// Sequential writes of primitive values.
pub trait DataOutput {
    /// Writes a single byte.
    fn write_byte(&mut self, b: u8) -> StoreResult<()>;

    /// Writes all of `bytes`.
    fn write_bytes(&mut self, bytes: &[u8]) -> StoreResult<()>;

    /// Writes a big-endian `i16`.
    fn write_i16(&mut self, v: i16) -> StoreResult<()> {
        self.write_bytes(&v.to_be_bytes())
    }

    /// Writes a big-endian `i32`.
    fn write_i32(&mut self, v: i32) -> StoreResult<()> {
        self.write_bytes(&v.to_be_bytes())
    }

    /// Writes a big-endian `i64`.
    fn write_i64(&mut self, v: i64) -> StoreResult<()> {
        self.write_bytes(&v.to_be_bytes())
    }

    /// Writes a variable-length `i32`. Negative values take five bytes.
    fn write_vint(&mut self, v: i32) -> StoreResult<()> {
        let mut v = v as u32;
        while v & !0x7F != 0 {
            self.write_byte(((v & 0x7F) | 0x80) as u8)?;
            v >>= 7;
        }
        self.write_byte(v as u8)
    }

    /// Writes a variable-length non-negative `i64`.
    ///
    /// # Errors
    ///
    /// Returns an error if `v` is negative.
    fn write_vlong(&mut self, v: i64) -> StoreResult<()> {
        if v < 0 {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot write negative vlong: {v}"),
            )));
        }
        let mut v = v as u64;
        while v & !0x7F != 0 {
            self.write_byte(((v & 0x7F) | 0x80) as u8)?;
            v >>= 7;
        }
        self.write_byte(v as u8)
    }

    /// Writes a length as a vint.
    fn write_len(&mut self, len: usize) -> StoreResult<()> {
        let len = i32::try_from(len).map_err(|_| {
            StoreError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("length {len} does not fit in a vint"),
            ))
        })?;
        self.write_vint(len)
    }

    /// Writes a length-prefixed UTF-8 string.
    fn write_string(&mut self, s: &str) -> StoreResult<()> {
        self.write_len(s.len())?;
        self.write_bytes(s.as_bytes())
    }

    /// Writes a string-to-string map in key order.
    fn write_string_map(&mut self, map: &BTreeMap<String, String>) -> StoreResult<()> {
        self.write_len(map.len())?;
        for (key, value) in map {
            self.write_string(key)?;
            self.write_string(value)?;
        }
        Ok(())
    }

    /// Writes a set of strings in order.
    fn write_string_set(&mut self, set: &BTreeSet<String>) -> StoreResult<()> {
        self.write_len(set.len())?;
        for s in set {
            self.write_string(s)?;
        }
        Ok(())
    }
}

/// A random-access reader over one sealed file.
///
/// A single instance is not safe for concurrent use because it owns a
/// cursor. Threads that read the same file concurrently each take their own
/// [`IndexInput::clone_input`].
///
/// # Clones
///
/// Clones and slices share the underlying data with the instance they were
/// created from but keep their own cursor. Only the instance returned by
/// [`crate::Directory::open_input`] owns the underlying resource: closing a
/// clone is a no-op, and reading through a clone after the owner was closed is
/// a usage error reported as [`StoreError::AlreadyClosed`] where the
/// implementation can detect it.
pub trait IndexInput: DataInput + Send + fmt::Debug {
    /// Name of the file (or slice description) this input reads.
    fn name(&self) -> &str;

    /// Current cursor position, relative to the start of this input.
    fn position(&self) -> u64;

    /// Moves the cursor. Seeking past [`IndexInput::len`] is allowed; the
    /// next read then fails with [`StoreError::EndOfInput`].
    fn seek(&mut self, pos: u64) -> StoreResult<()>;

    /// Total number of readable bytes.
    fn len(&self) -> u64;

    /// Returns true if the input has no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a new reader over the same data with its cursor at 0.
    fn clone_input(&self) -> Box<dyn IndexInput>;

    /// Returns a reader over `length` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EndOfInput`] if the range is out of bounds.
    fn slice(&self, description: &str, offset: u64, length: u64)
        -> StoreResult<Box<dyn IndexInput>>;

    /// Returns true if this instance was created by cloning or slicing.
    fn is_clone(&self) -> bool;

    /// Releases the underlying resource. A no-op for clones.
    fn close(&mut self) -> StoreResult<()>;
}

/// An append-only writer creating one new file.
///
/// The file becomes visible for reading, and immutable, once the output is
/// closed.
pub trait IndexOutput: DataOutput + Send + fmt::Debug {
    /// Name of the file being written.
    fn name(&self) -> &str;

    /// Number of bytes written so far.
    fn file_pointer(&self) -> u64;

    /// CRC-32 of every byte written so far.
    fn checksum(&self) -> u32;

    /// Flushes and seals the file. Closing twice is a no-op.
    fn close(&mut self) -> StoreResult<()>;
}

/// Builds the error for a read of `requested` bytes at `position`.
pub(crate) fn end_of_input(resource: &str, position: u64, len: u64, requested: u64) -> StoreError {
    StoreError::EndOfInput {
        resource: resource.to_string(),
        position,
        len,
        requested,
    }
}

/// Checks that `[offset, offset + length)` lies within `len` bytes.
pub(crate) fn check_slice(
    resource: &str,
    offset: u64,
    length: u64,
    len: u64,
) -> StoreResult<()> {
    match offset.checked_add(length) {
        Some(end) if end <= len => Ok(()),
        _ => Err(end_of_input(resource, offset, len, length)),
    }
}

/// Formats the name of a slice of `parent`.
pub(crate) fn slice_name(parent: &str, description: &str) -> String {
    format!("{description} [slice of {parent}]")
}
