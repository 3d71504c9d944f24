//! Memory-mapped file input.

use crate::error::{StoreError, StoreResult};
use crate::handle::SharedHandle;
use crate::io::{check_slice, end_of_input, slice_name, DataInput, IndexInput};
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;

/// The mapped bytes of one file.
#[derive(Debug)]
enum MappedRegion {
    Map(Mmap),
    /// Zero-length files are never mapped.
    Empty,
}

impl MappedRegion {
    fn as_slice(&self) -> &[u8] {
        match self {
            Self::Map(map) => &map[..],
            Self::Empty => &[],
        }
    }
}

/// Zero-copy random-access reader over a memory-mapped file.
///
/// The whole file is mapped eagerly on [`MmapInput::open`]. Clones and slices
/// share the mapping through a weak reference and keep their own cursor.
///
/// # Lifecycle
///
/// Only the instance returned by `open` owns the mapping. Closing a clone is a
/// no-op. Closing the owner unmaps the file; reads through any clone after that
/// point are a usage error and fail with [`StoreError::AlreadyClosed`].
#[derive(Debug)]
pub struct MmapInput {
    name: String,
    region: SharedHandle<MappedRegion>,
    offset: usize,
    length: usize,
    pos: u64,
}

impl MmapInput {
    /// Maps the file at `path` read-only.
    ///
    /// The file handle is only needed while the mapping is created and is
    /// closed before this returns, on success and on failure alike.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or mapped.
    pub fn open(path: &Path, name: &str, preload: bool) -> StoreResult<Self> {
        let region = {
            let file = File::open(path)?;
            let len = file.metadata()?.len();
            if usize::try_from(len).is_err() {
                return Err(StoreError::Io(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("file {name} is too large to map ({len} bytes)"),
                )));
            }
            if len == 0 {
                MappedRegion::Empty
            } else {
                MappedRegion::Map(map_file(&file, preload)?)
            }
        };

        let length = region.as_slice().len();
        tracing::trace!(file = name, length, "mapped file");
        Ok(Self {
            name: name.to_string(),
            region: SharedHandle::owner(Arc::new(region)),
            offset: 0,
            length,
            pos: 0,
        })
    }

    /// Returns true while the mapping is reachable from this instance.
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        self.region.with(|_| ()).is_some()
    }

    fn read_range(&self, pos: u64, buf: &mut [u8]) -> StoreResult<()> {
        match pos.checked_add(buf.len() as u64) {
            Some(end) if end <= self.length as u64 => {}
            _ => {
                return Err(end_of_input(
                    &self.name,
                    pos,
                    self.length as u64,
                    buf.len() as u64,
                ))
            }
        }
        let start = self.offset + pos as usize;
        self.region
            .with(|region| buf.copy_from_slice(&region.as_slice()[start..start + buf.len()]))
            .ok_or_else(|| StoreError::already_closed(&self.name))
    }
}

#[allow(unsafe_code)]
fn map_file(file: &File, preload: bool) -> io::Result<Mmap> {
    let mut options = MmapOptions::new();
    if preload {
        options.populate();
    }
    // SAFETY: files are only opened for reading once their writer has sealed
    // them, and sealed files are never modified in place. The mapping is
    // read-only.
    unsafe { options.map(file) }
}

impl DataInput for MmapInput {
    fn read_byte(&mut self) -> StoreResult<u8> {
        let mut b = [0u8; 1];
        self.read_range(self.pos, &mut b)?;
        self.pos += 1;
        Ok(b[0])
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> StoreResult<()> {
        self.read_range(self.pos, buf)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn resource(&self) -> &str {
        &self.name
    }
}

impl IndexInput for MmapInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn seek(&mut self, pos: u64) -> StoreResult<()> {
        self.pos = pos;
        Ok(())
    }

    fn len(&self) -> u64 {
        self.length as u64
    }

    fn clone_input(&self) -> Box<dyn IndexInput> {
        Box::new(Self {
            name: self.name.clone(),
            region: self.region.share(),
            offset: self.offset,
            length: self.length,
            pos: 0,
        })
    }

    fn slice(
        &self,
        description: &str,
        offset: u64,
        length: u64,
    ) -> StoreResult<Box<dyn IndexInput>> {
        check_slice(&self.name, offset, length, self.length as u64)?;
        Ok(Box::new(Self {
            name: slice_name(&self.name, description),
            region: self.region.share(),
            offset: self.offset + offset as usize,
            length: length as usize,
            pos: 0,
        }))
    }

    fn is_clone(&self) -> bool {
        self.region.is_clone()
    }

    fn close(&mut self) -> StoreResult<()> {
        if self.region.release() {
            tracing::trace!(file = %self.name, "unmapped file");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn mapped(bytes: &[u8]) -> (tempfile::TempDir, MmapInput) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");
        File::create(&path).unwrap().write_all(bytes).unwrap();
        let input = MmapInput::open(&path, "test.bin", false).unwrap();
        (dir, input)
    }

    #[test]
    fn mmap_reads_and_seeks() {
        let (_dir, mut input) = mapped(b"hello world");
        assert_eq!(input.len(), 11);
        input.seek(6).unwrap();
        assert_eq!(input.read_byte_vec(5).unwrap(), b"world");
        assert_eq!(input.position(), 11);
    }

    #[test]
    fn mmap_read_past_end_is_end_of_input() {
        let (_dir, mut input) = mapped(b"abc");
        input.seek(2).unwrap();
        let mut buf = [0u8; 2];
        let err = input.read_bytes(&mut buf).unwrap_err();
        assert!(err.is_end_of_input());
        // A failed read does not move the cursor
        assert_eq!(input.position(), 2);
    }

    #[test]
    fn mmap_clone_cursor_is_independent() {
        let (_dir, mut input) = mapped(b"0123456789");
        input.seek(4).unwrap();

        let mut clone = input.clone_input();
        assert!(clone.is_clone());
        assert_eq!(clone.position(), 0);
        clone.seek(8).unwrap();
        assert_eq!(clone.read_byte().unwrap(), b'8');

        assert_eq!(input.position(), 4);
        assert_eq!(input.read_byte().unwrap(), b'4');
    }

    #[test]
    fn mmap_closing_clones_keeps_mapping() {
        let (_dir, mut input) = mapped(b"shared");
        for _ in 0..5 {
            let mut clone = input.clone_input();
            clone.read_byte().unwrap();
            clone.close().unwrap();
        }
        assert!(input.is_mapped());
        assert_eq!(input.read_byte_vec(6).unwrap(), b"shared");
    }

    #[test]
    fn mmap_clone_after_owner_close_is_usage_error() {
        let (_dir, mut input) = mapped(b"shared");
        let mut clone = input.clone_input();
        input.close().unwrap();

        assert!(!input.is_mapped());
        assert!(matches!(
            clone.read_byte(),
            Err(StoreError::AlreadyClosed { .. })
        ));
        assert!(matches!(
            input.read_byte(),
            Err(StoreError::AlreadyClosed { .. })
        ));
    }

    #[test]
    fn mmap_slice_reads_window() {
        let (_dir, input) = mapped(b"0123456789");
        let slice = input.slice("tail", 6, 4).unwrap();
        let mut nested = slice.slice("inner", 1, 2).unwrap();
        assert_eq!(nested.read_byte_vec(2).unwrap(), b"78");
        assert!(nested.read_byte().unwrap_err().is_end_of_input());
    }

    #[test]
    fn mmap_empty_file() {
        let (_dir, mut input) = mapped(b"");
        assert!(input.is_empty());
        assert!(input.read_byte().unwrap_err().is_end_of_input());
        input.close().unwrap();
    }

    #[test]
    fn mmap_missing_file_fails() {
        let dir = tempdir().unwrap();
        let err = MmapInput::open(&dir.path().join("nope"), "nope", false).unwrap_err();
        assert!(err.is_not_found());
    }
}
