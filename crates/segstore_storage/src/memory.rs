//! In-memory directory for testing.

use crate::directory::Directory;
use crate::error::{validate_name, StoreError, StoreResult};
use crate::handle::SharedHandle;
use crate::io::{check_slice, end_of_input, slice_name, DataInput, DataOutput, IndexInput, IndexOutput};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum RamEntry {
    /// Reserved by an output that has not been closed yet.
    Pending,
    /// Sealed contents.
    Sealed(Arc<[u8]>),
}

type FileMap = Arc<RwLock<BTreeMap<String, RamEntry>>>;

/// An in-memory directory.
///
/// This directory keeps every file in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral segments that don't need persistence
///
/// Files become readable when their output is closed.
///
/// # Thread Safety
///
/// This directory is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use segstore_storage::{DataInput, DataOutput, Directory, RamDirectory};
///
/// let dir = RamDirectory::new();
/// let mut out = dir.create_output("_0.dat").unwrap();
/// out.write_bytes(b"hello").unwrap();
/// out.close().unwrap();
///
/// let mut input = dir.open_input("_0.dat").unwrap();
/// let mut buf = [0u8; 5];
/// input.read_bytes(&mut buf).unwrap();
/// assert_eq!(&buf, b"hello");
/// ```
#[derive(Debug, Default)]
pub struct RamDirectory {
    files: FileMap,
}

impl RamDirectory {
    /// Creates a new empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a sealed file directly, replacing any existing one.
    ///
    /// Useful for testing corruption and recovery scenarios.
    pub fn insert_file(&self, name: impl Into<String>, bytes: Vec<u8>) {
        self.files
            .write()
            .insert(name.into(), RamEntry::Sealed(Arc::from(bytes)));
    }

    /// Returns a copy of a sealed file's bytes.
    #[must_use]
    pub fn file_bytes(&self, name: &str) -> Option<Vec<u8>> {
        match self.files.read().get(name) {
            Some(RamEntry::Sealed(bytes)) => Some(bytes.to_vec()),
            _ => None,
        }
    }

    /// Total size of all sealed files.
    #[must_use]
    pub fn size_in_bytes(&self) -> u64 {
        self.files
            .read()
            .values()
            .map(|entry| match entry {
                RamEntry::Sealed(bytes) => bytes.len() as u64,
                RamEntry::Pending => 0,
            })
            .sum()
    }

    /// Removes all files.
    pub fn clear(&self) {
        self.files.write().clear();
    }
}

impl Directory for RamDirectory {
    fn list_all(&self) -> StoreResult<Vec<String>> {
        Ok(self.files.read().keys().cloned().collect())
    }

    fn file_exists(&self, name: &str) -> StoreResult<bool> {
        Ok(self.files.read().contains_key(name))
    }

    fn file_length(&self, name: &str) -> StoreResult<u64> {
        match self.files.read().get(name) {
            Some(RamEntry::Sealed(bytes)) => Ok(bytes.len() as u64),
            Some(RamEntry::Pending) => Ok(0),
            None => Err(StoreError::not_found(name)),
        }
    }

    fn delete_file(&self, name: &str) -> StoreResult<()> {
        match self.files.write().remove(name) {
            Some(_) => Ok(()),
            None => Err(StoreError::not_found(name)),
        }
    }

    fn create_output(&self, name: &str) -> StoreResult<Box<dyn IndexOutput>> {
        validate_name(name)?;
        let mut files = self.files.write();
        if files.contains_key(name) {
            return Err(StoreError::AlreadyExists {
                name: name.to_string(),
            });
        }
        files.insert(name.to_string(), RamEntry::Pending);
        Ok(Box::new(RamOutput {
            name: name.to_string(),
            buffer: Vec::new(),
            hasher: crc32fast::Hasher::new(),
            files: Arc::clone(&self.files),
            closed: false,
        }))
    }

    fn open_input(&self, name: &str) -> StoreResult<Box<dyn IndexInput>> {
        match self.files.read().get(name) {
            Some(RamEntry::Sealed(bytes)) => Ok(Box::new(BytesInput::new(name, Arc::clone(bytes)))),
            Some(RamEntry::Pending) => Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                format!("file {name} is still being written"),
            ))),
            None => Err(StoreError::not_found(name)),
        }
    }

    fn sync(&self, _names: &[String]) -> StoreResult<()> {
        // Nothing to make durable
        Ok(())
    }
}

/// Output that publishes its buffer into a [`RamDirectory`] on close.
#[derive(Debug)]
struct RamOutput {
    name: String,
    buffer: Vec<u8>,
    hasher: crc32fast::Hasher,
    files: FileMap,
    closed: bool,
}

impl RamOutput {
    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed {
            return Err(StoreError::already_closed(&self.name));
        }
        Ok(())
    }

    fn seal(&mut self) {
        self.closed = true;
        let bytes: Arc<[u8]> = Arc::from(std::mem::take(&mut self.buffer));
        let mut files = self.files.write();
        // A file deleted while still open stays deleted
        if let Some(entry) = files.get_mut(&self.name) {
            if matches!(entry, RamEntry::Pending) {
                *entry = RamEntry::Sealed(bytes);
            }
        }
    }
}

impl DataOutput for RamOutput {
    fn write_byte(&mut self, b: u8) -> StoreResult<()> {
        self.ensure_open()?;
        self.buffer.push(b);
        self.hasher.update(&[b]);
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> StoreResult<()> {
        self.ensure_open()?;
        self.buffer.extend_from_slice(bytes);
        self.hasher.update(bytes);
        Ok(())
    }
}

impl IndexOutput for RamOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn file_pointer(&self) -> u64 {
        self.buffer.len() as u64
    }

    fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    fn close(&mut self) -> StoreResult<()> {
        if !self.closed {
            self.seal();
        }
        Ok(())
    }
}

impl Drop for RamOutput {
    fn drop(&mut self) {
        if !self.closed {
            self.seal();
        }
    }
}

/// Random-access reader over an immutable shared byte buffer.
///
/// Each reader created with [`BytesInput::new`] owns its own handle to the
/// buffer, so closing it cuts off its clones even while others still hold
/// the bytes.
#[derive(Debug)]
pub struct BytesInput {
    name: String,
    data: SharedHandle<Arc<[u8]>>,
    offset: usize,
    length: usize,
    pos: u64,
}

impl BytesInput {
    /// Creates an owning reader over `data`.
    #[must_use]
    pub fn new(name: impl Into<String>, data: Arc<[u8]>) -> Self {
        let length = data.len();
        Self {
            name: name.into(),
            data: SharedHandle::owner(Arc::new(data)),
            offset: 0,
            length,
            pos: 0,
        }
    }

    fn read_range(&self, pos: u64, buf: &mut [u8]) -> StoreResult<()> {
        let end = pos.checked_add(buf.len() as u64);
        match end {
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
        self.data
            .with(|bytes| buf.copy_from_slice(&bytes[start..start + buf.len()]))
            .ok_or_else(|| StoreError::already_closed(&self.name))
    }
}

impl DataInput for BytesInput {
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

impl IndexInput for BytesInput {
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
            data: self.data.share(),
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
            data: self.data.share(),
            offset: self.offset + offset as usize,
            length: length as usize,
            pos: 0,
        }))
    }

    fn is_clone(&self) -> bool {
        self.data.is_clone()
    }

    fn close(&mut self) -> StoreResult<()> {
        self.data.release();
        Ok(())
    }
}
