//! Filesystem directory.

use crate::config::{DirectoryConfig, ReadMode};
use crate::directory::Directory;
use crate::error::{validate_name, StoreError, StoreResult};
use crate::handle::SharedHandle;
use crate::io::{check_slice, end_of_input, slice_name, DataInput, DataOutput, IndexInput, IndexOutput};
use crate::mmap::MmapInput;
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A directory of files on the local filesystem.
///
/// Files are written through buffered outputs and read through
/// [`MmapInput`] by default. When a file cannot be mapped (the platform
/// refuses the mapping, or address space is exhausted) a
/// [`BufferedFileInput`] is substituted transparently, see [`ReadMode`].
///
/// # Durability
///
/// - `IndexOutput::close()` flushes data to the OS
/// - [`Directory::sync`] calls `File::sync_all()` on the named files
/// - [`FsDirectory::sync_meta_data`] makes creations and deletions durable
///
/// # Example
///
/// ```no_run
/// use segstore_storage::{DataOutput, Directory, FsDirectory};
/// use std::path::Path;
///
/// let dir = FsDirectory::open(Path::new("index")).unwrap();
/// let mut out = dir.create_output("_0.dat").unwrap();
/// out.write_bytes(b"persistent data").unwrap();
/// out.close().unwrap();
/// dir.sync(&["_0.dat".to_string()]).unwrap();
/// ```
#[derive(Debug)]
pub struct FsDirectory {
    path: PathBuf,
    config: DirectoryConfig,
}

impl FsDirectory {
    /// Opens a directory with the default configuration, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or is not a directory.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::open_with_config(path, DirectoryConfig::default())
    }

    /// Opens a directory with the given configuration, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or is not a directory.
    pub fn open_with_config(path: &Path, config: DirectoryConfig) -> StoreResult<Self> {
        fs::create_dir_all(path)?;
        if !path.is_dir() {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path is not a directory: {}", path.display()),
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
            config,
        })
    }

    /// Returns the path of the directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Takes an exclusive advisory lock on `name` within this directory.
    ///
    /// The lock is released when the returned guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockObtainFailed`] if another holder has the lock.
    pub fn obtain_lock(&self, name: &str) -> StoreResult<DirectoryLock> {
        let path = self.resolve(name)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(StoreError::LockObtainFailed {
                name: name.to_string(),
            });
        }

        Ok(DirectoryLock {
            name: name.to_string(),
            file,
        })
    }

    /// Syncs the directory itself so file creations and deletions are durable.
    ///
    /// On Windows, NTFS journaling already covers metadata durability and
    /// directories cannot be opened for syncing, so this does nothing.
    #[cfg(unix)]
    pub fn sync_meta_data(&self) -> StoreResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    /// Syncs the directory itself so file creations and deletions are durable.
    #[cfg(not(unix))]
    pub fn sync_meta_data(&self) -> StoreResult<()> {
        Ok(())
    }

    fn resolve(&self, name: &str) -> StoreResult<PathBuf> {
        validate_name(name)?;
        Ok(self.path.join(name))
    }

    fn open_buffered(&self, path: &Path, name: &str) -> StoreResult<Box<dyn IndexInput>> {
        Ok(Box::new(BufferedFileInput::open(
            path,
            name,
            self.config.read_buffer_size,
        )?))
    }
}

fn not_found_or_io(err: io::Error, name: &str) -> StoreError {
    if err.kind() == io::ErrorKind::NotFound {
        StoreError::not_found(name)
    } else {
        StoreError::Io(err)
    }
}

impl Directory for FsDirectory {
    fn list_all(&self) -> StoreResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn file_exists(&self, name: &str) -> StoreResult<bool> {
        Ok(self.resolve(name)?.is_file())
    }

    fn file_length(&self, name: &str) -> StoreResult<u64> {
        let path = self.resolve(name)?;
        let metadata = fs::metadata(&path).map_err(|e| not_found_or_io(e, name))?;
        Ok(metadata.len())
    }

    fn delete_file(&self, name: &str) -> StoreResult<()> {
        let path = self.resolve(name)?;
        fs::remove_file(&path).map_err(|e| not_found_or_io(e, name))
    }

    fn create_output(&self, name: &str) -> StoreResult<Box<dyn IndexOutput>> {
        let path = self.resolve(name)?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    StoreError::AlreadyExists {
                        name: name.to_string(),
                    }
                } else {
                    StoreError::Io(e)
                }
            })?;

        Ok(Box::new(FsOutput {
            name: name.to_string(),
            writer: Some(BufWriter::with_capacity(
                self.config.output_buffer_size,
                file,
            )),
            hasher: crc32fast::Hasher::new(),
            written: 0,
        }))
    }

    fn open_input(&self, name: &str) -> StoreResult<Box<dyn IndexInput>> {
        let path = self.resolve(name)?;
        if !path.is_file() {
            return Err(StoreError::not_found(name));
        }

        match self.config.read_mode {
            ReadMode::Buffered => self.open_buffered(&path, name),
            ReadMode::Mmap => Ok(Box::new(
                MmapInput::open(&path, name, self.config.preload)
                    .map_err(|e| if e.is_not_found() { StoreError::not_found(name) } else { e })?,
            )),
            ReadMode::Auto => match MmapInput::open(&path, name, self.config.preload) {
                Ok(input) => Ok(Box::new(input)),
                Err(e) if e.is_not_found() => Err(StoreError::not_found(name)),
                Err(e) => {
                    tracing::warn!(
                        file = name,
                        error = %e,
                        "memory mapping failed, falling back to buffered reads"
                    );
                    self.open_buffered(&path, name)
                }
            },
        }
    }

    fn sync(&self, names: &[String]) -> StoreResult<()> {
        for name in names {
            let path = self.resolve(name)?;
            let file = File::open(&path).map_err(|e| not_found_or_io(e, name))?;
            file.sync_all()?;
        }
        Ok(())
    }
}

/// Guard for a lock taken with [`FsDirectory::obtain_lock`].
#[derive(Debug)]
pub struct DirectoryLock {
    name: String,
    file: File,
}

impl DirectoryLock {
    /// Name of the lock file.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for DirectoryLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Buffered writer creating one new file.
#[derive(Debug)]
struct FsOutput {
    name: String,
    writer: Option<BufWriter<File>>,
    hasher: crc32fast::Hasher,
    written: u64,
}

impl DataOutput for FsOutput {
    fn write_byte(&mut self, b: u8) -> StoreResult<()> {
        self.write_bytes(&[b])
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> StoreResult<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| StoreError::already_closed(&self.name))?;
        writer.write_all(bytes)?;
        self.hasher.update(bytes);
        self.written += bytes.len() as u64;
        Ok(())
    }
}

impl IndexOutput for FsOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn file_pointer(&self) -> u64 {
        self.written
    }

    fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    fn close(&mut self) -> StoreResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Buffered positional reader over a file handle.
///
/// The fallback when memory mapping is unavailable. Clones share the file
/// handle, each with its own cursor and read buffer; as with [`MmapInput`],
/// only the instance that opened the file can close it.
#[derive(Debug)]
pub struct BufferedFileInput {
    name: String,
    file: SharedHandle<Mutex<File>>,
    offset: u64,
    length: u64,
    pos: u64,
    buffer: Vec<u8>,
    buffer_start: u64,
    buffer_size: usize,
}

impl BufferedFileInput {
    /// Opens the file at `path` for buffered reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: &Path, name: &str, buffer_size: usize) -> StoreResult<Self> {
        let file = File::open(path).map_err(|e| not_found_or_io(e, name))?;
        let length = file.metadata()?.len();
        Ok(Self {
            name: name.to_string(),
            file: SharedHandle::owner(Arc::new(Mutex::new(file))),
            offset: 0,
            length,
            pos: 0,
            buffer: Vec::new(),
            buffer_start: 0,
            buffer_size: buffer_size.max(1),
        })
    }

    fn derive(&self, name: String, offset: u64, length: u64) -> Self {
        Self {
            name,
            file: self.file.share(),
            offset,
            length,
            pos: 0,
            buffer: Vec::new(),
            buffer_start: 0,
            buffer_size: self.buffer_size,
        }
    }

    /// Reads `buf.len()` bytes at relative position `pos` straight from the file.
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> StoreResult<()> {
        let absolute = self.offset + pos;
        let result = self
            .file
            .with(|file| {
                let mut file = file.lock();
                file.seek(SeekFrom::Start(absolute))?;
                file.read_exact(buf)
            })
            .ok_or_else(|| StoreError::already_closed(&self.name))?;

        result.map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                end_of_input(&self.name, pos, self.length, buf.len() as u64)
            } else {
                StoreError::Io(e)
            }
        })
    }

    fn refill(&mut self, pos: u64) -> StoreResult<()> {
        let len = (self.length - pos).min(self.buffer_size as u64) as usize;
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.resize(len, 0);
        let result = self.read_at(pos, &mut buffer);
        if result.is_err() {
            buffer.clear();
        }
        self.buffer = buffer;
        self.buffer_start = pos;
        result
    }
}

impl DataInput for BufferedFileInput {
    fn read_byte(&mut self) -> StoreResult<u8> {
        let mut b = [0u8; 1];
        self.read_bytes(&mut b)?;
        Ok(b[0])
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> StoreResult<()> {
        match self.pos.checked_add(buf.len() as u64) {
            Some(end) if end <= self.length => {}
            _ => return Err(end_of_input(&self.name, self.pos, self.length, buf.len() as u64)),
        }

        let mut copied = 0;
        while copied < buf.len() {
            let buffer_end = self.buffer_start + self.buffer.len() as u64;
            if self.pos >= self.buffer_start && self.pos < buffer_end {
                let from = (self.pos - self.buffer_start) as usize;
                let n = (buf.len() - copied).min(self.buffer.len() - from);
                buf[copied..copied + n].copy_from_slice(&self.buffer[from..from + n]);
                copied += n;
                self.pos += n as u64;
            } else if buf.len() - copied >= self.buffer_size {
                // Large reads bypass the buffer
                self.read_at(self.pos, &mut buf[copied..])?;
                self.pos += (buf.len() - copied) as u64;
                copied = buf.len();
            } else {
                self.refill(self.pos)?;
            }
        }
        Ok(())
    }

    fn resource(&self) -> &str {
        &self.name
    }
}

impl IndexInput for BufferedFileInput {
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
        self.length
    }

    fn clone_input(&self) -> Box<dyn IndexInput> {
        Box::new(self.derive(self.name.clone(), self.offset, self.length))
    }

    fn slice(
        &self,
        description: &str,
        offset: u64,
        length: u64,
    ) -> StoreResult<Box<dyn IndexInput>> {
        check_slice(&self.name, offset, length, self.length)?;
        Ok(Box::new(self.derive(
            slice_name(&self.name, description),
            self.offset + offset,
            length,
        )))
    }

    fn is_clone(&self) -> bool {
        self.file.is_clone()
    }

    fn close(&mut self) -> StoreResult<()> {
        self.file.release();
        self.buffer.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_file(dir: &FsDirectory, name: &str, bytes: &[u8]) {
        let mut out = dir.create_output(name).unwrap();
        out.write_bytes(bytes).unwrap();
        out.close().unwrap();
    }

    fn open_dir(mode: ReadMode) -> (tempfile::TempDir, FsDirectory) {
        let temp = tempdir().unwrap();
        let dir = FsDirectory::open_with_config(
            &temp.path().join("index"),
            DirectoryConfig::new().read_mode(mode).read_buffer_size(8),
        )
        .unwrap();
        (temp, dir)
    }

    #[test]
    fn fs_open_creates_directory() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("index");
        let dir = FsDirectory::open(&path).unwrap();
        assert!(path.is_dir());
        assert_eq!(dir.path(), path);
        assert!(dir.list_all().unwrap().is_empty());
    }

    #[test]
    fn fs_write_and_read_each_mode() {
        for mode in [ReadMode::Auto, ReadMode::Mmap, ReadMode::Buffered] {
            let (_temp, dir) = open_dir(mode);
            write_file(&dir, "_0.dat", b"hello buffered world");

            let mut input = dir.open_input("_0.dat").unwrap();
            assert_eq!(input.len(), 20);
            input.seek(6).unwrap();
            assert_eq!(input.read_byte_vec(8).unwrap(), b"buffered");
            assert_eq!(input.read_byte().unwrap(), b' ');
            assert_eq!(input.read_byte_vec(5).unwrap(), b"world");
            assert!(input.read_byte().unwrap_err().is_end_of_input());
        }
    }

    #[test]
    fn fs_create_existing_fails() {
        let (_temp, dir) = open_dir(ReadMode::Auto);
        write_file(&dir, "_0.dat", b"x");
        assert!(matches!(
            dir.create_output("_0.dat"),
            Err(StoreError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn fs_missing_file_is_not_found() {
        let (_temp, dir) = open_dir(ReadMode::Auto);
        assert!(matches!(
            dir.open_input("missing"),
            Err(StoreError::NotFound { .. })
        ));
        assert!(dir.file_length("missing").unwrap_err().is_not_found());
        assert!(dir.delete_file("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn fs_list_delete_and_length() {
        let (_temp, dir) = open_dir(ReadMode::Auto);
        write_file(&dir, "b.dat", b"22");
        write_file(&dir, "a.dat", b"1");

        assert_eq!(dir.list_all().unwrap(), vec!["a.dat", "b.dat"]);
        assert_eq!(dir.file_length("b.dat").unwrap(), 2);

        dir.delete_file("a.dat").unwrap();
        assert!(!dir.file_exists("a.dat").unwrap());
        assert_eq!(dir.list_all().unwrap(), vec!["b.dat"]);
    }

    #[test]
    fn fs_buffered_large_read_bypasses_buffer() {
        let (_temp, dir) = open_dir(ReadMode::Buffered);
        let data: Vec<u8> = (0..100u8).collect();
        write_file(&dir, "_0.dat", &data);

        let mut input = dir.open_input("_0.dat").unwrap();
        input.read_byte().unwrap();
        assert_eq!(input.read_byte_vec(60).unwrap(), &data[1..61]);
        assert_eq!(input.position(), 61);
    }

    #[test]
    fn fs_buffered_clone_and_slice() {
        let (_temp, dir) = open_dir(ReadMode::Buffered);
        write_file(&dir, "_0.dat", b"0123456789abcdef");

        let mut input = dir.open_input("_0.dat").unwrap();
        input.seek(10).unwrap();
        let mut clone = input.clone_input();
        assert_eq!(clone.read_byte().unwrap(), b'0');
        assert_eq!(input.read_byte().unwrap(), b'a');

        let mut slice = input.slice("tail", 12, 4).unwrap();
        assert_eq!(slice.read_byte_vec(4).unwrap(), b"cdef");

        clone.close().unwrap();
        assert_eq!(input.read_byte().unwrap(), b'b');

        input.close().unwrap();
        assert!(matches!(
            slice.read_byte(),
            Err(StoreError::AlreadyClosed { .. }) | Err(StoreError::EndOfInput { .. })
        ));
    }

    #[test]
    fn fs_write_after_close_fails() {
        let (_temp, dir) = open_dir(ReadMode::Auto);
        let mut out = dir.create_output("_0.dat").unwrap();
        out.write_bytes(b"abc").unwrap();
        assert_eq!(out.checksum(), crc32fast::hash(b"abc"));
        out.close().unwrap();
        out.close().unwrap();
        assert!(matches!(
            out.write_byte(0),
            Err(StoreError::AlreadyClosed { .. })
        ));
    }

    #[test]
    fn fs_persistence() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("index");

        {
            let dir = FsDirectory::open(&path).unwrap();
            write_file(&dir, "_0.dat", b"persistent data");
            dir.sync(&["_0.dat".to_string()]).unwrap();
            dir.sync_meta_data().unwrap();
        }

        let dir = FsDirectory::open(&path).unwrap();
        let mut input = dir.open_input("_0.dat").unwrap();
        assert_eq!(input.read_byte_vec(15).unwrap(), b"persistent data");
    }

    #[test]
    fn fs_lock_prevents_second_holder() {
        let (_temp, dir) = open_dir(ReadMode::Auto);
        let lock = dir.obtain_lock("write.lock").unwrap();
        assert_eq!(lock.name(), "write.lock");
        assert!(matches!(
            dir.obtain_lock("write.lock"),
            Err(StoreError::LockObtainFailed { .. })
        ));
        drop(lock);
        dir.obtain_lock("write.lock").unwrap();
    }

    proptest::proptest! {
        #[test]
        fn fs_buffered_reads_match_source(
            data in proptest::collection::vec(proptest::prelude::any::<u8>(), 1..300),
            reads in proptest::collection::vec((0usize..300, 0usize..40), 1..20),
        ) {
            let (_temp, dir) = open_dir(ReadMode::Buffered);
            write_file(&dir, "_0.dat", &data);
            let mut input = dir.open_input("_0.dat").unwrap();

            for (pos, len) in reads {
                input.seek(pos as u64).unwrap();
                let result = input.read_byte_vec(len);
                if pos + len <= data.len() {
                    proptest::prop_assert_eq!(result.unwrap(), data[pos..pos + len].to_vec());
                } else {
                    proptest::prop_assert!(result.unwrap_err().is_end_of_input());
                }
            }
        }
    }

    #[test]
    fn fs_invalid_name_rejected() {
        let (_temp, dir) = open_dir(ReadMode::Auto);
        assert!(matches!(
            dir.create_output("../escape"),
            Err(StoreError::InvalidName { .. })
        ));
    }
}
