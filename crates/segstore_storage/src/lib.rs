//! # Segstore Storage
//!
//! Directory abstraction and I/O primitives for segment files.
//!
//! This crate provides the lowest-level storage layer of a segment: a
//! [`Directory`] is a flat namespace of named, write-once files. Writers get
//! an append-only [`IndexOutput`]; readers get a random-access
//! [`IndexInput`] that can be cloned cheaply for concurrent reads.
//!
//! ## Design Principles
//!
//! - Files are immutable once their output is closed
//! - Directories do not interpret file contents
//! - Only the input returned by `open_input` owns its resource; clones never
//!   release it
//! - Directories are `Send + Sync`; an input's cursor is not shared
//!
//! ## Available Directories
//!
//! - [`RamDirectory`] - For testing and ephemeral segments
//! - [`FsDirectory`] - Filesystem files, read via [`MmapInput`] with a
//!   [`BufferedFileInput`] fallback
//! - [`TrackingDirectory`] - Wrapper recording created file names
//!
//! ## Example
//!
//! ```rust
//! use segstore_storage::{DataInput, DataOutput, Directory, RamDirectory};
//!
//! let dir = RamDirectory::new();
//! let mut out = dir.create_output("_0.dat").unwrap();
//! out.write_vint(300).unwrap();
//! out.close().unwrap();
//!
//! let mut input = dir.open_input("_0.dat").unwrap();
//! assert_eq!(input.read_vint().unwrap(), 300);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod close;
pub mod codec_util;
mod config;
mod directory;
mod error;
mod file;
mod handle;
mod io;
mod memory;
mod mmap;
mod tracking;

pub use config::{DirectoryConfig, ReadMode};
pub use directory::Directory;
pub use error::{StoreError, StoreResult};
pub use file::{BufferedFileInput, DirectoryLock, FsDirectory};
pub use io::{DataInput, DataOutput, IndexInput, IndexOutput};
pub use memory::{BytesInput, RamDirectory};
pub use mmap::MmapInput;
pub use tracking::TrackingDirectory;
