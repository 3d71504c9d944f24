//! # Segstore Testkit
//!
//! Test utilities for segstore.
//!
//! This crate provides:
//! - Test fixtures: temporary directories, fields and segment states
//! - [`MockDirectory`], an instrumented directory counting opened and closed
//!   inputs and injecting failures
//! - [`SegmentHarness`], which writes a whole segment through the per-field
//!   formats and verifies everything reads back
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use segstore_testkit::prelude::*;
//!
//! with_ram_dir(|dir| {
//!     assert!(dir.list_all().unwrap().is_empty());
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod harness;
pub mod mock;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::harness::*;
    pub use crate::mock::*;
    pub use segstore_codec::*;
    pub use segstore_storage::{
        DataInput, DataOutput, Directory, DirectoryConfig, FsDirectory, IndexInput, IndexOutput,
        RamDirectory, ReadMode, StoreError, TrackingDirectory,
    };
}

pub use fixtures::*;
pub use generators::*;
pub use harness::*;
pub use mock::*;
