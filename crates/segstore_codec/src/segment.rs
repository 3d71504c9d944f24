//! Segment identity and the state handed to codecs.

use crate::field_info::FieldInfos;
use crate::naming;
use segstore_storage::codec_util::ID_LENGTH;
use segstore_storage::Directory;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// Identity of one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    name: String,
    max_doc: u32,
    id: [u8; ID_LENGTH],
    files: BTreeSet<String>,
}

impl SegmentInfo {
    /// Creates a segment with a fresh random id.
    pub fn new(name: impl Into<String>, max_doc: u32) -> Self {
        Self::with_id(name, max_doc, *Uuid::new_v4().as_bytes())
    }

    /// Creates a segment with a known id.
    pub fn with_id(name: impl Into<String>, max_doc: u32, id: [u8; ID_LENGTH]) -> Self {
        Self {
            name: name.into(),
            max_doc,
            id,
            files: BTreeSet::new(),
        }
    }

    /// Returns the segment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of documents.
    #[must_use]
    pub const fn max_doc(&self) -> u32 {
        self.max_doc
    }

    /// Returns the unique id written into every file header.
    #[must_use]
    pub const fn id(&self) -> &[u8; ID_LENGTH] {
        &self.id
    }

    /// Returns the files belonging to the segment.
    #[must_use]
    pub fn files(&self) -> &BTreeSet<String> {
        &self.files
    }

    /// Replaces the file set.
    pub fn set_files(&mut self, files: impl IntoIterator<Item = String>) {
        self.files = files.into_iter().collect();
    }
}

/// Everything a codec needs to write its files.
#[derive(Debug, Clone)]
pub struct SegmentWriteState {
    /// Directory the files are created in.
    pub directory: Arc<dyn Directory>,
    /// The segment being written.
    pub segment_info: Arc<SegmentInfo>,
    /// Suffix added to every file name; empty at the top level.
    pub segment_suffix: String,
}

impl SegmentWriteState {
    /// Creates a top-level state with an empty suffix.
    pub fn new(directory: Arc<dyn Directory>, segment_info: Arc<SegmentInfo>) -> Self {
        Self {
            directory,
            segment_info,
            segment_suffix: String::new(),
        }
    }

    /// Derives a state for a nested codec using `suffix`.
    #[must_use]
    pub fn with_suffix(&self, suffix: impl Into<String>) -> Self {
        Self {
            directory: Arc::clone(&self.directory),
            segment_info: Arc::clone(&self.segment_info),
            segment_suffix: suffix.into(),
        }
    }

    /// Name of this state's file with extension `ext`.
    #[must_use]
    pub fn file_name(&self, ext: &str) -> String {
        naming::segment_file_name(self.segment_info.name(), &self.segment_suffix, ext)
    }
}

/// Everything a codec needs to read its files.
#[derive(Debug, Clone)]
pub struct SegmentReadState {
    /// Directory the files are opened from.
    pub directory: Arc<dyn Directory>,
    /// The segment being read.
    pub segment_info: Arc<SegmentInfo>,
    /// The segment's fields, including their recorded attributes.
    pub field_infos: Arc<FieldInfos>,
    /// Suffix added to every file name; empty at the top level.
    pub segment_suffix: String,
}

impl SegmentReadState {
    /// Creates a top-level state with an empty suffix.
    pub fn new(
        directory: Arc<dyn Directory>,
        segment_info: Arc<SegmentInfo>,
        field_infos: Arc<FieldInfos>,
    ) -> Self {
        Self {
            directory,
            segment_info,
            field_infos,
            segment_suffix: String::new(),
        }
    }

    /// Derives a state for a nested codec using `suffix`.
    #[must_use]
    pub fn with_suffix(&self, suffix: impl Into<String>) -> Self {
        Self {
            directory: Arc::clone(&self.directory),
            segment_info: Arc::clone(&self.segment_info),
            field_infos: Arc::clone(&self.field_infos),
            segment_suffix: suffix.into(),
        }
    }

    /// Name of this state's file with extension `ext`.
    #[must_use]
    pub fn file_name(&self, ext: &str) -> String {
        naming::segment_file_name(self.segment_info.name(), &self.segment_suffix, ext)
    }
}
