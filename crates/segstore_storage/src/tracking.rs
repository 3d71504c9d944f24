//! Directory wrapper that records created files.

use crate::directory::Directory;
use crate::error::StoreResult;
use crate::io::{IndexInput, IndexOutput};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Records the name of every file created through it.
///
/// Segment writers wrap their directory in one of these to learn which files
/// a segment owns. Files deleted through the wrapper are forgotten again.
#[derive(Debug)]
pub struct TrackingDirectory {
    inner: Arc<dyn Directory>,
    created: Mutex<BTreeSet<String>>,
}

impl TrackingDirectory {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn Directory>) -> Self {
        Self {
            inner,
            created: Mutex::new(BTreeSet::new()),
        }
    }

    /// Returns the names created so far, sorted.
    #[must_use]
    pub fn created_files(&self) -> BTreeSet<String> {
        self.created.lock().clone()
    }

    /// Forgets every recorded name.
    pub fn clear_created_files(&self) {
        self.created.lock().clear();
    }

    /// Returns the wrapped directory.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn Directory> {
        &self.inner
    }
}

impl Directory for TrackingDirectory {
    fn list_all(&self) -> StoreResult<Vec<String>> {
        self.inner.list_all()
    }

    fn file_exists(&self, name: &str) -> StoreResult<bool> {
        self.inner.file_exists(name)
    }

    fn file_length(&self, name: &str) -> StoreResult<u64> {
        self.inner.file_length(name)
    }

    fn delete_file(&self, name: &str) -> StoreResult<()> {
        self.inner.delete_file(name)?;
        self.created.lock().remove(name);
        Ok(())
    }

    fn create_output(&self, name: &str) -> StoreResult<Box<dyn IndexOutput>> {
        let output = self.inner.create_output(name)?;
        self.created.lock().insert(name.to_string());
        Ok(output)
    }

    fn open_input(&self, name: &str) -> StoreResult<Box<dyn IndexInput>> {
        self.inner.open_input(name)
    }

    fn sync(&self, names: &[String]) -> StoreResult<()> {
        self.inner.sync(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RamDirectory;

    #[test]
    fn records_created_and_forgets_deleted() {
        let tracking = TrackingDirectory::new(Arc::new(RamDirectory::new()));
        tracking.create_output("_0.a").unwrap().close().unwrap();
        tracking.create_output("_0.b").unwrap().close().unwrap();
        tracking.delete_file("_0.a").unwrap();

        let created: Vec<_> = tracking.created_files().into_iter().collect();
        assert_eq!(created, vec!["_0.b"]);
        assert_eq!(tracking.list_all().unwrap(), vec!["_0.b"]);
    }

    #[test]
    fn failed_create_is_not_recorded() {
        let ram = Arc::new(RamDirectory::new());
        ram.insert_file("_0.a", vec![1]);
        let tracking = TrackingDirectory::new(ram);
        assert!(tracking.create_output("_0.a").is_err());
        assert!(tracking.created_files().is_empty());
    }
}
