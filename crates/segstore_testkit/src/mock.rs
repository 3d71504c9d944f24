//! Instrumented directory for resource accounting and fault injection.
//!
//! [`MockDirectory`] wraps another directory and counts every input it hands
//! out. An input counts as closed when `close()` is called on it, and as
//! leaked when it is dropped without being closed. Clones and slices are not
//! counted: they never own the underlying resource.

use parking_lot::Mutex;
use segstore_storage::{
    DataInput, Directory, IndexInput, IndexOutput, RamDirectory, StoreError, StoreResult,
};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Counters {
    inputs_opened: AtomicUsize,
    inputs_closed: AtomicUsize,
    inputs_leaked: AtomicUsize,
    outputs_created: AtomicUsize,
}

/// A directory wrapper counting inputs and failing on chosen names.
#[derive(Debug)]
pub struct MockDirectory {
    inner: Arc<dyn Directory>,
    counters: Arc<Counters>,
    fail_on_open: Mutex<Vec<String>>,
    fail_on_create: Mutex<Vec<String>>,
    opened: Mutex<Vec<String>>,
}

impl MockDirectory {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn Directory>) -> Self {
        Self {
            inner,
            counters: Arc::new(Counters::default()),
            fail_on_open: Mutex::new(Vec::new()),
            fail_on_create: Mutex::new(Vec::new()),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Wraps a fresh [`RamDirectory`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(RamDirectory::new()))
    }

    /// Makes `open_input` fail for every name containing `fragment`.
    pub fn fail_on_open(&self, fragment: impl Into<String>) {
        self.fail_on_open.lock().push(fragment.into());
    }

    /// Makes `create_output` fail for every name containing `fragment`.
    pub fn fail_on_create(&self, fragment: impl Into<String>) {
        self.fail_on_create.lock().push(fragment.into());
    }

    /// Removes every injected failure.
    pub fn clear_failures(&self) {
        self.fail_on_open.lock().clear();
        self.fail_on_create.lock().clear();
    }

    /// Number of inputs opened successfully.
    pub fn inputs_opened(&self) -> usize {
        self.counters.inputs_opened.load(Ordering::SeqCst)
    }

    /// Number of inputs closed explicitly.
    pub fn inputs_closed(&self) -> usize {
        self.counters.inputs_closed.load(Ordering::SeqCst)
    }

    /// Number of inputs dropped without being closed.
    pub fn inputs_leaked(&self) -> usize {
        self.counters.inputs_leaked.load(Ordering::SeqCst)
    }

    /// Number of inputs that are neither closed nor dropped.
    pub fn open_inputs(&self) -> usize {
        self.inputs_opened() - self.inputs_closed() - self.inputs_leaked()
    }

    /// Number of outputs created successfully.
    pub fn outputs_created(&self) -> usize {
        self.counters.outputs_created.load(Ordering::SeqCst)
    }

    /// Names of the inputs opened so far, in order.
    pub fn opened_names(&self) -> Vec<String> {
        self.opened.lock().clone()
    }

    /// Returns the wrapped directory.
    pub fn inner(&self) -> &Arc<dyn Directory> {
        &self.inner
    }

    fn injected(rules: &Mutex<Vec<String>>, action: &str, name: &str) -> StoreResult<()> {
        if rules.lock().iter().any(|fragment| name.contains(fragment.as_str())) {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("injected failure: {action} {name}"),
            )));
        }
        Ok(())
    }
}

impl Directory for MockDirectory {
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
        self.inner.delete_file(name)
    }

    fn create_output(&self, name: &str) -> StoreResult<Box<dyn IndexOutput>> {
        Self::injected(&self.fail_on_create, "create", name)?;
        let output = self.inner.create_output(name)?;
        self.counters.outputs_created.fetch_add(1, Ordering::SeqCst);
        Ok(output)
    }

    fn open_input(&self, name: &str) -> StoreResult<Box<dyn IndexInput>> {
        Self::injected(&self.fail_on_open, "open", name)?;
        let input = self.inner.open_input(name)?;
        self.counters.inputs_opened.fetch_add(1, Ordering::SeqCst);
        self.opened.lock().push(name.to_string());
        tracing::trace!(file = %name, "mock directory opened input");
        Ok(Box::new(CountingInput {
            inner: input,
            counters: Some(Arc::clone(&self.counters)),
            closed: false,
        }))
    }

    fn sync(&self, names: &[String]) -> StoreResult<()> {
        self.inner.sync(names)
    }
}

/// Input handed out by [`MockDirectory`].
///
/// Only inputs returned by `open_input` carry counters; clones and slices do not.
#[derive(Debug)]
struct CountingInput {
    inner: Box<dyn IndexInput>,
    counters: Option<Arc<Counters>>,
    closed: bool,
}

impl CountingInput {
    fn uncounted(inner: Box<dyn IndexInput>) -> Box<dyn IndexInput> {
        Box::new(Self {
            inner,
            counters: None,
            closed: false,
        })
    }
}

impl DataInput for CountingInput {
    fn read_byte(&mut self) -> StoreResult<u8> {
        self.inner.read_byte()
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> StoreResult<()> {
        self.inner.read_bytes(buf)
    }

    fn resource(&self) -> &str {
        self.inner.resource()
    }
}

impl IndexInput for CountingInput {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn position(&self) -> u64 {
        self.inner.position()
    }

    fn seek(&mut self, pos: u64) -> StoreResult<()> {
        self.inner.seek(pos)
    }

    fn len(&self) -> u64 {
        self.inner.len()
    }

    fn clone_input(&self) -> Box<dyn IndexInput> {
        Self::uncounted(self.inner.clone_input())
    }

    fn slice(
        &self,
        description: &str,
        offset: u64,
        length: u64,
    ) -> StoreResult<Box<dyn IndexInput>> {
        Ok(Self::uncounted(self.inner.slice(description, offset, length)?))
    }

    fn is_clone(&self) -> bool {
        self.inner.is_clone()
    }

    fn close(&mut self) -> StoreResult<()> {
        if !self.closed {
            self.closed = true;
            if let Some(counters) = &self.counters {
                counters.inputs_closed.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.inner.close()
    }
}

impl Drop for CountingInput {
    fn drop(&mut self) {
        if !self.closed {
            if let Some(counters) = &self.counters {
                counters.inputs_leaked.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}
