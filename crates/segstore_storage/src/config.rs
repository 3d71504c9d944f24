//! Directory configuration.

/// How a filesystem directory opens files for reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// Memory-map, falling back to buffered reads if mapping fails.
    #[default]
    Auto,
    /// Always memory-map; mapping failures are errors.
    Mmap,
    /// Always use buffered positional reads.
    Buffered,
}

/// Configuration for a filesystem directory.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// How files are opened for reading.
    pub read_mode: ReadMode,

    /// Buffer size of the buffered (non-mapped) reader.
    pub read_buffer_size: usize,

    /// Buffer size of file outputs.
    pub output_buffer_size: usize,

    /// Whether to ask the OS to prefault mapped pages on open.
    pub preload: bool,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            read_mode: ReadMode::Auto,
            read_buffer_size: 1024,
            output_buffer_size: 8 * 1024,
            preload: false,
        }
    }
}

impl DirectoryConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the read mode.
    #[must_use]
    pub const fn read_mode(mut self, mode: ReadMode) -> Self {
        self.read_mode = mode;
        self
    }

    /// Sets the buffered reader's buffer size (minimum 8 bytes).
    #[must_use]
    pub const fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = if size < 8 { 8 } else { size };
        self
    }

    /// Sets the output buffer size.
    #[must_use]
    pub const fn output_buffer_size(mut self, size: usize) -> Self {
        self.output_buffer_size = size;
        self
    }

    /// Sets whether mapped files are prefaulted.
    #[must_use]
    pub const fn preload(mut self, value: bool) -> Self {
        self.preload = value;
        self
    }
}
