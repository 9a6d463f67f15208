//! Log destinations.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::LogError;

/// An append-only destination for rendered log blocks.
///
/// `append` must not return before the block is handed to the OS.
pub trait LogSink: Send + Sync {
    fn append(&self, block: &str) -> Result<(), LogError>;

    /// Where the log lives, if it is a file.
    fn location(&self) -> Option<PathBuf> {
        None
    }
}

/// Writes to a log file that is truncated when the session starts.
pub struct FileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSink {
    /// Create (or truncate) the file at `path`, creating parent directories.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| LogError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let file = File::create(&path).map_err(io_err)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }
}

impl LogSink for FileSink {
    fn append(&self, block: &str) -> Result<(), LogError> {
        let mut file = self.file.lock().map_err(|_| LogError::Poisoned)?;
        file.write_all(block.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|source| LogError::Io {
                path: self.path.clone(),
                source,
            })
    }

    fn location(&self) -> Option<PathBuf> {
        Some(self.path.clone())
    }
}

/// Keeps the log in memory. Clones share the same buffer.
#[derive(Clone, Default)]
pub struct MemorySink {
    buffer: Arc<Mutex<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn contents(&self) -> String {
        self.buffer
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default()
    }
}

impl LogSink for MemorySink {
    fn append(&self, block: &str) -> Result<(), LogError> {
        self.buffer
            .lock()
            .map_err(|_| LogError::Poisoned)?
            .push_str(block);
        Ok(())
    }
}

/// Discards everything. Used when logging is disabled or the log file
/// cannot be opened.
pub struct NullSink;

impl LogSink for NullSink {
    fn append(&self, _block: &str) -> Result<(), LogError> {
        Ok(())
    }
}
