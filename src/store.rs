//! Append-only sample file.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::error::Result;

/// Default file name for received samples.
pub const DEFAULT_SAMPLE_PATH: &str = "samples.bin";

/// Binary file receiving data item bodies in arrival order.
///
/// The file is opened (and created if missing) on the first append. Existing
/// content is kept; new bytes go to the end. Appends are buffered until
/// [`flush`](Self::flush).
#[derive(Debug)]
pub struct SampleFile {
    path: PathBuf,
    file: Option<BufWriter<File>>,
    written: u64,
}

impl SampleFile {
    /// Creates a store for `path` without touching the file system.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
            written: 0,
        }
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of bytes appended through this store.
    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Appends `data` to the file, opening it first if needed.
    pub async fn append(&mut self, data: &[u8]) -> Result<()> {
        if self.file.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            tracing::debug!(path = %self.path.display(), "opened sample file");
            self.file = Some(BufWriter::new(file));
        }

        if let Some(file) = self.file.as_mut() {
            file.write_all(data).await?;
            self.written += data.len() as u64;
            tracing::trace!(bytes = data.len(), total = self.written, "samples appended");
        }
        Ok(())
    }

    /// Writes buffered appends through to the file. Does nothing before the
    /// first append.
    pub async fn flush(&mut self) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush().await?;
        }
        Ok(())
    }
}
