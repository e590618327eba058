//! Buffered append-mode JSON Lines writer.

use crate::error::PersistenceResult;
use crate::record::PaperRecord;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct PaperLogWriter {
    path: PathBuf,
    buffer: Vec<PaperRecord>,
    max_buffer_size: usize,
    /// Opened lazily on first flush.
    file: Option<BufWriter<File>>,
    records_written: usize,
}

impl PaperLogWriter {
    /// Create a writer appending to `path`. Parent directories are created.
    pub fn new(path: impl AsRef<Path>, max_buffer_size: usize) -> PersistenceResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            buffer: Vec::with_capacity(max_buffer_size.max(1)),
            max_buffer_size: max_buffer_size.max(1),
            file: None,
            records_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records_written(&self) -> usize {
        self.records_written
    }

    /// Buffer a record, flushing once the buffer is full.
    pub fn append(&mut self, record: PaperRecord) -> PersistenceResult<()> {
        self.buffer.push(record);
        if self.buffer.len() >= self.max_buffer_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Append and flush immediately.
    pub fn append_now(&mut self, record: PaperRecord) -> PersistenceResult<()> {
        self.buffer.push(record);
        self.flush()
    }

    pub fn flush(&mut self) -> PersistenceResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        if self.file.is_none() {
            info!(path = %self.path.display(), "Opening paper log (append mode)");
            let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
            self.file = Some(BufWriter::new(file));
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };

        for record in &self.buffer {
            let json = serde_json::to_string(record)?;
            writeln!(file, "{json}")?;
        }
        file.flush()?;

        let count = self.buffer.len();
        self.records_written += count;
        self.buffer.clear();
        debug!(records = count, "Flushed paper log");
        Ok(())
    }

    pub fn close(&mut self) -> PersistenceResult<()> {
        self.flush()?;
        if self.file.take().is_some() {
            info!(
                path = %self.path.display(),
                records = self.records_written,
                "Closed paper log"
            );
        }
        Ok(())
    }
}

impl Drop for PaperLogWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(?e, "Failed to flush paper log on drop");
        }
    }
}
