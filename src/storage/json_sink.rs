use crate::model::{FetchResult, SinkError};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

/// Writes the run result as pretty JSON. The destination is only ever
/// replaced by a rename, so readers see either the old file or the new one.
pub struct JsonSink {
    path: PathBuf,
}

/// A fully written and synced temp file waiting to replace the destination.
/// Dropping it without `commit` removes the temp file.
pub struct StagedWrite {
    temp: NamedTempFile,
    dest: PathBuf,
}

fn io_error(path: &Path, source: std::io::Error) -> SinkError {
    SinkError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl JsonSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, result: &FetchResult) -> Result<(), SinkError> {
        self.stage(result)?.commit()?;
        info!(
            "Wrote {} records for {} keys to {}",
            result.record_count(),
            result.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Serializes into a temp file next to the destination (same filesystem,
    /// so the later rename is atomic).
    pub fn stage(&self, result: &FetchResult) -> Result<StagedWrite, SinkError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;

        let mut temp = NamedTempFile::new_in(&dir).map_err(|e| io_error(&dir, e))?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, result)?;
            writer.write_all(b"\n").map_err(|e| io_error(&self.path, e))?;
            writer.flush().map_err(|e| io_error(&self.path, e))?;
        }
        temp.as_file().sync_all().map_err(|e| io_error(temp.path(), e))?;

        Ok(StagedWrite {
            temp,
            dest: self.path.clone(),
        })
    }
}

impl StagedWrite {
    pub fn commit(self) -> Result<(), SinkError> {
        let dest = self.dest;
        self.temp
            .persist(&dest)
            .map_err(|e| io_error(&dest, e.error))?;
        Ok(())
    }
}
