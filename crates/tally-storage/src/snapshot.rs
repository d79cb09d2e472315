use crate::error::{Result, StorageError};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tally_common::error::MetricError;
use tally_common::types::MetricRecord;
use tempfile::NamedTempFile;

/// Newline-delimited JSON file holding a full copy of the repository.
///
/// Writes go to a temporary file in the destination directory which is then
/// renamed over the destination, so the path always holds either the previous
/// complete snapshot or the new one.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }

    /// Atomically replaces the snapshot with `records`.
    pub fn write(&self, records: &[MetricRecord]) -> Result<()> {
        let staged = self.stage(records)?;
        staged
            .persist(&self.path)
            .map_err(|e| StorageError::Io(e.error))?;
        sync_dir(self.dir());
        tracing::debug!(path = %self.path.display(), count = records.len(), "Snapshot written");
        Ok(())
    }

    /// Writes `records` to a synced temporary file next to the destination.
    /// Dropping the returned file deletes it without touching the destination.
    ///
    /// JSON has no encoding for NaN or infinity, so such a value fails here
    /// instead of producing a line that cannot be read back.
    pub(crate) fn stage(&self, records: &[MetricRecord]) -> Result<NamedTempFile> {
        if let Some(bad) = records.iter().find(|r| !r.value.is_finite()) {
            return Err(MetricError::WrongValue(format!("{}={}", bad.key, bad.value)).into());
        }

        let dir = self.dir();
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".snapshot-")
            .suffix(".tmp")
            .tempfile_in(dir)?;

        {
            let mut w = BufWriter::new(tmp.as_file_mut());
            for record in records {
                serde_json::to_writer(&mut w, record)?;
                w.write_all(b"\n")?;
            }
            w.flush()?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o644))?;
        }
        tmp.as_file().sync_all()?;
        Ok(tmp)
    }

    /// Reads every record back. A missing file is created empty; a malformed
    /// line is an error.
    pub fn read(&self) -> Result<Vec<MetricRecord>> {
        if !self.path.exists() {
            fs::create_dir_all(self.dir())?;
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();
        for record in serde_json::Deserializer::from_reader(reader).into_iter::<MetricRecord>() {
            records.push(record?);
        }
        Ok(records)
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        tracing::warn!(dir = %dir.display(), error = %e, "Failed to sync snapshot directory");
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
