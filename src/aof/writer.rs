use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};

use crate::error::Result;

use super::content::write_content;
use super::{AofRecord, LogTarget, Operation, TIMESTAMP_FORMAT};

/// Appends records to one log file of a version directory.
///
/// Content files are written and synced before the log line, and the log
/// line is synced before `append` returns. A record is therefore either
/// fully present with all its payloads or absent.
pub struct AofWriter {
    version_dir: PathBuf,
    log_path: PathBuf,
    dumps_dir: String,
    target: LogTarget,
}

impl AofWriter {
    pub fn new(version_dir: &Path, log_name: &str, dumps_dir: &str, target: LogTarget) -> Self {
        Self {
            version_dir: version_dir.to_path_buf(),
            log_path: version_dir.join(log_name),
            dumps_dir: dumps_dir.to_string(),
            target,
        }
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    /// Externalize the payload of `op` and append its record.
    #[instrument(skip(self, op), fields(target = self.target.label(), command = %op.command()))]
    pub fn append(&self, op: &Operation) -> Result<()> {
        let mut refs = Vec::new();
        for array in op.arrays() {
            refs.push(write_content(&self.version_dir, &self.dumps_dir, array)?);
        }

        let record = AofRecord {
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            command: op.command().as_str().to_string(),
            refs,
        };

        repair_torn_tail(&self.log_path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        file.write_all(record.to_line().as_bytes())?;
        file.sync_all()?;

        crate::metrics::AOF_APPENDS_TOTAL
            .with_label_values(&[self.target.label()])
            .inc();
        debug!(
            path = %self.log_path.display(),
            count = op.ids().len(),
            "appended log record"
        );
        Ok(())
    }
}

/// Drop a trailing partial line left by a crash mid-append, so the next
/// record starts on a fresh line.
fn repair_torn_tail(path: &Path) -> Result<()> {
    let mut file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(());
    }

    let data = fs::read(path)?;
    let keep = data
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos + 1);
    warn!(
        path = %path.display(),
        dropped_bytes = data.len() - keep,
        "truncating torn trailing log line"
    );
    file.set_len(keep as u64)?;
    file.sync_all()?;
    Ok(())
}

/// Remove a log file if it exists.
pub fn remove_log(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Create `path` with `contents` and sync it.
pub(crate) fn write_synced(path: &Path, contents: &[u8]) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    Ok(())
}
