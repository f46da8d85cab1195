use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};

use crate::error::{AntError, Result};

use super::content::read_content;
use super::{AofRecord, Command, LogTarget, Operation};

/// Reads one log file of a version directory back into operations.
pub struct AofReader {
    version_dir: PathBuf,
    log_path: PathBuf,
    target: LogTarget,
}

impl AofReader {
    pub fn new(version_dir: &Path, log_name: &str, target: LogTarget) -> Self {
        Self {
            version_dir: version_dir.to_path_buf(),
            log_path: version_dir.join(log_name),
            target,
        }
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    pub fn exists(&self) -> bool {
        self.log_path.exists()
    }

    /// All complete records in file order. A missing log reads as empty.
    ///
    /// A final line without a newline is a torn append and is skipped with
    /// a warning; any other malformed line is `AofCorrupt`.
    pub fn records(&self) -> Result<Vec<AofRecord>> {
        let text = match fs::read_to_string(&self.log_path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let complete = text.ends_with('\n');
        let lines: Vec<&str> = text.lines().collect();
        let mut records = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            let is_last = i + 1 == lines.len();
            if is_last && !complete {
                warn!(
                    path = %self.log_path.display(),
                    line = i + 1,
                    "skipping torn trailing log line"
                );
                break;
            }
            let record = AofRecord::parse(line).map_err(|reason| AntError::AofCorrupt {
                path: self.log_path.clone(),
                line: i + 1,
                reason,
            })?;
            records.push(record);
        }
        Ok(records)
    }

    /// Number of known-command records, i.e. what `replay` would visit.
    pub fn count_operations(&self) -> Result<usize> {
        Ok(self
            .records()?
            .iter()
            .filter(|r| r.command.parse::<Command>().is_ok())
            .count())
    }

    /// Decode every record and hand it to `apply`, in log order.
    ///
    /// The first `skip` operations are counted but neither loaded nor applied.
    /// Unknown commands are skipped with a warning and do not count.
    /// Returns the number of operations visited, skipped ones included.
    #[instrument(skip(self, apply), fields(path = %self.log_path.display(), target = self.target.label()))]
    pub fn replay<F>(&self, skip: usize, mut apply: F) -> Result<usize>
    where
        F: FnMut(Operation) -> Result<()>,
    {
        let records = self.records()?;
        let mut visited = 0usize;
        let mut applied = 0usize;

        for (i, record) in records.into_iter().enumerate() {
            let command = match record.command.parse::<Command>() {
                Ok(c) => c,
                Err(reason) => {
                    warn!(line = i + 1, %reason, "skipping unknown log command");
                    continue;
                }
            };
            visited += 1;
            if visited <= skip {
                continue;
            }

            let mut arrays = Vec::with_capacity(record.refs.len());
            for reference in &record.refs {
                arrays.push(read_content(&self.version_dir, reference)?);
            }
            let op = Operation::from_arrays(command, arrays).map_err(|reason| {
                AntError::AofCorrupt {
                    path: self.log_path.clone(),
                    line: i + 1,
                    reason,
                }
            })?;
            apply(op)?;
            applied += 1;
        }

        crate::metrics::REPLAYED_RECORDS_TOTAL
            .with_label_values(&[self.target.label()])
            .inc_by(applied as u64);
        debug!(visited, applied, skipped = visited - applied, "replayed log");
        Ok(visited)
    }
}
