//! FIF snapshots: one file holding a full IVF-Flat index.
//!
//! Layout (little-endian):
//! `magic "FIF1" | format u32 | log_offset u64 | len u64 | bincode(index) | xxh3 u64`
//!
//! `log_offset` is the number of primary-log operations of the same
//! version already reflected in the snapshot; recovery skips them.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, instrument};
use xxhash_rust::xxh3::xxh3_64;

use crate::aof::writer::write_synced;
use crate::error::{AntError, Result};
use crate::index::IvfFlatIndex;

const MAGIC: &[u8; 4] = b"FIF1";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 8 + 8;

/// A loaded snapshot.
#[derive(Debug)]
pub struct Snapshot {
    pub index: IvfFlatIndex,
    pub log_offset: usize,
}

/// Write `index` to `path` atomically (temp file, sync, rename).
#[instrument(skip_all, fields(path = %path.display(), count = index.count()))]
pub fn save(path: &Path, index: &IvfFlatIndex, log_offset: usize) -> Result<()> {
    let start = Instant::now();

    let payload = bincode::serialize(index)?;
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len() + 8);
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&(log_offset as u64).to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    buf.extend_from_slice(&payload);
    let checksum = xxh3_64(&buf);
    buf.extend_from_slice(&checksum.to_le_bytes());

    let tmp = tmp_path(path);
    write_synced(&tmp, &buf)?;
    fs::rename(&tmp, path)?;
    if let Some(parent) = path.parent() {
        sync_dir(parent);
    }

    let elapsed = start.elapsed();
    crate::metrics::SNAPSHOT_DURATION.observe(elapsed.as_secs_f64());
    info!(
        bytes = buf.len(),
        log_offset,
        elapsed_ms = elapsed.as_millis() as u64,
        "wrote snapshot"
    );
    Ok(())
}

/// Load a snapshot. A missing or malformed file is `CorruptSnapshot`.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load(path: &Path) -> Result<Snapshot> {
    let corrupt = |reason: String| AntError::CorruptSnapshot {
        path: path.to_path_buf(),
        reason,
    };

    let data = fs::read(path).map_err(|e| corrupt(e.to_string()))?;
    if data.len() < HEADER_LEN + 8 {
        return Err(corrupt(format!("file too short ({} bytes)", data.len())));
    }
    if &data[..4] != MAGIC {
        return Err(corrupt("bad magic".into()));
    }

    let (body, tail) = data.split_at(data.len() - 8);
    let stored = u64::from_le_bytes(le_bytes(tail));
    let computed = xxh3_64(body);
    if stored != computed {
        return Err(corrupt(format!(
            "checksum mismatch: stored {stored:#x}, computed {computed:#x}"
        )));
    }

    let format = u32::from_le_bytes(le_bytes(&body[4..8]));
    if format != FORMAT_VERSION {
        return Err(corrupt(format!("unsupported format version {format}")));
    }
    let log_offset = u64::from_le_bytes(le_bytes(&body[8..16])) as usize;
    let len = u64::from_le_bytes(le_bytes(&body[16..24])) as usize;
    let payload = &body[HEADER_LEN..];
    if payload.len() != len {
        return Err(corrupt(format!(
            "payload length {} does not match header {len}",
            payload.len()
        )));
    }

    let mut index: IvfFlatIndex =
        bincode::deserialize(payload).map_err(|e| corrupt(e.to_string()))?;
    index.restore_owners().map_err(corrupt)?;

    debug!(count = index.count(), log_offset, "loaded snapshot");
    Ok(Snapshot { index, log_offset })
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Best effort: persist the rename on filesystems that need a directory sync.
fn sync_dir(dir: &Path) {
    if let Ok(handle) = fs::File::open(dir) {
        let _ = handle.sync_all();
    }
}

fn le_bytes<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}
