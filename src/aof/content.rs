//! Content files: the array payloads referenced by AOF records.
//!
//! Layout (little-endian):
//! `magic "ANTA" | kind u8 | rows u32 | cols u32 | payload | xxh3 u64`
//! where the checksum covers every byte before it. Kind 1 is an f32 matrix
//! (`rows x cols`), kind 2 an i64 column (`rows x 1`).

use std::fs::{self, File};
use std::io::Write;
use std::path::{Component, Path};

use ulid::Ulid;
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{AntError, Result};
use crate::types::VectorId;

const MAGIC: &[u8; 4] = b"ANTA";
const KIND_VECTORS: u8 = 1;
const KIND_IDS: u8 = 2;
const HEADER_LEN: usize = 4 + 1 + 4 + 4;
const CHECKSUM_LEN: usize = 8;

/// A decoded content file.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentArray {
    Vectors(Vec<Vec<f32>>),
    Ids(Vec<VectorId>),
}

impl ContentArray {
    pub fn kind(&self) -> &'static str {
        match self {
            ContentArray::Vectors(_) => "vectors",
            ContentArray::Ids(_) => "ids",
        }
    }
}

/// Borrowed view used on the write path so payloads are not cloned.
#[derive(Debug, Clone, Copy)]
pub enum ContentRef<'a> {
    Vectors(&'a [Vec<f32>]),
    Ids(&'a [VectorId]),
}

/// Header fields are u32; larger shapes cannot be written.
fn shape_field(value: usize, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        AntError::Validation(format!("{field} {value} exceeds the content file limit"))
    })
}

pub fn encode(array: ContentRef<'_>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.extend_from_slice(MAGIC);
    match array {
        ContentRef::Vectors(rows) => {
            let cols = rows.first().map_or(0, |r| r.len());
            buf.push(KIND_VECTORS);
            buf.extend_from_slice(&shape_field(rows.len(), "rows")?.to_le_bytes());
            buf.extend_from_slice(&shape_field(cols, "cols")?.to_le_bytes());
            buf.reserve(rows.len() * cols * 4 + CHECKSUM_LEN);
            for row in rows {
                for x in row {
                    buf.extend_from_slice(&x.to_le_bytes());
                }
            }
        }
        ContentRef::Ids(ids) => {
            buf.push(KIND_IDS);
            buf.extend_from_slice(&shape_field(ids.len(), "rows")?.to_le_bytes());
            buf.extend_from_slice(&1u32.to_le_bytes());
            buf.reserve(ids.len() * 8 + CHECKSUM_LEN);
            for id in ids {
                buf.extend_from_slice(&id.to_le_bytes());
            }
        }
    }
    let checksum = xxh3_64(&buf);
    buf.extend_from_slice(&checksum.to_le_bytes());
    Ok(buf)
}

/// Decode a content file. `path` is only used for error messages.
pub fn decode(path: &Path, data: &[u8]) -> Result<ContentArray> {
    let corrupt = |reason: String| AntError::CorruptContent {
        path: path.to_path_buf(),
        reason,
    };

    if data.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(corrupt(format!("file too short ({} bytes)", data.len())));
    }
    if &data[..4] != MAGIC {
        return Err(corrupt("bad magic".into()));
    }

    let (body, tail) = data.split_at(data.len() - CHECKSUM_LEN);
    let stored = u64::from_le_bytes(read_array(tail));
    let computed = xxh3_64(body);
    if stored != computed {
        return Err(AntError::ChecksumMismatch {
            expected: stored,
            actual: computed,
        });
    }

    let kind = body[4];
    let rows = u32::from_le_bytes(read_array(&body[5..9])) as usize;
    let cols = u32::from_le_bytes(read_array(&body[9..13])) as usize;
    let payload = &body[HEADER_LEN..];

    match kind {
        KIND_VECTORS => {
            let expected = rows
                .checked_mul(cols)
                .and_then(|n| n.checked_mul(4))
                .ok_or_else(|| corrupt(format!("matrix shape {rows}x{cols} overflows")))?;
            if payload.len() != expected {
                return Err(corrupt(format!(
                    "expected {expected} payload bytes for a {rows}x{cols} matrix, found {}",
                    payload.len()
                )));
            }
            let values: Vec<f32> = payload
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes(read_array(b)))
                .collect();
            let vectors = if cols == 0 {
                vec![Vec::new(); rows]
            } else {
                values.chunks_exact(cols).map(|c| c.to_vec()).collect()
            };
            Ok(ContentArray::Vectors(vectors))
        }
        KIND_IDS => {
            if cols != 1 || rows.checked_mul(8) != Some(payload.len()) {
                return Err(corrupt(format!(
                    "id column has shape {rows}x{cols} and {} payload bytes",
                    payload.len()
                )));
            }
            Ok(ContentArray::Ids(
                payload
                    .chunks_exact(8)
                    .map(|b| i64::from_le_bytes(read_array(b)))
                    .collect(),
            ))
        }
        other => Err(corrupt(format!("unknown array kind {other}"))),
    }
}

/// Write `array` under `<version_dir>/<dumps_dir>/` and return the
/// reference stored in the log line (relative to `version_dir`).
pub fn write_content(version_dir: &Path, dumps_dir: &str, array: ContentRef<'_>) -> Result<String> {
    let dir = version_dir.join(dumps_dir);
    fs::create_dir_all(&dir)?;

    let reference = format!("{dumps_dir}/{}.arr", Ulid::new());
    let mut file = File::create(version_dir.join(&reference))?;
    file.write_all(&encode(array)?)?;
    file.sync_all()?;
    Ok(reference)
}

/// Read a content file by its log reference.
pub fn read_content(version_dir: &Path, reference: &str) -> Result<ContentArray> {
    let relative = Path::new(reference);
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(AntError::CorruptContent {
            path: relative.to_path_buf(),
            reason: "content reference must stay inside the version directory".into(),
        });
    }
    let path = version_dir.join(relative);
    let data = fs::read(&path).map_err(|e| AntError::CorruptContent {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    decode(&path, &data)
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}
