use std::path::PathBuf;

use thiserror::Error;

use crate::types::VectorId;

#[derive(Error, Debug)]
pub enum AntError {
    // Directory / registry errors
    #[error("directory not found: {}", path.display())]
    DirectoryNotFound { path: PathBuf },

    #[error("instance already exists: {name}")]
    InstanceExists { name: String },

    #[error("instance not found: {name}")]
    InstanceNotFound { name: String },

    // Index errors
    #[error("index is not trained")]
    NotTrained,

    #[error("instance has not been built, call build first")]
    NotBuilt,

    #[error("instance is already built")]
    AlreadyBuilt,

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("duplicate id: {id}")]
    DuplicateId { id: VectorId },

    #[error("insufficient training data: need at least {required} vectors, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("length mismatch: {vectors} vectors but {ids} ids")]
    LengthMismatch { vectors: usize, ids: usize },

    // Persistence errors
    #[error("corrupt snapshot {}: {reason}", path.display())]
    CorruptSnapshot { path: PathBuf, reason: String },

    #[error("corrupt content file {}: {reason}", path.display())]
    CorruptContent { path: PathBuf, reason: String },

    #[error("corrupt log {} at line {line}: {reason}", path.display())]
    AofCorrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: u64, actual: u64 },

    // Write-mode errors
    #[error("invalid lock state: memory_lock={memory_lock}, aof_lock={aof_lock}")]
    InvalidLockState { memory_lock: bool, aof_lock: bool },

    #[error("backup already in progress for version {version}")]
    BackupInProgress { version: String },

    // Validation errors
    #[error("validation error: {0}")]
    Validation(String),

    // Config errors
    #[error("config error: {0}")]
    Config(String),

    // Serialization errors
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bincode serialization error: {0}")]
    Bincode(String),

    // IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<Box<bincode::ErrorKind>> for AntError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        AntError::Bincode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AntError>;

impl AntError {
    pub fn status_code(&self) -> u16 {
        match self {
            AntError::InstanceNotFound { .. } | AntError::DirectoryNotFound { .. } => 404,

            AntError::InstanceExists { .. }
            | AntError::AlreadyBuilt
            | AntError::DuplicateId { .. }
            | AntError::BackupInProgress { .. } => 409,

            AntError::NotBuilt
            | AntError::NotTrained
            | AntError::DimensionMismatch { .. }
            | AntError::InsufficientData { .. }
            | AntError::LengthMismatch { .. }
            | AntError::Validation(_) => 400,

            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_not_found_status_code() {
        let err = AntError::InstanceNotFound {
            name: "faces".into(),
        };
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_conflict_status_codes() {
        assert_eq!(
            AntError::InstanceExists {
                name: "faces".into()
            }
            .status_code(),
            409
        );
        assert_eq!(AntError::DuplicateId { id: 7 }.status_code(), 409);
        assert_eq!(AntError::AlreadyBuilt.status_code(), 409);
    }

    #[test]
    fn test_client_error_status_codes() {
        assert_eq!(AntError::NotBuilt.status_code(), 400);
        assert_eq!(
            AntError::DimensionMismatch {
                expected: 8,
                actual: 4
            }
            .status_code(),
            400
        );
        assert_eq!(
            AntError::InsufficientData {
                required: 4,
                actual: 1
            }
            .status_code(),
            400
        );
    }

    #[test]
    fn test_default_status_code() {
        let err = AntError::CorruptSnapshot {
            path: PathBuf::from("/tmp/FIF"),
            reason: "bad magic".into(),
        };
        assert_eq!(err.status_code(), 500);
        assert_eq!(AntError::Config("missing".into()).status_code(), 500);
        assert_eq!(AntError::Bincode("eof".into()).status_code(), 500);
        assert_eq!(AntError::Internal("join".into()).status_code(), 500);
    }

    #[test]
    fn test_display_formatting() {
        let err = AntError::DimensionMismatch {
            expected: 128,
            actual: 256,
        };
        let msg = err.to_string();
        assert!(msg.contains("128"));
        assert!(msg.contains("256"));

        let err = AntError::AofCorrupt {
            path: PathBuf::from("/data/v1/AOF"),
            line: 3,
            reason: "missing command".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/data/v1/AOF"));
        assert!(msg.contains("line 3"));
    }

    #[test]
    fn test_from_bincode_error() {
        let bincode_err: Box<bincode::ErrorKind> =
            Box::new(bincode::ErrorKind::Custom("test error".into()));
        let err: AntError = bincode_err.into();
        match &err {
            AntError::Bincode(msg) => assert!(msg.contains("test error")),
            other => panic!("expected Bincode, got {:?}", other),
        }
    }
}
