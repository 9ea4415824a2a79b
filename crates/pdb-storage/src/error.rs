//! The storage/pipeline error taxonomy (§7 "Storage" and "Concurrency" groups).

use std::path::PathBuf;

use thiserror::Error;

/// Pipeline- and partition-locking failures (§7 "Concurrency").
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline has shut down and can no longer accept work")]
    ShutDown,
    #[error("partition lock at {0} is held by another process or session")]
    LockHeld(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Entry-file and partition failures (§7 "Storage").
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("entry file checksum mismatch")]
    ChecksumMismatch,
    #[error("entry file is not strictly ascending under LessFull at offset {0}")]
    NonMonotoneFile(usize),
    #[error("file id {0} is already present in this partition")]
    FileIdCollision(u64),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

pub type Result<T> = std::result::Result<T, StorageError>;
