//! Crate-top error taxonomy (§7): unifies the manifest, BCGN, storage, and query error enums
//! behind one `#[from]`-propagating `PdbError`, the same role `GameError` plays over `SanError`
//! in `chess_engine::game`.

use thiserror::Error;

use crate::manifest::ManifestError;
use crate::query::QueryError;
use bcgn::BcgnError;
use pdb_storage::StorageError;

#[derive(Debug, Error)]
pub enum PdbError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Bcgn(#[from] BcgnError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("a parallel ingest worker panicked or was aborted")]
    WorkerAborted,
}

pub type Result<T> = std::result::Result<T, PdbError>;
