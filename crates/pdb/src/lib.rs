//! The position database facade: wires a partition's physical row format, manifest, header
//! stores, and ingest/query operations into one [`Database`] type (§4.H).
//!
//! This crate does not pick a row format for you — [`Database<E>`] is generic over any
//! `E: pdb_entry::format::PackedEntry + pdb_entry::RowStats`
//! ([`pdb_entry::format::beta::Beta`], [`pdb_entry::format::delta::Delta`], or the smeared
//! [`pdb_entry::format::epsilon::Row`]; the smeared format's rows are grouped back into whole
//! logical entries via `RowStats::group` before query code ever sees them). `pdb-cli` reads back
//! which concrete format an existing database uses via [`peek_db_key`], so only its `create`
//! subcommand needs the format named explicitly.

mod database;
mod error;
mod header_store;
mod ingest;
mod manifest;
mod query;

pub use database::{destroy, Database, InfoReport, VerifyReport, DEFAULT_BUFFER_SIZE};
pub use error::{PdbError, Result};
pub use header_store::{HeaderStore, HeaderStores, PackedGameHeader};
pub use ingest::{entries_for_game, pack_entries, GameRecord, IngestStats, NULL_REVERSE_MOVE};
pub use manifest::{peek_db_key, DbKey};
pub use query::{
    GameSummary, PositionQuery, PositionResult, QueryError, Request, ResultBucket, RetractionGroup,
    Response, SelectorRequest,
};

pub use pdb_storage::PipelineConfig;
