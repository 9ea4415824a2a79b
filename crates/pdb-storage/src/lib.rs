//! Range-indexed immutable entry files, the async store pipeline, and the partition/merge engine
//! that sit underneath the [`pdb`](../pdb/index.html) database facade (§4.E, §4.F, §4.G).
//!
//! - [`index::RangeIndex`] + [`file::EntryFile`]: a sorted, on-disk array of [`pdb_entry`] rows
//!   with a sparse key→offset index for O(log N) bounded-range lookups.
//! - [`pipeline::Pipeline`]: sort workers + a single writer, connected by bounded channels and a
//!   recycled buffer pool, turning unsorted row buffers into sealed files.
//! - [`partition::Partition`]: owns a directory of sealed files under monotonic ids, runs the
//!   k-way merge, and answers position/retraction queries across every file it holds.

pub mod error;
pub mod file;
pub mod index;
pub mod partition;
pub mod pipeline;
pub mod query;

pub use error::{PipelineError, Result, StorageError};
pub use file::EntryFile;
pub use index::RangeIndex;
pub use partition::Partition;
pub use pipeline::{FutureFile, Pipeline, PipelineConfig};
pub use query::{PositionStats, ResultStats, RetractionStats, Selector};
