//! BCGN: a binary, random-skippable game container used as an ingestion source (§4.C).
//!
//! A BCGN file is a fixed 32-byte [`header::FileHeader`] followed by a sequence of
//! [`record`] game records, each self-delimited by a `totalLen` prefix. [`writer::Writer`]
//! and [`reader::Reader`] stream games in and out with a double-buffered background I/O task
//! each, so a caller can keep producing/consuming games without blocking on disk directly.

pub mod error;
pub mod header;
pub mod movetext;
pub mod position;
pub mod reader;
pub mod record;
pub mod writer;

pub use error::{BcgnError, Result};
pub use header::{CompLevel, FileHeader};
pub use reader::Reader;
pub use record::{Date, Eco, Game, GameHeader, Outcome};
pub use writer::Writer;
