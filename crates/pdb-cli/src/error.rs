//! Maps failures to the CLI's exit codes (§6 "Exit codes: 0 success; 2 manifest mismatch; 3
//! corrupt input; 4 I/O error; 5 invalid argument").

use pdb::PdbError;
use pdb_storage::{PipelineError, StorageError};

/// Everything a subcommand can fail with, tagged the way the CLI prints it to stderr
/// (`<tag>: <message>`) before exiting with [`CliError::exit_code`].
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Db(#[from] PdbError),
    #[error("{0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Db(PdbError::Manifest(_)) => 2,
            CliError::Db(PdbError::Bcgn(_)) => 3,
            CliError::Db(PdbError::Storage(StorageError::ChecksumMismatch))
            | CliError::Db(PdbError::Storage(StorageError::NonMonotoneFile(_)))
            | CliError::Db(PdbError::Storage(StorageError::FileIdCollision(_))) => 3,
            CliError::Db(PdbError::Storage(StorageError::Io(_)))
            | CliError::Db(PdbError::Storage(StorageError::Pipeline(PipelineError::Io(_))))
            | CliError::Db(PdbError::Io(_)) => 4,
            CliError::Db(PdbError::Storage(StorageError::Pipeline(PipelineError::LockHeld(_))))
            | CliError::Db(PdbError::Storage(StorageError::Pipeline(PipelineError::ShutDown)))
            | CliError::Db(PdbError::WorkerAborted) => 4,
            CliError::Db(PdbError::Query(_)) => 5,
            CliError::InvalidArgument(_) => 5,
            CliError::Config(_) => 4,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            CliError::Db(PdbError::Manifest(_)) => "manifest",
            CliError::Db(PdbError::Bcgn(_)) => "input",
            CliError::Db(PdbError::Storage(_)) => "storage",
            CliError::Db(PdbError::Query(_)) => "query",
            CliError::Db(PdbError::Io(_)) => "io",
            CliError::Db(PdbError::WorkerAborted) => "concurrency",
            CliError::InvalidArgument(_) => "argument",
            CliError::Config(_) => "config",
        }
    }
}
