//! Command-line driver for the position database (§6), a thin `main.rs` over the `pdb` library
//! crate following how the `tmttn-chess` binaries are structured (`#[tokio::main] async fn main()`
//! plus `tracing_subscriber::fmt::init`, with failures mapped to process exit codes rather than
//! propagated as `anyhow::Error`, since the CLI surface defines specific codes per §6/§7).

mod config;
mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use pdb::{Database, DbKey};
use pdb_entry::format::beta::Beta;
use pdb_entry::format::delta::Delta;
use pdb_entry::format::epsilon::Row as Epsilon;
use pdb_entry::{Level, PackedEntry, RowStats};

use config::CliConfig;
use error::CliError;

#[derive(Parser)]
#[command(name = "pdb-cli")]
#[command(about = "Position database: ingest chess games and query aggregated position stats")]
struct Cli {
    /// Ambient configuration file (§1.1); defaults to `./pdb.toml` if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Increase log verbosity (repeatable); overridden by `RUST_LOG` if set.
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize an empty database.
    Create { db_key: String, path: PathBuf },
    /// Load the manifest and report which format the database was created with.
    Open { path: PathBuf },
    /// Ingest one or more BCGN files.
    Import {
        path: PathBuf,
        sources: Vec<PathBuf>,
        /// Which header store to append to: human, engine, or server.
        #[arg(long, default_value = "human")]
        level: String,
        /// Number of parallel ingest workers (files are split across them).
        #[arg(long)]
        threads: Option<usize>,
        /// Approximate number of entries buffered per flush, overriding `pdb.toml`.
        #[arg(long)]
        memory: Option<usize>,
    },
    /// Run a JSON query request (read from a file, or `-` for stdin) and print the JSON response.
    Query { path: PathBuf, request: PathBuf },
    /// Compact every file in the partition into one.
    Merge { path: PathBuf },
    /// Read every file back and check the ascending-under-`Full` invariant.
    Verify { path: PathBuf },
    /// Print file and game counts.
    Info { path: PathBuf },
    /// Delete every file under `path`.
    Destroy { path: PathBuf },
    /// Attach, then shut the pipeline down cleanly.
    Close { path: PathBuf },
}

fn init_logging(verbose: u8) {
    let filter = if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        tracing_subscriber::EnvFilter::new(format!("pdb_cli={level},pdb={level},pdb_storage={level}"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn parse_level(s: &str) -> Result<Level, CliError> {
    match s {
        "human" => Ok(Level::Human),
        "engine" => Ok(Level::Engine),
        "server" => Ok(Level::Server),
        other => Err(CliError::InvalidArgument(format!(
            "unknown level {other:?}; expected human, engine, or server"
        ))),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("{}: {e}", e.tag());
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = CliConfig::load(cli.config.as_deref())?;

    if let Command::Create { db_key, path } = &cli.command {
        let key = DbKey::from_str(db_key)
            .ok_or_else(|| CliError::InvalidArgument(format!("unknown db key {db_key:?}")))?;
        return create(key, path, &config).await;
    }

    let path = command_path(&cli.command);
    let key = pdb::peek_db_key(path).map_err(pdb::PdbError::Manifest)?;
    match key {
        DbKey::Beta => dispatch::<Beta>(cli.command, key, &config).await,
        DbKey::Delta => dispatch::<Delta>(cli.command, key, &config).await,
        DbKey::Epsilon | DbKey::EpsilonSmearedA => dispatch::<Epsilon>(cli.command, key, &config).await,
    }
}

fn command_path(command: &Command) -> &Path {
    match command {
        Command::Create { path, .. }
        | Command::Open { path }
        | Command::Import { path, .. }
        | Command::Query { path, .. }
        | Command::Merge { path }
        | Command::Verify { path }
        | Command::Info { path }
        | Command::Destroy { path }
        | Command::Close { path } => path,
    }
}

async fn create(key: DbKey, path: &Path, config: &CliConfig) -> Result<(), CliError> {
    match key {
        DbKey::Beta => {
            Database::<Beta>::create(path, key, config.pipeline_config())
                .await
                .map_err(CliError::Db)?
                .close()
                .await;
        }
        DbKey::Delta => {
            Database::<Delta>::create(path, key, config.pipeline_config())
                .await
                .map_err(CliError::Db)?
                .close()
                .await;
        }
        DbKey::Epsilon | DbKey::EpsilonSmearedA => {
            Database::<Epsilon>::create(path, key, config.pipeline_config())
                .await
                .map_err(CliError::Db)?
                .close()
                .await;
        }
    }
    println!("created {} ({})", path.display(), key.as_str());
    Ok(())
}

/// Runs every non-`create` subcommand against a database opened as `Database<E>`, once the
/// manifest has told the caller which concrete row format `E` to pick.
async fn dispatch<E: PackedEntry + RowStats + 'static>(
    command: Command,
    key: DbKey,
    config: &CliConfig,
) -> Result<(), CliError> {
    match command {
        Command::Create { .. } => unreachable!("handled in run() before key detection"),
        Command::Open { path } => {
            pdb::peek_db_key(&path).map_err(pdb::PdbError::Manifest)?;
            println!("{}", key.as_str());
            Ok(())
        }
        Command::Import { path, sources, level, threads, memory } => {
            let level = parse_level(&level)?;
            let buffer_size = memory.unwrap_or(config.ingest_buffer_size);
            let workers = threads.unwrap_or(config.ingest_workers);
            let db = Database::<E>::open(&path, key, config.pipeline_config())
                .await
                .map_err(CliError::Db)?;
            let stats = if workers <= 1 {
                let stats = db.ingest_sequential(&sources, level, buffer_size).await.map_err(CliError::Db)?;
                db.close().await;
                stats
            } else {
                let db = Arc::new(db);
                db.ingest_parallel(&sources, level, workers, buffer_size).await.map_err(CliError::Db)?
            };
            println!(
                "ingested {} games, skipped {}, indexed {} positions",
                stats.games_ingested, stats.games_skipped, stats.positions_indexed
            );
            Ok(())
        }
        Command::Query { path, request } => {
            let text = read_request(&request)?;
            let request: pdb::Request = serde_json::from_str(&text)
                .map_err(|e| CliError::InvalidArgument(format!("invalid query JSON: {e}")))?;
            let db = Database::<E>::open(&path, key, config.pipeline_config())
                .await
                .map_err(CliError::Db)?;
            let response = db.query(&request).await;
            db.close().await;
            println!("{}", serde_json::to_string(&response).expect("response always serializes"));
            Ok(())
        }
        Command::Merge { path } => {
            let db = Database::<E>::open(&path, key, config.pipeline_config())
                .await
                .map_err(CliError::Db)?;
            let merged = db
                .merge(|done, total| {
                    if total > 0 {
                        tracing::debug!(done, total, "merge progress");
                    }
                })
                .await
                .map_err(CliError::Db)?;
            db.close().await;
            match merged {
                Some(id) => println!("merged into file {id}"),
                None => println!("nothing to merge"),
            }
            Ok(())
        }
        Command::Verify { path } => {
            let db = Database::<E>::open(&path, key, config.pipeline_config())
                .await
                .map_err(CliError::Db)?;
            let report = db.verify().await.map_err(CliError::Db)?;
            db.close().await;
            println!(
                "{} files, {} entries, all ascending under Full",
                report.files_checked, report.entries_checked
            );
            Ok(())
        }
        Command::Info { path } => {
            let db = Database::<E>::open(&path, key, config.pipeline_config())
                .await
                .map_err(CliError::Db)?;
            let info = db.info().await;
            db.close().await;
            println!(
                "{} files, {} entries, {} human games, {} engine games, {} server games",
                info.files, info.entries, info.human_games, info.engine_games, info.server_games
            );
            Ok(())
        }
        Command::Destroy { path } => pdb::destroy(&path).map_err(CliError::Db),
        Command::Close { path } => {
            let db = Database::<E>::open(&path, key, config.pipeline_config())
                .await
                .map_err(CliError::Db)?;
            db.close().await;
            Ok(())
        }
    }
}

fn read_request(request: &Path) -> Result<String, CliError> {
    if request.as_os_str() == "-" {
        use std::io::Read;
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).map_err(pdb::PdbError::Io)?;
        Ok(buf)
    } else {
        std::fs::read_to_string(request).map_err(|e| CliError::Db(pdb::PdbError::Io(e)))
    }
}
