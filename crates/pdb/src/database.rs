//! The database facade (§4.H): manifest, ingest (sequential and parallel), and query dispatch,
//! generic over whichever physical row format (`E`) the partition was created with.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use pdb_entry::format::PackedEntry;
use pdb_entry::{Entry, GameResult, Level, RowStats};
use pdb_storage::{Partition, PipelineConfig, Selector as StorageSelector};
use tokio::sync::Mutex as AsyncMutex;
use tracing::info;

use crate::error::{PdbError, Result};
use crate::header_store::{HeaderStores, PackedGameHeader};
use crate::ingest::{self, entries_for_game, header_for_game, pack_entries, IngestStats};
use crate::manifest::{self, DbKey};
use crate::query::{buckets_from_stats, groups_from_retractions, GameSummary, PositionResult, Request, Response, SelectorRequest};

/// Progress callback shape shared with [`pdb_storage::partition::Partition::merge_all`]
/// (§4.G `progressCb`).
pub type MergeProgress<'a> = &'a mut dyn FnMut(usize, usize);

/// How many logical entries to accumulate per buffer before handing it to the pipeline (§4.F).
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Summary returned by [`Database::verify`] (§6 `verify`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub files_checked: usize,
    pub entries_checked: usize,
}

/// Summary returned by [`Database::info`] (§6 `info`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InfoReport {
    pub files: usize,
    pub entries: usize,
    pub human_games: u32,
    pub engine_games: u32,
    pub server_games: u32,
}

/// The position database facade (§4.H). `E` is the physical row format this instance's
/// partition is built from — callers pick one concrete format (e.g.
/// [`pdb_entry::format::beta::Beta`]) per database directory, matching the `dbKey` recorded in
/// its manifest.
pub struct Database<E: PackedEntry + RowStats> {
    dbkey: DbKey,
    partition: Partition<E>,
    header_stores: AsyncMutex<HeaderStores>,
    next_game_index: AtomicU32,
}

impl<E: PackedEntry + RowStats> Database<E> {
    /// Initializes a brand-new, empty database at `dir` (§6 `create`).
    pub async fn create(dir: impl Into<PathBuf>, dbkey: DbKey, pipeline_config: PipelineConfig) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        manifest::write(&dir, dbkey)?;
        Self::open_internal(dir, dbkey, pipeline_config).await
    }

    /// Opens an existing database at `dir`, checking its manifest names `dbkey` (§6 `open`).
    pub async fn open(dir: impl Into<PathBuf>, dbkey: DbKey, pipeline_config: PipelineConfig) -> Result<Self> {
        let dir = dir.into();
        manifest::open(&dir, dbkey)?;
        Self::open_internal(dir, dbkey, pipeline_config).await
    }

    async fn open_internal(dir: PathBuf, dbkey: DbKey, pipeline_config: PipelineConfig) -> Result<Self> {
        let partition = Partition::open(&dir, pipeline_config).await?;
        let header_stores = HeaderStores::open(&dir)?;
        let next_game_index = header_stores.human.len() + header_stores.engine.len() + header_stores.server.len();

        Ok(Database {
            dbkey,
            partition,
            header_stores: AsyncMutex::new(header_stores),
            next_game_index: AtomicU32::new(next_game_index),
        })
    }

    pub fn dbkey(&self) -> DbKey {
        self.dbkey
    }

    /// Sequential ingest: reads every BCGN file in `sources` in order, replaying each game's
    /// moves into entries and buffering them for the pipeline (§4.H "Ingest (sequential)").
    pub async fn ingest_sequential(
        &self,
        sources: &[PathBuf],
        level: Level,
        buffer_size: usize,
    ) -> Result<IngestStats> {
        let mut totals = IngestStats::default();
        let mut buffer: Vec<Entry> = Vec::with_capacity(buffer_size);

        for path in sources {
            let mut reader = match bcgn::Reader::open(path).await {
                Ok(reader) => reader,
                Err(e) => return Err(PdbError::Bcgn(e)),
            };

            loop {
                match reader.next_game().await {
                    Ok(Some(game)) => {
                        let game_index = self.next_game_index.fetch_add(1, Ordering::SeqCst);
                        let entries = entries_for_game(&game, game_index, level);
                        totals.record_ingested(entries.len());
                        buffer.extend(entries);

                        let (idx, header, ply_count) = header_for_game(&game, game_index);
                        let packed = PackedGameHeader::from_game_header(idx, &header, ply_count);
                        self.header_stores.lock().await.store_for(level).append(&packed)?;

                        if buffer.len() >= buffer_size {
                            let batch: Vec<E> = pack_entries(&std::mem::take(&mut buffer));
                            self.partition.store_unordered(batch).await;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        // The record's length prefix has already been consumed into `reader`'s
                        // window but its contents didn't parse; there is no reliable resync
                        // point, so this file's remaining games cannot be read (§7: recorded and
                        // skipped, scoped to the one failing game here since we cannot locate
                        // the next record boundary).
                        ingest::log_skip(path, &e);
                        totals.record_skip();
                        break;
                    }
                }
            }
        }

        if !buffer.is_empty() {
            let batch: Vec<E> = pack_entries(&buffer);
            self.partition.store_unordered(batch).await;
        }
        self.partition.collect_future_files().await?;
        Ok(totals)
    }

    /// Parallel ingest: splits `sources` into `workers` chunks, each ingested by its own task
    /// against the same partition (§4.H "Ingest (parallel)"). The partition's atomic id counter
    /// already gives every worker's output files distinct, monotonically-registered ids, so no
    /// separate per-worker id-range reservation is needed (see `DESIGN.md`).
    pub async fn ingest_parallel(
        self: &Arc<Self>,
        sources: &[PathBuf],
        level: Level,
        workers: usize,
        buffer_size: usize,
    ) -> Result<IngestStats>
    where
        E: 'static,
    {
        let chunks = ingest::chunk_paths(sources, workers);
        let mut handles = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let db = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                db.ingest_sequential(&chunk, level, buffer_size).await
            }));
        }

        let mut totals = IngestStats::default();
        for handle in handles {
            let result = handle.await.map_err(|_| PdbError::WorkerAborted)??;
            ingest::fold(&mut totals, result);
        }
        Ok(totals)
    }

    /// Builds this format's query key for `position`'s 128-bit Zobrist hash, by round-tripping a
    /// dummy [`Entry`] through `E::pack_rows` — reusing each format's own hash-truncation logic
    /// instead of duplicating it here. Every row `pack_rows` returns for one entry shares the
    /// same `key_hash`, so the first is enough.
    fn key_for(position: &chess_engine::Position) -> u128 {
        let probe = Entry::single(position.zobrist_hash128(), 0, Level::Human, GameResult::Unknown, 0, 0);
        E::pack_rows(&probe).first().expect("pack_rows always yields at least one row").key_hash()
    }

    /// Dispatches every requested position independently; one position's failure does not
    /// poison the rest of the response (§7 "Query errors are reported per sub-query").
    pub async fn query(&self, request: &Request) -> Response {
        let mut results = Vec::with_capacity(request.positions.len());
        for position_query in &request.positions {
            results.push(self.query_one(position_query).await);
        }
        Response { results }
    }

    async fn query_one(&self, query: &crate::query::PositionQuery) -> PositionResult {
        let mut result = PositionResult::default();

        let position = match crate::query::parse_position(&query.fen) {
            Ok(p) => p,
            Err(e) => {
                result.errors.push(e.to_string());
                return result;
            }
        };
        let key = Self::key_for(&position);

        for selector in &query.selectors {
            match selector {
                SelectorRequest::Transpositions => {
                    let mut stats = pdb_storage::PositionStats::new();
                    match self.partition.execute_query(key, StorageSelector::Transposition, &mut stats).await {
                        Ok(()) => {
                            let mut buckets = buckets_from_stats(&stats, StorageSelector::Transposition);
                            if query.with_headers {
                                self.attach_headers(&mut buckets).await;
                            }
                            result.transpositions = buckets;
                        }
                        Err(e) => result.errors.push(e.to_string()),
                    }
                }
                SelectorRequest::Retractions => match self.partition.query_retractions(key).await {
                    Ok(groups) => result.retractions = groups_from_retractions(&groups),
                    Err(e) => result.errors.push(e.to_string()),
                },
            }
        }

        result
    }

    async fn attach_headers(&self, buckets: &mut [crate::query::ResultBucket]) {
        let mut stores = self.header_stores.lock().await;
        for bucket in buckets.iter_mut() {
            let level = match bucket.level.as_str() {
                "human" => Level::Human,
                "engine" => Level::Engine,
                _ => Level::Server,
            };
            let store = stores.store_for(level);
            bucket.first_game_header = store.get(bucket.first_game).ok().flatten().map(GameSummary::from);
            bucket.last_game_header = store.get(bucket.last_game).ok().flatten().map(GameSummary::from);
        }
    }

    /// Compacts every file in this partition into one (§6 `merge`).
    pub async fn merge(&self, progress: impl FnMut(usize, usize)) -> Result<Option<u64>> {
        Ok(self.partition.merge_all(progress).await?)
    }

    /// Reads every file's rows back and checks the ascending-under-`Full` invariant (§6
    /// `verify`, §8 "F is strictly ascending under LessFull").
    pub async fn verify(&self) -> Result<VerifyReport> {
        let mut report = VerifyReport::default();
        for file in self.partition.files().await {
            let rows = file.scan()?;
            for (i, window) in rows.windows(2).enumerate() {
                if pdb_entry::Comparator::Full.compare(&window[0], &window[1]) != std::cmp::Ordering::Less {
                    return Err(PdbError::Storage(pdb_storage::StorageError::NonMonotoneFile(
                        report.entries_checked + i,
                    )));
                }
            }
            report.entries_checked += rows.len();
            report.files_checked += 1;
        }
        Ok(report)
    }

    /// Counts and sizes, for `info` (§6).
    pub async fn info(&self) -> InfoReport {
        let files = self.partition.files().await;
        let entries = files.iter().map(|f| f.len()).sum();
        let stores = self.header_stores.lock().await;
        InfoReport {
            files: files.len(),
            entries,
            human_games: stores.human.len(),
            engine_games: stores.engine.len(),
            server_games: stores.server.len(),
        }
    }

    /// Shuts down the pipeline cleanly, draining any in-flight buffers (§4.F, §6 `close`).
    pub async fn close(self) {
        self.partition.shutdown().await;
    }
}

/// Deletes every file under `path` (§6 `destroy`). The database must already be closed — this
/// is a bare recursive delete, not a partition operation, matching the CLI's `destroy` semantics
/// of wiping the whole directory rather than leaving the manifest behind.
pub fn destroy(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_dir_all(path)?;
    }
    info!(path = %path.display(), "destroyed database directory");
    Ok(())
}
