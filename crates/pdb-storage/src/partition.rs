//! A partition: a directory of immutable entry files with monotonic ids, plus the merge engine
//! and query dispatch over them (§4.G).

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pdb_entry::format::PackedEntry;
use pdb_entry::{Comparator, GameResult, Level, RowStats};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{PipelineError, Result, StorageError};
use crate::file::EntryFile;
use crate::pipeline::{FutureFile, Pipeline, PipelineConfig};
use crate::query::{PositionStats, RetractionStats, ResultStats, Selector};

const LOCK_FILE_NAME: &str = "LOCK";

/// An advisory lock held for the lifetime of an open [`Partition`] (§9: "prevents a second
/// process from opening the same partition directory concurrently").
///
/// Rust has no destructor-ordering surprises to work around here, so this is a plain RAII guard:
/// [`PartitionLock::acquire`] creates `<dir>/LOCK` with [`std::fs::OpenOptions::create_new`]
/// (fails if another session holds it), and `Drop` removes it.
struct PartitionLock {
    path: PathBuf,
}

impl PartitionLock {
    fn acquire(dir: &Path) -> Result<Self> {
        let path = dir.join(LOCK_FILE_NAME);
        std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    StorageError::Pipeline(PipelineError::LockHeld(path.clone()))
                }
                _ => StorageError::Io(e),
            })?;
        Ok(PartitionLock { path })
    }
}

impl Drop for PartitionLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove partition lock file");
        }
    }
}

/// A directory of entry files with monotonically allocated ids, the pipeline that produces them,
/// and the merge/query operations defined over the set (§4.G).
pub struct Partition<E: PackedEntry> {
    dir: PathBuf,
    _lock: PartitionLock,
    pipeline: Pipeline<E>,
    next_id: AtomicU64,
    /// Files that have finished sorting/writing and are ready to be queried.
    ready: RwLock<HashMap<u64, Arc<EntryFile<E>>>>,
    /// Ids allocated but still in flight through the pipeline.
    pending: RwLock<Vec<FutureFile<E>>>,
}

impl<E: PackedEntry + RowStats> Partition<E> {
    pub async fn open(dir: impl Into<PathBuf>, pipeline_config: PipelineConfig) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let lock = PartitionLock::acquire(&dir)?;

        let mut max_id = 0u64;
        let mut ready = HashMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == LOCK_FILE_NAME || name.ends_with(".idx") || name.ends_with(".tmp") {
                continue;
            }
            if let Ok(id) = name.parse::<u64>() {
                let file = EntryFile::open(&dir, id)?;
                max_id = max_id.max(id + 1);
                ready.insert(id, Arc::new(file));
            }
        }

        Ok(Partition {
            dir,
            _lock: lock,
            pipeline: Pipeline::start(pipeline_config),
            next_id: AtomicU64::new(max_id),
            ready: RwLock::new(ready),
            pending: RwLock::new(Vec::new()),
        })
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Writes `entries` as one new file directly, bypassing the pipeline (§4.G: "rare").
    pub async fn store_ordered(&self, entries: &[E]) -> Result<u64> {
        let id = self.next_id();
        let file = EntryFile::create(&self.dir, id, entries, self.pipeline.config().index_granularity)?;
        self.ready.write().await.insert(id, Arc::new(file));
        Ok(id)
    }

    /// Schedules `entries` through the async pipeline; returns the id immediately, the file
    /// itself resolves later (collected by [`Self::collect_future_files`]).
    pub async fn store_unordered(&self, entries: Vec<E>) -> u64 {
        let id = self.next_id();
        let future = self.pipeline.schedule_unordered(&self.dir, id, entries).await;
        self.pending.write().await.push(future);
        id
    }

    /// Waits for every outstanding [`FutureFile`] and moves it into the ready set (§4.G).
    pub async fn collect_future_files(&self) -> Result<()> {
        let pending = std::mem::take(&mut *self.pending.write().await);
        for future in pending {
            let id = future.id();
            let file = future.wait().await?;
            self.ready.write().await.insert(id, file);
        }
        Ok(())
    }

    pub async fn file_count(&self) -> usize {
        self.ready.read().await.len()
    }

    /// Returns every sealed file currently in this partition, for callers that need to inspect
    /// them directly (e.g. `pdb`'s `verify`/`info` commands, §6).
    pub async fn files(&self) -> Vec<Arc<EntryFile<E>>> {
        self.ready.read().await.values().cloned().collect()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// K-way merges every ready file into a single new file in this partition, then deletes the
    /// inputs (§4.G).
    ///
    /// This workspace implements the single-round form of the merge plan: every ready file is
    /// merged in one pass rather than the temp-dir-capacity-bounded multi-round plan, since the
    /// async pipeline already bounds peak memory via its buffer pool. See `DESIGN.md`.
    pub async fn merge_all(&self, progress: impl FnMut(usize, usize)) -> Result<Option<u64>> {
        let inputs: Vec<Arc<EntryFile<E>>> = self.ready.read().await.values().cloned().collect();
        if inputs.len() <= 1 {
            return Ok(inputs.first().map(|f| f.id()));
        }

        let merged_id = self.next_id();
        let merged = merge_files(&self.dir, merged_id, &inputs, self.pipeline.config().index_granularity, progress)?;

        let mut ready = self.ready.write().await;
        for input in &inputs {
            ready.remove(&input.id());
        }
        ready.insert(merged_id, Arc::new(merged));
        drop(ready);

        for input in &inputs {
            EntryFile::<E>::delete(&self.dir, input.id())
                .map_err(StorageError::Io)
                .unwrap_or_else(|e| warn!(error = %e, "failed to remove merged-away input file"));
        }
        info!(output = merged_id, inputs = inputs.len(), "merged partition files");
        Ok(Some(merged_id))
    }

    /// Like [`Self::merge_all`] but writes the merged output to `dest` and leaves this
    /// partition's files untouched.
    pub async fn replicate_merge_all(&self, dest: &Path, progress: impl FnMut(usize, usize)) -> Result<Option<u64>> {
        std::fs::create_dir_all(dest)?;
        let inputs: Vec<Arc<EntryFile<E>>> = self.ready.read().await.values().cloned().collect();
        if inputs.is_empty() {
            return Ok(None);
        }
        let merged = merge_files(dest, 0, &inputs, self.pipeline.config().index_granularity, progress)?;
        Ok(Some(merged.id()))
    }

    /// Scans every ready file's `range(key)` for `selector` and folds matching rows into `stats`
    /// (§4.G `executeQuery`).
    pub async fn execute_query(
        &self,
        key_hash: u128,
        selector: Selector,
        stats: &mut PositionStats,
    ) -> Result<()> {
        let files: Vec<Arc<EntryFile<E>>> = self.ready.read().await.values().cloned().collect();
        for file in files {
            let (start, end) = file.range(key_hash)?;
            if start == end {
                continue;
            }
            let rows = file.read_range(start, end)?;
            for entry in E::group(&rows) {
                let matches = match selector {
                    Selector::Transposition => true,
                    Selector::Exact { reverse_move } => entry.reverse_move == reverse_move,
                };
                if matches {
                    stats.add(selector, &entry);
                }
            }
        }
        Ok(())
    }

    /// Enumerates every row whose `key_hash()` matches `key_hash` (reverse-move portion ignored),
    /// grouped by reverse move (§4.G `queryRetractions`).
    pub async fn query_retractions(&self, key_hash: u128) -> Result<Vec<RetractionStats>> {
        let mut by_move: HashMap<(u32, Level, GameResult), ResultStats> = HashMap::new();
        let files: Vec<Arc<EntryFile<E>>> = self.ready.read().await.values().cloned().collect();
        for file in files {
            let (start, end) = file.range(key_hash)?;
            if start == end {
                continue;
            }
            for entry in E::group(&file.read_range(start, end)?) {
                by_move
                    .entry((entry.reverse_move, entry.level, entry.result))
                    .or_default()
                    .add(&entry);
            }
        }
        Ok(by_move
            .into_iter()
            .map(|((reverse_move, level, result), stats)| RetractionStats {
                reverse_move,
                level,
                result,
                stats,
            })
            .collect())
    }

    pub async fn shutdown(self) {
        self.pipeline.shutdown().await;
    }
}

/// K-way merges `inputs` into a single new file with id `id` under `dir`, calling `progress`
/// with `(entries written so far, total entries)` as it goes (§4.G).
fn merge_files<E: PackedEntry>(
    dir: &Path,
    id: u64,
    inputs: &[Arc<EntryFile<E>>],
    index_granularity: usize,
    mut progress: impl FnMut(usize, usize),
) -> Result<EntryFile<E>> {
    struct Cursor<E: PackedEntry> {
        rows: Vec<E>,
        pos: usize,
    }

    struct HeapItem<E: PackedEntry> {
        row: E,
        source: usize,
    }
    impl<E: PackedEntry> PartialEq for HeapItem<E> {
        fn eq(&self, other: &Self) -> bool {
            Comparator::Full.eq(&self.row, &other.row)
        }
    }
    impl<E: PackedEntry> Eq for HeapItem<E> {}
    impl<E: PackedEntry> PartialOrd for HeapItem<E> {
        fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
            Some(self.cmp(other))
        }
    }
    impl<E: PackedEntry> Ord for HeapItem<E> {
        fn cmp(&self, other: &Self) -> std::cmp::Ordering {
            Comparator::Full.compare(&self.row, &other.row)
        }
    }

    let total: usize = inputs.iter().map(|f| f.len()).sum();
    let mut cursors: Vec<Cursor<E>> = inputs
        .iter()
        .map(|f| f.scan().map(|rows| Cursor { rows, pos: 0 }))
        .collect::<Result<_>>()?;

    let mut heap: BinaryHeap<Reverse<HeapItem<E>>> = BinaryHeap::new();
    for (source, cursor) in cursors.iter().enumerate() {
        if let Some(&row) = cursor.rows.first() {
            heap.push(Reverse(HeapItem { row, source }));
        }
    }

    let mut output = Vec::with_capacity(total);
    let mut written = 0usize;
    while let Some(Reverse(HeapItem { row, source })) = heap.pop() {
        cursors[source].pos += 1;
        if let Some(&next) = cursors[source].rows.get(cursors[source].pos) {
            heap.push(Reverse(HeapItem { row: next, source }));
        }

        // Coalesce every other head equal to `row` under `Full` before committing it (§4.G).
        let mut merged = row;
        while let Some(Reverse(top)) = heap.peek() {
            if Comparator::Full.eq(&top.row, &merged) {
                let Reverse(top) = heap.pop().unwrap();
                merged = merged.combine(&top.row);
                cursors[top.source].pos += 1;
                if let Some(&next) = cursors[top.source].rows.get(cursors[top.source].pos) {
                    heap.push(Reverse(HeapItem { row: next, source: top.source }));
                }
            } else {
                break;
            }
        }

        output.push(merged);
        written += 1;
        progress(written, total);
    }

    EntryFile::create(dir, id, &output, index_granularity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdb_entry::format::beta::Beta;
    use pdb_entry::{Entry, GameResult, Level};

    fn row(hash_lo: u64, rm: u32, count: u32) -> Beta {
        Beta::from_entry(&Entry {
            hash: (0, hash_lo),
            reverse_move: rm,
            level: Level::Human,
            result: GameResult::Draw,
            count: count as u64,
            elo_diff: 0,
            first_game: 0,
            last_game: 0,
        })
    }

    #[tokio::test]
    async fn merge_all_combines_equal_keys_across_files() {
        let dir = tempfile::tempdir().unwrap();
        let partition = Partition::<Beta>::open(dir.path(), PipelineConfig::default()).await.unwrap();

        let a = vec![row(1, 0, 2), row(2, 0, 1)];
        let b = vec![row(1, 0, 3), row(3, 0, 1)];
        partition.store_unordered(a).await;
        partition.store_unordered(b).await;
        partition.collect_future_files().await.unwrap();
        assert_eq!(partition.file_count().await, 2);

        partition.merge_all(|_, _| {}).await.unwrap();
        assert_eq!(partition.file_count().await, 1);

        let mut stats = PositionStats::new();
        let key = row(1, 0, 0).key_hash();
        partition.execute_query(key, Selector::Transposition, &mut stats).await.unwrap();
        assert_eq!(stats.get(Selector::Transposition, Level::Human, GameResult::Draw).count, 5);

        partition.shutdown().await;
    }

    #[tokio::test]
    async fn query_retractions_groups_by_reverse_move() {
        let dir = tempfile::tempdir().unwrap();
        let partition = Partition::<Beta>::open(dir.path(), PipelineConfig::default()).await.unwrap();
        partition.store_unordered(vec![row(1, 5, 1), row(1, 9, 1)]).await;
        partition.collect_future_files().await.unwrap();

        let groups = partition.query_retractions(row(1, 0, 0).key_hash()).await.unwrap();
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().any(|g| g.reverse_move == 5));
        assert!(groups.iter().any(|g| g.reverse_move == 9));

        partition.shutdown().await;
    }

    #[tokio::test]
    async fn reopening_a_partition_discovers_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        {
            let partition = Partition::<Beta>::open(dir.path(), PipelineConfig::default()).await.unwrap();
            partition.store_unordered(vec![row(1, 0, 1)]).await;
            partition.collect_future_files().await.unwrap();
            partition.shutdown().await;
        }
        let partition = Partition::<Beta>::open(dir.path(), PipelineConfig::default()).await.unwrap();
        assert_eq!(partition.file_count().await, 1);
        partition.shutdown().await;
    }

    #[tokio::test]
    async fn opening_a_locked_partition_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let first = Partition::<Beta>::open(dir.path(), PipelineConfig::default()).await.unwrap();
        let err = Partition::<Beta>::open(dir.path(), PipelineConfig::default()).await.unwrap_err();
        assert!(matches!(err, StorageError::Pipeline(PipelineError::LockHeld(_))));
        first.shutdown().await;
    }
}
