//! Async store pipeline: sort workers + a single writer, both backed by a recycled buffer pool
//! (§4.F).
//!
//! The C++ original threads three bounded FIFOs through condition variables and a destructor
//! that drains them; here the FIFOs are `tokio::sync::mpsc` channels, the sort/write stages are
//! `tokio::spawn`ed tasks, and shutdown is plain drop: closing the channel senders lets each task
//! see its receiver return `None` and exit, and [`Pipeline::shutdown`] just awaits their
//! `JoinHandle`s.

use std::sync::Arc;

use pdb_entry::format::PackedEntry;
use pdb_entry::Comparator;
use tokio::sync::{mpsc, oneshot, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result, StorageError};
use crate::file::EntryFile;

/// Tuning knobs for a [`Pipeline`] (§4.F).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Depth of the sort and write channels.
    pub queue_depth: usize,
    /// Number of concurrent sort-worker tasks.
    pub sort_workers: usize,
    /// Number of reusable buffers in the pool; bounds peak memory use.
    pub buffer_pool_size: usize,
    /// Sparse index granularity passed to every file this pipeline writes.
    pub index_granularity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            queue_depth: 4,
            sort_workers: 2,
            buffer_pool_size: 8,
            index_granularity: 1024,
        }
    }
}

struct SortJob<E: PackedEntry> {
    dir: std::path::PathBuf,
    id: u64,
    buffer: Vec<E>,
    already_sorted: bool,
    reply: oneshot::Sender<Result<Arc<EntryFile<E>>>>,
}

/// A placeholder for a file whose contents are still being sorted/written (§4.G).
///
/// `id()` is available immediately so a partition can keep its id space monotonic under
/// concurrent scheduling; `wait()` resolves once the sort+write stages have landed the file.
pub struct FutureFile<E: PackedEntry> {
    id: u64,
    rx: oneshot::Receiver<Result<Arc<EntryFile<E>>>>,
}

impl<E: PackedEntry> FutureFile<E> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn wait(self) -> Result<Arc<EntryFile<E>>> {
        self.rx
            .await
            .map_err(|_| StorageError::Pipeline(PipelineError::ShutDown))?
    }
}

/// A pool of `k` reusable row buffers, gated by a [`Semaphore`] so `get_empty_buffer` blocks
/// rather than allocating unboundedly (§4.F: "this caps memory use").
struct BufferPool<E: PackedEntry> {
    semaphore: Semaphore,
    free: Mutex<Vec<Vec<E>>>,
}

impl<E: PackedEntry> BufferPool<E> {
    fn new(size: usize) -> Self {
        BufferPool {
            semaphore: Semaphore::new(size),
            free: Mutex::new((0..size).map(|_| Vec::new()).collect()),
        }
    }

    async fn get_empty_buffer(&self) -> Vec<E> {
        let permit = self.semaphore.acquire().await.expect("pool semaphore never closed");
        permit.forget();
        let mut buf = self.free.lock().await.pop().unwrap_or_default();
        buf.clear();
        buf
    }

    async fn return_buffer(&self, mut buf: Vec<E>) {
        buf.clear();
        self.free.lock().await.push(buf);
        self.semaphore.add_permits(1);
    }
}

/// The async store pipeline (§4.F): hands entry buffers off to sort workers and a single
/// writer task, returning a [`FutureFile`] immediately.
pub struct Pipeline<E: PackedEntry> {
    sort_tx: mpsc::Sender<SortJob<E>>,
    next_placeholder_id: std::sync::atomic::AtomicU64,
    sort_handles: Vec<JoinHandle<()>>,
    write_handle: Option<JoinHandle<()>>,
    pool: Arc<BufferPool<E>>,
    config: PipelineConfig,
}

struct WriteJob<E: PackedEntry> {
    dir: std::path::PathBuf,
    id: u64,
    buffer: Vec<E>,
    reply: oneshot::Sender<Result<Arc<EntryFile<E>>>>,
}

impl<E: PackedEntry> Pipeline<E> {
    pub fn start(config: PipelineConfig) -> Self {
        let (sort_tx, sort_rx) = mpsc::channel::<SortJob<E>>(config.queue_depth);
        let (write_tx, write_rx) = mpsc::channel::<WriteJob<E>>(config.queue_depth);
        let pool = Arc::new(BufferPool::new(config.buffer_pool_size));

        let sort_rx = Arc::new(Mutex::new(sort_rx));
        let mut sort_handles = Vec::with_capacity(config.sort_workers);
        for worker in 0..config.sort_workers.max(1) {
            let sort_rx = sort_rx.clone();
            let write_tx = write_tx.clone();
            sort_handles.push(tokio::spawn(async move {
                loop {
                    let job = { sort_rx.lock().await.recv().await };
                    let Some(job) = job else { break };
                    debug!(worker, id = job.id, "sort worker picked up job");
                    let mut buffer = job.buffer;
                    if !job.already_sorted {
                        buffer.sort_by(|a, b| Comparator::Full.compare(a, b));
                        dedup_combine(&mut buffer);
                    }
                    let write_job = WriteJob {
                        dir: job.dir,
                        id: job.id,
                        buffer,
                        reply: job.reply,
                    };
                    if write_tx.send(write_job).await.is_err() {
                        warn!("write channel closed while sort worker held a job");
                        break;
                    }
                }
            }));
        }
        drop(write_tx);

        let index_granularity = config.index_granularity;
        let write_pool = pool.clone();
        let write_handle = tokio::spawn(async move {
            let mut write_rx = write_rx;
            while let Some(job) = write_rx.recv().await {
                let result = EntryFile::create(&job.dir, job.id, &job.buffer, index_granularity)
                    .map(Arc::new);
                write_pool.return_buffer(job.buffer).await;
                let _ = job.reply.send(result);
            }
        });

        Pipeline {
            sort_tx,
            next_placeholder_id: std::sync::atomic::AtomicU64::new(0),
            sort_handles,
            write_handle: Some(write_handle),
            pool,
            config,
        }
    }

    pub async fn get_empty_buffer(&self) -> Vec<E> {
        self.pool.get_empty_buffer().await
    }

    /// Schedules `buffer` to be sorted (via `LessFull`), deduplicated, and written to `id` under
    /// `dir`. Returns immediately with a [`FutureFile`] whose id is already fixed.
    pub async fn schedule_unordered(&self, dir: &std::path::Path, id: u64, buffer: Vec<E>) -> FutureFile<E> {
        self.enqueue(dir, id, buffer, false).await
    }

    /// Like [`Self::schedule_unordered`] but skips the sort/dedup pass: `buffer` must already be
    /// ascending and unique under `Full`.
    pub async fn schedule_ordered(&self, dir: &std::path::Path, id: u64, buffer: Vec<E>) -> FutureFile<E> {
        self.enqueue(dir, id, buffer, true).await
    }

    async fn enqueue(
        &self,
        dir: &std::path::Path,
        id: u64,
        buffer: Vec<E>,
        already_sorted: bool,
    ) -> FutureFile<E> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = SortJob {
            dir: dir.to_path_buf(),
            id,
            buffer,
            already_sorted,
            reply: reply_tx,
        };
        if self.sort_tx.send(job).await.is_err() {
            let (tx, rx) = oneshot::channel();
            let _ = tx.send(Err(StorageError::Pipeline(PipelineError::ShutDown)));
            return FutureFile { id, rx };
        }
        FutureFile { id, rx: reply_rx }
    }

    pub fn next_id(&self) -> u64 {
        self.next_placeholder_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Closes the sort queue, waits for every sort worker and the writer to drain, in that
    /// order (§4.F: "a drain signal propagates from sort to write to buffer-return").
    pub async fn shutdown(mut self) {
        drop(self.sort_tx);
        futures_util::future::join_all(self.sort_handles.drain(..)).await;
        if let Some(handle) = self.write_handle.take() {
            let _ = handle.await;
        }
    }
}

/// In-place "unique + combine": adjacent equal-`Full`-keyed rows merge via [`PackedEntry::combine`]
/// (§4.F step 2). `buffer` must already be sorted under `Full`.
fn dedup_combine<E: PackedEntry>(buffer: &mut Vec<E>) {
    if buffer.is_empty() {
        return;
    }
    let mut write = 0;
    for read in 1..buffer.len() {
        if Comparator::Full.eq(&buffer[write], &buffer[read]) {
            let merged = buffer[write].combine(&buffer[read]);
            buffer[write] = merged;
        } else {
            write += 1;
            buffer[write] = buffer[read];
        }
    }
    buffer.truncate(write + 1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdb_entry::format::beta::Beta;
    use pdb_entry::{Entry, GameResult, Level};

    fn row(hash_lo: u64, count: u64) -> Beta {
        Beta::from_entry(&Entry::single((0, hash_lo), 0, Level::Human, GameResult::Draw, 0, count as u32))
    }

    #[tokio::test]
    async fn schedules_and_writes_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::<Beta>::start(PipelineConfig {
            queue_depth: 2,
            sort_workers: 2,
            buffer_pool_size: 2,
            index_granularity: 8,
        });

        let unsorted = vec![row(5, 0), row(1, 0), row(3, 0)];
        let future = pipeline.schedule_unordered(dir.path(), 0, unsorted).await;
        let file = future.wait().await.unwrap();
        assert_eq!(file.len(), 3);
        let rows = file.scan().unwrap();
        assert!(rows.windows(2).all(|w| w[0].key_hash() < w[1].key_hash()));

        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn dedup_combine_merges_equal_full_keys() {
        let mut buf = vec![row(1, 1), row(1, 2), row(2, 1)];
        buf.sort_by(|a, b| Comparator::Full.compare(a, b));
        dedup_combine(&mut buf);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf[0].count, 3);
    }

    #[tokio::test]
    async fn ordered_schedule_skips_sorting() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::<Beta>::start(PipelineConfig::default());
        let already_sorted = vec![row(1, 0), row(2, 0), row(3, 0)];
        let future = pipeline.schedule_ordered(dir.path(), 1, already_sorted.clone()).await;
        let file = future.wait().await.unwrap();
        assert_eq!(file.scan().unwrap(), already_sorted);
        pipeline.shutdown().await;
    }
}
