use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use chunkload_protocol::{ChunkRange, HashEvent};
use md5::{Digest, Md5};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::HashError;
use crate::plan::{ChunkPlan, ChunkReader};

/// Capacity of the event channel. The worker blocks once this many events are
/// unread, which bounds memory when the consumer is slow.
const EVENT_BUFFER: usize = 64;

/// Outcome of a successful hashing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    /// Lowercase hex MD5 of the entire file.
    pub file_hash: String,
    /// Ranges in ascending index order.
    pub chunks: Vec<ChunkRange>,
    pub file_size: u64,
}

/// Spawns hashing runs on dedicated threads.
pub struct HashWorker;

impl HashWorker {
    /// Starts hashing `path` in `chunk_size` ranges on a new thread.
    pub fn spawn(path: impl Into<PathBuf>, chunk_size: u64) -> Result<HashHandle, HashError> {
        if chunk_size == 0 {
            return Err(HashError::InvalidChunkSize);
        }

        let path = path.into();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();

        let thread = std::thread::Builder::new()
            .name("chunkload-hasher".into())
            .spawn(move || {
                let event = match hash_ranges(&path, chunk_size, &tx, &worker_cancel) {
                    Ok((file_hash, chunks)) => {
                        debug!(path = %path.display(), %file_hash, chunks = chunks.len(), "hash complete");
                        HashEvent::done(file_hash, chunks)
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "hash failed");
                        HashEvent::failed(e)
                    }
                };
                // The receiver may be gone if the caller gave up.
                let _ = tx.blocking_send(event);
            })?;

        Ok(HashHandle {
            events: rx,
            cancel,
            thread: Some(thread),
        })
    }
}

/// Caller side of a hashing run.
///
/// Dropping the handle cancels the run.
pub struct HashHandle {
    events: mpsc::Receiver<HashEvent>,
    cancel: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl HashHandle {
    /// Receives the next event. Returns `None` after the terminal event.
    pub async fn recv(&mut self) -> Option<HashEvent> {
        self.events.recv().await
    }

    /// Requests the worker to stop before its next range.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drains events until the terminal one, reporting progress percentages.
    pub async fn finish(mut self, mut on_progress: impl FnMut(f64)) -> Result<FileDigest, HashError> {
        while let Some(event) = self.events.recv().await {
            match event {
                HashEvent::Progress { percentage } => on_progress(percentage),
                HashEvent::Done {
                    percentage,
                    file_hash,
                    chunks,
                } => {
                    on_progress(percentage);
                    let file_size = chunks.last().map(|c| c.end).unwrap_or(0);
                    self.join();
                    return Ok(FileDigest {
                        file_hash,
                        chunks,
                        file_size,
                    });
                }
                HashEvent::Failed { data, .. } => {
                    self.join();
                    if self.cancel.is_cancelled() {
                        return Err(HashError::Cancelled);
                    }
                    return Err(HashError::Worker(data));
                }
            }
        }

        if self.cancel.is_cancelled() {
            Err(HashError::Cancelled)
        } else {
            Err(HashError::WorkerGone)
        }
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("hash worker thread panicked");
        }
    }
}

impl Drop for HashHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Hashes `path` and returns its digest, ignoring progress.
pub async fn hash_file(path: impl Into<PathBuf>, chunk_size: u64) -> Result<FileDigest, HashError> {
    HashWorker::spawn(path, chunk_size)?.finish(|_| {}).await
}

fn hash_ranges(
    path: &Path,
    chunk_size: u64,
    tx: &mpsc::Sender<HashEvent>,
    cancel: &CancellationToken,
) -> Result<(String, Vec<ChunkRange>), HashError> {
    let mut reader = ChunkReader::open(path)?;
    let plan = ChunkPlan::new(reader.file_size(), chunk_size)?;
    let total = plan.chunk_count();

    let mut hasher = Md5::new();
    let mut chunks = Vec::with_capacity(total as usize);
    let mut buf = Vec::with_capacity(chunk_size.min(reader.file_size()) as usize);

    // Order matters: each range feeds the same cumulative state.
    for range in plan {
        if cancel.is_cancelled() {
            return Err(HashError::Cancelled);
        }

        reader.read_range_into(&range, &mut buf)?;
        hasher.update(&buf);
        chunks.push(range);

        let percentage = chunks.len() as f64 * 100.0 / total as f64;
        if tx.blocking_send(HashEvent::Progress { percentage }).is_err() {
            return Err(HashError::Cancelled);
        }
    }

    Ok((hex::encode(hasher.finalize()), chunks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[tokio::test]
    async fn known_md5() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "hello.txt", b"hello world");

        let digest = hash_file(&path, 4).await.unwrap();
        assert_eq!(digest.file_hash, "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert_eq!(digest.chunks.len(), 3);
        assert_eq!(digest.file_size, 11);
    }

    #[tokio::test]
    async fn identity_independent_of_chunk_size() {
        let dir = TempDir::new().unwrap();
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let path = write_file(dir.path(), "data.bin", &data);

        let a = hash_file(&path, 1).await.unwrap();
        let b = hash_file(&path, 333).await.unwrap();
        let c = hash_file(&path, 1 << 20).await.unwrap();
        assert_eq!(a.file_hash, b.file_hash);
        assert_eq!(b.file_hash, c.file_hash);
        assert_eq!(b.chunks.len(), 31);
        assert_eq!(c.chunks.len(), 1);
    }

    #[tokio::test]
    async fn same_bytes_same_identity_one_byte_differs() {
        let dir = TempDir::new().unwrap();
        let mut data = vec![7u8; 4096];
        let p1 = write_file(dir.path(), "a.bin", &data);
        let p2 = write_file(dir.path(), "b.bin", &data);
        data[2048] ^= 0x01;
        let p3 = write_file(dir.path(), "c.bin", &data);

        let h1 = hash_file(&p1, 1024).await.unwrap().file_hash;
        let h2 = hash_file(&p2, 1024).await.unwrap().file_hash;
        let h3 = hash_file(&p3, 1024).await.unwrap().file_hash;
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_ends_at_100() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "p.bin", &[1u8; 100]);

        let mut seen = Vec::new();
        let digest = HashWorker::spawn(&path, 10)
            .unwrap()
            .finish(|p| seen.push(p))
            .await
            .unwrap();

        assert_eq!(digest.chunks.len(), 10);
        // 10 per-chunk events plus the terminal one.
        assert_eq!(seen.len(), 11);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*seen.last().unwrap(), 100.0);
    }

    #[tokio::test]
    async fn event_stream_ends_with_single_terminal_event() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "e.bin", &[0u8; 30]);

        let mut handle = HashWorker::spawn(&path, 10).unwrap();
        let mut events = Vec::new();
        while let Some(evt) = handle.recv().await {
            events.push(evt);
        }

        assert_eq!(events.len(), 4);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(matches!(events.last(), Some(HashEvent::Done { .. })));
    }

    #[tokio::test]
    async fn empty_file_hashes_to_empty_md5() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "empty", b"");

        let digest = hash_file(&path, 16).await.unwrap();
        assert_eq!(digest.file_hash, "d41d8cd98f00b204e9800998ecf8427e");
        assert!(digest.chunks.is_empty());
        assert_eq!(digest.file_size, 0);
    }

    #[tokio::test]
    async fn missing_file_reports_failure_without_hash() {
        let dir = TempDir::new().unwrap();
        let mut handle = HashWorker::spawn(dir.path().join("nope.bin"), 16).unwrap();

        let evt = handle.recv().await.unwrap();
        assert!(matches!(evt, HashEvent::Failed { .. }));
        assert!(handle.recv().await.is_none());
    }

    #[tokio::test]
    async fn missing_file_finish_is_worker_error() {
        let dir = TempDir::new().unwrap();
        let result = hash_file(dir.path().join("nope.bin"), 16).await;
        assert!(matches!(result, Err(HashError::Worker(_))));
    }

    #[test]
    fn zero_chunk_size_rejected() {
        assert!(matches!(
            HashWorker::spawn("whatever", 0),
            Err(HashError::InvalidChunkSize)
        ));
    }

    #[tokio::test]
    async fn cancellation_aborts_run() {
        let dir = TempDir::new().unwrap();
        // Many more ranges than the channel buffer, so the worker must
        // observe the cancel flag before reaching the end.
        let path = write_file(dir.path(), "big.bin", &[3u8; 1000]);

        let handle = HashWorker::spawn(&path, 1).unwrap();
        handle.cancel();

        let result = handle.finish(|_| {}).await;
        assert!(matches!(result, Err(HashError::Cancelled)));
    }
}
