use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chunkload_protocol::{extract_ext, parse_chunk_index};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::store::ChunkStore;
use crate::validation::{validate_ext, validate_file_hash};
use crate::{Missing, Operation, StoreError};

/// Default number of chunks copied at the same time.
pub const DEFAULT_MERGE_CONCURRENCY: usize = 8;

/// Copy buffer for streaming one chunk into the destination.
const COPY_BUF_SIZE: usize = 256 * 1024;

/// Name of the partially merged file inside the staging directory.
/// Hidden, so it is never listed as a chunk.
const PART_FILE: &str = ".merge.part";

/// A staged chunk resolved to its position in the merged file.
#[derive(Debug)]
struct PlannedChunk {
    key: String,
    path: PathBuf,
    offset: u64,
    len: u64,
}

/// Assembles staged chunks into the merged file.
///
/// Each chunk `i` is written at byte offset `i * chunk_size`, so chunks can
/// be copied concurrently and in any order. The merged file only appears
/// under its final name once every chunk has been written and synced.
#[derive(Debug, Clone)]
pub struct MergeEngine {
    store: ChunkStore,
    concurrency: usize,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl MergeEngine {
    pub fn new(store: ChunkStore, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Merges the staged chunks of `file_hash` into `<fileHash><ext>`.
    ///
    /// On success the staging directory is removed. On failure staging is
    /// left intact so the merge can be retried, and no merged file is
    /// visible.
    ///
    /// The merge runs on its own task: dropping the returned future (a
    /// client hanging up, a request timeout) does not stop it.
    pub async fn merge(
        &self,
        file_hash: &str,
        file_name: &str,
        chunk_size: u64,
    ) -> Result<PathBuf, StoreError> {
        let engine = self.clone();
        let hash = file_hash.to_string();
        let name = file_name.to_string();
        tokio::spawn(async move { engine.run_merge(&hash, &name, chunk_size).await })
            .await
            .map_err(|e| StoreError::io(Operation::Merge, file_hash)(io::Error::other(e)))?
    }

    async fn run_merge(
        &self,
        file_hash: &str,
        file_name: &str,
        chunk_size: u64,
    ) -> Result<PathBuf, StoreError> {
        validate_file_hash(file_hash)?;
        let ext = extract_ext(file_name);
        validate_ext(ext)?;
        if chunk_size == 0 {
            return Err(StoreError::InvalidInput("chunk size must be positive".into()));
        }

        let _guard = self.begin(file_hash)?;

        let keys = self.store.list_chunks(file_hash).await?;
        if keys.is_empty() {
            return Err(StoreError::NotFound {
                what: Missing::StagingSet,
                file_hash: file_hash.to_string(),
            });
        }

        let staging = self.store.staging_dir(file_hash);
        let chunks = plan_chunks(file_hash, &staging, keys, chunk_size).await?;
        let total: u64 = chunks.iter().map(|c| c.len).sum();

        let part = staging.join(PART_FILE);
        self.assemble(file_hash, &part, chunks, total).await?;

        let dest = self.store.final_path(file_hash, ext);
        tokio::fs::rename(&part, &dest)
            .await
            .map_err(StoreError::io(Operation::Merge, file_hash))?;
        info!(file_hash, path = %dest.display(), bytes = total, "file merged");

        // The merged file is complete at this point; leftover staging is only
        // wasted space.
        if let Err(e) = self.store.purge_staging(file_hash).await {
            warn!(file_hash, error = %e, "merged but failed to purge staging");
        }

        Ok(dest)
    }

    /// Writes every chunk into `part`. On failure `part` is removed.
    async fn assemble(
        &self,
        file_hash: &str,
        part: &Path,
        chunks: Vec<PlannedChunk>,
        total: u64,
    ) -> Result<(), StoreError> {
        let Err(e) = self.write_part(part, chunks, total).await else {
            return Ok(());
        };
        if let Err(rm) = tokio::fs::remove_file(part).await
            && rm.kind() != io::ErrorKind::NotFound
        {
            warn!(path = %part.display(), error = %rm, "failed to remove partial merge");
        }
        Err(StoreError::io(Operation::Merge, file_hash)(e))
    }

    fn begin(&self, file_hash: &str) -> Result<MergeGuard, StoreError> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !in_flight.insert(file_hash.to_string()) {
            return Err(StoreError::MergeInProgress(file_hash.to_string()));
        }
        Ok(MergeGuard {
            in_flight: Arc::clone(&self.in_flight),
            file_hash: file_hash.to_string(),
        })
    }

    async fn write_part(&self, part: &Path, chunks: Vec<PlannedChunk>, total: u64) -> io::Result<()> {
        let part_path = part.to_path_buf();
        let dest = tokio::task::spawn_blocking(move || -> io::Result<File> {
            let file = File::create(&part_path)?;
            file.set_len(total)?;
            Ok(file)
        })
        .await
        .map_err(io::Error::other)??;
        let dest = Arc::new(dest);

        let mut tasks = JoinSet::new();
        let mut first_error = None;
        let mut written = 0u64;
        for chunk in chunks {
            while tasks.len() >= self.concurrency {
                match tasks.join_next().await {
                    Some(joined) => tally(joined, &mut written, &mut first_error),
                    None => break,
                }
            }
            while let Some(joined) = tasks.try_join_next() {
                tally(joined, &mut written, &mut first_error);
            }
            if first_error.is_some() {
                break;
            }

            let dest = Arc::clone(&dest);
            tasks.spawn_blocking(move || copy_chunk_at(&chunk, &dest));
        }

        // Every started write must finish before the file may be renamed or
        // removed.
        while let Some(joined) = tasks.join_next().await {
            tally(joined, &mut written, &mut first_error);
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        if written != total {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("wrote {written} of {total} bytes"),
            ));
        }

        tokio::task::spawn_blocking(move || dest.sync_all())
            .await
            .map_err(io::Error::other)??;
        debug!(path = %part.display(), bytes = total, "partial merge synced");
        Ok(())
    }
}

fn tally(
    joined: Result<io::Result<u64>, tokio::task::JoinError>,
    written: &mut u64,
    first_error: &mut Option<io::Error>,
) {
    match joined {
        Ok(Ok(n)) => *written += n,
        Ok(Err(e)) => {
            first_error.get_or_insert(e);
        }
        Err(e) => {
            first_error.get_or_insert(io::Error::other(e));
        }
    }
}

/// Releases the per-hash merge slot on drop.
struct MergeGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    file_hash: String,
}

impl Drop for MergeGuard {
    fn drop(&mut self) {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        in_flight.remove(&self.file_hash);
    }
}

/// Resolves keys to offsets and checks that they cover `0..n` exactly.
async fn plan_chunks(
    file_hash: &str,
    staging: &Path,
    keys: Vec<String>,
    chunk_size: u64,
) -> Result<Vec<PlannedChunk>, StoreError> {
    let mut indexed = Vec::with_capacity(keys.len());
    for key in keys {
        let index = parse_chunk_index(&key).ok_or_else(|| StoreError::InvalidChunkKey(key.clone()))?;
        indexed.push((index, key));
    }
    indexed.sort_by_key(|(index, _)| *index);

    let last = indexed.len() - 1;
    let mut chunks = Vec::with_capacity(indexed.len());
    for (position, (index, key)) in indexed.into_iter().enumerate() {
        let expected = position as u64;
        if index < expected {
            return Err(StoreError::IncompleteStaging {
                file_hash: file_hash.to_string(),
                reason: format!("duplicate index {index}"),
            });
        }
        if index > expected {
            return Err(StoreError::IncompleteStaging {
                file_hash: file_hash.to_string(),
                reason: format!("missing index {expected}"),
            });
        }

        let path = staging.join(&key);
        let len = tokio::fs::metadata(&path)
            .await
            .map_err(StoreError::io(Operation::Merge, file_hash))?
            .len();
        // Only the last chunk may be short.
        let size_ok = if position == last {
            len <= chunk_size
        } else {
            len == chunk_size
        };
        if !size_ok {
            return Err(StoreError::ChunkSizeMismatch {
                key,
                len,
                expected: chunk_size,
            });
        }

        chunks.push(PlannedChunk {
            key,
            path,
            offset: index * chunk_size,
            len,
        });
    }
    Ok(chunks)
}

fn copy_chunk_at(chunk: &PlannedChunk, dest: &File) -> io::Result<u64> {
    let mut src = File::open(&chunk.path)?;
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut offset = chunk.offset;
    let mut copied = 0u64;
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        write_all_at(dest, &buf[..n], offset)?;
        offset += n as u64;
        copied += n as u64;
    }
    if copied != chunk.len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("chunk {} changed size during merge", chunk.key),
        ));
    }
    Ok(copied)
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write whole buffer",
                ));
            }
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
