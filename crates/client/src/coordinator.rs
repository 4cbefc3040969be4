//! Upload pipeline for a single file.
//!
//! hash → verify → upload missing chunks (concurrent, retried) → merge.

use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chunkload_hasher::{ChunkReader, FileDigest, HashError, HashWorker};
use chunkload_protocol::{
    ChunkRange, DelFileRequest, MergeRequest, UploadChunkFields, VerifyRequest, chunk_key,
};
use futures_util::TryStreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::UploadError;
use crate::progress::SpeedCalculator;
use crate::server::ChunkServer;
use crate::types::{DeleteOutcome, UploadConfig, UploadEvent, UploadOutcome};

const EVENT_BUFFER: usize = 256;

/// Drives uploads of whole files against one server.
pub struct UploadCoordinator {
    server: Arc<dyn ChunkServer>,
    config: UploadConfig,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
    cancel: CancellationToken,
}

impl UploadCoordinator {
    pub fn new(server: Arc<dyn ChunkServer>, config: UploadConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        Self {
            server,
            config,
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        }
    }

    /// Takes the event receiver. Can only be called once.
    ///
    /// Events are advisory: they are dropped while the receiver lags or if it
    /// was never taken.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Returns a token that aborts hashing and in-flight chunk uploads.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Uploads `path`, skipping whatever the server already holds.
    ///
    /// The merge is requested only after every chunk was acknowledged, and
    /// is never requested after an error.
    pub async fn upload(&self, path: &Path) -> Result<UploadOutcome, UploadError> {
        match self.run_upload(path).await {
            Ok(outcome) => {
                info!(path = %path.display(), file_hash = outcome.file_hash(), "upload finished");
                self.emit(UploadEvent::Completed {
                    file_hash: outcome.file_hash().to_string(),
                });
                Ok(outcome)
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "upload failed");
                self.emit(UploadEvent::Failed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Hashes `path` and asks the server to delete the merged file.
    pub async fn delete(&self, path: &Path) -> Result<DeleteOutcome, UploadError> {
        self.validate_config()?;
        let file_name = file_name_of(path)?;
        let digest = self.hash(path).await?;

        let req = DelFileRequest {
            file_hash: digest.file_hash.clone(),
            file_name,
        };
        let server = &*self.server;
        let outcome = self
            .with_retry(None, &self.cancel, move || server.delete_file(req.clone()))
            .await?;

        info!(file_hash = %digest.file_hash, ?outcome, "delete finished");
        Ok(outcome)
    }

    async fn run_upload(&self, path: &Path) -> Result<UploadOutcome, UploadError> {
        self.validate_config()?;
        let file_name = file_name_of(path)?;
        if tokio::fs::metadata(path).await?.len() == 0 {
            return Err(UploadError::EmptyFile);
        }

        // 1. Hash
        let digest = self.hash(path).await?;
        let file_hash = digest.file_hash.clone();
        let total = digest.chunks.len() as u64;
        self.emit(UploadEvent::Hashed {
            file_hash: file_hash.clone(),
            chunks: total,
        });
        debug!(%file_hash, chunks = total, bytes = digest.file_size, "hashed");

        // 2. Verify
        let server = &*self.server;
        let verify_req = VerifyRequest {
            file_hash: file_hash.clone(),
            file_name: file_name.clone(),
        };
        let verify = self
            .with_retry(None, &self.cancel, move || server.verify(verify_req.clone()))
            .await?;

        if !verify.should_upload {
            info!(%file_hash, "server already has the file");
            self.emit(UploadEvent::AlreadyUploaded {
                file_hash: file_hash.clone(),
            });
            return Ok(UploadOutcome::AlreadyUploaded { file_hash });
        }

        // 3. Upload missing chunks
        let staged: HashSet<String> = verify.uploaded_list.into_iter().collect();
        let pending: Vec<ChunkRange> = digest
            .chunks
            .iter()
            .filter(|range| !staged.contains(&chunk_key(&file_hash, range.index)))
            .copied()
            .collect();
        let already = total - pending.len() as u64;
        if already > 0 {
            info!(%file_hash, staged = already, remaining = pending.len(), "resuming upload");
            self.emit(UploadEvent::Resuming {
                staged: already as usize,
                remaining: pending.len(),
            });
        }

        let chunks_sent = pending.len() as u64;
        let uploads = self.upload_chunks(path, &file_hash, &file_name, pending, already, total);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(UploadError::Cancelled),
            result = uploads => result?,
        }

        // 4. Merge. Not cancellable once requested.
        if self.cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        self.emit(UploadEvent::Merging {
            file_hash: file_hash.clone(),
        });
        self.merge(&file_hash, &file_name, &digest).await?;

        Ok(UploadOutcome::Uploaded {
            file_hash,
            chunks_sent,
        })
    }

    async fn hash(&self, path: &Path) -> Result<FileDigest, UploadError> {
        let handle = HashWorker::spawn(path, self.config.chunk_size)?;
        let events = &self.events_tx;
        let finish = handle.finish(|percentage| {
            let _ = events.try_send(UploadEvent::Hashing { percentage });
        });

        // Dropping `finish` drops the handle, which stops the worker.
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(UploadError::Cancelled),
            digest = finish => Ok(digest?),
        }
    }

    async fn upload_chunks(
        &self,
        path: &Path,
        file_hash: &str,
        file_name: &str,
        pending: Vec<ChunkRange>,
        already: u64,
        total: u64,
    ) -> Result<(), UploadError> {
        let uploaded = &AtomicU64::new(already);
        let speed = &SpeedCalculator::default();

        futures_util::stream::iter(pending.into_iter().map(Ok::<_, UploadError>))
            .try_for_each_concurrent(self.config.concurrency, move |range| async move {
                self.upload_one(path, file_hash, file_name, range).await?;

                let done = uploaded.fetch_add(1, Ordering::SeqCst) + 1;
                speed.record(range.len());
                debug!(file_hash, index = range.index, bytes = range.len(), "chunk uploaded");
                self.emit(UploadEvent::ChunkUploaded {
                    index: range.index,
                    uploaded: done,
                    total,
                    bytes_per_second: speed.bytes_per_second(),
                });
                Ok::<(), UploadError>(())
            })
            .await
    }

    async fn upload_one(
        &self,
        path: &Path,
        file_hash: &str,
        file_name: &str,
        range: ChunkRange,
    ) -> Result<(), UploadError> {
        let data = read_range(path, range).await?;
        let fields = UploadChunkFields {
            file_hash: file_hash.to_string(),
            chunk_hash: chunk_key(file_hash, range.index),
            file_name: file_name.to_string(),
        };

        let server = &*self.server;
        self.with_retry(Some(range.index), &self.cancel, move || {
            server.upload_chunk(fields.clone(), data.clone())
        })
        .await?;
        Ok(())
    }

    async fn merge(
        &self,
        file_hash: &str,
        file_name: &str,
        digest: &FileDigest,
    ) -> Result<(), UploadError> {
        let server = &*self.server;
        let req = MergeRequest {
            file_hash: file_hash.to_string(),
            file_name: file_name.to_string(),
            chunk_size: self.config.chunk_size,
        };
        let never = CancellationToken::new();
        let result = self
            .with_retry(None, &never, move || server.merge(req.clone()))
            .await;

        let Err(e) = result else {
            info!(file_hash, bytes = digest.file_size, "merge complete");
            return Ok(());
        };

        // A retried merge fails once the first attempt already consumed the
        // staged chunks. The file existing on the server means it succeeded.
        let check = server
            .verify(VerifyRequest {
                file_hash: file_hash.to_string(),
                file_name: file_name.to_string(),
            })
            .await;
        match check {
            Ok(data) if !data.should_upload => {
                warn!(file_hash, error = %e, "merge reported failure but file exists");
                Ok(())
            }
            _ => Err(e),
        }
    }

    async fn with_retry<T, F, Fut>(
        &self,
        index: Option<u64>,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<T, UploadError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UploadError>>,
    {
        self.config
            .retry
            .run(cancel, op, |attempt, e| {
                warn!(?index, attempt, error = %e, "request failed, retrying");
                self.emit(UploadEvent::Retrying {
                    index,
                    attempt,
                    error: e.to_string(),
                });
            })
            .await
    }

    fn validate_config(&self) -> Result<(), UploadError> {
        if self.config.chunk_size == 0 {
            return Err(UploadError::InvalidInput("chunk size must be positive".into()));
        }
        if self.config.concurrency == 0 {
            return Err(UploadError::InvalidInput("concurrency must be positive".into()));
        }
        Ok(())
    }

    fn emit(&self, event: UploadEvent) {
        let _ = self.events_tx.try_send(event);
    }
}

fn file_name_of(path: &Path) -> Result<String, UploadError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| UploadError::InvalidInput(format!("no usable file name: {}", path.display())))
}

async fn read_range(path: &Path, range: ChunkRange) -> Result<Vec<u8>, UploadError> {
    let path = path.to_path_buf();
    let read = tokio::task::spawn_blocking(move || ChunkReader::open(&path)?.read_range(&range))
        .await
        .map_err(|e| UploadError::Join(e.to_string()))?;
    read.map_err(|e| match e {
        HashError::Io(io) => UploadError::Io(io),
        other => UploadError::Hash(other),
    })
}
