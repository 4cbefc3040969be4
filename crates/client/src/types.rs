//! Data types for the upload flow.

use crate::retry::RetryPolicy;

/// Settings for one [`UploadCoordinator`](crate::UploadCoordinator).
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Chunk size in bytes. Must match on upload and merge.
    ///
    /// Resuming trusts the chunk keys already staged on the server, so an
    /// interrupted upload must be resumed with the same chunk size. A
    /// different size fails the merge with
    /// [`UploadError::ChunkSizeMismatch`](crate::UploadError::ChunkSizeMismatch).
    pub chunk_size: u64,
    /// Maximum chunk uploads in flight.
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            concurrency: crate::DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
        }
    }
}

/// Progress event emitted during an upload.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// Hashing progress, 0–100.
    Hashing { percentage: f64 },
    /// Hashing finished.
    Hashed { file_hash: String, chunks: u64 },
    /// The server already holds the merged file.
    AlreadyUploaded { file_hash: String },
    /// Chunks already staged on the server are skipped.
    Resuming { staged: usize, remaining: usize },
    /// One chunk was acknowledged by the server.
    ChunkUploaded {
        index: u64,
        uploaded: u64,
        total: u64,
        bytes_per_second: f64,
    },
    /// A request failed and will be retried.
    Retrying {
        index: Option<u64>,
        attempt: u32,
        error: String,
    },
    /// All chunks are staged; the merge was requested.
    Merging { file_hash: String },
    Completed { file_hash: String },
    Failed { error: String },
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Chunks were sent (possibly none, when all were staged) and merged.
    Uploaded { file_hash: String, chunks_sent: u64 },
    /// The server already had the file; nothing was sent.
    AlreadyUploaded { file_hash: String },
}

impl UploadOutcome {
    pub fn file_hash(&self) -> &str {
        match self {
            UploadOutcome::Uploaded { file_hash, .. }
            | UploadOutcome::AlreadyUploaded { file_hash } => file_hash,
        }
    }
}

/// Result of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}
