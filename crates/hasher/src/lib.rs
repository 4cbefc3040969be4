//! Content hashing for chunked uploads.
//!
//! A file is split into fixed-size ranges ([`ChunkPlan`]) and hashed range by
//! range on a dedicated thread ([`HashWorker`]). The caller receives progress
//! and a single terminal event over a channel and never shares state with the
//! worker.
//!
//! The file identity is the MD5 of the whole content, fed to one cumulative
//! hasher in index order, so it equals the MD5 of the file regardless of the
//! chunk size used.

mod plan;
mod worker;

pub use plan::{ChunkPlan, ChunkReader};
pub use worker::{FileDigest, HashHandle, HashWorker, hash_file};

pub use chunkload_protocol::{ChunkRange, HashEvent};

/// Default chunk size: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Errors produced by the hasher.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,

    #[error("hashing cancelled")]
    Cancelled,

    #[error("hashing failed: {0}")]
    Worker(String),

    #[error("hash worker exited without a result")]
    WorkerGone,
}
