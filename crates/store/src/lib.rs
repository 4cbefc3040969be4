//! Server-side chunk staging and file assembly.
//!
//! Layout under the upload root:
//!
//! ```text
//! <root>/chunkCache_<fileHash>/<chunkKey>   staged chunks (StagingSet)
//! <root>/<fileHash><ext>                    merged file (FinalFile)
//! ```
//!
//! The existence of the merged file is the only record that an upload
//! finished; nothing else is persisted.

mod merge;
mod store;
mod validation;

pub use merge::{DEFAULT_MERGE_CONCURRENCY, MergeEngine};
pub use store::ChunkStore;
pub use validation::{validate_chunk_key, validate_ext, validate_file_hash};

use std::fmt;

/// Prefix of staging directory names.
pub const STAGING_PREFIX: &str = "chunkCache_";

/// Store operation, carried by I/O errors for context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    PutChunk,
    ListChunks,
    FinalFileExists,
    DeleteFinalFile,
    PurgeStaging,
    Merge,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::PutChunk => "put_chunk",
            Operation::ListChunks => "list_chunks",
            Operation::FinalFileExists => "final_file_exists",
            Operation::DeleteFinalFile => "delete_final_file",
            Operation::PurgeStaging => "purge_staging",
            Operation::Merge => "merge",
        };
        f.write_str(name)
    }
}

/// What a [`StoreError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    FinalFile,
    StagingSet,
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::FinalFile => f.write_str("file"),
            Missing::StagingSet => f.write_str("staged chunks"),
        }
    }
}

/// Errors produced by the chunk store and merge engine.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{op} failed for {file_hash}: {source}")]
    Io {
        op: Operation,
        file_hash: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{what} not found for {file_hash}")]
    NotFound { what: Missing, file_hash: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid chunk key: {0}")]
    InvalidChunkKey(String),

    #[error("staged chunks for {file_hash} are incomplete: {reason}")]
    IncompleteStaging { file_hash: String, reason: String },

    #[error("chunk {key} is {len} bytes, expected {expected}")]
    ChunkSizeMismatch { key: String, len: u64, expected: u64 },

    #[error("merge already in progress for {0}")]
    MergeInProgress(String),
}

impl StoreError {
    /// Returns `true` for the "absent" condition, as opposed to a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Returns `true` when the request itself was malformed.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidInput(_) | StoreError::InvalidChunkKey(_)
        )
    }

    pub(crate) fn io(op: Operation, file_hash: &str) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| StoreError::Io {
            op,
            file_hash: file_hash.to_string(),
            source,
        }
    }
}
