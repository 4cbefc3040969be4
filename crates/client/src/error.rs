use chunkload_hasher::HashError;
use chunkload_protocol::ProtocolError;

/// Errors produced while uploading or deleting a file.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("hashing failed: {0}")]
    Hash(#[from] HashError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("server rejected {endpoint}: {msg}")]
    Rejected { endpoint: &'static str, msg: String },

    #[error(
        "server holds chunks cut with a different chunk size than {chunk_size}; \
         upload again with the original chunk size"
    )]
    ChunkSizeMismatch { chunk_size: u64 },

    #[error("file is empty")]
    EmptyFile,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("task join error: {0}")]
    Join(String),

    #[error("cancelled")]
    Cancelled,
}

impl UploadError {
    /// Returns `true` for failures worth another attempt: transport errors,
    /// timeouts and server-side failures.
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::Http(e) => !e.is_builder() && !e.is_decode(),
            UploadError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            UploadError::Rejected { .. } => true,
            UploadError::Hash(_)
            | UploadError::Io(_)
            | UploadError::Protocol(_)
            | UploadError::ChunkSizeMismatch { .. }
            | UploadError::EmptyFile
            | UploadError::InvalidInput(_)
            | UploadError::Join(_)
            | UploadError::Cancelled => false,
        }
    }
}
