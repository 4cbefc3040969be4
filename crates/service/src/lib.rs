//! Server operations of the chunked upload protocol.
//!
//! [`UploadService`] exposes each endpoint twice: as a typed operation
//! returning `Result`, and as a `handle_*` method that wraps the outcome in
//! the [`ApiResponse`] envelope. Transport layers only parse requests and
//! forward them here.

mod service;

pub use service::UploadService;

use chunkload_protocol::{ApiResponse, MSG_CHUNK_SIZE_MISMATCH, MSG_FILE_NOT_FOUND};
use chunkload_store::{Missing, StoreError};

/// Errors produced by service operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    /// Returns `true` when the request was rejected before touching storage.
    pub fn is_client_error(&self) -> bool {
        match self {
            ServiceError::MissingField(_) | ServiceError::InvalidRequest(_) => true,
            ServiceError::Store(e) => e.is_invalid_input(),
            ServiceError::Io(_) => false,
        }
    }
}

/// HTTP endpoints of the protocol, used to pick response messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Upload,
    Merge,
    Verify,
    DelFile,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Upload => "/upload",
            Endpoint::Merge => "/merge",
            Endpoint::Verify => "/verify",
            Endpoint::DelFile => "/delFile",
        }
    }

    fn failure_msg(self) -> &'static str {
        match self {
            Endpoint::Upload => "chunk upload failed",
            Endpoint::Merge => "file merge failed",
            Endpoint::Verify => "verify failed",
            Endpoint::DelFile => "delete failed",
        }
    }
}

/// Builds the failure envelope for `err` raised by `endpoint`.
pub fn reject<T>(endpoint: Endpoint, err: &ServiceError) -> ApiResponse<T> {
    let msg = match err {
        ServiceError::Store(StoreError::NotFound {
            what: Missing::FinalFile,
            ..
        }) => MSG_FILE_NOT_FOUND.to_string(),
        ServiceError::Store(StoreError::NotFound {
            what: Missing::StagingSet,
            ..
        }) => "no chunks staged".to_string(),
        ServiceError::Store(StoreError::ChunkSizeMismatch { .. }) => {
            MSG_CHUNK_SIZE_MISMATCH.to_string()
        }
        other => format!("{}: {other}", endpoint.failure_msg()),
    };
    ApiResponse::failure(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkload_protocol::CODE_ERROR;

    #[test]
    fn not_found_messages() {
        let err = ServiceError::Store(StoreError::NotFound {
            what: Missing::FinalFile,
            file_hash: "abc".into(),
        });
        let resp: ApiResponse<String> = reject(Endpoint::DelFile, &err);
        assert_eq!(resp.code, CODE_ERROR);
        assert_eq!(resp.msg, "file not found");
        assert!(resp.data.is_none());
    }

    #[test]
    fn chunk_size_mismatch_has_fixed_message() {
        let err = ServiceError::Store(StoreError::ChunkSizeMismatch {
            key: "abc-0".into(),
            len: 512,
            expected: 1024,
        });
        let resp: ApiResponse<String> = reject(Endpoint::Merge, &err);
        assert_eq!(resp.msg, MSG_CHUNK_SIZE_MISMATCH);
    }

    #[test]
    fn other_errors_are_prefixed() {
        let err = ServiceError::MissingField("fileHash");
        let resp: ApiResponse<String> = reject(Endpoint::Upload, &err);
        assert_eq!(resp.msg, "chunk upload failed: missing field: fileHash");
        assert!(err.is_client_error());
    }
}
