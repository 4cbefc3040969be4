//! Wire types shared by the chunkload client and server.
//!
//! - [`envelope`]: the `{success, code, msg, data}` response wrapper.
//! - [`messages`]: request and response bodies for `/upload`, `/merge`,
//!   `/verify` and `/delFile`.
//! - [`naming`]: extension and chunk key rules both sides must agree on.
//! - [`worker`]: events emitted by the content hasher.

pub mod envelope;
pub mod messages;
pub mod naming;
pub mod worker;

pub use envelope::{ApiResponse, CODE_ERROR, CODE_OK};
pub use messages::{
    CHUNK_FILE_FIELD, DelFileRequest, MSG_CHUNK_SIZE_MISMATCH, MSG_FILE_NOT_FOUND, MergeRequest, UploadChunkData,
    UploadChunkFields, VerifyData, VerifyRequest,
};
pub use naming::{chunk_key, extract_ext, parse_chunk_index};
pub use worker::{ChunkRange, HashEvent};

/// Errors produced while decoding wire data.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field: {0}")]
    MissingField(&'static str),
}
