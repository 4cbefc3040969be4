//! Transport seam between the coordinator and the server.

use std::future::Future;
use std::pin::Pin;

use chunkload_protocol::{
    DelFileRequest, MergeRequest, UploadChunkData, UploadChunkFields, VerifyData, VerifyRequest,
};

use crate::error::UploadError;
use crate::types::DeleteOutcome;

/// Boxed future returned by [`ChunkServer`] methods.
pub type ServerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, UploadError>> + Send + 'a>>;

/// The four server operations of the protocol.
///
/// Implemented over HTTP by [`HttpChunkServer`](crate::HttpChunkServer);
/// tests use in-memory mocks. Dropping a returned future abandons the request.
pub trait ChunkServer: Send + Sync {
    fn verify(&self, req: VerifyRequest) -> ServerFuture<'_, VerifyData>;

    fn upload_chunk(
        &self,
        fields: UploadChunkFields,
        data: Vec<u8>,
    ) -> ServerFuture<'_, UploadChunkData>;

    fn merge(&self, req: MergeRequest) -> ServerFuture<'_, ()>;

    /// Deletes a merged file. An absent file is reported, not an error.
    fn delete_file(&self, req: DelFileRequest) -> ServerFuture<'_, DeleteOutcome>;
}
