use std::path::{Path, PathBuf};

use chunkload_protocol::{
    ApiResponse, DelFileRequest, MergeRequest, UploadChunkData, UploadChunkFields, VerifyData,
    VerifyRequest, extract_ext,
};
use chunkload_store::{ChunkStore, MergeEngine};
use tracing::{info, warn};

use crate::{Endpoint, ServiceError, reject};

/// Server side of the upload protocol, rooted at one upload directory.
#[derive(Debug, Clone)]
pub struct UploadService {
    store: ChunkStore,
    merger: MergeEngine,
}

impl UploadService {
    pub fn new(upload_dir: impl Into<PathBuf>, merge_concurrency: usize) -> Self {
        let store = ChunkStore::new(upload_dir);
        let merger = MergeEngine::new(store.clone(), merge_concurrency);
        Self { store, merger }
    }

    /// Creates the upload directory.
    pub async fn init(&self) -> Result<(), ServiceError> {
        self.store.init().await?;
        Ok(())
    }

    pub fn upload_dir(&self) -> &Path {
        self.store.root()
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    // -- typed operations --------------------------------------------------

    /// Stages one chunk. Re-uploading a key replaces its content.
    pub async fn upload_chunk(
        &self,
        fields: &UploadChunkFields,
        bytes: &[u8],
    ) -> Result<(), ServiceError> {
        require("fileHash", &fields.file_hash)?;
        require("chunkHash", &fields.chunk_hash)?;

        self.store
            .put_chunk(&fields.file_hash, &fields.chunk_hash, bytes)
            .await?;
        info!(
            file_hash = %fields.file_hash,
            chunk = %fields.chunk_hash,
            bytes = bytes.len(),
            "chunk stored"
        );
        Ok(())
    }

    /// Assembles the staged chunks of a file into `<fileHash><ext>`.
    pub async fn merge(&self, req: &MergeRequest) -> Result<PathBuf, ServiceError> {
        require("fileHash", &req.file_hash)?;
        if req.chunk_size == 0 {
            return Err(ServiceError::InvalidRequest("chunkSize must be positive".into()));
        }

        let path = self
            .merger
            .merge(&req.file_hash, &req.file_name, req.chunk_size)
            .await?;
        Ok(path)
    }

    /// Reports whether the file exists, and if not, which chunks are staged.
    pub async fn verify(&self, req: &VerifyRequest) -> Result<VerifyData, ServiceError> {
        require("fileHash", &req.file_hash)?;
        let ext = extract_ext(&req.file_name);

        if self.store.final_file_exists(&req.file_hash, ext).await? {
            return Ok(VerifyData::already_uploaded());
        }
        let staged = self.store.list_chunks(&req.file_hash).await?;
        Ok(VerifyData::missing(staged))
    }

    /// Deletes a merged file. Staged chunks are not touched.
    pub async fn delete_file(&self, req: &DelFileRequest) -> Result<(), ServiceError> {
        require("fileHash", &req.file_hash)?;
        let ext = extract_ext(&req.file_name);

        self.store.delete_final_file(&req.file_hash, ext).await?;
        info!(file_hash = %req.file_hash, ext, "file deleted");
        Ok(())
    }

    // -- envelope handlers -------------------------------------------------

    pub async fn handle_upload(
        &self,
        fields: UploadChunkFields,
        bytes: &[u8],
    ) -> ApiResponse<UploadChunkData> {
        match self.upload_chunk(&fields, bytes).await {
            Ok(()) => ApiResponse::ok(fields.into(), "chunk uploaded"),
            Err(e) => failed(Endpoint::Upload, &e),
        }
    }

    pub async fn handle_merge(&self, req: MergeRequest) -> ApiResponse<String> {
        match self.merge(&req).await {
            Ok(_) => ApiResponse::ok(String::new(), "file merged"),
            Err(e) => failed(Endpoint::Merge, &e),
        }
    }

    pub async fn handle_verify(&self, req: VerifyRequest) -> ApiResponse<VerifyData> {
        match self.verify(&req).await {
            Ok(data) if !data.should_upload => ApiResponse::ok(data, "file already exists"),
            Ok(data) => ApiResponse::ok(data, "file or some chunks need uploading"),
            Err(e) => failed(Endpoint::Verify, &e),
        }
    }

    pub async fn handle_del_file(&self, req: DelFileRequest) -> ApiResponse<String> {
        match self.delete_file(&req).await {
            Ok(()) => ApiResponse::ok(String::new(), "file deleted"),
            Err(e) => failed(Endpoint::DelFile, &e),
        }
    }
}

fn require(name: &'static str, value: &str) -> Result<(), ServiceError> {
    if value.is_empty() {
        return Err(ServiceError::MissingField(name));
    }
    Ok(())
}

fn failed<T>(endpoint: Endpoint, err: &ServiceError) -> ApiResponse<T> {
    if err.is_client_error() {
        warn!(endpoint = endpoint.path(), error = %err, "rejected request");
    } else {
        warn!(endpoint = endpoint.path(), error = %err, "request failed");
    }
    reject(endpoint, err)
}
