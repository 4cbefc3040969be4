//! `ChunkServer` over HTTP with `reqwest`.

use std::time::Duration;

use chunkload_protocol::{
    ApiResponse, CHUNK_FILE_FIELD, DelFileRequest, MSG_CHUNK_SIZE_MISMATCH, MSG_FILE_NOT_FOUND,
    MergeRequest,
    UploadChunkData, UploadChunkFields, VerifyData, VerifyRequest,
};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::error::UploadError;
use crate::server::{ChunkServer, ServerFuture};
use crate::types::DeleteOutcome;

/// Per-request timeout used by [`HttpChunkServer::new`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const UPLOAD: &str = "/upload";
const MERGE: &str = "/merge";
const VERIFY: &str = "/verify";
const DEL_FILE: &str = "/delFile";

/// HTTP client for a chunkload server.
#[derive(Debug, Clone)]
pub struct HttpChunkServer {
    http: reqwest::Client,
    base_url: String,
}

impl HttpChunkServer {
    /// Creates a client for `base_url` (e.g. `http://127.0.0.1:3000`).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, UploadError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http, base_url))
    }

    /// Uses a preconfigured `reqwest` client.
    pub fn with_client(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Sends a request and parses the envelope without decoding `data`.
    async fn send(
        &self,
        endpoint: &'static str,
        req: reqwest::RequestBuilder,
    ) -> Result<ApiResponse<serde_json::Value>, UploadError> {
        let resp = req.send().await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UploadError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.bytes().await?;
        let envelope = ApiResponse::from_slice(&body)?;
        trace!(endpoint, code = envelope.code, msg = %envelope.msg, "response");
        Ok(envelope)
    }

    async fn post_json<B: Serialize>(
        &self,
        endpoint: &'static str,
        body: &B,
    ) -> Result<ApiResponse<serde_json::Value>, UploadError> {
        let req = self.http.post(self.url(endpoint)).json(body);
        self.send(endpoint, req).await
    }
}

/// Fails on an error envelope, otherwise decodes `data`.
fn expect_data<T: DeserializeOwned>(
    endpoint: &'static str,
    envelope: ApiResponse<serde_json::Value>,
) -> Result<T, UploadError> {
    expect_ok(endpoint, &envelope)?;
    Ok(envelope.into_data()?)
}

fn expect_ok(
    endpoint: &'static str,
    envelope: &ApiResponse<serde_json::Value>,
) -> Result<(), UploadError> {
    if envelope.is_ok() {
        Ok(())
    } else {
        Err(UploadError::Rejected {
            endpoint,
            msg: envelope.msg.clone(),
        })
    }
}

/// Like [`expect_ok`], but a chunk size mismatch is terminal.
fn expect_merged(
    envelope: &ApiResponse<serde_json::Value>,
    chunk_size: u64,
) -> Result<(), UploadError> {
    if !envelope.is_ok() && envelope.msg == MSG_CHUNK_SIZE_MISMATCH {
        return Err(UploadError::ChunkSizeMismatch { chunk_size });
    }
    expect_ok(MERGE, envelope)
}

impl ChunkServer for HttpChunkServer {
    fn verify(&self, req: VerifyRequest) -> ServerFuture<'_, VerifyData> {
        Box::pin(async move {
            let envelope = self.post_json(VERIFY, &req).await?;
            expect_data(VERIFY, envelope)
        })
    }

    fn upload_chunk(
        &self,
        fields: UploadChunkFields,
        data: Vec<u8>,
    ) -> ServerFuture<'_, UploadChunkData> {
        Box::pin(async move {
            let part = Part::bytes(data).file_name(fields.chunk_hash.clone());
            let form = Form::new()
                .text("fileHash", fields.file_hash)
                .text("chunkHash", fields.chunk_hash)
                .text("fileName", fields.file_name)
                .part(CHUNK_FILE_FIELD, part);

            let req = self.http.post(self.url(UPLOAD)).multipart(form);
            let envelope = self.send(UPLOAD, req).await?;
            expect_data(UPLOAD, envelope)
        })
    }

    fn merge(&self, req: MergeRequest) -> ServerFuture<'_, ()> {
        Box::pin(async move {
            let envelope = self.post_json(MERGE, &req).await?;
            expect_merged(&envelope, req.chunk_size)
        })
    }

    fn delete_file(&self, req: DelFileRequest) -> ServerFuture<'_, DeleteOutcome> {
        Box::pin(async move {
            let envelope = self.post_json(DEL_FILE, &req).await?;
            if envelope.is_ok() {
                Ok(DeleteOutcome::Deleted)
            } else if envelope.msg == MSG_FILE_NOT_FOUND {
                Ok(DeleteOutcome::NotFound)
            } else {
                Err(UploadError::Rejected {
                    endpoint: DEL_FILE,
                    msg: envelope.msg,
                })
            }
        })
    }
}
