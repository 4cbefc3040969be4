//! HTTP surface: four POST endpoints, each answering with the JSON envelope.
//!
//! Every request gets HTTP 200; failures are reported through `code` and
//! `msg`. The routes are served both at the root and under `/api`.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::multipart::{Field, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::post;
use chunkload_protocol::{
    ApiResponse, CHUNK_FILE_FIELD, DelFileRequest, MergeRequest, UploadChunkData,
    UploadChunkFields, VerifyData, VerifyRequest,
};
use chunkload_service::{Endpoint, ServiceError, UploadService, reject};
use serde::de::DeserializeOwned;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

type AppState = Arc<UploadService>;

/// Builds the application router.
pub fn create_router(service: Arc<UploadService>, max_chunk_bytes: usize) -> Router {
    let api = api_router();
    Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(max_chunk_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}

fn api_router() -> Router<AppState> {
    Router::new()
        .route(Endpoint::Upload.path(), post(upload))
        .route(Endpoint::Merge.path(), post(merge))
        .route(Endpoint::Verify.path(), post(verify))
        .route(Endpoint::DelFile.path(), post(del_file))
}

async fn upload(
    State(service): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Json<ApiResponse<UploadChunkData>> {
    match read_upload_form(multipart).await {
        Ok((fields, chunk)) => Json(service.handle_upload(fields, &chunk).await),
        Err(e) => Json(reject(Endpoint::Upload, &e)),
    }
}

async fn merge(State(service): State<AppState>, body: Bytes) -> Json<ApiResponse<String>> {
    match parse_json::<MergeRequest>(&body) {
        Ok(req) => Json(service.handle_merge(req).await),
        Err(e) => Json(reject(Endpoint::Merge, &e)),
    }
}

async fn verify(State(service): State<AppState>, body: Bytes) -> Json<ApiResponse<VerifyData>> {
    match parse_json::<VerifyRequest>(&body) {
        Ok(req) => Json(service.handle_verify(req).await),
        Err(e) => Json(reject(Endpoint::Verify, &e)),
    }
}

async fn del_file(State(service): State<AppState>, body: Bytes) -> Json<ApiResponse<String>> {
    match parse_json::<DelFileRequest>(&body) {
        Ok(req) => Json(service.handle_del_file(req).await),
        Err(e) => Json(reject(Endpoint::DelFile, &e)),
    }
}

/// Parses a JSON body regardless of its `Content-Type`.
fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ServiceError> {
    serde_json::from_slice(body)
        .map_err(|e| ServiceError::InvalidRequest(format!("malformed JSON body: {e}")))
}

/// Collects the text fields and the chunk part of an `/upload` form.
/// Unknown parts are ignored.
async fn read_upload_form(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(UploadChunkFields, Bytes), ServiceError> {
    let mut multipart = multipart.map_err(|e| ServiceError::InvalidRequest(e.body_text()))?;

    let mut file_hash = None;
    let mut chunk_hash = None;
    let mut file_name = None;
    let mut chunk = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::InvalidRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "fileHash" => file_hash = Some(field_text(field).await?),
            "chunkHash" => chunk_hash = Some(field_text(field).await?),
            "fileName" => file_name = Some(field_text(field).await?),
            CHUNK_FILE_FIELD => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServiceError::InvalidRequest(e.body_text()))?;
                chunk = Some(bytes);
            }
            _ => {}
        }
    }

    let fields = UploadChunkFields {
        file_hash: file_hash.ok_or(ServiceError::MissingField("fileHash"))?,
        chunk_hash: chunk_hash.ok_or(ServiceError::MissingField("chunkHash"))?,
        file_name: file_name.ok_or(ServiceError::MissingField("fileName"))?,
    };
    let chunk = chunk.ok_or(ServiceError::MissingField(CHUNK_FILE_FIELD))?;
    Ok((fields, chunk))
}

async fn field_text(field: Field<'_>) -> Result<String, ServiceError> {
    field
        .text()
        .await
        .map_err(|e| ServiceError::InvalidRequest(e.body_text()))
}
