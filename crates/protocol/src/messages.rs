use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Text fields of a `/upload` multipart form. The chunk bytes travel in the
/// `chunkFile` part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadChunkFields {
    pub file_hash: String,
    pub chunk_hash: String,
    pub file_name: String,
}

/// Name of the multipart part carrying chunk bytes.
pub const CHUNK_FILE_FIELD: &str = "chunkFile";

/// Asks the server to assemble a staged file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub file_hash: String,
    pub file_name: String,
    pub chunk_size: u64,
}

/// Asks whether a file (or some of its chunks) is already on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub file_hash: String,
    pub file_name: String,
}

/// Deletes a merged file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelFileRequest {
    pub file_hash: String,
    pub file_name: String,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// `msg` of the `/delFile` failure returned when the merged file is absent.
pub const MSG_FILE_NOT_FOUND: &str = "file not found";

/// `msg` of the `/merge` failure returned when staged chunks were cut with a
/// different chunk size than the one requested.
pub const MSG_CHUNK_SIZE_MISMATCH: &str = "staged chunks do not match chunk size";

/// Echo of a stored chunk's identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadChunkData {
    pub file_hash: String,
    pub chunk_hash: String,
    pub file_name: String,
}

impl From<UploadChunkFields> for UploadChunkData {
    fn from(fields: UploadChunkFields) -> Self {
        Self {
            file_hash: fields.file_hash,
            chunk_hash: fields.chunk_hash,
            file_name: fields.file_name,
        }
    }
}

/// Result of `/verify`.
///
/// `should_upload == false` means the merged file already exists. Otherwise
/// `uploaded_list` holds the chunk keys already staged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyData {
    pub should_upload: bool,
    #[serde(default)]
    pub uploaded_list: Vec<String>,
}

impl VerifyData {
    pub fn already_uploaded() -> Self {
        Self {
            should_upload: false,
            uploaded_list: Vec::new(),
        }
    }

    pub fn missing(uploaded_list: Vec<String>) -> Self {
        Self {
            should_upload: true,
            uploaded_list,
        }
    }
}
