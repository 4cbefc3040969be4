use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chunkload_protocol::parse_chunk_index;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::validation::{validate_chunk_key, validate_ext, validate_file_hash};
use crate::{Missing, Operation, STAGING_PREFIX, StoreError};

/// Filesystem layout of staged chunks and merged files under one root.
///
/// Cloning is cheap; every clone addresses the same directory.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the upload root if it does not exist yet.
    pub async fn init(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the staged chunks of `file_hash`.
    pub fn staging_dir(&self, file_hash: &str) -> PathBuf {
        self.root.join(format!("{STAGING_PREFIX}{file_hash}"))
    }

    /// Path of the merged file for `file_hash` with extension `ext`.
    pub fn final_path(&self, file_hash: &str, ext: &str) -> PathBuf {
        self.root.join(format!("{file_hash}{ext}"))
    }

    /// Stores one chunk under `chunk_key`, replacing any previous copy.
    ///
    /// The bytes land in a hidden temp file first and are renamed into place,
    /// so a chunk is either listed complete or not listed at all.
    pub async fn put_chunk(
        &self,
        file_hash: &str,
        chunk_key: &str,
        data: &[u8],
    ) -> Result<PathBuf, StoreError> {
        validate_file_hash(file_hash)?;
        validate_chunk_key(chunk_key)?;

        let dir = self.staging_dir(file_hash);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(StoreError::io(Operation::PutChunk, file_hash))?;

        let dest = dir.join(chunk_key);
        let tmp = dir.join(format!(".{chunk_key}.{}.tmp", uuid::Uuid::new_v4()));

        if let Err(e) = write_synced(&tmp, data).await {
            remove_quietly(&tmp).await;
            return Err(StoreError::io(Operation::PutChunk, file_hash)(e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &dest).await {
            remove_quietly(&tmp).await;
            return Err(StoreError::io(Operation::PutChunk, file_hash)(e));
        }

        debug!(file_hash, chunk_key, bytes = data.len(), "chunk staged");
        Ok(dest)
    }

    /// Lists the staged chunk keys of `file_hash` in ascending index order.
    ///
    /// A missing staging directory yields an empty list. Keys without a
    /// parseable index sort last, by name.
    pub async fn list_chunks(&self, file_hash: &str) -> Result<Vec<String>, StoreError> {
        validate_file_hash(file_hash)?;

        let dir = self.staging_dir(file_hash);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(Operation::ListChunks, file_hash)(e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(StoreError::io(Operation::ListChunks, file_hash))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let file_type = entry
                .file_type()
                .await
                .map_err(StoreError::io(Operation::ListChunks, file_hash))?;
            if file_type.is_file() {
                keys.push(name);
            }
        }

        sort_by_index(&mut keys);
        Ok(keys)
    }

    /// Returns whether the merged file for `file_hash` exists.
    pub async fn final_file_exists(&self, file_hash: &str, ext: &str) -> Result<bool, StoreError> {
        validate_file_hash(file_hash)?;
        validate_ext(ext)?;

        tokio::fs::try_exists(self.final_path(file_hash, ext))
            .await
            .map_err(StoreError::io(Operation::FinalFileExists, file_hash))
    }

    /// Removes the merged file. Fails with [`StoreError::NotFound`] if absent.
    ///
    /// Staged chunks are left alone.
    pub async fn delete_final_file(&self, file_hash: &str, ext: &str) -> Result<(), StoreError> {
        validate_file_hash(file_hash)?;
        validate_ext(ext)?;

        let path = self.final_path(file_hash, ext);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "final file deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound {
                what: Missing::FinalFile,
                file_hash: file_hash.to_string(),
            }),
            Err(e) => Err(StoreError::io(Operation::DeleteFinalFile, file_hash)(e)),
        }
    }

    /// Removes the staging directory of `file_hash` and everything in it.
    pub(crate) async fn purge_staging(&self, file_hash: &str) -> Result<(), StoreError> {
        let dir = self.staging_dir(file_hash);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(Operation::PurgeStaging, file_hash)(e)),
        }
    }
}

fn sort_by_index(keys: &mut [String]) {
    keys.sort_by(|a, b| {
        let ka = parse_chunk_index(a);
        let kb = parse_chunk_index(b);
        (ka.is_none(), ka, a.as_str()).cmp(&(kb.is_none(), kb, b.as_str()))
    });
}

async fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to remove temp file");
    }
}
