//! Blob storage for uploaded movie files.

use crate::catalog_store::validation::{validate_asset_key, ValidationError};
use crate::catalog_store::CatalogError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file name: {0:?}")]
    InvalidName(String),

    #[error("File too large: {0} bytes (max: {1})")]
    TooLarge(u64, u64),

    #[error("No stored file with key {0:?}")]
    NotFound(String),
}

impl BlobError {
    pub fn into_catalog_error(self, operation: &'static str) -> CatalogError {
        match self {
            BlobError::NotFound(key) => CatalogError::asset_not_found(operation, &key),
            BlobError::InvalidName(name) => CatalogError::invalid(
                operation,
                ValidationError::InvalidCharacters {
                    field: "file name",
                    value: name,
                },
            ),
            BlobError::TooLarge(size, max) => CatalogError::invalid(
                operation,
                ValidationError::Malformed {
                    field: "file",
                    reason: format!("{} bytes exceeds the {} bytes limit", size, max),
                },
            ),
            err @ BlobError::Io(_) => {
                error!("Blob store failure during {}: {}", operation, err);
                CatalogError::collaborator(operation, "blob store", err)
            }
        }
    }
}

/// Description of a file that was written to the blob store.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct StoredBlob {
    pub key: String,
    pub size: u64,
    /// Hex digest of the content.
    pub sha256: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `data` under a key derived from `name`, overwriting a previous file with the same key.
    async fn store(&self, name: &str, data: &[u8]) -> Result<StoredBlob, BlobError>;

    async fn fetch(&self, key: &str) -> Result<Vec<u8>, BlobError>;

    /// Keys of every stored file.
    async fn list_keys(&self) -> Result<Vec<String>, BlobError>;
}

/// Keeps each blob as a plain file named after its key.
pub struct FsBlobStore {
    root: PathBuf,
    max_size: u64,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, max_size: u64) -> Self {
        Self {
            root: root.into(),
            max_size,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the blob directory.
    pub async fn init(&self) -> Result<(), BlobError> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, BlobError> {
        validate_asset_key(key).map_err(|_| BlobError::InvalidName(key.to_string()))?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn store(&self, name: &str, data: &[u8]) -> Result<StoredBlob, BlobError> {
        let size = data.len() as u64;
        if size > self.max_size {
            return Err(BlobError::TooLarge(size, self.max_size));
        }

        let key = sanitize_filename(name)?;
        let path = self.path_for(&key)?;

        // Readers never see a half-written file under the final name.
        let temp_path = self.root.join(format!(".{}.part", uuid::Uuid::new_v4()));
        let write = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&temp_path, &path).await
        };
        if let Err(e) = write.await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        let sha256 = format!("{:x}", Sha256::digest(data));
        debug!("Stored blob {} ({} bytes, sha256 {})", key, size, sha256);
        Ok(StoredBlob { key, size, sha256 })
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_keys(&self) -> Result<Vec<String>, BlobError> {
        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    keys.push(name.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Turns an uploaded file name into a blob key, rejecting path traversal.
fn sanitize_filename(filename: &str) -> Result<String, BlobError> {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| BlobError::InvalidName(filename.to_string()))?;

    if name.contains('\0') || name.starts_with('.') {
        return Err(BlobError::InvalidName(filename.to_string()));
    }

    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            _ => c,
        })
        .collect();

    validate_asset_key(&sanitized).map_err(|_| BlobError::InvalidName(filename.to_string()))?;
    Ok(sanitized)
}
