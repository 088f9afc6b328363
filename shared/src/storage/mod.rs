pub mod backoff;
pub mod encrypted;
pub mod encryption;
pub mod factory;
pub mod local;
pub mod memory;
pub mod openlist;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use encrypted::EncryptedStorageProvider;
pub use local::LocalStorageProvider;
pub use memory::InMemoryStorageProvider;
pub use openlist::OpenListStorageProvider;

/// Content type written for payloads whose original type no longer applies.
pub const OPAQUE_CONTENT_TYPE: &str = "application/octet-stream";

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "gif", "bmp", "tif", "tiff", "heic", "heif",
];

/// Chunked upload body. Callers own the stream; it is dropped once the upload
/// completes or fails.
pub type ByteStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderFailure {
    EntityTooLarge,
    RequestFailed,
}

impl ProviderFailure {
    pub fn from_status(status: u16) -> Self {
        if status == 413 {
            ProviderFailure::EntityTooLarge
        } else {
            ProviderFailure::RequestFailed
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProviderFailure::EntityTooLarge => "Request Entity Too Large",
            ProviderFailure::RequestFailed => "Request Failed",
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("{message}")]
    Provider {
        provider: String,
        status: u16,
        kind: ProviderFailure,
        message: String,
        body: String,
    },
    #[error("Integrity error: {0}")]
    Integrity(String),
    #[error("Storage error: {0}")]
    Backend(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl StorageError {
    pub fn provider(provider: &str, status: u16, operation: &str, body: String) -> Self {
        let kind = ProviderFailure::from_status(status);
        StorageError::Provider {
            provider: provider.to_string(),
            status,
            kind,
            message: format!("{} {} failed: {} {}", provider, operation, status, kind.label()),
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageObject {
    pub key: String,
    pub size: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

impl StorageObject {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size: None,
            last_modified: None,
            etag: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignedUrlOptions {
    /// Content type the holder of the URL is allowed to use.
    pub content_type: Option<String>,
}

/// Temporary direct access to objects, for backends that can mint it.
#[async_trait]
pub trait SignedUrlProvider: Send + Sync {
    async fn get_signed_url(
        &self,
        key: &str,
        expires_in: Option<Duration>,
        options: &SignedUrlOptions,
    ) -> Result<String, StorageError>;

    /// Check the `expires`/`signature` pair of a URL minted by `get_signed_url`.
    fn verify_signed_url(
        &self,
        key: &str,
        expires_at: i64,
        signature: &str,
        content_type: Option<&str>,
        now: DateTime<Utc>,
    ) -> bool;
}

#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Short backend identifier used in logs and error reports
    fn name(&self) -> &str;

    /// Write a full buffer under `key`. Concurrent writes to the same key race; last one wins.
    async fn create(
        &self,
        key: &str,
        content: &[u8],
        content_type: Option<&str>,
    ) -> Result<StorageObject, StorageError>;

    /// Streamed variant of `create`
    async fn create_from_stream(
        &self,
        key: &str,
        stream: ByteStream,
        content_length: Option<u64>,
        content_type: Option<&str>,
    ) -> Result<StorageObject, StorageError>;

    /// Fetch an object. `None` means the object does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    async fn get_file_meta(&self, key: &str) -> Result<Option<StorageObject>, StorageError>;

    async fn list_all(&self) -> Result<Vec<StorageObject>, StorageError>;

    async fn list_images(&self) -> Result<Vec<StorageObject>, StorageError> {
        let all = self.list_all().await?;
        Ok(all.into_iter().filter(|obj| is_image_key(&obj.key)).collect())
    }

    /// Direct URL for the object, or an empty string when the backend has no public scheme
    fn get_public_url(&self, key: &str) -> String;

    fn signed_urls(&self) -> Option<&dyn SignedUrlProvider> {
        None
    }
}

#[async_trait]
impl<T: StorageProvider + ?Sized> StorageProvider for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn create(
        &self,
        key: &str,
        content: &[u8],
        content_type: Option<&str>,
    ) -> Result<StorageObject, StorageError> {
        (**self).create(key, content, content_type).await
    }

    async fn create_from_stream(
        &self,
        key: &str,
        stream: ByteStream,
        content_length: Option<u64>,
        content_type: Option<&str>,
    ) -> Result<StorageObject, StorageError> {
        (**self)
            .create_from_stream(key, stream, content_length, content_type)
            .await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        (**self).delete(key).await
    }

    async fn get_file_meta(&self, key: &str) -> Result<Option<StorageObject>, StorageError> {
        (**self).get_file_meta(key).await
    }

    async fn list_all(&self) -> Result<Vec<StorageObject>, StorageError> {
        (**self).list_all().await
    }

    async fn list_images(&self) -> Result<Vec<StorageObject>, StorageError> {
        (**self).list_images().await
    }

    fn get_public_url(&self, key: &str) -> String {
        (**self).get_public_url(key)
    }

    fn signed_urls(&self) -> Option<&dyn SignedUrlProvider> {
        (**self).signed_urls()
    }
}

impl fmt::Debug for dyn StorageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageProvider({})", self.name())
    }
}

pub fn is_image_key(key: &str) -> bool {
    key.rsplit_once('.')
        .map(|(_, ext)| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Drain an upload stream into memory, for backends or layers that need the whole payload.
pub async fn collect_stream(
    mut stream: ByteStream,
    size_hint: Option<u64>,
) -> Result<Vec<u8>, StorageError> {
    use futures_util::StreamExt;

    let mut buffer = Vec::with_capacity(size_hint.unwrap_or(0).min(64 * 1024 * 1024) as usize);
    while let Some(chunk) = stream.next().await {
        buffer.extend_from_slice(&chunk?);
    }
    Ok(buffer)
}
