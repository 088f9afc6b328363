//! In-memory storage backend (development and tests)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use super::{collect_stream, ByteStream, StorageError, StorageObject, StorageProvider};
use crate::utils::encode_url_path;

#[derive(Debug, Clone)]
struct StoredObject {
    content: Vec<u8>,
    content_type: Option<String>,
    last_modified: DateTime<Utc>,
}

/// Thread-safe via `RwLock`. Not persistent, data is lost on drop.
#[derive(Debug, Default)]
pub struct InMemoryStorageProvider {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    public_base_url: Option<String>,
    writes: AtomicUsize,
}

impl InMemoryStorageProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_public_base_url(base_url: impl Into<String>) -> Self {
        Self {
            public_base_url: Some(base_url.into()),
            ..Self::default()
        }
    }

    /// Content type recorded by the last write to `key`
    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .ok()?
            .get(key)
            .and_then(|obj| obj.content_type.clone())
    }

    /// Number of writes that reached this backend
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|objects| objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_error() -> StorageError {
        StorageError::Backend("in-memory storage lock poisoned".to_string())
    }

    fn describe(key: &str, obj: &StoredObject) -> StorageObject {
        StorageObject {
            key: key.to_string(),
            size: Some(obj.content.len() as u64),
            last_modified: Some(obj.last_modified),
            etag: None,
        }
    }
}

#[async_trait]
impl StorageProvider for InMemoryStorageProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create(
        &self,
        key: &str,
        content: &[u8],
        content_type: Option<&str>,
    ) -> Result<StorageObject, StorageError> {
        let stored = StoredObject {
            content: content.to_vec(),
            content_type: content_type.map(str::to_string),
            last_modified: Utc::now(),
        };
        let described = Self::describe(key, &stored);

        self.objects
            .write()
            .map_err(|_| Self::lock_error())?
            .insert(key.to_string(), stored);
        self.writes.fetch_add(1, Ordering::SeqCst);

        Ok(described)
    }

    async fn create_from_stream(
        &self,
        key: &str,
        stream: ByteStream,
        content_length: Option<u64>,
        content_type: Option<&str>,
    ) -> Result<StorageObject, StorageError> {
        let content = collect_stream(stream, content_length).await?;
        self.create(key, &content, content_type).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self
            .objects
            .read()
            .map_err(|_| Self::lock_error())?
            .get(key)
            .map(|obj| obj.content.clone()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects
            .write()
            .map_err(|_| Self::lock_error())?
            .remove(key);
        Ok(())
    }

    async fn get_file_meta(&self, key: &str) -> Result<Option<StorageObject>, StorageError> {
        Ok(self
            .objects
            .read()
            .map_err(|_| Self::lock_error())?
            .get(key)
            .map(|obj| Self::describe(key, obj)))
    }

    async fn list_all(&self) -> Result<Vec<StorageObject>, StorageError> {
        Ok(self
            .objects
            .read()
            .map_err(|_| Self::lock_error())?
            .iter()
            .map(|(key, obj)| Self::describe(key, obj))
            .collect())
    }

    fn get_public_url(&self, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), encode_url_path(key)),
            None => String::new(),
        }
    }
}
