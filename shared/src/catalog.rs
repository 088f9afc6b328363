//! Photo lookups used to decide whether an anonymous viewer may fetch a key.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use crate::db::error::DatabaseError;

#[async_trait]
pub trait PhotoCatalog: Send + Sync {
    /// Id of a photo referencing `key` as its storage, thumbnail or live-photo
    /// video key, or whose storage key is one of `source_candidates`.
    async fn find_photo_id(
        &self,
        key: &str,
        source_candidates: &[String],
    ) -> Result<Option<String>, DatabaseError>;

    async fn is_in_hidden_album(&self, photo_id: &str) -> Result<bool, DatabaseError>;
}

#[derive(Debug, Clone, Default)]
pub struct PhotoRecord {
    pub id: String,
    pub storage_key: String,
    pub thumbnail_key: Option<String>,
    pub live_photo_video_key: Option<String>,
}

impl PhotoRecord {
    pub fn new(id: impl Into<String>, storage_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            storage_key: storage_key.into(),
            ..Self::default()
        }
    }

    pub fn with_thumbnail(mut self, key: impl Into<String>) -> Self {
        self.thumbnail_key = Some(key.into());
        self
    }

    pub fn with_live_photo_video(mut self, key: impl Into<String>) -> Self {
        self.live_photo_video_key = Some(key.into());
        self
    }

    fn references(&self, key: &str) -> bool {
        self.storage_key == key
            || self.thumbnail_key.as_deref() == Some(key)
            || self.live_photo_video_key.as_deref() == Some(key)
    }
}

#[derive(Debug, Default)]
struct CatalogState {
    photos: Vec<PhotoRecord>,
    hidden: HashSet<String>,
}

/// Catalog kept in process memory, for tests and database-less deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPhotoCatalog {
    state: Arc<RwLock<CatalogState>>,
}

impl InMemoryPhotoCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, photo: PhotoRecord) {
        if let Ok(mut state) = self.state.write() {
            state.photos.push(photo);
        }
    }

    /// Mark the photo as a member of a hidden album.
    pub fn hide(&self, photo_id: &str) {
        if let Ok(mut state) = self.state.write() {
            state.hidden.insert(photo_id.to_string());
        }
    }
}

#[async_trait]
impl PhotoCatalog for InMemoryPhotoCatalog {
    async fn find_photo_id(
        &self,
        key: &str,
        source_candidates: &[String],
    ) -> Result<Option<String>, DatabaseError> {
        let state = self
            .state
            .read()
            .map_err(|_| DatabaseError::Unavailable("catalog lock poisoned".to_string()))?;

        Ok(state
            .photos
            .iter()
            .find(|p| p.references(key) || source_candidates.contains(&p.storage_key))
            .map(|p| p.id.clone()))
    }

    async fn is_in_hidden_album(&self, photo_id: &str) -> Result<bool, DatabaseError> {
        let state = self
            .state
            .read()
            .map_err(|_| DatabaseError::Unavailable("catalog lock poisoned".to_string()))?;
        Ok(state.hidden.contains(photo_id))
    }
}
