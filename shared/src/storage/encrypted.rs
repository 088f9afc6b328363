use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::encryption::{decrypt_buffer, encrypt_buffer, is_encrypted_payload};
use super::{
    collect_stream, ByteStream, SignedUrlProvider, StorageError, StorageObject, StorageProvider,
    OPAQUE_CONTENT_TYPE,
};
use crate::settings::{EncryptionSettings, SettingsProvider};

/// Wraps another provider and applies the current encryption policy on every
/// write and read. Objects written before a policy change keep their framing;
/// reads handle plaintext and encrypted objects side by side.
pub struct EncryptedStorageProvider {
    inner: Box<dyn StorageProvider>,
    settings: Arc<dyn SettingsProvider>,
}

impl EncryptedStorageProvider {
    pub fn new(inner: Box<dyn StorageProvider>, settings: Arc<dyn SettingsProvider>) -> Self {
        Self { inner, settings }
    }

    pub fn inner(&self) -> &dyn StorageProvider {
        self.inner.as_ref()
    }

    /// Bytes to hand to the inner provider, or `None` when encryption is off.
    async fn sealed_payload(&self, content: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let settings = EncryptionSettings::load(self.settings.as_ref()).await?;
        seal(&settings, content)
    }
}

fn missing_key_error() -> StorageError {
    StorageError::Config("Storage encryption is enabled but encryption key is not set".to_string())
}

fn seal(settings: &EncryptionSettings, content: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
    if !settings.encrypt_on_write {
        return Ok(None);
    }
    let key = settings.key.as_ref().ok_or_else(missing_key_error)?;

    if is_encrypted_payload(content) {
        debug!("Payload already framed as encrypted, storing unchanged");
        return Ok(Some(content.to_vec()));
    }

    Ok(Some(encrypt_buffer(content, key, None)?))
}

#[async_trait]
impl StorageProvider for EncryptedStorageProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn create(
        &self,
        key: &str,
        content: &[u8],
        content_type: Option<&str>,
    ) -> Result<StorageObject, StorageError> {
        match self.sealed_payload(content).await? {
            Some(payload) => {
                self.inner
                    .create(key, &payload, Some(OPAQUE_CONTENT_TYPE))
                    .await
            }
            None => self.inner.create(key, content, content_type).await,
        }
    }

    async fn create_from_stream(
        &self,
        key: &str,
        stream: ByteStream,
        content_length: Option<u64>,
        content_type: Option<&str>,
    ) -> Result<StorageObject, StorageError> {
        let settings = EncryptionSettings::load(self.settings.as_ref()).await?;
        if !settings.encrypt_on_write {
            return self
                .inner
                .create_from_stream(key, stream, content_length, content_type)
                .await;
        }
        if settings.key.is_none() {
            return Err(missing_key_error());
        }

        // GCM needs the whole plaintext before the tag exists
        let buffer = collect_stream(stream, content_length).await?;
        let payload = seal(&settings, &buffer)?.ok_or_else(missing_key_error)?;
        self.inner
            .create(key, &payload, Some(OPAQUE_CONTENT_TYPE))
            .await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let Some(payload) = self.inner.get(key).await? else {
            return Ok(None);
        };
        if !is_encrypted_payload(&payload) {
            return Ok(Some(payload));
        }

        let settings = EncryptionSettings::load(self.settings.as_ref()).await?;
        let encryption_key = settings.key.ok_or_else(|| {
            StorageError::Config(
                "Encrypted object found but encryption key is not set".to_string(),
            )
        })?;

        Ok(Some(decrypt_buffer(&payload, &encryption_key, None)?))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.inner.delete(key).await
    }

    async fn get_file_meta(&self, key: &str) -> Result<Option<StorageObject>, StorageError> {
        self.inner.get_file_meta(key).await
    }

    async fn list_all(&self) -> Result<Vec<StorageObject>, StorageError> {
        self.inner.list_all().await
    }

    async fn list_images(&self) -> Result<Vec<StorageObject>, StorageError> {
        self.inner.list_images().await
    }

    fn get_public_url(&self, key: &str) -> String {
        self.inner.get_public_url(key)
    }

    fn signed_urls(&self) -> Option<&dyn SignedUrlProvider> {
        self.inner.signed_urls()
    }
}
