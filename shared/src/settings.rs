//! Dynamic settings read by the storage layer.
//!
//! Values are looked up on every call; nothing here caches across operations,
//! so an operator toggling a setting is picked up by the very next request.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::debug;

use crate::storage::encryption::{derive_aes256_key, EncryptionKey};
use crate::storage::StorageError;

pub const STORAGE_NAMESPACE: &str = "storage";
pub const ENCRYPTION_ENABLED: &str = "encryption.enabled";
pub const ENCRYPTION_KEY: &str = "encryption.key";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Settings store unavailable: {0}")]
    Unavailable(String),
}

impl From<SettingsError> for StorageError {
    fn from(err: SettingsError) -> Self {
        StorageError::Backend(err.to_string())
    }
}

#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, SettingsError>;

    async fn get_bool(&self, namespace: &str, key: &str) -> Result<bool, SettingsError> {
        Ok(self
            .get(namespace, key)
            .await?
            .map(|value| parse_bool(&value))
            .unwrap_or(false))
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Snapshot of the encryption policy for a single operation.
#[derive(Debug, Clone)]
pub struct EncryptionSettings {
    pub encrypt_on_write: bool,
    pub key: Option<EncryptionKey>,
}

impl EncryptionSettings {
    pub async fn load(settings: &dyn SettingsProvider) -> Result<Self, StorageError> {
        let encrypt_on_write = settings
            .get_bool(STORAGE_NAMESPACE, ENCRYPTION_ENABLED)
            .await?;
        let raw_key = settings.get(STORAGE_NAMESPACE, ENCRYPTION_KEY).await?;

        let key = match raw_key {
            Some(raw) if !raw.is_empty() => Some(derive_aes256_key(&raw)?),
            _ => None,
        };

        Ok(Self {
            encrypt_on_write,
            key,
        })
    }
}

pub async fn is_storage_encryption_enabled(
    settings: &dyn SettingsProvider,
) -> Result<bool, SettingsError> {
    settings
        .get_bool(STORAGE_NAMESPACE, ENCRYPTION_ENABLED)
        .await
}

/// Process-local settings, mostly for development and tests.
#[derive(Debug, Default, Clone)]
pub struct InMemorySettings {
    values: Arc<RwLock<HashMap<(String, String), String>>>,
}

impl InMemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, namespace: &str, key: &str, value: impl Into<String>) {
        if let Ok(mut values) = self.values.write() {
            values.insert((namespace.to_string(), key.to_string()), value.into());
        }
    }

    pub fn remove(&self, namespace: &str, key: &str) {
        if let Ok(mut values) = self.values.write() {
            values.remove(&(namespace.to_string(), key.to_string()));
        }
    }
}

#[async_trait]
impl SettingsProvider for InMemorySettings {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, SettingsError> {
        let values = self
            .values
            .read()
            .map_err(|_| SettingsError::Unavailable("settings lock poisoned".to_string()))?;
        Ok(values
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }
}

/// Reads `SETTINGS_<NAMESPACE>_<KEY>` from the process environment on every call,
/// e.g. `SETTINGS_STORAGE_ENCRYPTION_ENABLED`.
#[derive(Debug, Default, Clone)]
pub struct EnvSettings;

impl EnvSettings {
    pub fn variable_name(namespace: &str, key: &str) -> String {
        format!("SETTINGS_{}_{}", namespace, key)
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect()
    }
}

#[async_trait]
impl SettingsProvider for EnvSettings {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, SettingsError> {
        Ok(std::env::var(Self::variable_name(namespace, key)).ok())
    }
}

/// Settings stored as Redis hashes: `HGET settings:<namespace> <key>`.
#[derive(Clone)]
pub struct RedisSettings {
    connection: ConnectionManager,
}

impl RedisSettings {
    pub async fn connect(redis_url: &str) -> Result<Self, SettingsError> {
        let client = redis::Client::open(redis_url)?;
        let connection = ConnectionManager::new(client).await?;
        debug!("Connected settings store to redis");
        Ok(Self { connection })
    }

    fn hash_key(namespace: &str) -> String {
        format!("settings:{}", namespace)
    }
}

#[async_trait]
impl SettingsProvider for RedisSettings {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, SettingsError> {
        let mut connection = self.connection.clone();
        let value: Option<String> = connection.hget(Self::hash_key(namespace), key).await?;
        Ok(value)
    }
}
