use std::sync::Arc;
use tracing::info;

use super::{
    EncryptedStorageProvider, InMemoryStorageProvider, LocalStorageProvider,
    OpenListStorageProvider, StorageError, StorageProvider,
};
use crate::config::{SettingsConfig, StorageConfig};
use crate::settings::{EnvSettings, RedisSettings, SettingsProvider};

/// Build the configured backend, wrapped in the encrypting decorator.
///
/// The decorator is always present; whether it encrypts is decided per call
/// from the settings store.
pub fn create_storage_provider(
    config: &StorageConfig,
    settings: Arc<dyn SettingsProvider>,
) -> Result<Arc<dyn StorageProvider>, StorageError> {
    let backend: Box<dyn StorageProvider> = match config {
        StorageConfig::Local(local) => {
            info!("Using local storage at {}", local.base_dir.display());
            Box::new(LocalStorageProvider::new(local.clone()))
        }
        StorageConfig::OpenList(openlist) => {
            info!("Using OpenList storage at {}", openlist.base_url);
            Box::new(OpenListStorageProvider::new(openlist.clone())?)
        }
        StorageConfig::Memory => {
            info!("Using in-memory storage");
            Box::new(InMemoryStorageProvider::new())
        }
    };

    Ok(Arc::new(EncryptedStorageProvider::new(backend, settings)))
}

pub async fn create_settings_provider(
    config: &SettingsConfig,
) -> Result<Arc<dyn SettingsProvider>, StorageError> {
    match config {
        SettingsConfig::Env => Ok(Arc::new(EnvSettings)),
        SettingsConfig::Redis { url } => {
            info!("Reading dynamic settings from redis");
            Ok(Arc::new(RedisSettings::connect(url).await?))
        }
    }
}
