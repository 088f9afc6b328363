pub mod catalog;
pub mod config;
pub mod db;
pub mod public_file;
pub mod settings;
pub mod storage;
pub mod telemetry;
pub mod utils;

pub use catalog::{InMemoryPhotoCatalog, PhotoCatalog, PhotoRecord};
pub use config::{LocalStorageConfig, OpenListConfig, SettingsConfig, StorageConfig};
pub use db::{DatabaseConfig, DatabaseError, DatabasePool};
pub use settings::{EncryptionSettings, InMemorySettings, SettingsProvider};
pub use storage::{
    ByteStream, EncryptedStorageProvider, InMemoryStorageProvider, LocalStorageProvider,
    OpenListStorageProvider, StorageError, StorageObject, StorageProvider,
};
pub use telemetry::init_tracing;
