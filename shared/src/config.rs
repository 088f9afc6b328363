use std::env;
use std::path::PathBuf;
use url::Url;

use crate::storage::StorageError;

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Default)]
pub struct OpenListConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub root_path: Option<String>,
    pub cdn_url: Option<String>,
    pub upload_endpoint: Option<String>,
    pub download_endpoint: Option<String>,
    pub meta_endpoint: Option<String>,
    pub list_endpoint: Option<String>,
    pub delete_endpoint: Option<String>,
    /// JSON field carrying the path in meta/list requests
    pub path_field: Option<String>,
}

impl OpenListConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self, StorageError> {
        let base_url = optional_env("OPENLIST_BASE_URL").ok_or_else(|| {
            StorageError::Config("OPENLIST_BASE_URL must be set for the openlist provider".into())
        })?;
        Url::parse(&base_url)
            .map_err(|e| StorageError::Config(format!("Invalid OPENLIST_BASE_URL: {}", e)))?;

        Ok(Self {
            base_url,
            token: optional_env("OPENLIST_TOKEN"),
            root_path: optional_env("OPENLIST_ROOT_PATH"),
            cdn_url: optional_env("OPENLIST_CDN_URL"),
            upload_endpoint: optional_env("OPENLIST_UPLOAD_ENDPOINT"),
            download_endpoint: optional_env("OPENLIST_DOWNLOAD_ENDPOINT"),
            meta_endpoint: optional_env("OPENLIST_META_ENDPOINT"),
            list_endpoint: optional_env("OPENLIST_LIST_ENDPOINT"),
            delete_endpoint: optional_env("OPENLIST_DELETE_ENDPOINT"),
            path_field: optional_env("OPENLIST_PATH_FIELD"),
        })
    }

    pub fn upload_endpoint(&self) -> &str {
        self.upload_endpoint.as_deref().unwrap_or("/api/fs/put")
    }

    pub fn delete_endpoint(&self) -> &str {
        self.delete_endpoint.as_deref().unwrap_or("/api/fs/remove")
    }

    pub fn meta_endpoint(&self) -> &str {
        self.meta_endpoint
            .as_deref()
            .or(self.download_endpoint.as_deref())
            .unwrap_or("/api/fs/get")
    }

    pub fn list_endpoint(&self) -> &str {
        self.list_endpoint.as_deref().unwrap_or("/api/fs/list")
    }

    pub fn path_field(&self) -> &str {
        self.path_field.as_deref().unwrap_or("path")
    }
}

#[derive(Debug, Clone)]
pub struct LocalStorageConfig {
    pub base_dir: PathBuf,
    pub public_base_url: Option<String>,
    pub signing_secret: Option<String>,
}

impl LocalStorageConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            public_base_url: None,
            signing_secret: None,
        }
    }

    pub fn from_env() -> Self {
        Self {
            base_dir: optional_env("LOCAL_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/storage")),
            public_base_url: optional_env("LOCAL_STORAGE_PUBLIC_URL"),
            signing_secret: optional_env("LOCAL_STORAGE_SIGNING_SECRET"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum StorageConfig {
    Local(LocalStorageConfig),
    OpenList(OpenListConfig),
    Memory,
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, StorageError> {
        let provider = optional_env("STORAGE_PROVIDER").unwrap_or_else(|| "local".to_string());
        match provider.to_ascii_lowercase().as_str() {
            "local" => Ok(StorageConfig::Local(LocalStorageConfig::from_env())),
            "openlist" => Ok(StorageConfig::OpenList(OpenListConfig::from_env()?)),
            "memory" => Ok(StorageConfig::Memory),
            other => Err(StorageError::Config(format!(
                "Unknown STORAGE_PROVIDER '{}', expected local, openlist or memory",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SettingsConfig {
    Env,
    Redis { url: String },
}

impl SettingsConfig {
    pub fn from_env() -> Self {
        match optional_env("SETTINGS_BACKEND").as_deref() {
            Some("redis") => SettingsConfig::Redis {
                url: optional_env("REDIS_URL")
                    .unwrap_or_else(|| "redis://localhost:6379".to_string()),
            },
            _ => SettingsConfig::Env,
        }
    }
}
