use shared::{DatabaseConfig, SettingsConfig, StorageConfig, StorageError};
use std::env;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Secret for session tokens. Without it every request is anonymous.
    pub session_secret: Option<String>,
    pub storage: StorageConfig,
    pub settings: SettingsConfig,
    pub database: Option<DatabaseConfig>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, StorageError> {
        let port = env::var("FILE_SERVER_PORT").unwrap_or_else(|_| "8080".to_string());
        let port = port.parse().map_err(|_| {
            StorageError::Config(format!("FILE_SERVER_PORT must be a valid port number, got '{}'", port))
        })?;

        Ok(Self {
            host: env::var("FILE_SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            session_secret: env::var("SESSION_SECRET").ok().filter(|s| !s.is_empty()),
            storage: StorageConfig::from_env()?,
            settings: SettingsConfig::from_env(),
            database: DatabaseConfig::from_env(),
        })
    }
}
