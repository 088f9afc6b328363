use axum::http::{header, HeaderName, HeaderValue};
use axum_test::TestServer;
use chrono::Duration;
use file_server::auth::SessionKeys;
use file_server::{create_app, AppState};
use shared::settings::{ENCRYPTION_ENABLED, ENCRYPTION_KEY, STORAGE_NAMESPACE};
use shared::{
    EncryptedStorageProvider, InMemoryPhotoCatalog, InMemorySettings, InMemoryStorageProvider,
    LocalStorageConfig, LocalStorageProvider, PhotoCatalog, SettingsProvider, StorageProvider,
};
use std::sync::Arc;

pub const SESSION_SECRET: &str = "file-server-test-secret";
pub const PUBLIC_BASE_URL: &str = "https://cdn.example.com";

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub backend: Arc<InMemoryStorageProvider>,
    pub settings: InMemorySettings,
    pub catalog: InMemoryPhotoCatalog,
}

impl TestApp {
    /// Write through the encrypting decorator, as the application would.
    pub async fn put_object(&self, key: &str, content: &[u8]) {
        self.state.storage.create(key, content, None).await.unwrap();
    }

    pub fn enable_encryption(&self, key: &str) {
        self.settings.set(STORAGE_NAMESPACE, ENCRYPTION_ENABLED, "true");
        self.settings.set(STORAGE_NAMESPACE, ENCRYPTION_KEY, key);
    }
}

pub fn session_token() -> String {
    SessionKeys::new(SESSION_SECRET)
        .issue("operator-1", Duration::hours(1))
        .unwrap()
}

pub fn bearer_header() -> (HeaderName, HeaderValue) {
    (
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", session_token())).unwrap(),
    )
}

fn build_state(
    backend: Arc<dyn StorageProvider>,
    settings: &InMemorySettings,
    catalog: &InMemoryPhotoCatalog,
) -> AppState {
    let settings: Arc<dyn SettingsProvider> = Arc::new(settings.clone());
    let storage: Arc<dyn StorageProvider> = Arc::new(EncryptedStorageProvider::new(
        Box::new(backend),
        settings.clone(),
    ));
    let catalog: Arc<dyn PhotoCatalog> = Arc::new(catalog.clone());
    AppState::new(storage, settings, catalog, Some(SESSION_SECRET))
}

pub fn setup_test_app() -> TestApp {
    let backend = Arc::new(InMemoryStorageProvider::with_public_base_url(PUBLIC_BASE_URL));
    let settings = InMemorySettings::new();
    let catalog = InMemoryPhotoCatalog::new();

    let state = build_state(backend.clone(), &settings, &catalog);
    let server = TestServer::new(create_app(state.clone())).unwrap();

    TestApp {
        server,
        state,
        backend,
        settings,
        catalog,
    }
}

/// App backed by the local filesystem backend with signed URLs enabled.
pub fn setup_local_app(base_dir: &std::path::Path) -> (TestServer, InMemorySettings) {
    let config = LocalStorageConfig {
        public_base_url: Some("http://files.local/storage".to_string()),
        signing_secret: Some("signing-secret".to_string()),
        ..LocalStorageConfig::new(base_dir)
    };
    let backend: Arc<dyn StorageProvider> = Arc::new(LocalStorageProvider::new(config));
    let settings = InMemorySettings::new();
    let catalog = InMemoryPhotoCatalog::new();

    let state = build_state(backend, &settings, &catalog);
    (TestServer::new(create_app(state)).unwrap(), settings)
}
