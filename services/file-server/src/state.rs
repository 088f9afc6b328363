use shared::{PhotoCatalog, SettingsProvider, StorageProvider};
use std::sync::Arc;

use crate::auth::SessionKeys;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn StorageProvider>,
    pub settings: Arc<dyn SettingsProvider>,
    pub catalog: Arc<dyn PhotoCatalog>,
    pub sessions: Option<Arc<SessionKeys>>,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn StorageProvider>,
        settings: Arc<dyn SettingsProvider>,
        catalog: Arc<dyn PhotoCatalog>,
        session_secret: Option<&str>,
    ) -> Self {
        Self {
            storage,
            settings,
            catalog,
            sessions: session_secret.map(|secret| Arc::new(SessionKeys::new(secret))),
        }
    }
}
