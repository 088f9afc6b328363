use file_server::{create_app, AppState, ServerConfig};
use shared::db::repositories::PhotoRepository;
use shared::storage::factory::{create_settings_provider, create_storage_provider};
use shared::{DatabasePool, InMemoryPhotoCatalog, PhotoCatalog};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    shared::telemetry::init_tracing("file-server");

    let config = ServerConfig::from_env()?;
    info!("Starting file server on {}:{}", config.host, config.port);

    let settings = create_settings_provider(&config.settings).await?;
    let storage = create_storage_provider(&config.storage, settings.clone())?;

    let catalog: Arc<dyn PhotoCatalog> = match &config.database {
        Some(database) => {
            let pool = DatabasePool::from_config(database).await?;
            Arc::new(PhotoRepository::new(pool.pool()))
        }
        None => {
            warn!("DATABASE_URL not set, anonymous requests will not match any photo");
            Arc::new(InMemoryPhotoCatalog::new())
        }
    };

    if config.session_secret.is_none() {
        warn!("SESSION_SECRET not set, every request is treated as anonymous");
    }

    let state = AppState::new(storage, settings, catalog, config.session_secret.as_deref());
    let app = create_app(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("File server listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
