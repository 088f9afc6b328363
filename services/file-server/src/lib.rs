pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod range;
pub mod state;

use axum::{
    routing::{get, put},
    Router,
};
use tower::ServiceBuilder;

pub use config::ServerConfig;
pub use state::AppState;

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        // Byte-range file serving
        .route("/file/*key", get(handlers::files::serve_file))
        // Operator endpoints
        .route("/api/storage/objects", get(handlers::storage::list_objects))
        .route(
            "/api/storage/objects/*key",
            put(handlers::storage::upload_object).delete(handlers::storage::delete_object),
        )
        .route("/api/storage/urls/*key", get(handlers::storage::object_urls))
        .layer(
            ServiceBuilder::new()
                .layer(middleware::trace_layer())
                .layer(middleware::cors_layer()),
        )
        .with_state(state)
}
