use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use shared::{DatabaseError, StorageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    /// `detailed` is set for authenticated operators, who may see backend detail.
    #[error("Storage error: {source}")]
    Storage {
        source: StorageError,
        detailed: bool,
    },

    #[error("Catalog error: {0}")]
    Catalog(#[from] DatabaseError),
}

impl AppError {
    pub fn storage(source: StorageError, detailed: bool) -> Self {
        AppError::Storage { source, detailed }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::NotFound => (StatusCode::NOT_FOUND, json!({ "error": "Not Found" })),
            AppError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, json!({ "error": "Unauthorized" }))
            }
            AppError::Storage { source, detailed } => {
                tracing::error!("Storage error: {}", source);
                let status = match source {
                    StorageError::Provider { .. } => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let body = match (source, *detailed) {
                    (
                        StorageError::Provider {
                            provider,
                            status: upstream_status,
                            message,
                            body,
                            ..
                        },
                        true,
                    ) => json!({
                        "error": message,
                        "provider": provider,
                        "status": upstream_status,
                        "body": body,
                    }),
                    (other, true) => json!({ "error": other.to_string() }),
                    (_, false) => json!({ "error": "Failed to load file" }),
                };
                (status, body)
            }
            AppError::Catalog(e) => {
                tracing::error!("Catalog error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
