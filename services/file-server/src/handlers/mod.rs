pub mod files;
pub mod health;
pub mod storage;

use axum::http::Uri;
use shared::utils::normalize_slashes;

use crate::error::AppError;

/// Storage key addressed by the part of the request path after `prefix`.
///
/// The raw path is percent-decoded exactly once. Backslashes become slashes,
/// repeated slashes collapse and leading slashes are dropped; empty keys and
/// keys containing `..` are rejected.
pub fn key_from_uri(uri: &Uri, prefix: &str) -> Result<String, AppError> {
    let raw = uri
        .path()
        .strip_prefix(prefix)
        .ok_or_else(|| AppError::BadRequest("Missing key".to_string()))?;
    normalize_key(raw)
}

pub fn normalize_key(raw: &str) -> Result<String, AppError> {
    let decoded = urlencoding::decode(raw)
        .map_err(|_| AppError::BadRequest("Invalid key".to_string()))?;
    let key = normalize_slashes(&decoded);

    if key.is_empty() || key.contains("..") {
        return Err(AppError::BadRequest("Invalid key".to_string()));
    }
    Ok(key)
}
