//! Helpers deciding which key and which URL a client should use for a photo.

use crate::settings::{is_storage_encryption_enabled, SettingsProvider};
use crate::storage::{StorageError, StorageProvider};
use crate::utils::{encode_url_path, normalize_slashes};

/// Extensions of high-efficiency originals that are served as a `.jpeg` derivative.
pub const HEIF_EXTENSIONS: &[&str] = &[".heic", ".heif", ".hif"];
pub const JPEG_DERIVATIVE_EXTENSION: &str = ".jpeg";

/// URL routed through the file server rather than straight to the backend.
pub fn to_file_proxy_url(key: &str) -> String {
    format!("/file/{}", encode_url_path(&normalize_slashes(key)))
}

/// Key of the object clients should download as "the original" for a photo.
///
/// HEIC/HEIF sources map to their `.jpeg` derivative by suffix substitution;
/// every other key is returned unchanged.
pub fn resolve_original_key_for_photo(storage_key: Option<&str>) -> Option<String> {
    let storage_key = storage_key.filter(|k| !k.is_empty())?;
    let lower = storage_key.to_ascii_lowercase();

    match HEIF_EXTENSIONS.iter().find(|ext| lower.ends_with(*ext)) {
        Some(ext) => Some(format!(
            "{}{}",
            &storage_key[..storage_key.len() - ext.len()],
            JPEG_DERIVATIVE_EXTENSION
        )),
        None => Some(storage_key.to_string()),
    }
}

/// Source keys a `.jpeg` derivative may have been produced from.
pub fn heif_candidates_for_jpeg(key: &str) -> Vec<String> {
    if !key.to_ascii_lowercase().ends_with(JPEG_DERIVATIVE_EXTENSION) {
        return Vec::new();
    }
    let base = &key[..key.len() - JPEG_DERIVATIVE_EXTENSION.len()];
    HEIF_EXTENSIONS
        .iter()
        .map(|ext| format!("{}{}", base, ext))
        .collect()
}

/// Pick the URL a client should use for `key`.
///
/// With encryption on, the backend only holds ciphertext, so clients must go
/// through the file server.
pub async fn resolve_download_url(
    provider: &dyn StorageProvider,
    settings: &dyn SettingsProvider,
    key: Option<&str>,
) -> Result<Option<String>, StorageError> {
    let Some(key) = key.filter(|k| !k.is_empty()) else {
        return Ok(None);
    };

    if is_storage_encryption_enabled(settings).await? {
        return Ok(Some(to_file_proxy_url(key)));
    }

    let public_url = provider.get_public_url(key);
    if public_url.is_empty() {
        Ok(Some(to_file_proxy_url(key)))
    } else {
        Ok(Some(public_url))
    }
}
