//! Operator endpoints for managing stored objects. All of them require an
//! authenticated session.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        HeaderMap, StatusCode, Uri,
    },
    response::Json,
};
use futures_util::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use shared::public_file::{resolve_download_url, resolve_original_key_for_photo};
use shared::settings::is_storage_encryption_enabled;
use shared::storage::SignedUrlOptions;
use shared::{StorageError, StorageObject};
use tracing::info;

use super::key_from_uri;
use crate::auth::Viewer;
use crate::error::{AppError, AppResult};
use crate::range::content_type_for_key;
use crate::state::AppState;

pub const OBJECTS_ROUTE_PREFIX: &str = "/api/storage/objects/";
pub const URLS_ROUTE_PREFIX: &str = "/api/storage/urls/";

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub images: bool,
}

#[derive(Debug, Serialize)]
pub struct ObjectEntry {
    #[serde(flatten)]
    pub object: StorageObject,
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ObjectUrls {
    pub key: String,
    pub url: Option<String>,
    pub original_url: Option<String>,
    pub signed_url: Option<String>,
}

fn require_operator(viewer: &Viewer) -> AppResult<()> {
    if viewer.is_authenticated() {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

/// `GET /api/storage/objects[?images=true]`
pub async fn list_objects(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<ObjectEntry>>> {
    require_operator(&viewer)?;

    let objects = if query.images {
        state.storage.list_images().await
    } else {
        state.storage.list_all().await
    }
    .map_err(|e| AppError::storage(e, true))?;

    let mut entries = Vec::with_capacity(objects.len());
    for object in objects {
        let url = resolve_download_url(
            state.storage.as_ref(),
            state.settings.as_ref(),
            Some(&object.key),
        )
        .await
        .map_err(|e| AppError::storage(e, true))?;
        entries.push(ObjectEntry { object, url });
    }

    Ok(Json(entries))
}

/// `PUT /api/storage/objects/*key`, streaming the request body to the backend.
pub async fn upload_object(
    State(state): State<AppState>,
    viewer: Viewer,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> AppResult<(StatusCode, Json<StorageObject>)> {
    require_operator(&viewer)?;
    let key = key_from_uri(&uri, OBJECTS_ROUTE_PREFIX)?;

    let content_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let stream = body
        .into_data_stream()
        .map_err(std::io::Error::other)
        .boxed();

    let object = state
        .storage
        .create_from_stream(&key, stream, content_length, content_type.as_deref())
        .await
        .map_err(|e| AppError::storage(e, true))?;

    info!("Stored {} ({:?} bytes)", object.key, object.size);
    Ok((StatusCode::CREATED, Json(object)))
}

/// `DELETE /api/storage/objects/*key`. Deleting a missing object succeeds.
pub async fn delete_object(
    State(state): State<AppState>,
    viewer: Viewer,
    uri: Uri,
) -> AppResult<StatusCode> {
    require_operator(&viewer)?;
    let key = key_from_uri(&uri, OBJECTS_ROUTE_PREFIX)?;

    state
        .storage
        .delete(&key)
        .await
        .map_err(|e| AppError::storage(e, true))?;

    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/storage/urls/*key`
pub async fn object_urls(
    State(state): State<AppState>,
    viewer: Viewer,
    uri: Uri,
) -> AppResult<Json<ObjectUrls>> {
    require_operator(&viewer)?;
    let key = key_from_uri(&uri, URLS_ROUTE_PREFIX)?;

    let urls = resolve_urls(&state, &key)
        .await
        .map_err(|e| AppError::storage(e, true))?;
    Ok(Json(urls))
}

async fn resolve_urls(state: &AppState, key: &str) -> Result<ObjectUrls, StorageError> {
    let storage = state.storage.as_ref();
    let settings = state.settings.as_ref();

    let url = resolve_download_url(storage, settings, Some(key)).await?;
    let original_key = resolve_original_key_for_photo(Some(key));
    let original_url = resolve_download_url(storage, settings, original_key.as_deref()).await?;

    // Backends only hold ciphertext while encryption is on
    let encrypted = is_storage_encryption_enabled(settings).await?;
    let signed_url = match storage.signed_urls() {
        Some(signer) if !encrypted => {
            let options = SignedUrlOptions {
                content_type: Some(content_type_for_key(key).to_string()),
            };
            Some(signer.get_signed_url(key, None, &options).await?)
        }
        _ => None,
    };

    Ok(ObjectUrls {
        key: key.to_string(),
        url,
        original_url,
        signed_url,
    })
}
