use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{
        header::{ACCEPT_RANGES, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE},
        HeaderMap, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
};
use shared::public_file::heif_candidates_for_jpeg;
use chrono::Utc;
use serde::Deserialize;
use shared::{PhotoCatalog, StorageProvider};
use tracing::debug;

use super::key_from_uri;
use crate::auth::Viewer;
use crate::error::{AppError, AppResult};
use crate::range::{cache_control_for, content_type_for_key, parse_range};
use crate::state::AppState;

pub const FILE_ROUTE_PREFIX: &str = "/file/";

/// Query parameters carried by a signed file URL.
#[derive(Debug, Default, Deserialize)]
pub struct SignedFileQuery {
    pub expires: Option<String>,
    pub signature: Option<String>,
    pub content_type: Option<String>,
}

impl SignedFileQuery {
    /// True when the query carries a live signature for `key` minted by the storage backend.
    fn grants(&self, storage: &dyn StorageProvider, key: &str) -> bool {
        let (Some(expires), Some(signature)) = (&self.expires, &self.signature) else {
            return false;
        };
        let Ok(expires_at) = expires.parse::<i64>() else {
            return false;
        };
        storage.signed_urls().is_some_and(|signer| {
            signer.verify_signed_url(
                key,
                expires_at,
                signature,
                self.content_type.as_deref(),
                Utc::now(),
            )
        })
    }
}

/// `GET /file/*key`
pub async fn serve_file(
    State(state): State<AppState>,
    viewer: Viewer,
    uri: Uri,
    Query(query): Query<SignedFileQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let key = key_from_uri(&uri, FILE_ROUTE_PREFIX)?;
    let authenticated = viewer.is_authenticated();
    let signed = query.grants(state.storage.as_ref(), &key);

    if !authenticated && !signed {
        ensure_publicly_visible(state.catalog.as_ref(), &key).await?;
    }

    let content = state
        .storage
        .get(&key)
        .await
        .map_err(|e| AppError::storage(e, authenticated))?
        .ok_or(AppError::NotFound)?;
    let content = Bytes::from(content);
    let total = content.len() as u64;

    let content_type = match (&query.content_type, signed) {
        (Some(signed_type), true) => signed_type.clone(),
        _ => content_type_for_key(&key).to_string(),
    };
    let cache_control = cache_control_for(authenticated);

    let range = headers
        .get(RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_range(v, total));

    let Some(range) = range else {
        return Ok((
            StatusCode::OK,
            [
                (CONTENT_TYPE, content_type),
                (CACHE_CONTROL, cache_control.to_string()),
                (CONTENT_LENGTH, total.to_string()),
            ],
            content,
        )
            .into_response());
    };

    debug!("Serving {} of {} ({} bytes)", range.content_range(total), key, range.length());
    let slice = content.slice(range.start as usize..=range.end as usize);

    Ok((
        StatusCode::PARTIAL_CONTENT,
        [
            (CONTENT_TYPE, content_type),
            (CACHE_CONTROL, cache_control.to_string()),
            (ACCEPT_RANGES, "bytes".to_string()),
            (CONTENT_RANGE, range.content_range(total)),
            (CONTENT_LENGTH, range.length().to_string()),
        ],
        slice,
    )
        .into_response())
}

/// Anonymous viewers may only fetch keys referenced by a photo outside any
/// hidden album. Everything else looks like a missing file.
async fn ensure_publicly_visible(catalog: &dyn PhotoCatalog, key: &str) -> AppResult<()> {
    let candidates = heif_candidates_for_jpeg(key);
    let Some(photo_id) = catalog.find_photo_id(key, &candidates).await? else {
        debug!("No photo references {}", key);
        return Err(AppError::NotFound);
    };

    if catalog.is_in_hidden_album(&photo_id).await? {
        debug!("Photo {} is in a hidden album", photo_id);
        return Err(AppError::NotFound);
    }
    Ok(())
}
