use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Map, Value};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::backoff::BackoffSchedule;
use super::{ByteStream, StorageError, StorageObject, StorageProvider, OPAQUE_CONTENT_TYPE};
use crate::config::OpenListConfig;
use crate::utils::encode_url_path;

const PROVIDER_NAME: &str = "openlist";
const FILE_PATH_HEADER: &str = "File-Path";

/// Metadata as reported by the file service, plus the direct download link
/// when the service exposes one.
#[derive(Debug, Clone)]
struct RemoteMeta {
    object: StorageObject,
    raw_url: Option<String>,
}

impl RemoteMeta {
    fn is_complete(&self) -> bool {
        self.raw_url.is_some() || self.object.size.is_some()
    }
}

/// Backend for an OpenList-compatible file service.
///
/// The service is not read-after-write consistent: right after an upload the
/// metadata endpoint may report the file as missing or without a size, so
/// writes and downloads poll on a bounded `BackoffSchedule`.
pub struct OpenListStorageProvider {
    client: Client,
    config: OpenListConfig,
    token: OnceLock<String>,
    backoff: BackoffSchedule,
}

impl OpenListStorageProvider {
    pub fn new(config: OpenListConfig) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent("photovault/1.0 (OpenList storage)")
            .build()?;

        Ok(Self {
            client,
            config,
            token: OnceLock::new(),
            backoff: BackoffSchedule::default(),
        })
    }

    pub fn with_backoff(mut self, backoff: BackoffSchedule) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn config(&self) -> &OpenListConfig {
        &self.config
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    /// Resolved once, on first use. A missing token only fails the call that needs it.
    fn auth_token(&self) -> Result<&str, StorageError> {
        if let Some(token) = self.token.get() {
            return Ok(token);
        }

        let token = self
            .config
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                StorageError::Config(
                    "OpenList auth requires a token. Please configure OPENLIST_TOKEN.".to_string(),
                )
            })?;

        Ok(self.token.get_or_init(|| token.to_string()))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> Result<RequestBuilder, StorageError> {
        let token = self.auth_token()?;
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.request(method, url).header(AUTHORIZATION, token))
    }

    fn normalized_root(&self) -> String {
        normalize_root(self.config.root_path.as_deref().unwrap_or(""))
    }

    /// Prefix `key` with the configured root. Applying it twice is a no-op.
    pub fn with_root(&self, key: &str) -> String {
        with_root(&self.normalized_root(), key)
    }

    async fn upload(
        &self,
        key: &str,
        body: Body,
        content_length: Option<u64>,
        content_type: Option<&str>,
    ) -> Result<String, StorageError> {
        let rooted_key = self.with_root(key);
        let absolute_key = to_absolute_path(&rooted_key);

        let mut request = self
            .request(reqwest::Method::PUT, self.config.upload_endpoint())?
            .header(CONTENT_TYPE, content_type.unwrap_or(OPAQUE_CONTENT_TYPE))
            .header(FILE_PATH_HEADER, urlencoding::encode(&absolute_key).into_owned());
        if let Some(length) = content_length {
            request = request.header(CONTENT_LENGTH, length);
        }

        let response = request.body(body).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            error!("OpenList upload failed: status={}, body={}", status, text);
            return Err(StorageError::provider(PROVIDER_NAME, status, "upload", text));
        }

        info!("Uploaded object: {}", absolute_key);
        debug!(
            original_key = key,
            rooted_key = %rooted_key,
            absolute_key = %absolute_key,
            root_path = %self.normalized_root(),
            "OpenList upload details"
        );

        Ok(rooted_key)
    }

    async fn fetch_meta(&self, key: &str, refresh: bool) -> Result<Option<RemoteMeta>, StorageError> {
        let rooted_key = self.with_root(key);
        let mut payload = Map::new();
        payload.insert(
            self.config.path_field().to_string(),
            Value::String(to_absolute_path(&rooted_key)),
        );
        payload.insert("password".to_string(), json!(""));
        payload.insert("page".to_string(), json!(1));
        payload.insert("per_page".to_string(), json!(0));
        payload.insert("refresh".to_string(), json!(refresh));

        let response = self
            .request(reqwest::Method::POST, self.config.meta_endpoint())?
            .json(&Value::Object(payload))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            error!("OpenList get file meta failed: status={}, body={}", status, text);
            return Err(StorageError::provider(PROVIDER_NAME, status, "get file meta", text));
        }

        let Ok(json) = response.json::<Value>().await else {
            // Unparseable body: the service answered, but told us nothing
            return Ok(Some(RemoteMeta {
                object: StorageObject::new(rooted_key),
                raw_url: None,
            }));
        };

        Ok(meta_node(&json).map(|node| RemoteMeta {
            object: StorageObject {
                key: rooted_key,
                size: node.get("size").and_then(Value::as_u64),
                last_modified: parse_modified(node),
                etag: node.get("etag").and_then(Value::as_str).map(str::to_string),
            },
            raw_url: node
                .get("raw_url")
                .and_then(Value::as_str)
                .filter(|u| !u.is_empty())
                .map(str::to_string),
        }))
    }

    /// Poll metadata after a write until the service reports a size or a raw URL.
    ///
    /// Always produces a result: the best metadata seen, or a synthesized
    /// descriptor when the service never answered with anything usable.
    async fn wait_for_meta(&self, rooted_key: &str, payload_len: Option<u64>) -> StorageObject {
        let meta = self
            .backoff
            .poll(
                |attempt| async move {
                    match self.fetch_meta(rooted_key, attempt > 0).await {
                        Ok(meta) => meta,
                        Err(e) => {
                            warn!("Metadata poll {} for {} failed: {}", attempt + 1, rooted_key, e);
                            None
                        }
                    }
                },
                RemoteMeta::is_complete,
            )
            .await;

        match meta {
            Some(meta) => meta.object,
            None => StorageObject {
                key: rooted_key.to_string(),
                size: payload_len,
                last_modified: Some(Utc::now()),
                etag: None,
            },
        }
    }

    async fn fetch_as_bytes(&self, url: &str) -> Option<Vec<u8>> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("Download from {} failed: {}", url, e);
                return None;
            }
        };
        read_success_body(response).await
    }

    async fn download_with_backoff(&self, key: &str) -> Option<Vec<u8>> {
        let rooted_key = self.with_root(key);
        let rooted_key = rooted_key.as_str();

        self.backoff
            .poll(
                |attempt| async move {
                    let meta = match self.fetch_meta(rooted_key, attempt > 0).await {
                        Ok(meta) => meta,
                        Err(e) => {
                            warn!("Metadata lookup for {} failed: {}", rooted_key, e);
                            None
                        }
                    };

                    if let Some(raw_url) = meta.and_then(|m| m.raw_url) {
                        if let Some(bytes) = self.fetch_as_bytes(&raw_url).await {
                            return Some(bytes);
                        }
                    }

                    let public_url = self.get_public_url(rooted_key);
                    if !public_url.is_empty() {
                        if let Some(bytes) = self.fetch_as_bytes(&public_url).await {
                            return Some(bytes);
                        }
                    }

                    None
                },
                |_| true,
            )
            .await
    }
}

#[async_trait]
impl StorageProvider for OpenListStorageProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn create(
        &self,
        key: &str,
        content: &[u8],
        content_type: Option<&str>,
    ) -> Result<StorageObject, StorageError> {
        let payload_len = content.len() as u64;
        let rooted_key = self
            .upload(key, Body::from(content.to_vec()), None, content_type)
            .await?;

        Ok(self.wait_for_meta(&rooted_key, Some(payload_len)).await)
    }

    async fn create_from_stream(
        &self,
        key: &str,
        stream: ByteStream,
        content_length: Option<u64>,
        content_type: Option<&str>,
    ) -> Result<StorageObject, StorageError> {
        let rooted_key = self
            .upload(key, Body::wrap_stream(stream), content_length, content_type)
            .await?;

        Ok(self.wait_for_meta(&rooted_key, content_length).await)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        // The polling loop swallows per-attempt errors, a missing token must not be one
        self.auth_token()?;

        let Some(download_path) = self.config.download_endpoint.as_deref() else {
            return Ok(self.download_with_backoff(key).await);
        };

        let rooted_key = self.with_root(key);
        let path = format!(
            "{}?{}={}",
            download_path,
            urlencoding::encode(self.config.path_field()),
            urlencoding::encode(&rooted_key)
        );
        let response = self.request(reqwest::Method::GET, &path)?.send().await?;
        Ok(read_success_body(response).await)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let rooted_key = self.with_root(key);
        let normalized = rooted_key.trim_start_matches('/');
        let (dir, name) = match normalized.rsplit_once('/') {
            Some((dir, name)) => (to_absolute_path(dir), name),
            None => (to_absolute_path(&self.normalized_root()), normalized),
        };

        let response = self
            .request(reqwest::Method::POST, self.config.delete_endpoint())?
            .json(&json!({ "dir": dir, "names": [name] }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            error!("OpenList delete failed: status={}, body={}", status, text);
            return Err(StorageError::provider(PROVIDER_NAME, status, "delete", text));
        }

        info!("Deleted object: {}", key);
        Ok(())
    }

    async fn get_file_meta(&self, key: &str) -> Result<Option<StorageObject>, StorageError> {
        Ok(self.fetch_meta(key, false).await?.map(|meta| meta.object))
    }

    async fn list_all(&self) -> Result<Vec<StorageObject>, StorageError> {
        let root = self.normalized_root();
        let mut payload = Map::new();
        payload.insert(
            self.config.path_field().to_string(),
            Value::String(to_absolute_path(&root)),
        );
        payload.insert("password".to_string(), json!(""));
        payload.insert("page".to_string(), json!(1));
        payload.insert("per_page".to_string(), json!(0));
        payload.insert("refresh".to_string(), json!(false));

        let response = self
            .request(reqwest::Method::POST, self.config.list_endpoint())?
            .json(&Value::Object(payload))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            error!("OpenList list failed: status={}, body={}", status, text);
            return Err(StorageError::provider(PROVIDER_NAME, status, "list", text));
        }

        let json: Value = response.json().await.unwrap_or(Value::Null);
        let items = json
            .get("data")
            .and_then(|data| data.get("content"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let objects = items
            .iter()
            .filter_map(|item| {
                let key = match (
                    item.get("path").and_then(Value::as_str),
                    item.get("name").and_then(Value::as_str),
                ) {
                    (Some(path), _) => path.to_string(),
                    (None, Some(name)) => format!("{}/{}", root, name),
                    (None, None) => return None,
                };

                Some(StorageObject {
                    key: with_root(&root, &key),
                    size: item.get("size").and_then(Value::as_u64),
                    last_modified: parse_modified(item),
                    etag: item.get("etag").and_then(Value::as_str).map(str::to_string),
                })
            })
            .collect::<Vec<_>>();

        debug!("Listed {} objects under /{}", objects.len(), root);
        Ok(objects)
    }

    fn get_public_url(&self, key: &str) -> String {
        let rooted_key = self.with_root(key);
        let base = match (&self.config.cdn_url, self.config.base_url.is_empty()) {
            (Some(cdn), _) => cdn.trim_end_matches('/').to_string(),
            (None, false) => format!("{}/d", self.base_url()),
            (None, true) => return String::new(),
        };
        format!("{}/{}", base, encode_url_path(&rooted_key))
    }
}

fn normalize_root(root: &str) -> String {
    root.trim_matches('/').to_string()
}

fn with_root(root: &str, key: &str) -> String {
    let trimmed_key = key.trim_start_matches('/');
    if root.is_empty() {
        return trimmed_key.to_string();
    }
    if trimmed_key == root
        || trimmed_key
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('/'))
    {
        return trimmed_key.to_string();
    }
    format!("{}/{}", root, trimmed_key)
}

fn to_absolute_path(key: &str) -> String {
    if key.is_empty() || key == "/" {
        return "/".to_string();
    }
    if key.starts_with('/') {
        key.to_string()
    } else {
        format!("/{}", key)
    }
}

/// Unwrap the `{code, message, data}` envelope. A non-200 `code` or a null
/// `data` means the service does not know the path.
fn meta_node(json: &Value) -> Option<&Value> {
    if let Some(code) = json.get("code").and_then(Value::as_i64) {
        if code != 200 {
            return None;
        }
    }
    match json.get("data") {
        Some(data) if data.is_object() => Some(data),
        Some(_) => None,
        None if json.is_object() => Some(json),
        None => None,
    }
}

fn parse_modified(node: &Value) -> Option<DateTime<Utc>> {
    ["modified", "lastModified", "mtime"]
        .iter()
        .find_map(|field| node.get(*field).and_then(Value::as_str))
        .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

async fn read_success_body(response: Response) -> Option<Vec<u8>> {
    if !response.status().is_success() {
        return None;
    }
    response.bytes().await.ok().map(|bytes| bytes.to_vec())
}
