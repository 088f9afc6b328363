use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use ring::hmac;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::{
    ByteStream, SignedUrlOptions, SignedUrlProvider, StorageError, StorageObject, StorageProvider,
};
use crate::config::LocalStorageConfig;
use crate::utils::encode_url_path;

const DEFAULT_SIGNED_URL_TTL: Duration = Duration::from_secs(3600);

/// Filesystem backend rooted at a base directory. Keys are `/`-separated
/// paths relative to that directory.
#[derive(Debug)]
pub struct LocalStorageProvider {
    base_dir: PathBuf,
    public_base_url: Option<String>,
    signer: Option<UrlSigner>,
}

impl LocalStorageProvider {
    pub fn new(config: LocalStorageConfig) -> Self {
        let signer = match (&config.signing_secret, &config.public_base_url) {
            (Some(secret), Some(base_url)) => Some(UrlSigner::new(secret, base_url)),
            _ => None,
        };

        Self {
            base_dir: config.base_dir,
            public_base_url: config.public_base_url,
            signer,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn signer(&self) -> Option<&UrlSigner> {
        self.signer.as_ref()
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if key.trim_start_matches('/').is_empty() || escapes {
            return Err(StorageError::Backend(format!("Invalid storage key: {}", key)));
        }
        Ok(self.base_dir.join(relative))
    }

    async fn prepare_parent(path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn describe(&self, key: &str, path: &Path) -> Result<Option<StorageObject>, StorageError> {
        match fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(Some(StorageObject {
                key: key.trim_start_matches('/').to_string(),
                size: Some(meta.len()),
                last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
                etag: None,
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn relative_key(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_dir).ok()?;
        let segments = relative
            .components()
            .map(|c| c.as_os_str().to_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()?;
        Some(segments.join("/"))
    }
}

/// Sibling path a streamed upload is written to before it is moved into place.
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}

async fn write_stream(path: &Path, stream: &mut ByteStream) -> Result<u64, StorageError> {
    let mut file = fs::File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

#[async_trait]
impl StorageProvider for LocalStorageProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn create(
        &self,
        key: &str,
        content: &[u8],
        _content_type: Option<&str>,
    ) -> Result<StorageObject, StorageError> {
        let path = self.resolve(key)?;
        Self::prepare_parent(&path).await?;
        fs::write(&path, content).await?;
        info!("Stored object: {}", path.display());

        Ok(StorageObject {
            key: key.trim_start_matches('/').to_string(),
            size: Some(content.len() as u64),
            last_modified: Some(Utc::now()),
            etag: None,
        })
    }

    async fn create_from_stream(
        &self,
        key: &str,
        mut stream: ByteStream,
        _content_length: Option<u64>,
        _content_type: Option<&str>,
    ) -> Result<StorageObject, StorageError> {
        let path = self.resolve(key)?;
        Self::prepare_parent(&path).await?;

        let partial = partial_path(&path);
        let written = match write_stream(&partial, &mut stream).await {
            Ok(written) => written,
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&partial).await {
                    if cleanup.kind() != ErrorKind::NotFound {
                        warn!("Failed to remove partial upload {}: {}", partial.display(), cleanup);
                    }
                }
                return Err(e);
            }
        };
        fs::rename(&partial, &path).await?;
        info!("Stored streamed object: {} ({} bytes)", path.display(), written);

        Ok(StorageObject {
            key: key.trim_start_matches('/').to_string(),
            size: Some(written),
            last_modified: Some(Utc::now()),
            etag: None,
        })
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted object: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_file_meta(&self, key: &str) -> Result<Option<StorageObject>, StorageError> {
        let path = self.resolve(key)?;
        self.describe(key, &path).await
    }

    async fn list_all(&self) -> Result<Vec<StorageObject>, StorageError> {
        let mut objects = Vec::new();
        let mut pending = vec![self.base_dir.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    let Some(key) = self.relative_key(&path) else {
                        debug!("Skipping non UTF-8 path {}", path.display());
                        continue;
                    };
                    if let Some(obj) = self.describe(&key, &path).await? {
                        objects.push(obj);
                    }
                }
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    fn get_public_url(&self, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), encode_url_path(key)),
            None => String::new(),
        }
    }

    fn signed_urls(&self) -> Option<&dyn SignedUrlProvider> {
        self.signer.as_ref().map(|s| s as &dyn SignedUrlProvider)
    }
}

/// HMAC-SHA256 signer for time-limited URLs:
/// `<base>/<key>?expires=<unix>&signature=<hex>[&content_type=<type>]`.
pub struct UrlSigner {
    key: hmac::Key,
    base_url: String,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: &str, base_url: &str) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes()),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn message(key: &str, expires_at: i64, content_type: Option<&str>) -> String {
        format!(
            "{}\n{}\n{}",
            key.trim_start_matches('/'),
            expires_at,
            content_type.unwrap_or("")
        )
    }

    pub fn sign(&self, key: &str, expires_at: i64, content_type: Option<&str>) -> String {
        let tag = hmac::sign(&self.key, Self::message(key, expires_at, content_type).as_bytes());
        hex::encode(tag.as_ref())
    }

    /// Check a signature minted by `sign`, rejecting it once `now` passes the expiry.
    pub fn verify(
        &self,
        key: &str,
        expires_at: i64,
        signature: &str,
        content_type: Option<&str>,
        now: DateTime<Utc>,
    ) -> bool {
        if now.timestamp() > expires_at {
            return false;
        }
        let Ok(signature) = hex::decode(signature) else {
            return false;
        };
        hmac::verify(
            &self.key,
            Self::message(key, expires_at, content_type).as_bytes(),
            &signature,
        )
        .is_ok()
    }
}

#[async_trait]
impl SignedUrlProvider for UrlSigner {
    async fn get_signed_url(
        &self,
        key: &str,
        expires_in: Option<Duration>,
        options: &SignedUrlOptions,
    ) -> Result<String, StorageError> {
        let ttl = expires_in.unwrap_or(DEFAULT_SIGNED_URL_TTL);
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StorageError::Config(format!("Invalid signed URL lifetime: {}", e)))?;
        let expires_at = (Utc::now() + ttl).timestamp();
        let content_type = options.content_type.as_deref();
        let signature = self.sign(key, expires_at, content_type);

        let mut url = format!(
            "{}/{}?expires={}&signature={}",
            self.base_url,
            encode_url_path(key),
            expires_at,
            signature
        );
        if let Some(content_type) = content_type {
            url.push_str("&content_type=");
            url.push_str(&urlencoding::encode(content_type));
        }
        Ok(url)
    }

    fn verify_signed_url(
        &self,
        key: &str,
        expires_at: i64,
        signature: &str,
        content_type: Option<&str>,
        now: DateTime<Utc>,
    ) -> bool {
        self.verify(key, expires_at, signature, content_type, now)
    }
}
