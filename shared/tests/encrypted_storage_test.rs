mod common;

use common::mock_openlist::MockOpenList;
use common::provider_for;
use shared::settings::{ENCRYPTION_ENABLED, ENCRYPTION_KEY, STORAGE_NAMESPACE};
use shared::storage::encryption::{decrypt_buffer, derive_aes256_key, is_encrypted_payload, MAGIC};
use shared::storage::factory::create_storage_provider;
use shared::{
    EncryptedStorageProvider, InMemorySettings, InMemoryStorageProvider, LocalStorageConfig,
    SettingsProvider, StorageConfig, StorageError, StorageProvider,
};
use std::sync::Arc;

const PASSPHRASE: &str = "correct horse battery staple";

fn decorated(
    backend: &Arc<InMemoryStorageProvider>,
    settings: &InMemorySettings,
) -> EncryptedStorageProvider {
    let settings: Arc<dyn SettingsProvider> = Arc::new(settings.clone());
    EncryptedStorageProvider::new(Box::new(Arc::clone(backend)), settings)
}

fn enable_encryption(settings: &InMemorySettings, key: Option<&str>) {
    settings.set(STORAGE_NAMESPACE, ENCRYPTION_ENABLED, "true");
    match key {
        Some(key) => settings.set(STORAGE_NAMESPACE, ENCRYPTION_KEY, key),
        None => settings.remove(STORAGE_NAMESPACE, ENCRYPTION_KEY),
    }
}

#[tokio::test]
async fn test_disabled_encryption_stores_plaintext() {
    let backend = Arc::new(InMemoryStorageProvider::new());
    let settings = InMemorySettings::new();
    let storage = decorated(&backend, &settings);

    storage.create("a.txt", b"hello", Some("text/plain")).await.unwrap();

    let raw = backend.get("a.txt").await.unwrap().unwrap();
    assert_eq!(raw, b"hello");
    assert_eq!(storage.get("a.txt").await.unwrap().unwrap(), b"hello");
    assert_eq!(backend.content_type("a.txt").as_deref(), Some("text/plain"));
}

#[tokio::test]
async fn test_enabled_encryption_frames_and_round_trips() {
    let backend = Arc::new(InMemoryStorageProvider::new());
    let settings = InMemorySettings::new();
    enable_encryption(&settings, Some(PASSPHRASE));
    let storage = decorated(&backend, &settings);

    storage.create("a.txt", b"hello", Some("text/plain")).await.unwrap();

    let raw = backend.get("a.txt").await.unwrap().unwrap();
    assert!(raw.len() >= 34);
    assert_eq!(&raw[..MAGIC.len()], MAGIC);
    assert!(is_encrypted_payload(&raw));
    assert_eq!(
        backend.content_type("a.txt").as_deref(),
        Some("application/octet-stream")
    );

    assert_eq!(storage.get("a.txt").await.unwrap().unwrap(), b"hello");

    let key = derive_aes256_key(PASSPHRASE).unwrap();
    assert_eq!(decrypt_buffer(&raw, &key, None).unwrap(), b"hello");
}

#[tokio::test]
async fn test_enabled_without_key_fails_before_backend_call() {
    let backend = Arc::new(InMemoryStorageProvider::new());
    let settings = InMemorySettings::new();
    enable_encryption(&settings, None);
    let storage = decorated(&backend, &settings);

    let err = storage.create("a.txt", b"hello", None).await.unwrap_err();

    assert!(matches!(err, StorageError::Config(_)));
    assert_eq!(backend.write_count(), 0);
    assert!(backend.is_empty());
}

#[tokio::test]
async fn test_toggling_policy_keeps_existing_framing() {
    let backend = Arc::new(InMemoryStorageProvider::new());
    let settings = InMemorySettings::new();
    let storage = decorated(&backend, &settings);

    storage.create("plain.txt", b"old", None).await.unwrap();

    enable_encryption(&settings, Some(PASSPHRASE));
    storage.create("secret.txt", b"new", None).await.unwrap();

    assert_eq!(storage.get("plain.txt").await.unwrap().unwrap(), b"old");
    assert_eq!(storage.get("secret.txt").await.unwrap().unwrap(), b"new");

    // Turning encryption off does not make framed objects unreadable
    settings.set(STORAGE_NAMESPACE, ENCRYPTION_ENABLED, "false");
    assert_eq!(storage.get("secret.txt").await.unwrap().unwrap(), b"new");
    storage.create("later.txt", b"plain again", None).await.unwrap();
    assert_eq!(backend.get("later.txt").await.unwrap().unwrap(), b"plain again");
}

#[tokio::test]
async fn test_framed_object_without_key_is_an_error_not_absence() {
    let backend = Arc::new(InMemoryStorageProvider::new());
    let settings = InMemorySettings::new();
    enable_encryption(&settings, Some(PASSPHRASE));
    let storage = decorated(&backend, &settings);
    storage.create("a.txt", b"hello", None).await.unwrap();

    settings.remove(STORAGE_NAMESPACE, ENCRYPTION_KEY);

    let err = storage.get("a.txt").await.unwrap_err();
    assert!(matches!(err, StorageError::Config(_)));
}

#[tokio::test]
async fn test_wrong_key_is_integrity_failure() {
    let backend = Arc::new(InMemoryStorageProvider::new());
    let settings = InMemorySettings::new();
    enable_encryption(&settings, Some(PASSPHRASE));
    let storage = decorated(&backend, &settings);
    storage.create("a.txt", b"hello", None).await.unwrap();

    settings.set(STORAGE_NAMESPACE, ENCRYPTION_KEY, "a different passphrase");

    let err = storage.get("a.txt").await.unwrap_err();
    assert!(matches!(err, StorageError::Integrity(_)));
}

#[tokio::test]
async fn test_encrypted_writes_through_openlist() {
    let mock = MockOpenList::start().await.unwrap();
    let settings = InMemorySettings::new();
    enable_encryption(&settings, Some(PASSPHRASE));
    let settings: Arc<dyn SettingsProvider> = Arc::new(settings);
    let storage = EncryptedStorageProvider::new(
        Box::new(provider_for(&mock.base_url, Some("vault"))),
        settings,
    );

    storage.create("a.txt", b"hello", Some("text/plain")).await.unwrap();

    let stored = mock.file("/vault/a.txt").unwrap();
    assert!(is_encrypted_payload(&stored));
    assert_eq!(
        mock.uploads()[0].content_type.as_deref(),
        Some("application/octet-stream")
    );
    assert_eq!(storage.get("a.txt").await.unwrap().unwrap(), b"hello");
}

#[tokio::test]
async fn test_factory_backend_is_always_decorated() {
    let dir = tempfile::tempdir().unwrap();
    let settings = InMemorySettings::new();
    enable_encryption(&settings, Some(PASSPHRASE));
    let shared_settings: Arc<dyn SettingsProvider> = Arc::new(settings.clone());

    let storage = create_storage_provider(
        &StorageConfig::Local(LocalStorageConfig::new(dir.path())),
        shared_settings,
    )
    .unwrap();

    storage.create("2024/a.txt", b"hello", None).await.unwrap();

    let on_disk = std::fs::read(dir.path().join("2024").join("a.txt")).unwrap();
    assert!(is_encrypted_payload(&on_disk));
    assert_eq!(storage.get("2024/a.txt").await.unwrap().unwrap(), b"hello");
}
