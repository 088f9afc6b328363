//! AES-256-GCM at-rest encryption with a self-describing frame:
//! `MAGIC(6) || IV(12) || CIPHERTEXT(n) || TAG(16)`.

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

use super::StorageError;

pub const MAGIC: &[u8; 6] = b"CFENC1";
pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const KEY_LEN: usize = 32;
/// Smallest buffer that can carry a frame (empty ciphertext).
pub const MIN_PAYLOAD_LEN: usize = MAGIC.len() + IV_LEN + TAG_LEN;

#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("Encryption key is empty")]
    EmptyKey,
    #[error("Payload is not encrypted (missing magic header)")]
    NotEncrypted,
    #[error("Encrypted payload is too short")]
    TooShort,
    #[error("Encrypted payload failed authentication")]
    Authentication,
    #[error("Encryption failed: {0}")]
    Cipher(String),
}

impl From<EncryptionError> for StorageError {
    fn from(err: EncryptionError) -> Self {
        match err {
            EncryptionError::EmptyKey => StorageError::Config(err.to_string()),
            other => StorageError::Integrity(other.to_string()),
        }
    }
}

/// 256-bit content key. The bytes never appear in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    fn aead_key(&self) -> Result<LessSafeKey, EncryptionError> {
        let unbound = UnboundKey::new(&AES_256_GCM, &self.0)
            .map_err(|_| EncryptionError::Cipher("invalid key length".to_string()))?;
        Ok(LessSafeKey::new(unbound))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Classify a buffer as an encrypted frame. Depends only on the bytes.
pub fn is_encrypted_payload(payload: &[u8]) -> bool {
    payload.len() >= MIN_PAYLOAD_LEN && payload.starts_with(MAGIC)
}

/// Turn operator-supplied key material into a 256-bit key.
///
/// Accepts 64 hex characters, base64 of exactly 32 bytes, or any other
/// passphrase (hashed with SHA-256, stable but weaker than a random key).
pub fn derive_aes256_key(raw_key: &str) -> Result<EncryptionKey, EncryptionError> {
    let trimmed = raw_key.trim();
    if trimmed.is_empty() {
        return Err(EncryptionError::EmptyKey);
    }

    if trimmed.len() == 64 && trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
        let mut key = [0u8; KEY_LEN];
        hex::decode_to_slice(trimmed, &mut key)
            .map_err(|e| EncryptionError::Cipher(e.to_string()))?;
        return Ok(EncryptionKey(key));
    }

    let decoded = STANDARD
        .decode(trimmed)
        .or_else(|_| URL_SAFE.decode(trimmed))
        .ok()
        .and_then(|bytes| <[u8; KEY_LEN]>::try_from(bytes.as_slice()).ok());
    if let Some(key) = decoded {
        return Ok(EncryptionKey(key));
    }

    let digest = Sha256::digest(trimmed.as_bytes());
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&digest);
    Ok(EncryptionKey(key))
}

pub fn encrypt_buffer(
    plaintext: &[u8],
    key: &EncryptionKey,
    aad: Option<&[u8]>,
) -> Result<Vec<u8>, EncryptionError> {
    let mut iv = [0u8; IV_LEN];
    SystemRandom::new()
        .fill(&mut iv)
        .map_err(|_| EncryptionError::Cipher("random source unavailable".to_string()))?;

    let mut in_out = plaintext.to_vec();
    let tag = key
        .aead_key()?
        .seal_in_place_separate_tag(
            Nonce::assume_unique_for_key(iv),
            Aad::from(aad.unwrap_or_default()),
            &mut in_out,
        )
        .map_err(|_| EncryptionError::Cipher("seal failed".to_string()))?;

    let mut framed = Vec::with_capacity(MIN_PAYLOAD_LEN + in_out.len());
    framed.extend_from_slice(MAGIC);
    framed.extend_from_slice(&iv);
    framed.extend_from_slice(&in_out);
    framed.extend_from_slice(tag.as_ref());
    Ok(framed)
}

pub fn decrypt_buffer(
    payload: &[u8],
    key: &EncryptionKey,
    aad: Option<&[u8]>,
) -> Result<Vec<u8>, EncryptionError> {
    if !payload.starts_with(MAGIC) {
        return Err(EncryptionError::NotEncrypted);
    }
    if payload.len() < MIN_PAYLOAD_LEN {
        return Err(EncryptionError::TooShort);
    }

    let iv_end = MAGIC.len() + IV_LEN;
    let nonce = Nonce::try_assume_unique_for_key(&payload[MAGIC.len()..iv_end])
        .map_err(|_| EncryptionError::TooShort)?;

    // ring expects ciphertext and tag in one contiguous buffer
    let mut in_out = payload[iv_end..].to_vec();
    let plaintext = key
        .aead_key()?
        .open_in_place(nonce, Aad::from(aad.unwrap_or_default()), &mut in_out)
        .map_err(|_| EncryptionError::Authentication)?;
    Ok(plaintext.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> EncryptionKey {
        derive_aes256_key(&"ab".repeat(32)).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key();
        let plaintext = b"the quick brown fox jumps over the lazy dog";

        let framed = encrypt_buffer(plaintext, &key, None).unwrap();
        assert_eq!(framed.len(), MIN_PAYLOAD_LEN + plaintext.len());
        assert_eq!(&framed[..6], MAGIC);

        let decrypted = decrypt_buffer(&framed, &key, None).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_empty_plaintext_roundtrip() {
        let key = test_key();
        let framed = encrypt_buffer(b"", &key, None).unwrap();
        assert_eq!(framed.len(), MIN_PAYLOAD_LEN);
        assert!(is_encrypted_payload(&framed));
        assert!(decrypt_buffer(&framed, &key, None).unwrap().is_empty());
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let key = test_key();
        let a = encrypt_buffer(b"same input", &key, None).unwrap();
        let b = encrypt_buffer(b"same input", &key, None).unwrap();
        assert_ne!(a[6..18], b[6..18]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_aad_is_bound() {
        let key = test_key();
        let framed = encrypt_buffer(b"payload", &key, Some(b"photos/a.jpg")).unwrap();

        assert_eq!(
            decrypt_buffer(&framed, &key, Some(b"photos/a.jpg")).unwrap(),
            b"payload"
        );
        assert!(matches!(
            decrypt_buffer(&framed, &key, Some(b"photos/b.jpg")),
            Err(EncryptionError::Authentication)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails_authentication() {
        let key = test_key();
        let mut framed = encrypt_buffer(b"do not touch", &key, None).unwrap();
        let idx = MAGIC.len() + IV_LEN + 2;
        framed[idx] ^= 0x01;

        assert!(matches!(
            decrypt_buffer(&framed, &key, None),
            Err(EncryptionError::Authentication)
        ));
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let framed = encrypt_buffer(b"secret", &test_key(), None).unwrap();
        let other = derive_aes256_key("another passphrase").unwrap();
        assert!(matches!(
            decrypt_buffer(&framed, &other, None),
            Err(EncryptionError::Authentication)
        ));
    }

    #[test]
    fn test_decrypt_rejects_unframed_and_truncated() {
        let key = test_key();
        assert!(matches!(
            decrypt_buffer(b"plain old bytes that are long enough to pass", &key, None),
            Err(EncryptionError::NotEncrypted)
        ));

        let mut short = MAGIC.to_vec();
        short.extend_from_slice(&[0u8; 20]);
        assert!(matches!(
            decrypt_buffer(&short, &key, None),
            Err(EncryptionError::TooShort)
        ));
    }

    #[test]
    fn test_classification_is_pure() {
        let mut framed_like = MAGIC.to_vec();
        framed_like.extend_from_slice(&[0u8; 28]);
        assert_eq!(framed_like.len(), 34);
        assert!(is_encrypted_payload(&framed_like));

        // One byte short
        assert!(!is_encrypted_payload(&framed_like[..33]));

        // Same length, different leading bytes
        let mut jpeg_like = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
        jpeg_like.extend_from_slice(&[0u8; 100]);
        assert!(!is_encrypted_payload(&jpeg_like));

        assert!(!is_encrypted_payload(b"CFENC"));
        assert!(!is_encrypted_payload(b""));
    }

    #[test]
    fn test_derive_key_from_hex() {
        let hex_key = "00112233445566778899aabbccddeeff00112233445566778899AABBCCDDEEFF";
        let key = derive_aes256_key(hex_key).unwrap();
        assert_eq!(key.as_bytes()[0], 0x00);
        assert_eq!(key.as_bytes()[1], 0x11);
        assert_eq!(key.as_bytes()[31], 0xFF);
    }

    #[test]
    fn test_derive_key_from_base64() {
        let raw = [7u8; 32];
        let encoded = STANDARD.encode(raw);
        let key = derive_aes256_key(&format!("  {}  ", encoded)).unwrap();
        assert_eq!(key.as_bytes(), &raw);
    }

    #[test]
    fn test_derive_key_from_passphrase_is_deterministic() {
        let a = derive_aes256_key("correct horse battery staple").unwrap();
        let b = derive_aes256_key("correct horse battery staple").unwrap();
        let c = derive_aes256_key("correct horse battery staplf").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);

        let expected = Sha256::digest(b"correct horse battery staple");
        assert_eq!(a.as_bytes().as_slice(), expected.as_slice());
    }

    #[test]
    fn test_base64_of_wrong_length_falls_back_to_digest() {
        let short = STANDARD.encode([1u8; 16]);
        let key = derive_aes256_key(&short).unwrap();
        let expected = Sha256::digest(short.as_bytes());
        assert_eq!(key.as_bytes().as_slice(), expected.as_slice());
    }

    #[test]
    fn test_derive_key_rejects_blank_input() {
        assert!(matches!(derive_aes256_key(""), Err(EncryptionError::EmptyKey)));
        assert!(matches!(
            derive_aes256_key("  \t\n"),
            Err(EncryptionError::EmptyKey)
        ));
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = test_key();
        assert_eq!(format!("{:?}", key), "EncryptionKey(<redacted>)");
    }

    #[test]
    fn test_error_taxonomy_mapping() {
        assert!(matches!(
            StorageError::from(EncryptionError::EmptyKey),
            StorageError::Config(_)
        ));
        assert!(matches!(
            StorageError::from(EncryptionError::Authentication),
            StorageError::Integrity(_)
        ));
    }
}
