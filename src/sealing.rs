//! Sealed storage for key material at rest.
//!
//! AES-256-GCM with a caller-supplied label as associated data, so a blob
//! sealed for one purpose cannot be opened as another.
//!
//! Sealed format:
//!   [nonce (12 bytes)] || [ciphertext+tag]

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use rand::rngs::OsRng;
use rand::TryRngCore;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;

use sha2::{Digest, Sha256};

use crate::errors::{LicenseError, LicenseResult};

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// GCM nonce size in bytes (96-bit).
pub const NONCE_SIZE: usize = 12;

/// Domain separator for storage-key derivation.
const STORAGE_KEY_DOMAIN: &[u8] = b"licforge/storage-key/v1";

/// Derive a 256-bit sealing key from a context string.
///
/// storage_key = SHA256(domain || 0x00 || context)
pub fn derive_storage_key(context: &str) -> [u8; KEY_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(STORAGE_KEY_DOMAIN);
    hasher.update([0u8]);
    hasher.update(context.as_bytes());

    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&hasher.finalize());
    key
}

fn cipher_for(key: &[u8], err: fn(String) -> LicenseError) -> LicenseResult<Aes256Gcm> {
    if key.len() != KEY_SIZE {
        return Err(err(format!(
            "invalid key length: expected {} bytes, got {}",
            KEY_SIZE,
            key.len()
        )));
    }
    Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)))
}

/// Seal `plaintext` under `key`, binding it to `label`.
pub fn seal(plaintext: &[u8], key: &[u8], label: &str) -> LicenseResult<Vec<u8>> {
    let cipher = cipher_for(key, LicenseError::EncryptionError)?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|e| LicenseError::EncryptionError(format!("nonce generation failed: {e}")))?;

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad: label.as_bytes(),
            },
        )
        .map_err(|e| LicenseError::EncryptionError(format!("encryption failed: {e}")))?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

/// Open a blob produced by [`seal`] with the same key and label.
pub fn unseal(sealed: &[u8], key: &[u8], label: &str) -> LicenseResult<Vec<u8>> {
    let cipher = cipher_for(key, LicenseError::DecryptionError)?;

    if sealed.len() <= NONCE_SIZE {
        return Err(LicenseError::DecryptionError(
            "sealed data too short".to_string(),
        ));
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
    cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad: label.as_bytes(),
            },
        )
        .map_err(|e| LicenseError::DecryptionError(format!("decryption failed: {e}")))
}

/// Seal and return Base64 text suitable for a file.
pub fn seal_to_base64(plaintext: &[u8], key: &[u8], label: &str) -> LicenseResult<String> {
    Ok(B64.encode(seal(plaintext, key, label)?))
}

/// Open Base64 text produced by [`seal_to_base64`].
pub fn unseal_from_base64(sealed_b64: &str, key: &[u8], label: &str) -> LicenseResult<Vec<u8>> {
    let decoded = B64
        .decode(sealed_b64.trim())
        .map_err(|e| LicenseError::DecryptionError(format!("base64 decode failed: {e}")))?;
    unseal(&decoded, key, label)
}
