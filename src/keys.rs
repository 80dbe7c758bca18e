//! Signing key management.
//!
//! One Ed25519 key pair per installation. The private key is generated on
//! first use, sealed with AES-256-GCM (see [`crate::sealing`]) and stored in
//! the data directory with owner-only permissions. It never leaves this
//! module: everything else signs and verifies through [`KeyManager::sign`]
//! and the [`SignatureVerifier`] trait.
//!
//! The public key is exported as a PEM `PUBLIC KEY` block so validating
//! deployments can embed it and verify licenses with [`PublicKey`] alone.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair, UnparsedPublicKey, ED25519};
use tracing::{debug, warn};

use crate::errors::{LicenseError, LicenseResult};
use crate::logging::{log_key_event, KeyEvent};
use crate::machine::get_current_machine_id;
use crate::sealing::{derive_storage_key, seal_to_base64, unseal_from_base64};
use crate::storage::{read_optional, write_atomic, WriteMode};

/// Associated data for the sealed private key.
const SEAL_LABEL: &str = "licforge/signing-key";

/// Sealing context used when the key is not bound to the machine.
const PORTABLE_SEAL_CONTEXT: &str = "portable";

/// Length of a raw Ed25519 public key.
pub const PUBLIC_KEY_LEN: usize = 32;

/// DER prefix of an Ed25519 SubjectPublicKeyInfo (RFC 8410).
const ED25519_SPKI_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

const PEM_BEGIN: &str = "-----BEGIN PUBLIC KEY-----";
const PEM_END: &str = "-----END PUBLIC KEY-----";

/// Anything that can check a license signature.
pub trait SignatureVerifier: Send + Sync {
    /// Returns `true` only for a valid signature over `payload`. Never errors.
    fn verify(&self, payload: &[u8], signature: &[u8]) -> bool;
}

/// An Ed25519 public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    bytes: [u8; PUBLIC_KEY_LEN],
}

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> LicenseResult<Self> {
        let bytes: [u8; PUBLIC_KEY_LEN] = bytes.try_into().map_err(|_| {
            LicenseError::KeyError(format!(
                "public key must be {PUBLIC_KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Parse a PEM `PUBLIC KEY` block as produced by [`PublicKey::to_pem`].
    pub fn from_pem(pem: &str) -> LicenseResult<Self> {
        let body: String = pem
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && *line != PEM_BEGIN && *line != PEM_END)
            .collect();

        let der = B64
            .decode(body)
            .map_err(|e| LicenseError::KeyError(format!("public key is not valid base64: {e}")))?;

        match der.strip_prefix(&ED25519_SPKI_PREFIX[..]) {
            Some(raw) => Self::from_bytes(raw),
            None => Err(LicenseError::KeyError(
                "public key is not an Ed25519 SubjectPublicKeyInfo".to_string(),
            )),
        }
    }

    /// PEM `PUBLIC KEY` block (SubjectPublicKeyInfo, 64-column base64).
    pub fn to_pem(&self) -> String {
        let mut der = Vec::with_capacity(ED25519_SPKI_PREFIX.len() + PUBLIC_KEY_LEN);
        der.extend_from_slice(&ED25519_SPKI_PREFIX);
        der.extend_from_slice(&self.bytes);

        let encoded = B64.encode(der);
        let mut pem = String::from(PEM_BEGIN);
        pem.push('\n');
        for chunk in encoded.as_bytes().chunks(64) {
            pem.push_str(&String::from_utf8_lossy(chunk));
            pem.push('\n');
        }
        pem.push_str(PEM_END);
        pem.push('\n');
        pem
    }
}

impl SignatureVerifier for PublicKey {
    fn verify(&self, payload: &[u8], signature: &[u8]) -> bool {
        UnparsedPublicKey::new(&ED25519, &self.bytes)
            .verify(payload, signature)
            .is_ok()
    }
}

/// What the sealing key of the key file is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SealContext {
    Portable,
    CurrentMachine,
    Fixed(String),
}

/// Owner of the installation's signing identity.
///
/// The key pair is loaded (or generated) lazily on first use. The mutex
/// serializes load/generate so concurrent first calls agree on one key.
/// Verification goes through a separately cached public key and never
/// generates, writes or takes the mutex.
pub struct KeyManager {
    key_path: PathBuf,
    seal_context: SealContext,
    key_pair: Mutex<Option<Arc<Ed25519KeyPair>>>,
    verifying_key: OnceLock<PublicKey>,
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let seal = match self.seal_context {
            SealContext::Portable => "portable",
            SealContext::CurrentMachine => "machine",
            SealContext::Fixed(_) => "fixed",
        };
        f.debug_struct("KeyManager")
            .field("key_path", &self.key_path)
            .field("seal_context", &seal)
            .finish_non_exhaustive()
    }
}

impl KeyManager {
    /// Create a manager for the key stored at `key_path`.
    ///
    /// With `seal_with_machine`, the sealing key is derived from the machine
    /// fingerprint and the key file cannot be opened on another host, nor on
    /// this one after its fingerprint changes (new network adapter, board
    /// swap). Otherwise a fixed portable context is used.
    pub fn new(key_path: impl Into<PathBuf>, seal_with_machine: bool) -> Self {
        let seal_context = if seal_with_machine {
            SealContext::CurrentMachine
        } else {
            SealContext::Portable
        };
        Self::with_context(key_path.into(), seal_context)
    }

    /// Seal the key file under an explicit context, e.g. a fingerprint
    /// recorded when the key was first created.
    pub fn with_seal_context(key_path: impl Into<PathBuf>, context: impl Into<String>) -> Self {
        Self::with_context(key_path.into(), SealContext::Fixed(context.into()))
    }

    fn with_context(key_path: PathBuf, seal_context: SealContext) -> Self {
        Self {
            key_path,
            seal_context,
            key_pair: Mutex::new(None),
            verifying_key: OnceLock::new(),
        }
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Load the key pair, generating and storing one on first use.
    ///
    /// Idempotent. An existing key file that cannot be opened is an error;
    /// it is never silently replaced, since that would orphan every license
    /// already issued.
    pub fn ensure_keypair(&self) -> LicenseResult<()> {
        self.key_pair().map(|_| ())
    }

    /// Sign `payload` with the private key.
    pub fn sign(&self, payload: &[u8]) -> LicenseResult<Vec<u8>> {
        let key_pair = self.key_pair()?;
        Ok(key_pair.sign(payload).as_ref().to_vec())
    }

    /// The installation's public key, generating the key pair if needed.
    pub fn public_key(&self) -> LicenseResult<PublicKey> {
        if let Some(public_key) = self.verifying_key.get() {
            return Ok(public_key.clone());
        }
        let key_pair = self.key_pair()?;
        self.cache_public_key(&key_pair)
    }

    /// The public key if a key pair already exists. Never generates one.
    pub fn existing_public_key(&self) -> LicenseResult<Option<PublicKey>> {
        if let Some(public_key) = self.verifying_key.get() {
            return Ok(Some(public_key.clone()));
        }
        match self.load_from_disk()? {
            Some(key_pair) => self.cache_public_key(&key_pair).map(Some),
            None => Ok(None),
        }
    }

    fn cache_public_key(&self, key_pair: &Ed25519KeyPair) -> LicenseResult<PublicKey> {
        let public_key = PublicKey::from_bytes(key_pair.public_key().as_ref())?;
        Ok(self.verifying_key.get_or_init(|| public_key).clone())
    }

    /// The public key as PEM, for distribution to validating deployments.
    pub fn export_public_key(&self) -> LicenseResult<String> {
        let pem = self.public_key()?.to_pem();
        log_key_event(KeyEvent::Exported, &self.key_path);
        Ok(pem)
    }

    fn key_pair(&self) -> LicenseResult<Arc<Ed25519KeyPair>> {
        let mut guard = self
            .key_pair
            .lock()
            .map_err(|_| LicenseError::KeyError("key manager lock poisoned".to_string()))?;

        if let Some(existing) = guard.as_ref() {
            return Ok(Arc::clone(existing));
        }

        let key_pair = match self.load_from_disk()? {
            Some(key_pair) => {
                log_key_event(KeyEvent::Loaded, &self.key_path);
                key_pair
            }
            None => {
                let key_pair = self.generate_and_store()?;
                log_key_event(KeyEvent::Generated, &self.key_path);
                key_pair
            }
        };

        self.cache_public_key(&key_pair)?;
        let key_pair = Arc::new(key_pair);
        *guard = Some(Arc::clone(&key_pair));
        Ok(key_pair)
    }

    fn storage_key(&self) -> [u8; crate::sealing::KEY_SIZE] {
        match &self.seal_context {
            SealContext::Portable => derive_storage_key(PORTABLE_SEAL_CONTEXT),
            SealContext::CurrentMachine => derive_storage_key(&get_current_machine_id()),
            SealContext::Fixed(context) => derive_storage_key(context),
        }
    }

    fn load_from_disk(&self) -> LicenseResult<Option<Ed25519KeyPair>> {
        let Some(sealed) = read_optional(&self.key_path)? else {
            return Ok(None);
        };

        let pkcs8 =
            unseal_from_base64(&sealed, &self.storage_key(), SEAL_LABEL).map_err(|e| {
                let hint = match self.seal_context {
                    SealContext::Portable => "the file is corrupt or was sealed with seal_with_machine enabled",
                    _ => {
                        "the file is corrupt or was sealed under a different machine \
                         fingerprint; open it with the original seal context"
                    }
                };
                LicenseError::KeyError(format!(
                    "signing key {} cannot be unsealed ({hint}): {e}",
                    self.key_path.display()
                ))
            })?;
        let key_pair = Ed25519KeyPair::from_pkcs8(&pkcs8)
            .map_err(|e| LicenseError::KeyError(format!("stored key rejected: {e}")))?;
        Ok(Some(key_pair))
    }

    fn generate_and_store(&self) -> LicenseResult<Ed25519KeyPair> {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng)
            .map_err(|_| LicenseError::KeyError("key generation failed".to_string()))?;

        let sealed = seal_to_base64(pkcs8.as_ref(), &self.storage_key(), SEAL_LABEL)?;
        write_atomic(
            &self.key_path,
            sealed.as_bytes(),
            WriteMode::CreateNew,
            true,
        )?;

        Ed25519KeyPair::from_pkcs8(pkcs8.as_ref())
            .map_err(|e| LicenseError::KeyError(format!("generated key rejected: {e}")))
    }
}

impl SignatureVerifier for KeyManager {
    fn verify(&self, payload: &[u8], signature: &[u8]) -> bool {
        match self.existing_public_key() {
            Ok(Some(public_key)) => public_key.verify(payload, signature),
            Ok(None) => {
                debug!("no signing key exists yet, signature rejected");
                false
            }
            Err(e) => {
                warn!("signature check failed, signing key unavailable: {e}");
                false
            }
        }
    }
}
