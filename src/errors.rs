//! Error types for licforge.
//!
//! Every failure is a [`LicenseError`] value. Callers that need to branch on
//! the class of failure (e.g. to decide whether to show "contact support" or
//! "re-enter your key") use [`LicenseError::kind`] instead of matching text.

use thiserror::Error;

/// Coarse classification of a [`LicenseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller supplied unusable input. Rejected before any cryptographic work.
    Input,
    /// The license key is structurally broken or its signature does not verify.
    Integrity,
    /// The license is authentic but a policy check (expiry, machine) failed.
    Policy,
    /// Local storage, key material or a background task failed.
    Storage,
    /// Configuration could not be loaded or is invalid.
    Config,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Input => "input",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Policy => "policy",
            ErrorKind::Storage => "storage",
            ErrorKind::Config => "config",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Error)]
pub enum LicenseError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("malformed license key: {0}")]
    MalformedKey(String),

    #[error("malformed license payload: {0}")]
    MalformedPayload(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("license expired")]
    Expired,

    #[error("license not valid for this machine")]
    MachineMismatch,

    #[error("storage error: {0}")]
    StorageError(#[from] std::io::Error),

    #[error("key error: {0}")]
    KeyError(String),

    #[error("encryption error: {0}")]
    EncryptionError(String),

    #[error("decryption error: {0}")]
    DecryptionError(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("license {0} is already registered")]
    DuplicateLicense(String),

    #[error("background task failed: {0}")]
    TaskError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl LicenseError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LicenseError::InvalidInput(_) => ErrorKind::Input,
            LicenseError::MalformedKey(_)
            | LicenseError::MalformedPayload(_)
            | LicenseError::InvalidSignature => ErrorKind::Integrity,
            LicenseError::Expired | LicenseError::MachineMismatch => ErrorKind::Policy,
            LicenseError::StorageError(_)
            | LicenseError::KeyError(_)
            | LicenseError::EncryptionError(_)
            | LicenseError::DecryptionError(_)
            | LicenseError::SerializationError(_)
            | LicenseError::DuplicateLicense(_)
            | LicenseError::TaskError(_) => ErrorKind::Storage,
            LicenseError::ConfigError(_) => ErrorKind::Config,
        }
    }
}

impl From<tokio::task::JoinError> for LicenseError {
    fn from(e: tokio::task::JoinError) -> Self {
        LicenseError::TaskError(e.to_string())
    }
}

pub type LicenseResult<T> = Result<T, LicenseError>;
