//! Offline license validation.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. split the key string (malformed → no record; a signature part that is
//!    not lowercase hex counts as an invalid signature),
//! 2. verify the signature (invalid → no record),
//! 3. decode the payload (malformed → no record),
//! 4. expiry (expired → record attached),
//! 5. machine binding (mismatch → record attached).
//!
//! Nothing from the payload is trusted, or returned, before the signature
//! holds. After that the record is always attached so a caller can show the
//! customer what the license says, even when a policy check failed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::{decode_payload, LicenseKeyFormat, LicenseRecord};
use crate::errors::{ErrorKind, LicenseError, LicenseResult};
use crate::keys::{PublicKey, SignatureVerifier};
use crate::logging::{log_license_event, LicenseEvent};
use crate::machine::get_current_machine_id;

/// Why a license key was accepted or rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Valid,
    Malformed,
    InvalidSignature,
    Expired,
    MachineMismatch,
}

impl ValidationStatus {
    pub fn message(&self) -> &'static str {
        match self {
            ValidationStatus::Valid => "license valid",
            ValidationStatus::Malformed => "malformed license key",
            ValidationStatus::InvalidSignature => "invalid signature",
            ValidationStatus::Expired => "license expired",
            ValidationStatus::MachineMismatch => "license not valid for this machine",
        }
    }

    /// Error class of a rejection; `None` for [`ValidationStatus::Valid`].
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ValidationStatus::Valid => None,
            ValidationStatus::Malformed | ValidationStatus::InvalidSignature => {
                Some(ErrorKind::Integrity)
            }
            ValidationStatus::Expired | ValidationStatus::MachineMismatch => {
                Some(ErrorKind::Policy)
            }
        }
    }
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// Outcome of validating a license key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    /// The decoded record; present only once the signature has been verified.
    pub info: Option<LicenseRecord>,
    pub message: String,
    pub status: ValidationStatus,
}

impl ValidationResult {
    fn rejected(status: ValidationStatus) -> Self {
        Self {
            is_valid: false,
            info: None,
            message: status.message().to_string(),
            status,
        }
    }

    fn with_record(status: ValidationStatus, record: LicenseRecord) -> Self {
        Self {
            is_valid: status == ValidationStatus::Valid,
            info: Some(record),
            message: status.message().to_string(),
            status,
        }
    }

    /// The verified record, or the rejection as an error.
    pub fn into_result(self) -> LicenseResult<LicenseRecord> {
        match (self.status, self.info) {
            (ValidationStatus::Valid, Some(record)) => Ok(record),
            (ValidationStatus::InvalidSignature, _) => Err(LicenseError::InvalidSignature),
            (ValidationStatus::Expired, _) => Err(LicenseError::Expired),
            (ValidationStatus::MachineMismatch, _) => Err(LicenseError::MachineMismatch),
            (_, _) => Err(LicenseError::MalformedKey(self.message)),
        }
    }
}

/// Verifies license keys against a public key.
#[derive(Clone)]
pub struct LicenseValidator {
    verifier: Arc<dyn SignatureVerifier>,
    format: LicenseKeyFormat,
}

impl std::fmt::Debug for LicenseValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseValidator")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl LicenseValidator {
    pub fn new(verifier: Arc<dyn SignatureVerifier>, format: LicenseKeyFormat) -> Self {
        Self { verifier, format }
    }

    /// Validator for a deployment that only has the exported public key.
    pub fn from_public_key_pem(pem: &str, format: LicenseKeyFormat) -> LicenseResult<Self> {
        let public_key = PublicKey::from_pem(pem)?;
        Ok(Self::new(Arc::new(public_key), format))
    }

    /// Validate signature and expiry. Machine binding is not checked.
    pub fn validate_license_key(&self, license_key: &str) -> ValidationResult {
        self.validate_at(license_key, None, Utc::now())
    }

    /// Validate signature, expiry and, for bound licenses, `machine_code`.
    pub fn validate_license_key_with_machine_code(
        &self,
        license_key: &str,
        machine_code: &str,
    ) -> ValidationResult {
        self.validate_at(license_key, Some(machine_code), Utc::now())
    }

    /// Validate against this host's fingerprint.
    pub fn validate_for_current_machine(&self, license_key: &str) -> ValidationResult {
        self.validate_license_key_with_machine_code(license_key, &get_current_machine_id())
    }

    /// Validate as of `now`.
    ///
    /// `machine_code: None` skips the binding check entirely.
    pub fn validate_at(
        &self,
        license_key: &str,
        machine_code: Option<&str>,
        now: DateTime<Utc>,
    ) -> ValidationResult {
        let result = self.check(license_key, machine_code, now);

        let license_id = result
            .info
            .as_ref()
            .map(|record| record.license_id.as_str())
            .unwrap_or("-");
        if result.is_valid {
            log_license_event(LicenseEvent::Validated, license_id, None);
        } else {
            log_license_event(
                LicenseEvent::ValidationFailed,
                license_id,
                Some(&result.message),
            );
        }

        result
    }

    fn check(
        &self,
        license_key: &str,
        machine_code: Option<&str>,
        now: DateTime<Utc>,
    ) -> ValidationResult {
        let signed = match self.format.decode_key(license_key) {
            Ok(signed) => signed,
            Err(LicenseError::InvalidSignature) => {
                return ValidationResult::rejected(ValidationStatus::InvalidSignature);
            }
            Err(e) => {
                tracing::debug!("license key rejected: {e}");
                return ValidationResult::rejected(ValidationStatus::Malformed);
            }
        };

        if !self.verifier.verify(&signed.payload, &signed.signature) {
            return ValidationResult::rejected(ValidationStatus::InvalidSignature);
        }

        let record = match decode_payload(&signed.payload) {
            Ok(record) => LicenseRecord {
                signature: hex::encode(&signed.signature),
                ..record
            },
            Err(e) => {
                tracing::warn!("signed payload failed to decode: {e}");
                return ValidationResult::rejected(ValidationStatus::Malformed);
            }
        };

        if record.is_expired_at(now) {
            return ValidationResult::with_record(ValidationStatus::Expired, record);
        }

        if let (Some(bound), Some(supplied)) = (record.bound_machine(), machine_code) {
            if bound != supplied.trim() {
                return ValidationResult::with_record(ValidationStatus::MachineMismatch, record);
            }
        }

        ValidationResult::with_record(ValidationStatus::Valid, record)
    }
}
