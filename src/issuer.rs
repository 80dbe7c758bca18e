//! License issuance.
//!
//! Turns customer metadata into a signed license key string and records it in
//! the registry. Input is validated before any cryptographic work, so a
//! rejected request never produces (or registers) a partial license.

use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::{
    canonical_features, check_field, encode_payload, never_expires_sentinel, LicenseKeyFormat,
    LicenseRecord,
};
use crate::errors::{LicenseError, LicenseResult};
use crate::keys::KeyManager;
use crate::logging::{log_license_event, LicenseEvent};
use crate::machine::FALLBACK_MACHINE_ID;
use crate::registry::LicenseRegistry;

/// Longest finite validity. Anything longer would fall into the perpetual range.
pub const MAX_EXPIRY_DAYS: i64 = 36_500;

/// What to put into a new license.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRequest {
    pub customer_name: String,
    pub customer_email: String,
    /// Days of validity; zero or negative means the license never expires.
    pub expiry_days: i64,
    pub features: Vec<String>,
    /// Bind the license to this machine fingerprint.
    #[serde(default)]
    pub machine_code: Option<String>,
}

impl LicenseRequest {
    pub fn new(
        customer_name: impl Into<String>,
        customer_email: impl Into<String>,
        expiry_days: i64,
        features: Vec<String>,
    ) -> Self {
        Self {
            customer_name: customer_name.into(),
            customer_email: customer_email.into(),
            expiry_days,
            features,
            machine_code: None,
        }
    }

    pub fn with_machine_code(mut self, machine_code: impl Into<String>) -> Self {
        self.machine_code = Some(machine_code.into());
        self
    }
}

/// Parse a user-entered expiry ("365", " 0 ", "-1").
pub fn parse_expiry_days(input: &str) -> LicenseResult<i64> {
    input.trim().parse::<i64>().map_err(|_| {
        LicenseError::InvalidInput(format!("expiry_days must be a whole number, got '{input}'"))
    })
}

fn require_non_blank(name: &str, value: &str) -> LicenseResult<()> {
    if value.trim().is_empty() {
        return Err(LicenseError::InvalidInput(format!(
            "{name} must not be empty"
        )));
    }
    check_field(name, value)
}

/// Validate a request and assemble the unsigned record.
fn build_record(request: &LicenseRequest, now: DateTime<Utc>) -> LicenseResult<LicenseRecord> {
    require_non_blank("customer_name", &request.customer_name)?;
    require_non_blank("customer_email", &request.customer_email)?;

    for feature in &request.features {
        require_non_blank("feature", feature)?;
    }

    if request.expiry_days > MAX_EXPIRY_DAYS {
        return Err(LicenseError::InvalidInput(format!(
            "expiry_days must not exceed {MAX_EXPIRY_DAYS}; use 0 for a perpetual license"
        )));
    }

    let machine_code = match request.machine_code.as_deref().map(str::trim) {
        Some(code) if code.eq_ignore_ascii_case(FALLBACK_MACHINE_ID) => {
            return Err(LicenseError::InvalidInput(format!(
                "machine_code '{code}' is the placeholder for an unidentifiable host \
                 and cannot be bound to"
            )));
        }
        Some(code) if !code.is_empty() => {
            check_field("machine_code", code)?;
            Some(code.to_string())
        }
        _ => None,
    };

    let issue_date = now.trunc_subsecs(0);
    let expiry_date = if request.expiry_days <= 0 {
        never_expires_sentinel()
    } else {
        issue_date
            .checked_add_signed(Duration::days(request.expiry_days))
            .ok_or_else(|| LicenseError::InvalidInput("expiry date out of range".to_string()))?
    };

    Ok(LicenseRecord {
        license_id: Uuid::new_v4().to_string(),
        customer_name: request.customer_name.clone(),
        customer_email: request.customer_email.clone(),
        issue_date,
        expiry_date,
        features: canonical_features(&request.features),
        machine_code,
        signature: String::new(),
    })
}

/// Issues signed license keys and records them.
#[derive(Debug, Clone)]
pub struct LicenseIssuer {
    keys: Arc<KeyManager>,
    registry: Arc<LicenseRegistry>,
    format: LicenseKeyFormat,
}

impl LicenseIssuer {
    pub fn new(
        keys: Arc<KeyManager>,
        registry: Arc<LicenseRegistry>,
        format: LicenseKeyFormat,
    ) -> Self {
        Self {
            keys,
            registry,
            format,
        }
    }

    /// Issue an unbound license.
    pub fn generate_license_key(
        &self,
        customer_name: &str,
        customer_email: &str,
        expiry_days: i64,
        features: &[String],
    ) -> LicenseResult<String> {
        self.issue(&LicenseRequest::new(
            customer_name,
            customer_email,
            expiry_days,
            features.to_vec(),
        ))
    }

    /// Issue a license valid only on the machine with `machine_code`.
    ///
    /// An empty `machine_code` issues an unbound license.
    pub fn generate_license_key_with_machine_code(
        &self,
        customer_name: &str,
        customer_email: &str,
        expiry_days: i64,
        features: &[String],
        machine_code: &str,
    ) -> LicenseResult<String> {
        self.issue(
            &LicenseRequest::new(customer_name, customer_email, expiry_days, features.to_vec())
                .with_machine_code(machine_code),
        )
    }

    pub fn issue(&self, request: &LicenseRequest) -> LicenseResult<String> {
        self.issue_at(request, Utc::now())
    }

    /// Issue a license as of `now`.
    ///
    /// The registry entry is durable before the key is returned; if the
    /// registry cannot be written the key is not returned either.
    pub fn issue_at(&self, request: &LicenseRequest, now: DateTime<Utc>) -> LicenseResult<String> {
        let record = build_record(request, now)?;
        let payload = encode_payload(&record)?;
        let signature = self.keys.sign(&payload)?;
        let license_key = self.format.encode_key(&payload, &signature);

        let record = LicenseRecord {
            signature: hex::encode(&signature),
            ..record
        };
        let license_id = record.license_id.clone();
        let details = format!(
            "customer={}, features={}, bound={}",
            record.customer_name,
            record.features.len(),
            record.machine_code.is_some()
        );

        self.registry.append(record)?;
        log_license_event(LicenseEvent::Issued, &license_id, Some(&details));

        Ok(license_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_payload;
    use chrono::TimeZone;

    fn issuer(dir: &tempfile::TempDir) -> LicenseIssuer {
        LicenseIssuer::new(
            Arc::new(KeyManager::new(dir.path().join("key.enc"), false)),
            Arc::new(LicenseRegistry::open(dir.path().join("licenses.json"))),
            LicenseKeyFormat::default(),
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 9, 30, 0).unwrap()
    }

    #[test]
    fn build_record_computes_expiry() {
        let request = LicenseRequest::new("Acme", "ops@acme.test", 365, vec!["export".into()]);
        let record = build_record(&request, now()).unwrap();

        assert_eq!(record.issue_date, now());
        assert_eq!(record.expiry_date, now() + Duration::days(365));
        assert!(!record.never_expires());
        assert_eq!(record.machine_code, None);
        assert!(Uuid::parse_str(&record.license_id).is_ok());
    }

    #[test]
    fn zero_or_negative_days_never_expire() {
        for days in [0, -1, -365] {
            let request = LicenseRequest::new("Acme", "ops@acme.test", days, vec![]);
            let record = build_record(&request, now()).unwrap();
            assert_eq!(record.expiry_date, never_expires_sentinel());
            assert!(record.never_expires());
        }
    }

    #[test]
    fn issue_date_drops_subseconds() {
        let request = LicenseRequest::new("Acme", "ops@acme.test", 1, vec![]);
        let record = build_record(&request, now() + Duration::milliseconds(750)).unwrap();
        assert_eq!(record.issue_date, now());
    }

    #[test]
    fn rejects_bad_input() {
        let cases = [
            LicenseRequest::new("", "ops@acme.test", 1, vec![]),
            LicenseRequest::new("Acme", "   ", 1, vec![]),
            LicenseRequest::new("Acme", "ops@acme.test", 1, vec![" ".into()]),
            LicenseRequest::new("Acme\n", "ops@acme.test", 1, vec![]),
            LicenseRequest::new("Acme", "ops@acme.test", MAX_EXPIRY_DAYS + 1, vec![]),
        ];
        for request in cases {
            let err = build_record(&request, now()).unwrap_err();
            assert_eq!(err.kind(), crate::errors::ErrorKind::Input, "{request:?}");
        }
    }

    #[test]
    fn blank_machine_code_means_unbound() {
        let request =
            LicenseRequest::new("Acme", "ops@acme.test", 1, vec![]).with_machine_code("  ");
        assert_eq!(build_record(&request, now()).unwrap().machine_code, None);
    }

    #[test]
    fn fallback_fingerprint_cannot_be_bound() {
        let request = LicenseRequest::new("Acme", "ops@acme.test", 1, vec![])
            .with_machine_code(FALLBACK_MACHINE_ID);
        assert!(matches!(
            build_record(&request, now()),
            Err(LicenseError::InvalidInput(_))
        ));
    }

    #[test]
    fn parses_expiry_days() {
        assert_eq!(parse_expiry_days(" 365 ").unwrap(), 365);
        assert_eq!(parse_expiry_days("-1").unwrap(), -1);
        assert!(matches!(
            parse_expiry_days("a year"),
            Err(LicenseError::InvalidInput(_))
        ));
    }

    #[test]
    fn issued_key_carries_signed_payload_and_is_registered() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = issuer(&dir);

        let key = issuer
            .generate_license_key_with_machine_code(
                "Acme",
                "ops@acme.test",
                30,
                &["export".to_string(), "basic".to_string()],
                "0123456789ABCDEF0123456789ABCDEF",
            )
            .unwrap();

        let signed = LicenseKeyFormat::default().decode_key(&key).unwrap();
        assert!(crate::keys::SignatureVerifier::verify(
            issuer.keys.as_ref(),
            &signed.payload,
            &signed.signature
        ));

        let record = decode_payload(&signed.payload).unwrap();
        assert_eq!(record.features, ["basic", "export"]);

        let registered = issuer.registry.list().unwrap();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].license_id, record.license_id);
        assert_eq!(registered[0].signature, hex::encode(&signed.signature));
        assert_eq!(
            registered[0].machine_code.as_deref(),
            Some("0123456789ABCDEF0123456789ABCDEF")
        );
    }

    #[test]
    fn rejected_input_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = issuer(&dir);

        assert!(issuer
            .generate_license_key("", "ops@acme.test", 1, &[])
            .is_err());
        assert!(issuer.registry.list().unwrap().is_empty());
        assert!(!dir.path().join("key.enc").exists());
    }

    #[test]
    fn registry_failure_fails_issuance() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("licenses.json"), "garbage").unwrap();

        let result = issuer(&dir).generate_license_key("Acme", "ops@acme.test", 1, &[]);
        assert!(result.is_err());
    }
}
