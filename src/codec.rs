//! License record model and its canonical encodings.
//!
//! Two encodings live here:
//!
//! - The **canonical payload**: the exact bytes that get signed. Fields are
//!   written in a fixed order, separated by U+001E (record separator); the
//!   feature set is sorted, de-duplicated and joined with U+001F (unit
//!   separator). Control characters are not allowed inside any field, so the
//!   separators are unambiguous and two logically identical records always
//!   produce identical bytes.
//!
//! - The **license key string** handed to customers:
//!   `<PREFIX>.<base64url(payload)>.<hex(signature)>`. It is plain ASCII and
//!   safe to send by email or paste through a clipboard.

use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64URL;
use base64::Engine;
use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::config::LicenseConfig;
use crate::errors::{LicenseError, LicenseResult};

/// Version tag, first field of every payload.
pub const PAYLOAD_VERSION: &str = "LF1";

/// Separates payload fields.
pub const FIELD_SEPARATOR: char = '\u{1e}';

/// Separates feature names inside the features field.
pub const FEATURE_SEPARATOR: char = '\u{1f}';

/// Number of fields in a payload, version tag included.
const FIELD_COUNT: usize = 8;

/// Expiry further than this past the issue date means "never expires".
pub const NEVER_EXPIRES_AFTER_DAYS: i64 = 36_525;

/// Separates the parts of a license key string.
const KEY_SEPARATOR: char = '.';

/// The signed unit of trust.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRecord {
    /// Unique identifier generated at issuance.
    pub license_id: String,
    pub customer_name: String,
    pub customer_email: String,
    /// Issue timestamp, whole seconds.
    pub issue_date: DateTime<Utc>,
    /// Expiry timestamp, or the far-future sentinel for perpetual licenses.
    pub expiry_date: DateTime<Utc>,
    /// Capability names, sorted and de-duplicated.
    pub features: Vec<String>,
    /// Fingerprint of the only machine this license is valid on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_code: Option<String>,
    /// Hex Ed25519 signature over the canonical payload of the other fields.
    #[serde(default)]
    pub signature: String,
}

/// The expiry written for licenses that never expire: 9999-12-31T23:59:59Z.
pub fn never_expires_sentinel() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(9999, 12, 31)
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map(|dt| dt.and_utc())
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Whether an expiry is the "never expires" sentinel relative to its issue date.
pub fn is_never_expiring(issue_date: DateTime<Utc>, expiry_date: DateTime<Utc>) -> bool {
    expiry_date - issue_date > Duration::days(NEVER_EXPIRES_AFTER_DAYS)
}

impl LicenseRecord {
    pub fn never_expires(&self) -> bool {
        is_never_expiring(self.issue_date, self.expiry_date)
    }

    /// Expiry as an optional: `None` for perpetual licenses.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        (!self.never_expires()).then_some(self.expiry_date)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expiry| expiry < now)
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }

    /// Bound machine code, treating an empty string as unbound.
    pub fn bound_machine(&self) -> Option<&str> {
        self.machine_code.as_deref().filter(|code| !code.is_empty())
    }
}

/// Sort and de-duplicate feature names.
pub fn canonical_features<S: AsRef<str>>(features: &[S]) -> Vec<String> {
    let mut out: Vec<String> = features.iter().map(|f| f.as_ref().to_string()).collect();
    out.sort();
    out.dedup();
    out
}

/// Reject values that would break the canonical layout.
pub fn check_field(name: &str, value: &str) -> LicenseResult<()> {
    if value.chars().any(char::is_control) {
        return Err(LicenseError::InvalidInput(format!(
            "{name} must not contain control characters"
        )));
    }
    Ok(())
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_date(name: &str, value: &str) -> LicenseResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| LicenseError::MalformedPayload(format!("{name} is not a valid date: {e}")))
}

/// Canonical bytes of every field except the signature.
pub fn encode_payload(record: &LicenseRecord) -> LicenseResult<Vec<u8>> {
    check_field("license_id", &record.license_id)?;
    check_field("customer_name", &record.customer_name)?;
    check_field("customer_email", &record.customer_email)?;

    let features = canonical_features(&record.features);
    for feature in &features {
        if feature.is_empty() {
            return Err(LicenseError::InvalidInput(
                "feature names must not be empty".to_string(),
            ));
        }
        check_field("feature", feature)?;
    }

    let machine_code = record.machine_code.as_deref().unwrap_or("");
    check_field("machine_code", machine_code)?;

    let fields = [
        PAYLOAD_VERSION.to_string(),
        record.license_id.clone(),
        record.customer_name.clone(),
        record.customer_email.clone(),
        format_date(&record.issue_date),
        format_date(&record.expiry_date),
        features.join(&FEATURE_SEPARATOR.to_string()),
        machine_code.to_string(),
    ];

    Ok(fields.join(&FIELD_SEPARATOR.to_string()).into_bytes())
}

/// Parse canonical bytes back into a record with an empty signature.
///
/// Input that [`encode_payload`] could not have produced is rejected whole.
pub fn decode_payload(bytes: &[u8]) -> LicenseResult<LicenseRecord> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| LicenseError::MalformedPayload(format!("payload is not UTF-8: {e}")))?;

    let fields: Vec<&str> = text.split(FIELD_SEPARATOR).collect();
    if fields.len() != FIELD_COUNT {
        return Err(LicenseError::MalformedPayload(format!(
            "expected {FIELD_COUNT} fields, got {}",
            fields.len()
        )));
    }

    if fields[0] != PAYLOAD_VERSION {
        return Err(LicenseError::MalformedPayload(format!(
            "unsupported payload version '{}'",
            fields[0]
        )));
    }

    for (name, value) in [
        ("license_id", fields[1]),
        ("customer_name", fields[2]),
        ("customer_email", fields[3]),
    ] {
        if value.trim().is_empty() {
            return Err(LicenseError::MalformedPayload(format!("{name} is empty")));
        }
    }

    let issue_date = parse_date("issue_date", fields[4])?;
    let expiry_date = parse_date("expiry_date", fields[5])?;
    if expiry_date < issue_date {
        return Err(LicenseError::MalformedPayload(
            "expiry_date precedes issue_date".to_string(),
        ));
    }

    let features: Vec<String> = if fields[6].is_empty() {
        Vec::new()
    } else {
        fields[6]
            .split(FEATURE_SEPARATOR)
            .map(str::to_string)
            .collect()
    };
    if features.iter().any(String::is_empty) || canonical_features(&features) != features {
        return Err(LicenseError::MalformedPayload(
            "features are not in canonical form".to_string(),
        ));
    }

    let machine_code = (!fields[7].is_empty()).then(|| fields[7].to_string());

    Ok(LicenseRecord {
        license_id: fields[1].to_string(),
        customer_name: fields[2].to_string(),
        customer_email: fields[3].to_string(),
        issue_date,
        expiry_date,
        features,
        machine_code,
        signature: String::new(),
    })
}

/// Strict lowercase hex; anything [`hex::encode`] could not have produced is `None`.
fn decode_signature(text: &str) -> Option<Vec<u8>> {
    if text.is_empty() || !text.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return None;
    }
    hex::decode(text).ok()
}

/// A license key split into its signed payload and signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedLicense {
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Layout of the external license key string.
#[derive(Debug, Clone)]
pub struct LicenseKeyFormat {
    /// Leading tag, e.g. "LIC"
    pub prefix: String,
}

impl Default for LicenseKeyFormat {
    fn default() -> Self {
        Self {
            prefix: "LIC".to_string(),
        }
    }
}

impl From<&LicenseConfig> for LicenseKeyFormat {
    fn from(config: &LicenseConfig) -> Self {
        Self {
            prefix: config.key_prefix.clone(),
        }
    }
}

impl LicenseKeyFormat {
    /// Build the printable license key.
    pub fn encode_key(&self, payload: &[u8], signature: &[u8]) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.prefix,
            B64URL.encode(payload),
            hex::encode(signature),
            sep = KEY_SEPARATOR
        )
    }

    /// Split a license key into payload and signature.
    ///
    /// Whitespace anywhere in the key is ignored. A broken structure or
    /// payload is [`LicenseError::MalformedKey`]; a signature part that is not
    /// lowercase hex is [`LicenseError::InvalidSignature`].
    pub fn decode_key(&self, key: &str) -> LicenseResult<SignedLicense> {
        let compact: String = key.chars().filter(|c| !c.is_whitespace()).collect();

        let parts: Vec<&str> = compact.split(KEY_SEPARATOR).collect();
        if parts.len() != 3 {
            return Err(LicenseError::MalformedKey(format!(
                "expected 3 parts, got {}",
                parts.len()
            )));
        }
        if parts[0] != self.prefix {
            return Err(LicenseError::MalformedKey(format!(
                "unexpected prefix '{}'",
                parts[0]
            )));
        }

        let payload = B64URL
            .decode(parts[1])
            .map_err(|e| LicenseError::MalformedKey(format!("payload is not base64url: {e}")))?;
        if payload.is_empty() {
            return Err(LicenseError::MalformedKey(
                "payload must not be empty".to_string(),
            ));
        }

        let signature = decode_signature(parts[2]).ok_or(LicenseError::InvalidSignature)?;

        Ok(SignedLicense { payload, signature })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> LicenseRecord {
        LicenseRecord {
            license_id: "2f1c6f0e-5d7a-4c51-9d0c-0f7a3d0a9b11".to_string(),
            customer_name: "Acme".to_string(),
            customer_email: "ops@acme.test".to_string(),
            issue_date: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
            expiry_date: Utc.with_ymd_and_hms(2027, 1, 2, 3, 4, 5).unwrap(),
            features: vec!["basic".to_string(), "export".to_string()],
            machine_code: None,
            signature: String::new(),
        }
    }

    #[test]
    fn payload_layout_is_fixed() {
        let bytes = encode_payload(&sample()).unwrap();
        let expected = "LF1\u{1e}2f1c6f0e-5d7a-4c51-9d0c-0f7a3d0a9b11\u{1e}Acme\u{1e}ops@acme.test\u{1e}\
                        2026-01-02T03:04:05Z\u{1e}2027-01-02T03:04:05Z\u{1e}basic\u{1f}export\u{1e}";
        assert_eq!(String::from_utf8(bytes).unwrap(), expected);
    }

    #[test]
    fn feature_order_does_not_change_payload() {
        let mut shuffled = sample();
        shuffled.features = vec!["export".into(), "basic".into(), "export".into()];
        assert_eq!(
            encode_payload(&sample()).unwrap(),
            encode_payload(&shuffled).unwrap()
        );
    }

    #[test]
    fn decode_restores_record() {
        let mut record = sample();
        record.machine_code = Some("0123456789ABCDEF0123456789ABCDEF".to_string());
        let decoded = decode_payload(&encode_payload(&record).unwrap()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn encode_rejects_separators_in_fields() {
        let mut record = sample();
        record.customer_name = format!("Acme{FIELD_SEPARATOR}Evil");
        assert!(matches!(
            encode_payload(&record),
            Err(LicenseError::InvalidInput(_))
        ));

        let mut record = sample();
        record.features = vec![format!("a{FEATURE_SEPARATOR}b")];
        assert!(encode_payload(&record).is_err());

        let mut record = sample();
        record.features = vec![String::new()];
        assert!(encode_payload(&record).is_err());
    }

    #[test]
    fn decode_rejects_malformed_input() {
        let cases: Vec<Vec<u8>> = vec![
            vec![0xff, 0xfe],
            b"LF1\x1eonly-two".to_vec(),
            b"LF9\x1eid\x1en\x1ee\x1e2026-01-02T03:04:05Z\x1e2027-01-02T03:04:05Z\x1e\x1e".to_vec(),
            b"LF1\x1eid\x1en\x1ee\x1eyesterday\x1e2027-01-02T03:04:05Z\x1e\x1e".to_vec(),
            b"LF1\x1eid\x1en\x1ee\x1e2027-01-02T03:04:05Z\x1e2026-01-02T03:04:05Z\x1e\x1e".to_vec(),
            b"LF1\x1eid\x1e \x1ee\x1e2026-01-02T03:04:05Z\x1e2027-01-02T03:04:05Z\x1e\x1e".to_vec(),
            b"LF1\x1eid\x1en\x1ee\x1e2026-01-02T03:04:05Z\x1e2027-01-02T03:04:05Z\x1eb\x1fa\x1e".to_vec(),
        ];
        for case in cases {
            assert!(
                matches!(decode_payload(&case), Err(LicenseError::MalformedPayload(_))),
                "accepted {:?}",
                String::from_utf8_lossy(&case)
            );
        }
    }

    #[test]
    fn sentinel_never_expires() {
        let mut record = sample();
        record.expiry_date = never_expires_sentinel();
        assert!(record.never_expires());
        assert_eq!(record.expires_at(), None);
        assert!(!record.is_expired_at(Utc.with_ymd_and_hms(9000, 1, 1, 0, 0, 0).unwrap()));

        let decoded = decode_payload(&encode_payload(&record).unwrap()).unwrap();
        assert!(decoded.never_expires());
    }

    #[test]
    fn anything_past_a_century_counts_as_perpetual() {
        let record = sample();
        let issue = record.issue_date;
        assert!(is_never_expiring(issue, issue + Duration::days(36_526)));
        assert!(!is_never_expiring(issue, issue + Duration::days(36_500)));
    }

    #[test]
    fn expiry_check() {
        let record = sample();
        assert!(!record.is_expired_at(record.issue_date));
        assert!(!record.is_expired_at(record.expiry_date));
        assert!(record.is_expired_at(record.expiry_date + Duration::seconds(1)));
    }

    #[test]
    fn key_string_round_trip_and_whitespace() {
        let format = LicenseKeyFormat::default();
        let key = format.encode_key(b"payload bytes", &[0xab; 64]);
        assert!(key.starts_with("LIC."));
        assert!(key.is_ascii());

        let wrapped = format!("  {}\n{}  ", &key[..20], &key[20..]);
        let decoded = format.decode_key(&wrapped).unwrap();
        assert_eq!(decoded.payload, b"payload bytes");
        assert_eq!(decoded.signature, vec![0xab; 64]);
    }

    #[test]
    fn key_string_rejects_bad_structure() {
        let format = LicenseKeyFormat::default();
        for key in [
            "",
            "LIC.abc",
            "LIC.abc.00.extra",
            "PRO.cGF5bG9hZA.00",
            "LIC.!!!.00",
            "LIC..00",
        ] {
            assert!(
                matches!(format.decode_key(key), Err(LicenseError::MalformedKey(_))),
                "accepted {key:?}"
            );
        }
    }

    #[test]
    fn signature_part_must_be_lowercase_hex() {
        let format = LicenseKeyFormat::default();
        for key in [
            "LIC.cGF5bG9hZA.zz",
            "LIC.cGF5bG9hZA.",
            "LIC.cGF5bG9hZA.ABAB",
            "LIC.cGF5bG9hZA.abA",
            "LIC.cGF5bG9hZA.abg",
            "LIC.cGF5bG9hZA.abc",
        ] {
            assert!(
                matches!(format.decode_key(key), Err(LicenseError::InvalidSignature)),
                "accepted {key:?}"
            );
        }
        assert_eq!(
            format.decode_key("LIC.cGF5bG9hZA.abab").unwrap().signature,
            vec![0xab, 0xab]
        );
    }

    #[test]
    fn feature_lookup_and_binding() {
        let mut record = sample();
        assert!(record.has_feature("export"));
        assert!(!record.has_feature("admin"));
        assert_eq!(record.bound_machine(), None);

        record.machine_code = Some(String::new());
        assert_eq!(record.bound_machine(), None);
        record.machine_code = Some("ABC".to_string());
        assert_eq!(record.bound_machine(), Some("ABC"));
    }
}
