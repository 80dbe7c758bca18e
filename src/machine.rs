//! Machine identity derivation.
//!
//! A machine fingerprint is built from a handful of stable, host-specific
//! identifiers (OS machine id, firmware UUID, board serial, the hardware
//! address of a physical network adapter, volume serial, depending on the
//! platform). The identifiers are hashed with SHA-256 and truncated to a
//! fixed-length, printable code that can be read out over the phone or pasted
//! into an email.
//!
//! The fingerprint is stable across calls and reboots. It changes when the
//! underlying hardware identifiers change (reinstall, board swap); a license
//! bound to the old fingerprint then stops validating on that host.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use tracing::warn;

#[cfg(target_os = "linux")]
#[path = "machine/linux.rs"]
mod platform;

#[cfg(target_os = "macos")]
#[path = "machine/macos.rs"]
mod platform;

#[cfg(target_os = "windows")]
#[path = "machine/windows.rs"]
mod platform;

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
mod platform {
    pub fn collect_identifiers() -> Vec<String> {
        Vec::new()
    }
}

/// Returned instead of a fingerprint when no stable identifier is available.
pub const FALLBACK_MACHINE_ID: &str = "UNIDENTIFIED-MACHINE";

/// Number of hex characters in a fingerprint.
pub const FINGERPRINT_LEN: usize = 32;

/// Values some firmware reports instead of a real identifier.
const PLACEHOLDER_VALUES: &[&str] = &[
    "unknown",
    "none",
    "default string",
    "to be filled by o.e.m.",
    "not specified",
    "not applicable",
    "system serial number",
];

static CURRENT: OnceLock<MachineId> = OnceLock::new();

/// Fingerprint of a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineId {
    /// Upper-case hex fingerprint, or [`FALLBACK_MACHINE_ID`].
    pub fingerprint: String,
    /// True when no stable identifier could be collected.
    pub degraded: bool,
}

impl MachineId {
    fn fallback() -> Self {
        Self {
            fingerprint: FALLBACK_MACHINE_ID.to_string(),
            degraded: true,
        }
    }
}

impl std::fmt::Display for MachineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.fingerprint)
    }
}

/// Fingerprint of the current host.
///
/// Identifiers are collected once per process.
pub fn current_machine_id() -> MachineId {
    CURRENT
        .get_or_init(|| {
            let id = derive_machine_id(&platform::collect_identifiers());
            if id.degraded {
                warn!("no stable machine identifier available, using fallback fingerprint");
            }
            id
        })
        .clone()
}

/// Fingerprint string of the current host.
pub fn get_current_machine_id() -> String {
    current_machine_id().fingerprint
}

/// Derive a fingerprint from raw identifiers.
///
/// Unusable entries (empty, all zeros, vendor placeholders) are dropped. If
/// nothing remains the result is the degraded fallback.
pub fn derive_machine_id<S: AsRef<str>>(identifiers: &[S]) -> MachineId {
    let usable: Vec<&str> = identifiers
        .iter()
        .map(|s| s.as_ref().trim())
        .filter(|s| is_usable(s))
        .collect();

    if usable.is_empty() {
        return MachineId::fallback();
    }

    let digest = Sha256::digest(usable.join("|").as_bytes());
    let mut fingerprint = hex::encode_upper(digest);
    fingerprint.truncate(FINGERPRINT_LEN);

    MachineId {
        fingerprint,
        degraded: false,
    }
}

/// Identifiers are collected as `label=value`; only the value is judged.
fn is_usable(identifier: &str) -> bool {
    let value = identifier
        .split_once('=')
        .map(|(_, v)| v)
        .unwrap_or(identifier)
        .trim();

    if value.is_empty() {
        return false;
    }
    if value
        .chars()
        .all(|c| c == '0' || c == ':' || c == '-' || c == ' ')
    {
        return false;
    }
    let lower = value.to_lowercase();
    !PLACEHOLDER_VALUES.contains(&lower.as_str())
}
