//! Structured logging for licforge.
//!
//! License and key lifecycle changes are emitted as `tracing` events inside a
//! span carrying the event name, so an audit trail can be filtered out of the
//! regular log output.
//!
//! # Usage
//!
//! ```rust,ignore
//! use licforge::config::get_config;
//! use licforge::logging::init_logging;
//!
//! init_logging(&get_config()?.logging)?;
//! ```

use std::path::Path;

use tracing::{info, info_span, warn, Level};

use crate::config::LoggingConfig;
use crate::errors::{LicenseError, LicenseResult};

/// License lifecycle event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseEvent {
    /// A license key was generated and signed
    Issued,
    /// The issued license was appended to the registry
    Registered,
    /// A license key validated successfully
    Validated,
    /// A license key failed validation
    ValidationFailed,
    /// A registry entry was removed
    Deleted,
}

impl std::fmt::Display for LicenseEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LicenseEvent::Issued => "issued",
            LicenseEvent::Registered => "registered",
            LicenseEvent::Validated => "validated",
            LicenseEvent::ValidationFailed => "validation_failed",
            LicenseEvent::Deleted => "deleted",
        };
        write!(f, "{}", s)
    }
}

/// Signing key lifecycle event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    /// A new key pair was generated and stored
    Generated,
    /// An existing key pair was loaded
    Loaded,
    /// The public key was exported
    Exported,
}

impl std::fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            KeyEvent::Generated => "generated",
            KeyEvent::Loaded => "loaded",
            KeyEvent::Exported => "exported",
        };
        write!(f, "{}", s)
    }
}

/// Log a license lifecycle event.
///
/// # Arguments
///
/// * `event` - The type of license event
/// * `license_id` - The license ID, or `-` when the key could not be decoded
/// * `details` - Optional additional details about the event
pub fn log_license_event(event: LicenseEvent, license_id: &str, details: Option<&str>) {
    let span = info_span!(
        "license_event",
        event = %event,
        license_id = %license_id,
    );
    let _enter = span.enter();

    match (event, details) {
        (LicenseEvent::ValidationFailed, Some(d)) => warn!(reason = %d, "License event occurred"),
        (LicenseEvent::ValidationFailed, None) => warn!("License event occurred"),
        (_, Some(d)) => info!(details = %d, "License event occurred"),
        (_, None) => info!("License event occurred"),
    }
}

/// Log a signing key lifecycle event.
pub fn log_key_event(event: KeyEvent, key_path: &Path) {
    info!(
        event = %event,
        key_path = %key_path.display(),
        "Signing key event occurred"
    );
}

/// Parse a configured log level.
pub fn parse_level(level: &str) -> LicenseResult<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(LicenseError::ConfigError(format!(
            "unknown log level '{other}'"
        ))),
    }
}

/// Install the global `tracing` subscriber if logging is enabled.
///
/// Calling this more than once is harmless; later calls keep the first
/// subscriber.
pub fn init_logging(config: &LoggingConfig) -> LicenseResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let level = parse_level(&config.level)?;
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
    Ok(())
}
