//! licforge - offline license issuing and validation
//!
//! licforge signs license records with a per-installation Ed25519 key and
//! verifies them without any network access. Licenses can optionally be bound
//! to a single machine fingerprint.
//!
//! # Features
//!
//! - `cli` - The `licforge` command-line binary. Enabled by default.
//!
//! # Example
//!
//! ```toml
//! # Library only
//! licforge = { path = "../licforge", default-features = false }
//! ```
//!
//! # Modules
//!
//! - `machine`   → host fingerprint derivation
//! - `keys`      → signing key lifecycle, public key export
//! - `codec`     → license record, canonical payload, key string format
//! - `issuer`    → license issuance
//! - `validator` → offline validation
//! - `registry`  → local audit list of issued licenses
//! - `service`   → async command surface for a GUI shell

pub mod codec;
pub mod config;
pub mod errors;
pub mod issuer;
pub mod keys;
pub mod logging;
pub mod machine;
pub mod registry;
pub mod sealing;
pub mod service;
pub mod storage;
pub mod validator;

pub use codec::{LicenseKeyFormat, LicenseRecord};
pub use errors::{ErrorKind, LicenseError, LicenseResult};
pub use issuer::{LicenseIssuer, LicenseRequest};
pub use keys::{KeyManager, PublicKey, SignatureVerifier};
pub use machine::{current_machine_id, get_current_machine_id, MachineId};
pub use registry::LicenseRegistry;
pub use service::LicenseService;
pub use validator::{LicenseValidator, ValidationResult, ValidationStatus};
