//! Command surface for the desktop shell.
//!
//! [`LicenseService`] exposes one async method per shell command. Each runs
//! its (blocking, file- and CPU-bound) work on tokio's blocking pool, so the
//! caller's thread stays responsive. Shared state is the key manager and the
//! registry, both internally locked; validation never touches the registry.
//!
//! # Example
//!
//! ```rust,ignore
//! use licforge::config::get_config;
//! use licforge::service::LicenseService;
//!
//! let service = LicenseService::from_config(get_config()?)?;
//! let key = service
//!     .generate_license_key("Acme".into(), "ops@acme.test".into(), 365, vec!["basic".into()])
//!     .await?;
//! let result = service.validate_license_key(key).await?;
//! assert!(result.is_valid);
//! ```

use std::sync::Arc;

use crate::codec::{LicenseKeyFormat, LicenseRecord};
use crate::config::ForgeConfig;
use crate::errors::LicenseResult;
use crate::issuer::{LicenseIssuer, LicenseRequest};
use crate::keys::KeyManager;
use crate::machine::{current_machine_id, MachineId};
use crate::registry::LicenseRegistry;
use crate::validator::{LicenseValidator, ValidationResult};

#[derive(Debug, Clone)]
pub struct LicenseService {
    keys: Arc<KeyManager>,
    registry: Arc<LicenseRegistry>,
    issuer: LicenseIssuer,
    validator: LicenseValidator,
}

impl LicenseService {
    pub fn new(
        keys: Arc<KeyManager>,
        registry: Arc<LicenseRegistry>,
        format: LicenseKeyFormat,
    ) -> Self {
        let issuer = LicenseIssuer::new(keys.clone(), registry.clone(), format.clone());
        let validator = LicenseValidator::new(keys.clone(), format);
        Self {
            keys,
            registry,
            issuer,
            validator,
        }
    }

    /// Build the service from configuration.
    ///
    /// Nothing is read from disk yet; the signing key is loaded on first use.
    pub fn from_config(config: &ForgeConfig) -> LicenseResult<Self> {
        let keys = KeyManager::new(config.key_path()?, config.storage.seal_with_machine);
        let registry = LicenseRegistry::open(config.registry_path()?);
        Ok(Self::new(
            Arc::new(keys),
            Arc::new(registry),
            LicenseKeyFormat::from(&config.license),
        ))
    }

    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    pub fn registry(&self) -> &Arc<LicenseRegistry> {
        &self.registry
    }

    pub fn issuer(&self) -> &LicenseIssuer {
        &self.issuer
    }

    pub fn validator(&self) -> &LicenseValidator {
        &self.validator
    }

    async fn blocking<T, F>(f: F) -> LicenseResult<T>
    where
        F: FnOnce() -> LicenseResult<T> + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(f).await?
    }

    pub async fn generate_license_key(
        &self,
        customer_name: String,
        customer_email: String,
        expiry_days: i64,
        features: Vec<String>,
    ) -> LicenseResult<String> {
        let request = LicenseRequest::new(customer_name, customer_email, expiry_days, features);
        self.issue(request).await
    }

    pub async fn generate_license_key_with_machine_code(
        &self,
        customer_name: String,
        customer_email: String,
        expiry_days: i64,
        features: Vec<String>,
        machine_code: String,
    ) -> LicenseResult<String> {
        let request = LicenseRequest::new(customer_name, customer_email, expiry_days, features)
            .with_machine_code(machine_code);
        self.issue(request).await
    }

    /// Issue from a prepared request.
    pub async fn issue(&self, request: LicenseRequest) -> LicenseResult<String> {
        let issuer = self.issuer.clone();
        Self::blocking(move || issuer.issue(&request)).await
    }

    pub async fn validate_license_key(
        &self,
        license_key: String,
    ) -> LicenseResult<ValidationResult> {
        let validator = self.validator.clone();
        Self::blocking(move || Ok(validator.validate_license_key(&license_key))).await
    }

    pub async fn validate_license_key_with_machine_code(
        &self,
        license_key: String,
        machine_code: String,
    ) -> LicenseResult<ValidationResult> {
        let validator = self.validator.clone();
        Self::blocking(move || {
            Ok(validator.validate_license_key_with_machine_code(&license_key, &machine_code))
        })
        .await
    }

    /// This host's fingerprint, with `degraded` set when it is only the fallback.
    pub async fn get_current_machine_id(&self) -> LicenseResult<MachineId> {
        Self::blocking(|| Ok(current_machine_id())).await
    }

    pub async fn export_license_public_key(&self) -> LicenseResult<String> {
        let keys = self.keys.clone();
        Self::blocking(move || keys.export_public_key()).await
    }

    pub async fn get_licenses(&self) -> LicenseResult<Vec<LicenseRecord>> {
        let registry = self.registry.clone();
        Self::blocking(move || registry.list()).await
    }

    /// Remove a registry entry. Returns whether one was removed.
    pub async fn delete_license_by_id(&self, license_id: String) -> LicenseResult<bool> {
        let registry = self.registry.clone();
        Self::blocking(move || registry.delete(&license_id)).await
    }
}
