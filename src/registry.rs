//! Local registry of issued licenses.
//!
//! The registry is an audit trail: every license this installation issues is
//! appended here, in creation order. Removing an entry does not revoke the
//! license string already handed out.
//!
//! ## Storage
//!
//! A JSON document `{"licenses": [...]}` in the data directory. Each write
//! replaces the whole file atomically (see [`crate::storage`]), and all
//! read-modify-write cycles are serialized by a mutex, so two concurrent
//! issuances cannot interleave.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::codec::LicenseRecord;
use crate::errors::{LicenseError, LicenseResult};
use crate::logging::{log_license_event, LicenseEvent};
use crate::storage::{read_optional, write_atomic, WriteMode};

/// On-disk layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    licenses: Vec<LicenseRecord>,
}

/// Durable list of issued licenses.
#[derive(Debug)]
pub struct LicenseRegistry {
    path: PathBuf,
    lock: Mutex<()>,
}

impl LicenseRegistry {
    /// Open the registry stored at `path`. The file is created on first write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> LicenseResult<MutexGuard<'_, ()>> {
        self.lock.lock().map_err(|_| {
            LicenseError::StorageError(std::io::Error::other("registry lock poisoned"))
        })
    }

    fn load(&self) -> LicenseResult<RegistryFile> {
        match read_optional(&self.path)? {
            Some(contents) if !contents.trim().is_empty() => Ok(serde_json::from_str(&contents)?),
            _ => Ok(RegistryFile::default()),
        }
    }

    fn save(&self, file: &RegistryFile) -> LicenseResult<()> {
        let json = serde_json::to_string_pretty(file)?;
        write_atomic(&self.path, json.as_bytes(), WriteMode::Replace, true)
    }

    /// All issued licenses in creation order.
    pub fn list(&self) -> LicenseResult<Vec<LicenseRecord>> {
        let _guard = self.guard()?;
        Ok(self.load()?.licenses)
    }

    /// Look up one license by id.
    pub fn get(&self, license_id: &str) -> LicenseResult<Option<LicenseRecord>> {
        let _guard = self.guard()?;
        Ok(self
            .load()?
            .licenses
            .into_iter()
            .find(|record| record.license_id == license_id))
    }

    /// Append a newly issued license. The write is durable when this returns.
    pub fn append(&self, record: LicenseRecord) -> LicenseResult<()> {
        let _guard = self.guard()?;
        let mut file = self.load()?;

        if file
            .licenses
            .iter()
            .any(|existing| existing.license_id == record.license_id)
        {
            return Err(LicenseError::DuplicateLicense(record.license_id));
        }

        let license_id = record.license_id.clone();
        file.licenses.push(record);
        self.save(&file)?;

        log_license_event(LicenseEvent::Registered, &license_id, None);
        Ok(())
    }

    /// Remove the entry with `license_id`.
    ///
    /// Returns whether an entry was removed. An unknown id is not an error
    /// and leaves the file untouched.
    pub fn delete(&self, license_id: &str) -> LicenseResult<bool> {
        let _guard = self.guard()?;
        let mut file = self.load()?;

        let before = file.licenses.len();
        file.licenses.retain(|record| record.license_id != license_id);
        if file.licenses.len() == before {
            return Ok(false);
        }

        self.save(&file)?;
        log_license_event(LicenseEvent::Deleted, license_id, None);
        Ok(true)
    }
}
