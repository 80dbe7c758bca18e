//! Local file helpers shared by the key manager and the registry.
//!
//! Writes never modify the target in place: data goes to a temporary file in
//! the same directory, is flushed to disk and then renamed over (or next to)
//! the target. A crash at any point leaves either the old or the new file,
//! never a torn one.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::errors::{LicenseError, LicenseResult};

/// How [`write_atomic`] treats an existing target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the target if present.
    Replace,
    /// Fail with `AlreadyExists` if the target is present.
    CreateNew,
}

/// Read a file to a string, mapping "not found" to `None`.
pub fn read_optional(path: &Path) -> LicenseResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(LicenseError::StorageError(e)),
    }
}

/// Atomically write `data` to `path`.
///
/// `owner_only` restricts the file to the current user on unix.
pub fn write_atomic(
    path: &Path,
    data: &[u8],
    mode: WriteMode,
    owner_only: bool,
) -> LicenseResult<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;

    if owner_only {
        restrict_to_owner(tmp.as_file())?;
    }

    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;

    match mode {
        WriteMode::Replace => tmp
            .persist(path)
            .map_err(|e| LicenseError::StorageError(e.error))?,
        WriteMode::CreateNew => tmp
            .persist_noclobber(path)
            .map_err(|e| LicenseError::StorageError(e.error))?,
    };

    log::debug!("wrote {} bytes to {}", data.len(), path.display());
    Ok(())
}

#[cfg(unix)]
fn restrict_to_owner(file: &fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

// NTFS ACLs of the per-user data directory already restrict access.
#[cfg(not(unix))]
fn restrict_to_owner(_file: &fs::File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_optional(&dir.path().join("absent")).unwrap().is_none());
    }

    #[test]
    fn replace_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.json");

        write_atomic(&path, b"first", WriteMode::Replace, false).unwrap();
        write_atomic(&path, b"second", WriteMode::Replace, false).unwrap();

        assert_eq!(read_optional(&path).unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn create_new_refuses_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key");

        write_atomic(&path, b"one", WriteMode::CreateNew, true).unwrap();
        let err = write_atomic(&path, b"two", WriteMode::CreateNew, true).unwrap_err();

        match err {
            LicenseError::StorageError(e) => assert_eq!(e.kind(), ErrorKind::AlreadyExists),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(read_optional(&path).unwrap().as_deref(), Some("one"));
    }

    #[cfg(unix)]
    #[test]
    fn owner_only_sets_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key");
        write_atomic(&path, b"secret", WriteMode::CreateNew, true).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
