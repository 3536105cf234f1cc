//! Owner-only filesystem setup for on-disk queue databases.
//!
//! Payloads are opaque to the queue and may carry secrets, so the database file, its
//! WAL/SHM sidecars and a parent directory we own are restricted to the current user
//! on Unix. Other platforms only get the directory and file created.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Create the parent directory and the database file with private permissions.
pub(crate) fn prepare_db_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        restrict_owned_dir(parent)?;
    }

    let mut options = OpenOptions::new();
    options.create(true).truncate(false).read(true).write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
        .open(path)
        .with_context(|| format!("Failed to create queue database: {}", path.display()))?;

    restrict_db_files(path)
}

#[cfg(unix)]
fn restrict_owned_dir(dir: &Path) -> Result<()> {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    let metadata = fs::metadata(dir)
        .with_context(|| format!("Failed to read directory metadata: {}", dir.display()))?;

    // Shared directories such as /tmp are left alone.
    let our_uid = unsafe { libc::getuid() };
    if metadata.uid() != our_uid {
        return Ok(());
    }

    if metadata.permissions().mode() & 0o077 != 0 {
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
            .with_context(|| format!("Failed to set directory permissions: {}", dir.display()))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn restrict_owned_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn restrict_db_files(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to set database permissions: {}", path.display()))?;
    for sidecar in sidecars(path) {
        if sidecar.exists() {
            let _ = fs::set_permissions(&sidecar, fs::Permissions::from_mode(0o600));
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn restrict_db_files(_path: &Path) -> Result<()> {
    Ok(())
}

/// `-wal` and `-shm` files SQLite keeps next to the database in WAL mode.
fn sidecars(path: &Path) -> [PathBuf; 2] {
    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    ["-wal", "-shm"].map(|suffix| path.with_file_name(format!("{name}{suffix}")))
}
