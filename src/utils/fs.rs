//! Filesystem helpers for the update lifecycle.
//!
//! Small, single-purpose operations shared by the updater and the
//! autoupdater: marker touching, recursive newest-mtime aging, guarded
//! removal, log chopping, tmp cleanup, and the client bin link. They
//! split into two error disciplines:
//!
//! - [`touch`], [`newest_mtime`], [`chop_log`], [`link_client_bin`], and
//!   [`make_executable`] propagate errors to the caller;
//! - [`remove_logged`] and [`clean_tmp`] log and continue, because they
//!   run on cleanup paths where the user's operation already succeeded.

use std::path::Path;
use std::time::SystemTime;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::RELEASE_RETENTION;

/// Create or truncate `path`, updating its mtime. Used for the autoupdate
/// attempt marker.
pub fn touch(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, b"").with_context(|| format!("failed to touch {}", path.display()))
}

/// Newest modification time under `path`: the entry's own mtime for a
/// file, the maximum over all contained files for a directory.
pub fn newest_mtime(path: &Path) -> Result<SystemTime> {
    let meta = std::fs::symlink_metadata(path)
        .with_context(|| format!("failed to stat {}", path.display()))?;
    let mut newest = meta.modified()?;
    if meta.is_dir() {
        for entry in walkdir::WalkDir::new(path).into_iter().flatten() {
            if let Ok(meta) = entry.metadata() {
                if let Ok(mtime) = meta.modified() {
                    newest = newest.max(mtime);
                }
            }
        }
    }
    Ok(newest)
}

/// Remove a file or directory tree, logging instead of failing.
pub fn remove_logged(path: &Path) {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(_) => return,
    };
    let result = if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Ok(()) => debug!("removed {}", path.display()),
        Err(err) => warn!("could not remove {}: {err}", path.display()),
    }
}

/// Rewrite `path` keeping only its last `max_lines` lines. Missing files
/// are left alone.
pub fn chop_log(path: &Path, max_lines: usize) -> Result<()> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    let lines: Vec<&str> = raw.lines().collect();
    if lines.len() <= max_lines {
        return Ok(());
    }
    let mut kept = lines[lines.len() - max_lines..].join("\n");
    kept.push('\n');
    std::fs::write(path, kept).with_context(|| format!("failed to rewrite {}", path.display()))
}

/// Remove entries under `<base>/tmp` older than the release retention
/// window. Errors are logged, not fatal.
pub fn clean_tmp(base: &Path) {
    let dir = crate::paths::Paths::tmp_dir(base);
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    let now = SystemTime::now();
    for entry in entries.flatten() {
        let path = entry.path();
        match newest_mtime(&path) {
            Ok(mtime) => {
                let age = now.duration_since(mtime).unwrap_or_default();
                if age > RELEASE_RETENTION {
                    debug!("removing old tmp entry {}", path.display());
                    remove_logged(&path);
                }
            }
            Err(err) => warn!("could not inspect {}: {err:#}", path.display()),
        }
    }
}

/// Point the stable client bin path at `target`.
///
/// On Unix this is a symlink; on Windows a `.cmd` shim is written instead,
/// because symbolic links require privileges on legacy Windows.
pub fn link_client_bin(client_bin: &Path, target: &Path, windows: bool) -> Result<()> {
    if let Some(parent) = client_bin.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    match std::fs::symlink_metadata(client_bin) {
        Ok(_) => {
            std::fs::remove_file(client_bin)
                .with_context(|| format!("failed to replace {}", client_bin.display()))?;
        }
        Err(_) => {}
    }
    if windows {
        let shim = format!("@echo off\r\n\"{}\" %*\r\n", target.display());
        std::fs::write(client_bin, shim)
            .with_context(|| format!("failed to write shim {}", client_bin.display()))?;
    } else {
        #[cfg(unix)]
        std::os::unix::fs::symlink(target, client_bin).with_context(|| {
            format!(
                "failed to link {} -> {}",
                client_bin.display(),
                target.display()
            )
        })?;
    }
    Ok(())
}

/// Mark a file executable on Unix; a no-op elsewhere.
pub fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)
            .with_context(|| format!("failed to stat {}", path.display()))?
            .permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to chmod {}", path.display()))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
