//! Advisory, file-backed reader/writer locks.
//!
//! Cross-process coordination for the client tree and the plugin directory
//! uses OS advisory locks (via [`fs4`]) on dedicated lockfiles. Two modes
//! exist:
//!
//! - **Readers** share the lock and exclude writers. Any invocation that
//!   executes a command out of the client tree holds a reader for the
//!   duration, so an update cannot evict a tree that is still being read.
//! - **Writers** are exclusive. The updater holds one for the whole swap;
//!   plugin mutations hold one on the plugins lockfile.
//!
//! # Blocking Behavior
//!
//! Acquisition is blocking with no timeout:
//!
//! - **Fair queuing**: waiters are typically served in FIFO order by the
//!   operating system
//! - **No fail-fast**: contention is resolved by waiting, never by
//!   erroring; the only non-blocking operation is the [`has_writer`]
//!   probe used by the autoupdater to skip spawning while a swap runs
//! - **Interruptible**: a blocked acquire can be interrupted by process
//!   signals
//!
//! # Stale Lockfiles
//!
//! The lock lives in the kernel, tied to the open file handle, not in the
//! file's contents. A lockfile left behind by a crashed or killed process
//! therefore carries no lock at all and is reclaimable by any later
//! process without cleanup. The writer records its PID into the lockfile
//! body purely as a diagnostic aid.
//!
//! # Own-PID Re-entry
//!
//! A process-wide registry indexes live locks by path. Re-entering a path
//! this process already holds returns a no-op guard instead of
//! self-deadlocking (a spawned child may inherit lock metadata, and a
//! command holding the plugins writer may call back into a helper that
//! locks again). This registry is the one legitimate process-global in
//! the crate, since it must span every code path that can lock.
//!
//! # Platform Considerations
//!
//! - **Unix**: `flock(2)`-style whole-file locks via [`fs4`]
//! - **Windows**: `LockFileEx` via [`fs4`], same shared/exclusive model
//! - **Network filesystems**: behavior follows the mount's advisory-lock
//!   support; the lockfiles live under the per-user cache directory,
//!   which is local on all supported platforms
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let lockfile = Path::new("/home/user/.cache/spoke/update.lock");
//!
//! // Exclusive section: blocks until all readers and writers are gone.
//! let guard = spoke::lock::writer(lockfile)?;
//! // ... mutate the client tree ...
//! guard.release();
//!
//! // Shared section: many readers may hold this concurrently.
//! let _reader = spoke::lock::reader(lockfile)?;
//! // ... execute out of the client tree ...
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use once_cell::sync::Lazy;
use tracing::debug;

/// Lock mode recorded in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Reader,
    Writer,
}

static REGISTRY: Lazy<Mutex<HashMap<PathBuf, Mode>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// RAII guard for a held lock.
///
/// The lock is released when the guard is dropped. Where the flow reads
/// better with an explicit end to the critical section - the updater's
/// "downgrade" callback after the swap - call [`LockGuard::release`]
/// instead of letting the guard fall out of scope.
///
/// A guard returned for an own-PID re-entry holds no file handle; its
/// drop is a no-op so the outer guard's lock survives.
#[derive(Debug)]
pub struct LockGuard {
    file: Option<File>,
    path: PathBuf,
}

impl LockGuard {
    /// Release the lock now instead of at end of scope.
    pub fn release(self) {}

    fn reentrant(path: &Path) -> Self {
        Self {
            file: None,
            path: path.to_path_buf(),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(err) = FileExt::unlock(&file) {
                debug!("failed to unlock {}: {err}", self.path.display());
            }
            if let Ok(mut registry) = REGISTRY.lock() {
                registry.remove(&self.path);
            }
        }
    }
}

fn open_lockfile(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create lock directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("failed to open lockfile {}", path.display()))
}

fn already_held(path: &Path) -> bool {
    REGISTRY
        .lock()
        .map(|registry| registry.contains_key(path))
        .unwrap_or(false)
}

fn register(path: &Path, mode: Mode) {
    if let Ok(mut registry) = REGISTRY.lock() {
        registry.insert(path.to_path_buf(), mode);
    }
}

/// Acquire a shared (reader) lock on `path`.
///
/// Blocks while any writer holds the path; any number of readers may
/// hold it simultaneously. Re-entering a path this process already holds
/// returns a no-op guard.
///
/// # Errors
///
/// Fails only on filesystem problems (the lockfile's directory cannot be
/// created, the file cannot be opened, or the OS rejects the lock call).
/// Contention is not an error; it is waited out.
pub fn reader(path: &Path) -> Result<LockGuard> {
    if already_held(path) {
        debug!("re-entering lock {} (reader, own pid)", path.display());
        return Ok(LockGuard::reentrant(path));
    }
    let file = open_lockfile(path)?;
    FileExt::lock_shared(&file)
        .with_context(|| format!("failed to acquire reader lock on {}", path.display()))?;
    register(path, Mode::Reader);
    Ok(LockGuard {
        file: Some(file),
        path: path.to_path_buf(),
    })
}

/// Acquire an exclusive (writer) lock on `path`.
///
/// Blocks until no reader or writer holds the path. The owning PID is
/// recorded in the lockfile body for diagnostics. Re-entering a path
/// this process already holds returns a no-op guard.
///
/// # Lock File Management
///
/// The acquire performs, in order:
///
/// 1. **Directory creation**: the lockfile's parent is created if needed
/// 2. **File open**: the lockfile is created or opened without truncation
/// 3. **Exclusive locking**: blocking acquisition via the OS lock call
/// 4. **PID stamp**: the file body is rewritten with this process's PID
/// 5. **Registration**: the path is recorded for own-PID re-entry
///
/// # Errors
///
/// Fails only on filesystem problems; contention is waited out, never
/// reported as an error.
pub fn writer(path: &Path) -> Result<LockGuard> {
    if already_held(path) {
        debug!("re-entering lock {} (writer, own pid)", path.display());
        return Ok(LockGuard::reentrant(path));
    }
    let mut file = open_lockfile(path)?;
    FileExt::lock_exclusive(&file)
        .with_context(|| format!("failed to acquire writer lock on {}", path.display()))?;
    file.set_len(0).ok();
    write!(file, "{}", std::process::id()).ok();
    register(path, Mode::Writer);
    Ok(LockGuard {
        file: Some(file),
        path: path.to_path_buf(),
    })
}

/// Non-blocking probe: is a writer currently holding `path`?
///
/// Implemented as a shared try-lock; if the shared lock cannot be taken,
/// an exclusive holder exists. A missing lockfile means no writer. The
/// autoupdater uses this to skip spawning a background updater while a
/// swap is already in progress, without ever waiting on the lock.
///
/// Note the answer is inherently racy: a writer may appear or vanish
/// the instant after the probe returns. Callers use it as a hint, never
/// as a guarantee.
pub fn has_writer(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let file = open_lockfile(path)?;
    let acquired = FileExt::try_lock_shared(&file)
        .with_context(|| format!("failed to probe lock {}", path.display()))?;
    if acquired {
        FileExt::unlock(&file).ok();
        Ok(false)
    } else {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    #[test]
    fn writer_blocks_second_writer_until_released() {
        let dir = TempDir::new().unwrap();
        let path = Arc::new(dir.path().join("update.lock"));
        let barrier = Arc::new(Barrier::new(2));

        // Second writer must live in another process group for the registry
        // not to short-circuit it; simulate with a scoped registry bypass by
        // locking the raw file directly.
        let path1 = path.clone();
        let barrier1 = barrier.clone();
        let holder = thread::spawn(move || {
            let file = open_lockfile(&path1).unwrap();
            FileExt::lock_exclusive(&file).unwrap();
            barrier1.wait();
            thread::sleep(Duration::from_millis(100));
            FileExt::unlock(&file).unwrap();
        });

        barrier.wait();
        let start = Instant::now();
        let file = open_lockfile(&path).unwrap();
        FileExt::lock_exclusive(&file).unwrap();
        let elapsed = start.elapsed();
        FileExt::unlock(&file).unwrap();
        holder.join().unwrap();

        assert!(elapsed >= Duration::from_millis(50), "writer did not block");
    }

    #[test]
    fn has_writer_probe_is_nonblocking() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("update.lock");

        assert!(!has_writer(&path).unwrap(), "missing file means no writer");

        let file = open_lockfile(&path).unwrap();
        FileExt::lock_exclusive(&file).unwrap();
        let start = Instant::now();
        assert!(has_writer(&path).unwrap());
        assert!(start.elapsed() < Duration::from_millis(50));
        FileExt::unlock(&file).unwrap();

        assert!(!has_writer(&path).unwrap());
    }

    #[test]
    fn readers_share_but_exclude_writers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("update.lock");

        let r1 = open_lockfile(&path).unwrap();
        FileExt::lock_shared(&r1).unwrap();
        let r2 = open_lockfile(&path).unwrap();
        assert!(FileExt::try_lock_shared(&r2).unwrap(), "readers must share");

        let w = open_lockfile(&path).unwrap();
        assert!(
            !FileExt::try_lock_exclusive(&w).unwrap(),
            "writer must wait for readers"
        );

        FileExt::unlock(&r1).unwrap();
        FileExt::unlock(&r2).unwrap();
        assert!(FileExt::try_lock_exclusive(&w).unwrap());
        FileExt::unlock(&w).unwrap();
    }

    #[test]
    fn own_pid_reentry_returns_noop_guard() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plugins.lock");

        let outer = writer(&path).unwrap();
        // Without the registry skip this would self-deadlock.
        let inner = writer(&path).unwrap();
        assert!(inner.file.is_none());
        drop(inner);
        assert!(has_writer(&path).unwrap(), "outer lock must survive inner drop");
        outer.release();
        assert!(!has_writer(&path).unwrap());
    }
}
