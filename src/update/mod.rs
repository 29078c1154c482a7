//! Self-update orchestration.
//!
//! The updater owns the full release swap: version decision, streamed
//! download with integrity verification, atomic rename into the client
//! tree, bin re-link, and retention.
//!
//! # Update Process Flow
//!
//! ```text
//! 1. Version Check
//!    ├── Fetch the channel manifest for this platform
//!    ├── No-op when already on the manifest's version and channel
//!    └── Sample the rollout priority (autoupdate path only)
//!
//! 2. Swap (writer lock held throughout)
//!    ├── Remove stale staging and colliding version directories
//!    ├── Stream-download, verify SHA-256, extract to clientRoot/<base>
//!    ├── Rename clientRoot/<base> -> clientRoot/<version>
//!    └── Repoint the stable client bin link
//!
//! 3. Post-Update (lock released)
//!    ├── Tidy: drop release trees older than the retention window
//!    ├── Chop the error log to its bounded length
//!    └── Clear stale tmp entries under the cache and data roots
//! ```
//!
//! # Concurrency
//!
//! The whole of step 2 runs under the writer lock on `update.lock`, so
//! concurrent invocations either wait (other writers) or keep executing
//! out of the previous tree (readers) and never observe a torn release.
//! Between a swap and the next tidy pass at most two release trees
//! coexist on disk; the old one remains valid for readers that started
//! before the swap.
//!
//! # Examples
//!
//! ```rust,no_run
//! use spoke::config::Config;
//! use spoke::paths::Paths;
//! use spoke::update::Updater;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let paths = Paths::new(&config);
//! let updater = Updater::new(&config, &paths);
//!
//! // Manual update against the configured channel.
//! updater.run(None, false).await?;
//!
//! // Explicit channel switch.
//! updater.run(Some("beta"), false).await?;
//! # Ok(())
//! # }
//! ```

pub mod autoupdate;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

use anyhow::{Context, Result};
use colored::Colorize;
use futures::StreamExt;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::channel::{minor_version_greater, ChannelClient, Manifest};
use crate::config::Config;
use crate::core::SpokeError;
use crate::paths::Paths;
use crate::utils::fs as fsutil;
use crate::utils::progress;
use crate::{lock, ERRLOG_MAX_LINES, RELEASE_RETENTION};

static BIN_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Decide whether a fetched manifest should be installed.
///
/// `draw` is the priority sample for this cycle: the autoupdate path
/// passes a uniform value in `[0, 100)`, the manual path passes `None`.
/// When the manifest carries a rollout `priority` and the draw falls below
/// it, this cycle is held back; manual updates always proceed.
///
/// Taking the sample as a parameter instead of drawing internally keeps
/// the decision reproducible: callers inject randomness, tests inject
/// literals.
///
/// # Examples
///
/// ```
/// use spoke::channel::Manifest;
/// use spoke::update::should_update;
///
/// let manifest = Manifest {
///     version: semver::Version::parse("1.3.0").unwrap(),
///     channel: "stable".into(),
///     sha256gz: String::new(),
///     priority: Some(80),
///     builds: Default::default(),
/// };
///
/// assert!(!should_update(&manifest, Some(50.0))); // held back this cycle
/// assert!(should_update(&manifest, Some(85.0))); // draw cleared the bar
/// assert!(should_update(&manifest, None)); // manual updates always proceed
/// ```
pub fn should_update(manifest: &Manifest, draw: Option<f64>) -> bool {
    match (manifest.priority, draw) {
        (Some(priority), Some(r)) => r >= f64::from(priority),
        _ => true,
    }
}

/// Orchestrates version checks, downloads, and the atomic swap.
///
/// # Features
///
/// - **Channel awareness**: updates against the configured channel or an
///   explicit one, with channel switches handled like version changes
/// - **Gradual rollout**: honors the manifest's `priority` on the
///   autoupdate path so a release can be ramped across the fleet
/// - **Integrity**: every archive is verified against `sha256gz` before
///   the rename makes it visible
/// - **Retention**: superseded trees survive for the retention window so
///   in-flight invocations keep a valid tree under their feet
///
/// # Safety
///
/// The swap is crash-safe by construction: extraction targets a staging
/// directory, verification happens before the rename, and the rename is
/// the only step that changes what `clientBin` can resolve to. A crash
/// at any point leaves either the old tree or both trees, never a torn
/// one.
pub struct Updater {
    config: Config,
    paths: Paths,
    client: ChannelClient,
}

impl Updater {
    pub fn new(config: &Config, paths: &Paths) -> Self {
        Self {
            client: ChannelClient::new(config, paths),
            config: config.clone(),
            paths: paths.clone(),
        }
    }

    /// Run a full update against `channel` (the configured channel when
    /// `None`).
    ///
    /// On the autoupdate path the rollout priority is sampled; manual
    /// updates ignore it. After a successful swap the error log is chopped
    /// and stale tmp entries are cleared.
    ///
    /// # Returns
    ///
    /// `Ok(())` both for a completed swap and for the no-op case (already
    /// on the manifest's version and channel, updates disabled, or held
    /// back by rollout priority); the distinction is reported to the user
    /// directly.
    ///
    /// # Errors
    ///
    /// - [`SpokeError::InvalidChannel`] when the remote rejects the
    ///   channel (HTTP 403)
    /// - [`SpokeError::NetworkError`] for other HTTP failures, transport
    ///   errors after the single manifest retry
    /// - [`SpokeError::ChecksumMismatch`] when the archive fails
    ///   verification (the staging tree is already gone)
    /// - [`SpokeError::FileSystemError`] for rename or link failures
    pub async fn run(&self, channel: Option<&str>, autoupdate: bool) -> Result<()> {
        if let Some(reason) = &self.config.update_disabled {
            info!("updates are disabled: {reason}");
            return Ok(());
        }
        let channel = channel.unwrap_or(&self.config.channel);
        let manifest = self.client.fetch_manifest(channel).await?;

        if manifest.version == self.config.version && channel == self.config.channel {
            println!("already on latest version: {}", self.config.version);
            return Ok(());
        }

        let draw = if autoupdate {
            Some(rand::rng().random_range(0.0..100.0))
        } else {
            None
        };
        if !should_update(&manifest, draw) {
            info!(
                "update to {} held back this cycle (priority {})",
                manifest.version,
                manifest.priority.unwrap_or_default()
            );
            return Ok(());
        }

        self.download_and_swap(channel, &manifest).await?;
        println!(
            "{}",
            format!("updated to {}", manifest.version).green()
        );

        self.tidy(&manifest.version);
        if let Err(err) = fsutil::chop_log(&self.paths.error_log_file, ERRLOG_MAX_LINES) {
            warn!("could not chop error log: {err:#}");
        }
        fsutil::clean_tmp(&self.config.data_dir);
        fsutil::clean_tmp(&self.config.cache_dir);
        Ok(())
    }

    /// Download, verify, extract, and swap in one writer-locked critical
    /// section. The returned guard from the writer acquire acts as the
    /// downgrade callback: invoking [`lock::LockGuard::release`] ends the
    /// exclusive section.
    async fn download_and_swap(&self, channel: &str, manifest: &Manifest) -> Result<()> {
        let guard = lock::writer(&self.paths.update_lock_file)?;

        let base = self.config.base(&manifest.version);
        let staging = self.paths.client_root.join(&base);
        let target = self.paths.client_root.join(manifest.version.to_string());

        std::fs::create_dir_all(&self.paths.client_root)
            .with_context(|| format!("failed to create {}", self.paths.client_root.display()))?;
        // A stale staging dir from an aborted run, or a colliding version
        // dir from a channel switch, would break the rename below.
        remove_if_exists(&staging)?;
        remove_if_exists(&target)?;

        let mut message = format!("{}: Updating to {}...", self.config.name, manifest.version);
        if manifest.channel != "stable" {
            message = format!("{message} ({})", manifest.channel);
        }
        eprintln!("{message}");

        let (response, length) = self.client.stream_build(channel, &base).await?;
        let bar = progress::download_bar(message, length);
        let bar_tick = bar.clone();
        let stream = Box::pin(response.bytes_stream().map(move |chunk| {
            if let Ok(chunk) = &chunk {
                bar_tick.inc(chunk.len() as u64);
            }
            chunk
        }));

        crate::extract::extract_tar_gz(
            stream,
            &self.paths.client_root,
            &manifest.sha256gz,
            &staging,
        )
        .await?;
        bar.finish_and_clear();

        std::fs::rename(&staging, &target).map_err(|source| SpokeError::FileSystemError {
            path: staging.clone(),
            source,
        })?;

        let bin = self.paths.versioned_bin(&manifest.version);
        fsutil::make_executable(&bin)?;
        fsutil::link_client_bin(&self.paths.client_bin, &bin, self.config.windows)?;
        debug!("updated client tree at {}", target.display());

        guard.release();
        Ok(())
    }

    /// Retention pass over the client root.
    ///
    /// Walks the direct entries of `clientRoot` and decides per entry:
    ///
    /// 1. The `bin`/`client` link entries and the directory matching
    ///    `current` are always retained
    /// 2. Every other entry is aged by its newest contained mtime (a
    ///    freshly-touched file anywhere in a tree keeps the whole tree)
    /// 3. Entries older than the retention window are removed recursively
    ///
    /// Errors are logged, never fatal: tidy runs after the user's update
    /// already succeeded, and a leftover tree costs only disk space until
    /// the next pass.
    pub fn tidy(&self, current: &semver::Version) {
        let entries = match std::fs::read_dir(&self.paths.client_root) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        let current = current.to_string();
        let now = SystemTime::now();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == "bin" || name == "client" || name == current {
                continue;
            }
            let path = entry.path();
            match fsutil::newest_mtime(&path) {
                Ok(mtime) => {
                    let age = now.duration_since(mtime).unwrap_or_default();
                    if age > RELEASE_RETENTION {
                        info!("tidying old release {}", path.display());
                        fsutil::remove_logged(&path);
                    }
                }
                Err(err) => warn!("tidy could not inspect {}: {err:#}", path.display()),
            }
        }
    }

    /// Emit a warning when the channel advertises a newer minor version,
    /// plus any verbatim channel message.
    ///
    /// The comparison is deliberately narrow - equal major, strictly
    /// greater minor - so the passive nag only fires for updates the user
    /// can take without reading release notes; bigger jumps are announced
    /// through the channel `message`, which is emitted verbatim whenever
    /// present.
    ///
    /// Best-effort: the version fetch is cache-allowed, all errors are
    /// swallowed at debug level, and `CLI_ENGINE_HIDE_UPDATED_MESSAGE`
    /// silences the whole check.
    pub async fn warn_if_update_available(&self) {
        if std::env::var_os("CLI_ENGINE_HIDE_UPDATED_MESSAGE").is_some() {
            return;
        }
        match self.client.fetch_version(&self.config.channel, false).await {
            Ok(remote) => {
                if minor_version_greater(&self.config.version, &remote.version) {
                    eprintln!(
                        "{}",
                        format!(
                            "{}: update available from {} to {}",
                            self.config.name, self.config.version, remote.version
                        )
                        .yellow()
                    );
                }
                if let Some(message) = remote.message {
                    eprintln!("{message}");
                }
            }
            Err(err) => debug!("update availability check failed: {err:#}"),
        }
    }

    /// The binary future invocations (and the spawned autoupdater) should
    /// execute.
    ///
    /// Resolution order:
    ///
    /// 1. The stable client bin link, when updates are enabled and the
    ///    link exists (a self-updated installation)
    /// 2. The `CLI_BINPATH` environment variable, when set (an installer
    ///    that relocated the binary)
    /// 3. The configured bin name, resolved on PATH at spawn time
    ///
    /// The answer is cached for the life of the process: re-resolving
    /// mid-invocation could observe a swap and hand different callers
    /// different binaries.
    pub fn bin_path(&self) -> PathBuf {
        BIN_PATH
            .get_or_init(|| {
                if self.config.updates_enabled() && self.paths.client_bin.exists() {
                    return self.paths.client_bin.clone();
                }
                if let Some(path) = std::env::var_os("CLI_BINPATH") {
                    return PathBuf::from(path);
                }
                PathBuf::from(&self.config.bin)
            })
            .clone()
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {
            debug!("removed stale tree {}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(SpokeError::FileSystemError {
            path: path.to_path_buf(),
            source,
        }
        .into()),
    }
}
