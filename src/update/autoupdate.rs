//! Background autoupdate orchestration.
//!
//! Every invocation asks the autoupdater whether a check is due; if so it
//! touches the attempt marker and spawns a detached `update --autoupdate`
//! child whose stdio goes to the autoupdate log.
//!
//! # Spawn Protocol
//!
//! 1. Surface the "update available" warning (best-effort, always)
//! 2. Return early when updates are disabled, the marker is fresh, or a
//!    writer already holds the update lock
//! 3. Touch the attempt marker **before** spawning, so a racing sibling
//!    invocation sees a fresh mtime and skips
//! 4. Resolve the binary to spawn via the updater's bin-path resolution
//! 5. Append a timestamped preamble to `autoupdate.log` and redirect the
//!    child's stdio into it
//! 6. Spawn `<binPath> update --autoupdate` detached, with
//!    `<BIN>_TIMESTAMPS=1` and `<BIN>_SKIP_ANALYTICS=1` in its
//!    environment
//!
//! # Storm Control
//!
//! Two mechanisms keep concurrent shells from piling up:
//!
//! - **touch-before-spawn** (step 3) collapses the common race between
//!   terminals started in the same instant;
//! - **debounce in the child**: the spawned updater waits until the
//!   previous attempt is a full window old before doing any work, so the
//!   background update rate is bounded no matter how many shells spawn.
//!
//! # Error Policy
//!
//! Everything on this path is best-effort. The user's primary command must
//! not fail because a background check did, so errors become warnings.
//!
//! # Platform Considerations
//!
//! - **POSIX**: the child enters a new process group (`setsid`-style)
//!   and is never waited on, so it survives the parent's exit
//! - **Windows**: the child is launched through `%COMSPEC% /c` with the
//!   same stdio redirection

use std::fs::OpenOptions;
use std::io::Write;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::Updater;
use crate::config::Config;
use crate::paths::Paths;
use crate::utils::fs as fsutil;
use crate::{lock, AUTOUPDATE_CHECK_INTERVAL, AUTOUPDATE_DEBOUNCE_WINDOW, DEBOUNCE_POLL_INTERVAL};

/// Is a check due, given the attempt marker's mtime? A missing marker
/// means a check has never been attempted.
pub(crate) fn needed_at(modified: Option<SystemTime>, now: SystemTime) -> bool {
    match modified {
        None => true,
        Some(modified) => now
            .duration_since(modified)
            .map(|age| age > AUTOUPDATE_CHECK_INTERVAL)
            .unwrap_or(false),
    }
}

/// Time remaining in the debounce window, or `None` once it has passed.
pub(crate) fn debounce_remaining(
    modified: Option<SystemTime>,
    now: SystemTime,
) -> Option<Duration> {
    let deadline = modified? + AUTOUPDATE_DEBOUNCE_WINDOW;
    deadline.duration_since(now).ok().filter(|d| !d.is_zero())
}

/// Decides when to check for updates and spawns the detached updater.
///
/// # Examples
///
/// ```rust,no_run
/// use spoke::config::Config;
/// use spoke::paths::Paths;
/// use spoke::update::autoupdate::Autoupdater;
/// use spoke::update::Updater;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let paths = Paths::new(&config);
/// let updater = Updater::new(&config, &paths);
///
/// // Fire-and-forget: warns, decides, maybe spawns. Never fails.
/// Autoupdater::new(&config, &paths).run(&updater, false).await;
/// # Ok(())
/// # }
/// ```
pub struct Autoupdater {
    config: Config,
    paths: Paths,
    poll_interval: Duration,
}

impl Autoupdater {
    pub fn new(config: &Config, paths: &Paths) -> Self {
        Self {
            config: config.clone(),
            paths: paths.clone(),
            poll_interval: DEBOUNCE_POLL_INTERVAL,
        }
    }

    #[cfg(test)]
    fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn marker_mtime(&self) -> Option<SystemTime> {
        match std::fs::metadata(&self.paths.autoupdate_file).and_then(|m| m.modified()) {
            Ok(modified) => Some(modified),
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!("could not stat autoupdate marker: {err}");
                }
                None
            }
        }
    }

    /// True when the last attempt is old enough (or absent) for a new one.
    pub fn needed(&self) -> bool {
        needed_at(self.marker_mtime(), SystemTime::now())
    }

    /// The per-invocation autoupdate hook.
    ///
    /// Always surfaces the "update available" warning first, then decides
    /// whether to spawn. With `force` the marker-age check is skipped and
    /// only the disabled flag and the in-progress probe can stop the
    /// spawn. All failures are demoted to warnings: the user's primary
    /// command must not fail because a background check did.
    pub async fn run(&self, updater: &Updater, force: bool) {
        updater.warn_if_update_available().await;

        if !self.config.updates_enabled() {
            return;
        }
        if !force && !self.needed() {
            return;
        }
        if let Ok(true) = lock::has_writer(&self.paths.update_lock_file) {
            debug!("update already in progress, skipping autoupdate spawn");
            return;
        }
        if let Err(err) = self.spawn(updater) {
            warn!("could not spawn autoupdater: {err:#}");
        }
    }

    /// Touch the attempt marker, then spawn `<binPath> update --autoupdate`
    /// detached with stdio redirected to the autoupdate log.
    fn spawn(&self, updater: &Updater) -> Result<()> {
        // Touch before spawning so racing siblings see a fresh mtime.
        fsutil::touch(&self.paths.autoupdate_file)?;

        let bin = updater.bin_path();
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.paths.autoupdate_log_file)
            .with_context(|| {
                format!(
                    "failed to open {}",
                    self.paths.autoupdate_log_file.display()
                )
            })?;
        writeln!(
            log,
            "# {} spawning {} update --autoupdate",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%z"),
            bin.display()
        )?;

        let prefix = self.config.env_prefix();
        let mut command = self.platform_command(&bin);
        command
            .env(format!("{prefix}_TIMESTAMPS"), "1")
            .env(format!("{prefix}_SKIP_ANALYTICS"), "1")
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::from(log.try_clone()?))
            .stderr(std::process::Stdio::from(log));

        // The child is not waited on: it outlives this invocation.
        command
            .spawn()
            .with_context(|| format!("failed to spawn {}", bin.display()))?;
        debug!("spawned detached autoupdater via {}", bin.display());
        Ok(())
    }

    #[cfg(unix)]
    fn platform_command(&self, bin: &std::path::Path) -> std::process::Command {
        use std::os::unix::process::CommandExt;
        let mut command = std::process::Command::new(bin);
        command.args(["update", "--autoupdate"]);
        // New process group so the child survives the parent's exit.
        command.process_group(0);
        command
    }

    #[cfg(windows)]
    fn platform_command(&self, bin: &std::path::Path) -> std::process::Command {
        let comspec = std::env::var_os("COMSPEC").unwrap_or_else(|| "cmd.exe".into());
        let mut command = std::process::Command::new(comspec);
        command.arg("/c").arg(bin).args(["update", "--autoupdate"]);
        command
    }

    /// Wait out the debounce window inside `update --autoupdate`.
    ///
    /// Polls the marker once per interval until the previous attempt is a
    /// full window old, sleeping the smaller of the poll interval and the
    /// remaining time so the loop exits promptly once the window passes.
    /// There is no hard cap: the detached child simply waits, and a
    /// sibling refreshing the marker extends the wait.
    pub async fn debounce(&self) {
        loop {
            match debounce_remaining(self.marker_mtime(), SystemTime::now()) {
                None => return,
                Some(remaining) => {
                    debug!(
                        "debouncing autoupdate, {}s remaining",
                        remaining.as_secs()
                    );
                    tokio::time::sleep(self.poll_interval.min(remaining)).await;
                }
            }
        }
    }
}
