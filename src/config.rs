//! Runtime configuration for the CLI.
//!
//! A [`Config`] value is built once at startup and threaded through the
//! constructors of every subsystem. There is deliberately no process-global
//! configuration: the only process-wide state in the crate is the lock
//! registry in [`crate::lock`], which must be global to implement own-PID
//! re-entry.
//!
//! # Sources
//!
//! Configuration is assembled from three layers, in order:
//!
//! 1. **Compile-time metadata**: the crate version, the binary name, and
//!    the platform/arch constants baked in by the build
//! 2. **Platform conventions**: per-user cache and data roots from the
//!    operating system's standard locations
//! 3. **Environment overrides**: see [`Config::from_env`] for the
//!    recognized variables
//!
//! # Environment Variables
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `SPOKE_CACHE_DIR` | relocate the disposable-state root |
//! | `SPOKE_DATA_DIR` | relocate the persistent-state root |
//! | `SPOKE_HOST` | override the release host |
//! | `SPOKE_CHANNEL` | override the built-in release channel |
//! | `SPOKE_SKIP_CORE_UPDATES` | disable self-update entirely |
//!
//! # Examples
//!
//! ```rust,no_run
//! use spoke::config::Config;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! println!("{}", config.user_agent()); // e.g. "spoke/0.5.2 (linux-x86_64)"
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use semver::Version;

/// Default release host queried for channel manifests and archives.
pub const DEFAULT_HOST: &str = "https://releases.spoke-cli.dev";

/// Static configuration for one CLI invocation.
///
/// Everything the core needs to know about itself: identity, platform,
/// filesystem roots, release host, and the alias table consumed by the
/// dispatcher. Constructed by [`Config::from_env`] in the binary and built
/// literally in tests.
#[derive(Debug, Clone)]
pub struct Config {
    /// Binary name as installed on PATH (e.g. "spoke").
    pub bin: String,
    /// Project name used in release URLs (usually equal to `bin`).
    pub name: String,
    /// Version of the running binary.
    pub version: Version,
    /// Release channel this binary was built from.
    pub channel: String,
    /// Operating system (`std::env::consts::OS`).
    pub platform: String,
    /// CPU architecture (`std::env::consts::ARCH`).
    pub arch: String,
    /// True on Windows; switches bin links to `.cmd` shims.
    pub windows: bool,
    /// Root for persistent state (release trees, plugins).
    pub data_dir: PathBuf,
    /// Root for disposable state (locks, markers, cached versions, logs).
    pub cache_dir: PathBuf,
    /// When set, self-update is disabled and the value explains why.
    pub update_disabled: Option<String>,
    /// Base URL for channel manifests, version files, and archives.
    pub host: String,
    /// Command run when argv names none (falls back to "help" when unset).
    pub default_command: Option<String>,
    /// Canonical command ID to its accepted aliases. Aliases never chain.
    pub aliases: HashMap<String, Vec<String>>,
}

impl Config {
    /// Build the configuration for the running binary.
    ///
    /// Identity comes from compile-time crate metadata, platform from
    /// `std::env::consts`, and the filesystem roots from the platform
    /// conventions reported by the `dirs` crate. Environment overrides:
    ///
    /// - `SPOKE_CACHE_DIR` / `SPOKE_DATA_DIR` relocate the state roots
    /// - `SPOKE_HOST` overrides the release host
    /// - `SPOKE_CHANNEL` overrides the built-in channel
    /// - `SPOKE_SKIP_CORE_UPDATES` disables self-update entirely
    pub fn from_env() -> Result<Self> {
        let name = "spoke".to_string();

        let cache_dir = match std::env::var_os("SPOKE_CACHE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::cache_dir()
                .context("could not determine a cache directory for this platform")?
                .join(&name),
        };
        let data_dir = match std::env::var_os("SPOKE_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .context("could not determine a data directory for this platform")?
                .join(&name),
        };

        let update_disabled = if std::env::var_os("SPOKE_SKIP_CORE_UPDATES").is_some() {
            Some("SPOKE_SKIP_CORE_UPDATES is set".to_string())
        } else {
            None
        };

        let mut aliases: HashMap<String, Vec<String>> = HashMap::new();
        aliases.insert(
            "plugins:uninstall".to_string(),
            vec!["unlink".to_string(), "plugins:unlink".to_string()],
        );

        Ok(Self {
            bin: name.clone(),
            version: Version::parse(env!("CARGO_PKG_VERSION"))
                .context("crate version is not valid semver")?,
            channel: std::env::var("SPOKE_CHANNEL").unwrap_or_else(|_| "stable".to_string()),
            platform: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            windows: cfg!(windows),
            data_dir,
            cache_dir,
            update_disabled,
            host: std::env::var("SPOKE_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            default_command: None,
            aliases,
            name,
        })
    }

    /// User-agent string sent on every HTTP request and printed by
    /// `spoke version`: `<name>/<version> (<platform>-<arch>)`.
    pub fn user_agent(&self) -> String {
        format!(
            "{}/{} ({}-{})",
            self.name, self.version, self.platform, self.arch
        )
    }

    /// Archive base name for a release of `version` on this platform:
    /// `<name>-v<version>-<platform>-<arch>`.
    pub fn base(&self, version: &Version) -> String {
        format!(
            "{}-v{}-{}-{}",
            self.name, version, self.platform, self.arch
        )
    }

    /// Environment variable prefix derived from the binary name:
    /// uppercased with `-` mapped to `_` (e.g. `spoke-cli` → `SPOKE_CLI`).
    pub fn env_prefix(&self) -> String {
        self.bin.to_uppercase().replace('-', "_")
    }

    /// True when self-update and the client tree should be used.
    pub fn updates_enabled(&self) -> bool {
        self.update_disabled.is_none()
    }
}
