//! Filesystem locations derived from the configuration.
//!
//! [`Paths`] is a pure function of [`Config`]: no I/O happens here, and
//! every returned path is absolute as long as the configured roots are.
//! Centralizing the layout keeps the updater, the autoupdater, and the
//! plugin manager agreeing on where shared state lives.
//!
//! # Layout
//!
//! ```text
//! <cacheDir>/                      disposable state
//!   autoupdate                     mtime = last autoupdate attempt
//!   autoupdate.log                 detached updater stdio
//!   update.lock                    reader/writer lock for the client tree
//!   plugins.lock                   writer lock for plugin mutations
//!   error.log                      unexpected-error capture
//!   <channel>.version              cached version document per channel
//! <dataDir>/                       persistent state
//!   client/bin/<binName>[.cmd]     stable bin link
//!   client/<version>/bin/<binName> one release tree per version
//!   plugins/                       user plugin package root
//! ```
//!
//! # Windows Variants
//!
//! The stable bin link carries a `.cmd` suffix (it is a shim, not a
//! symlink) and the executable inside a release tree carries `.exe`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use spoke::config::Config;
//! use spoke::paths::Paths;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let paths = Paths::new(&config);
//! println!("lockfile: {}", paths.update_lock_file.display());
//! println!("beta cache: {}", paths.version_file("beta").display());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use crate::config::Config;

/// Precomputed paths for one CLI invocation.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Zero-byte marker; its mtime records the last autoupdate attempt.
    pub autoupdate_file: PathBuf,
    /// Append-only log receiving the detached updater's stdio.
    pub autoupdate_log_file: PathBuf,
    /// Reader/writer lock guarding the client tree.
    pub update_lock_file: PathBuf,
    /// Writer lock guarding user plugin mutations.
    pub plugin_lock_file: PathBuf,
    /// Append-only error log, chopped at update time.
    pub error_log_file: PathBuf,
    /// Root of the extracted release trees.
    pub client_root: PathBuf,
    /// Stable-path bin link into the current release tree.
    pub client_bin: PathBuf,
    /// Root of user-installed plugins (holds package.json, node_modules).
    pub user_plugins_dir: PathBuf,
    /// On-disk plugin manifest cache.
    pub user_plugins_manifest: PathBuf,

    bin_name: String,
    cache_dir: PathBuf,
    windows: bool,
}

impl Paths {
    /// Compute the full layout from the configuration.
    pub fn new(config: &Config) -> Self {
        let cache = &config.cache_dir;
        let data = &config.data_dir;
        let client_root = data.join("client");
        let bin_name = if config.windows {
            format!("{}.cmd", config.bin)
        } else {
            config.bin.clone()
        };
        Self {
            autoupdate_file: cache.join("autoupdate"),
            autoupdate_log_file: cache.join("autoupdate.log"),
            update_lock_file: cache.join("update.lock"),
            plugin_lock_file: cache.join("plugins.lock"),
            error_log_file: cache.join("error.log"),
            client_bin: client_root.join("bin").join(&bin_name),
            client_root,
            user_plugins_dir: data.join("plugins"),
            user_plugins_manifest: data.join("plugins").join("plugins.json"),
            bin_name,
            cache_dir: cache.clone(),
            windows: config.windows,
        }
    }

    /// Cached `Version` JSON for `channel`: `<cacheDir>/<channel>.version`.
    pub fn version_file(&self, channel: &str) -> PathBuf {
        self.cache_dir.join(format!("{channel}.version"))
    }

    /// Executable inside a specific release tree:
    /// `<clientRoot>/<version>/bin/<binName>[.exe]`.
    pub fn versioned_bin(&self, version: &semver::Version) -> PathBuf {
        let name = if self.windows {
            // The tree ships a real executable; only the stable link is a shim.
            format!("{}.exe", self.bin_name.trim_end_matches(".cmd"))
        } else {
            self.bin_name.clone()
        };
        self.client_root
            .join(version.to_string())
            .join("bin")
            .join(name)
    }

    /// Scratch directory under `base` cleaned of stale entries at update time.
    pub fn tmp_dir(base: &Path) -> PathBuf {
        base.join("tmp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;
    use std::collections::HashMap;

    fn config(windows: bool) -> Config {
        Config {
            bin: "spoke".into(),
            name: "spoke".into(),
            version: Version::parse("1.2.3").unwrap(),
            channel: "stable".into(),
            platform: "linux".into(),
            arch: "x86_64".into(),
            windows,
            data_dir: PathBuf::from("/home/u/.local/share/spoke"),
            cache_dir: PathBuf::from("/home/u/.cache/spoke"),
            update_disabled: None,
            host: "https://example.test".into(),
            default_command: None,
            aliases: HashMap::new(),
        }
    }

    #[test]
    fn layout_is_rooted_in_cache_and_data_dirs() {
        let paths = Paths::new(&config(false));
        assert_eq!(
            paths.autoupdate_file,
            PathBuf::from("/home/u/.cache/spoke/autoupdate")
        );
        assert_eq!(
            paths.update_lock_file,
            PathBuf::from("/home/u/.cache/spoke/update.lock")
        );
        assert_eq!(
            paths.client_bin,
            PathBuf::from("/home/u/.local/share/spoke/client/bin/spoke")
        );
        assert_eq!(
            paths.user_plugins_dir,
            PathBuf::from("/home/u/.local/share/spoke/plugins")
        );
        assert!(paths.version_file("beta").ends_with("beta.version"));
    }

    #[test]
    fn versioned_bin_points_into_release_tree() {
        let paths = Paths::new(&config(false));
        let bin = paths.versioned_bin(&Version::parse("1.3.0").unwrap());
        assert_eq!(
            bin,
            PathBuf::from("/home/u/.local/share/spoke/client/1.3.0/bin/spoke")
        );
    }

    #[test]
    fn windows_variant_uses_cmd_shim_and_exe() {
        let paths = Paths::new(&config(true));
        assert!(paths.client_bin.to_string_lossy().ends_with("spoke.cmd"));
        let bin = paths.versioned_bin(&Version::parse("1.3.0").unwrap());
        assert!(bin.to_string_lossy().ends_with("spoke.exe"));
    }
}
