//! User plugin lifecycle operations.
//!
//! Install, update, remove, and link mutate shared state under the plugins
//! writer lock (with own-PID re-entry, since a command may already hold
//! it). Dependency materialization is delegated to an external package
//! manager behind [`PackageManager`]; the production implementation shells
//! out to yarn, tests substitute a recording fake.
//!
//! # Plugins Directory Layout
//!
//! ```text
//! <dataDir>/plugins/
//!   package.json        ({"private": true} plus the dependency map)
//!   .yarnrc             (registry pin, written once)
//!   plugins.json        (the manifest cache)
//!   node_modules/<plugin>/
//!     package.json      (the plugin's own metadata, incl. commands)
//!     bin/run           (default entrypoint)
//! ```
//!
//! # Install Flow
//!
//! 1. Acquire the plugins writer lock (own-PID re-entry allowed)
//! 2. Scaffold `package.json` and the registry-pinned `.yarnrc` if absent
//! 3. Add the dependency entry, keeping the original bytes for rollback
//! 4. Run the package manager's install
//! 5. Probe the installed module for a non-empty command set
//! 6. On any failure in 4-5: restore the original `package.json` and
//!    surface [`SpokeError::InvalidPlugin`]; on success: invalidate the
//!    plugin's manifest cache entry so the next init re-derives it
//!
//! The probe-then-revert shape means a broken install leaves no trace:
//! no dependency entry, no cached metadata, no catalog entry.
//!
//! # Examples
//!
//! ```rust,no_run
//! use spoke::config::Config;
//! use spoke::paths::Paths;
//! use spoke::plugins::user::{UserPlugins, Yarn};
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let paths = Paths::new(&config);
//! let yarn = Yarn;
//! let plugins = UserPlugins::new(&paths, &yarn);
//!
//! plugins.install("my-plugin", "latest")?;
//! plugins.update()?;
//! plugins.remove("my-plugin")?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::manifest::ManifestCache;
use super::provider::probe_plugin;
use crate::core::SpokeError;
use crate::lock;
use crate::paths::Paths;

/// Registry pinned into `.yarnrc` so installs do not follow a user-level
/// registry override.
const PLUGIN_REGISTRY: &str = "https://registry.yarnpkg.com";

/// The operations the core needs from the external package manager.
pub trait PackageManager {
    /// Materialize the dependencies declared in `dir/package.json`.
    fn install(&self, dir: &Path) -> Result<()>;
    /// Upgrade all dependencies in `dir` within their declared ranges.
    fn upgrade(&self, dir: &Path) -> Result<()>;
    /// Remove `name` from `dir`'s dependencies and node_modules.
    fn remove(&self, dir: &Path, name: &str) -> Result<()>;
}

/// Production package manager: shells out to `yarn`.
///
/// All invocations run with `--non-interactive` in the plugins directory,
/// so the registry pin in `.yarnrc` governs where packages come from. A
/// missing yarn binary surfaces as an ordinary error on first use.
pub struct Yarn;

impl Yarn {
    fn run(&self, dir: &Path, args: &[&str]) -> Result<()> {
        debug!("running yarn {args:?} in {}", dir.display());
        let output = std::process::Command::new("yarn")
            .args(args)
            .arg("--non-interactive")
            .current_dir(dir)
            .output()
            .context("failed to run yarn; is it installed?")?;
        if !output.status.success() {
            anyhow::bail!(
                "yarn {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

impl PackageManager for Yarn {
    fn install(&self, dir: &Path) -> Result<()> {
        self.run(dir, &["install"])
    }
    fn upgrade(&self, dir: &Path) -> Result<()> {
        self.run(dir, &["upgrade"])
    }
    fn remove(&self, dir: &Path, name: &str) -> Result<()> {
        self.run(dir, &["remove", name])
    }
}

/// User plugin operations over the plugins directory.
pub struct UserPlugins<'a> {
    paths: &'a Paths,
    package_manager: &'a dyn PackageManager,
}

impl<'a> UserPlugins<'a> {
    pub fn new(paths: &'a Paths, package_manager: &'a dyn PackageManager) -> Self {
        Self {
            paths,
            package_manager,
        }
    }

    fn package_json(&self) -> PathBuf {
        self.paths.user_plugins_dir.join("package.json")
    }

    /// Make sure the plugins directory is a valid package root: a private
    /// `package.json` and a registry-pinned `.yarnrc`.
    fn ensure_scaffold(&self) -> Result<()> {
        let dir = &self.paths.user_plugins_dir;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let package_json = self.package_json();
        if !package_json.exists() {
            std::fs::write(&package_json, "{\n  \"private\": true\n}\n")
                .with_context(|| format!("failed to write {}", package_json.display()))?;
        }
        let yarnrc = dir.join(".yarnrc");
        if !yarnrc.exists() {
            std::fs::write(&yarnrc, format!("registry \"{PLUGIN_REGISTRY}\"\n"))
                .with_context(|| format!("failed to write {}", yarnrc.display()))?;
        }
        Ok(())
    }

    fn read_package_json(&self) -> Result<serde_json::Value> {
        let path = self.package_json();
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("invalid JSON in {}", path.display()))
    }

    fn write_package_json(&self, value: &serde_json::Value) -> Result<()> {
        let path = self.package_json();
        std::fs::write(&path, serde_json::to_string_pretty(value)?)
            .with_context(|| format!("failed to write {}", path.display()))
    }

    /// Install `name` at `tag` (a dist-tag or version; defaults to
    /// "latest").
    ///
    /// The dependency map is edited first, then the package manager runs,
    /// then the installed module is probed for a command set. On any
    /// failure the package.json edit is reverted and the original error
    /// surfaces, so a broken install leaves no trace.
    ///
    /// # Errors
    ///
    /// - lock or filesystem failures around the plugins directory
    /// - the package manager's own failure (network, registry, missing
    ///   binary)
    /// - [`SpokeError::InvalidPlugin`] when the installed module does not
    ///   expose a usable command set
    pub fn install(&self, name: &str, tag: &str) -> Result<()> {
        let _guard = lock::writer(&self.paths.plugin_lock_file)?;
        self.ensure_scaffold()?;

        let original = std::fs::read_to_string(self.package_json())?;
        let mut package = self.read_package_json()?;
        let deps = package
            .as_object_mut()
            .context("package.json is not an object")?
            .entry("dependencies")
            .or_insert_with(|| serde_json::json!({}));
        deps.as_object_mut()
            .context("dependencies is not an object")?
            .insert(name.to_string(), serde_json::json!(tag));
        self.write_package_json(&package)?;

        let result = self
            .package_manager
            .install(&self.paths.user_plugins_dir)
            .and_then(|()| {
                // Probe: the installed module must expose commands.
                probe_plugin(
                    &self
                        .paths
                        .user_plugins_dir
                        .join("node_modules")
                        .join(name),
                )
                .map_err(|err| {
                    if err.downcast_ref::<SpokeError>().is_some() {
                        err
                    } else {
                        anyhow::Error::from(SpokeError::InvalidPlugin {
                            name: name.to_string(),
                        })
                        .context(err)
                    }
                })
                .map(|_| ())
            });

        if let Err(err) = result {
            // Roll the dependency edit back before surfacing the error.
            if let Err(revert_err) = std::fs::write(self.package_json(), original) {
                warn!("could not revert package.json: {revert_err}");
            }
            return Err(err);
        }

        self.invalidate(name);
        Ok(())
    }

    /// Upgrade all user plugins within their declared ranges.
    pub fn update(&self) -> Result<()> {
        let _guard = lock::writer(&self.paths.plugin_lock_file)?;
        if !self.package_json().exists() {
            debug!("no user plugins installed, nothing to update");
            return Ok(());
        }
        self.package_manager
            .upgrade(&self.paths.user_plugins_dir)?;
        let mut cache = ManifestCache::load(&self.paths.user_plugins_manifest);
        cache.invalidate_all();
        cache.save_if_dirty()?;
        Ok(())
    }

    /// Uninstall `name`.
    pub fn remove(&self, name: &str) -> Result<()> {
        let _guard = lock::writer(&self.paths.plugin_lock_file)?;
        self.package_manager
            .remove(&self.paths.user_plugins_dir, name)?;
        self.invalidate(name);
        Ok(())
    }

    /// Record a local directory as a linked plugin. No dependencies are
    /// installed; the directory is probed to fail fast on non-plugins.
    pub fn link(&self, path: &Path) -> Result<()> {
        let _guard = lock::writer(&self.paths.plugin_lock_file)?;
        let root = path
            .canonicalize()
            .with_context(|| format!("no such directory: {}", path.display()))?;
        probe_plugin(&root)?;

        let mut cache = ManifestCache::load(&self.paths.user_plugins_manifest);
        cache.add_linked(root);
        cache.save_if_dirty()?;
        Ok(())
    }

    /// Remove a linked plugin entry; returns false when `path` was not
    /// linked.
    pub fn unlink(&self, path: &Path) -> Result<bool> {
        let _guard = lock::writer(&self.paths.plugin_lock_file)?;
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let mut cache = ManifestCache::load(&self.paths.user_plugins_manifest);
        let removed = cache.remove_linked(&root);
        cache.save_if_dirty()?;
        Ok(removed)
    }

    fn invalidate(&self, name: &str) {
        let mut cache = ManifestCache::load(&self.paths.user_plugins_manifest);
        cache.invalidate(name);
        if let Err(err) = cache.save_if_dirty() {
            warn!("could not persist plugin manifest cache: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// Records calls; optionally materializes a plugin on install.
    struct FakePackageManager {
        calls: RefCell<Vec<String>>,
        /// (name, version) written into node_modules on install, if any.
        materialize: Option<(String, String)>,
    }

    impl FakePackageManager {
        fn recording() -> Self {
            Self {
                calls: RefCell::new(vec![]),
                materialize: None,
            }
        }
        fn materializing(name: &str, version: &str) -> Self {
            Self {
                calls: RefCell::new(vec![]),
                materialize: Some((name.to_string(), version.to_string())),
            }
        }
    }

    impl PackageManager for FakePackageManager {
        fn install(&self, dir: &Path) -> Result<()> {
            self.calls.borrow_mut().push("install".into());
            if let Some((name, version)) = &self.materialize {
                crate::plugins::provider::write_plugin(
                    &dir.join("node_modules").join(name),
                    name,
                    version,
                );
            }
            Ok(())
        }
        fn upgrade(&self, _dir: &Path) -> Result<()> {
            self.calls.borrow_mut().push("upgrade".into());
            Ok(())
        }
        fn remove(&self, _dir: &Path, name: &str) -> Result<()> {
            self.calls.borrow_mut().push(format!("remove {name}"));
            Ok(())
        }
    }

    fn test_config(root: &Path) -> Config {
        Config {
            bin: "spoke".into(),
            name: "spoke".into(),
            version: semver::Version::parse("1.2.3").unwrap(),
            channel: "stable".into(),
            platform: "linux".into(),
            arch: "x86_64".into(),
            windows: false,
            data_dir: root.join("data"),
            cache_dir: root.join("cache"),
            update_disabled: None,
            host: "https://releases.example.test".into(),
            default_command: None,
            aliases: HashMap::new(),
        }
    }

    #[test]
    fn install_scaffolds_edits_dependencies_and_invokes_pm() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        let paths = Paths::new(&config);
        let pm = FakePackageManager::materializing("my-plugin", "1.0.0");
        let plugins = UserPlugins::new(&paths, &pm);

        plugins.install("my-plugin", "1.0.0").unwrap();

        assert_eq!(*pm.calls.borrow(), ["install"]);
        let package: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(paths.user_plugins_dir.join("package.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(package["private"], true);
        assert_eq!(package["dependencies"]["my-plugin"], "1.0.0");

        let yarnrc =
            std::fs::read_to_string(paths.user_plugins_dir.join(".yarnrc")).unwrap();
        assert!(yarnrc.contains(PLUGIN_REGISTRY));
    }

    #[test]
    fn failed_probe_reverts_package_json_and_reports_invalid_plugin() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        let paths = Paths::new(&config);
        // Install "succeeds" but materializes nothing, so the probe fails.
        let pm = FakePackageManager::recording();
        let plugins = UserPlugins::new(&paths, &pm);

        let err = plugins.install("ghost", "latest").unwrap_err();
        assert!(
            err.chain().any(|cause| cause
                .downcast_ref::<SpokeError>()
                .is_some_and(|e| matches!(e, SpokeError::InvalidPlugin { .. }))),
            "got: {err:#}"
        );

        let package: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(paths.user_plugins_dir.join("package.json")).unwrap(),
        )
        .unwrap();
        assert!(
            package.get("dependencies").is_none(),
            "dependency edit must be reverted"
        );
    }

    #[test]
    fn update_and_remove_delegate_to_the_package_manager() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        let paths = Paths::new(&config);
        let pm = FakePackageManager::materializing("my-plugin", "1.0.0");
        let plugins = UserPlugins::new(&paths, &pm);

        plugins.install("my-plugin", "latest").unwrap();
        plugins.update().unwrap();
        plugins.remove("my-plugin").unwrap();

        assert_eq!(
            *pm.calls.borrow(),
            ["install", "upgrade", "remove my-plugin"]
        );
    }

    #[test]
    fn link_records_a_probed_directory() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        let paths = Paths::new(&config);
        let pm = FakePackageManager::recording();
        let plugins = UserPlugins::new(&paths, &pm);

        let checkout = dir.path().join("local-plugin");
        crate::plugins::provider::write_plugin(&checkout, "local-plugin", "0.1.0");

        plugins.link(&checkout).unwrap();
        let cache = ManifestCache::load(&paths.user_plugins_manifest);
        assert_eq!(cache.linked().len(), 1);

        assert!(plugins.unlink(&checkout).unwrap());
        let cache = ManifestCache::load(&paths.user_plugins_manifest);
        assert!(cache.linked().is_empty());

        // Linking a non-plugin directory fails the probe.
        let not_a_plugin = dir.path().join("empty");
        std::fs::create_dir_all(&not_a_plugin).unwrap();
        assert!(plugins.link(&not_a_plugin).is_err());
    }
}
