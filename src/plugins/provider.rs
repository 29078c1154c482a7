//! Command providers.
//!
//! A provider contributes topics and commands to the merged catalog.
//! Three kinds exist and merge in fixed precedence order
//! (builtin < linked < user):
//!
//! | Provider | Source | Metadata freshness |
//! |----------|--------|--------------------|
//! | builtin | the CLI's own command set | compiled in |
//! | linked | local checkouts recorded by `plugins:link` | re-probed every init |
//! | user | plugins installed into the plugins directory | cached until the version changes |
//!
//! # Plugin Metadata
//!
//! A plugin declares itself in its `package.json` under a `spoke`
//! section: topic records, command records (ID, description, hidden,
//! aliases, usage), and an optional entrypoint (default `bin/run`). The
//! [`probe_plugin`] function is the single reader of that section; a
//! package without a non-empty command list is not a plugin.
//!
//! # Failure Policy
//!
//! User plugins are served from the persisted manifest cache whenever the
//! cached version matches the installed package metadata; otherwise their
//! metadata is re-derived by probing `package.json`. A plugin that fails
//! to probe is reported as a warning and omitted - one broken plugin must
//! not take the CLI down.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use super::manifest::{CachedPlugin, ManifestCache, PluginMeta};
use super::{CommandRecord, CommandRun, ProviderKind, TopicRecord};
use crate::core::SpokeError;
use crate::paths::Paths;

/// What one provider contributes to the merge.
#[derive(Debug, Default)]
pub struct ProviderCatalog {
    pub topics: Vec<TopicRecord>,
    pub commands: Vec<CommandRecord>,
}

/// A source of commands and topics.
pub trait Provider {
    fn kind(&self) -> ProviderKind;
    fn load(&self, cache: &mut ManifestCache) -> Result<ProviderCatalog>;
}

#[derive(Debug, Deserialize)]
struct PackageJson {
    name: String,
    version: String,
    #[serde(default)]
    spoke: Option<PluginSection>,
}

#[derive(Debug, Deserialize)]
struct PluginSection {
    #[serde(default)]
    topics: Vec<super::manifest::TopicMeta>,
    #[serde(default)]
    commands: Vec<super::manifest::CommandMeta>,
    #[serde(default)]
    entrypoint: Option<String>,
}

/// Read a plugin's metadata from its `package.json`.
///
/// A plugin without a non-empty command list is not a plugin; this is the
/// probe used both at init time and right after `plugins:install`.
///
/// # Errors
///
/// - a read or JSON parse error for `package.json`
/// - [`SpokeError::InvalidPlugin`] when the `spoke` section is missing
///   or declares no commands
pub fn probe_plugin(root: &Path) -> Result<PluginMeta> {
    let path = root.join("package.json");
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let package: PackageJson = serde_json::from_str(&raw)
        .with_context(|| format!("invalid JSON in {}", path.display()))?;

    let section = package.spoke.ok_or_else(|| SpokeError::InvalidPlugin {
        name: package.name.clone(),
    })?;
    if section.commands.is_empty() {
        return Err(SpokeError::InvalidPlugin { name: package.name }.into());
    }

    Ok(PluginMeta {
        name: package.name,
        version: package.version,
        topics: section.topics,
        commands: section.commands,
        entrypoint: section
            .entrypoint
            .unwrap_or_else(|| "bin/run".to_string()),
    })
}

fn catalog_from_meta(meta: &PluginMeta, root: &Path) -> ProviderCatalog {
    let mut catalog = ProviderCatalog::default();
    for topic in &meta.topics {
        catalog.topics.push(TopicRecord {
            name: topic.name.clone(),
            description: topic.description.clone(),
            hidden: topic.hidden,
            commands: BTreeSet::new(),
        });
    }
    for command in &meta.commands {
        catalog.commands.push(CommandRecord {
            id: command.id.clone(),
            description: command.description.clone(),
            hidden: command.hidden,
            aliases: command.aliases.clone(),
            usage: command.usage.clone(),
            run: CommandRun::Plugin {
                plugin: meta.name.clone(),
                root: root.to_path_buf(),
                entrypoint: meta.entrypoint.clone(),
            },
        });
    }
    catalog
}

/// Serves the CLI's own command set.
pub struct BuiltinProvider;

impl Provider for BuiltinProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Builtin
    }

    fn load(&self, _cache: &mut ManifestCache) -> Result<ProviderCatalog> {
        Ok(crate::cli::builtin_catalog())
    }
}

/// Serves plugins linked from local directories.
///
/// Linked plugins are development checkouts: their metadata is re-probed
/// on every init instead of trusting the cache.
pub struct LinkedProvider;

impl Provider for LinkedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Linked
    }

    fn load(&self, cache: &mut ManifestCache) -> Result<ProviderCatalog> {
        let mut catalog = ProviderCatalog::default();
        for root in cache.linked().to_vec() {
            match probe_plugin(&root) {
                Ok(meta) => {
                    let partial = catalog_from_meta(&meta, &root);
                    catalog.topics.extend(partial.topics);
                    catalog.commands.extend(partial.commands);
                }
                Err(err) => {
                    warn!("skipping linked plugin {}: {err:#}", root.display());
                }
            }
        }
        Ok(catalog)
    }
}

/// Serves plugins installed into the user plugins directory.
pub struct UserProvider {
    plugins_dir: PathBuf,
}

impl UserProvider {
    pub fn new(paths: &Paths) -> Self {
        Self {
            plugins_dir: paths.user_plugins_dir.clone(),
        }
    }

    /// Names of installed plugins: the `dependencies` keys of the user
    /// plugins `package.json`.
    pub fn installed(&self) -> Vec<String> {
        let path = self.plugins_dir.join("package.json");
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return Vec::new(),
        };
        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                warn!("invalid user plugins package.json: {err}");
                return Vec::new();
            }
        };
        value
            .get("dependencies")
            .and_then(|deps| deps.as_object())
            .map(|deps| deps.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn plugin_root(&self, name: &str) -> PathBuf {
        self.plugins_dir.join("node_modules").join(name)
    }
}

impl Provider for UserProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::User
    }

    fn load(&self, cache: &mut ManifestCache) -> Result<ProviderCatalog> {
        let mut catalog = ProviderCatalog::default();
        for name in self.installed() {
            let root = self.plugin_root(&name);

            // The cache is trusted only while its version matches the
            // installed package metadata.
            let installed_version = probe_version(&root);
            let cached = cache.get(&name).filter(|entry| {
                entry.root == root && Some(&entry.meta.version) == installed_version.as_ref()
            });

            let meta = match cached {
                Some(entry) => entry.meta.clone(),
                None => match probe_plugin(&root) {
                    Ok(meta) => {
                        cache.insert(CachedPlugin {
                            root: root.clone(),
                            meta: meta.clone(),
                        });
                        meta
                    }
                    Err(err) => {
                        warn!("skipping plugin {name}: {err:#}");
                        cache.invalidate(&name);
                        continue;
                    }
                },
            };

            let partial = catalog_from_meta(&meta, &root);
            catalog.topics.extend(partial.topics);
            catalog.commands.extend(partial.commands);
        }
        Ok(catalog)
    }
}

fn probe_version(root: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(root.join("package.json")).ok()?;
    let value: serde_json::Value = serde_json::from_str(&raw).ok()?;
    value
        .get("version")
        .and_then(|v| v.as_str())
        .map(ToString::to_string)
}

/// Test fixture: write a minimal valid plugin package into `root`.
#[cfg(test)]
pub(crate) fn write_plugin(root: &Path, name: &str, version: &str) {
    std::fs::create_dir_all(root).unwrap();
    let package = serde_json::json!({
        "name": name,
        "version": version,
        "spoke": {
            "topics": [{"name": name, "description": format!("{name} commands")}],
            "commands": [
                {"id": format!("{name}:hello"), "description": "say hello"}
            ]
        }
    });
    std::fs::write(
        root.join("package.json"),
        serde_json::to_string_pretty(&package).unwrap(),
    )
    .unwrap();
}
