//! On-disk plugin manifest cache.
//!
//! Dispatch and help must never load plugin code, so every plugin's
//! topics and commands are persisted here after first derivation. The
//! cache file lives next to the plugins themselves and holds two things:
//!
//! - **plugins**: plugin name to its derived metadata (version, topics,
//!   commands, entrypoint) plus the root it was derived from
//! - **linked**: the local directories recorded by `plugins:link`
//!
//! # Invalidation
//!
//! An entry is dropped whenever its plugin is installed, removed, or
//! updated, and ignored at load time when its recorded version no longer
//! matches the plugin's own package metadata - the next init re-derives
//! and re-persists it. A corrupt cache file loads as empty rather than
//! failing: a broken cache must never break the CLI, it just costs a
//! re-derive.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Topic metadata as declared by a plugin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub hidden: bool,
}

/// Command metadata as declared by a plugin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandMeta {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
}

/// Everything the dispatcher needs to know about one plugin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginMeta {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<TopicMeta>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<CommandMeta>,
    /// Relative path of the executable entrypoint inside the plugin root.
    #[serde(default = "default_entrypoint")]
    pub entrypoint: String,
}

fn default_entrypoint() -> String {
    "bin/run".to_string()
}

/// A cached plugin entry: its metadata plus where it was derived from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedPlugin {
    pub root: PathBuf,
    #[serde(flatten)]
    pub meta: PluginMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct CacheFile {
    #[serde(default)]
    plugins: BTreeMap<String, CachedPlugin>,
    #[serde(default)]
    linked: Vec<PathBuf>,
}

/// Loaded cache with change tracking.
#[derive(Debug)]
pub struct ManifestCache {
    path: PathBuf,
    file: CacheFile,
    dirty: bool,
}

impl ManifestCache {
    /// Load the cache, treating a missing or corrupt file as empty. A
    /// broken cache must never break the CLI; it just costs a re-derive.
    pub fn load(path: &Path) -> Self {
        let file = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(file) => file,
                Err(err) => {
                    warn!("ignoring corrupt plugin manifest {}: {err}", path.display());
                    CacheFile::default()
                }
            },
            Err(_) => CacheFile::default(),
        };
        Self {
            path: path.to_path_buf(),
            file,
            dirty: false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&CachedPlugin> {
        self.file.plugins.get(name)
    }

    pub fn insert(&mut self, entry: CachedPlugin) {
        self.file.plugins.insert(entry.meta.name.clone(), entry);
        self.dirty = true;
    }

    /// Drop a plugin's cached metadata so the next init re-derives it.
    pub fn invalidate(&mut self, name: &str) {
        if self.file.plugins.remove(name).is_some() {
            debug!("invalidated plugin manifest entry for {name}");
            self.dirty = true;
        }
    }

    /// Drop every cached entry (used by `plugins:update`).
    pub fn invalidate_all(&mut self) {
        if !self.file.plugins.is_empty() {
            self.file.plugins.clear();
            self.dirty = true;
        }
    }

    pub fn linked(&self) -> &[PathBuf] {
        &self.file.linked
    }

    pub fn add_linked(&mut self, path: PathBuf) {
        if !self.file.linked.contains(&path) {
            self.file.linked.push(path);
            self.dirty = true;
        }
    }

    pub fn remove_linked(&mut self, path: &Path) -> bool {
        let before = self.file.linked.len();
        self.file.linked.retain(|p| p != path);
        if self.file.linked.len() != before {
            self.dirty = true;
            true
        } else {
            false
        }
    }

    /// Persist the cache when anything changed.
    pub fn save_if_dirty(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(&self.file)?;
        std::fs::write(&self.path, raw)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        self.dirty = false;
        Ok(())
    }
}
