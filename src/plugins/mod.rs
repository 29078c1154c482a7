//! Plugin management and the merged command catalog.
//!
//! A [`PluginManager`] owns a fixed tree of providers - builtin, linked,
//! user - and merges their topics and command IDs into one catalog that
//! the dispatcher and help renderer consume.
//!
//! # Init Protocol
//!
//! [`PluginManager::init`] is idempotent (guarded by an `initialized`
//! flag) and performs, in order:
//!
//! 1. Load the on-disk plugin manifest cache
//! 2. Run each provider in ascending precedence order
//!    (builtin, linked, user), merging its catalog as it reports
//! 3. Finalize: sort the command ID list, drop empty IDs, register every
//!    command under its topic, synthesize topic records implied by
//!    command IDs whose prefix has no declared topic
//! 4. Persist the manifest cache if any provider re-derived metadata
//!
//! A provider that fails to load is reported as a warning and skipped;
//! one broken plugin source must not take the CLI down.
//!
//! # Merge Rules
//!
//! - On a command ID collision the later (higher-precedence) provider's
//!   record replaces the earlier one, and the superseded record is
//!   omitted from the catalog entirely - never both served
//! - Topic merges union the command sets and prefer the later provider's
//!   metadata on conflict
//! - The merged command ID list is sorted, so help output and suggestion
//!   ranking are deterministic across repeated inits
//!
//! # Command IDs and Topics
//!
//! A command ID is a colon-separated path (`plugins:install`); its topic
//! is the prefix up to the last colon, empty for root commands. Topics
//! group commands for help rendering and may themselves be declared
//! hidden.
//!
//! # Examples
//!
//! ```
//! use spoke::cli::BuiltinCommand;
//! use spoke::plugins::{CommandRecord, CommandRun};
//!
//! let record = CommandRecord {
//!     id: "plugins:install".into(),
//!     description: Some("install a plugin".into()),
//!     hidden: false,
//!     aliases: vec![],
//!     usage: None,
//!     run: CommandRun::Builtin(BuiltinCommand::PluginsInstall),
//! };
//! assert_eq!(record.topic(), "plugins");
//! ```

pub mod manifest;
pub mod provider;
pub mod user;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use anyhow::Result;
use tracing::warn;

use crate::config::Config;
use crate::paths::Paths;
use manifest::ManifestCache;
use provider::{BuiltinProvider, LinkedProvider, Provider, ProviderCatalog, UserProvider};

/// Where a plugin (or command) comes from. Order is merge precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProviderKind {
    Builtin,
    Linked,
    User,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Builtin => write!(f, "builtin"),
            Self::Linked => write!(f, "linked"),
            Self::User => write!(f, "user"),
        }
    }
}

/// A colon-delimited command grouping.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicRecord {
    pub name: String,
    pub description: Option<String>,
    pub hidden: bool,
    /// IDs of the commands directly under this topic.
    pub commands: BTreeSet<String>,
}

/// How a resolved command is executed.
#[derive(Debug, Clone)]
pub enum CommandRun {
    /// One of the CLI's own commands.
    Builtin(crate::cli::BuiltinCommand),
    /// A plugin command dispatched through the plugin's entrypoint.
    Plugin {
        plugin: String,
        root: PathBuf,
        entrypoint: String,
    },
}

/// One runnable command in the merged catalog.
#[derive(Debug, Clone)]
pub struct CommandRecord {
    /// Colon-separated unique ID (e.g. `plugins:install`).
    pub id: String,
    pub description: Option<String>,
    pub hidden: bool,
    pub aliases: Vec<String>,
    pub usage: Option<String>,
    pub run: CommandRun,
}

impl CommandRecord {
    /// The topic this command belongs to: the ID prefix up to the last
    /// colon, empty for root commands.
    pub fn topic(&self) -> &str {
        match self.id.rfind(':') {
            Some(idx) => &self.id[..idx],
            None => "",
        }
    }
}

/// Owns the provider tree and the merged catalog.
pub struct PluginManager {
    config: Config,
    paths: Paths,
    providers: Vec<Box<dyn Provider>>,
    topics: BTreeMap<String, TopicRecord>,
    commands: BTreeMap<String, CommandRecord>,
    command_ids: Vec<String>,
    initialized: bool,
}

impl PluginManager {
    /// Build the standard provider tree: builtin, linked, user.
    pub fn new(config: &Config, paths: &Paths) -> Self {
        let providers: Vec<Box<dyn Provider>> = vec![
            Box::new(BuiltinProvider),
            Box::new(LinkedProvider),
            Box::new(UserProvider::new(paths)),
        ];
        Self::with_providers(config, paths, providers)
    }

    /// Build a manager over an explicit provider list (test seam).
    pub fn with_providers(
        config: &Config,
        paths: &Paths,
        providers: Vec<Box<dyn Provider>>,
    ) -> Self {
        Self {
            config: config.clone(),
            paths: paths.clone(),
            providers,
            topics: BTreeMap::new(),
            commands: BTreeMap::new(),
            command_ids: Vec::new(),
            initialized: false,
        }
    }

    /// Load the manifest cache, run every provider in precedence order,
    /// and merge (see the module docs for the full protocol).
    ///
    /// Idempotent: repeated calls are no-ops, so any code path may call
    /// it defensively before a lookup. Per-provider failures are warnings
    /// and the provider's contribution is simply absent; only the
    /// impossible cases (a poisoned internal state) would surface as an
    /// error.
    pub fn init(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        let mut cache = ManifestCache::load(&self.paths.user_plugins_manifest);

        for i in 0..self.providers.len() {
            match self.providers[i].load(&mut cache) {
                Ok(catalog) => self.merge(catalog),
                Err(err) => {
                    // One broken provider must not take the CLI down.
                    warn!("{} provider failed to load: {err:#}", self.providers[i].kind());
                }
            }
        }
        self.finalize();

        if let Err(err) = cache.save_if_dirty() {
            warn!("could not persist plugin manifest cache: {err:#}");
        }
        self.initialized = true;
        Ok(())
    }

    fn merge(&mut self, catalog: ProviderCatalog) {
        for topic in catalog.topics {
            if topic.name.is_empty() {
                continue;
            }
            match self.topics.get_mut(&topic.name) {
                Some(existing) => {
                    // Union the command sets; later provider metadata wins.
                    existing.commands.extend(topic.commands);
                    if topic.description.is_some() {
                        existing.description = topic.description;
                    }
                    existing.hidden = topic.hidden;
                }
                None => {
                    self.topics.insert(topic.name.clone(), topic);
                }
            }
        }
        for command in catalog.commands {
            if command.id.is_empty() {
                continue;
            }
            // Later (higher-precedence) providers replace earlier records.
            self.commands.insert(command.id.clone(), command);
        }
    }

    fn finalize(&mut self) {
        for topic in self.topics.values_mut() {
            topic.commands.retain(|id| !id.is_empty());
        }
        // Register every command under its topic, synthesizing topic
        // records implied by command IDs with no declared topic.
        let ids: Vec<String> = self.commands.keys().cloned().collect();
        for id in &ids {
            let topic_name = self.commands[id].topic().to_string();
            if topic_name.is_empty() {
                continue;
            }
            self.topics
                .entry(topic_name.clone())
                .or_insert_with(|| TopicRecord {
                    name: topic_name,
                    description: None,
                    hidden: false,
                    commands: BTreeSet::new(),
                })
                .commands
                .insert(id.clone());
        }
        self.command_ids = ids;
    }

    /// Resolve an alias to its canonical command ID.
    ///
    /// Consults the config alias table first, then per-command alias
    /// lists; an ID that is no one's alias resolves to itself. Aliases
    /// never chain, so the result is a fixed point:
    /// `unalias(unalias(x)) == unalias(x)`.
    pub fn unalias(&self, id: &str) -> String {
        for (canonical, aliases) in &self.config.aliases {
            if aliases.iter().any(|alias| alias == id) {
                return canonical.clone();
            }
        }
        for (canonical, command) in &self.commands {
            if command.aliases.iter().any(|alias| alias == id) {
                return canonical.clone();
            }
        }
        id.to_string()
    }

    /// Look up a command by ID or alias.
    ///
    /// The input is unaliased first, then resolved against the merged
    /// catalog, so precedence between providers has already been applied
    /// by the time anything is found here.
    pub fn find_command(&self, id: &str) -> Option<&CommandRecord> {
        self.commands.get(&self.unalias(id))
    }

    /// Read-only lookup into the merged topics.
    pub fn find_topic(&self, name: &str) -> Option<&TopicRecord> {
        self.topics.get(name)
    }

    /// Non-hidden commands under `name`.
    ///
    /// Membership is exact-prefix-then-colon: `db` matches `db:migrate`
    /// and `db:migrate:dry`, never `db2:other`. Results come back in
    /// sorted ID order.
    pub fn commands_for_topic(&self, name: &str) -> Vec<&CommandRecord> {
        let prefix = format!("{name}:");
        self.command_ids
            .iter()
            .filter(|id| id.starts_with(&prefix))
            .filter_map(|id| self.commands.get(id))
            .filter(|command| !command.hidden)
            .collect()
    }

    /// Non-hidden commands with no colon in their ID.
    pub fn list_root_commands(&self) -> Vec<&CommandRecord> {
        self.command_ids
            .iter()
            .filter(|id| !id.contains(':'))
            .filter_map(|id| self.commands.get(id))
            .filter(|command| !command.hidden)
            .collect()
    }

    /// All merged topics, sorted by name.
    pub fn topics(&self) -> impl Iterator<Item = &TopicRecord> {
        self.topics.values()
    }

    /// The sorted, deduplicated merged command ID list.
    pub fn command_ids(&self) -> &[String] {
        &self.command_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct StaticProvider {
        kind: ProviderKind,
        catalog: fn() -> ProviderCatalog,
    }

    impl Provider for StaticProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }
        fn load(&self, _cache: &mut ManifestCache) -> Result<ProviderCatalog> {
            Ok((self.catalog)())
        }
    }

    fn command(id: &str, description: &str) -> CommandRecord {
        CommandRecord {
            id: id.to_string(),
            description: Some(description.to_string()),
            hidden: false,
            aliases: vec![],
            usage: None,
            run: CommandRun::Plugin {
                plugin: "test".into(),
                root: PathBuf::from("/tmp"),
                entrypoint: "bin/run".into(),
            },
        }
    }

    fn test_config() -> Config {
        Config {
            bin: "spoke".into(),
            name: "spoke".into(),
            version: semver::Version::parse("1.2.3").unwrap(),
            channel: "stable".into(),
            platform: "linux".into(),
            arch: "x86_64".into(),
            windows: false,
            data_dir: PathBuf::from("/tmp/spoke-data"),
            cache_dir: PathBuf::from("/tmp/spoke-cache"),
            update_disabled: None,
            host: "https://releases.example.test".into(),
            default_command: None,
            aliases: HashMap::from([(
                "plugins:uninstall".to_string(),
                vec!["unlink".to_string()],
            )]),
        }
    }

    fn manager_with(providers: Vec<Box<dyn Provider>>) -> PluginManager {
        let config = test_config();
        let paths = Paths::new(&config);
        let mut manager = PluginManager::with_providers(&config, &paths, providers);
        manager.init().unwrap();
        manager
    }

    fn builtin_like() -> ProviderCatalog {
        ProviderCatalog {
            topics: vec![],
            commands: vec![command("conflict:cmd", "builtin wins?"), command("only-builtin", "b")],
        }
    }

    fn user_like() -> ProviderCatalog {
        ProviderCatalog {
            topics: vec![],
            commands: vec![command("conflict:cmd", "user wins"), command("only-user", "u")],
        }
    }

    #[test]
    fn collisions_resolve_user_over_builtin_and_loser_is_omitted() {
        let manager = manager_with(vec![
            Box::new(StaticProvider {
                kind: ProviderKind::Builtin,
                catalog: builtin_like,
            }),
            Box::new(StaticProvider {
                kind: ProviderKind::User,
                catalog: user_like,
            }),
        ]);

        let winner = manager.find_command("conflict:cmd").unwrap();
        assert_eq!(winner.description.as_deref(), Some("user wins"));
        // Exactly one record for the conflicting ID.
        assert_eq!(
            manager
                .command_ids()
                .iter()
                .filter(|id| *id == "conflict:cmd")
                .count(),
            1
        );
    }

    #[test]
    fn merge_is_commutative_on_nonconflicting_ids() {
        let forward = manager_with(vec![
            Box::new(StaticProvider {
                kind: ProviderKind::Builtin,
                catalog: || ProviderCatalog {
                    topics: vec![],
                    commands: vec![command("a:one", "a")],
                },
            }),
            Box::new(StaticProvider {
                kind: ProviderKind::User,
                catalog: || ProviderCatalog {
                    topics: vec![],
                    commands: vec![command("b:two", "b")],
                },
            }),
        ]);
        let reverse = manager_with(vec![
            Box::new(StaticProvider {
                kind: ProviderKind::Builtin,
                catalog: || ProviderCatalog {
                    topics: vec![],
                    commands: vec![command("b:two", "b")],
                },
            }),
            Box::new(StaticProvider {
                kind: ProviderKind::User,
                catalog: || ProviderCatalog {
                    topics: vec![],
                    commands: vec![command("a:one", "a")],
                },
            }),
        ]);
        assert_eq!(forward.command_ids(), reverse.command_ids());
    }

    #[test]
    fn command_ids_are_sorted_and_stable_across_inits() {
        let make = || {
            manager_with(vec![Box::new(StaticProvider {
                kind: ProviderKind::Builtin,
                catalog: || ProviderCatalog {
                    topics: vec![],
                    commands: vec![
                        command("zeta", "z"),
                        command("alpha:x", "a"),
                        command("", "dropped"),
                    ],
                },
            })])
        };
        let first = make();
        let second = make();
        assert_eq!(first.command_ids(), ["alpha:x", "zeta"]);
        assert_eq!(first.command_ids(), second.command_ids());
    }

    #[test]
    fn init_is_idempotent() {
        let mut manager = manager_with(vec![Box::new(StaticProvider {
            kind: ProviderKind::Builtin,
            catalog: builtin_like,
        })]);
        let before = manager.command_ids().to_vec();
        manager.init().unwrap();
        assert_eq!(manager.command_ids(), before);
    }

    #[test]
    fn topics_are_synthesized_from_command_prefixes() {
        let manager = manager_with(vec![Box::new(StaticProvider {
            kind: ProviderKind::Builtin,
            catalog: || ProviderCatalog {
                topics: vec![],
                commands: vec![command("ci:runs:list", "x"), command("ci:runs:watch", "y")],
            },
        })]);
        let topic = manager.find_topic("ci:runs").expect("synthesized topic");
        assert_eq!(topic.commands.len(), 2);
        assert!(topic.description.is_none());
    }

    #[test]
    fn unalias_is_idempotent_and_never_chains() {
        let manager = manager_with(vec![Box::new(StaticProvider {
            kind: ProviderKind::Builtin,
            catalog: || ProviderCatalog {
                topics: vec![],
                commands: vec![command("plugins:uninstall", "remove a plugin")],
            },
        })]);
        assert_eq!(manager.unalias("unlink"), "plugins:uninstall");
        assert_eq!(
            manager.unalias(&manager.unalias("unlink")),
            manager.unalias("unlink")
        );
        assert_eq!(manager.unalias("not-an-alias"), "not-an-alias");
    }

    #[test]
    fn topic_listing_filters_hidden_and_matches_exact_prefix() {
        let manager = manager_with(vec![Box::new(StaticProvider {
            kind: ProviderKind::Builtin,
            catalog: || {
                let mut hidden = command("db:migrate:dry", "hidden one");
                hidden.hidden = true;
                ProviderCatalog {
                    topics: vec![],
                    commands: vec![
                        command("db:migrate", "m"),
                        command("db:seed", "s"),
                        command("db2:other", "o"),
                        hidden,
                        command("root", "r"),
                    ],
                }
            },
        })]);

        let ids: Vec<_> = manager
            .commands_for_topic("db")
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, ["db:migrate", "db:seed"]);

        let roots: Vec<_> = manager
            .list_root_commands()
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(roots, ["root"]);
    }
}
