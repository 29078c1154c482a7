//! Builtin command implementations.
//!
//! Builtin commands enter the catalog through the builtin provider and
//! are dispatched exactly like plugin commands; each one parses its own
//! remaining argv with a clap derive struct. `--help` never reaches these
//! parsers - the dispatcher intercepts it first.
//!
//! # Command Set
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `update [CHANNEL] [--autoupdate]` | self-update against a channel |
//! | `plugins` | list installed and linked plugins |
//! | `plugins:install NAME[@TAG]` | install a user plugin |
//! | `plugins:link PATH` | link a local plugin checkout |
//! | `plugins:uninstall NAME` | remove a plugin (aliases: `unlink`) |
//! | `plugins:update` | upgrade all user plugins |
//! | `version` | print the user-agent string |
//! | `help [SUBJECT] [--all]` | render help |
//! | `debug:errlog` | stream the error log (hidden) |

pub mod debug;
pub mod help;
pub mod plugins;
pub mod update;
pub mod version;

use std::collections::BTreeSet;

use anyhow::Result;

use crate::config::Config;
use crate::paths::Paths;
use crate::plugins::provider::ProviderCatalog;
use crate::plugins::{CommandRecord, CommandRun, PluginManager, TopicRecord};

/// The CLI's own commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinCommand {
    Update,
    PluginsList,
    PluginsInstall,
    PluginsLink,
    PluginsUninstall,
    PluginsUpdate,
    Version,
    Help,
    DebugErrlog,
}

/// Everything a builtin command needs to run.
pub struct CommandContext<'a> {
    pub config: &'a Config,
    pub paths: &'a Paths,
    pub manager: &'a PluginManager,
}

fn builtin(
    id: &str,
    description: &str,
    hidden: bool,
    usage: Option<&str>,
    run: BuiltinCommand,
) -> CommandRecord {
    CommandRecord {
        id: id.to_string(),
        description: Some(description.to_string()),
        hidden,
        aliases: vec![],
        usage: usage.map(ToString::to_string),
        run: CommandRun::Builtin(run),
    }
}

fn topic(name: &str, description: &str, hidden: bool) -> TopicRecord {
    TopicRecord {
        name: name.to_string(),
        description: Some(description.to_string()),
        hidden,
        commands: BTreeSet::new(),
    }
}

/// The builtin provider's contribution to the merged catalog.
pub fn builtin_catalog() -> ProviderCatalog {
    ProviderCatalog {
        topics: vec![
            topic("plugins", "manage CLI plugins", false),
            topic("debug", "debugging utilities", true),
        ],
        commands: vec![
            builtin(
                "update",
                "update the CLI",
                false,
                Some("update [CHANNEL] [--autoupdate]"),
                BuiltinCommand::Update,
            ),
            builtin(
                "plugins",
                "list installed plugins",
                false,
                None,
                BuiltinCommand::PluginsList,
            ),
            builtin(
                "plugins:install",
                "install a plugin",
                false,
                Some("plugins:install NAME[@TAG]"),
                BuiltinCommand::PluginsInstall,
            ),
            builtin(
                "plugins:link",
                "link a local plugin directory",
                false,
                Some("plugins:link PATH"),
                BuiltinCommand::PluginsLink,
            ),
            builtin(
                "plugins:uninstall",
                "uninstall a plugin",
                false,
                Some("plugins:uninstall NAME"),
                BuiltinCommand::PluginsUninstall,
            ),
            builtin(
                "plugins:update",
                "update installed plugins",
                false,
                None,
                BuiltinCommand::PluginsUpdate,
            ),
            builtin(
                "version",
                "print the CLI version",
                false,
                None,
                BuiltinCommand::Version,
            ),
            builtin(
                "help",
                "display help",
                false,
                Some("help [SUBJECT] [--all]"),
                BuiltinCommand::Help,
            ),
            builtin(
                "debug:errlog",
                "stream the error log",
                true,
                None,
                BuiltinCommand::DebugErrlog,
            ),
        ],
    }
}

/// Parse `argv` with a clap derive struct, using the command ID as the
/// program name so usage errors read naturally.
pub(crate) fn parse_args<T: clap::Parser>(id: &str, argv: &[String]) -> Result<T> {
    let full: Vec<String> = std::iter::once(format!("spoke {id}"))
        .chain(argv.iter().cloned())
        .collect();
    T::try_parse_from(full).map_err(|err| anyhow::anyhow!("{err}"))
}

/// Execute a builtin command with its remaining argv.
pub async fn run_builtin(
    kind: BuiltinCommand,
    ctx: &CommandContext<'_>,
    argv: &[String],
) -> Result<()> {
    match kind {
        BuiltinCommand::Update => update::execute(ctx, parse_args("update", argv)?).await,
        BuiltinCommand::PluginsList => plugins::list(ctx),
        BuiltinCommand::PluginsInstall => {
            plugins::install(ctx, parse_args("plugins:install", argv)?)
        }
        BuiltinCommand::PluginsLink => plugins::link(ctx, parse_args("plugins:link", argv)?),
        BuiltinCommand::PluginsUninstall => {
            plugins::uninstall(ctx, parse_args("plugins:uninstall", argv)?)
        }
        BuiltinCommand::PluginsUpdate => plugins::update(ctx),
        BuiltinCommand::Version => version::execute(ctx),
        BuiltinCommand::Help => help::execute(ctx, parse_args("help", argv)?),
        BuiltinCommand::DebugErrlog => debug::errlog(ctx),
    }
}
