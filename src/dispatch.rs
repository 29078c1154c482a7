//! argv resolution.
//!
//! The dispatcher turns the post-binary argv vector into one of four
//! outcomes: run a command, show a topic's help, show requested help, or
//! not-found with suggestions.
//!
//! # Resolution Order
//!
//! 1. **Help interception**: `--help` or `-h` anywhere before a `--`
//!    terminator wins over everything else, so `spoke update --help`
//!    renders help instead of updating
//! 2. **Command lookup**: `argv[0]` (or the configured default command,
//!    or `help` when argv is empty) is unaliased and looked up in the
//!    merged catalog
//! 3. **Topic fallback**: a bare topic name renders the topic's help
//! 4. **Not-found**: anything else, with up to three suggestions within
//!    Levenshtein distance two of the input
//!
//! # Exit Codes
//!
//! The caller maps outcomes to exit codes: success is 0, not-found is
//! 127, user errors and everything else are 1.

use crate::config::Config;
use crate::plugins::{CommandRecord, PluginManager, TopicRecord};

/// Outcome of resolving an argv vector.
#[derive(Debug)]
pub enum Resolution<'a> {
    /// `--help`/`-h` was requested, or help is the resolved command.
    Help { subject: Option<String>, all: bool },
    /// A runnable command plus its remaining argv.
    Command {
        command: &'a CommandRecord,
        argv: Vec<String>,
    },
    /// A bare topic name: render the topic's help.
    Topic(&'a TopicRecord),
    /// Nothing matched; carries ranked suggestions.
    NotFound { id: String, suggestions: Vec<String> },
}

/// True when argv asks for help before any `--` terminator.
pub fn wants_help(argv: &[String]) -> bool {
    for arg in argv {
        if arg == "--" {
            return false;
        }
        if arg == "--help" || arg == "-h" {
            return true;
        }
    }
    false
}

/// Up to three command IDs within Levenshtein distance 2 of `id`, closest
/// first (ties broken lexicographically for deterministic output).
///
/// # Examples
///
/// ```
/// use spoke::dispatch::suggest;
///
/// let ids = vec!["update".to_string(), "plugins:update".to_string()];
/// assert_eq!(suggest("updat", &ids), ["update"]);
/// assert!(suggest("zzzzz", &ids).is_empty());
/// ```
pub fn suggest(id: &str, ids: &[String]) -> Vec<String> {
    let mut scored: Vec<(usize, &String)> = ids
        .iter()
        .map(|candidate| (strsim::levenshtein(id, candidate), candidate))
        .filter(|(distance, _)| *distance <= 2)
        .collect();
    scored.sort();
    scored
        .into_iter()
        .take(3)
        .map(|(_, candidate)| candidate.clone())
        .collect()
}

/// Resolves argv against the merged catalog.
pub struct Dispatcher<'a> {
    manager: &'a PluginManager,
    config: &'a Config,
}

impl<'a> Dispatcher<'a> {
    pub fn new(config: &'a Config, manager: &'a PluginManager) -> Self {
        Self { manager, config }
    }

    /// Resolve `argv` (everything after the binary name).
    pub fn resolve(&self, argv: &[String]) -> Resolution<'a> {
        if wants_help(argv) {
            let subject = argv
                .iter()
                .find(|arg| !arg.starts_with('-'))
                .cloned();
            let all = argv.iter().any(|arg| arg == "--all");
            return Resolution::Help { subject, all };
        }

        let id = argv.first().cloned().unwrap_or_default();
        let id = if id.is_empty() {
            match &self.config.default_command {
                Some(default) => default.clone(),
                None => "help".to_string(),
            }
        } else {
            id
        };
        let rest: Vec<String> = argv.iter().skip(1).cloned().collect();

        if let Some(command) = self.manager.find_command(&id) {
            return Resolution::Command {
                command,
                argv: rest,
            };
        }
        if let Some(topic) = self.manager.find_topic(&id) {
            return Resolution::Topic(topic);
        }
        Resolution::NotFound {
            suggestions: suggest(&id, self.manager.command_ids()),
            id,
        }
    }
}
