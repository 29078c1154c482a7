//! Help rendering over the merged catalog.
//!
//! Three shapes of output, all plain text:
//!
//! - **empty subject**: usage banner plus the non-hidden top-level topics
//!   (one level deep, no colon in the name), sorted lexicographically;
//! - **topic subject**: the topic's description and its direct commands
//!   (hidden ones excluded unless `--all`);
//! - **command subject**: the command's usage line, description, and
//!   aliases.
//!
//! Because the catalog's command ID list is sorted at init, repeated
//! renders over unchanged inputs are byte-identical.
//!
//! # Column Rendering
//!
//! Two-column listings align the first column to the longest label and
//! wrap the second column at the terminal width (the `COLUMNS` variable,
//! falling back to 80).
//!
//! # Examples
//!
//! ```
//! use spoke::help::two_column;
//!
//! let rows = vec![
//!     ("plugins".to_string(), "manage CLI plugins".to_string()),
//!     ("version".to_string(), "print the CLI version".to_string()),
//! ];
//! let out = two_column(&rows, 80);
//! assert!(out.contains("plugins  manage CLI plugins"));
//! ```

use crate::config::Config;
use crate::core::SpokeError;
use crate::dispatch::suggest;
use crate::plugins::{CommandRecord, PluginManager, TopicRecord};

const FALLBACK_WIDTH: usize = 80;

fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|columns| columns.parse().ok())
        .unwrap_or(FALLBACK_WIDTH)
}

/// Renders help text from the merged catalog.
pub struct HelpRenderer<'a> {
    config: &'a Config,
    manager: &'a PluginManager,
}

impl<'a> HelpRenderer<'a> {
    pub fn new(config: &'a Config, manager: &'a PluginManager) -> Self {
        Self { config, manager }
    }

    /// Render help for `subject`: a command ID, a topic name, or nothing
    /// for the root overview.
    ///
    /// Commands shadow topics of the same name, matching dispatch order.
    ///
    /// # Errors
    ///
    /// An unknown subject is [`SpokeError::CommandNotFound`] with
    /// suggestions, exactly like dispatching it would be, so
    /// `spoke help updat` and `spoke updat` fail identically.
    pub fn render(&self, subject: Option<&str>, all: bool) -> Result<String, SpokeError> {
        match subject {
            None | Some("") => Ok(self.render_root()),
            Some(subject) => {
                if let Some(command) = self.manager.find_command(subject) {
                    return Ok(self.render_command(command));
                }
                if let Some(topic) = self.manager.find_topic(subject) {
                    return Ok(self.render_topic(topic, all));
                }
                Err(SpokeError::CommandNotFound {
                    id: subject.to_string(),
                    suggestions: suggest(subject, self.manager.command_ids()),
                })
            }
        }
    }

    /// Usage banner plus the top-level (no colon in the name) non-hidden
    /// topics and the root commands.
    pub fn render_root(&self) -> String {
        let bin = &self.config.bin;
        let mut out = String::new();
        out.push_str(&format!("Usage: {bin} COMMAND [--help]\n\n"));
        out.push_str(&format!(
            "Help topics, type {bin} help TOPIC for more details:\n\n"
        ));

        let mut rows: Vec<(String, String)> = self
            .manager
            .topics()
            .filter(|topic| !topic.hidden && !topic.name.contains(':'))
            .map(|topic| {
                (
                    topic.name.clone(),
                    topic.description.clone().unwrap_or_default(),
                )
            })
            .collect();
        for command in self.manager.list_root_commands() {
            rows.push((
                command.id.clone(),
                command.description.clone().unwrap_or_default(),
            ));
        }
        rows.sort();
        rows.dedup_by(|a, b| a.0 == b.0);
        out.push_str(&two_column(&rows, terminal_width()));
        out
    }

    /// A topic's description and its direct commands.
    pub fn render_topic(&self, topic: &TopicRecord, all: bool) -> String {
        let bin = &self.config.bin;
        let mut out = String::new();
        out.push_str(&format!("Usage: {bin} {}:COMMAND [--help]\n", topic.name));
        if let Some(description) = &topic.description {
            out.push_str(&format!("\n{description}\n"));
        }

        let prefix = format!("{}:", topic.name);
        let rows: Vec<(String, String)> = self
            .manager
            .command_ids()
            .iter()
            .filter(|id| id.starts_with(&prefix))
            .filter_map(|id| self.manager.find_command(id))
            .filter(|command| all || !command.hidden)
            .map(|command| {
                (
                    command.id.clone(),
                    command.description.clone().unwrap_or_default(),
                )
            })
            .collect();
        if !rows.is_empty() {
            out.push('\n');
            out.push_str(&two_column(&rows, terminal_width()));
        }
        out
    }

    /// A single command's help: usage line, description, aliases.
    pub fn render_command(&self, command: &CommandRecord) -> String {
        let bin = &self.config.bin;
        let usage = command
            .usage
            .clone()
            .unwrap_or_else(|| command.id.clone());
        let mut out = format!("Usage: {bin} {usage}\n");
        if let Some(description) = &command.description {
            out.push_str(&format!("\n{}\n", wrap(description, terminal_width())));
        }
        if !command.aliases.is_empty() {
            out.push_str(&format!("\nAliases: {}\n", command.aliases.join(", ")));
        }
        out
    }
}

/// Align labels to the longest one; wrap descriptions at `width`.
pub fn two_column(rows: &[(String, String)], width: usize) -> String {
    let label_width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    let description_width = width.saturating_sub(label_width + 4).max(20);

    let mut out = String::new();
    for (label, description) in rows {
        if description.is_empty() {
            out.push_str(&format!("  {label}\n"));
            continue;
        }
        let wrapped = wrap(description, description_width);
        let mut lines = wrapped.lines();
        if let Some(first) = lines.next() {
            out.push_str(&format!("  {label:<label_width$}  {first}\n"));
        }
        for continuation in lines {
            out.push_str(&format!("  {:<label_width$}  {continuation}\n", ""));
        }
    }
    out
}

/// Greedy word wrap; words longer than `width` stand on their own line.
fn wrap(text: &str, width: usize) -> String {
    let mut out = String::new();
    let mut line_len = 0;
    for word in text.split_whitespace() {
        if line_len == 0 {
            out.push_str(word);
            line_len = word.len();
        } else if line_len + 1 + word.len() <= width {
            out.push(' ');
            out.push_str(word);
            line_len += 1 + word.len();
        } else {
            out.push('\n');
            out.push_str(word);
            line_len = word.len();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::Paths;
    use crate::plugins::manifest::ManifestCache;
    use crate::plugins::provider::{Provider, ProviderCatalog};
    use crate::plugins::{CommandRun, ProviderKind};
    use std::collections::{BTreeSet, HashMap};
    use std::path::PathBuf;

    struct TestProvider;

    impl Provider for TestProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Builtin
        }
        fn load(&self, _cache: &mut ManifestCache) -> anyhow::Result<ProviderCatalog> {
            let command = |id: &str, description: &str, hidden: bool| CommandRecord {
                id: id.to_string(),
                description: Some(description.to_string()),
                hidden,
                aliases: vec![],
                usage: None,
                run: CommandRun::Plugin {
                    plugin: "test".into(),
                    root: PathBuf::from("/tmp"),
                    entrypoint: "bin/run".into(),
                },
            };
            Ok(ProviderCatalog {
                topics: vec![
                    TopicRecord {
                        name: "plugins".into(),
                        description: Some("manage plugins".into()),
                        hidden: false,
                        commands: BTreeSet::new(),
                    },
                    TopicRecord {
                        name: "debug".into(),
                        description: None,
                        hidden: true,
                        commands: BTreeSet::new(),
                    },
                ],
                commands: vec![
                    command("plugins:install", "install a plugin", false),
                    command("plugins:trace", "internal tracing", true),
                    command("version", "print the version", false),
                ],
            })
        }
    }

    fn fixture() -> (Config, PluginManager) {
        let config = Config {
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
            aliases: HashMap::new(),
        };
        let paths = Paths::new(&config);
        let mut manager =
            PluginManager::with_providers(&config, &paths, vec![Box::new(TestProvider)]);
        manager.init().unwrap();
        (config, manager)
    }

    #[test]
    fn root_help_lists_visible_topics_sorted() {
        let (config, manager) = fixture();
        let renderer = HelpRenderer::new(&config, &manager);
        let out = renderer.render(None, false).unwrap();

        assert!(out.starts_with("Usage: spoke COMMAND"));
        assert!(out.contains("plugins"));
        assert!(out.contains("version"));
        assert!(!out.contains("debug"), "hidden topics are excluded:\n{out}");
        // Sorted: plugins before version.
        assert!(out.find("plugins").unwrap() < out.find("version").unwrap());
    }

    #[test]
    fn topic_help_hides_hidden_commands_unless_all() {
        let (config, manager) = fixture();
        let renderer = HelpRenderer::new(&config, &manager);
        let topic = manager.find_topic("plugins").unwrap();

        let normal = renderer.render_topic(topic, false);
        assert!(normal.contains("plugins:install"));
        assert!(!normal.contains("plugins:trace"));

        let all = renderer.render_topic(topic, true);
        assert!(all.contains("plugins:trace"));
    }

    #[test]
    fn command_help_uses_usage_and_description() {
        let (config, manager) = fixture();
        let renderer = HelpRenderer::new(&config, &manager);
        let out = renderer.render(Some("plugins:install"), false).unwrap();
        assert!(out.contains("Usage: spoke plugins:install"));
        assert!(out.contains("install a plugin"));
    }

    #[test]
    fn unknown_subject_is_not_found_with_suggestions() {
        let (config, manager) = fixture();
        let renderer = HelpRenderer::new(&config, &manager);
        let err = renderer.render(Some("versoin"), false).unwrap_err();
        match err {
            SpokeError::CommandNotFound { suggestions, .. } => {
                assert_eq!(suggestions, ["version"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn two_column_aligns_to_longest_label_and_wraps() {
        let rows = vec![
            ("short".to_string(), "a description".to_string()),
            (
                "much-longer-label".to_string(),
                "a very long description that should wrap onto a continuation line at narrow widths"
                    .to_string(),
            ),
        ];
        let out = two_column(&rows, 60);
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines.len() > 2, "expected wrapping:\n{out}");
        // Both descriptions start at the same column.
        let col = lines[0].find("a description").unwrap();
        assert_eq!(lines[1].find("a very").unwrap(), col);
    }
}
