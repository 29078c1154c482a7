//! spoke CLI entry point.
//!
//! Boot order: tracing init, config, paths, background autoupdate
//! decision, plugin catalog init, dispatch. Exit codes follow the error
//! taxonomy: 0 on success, 127 for unknown commands, 1 for everything
//! else (with unexpected errors appended to the error log).

use std::io::Write;

use colored::Colorize;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use spoke::cli::{BuiltinCommand, CommandContext};
use spoke::config::Config;
use spoke::core::error;
use spoke::dispatch::{Dispatcher, Resolution};
use spoke::help::HelpRenderer;
use spoke::paths::Paths;
use spoke::plugins::{CommandRecord, CommandRun, PluginManager};
use spoke::update::autoupdate::Autoupdater;
use spoke::update::Updater;
use spoke::{lock, STDOUT_FLUSH_TIMEOUT};

#[tokio::main]
async fn main() {
    init_tracing();
    let code = run().await;

    // Bounded final flush: after the timeout fires the process exits
    // regardless, so a blocked pipe cannot wedge the CLI.
    let flush = tokio::task::spawn_blocking(|| {
        std::io::stdout().flush().ok();
    });
    let _ = tokio::time::timeout(STDOUT_FLUSH_TIMEOUT, flush).await;
    std::process::exit(code);
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let fmt = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    // The spawned autoupdater sets SPOKE_TIMESTAMPS so its log lines in
    // autoupdate.log carry timestamps; interactive runs stay clean.
    if std::env::var_os("SPOKE_TIMESTAMPS").is_some() {
        tracing_subscriber::registry().with(fmt).with(filter).init();
    } else {
        tracing_subscriber::registry()
            .with(fmt.without_time())
            .with(filter)
            .init();
    }
}

async fn run() -> i32 {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", format!("{err:#}").red());
            return 1;
        }
    };
    let paths = Paths::new(&config);
    let argv: Vec<String> = std::env::args().skip(1).collect();

    // Background autoupdate decision happens before anything else, except
    // when this invocation IS the updater.
    let updating = argv.first().map(|arg| arg == "update").unwrap_or(false);
    if !updating {
        let updater = Updater::new(&config, &paths);
        let autoupdater = Autoupdater::new(&config, &paths);
        autoupdater.run(&updater, false).await;
    }

    let mut manager = PluginManager::new(&config, &paths);
    if let Err(err) = manager.init() {
        warn!("plugin catalog init failed: {err:#}");
    }

    let dispatcher = Dispatcher::new(&config, &manager);
    match dispatcher.resolve(&argv) {
        Resolution::Help { subject, all } => {
            let renderer = HelpRenderer::new(&config, &manager);
            match renderer.render(subject.as_deref(), all) {
                Ok(out) => {
                    print!("{out}");
                    0
                }
                Err(err) => not_found(&config, &err.to_string(), suggestions_of(&err)),
            }
        }
        Resolution::Topic(topic) => {
            let renderer = HelpRenderer::new(&config, &manager);
            print!("{}", renderer.render_topic(topic, false));
            0
        }
        Resolution::NotFound { id, suggestions } => not_found(
            &config,
            &format!("{id} is not a {} command", config.bin),
            suggestions,
        ),
        Resolution::Command { command, argv } => {
            run_command(&config, &paths, &manager, command, &argv).await
        }
    }
}

fn suggestions_of(err: &spoke::core::SpokeError) -> Vec<String> {
    match err {
        spoke::core::SpokeError::CommandNotFound { suggestions, .. } => suggestions.clone(),
        _ => Vec::new(),
    }
}

fn not_found(config: &Config, message: &str, suggestions: Vec<String>) -> i32 {
    eprintln!("{}", message.red());
    match suggestions.as_slice() {
        [] => {}
        [only] => eprintln!("Did you mean {only}?"),
        many => eprintln!("Did you mean one of: {}?", many.join(", ")),
    }
    eprintln!("Run {} help for a list of available commands.", config.bin);
    127
}

async fn run_command(
    config: &Config,
    paths: &Paths,
    manager: &PluginManager,
    command: &CommandRecord,
    argv: &[String],
) -> i32 {
    let updating = matches!(command.run, CommandRun::Builtin(BuiltinCommand::Update));

    // Hold a reader on the update lock while executing out of the client
    // tree, so an updater cannot evict this tree mid-run. The update
    // command itself takes the writer instead.
    let _reader = if updating {
        None
    } else {
        match lock::reader(&paths.update_lock_file) {
            Ok(guard) => Some(guard),
            Err(err) => {
                warn!("could not acquire reader lock: {err:#}");
                None
            }
        }
    };

    let ctx = CommandContext {
        config,
        paths,
        manager,
    };
    let outcome = tokio::select! {
        outcome = execute(&ctx, command, argv) => outcome,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("ctrl-c");
            return 1;
        }
    };

    match outcome {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{}", format!("{err:#}").red());
            // Taxonomized errors have their own surfacing policy; only
            // the opaque "Unexpected" class is captured to the error log.
            if error::is_unexpected(&err) {
                append_errlog(paths, &err);
            }
            error::exit_code(&err)
        }
    }
}

async fn execute(
    ctx: &CommandContext<'_>,
    command: &CommandRecord,
    argv: &[String],
) -> anyhow::Result<()> {
    match &command.run {
        CommandRun::Builtin(kind) => spoke::cli::run_builtin(*kind, ctx, argv).await,
        CommandRun::Plugin {
            root, entrypoint, ..
        } => {
            let bin = root.join(entrypoint);
            let status = tokio::process::Command::new(&bin)
                .arg(&command.id)
                .args(argv)
                .status()
                .await
                .map_err(|err| {
                    anyhow::anyhow!("failed to run {} via {}: {err}", command.id, bin.display())
                })?;
            if !status.success() {
                anyhow::bail!("{} exited with {status}", command.id);
            }
            Ok(())
        }
    }
}

/// Append an unexpected failure to the error log (best-effort; the log is
/// chopped to a bounded length at update time).
fn append_errlog(paths: &Paths, err: &anyhow::Error) {
    if let Some(parent) = paths.error_log_file.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let open = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.error_log_file);
    if let Ok(mut file) = open {
        let _ = writeln!(
            file,
            "[{}] {err:#}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%z")
        );
    }
}
