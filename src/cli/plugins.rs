//! The `plugins` topic: list, install, link, uninstall, update.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;

use super::CommandContext;
use crate::plugins::manifest::ManifestCache;
use crate::plugins::provider::{probe_plugin, UserProvider};
use crate::plugins::user::{UserPlugins, Yarn};

/// Arguments for `spoke plugins:install`.
#[derive(Parser, Debug)]
pub struct InstallArgs {
    /// Plugin to install, optionally pinned: `NAME` or `NAME@TAG`.
    #[arg(value_name = "NAME")]
    pub spec: String,
}

/// Arguments for `spoke plugins:link`.
#[derive(Parser, Debug)]
pub struct LinkArgs {
    /// Local plugin directory to link.
    #[arg(value_name = "PATH")]
    pub path: PathBuf,
}

/// Arguments for `spoke plugins:uninstall`.
#[derive(Parser, Debug)]
pub struct UninstallArgs {
    /// Installed plugin to remove.
    #[arg(value_name = "NAME")]
    pub name: String,
}

/// Split `NAME[@TAG]` into name and tag, keeping scoped names
/// (`@org/name`) intact.
pub(crate) fn split_spec(spec: &str) -> (&str, &str) {
    if spec.len() < 2 {
        return (spec, "latest");
    }
    match spec[1..].rfind('@') {
        Some(idx) => (&spec[..idx + 1], &spec[idx + 2..]),
        None => (spec, "latest"),
    }
}

pub fn list(ctx: &CommandContext<'_>) -> Result<()> {
    let provider = UserProvider::new(ctx.paths);
    let cache = ManifestCache::load(&ctx.paths.user_plugins_manifest);

    let mut any = false;
    for name in provider.installed() {
        any = true;
        match cache.get(&name) {
            Some(entry) => println!("{name} {}", entry.meta.version),
            None => println!("{name}"),
        }
    }
    for root in cache.linked() {
        any = true;
        match probe_plugin(root) {
            Ok(meta) => println!("{} {} (link: {})", meta.name, meta.version, root.display()),
            Err(_) => println!("{} (broken link)", root.display()),
        }
    }
    if !any {
        println!("no plugins installed");
    }
    Ok(())
}

pub fn install(ctx: &CommandContext<'_>, args: InstallArgs) -> Result<()> {
    let (name, tag) = split_spec(&args.spec);
    let yarn = Yarn;
    let plugins = UserPlugins::new(ctx.paths, &yarn);
    plugins
        .install(name, tag)
        .with_context(|| format!("failed to install {name}"))?;
    println!("{}", format!("installed {name}@{tag}").green());
    Ok(())
}

pub fn link(ctx: &CommandContext<'_>, args: LinkArgs) -> Result<()> {
    let yarn = Yarn;
    let plugins = UserPlugins::new(ctx.paths, &yarn);
    plugins.link(&args.path)?;
    println!("{}", format!("linked {}", args.path.display()).green());
    Ok(())
}

pub fn uninstall(ctx: &CommandContext<'_>, args: UninstallArgs) -> Result<()> {
    let yarn = Yarn;
    let plugins = UserPlugins::new(ctx.paths, &yarn);

    // `plugins:uninstall PATH` on a linked checkout just unlinks it.
    let as_path = PathBuf::from(&args.name);
    if as_path.exists() && plugins.unlink(&as_path)? {
        println!("{}", format!("unlinked {}", args.name).green());
        return Ok(());
    }

    plugins
        .remove(&args.name)
        .with_context(|| format!("failed to uninstall {}", args.name))?;
    println!("{}", format!("uninstalled {}", args.name).green());
    Ok(())
}

pub fn update(ctx: &CommandContext<'_>) -> Result<()> {
    let yarn = Yarn;
    let plugins = UserPlugins::new(ctx.paths, &yarn);
    plugins.update()?;
    println!("{}", "plugins updated".green());
    Ok(())
}
