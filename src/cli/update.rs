//! The `update` command.

use anyhow::Result;
use clap::Parser;
use tracing::warn;

use super::CommandContext;
use crate::plugins::user::{UserPlugins, Yarn};
use crate::update::autoupdate::Autoupdater;
use crate::update::Updater;
use crate::utils::fs as fsutil;

/// Arguments for `spoke update`.
///
/// # Modes
///
/// - **Manual** (`spoke update`, `spoke update beta`): runs the full
///   update against the given channel, failing loudly on any error, then
///   upgrades user plugins best-effort.
/// - **Background** (`spoke update --autoupdate`): the detached child
///   spawned by the autoupdater. Waits out the debounce window, touches
///   the attempt marker, samples the rollout priority, and demotes every
///   failure to a warning - a background check must never report failure
///   to the shell that indirectly spawned it.
#[derive(Parser, Debug)]
pub struct UpdateArgs {
    /// Release channel to update against (defaults to the built-in one).
    ///
    /// Channels are disjoint release tracks on the remote; switching
    /// channel installs that channel's current version even when the
    /// version number itself is unchanged.
    #[arg(value_name = "CHANNEL")]
    pub channel: Option<String>,

    /// Background mode: debounce against sibling attempts and demote all
    /// errors to warnings. Set by the spawned autoupdater, not by hand.
    #[arg(long)]
    pub autoupdate: bool,
}

pub async fn execute(ctx: &CommandContext<'_>, args: UpdateArgs) -> Result<()> {
    let updater = Updater::new(ctx.config, ctx.paths);

    if args.autoupdate {
        // Wait out the debounce window, then mark this attempt before any
        // decision is made, so racing siblings skip.
        let autoupdater = Autoupdater::new(ctx.config, ctx.paths);
        autoupdater.debounce().await;
        if let Err(err) = fsutil::touch(&ctx.paths.autoupdate_file) {
            warn!("could not touch autoupdate marker: {err:#}");
        }

        if let Err(err) = updater.run(args.channel.as_deref(), true).await {
            warn!("autoupdate failed: {err:#}");
        }
        update_plugins(ctx);
        return Ok(());
    }

    updater.run(args.channel.as_deref(), false).await?;
    update_plugins(ctx);
    Ok(())
}

/// Upgrade user plugins after a CLI update. Failures here must not fail
/// the update that already succeeded.
fn update_plugins(ctx: &CommandContext<'_>) {
    let yarn = Yarn;
    let plugins = UserPlugins::new(ctx.paths, &yarn);
    if let Err(err) = plugins.update() {
        warn!("plugin update failed: {err:#}");
    }
}
