//! The `help` command.

use anyhow::Result;
use clap::Parser;

use super::CommandContext;
use crate::help::HelpRenderer;

/// Arguments for `spoke help`.
#[derive(Parser, Debug)]
pub struct HelpArgs {
    /// Topic or command to describe; empty for the overview.
    #[arg(value_name = "SUBJECT")]
    pub subject: Option<String>,

    /// Include hidden commands in topic listings.
    #[arg(long)]
    pub all: bool,
}

pub fn execute(ctx: &CommandContext<'_>, args: HelpArgs) -> Result<()> {
    let renderer = HelpRenderer::new(ctx.config, ctx.manager);
    let out = renderer.render(args.subject.as_deref(), args.all)?;
    print!("{out}");
    Ok(())
}
