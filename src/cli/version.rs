//! The `version` command: prints the user-agent string.

use anyhow::Result;

use super::CommandContext;

pub fn execute(ctx: &CommandContext<'_>) -> Result<()> {
    println!("{}", ctx.config.user_agent());
    Ok(())
}
