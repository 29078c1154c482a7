//! The hidden `debug` topic.

use anyhow::{Context, Result};

use super::CommandContext;

/// Stream the error log to stdout.
pub fn errlog(ctx: &CommandContext<'_>) -> Result<()> {
    let path = &ctx.paths.error_log_file;
    let mut file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to open {}", path.display()));
        }
    };
    std::io::copy(&mut file, &mut std::io::stdout())
        .with_context(|| format!("failed to stream {}", path.display()))?;
    Ok(())
}
