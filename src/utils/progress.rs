//! Download progress reporting.
//!
//! Progress is drawn to stderr and throttled to at most
//! [`crate::PROGRESS_MAX_HZ`] redraws per second so background-heavy
//! terminals are not flooded. Progress is disabled when stderr is not a
//! terminal or `SPOKE_NO_PROGRESS` is set, in which case a hidden bar is
//! returned and all updates become no-ops.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::PROGRESS_MAX_HZ;

/// Whether progress bars should be drawn at all.
pub fn enabled() -> bool {
    use std::io::IsTerminal;
    std::env::var_os("SPOKE_NO_PROGRESS").is_none() && std::io::stderr().is_terminal()
}

/// A byte-progress bar for a download of `len` bytes (unknown lengths get
/// a spinner-style bar).
pub fn download_bar(message: String, len: Option<u64>) -> ProgressBar {
    if !enabled() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::with_draw_target(len, ProgressDrawTarget::stderr_with_hz(PROGRESS_MAX_HZ));
    let style = match len {
        Some(_) => ProgressStyle::with_template(
            "{msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar()),
        None => ProgressStyle::with_template("{msg} {bytes} ({bytes_per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    };
    bar.set_style(style.progress_chars("=> "));
    bar.set_message(message);
    bar
}
