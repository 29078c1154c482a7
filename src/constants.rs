//! Timing and retention constants shared across modules.
//!
//! Defining these centrally keeps the magic numbers of the update
//! lifecycle discoverable and consistent between the updater, the
//! autoupdater, and their tests.

use std::time::Duration;

/// How long after the last attempt an autoupdate check becomes due.
pub const AUTOUPDATE_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60 * 60);

/// Minimum spacing between two autoupdate attempts.
///
/// The detached `update --autoupdate` child waits out the remainder of
/// this window before proceeding, so a storm of shells starting at once
/// produces at most one update per window.
pub const AUTOUPDATE_DEBOUNCE_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Poll interval of the debounce loop.
pub const DEBOUNCE_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Age past which a non-current release tree is removed by tidy.
pub const RELEASE_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Maximum number of lines retained in the error log after an update.
pub const ERRLOG_MAX_LINES: usize = 1000;

/// Upper bound on progress bar redraws per second during downloads.
pub const PROGRESS_MAX_HZ: u8 = 2;

/// How long the final stdout flush may take before the process exits anyway.
pub const STDOUT_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);
