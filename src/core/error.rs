//! Error taxonomy for the update and plugin core.
//!
//! [`SpokeError`] enumerates the failure modes with a defined user-facing
//! policy; everything else travels as `anyhow::Error` with context added at
//! call sites. The taxonomy drives three decisions at the top level:
//!
//! - the process exit code ([`SpokeError::exit_code`]): command-not-found
//!   exits 127, every other failure exits 1;
//! - whether the failure may surface at all: on the autoupdate path all
//!   errors are demoted to warnings, because the user's primary command
//!   must not fail because a background check did;
//! - whether the failure is captured to the error log ([`is_unexpected`]):
//!   only opaque errors with no taxonomized variant in their chain are,
//!   so `debug:errlog` shows genuine crashes rather than routine
//!   user-visible failures.
//!
//! # Examples
//!
//! ```
//! use spoke::core::error::{exit_code, is_unexpected};
//! use spoke::core::SpokeError;
//!
//! let err = anyhow::Error::from(SpokeError::CommandNotFound {
//!     id: "updat".into(),
//!     suggestions: vec!["update".into()],
//! });
//! assert_eq!(exit_code(&err), 127);
//! assert!(!is_unexpected(&err));
//!
//! let opaque = anyhow::anyhow!("poll handle lost");
//! assert_eq!(exit_code(&opaque), 1);
//! assert!(is_unexpected(&opaque));
//! ```

use std::path::PathBuf;

use thiserror::Error;

/// Errors with defined user-facing behavior.
#[derive(Debug, Error)]
pub enum SpokeError {
    /// The remote returned 403 for a channel manifest, which the release
    /// host uses to signal that the channel does not exist.
    #[error("HTTP 403: Invalid channel {0}")]
    InvalidChannel(String),

    /// Any other non-2xx response from the release host.
    #[error("HTTP {status}: {url}")]
    NetworkError { status: u16, url: String },

    /// The downloaded archive did not hash to the manifest's digest.
    #[error("SHA mismatch: expected {actual} to be {expected}")]
    ChecksumMismatch { actual: String, expected: String },

    /// A tar entry of a type the extractor refuses to materialize.
    #[error("unknown entry type in archive: {0:?}")]
    UnknownEntryType(String),

    /// Filesystem failure with the offending path in the message.
    #[error("filesystem error at {path}: {source}")]
    FileSystemError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A plugin that does not expose a usable command set.
    #[error("{name} is not a valid plugin")]
    InvalidPlugin { name: String },

    /// A plugin whose metadata could not be loaded; reported as a warning
    /// during init and the plugin is omitted from the catalog.
    #[error("failed to load plugin {name}: {reason}")]
    PluginLoad { name: String, reason: String },

    /// argv named a command and topic that do not exist.
    #[error("{id} is not a spoke command")]
    CommandNotFound {
        id: String,
        suggestions: Vec<String>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Semver(#[from] semver::Error),
}

impl SpokeError {
    /// Process exit code policy for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::CommandNotFound { .. } => 127,
            _ => 1,
        }
    }
}

/// Find the [`SpokeError`] behind an `anyhow` chain, if any.
pub fn as_spoke_error(err: &anyhow::Error) -> Option<&SpokeError> {
    err.downcast_ref::<SpokeError>()
}

/// Exit code for an arbitrary error: taxonomy-aware when the chain contains
/// a [`SpokeError`], otherwise 1.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    as_spoke_error(err).map_or(1, SpokeError::exit_code)
}

/// True when the chain carries no taxonomized [`SpokeError`].
///
/// Only these opaque failures are the **Unexpected** class that gets
/// captured to the error log; taxonomized errors (invalid channel, SHA
/// mismatch, filesystem failures, ...) have their own surfacing policy
/// and stay out of it, so `debug:errlog` shows genuine crashes instead
/// of every mistyped channel name.
pub fn is_unexpected(err: &anyhow::Error) -> bool {
    as_spoke_error(err).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_exits_127_everything_else_1() {
        let not_found = SpokeError::CommandNotFound {
            id: "nope".into(),
            suggestions: vec![],
        };
        assert_eq!(not_found.exit_code(), 127);
        assert_eq!(SpokeError::InvalidChannel("foo".into()).exit_code(), 1);
    }

    #[test]
    fn exit_code_reads_through_anyhow_chains() {
        let err = anyhow::Error::from(SpokeError::CommandNotFound {
            id: "x".into(),
            suggestions: vec![],
        })
        .context("while dispatching");
        assert_eq!(exit_code(&err), 127);
        assert_eq!(exit_code(&anyhow::anyhow!("boom")), 1);
    }

    #[test]
    fn only_opaque_errors_are_unexpected() {
        let taxonomized = anyhow::Error::from(SpokeError::ChecksumMismatch {
            actual: "aa".into(),
            expected: "bb".into(),
        })
        .context("while updating");
        assert!(!is_unexpected(&taxonomized));
        assert!(is_unexpected(&anyhow::anyhow!("segfault adjacent")));
    }

    #[test]
    fn checksum_mismatch_message_format() {
        let err = SpokeError::ChecksumMismatch {
            actual: "aaaa".into(),
            expected: "bbbb".into(),
        };
        assert_eq!(err.to_string(), "SHA mismatch: expected aaaa to be bbbb");
    }

    #[test]
    fn invalid_channel_message_format() {
        assert_eq!(
            SpokeError::InvalidChannel("foo".into()).to_string(),
            "HTTP 403: Invalid channel foo"
        );
    }
}
