//! Release channel data model.
//!
//! A channel names a release track (stable, beta, ...); channels are
//! disjoint namespaces on the remote. Each channel publishes a small
//! version document next to a per-platform manifest describing one
//! downloadable release.
//!
//! # Remote Layout
//!
//! ```text
//! <host>/<name>/channels/<channel>/
//!   version                 (ChannelVersion JSON)
//!   <platform>-<arch>       (Manifest JSON; 403 means no such channel)
//!   <base>.tar.gz           (the release archive, verified by sha256gz)
//! ```
//!
//! # Cache Tolerance
//!
//! The version document is cached on disk between invocations. Newer
//! releases may add fields the running binary does not know about, so
//! [`ChannelVersion`] captures unknown fields and writes them back on
//! re-serialization instead of dropping them.

mod http;

pub use http::ChannelClient;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The lightweight "what is current" document for a channel.
///
/// The cached copy at `<cacheDir>/<channel>.version` must tolerate fields
/// added by newer releases, so unknown fields are captured and written
/// back on re-serialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelVersion {
    pub version: semver::Version,
    pub channel: String,
    /// Free-form announcement emitted verbatim when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One downloadable build inside a manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Build {
    pub url: String,
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
}

/// A manifest describes one release for one channel.
///
/// `sha256gz` is the SHA-256 of the gzipped tarball at the download URL
/// and gates the swap: an archive that does not hash to it is discarded.
/// The `builds` map (keyed `<os>-<arch>`) carries per-platform archive
/// locations when the channel publishes them; the platform-specific
/// manifest endpoint already selects for the requesting platform, so the
/// map is usually redundant there and defaults to empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub version: semver::Version,
    pub channel: String,
    pub sha256gz: String,
    /// Gradual-rollout knob (0..100): the fraction of autoupdate cycles
    /// held back. Manual updates ignore it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub builds: HashMap<String, Build>,
}

/// True iff the majors are equal and the remote minor is strictly greater.
///
/// This deliberately ignores major bumps: those are announced through the
/// channel `message`, not the automatic warning.
///
/// # Examples
///
/// ```
/// use semver::Version;
/// use spoke::channel::minor_version_greater;
///
/// let current = Version::parse("1.2.3").unwrap();
/// assert!(minor_version_greater(&current, &Version::parse("1.3.0").unwrap()));
/// assert!(!minor_version_greater(&current, &Version::parse("1.2.9").unwrap()));
/// assert!(!minor_version_greater(&current, &Version::parse("2.0.0").unwrap()));
/// ```
pub fn minor_version_greater(current: &semver::Version, remote: &semver::Version) -> bool {
    current.major == remote.major && remote.minor > current.minor
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn minor_version_greater_requires_equal_major() {
        assert!(minor_version_greater(&v("1.2.3"), &v("1.3.0")));
        assert!(!minor_version_greater(&v("1.2.3"), &v("1.2.9")));
        assert!(!minor_version_greater(&v("1.2.3"), &v("2.0.0")));
        assert!(!minor_version_greater(&v("1.3.0"), &v("1.2.9")));
    }

    #[test]
    fn version_roundtrip_preserves_unknown_fields() {
        let raw = r#"{"version":"1.2.3","channel":"stable","released_at":"2024-01-01"}"#;
        let parsed: ChannelVersion = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.version, v("1.2.3"));
        assert!(parsed.message.is_none());

        let rewritten = serde_json::to_string(&parsed).unwrap();
        let reparsed: ChannelVersion = serde_json::from_str(&rewritten).unwrap();
        assert_eq!(parsed, reparsed);
        assert_eq!(
            reparsed.extra.get("released_at").and_then(|v| v.as_str()),
            Some("2024-01-01")
        );
    }

    #[test]
    fn manifest_parses_with_and_without_priority() {
        let raw = r#"{
            "version": "1.3.0",
            "channel": "stable",
            "sha256gz": "abc123",
            "priority": 80,
            "builds": {
                "linux-x86_64": {"url": "https://x/y.tar.gz", "sha256": "abc123", "bytes": 1024}
            }
        }"#;
        let manifest: Manifest = serde_json::from_str(raw).unwrap();
        assert_eq!(manifest.priority, Some(80));
        assert_eq!(manifest.builds["linux-x86_64"].bytes, Some(1024));

        let bare = r#"{"version":"1.3.0","channel":"beta","sha256gz":"ff"}"#;
        let manifest: Manifest = serde_json::from_str(bare).unwrap();
        assert_eq!(manifest.priority, None);
        assert!(manifest.builds.is_empty());
    }
}
