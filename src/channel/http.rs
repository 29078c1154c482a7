//! HTTP access to the release host.
//!
//! One [`ChannelClient`] serves all three remote resources: channel
//! manifests, version documents, and release archives.
//!
//! # Request Policy
//!
//! - **Identity**: every request carries the CLI's user-agent string
//!   (`<name>/<version> (<platform>-<arch>)`)
//! - **Status mapping**: HTTP 403 on a channel resource becomes
//!   [`SpokeError::InvalidChannel`], because that is how the release
//!   host signals a channel that does not exist; all other non-2xx
//!   statuses become [`SpokeError::NetworkError`] with the status code
//! - **Retry**: the manifest fetch retries exactly once per process on a
//!   transport error (guarded by an atomic flag); HTTP errors are never
//!   retried
//!
//! # Version Caching
//!
//! [`ChannelClient::fetch_version`] consults the cached copy at
//! `versionFile(channel)` first unless forced. Missing files and parse
//! errors count as cache misses and fall through to the remote; the
//! fetched document is then written back best-effort (write failures are
//! swallowed at debug level). A permission error reading the cache is a
//! real failure and propagates.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::{ChannelVersion, Manifest};
use crate::config::Config;
use crate::core::SpokeError;
use crate::paths::Paths;

/// Client for channel manifests, version files, and release archives.
pub struct ChannelClient {
    config: Config,
    paths: Paths,
    http: reqwest::Client,
    manifest_retried: AtomicBool,
}

impl ChannelClient {
    pub fn new(config: &Config, paths: &Paths) -> Self {
        Self {
            http: reqwest::Client::new(),
            config: config.clone(),
            paths: paths.clone(),
            manifest_retried: AtomicBool::new(false),
        }
    }

    fn channel_url(&self, channel: &str, file: &str) -> String {
        format!(
            "{}/{}/channels/{}/{}",
            self.config.host, self.config.name, channel, file
        )
    }

    /// URL of the release archive for `base` on `channel`.
    pub fn build_url(&self, channel: &str, base: &str) -> String {
        self.channel_url(channel, &format!("{base}.tar.gz"))
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        self.http
            .get(url)
            .header("User-Agent", self.config.user_agent())
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))
    }

    fn check_status(url: &str, channel: &str, response: &reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.as_u16() == 403 {
            return Err(SpokeError::InvalidChannel(channel.to_string()).into());
        }
        if !status.is_success() {
            return Err(SpokeError::NetworkError {
                status: status.as_u16(),
                url: url.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Fetch the manifest for this platform on `channel`.
    ///
    /// Transport errors are retried exactly once per process; HTTP errors
    /// are never retried.
    ///
    /// # Errors
    ///
    /// - [`SpokeError::InvalidChannel`] on HTTP 403 (no such channel)
    /// - [`SpokeError::NetworkError`] on any other non-2xx status
    /// - a transport error when the retry also fails, or a parse error
    ///   when the body is not valid manifest JSON
    pub async fn fetch_manifest(&self, channel: &str) -> Result<Manifest> {
        let url = self.channel_url(channel, &format!("{}-{}", self.config.platform, self.config.arch));
        debug!("fetching manifest from {url}");

        let response = match self.get(&url).await {
            Ok(response) => response,
            Err(err) => {
                if self.manifest_retried.swap(true, Ordering::SeqCst) {
                    return Err(err);
                }
                warn!("manifest fetch failed, retrying once: {err:#}");
                self.get(&url).await?
            }
        };
        Self::check_status(&url, channel, &response)?;
        response
            .json::<Manifest>()
            .await
            .with_context(|| format!("invalid manifest JSON from {url}"))
    }

    /// Fetch the version document for `channel`.
    ///
    /// Unless `force` is set, the cached copy at `versionFile(channel)` is
    /// consulted first; on a cache miss or parse error the remote is
    /// queried and the cache is rewritten best-effort (write failures are
    /// swallowed).
    ///
    /// # Parameters
    ///
    /// * `channel` - the release track to query
    /// * `force` - bypass the cache and always hit the remote (used by
    ///   explicit update commands; the passive warning path allows the
    ///   cache)
    ///
    /// # Errors
    ///
    /// Status and transport errors as for [`fetch_manifest`]
    /// (without the retry), plus a filesystem error when the cache file
    /// exists but cannot be read for permission reasons.
    ///
    /// [`fetch_manifest`]: Self::fetch_manifest
    pub async fn fetch_version(&self, channel: &str, force: bool) -> Result<ChannelVersion> {
        let cache_path = self.paths.version_file(channel);
        if !force {
            if let Some(cached) = read_cached_version(&cache_path)? {
                return Ok(cached);
            }
        }

        let url = self.channel_url(channel, "version");
        debug!("fetching version from {url}");
        let response = self.get(&url).await?;
        Self::check_status(&url, channel, &response)?;
        let version: ChannelVersion = response
            .json()
            .await
            .with_context(|| format!("invalid version JSON from {url}"))?;

        if let Err(err) = write_cached_version(&cache_path, &version) {
            debug!("could not cache version file {}: {err:#}", cache_path.display());
        }
        Ok(version)
    }

    /// Open the release archive for streaming.
    ///
    /// # Returns
    ///
    /// The response handle (consume its byte stream to download) plus the
    /// declared content length, when the server sent one, for progress
    /// reporting. Nothing is buffered here; the body is read by the
    /// extractor as it decompresses.
    pub async fn stream_build(
        &self,
        channel: &str,
        base: &str,
    ) -> Result<(reqwest::Response, Option<u64>)> {
        let url = self.build_url(channel, base);
        debug!("downloading {url}");
        let response = self.get(&url).await?;
        Self::check_status(&url, channel, &response)?;
        let length = response.content_length();
        Ok((response, length))
    }
}

/// Read the cached version file. Missing files and parse errors are cache
/// misses; a permission error is a real failure and propagates.
fn read_cached_version(path: &Path) -> Result<Option<ChannelVersion>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(SpokeError::FileSystemError {
                path: path.to_path_buf(),
                source: err,
            }
            .into());
        }
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                debug!("could not read version cache {}: {err}", path.display());
            }
            return Ok(None);
        }
    };
    match serde_json::from_str(&raw) {
        Ok(version) => Ok(Some(version)),
        Err(err) => {
            debug!("stale version cache {}: {err}", path.display());
            Ok(None)
        }
    }
}

fn write_cached_version(path: &Path, version: &ChannelVersion) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let raw = serde_json::to_string_pretty(version)?;
    std::fs::write(path, raw)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn config_with_cache(cache: PathBuf) -> Config {
        Config {
            bin: "spoke".into(),
            name: "spoke".into(),
            version: semver::Version::parse("1.2.3").unwrap(),
            channel: "stable".into(),
            platform: "linux".into(),
            arch: "x86_64".into(),
            windows: false,
            data_dir: cache.join("data"),
            cache_dir: cache,
            update_disabled: None,
            host: "https://releases.example.test".into(),
            default_command: None,
            aliases: HashMap::new(),
        }
    }

    #[test]
    fn urls_follow_channel_layout() {
        let dir = TempDir::new().unwrap();
        let config = config_with_cache(dir.path().to_path_buf());
        let paths = Paths::new(&config);
        let client = ChannelClient::new(&config, &paths);

        assert_eq!(
            client.channel_url("stable", "version"),
            "https://releases.example.test/spoke/channels/stable/version"
        );
        assert_eq!(
            client.build_url("beta", "spoke-v1.3.0-linux-x86_64"),
            "https://releases.example.test/spoke/channels/beta/spoke-v1.3.0-linux-x86_64.tar.gz"
        );
    }

    #[tokio::test]
    async fn fetch_version_prefers_fresh_cache() {
        let dir = TempDir::new().unwrap();
        let config = config_with_cache(dir.path().to_path_buf());
        let paths = Paths::new(&config);
        let client = ChannelClient::new(&config, &paths);

        let cached = ChannelVersion {
            version: semver::Version::parse("1.4.0").unwrap(),
            channel: "stable".into(),
            message: Some("hello".into()),
            extra: serde_json::Map::new(),
        };
        write_cached_version(&paths.version_file("stable"), &cached).unwrap();

        // The host is unreachable, so success proves the cache was used.
        let version = client.fetch_version("stable", false).await.unwrap();
        assert_eq!(version, cached);
    }

    #[tokio::test]
    async fn fetch_version_force_bypasses_cache() {
        let dir = TempDir::new().unwrap();
        let config = config_with_cache(dir.path().to_path_buf());
        let paths = Paths::new(&config);
        let client = ChannelClient::new(&config, &paths);

        let cached = ChannelVersion {
            version: semver::Version::parse("1.4.0").unwrap(),
            channel: "stable".into(),
            message: None,
            extra: serde_json::Map::new(),
        };
        write_cached_version(&paths.version_file("stable"), &cached).unwrap();

        // Forced fetch must hit the (unreachable) remote and fail.
        assert!(client.fetch_version("stable", true).await.is_err());
    }

    #[test]
    fn corrupt_cache_reads_as_miss() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stable.version");
        std::fs::write(&path, "not json").unwrap();
        assert!(read_cached_version(&path).unwrap().is_none());
    }
}
