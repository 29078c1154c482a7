//! Streamed extraction of release archives.
//!
//! Release archives are gzipped tarballs whose integrity is attested by
//! the manifest's `sha256gz`, the SHA-256 of the *compressed* bytes. The
//! extractor verifies and unpacks in a single pass: the archive is never
//! buffered whole in memory and never written to disk in compressed form.
//!
//! # Pipeline
//!
//! ```text
//! download stream ──┬── SHA-256 hasher (async side)
//!                   └── channel ── gzip decode ── tar unpack (blocking task)
//! ```
//!
//! 1. Each downloaded chunk is hashed, then forwarded over a bounded
//!    channel to a blocking task
//! 2. The blocking task adapts the channel into a [`std::io::Read`],
//!    feeds it through a gzip decoder, and unpacks tar entries into the
//!    destination
//! 3. When the stream ends, success requires BOTH the tar reader
//!    finishing cleanly AND the final digest equaling the expected value
//!
//! The hasher keeps draining even after the tar reader stops consuming:
//! tar quits at its end-of-archive marker, before the gzip trailer, while
//! the digest covers every byte of the download.
//!
//! # Entry Policy
//!
//! - **Regular files, directories**: extracted (with path-traversal
//!   protection via `unpack_in`)
//! - **Symlinks**: ignored, not an error - symlink semantics are not
//!   portable to Windows, and release trees do not rely on them
//! - **Anything else** (hard links, devices, FIFOs): fatal
//!   [`SpokeError::UnknownEntryType`]
//!
//! # Failure Cleanup
//!
//! On any failure - transport error, gzip corruption, a forbidden entry,
//! or a digest mismatch - the partially-extracted staging directory is
//! removed before the error surfaces, so a failed download can never
//! leave a torn tree at the target path.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! # async fn example(response: reqwest::Response) -> anyhow::Result<()> {
//! let staging = Path::new("/data/client/spoke-v1.3.0-linux-x86_64");
//! let stream = Box::pin(response.bytes_stream());
//! spoke::extract::extract_tar_gz(
//!     stream,
//!     Path::new("/data/client"),
//!     "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08",
//!     staging,
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bytes::{Buf, Bytes};
use futures::StreamExt;
use sha2::{Digest, Sha256};
use tar::EntryType;
use tracing::debug;

use crate::core::SpokeError;

/// Extract a gzipped tarball from `stream` into `dest`.
///
/// # Parameters
///
/// * `stream` - the downloaded byte stream (chunks of the compressed
///   archive, in order)
/// * `dest` - directory the tar entries are unpacked beneath; created if
///   missing
/// * `expected_sha256` - lowercase or uppercase hex digest the compressed
///   bytes must hash to
/// * `cleanup` - the directory removed on failure; the updater passes the
///   staging directory the archive is expected to produce
///   (`clientRoot/<base>`), while tests usually pass `dest` itself
///
/// # Errors
///
/// - a transport error from the stream itself
/// - gzip or tar corruption
/// - [`SpokeError::UnknownEntryType`] for an entry that is neither a
///   file, a directory, nor a symlink
/// - [`SpokeError::ChecksumMismatch`] when the streamed bytes do not
///   hash to `expected_sha256`
///
/// In every error case `cleanup` has already been removed by the time
/// the error is returned.
pub async fn extract_tar_gz<S, E>(
    stream: S,
    dest: &Path,
    expected_sha256: &str,
    cleanup: &Path,
) -> Result<()>
where
    S: futures::Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    match run_pipeline(stream, dest, expected_sha256).await {
        Ok(()) => Ok(()),
        Err(err) => {
            match std::fs::remove_dir_all(cleanup) {
                Ok(()) => debug!("removed partial extraction at {}", cleanup.display()),
                Err(remove_err) if remove_err.kind() == std::io::ErrorKind::NotFound => {}
                Err(remove_err) => {
                    debug!(
                        "could not clean up {}: {remove_err}",
                        cleanup.display()
                    );
                }
            }
            Err(err)
        }
    }
}

async fn run_pipeline<S, E>(mut stream: S, dest: &Path, expected_sha256: &str) -> Result<()>
where
    S: futures::Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    std::fs::create_dir_all(dest)
        .with_context(|| format!("failed to create {}", dest.display()))?;

    let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(32);
    let target: PathBuf = dest.to_path_buf();
    let untar = tokio::task::spawn_blocking(move || untar_entries(rx, &target));

    // The digest covers the entire compressed stream, so hashing must
    // continue even after the tar reader has stopped consuming (it quits
    // at the end-of-archive marker, before any gzip trailer bytes).
    let mut hasher = Sha256::new();
    let mut sender = Some(tx);
    let mut stream_error: Option<anyhow::Error> = None;
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => {
                hasher.update(&chunk);
                if let Some(tx) = &sender {
                    if tx.send(chunk).await.is_err() {
                        // Extractor bailed; its error is reported after
                        // join. Keep draining so the digest stays whole.
                        sender = None;
                    }
                }
            }
            Err(err) => {
                stream_error =
                    Some(anyhow::Error::new(err).context("error while reading download stream"));
                break;
            }
        }
    }
    drop(sender);

    let untar_result = untar.await.context("extractor task panicked")?;
    if let Some(err) = stream_error {
        return Err(err);
    }
    untar_result?;

    let actual = hex::encode(hasher.finalize());
    if !actual.eq_ignore_ascii_case(expected_sha256) {
        return Err(SpokeError::ChecksumMismatch {
            actual,
            expected: expected_sha256.to_string(),
        }
        .into());
    }
    Ok(())
}

fn untar_entries(rx: tokio::sync::mpsc::Receiver<Bytes>, dest: &Path) -> Result<()> {
    let reader = ChannelReader {
        rx,
        current: Bytes::new(),
    };
    let gz = flate2::read::GzDecoder::new(reader);
    let mut archive = tar::Archive::new(gz);
    archive.set_preserve_permissions(true);

    for entry in archive.entries().context("failed to open archive")? {
        let mut entry = entry.context("failed to read archive entry")?;
        let kind = entry.header().entry_type();
        match kind {
            EntryType::Regular | EntryType::Directory => {
                let shown = entry.path().map(|p| p.display().to_string()).ok();
                entry.unpack_in(dest).with_context(|| {
                    format!(
                        "failed to extract {} into {}",
                        shown.as_deref().unwrap_or("<entry>"),
                        dest.display()
                    )
                })?;
            }
            EntryType::Symlink => {
                debug!("ignoring symlink entry {:?}", entry.path().ok());
            }
            other => {
                return Err(SpokeError::UnknownEntryType(format!("{other:?}")).into());
            }
        }
    }
    Ok(())
}

/// Adapts the async channel of downloaded chunks into a blocking reader
/// for the gzip decoder.
struct ChannelReader {
    rx: tokio::sync::mpsc::Receiver<Bytes>,
    current: Bytes,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        while self.current.is_empty() {
            match self.rx.blocking_recv() {
                Some(chunk) => self.current = chunk,
                None => return Ok(0),
            }
        }
        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current[..n]);
        self.current.advance(n);
        Ok(n)
    }
}
