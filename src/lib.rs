//! spoke - multi-topic CLI with a self-updating core
//!
//! This crate implements the engine behind the `spoke` binary: a command-line
//! tool distributed as a single native binary that keeps itself up to date
//! from a remote release channel and dispatches commands contributed by
//! multiple plugin providers.
//!
//! # Architecture Overview
//!
//! Three subsystems share a common locking discipline, filesystem layout,
//! and manifest/version model:
//!
//! - **Self-update**: atomically replace the installed CLI tree with a newer
//!   release fetched from a channel, safely and concurrently with other CLI
//!   invocations ([`update`]).
//! - **Background autoupdate**: decide when to check for updates, spawn a
//!   detached updater, and debounce repeated attempts across concurrent
//!   invocations ([`update::autoupdate`]).
//! - **Plugin lifecycle and dispatch**: install, link, update, and uninstall
//!   command bundles; merge commands and topics from builtin, linked, and
//!   user providers; resolve argv to a runnable command ([`plugins`],
//!   [`dispatch`]).
//!
//! # Core Modules
//!
//! - [`config`] - The [`config::Config`] value threaded through constructors
//! - [`paths`] - Per-user cache, data, plugin, and lockfile paths
//! - [`lock`] - Advisory reader/writer file locks with own-PID re-entry
//! - [`channel`] - Release channel manifests, versions, and HTTP access
//! - [`extract`] - Streamed tar.gz extraction with SHA-256 verification
//! - [`update`] - The updater and the background autoupdater
//! - [`plugins`] - Providers, the merged catalog, and user plugin ops
//! - [`dispatch`] - argv resolution with aliases and help precedence
//! - [`help`] - Topic and command help rendering
//! - [`cli`] - Builtin command implementations
//!
//! # Filesystem Layout
//!
//! ```text
//! <cacheDir>/
//!   autoupdate               (mtime = last autoupdate attempt)
//!   autoupdate.log           (timestamped spawn log)
//!   update.lock              (reader/writer lock file)
//!   plugins.lock
//!   error.log
//!   <channel>.version        (cached Version JSON)
//! <dataDir>/
//!   client/
//!     bin/<binName>          (symlink, .cmd shim on Windows)
//!     <version>/bin/<binName>
//!   plugins/
//!     package.json
//!     .yarnrc
//!     node_modules/<plugin>/...
//! ```

pub mod channel;
pub mod cli;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod extract;
pub mod help;
pub mod lock;
pub mod paths;
pub mod plugins;
pub mod update;
pub mod utils;

mod constants;

pub use constants::*;
