// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Error types for the hive run loop.
//!
//! Only failures that happen while the run loop is being set up surface as
//! [`HiveError`]. Everything that goes wrong once the loop is running (a
//! compile error, a client that drops its socket, a child that already
//! exited) is logged where it happens and never propagates to sibling tasks.
//!
//! # Error Categories
//!
//! - **Watch errors**: the OS notification mechanism could not be created,
//!   a directory could not be registered, or an ignore pattern is invalid
//! - **Process errors**: the artifact could not be spawned or signalled
//! - **Reload errors**: the live-reload endpoint could not bind its address
//! - **Docs errors**: the swagger UI archive could not be fetched or unpacked

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the run loop.
#[derive(Error, Debug)]
pub enum HiveError {
    /// The filesystem notification mechanism failed.
    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// A directory could not be registered as a watch root.
    #[error("Failed to watch directory '{}': {source}", path.display())]
    WatchRoot {
        /// Directory that was being registered.
        path: PathBuf,
        /// Underlying notify error.
        source: notify::Error,
    },

    /// A configured ignore pattern is not a valid regular expression.
    #[error("Invalid ignore pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Plain I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A child process could not be launched.
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        /// Program that was being launched.
        program: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Delivering a signal to the running child failed.
    #[error("Failed to signal process {pid}: {message}")]
    Signal {
        /// Process id of the child.
        pid: u32,
        /// OS error description.
        message: String,
    },

    /// The live-reload server could not bind its address.
    #[error("Failed to start the reload server on {addr}: {source}")]
    ReloadServer {
        /// Address the server tried to bind.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Downloading a remote asset failed.
    #[error("Failed to download '{url}': {message}")]
    Download {
        /// URL being downloaded.
        url: String,
        /// Failure description.
        message: String,
    },

    /// A downloaded archive could not be unpacked.
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// Result type alias for run loop operations.
pub type Result<T> = std::result::Result<T, HiveError>;
