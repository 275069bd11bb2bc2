// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]

//! The hive development run loop.
//!
//! Watches a Go web application's source tree, rebuilds it when sources
//! change, restarts the resulting binary and tells connected browsers to
//! reload.
//!
//! # Architecture
//!
//! ```text
//! filesystem --> ChangeWatcher --(source, debounced)--> BuildTrigger --> ProcessSupervisor
//!                     |                                      |
//!                     +--(static asset)--> Broker <--(built)-+
//!                                            |
//!                                      WebSocket clients
//! ```
//!
//! - [`process::ProcessSupervisor`] owns the single running child.
//! - [`build::BuildTrigger`] serializes compile-and-restart cycles.
//! - [`watcher::ChangeWatcher`] filters, deduplicates and debounces events.
//! - [`reload::Broker`] fans reload notifications out to browsers.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hive::build::{BuildTrigger, GoToolchain};
//! use hive::notifier::Notifier;
//! use hive::process::{ProcessSupervisor, RunSpec};
//!
//! # async fn example() -> hive::Result<()> {
//! let app_dir = std::env::current_dir()?;
//! let supervisor = Arc::new(ProcessSupervisor::new(RunSpec::new(&app_dir)));
//! let toolchain = GoToolchain::new(&app_dir);
//! let trigger = BuildTrigger::new(toolchain, supervisor, Notifier::disabled(), "app");
//! trigger.auto_build(&[], false).await;
//! # Ok(())
//! # }
//! ```

/// Serialized compile-and-restart cycles.
pub mod build;
/// Error types.
pub mod error;
/// Desktop notifications for build failures.
pub mod notifier;
/// Lifecycle of the built application process.
pub mod process;
/// WebSocket live-reload broker.
pub mod reload;
/// Swagger UI asset download.
pub mod swagger;
/// Filesystem change watching and debouncing.
pub mod watcher;

pub use error::{HiveError, Result};
