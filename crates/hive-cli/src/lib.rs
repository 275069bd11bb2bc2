// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]

//! Hive CLI library.
//!
//! This crate provides the command-line interface for the hive run loop.
//!
//! # Features
//!
//! - **Rebuild on change** for Go sources, debounced
//! - **Restart** of the built binary with graceful shutdown
//! - **Live reload** of connected browsers over WebSocket
//! - **Desktop notifications** for failed builds
//!
//! # Usage
//!
//! This crate is primarily used through the `hive` binary:
//!
//! ```bash
//! hive run                      # Watch the current directory
//! hive run ./blog --reload      # Watch ./blog and reload browsers
//! hive run --runargs "-port 9000" --runmode dev
//! ```
//!
//! # Configuration
//!
//! Projects are configured via `hive.toml` in the application directory.

/// CLI commands.
pub mod commands;
/// Project configuration from `hive.toml`.
pub mod config;
