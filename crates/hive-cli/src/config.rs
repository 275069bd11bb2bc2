// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Hive project configuration.
//!
//! Configuration is loaded from `hive.toml` in the application directory.
//! Every section is optional.
//!
//! # Example Configuration
//!
//! ```toml
//! [project]
//! name = "blog"
//!
//! [watch]
//! extensions = [".go", ".tpl"]
//! exclude = ["tmp"]
//! others = ["$GOPATH/src/example.com/shared"]
//! ignore = ["_gen\\.go$"]
//!
//! [build]
//! tags = "netgo"
//! main = ["main.go"]
//! generate_docs = true
//!
//! [run]
//! args = ["-port", "8080"]
//! envs = ["DB_HOST=localhost"]
//! runmode = "dev"
//!
//! [reload]
//! enabled = true
//! address = "127.0.0.1:12450"
//!
//! [notify]
//! enabled = true
//! ```

use hive::reload::DEFAULT_RELOAD_ADDR;
use hive::watcher::{default_extensions, default_static_extensions};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Name of the configuration file.
pub const CONFIG_FILE: &str = "hive.toml";

/// Main configuration structure loaded from `hive.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Project metadata.
    #[serde(default)]
    pub project: ProjectConfig,
    /// What to watch.
    #[serde(default)]
    pub watch: WatchConfig,
    /// How to build.
    #[serde(default)]
    pub build: BuildConfig,
    /// How to run the built application.
    #[serde(default)]
    pub run: RunConfig,
    /// Browser live reload.
    #[serde(default)]
    pub reload: ReloadConfig,
    /// Desktop notifications.
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Project metadata configuration.
#[derive(Debug, Default, Deserialize)]
pub struct ProjectConfig {
    /// Application name (default: the directory name).
    pub name: Option<String>,
}

/// Watch configuration.
#[derive(Debug, Deserialize)]
pub struct WatchConfig {
    /// Source extensions that trigger a rebuild (default: [".go"]).
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Static asset extensions that trigger a browser reload.
    #[serde(default = "default_static_extensions")]
    pub static_extensions: Vec<String>,
    /// Paths never watched, relative to the application directory.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Extra directories always watched; `$GOPATH` is expanded.
    #[serde(default)]
    pub others: Vec<String>,
    /// Watch `vendor` directories.
    #[serde(default)]
    pub vendor: bool,
    /// Extra ignore regexes.
    #[serde(default)]
    pub ignore: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            static_extensions: default_static_extensions(),
            exclude: Vec::new(),
            others: Vec::new(),
            vendor: false,
            ignore: Vec::new(),
        }
    }
}

/// Build configuration.
#[derive(Debug, Deserialize)]
pub struct BuildConfig {
    /// Run `go install -v` before each build.
    #[serde(default)]
    pub go_install: bool,
    /// Build tags.
    #[serde(default)]
    pub tags: String,
    /// Entrypoint files (default: the whole package).
    #[serde(default)]
    pub main: Vec<String>,
    /// Extra compiler arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Regenerate API docs before each build.
    #[serde(default)]
    pub generate_docs: bool,
    /// Download the Swagger UI when missing.
    #[serde(default)]
    pub download_docs: bool,
    /// Docs generator command line (default: ["swag", "init"]).
    #[serde(default = "default_docs_command")]
    pub docs_command: Vec<String>,
}

fn default_docs_command() -> Vec<String> {
    vec!["swag".to_string(), "init".to_string()]
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            go_install: false,
            tags: String::new(),
            main: Vec::new(),
            args: Vec::new(),
            generate_docs: false,
            download_docs: false,
            docs_command: default_docs_command(),
        }
    }
}

/// Run configuration.
#[derive(Debug, Default, Deserialize)]
pub struct RunConfig {
    /// Arguments passed to the application.
    #[serde(default)]
    pub args: Vec<String>,
    /// `KEY=VALUE` environment entries for the application.
    #[serde(default)]
    pub envs: Vec<String>,
    /// Value exported as `HIVE_RUNMODE`.
    #[serde(default)]
    pub runmode: String,
}

/// Live reload configuration.
#[derive(Debug, Deserialize)]
pub struct ReloadConfig {
    /// Serve the reload endpoint.
    #[serde(default)]
    pub enabled: bool,
    /// Address of the reload endpoint (default: "127.0.0.1:12450").
    #[serde(default = "default_reload_address")]
    pub address: String,
}

fn default_reload_address() -> String {
    DEFAULT_RELOAD_ADDR.to_string()
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_reload_address(),
        }
    }
}

/// Desktop notification configuration.
#[derive(Debug, Default, Deserialize)]
pub struct NotifyConfig {
    /// Post a notification when a build fails.
    #[serde(default)]
    pub enabled: bool,
}

impl Config {
    /// Loads configuration from `path`, or defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("invalid {}: {}", path.display(), e))?;
        Ok(config)
    }
}
