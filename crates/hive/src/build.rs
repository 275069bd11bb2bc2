// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Serialized compile-and-restart cycles.
//!
//! [`BuildTrigger::auto_build`] runs the optional install step, the optional
//! docs step and the compile step under one lock, and restarts the
//! application through the [`ProcessSupervisor`] when the compile succeeds.
//! Callers that arrive while a build is running wait for it; nothing is
//! dropped at this layer.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::notifier::Notifier;
use crate::process::ProcessSupervisor;

/// Appends the platform executable suffix to an application name.
pub fn artifact_name(app_name: &str) -> String {
    if cfg!(target_os = "windows") && !app_name.ends_with(".exe") {
        format!("{}.exe", app_name)
    } else {
        app_name.to_string()
    }
}

/// Produces the commands a build cycle runs.
///
/// Each method returns a fully configured command; the trigger decides how
/// its output is handled.
pub trait Toolchain: Send + Sync + 'static {
    /// Dependency install step run before the compile when enabled.
    fn install_command(&self) -> Command;

    /// Documentation generation step.
    fn docs_command(&self) -> Command;

    /// Compile step producing `artifact` from the entrypoint `files`
    /// (the whole package when empty).
    fn build_command(&self, artifact: &str, files: &[String]) -> Command;
}

/// The Go toolchain.
///
/// All steps inherit the current environment, so `GOOS`/`GOARCH` overrides
/// reach the compiler, and run with `GOGC=off` for faster builds.
#[derive(Debug, Clone)]
pub struct GoToolchain {
    go: String,
    working_dir: PathBuf,
    tags: String,
    extra_args: Vec<String>,
    docs_command: Vec<String>,
}

impl GoToolchain {
    /// Creates a toolchain building in `working_dir`.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            go: "go".to_string(),
            working_dir: working_dir.into(),
            tags: String::new(),
            extra_args: Vec::new(),
            docs_command: vec!["swag".to_string(), "init".to_string()],
        }
    }

    /// Passes `-tags` to the compiler; blank means no tags.
    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = tags.into();
        self
    }

    /// Extra arguments inserted after the standard build flags.
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Replaces the docs generator command line; an empty list keeps the default.
    pub fn with_docs_command(mut self, command: Vec<String>) -> Self {
        if !command.is_empty() {
            self.docs_command = command;
        }
        self
    }

    /// Uses a different `go` binary.
    pub fn with_go_binary(mut self, go: impl Into<String>) -> Self {
        self.go = go.into();
        self
    }

    fn command(&self, program: &str) -> Command {
        let mut cmd = Command::new(program);
        cmd.current_dir(&self.working_dir).env("GOGC", "off");
        cmd
    }
}

impl Toolchain for GoToolchain {
    fn install_command(&self) -> Command {
        let mut cmd = self.command(&self.go);
        cmd.args(["install", "-v"]);
        cmd
    }

    fn docs_command(&self) -> Command {
        let mut cmd = self.command(&self.docs_command[0]);
        cmd.args(&self.docs_command[1..]);
        cmd
    }

    fn build_command(&self, artifact: &str, files: &[String]) -> Command {
        let mut cmd = self.command(&self.go);
        cmd.args(["build", "-o", artifact]);
        if !self.tags.is_empty() {
            cmd.args(["-tags", &self.tags]);
        }
        cmd.args(&self.extra_args);
        cmd.args(files);
        cmd
    }
}

/// Result of one build cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Compiled and handed to the supervisor for a restart.
    Built,
    /// The compiler failed; nothing was restarted.
    CompileFailed {
        /// Captured compiler standard error.
        stderr: String,
    },
    /// Docs generation failed; the compile was not attempted.
    DocsFailed {
        /// Captured generator standard error.
        stderr: String,
    },
}

impl BuildOutcome {
    /// Whether the artifact was built.
    pub fn is_success(&self) -> bool {
        matches!(self, BuildOutcome::Built)
    }
}

/// Runs build cycles one at a time.
pub struct BuildTrigger {
    toolchain: Box<dyn Toolchain>,
    supervisor: Arc<ProcessSupervisor>,
    notifier: Notifier,
    artifact: String,
    install_first: bool,
    lock: Mutex<()>,
    builds: AtomicU64,
}

impl BuildTrigger {
    /// Creates a trigger that builds `artifact` and restarts it on success.
    pub fn new(
        toolchain: impl Toolchain,
        supervisor: Arc<ProcessSupervisor>,
        notifier: Notifier,
        artifact: impl Into<String>,
    ) -> Self {
        Self {
            toolchain: Box::new(toolchain),
            supervisor,
            notifier,
            artifact: artifact.into(),
            install_first: false,
            lock: Mutex::new(()),
            builds: AtomicU64::new(0),
        }
    }

    /// Runs the install step before every compile.
    pub fn with_install(mut self, install_first: bool) -> Self {
        self.install_first = install_first;
        self
    }

    /// Name of the artifact being built.
    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    /// The supervisor restarted after successful builds.
    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.supervisor
    }

    /// Number of build cycles that have acquired the lock so far.
    pub fn builds_started(&self) -> u64 {
        self.builds.load(Ordering::SeqCst)
    }

    /// Builds and, on success, restarts the application.
    ///
    /// Waits for any build already in progress. A docs failure aborts the
    /// cycle before compiling; a compile failure leaves the running child
    /// untouched.
    pub async fn auto_build(&self, files: &[String], generate_docs: bool) -> BuildOutcome {
        let _guard = self.lock.lock().await;
        self.builds.fetch_add(1, Ordering::SeqCst);
        let start = Instant::now();

        if self.install_first {
            self.run_install().await;
        }

        if generate_docs {
            info!("Generating the docs...");
            if let Err(stderr) = run_captured(self.toolchain.docs_command()).await {
                self.notifier.notify(&stderr, "Failed to generate the docs.").await;
                error!(stderr = %stderr, "Failed to generate the docs.");
                return BuildOutcome::DocsFailed { stderr };
            }
            info!("Docs generated!");
        }

        let cmd = self.toolchain.build_command(&self.artifact, files);
        if let Err(stderr) = run_captured(cmd).await {
            self.notifier.notify(&stderr, "Build Failed").await;
            error!("Failed to build the application: {}", stderr);
            return BuildOutcome::CompileFailed { stderr };
        }

        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Built Successfully!"
        );

        if let Err(e) = self.supervisor.restart(&self.artifact).await {
            error!(error = %e, "restart after build failed");
        }

        BuildOutcome::Built
    }

    async fn run_install(&self) {
        let mut cmd = self.toolchain.install_command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        match cmd.status().await {
            Ok(status) if status.success() => debug!("install step finished"),
            Ok(status) => warn!(%status, "install step failed, building anyway"),
            Err(e) => warn!(error = %e, "install step could not run, building anyway"),
        }
    }
}

/// Runs `cmd` to completion, returning its standard error on failure.
async fn run_captured(mut cmd: Command) -> std::result::Result<(), String> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::piped());

    let output = cmd
        .output()
        .await
        .map_err(|e| format!("failed to run '{}': {}", program, e))?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if stderr.trim().is_empty() {
            Err(format!("'{}' exited with {}", program, output.status))
        } else {
            Err(stderr)
        }
    }
}
