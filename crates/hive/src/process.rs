// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Lifecycle of the built application process.
//!
//! [`ProcessSupervisor`] owns at most one child at a time. Stopping is
//! graceful first (an interrupt) and forced once the grace period runs out,
//! so a restarted server never races its predecessor for the listening port.
//!
//! # States
//!
//! ```text
//! Absent --start--> Starting --spawned--> Running --kill--> Stopping --> Absent
//!                       |
//!                       +--spawn failed--> Absent
//! ```

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use tokio::process::{Child, Command};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::error::{HiveError, Result};

/// How long a child gets to exit after the interrupt before it is force-killed.
pub const KILL_GRACE_PERIOD: Duration = Duration::from_secs(10);

lazy_static! {
    /// A single-quoted group, a double-quoted group, or a bare word.
    static ref RUN_ARG_TOKEN: Regex = Regex::new(r#"'[^']*'|"[^"]*"|\S+"#).unwrap();
}

/// Splits a user supplied argument string into arguments.
///
/// Quoted groups stay together and lose their surrounding quotes:
/// `-port 8080 'hello world'` yields `["-port", "8080", "hello world"]`.
pub fn parse_run_args(runargs: &str) -> Vec<String> {
    RUN_ARG_TOKEN
        .find_iter(runargs)
        .map(|m| unquote(m.as_str()).to_string())
        .collect()
}

fn unquote(token: &str) -> &str {
    let bytes = token.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'\'' || first == b'"') {
            return &token[1..token.len() - 1];
        }
    }
    token
}

/// How the built artifact is launched.
#[derive(Debug, Clone, Default)]
pub struct RunSpec {
    /// Directory the artifact is resolved against and run in.
    pub working_dir: PathBuf,
    /// Arguments passed to the artifact.
    pub args: Vec<String>,
    /// Variables appended to the inherited environment.
    pub envs: Vec<(String, String)>,
}

impl RunSpec {
    /// Creates a spec with no arguments and no extra environment.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// Sets the configured default arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Replaces the arguments with a user supplied override string.
    ///
    /// A blank override keeps the configured arguments.
    pub fn with_override(mut self, runargs: &str) -> Self {
        if !runargs.trim().is_empty() {
            self.args = parse_run_args(runargs);
        }
        self
    }

    /// Adds one environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Adds `KEY=VALUE` entries; entries without `=` are skipped.
    pub fn with_env_entries(mut self, entries: &[String]) -> Self {
        for entry in entries {
            match entry.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    self.envs.push((key.to_string(), value.to_string()));
                }
                _ => warn!(entry = %entry, "ignoring malformed environment entry"),
            }
        }
        self
    }
}

/// Where the supervised child is in its lifecycle.
#[derive(Debug)]
pub enum ChildState {
    /// No child has been started, or the last one is gone.
    Absent,
    /// A spawn is in progress.
    Starting,
    /// The child was spawned and has not been stopped by us.
    Running {
        /// OS process handle.
        child: Child,
        /// Process id captured at spawn time.
        pid: Option<u32>,
    },
    /// An interrupt was sent and we are waiting for the exit.
    Stopping,
}

impl ChildState {
    /// Short name for logs and tests.
    pub fn label(&self) -> &'static str {
        match self {
            ChildState::Absent => "absent",
            ChildState::Starting => "starting",
            ChildState::Running { .. } => "running",
            ChildState::Stopping => "stopping",
        }
    }
}

fn start_verb(previous_starts: u64) -> &'static str {
    if previous_starts == 0 {
        "Starting"
    } else {
        "Restarting"
    }
}

enum Delivery {
    Sent,
    AlreadyExited,
}

/// Owns the single running instance of the built application.
pub struct ProcessSupervisor {
    spec: RunSpec,
    grace_period: Duration,
    state: Mutex<ChildState>,
    /// Serializes start/kill/restart so a restart is never interleaved.
    lifecycle: Mutex<()>,
    started_tx: watch::Sender<u64>,
}

impl ProcessSupervisor {
    /// Creates a supervisor with no child and the default grace period.
    pub fn new(spec: RunSpec) -> Self {
        let (started_tx, _) = watch::channel(0);
        Self {
            spec,
            grace_period: KILL_GRACE_PERIOD,
            state: Mutex::new(ChildState::Absent),
            lifecycle: Mutex::new(()),
            started_tx,
        }
    }

    /// Overrides the time between interrupt and forced kill.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Receiver whose value increases by one on every successful start.
    pub fn subscribe_started(&self) -> watch::Receiver<u64> {
        self.started_tx.subscribe()
    }

    /// Launches the artifact. A tracked child is stopped first, exactly as
    /// [`ProcessSupervisor::kill`] would.
    ///
    /// A spawn failure leaves no child running and is returned to the caller,
    /// who is expected to log it and carry on.
    pub async fn start(&self, artifact: &str) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.start_inner(artifact).await
    }

    /// Stops the tracked child, if any.
    ///
    /// Sends an interrupt and waits up to the grace period for the child to
    /// exit, then force-kills it. Never fails: a child that is already gone is
    /// simply forgotten.
    pub async fn kill(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.kill_inner().await;
    }

    /// Stops the current child completely, then starts a new one.
    pub async fn restart(&self, artifact: &str) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        debug!("Kill running process");
        self.kill_inner().await;
        self.start_inner(artifact).await
    }

    /// Whether a started child is still alive.
    pub async fn is_running(&self) -> bool {
        let mut state = self.state.lock().await;
        match &mut *state {
            ChildState::Running { child, .. } => matches!(child.try_wait(), Ok(None)),
            _ => false,
        }
    }

    /// Process id of the tracked child.
    pub async fn current_pid(&self) -> Option<u32> {
        match &*self.state.lock().await {
            ChildState::Running { pid, .. } => *pid,
            _ => None,
        }
    }

    /// Current lifecycle state name.
    pub async fn state_label(&self) -> &'static str {
        self.state.lock().await.label()
    }

    fn resolve_artifact(&self, artifact: &str) -> PathBuf {
        let path = Path::new(artifact);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.spec.working_dir.join(path)
        }
    }

    async fn start_inner(&self, artifact: &str) -> Result<()> {
        let tracked = matches!(*self.state.lock().await, ChildState::Running { .. });
        if tracked {
            debug!("stopping the tracked child before starting a new one");
            self.kill_inner().await;
        }

        let program = self.resolve_artifact(artifact);
        let verb = start_verb(*self.started_tx.borrow());
        info!(artifact = %artifact, "{} '{}'...", verb, artifact);

        let mut state = self.state.lock().await;
        *state = ChildState::Starting;

        let mut cmd = Command::new(&program);
        cmd.args(&self.spec.args)
            .envs(self.spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&self.spec.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        match cmd.spawn() {
            Ok(child) => {
                let pid = child.id();
                *state = ChildState::Running { child, pid };
                drop(state);
                self.started_tx.send_modify(|starts| *starts += 1);
                info!(pid = ?pid, "'{}' is running...", artifact);
                Ok(())
            }
            Err(source) => {
                *state = ChildState::Absent;
                error!(error = %source, "Failed to start '{}'", program.display());
                Err(HiveError::Spawn {
                    program: program.display().to_string(),
                    source,
                })
            }
        }
    }

    async fn kill_inner(&self) {
        let taken = {
            let mut state = self.state.lock().await;
            std::mem::replace(&mut *state, ChildState::Stopping)
        };

        let mut child = match taken {
            ChildState::Running { child, .. } => child,
            _ => {
                debug!("no running process to kill");
                self.set_state(ChildState::Absent).await;
                return;
            }
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                info!(%status, "process had already exited");
                self.set_state(ChildState::Absent).await;
                return;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "could not query process status"),
        }

        let pid = child.id();
        match interrupt(&mut child) {
            Ok(Delivery::Sent) => debug!(pid = ?pid, "interrupt sent"),
            Ok(Delivery::AlreadyExited) => {
                info!(pid = ?pid, "process exited before it could be interrupted");
                let _ = child.wait().await;
                self.set_state(ChildState::Absent).await;
                return;
            }
            Err(e) => warn!(error = %e, "interrupt failed, waiting before force kill"),
        }

        match tokio::time::timeout(self.grace_period, child.wait()).await {
            Ok(Ok(status)) => debug!(pid = ?pid, %status, "process exited"),
            Ok(Err(e)) => warn!(pid = ?pid, error = %e, "error while waiting for process"),
            Err(_) => {
                info!(pid = ?pid, "Timeout. Force kill cmd process");
                if let Err(e) = child.kill().await {
                    error!(pid = ?pid, error = %e, "Error while killing cmd process");
                }
            }
        }

        self.set_state(ChildState::Absent).await;
    }

    async fn set_state(&self, next: ChildState) {
        *self.state.lock().await = next;
    }
}

#[cfg(unix)]
fn interrupt(child: &mut Child) -> Result<Delivery> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return Ok(Delivery::AlreadyExited);
    };
    let raw = i32::try_from(pid).map_err(|_| HiveError::Signal {
        pid,
        message: "pid out of range".to_string(),
    })?;

    match kill(Pid::from_raw(raw), Signal::SIGINT) {
        Ok(()) => Ok(Delivery::Sent),
        Err(Errno::ESRCH) => Ok(Delivery::AlreadyExited),
        Err(errno) => Err(HiveError::Signal {
            pid,
            message: errno.desc().to_string(),
        }),
    }
}

// Windows has no interrupt for a child without a console; terminate instead.
#[cfg(not(unix))]
fn interrupt(child: &mut Child) -> Result<Delivery> {
    let pid = child.id();
    match child.start_kill() {
        Ok(()) => Ok(Delivery::Sent),
        Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(Delivery::AlreadyExited),
        Err(e) => Err(HiveError::Signal {
            pid: pid.unwrap_or_default(),
            message: e.to_string(),
        }),
    }
}
