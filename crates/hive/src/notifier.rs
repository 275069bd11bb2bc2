// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Desktop notifications for build results.
//!
//! Shells out to whatever notification helper the platform ships with.
//! Missing helpers are not an error; the log line already carries the message.

use tokio::process::Command;
use tracing::debug;

#[cfg_attr(not(any(target_os = "macos", target_os = "windows")), allow(dead_code))]
const APP_NAME: &str = "hive";

/// Posts desktop notifications when enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct Notifier {
    enabled: bool,
}

impl Notifier {
    /// Creates a notifier.
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// A notifier that never posts anything.
    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    /// Whether notifications are posted.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Posts `text` under `title`. Returns once the helper exits.
    pub async fn notify(&self, text: &str, title: &str) {
        if !self.enabled {
            return;
        }

        let Some(mut cmd) = platform_command(text, title).await else {
            debug!("no desktop notification helper for this platform");
            return;
        };

        match cmd.status().await {
            Ok(status) if !status.success() => {
                debug!(%status, "notification helper exited unsuccessfully");
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "notification helper could not run"),
        }
    }
}

#[cfg(target_os = "linux")]
async fn platform_command(text: &str, title: &str) -> Option<Command> {
    let mut cmd = Command::new("notify-send");
    cmd.args(["-i", "", title, text]);
    Some(cmd)
}

#[cfg(target_os = "macos")]
async fn platform_command(text: &str, title: &str) -> Option<Command> {
    let has_terminal_notifier = Command::new("which")
        .arg("terminal-notifier")
        .output()
        .await
        .map(|out| out.status.success())
        .unwrap_or(false);

    if has_terminal_notifier {
        let mut cmd = Command::new("terminal-notifier");
        cmd.args(["-title", APP_NAME, "-message", text, "-subtitle", title]);
        Some(cmd)
    } else {
        let script = format!(
            "display notification \"{}\" with title \"{}\" subtitle \"{}\"",
            escape_applescript(text),
            APP_NAME,
            escape_applescript(title)
        );
        let mut cmd = Command::new("osascript");
        cmd.args(["-e", &script]);
        Some(cmd)
    }
}

#[cfg(target_os = "windows")]
async fn platform_command(text: &str, title: &str) -> Option<Command> {
    let mut cmd = Command::new("growlnotify");
    cmd.args(["/i:", "", &format!("/t:{}", title), &format!("/a:{}", APP_NAME), text]);
    Some(cmd)
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
async fn platform_command(_text: &str, _title: &str) -> Option<Command> {
    None
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn escape_applescript(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
