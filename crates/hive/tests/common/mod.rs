// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Shared helpers: shell scripts standing in for the Go toolchain and the
//! built application.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hive::build::{BuildTrigger, Toolchain};
use tokio::process::Command;

/// A long-running "application" that logs start and stop into `$LOG`.
pub const SERVER_SCRIPT: &str = r#"#!/bin/sh
trap 'echo "stop $$" >> "$LOG"; exit 0' INT
echo "start $$" >> "$LOG"
while true; do sleep 0.05; done
"#;

/// An application that ignores interrupts.
pub const STUBBORN_SCRIPT: &str = r#"#!/bin/sh
trap '' INT
echo "ready" >> "$LOG"
while true; do sleep 0.05; done
"#;

/// Compile step that writes a runnable artifact to `$1`.
pub const BUILD_OK: &str = r#"
if ! mkdir .building 2>/dev/null; then echo overlap >> overlaps; fi
sleep 0.2
echo build >> builds
cat > "$1" <<'EOF'
#!/bin/sh
trap 'exit 0' INT
while true; do sleep 0.05; done
EOF
chmod +x "$1"
rmdir .building 2>/dev/null
exit 0
"#;

/// Compile step that fails like the Go compiler does.
pub const BUILD_FAIL: &str = r#"
echo "./main.go:3:2: undefined: foo" >&2
exit 2
"#;

/// Writes an executable script.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Polls until `path` has at least `n` lines, returning them.
pub async fn wait_for_lines(path: &Path, n: usize) -> Vec<String> {
    for _ in 0..100 {
        if let Ok(content) = fs::read_to_string(path) {
            let lines: Vec<String> = content.lines().map(String::from).collect();
            if lines.len() >= n {
                return lines;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("{} never reached {} lines", path.display(), n);
}

/// Polls for up to five seconds until `trigger` has started `n` builds.
pub async fn wait_for_builds(trigger: &BuildTrigger, n: u64) -> bool {
    for _ in 0..100 {
        if trigger.builds_started() >= n {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Toolchain whose steps are `sh -c` snippets run in `dir`.
#[derive(Clone)]
pub struct ScriptToolchain {
    pub dir: PathBuf,
    pub build: String,
    pub docs: String,
}

impl ScriptToolchain {
    pub fn new(dir: &Path, build: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            build: build.to_string(),
            docs: "echo 'swag: no main file' >&2; exit 1".to_string(),
        }
    }

    fn shell(&self, script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script).arg("sh").current_dir(&self.dir);
        cmd
    }
}

impl Toolchain for ScriptToolchain {
    fn install_command(&self) -> Command {
        self.shell("true")
    }

    fn docs_command(&self) -> Command {
        self.shell(&self.docs)
    }

    fn build_command(&self, artifact: &str, files: &[String]) -> Command {
        let mut cmd = self.shell(&self.build);
        cmd.arg(artifact).args(files);
        cmd
    }
}

/// Number of lines in `dir/name`, zero if missing.
pub fn count_lines(dir: &Path, name: &str) -> usize {
    fs::read_to_string(dir.join(name))
        .map(|s| s.lines().count())
        .unwrap_or(0)
}
