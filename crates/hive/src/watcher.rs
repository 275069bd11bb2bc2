// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Filesystem change watching for the run loop.
//!
//! This module turns raw notify events into at most one build per burst of
//! edits, and forwards static asset changes straight to the live-reload
//! broker.
//!
//! # Event handling
//!
//! For every path in a notify event:
//!
//! 1. Static asset and live reload enabled: broadcast, no rebuild.
//! 2. Editor artifact, generated router, or unwatched extension: drop.
//! 3. Source file whose modification time has not changed since the last
//!    event for it: drop (notify often reports one write several times).
//! 4. Otherwise push the build deadline to `now + debounce`.
//!
//! When the deadline passes without being pushed again the build runs, and
//! after a successful build connected browsers are told to reload.
//!
//! # Watch roots
//!
//! The OS mechanism watches directories, not files, so [`discover_roots`]
//! registers every directory that directly contains a watched file.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use lazy_static::lazy_static;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use regex::Regex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::build::BuildTrigger;
use crate::error::{HiveError, Result};
use crate::reload::BrokerHandle;

/// Quiet period after the last qualifying event before a build starts.
pub const DEBOUNCE: Duration = Duration::from_secs(1);

/// Pause between a successful build and the browser reload, so the restarted
/// server is listening when the page comes back.
pub const RELOAD_DELAY: Duration = Duration::from_millis(100);

lazy_static! {
    static ref BUILTIN_IGNORES: Vec<Regex> = vec![
        // Emacs lock files
        Regex::new(r"(^|[/\\])\.#[^/\\]*$").unwrap(),
        // Vim swap files
        Regex::new(r"\.sw[po]$").unwrap(),
        // Backup files
        Regex::new(r"~$").unwrap(),
        Regex::new(r"\.tmp$").unwrap(),
        // Router file the framework regenerates on every start
        Regex::new(r"commentsRouter_[^/\\]*\.go$").unwrap(),
    ];
}

/// Source extensions watched when nothing else is configured.
pub fn default_extensions() -> Vec<String> {
    vec![".go".to_string()]
}

/// Static asset extensions that trigger a browser reload.
pub fn default_static_extensions() -> Vec<String> {
    [".css", ".js", ".html", ".tpl", ".png", ".jpg", ".gif", ".svg", ".ico"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn normalize_extension(ext: &str) -> String {
    if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{}", ext)
    }
}

/// What a changed path means for the run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Static asset: reload browsers, no rebuild.
    Static,
    /// Source file: rebuild.
    Source,
    /// Not interesting.
    Ignored,
}

/// Decides which paths matter.
#[derive(Debug, Clone)]
pub struct WatchFilter {
    extensions: Vec<String>,
    static_extensions: Vec<String>,
    ignore: Vec<Regex>,
    reload_enabled: bool,
}

impl WatchFilter {
    /// Creates a filter for the given source extensions (`"go"` and `".go"`
    /// are equivalent) with the built-in ignore list.
    pub fn new(extensions: &[String]) -> Self {
        Self {
            extensions: extensions.iter().map(|e| normalize_extension(e)).collect(),
            static_extensions: default_static_extensions(),
            ignore: BUILTIN_IGNORES.clone(),
            reload_enabled: false,
        }
    }

    /// Replaces the static asset extensions.
    pub fn with_static_extensions(mut self, extensions: &[String]) -> Self {
        self.static_extensions = extensions.iter().map(|e| normalize_extension(e)).collect();
        self
    }

    /// Treats static assets as reload triggers.
    pub fn with_reload(mut self, enabled: bool) -> Self {
        self.reload_enabled = enabled;
        self
    }

    /// Appends extra ignore regexes.
    pub fn with_ignore_patterns(mut self, patterns: &[String]) -> Result<Self> {
        for pattern in patterns {
            self.ignore.push(Regex::new(pattern)?);
        }
        Ok(self)
    }

    /// Whether static assets are reload triggers.
    pub fn reload_enabled(&self) -> bool {
        self.reload_enabled
    }

    /// Static asset that should reload browsers.
    pub fn is_static(&self, path: &Path) -> bool {
        self.reload_enabled && has_suffix(path, &self.static_extensions)
    }

    /// Editor artifact or generated file.
    pub fn is_ignored(&self, path: &Path) -> bool {
        let name = path.to_string_lossy();
        self.ignore.iter().any(|re| re.is_match(&name))
    }

    /// Has a watched source extension.
    pub fn is_watched(&self, path: &Path) -> bool {
        has_suffix(path, &self.extensions)
    }

    /// Classifies one changed path.
    pub fn classify(&self, path: &Path) -> Classification {
        if self.is_static(path) {
            Classification::Static
        } else if self.is_ignored(path) || !self.is_watched(path) {
            Classification::Ignored
        } else {
            Classification::Source
        }
    }
}

fn has_suffix(path: &Path, suffixes: &[String]) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy())
        .is_some_and(|name| suffixes.iter().any(|s| name.ends_with(s.as_str())))
}

/// Last processed modification time per path.
///
/// Entries are overwritten, never removed, for the life of the run.
#[derive(Debug, Default)]
pub struct EventRecord {
    seen: HashMap<PathBuf, SystemTime>,
}

impl EventRecord {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `modified` for `path`; false if it equals what was recorded.
    pub fn observe(&mut self, path: &Path, modified: SystemTime) -> bool {
        match self.seen.insert(path.to_path_buf(), modified) {
            Some(previous) => previous != modified,
            None => true,
        }
    }

    /// Number of paths seen so far.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Modification time of `path`, or now if it cannot be read (a deleted file
/// always counts as a change).
pub fn modification_time(path: &Path) -> SystemTime {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or_else(|e| {
            debug!(path = %path.display(), error = %e, "no modification time");
            SystemTime::now()
        })
}

/// Options for [`discover_roots`].
#[derive(Debug, Clone, Default)]
pub struct DiscoverOptions {
    /// Descend into `vendor` directories.
    pub include_vendor: bool,
    /// Absolute paths never watched (prefix match).
    pub excluded: Vec<PathBuf>,
}

impl DiscoverOptions {
    fn is_excluded(&self, path: &Path) -> bool {
        self.excluded.iter().any(|ex| path.starts_with(ex))
    }
}

/// Lists every directory under `root` that directly contains a watched
/// source file, or a static asset when live reload is on.
///
/// Skips `docs`, `swagger`, hidden directories, `vendor` (unless enabled) and
/// excluded paths. Unreadable directories are skipped silently.
pub fn discover_roots(root: &Path, filter: &WatchFilter, options: &DiscoverOptions) -> Vec<PathBuf> {
    let mut roots = Vec::new();
    walk(root, filter, options, &mut roots);
    roots
}

fn walk(dir: &Path, filter: &WatchFilter, options: &DiscoverOptions, roots: &mut Vec<PathBuf>) {
    let mut entries: Vec<_> = match fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok()).collect(),
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "cannot read directory");
            return;
        }
    };
    entries.sort_by_key(|e| e.file_name());

    let mut use_dir = false;
    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with("docs") || name.ends_with("swagger") {
            continue;
        }
        if !options.include_vendor && name.ends_with("vendor") {
            continue;
        }

        let path = entry.path();
        if options.is_excluded(&path) {
            info!("'{}' is not being watched", path.display());
            continue;
        }

        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            if !name.starts_with('.') {
                walk(&path, filter, options, roots);
            }
            continue;
        }

        if !use_dir && (filter.is_watched(&path) || filter.is_static(&path)) {
            roots.push(dir.to_path_buf());
            use_dir = true;
        }
    }
}

/// Removes duplicate roots, keeping first occurrences in order.
pub fn unique_roots(roots: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    roots.into_iter().filter(|p| seen.insert(p.clone())).collect()
}

/// Build parameters and timings for a [`ChangeWatcher`].
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Entrypoint files passed to the compiler.
    pub files: Vec<String>,
    /// Regenerate docs before each build.
    pub generate_docs: bool,
    /// Quiet period before building.
    pub debounce: Duration,
    /// Pause between a successful build and the browser reload.
    pub reload_delay: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            generate_docs: false,
            debounce: DEBOUNCE,
            reload_delay: RELOAD_DELAY,
        }
    }
}

/// Keeps the OS watcher and the event loop alive. Dropping it stops both.
pub struct WatcherHandle {
    _watcher: Option<RecommendedWatcher>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    /// Whether the event loop has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Consumes filesystem events and schedules builds and reloads.
///
/// The event record and the build deadline belong to the single event loop
/// task, so neither needs a lock.
pub struct ChangeWatcher {
    filter: WatchFilter,
    trigger: Arc<BuildTrigger>,
    broker: Option<BrokerHandle>,
    options: WatchOptions,
    record: EventRecord,
    deadline: Option<Instant>,
    last_event: Option<String>,
}

impl ChangeWatcher {
    /// Creates a watcher. Pass a broker to enable live reload.
    pub fn new(
        filter: WatchFilter,
        trigger: Arc<BuildTrigger>,
        broker: Option<BrokerHandle>,
        options: WatchOptions,
    ) -> Self {
        Self {
            filter,
            trigger,
            broker,
            options,
            record: EventRecord::new(),
            deadline: None,
            last_event: None,
        }
    }

    /// Registers every root with the OS and starts the event loop.
    ///
    /// Fails if the notification mechanism cannot be created or a root
    /// cannot be watched; errors reported later are logged and skipped.
    pub fn spawn(self, roots: &[PathBuf]) -> Result<WatcherHandle> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            notify::Config::default(),
        )?;

        info!("Initializing watcher...");
        for root in roots {
            info!("Watching: {}", root.display());
            watcher
                .watch(root, RecursiveMode::NonRecursive)
                .map_err(|source| HiveError::WatchRoot {
                    path: root.clone(),
                    source,
                })?;
        }

        let task = self.consume(rx);
        Ok(WatcherHandle {
            _watcher: Some(watcher),
            task,
        })
    }

    /// Runs the event loop over an existing event stream.
    ///
    /// The loop ends when every sender is dropped.
    pub fn consume(self, events: mpsc::UnboundedReceiver<notify::Result<Event>>) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }

    /// Like [`ChangeWatcher::consume`], wrapped in a handle that aborts the
    /// loop when dropped.
    pub fn consume_handle(
        self,
        events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    ) -> WatcherHandle {
        WatcherHandle {
            _watcher: None,
            task: self.consume(events),
        }
    }

    async fn run(mut self, mut events: mpsc::UnboundedReceiver<notify::Result<Event>>) {
        loop {
            let deadline = self.deadline;
            tokio::select! {
                received = events.recv() => match received {
                    Some(Ok(event)) => self.handle_event(&event),
                    Some(Err(e)) => warn!("Watcher error: {}", e),
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.deadline = None;
                    self.fire();
                }
            }
        }
        debug!("watch loop ended");
    }

    fn handle_event(&mut self, event: &Event) {
        if matches!(event.kind, EventKind::Access(_)) {
            return;
        }
        for path in &event.paths {
            self.handle_path(path, &event.kind);
        }
    }

    fn handle_path(&mut self, path: &Path, kind: &EventKind) {
        let description = format!("{} {}", kind_label(kind), path.display());

        match self.filter.classify(path) {
            Classification::Static => {
                if let Some(broker) = &self.broker {
                    debug!(path = %path.display(), "static asset changed");
                    broker.broadcast(&description);
                }
            }
            Classification::Ignored => {}
            Classification::Source => {
                if !self.record.observe(path, modification_time(path)) {
                    info!("Skipping: {}", description);
                    return;
                }
                info!("Event fired: {}", description);
                self.deadline = Some(Instant::now() + self.options.debounce);
                self.last_event = Some(description);
            }
        }
    }

    fn fire(&mut self) {
        let trigger = Arc::clone(&self.trigger);
        let broker = self.broker.clone();
        let files = self.options.files.clone();
        let generate_docs = self.options.generate_docs;
        let reload_delay = self.options.reload_delay;
        let event = self.last_event.take().unwrap_or_default();

        // Spawned so that events keep flowing while the build holds its lock.
        tokio::spawn(async move {
            let outcome = trigger.auto_build(&files, generate_docs).await;
            if let (true, Some(broker)) = (outcome.is_success(), broker) {
                tokio::time::sleep(reload_delay).await;
                broker.broadcast(&event);
            }
        });
    }
}

fn kind_label(kind: &EventKind) -> &'static str {
    match kind {
        EventKind::Create(_) => "created",
        EventKind::Modify(_) => "modified",
        EventKind::Remove(_) => "removed",
        _ => "changed",
    }
}
