// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Watch loop: debounce, deduplication and reload forwarding.

#![cfg(unix)]

mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hive::build::BuildTrigger;
use hive::notifier::Notifier;
use hive::process::{ProcessSupervisor, RunSpec};
use hive::reload::Broker;
use hive::watcher::{default_extensions, ChangeWatcher, WatchFilter, WatchOptions};
use notify::event::{DataChange, ModifyKind};
use notify::{Event, EventKind};
use tempfile::tempdir;
use tokio::sync::mpsc;

use common::{wait_for_builds, ScriptToolchain, BUILD_OK};

fn quick_options() -> WatchOptions {
    WatchOptions {
        debounce: Duration::from_millis(200),
        reload_delay: Duration::from_millis(10),
        ..WatchOptions::default()
    }
}

fn build_trigger(dir: &Path) -> Arc<BuildTrigger> {
    let supervisor = Arc::new(ProcessSupervisor::new(RunSpec::new(dir)));
    Arc::new(BuildTrigger::new(
        ScriptToolchain::new(dir, BUILD_OK),
        supervisor,
        Notifier::disabled(),
        "app",
    ))
}

fn modified(path: &Path) -> notify::Result<Event> {
    Ok(Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
        .add_path(path.to_path_buf()))
}

fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, "package main\n").unwrap();
    path
}

#[tokio::test]
async fn test_burst_yields_one_build() {
    let dir = tempdir().unwrap();
    let trigger = build_trigger(dir.path());
    let watcher = ChangeWatcher::new(
        WatchFilter::new(&default_extensions()),
        Arc::clone(&trigger),
        None,
        quick_options(),
    );
    let (tx, rx) = mpsc::unbounded_channel();
    let _handle = watcher.consume_handle(rx);

    for name in ["a.go", "b.go", "c.go"] {
        tx.send(modified(&touch(dir.path(), name))).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert!(wait_for_builds(&trigger, 1).await);
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(trigger.builds_started(), 1);
    trigger.supervisor().kill().await;
}

#[tokio::test]
async fn test_unchanged_mtime_is_skipped() {
    let dir = tempdir().unwrap();
    let trigger = build_trigger(dir.path());
    let watcher = ChangeWatcher::new(
        WatchFilter::new(&default_extensions()),
        Arc::clone(&trigger),
        None,
        quick_options(),
    );
    let (tx, rx) = mpsc::unbounded_channel();
    let _handle = watcher.consume_handle(rx);

    let main = touch(dir.path(), "main.go");
    tx.send(modified(&main)).unwrap();
    assert!(wait_for_builds(&trigger, 1).await);

    // Same file, same modification time: nothing new to build.
    tx.send(modified(&main)).unwrap();
    tx.send(modified(&main)).unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(trigger.builds_started(), 1);
    trigger.supervisor().kill().await;
}

#[tokio::test]
async fn test_ignored_and_access_events_do_nothing() {
    let dir = tempdir().unwrap();
    let trigger = build_trigger(dir.path());
    let watcher = ChangeWatcher::new(
        WatchFilter::new(&default_extensions()),
        Arc::clone(&trigger),
        None,
        quick_options(),
    );
    let (tx, rx) = mpsc::unbounded_channel();
    let _handle = watcher.consume_handle(rx);

    tx.send(modified(&touch(dir.path(), ".main.go.swp"))).unwrap();
    tx.send(modified(&touch(dir.path(), "notes.txt"))).unwrap();
    tx.send(Ok(Event::new(EventKind::Access(notify::event::AccessKind::Any))
        .add_path(touch(dir.path(), "main.go"))))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(trigger.builds_started(), 0);
}

#[tokio::test]
async fn test_static_asset_reloads_without_build() {
    let dir = tempdir().unwrap();
    let trigger = build_trigger(dir.path());
    let broker = Broker::spawn();
    let (_id, mut browser) = broker.register();

    let watcher = ChangeWatcher::new(
        WatchFilter::new(&default_extensions()).with_reload(true),
        Arc::clone(&trigger),
        Some(broker.clone()),
        quick_options(),
    );
    let (tx, rx) = mpsc::unbounded_channel();
    let _handle = watcher.consume_handle(rx);

    let css = touch(dir.path(), "site.css");
    tx.send(modified(&css)).unwrap();

    let message = tokio::time::timeout(Duration::from_secs(2), browser.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(message.contains("site.css"));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(trigger.builds_started(), 0);
}

#[tokio::test]
async fn test_successful_build_reloads_browsers() {
    let dir = tempdir().unwrap();
    let trigger = build_trigger(dir.path());
    let broker = Broker::spawn();
    let (_id, mut browser) = broker.register();

    let watcher = ChangeWatcher::new(
        WatchFilter::new(&default_extensions()).with_reload(true),
        Arc::clone(&trigger),
        Some(broker.clone()),
        quick_options(),
    );
    let (tx, rx) = mpsc::unbounded_channel();
    let _handle = watcher.consume_handle(rx);

    tx.send(modified(&touch(dir.path(), "main.go"))).unwrap();

    let message = tokio::time::timeout(Duration::from_secs(5), browser.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(message.contains("main.go"));
    assert_eq!(trigger.builds_started(), 1);
    assert!(trigger.supervisor().is_running().await);
    trigger.supervisor().kill().await;
}

#[tokio::test]
async fn test_real_filesystem_change_triggers_build() {
    let dir = tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    touch(&root, "main.go");

    let trigger = build_trigger(&root);
    let started = trigger.supervisor().subscribe_started();
    let watcher = ChangeWatcher::new(
        WatchFilter::new(&default_extensions()),
        Arc::clone(&trigger),
        None,
        quick_options(),
    );
    let _handle = watcher.spawn(&[root.clone()]).unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    fs::write(root.join("main.go"), "package main\n\nfunc main() {}\n").unwrap();

    assert!(wait_for_builds(&trigger, 1).await);
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(trigger.builds_started(), 1);
    assert_eq!(*started.borrow(), 1);
    assert!(root.join(trigger.artifact()).is_file());
    trigger.supervisor().kill().await;
}

#[tokio::test]
async fn test_loop_ends_when_events_stop() {
    let dir = tempdir().unwrap();
    let trigger = build_trigger(dir.path());
    let watcher = ChangeWatcher::new(
        WatchFilter::new(&default_extensions()),
        trigger,
        None,
        quick_options(),
    );
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = watcher.consume_handle(rx);
    assert!(!handle.is_finished());

    drop(tx);
    for _ in 0..50 {
        if handle.is_finished() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(handle.is_finished());
}

#[tokio::test]
async fn test_missing_root_is_rejected() {
    let dir = tempdir().unwrap();
    let trigger = build_trigger(dir.path());
    let watcher = ChangeWatcher::new(
        WatchFilter::new(&default_extensions()),
        trigger,
        None,
        WatchOptions::default(),
    );

    let err = watcher.spawn(&[dir.path().join("gone")]).unwrap_err();
    assert!(matches!(err, hive::HiveError::WatchRoot { .. }));
}
