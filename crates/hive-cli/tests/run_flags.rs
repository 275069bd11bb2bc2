// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Flag parsing and plan resolution for `hive run`.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use hive_cli::commands::run::{RunArgs, RunPlan};
use hive_cli::config::{Config, CONFIG_FILE};
use tempfile::tempdir;

#[derive(Parser)]
struct Harness {
    #[command(flatten)]
    run: RunArgs,
}

fn parse(args: &[&str]) -> RunArgs {
    let mut argv = vec!["hive-run"];
    argv.extend_from_slice(args);
    Harness::parse_from(argv).run
}

#[test]
fn test_all_flags() {
    let args = parse(&[
        "./blog",
        "--main",
        "main.go,routes.go",
        "--tags",
        "netgo",
        "-e",
        "tmp",
        "--exclude",
        "node_modules",
        "--ex",
        "../shared",
        "--vendor",
        "--gendoc",
        "--downdoc",
        "--runmode",
        "dev",
        "--runargs",
        "-port 9000",
        "--reload",
        "--notify",
    ]);

    assert_eq!(args.app_path, Some(PathBuf::from("./blog")));
    assert_eq!(args.main, vec!["main.go", "routes.go"]);
    assert_eq!(args.tags.as_deref(), Some("netgo"));
    assert_eq!(args.exclude, vec!["tmp", "node_modules"]);
    assert_eq!(args.extra, vec!["../shared"]);
    assert!(args.vendor && args.gendoc && args.downdoc && args.reload && args.notify);
    assert_eq!(args.runmode.as_deref(), Some("dev"));
    assert_eq!(args.runargs.as_deref(), Some("-port 9000"));
}

#[test]
fn test_no_flags() {
    let args = parse(&[]);
    assert!(args.app_path.is_none());
    assert!(args.main.is_empty());
    assert!(!args.reload);
}

#[test]
fn test_plan_from_config_file() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("main.go"), "package main").unwrap();
    fs::create_dir_all(dir.path().join("static")).unwrap();
    fs::write(dir.path().join("static/site.css"), "body {}").unwrap();
    fs::write(
        dir.path().join(CONFIG_FILE),
        r#"
[project]
name = "shop"

[reload]
enabled = true
address = "127.0.0.1:35729"

[notify]
enabled = true
"#,
    )
    .unwrap();

    let config = Config::load_from(&dir.path().join(CONFIG_FILE)).unwrap();
    let plan = RunPlan::resolve(&parse(&[]), &config, dir.path()).unwrap();

    assert_eq!(plan.app_name, "shop");
    assert_eq!(plan.reload_address.as_deref(), Some("127.0.0.1:35729"));
    assert!(plan.notify);
    // Static assets only count as watch roots with reload on.
    assert!(plan.roots.contains(&dir.path().join("static")));
}
