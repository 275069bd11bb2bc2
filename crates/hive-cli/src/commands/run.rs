// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Run command: watch the application, rebuild on change, restart the binary
//! and optionally reload connected browsers.

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use hive::build::{artifact_name, BuildOutcome, BuildTrigger, GoToolchain};
use hive::notifier::Notifier;
use hive::process::{ProcessSupervisor, RunSpec};
use hive::reload::{self, Broker, RELOAD_PATH};
use hive::swagger::{ensure_swagger, SWAGGER_URL};
use hive::watcher::{
    discover_roots, unique_roots, ChangeWatcher, DiscoverOptions, WatchFilter, WatchOptions,
};

use crate::config::{Config, CONFIG_FILE};

/// Environment variable carrying the run mode to the application.
pub const RUNMODE_ENV: &str = "HIVE_RUNMODE";

/// Flags of `hive run`.
#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Application directory (defaults to the current directory)
    pub app_path: Option<PathBuf>,

    /// Entrypoint files to build instead of the whole package
    #[arg(long = "main", value_delimiter = ',')]
    pub main: Vec<String>,

    /// Go build tags
    #[arg(long)]
    pub tags: Option<String>,

    /// Paths to exclude from watching
    #[arg(short = 'e', long = "exclude", value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Extra package directories to watch
    #[arg(long = "extra", visible_alias = "ex", value_delimiter = ',')]
    pub extra: Vec<String>,

    /// Watch vendor directories
    #[arg(long)]
    pub vendor: bool,

    /// Regenerate API docs before every build
    #[arg(long)]
    pub gendoc: bool,

    /// Download the Swagger UI if it is missing
    #[arg(long)]
    pub downdoc: bool,

    /// Run mode exported to the application as HIVE_RUNMODE
    #[arg(long)]
    pub runmode: Option<String>,

    /// Arguments for the application, replacing the configured ones
    #[arg(long, allow_hyphen_values = true)]
    pub runargs: Option<String>,

    /// Serve the live-reload WebSocket endpoint
    #[arg(long)]
    pub reload: bool,

    /// Post a desktop notification when a build fails
    #[arg(long)]
    pub notify: bool,
}

/// Everything `hive run` needs, with flags merged over `hive.toml`.
#[derive(Debug, Clone)]
pub struct RunPlan {
    /// Application directory.
    pub app_dir: PathBuf,
    /// Application name.
    pub app_name: String,
    /// Built binary name.
    pub artifact: String,
    /// Entrypoint files.
    pub files: Vec<String>,
    /// Build tags.
    pub tags: String,
    /// Extra compiler arguments.
    pub build_args: Vec<String>,
    /// Run `go install` before each build.
    pub go_install: bool,
    /// Regenerate docs before each build.
    pub generate_docs: bool,
    /// Fetch the Swagger UI when missing.
    pub download_docs: bool,
    /// Docs generator command line.
    pub docs_command: Vec<String>,
    /// How the binary is launched.
    pub run_spec: RunSpec,
    /// Run mode, if any.
    pub runmode: Option<String>,
    /// Directories to watch.
    pub roots: Vec<PathBuf>,
    /// Path classification.
    pub filter: WatchFilter,
    /// Live-reload address when reload is enabled.
    pub reload_address: Option<String>,
    /// Desktop notifications on failure.
    pub notify: bool,
}

impl RunPlan {
    /// Merges `args` over `config` for the application in `app_dir`.
    pub fn resolve(args: &RunArgs, config: &Config, app_dir: &Path) -> anyhow::Result<Self> {
        let app_name = config
            .project
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .or_else(|| app_dir.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "app".to_string());

        let runmode = args
            .runmode
            .clone()
            .unwrap_or_else(|| config.run.runmode.clone());
        let runmode = (!runmode.is_empty()).then_some(runmode);

        let mut run_spec = RunSpec::new(app_dir)
            .with_args(config.run.args.clone())
            .with_override(args.runargs.as_deref().unwrap_or(""))
            .with_env_entries(&config.run.envs);
        if let Some(mode) = &runmode {
            run_spec = run_spec.with_env(RUNMODE_ENV, mode.clone());
        }

        let reload_enabled = args.reload || config.reload.enabled;
        let filter = WatchFilter::new(&config.watch.extensions)
            .with_static_extensions(&config.watch.static_extensions)
            .with_reload(reload_enabled)
            .with_ignore_patterns(&config.watch.ignore)?;

        let mut files: Vec<String> = if args.main.is_empty() {
            config.build.main.clone()
        } else {
            args.main.clone()
        };
        files.retain(|f| !f.is_empty());

        let options = DiscoverOptions {
            include_vendor: args.vendor || config.watch.vendor,
            excluded: args
                .exclude
                .iter()
                .chain(&config.watch.exclude)
                .map(|p| absolutize(app_dir, p))
                .collect(),
        };

        let mut roots = discover_roots(app_dir, &filter, &options);
        for other in &config.watch.others {
            let dir = absolutize(app_dir, &expand_gopath(other));
            if dir.is_dir() {
                roots.push(dir);
            } else {
                warn!("'{}' does not exist and is not being watched", dir.display());
            }
        }
        for extra in &args.extra {
            let dir = absolutize(app_dir, extra);
            if dir.is_dir() {
                roots.extend(discover_roots(&dir, &filter, &options));
            } else {
                warn!("No extra package '{}' found", extra);
            }
        }

        Ok(Self {
            app_dir: app_dir.to_path_buf(),
            artifact: artifact_name(&app_name),
            app_name,
            files,
            tags: args.tags.clone().unwrap_or_else(|| config.build.tags.clone()),
            build_args: config.build.args.clone(),
            go_install: config.build.go_install,
            generate_docs: args.gendoc || config.build.generate_docs,
            download_docs: args.downdoc || config.build.download_docs,
            docs_command: config.build.docs_command.clone(),
            run_spec,
            runmode,
            roots: unique_roots(roots),
            filter,
            reload_address: reload_enabled.then(|| config.reload.address.clone()),
            notify: args.notify || config.notify.enabled,
        })
    }
}

/// Resolves the application directory from the optional argument.
pub fn resolve_app_dir(app_path: Option<&Path>) -> anyhow::Result<PathBuf> {
    let cwd = env::current_dir()?;
    let dir = match app_path {
        Some(p) => cwd.join(p),
        None => cwd,
    };
    if !dir.is_dir() {
        anyhow::bail!("No application '{}' found", dir.display());
    }
    Ok(dir.canonicalize()?)
}

fn absolutize(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Replaces `$GOPATH` with the first entry of the `GOPATH` variable, or
/// `$HOME/go` when it is unset.
pub fn expand_gopath(path: &str) -> String {
    if !path.contains("$GOPATH") {
        return path.to_string();
    }
    let gopath = env::var_os("GOPATH")
        .and_then(|v| env::split_paths(&v).next())
        .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join("go")))
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    path.replace("$GOPATH", &gopath)
}

fn report_runmode(runmode: Option<&str>) {
    match runmode {
        Some(mode @ ("prod" | "dev")) => info!("Using '{}' as 'runmode'", mode),
        Some(mode) => warn!("Using '{}' as 'runmode'", mode),
        None => {
            if let Ok(inherited) = env::var(RUNMODE_ENV) {
                if !inherited.is_empty() {
                    warn!("Using '{}' as 'runmode'", inherited);
                }
            }
        }
    }
}

/// Runs the watch, build and restart loop until Ctrl+C.
pub async fn run(args: RunArgs, quiet: bool) -> anyhow::Result<()> {
    let app_dir = resolve_app_dir(args.app_path.as_deref())?;
    let config = Config::load_from(&app_dir.join(CONFIG_FILE))?;
    let plan = RunPlan::resolve(&args, &config, &app_dir)?;

    info!("Using '{}' as 'appname'", plan.app_name);
    debug!(path = %app_dir.display(), "current path");
    if plan.app_name.ends_with(".go") {
        warn!(
            "The appname '{}' looks like a source file; the binary will overwrite it",
            plan.app_name
        );
    }
    report_runmode(plan.runmode.as_deref());

    if !quiet {
        println!(
            "{} {}",
            style("App:").cyan(),
            style(&plan.app_name).green().bold()
        );
    }

    if plan.download_docs {
        match ensure_swagger(&app_dir, SWAGGER_URL).await {
            Ok(true) if !quiet => {
                println!("  {} {}", style("✓").green(), style("Swagger UI installed").dim());
            }
            Ok(_) => {}
            Err(e) => warn!("{}", e),
        }
    }

    let (broker, _reload_server) = match &plan.reload_address {
        Some(addr) => {
            let broker = Broker::spawn();
            let server = reload::serve(addr, broker.clone()).await?;
            if !quiet {
                println!(
                    "{} {}",
                    style("Reload:").cyan(),
                    style(format!("ws://{}{}", server.local_addr(), RELOAD_PATH)).green()
                );
            }
            (Some(broker), Some(server))
        }
        None => (None, None),
    };

    let supervisor = Arc::new(ProcessSupervisor::new(plan.run_spec.clone()));
    let toolchain = GoToolchain::new(&app_dir)
        .with_tags(plan.tags.clone())
        .with_extra_args(plan.build_args.clone())
        .with_docs_command(plan.docs_command.clone());
    let trigger = Arc::new(
        BuildTrigger::new(
            toolchain,
            Arc::clone(&supervisor),
            Notifier::new(plan.notify),
            plan.artifact.clone(),
        )
        .with_install(plan.go_install),
    );

    let options = WatchOptions {
        files: plan.files.clone(),
        generate_docs: plan.generate_docs,
        ..WatchOptions::default()
    };
    let watcher = ChangeWatcher::new(plan.filter.clone(), Arc::clone(&trigger), broker, options)
        .spawn(&plan.roots)?;

    if !quiet {
        println!(
            "{} {}",
            style("Watching:").cyan(),
            style(format!("{} directories", plan.roots.len())).dim()
        );
    }

    initial_build(&trigger, &plan, quiet).await;

    if !quiet {
        println!(
            "{} {}",
            style("Status:").cyan(),
            style("Watching for changes... (Ctrl+C to stop)").dim()
        );
        println!();
    }

    tokio::signal::ctrl_c().await?;

    drop(watcher);
    supervisor.kill().await;
    if !quiet {
        println!("  {} {}", style("✓").green(), style("Stopped").dim());
    }
    Ok(())
}

async fn initial_build(trigger: &BuildTrigger, plan: &RunPlan, quiet: bool) {
    let spinner = (!quiet).then(|| {
        let pb = ProgressBar::new_spinner();
        if let Ok(s) = ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}") {
            pb.set_style(s);
        }
        pb.set_message(format!("Building {}...", plan.app_name));
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    });

    let start = Instant::now();
    let outcome = trigger.auto_build(&plan.files, plan.generate_docs).await;

    let Some(pb) = spinner else {
        return;
    };
    match outcome {
        BuildOutcome::Built => pb.finish_with_message(format!(
            "{} {} {}",
            style("✓").green(),
            style("Initial build").dim(),
            style(format!("{}ms", start.elapsed().as_millis())).dim()
        )),
        BuildOutcome::CompileFailed { .. } => pb.finish_with_message(format!(
            "{} {}",
            style("✗").red(),
            style("Initial build failed, waiting for changes").red()
        )),
        BuildOutcome::DocsFailed { .. } => pb.finish_with_message(format!(
            "{} {}",
            style("✗").red(),
            style("Docs generation failed, waiting for changes").red()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("controllers")).unwrap();
        fs::create_dir_all(dir.path().join("tmp")).unwrap();
        fs::write(dir.path().join("main.go"), "package main").unwrap();
        fs::write(dir.path().join("controllers/home.go"), "package controllers").unwrap();
        fs::write(dir.path().join("tmp/scratch.go"), "package tmp").unwrap();
        dir
    }

    #[test]
    fn test_defaults_from_directory() {
        let dir = project();
        let plan = RunPlan::resolve(&RunArgs::default(), &Config::default(), dir.path()).unwrap();

        let expected_name = dir.path().file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(plan.app_name, expected_name);
        assert_eq!(plan.artifact, artifact_name(&expected_name));
        assert!(plan.runmode.is_none());
        assert!(plan.reload_address.is_none());
        assert!(plan.roots.contains(&dir.path().to_path_buf()));
        assert!(plan.roots.contains(&dir.path().join("controllers")));
        assert!(plan.run_spec.envs.is_empty());
    }

    #[test]
    fn test_flags_override_config() {
        let dir = project();
        let config: Config = toml::from_str(
            r#"
            [project]
            name = "blog"

            [build]
            tags = "sqlite"
            main = ["main.go"]

            [run]
            args = ["-port", "8080"]
            envs = ["DB_HOST=localhost"]
            runmode = "prod"

            [watch]
            exclude = ["tmp"]
            "#,
        )
        .unwrap();
        let args = RunArgs {
            tags: Some("netgo".to_string()),
            runmode: Some("dev".to_string()),
            runargs: Some("-port 9000 -msg 'hi there'".to_string()),
            reload: true,
            ..RunArgs::default()
        };

        let plan = RunPlan::resolve(&args, &config, dir.path()).unwrap();

        assert_eq!(plan.app_name, "blog");
        assert_eq!(plan.tags, "netgo");
        assert_eq!(plan.files, vec!["main.go"]);
        assert_eq!(plan.run_spec.args, vec!["-port", "9000", "-msg", "hi there"]);
        assert_eq!(plan.runmode.as_deref(), Some("dev"));
        assert!(plan
            .run_spec
            .envs
            .contains(&(RUNMODE_ENV.to_string(), "dev".to_string())));
        assert!(plan
            .run_spec
            .envs
            .contains(&("DB_HOST".to_string(), "localhost".to_string())));
        assert_eq!(plan.reload_address.as_deref(), Some("127.0.0.1:12450"));
        assert!(plan.filter.reload_enabled());
        assert!(!plan.roots.contains(&dir.path().join("tmp")));
    }

    #[test]
    fn test_extra_packages_and_others() {
        let dir = project();
        let shared = tempfile::tempdir().unwrap();
        fs::write(shared.path().join("lib.go"), "package shared").unwrap();

        fs::create_dir_all(dir.path().join("assets")).unwrap();

        let mut config = Config::default();
        config.watch.others = vec!["assets".to_string(), "missing".to_string()];
        let args = RunArgs {
            extra: vec![
                shared.path().display().to_string(),
                "does-not-exist".to_string(),
            ],
            ..RunArgs::default()
        };

        let plan = RunPlan::resolve(&args, &config, dir.path()).unwrap();
        assert!(plan.roots.contains(&shared.path().to_path_buf()));
        assert!(plan.roots.contains(&dir.path().join("assets")));
        assert!(!plan.roots.contains(&dir.path().join("missing")));
    }

    #[test]
    fn test_invalid_ignore_pattern_fails() {
        let dir = project();
        let mut config = Config::default();
        config.watch.ignore = vec!["([".to_string()];
        assert!(RunPlan::resolve(&RunArgs::default(), &config, dir.path()).is_err());
    }

    #[test]
    fn test_expand_gopath_leaves_plain_paths() {
        assert_eq!(expand_gopath("/srv/shared"), "/srv/shared");
        assert!(!expand_gopath("$GOPATH/src/x").contains("$GOPATH"));
    }

    #[test]
    fn test_missing_app_dir() {
        let err = resolve_app_dir(Some(Path::new("/definitely/not/an/app"))).unwrap_err();
        assert!(err.to_string().contains("No application"));
    }
}
