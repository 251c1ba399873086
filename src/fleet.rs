//! One invocation end to end: workspace, preflight, scan, cache, schedule, render.
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::mpsc;

use anyhow::{anyhow, Context, Result};

use crate::cache::ResultCache;
use crate::color::{color_enabled_stderr, color_enabled_stdout, log_info_stderr, log_warn_stderr};
use crate::config::FleetConfig;
use crate::operation::{GitRunner, TaskRunner};
use crate::preflight::locate_programs;
use crate::render::{terminal_width_or_default, ProgressRenderer, RenderOptions};
use crate::repo::Repository;
use crate::scanner::{RepoScanner, ScanOptions};
use crate::scheduler::{CancelToken, FleetPlan, FleetRun, FleetScheduler};
use crate::signal::install_interrupt_handler;
use crate::workspace::Workspace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetCommand {
    Status,
    Checkout { branch: String, create: bool },
    Pull,
}

/// Plain options handed over by the command-line layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetOptions {
    pub root: PathBuf,
    pub command: FleetCommand,
    pub use_real_names: bool,
    pub clear_cache: bool,
    pub no_parallel: bool,
    pub jobs: Option<usize>,
    pub local_only: bool,
    pub verbose: bool,
}

impl FleetOptions {
    pub fn new(root: PathBuf, command: FleetCommand) -> Self {
        Self {
            root,
            command,
            use_real_names: false,
            clear_cache: false,
            no_parallel: false,
            jobs: None,
            local_only: false,
            verbose: false,
        }
    }

    pub fn plan(&self) -> FleetPlan {
        match &self.command {
            FleetCommand::Status => FleetPlan::status(self.local_only),
            FleetCommand::Checkout { branch, create } => FleetPlan::checkout(branch.clone(), *create),
            FleetCommand::Pull => FleetPlan::pull(),
        }
    }

    /// Environment config with CLI flags applied on top.
    pub fn effective_config(&self, base: FleetConfig) -> FleetConfig {
        let mut cfg = base;
        if let Some(j) = self.jobs {
            cfg = cfg.with_jobs(j);
        }
        if self.no_parallel {
            cfg = cfg.sequential();
        }
        cfg
    }
}

/// Run the requested command and render to stdout. Startup failures are returned as
/// [`crate::errors::StartupError`] inside the anyhow error.
pub fn run_fleet(opts: &FleetOptions, base: FleetConfig) -> Result<FleetRun> {
    let config = opts.effective_config(base);
    let use_err = color_enabled_stderr();

    let workspace = Workspace::open(&opts.root)?;
    let programs = locate_programs()?;
    let plan = opts.plan();
    if programs.gh.is_none() && plan.is_status() && plan.second.is_some() {
        log_warn_stderr(use_err, "mgit: warning: gh not found; PR column disabled");
    }
    if opts.local_only && !plan.is_status() {
        log_warn_stderr(use_err, "mgit: warning: --local-only only applies to status; ignored");
    }

    let aliases = workspace.aliases();
    let excludes = workspace.excludes();
    let report = RepoScanner::new(
        &aliases,
        &excludes,
        ScanOptions {
            max_depth: config.scan_depth,
            use_real_names: opts.use_real_names,
        },
    )
    .scan(workspace.root());
    for w in &report.warnings {
        log_warn_stderr(use_err, &format!("mgit: warning: skipped {w}"));
    }
    tracing::debug!(
        repositories = report.repositories.len(),
        excluded = report.excluded,
        "scan finished"
    );

    let cache = open_cache(&workspace, &config);
    if opts.clear_cache {
        cache.clear();
        tracing::info!("cache cleared");
    }

    if report.repositories.is_empty() {
        log_warn_stderr(
            use_err,
            &format!("mgit: no repositories found under {}", workspace.root().display()),
        );
        return Ok(FleetRun {
            outcomes: Vec::new(),
            interrupted: false,
            elapsed: std::time::Duration::ZERO,
        });
    }

    if let Err(e) = install_interrupt_handler() {
        tracing::warn!(error = %e, "could not install SIGINT handler");
    }
    let runner = GitRunner::new(
        programs.git,
        programs.gh,
        config.local_timeout,
        config.network_timeout,
    );
    let render = RenderOptions {
        color: color_enabled_stdout(),
        live: atty::is(atty::Stream::Stdout),
        ascii: config.ascii,
        width: terminal_width_or_default(),
    };
    let (run, _stdout) = execute(
        &report.repositories,
        &plan,
        &config,
        &cache,
        &runner,
        CancelToken::on_interrupt(),
        io::stdout(),
        render,
    )?;

    if opts.verbose {
        let s = cache.stats();
        log_info_stderr(
            use_err,
            &format!(
                "mgit: cache: {} hits, {} misses, {} entries",
                s.hits, s.misses, s.entries
            ),
        );
    }
    Ok(run)
}

fn open_cache(workspace: &Workspace, config: &FleetConfig) -> ResultCache {
    match workspace.ensure_state_dir() {
        Ok(_) => ResultCache::open(workspace.cache_path(), config.cache_ttl),
        Err(e) => {
            tracing::warn!(error = %e, "state directory unavailable; cache kept in memory");
            ResultCache::in_memory(config.cache_ttl)
        }
    }
}

/// Schedule `plan` over `repos` while a renderer thread draws into `out`; hands `out` back.
#[allow(clippy::too_many_arguments)]
pub fn execute<R, W>(
    repos: &[Repository],
    plan: &FleetPlan,
    config: &FleetConfig,
    cache: &ResultCache,
    runner: &R,
    cancel: CancelToken,
    out: W,
    render: RenderOptions,
) -> Result<(FleetRun, W)>
where
    R: TaskRunner + ?Sized,
    W: Write + Send,
{
    let (tx, rx) = mpsc::channel();
    let renderer = ProgressRenderer::new(out, repos, plan, render);
    let scheduler = FleetScheduler::new(config, cache, cancel);

    let (run, renderer) = std::thread::scope(|s| {
        let handle = s.spawn(move || renderer.run(rx));
        let run = scheduler.run(repos, plan, runner, &tx);
        drop(tx);
        let renderer = handle
            .join()
            .map_err(|_| anyhow!("renderer thread panicked"));
        (run, renderer)
    });

    let out = renderer?
        .finish(&run.summary(), run.elapsed)
        .context("failed to write results")?;
    Ok((run, out))
}
