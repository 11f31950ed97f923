//! Command-line front end. `spec.md` §1 puts "the command-line surface
//! and its flag parsing" explicitly out of scope for the core, treating
//! it as an external collaborator -- this binary is that collaborator: it
//! parses flags, loads the on-disk settings/constraints, wires the
//! black-box driver seams to real subprocesses, and calls into
//! `fromager-bootstrap`/`fromager-scheduler`. Shape follows `puffin-cli`'s
//! `main.rs` (single `clap::Parser` struct, `ExitCode`-returning `run`).

mod drivers;
mod logging;

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fromager_bootstrap::{bootstrap, Drivers, Roots, WorkContext};
use fromager_constraints::ConstraintsStore;
use fromager_hooks::HookRegistry;
use fromager_normalize::PackageName;
use fromager_resolver::PyPiProvider;
use fromager_settings::Settings;
use fromager_types::severity::{BootstrapError, Severity};
use fromager_version::{MarkerEnvironment, Requirement};
use tokio::sync::Mutex;
use url::Url;

#[derive(Parser)]
#[command(name = "fromager", author, version, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Suppress non-error output.
    #[arg(global = true, long, short, conflicts_with = "verbose")]
    quiet: bool,

    /// Emit debug-level logging.
    #[arg(global = true, long, short)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Recursively resolve, acquire, patch, and build a set of
    /// requirements from source, emitting a build order and graph.
    Bootstrap(BootstrapArgs),
    /// Build every not-yet-built node in a previously emitted graph,
    /// using the bounded parallel scheduler.
    BuildParallel(BuildParallelArgs),
}

#[derive(Parser)]
struct BootstrapArgs {
    /// Top-level PEP 508 requirements (may carry the direct-URL extension).
    #[arg(required = true)]
    requirements: Vec<String>,

    /// Constraints file (`name==version` lines), PEP 508-ish.
    #[arg(long)]
    constraints: Option<PathBuf>,

    /// Directory of per-package YAML settings overlays.
    #[arg(long)]
    settings_dir: Option<PathBuf>,

    /// Global settings YAML file.
    #[arg(long)]
    settings_file: Option<PathBuf>,

    /// Directory of per-package patch series.
    #[arg(long, default_value = "overrides/patches")]
    patches_dir: PathBuf,

    /// Root directory for sdists, wheels, and scratch build trees.
    #[arg(long, default_value = "work-dir")]
    work_dir: PathBuf,

    /// Directory build-order.json/graph.json/constraints.txt are written to.
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Build variant name (selects the settings overlay layer).
    #[arg(long, default_value = "default")]
    variant: String,

    /// PyPI-compatible simple index to resolve and acquire sdists from.
    #[arg(long, default_value = "https://pypi.org/simple/")]
    index_url: Url,

    /// Local simple-index server URL build environments install from.
    #[arg(long, default_value = "http://127.0.0.1:0/simple/")]
    wheel_server_url: String,

    /// Python interpreter used to drive PEP-517 hooks and `pip install`.
    #[arg(long, default_value = "python3")]
    python: PathBuf,

    /// Only build sdists; skip the wheel build step.
    #[arg(long)]
    sdist_only: bool,

    /// Tolerate packages pinned to more than one version; omit constraints.txt instead of erroring.
    #[arg(long)]
    skip_constraints: bool,

    /// A prior run's `graph.json`; already-pinned names are reused without a resolver call.
    #[arg(long)]
    previous_bootstrap_file: Option<PathBuf>,
}

#[derive(Parser)]
struct BuildParallelArgs {
    /// A `graph.json` emitted by a prior `bootstrap` run.
    #[arg(long, default_value = "output/graph.json")]
    graph_file: PathBuf,

    /// Directory holding one already-patched/extracted source tree per
    /// `name==version` key, as left behind by a prior `bootstrap` run.
    #[arg(long, default_value = "work-dir/sdists")]
    sdists_dir: PathBuf,

    /// Directory built wheels are written to.
    #[arg(long, default_value = "work-dir/wheels")]
    wheels_dir: PathBuf,

    /// Python interpreter used to drive the build subprocess.
    #[arg(long, default_value = "python3")]
    python: PathBuf,

    /// Canonical names (`==`-joined to nothing; bare names) to build with
    /// exclusive-build semantics: drain in-flight work before and during.
    #[arg(long)]
    exclusive: Vec<String>,

    /// Upper bound on concurrent build jobs regardless of the cpu/memory formula.
    #[arg(long)]
    jobs: Option<usize>,

    /// Directory per-package build logs and the final summary are written to.
    #[arg(long, default_value = "output/logs")]
    log_dir: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli.command)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "fromager failed");
            eprintln!("error: {err}");
            exit_code_for(&err)
        }
    }
}

/// Fatal errors (bad config, conflicting constraints) get the
/// conventional failure code; everything this binary's `anyhow::Error`
/// can't classify falls back to the same code, matching `spec.md` §7's
/// "F-class errors abort bootstrap immediately" contract at the process
/// boundary.
fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    if let Some(bootstrap_err) = err.downcast_ref::<fromager_bootstrap::Error>() {
        return match bootstrap_err.severity() {
            Severity::Fatal | Severity::NodeFailed => ExitCode::FAILURE,
            Severity::Transient => ExitCode::from(75),
        };
    }
    ExitCode::FAILURE
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Bootstrap(args) => run_bootstrap(args).await,
        Commands::BuildParallel(args) => run_build_parallel(args).await,
    }
}

async fn run_bootstrap(args: BootstrapArgs) -> Result<()> {
    fs_err::create_dir_all(&args.output_dir)?;
    fs_err::create_dir_all(&args.work_dir)?;

    let settings = Settings::load(args.settings_file.as_deref(), args.settings_dir.as_deref()).context("loading settings")?;
    let constraints = match &args.constraints {
        Some(path) => ConstraintsStore::load(path, args.skip_constraints).context("loading constraints")?,
        None => ConstraintsStore::empty(args.skip_constraints),
    };

    let prior_graph = match &args.previous_bootstrap_file {
        Some(path) => {
            let text = fs_err::read_to_string(path).context("reading previous-bootstrap-file")?;
            Some(Arc::new(fromager_repeatable::PriorGraph::load(&text).context("parsing previous-bootstrap-file")?))
        }
        None => None,
    };

    let http_client = fromager_resolver::build_http_client(3, std::time::Duration::from_secs(30));
    let resolver = Arc::new(PyPiProvider::new(http_client.clone(), args.index_url.clone()));
    let python = args.python.clone();

    let drivers = Arc::new(Drivers {
        resolver,
        pep517: Arc::new(drivers::SubprocessBuildDriver::new(python.clone())),
        env_installer: Arc::new(drivers::PipEnvInstaller { python: python.clone() }),
        build_driver: Arc::new(drivers::SubprocessBuildDriver::new(python)),
    });

    let roots = Arc::new(Roots {
        sdists: args.work_dir.join("sdists"),
        wheels: args.work_dir.join("wheels"),
        work: args.work_dir.join("build"),
        patches: args.patches_dir.clone(),
        output: args.output_dir.clone(),
    });
    for dir in [&roots.sdists, &roots.wheels, &roots.work] {
        fs_err::create_dir_all(dir)?;
    }

    let ctx = WorkContext {
        settings: Arc::new(settings),
        constraints: Arc::new(constraints),
        variant: args.variant,
        sdist_only: args.sdist_only,
        skip_constraints: args.skip_constraints,
        cache: Arc::new(fromager_cache::WheelCache::open(roots.wheels.clone()).context("opening wheel cache")?),
        graph: Arc::new(Mutex::new(fromager_graph::Graph::new())),
        node_states: Arc::new(Mutex::new(rustc_hash::FxHashMap::default())),
        hooks: Arc::new(HookRegistry::new()),
        drivers,
        roots,
        memo: Arc::new(fromager_bootstrap::MemoTable::new()),
        prior_graph,
        http_client,
        marker_env: Arc::new(MarkerEnvironment::current_platform_default()),
        wheel_server_url: args.wheel_server_url,
    };

    let toplevel: Vec<Requirement> = args
        .requirements
        .iter()
        .map(|raw| raw.parse::<Requirement>().with_context(|| format!("parsing requirement `{raw}`")))
        .collect::<Result<_>>()?;

    let graph = bootstrap(ctx, toplevel).await?;
    println!("bootstrap complete: {} packages recorded", graph.non_root_keys().count());
    Ok(())
}

async fn run_build_parallel(args: BuildParallelArgs) -> Result<()> {
    let graph_text = fs_err::read_to_string(&args.graph_file).context("reading graph file")?;
    let graph: fromager_graph::Graph = serde_json::from_str(&graph_text).context("parsing graph file")?;

    fs_err::create_dir_all(&args.log_dir)?;

    let cores = std::thread::available_parallelism().map(std::num::NonZeroUsize::get).unwrap_or(1);
    let workers = fromager_scheduler::worker_count(cores, 1.0, 4.0, 1.0, args.jobs);

    let exclusive: HashSet<PackageName> = args
        .exclusive
        .iter()
        .map(|raw| PackageName::new(raw).with_context(|| format!("parsing exclusive-build package name `{raw}`")))
        .collect::<Result<_>>()?;

    let job = Arc::new(SourceTreeBuildJob {
        driver: drivers::SubprocessBuildDriver::new(args.python),
        sdists_dir: args.sdists_dir.clone(),
        wheels_dir: args.wheels_dir.clone(),
    });

    let summary = fromager_scheduler::run(&graph, HashSet::new(), &exclusive, workers, job, &args.log_dir).await;
    fromager_scheduler::write_summary(&summary, &args.log_dir).context("writing scheduler summary")?;

    println!("{} completed, {} failed, {} skipped", summary.completed.len(), summary.failed.len(), summary.skipped.len());
    if !summary.failed.is_empty() {
        anyhow::bail!("{} build(s) failed; see {}", summary.failed.len(), args.log_dir.join("summary.md").display());
    }
    Ok(())
}

/// Builds a wheel for one graph node from its already-extracted source
/// tree under `sdists_dir/<key>`, using a throwaway build environment
/// directory per job.
struct SourceTreeBuildJob {
    driver: drivers::SubprocessBuildDriver,
    sdists_dir: PathBuf,
    wheels_dir: PathBuf,
}

#[async_trait::async_trait]
impl fromager_scheduler::BuildJob for SourceTreeBuildJob {
    async fn build(&self, key: &str, log_path: &std::path::Path) -> Result<(), fromager_scheduler::JobError> {
        let to_job_error = |detail: String| fromager_scheduler::JobError { key: key.to_string(), detail };

        let source_root = self.sdists_dir.join(key);
        let build_env_root = self.wheels_dir.join("envs").join(key);
        fs_err::create_dir_all(&build_env_root).map_err(|e| to_job_error(e.to_string()))?;

        let wheel = fromager_build::BuildDriver::build_wheel(&self.driver, &source_root, &build_env_root)
            .await
            .map_err(|e| to_job_error(e.to_string()))?;

        let dest = self.wheels_dir.join(wheel.file_name().unwrap_or_default());
        fs_err::rename(&wheel, &dest).map_err(|e| to_job_error(e.to_string()))?;
        fs_err::write(log_path, format!("built {key} -> {}\n", dest.display())).map_err(|e| to_job_error(e.to_string()))?;
        Ok(())
    }
}
