pub mod analysis;
pub mod cache;
pub mod config;
pub mod coverage;
pub mod filter;
pub mod orchestrator;
pub mod process_manager;
pub mod targets;
pub mod ui;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;

use cache::{CacheError, ResultCache};
use config::{Config, ConfigError};
use orchestrator::{Orchestrator, Reporter, RunError, TestRun};
use process_manager::SystemRunner;

/// Runs a Go project's tests natively and under the wasm harness, and prints one summary.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = "tollgate", version)]
pub struct Cli {
    /// Project root; defaults to the current directory.
    #[arg(long, value_name = "PATH")]
    pub repo: Option<PathBuf>,
    /// Per-process test timeout in seconds.
    #[arg(
        long,
        env = config::TIMEOUT_ENV,
        value_name = "SECS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout: Option<u64>,
    /// Run without the race detector.
    #[arg(long)]
    pub no_race: bool,
    /// Ignore a cached passing result.
    #[arg(long)]
    pub no_cache: bool,
    /// Include integration-tagged tests.
    #[arg(long)]
    pub all: bool,
    /// Merge per-package profiles for an exact coverage total.
    #[arg(long)]
    pub exact_coverage: bool,
    /// One summary message per line, plus phase steps.
    #[arg(long, short)]
    pub verbose: bool,
    /// Delete the cached result for this project and exit.
    #[arg(long, conflicts_with_all = ["no_race", "no_cache", "all", "exact_coverage", "runner_args"])]
    pub clear_cache: bool,
    /// Passed straight to `go test`; skips static analysis and the cache.
    #[arg(last = true, value_name = "RUNNER_ARGS")]
    pub runner_args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(RunArgs),
    ClearCache { repo_override: Option<PathBuf> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArgs {
    pub repo_override: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub no_race: bool,
    pub no_cache: bool,
    pub run_all: bool,
    pub exact_coverage: bool,
    pub verbose: bool,
    pub runner_args: Vec<String>,
}

impl RunArgs {
    /// Command line flags win over `tollgate.toml`.
    pub fn to_test_run(&self, config: &Config) -> TestRun {
        let mut run = TestRun::from_config(config);
        run.custom_args = self.runner_args.clone();
        run.skip_race |= self.no_race;
        run.no_cache |= self.no_cache;
        run.run_all = self.run_all;
        run.exact_coverage |= self.exact_coverage;
        run.verbose = self.verbose;
        if let Some(timeout) = self.timeout_secs {
            run.timeout_secs = timeout;
        }
        run
    }
}

impl From<Cli> for Command {
    fn from(cli: Cli) -> Self {
        if cli.clear_cache {
            return Command::ClearCache {
                repo_override: cli.repo,
            };
        }
        Command::Run(RunArgs {
            repo_override: cli.repo,
            timeout_secs: cli.timeout,
            no_race: cli.no_race,
            no_cache: cli.no_cache,
            run_all: cli.all,
            exact_coverage: cli.exact_coverage,
            verbose: cli.verbose,
            runner_args: cli.runner_args,
        })
    }
}

/// Parses arguments without the program name.
pub fn parse_command<I>(args: I) -> Result<Command, clap::Error>
where
    I: IntoIterator<Item = String>,
{
    let argv = std::iter::once("tollgate".to_owned()).chain(args);
    Cli::try_parse_from(argv).map(Command::from)
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to resolve the working directory: {0}")]
    CurrentDir(#[source] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Run(#[from] RunError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    Summary(String),
    CacheCleared { removed: bool },
}

pub fn run_command(
    command: Command,
    reporter: Arc<dyn Reporter>,
) -> Result<CommandOutput, CommandError> {
    match command {
        Command::ClearCache { repo_override } => {
            let root = resolve_root(repo_override.as_deref())?;
            let removed = ResultCache::new(&root).invalidate()?;
            Ok(CommandOutput::CacheCleared { removed })
        }
        Command::Run(args) => {
            let root = resolve_root(args.repo_override.as_deref())?;
            let config = Config::load(&root)?;
            let run = args.to_test_run(&config);
            tracing::debug!(root = %root.display(), fast_path = run.fast_path(), "starting run");
            let orchestrator =
                Orchestrator::new(&root, config, Arc::new(SystemRunner::default()), reporter);
            Ok(CommandOutput::Summary(orchestrator.run(&run)?))
        }
    }
}

fn resolve_root(repo_override: Option<&Path>) -> Result<PathBuf, CommandError> {
    match repo_override {
        Some(path) => Ok(path.to_path_buf()),
        None => std::env::current_dir().map_err(CommandError::CurrentDir),
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
