//! Sequences the test phases of one invocation and derives the final status.
//!
//! Phase 1 runs static analysis and cross target detection side by side. Phase 2 runs the
//! native tests. Phase 3 runs the cross target tests when detection, or a native run that
//! only failed on excluded packages, asks for it. Native and cross passes never overlap.

pub mod classify;
pub mod commands;
pub mod reporter;
pub mod summary;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::analysis::{discovered_test_names, find_hanging_test, slowest_test, timed_out_tests};
use crate::cache::ResultCache;
use crate::config::{Config, PROCESS_GRACE_SECS};
use crate::coverage;
use crate::filter::ConsoleFilter;
use crate::process_manager::{CommandRunner, CommandSpec};
use crate::targets::{self, CrossTargetDetection};

use classify::{
    classify_static_analysis, evaluate_test_results, tests_ran, AnalysisVerdict, PhaseResult,
    TestVerdict,
};
use commands::TestFlags;
pub use reporter::{CollectingReporter, Phase, ReportEvent, Reporter};
pub use summary::{AnalysisStatus, RaceStatus, StatusMessage, StatusSummary, TestStatus, Topic};

const TIMEOUT_MARKER: &str = "panic: test timed out";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRun {
    /// Non-empty selects the fast path: no static analysis, no cache, the caller owns `-race`.
    pub custom_args: Vec<String>,
    pub skip_race: bool,
    pub timeout_secs: u64,
    pub no_cache: bool,
    /// Includes integration-tagged tests.
    pub run_all: bool,
    pub exact_coverage: bool,
    pub verbose: bool,
}

impl TestRun {
    pub fn from_config(config: &Config) -> Self {
        Self {
            custom_args: Vec::new(),
            skip_race: !config.tests.race,
            timeout_secs: config.tests.timeout_secs,
            no_cache: !config.cache.enabled,
            run_all: false,
            exact_coverage: config.tests.exact_coverage,
            verbose: false,
        }
    }

    pub fn fast_path(&self) -> bool {
        !self.custom_args.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("{summary}")]
    Failed { summary: String },
}

/// A streamed phase: its verdict plus what the console filter saw.
struct StreamedPhase {
    result: PhaseResult,
    race_detected: bool,
}

pub struct Orchestrator {
    root: PathBuf,
    config: Config,
    runner: Arc<dyn CommandRunner>,
    reporter: Arc<dyn Reporter>,
    cache: ResultCache,
}

impl Orchestrator {
    pub fn new(
        root: &Path,
        config: Config,
        runner: Arc<dyn CommandRunner>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            cache: ResultCache::new(root),
            root: root.to_path_buf(),
            config,
            runner,
            reporter,
        }
    }

    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn run(&self, run: &TestRun) -> Result<String, RunError> {
        let started = Instant::now();
        let fast_path = run.fast_path();
        let cache_enabled = self.config.cache.enabled;

        if !fast_path && cache_enabled && !run.no_cache {
            if let Some(entry) = self.cache.valid_entry() {
                info!(key = %entry.key, "source unchanged since last passing run, skipping tests");
                return Ok(entry.message);
            }
        }

        let tags = run
            .run_all
            .then_some(self.config.toolchain.integration_tag.as_str());
        let deadline = Duration::from_secs(run.timeout_secs + PROCESS_GRACE_SECS);
        let flags = TestFlags {
            timeout_secs: run.timeout_secs,
            race: !run.skip_race,
            tags,
        };
        let mut summary = StatusSummary::default();

        let detection = if fast_path {
            self.detect_targets(tags, deadline)
        } else {
            let (analysis, detection) = std::thread::scope(|scope| {
                let analysis = scope.spawn(|| self.static_analysis(tags, deadline));
                let detection = scope.spawn(|| self.detect_targets(tags, deadline));
                (
                    analysis
                        .join()
                        .expect("static analysis thread panicked unexpectedly"),
                    detection
                        .join()
                        .expect("target detection thread panicked unexpectedly"),
                )
            });
            self.record_analysis(&mut summary, &analysis);
            detection
        };

        let module = module_name(&self.root);

        let native_spec = if fast_path {
            commands::custom_native(&self.config.toolchain, &self.root, &run.custom_args)
        } else {
            commands::native_tests(&self.config.toolchain, &self.root, &flags)
        };
        let native = self.run_filtered(Phase::NativeTests, &native_spec, deadline);
        let native_verdict = record_tests(&mut summary, &native.result, &module);

        if !run.skip_race && native.result.spawned() {
            if native.race_detected || native.result.raw_output.contains("WARNING: DATA RACE") {
                summary.race_status = RaceStatus::Detected;
                summary.push(Topic::Race, false, "data race detected");
            } else {
                summary.race_status = RaceStatus::Clean;
                summary.push(Topic::Race, true, "race detection clean");
            }
        }

        let native_ran = tests_ran(&native.result.raw_output);
        if native_ran {
            self.reporter.phase_started(Phase::Coverage);
            let percent = if run.exact_coverage && !fast_path {
                coverage::exact_or_approximate(
                    self.runner.as_ref(),
                    &self.config.toolchain,
                    &self.root,
                    tags,
                    deadline,
                    &native.result.raw_output,
                )
            } else {
                coverage::approximate(&native.result.raw_output)
            };
            summary.set_coverage(percent);
            self.reporter.phase_finished(Phase::Coverage, true);
        }

        let cross_required = detection.enabled;
        let cross_warranted =
            cross_required || native_verdict == Some(TestVerdict::PassingWithExclusions);
        let mut cross_output = String::new();
        let mut cross_timed_out = false;
        if cross_warranted {
            debug!(
                required = cross_required,
                evidence = %detection.evidence.join("; "),
                "running cross target tests"
            );
            match self.ensure_harness(deadline) {
                Err(error) => {
                    summary.push(
                        Topic::CrossTarget,
                        false,
                        format!("wasm harness unavailable: {error}"),
                    );
                    if cross_required {
                        summary.fail_tests();
                    }
                }
                Ok(()) => {
                    let cross_spec = if fast_path {
                        commands::custom_cross(
                            &self.config.toolchain,
                            &self.root,
                            &run.custom_args,
                        )
                    } else {
                        commands::cross_tests(&self.config.toolchain, &self.root, &flags)
                    };
                    let cross = self.run_filtered(Phase::CrossTests, &cross_spec, deadline);
                    record_cross_tests(&mut summary, &cross.result, &module);
                    if tests_ran(&cross.result.raw_output) {
                        let merged = coverage::merge_higher(
                            &summary.coverage_percent,
                            &coverage::approximate(&cross.result.raw_output),
                        );
                        summary.set_coverage(merged);
                    }
                    cross_timed_out = cross.result.deadline_exceeded;
                    cross_output = cross.result.raw_output;
                }
            }
        }

        let combined = format!("{}{cross_output}", native.result.raw_output);
        if native.result.deadline_exceeded || cross_timed_out || combined.contains(TIMEOUT_MARKER)
        {
            let mut culprits = timed_out_tests(&combined);
            if culprits.is_empty() && cross_timed_out {
                culprits.extend(self.search_cross_culprit(&flags, deadline));
            }
            if culprits.is_empty() {
                summary.push(
                    Topic::Timeout,
                    false,
                    format!("tests exceeded {}s", run.timeout_secs),
                );
            } else {
                summary.push(
                    Topic::Timeout,
                    false,
                    format!("test timed out: {}", culprits.join(", ")),
                );
            }
            summary.fail_tests();
        }

        if let Some(slow) = slowest_test(&combined, self.config.tests.slow_threshold_secs) {
            summary.push(
                Topic::SlowTest,
                false,
                format!("slow test {} ({:.2}s)", slow.name, slow.seconds),
            );
        }

        if fast_path {
            summary.strip(Topic::Race);
        }

        let rendered = summary.render(started.elapsed(), run.verbose);
        info!(
            failed = summary.failed(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "run finished"
        );
        if summary.failed() {
            return Err(RunError::Failed { summary: rendered });
        }
        if !fast_path && cache_enabled {
            self.cache.save_or_warn(&rendered);
        }
        Ok(rendered)
    }

    fn static_analysis(&self, tags: Option<&str>, deadline: Duration) -> PhaseResult {
        self.reporter.phase_started(Phase::StaticAnalysis);
        let spec = commands::vet(&self.config.toolchain, &self.root, tags);
        debug!(command = %spec.display(), "running static analysis");
        let result = PhaseResult::from_outcome(self.runner.run(&spec, Some(deadline)));
        self.reporter.phase_finished(Phase::StaticAnalysis, result.ok);
        result
    }

    fn detect_targets(&self, tags: Option<&str>, deadline: Duration) -> CrossTargetDetection {
        self.reporter.phase_started(Phase::TargetDetection);
        let detection = targets::detect(
            self.runner.as_ref(),
            &self.config.toolchain,
            &self.root,
            tags,
            deadline,
        );
        self.reporter.phase_finished(Phase::TargetDetection, true);
        detection
    }

    fn record_analysis(&self, summary: &mut StatusSummary, result: &PhaseResult) {
        if !result.spawned() {
            if let Some(error) = &result.error {
                summary.analysis_status = AnalysisStatus::Issues;
                summary.push(
                    Topic::Analysis,
                    false,
                    format!("vet failed to start: {error}"),
                );
                return;
            }
        }
        match classify_static_analysis(result, &self.config.analysis.benign_patterns) {
            AnalysisVerdict::Clean => summary.push(Topic::Analysis, true, "vet ok"),
            AnalysisVerdict::NothingToAnalyze => {
                summary.push(Topic::Analysis, true, "vet ok (nothing to analyze)")
            }
            AnalysisVerdict::Issues(issues) => {
                for issue in &issues {
                    self.reporter.line(issue);
                }
                summary.analysis_status = AnalysisStatus::Issues;
                summary.push(
                    Topic::Analysis,
                    false,
                    format!("vet found {} issue(s)", issues.len()),
                );
            }
        }
    }

    /// Runs one command with its output streamed through a fresh console filter.
    fn run_filtered(&self, phase: Phase, spec: &CommandSpec, deadline: Duration) -> StreamedPhase {
        self.reporter.phase_started(phase);
        debug!(phase = phase.label(), command = %spec.display(), "running");
        let started = Instant::now();
        let reporter = self.reporter.as_ref();
        let mut filter = ConsoleFilter::new();
        let outcome = self
            .runner
            .run_streaming(spec, Some(deadline), &mut |chunk: &str| {
                filter.add(chunk);
                for line in filter.drain() {
                    reporter.line(&line);
                }
            });
        filter.flush();
        for line in filter.drain() {
            reporter.line(&line);
        }
        let result = PhaseResult::from_outcome(outcome);
        debug!(
            phase = phase.label(),
            ok = result.ok,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "phase finished"
        );
        self.reporter.phase_finished(phase, result.ok);
        StreamedPhase {
            race_detected: filter.race_detected(),
            result,
        }
    }

    fn ensure_harness(&self, deadline: Duration) -> Result<(), String> {
        let toolchain = &self.config.toolchain;
        if self.runner.on_path(&toolchain.harness) {
            return Ok(());
        }
        self.reporter.phase_started(Phase::HarnessInstall);
        let spec = commands::install_harness(toolchain, &self.root);
        info!(command = %spec.display(), "installing wasm test harness");
        let result = match self.runner.run(&spec, Some(deadline)) {
            Ok(outcome) if outcome.success() => Ok(()),
            Ok(outcome) => {
                let detail = outcome
                    .output
                    .lines()
                    .map(str::trim)
                    .rfind(|line| !line.is_empty())
                    .map(str::to_owned)
                    .unwrap_or(outcome.diagnostic);
                Err(format!("`{}` failed: {detail}", spec.display()))
            }
            Err(error) => Err(error.to_string()),
        };
        self.reporter
            .phase_finished(Phase::HarnessInstall, result.is_ok());
        result
    }

    /// The harness buffers output until exit, so a killed cross run names no test. Rerun
    /// each discovered test alone until one exceeds the deadline again.
    fn search_cross_culprit(&self, flags: &TestFlags<'_>, deadline: Duration) -> Option<String> {
        self.reporter.phase_started(Phase::TimeoutSearch);
        let toolchain = &self.config.toolchain;
        let listing = commands::list_cross_tests(toolchain, &self.root, flags.tags);
        let names = match self.runner.run(&listing, Some(deadline)) {
            Ok(outcome) => discovered_test_names(&outcome.output),
            Err(error) => {
                debug!(error = %error, "could not list cross target tests");
                Vec::new()
            }
        };
        info!(candidates = names.len(), "searching for hanging cross target test");
        let found = find_hanging_test(self.runner.as_ref(), &names, deadline, |name| {
            commands::rerun_cross_test(toolchain, &self.root, name, flags)
        });
        self.reporter
            .phase_finished(Phase::TimeoutSearch, found.is_some());
        found
    }
}

/// Records the native verdict; `None` when the command never started.
fn record_tests(
    summary: &mut StatusSummary,
    result: &PhaseResult,
    module: &str,
) -> Option<TestVerdict> {
    if !result.spawned() {
        if let Some(error) = &result.error {
            summary.fail_tests();
            summary.push(Topic::Tests, false, format!("tests failed to start: {error}"));
            return None;
        }
    }
    let verdict = evaluate_test_results(result);
    match verdict {
        TestVerdict::Passing => summary.push(Topic::Tests, true, "tests passed"),
        TestVerdict::PassingWithExclusions => summary.push(
            Topic::Tests,
            true,
            "tests passed (build constraints excluded some packages)",
        ),
        TestVerdict::NoTests => summary.push(Topic::Tests, true, "no test files"),
        TestVerdict::Failed => {
            summary.fail_tests();
            summary.push(Topic::Tests, false, format!("tests failed in {module}"));
        }
    }
    Some(verdict)
}

fn record_cross_tests(summary: &mut StatusSummary, result: &PhaseResult, module: &str) {
    if !result.spawned() {
        if let Some(error) = &result.error {
            summary.fail_tests();
            summary.push(
                Topic::CrossTarget,
                false,
                format!("wasm tests failed to start: {error}"),
            );
            return;
        }
    }
    if evaluate_test_results(result).passed() {
        summary.push(Topic::CrossTarget, true, "wasm tests passed");
    } else {
        summary.fail_tests();
        summary.push(
            Topic::CrossTarget,
            false,
            format!("wasm tests failed in {module}"),
        );
    }
}

/// The `module` line of `go.mod`, or the directory name when there is none.
pub fn module_name(root: &Path) -> String {
    fs::read_to_string(root.join("go.mod"))
        .ok()
        .and_then(|raw| {
            raw.lines().find_map(|line| {
                line.trim()
                    .strip_prefix("module ")
                    .map(|name| name.trim().trim_matches('"').to_owned())
            })
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| {
            root.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| root.display().to_string())
        })
}

#[cfg(test)]
#[path = "../tests/orchestrator_tests.rs"]
mod tests;
