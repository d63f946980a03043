use crate::process_manager::{ProcessError, ProcessOutcome};

/// One phase's verdict plus everything it printed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseResult {
    pub ok: bool,
    pub raw_output: String,
    pub error: Option<String>,
    pub deadline_exceeded: bool,
    /// The process never ran; `error` holds the spawn failure.
    pub spawn_failed: bool,
}

impl PhaseResult {
    pub fn from_outcome(outcome: Result<ProcessOutcome, ProcessError>) -> Self {
        match outcome {
            Ok(outcome) => Self {
                ok: outcome.success(),
                deadline_exceeded: outcome.deadline_exceeded,
                error: (!outcome.success()).then(|| outcome.diagnostic.clone()),
                raw_output: outcome.output,
                spawn_failed: false,
            },
            Err(error) => Self {
                ok: false,
                raw_output: String::new(),
                error: Some(error.to_string()),
                deadline_exceeded: false,
                spawn_failed: true,
            },
        }
    }

    pub fn spawned(&self) -> bool {
        !self.spawn_failed
    }
}

const EXCLUSION_MARKERS: &[&str] = &[
    "build constraints exclude all Go files",
    "no Go files in",
    "matched no packages",
    "no packages to vet",
    "[setup failed]",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisVerdict {
    Clean,
    NothingToAnalyze,
    Issues(Vec<String>),
}

pub fn classify_static_analysis(result: &PhaseResult, benign_patterns: &[String]) -> AnalysisVerdict {
    let excluded = has_exclusion_marker(&result.raw_output);
    if result.ok {
        return if excluded {
            AnalysisVerdict::NothingToAnalyze
        } else {
            AnalysisVerdict::Clean
        };
    }

    let issues = result
        .raw_output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with('#') && !line.starts_with("exit status "))
        .filter(|line| !EXCLUSION_MARKERS.iter().any(|marker| line.contains(marker)))
        .filter(|line| !line.starts_with("go: warning:"))
        .filter(|line| {
            !benign_patterns
                .iter()
                .any(|pattern| line.contains(pattern.as_str()))
        })
        .map(str::to_owned)
        .collect::<Vec<String>>();

    if !issues.is_empty() {
        return AnalysisVerdict::Issues(issues);
    }
    if excluded {
        AnalysisVerdict::NothingToAnalyze
    } else if result.raw_output.trim().is_empty() {
        // Non-zero exit with nothing printed: the tool itself failed.
        AnalysisVerdict::Issues(vec![result
            .error
            .clone()
            .unwrap_or_else(|| "static analysis failed without output".to_owned())])
    } else {
        AnalysisVerdict::Clean
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestVerdict {
    Passing,
    /// Non-zero exit caused only by packages the build constraints exclude on this target.
    PassingWithExclusions,
    NoTests,
    Failed,
}

impl TestVerdict {
    pub fn passed(self) -> bool {
        !matches!(self, TestVerdict::Failed)
    }
}

pub fn evaluate_test_results(result: &PhaseResult) -> TestVerdict {
    if result.ok {
        if !tests_ran(&result.raw_output) && result.raw_output.contains("[no test files]") {
            return TestVerdict::NoTests;
        }
        return TestVerdict::Passing;
    }
    if has_failure_marker(&result.raw_output) {
        return TestVerdict::Failed;
    }
    if !result.deadline_exceeded && has_exclusion_marker(&result.raw_output) {
        return TestVerdict::PassingWithExclusions;
    }
    TestVerdict::Failed
}

pub fn has_failure_marker(output: &str) -> bool {
    output.lines().any(|line| {
        let trimmed = line.trim();
        trimmed.starts_with("--- FAIL:")
            || trimmed.starts_with("panic: ")
            || trimmed.ends_with("[build failed]")
            || (trimmed.starts_with("FAIL\t") && !trimmed.ends_with("[setup failed]"))
    })
}

pub fn has_exclusion_marker(output: &str) -> bool {
    EXCLUSION_MARKERS.iter().any(|marker| output.contains(marker))
}

/// Whether any test actually executed, as opposed to every package having no tests.
pub fn tests_ran(output: &str) -> bool {
    output.lines().any(|line| {
        let trimmed = line.trim_start();
        trimmed.starts_with("=== RUN")
            || trimmed.starts_with("--- ")
            || trimmed.starts_with("ok  \t")
            || trimmed.starts_with("ok \t")
    })
}

#[cfg(test)]
#[path = "../tests/classify_tests.rs"]
mod tests;
