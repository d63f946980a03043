use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info};

use crate::process_manager::{CommandRunner, CommandSpec};

static RESULT_DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*--- (?:PASS|FAIL): (\S+) \((\d+(?:\.\d+)?)s\)").expect("duration regex")
});
static STARTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*=== RUN\s+(\S+)").expect("started regex"));
static FINISHED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*--- (?:PASS|FAIL|SKIP): (\S+)").expect("finished regex")
});
static RUNNING_ENTRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s+(\S+) \(.*\)\s*$").expect("running entry regex"));
static LISTED_TEST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Test\w*$").expect("listed test regex"));

const RUNNING_TESTS_MARKER: &str = "running tests:";
const TIMEOUT_PANIC_MARKER: &str = "panic: test timed out";

#[derive(Debug, Clone, PartialEq)]
pub struct SlowTest {
    pub name: String,
    pub seconds: f64,
}

/// The single slowest test, if it took longer than `threshold_secs`.
pub fn slowest_test(output: &str, threshold_secs: f64) -> Option<SlowTest> {
    output
        .lines()
        .filter_map(|line| RESULT_DURATION_RE.captures(line))
        .filter_map(|captures| {
            let name = captures.get(1)?.as_str().to_owned();
            let seconds = captures.get(2)?.as_str().parse::<f64>().ok()?;
            Some(SlowTest { name, seconds })
        })
        .filter(|test| test.seconds > threshold_secs)
        .max_by(|a, b| a.seconds.total_cmp(&b.seconds))
}

/// Names the tests the runner reported in its own `running tests:` block, falling back to
/// the last started test that never finished.
pub fn timed_out_tests(output: &str) -> Vec<String> {
    let reported = reported_running_tests(output);
    if !reported.is_empty() {
        return reported;
    }
    unfinished_test(output).into_iter().collect()
}

pub fn reported_running_tests(output: &str) -> Vec<String> {
    let mut names = Vec::<String>::new();
    let mut in_block = false;
    for line in output.lines() {
        if line.trim_end().ends_with(RUNNING_TESTS_MARKER) {
            in_block = true;
            continue;
        }
        if !in_block {
            continue;
        }
        match RUNNING_ENTRY_RE.captures(line) {
            Some(captures) => {
                if let Some(name) = captures.get(1) {
                    names.push(name.as_str().to_owned());
                }
            }
            None => in_block = false,
        }
    }
    names
}

pub fn unfinished_test(output: &str) -> Option<String> {
    let mut open = Vec::<String>::new();
    for line in output.lines() {
        if let Some(name) = STARTED_RE.captures(line).and_then(|c| c.get(1)) {
            open.push(name.as_str().to_owned());
        } else if let Some(name) = FINISHED_RE.captures(line).and_then(|c| c.get(1)) {
            if let Some(index) = open.iter().rposition(|open| open == name.as_str()) {
                open.remove(index);
            }
        }
    }
    open.pop()
}

/// Test names in first-seen order, from `=== RUN` markers or a `-list` listing.
pub fn discovered_test_names(output: &str) -> Vec<String> {
    let mut names = Vec::<String>::new();
    for line in output.lines() {
        let candidate = STARTED_RE
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|name| name.as_str())
            .or_else(|| {
                let trimmed = line.trim();
                LISTED_TEST_RE.is_match(trimmed).then_some(trimmed)
            });
        let Some(name) = candidate else {
            continue;
        };
        // Subtests rerun through their parent.
        let top_level = name.split('/').next().unwrap_or(name);
        if !names.iter().any(|seen| seen == top_level) {
            names.push(top_level.to_owned());
        }
    }
    names
}

/// Reruns each candidate on its own, one process at a time, and returns the first one that
/// still exceeds the deadline, either killed by it or stopped by the runner's own timer.
pub fn find_hanging_test<F>(
    runner: &dyn CommandRunner,
    candidates: &[String],
    deadline: Duration,
    build: F,
) -> Option<String>
where
    F: Fn(&str) -> CommandSpec,
{
    for name in candidates {
        let spec = build(name);
        debug!(test = %name, "rerunning test in isolation");
        match runner.run(&spec, Some(deadline)) {
            Ok(outcome)
                if outcome.deadline_exceeded || outcome.output.contains(TIMEOUT_PANIC_MARKER) =>
            {
                info!(test = %name, "isolated rerun exceeded deadline");
                return Some(name.clone());
            }
            Ok(_) => {}
            Err(error) => {
                debug!(test = %name, error = %error, "isolated rerun failed to start");
            }
        }
    }
    None
}

#[cfg(test)]
#[path = "tests/analysis_tests.rs"]
mod tests;
