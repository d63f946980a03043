use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::config::Toolchain;
use crate::process_manager::{CommandRunner, CommandSpec, ProcessError};

static COVERAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"coverage: (\d+(?:\.\d+)?)% of statements(?: in (\S+))?")
        .expect("coverage regex")
});
static TOTAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^total:.*?(\d+(?:\.\d+)?)%\s*$").expect("total regex"));

#[derive(Debug, thiserror::Error)]
pub enum CoverageError {
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("coverage profile io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("`{command}` failed ({diagnostic})")]
    CommandFailed { command: String, diagnostic: String },
    #[error("no packages listed for coverage")]
    NoPackages,
    #[error("no coverage profiles were produced")]
    NoProfiles,
    #[error("coverage report has no `total:` line")]
    MissingTotal,
}

/// Averages the highest reported percentage of each package, formatted to one decimal.
/// Returns `"0"` when the output carries no coverage lines.
pub fn approximate(output: &str) -> String {
    let per_package = collect_package_coverage(output);
    if per_package.is_empty() {
        return "0".to_owned();
    }
    let total = per_package.values().sum::<f64>();
    format_percent(total / per_package.len() as f64)
}

pub fn collect_package_coverage(output: &str) -> BTreeMap<String, f64> {
    let mut per_package = BTreeMap::<String, f64>::new();
    let mut unattributed = Vec::<f64>::new();

    let mut record = |package: String, value: f64| {
        per_package
            .entry(package)
            .and_modify(|current| *current = current.max(value))
            .or_insert(value);
    };

    for line in output.lines() {
        let reporter = summary_package(line);
        match COVERAGE_RE.captures(line) {
            Some(captures) => {
                let Some(value) = captures
                    .get(1)
                    .and_then(|raw| raw.as_str().parse::<f64>().ok())
                else {
                    continue;
                };
                if let Some(target) = captures.get(2) {
                    record(target.as_str().to_owned(), value);
                } else if let Some(package) = reporter {
                    record(package.to_owned(), value);
                } else {
                    unattributed.push(value);
                }
            }
            None => {
                // `go test -v` prints the coverage line before the package summary.
                if let Some(package) = reporter {
                    for value in unattributed.drain(..) {
                        record(package.to_owned(), value);
                    }
                }
            }
        }
    }
    for value in unattributed {
        record(String::new(), value);
    }
    per_package
}

/// Takes the better of two formatted percentages.
pub fn merge_higher(native: &str, cross: &str) -> String {
    let parse = |raw: &str| raw.parse::<f64>().unwrap_or(0.0);
    if parse(cross) > parse(native) {
        cross.to_owned()
    } else {
        native.to_owned()
    }
}

pub fn format_percent(value: f64) -> String {
    format!("{value:.1}")
}

fn summary_package(line: &str) -> Option<&str> {
    let rest = line
        .strip_prefix("ok")
        .or_else(|| line.strip_prefix("FAIL"))?;
    if !rest.starts_with([' ', '\t']) {
        return None;
    }
    rest.split_whitespace().next()
}

/// Runs every package separately with a coverage profile and asks the coverage tool for the
/// merged total.
pub fn exact(
    runner: &dyn CommandRunner,
    toolchain: &Toolchain,
    root: &Path,
    tags: Option<&str>,
    deadline: Duration,
) -> Result<String, CoverageError> {
    let list = CommandSpec::new(&toolchain.go, root).args(["list", "./..."]);
    let listed = runner.run(&list, Some(deadline))?;
    if !listed.success() {
        return Err(CoverageError::CommandFailed {
            command: list.display(),
            diagnostic: listed.diagnostic,
        });
    }
    let packages = listed
        .output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.contains(' '))
        .map(str::to_owned)
        .collect::<Vec<String>>();
    if packages.is_empty() {
        return Err(CoverageError::NoPackages);
    }

    let workdir = tempfile::tempdir()?;
    let mut header: Option<String> = None;
    let mut body = String::new();
    for (index, package) in packages.iter().enumerate() {
        let profile = workdir.path().join(format!("pkg-{index}.out"));
        let mut spec = CommandSpec::new(&toolchain.go, root).args(["test", "-count=1"]);
        if let Some(tag) = tags {
            spec = spec.arg("-tags").arg(tag);
        }
        let spec = spec
            .arg(format!("-coverprofile={}", profile.display()))
            .arg(package.as_str());
        let outcome = runner.run(&spec, Some(deadline))?;
        if !outcome.success() {
            debug!(package = %package, exit = %outcome.diagnostic, "package coverage run failed");
        }
        let Ok(raw) = fs::read_to_string(&profile) else {
            continue;
        };
        let mut lines = raw.lines();
        let Some(first) = lines.next() else {
            continue;
        };
        if first.starts_with("mode:") {
            header.get_or_insert_with(|| first.to_owned());
        } else {
            body.push_str(first);
            body.push('\n');
        }
        for line in lines {
            body.push_str(line);
            body.push('\n');
        }
    }
    let Some(header) = header else {
        return Err(CoverageError::NoProfiles);
    };

    let merged = workdir.path().join("merged.out");
    fs::write(&merged, format!("{header}\n{body}"))?;
    let report = CommandSpec::new(&toolchain.go, root)
        .args(["tool", "cover"])
        .arg(format!("-func={}", merged.display()));
    let reported = runner.run(&report, Some(deadline))?;
    if !reported.success() {
        return Err(CoverageError::CommandFailed {
            command: report.display(),
            diagnostic: reported.diagnostic,
        });
    }
    parse_total(&reported.output).ok_or(CoverageError::MissingTotal)
}

pub fn parse_total(report: &str) -> Option<String> {
    report
        .lines()
        .rev()
        .find_map(|line| TOTAL_RE.captures(line.trim()))
        .and_then(|captures| captures.get(1))
        .map(|value| value.as_str().to_owned())
}

/// Exact total when possible, approximate from `output` otherwise.
pub fn exact_or_approximate(
    runner: &dyn CommandRunner,
    toolchain: &Toolchain,
    root: &Path,
    tags: Option<&str>,
    deadline: Duration,
    output: &str,
) -> String {
    match exact(runner, toolchain, root, tags, deadline) {
        Ok(total) => total,
        Err(error) => {
            warn!(error = %error, "exact coverage failed, falling back to approximate");
            approximate(output)
        }
    }
}

#[cfg(test)]
#[path = "tests/coverage_tests.rs"]
mod tests;
