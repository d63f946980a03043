use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::config::Toolchain;
use crate::process_manager::{CommandRunner, CommandSpec};

const LIST_TEMPLATE: &str = "{{.ImportPath}} {{.TestGoFiles}} {{.XTestGoFiles}}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossTargetDetection {
    pub enabled: bool,
    /// Test files that only compile for the cross target.
    pub cross_only: Vec<String>,
    pub evidence: Vec<String>,
}

/// True iff the cross listing names a test file the native listing does not.
pub fn should_enable_cross_target(native_listing: &str, cross_listing: &str) -> bool {
    !cross_only_files(native_listing, cross_listing).is_empty()
}

pub fn cross_only_files(native_listing: &str, cross_listing: &str) -> Vec<String> {
    let native = parse_listing(native_listing);
    parse_listing(cross_listing)
        .difference(&native)
        .cloned()
        .collect::<Vec<String>>()
}

/// Parses `pkg [a_test.go b_test.go] [c_test.go]` lines into `pkg/file` paths. Lines without
/// a bracketed file list are diagnostics, not package entries.
pub fn parse_listing(listing: &str) -> BTreeSet<String> {
    let mut files = BTreeSet::<String>::new();
    for line in listing.lines() {
        let line = line.trim();
        let Some(open) = line.find('[') else {
            continue;
        };
        let package = line[..open].trim();
        if package.is_empty() || package.contains(char::is_whitespace) {
            continue;
        }
        for group in line[open..].split(']') {
            let Some(inner) = group.trim().strip_prefix('[') else {
                continue;
            };
            for file in inner.split_whitespace() {
                files.insert(format!("{package}/{file}"));
            }
        }
    }
    files
}

pub fn listing_command(
    toolchain: &Toolchain,
    root: &Path,
    tags: Option<&str>,
    cross: bool,
) -> CommandSpec {
    let mut spec = CommandSpec::new(&toolchain.go, root).arg("list");
    if let Some(tag) = tags {
        spec = spec.arg("-tags").arg(tag);
    }
    spec = spec.arg("-f").arg(LIST_TEMPLATE).arg("./...");
    if cross {
        for (key, value) in &toolchain.cross_env {
            spec = spec.env(key, value);
        }
    }
    spec
}

/// Lists test files for both targets and compares them. If either listing fails to produce
/// package entries the comparison is meaningless and the cross-target pass stays off.
pub fn detect(
    runner: &dyn CommandRunner,
    toolchain: &Toolchain,
    root: &Path,
    tags: Option<&str>,
    deadline: Duration,
) -> CrossTargetDetection {
    let mut evidence = Vec::<String>::new();
    let mut listing = |cross: bool| -> Option<String> {
        let spec = listing_command(toolchain, root, tags, cross);
        match runner.run(&spec, Some(deadline)) {
            Ok(outcome) if outcome.deadline_exceeded => {
                evidence.push(format!("`{}` exceeded its deadline", spec.display()));
                None
            }
            Ok(outcome) if !outcome.success() && parse_listing(&outcome.output).is_empty() => {
                evidence.push(format!(
                    "`{}` failed ({}) without listing packages",
                    spec.display(),
                    outcome.diagnostic
                ));
                None
            }
            Ok(outcome) => Some(outcome.output),
            Err(error) => {
                evidence.push(format!("`{}` failed: {error}", spec.display()));
                None
            }
        }
    };
    let native = listing(false);
    let cross = listing(true);
    let (Some(native), Some(cross)) = (native, cross) else {
        debug!("cross target detection skipped after a failed listing");
        return CrossTargetDetection {
            enabled: false,
            cross_only: Vec::new(),
            evidence,
        };
    };
    let cross_only = cross_only_files(&native, &cross);
    if cross_only.is_empty() {
        evidence.push("no cross-target-only test files".to_owned());
    } else {
        evidence.push(format!("cross-target-only: {}", cross_only.join(", ")));
    }
    debug!(cross_only = cross_only.len(), "cross target detection finished");
    CrossTargetDetection {
        enabled: !cross_only.is_empty(),
        cross_only,
        evidence,
    }
}

#[cfg(test)]
#[path = "tests/targets_tests.rs"]
mod tests;
