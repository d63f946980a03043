use std::sync::LazyLock;

use regex::Regex;

/// What the filter does with a line once a rule claims it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    /// Flush held-back context, emit the line, and disable filtering for the rest of the stream.
    EnterPanicMode,
    /// Emit immediately, regardless of pass/fail context.
    Emit,
    /// Record that a data race was observed; drop the line.
    MarkRace,
    Drop,
    /// Rewrite an absolute stack frame to `file.go:line` and hold it back.
    ShortenFrame,
    /// Flush held-back context, then drop the line.
    FlushAndDrop,
}

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub matches: fn(&str) -> bool,
    pub action: RuleAction,
}

/// Evaluated top to bottom; the first match wins. Lines matching nothing are held back.
pub static RULES: &[Rule] = &[
    Rule {
        name: "panic",
        matches: is_panic_marker,
        action: RuleAction::EnterPanicMode,
    },
    Rule {
        name: "always-show",
        matches: is_always_show,
        action: RuleAction::Emit,
    },
    Rule {
        name: "data-race",
        matches: is_race_marker,
        action: RuleAction::MarkRace,
    },
    Rule {
        name: "noise",
        matches: is_noise,
        action: RuleAction::Drop,
    },
    Rule {
        name: "stdlib-frame",
        matches: is_stdlib_frame,
        action: RuleAction::Drop,
    },
    Rule {
        name: "project-frame",
        matches: is_project_frame,
        action: RuleAction::ShortenFrame,
    },
    Rule {
        name: "pointer-call",
        matches: is_pointer_call,
        action: RuleAction::Drop,
    },
    Rule {
        name: "result-marker",
        matches: is_result_marker,
        action: RuleAction::FlushAndDrop,
    },
];

pub fn classify(line: &str) -> Option<&'static Rule> {
    RULES.iter().find(|rule| (rule.matches)(line))
}

pub const RACE_BANNER: &str =
    "WARNING: DATA RACE detected (individual reports suppressed; rerun the package with -race for details)";

const NOISE_EXACT: &[&str] = &["PASS", "=================="];

const NOISE_PREFIXES: &[&str] = &[
    "go: downloading ",
    "go: finding ",
    "go: extracting ",
    "=== PAUSE ",
    "=== CONT ",
    "=== NAME ",
    "exit status ",
    "testing: warning: no tests to run",
];

const NOISE_CONTAINS: &[&str] = &["[no test files]", "(cached)", "[no tests to run]"];

const STDLIB_SOURCE_MARKERS: &[&str] = &[
    "/go/src/runtime/",
    "/go/src/testing/",
    "/go/src/sync/",
    "/go/src/reflect/",
    "/libexec/src/",
    "/golang.org/toolchain@",
    "GOROOT/src/",
];

static STARTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*=== RUN\s+(\S+)").expect("started marker regex"));
static PASSED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*--- (?:PASS|SKIP): (\S+)").expect("passed marker regex")
});
static PROJECT_FRAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*/\S*/([^/\s]+\.go:\d+)(?:\s+\+0x[0-9a-fA-F]+)?\s*$")
        .expect("project frame regex")
});
static POINTER_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[\w./*()\[\]-]+\(.*0x[0-9a-fA-F]+.*\)\s*$").expect("pointer call regex")
});

pub fn is_panic_marker(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("panic: ") || trimmed.starts_with("fatal error: ")
}

pub fn is_always_show(line: &str) -> bool {
    line.contains("[DEBUG]") || line.trim_start().starts_with("DEBUG:")
}

pub fn is_race_marker(line: &str) -> bool {
    line.contains("WARNING: DATA RACE")
}

pub fn is_noise(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || NOISE_EXACT.contains(&trimmed) {
        return true;
    }
    NOISE_PREFIXES
        .iter()
        .any(|prefix| trimmed.starts_with(prefix))
        || NOISE_CONTAINS.iter().any(|needle| line.contains(needle))
}

pub fn is_stdlib_frame(line: &str) -> bool {
    line.trim_start().starts_with('/')
        && STDLIB_SOURCE_MARKERS
            .iter()
            .any(|marker| line.contains(marker))
}

pub fn is_project_frame(line: &str) -> bool {
    PROJECT_FRAME_RE.is_match(line)
}

pub fn shorten_frame(line: &str) -> String {
    PROJECT_FRAME_RE
        .captures(line)
        .and_then(|captures| captures.get(1))
        .map(|short| short.as_str().to_owned())
        .unwrap_or_else(|| line.to_owned())
}

pub fn is_pointer_call(line: &str) -> bool {
    !line.contains(".go:") && POINTER_CALL_RE.is_match(line)
}

pub fn is_result_marker(line: &str) -> bool {
    let trimmed = line.trim_end();
    trimmed == "FAIL"
        || trimmed.starts_with("FAIL\t")
        || trimmed.starts_with("ok  \t")
        || trimmed.starts_with("ok \t")
        || trimmed.starts_with("coverage: ")
}

pub fn started_test(line: &str) -> Option<&str> {
    STARTED_RE
        .captures(line)
        .and_then(|captures| captures.get(1))
        .map(|name| name.as_str())
}

pub fn passed_test(line: &str) -> Option<&str> {
    PASSED_RE
        .captures(line)
        .and_then(|captures| captures.get(1))
        .map(|name| name.as_str())
}
