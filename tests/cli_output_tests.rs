use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const FAKE_GO: &str = r#"#!/bin/sh
echo "$*" >> "$TOLLGATE_FAKE_LOG"
case "$1" in
  vet|list|install) exit 0 ;;
  test)
    if [ -n "$TOLLGATE_FAKE_FAIL" ]; then
      printf '=== RUN   TestBoom\n    demo_test.go:5: boom\n--- FAIL: TestBoom (0.01s)\nFAIL\nFAIL\texample.com/demo\t0.02s\n'
      exit 1
    fi
    printf '=== RUN   TestAdd\n--- PASS: TestAdd (0.00s)\nPASS\ncoverage: 75.0%% of statements\nok  \texample.com/demo\t0.01s\n'
    ;;
esac
"#;

struct Workspace {
    project: tempfile::TempDir,
    tools: tempfile::TempDir,
    tmp: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        let project = tempfile::tempdir().expect("project dir");
        let tools = tempfile::tempdir().expect("tools dir");
        let tmp = tempfile::tempdir().expect("tmp dir");

        let go = tools.path().join("go");
        fs::write(&go, FAKE_GO).expect("write fake go");
        fs::set_permissions(&go, fs::Permissions::from_mode(0o755)).expect("chmod fake go");

        fs::write(project.path().join("go.mod"), "module example.com/demo\n").expect("go.mod");
        fs::write(project.path().join("demo.go"), "package demo\n").expect("source");
        fs::write(
            project.path().join("tollgate.toml"),
            format!("[toolchain]\ngo = \"{}\"\n", go.display()),
        )
        .expect("write config");

        Self {
            project,
            tools,
            tmp,
        }
    }

    fn log_path(&self) -> PathBuf {
        self.tools.path().join("calls.log")
    }

    fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.log_path())
            .unwrap_or_default()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    fn command(&self) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_tollgate"));
        command
            .arg("--repo")
            .arg(self.project.path())
            .env("NO_COLOR", "1")
            .env("TMPDIR", self.tmp.path())
            .env("TOLLGATE_FAKE_LOG", self.log_path())
            .env_remove("TOLLGATE_TIMEOUT")
            .env_remove("TOLLGATE_FAKE_FAIL");
        command
    }
}

fn run(command: &mut Command) -> Output {
    command.output().expect("run tollgate")
}

fn describe(output: &Output) -> String {
    format!(
        "status={:?}\nstdout={}\nstderr={}",
        output.status.code(),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

fn test_invocations(calls: &[String]) -> usize {
    calls.iter().filter(|call| call.starts_with("test ")).count()
}

#[test]
fn cli_passing_run_prints_success_block() {
    let ws = Workspace::new();
    let output = run(&mut ws.command());

    assert_eq!(output.status.code(), Some(0), "{}", describe(&output));
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    assert!(stdout.starts_with("[success] Tests passed\n"), "{stdout}");
    assert!(stdout.contains("✅ vet ok, ✅ tests passed, ✅ race detection clean, ✅ coverage 75.0%"));
    assert!(!stdout.contains('\u{1b}'));

    let calls = ws.calls();
    assert!(calls.iter().any(|call| call == "vet ./..."));
    assert!(calls
        .iter()
        .any(|call| call.starts_with("test -v -cover -coverpkg=./... -count=1 -timeout 30s -race")));
}

#[test]
fn cli_second_run_is_served_from_cache() {
    let ws = Workspace::new();
    let first = run(&mut ws.command());
    assert_eq!(first.status.code(), Some(0), "{}", describe(&first));
    let after_first = test_invocations(&ws.calls());

    let second = run(&mut ws.command());
    assert_eq!(second.status.code(), Some(0), "{}", describe(&second));
    assert_eq!(test_invocations(&ws.calls()), after_first);
    assert_eq!(first.stdout, second.stdout);

    let third = run(ws.command().arg("--no-cache"));
    assert_eq!(third.status.code(), Some(0), "{}", describe(&third));
    assert_eq!(test_invocations(&ws.calls()), after_first + 1);
}

#[test]
fn cli_failing_run_exits_one_with_diagnostics() {
    let ws = Workspace::new();
    let output = run(ws.command().env("TOLLGATE_FAKE_FAIL", "1"));

    assert_eq!(output.status.code(), Some(1), "{}", describe(&output));
    let stderr = String::from_utf8(output.stderr).expect("utf8 stderr");
    assert!(stderr.contains("demo_test.go:5: boom"), "{stderr}");
    assert!(stderr.contains("[error] Tests failed"), "{stderr}");
    assert!(stderr.contains("❌ tests failed in example.com/demo"), "{stderr}");
    assert!(!stderr.contains("=== RUN   TestAdd"));
    assert!(output.stdout.is_empty());
}

#[test]
fn cli_verbose_summary_is_one_message_per_line() {
    let ws = Workspace::new();
    let output = run(ws.command().arg("--verbose").arg("--no-race"));

    assert_eq!(output.status.code(), Some(0), "{}", describe(&output));
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    assert!(stdout.contains("  ✅ vet ok\n  ✅ tests passed\n  ✅ coverage 75.0%\n  elapsed "), "{stdout}");
    assert!(ws.calls().iter().all(|call| !call.contains("-race")));
}

#[test]
fn cli_timeout_comes_from_environment() {
    let ws = Workspace::new();
    let output = run(ws.command().env("TOLLGATE_TIMEOUT", "45").arg("--no-cache"));

    assert_eq!(output.status.code(), Some(0), "{}", describe(&output));
    assert!(ws
        .calls()
        .iter()
        .any(|call| call.starts_with("test ") && call.contains("-timeout 45s")));
}

#[test]
fn cli_fast_path_passes_runner_args_and_skips_vet() {
    let ws = Workspace::new();
    let output = run(ws.command().args(["--", "-run", "TestAdd"]));

    assert_eq!(output.status.code(), Some(0), "{}", describe(&output));
    let calls = ws.calls();
    assert!(calls.iter().all(|call| !call.starts_with("vet")));
    assert!(calls.iter().any(|call| call == "test -run TestAdd"));
}

#[test]
fn cli_clear_cache_reports_whether_an_entry_existed() {
    let ws = Workspace::new();
    let seeded = run(&mut ws.command());
    assert_eq!(seeded.status.code(), Some(0), "{}", describe(&seeded));

    let cleared = run(ws.command().arg("--clear-cache"));
    assert_eq!(cleared.status.code(), Some(0), "{}", describe(&cleared));
    assert!(String::from_utf8_lossy(&cleared.stdout).contains("cached result cleared"));

    let again = run(ws.command().arg("--clear-cache"));
    assert!(String::from_utf8_lossy(&again.stdout).contains("no cached result to clear"));
}

#[test]
fn cli_parse_error_exits_two() {
    let output = run(Command::new(env!("CARGO_BIN_EXE_tollgate"))
        .arg("--timeout")
        .arg("soon")
        .env("NO_COLOR", "1"));

    assert_eq!(output.status.code(), Some(2), "{}", describe(&output));
    let stderr = String::from_utf8(output.stderr).expect("utf8 stderr");
    assert!(stderr.contains("[error] Invalid command arguments"));
    assert!(stderr.contains("tollgate --help"));
    assert!(!stderr.contains('\u{1b}'));
}

#[test]
fn cli_help_lists_flags() {
    let output = run(Command::new(env!("CARGO_BIN_EXE_tollgate")).arg("--help"));

    assert_eq!(output.status.code(), Some(0), "{}", describe(&output));
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    for flag in ["--repo", "--timeout", "--no-race", "--no-cache", "--all", "--clear-cache"] {
        assert!(stdout.contains(flag), "missing {flag} in {stdout}");
    }
}

#[test]
fn cli_invalid_config_is_reported() {
    let ws = Workspace::new();
    fs::write(ws.project.path().join("tollgate.toml"), "[tests]\ntimeout = 3\n")
        .expect("write config");
    let output = run(&mut ws.command());

    assert_eq!(output.status.code(), Some(1), "{}", describe(&output));
    let stderr = String::from_utf8(output.stderr).expect("utf8 stderr");
    assert!(stderr.contains("[error] tollgate failed"), "{stderr}");
    assert!(stderr.contains(&display_name(&ws.project.path().join("tollgate.toml"))));
}

fn display_name(path: &Path) -> String {
    path.display().to_string()
}
