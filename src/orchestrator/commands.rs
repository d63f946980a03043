use std::path::Path;

use crate::config::Toolchain;
use crate::process_manager::CommandSpec;

/// Flags shared by every `go test` invocation of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFlags<'a> {
    pub timeout_secs: u64,
    pub race: bool,
    pub tags: Option<&'a str>,
}

pub fn vet(toolchain: &Toolchain, root: &Path, tags: Option<&str>) -> CommandSpec {
    let mut spec = CommandSpec::new(&toolchain.go, root).arg("vet");
    if let Some(tag) = tags {
        spec = spec.arg("-tags").arg(tag);
    }
    spec.arg("./...")
}

pub fn native_tests(toolchain: &Toolchain, root: &Path, flags: &TestFlags<'_>) -> CommandSpec {
    let mut spec = CommandSpec::new(&toolchain.go, root)
        .args(["test", "-v", "-cover", "-coverpkg=./...", "-count=1", "-timeout"])
        .arg(format!("{}s", flags.timeout_secs));
    if flags.race {
        spec = spec.arg("-race");
    }
    if let Some(tag) = flags.tags {
        spec = spec.arg("-tags").arg(tag);
    }
    spec.arg("./...")
}

/// The race detector is unsupported on the cross target, so `flags.race` is ignored.
pub fn cross_tests(toolchain: &Toolchain, root: &Path, flags: &TestFlags<'_>) -> CommandSpec {
    let mut spec = cross_base(toolchain, root)
        .args(["-v", "-cover", "-count=1", "-timeout"])
        .arg(format!("{}s", flags.timeout_secs));
    if let Some(tag) = flags.tags {
        spec = spec.arg("-tags").arg(tag);
    }
    spec.arg("./...")
}

pub fn custom_native(toolchain: &Toolchain, root: &Path, custom_args: &[String]) -> CommandSpec {
    CommandSpec::new(&toolchain.go, root)
        .arg("test")
        .args(custom_args.iter().cloned())
}

pub fn custom_cross(toolchain: &Toolchain, root: &Path, custom_args: &[String]) -> CommandSpec {
    cross_base(toolchain, root).args(custom_args.iter().cloned())
}

pub fn install_harness(toolchain: &Toolchain, root: &Path) -> CommandSpec {
    CommandSpec::new(&toolchain.go, root)
        .arg("install")
        .arg(&toolchain.harness_install)
}

pub fn list_cross_tests(toolchain: &Toolchain, root: &Path, tags: Option<&str>) -> CommandSpec {
    let mut spec = cross_base(toolchain, root).args(["-list", "."]);
    if let Some(tag) = tags {
        spec = spec.arg("-tags").arg(tag);
    }
    spec.arg("./...")
}

pub fn rerun_cross_test(
    toolchain: &Toolchain,
    root: &Path,
    name: &str,
    flags: &TestFlags<'_>,
) -> CommandSpec {
    let mut spec = cross_base(toolchain, root)
        .args(["-count=1", "-timeout"])
        .arg(format!("{}s", flags.timeout_secs));
    if let Some(tag) = flags.tags {
        spec = spec.arg("-tags").arg(tag);
    }
    spec.arg("-run").arg(format!("^{name}$")).arg("./...")
}

fn cross_base(toolchain: &Toolchain, root: &Path) -> CommandSpec {
    let mut spec = CommandSpec::new(&toolchain.go, root)
        .arg("test")
        .arg("-exec")
        .arg(&toolchain.harness);
    for (key, value) in &toolchain.cross_env {
        spec = spec.env(key, value);
    }
    spec
}
