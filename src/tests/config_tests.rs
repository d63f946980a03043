use super::{Config, DEFAULT_BENIGN_PATTERN, DEFAULT_TIMEOUT_SECS};

#[test]
fn missing_config_file_yields_defaults() {
    let root = tempfile::tempdir().expect("tempdir");
    let config = Config::load(root.path()).expect("load");
    assert_eq!(config, Config::default());
    assert_eq!(config.tests.timeout_secs, DEFAULT_TIMEOUT_SECS);
    assert!(config.tests.race);
    assert!(config.cache.enabled);
    assert_eq!(config.toolchain.go, "go");
    assert_eq!(
        config.toolchain.cross_env.get("GOARCH").map(String::as_str),
        Some("wasm")
    );
    assert_eq!(
        config.analysis.benign_patterns,
        vec![DEFAULT_BENIGN_PATTERN.to_owned()]
    );
}

#[test]
fn partial_sections_keep_remaining_defaults() {
    let config = Config::parse(
        "[tests]\ntimeout_secs = 90\nrace = false\n\n[toolchain]\ngo = \"/opt/go/bin/go\"\n",
    )
    .expect("parse");
    assert_eq!(config.tests.timeout_secs, 90);
    assert!(!config.tests.race);
    assert_eq!(config.tests.slow_threshold_secs, 2.0);
    assert_eq!(config.toolchain.go, "/opt/go/bin/go");
    assert_eq!(config.toolchain.harness, "wasmbrowsertest");
}

#[test]
fn unknown_keys_are_rejected() {
    let error = Config::parse("[tests]\ntimeout = 5\n").expect_err("unknown key");
    assert!(error.to_string().contains("timeout"));
}

#[test]
fn load_reports_parse_errors_with_path() {
    let root = tempfile::tempdir().expect("tempdir");
    std::fs::write(root.path().join("tollgate.toml"), "[cache\n").expect("write");
    let error = Config::load(root.path()).expect_err("invalid toml");
    assert!(error.to_string().contains("tollgate.toml"));
}
