use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "tollgate.toml";
pub const TIMEOUT_ENV: &str = "TOLLGATE_TIMEOUT";
pub const LOG_ENV: &str = "TOLLGATE_LOG";
pub const COLOR_ENV: &str = "TOLLGATE_COLOR";

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Added to the runner's own `-timeout` so it can report the hung test itself.
pub const PROCESS_GRACE_SECS: u64 = 10;
pub const DEFAULT_SLOW_THRESHOLD_SECS: f64 = 2.0;
pub const DEFAULT_BENIGN_PATTERN: &str = "possible misuse of unsafe.Pointer";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub toolchain: Toolchain,
    #[serde(default)]
    pub tests: TestSettings,
    #[serde(default)]
    pub analysis: AnalysisSettings,
    #[serde(default)]
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Toolchain {
    pub go: String,
    pub harness: String,
    pub harness_install: String,
    pub cross_env: BTreeMap<String, String>,
    pub integration_tag: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            go: "go".to_owned(),
            harness: "wasmbrowsertest".to_owned(),
            harness_install: "github.com/agnivade/wasmbrowsertest@latest".to_owned(),
            cross_env: BTreeMap::from([
                ("GOOS".to_owned(), "js".to_owned()),
                ("GOARCH".to_owned(), "wasm".to_owned()),
            ]),
            integration_tag: "integration".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TestSettings {
    pub timeout_secs: u64,
    pub slow_threshold_secs: f64,
    pub race: bool,
    pub exact_coverage: bool,
}

impl Default for TestSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            slow_threshold_secs: DEFAULT_SLOW_THRESHOLD_SECS,
            race: true,
            exact_coverage: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisSettings {
    pub benign_patterns: Vec<String>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            benign_patterns: vec![DEFAULT_BENIGN_PATTERN.to_owned()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    pub enabled: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Reads `tollgate.toml` from `root`; a missing file yields the defaults.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default())
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        Self::parse(&raw).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str::<Config>(raw)
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
