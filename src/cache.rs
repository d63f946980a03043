use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command as ProcessCommand;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::WalkDir;

const CACHE_DIR: &str = "tollgate-cache";
const KEY_LEN: usize = 16;
const SKIPPED_DIRS: &[&str] = &[".git", "target", "node_modules"];

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache io failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode cache entry: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub message: String,
    pub written_at_epoch_ms: u128,
}

/// Remembers the summary of the last fully passing run, keyed by the project's content.
#[derive(Debug, Clone)]
pub struct ResultCache {
    root: PathBuf,
    path: PathBuf,
}

impl ResultCache {
    pub fn new(root: &Path) -> Self {
        Self::with_store_dir(root, &std::env::temp_dir().join(CACHE_DIR))
    }

    pub fn with_store_dir(root: &Path, store_dir: &Path) -> Self {
        let root = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let project = short_hash(root.display().to_string().as_bytes());
        Self {
            path: store_dir.join(format!("{project}.json")),
            root,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hash of the current commit plus every tracked change and untracked file.
    pub fn key(&self) -> String {
        let (commit, tree_hash) = match git_state(&self.root) {
            Some(state) => state,
            None => ("none".to_owned(), walk_tree_hash(&self.root)),
        };
        short_hash(format!("{commit}\n{tree_hash}").as_bytes())
    }

    pub fn load(&self) -> Option<CacheEntry> {
        let body = fs::read(&self.path).ok()?;
        match serde_json::from_slice::<CacheEntry>(&body) {
            Ok(entry) => Some(entry),
            Err(error) => {
                debug!(path = %self.path.display(), error = %error, "ignoring unreadable cache entry");
                None
            }
        }
    }

    /// The stored entry, if one exists and its key matches the project's current content.
    pub fn valid_entry(&self) -> Option<CacheEntry> {
        let entry = self.load()?;
        let key = self.key();
        if entry.key == key {
            Some(entry)
        } else {
            debug!(stored = %entry.key, current = %key, "cache key changed");
            None
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid_entry().is_some()
    }

    pub fn save(&self, message: &str) -> Result<CacheEntry, CacheError> {
        let entry = CacheEntry {
            key: self.key(),
            message: message.to_owned(),
            written_at_epoch_ms: now_epoch_ms(),
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let body = serde_json::to_vec_pretty(&entry)?;
        fs::write(&self.path, body).map_err(|source| CacheError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!(key = %entry.key, path = %self.path.display(), "cache written");
        Ok(entry)
    }

    /// Logs instead of failing; a run never fails because its result could not be cached.
    pub fn save_or_warn(&self, message: &str) {
        if let Err(error) = self.save(message) {
            warn!(error = %error, "failed to write result cache");
        }
    }

    pub fn invalidate(&self) -> Result<bool, CacheError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(CacheError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

fn git_state(root: &Path) -> Option<(String, String)> {
    let commit = git_output(root, &["rev-parse", "HEAD"])?;
    let mut hasher = Sha256::new();
    hasher.update(git_output(root, &["diff", "HEAD"])?.as_bytes());
    let untracked = git_output(root, &["ls-files", "--others", "--exclude-standard", "-z"])?;
    for relative in untracked.split('\0').filter(|path| !path.is_empty()) {
        hasher.update(relative.as_bytes());
        if let Ok(body) = fs::read(root.join(relative)) {
            hasher.update(&body);
        }
    }
    Some((commit.trim().to_owned(), hex::encode(hasher.finalize())))
}

fn git_output(root: &Path, args: &[&str]) -> Option<String> {
    let output = ProcessCommand::new("git")
        .arg("-C")
        .arg(root)
        .args(args)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn walk_tree_hash(root: &Path) -> String {
    let mut files = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| SKIPPED_DIRS.contains(&name)))
        })
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect::<Vec<PathBuf>>();
    files.sort();

    let mut hasher = Sha256::new();
    for path in files {
        let relative = path.strip_prefix(root).unwrap_or(&path);
        hasher.update(relative.display().to_string().as_bytes());
        if let Ok(body) = fs::read(&path) {
            hasher.update(&body);
        }
    }
    hex::encode(hasher.finalize())
}

fn short_hash(bytes: &[u8]) -> String {
    let mut encoded = hex::encode(Sha256::digest(bytes));
    encoded.truncate(KEY_LEN);
    encoded
}

fn now_epoch_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;
