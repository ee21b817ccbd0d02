//! Reading hoard's operation logs.
//!
//! hoard writes one JSON file per backup to
//! `<data-dir>/history/<uuid>/<hoard>/<entry>`. Entry names are derived from
//! fixed-width timestamps, so the latest entry is simply the lexically greatest
//! name. The `last_paths` record shares the directory and is never an entry.
use crate::util::md5_hex;
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Token that marks a non-entry file in a log directory.
pub const LAST_PATHS_TOKEN: &str = "last_paths";

/// Operation log directory for one identity and hoard.
pub fn operation_log_dir(data_dir: &Path, uuid: &str, hoard_name: &str) -> PathBuf {
    data_dir.join("history").join(uuid).join(hoard_name)
}

/// Select the most recent operation log entry in `dir`.
pub fn latest_entry(dir: &Path) -> Result<PathBuf> {
    let mut latest: Option<(String, PathBuf)> = None;
    tracing::debug!(dir = %dir.display(), "scanning for operation logs");
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_file = entry
            .file_type()
            .with_context(|| format!("stat {}", entry.path().display()))?
            .is_file();
        if !is_file || name.contains(LAST_PATHS_TOKEN) {
            tracing::debug!(%name, "skipping");
            continue;
        }
        let is_later = match &latest {
            Some((current, _)) => current.as_str() < name.as_str(),
            None => true,
        };
        if is_later {
            tracing::debug!(%name, "marking as latest entry");
            latest = Some((name, entry.path()));
        }
    }
    latest
        .map(|(_, path)| path)
        .ok_or_else(|| anyhow!("no operation log entries in {}", dir.display()))
}

/// Descend `json_path` into `value` and return the string leaf.
pub fn checksum_at<'a>(value: &'a Value, json_path: &[&str]) -> Result<&'a str> {
    let mut current = value;
    for (depth, key) in json_path.iter().enumerate() {
        current = current
            .get(*key)
            .ok_or_else(|| anyhow!("missing key {key:?} at {:?}", &json_path[..depth]))?;
    }
    current
        .as_str()
        .ok_or_else(|| anyhow!("value at {json_path:?} is not a string checksum"))
}

fn checksum_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("^[0-9a-f]{32}$").expect("valid checksum regex"))
}

/// Read the checksum stored at `json_path` in the latest entry of `dir`.
pub fn latest_checksum(dir: &Path, json_path: &[&str]) -> Result<String> {
    let path = latest_entry(dir)?;
    let text = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let value: Value =
        serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))?;
    let checksum = checksum_at(&value, json_path)
        .with_context(|| format!("locate checksum in {}", path.display()))?;
    if !checksum_pattern().is_match(checksum) {
        return Err(anyhow!(
            "checksum {checksum:?} in {} is not a lowercase md5 hex digest",
            path.display()
        ));
    }
    Ok(checksum.to_string())
}

/// Outcome of comparing content against the latest logged checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumComparison {
    pub content_md5: String,
    pub logged: String,
}

impl ChecksumComparison {
    pub fn matches(&self) -> bool {
        self.content_md5 == self.logged
    }
}

/// Compare `content` against the latest logged checksum for `uuid`/`hoard_name`.
pub fn compare_latest(
    data_dir: &Path,
    uuid: &str,
    hoard_name: &str,
    json_path: &[&str],
    content: &[u8],
) -> Result<ChecksumComparison> {
    let dir = operation_log_dir(data_dir, uuid, hoard_name);
    let logged = latest_checksum(&dir, json_path)?;
    Ok(ChecksumComparison {
        content_md5: md5_hex(content),
        logged,
    })
}
