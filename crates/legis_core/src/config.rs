use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_RSYNC_REMOTE: &str = "govtrack.us::govtrackdata/us";

/// Contents of `legis.toml`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: PathBuf,
    pub data_dir: PathBuf,
    pub report_dir: PathBuf,
    pub rsync_remote: String,
    pub rsync_timeout_secs: u64,
    pub bind: String,
    /// Use files already under `data_dir` instead of syncing.
    pub offline: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("legis.db"),
            data_dir: PathBuf::from("data"),
            report_dir: PathBuf::from("reports"),
            rsync_remote: DEFAULT_RSYNC_REMOTE.to_string(),
            rsync_timeout_secs: 300,
            bind: "127.0.0.1:8080".to_string(),
            offline: false,
        }
    }
}

impl Config {
    /// Reads the file when given; defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }
}
