//! Runtime configuration loaded from environment variables
//!
//! Environment variables (a `.env` file is honoured by the binary):
//! - `DATABASE_URL` - record store location, `sqlite:///path` or a plain path
//! - `TRIALFLOW_DATABASE_URL_CACHE` (default: .database_url)
//! - `TRIALFLOW_TABLE` (default: assignments)
//! - `TRIALFLOW_DATA_ROOT` (default: data)
//! - `TRIALFLOW_BONUS_PATH` (default: bonus.csv)
//! - `TRIALFLOW_EXPERIMENT_CONFIG` (default: config.txt)
//! - `TRIALFLOW_PIVOT_DUPLICATES` - `reject` or `last` (default: reject)
//! - `TRIALFLOW_FAILURE_POLICY` - `continue` or `fail-fast` (default: continue)

use crate::aggregate::FailurePolicy;
use crate::error::ConfigError;
use crate::reshape::DuplicatePolicy;
use crate::source::{locator::DEFAULT_CACHE_FILE, sqlite_source::DEFAULT_TABLE, StoreLocator};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const VERSION_SECTION: &str = "Task Parameters";
const VERSION_KEY: &str = "experiment_code_version";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub database_url_cache: PathBuf,
    pub table: String,
    /// Parent of `human_raw/` and `human/`.
    pub data_root: PathBuf,
    pub bonus_path: PathBuf,
    pub experiment_config: PathBuf,
    pub duplicate_policy: DuplicatePolicy,
    pub failure_policy: FailurePolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any name → value lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let or = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let duplicate_policy = lookup("TRIALFLOW_PIVOT_DUPLICATES")
            .map(|s| s.parse::<DuplicatePolicy>())
            .transpose()?
            .unwrap_or_default();

        let failure_policy = lookup("TRIALFLOW_FAILURE_POLICY")
            .map(|s| s.parse::<FailurePolicy>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            database_url: lookup("DATABASE_URL"),
            database_url_cache: or("TRIALFLOW_DATABASE_URL_CACHE", DEFAULT_CACHE_FILE).into(),
            table: or("TRIALFLOW_TABLE", DEFAULT_TABLE),
            data_root: or("TRIALFLOW_DATA_ROOT", "data").into(),
            bonus_path: or("TRIALFLOW_BONUS_PATH", "bonus.csv").into(),
            experiment_config: or("TRIALFLOW_EXPERIMENT_CONFIG", "config.txt").into(),
            duplicate_policy,
            failure_policy,
        })
    }

    /// `data/human_raw/<version>`
    pub fn raw_dir(&self, version: &str) -> PathBuf {
        self.data_root.join("human_raw").join(version)
    }

    /// `data/human/<version>`
    pub fn reshaped_dir(&self, version: &str) -> PathBuf {
        self.data_root.join("human").join(version)
    }

    pub fn locator(&self) -> StoreLocator {
        StoreLocator::new(&self.database_url_cache, self.database_url.clone())
    }

    /// The explicit version, else the one recorded in the experiment config file.
    pub fn resolve_version(&self, explicit: Option<String>) -> Result<String, ConfigError> {
        if let Some(version) = explicit.filter(|v| !v.trim().is_empty()) {
            return Ok(version);
        }
        let version = experiment_version_from_file(&self.experiment_config)?
            .ok_or_else(|| ConfigError::MissingVersion(self.experiment_config.clone()))?;
        log::info!("Fetching data for current version: {}", version);
        Ok(version)
    }
}

/// Reads `experiment_code_version` from the `[Task Parameters]` section of an
/// INI-style experiment config. A missing file yields `None`.
pub fn experiment_version_from_file(path: &Path) -> Result<Option<String>, ConfigError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(ini_value(&text, VERSION_SECTION, VERSION_KEY)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfigError::Io(e)),
    }
}

/// Looks up `key` in `[section]`. Keys compare case-insensitively; both
/// `key = value` and `key: value` are accepted, `#` and `;` start comments.
fn ini_value(text: &str, section: &str, key: &str) -> Option<String> {
    let mut in_section = false;

    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_section = name.trim() == section;
            continue;
        }
        if !in_section {
            continue;
        }

        let Some(split) = line.find(['=', ':']) else {
            continue;
        };
        let (name, value) = (line[..split].trim(), line[split + 1..].trim());
        if name.eq_ignore_ascii_case(key) && !value.is_empty() {
            return Some(value.to_string());
        }
    }
    None
}
