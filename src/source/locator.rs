//! Store-location cache
//!
//! The store URL is resolved once and cached in a small file next to the
//! working directory. When the store turns out to be unreachable the cache is
//! dropped so the next invocation resolves it afresh.

use crate::error::ConfigError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_CACHE_FILE: &str = ".database_url";

#[derive(Debug, Clone)]
pub struct StoreLocator {
    cache_path: PathBuf,
    env_url: Option<String>,
}

impl StoreLocator {
    pub fn new(cache_path: impl Into<PathBuf>, env_url: Option<String>) -> Self {
        Self {
            cache_path: cache_path.into(),
            env_url: env_url.filter(|url| !url.trim().is_empty()),
        }
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Cached URL if present, else the configured one (which is then cached).
    pub fn resolve(&self) -> Result<String, ConfigError> {
        match fs::read_to_string(&self.cache_path) {
            Ok(cached) if !cached.trim().is_empty() => {
                log::debug!("Using cached store location from {}", self.cache_path.display());
                return Ok(cached.trim().to_string());
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(ConfigError::Io(e)),
        }

        let url = self
            .env_url
            .clone()
            .ok_or_else(|| ConfigError::MissingDatabaseUrl(self.cache_path.clone()))?;

        fs::write(&self.cache_path, &url)?;
        log::info!("Cached store location in {}", self.cache_path.display());
        Ok(url)
    }

    /// Forget the cached URL. Missing cache is not an error.
    pub fn invalidate(&self) -> io::Result<()> {
        match fs::remove_file(&self.cache_path) {
            Ok(()) => {
                log::info!("Removed cached store location {}", self.cache_path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
