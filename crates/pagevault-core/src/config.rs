//! Configuration for the page cache.
//!
//! Eviction bounds replace the memory-pressure reclamation a garbage
//! collected runtime would provide, so they are explicit settings rather than
//! implicit runtime behavior.
//!
//! ## Configuration Sources
//!
//! 1. **Defaults**: [`CacheConfig::default`]
//! 2. **Config file**: platform config directory, `config.toml`
//! 3. **Environment variables**: `PAGEVAULT_*` prefix
//!
//! ## Example Configuration File
//!
//! ```toml
//! [cache]
//! max_sessions = 1000
//! max_pages_per_session = 16
//! ```
//!
//! ```rust
//! use pagevault_core::{CacheConfig, Config};
//!
//! let config = Config::default();
//! assert_eq!(config.cache, CacheConfig::default());
//! config.cache.validate()?;
//! # Ok::<(), pagevault_core::Error>(())
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// Environment variable overriding [`CacheConfig::max_sessions`].
pub const ENV_MAX_SESSIONS: &str = "PAGEVAULT_MAX_SESSIONS";
/// Environment variable overriding [`CacheConfig::max_pages_per_session`].
pub const ENV_MAX_PAGES_PER_SESSION: &str = "PAGEVAULT_MAX_PAGES_PER_SESSION";

/// Top-level configuration file contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Bounds of the in-process page cache
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Eviction bounds for [`PageCache`](crate::PageCache).
///
/// Both levels of the cache are LRU maps. When a bound is reached the least
/// recently used entry is dropped; the page stays available from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of sessions with a per-session page map.
    pub max_sessions: usize,

    /// Maximum number of page ids cached per session.
    pub max_pages_per_session: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1000,
            max_pages_per_session: 16,
        }
    }
}

impl CacheConfig {
    /// Check that both bounds are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if either bound is zero.
    pub fn validate(&self) -> Result<()> {
        self.session_capacity()?;
        self.page_capacity()?;
        Ok(())
    }

    pub(crate) fn session_capacity(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.max_sessions)
            .ok_or_else(|| Error::Config("max_sessions must be greater than zero".into()))
    }

    pub(crate) fn page_capacity(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.max_pages_per_session)
            .ok_or_else(|| Error::Config("max_pages_per_session must be greater than zero".into()))
    }

    /// Apply `PAGEVAULT_*` overrides read through `lookup`.
    ///
    /// `lookup` is normally [`std::env::var`]; tests pass a closure instead
    /// of mutating the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MAX_SESSIONS) {
            self.max_sessions = parse_bound(ENV_MAX_SESSIONS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_PAGES_PER_SESSION) {
            self.max_pages_per_session = parse_bound(ENV_MAX_PAGES_PER_SESSION, &raw)?;
        }
        Ok(())
    }
}

fn parse_bound(name: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|e| Error::Config(format!("Invalid {name} value '{raw}': {e}")))
}

impl Config {
    /// Load configuration from the default location, then apply environment
    /// overrides.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined, or the
    /// file or an override is invalid.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides()?;
        config.cache.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a specific TOML file, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)
            .map_err(|e| Error::Config(format!("Failed to write config: {e}")))?;
        Ok(())
    }

    /// Apply `PAGEVAULT_*` environment variables.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.cache.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Path of the default config file.
    ///
    /// - Linux: `~/.config/pagevault/config.toml`
    /// - macOS: `~/Library/Application Support/dev.pagevault.pagevault/config.toml`
    /// - Windows: `%APPDATA%\pagevault\pagevault\config\config.toml`
    pub fn config_path() -> Result<PathBuf> {
        let project_dirs = directories::ProjectDirs::from("dev", "pagevault", "pagevault")
            .ok_or_else(|| Error::Config("Failed to determine project directories".into()))?;
        Ok(project_dirs.config_dir().join("config.toml"))
    }
}
