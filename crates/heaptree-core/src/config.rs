//! Explorer configuration.
//!
//! Values are layered with figment: built-in defaults, then an optional TOML
//! file, then `HEAPTREE_*` environment variables (`HEAPTREE_PAGE_SIZE=50`).

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Default number of edges requested per provider fetch.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "HEAPTREE_";

/// Default configuration file name.
pub const CONFIG_FILE: &str = "heaptree.toml";

/// Configuration shared by the engine and its front ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Edges per page, applied uniformly to every fetch.
    pub page_size: usize,
    /// Root node identifier; front ends fall back to the snapshot root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<u64>,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            root: None,
        }
    }
}

impl ExplorerConfig {
    /// Creates a config with the given page size (builder entry point).
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size,
            ..Self::default()
        }
    }

    /// Loads defaults, `heaptree.toml` in the working directory, then env.
    pub fn load() -> Result<Self> {
        Self::extract(Self::figment(Path::new(CONFIG_FILE)))
    }

    /// Loads defaults, the given TOML file (if it exists), then env.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::extract(Self::figment(path.as_ref()))
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::InvalidConfig(
                "page_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
