use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Limits applied by the resolver and the subtree walks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Maximum number of pages in an ancestor chain (default 256)
    #[serde(default = "default_max_path_depth")]
    pub max_path_depth: usize,

    /// Maximum number of pages a breadth-first walk visits (default 100000)
    #[serde(default = "default_max_subtree_pages")]
    pub max_subtree_pages: usize,
}

fn default_max_path_depth() -> usize {
    256
}

fn default_max_subtree_pages() -> usize {
    100_000
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_path_depth: default_max_path_depth(),
            max_subtree_pages: default_max_subtree_pages(),
        }
    }
}

impl ResolverConfig {
    /// Read `NOTES_MAX_PATH_DEPTH` and `NOTES_MAX_SUBTREE_PAGES`.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Unset keys fall back to the defaults; malformed values are an error.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup("NOTES_MAX_PATH_DEPTH") {
            config.max_path_depth = raw
                .trim()
                .parse()
                .with_context(|| format!("invalid NOTES_MAX_PATH_DEPTH `{}`", raw))?;
        }
        if let Some(raw) = lookup("NOTES_MAX_SUBTREE_PAGES") {
            config.max_subtree_pages = raw
                .trim()
                .parse()
                .with_context(|| format!("invalid NOTES_MAX_SUBTREE_PAGES `{}`", raw))?;
        }
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }
}
