//! Session Configuration
//!
//! Tunables applied to every session created by the registry: the grouping
//! new heaps start with and the engine's depth and memo limits. Stored as a
//! TOML file next to other tool settings.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use heaplens_classifier::ClassGrouping;

use crate::error::Result;

/// Settings applied to newly created sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Grouping every heap starts with
    pub default_grouping: ClassGrouping,
    /// Call-stack decomposition depth limit
    pub max_stack_depth: usize,
    /// Per-node filter match-count memo capacity
    pub filter_memo_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_grouping: ClassGrouping::default(),
            max_stack_depth: 64,
            filter_memo_capacity: 16,
        }
    }
}

impl SessionConfig {
    /// Load configuration, falling back to defaults (and writing them out)
    /// when the file does not exist yet
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            debug!("Loading session config from {:?}", path);
            let contents = std::fs::read_to_string(path)?;
            let config: SessionConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            info!("Session config not found, using defaults");
            let config = SessionConfig::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        debug!("Session config saved to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.default_grouping, ClassGrouping::ByClass);
        assert_eq!(config.max_stack_depth, 64);
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = SessionConfig::default();
        config.default_grouping = ClassGrouping::ByPackage;
        config.filter_memo_capacity = 4;

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: SessionConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.default_grouping, ClassGrouping::ByPackage);
        assert_eq!(parsed.filter_memo_capacity, 4);
    }
}
