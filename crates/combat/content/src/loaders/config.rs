//! Combat configuration loader.

use std::path::Path;

use combat_core::CombatConfig;

use crate::loaders::{LoadResult, read_file};

/// Loader for combat configuration from TOML files.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config data from a TOML file.
    ///
    /// Keys missing from the file keep their [`CombatConfig::new`] defaults.
    pub fn load(path: &Path) -> LoadResult<CombatConfig> {
        let content = read_file(path)?;
        Self::parse(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config TOML at {}: {}", path.display(), e))
    }

    /// Parses config data from TOML text.
    pub fn parse(content: &str) -> LoadResult<CombatConfig> {
        let config: CombatConfig = toml::from_str(content)?;
        if config.max_ping_compensation < 0.0 || config.tick_params_timeout <= 0.0 {
            anyhow::bail!("timing values must be positive");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = ConfigLoader::parse("max_ping_compensation = 0.1\n").expect("valid TOML");
        assert_eq!(config.max_ping_compensation, 0.1);
        assert_eq!(config.min_global_cooldown, CombatConfig::DEFAULT_MIN_GLOBAL_COOLDOWN);
    }

    #[test]
    fn rejects_non_positive_tick_timeout() {
        assert!(ConfigLoader::parse("tick_params_timeout = 0.0\n").is_err());
    }
}
