//! Content factory for loading every combat data file from one directory.

use std::path::{Path, PathBuf};

use combat_core::{AbilityTokenPool, CombatConfig};
use tracing::{debug, warn};

use crate::loaders::{
    AbilityCatalog, ConfigLoader, LoadResult, TokenClassSettings, TokenSettingsLoader,
};

/// Content factory that loads all combat content from a data directory.
///
/// # Directory Structure
///
/// ```text
/// data_dir/
/// ├── config.toml
/// ├── abilities.ron
/// └── tokens.ron
/// ```
pub struct ContentFactory {
    data_dir: PathBuf,
}

impl ContentFactory {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Factory over the content shipped with this crate.
    pub fn bundled() -> Self {
        Self::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("data"))
    }

    /// Load combat configuration from `config.toml`.
    pub fn load_config(&self) -> LoadResult<CombatConfig> {
        ConfigLoader::load(&self.data_dir.join("config.toml"))
    }

    /// Load ability classes from `abilities.ron`.
    pub fn load_abilities(&self) -> LoadResult<AbilityCatalog> {
        AbilityCatalog::load(&self.data_dir.join("abilities.ron"))
    }

    /// Load NPC token settings from `tokens.ron`.
    pub fn load_token_settings(&self) -> LoadResult<Vec<TokenClassSettings>> {
        TokenSettingsLoader::load(&self.data_dir.join("tokens.ron"))
    }

    /// Builds a token pool sized for every token class in `catalog`.
    ///
    /// Token abilities without explicit settings get a single token.
    pub fn build_token_pool(&self, catalog: &AbilityCatalog) -> LoadResult<AbilityTokenPool> {
        let settings = self.load_token_settings()?;
        let mut pool = AbilityTokenPool::new();
        TokenSettingsLoader::apply(&settings, &mut pool);

        for class in &settings {
            if catalog.get(class.ability).is_none_or(|definition| !definition.requires_token) {
                warn!(
                    target: "combat::content",
                    ability = %class.ability,
                    "token settings for an ability that never requests a token"
                );
            }
        }
        for ability in catalog.token_abilities() {
            if pool.init_class(ability, 1, 0.0) {
                debug!(target: "combat::content", ability = %ability, "token class defaulted to one token");
            }
        }
        Ok(pool)
    }

    /// Returns the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_paths() {
        let factory = ContentFactory::new("/tmp/data");
        assert_eq!(factory.data_dir(), Path::new("/tmp/data"));
    }

    #[test]
    fn bundled_content_loads() {
        let factory = ContentFactory::bundled();
        let config = factory.load_config().expect("bundled config");
        assert_eq!(config, CombatConfig::default());

        let catalog = factory.load_abilities().expect("bundled abilities");
        assert!(catalog.by_name("fireball").is_some());

        let pool = factory.build_token_pool(&catalog).expect("bundled tokens");
        for ability in catalog.token_abilities() {
            assert!(pool.has_class(ability));
        }
    }
}
