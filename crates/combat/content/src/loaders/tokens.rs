//! NPC ability token settings loader.

use std::path::Path;

use combat_core::{AbilityId, AbilityTokenPool};
use serde::{Deserialize, Serialize};

use crate::loaders::{LoadResult, read_file};

/// Pool size and return cooldown of one token class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenClassSettings {
    pub ability: AbilityId,
    pub max_tokens: usize,
    /// Seconds a returned token stays unavailable.
    #[serde(default)]
    pub cooldown: f32,
}

/// Token settings file structure for RON files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSettingsFile {
    pub classes: Vec<TokenClassSettings>,
}

/// Loader for NPC token settings from RON files.
pub struct TokenSettingsLoader;

impl TokenSettingsLoader {
    pub fn load(path: &Path) -> LoadResult<Vec<TokenClassSettings>> {
        let content = read_file(path)?;
        Self::parse(&content)
            .map_err(|e| anyhow::anyhow!("Failed to load token settings from {}: {}", path.display(), e))
    }

    pub fn parse(content: &str) -> LoadResult<Vec<TokenClassSettings>> {
        let file: TokenSettingsFile = ron::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse token settings RON: {}", e))?;
        for settings in &file.classes {
            if settings.max_tokens == 0 {
                anyhow::bail!("token class {} has no tokens", settings.ability);
            }
            if settings.cooldown < 0.0 {
                anyhow::bail!("token class {} has a negative cooldown", settings.ability);
            }
        }
        Ok(file.classes)
    }

    /// Sizes every listed class in `pool`. Classes the pool already knows
    /// keep their size.
    pub fn apply(settings: &[TokenClassSettings], pool: &mut AbilityTokenPool) -> usize {
        settings
            .iter()
            .filter(|class| pool.init_class(class.ability, class.max_tokens, class.cooldown))
            .count()
    }
}
