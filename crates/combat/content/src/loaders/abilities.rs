//! Ability class loader.

use std::collections::BTreeMap;
use std::path::Path;

use combat_core::{AbilityComponent, AbilityDefinition, AbilityId};
use serde::{Deserialize, Serialize};

use crate::loaders::{LoadResult, read_file};

/// Ability file structure for RON files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbilityFile {
    pub abilities: Vec<AbilityDefinition>,
}

/// Loader for ability classes from RON files.
pub struct AbilityLoader;

impl AbilityLoader {
    /// Load ability classes from a RON file.
    ///
    /// Every definition is validated; a duplicate id fails the whole file.
    pub fn load(path: &Path) -> LoadResult<Vec<AbilityDefinition>> {
        let content = read_file(path)?;
        Self::parse(&content)
            .map_err(|e| anyhow::anyhow!("Failed to load abilities from {}: {}", path.display(), e))
    }

    /// Parses ability classes from RON text.
    pub fn parse(content: &str) -> LoadResult<Vec<AbilityDefinition>> {
        let file: AbilityFile = ron::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse ability RON: {}", e))?;

        let mut seen = BTreeMap::new();
        for definition in &file.abilities {
            definition
                .validate()
                .map_err(|e| anyhow::anyhow!("ability {} ({}): {}", definition.id, definition.name, e))?;
            if let Some(previous) = seen.insert(definition.id, definition.name.as_str()) {
                anyhow::bail!(
                    "ability id {} used by both {} and {}",
                    definition.id,
                    previous,
                    definition.name
                );
            }
        }

        Ok(file.abilities)
    }
}

/// Loaded ability classes keyed by id.
#[derive(Debug, Clone, Default)]
pub struct AbilityCatalog {
    definitions: BTreeMap<AbilityId, AbilityDefinition>,
}

impl AbilityCatalog {
    pub fn new(definitions: impl IntoIterator<Item = AbilityDefinition>) -> Self {
        Self {
            definitions: definitions
                .into_iter()
                .map(|definition| (definition.id, definition))
                .collect(),
        }
    }

    pub fn load(path: &Path) -> LoadResult<Self> {
        AbilityLoader::load(path).map(Self::new)
    }

    pub fn get(&self, ability: AbilityId) -> Option<&AbilityDefinition> {
        self.definitions.get(&ability)
    }

    /// Finds a class by its content name.
    pub fn by_name(&self, name: &str) -> Option<&AbilityDefinition> {
        self.definitions.values().find(|definition| definition.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AbilityDefinition> {
        self.definitions.values()
    }

    /// Ids of the classes that draw from the NPC token pool.
    pub fn token_abilities(&self) -> impl Iterator<Item = AbilityId> + '_ {
        self.definitions
            .values()
            .filter(|definition| definition.requires_token)
            .map(|definition| definition.id)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Adds each listed class to `component`.
    pub fn grant(&self, component: &mut AbilityComponent, abilities: &[AbilityId]) -> LoadResult<()> {
        for &ability in abilities {
            let definition = self
                .get(ability)
                .ok_or_else(|| anyhow::anyhow!("ability {} is not in the catalog", ability))?;
            component
                .add_ability(definition.clone())
                .map_err(|e| anyhow::anyhow!("cannot grant {}: {}", definition.name, e))?;
        }
        Ok(())
    }
}
