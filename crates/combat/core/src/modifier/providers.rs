//! Named, conditional modifier sources evaluated against a context.

use std::sync::Arc;

use super::CombatModifier;

type Provider<C> = Arc<dyn Fn(&C) -> CombatModifier + Send + Sync>;

/// Set of functions that each produce a modifier for a given context, for
/// example "+20% threat from healing abilities" or "-10% cast time for fire
/// spells". A provider returns [`CombatModifier::invalid`] when it does not
/// apply.
pub struct ModifierProviders<C: ?Sized> {
    entries: Vec<(String, Provider<C>)>,
}

impl<C: ?Sized> ModifierProviders<C> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registers a provider under `name`. Returns false if the name is taken.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        provider: impl Fn(&C) -> CombatModifier + Send + Sync + 'static,
    ) -> bool {
        let name = name.into();
        if self.entries.iter().any(|(existing, _)| *existing == name) {
            return false;
        }
        self.entries.push((name, Arc::new(provider)));
        true
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| existing != name);
        before != self.entries.len()
    }

    /// Evaluates every provider, dropping the ones that do not apply.
    pub fn collect(&self, context: &C) -> Vec<CombatModifier> {
        self.entries
            .iter()
            .map(|(_, provider)| provider(context))
            .filter(CombatModifier::is_valid)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C: ?Sized> Default for ModifierProviders<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ?Sized> core::fmt::Debug for ModifierProviders<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(name, _)| name))
            .finish()
    }
}
