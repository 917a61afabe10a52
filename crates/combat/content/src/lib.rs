//! Data-driven combat content.
//!
//! This crate reads the static combat data that both the server and clients
//! start from:
//! - Ability classes (data-driven via RON)
//! - NPC ability token pools (data-driven via RON)
//! - Combat tuning (data-driven via TOML)
//!
//! Loaded values are plain `combat-core` types. Content is consumed when
//! actors and the token pool are built and never travels over the wire.

#[cfg(feature = "loaders")]
pub mod loaders;

#[cfg(feature = "loaders")]
pub use loaders::{
    AbilityCatalog, AbilityLoader, ConfigLoader, ContentFactory, LoadResult, TokenClassSettings,
    TokenSettingsLoader,
};
