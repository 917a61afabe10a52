//! High-level runtime orchestrator.
//!
//! The runtime owns the simulation worker, wires up command/event channels,
//! and exposes a builder-based API for clients to drive the world.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use combat_content::{AbilityCatalog, ContentFactory, TokenClassSettings, TokenSettingsLoader};
use combat_core::{AbilityTokenPool, CombatConfig};

use crate::api::{Result, RuntimeError, RuntimeHandle};
use crate::events::EventBus;
use crate::workers::SimulationWorker;
use crate::world::CombatWorld;

/// Runtime configuration shared across the orchestrator and workers.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub combat: CombatConfig,
    /// Length of one server step.
    pub tick_interval: Duration,
    /// Step on a timer. Tests turn this off and call `step` explicitly.
    pub auto_tick: bool,
    pub event_buffer_size: usize,
    pub command_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            combat: CombatConfig::default(),
            tick_interval: Duration::from_millis(50),
            auto_tick: true,
            event_buffer_size: 256,
            command_buffer_size: 32,
        }
    }
}

/// Main runtime that owns the simulation worker
///
/// [`RuntimeHandle`] provides a cloneable façade for clients.
pub struct Runtime {
    handle: RuntimeHandle,
    worker: JoinHandle<()>,
}

impl Runtime {
    /// Create a new runtime builder
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Get a cloneable handle to this runtime
    pub fn handle(&self) -> RuntimeHandle {
        self.handle.clone()
    }

    /// Stops the worker and waits for it to finish.
    pub async fn shutdown(self) -> Result<()> {
        // A worker that already stopped has nothing left to acknowledge.
        let _ = self.handle.shutdown().await;
        drop(self.handle);
        self.worker.await.map_err(RuntimeError::WorkerJoin)
    }
}

/// Builder for [`Runtime`] with flexible configuration.
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    catalog: AbilityCatalog,
    token_settings: Vec<TokenClassSettings>,
    content: Option<ContentFactory>,
}

impl RuntimeBuilder {
    fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            catalog: AbilityCatalog::default(),
            token_settings: Vec::new(),
            content: None,
        }
    }

    /// Override runtime configuration
    #[must_use]
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn combat_config(mut self, combat: CombatConfig) -> Self {
        self.config.combat = combat;
        self
    }

    #[must_use]
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.config.tick_interval = interval;
        self
    }

    #[must_use]
    pub fn auto_tick(mut self, enabled: bool) -> Self {
        self.config.auto_tick = enabled;
        self
    }

    /// Abilities actors may be granted.
    #[must_use]
    pub fn catalog(mut self, catalog: AbilityCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    #[must_use]
    pub fn token_settings(mut self, settings: Vec<TokenClassSettings>) -> Self {
        self.token_settings = settings;
        self
    }

    /// Load config, abilities and token settings from a data directory.
    /// Replaces anything set through `combat_config`, `catalog` or
    /// `token_settings`.
    #[must_use]
    pub fn content(mut self, factory: ContentFactory) -> Self {
        self.content = Some(factory);
        self
    }

    fn token_pool(&self) -> AbilityTokenPool {
        let mut pool = AbilityTokenPool::new();
        TokenSettingsLoader::apply(&self.token_settings, &mut pool);
        for ability in self.catalog.token_abilities() {
            pool.init_class(ability, 1, 0.0);
        }
        pool
    }

    /// Starts the simulation worker. Must be called inside a tokio runtime.
    pub fn build(mut self) -> Result<Runtime> {
        let tokens = match self.content.take() {
            Some(factory) => {
                self.config.combat = factory.load_config().map_err(RuntimeError::content)?;
                self.catalog = factory.load_abilities().map_err(RuntimeError::content)?;
                factory
                    .build_token_pool(&self.catalog)
                    .map_err(RuntimeError::content)?
            }
            None => self.token_pool(),
        };

        let event_bus = EventBus::with_capacity(self.config.event_buffer_size);
        let (command_tx, command_rx) = mpsc::channel(self.config.command_buffer_size.max(1));
        let world = CombatWorld::new(self.config.combat.clone(), self.catalog, tokens, event_bus.clone());
        let worker = SimulationWorker::new(world, command_rx, self.config.tick_interval, self.config.auto_tick);

        let worker = tokio::spawn(worker.run());
        info!(target: "runtime", "runtime started");

        Ok(Runtime {
            handle: RuntimeHandle::new(command_tx, event_bus),
            worker,
        })
    }
}
