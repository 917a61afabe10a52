/// Combat tuning constants and runtime-tunable parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CombatConfig {
    /// Floor for any global cooldown after modifiers, in seconds.
    pub min_global_cooldown: f32,
    /// Floor for any channel cast length after modifiers, in seconds.
    pub min_cast_length: f32,
    /// Floor for any ability cooldown after modifiers, in seconds.
    pub min_cooldown_length: f32,
    /// Scalar applied to healing-derived threat before the modifier pipeline.
    pub healing_threat_modifier: f32,
    /// Fraction of the highest threat a taunt raises the taunter to.
    pub taunt_threat_percentage: f32,
    /// Multiplier applied to every threat entry on each decay pulse.
    pub threat_decay_percentage: f32,
    /// Seconds between threat decay pulses.
    pub threat_decay_interval: f32,
    /// Upper bound for ping compensation on predicted cooldowns and casts.
    pub max_ping_compensation: f32,
    /// Seconds the server waits for client tick parameters before dropping the tick.
    pub tick_params_timeout: f32,
    /// Seconds a client rejection stays visible.
    pub error_display_seconds: f32,
}

impl CombatConfig {
    // ===== compile-time constants =====
    /// Maximum number of distinct resource costs on one ability.
    pub const MAX_ABILITY_COSTS: usize = 4;

    // ===== runtime-tunable defaults =====
    pub const DEFAULT_MIN_GLOBAL_COOLDOWN: f32 = 0.5;
    pub const DEFAULT_MIN_CAST_LENGTH: f32 = 0.5;
    pub const DEFAULT_MIN_COOLDOWN_LENGTH: f32 = 0.5;
    pub const DEFAULT_HEALING_THREAT_MODIFIER: f32 = 0.3;
    pub const DEFAULT_TAUNT_THREAT_PERCENTAGE: f32 = 1.2;
    pub const DEFAULT_THREAT_DECAY_PERCENTAGE: f32 = 0.9;
    pub const DEFAULT_THREAT_DECAY_INTERVAL: f32 = 3.0;
    pub const DEFAULT_MAX_PING_COMPENSATION: f32 = 0.2;
    pub const DEFAULT_TICK_PARAMS_TIMEOUT: f32 = 0.5;
    pub const DEFAULT_ERROR_DISPLAY_SECONDS: f32 = 2.0;

    pub const fn new() -> Self {
        Self {
            min_global_cooldown: Self::DEFAULT_MIN_GLOBAL_COOLDOWN,
            min_cast_length: Self::DEFAULT_MIN_CAST_LENGTH,
            min_cooldown_length: Self::DEFAULT_MIN_COOLDOWN_LENGTH,
            healing_threat_modifier: Self::DEFAULT_HEALING_THREAT_MODIFIER,
            taunt_threat_percentage: Self::DEFAULT_TAUNT_THREAT_PERCENTAGE,
            threat_decay_percentage: Self::DEFAULT_THREAT_DECAY_PERCENTAGE,
            threat_decay_interval: Self::DEFAULT_THREAT_DECAY_INTERVAL,
            max_ping_compensation: Self::DEFAULT_MAX_PING_COMPENSATION,
            tick_params_timeout: Self::DEFAULT_TICK_PARAMS_TIMEOUT,
            error_display_seconds: Self::DEFAULT_ERROR_DISPLAY_SECONDS,
        }
    }

    #[must_use]
    pub const fn with_threat_decay(mut self, percentage: f32, interval: f32) -> Self {
        self.threat_decay_percentage = percentage;
        self.threat_decay_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_tick_params_timeout(mut self, timeout: f32) -> Self {
        self.tick_params_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_max_ping_compensation(mut self, max: f32) -> Self {
        self.max_ping_compensation = max;
        self
    }
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self::new()
    }
}
