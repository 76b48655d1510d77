/// Engine configuration constants and tunable parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ActionConfig {
    /// Lower bound applied to level-data cooldown durations, in seconds.
    pub min_cooldown: f32,
    /// Upper bound on queued gameplay/task events drained in one pump.
    pub max_pending_events: usize,
    /// Phase entries allowed per instance per step before the action is
    /// force-ended (guards against `Immediate` cycles in template data).
    pub max_phase_transitions_per_step: u32,
    /// Seed mixed into every critical-hit roll.
    pub world_seed: u64,
}

impl ActionConfig {
    // ===== compile-time constants used as type parameters =====
    pub const MAX_ATTRIBUTE_SETS: usize = 4;
    pub const MAX_VIEW_MODES: usize = 8;
    pub const MAX_CONDITIONS_PER_RULE: usize = 8;

    // ===== runtime-tunable defaults =====
    pub const DEFAULT_MIN_COOLDOWN: f32 = 0.1;
    pub const DEFAULT_MAX_PENDING_EVENTS: usize = 256;
    pub const DEFAULT_MAX_PHASE_TRANSITIONS: u32 = 64;
    pub const DEFAULT_WORLD_SEED: u64 = 0x4c55_5841_4354;

    pub fn new() -> Self {
        Self {
            min_cooldown: Self::DEFAULT_MIN_COOLDOWN,
            max_pending_events: Self::DEFAULT_MAX_PENDING_EVENTS,
            max_phase_transitions_per_step: Self::DEFAULT_MAX_PHASE_TRANSITIONS,
            world_seed: Self::DEFAULT_WORLD_SEED,
        }
    }

    pub fn with_world_seed(mut self, world_seed: u64) -> Self {
        self.world_seed = world_seed;
        self
    }
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self::new()
    }
}
