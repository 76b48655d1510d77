//! Asynchronous abstraction for sourcing client input.
//!
//! Runtime users plug in [`InputProvider`] implementations so a session can
//! run with human input, scripted fixtures, or bots.
use std::collections::BTreeMap;

use action_core::{ActionTemplateId, ConnectionId, Tag};
use async_trait::async_trait;

/// One thing a client does during a tick.
#[derive(Clone, Debug, PartialEq)]
pub enum InputIntent {
    Press(Tag),
    Release(Tag),
    /// Activates the granted spec of a template directly, bypassing input binding.
    Activate(ActionTemplateId),
    SetMoving(bool),
}

/// Trait for providing client input each tick.
#[async_trait]
pub trait InputProvider: Send + Sync {
    async fn provide_inputs(&self, client: ConnectionId, tick: u64) -> Vec<InputIntent>;
}

/// Provider that never produces input.
pub struct IdleInputProvider;

#[async_trait]
impl InputProvider for IdleInputProvider {
    async fn provide_inputs(&self, _client: ConnectionId, _tick: u64) -> Vec<InputIntent> {
        Vec::new()
    }
}

/// Replays a fixed tick-indexed script.
#[derive(Clone, Debug, Default)]
pub struct ScriptedInputProvider {
    script: BTreeMap<(u64, ConnectionId), Vec<InputIntent>>,
}

impl ScriptedInputProvider {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn at(mut self, tick: u64, client: ConnectionId, intent: InputIntent) -> Self {
        self.script.entry((tick, client)).or_default().push(intent);
        self
    }

    /// Last tick with scripted input.
    pub fn last_tick(&self) -> Option<u64> {
        self.script.keys().next_back().map(|(tick, _)| *tick)
    }
}

#[async_trait]
impl InputProvider for ScriptedInputProvider {
    async fn provide_inputs(&self, client: ConnectionId, tick: u64) -> Vec<InputIntent> {
        self.script.get(&(tick, client)).cloned().unwrap_or_default()
    }
}
