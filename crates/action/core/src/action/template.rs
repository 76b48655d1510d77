use core::fmt;

use crate::attribute::Attribute;
use crate::effect::EffectTemplateId;
use crate::phase::PhaseData;
use crate::tag::{Tag, TagSet, names};

/// Content identifier of an action template.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ActionTemplateId(pub String);

impl ActionTemplateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionTemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionTemplateId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Default, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InstancingPolicy {
    /// Stateless single shot: one phase entry, then the action ends.
    NonInstanced,
    /// One persistent instance reused across activations.
    OneInstancePerOwner,
    /// Fresh instance per activation.
    #[default]
    OneInstancePerExecution,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Default, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ActivationPolicy {
    /// Activates on the press edge of the bound input.
    #[default]
    OnInputTriggered,
    /// Activates every tick the input is held and the action is idle.
    WhileInputActive,
    /// Activates as soon as it is granted.
    OnGrant,
    /// Activates on grant and is revoked when its execution ends.
    OnGrantAndRemove,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Default, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NetExecutionPolicy {
    /// The owning client runs ahead and the server confirms.
    #[default]
    LocalPredicted,
    /// The client only requests; execution starts when the server replicates.
    ServerOnly,
}

/// Per-level tuning row.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LevelData {
    pub cooldown: f32,
    pub cost: f32,
}

/// Extra resource requirement checked after the cost effect.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdditionalCost {
    pub attribute: Attribute,
    pub amount: f32,
}

/// Read-only action definition loaded from content.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ActionTemplate {
    pub id: ActionTemplateId,
    pub display_name: String,
    pub description: String,
    pub instancing: InstancingPolicy,
    pub activation: ActivationPolicy,
    pub net_execution: NetExecutionPolicy,
    /// Held by the owner while an execution is live; blocks re-activation.
    pub identifier_tag: Option<Tag>,
    /// Describe the action; matched by cancel queries and the relationship mapping.
    pub action_tags: TagSet,
    pub cancel_actions_with_tag: TagSet,
    pub activation_required_tags: TagSet,
    pub activation_blocked_tags: TagSet,
    pub source_required_tags: TagSet,
    pub source_blocked_tags: TagSet,
    /// Gameplay events that activate the action.
    pub trigger_tags: TagSet,
    /// Task events forwarded to the server instead of broadcast locally.
    pub replicated_event_tags: TagSet,
    pub cost_effect: Option<EffectTemplateId>,
    pub additional_costs: Vec<AdditionalCost>,
    pub cooldown_effect: Option<EffectTemplateId>,
    pub apply_cooldown_on_start: bool,
    pub level_data: Vec<LevelData>,
    pub phases: Vec<PhaseData>,
}

impl Default for ActionTemplate {
    fn default() -> Self {
        Self {
            id: ActionTemplateId::default(),
            display_name: String::new(),
            description: String::new(),
            instancing: InstancingPolicy::default(),
            activation: ActivationPolicy::default(),
            net_execution: NetExecutionPolicy::default(),
            identifier_tag: None,
            action_tags: TagSet::new(),
            cancel_actions_with_tag: TagSet::new(),
            activation_required_tags: TagSet::new(),
            activation_blocked_tags: TagSet::new(),
            source_required_tags: TagSet::new(),
            source_blocked_tags: TagSet::new(),
            trigger_tags: TagSet::new(),
            replicated_event_tags: TagSet::new(),
            cost_effect: None,
            additional_costs: Vec::new(),
            cooldown_effect: None,
            apply_cooldown_on_start: true,
            level_data: Vec::new(),
            phases: Vec::new(),
        }
    }
}

impl ActionTemplate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: ActionTemplateId::new(id),
            ..Self::default()
        }
    }

    /// Level row for a 1-based level, clamped to the last row.
    pub fn level_data(&self, level: u32) -> Option<LevelData> {
        if self.level_data.is_empty() {
            return None;
        }
        let index = (level.max(1) as usize - 1).min(self.level_data.len() - 1);
        self.level_data.get(index).copied()
    }

    pub fn phase(&self, tag: &Tag) -> Option<&PhaseData> {
        self.phases.iter().find(|p| p.phase_tag == *tag)
    }

    pub fn has_phase(&self, tag: &Tag) -> bool {
        self.phase(tag).is_some()
    }

    pub fn initial_phase(&self) -> Option<&Tag> {
        self.phases.first().map(|p| &p.phase_tag)
    }

    /// Phase a non-instanced execution enters: `Phase.Action.Begin` when
    /// declared, otherwise the first declared phase.
    pub fn single_shot_phase(&self) -> Option<&Tag> {
        let begin = names::tag(names::PHASE_BEGIN);
        self.phase(&begin)
            .map(|p| &p.phase_tag)
            .or_else(|| self.initial_phase())
    }

    #[must_use]
    pub fn phase_data(mut self, phase: PhaseData) -> Self {
        self.phases.push(phase);
        self
    }
}
