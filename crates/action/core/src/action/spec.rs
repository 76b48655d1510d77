use crate::effect::cooldown_tag_for;
use crate::handle::{ActionSpecHandle, ActiveActionHandle, EntityId, PredictionKey};
use crate::phase::PhaseInfo;
use crate::tag::{Tag, TagSet, names};

use super::{ActionTemplate, ActionTemplateId};

/// A granted action bound to one entity.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActionSpec {
    pub handle: ActionSpecHandle,
    pub template: ActionTemplateId,
    pub input_tag: Tag,
    pub level: u32,
    pub activation_count: u32,
    pub last_execution_time: f32,
    /// Template action tags plus the input tag, extended on activation.
    pub dynamic_tags: TagSet,
}

impl ActionSpec {
    pub fn new(template: &ActionTemplate, input_tag: Tag, level: u32) -> Self {
        let mut dynamic_tags = template.action_tags.clone();
        dynamic_tags.insert(input_tag.clone());
        Self {
            handle: ActionSpecHandle::generate(),
            template: template.id.clone(),
            input_tag,
            level,
            activation_count: 0,
            last_execution_time: 0.0,
            dynamic_tags,
        }
    }

    fn derived_leaf(&self) -> Tag {
        if self.input_tag.is_valid() {
            self.input_tag.clone()
        } else {
            Tag::new(self.template.as_str())
        }
    }

    /// `Action.Cooldown.<input leaf>`.
    pub fn cooldown_tag(&self) -> Tag {
        cooldown_tag_for(&self.derived_leaf())
    }

    /// `Action.Stack.<input leaf>`; remaining charges bypass the cooldown check.
    pub fn stack_tag(&self) -> Tag {
        names::tag(names::STACK_ROOT).child(self.derived_leaf().leaf())
    }

    pub fn is_active(&self) -> bool {
        self.activation_count > 0
    }
}

/// One in-flight execution.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActiveAction {
    pub handle: ActiveActionHandle,
    /// Snapshot of the spec at activation time.
    pub spec: ActionSpec,
    pub key: PredictionKey,
    pub owner: EntityId,
    pub start_time: f32,
    pub completed: bool,
    pub phase: PhaseInfo,
}
