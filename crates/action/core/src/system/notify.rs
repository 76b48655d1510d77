use crate::action::ResourceId;
use crate::attribute::Attribute;
use crate::cooldown::{CooldownChange, CooldownEntry};
use crate::effect::EffectTemplateId;
use crate::event::EventPayload;
use crate::handle::{ActionSpecHandle, ActiveActionHandle, ActiveEffectHandle, PredictionKey};
use crate::tag::{Tag, TagSet, TagStackChange};

/// Observable outcome of a mutation, drained by the host each step.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    ActionActivated {
        spec: ActionSpecHandle,
        active: ActiveActionHandle,
        key: PredictionKey,
    },
    ActionEnded {
        spec: ActionSpecHandle,
        active: ActiveActionHandle,
        cancelled: bool,
    },
    ActionFailed {
        spec: ActionSpecHandle,
        reasons: TagSet,
    },
    PhaseEntered {
        spec: ActionSpecHandle,
        active: ActiveActionHandle,
        phase: Tag,
        counter: u32,
    },
    EffectApplied {
        handle: ActiveEffectHandle,
        template: EffectTemplateId,
        stacks: u32,
    },
    EffectUpdated {
        handle: ActiveEffectHandle,
        stacks: u32,
        end_time: Option<f32>,
    },
    EffectRemoved {
        handle: ActiveEffectHandle,
        template: EffectTemplateId,
    },
    AttributeChanged {
        attribute: Attribute,
        old: f32,
        new: f32,
    },
    CooldownAdded(CooldownEntry),
    CooldownChanged(CooldownEntry),
    CooldownRemoved(Tag),
    TagChanged(TagStackChange),
    CueExecuted {
        active: ActiveActionHandle,
        tag: Tag,
        magnitude: f32,
    },
    ResourceSpawned {
        active: ActiveActionHandle,
        resource: ResourceId,
        kind: String,
    },
    ResourceDestroyed {
        active: ActiveActionHandle,
        resource: ResourceId,
    },
    ViewModePushed {
        active: ActiveActionHandle,
        mode: String,
    },
    ViewModePopped {
        active: ActiveActionHandle,
        mode: String,
    },
    PredictionRejected {
        spec: ActionSpecHandle,
        key: PredictionKey,
    },
    Rehomed {
        key: PredictionKey,
        active: ActiveActionHandle,
    },
    TaskEventObserved {
        active: ActiveActionHandle,
        tag: Tag,
        payload: EventPayload,
    },
    GameplayEventObserved {
        tag: Tag,
        payload: EventPayload,
    },
}

impl From<CooldownChange> for Notification {
    fn from(change: CooldownChange) -> Self {
        match change {
            CooldownChange::Added(entry) => Self::CooldownAdded(entry),
            CooldownChange::Changed(entry) => Self::CooldownChanged(entry),
            CooldownChange::Removed(tag) => Self::CooldownRemoved(tag),
        }
    }
}

impl Notification {
    /// Short label for logs and observers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ActionActivated { .. } => "action_activated",
            Self::ActionEnded { .. } => "action_ended",
            Self::ActionFailed { .. } => "action_failed",
            Self::PhaseEntered { .. } => "phase_entered",
            Self::EffectApplied { .. } => "effect_applied",
            Self::EffectUpdated { .. } => "effect_updated",
            Self::EffectRemoved { .. } => "effect_removed",
            Self::AttributeChanged { .. } => "attribute_changed",
            Self::CooldownAdded(_) => "cooldown_added",
            Self::CooldownChanged(_) => "cooldown_changed",
            Self::CooldownRemoved(_) => "cooldown_removed",
            Self::TagChanged(_) => "tag_changed",
            Self::CueExecuted { .. } => "cue_executed",
            Self::ResourceSpawned { .. } => "resource_spawned",
            Self::ResourceDestroyed { .. } => "resource_destroyed",
            Self::ViewModePushed { .. } => "view_mode_pushed",
            Self::ViewModePopped { .. } => "view_mode_popped",
            Self::PredictionRejected { .. } => "prediction_rejected",
            Self::Rehomed { .. } => "rehomed",
            Self::TaskEventObserved { .. } => "task_event_observed",
            Self::GameplayEventObserved { .. } => "gameplay_event_observed",
        }
    }
}
