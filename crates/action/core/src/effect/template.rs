use core::fmt;

use crate::attribute::Attribute;
use crate::tag::{Tag, TagSet};

use super::Execution;

/// Content identifier of an effect template.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct EffectTemplateId(pub String);

impl EffectTemplateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EffectTemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EffectTemplateId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Default, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DurationPolicy {
    /// Applied once to base values, never retained.
    #[default]
    Instant,
    HasDuration,
    Infinite,
}

/// A magnitude that is either authored or supplied at application time.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScalableFloat {
    Static(f32),
    /// Resolved from the spec's set-by-caller table; zero until set.
    SetByCaller(Tag),
}

impl Default for ScalableFloat {
    fn default() -> Self {
        Self::Static(0.0)
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Default, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ModifierOp {
    #[default]
    Add,
    Multiply,
    Override,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModifierTemplate {
    pub attribute: Attribute,
    pub op: ModifierOp,
    pub magnitude: ScalableFloat,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Default, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StackingPolicy {
    /// Every application creates an independent entry.
    #[default]
    None,
    /// Bumps the stack count; expiry is left alone.
    Aggregate,
    /// Bumps the stack count and restarts the duration.
    Replace,
}

/// Read-only effect definition loaded from content.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EffectTemplate {
    pub id: EffectTemplateId,
    pub display_name: String,
    pub description: String,
    pub duration_policy: DurationPolicy,
    pub duration: ScalableFloat,
    pub period: ScalableFloat,
    pub modifiers: Vec<ModifierTemplate>,
    pub executions: Vec<Execution>,
    pub stacking: StackingPolicy,
    pub max_stacks: u32,
    /// Tags describing the effect itself (e.g. `Effect.Type.Cooldown`).
    pub effect_tags: TagSet,
    /// Tags held by the target while the effect is active.
    pub granted_tags: TagSet,
    pub application_required_tags: TagSet,
    pub application_blocked_tags: TagSet,
    pub remove_effects_with_tags: TagSet,
    pub cancel_actions_with_tags: TagSet,
}

impl EffectTemplate {
    pub fn instant(id: impl Into<String>) -> Self {
        Self {
            id: EffectTemplateId::new(id),
            ..Self::default()
        }
    }

    pub fn timed(id: impl Into<String>, duration: ScalableFloat) -> Self {
        Self {
            id: EffectTemplateId::new(id),
            duration_policy: DurationPolicy::HasDuration,
            duration,
            ..Self::default()
        }
    }

    pub fn infinite(id: impl Into<String>) -> Self {
        Self {
            id: EffectTemplateId::new(id),
            duration_policy: DurationPolicy::Infinite,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn modifier(mut self, attribute: Attribute, op: ModifierOp, magnitude: ScalableFloat) -> Self {
        self.modifiers.push(ModifierTemplate {
            attribute,
            op,
            magnitude,
        });
        self
    }

    #[must_use]
    pub fn execution(mut self, execution: Execution) -> Self {
        self.executions.push(execution);
        self
    }

    #[must_use]
    pub fn period(mut self, period: f32) -> Self {
        self.period = ScalableFloat::Static(period);
        self
    }

    #[must_use]
    pub fn stacking(mut self, stacking: StackingPolicy, max_stacks: u32) -> Self {
        self.stacking = stacking;
        self.max_stacks = max_stacks;
        self
    }

    #[must_use]
    pub fn effect_tag(mut self, tag: &str) -> Self {
        self.effect_tags.insert(Tag::new(tag));
        self
    }

    #[must_use]
    pub fn granted_tag(mut self, tag: &str) -> Self {
        self.granted_tags.insert(Tag::new(tag));
        self
    }

    pub fn is_instant(&self) -> bool {
        self.duration_policy == DurationPolicy::Instant
    }

    /// Stack ceiling; templates authored with zero still hold one stack.
    pub fn stack_limit(&self) -> u32 {
        self.max_stacks.max(1)
    }
}
