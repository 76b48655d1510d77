use std::collections::BTreeMap;

use crate::attribute::Attribute;
use crate::handle::ActiveEffectHandle;
use crate::tag::{Tag, TagSet};
use crate::timer::TimerId;

use super::{DurationPolicy, EffectSpec, EffectTemplateId, ModifierOp};

/// An effect retained on its target.
#[derive(Clone, Debug)]
pub struct ActiveEffect {
    pub handle: ActiveEffectHandle,
    pub spec: EffectSpec,
    pub start_time: f32,
    /// `None` for infinite effects.
    pub end_time: Option<f32>,
    pub duration: f32,
    pub period: f32,
    pub stacks: u32,
    pub(crate) expiry_timer: Option<TimerId>,
    pub(crate) period_timer: Option<TimerId>,
}

impl ActiveEffect {
    pub fn time_remaining(&self, now: f32) -> Option<f32> {
        self.end_time.map(|end| (end - now).max(0.0))
    }

    /// Periodic effects tick into base values and are never aggregated.
    pub fn is_periodic(&self) -> bool {
        self.period > 0.0
    }

    pub fn affects(&self, attribute: Attribute) -> bool {
        self.spec.modifiers.iter().any(|m| m.attribute == attribute)
    }

    pub fn state(&self) -> ActiveEffectState {
        ActiveEffectState {
            handle: self.handle,
            template: self.spec.template.id.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            duration: self.duration,
            stacks: self.stacks,
            effect_tags: self.spec.effect_tags.clone(),
            granted_tags: self.spec.granted_tags.clone(),
        }
    }
}

/// Replicated view of an [`ActiveEffect`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActiveEffectState {
    pub handle: ActiveEffectHandle,
    pub template: EffectTemplateId,
    pub start_time: f32,
    pub end_time: Option<f32>,
    pub duration: f32,
    pub stacks: u32,
    pub effect_tags: TagSet,
    pub granted_tags: TagSet,
}

#[derive(Clone, Debug, Default)]
pub struct ActiveEffectsContainer {
    effects: BTreeMap<ActiveEffectHandle, ActiveEffect>,
}

impl ActiveEffectsContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, effect: ActiveEffect) {
        self.effects.insert(effect.handle, effect);
    }

    pub fn remove(&mut self, handle: ActiveEffectHandle) -> Option<ActiveEffect> {
        self.effects.remove(&handle)
    }

    pub fn get(&self, handle: ActiveEffectHandle) -> Option<&ActiveEffect> {
        self.effects.get(&handle)
    }

    pub fn get_mut(&mut self, handle: ActiveEffectHandle) -> Option<&mut ActiveEffect> {
        self.effects.get_mut(&handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActiveEffect> {
        self.effects.values()
    }

    pub fn handles(&self) -> Vec<ActiveEffectHandle> {
        self.effects.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Existing entry a new application of `spec` should stack onto.
    pub fn find_stackable(&self, spec: &EffectSpec) -> Option<ActiveEffectHandle> {
        self.effects
            .values()
            .find(|e| {
                e.spec.template.id == spec.template.id && e.spec.context.same_identity(&spec.context)
            })
            .map(|e| e.handle)
    }

    /// Entries whose effect or granted tags intersect `tags`.
    pub fn handles_with_tags(&self, tags: &TagSet) -> Vec<ActiveEffectHandle> {
        self.effects
            .values()
            .filter(|e| e.spec.effect_tags.has_any(tags) || e.spec.granted_tags.has_any(tags))
            .map(|e| e.handle)
            .collect()
    }

    /// The cooldown effect granting `tag`, if any.
    pub fn find_by_granted_tag(&self, tag: &Tag) -> Option<ActiveEffectHandle> {
        self.effects
            .values()
            .find(|e| e.spec.granted_tags.has_tag_exact(tag))
            .map(|e| e.handle)
    }

    pub fn templates_of(&self, policy: DurationPolicy) -> Vec<EffectTemplateId> {
        self.effects
            .values()
            .filter(|e| e.spec.template.duration_policy == policy)
            .map(|e| e.spec.template.id.clone())
            .collect()
    }

    /// Current value of `attribute` given its base and every non-periodic entry.
    pub fn aggregate(&self, attribute: Attribute, base: f32) -> f32 {
        aggregate(
            base,
            self.effects
                .values()
                .filter(|e| !e.is_periodic())
                .flat_map(|e| {
                    let stacks = e.stacks;
                    e.spec
                        .resolved_modifiers()
                        .into_iter()
                        .filter(move |m| m.attribute == attribute)
                        .map(move |m| (m.op, m.magnitude, stacks))
                }),
        )
    }
}

/// Folds modifiers over a base value.
///
/// Any override wins outright (the latest one in iteration order). Otherwise
/// multipliers combine additively as `1 + Σ(m − 1)·stacks`, then flat
/// additions `Σ m·stacks` are applied.
pub fn aggregate(base: f32, modifiers: impl IntoIterator<Item = (ModifierOp, f32, u32)>) -> f32 {
    let mut additive = 0.0;
    let mut multiplier = 1.0;
    let mut overridden = None;

    for (op, magnitude, stacks) in modifiers {
        let stacks = stacks as f32;
        match op {
            ModifierOp::Add => additive += magnitude * stacks,
            ModifierOp::Multiply => multiplier += (magnitude - 1.0) * stacks,
            ModifierOp::Override => overridden = Some(magnitude),
        }
    }

    match overridden {
        Some(value) => value,
        None => base * multiplier + additive,
    }
}
