use arrayvec::ArrayVec;

use super::{
    Attribute, AttributeData, AttributeSet, AttributeSetKind, CombatSet, DefenseSet, MovementSet,
    ResourceSet,
};
use crate::config::ActionConfig;

/// Per-entity collection of attribute sets.
#[derive(Clone, Debug, Default)]
pub struct AttributeStore {
    sets: ArrayVec<Box<dyn AttributeSet>, { ActionConfig::MAX_ATTRIBUTE_SETS }>,
}

impl AttributeStore {
    /// Empty store; attributes resolve to `None` until a set is added.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding the resource, combat, defense, and movement sets.
    pub fn with_default_sets() -> Self {
        let mut store = Self::new();
        store.add_set(Box::new(ResourceSet::default()));
        store.add_set(Box::new(CombatSet::default()));
        store.add_set(Box::new(DefenseSet::default()));
        store.add_set(Box::new(MovementSet::default()));
        store
    }

    /// Adds a set, replacing any existing set of the same kind.
    pub fn add_set(&mut self, set: Box<dyn AttributeSet>) {
        if let Some(slot) = self.sets.iter_mut().find(|s| s.kind() == set.kind()) {
            *slot = set;
        } else if self.sets.try_push(set).is_err() {
            tracing::warn!(target: "action::attribute", "attribute set capacity exhausted");
        }
    }

    pub fn set(&self, kind: AttributeSetKind) -> Option<&dyn AttributeSet> {
        self.sets.iter().find(|s| s.kind() == kind).map(|s| &**s)
    }

    pub fn sets(&self) -> impl Iterator<Item = &dyn AttributeSet> {
        self.sets.iter().map(|s| &**s)
    }

    fn owner(&self, attribute: Attribute) -> Option<&dyn AttributeSet> {
        self.set(attribute.set_kind())
    }

    fn owner_mut(&mut self, attribute: Attribute) -> Option<&mut Box<dyn AttributeSet>> {
        let kind = attribute.set_kind();
        self.sets.iter_mut().find(|s| s.kind() == kind)
    }

    pub fn data(&self, attribute: Attribute) -> Option<AttributeData> {
        self.owner(attribute)?.get(attribute).copied()
    }

    pub fn base(&self, attribute: Attribute) -> Option<f32> {
        self.data(attribute).map(|d| d.base)
    }

    pub fn current(&self, attribute: Attribute) -> Option<f32> {
        self.data(attribute).map(|d| d.current)
    }

    /// Current value, or zero when the owning set is absent.
    pub fn current_or_zero(&self, attribute: Attribute) -> f32 {
        self.current(attribute).unwrap_or(0.0)
    }

    /// Writes a base value through the set's base clamp.
    ///
    /// Returns `(old, new)` base values. The current value is not touched;
    /// callers re-aggregate it from active modifiers.
    pub fn set_base(&mut self, attribute: Attribute, value: f32) -> Option<(f32, f32)> {
        let set = self.owner_mut(attribute)?;
        let mut clamped = value;
        set.pre_attribute_base_change(attribute, &mut clamped);
        let data = set.get_mut(attribute)?;
        let old = data.base;
        data.base = clamped;
        Some((old, clamped))
    }

    /// Writes a current value through the set's clamp and post-change hooks.
    pub fn set_current(&mut self, attribute: Attribute, value: f32) -> Option<(f32, f32)> {
        let set = self.owner_mut(attribute)?;
        let mut clamped = value;
        set.pre_attribute_change(attribute, &mut clamped);
        let data = set.get_mut(attribute)?;
        let old = data.current;
        data.current = clamped;
        if old != clamped {
            set.post_attribute_change(attribute, old, clamped);
        }
        Some((old, clamped))
    }

    /// Raw write used when mirroring replicated values; no hooks run.
    pub fn write_replicated(&mut self, attribute: Attribute, data: AttributeData) {
        if let Some(slot) = self
            .owner_mut(attribute)
            .and_then(|set| set.get_mut(attribute))
        {
            *slot = data;
        }
    }

    pub fn post_effect_execute(&mut self, data: &super::EffectModCallback) {
        if let Some(set) = self.owner_mut(data.attribute) {
            set.post_effect_execute(data);
        }
    }

    /// Runs every set's veto hook; any `false` rejects the effect.
    pub fn pre_effect_execute(&self, spec: &crate::effect::EffectSpec) -> bool {
        self.sets.iter().all(|set| set.pre_effect_execute(spec))
    }

    /// Flat list of every attribute value, in set order.
    pub fn snapshot(&self) -> Vec<(Attribute, AttributeData)> {
        self.sets
            .iter()
            .flat_map(|set| {
                set.attributes()
                    .iter()
                    .filter_map(move |attr| set.get(*attr).map(|data| (*attr, *data)))
            })
            .collect()
    }
}
