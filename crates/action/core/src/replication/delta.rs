//! Per-entity replication deltas.
//!
//! The server captures an [`EntitySnapshot`] of each entity every tick and
//! diffs it against the last snapshot a connection acknowledged. Collections
//! are diffed by id; an entry whose value changed is resent whole.

use std::collections::BTreeMap;

use bitflags::bitflags;

use crate::action::{ActionSpec, ActiveAction};
use crate::attribute::{Attribute, AttributeData};
use crate::cooldown::CooldownEntry;
use crate::effect::ActiveEffectState;
use crate::handle::{ActionSpecHandle, ActiveActionHandle, ActiveEffectHandle, EntityId};
use crate::system::ActionSystem;
use crate::tag::Tag;

bitflags! {
    /// Tracks which collections of an [`EntityDelta`] carry changes.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct DeltaFields: u8 {
        const SPECS      = 1 << 0;
        const ACTIVE     = 1 << 1;
        const EFFECTS    = 1 << 2;
        const TAGS       = 1 << 3;
        const COOLDOWNS  = 1 << 4;
        const ATTRIBUTES = 1 << 5;
    }
}

/// Generic collection delta capturing additions, removals, and updates.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CollectionDelta<Id, T> {
    pub added: Vec<T>,
    pub removed: Vec<Id>,
    pub updated: Vec<T>,
}

impl<Id, T> CollectionDelta<Id, T> {
    pub fn new() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
            updated: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

impl<Id, T> Default for CollectionDelta<Id, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Diffs two id-keyed lists. Removals come out in id order.
pub fn diff_collection<Id, T, FId>(before: &[T], after: &[T], id_fn: FId) -> CollectionDelta<Id, T>
where
    Id: Ord + Clone,
    T: Clone + PartialEq,
    FId: Fn(&T) -> Id,
{
    let mut before_map: BTreeMap<Id, &T> = before.iter().map(|item| (id_fn(item), item)).collect();
    let mut delta = CollectionDelta::new();

    for entry in after {
        match before_map.remove(&id_fn(entry)) {
            Some(prev) if prev != entry => delta.updated.push(entry.clone()),
            Some(_) => {}
            None => delta.added.push(entry.clone()),
        }
    }

    delta.removed.extend(before_map.into_keys());
    delta
}

/// Explicit stack count of one tag.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TagCount {
    pub tag: Tag,
    pub count: i32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttributeValue {
    pub attribute: Attribute,
    pub data: AttributeData,
}

/// Replicated state of one entity at one instant.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntitySnapshot {
    pub specs: Vec<ActionSpec>,
    pub active: Vec<ActiveAction>,
    pub effects: Vec<ActiveEffectState>,
    pub tags: Vec<TagCount>,
    pub cooldowns: Vec<CooldownEntry>,
    pub attributes: Vec<AttributeValue>,
}

impl EntitySnapshot {
    pub fn capture(system: &ActionSystem) -> Self {
        let effects = if system.role().is_authority() {
            system.effects().iter().map(|effect| effect.state()).collect()
        } else {
            system.replicated_effects().cloned().collect()
        };
        Self {
            specs: system.specs().to_vec(),
            active: system.active_actions().cloned().collect(),
            effects,
            tags: system
                .tags()
                .replicated()
                .iter()
                .map(|(tag, count)| TagCount {
                    tag: tag.clone(),
                    count,
                })
                .collect(),
            cooldowns: system.cooldowns().entries().cloned().collect(),
            attributes: system
                .attributes()
                .snapshot()
                .into_iter()
                .map(|(attribute, data)| AttributeValue { attribute, data })
                .collect(),
        }
    }
}

/// Everything that changed on one entity since a baseline.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityDelta {
    pub entity: EntityId,
    pub specs: CollectionDelta<ActionSpecHandle, ActionSpec>,
    pub active: CollectionDelta<ActiveActionHandle, ActiveAction>,
    pub effects: CollectionDelta<ActiveEffectHandle, ActiveEffectState>,
    pub tags: CollectionDelta<Tag, TagCount>,
    pub cooldowns: CollectionDelta<Tag, CooldownEntry>,
    pub attributes: CollectionDelta<Attribute, AttributeValue>,
}

impl EntityDelta {
    pub fn between(entity: EntityId, before: &EntitySnapshot, after: &EntitySnapshot) -> Self {
        Self {
            entity,
            specs: diff_collection(&before.specs, &after.specs, |s| s.handle),
            active: diff_collection(&before.active, &after.active, |a| a.handle),
            effects: diff_collection(&before.effects, &after.effects, |e| e.handle),
            tags: diff_collection(&before.tags, &after.tags, |t| t.tag.clone()),
            cooldowns: diff_collection(&before.cooldowns, &after.cooldowns, |c| c.tag.clone()),
            attributes: diff_collection(&before.attributes, &after.attributes, |a| a.attribute),
        }
    }

    /// Full state of an entity, as a delta from nothing.
    pub fn full(entity: EntityId, snapshot: &EntitySnapshot) -> Self {
        Self::between(entity, &EntitySnapshot::default(), snapshot)
    }

    pub fn fields(&self) -> DeltaFields {
        let mut fields = DeltaFields::empty();
        fields.set(DeltaFields::SPECS, !self.specs.is_empty());
        fields.set(DeltaFields::ACTIVE, !self.active.is_empty());
        fields.set(DeltaFields::EFFECTS, !self.effects.is_empty());
        fields.set(DeltaFields::TAGS, !self.tags.is_empty());
        fields.set(DeltaFields::COOLDOWNS, !self.cooldowns.is_empty());
        fields.set(DeltaFields::ATTRIBUTES, !self.attributes.is_empty());
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(tag: &str, count: i32) -> TagCount {
        TagCount {
            tag: Tag::new(tag),
            count,
        }
    }

    #[test]
    fn collection_diff_splits_added_removed_updated() {
        let before = vec![count("State.Stunned", 1), count("State.Buff.Haste", 1), count("State.Dead", 1)];
        let after = vec![count("State.Buff.Haste", 2), count("State.Stunned", 1), count("State.Slowed", 1)];

        let delta = diff_collection(&before, &after, |t| t.tag.clone());

        assert_eq!(delta.added, vec![count("State.Slowed", 1)]);
        assert_eq!(delta.updated, vec![count("State.Buff.Haste", 2)]);
        assert_eq!(delta.removed, vec![Tag::new("State.Dead")]);
    }

    #[test]
    fn identical_snapshots_produce_an_empty_delta() {
        let snapshot = EntitySnapshot {
            tags: vec![count("State.Stunned", 1)],
            ..EntitySnapshot::default()
        };
        let delta = EntityDelta::between(EntityId(1), &snapshot, &snapshot);
        assert!(delta.is_empty());

        let full = EntityDelta::full(EntityId(1), &snapshot);
        assert_eq!(full.fields(), DeltaFields::TAGS);
    }
}
