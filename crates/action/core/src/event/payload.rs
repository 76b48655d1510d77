use std::collections::BTreeMap;

use crate::handle::EntityId;
use crate::tag::{Tag, TagSet};

/// Well-known payload keys read by the engine.
pub mod keys {
    /// Target entity for `ApplyEffectToTarget`.
    pub const TARGET: &str = "Target";
    /// Timeline notify name posted by `PlayTimeline`.
    pub const NOTIFY_NAME: &str = "NotifyName";
    /// Movement path produced by a pathing collaborator.
    pub const PATH_DATA: &str = "PathData";
}

/// A single payload value.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PayloadValue {
    Flag(bool),
    Int(i64),
    Float(f32),
    Text(String),
    Tag(Tag),
    Entity(EntityId),
    Path(Vec<[f32; 2]>),
}

/// Key/value data carried by task and gameplay events.
///
/// Also used as the per-run scratch payload of an action instance.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventPayload {
    values: BTreeMap<String, PayloadValue>,
    /// Entity that raised the event, if any.
    pub instigator: Option<EntityId>,
    /// Tags the instigator held when the event was raised.
    pub instigator_tags: TagSet,
}

impl EventPayload {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: PayloadValue) -> Self {
        self.insert(key, value);
        self
    }

    #[must_use]
    pub fn with_instigator(mut self, instigator: EntityId, tags: TagSet) -> Self {
        self.instigator = Some(instigator);
        self.instigator_tags = tags;
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: PayloadValue) -> Option<PayloadValue> {
        self.values.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&PayloadValue> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<PayloadValue> {
        self.values.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.instigator.is_none()
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.instigator = None;
        self.instigator_tags = TagSet::new();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PayloadValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn target(&self) -> Option<EntityId> {
        match self.get(keys::TARGET) {
            Some(PayloadValue::Entity(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn notify_name(&self) -> Option<&str> {
        match self.get(keys::NOTIFY_NAME) {
            Some(PayloadValue::Text(name)) => Some(name),
            _ => None,
        }
    }

    /// Number of points under [`keys::PATH_DATA`]; zero when absent.
    pub fn path_points(&self) -> usize {
        match self.get(keys::PATH_DATA) {
            Some(PayloadValue::Path(points)) => points.len(),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors_ignore_mismatched_values() {
        let payload = EventPayload::new()
            .with(keys::TARGET, PayloadValue::Text("nope".into()))
            .with(keys::NOTIFY_NAME, PayloadValue::Text("Hit".into()))
            .with(keys::PATH_DATA, PayloadValue::Path(vec![[0.0, 0.0], [1.0, 2.0]]));

        assert_eq!(payload.target(), None);
        assert_eq!(payload.notify_name(), Some("Hit"));
        assert_eq!(payload.path_points(), 2);
    }

    #[test]
    fn clear_resets_instigator() {
        let mut payload = EventPayload::new()
            .with_instigator(EntityId(4), TagSet::from_iter(["State.Buff"]))
            .with("Count", PayloadValue::Int(3));
        assert!(!payload.is_empty());
        payload.clear();
        assert!(payload.is_empty());
        assert!(payload.instigator_tags.is_empty());
    }
}
