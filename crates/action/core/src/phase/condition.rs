use crate::event::EventPayload;
use crate::tag::{OwnedTags, Tag};

/// Guard attached to an `OnTaskEvent` transition rule.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PhaseCondition {
    /// Payload `NotifyName` equals the given name.
    NotifyNameEquals(String),
    /// Payload `PathData` holds at least this many points.
    PathHasMinPoints(usize),
    PayloadHasKey(String),
    OwnerHasTag(Tag),
    Not(Box<PhaseCondition>),
}

impl PhaseCondition {
    pub fn check(&self, payload: &EventPayload, owner_tags: &OwnedTags) -> bool {
        match self {
            Self::NotifyNameEquals(name) => payload.notify_name() == Some(name.as_str()),
            Self::PathHasMinPoints(min) => payload.path_points() >= *min,
            Self::PayloadHasKey(key) => payload.contains_key(key),
            Self::OwnerHasTag(tag) => owner_tags.has_tag(tag),
            Self::Not(inner) => !inner.check(payload, owner_tags),
        }
    }
}

/// True when every condition passes; an empty list always passes.
pub fn check_all(
    conditions: &[PhaseCondition],
    payload: &EventPayload,
    owner_tags: &OwnedTags,
) -> bool {
    conditions.iter().all(|c| c.check(payload, owner_tags))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{PayloadValue, keys};

    #[test]
    fn all_conditions_must_pass() {
        let payload = EventPayload::new()
            .with(keys::NOTIFY_NAME, PayloadValue::Text("Fire".into()))
            .with(keys::PATH_DATA, PayloadValue::Path(vec![[0.0, 0.0]]));
        let tags = OwnedTags::new();

        let fire = PhaseCondition::NotifyNameEquals("Fire".into());
        let two_points = PhaseCondition::PathHasMinPoints(2);
        assert!(check_all(&[fire.clone()], &payload, &tags));
        assert!(!check_all(&[fire.clone(), two_points.clone()], &payload, &tags));
        assert!(check_all(
            &[fire, PhaseCondition::Not(Box::new(two_points))],
            &payload,
            &tags
        ));
        assert!(check_all(&[], &payload, &tags));
    }

    #[test]
    fn owner_tag_condition_is_hierarchical() {
        let mut tags = OwnedTags::new();
        tags.add_local(&Tag::new("State.Buff.Haste"), 1);
        let condition = PhaseCondition::OwnerHasTag(Tag::new("State.Buff"));
        assert!(condition.check(&EventPayload::new(), &tags));
    }
}
