//! Tag relationship mapping.
//!
//! A read-only table layered on top of an action's own tag requirements. Each
//! entry says "an action carrying `action_tag` additionally cancels / requires
//! / is blocked by these tags". The registry queries it during activation and
//! the table can be swapped at runtime.

use super::{Tag, TagSet};

/// One row of the mapping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TagRelationship {
    pub action_tag: Tag,
    pub actions_to_cancel: TagSet,
    pub activation_required_tags: TagSet,
    pub activation_blocked_tags: TagSet,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct TagRelationshipMapping {
    relationships: Vec<TagRelationship>,
}

impl TagRelationshipMapping {
    pub fn new(relationships: Vec<TagRelationship>) -> Self {
        Self { relationships }
    }

    pub fn relationships(&self) -> &[TagRelationship] {
        &self.relationships
    }

    fn matching<'a>(&'a self, action_tags: &'a TagSet) -> impl Iterator<Item = &'a TagRelationship> {
        self.relationships
            .iter()
            .filter(move |entry| action_tags.has_tag_exact(&entry.action_tag))
    }

    /// Extra blocked tags contributed by every entry matching `action_tags`.
    pub fn blocked_tags(&self, action_tags: &TagSet) -> TagSet {
        let mut out = TagSet::new();
        for entry in self.matching(action_tags) {
            out.extend(&entry.activation_blocked_tags);
        }
        out
    }

    pub fn required_tags(&self, action_tags: &TagSet) -> TagSet {
        let mut out = TagSet::new();
        for entry in self.matching(action_tags) {
            out.extend(&entry.activation_required_tags);
        }
        out
    }

    /// Tags of actions that get cancelled when an action with `action_tags` starts.
    pub fn cancelled_by_tags(&self, action_tags: &TagSet) -> TagSet {
        let mut out = TagSet::new();
        for entry in self.matching(action_tags) {
            out.extend(&entry.actions_to_cancel);
        }
        out
    }

    /// True if an action carrying `action_tags` is cancelled by `tag`.
    pub fn is_cancelled_by_tag(&self, action_tags: &TagSet, tag: &Tag) -> bool {
        self.relationships.iter().any(|entry| {
            entry.action_tag == *tag && action_tags.has_any(&entry.actions_to_cancel)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> TagRelationshipMapping {
        TagRelationshipMapping::new(vec![
            TagRelationship {
                action_tag: Tag::new("Action.Type.Ultimate"),
                actions_to_cancel: TagSet::single(Tag::new("Action.Type.Basic")),
                activation_required_tags: TagSet::single(Tag::new("State.Generic.Alive")),
                activation_blocked_tags: TagSet::single(Tag::new("State.CrowdControl.Silence")),
            },
            TagRelationship {
                action_tag: Tag::new("Action.Type.Movement"),
                activation_blocked_tags: TagSet::single(Tag::new("State.CrowdControl.Root")),
                ..Default::default()
            },
        ])
    }

    #[test]
    fn collects_tags_from_matching_entries_only() {
        let mapping = mapping();
        let ultimate = TagSet::single(Tag::new("Action.Type.Ultimate"));

        assert!(
            mapping
                .blocked_tags(&ultimate)
                .has_tag_exact(&Tag::new("State.CrowdControl.Silence"))
        );
        assert!(
            !mapping
                .blocked_tags(&ultimate)
                .has_tag_exact(&Tag::new("State.CrowdControl.Root"))
        );
        assert_eq!(mapping.required_tags(&ultimate).len(), 1);
        assert_eq!(mapping.cancelled_by_tags(&ultimate).len(), 1);
    }

    #[test]
    fn cancelled_by_tag_lookup() {
        let mapping = mapping();
        let basic = TagSet::single(Tag::new("Action.Type.Basic"));
        assert!(mapping.is_cancelled_by_tag(&basic, &Tag::new("Action.Type.Ultimate")));
        assert!(!mapping.is_cancelled_by_tag(&basic, &Tag::new("Action.Type.Movement")));
    }
}
