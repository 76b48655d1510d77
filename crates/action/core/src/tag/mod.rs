//! Hierarchical gameplay tags.
//!
//! A [`Tag`] is a dotted name such as `Action.Cooldown.Primary`. Queries are
//! hierarchical: a container holding `State.Buff.MoveSpeed` satisfies a query
//! for `State.Buff`. The `*_exact` variants disable hierarchy.

mod mapping;
pub mod names;
mod owned;
mod stack;

pub use mapping::{TagRelationship, TagRelationshipMapping};
pub use owned::OwnedTags;
pub use stack::{TagStackChange, TagStackContainer};

use std::collections::BTreeSet;
use std::fmt;

/// A hierarchical, dot-separated gameplay tag.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Tag(String);

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Empty tags are the "none" sentinel.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
    }

    /// True if `self` equals `parent` or is one of its descendants.
    pub fn matches(&self, parent: &Tag) -> bool {
        if !parent.is_valid() {
            return false;
        }
        match self.0.strip_prefix(parent.as_str()) {
            Some("") => true,
            Some(rest) => rest.starts_with('.'),
            None => false,
        }
    }

    /// Last dotted segment (`Input.Action.Primary` → `Primary`).
    pub fn leaf(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or("")
    }

    /// Appends a child segment.
    pub fn child(&self, segment: &str) -> Tag {
        Tag(format!("{}.{}", self.0, segment))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Tag {
    fn from(value: &str) -> Self {
        Tag::new(value)
    }
}

/// Ordered set of tags.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct TagSet(BTreeSet<Tag>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(tag: Tag) -> Self {
        let mut set = Self::new();
        set.insert(tag);
        set
    }

    pub fn insert(&mut self, tag: Tag) -> bool {
        if !tag.is_valid() {
            return false;
        }
        self.0.insert(tag)
    }

    pub fn remove(&mut self, tag: &Tag) -> bool {
        self.0.remove(tag)
    }

    pub fn extend(&mut self, other: &TagSet) {
        self.0.extend(other.0.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.iter()
    }

    pub fn first(&self) -> Option<&Tag> {
        self.0.iter().next()
    }

    /// True if any contained tag matches `query` hierarchically.
    pub fn has_tag(&self, query: &Tag) -> bool {
        self.0.iter().any(|tag| tag.matches(query))
    }

    pub fn has_tag_exact(&self, tag: &Tag) -> bool {
        self.0.contains(tag)
    }

    /// True if any tag of `other` is satisfied. An empty query is never satisfied.
    pub fn has_any(&self, other: &TagSet) -> bool {
        other.iter().any(|query| self.has_tag(query))
    }

    /// True if every tag of `other` is satisfied. An empty query is always satisfied.
    pub fn has_all(&self, other: &TagSet) -> bool {
        other.iter().all(|query| self.has_tag(query))
    }

    pub fn has_any_exact(&self, other: &TagSet) -> bool {
        other.iter().any(|tag| self.0.contains(tag))
    }
}

impl FromIterator<Tag> for TagSet {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        let mut set = TagSet::new();
        for tag in iter {
            set.insert(tag);
        }
        set
    }
}

impl<'a> FromIterator<&'a str> for TagSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        iter.into_iter().map(Tag::new).collect()
    }
}

impl<'a> IntoIterator for &'a TagSet {
    type Item = &'a Tag;
    type IntoIter = std::collections::btree_set::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchical_match() {
        let tag = Tag::new("State.Buff.MoveSpeed");
        assert!(tag.matches(&Tag::new("State.Buff")));
        assert!(tag.matches(&Tag::new("State.Buff.MoveSpeed")));
        assert!(!tag.matches(&Tag::new("State.Buf")));
        assert!(!tag.matches(&Tag::new("State.Buff.MoveSpeed.Extra")));
        assert!(!tag.matches(&Tag::default()));
    }

    #[test]
    fn leaf_and_child() {
        let input = Tag::new("Input.Action.Primary");
        assert_eq!(input.leaf(), "Primary");
        assert_eq!(
            Tag::new("Action.Cooldown").child(input.leaf()),
            Tag::new("Action.Cooldown.Primary")
        );
    }

    #[test]
    fn set_queries() {
        let owned: TagSet = ["State.Generic.Alive", "State.Buff.AttackDamage"]
            .into_iter()
            .collect();
        let any: TagSet = ["State.Buff", "State.Debuff"].into_iter().collect();
        let all: TagSet = ["State.Buff", "State.Debuff"].into_iter().collect();

        assert!(owned.has_any(&any));
        assert!(!owned.has_all(&all));
        assert!(owned.has_all(&TagSet::new()));
        assert!(!owned.has_any(&TagSet::new()));
        assert!(!owned.has_any_exact(&any));
    }

    #[test]
    fn invalid_tags_are_not_inserted() {
        let mut set = TagSet::new();
        assert!(!set.insert(Tag::default()));
        assert!(set.is_empty());
    }
}
