//! Counted tag multiset.

use std::collections::BTreeMap;

use super::{Tag, TagSet};

/// Result of a stack mutation that changed the count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagStackChange {
    pub tag: Tag,
    pub old_count: i32,
    pub new_count: i32,
}

/// Multiset of tags with integer counts.
///
/// Counts never go below zero; an entry is erased when it reaches zero so the
/// explicit tag list only ever contains live tags.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TagStackContainer {
    stacks: BTreeMap<Tag, i32>,
}

impl TagStackContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stack(&mut self, tag: &Tag, count: i32) -> Option<TagStackChange> {
        if !tag.is_valid() || count <= 0 {
            return None;
        }
        let entry = self.stacks.entry(tag.clone()).or_insert(0);
        let old_count = *entry;
        *entry += count;
        Some(TagStackChange {
            tag: tag.clone(),
            old_count,
            new_count: *entry,
        })
    }

    pub fn remove_stack(&mut self, tag: &Tag, count: i32) -> Option<TagStackChange> {
        if count <= 0 {
            return None;
        }
        let old_count = self.stacks.get(tag).copied()?;
        let new_count = (old_count - count).max(0);
        if new_count == 0 {
            self.stacks.remove(tag);
        } else {
            self.stacks.insert(tag.clone(), new_count);
        }
        Some(TagStackChange {
            tag: tag.clone(),
            old_count,
            new_count,
        })
    }

    /// Overwrites a count; used when mirroring replicated state.
    pub fn set_stack(&mut self, tag: &Tag, count: i32) -> Option<TagStackChange> {
        let old_count = self.count(tag);
        if old_count == count.max(0) {
            return None;
        }
        if count <= 0 {
            self.stacks.remove(tag);
        } else {
            self.stacks.insert(tag.clone(), count);
        }
        Some(TagStackChange {
            tag: tag.clone(),
            old_count,
            new_count: count.max(0),
        })
    }

    /// Exact count for `tag` (no hierarchy).
    pub fn count(&self, tag: &Tag) -> i32 {
        self.stacks.get(tag).copied().unwrap_or(0)
    }

    pub fn has_tag(&self, query: &Tag) -> bool {
        self.stacks.keys().any(|tag| tag.matches(query))
    }

    pub fn has_tag_exact(&self, tag: &Tag) -> bool {
        self.stacks.contains_key(tag)
    }

    pub fn has_any(&self, query: &TagSet) -> bool {
        query.iter().any(|tag| self.has_tag(tag))
    }

    pub fn has_all(&self, query: &TagSet) -> bool {
        query.iter().all(|tag| self.has_tag(tag))
    }

    pub fn explicit_tags(&self) -> TagSet {
        self.stacks.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Tag, i32)> {
        self.stacks.iter().map(|(tag, count)| (tag, *count))
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    pub fn clear(&mut self) {
        self.stacks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_remove_balance() {
        let mut tags = TagStackContainer::new();
        let stun = Tag::new("State.CrowdControl.Stun");

        tags.add_stack(&stun, 2);
        assert_eq!(tags.count(&stun), 2);
        assert!(tags.has_tag(&Tag::new("State.CrowdControl")));

        let change = tags.remove_stack(&stun, 1).unwrap();
        assert_eq!((change.old_count, change.new_count), (2, 1));

        tags.remove_stack(&stun, 5);
        assert_eq!(tags.count(&stun), 0);
        assert!(tags.is_empty());
    }

    #[test]
    fn removing_absent_tag_is_noop() {
        let mut tags = TagStackContainer::new();
        assert!(tags.remove_stack(&Tag::new("State.Missing"), 1).is_none());
        assert!(tags.add_stack(&Tag::new("State.Zero"), 0).is_none());
    }

    #[test]
    fn set_stack_reports_only_changes() {
        let mut tags = TagStackContainer::new();
        let alive = Tag::new("State.Generic.Alive");
        assert!(tags.set_stack(&alive, 1).is_some());
        assert!(tags.set_stack(&alive, 1).is_none());
        assert!(tags.set_stack(&alive, 0).is_some());
        assert!(!tags.has_tag_exact(&alive));
    }
}
