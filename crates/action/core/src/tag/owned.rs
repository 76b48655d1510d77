//! An owner's tags, split by who may write them.

use std::collections::BTreeMap;

use super::{Tag, TagSet, TagStackChange, TagStackContainer};

/// Tags held by one entity.
///
/// The replicated layer is written by the authority and mirrored on proxies.
/// The local layer holds stacks granted by instances running on this peer
/// (activation-owned and phase tags); it never replicates, since every peer
/// running the instance grants them itself. Queries see the sum of both.
///
/// Mutators report changes in summed counts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OwnedTags {
    replicated: TagStackContainer,
    local: TagStackContainer,
}

impl OwnedTags {
    pub fn new() -> Self {
        Self::default()
    }

    /// The authority-owned layer; this is what replicates.
    pub fn replicated(&self) -> &TagStackContainer {
        &self.replicated
    }

    /// Stacks granted by instances running on this peer.
    pub fn local(&self) -> &TagStackContainer {
        &self.local
    }

    pub fn count(&self, tag: &Tag) -> i32 {
        self.replicated.count(tag) + self.local.count(tag)
    }

    pub fn has_tag(&self, query: &Tag) -> bool {
        self.replicated.has_tag(query) || self.local.has_tag(query)
    }

    pub fn has_tag_exact(&self, tag: &Tag) -> bool {
        self.replicated.has_tag_exact(tag) || self.local.has_tag_exact(tag)
    }

    pub fn has_any(&self, query: &TagSet) -> bool {
        query.iter().any(|tag| self.has_tag(tag))
    }

    pub fn has_all(&self, query: &TagSet) -> bool {
        query.iter().all(|tag| self.has_tag(tag))
    }

    pub fn explicit_tags(&self) -> TagSet {
        let mut tags = self.replicated.explicit_tags();
        tags.extend(&self.local.explicit_tags());
        tags
    }

    /// Summed counts, ordered by tag.
    pub fn iter(&self) -> impl Iterator<Item = (&Tag, i32)> {
        let mut merged: BTreeMap<&Tag, i32> = BTreeMap::new();
        for (tag, count) in self.replicated.iter().chain(self.local.iter()) {
            *merged.entry(tag).or_insert(0) += count;
        }
        merged.into_iter()
    }

    pub fn is_empty(&self) -> bool {
        self.replicated.is_empty() && self.local.is_empty()
    }

    pub(crate) fn add_replicated(&mut self, tag: &Tag, count: i32) -> Option<TagStackChange> {
        let offset = self.local.count(tag);
        self.replicated
            .add_stack(tag, count)
            .map(|change| summed(change, offset))
    }

    pub(crate) fn remove_replicated(&mut self, tag: &Tag, count: i32) -> Option<TagStackChange> {
        let offset = self.local.count(tag);
        self.replicated
            .remove_stack(tag, count)
            .map(|change| summed(change, offset))
    }

    /// Overwrites a replicated count with the authority's value.
    pub(crate) fn set_replicated(&mut self, tag: &Tag, count: i32) -> Option<TagStackChange> {
        let offset = self.local.count(tag);
        self.replicated
            .set_stack(tag, count)
            .map(|change| summed(change, offset))
    }

    pub(crate) fn add_local(&mut self, tag: &Tag, count: i32) -> Option<TagStackChange> {
        let offset = self.replicated.count(tag);
        self.local
            .add_stack(tag, count)
            .map(|change| summed(change, offset))
    }

    pub(crate) fn remove_local(&mut self, tag: &Tag, count: i32) -> Option<TagStackChange> {
        let offset = self.replicated.count(tag);
        self.local
            .remove_stack(tag, count)
            .map(|change| summed(change, offset))
    }
}

fn summed(change: TagStackChange, offset: i32) -> TagStackChange {
    TagStackChange {
        old_count: change.old_count + offset,
        new_count: change.new_count + offset,
        ..change
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queries_sum_both_layers() {
        let mut tags = OwnedTags::new();
        let guard = Tag::new("State.Stance.Guard");

        tags.add_replicated(&guard, 1);
        let change = tags.add_local(&guard, 1).unwrap();
        assert_eq!((change.old_count, change.new_count), (1, 2));
        assert_eq!(tags.count(&guard), 2);
        assert!(tags.has_tag(&Tag::new("State.Stance")));
        assert_eq!(tags.iter().collect::<Vec<_>>(), vec![(&guard, 2)]);
        assert_eq!(tags.replicated().count(&guard), 1);
    }

    #[test]
    fn mirroring_leaves_local_stacks_alone() {
        let mut tags = OwnedTags::new();
        let guard = Tag::new("State.Stance.Guard");
        tags.add_local(&guard, 1);

        let change = tags.set_replicated(&guard, 2).unwrap();
        assert_eq!((change.old_count, change.new_count), (1, 3));
        tags.set_replicated(&guard, 0);
        assert_eq!(tags.count(&guard), 1);

        let change = tags.remove_local(&guard, 1).unwrap();
        assert_eq!(change.new_count, 0);
        assert!(tags.is_empty());
    }

    #[test]
    fn local_removal_never_touches_replicated_stacks() {
        let mut tags = OwnedTags::new();
        let guard = Tag::new("State.Stance.Guard");
        tags.add_replicated(&guard, 1);

        assert!(tags.remove_local(&guard, 1).is_none());
        assert_eq!(tags.count(&guard), 1);
    }
}
