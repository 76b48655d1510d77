//! Cooldown tracker.
//!
//! A thin mirror over the effect engine: cooldown entries exist only because
//! an effect tagged `Effect.Type.Cooldown` granting an `Action.Cooldown.*`
//! tag is active on the owner. Gameplay code never inserts entries directly.
//!
//! On authority the tracker is driven by effect add/update/remove
//! notifications. On clients it is driven by replicated entries, which are
//! rebased onto the local clock so UI countdowns start at the full duration
//! regardless of latency.

use std::collections::BTreeMap;

use crate::effect::ActiveEffect;
use crate::handle::ActiveEffectHandle;
use crate::tag::{Tag, names};

/// One running cooldown.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CooldownEntry {
    pub tag: Tag,
    pub start_time: f32,
    pub end_time: f32,
    pub duration: f32,
}

impl CooldownEntry {
    pub fn time_remaining(&self, now: f32) -> f32 {
        (self.end_time - now).max(0.0)
    }
}

/// UI-facing change to the tracked set.
#[derive(Clone, Debug, PartialEq)]
pub enum CooldownChange {
    Added(CooldownEntry),
    Changed(CooldownEntry),
    Removed(Tag),
}

#[derive(Clone, Debug, Default)]
pub struct CooldownTracker {
    entries: BTreeMap<Tag, CooldownEntry>,
    by_effect: BTreeMap<ActiveEffectHandle, Tag>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// First granted tag under `Action.Cooldown` on a cooldown-typed effect.
    pub fn cooldown_tag_of(effect: &ActiveEffect) -> Option<Tag> {
        if !effect
            .spec
            .effect_tags
            .has_tag(&names::tag(names::EFFECT_TYPE_COOLDOWN))
        {
            return None;
        }
        let root = names::tag(names::COOLDOWN_ROOT);
        effect
            .spec
            .granted_tags
            .iter()
            .find(|tag| tag.matches(&root) && **tag != root)
            .cloned()
    }

    // ========================================================================
    // Authority
    // ========================================================================

    /// Mirrors an added or updated effect. Non-cooldown effects are ignored.
    pub fn on_effect_changed(&mut self, effect: &ActiveEffect) -> Option<CooldownChange> {
        let tag = Self::cooldown_tag_of(effect)?;
        let Some(end_time) = effect.end_time else {
            tracing::warn!(
                target: "action::cooldown",
                tag = %tag,
                "infinite effect cannot drive a cooldown"
            );
            return None;
        };

        let entry = CooldownEntry {
            tag: tag.clone(),
            start_time: effect.start_time,
            end_time,
            duration: effect.duration,
        };
        self.by_effect.insert(effect.handle, tag.clone());
        let change = match self.entries.insert(tag.clone(), entry.clone()) {
            Some(_) => CooldownChange::Changed(entry),
            None => CooldownChange::Added(entry),
        };
        tracing::debug!(
            target: "action::cooldown",
            tag = %tag,
            end = end_time,
            "cooldown tracked"
        );
        Some(change)
    }

    pub fn on_effect_removed(&mut self, handle: ActiveEffectHandle) -> Option<CooldownChange> {
        let tag = self.by_effect.remove(&handle)?;
        // A newer effect may have taken over the tag; only drop our own entry.
        if self.by_effect.values().any(|t| *t == tag) {
            return None;
        }
        self.entries.remove(&tag)?;
        tracing::debug!(target: "action::cooldown", tag = %tag, "cooldown cleared");
        Some(CooldownChange::Removed(tag))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn time_remaining(&self, tag: &Tag, now: f32) -> f32 {
        self.entries
            .get(tag)
            .map_or(0.0, |entry| entry.time_remaining(now))
    }

    pub fn duration(&self, tag: &Tag) -> f32 {
        self.entries.get(tag).map_or(0.0, |entry| entry.duration)
    }

    pub fn entry(&self, tag: &Tag) -> Option<&CooldownEntry> {
        self.entries.get(tag)
    }

    pub fn entries(&self) -> impl Iterator<Item = &CooldownEntry> {
        self.entries.values()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remaining time after reducing by `seconds`, clamped to `[0, duration]`.
    pub fn reduced_remaining(&self, tag: &Tag, seconds: f32, now: f32) -> Option<f32> {
        let entry = self.entries.get(tag)?;
        Some((entry.time_remaining(now) - seconds).clamp(0.0, entry.duration))
    }

    /// Remaining time after reducing by `percent` of the total duration.
    pub fn reduced_remaining_by_percent(&self, tag: &Tag, percent: f32, now: f32) -> Option<f32> {
        let entry = self.entries.get(tag)?;
        let seconds = entry.duration * percent / 100.0;
        Some((entry.time_remaining(now) - seconds).clamp(0.0, entry.duration))
    }

    // ========================================================================
    // Client mirror
    // ========================================================================

    /// Applies a replicated add; the entry is rebased to start at `now`.
    pub fn apply_replicated_add(&mut self, entry: &CooldownEntry, now: f32) -> CooldownChange {
        let span = (entry.end_time - entry.start_time).max(0.0);
        let rebased = CooldownEntry {
            tag: entry.tag.clone(),
            start_time: now,
            end_time: now + span,
            duration: entry.duration,
        };
        self.entries.insert(entry.tag.clone(), rebased.clone());
        CooldownChange::Added(rebased)
    }

    /// Applies a replicated change, keeping the locally rebased start.
    pub fn apply_replicated_change(&mut self, entry: &CooldownEntry, now: f32) -> CooldownChange {
        let span = (entry.end_time - entry.start_time).max(0.0);
        match self.entries.get_mut(&entry.tag) {
            Some(local) => {
                local.end_time = local.start_time + span;
                local.duration = entry.duration;
                CooldownChange::Changed(local.clone())
            }
            None => self.apply_replicated_add(entry, now),
        }
    }

    pub fn apply_replicated_remove(&mut self, tag: &Tag) -> Option<CooldownChange> {
        self.entries
            .remove(tag)
            .map(|_| CooldownChange::Removed(tag.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(tag: &str, start: f32, end: f32) -> CooldownEntry {
        CooldownEntry {
            tag: Tag::new(tag),
            start_time: start,
            end_time: end,
            duration: end - start,
        }
    }

    #[test]
    fn remaining_is_clamped_at_zero() {
        let e = entry("Action.Cooldown.Q", 1.0, 5.0);
        assert_eq!(e.time_remaining(1.0), 4.0);
        assert_eq!(e.time_remaining(5.0), 0.0);
        assert_eq!(e.time_remaining(9.0), 0.0);
    }

    #[test]
    fn replicated_add_is_rebased_to_client_clock() {
        let mut tracker = CooldownTracker::new();
        let change = tracker.apply_replicated_add(&entry("Action.Cooldown.Q", 10.0, 14.0), 3.0);
        let CooldownChange::Added(local) = change else {
            panic!("expected add");
        };
        assert_eq!(local.start_time, 3.0);
        assert_eq!(local.end_time, 7.0);
        assert_eq!(tracker.time_remaining(&Tag::new("Action.Cooldown.Q"), 3.0), 4.0);
    }

    #[test]
    fn replicated_change_keeps_local_start() {
        let mut tracker = CooldownTracker::new();
        tracker.apply_replicated_add(&entry("Action.Cooldown.Q", 10.0, 14.0), 3.0);

        // Server reduced the cooldown: same start, earlier end.
        let mut reduced = entry("Action.Cooldown.Q", 10.0, 12.0);
        reduced.duration = 4.0;
        tracker.apply_replicated_change(&reduced, 4.0);

        let local = tracker.entry(&Tag::new("Action.Cooldown.Q")).unwrap();
        assert_eq!(local.start_time, 3.0);
        assert_eq!(local.end_time, 5.0);
        assert_eq!(local.duration, 4.0);
    }

    #[test]
    fn reductions_clamp_to_duration() {
        let mut tracker = CooldownTracker::new();
        tracker.apply_replicated_add(&entry("Action.Cooldown.Q", 0.0, 10.0), 0.0);
        let tag = Tag::new("Action.Cooldown.Q");

        assert_eq!(tracker.reduced_remaining(&tag, 3.0, 2.0), Some(5.0));
        assert_eq!(tracker.reduced_remaining(&tag, 30.0, 2.0), Some(0.0));
        assert_eq!(tracker.reduced_remaining(&tag, -30.0, 2.0), Some(10.0));
        assert_eq!(tracker.reduced_remaining_by_percent(&tag, 50.0, 0.0), Some(5.0));
        assert_eq!(tracker.reduced_remaining(&Tag::new("Action.Cooldown.W"), 1.0, 0.0), None);
    }
}
