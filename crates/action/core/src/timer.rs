//! Per-entity timer queue.
//!
//! Nothing in the engine blocks: every "wait" is a timer whose event is
//! routed back into the owning action system when the world clock reaches
//! its fire time. Timers fire in `(fire_at, id)` order, so two timers due at
//! the same instant fire in scheduling order.

use std::collections::BTreeMap;

use crate::handle::{ActiveEffectHandle, TaskId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u64);

/// What a timer does when it fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerEvent {
    EffectExpired(ActiveEffectHandle),
    EffectPeriod(ActiveEffectHandle),
    Task(TaskId),
}

#[derive(Clone, Copy, Debug)]
struct Timer {
    fire_at: f32,
    event: TimerEvent,
}

#[derive(Clone, Debug, Default)]
pub struct TimerQueue {
    next_id: u64,
    timers: BTreeMap<TimerId, Timer>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, fire_at: f32, event: TimerEvent) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.timers.insert(id, Timer { fire_at, event });
        id
    }

    /// Returns `false` if the timer already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.timers.remove(&id).is_some()
    }

    pub fn retime(&mut self, id: TimerId, fire_at: f32) -> bool {
        match self.timers.get_mut(&id) {
            Some(timer) => {
                timer.fire_at = fire_at;
                true
            }
            None => false,
        }
    }

    pub fn fire_time(&self, id: TimerId) -> Option<f32> {
        self.timers.get(&id).map(|timer| timer.fire_at)
    }

    /// Earliest pending timer.
    pub fn peek(&self) -> Option<(TimerId, f32)> {
        self.timers
            .iter()
            .min_by(|(a_id, a), (b_id, b)| a.fire_at.total_cmp(&b.fire_at).then(a_id.cmp(b_id)))
            .map(|(id, timer)| (*id, timer.fire_at))
    }

    /// Removes and returns the earliest timer due at or before `until`.
    pub fn pop_due(&mut self, until: f32) -> Option<(f32, TimerEvent)> {
        let (id, fire_at) = self.peek()?;
        if fire_at > until {
            return None;
        }
        self.timers
            .remove(&id)
            .map(|timer| (timer.fire_at, timer.event))
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}
