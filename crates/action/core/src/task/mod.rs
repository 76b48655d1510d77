//! Action tasks.
//!
//! A task is a small state machine owned by one action instance. It waits on
//! a timer, a gameplay event, or an input edge, then posts a task event into
//! its owner's task bus. Tasks never block; they are advanced by the same
//! timer and event routing that drives phases.
//!
//! Ownership is tracked twice on purpose-built keys: the task records its
//! owning [`InstanceId`], and the owner records the [`TaskId`] in its ledger.
//! Rehoming moves the ledger entry and repoints the owner in one step.

mod runner;

use crate::event::Subscription;
use crate::handle::{InstanceId, TaskId};
use crate::tag::Tag;
use crate::timer::TimerId;

/// A named point on a timeline.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimelineNotify {
    pub name: String,
    pub time: f32,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TaskSpec {
    /// Posts `Task.Event.Delay.Finished` after the delay.
    WaitDelay(f32),
    /// Posts `Task.Event.PhaseDelay.Finished`; backs `OnDurationEnd` rules.
    WaitPhaseDelay(f32),
    /// Posts `Task.Event.GameplayEvent.Received` with the event payload.
    WaitGameplayEvent(Tag),
    /// Posts `Task.Event.Input.Pressed`. `None` watches the spec's own input.
    WaitInputPress(Option<Tag>),
    /// Posts `Task.Event.Input.Released`. `None` watches the spec's own input.
    WaitInputRelease(Option<Tag>),
    /// Montage stand-in: posts `Task.Event.Montage.NotifyBegin` at each notify
    /// time, then `Task.Event.Montage.Ended`.
    PlayTimeline {
        duration: f32,
        #[cfg_attr(feature = "serde", serde(default))]
        notifies: Vec<TimelineNotify>,
    },
    /// Collaborator-driven task (movement, traces); ended only by its owner.
    External { name: String },
}

impl TaskSpec {
    pub fn name(&self) -> &str {
        match self {
            Self::WaitDelay(_) => "WaitDelay",
            Self::WaitPhaseDelay(_) => "WaitPhaseDelay",
            Self::WaitGameplayEvent(_) => "WaitGameplayEvent",
            Self::WaitInputPress(_) => "WaitInputPress",
            Self::WaitInputRelease(_) => "WaitInputRelease",
            Self::PlayTimeline { .. } => "PlayTimeline",
            Self::External { name } => name,
        }
    }

    pub fn is_phase_delay(&self) -> bool {
        matches!(self, Self::WaitPhaseDelay(_))
    }

    pub fn is_timeline(&self) -> bool {
        matches!(self, Self::PlayTimeline { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TaskState {
    #[default]
    Inactive,
    Executing,
    Ending,
    Ended,
}

/// Runtime state of one task.
#[derive(Debug)]
pub struct Task {
    pub id: TaskId,
    pub owner: InstanceId,
    pub spec: TaskSpec,
    pub state: TaskState,
    pub started_at: f32,
    pub(crate) timer: Option<TimerId>,
    pub(crate) subscription: Option<Subscription>,
    /// Index of the next timeline notify to post.
    pub(crate) next_notify: usize,
}

impl Task {
    pub fn new(id: TaskId, owner: InstanceId, spec: TaskSpec) -> Self {
        Self {
            id,
            owner,
            spec,
            state: TaskState::Inactive,
            started_at: 0.0,
            timer: None,
            subscription: None,
            next_notify: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == TaskState::Executing
    }

    /// Time of the next timeline checkpoint relative to start, if any.
    pub(crate) fn next_timeline_checkpoint(&self) -> Option<f32> {
        let TaskSpec::PlayTimeline { duration, notifies } = &self.spec else {
            return None;
        };
        Some(
            notifies
                .get(self.next_notify)
                .map_or(*duration, |notify| notify.time.min(*duration)),
        )
    }
}
