//! Phase state machine data.
//!
//! An action template declares an ordered list of phases. Each phase carries
//! transition rules, enter/exit behaviors, a set of action tags to cancel on
//! entry, and whether movement interrupts its timeline. The machine itself
//! (`enter_phase`, `exit_phase`, rule installation, event handling) runs on
//! the owning action system in [`machine`].
//!
//! # Design Principles
//!
//! - **Closed variants**: Behaviors and conditions are enums, not open traits
//! - **Declaration order matters**: The first matching, passing rule wins
//! - **No re-entrant storms**: Events arriving mid-transition are dropped;
//!   forced requests are parked as a single pending phase (last write wins)

mod behavior;
mod condition;
pub(crate) mod machine;

pub use behavior::{BehaviorKind, NetPolicy, PhaseBehavior};
pub use condition::{PhaseCondition, check_all};

use crate::tag::{Tag, TagSet};

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransitionKind {
    /// Enters the next phase synchronously during rule installation.
    Immediate,
    /// Enters the next phase after the given number of seconds.
    OnDurationEnd(f32),
    /// Waits on the entity-wide gameplay event bus.
    OnGameplayEvent(Tag),
    /// Waits on the action-local task event bus; every condition must pass.
    OnTaskEvent {
        tag: Tag,
        #[cfg_attr(feature = "serde", serde(default))]
        conditions: Vec<PhaseCondition>,
    },
    /// Never installed; the phase is left only by explicit requests.
    Manual,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransitionRule {
    pub kind: TransitionKind,
    pub next_phase: Tag,
}

impl TransitionRule {
    pub fn new(kind: TransitionKind, next_phase: &str) -> Self {
        Self {
            kind,
            next_phase: Tag::new(next_phase),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PhaseData {
    pub phase_tag: Tag,
    pub transitions: Vec<TransitionRule>,
    pub on_enter: Vec<PhaseBehavior>,
    pub on_exit: Vec<PhaseBehavior>,
    pub cancel_actions_with_tag: TagSet,
    pub can_be_interrupted_by_movement: bool,
}

impl PhaseData {
    pub fn new(phase_tag: &str) -> Self {
        Self {
            phase_tag: Tag::new(phase_tag),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn transition(mut self, kind: TransitionKind, next_phase: &str) -> Self {
        self.transitions.push(TransitionRule::new(kind, next_phase));
        self
    }

    #[must_use]
    pub fn on_enter(mut self, behavior: PhaseBehavior) -> Self {
        self.on_enter.push(behavior);
        self
    }

    #[must_use]
    pub fn on_exit(mut self, behavior: PhaseBehavior) -> Self {
        self.on_exit.push(behavior);
        self
    }

    #[must_use]
    pub fn interruptible_by_movement(mut self) -> Self {
        self.can_be_interrupted_by_movement = true;
        self
    }
}

/// Replicated phase of an active action.
///
/// `counter` increases on every phase entry; a client whose local counter
/// falls behind force-enters the replicated phase.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhaseInfo {
    pub phase: Option<Tag>,
    pub counter: u32,
}
