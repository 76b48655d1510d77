//! Well-known tag names used by the engine itself.
//!
//! Content may define any other tags; these are the ones the engine reads or
//! writes on its own.

use super::Tag;

// ============================================================================
// Activation failure reasons
// ============================================================================

pub const FAIL_IS_DEAD: &str = "Action.Fail.IsDead";
pub const FAIL_COOLDOWN: &str = "Action.Fail.Cooldown";
pub const FAIL_COST: &str = "Action.Fail.Cost";
pub const FAIL_ADDITIONAL_COST: &str = "Action.Fail.AdditionalCost";
pub const FAIL_ALREADY_ACTIVE: &str = "Action.Fail.AlreadyActive";
pub const FAIL_TAGS_BLOCKED: &str = "Action.Fail.TagsBlocked";
pub const FAIL_TAGS_MISSING: &str = "Action.Fail.TagsMissing";
pub const FAIL_SOURCE_TAGS: &str = "Action.Fail.SourceTags";
pub const FAIL_TARGET_INVALID: &str = "Action.Fail.TargetInvalid";
pub const FAIL_NETWORKING: &str = "Action.Fail.Networking";

// ============================================================================
// Derived spec tags
// ============================================================================

pub const COOLDOWN_ROOT: &str = "Action.Cooldown";
pub const STACK_ROOT: &str = "Action.Stack";

// ============================================================================
// Entity state
// ============================================================================

pub const STATE_DEAD: &str = "State.Generic.Dead";

// ============================================================================
// Phases
// ============================================================================

pub const PHASE_BEGIN: &str = "Phase.Action.Begin";
pub const PHASE_END: &str = "Phase.Action.End";

// ============================================================================
// Gameplay events
// ============================================================================

pub const EVENT_MOVEMENT_STARTED: &str = "Event.Movement.Started";
pub const EVENT_MOVEMENT_STOPPED: &str = "Event.Movement.Stopped";

// ============================================================================
// Task events
// ============================================================================

pub const TASK_DELAY_FINISHED: &str = "Task.Event.Delay.Finished";
pub const TASK_PHASE_DELAY_FINISHED: &str = "Task.Event.PhaseDelay.Finished";
pub const TASK_GAMEPLAY_EVENT_RECEIVED: &str = "Task.Event.GameplayEvent.Received";
pub const TASK_INPUT_PRESSED: &str = "Task.Event.Input.Pressed";
pub const TASK_INPUT_RELEASED: &str = "Task.Event.Input.Released";
pub const TASK_MONTAGE_NOTIFY_BEGIN: &str = "Task.Event.Montage.NotifyBegin";
pub const TASK_MONTAGE_ENDED: &str = "Task.Event.Montage.Ended";
pub const TASK_MONTAGE_INTERRUPTED: &str = "Task.Event.Montage.Interrupted";

// ============================================================================
// Effects
// ============================================================================

pub const EFFECT_TYPE_COOLDOWN: &str = "Effect.Type.Cooldown";
pub const EFFECT_TYPE_PHYSICAL: &str = "Effect.Type.Physical";
pub const EFFECT_TYPE_MAGICAL: &str = "Effect.Type.Magical";
pub const EFFECT_TYPE_CRITICAL: &str = "Effect.Type.Critical";
pub const SET_BY_CALLER_MAGNITUDE: &str = "Effect.SetByCaller.Magnitude";
pub const SET_BY_CALLER_DURATION: &str = "Effect.SetByCaller.Duration";
pub const SET_BY_CALLER_COST: &str = "Effect.SetByCaller.Cost";

/// Shorthand for building a [`Tag`] from one of the constants above.
pub fn tag(name: &str) -> Tag {
    Tag::new(name)
}
