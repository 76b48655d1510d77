//! Typed identifiers shared by every subsystem.
//!
//! Replicated handles (action specs, active actions, active effects) are
//! allocated from process-wide monotonic counters: they are never reused for
//! the lifetime of the process and serialize as plain integers. Local ids
//! (instances, tasks, timers) never cross the wire.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

macro_rules! replicated_handle {
    ($(#[$meta:meta])* $name:ident, $counter:ident, $label:literal) => {
        static $counter: AtomicU32 = AtomicU32::new(1);

        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(pub u32);

        impl $name {
            /// The invalid (unset) handle.
            pub const INVALID: Self = Self(0);

            /// Allocates a fresh, never-reused handle.
            pub fn generate() -> Self {
                Self($counter.fetch_add(1, Ordering::Relaxed))
            }

            pub const fn is_valid(self) -> bool {
                self.0 != 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }
    };
}

replicated_handle!(
    /// Identity of a granted action spec.
    ActionSpecHandle,
    NEXT_SPEC_HANDLE,
    "spec"
);

replicated_handle!(
    /// Identity of one in-flight execution.
    ActiveActionHandle,
    NEXT_ACTIVE_HANDLE,
    "active"
);

replicated_handle!(
    /// Identity of an effect retained on a target.
    ActiveEffectHandle,
    NEXT_EFFECT_HANDLE,
    "effect"
);

/// Client-generated correlation id for a speculative execution.
///
/// Zero means "no prediction" (server-only paths).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PredictionKey(pub u32);

impl PredictionKey {
    pub const NONE: Self = Self(0);

    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for PredictionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key#{}", self.0)
    }
}

/// Network identity of an entity, stable across server and client worlds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// Arena slot reference to an entity inside one world.
///
/// Acts as a weak reference: the generation is bumped when the slot is
/// recycled, so stale handles resolve to `None` instead of a new occupant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityHandle {
    pub index: u32,
    pub generation: u32,
}

impl EntityHandle {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot{}v{}", self.index, self.generation)
    }
}

/// Local id of a runtime action instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(pub u32);

/// Local id of a running task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u32);

/// Weak references to the entities that own an execution.
///
/// All three may point at the same entity; none of them keeps it alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActorInfo {
    pub owner: EntityHandle,
    pub avatar: EntityHandle,
    pub controller: Option<EntityHandle>,
}

impl ActorInfo {
    pub const fn from_owner(owner: EntityHandle) -> Self {
        Self {
            owner,
            avatar: owner,
            controller: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_handles_are_unique_and_valid() {
        let a = ActionSpecHandle::generate();
        let b = ActionSpecHandle::generate();
        assert!(a.is_valid());
        assert!(b.0 > a.0);
        assert!(!ActionSpecHandle::INVALID.is_valid());
    }

    #[test]
    fn handle_categories_are_independent() {
        let effect = ActiveEffectHandle::generate();
        let active = ActiveActionHandle::generate();
        assert!(effect.is_valid() && active.is_valid());
        assert_eq!(format!("{}", PredictionKey(7)), "key#7");
    }
}
