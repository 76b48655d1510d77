use crate::effect::EffectTemplateId;
use crate::system::NetRole;
use crate::tag::{Tag, TagSet};
use crate::task::TaskSpec;

/// Which peers run a behavior.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Default, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NetPolicy {
    /// Authority only.
    ServerOnly,
    /// The owning client only; observers skip it.
    ClientOnly,
    #[default]
    All,
}

impl NetPolicy {
    pub fn allows(self, role: NetRole) -> bool {
        match self {
            Self::ServerOnly => role == NetRole::Authority,
            Self::ClientOnly => role == NetRole::AutonomousProxy,
            Self::All => true,
        }
    }
}

/// One step run on phase enter or exit.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhaseBehavior {
    #[cfg_attr(feature = "serde", serde(default))]
    pub policy: NetPolicy,
    pub kind: BehaviorKind,
}

impl PhaseBehavior {
    pub fn all(kind: BehaviorKind) -> Self {
        Self {
            policy: NetPolicy::All,
            kind,
        }
    }

    pub fn server_only(kind: BehaviorKind) -> Self {
        Self {
            policy: NetPolicy::ServerOnly,
            kind,
        }
    }

    pub fn client_only(kind: BehaviorKind) -> Self {
        Self {
            policy: NetPolicy::ClientOnly,
            kind,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BehaviorKind {
    /// Adds one stack of each tag, recorded in the instance ledger.
    AddTags(TagSet),
    /// Releases stacks previously added by this instance.
    RemoveTags(TagSet),
    RunTask(TaskSpec),
    ApplyEffectToSelf(EffectTemplateId),
    /// Applies to the entity stored under the payload `Target` key.
    ApplyEffectToTarget(EffectTemplateId),
    ExecuteCue { tag: Tag, magnitude: f32 },
    SpawnResource { kind: String, destroy_with_action: bool },
    PushViewMode(String),
    PopViewMode,
    EndAction,
    /// Copies `source_key` from the payload of the next `event` task event
    /// into the instance payload under `destination_key`.
    StoreTaskResult {
        event: Tag,
        source_key: String,
        destination_key: String,
    },
    StartCooldown,
    /// Broadcasts on the owning entity's gameplay bus.
    SendGameplayEvent(Tag),
}

impl BehaviorKind {
    /// Behaviors that need a runtime instance (tasks and subscriptions).
    pub fn requires_instance(&self) -> bool {
        matches!(self, Self::RunTask(_) | Self::StoreTaskResult { .. })
    }
}
