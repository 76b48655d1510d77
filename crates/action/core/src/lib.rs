//! Deterministic, networked ability-execution engine.
//!
//! `action-core` runs player-triggered actions as server-authoritative,
//! phase-based state machines. The owning client may predict an action ahead
//! of the server and is reconciled (rehomed) onto the authoritative execution
//! once it replicates. Actions change attributes through effects (instant,
//! timed, periodic) and publish cooldowns as a replicated resource.
//!
//! Every peer runs a [`World`]; each entity in it owns an [`ActionSystem`].
//! Worlds exchange [`NetMessage`]s and never share state. The crate is
//! single-threaded and performs no I/O; the `runtime` crate hosts worlds on
//! async workers.
pub mod action;
pub mod attribute;
pub mod config;
pub mod content;
pub mod cooldown;
pub mod effect;
pub mod error;
pub mod event;
pub mod handle;
pub mod phase;
pub mod replication;
pub mod rng;
pub mod system;
pub mod tag;
pub mod task;
pub mod timer;
pub mod world;

#[cfg(test)]
pub(crate) mod test_utils;

pub use action::{
    ActionInstance, ActionSpec, ActionTemplate, ActionTemplateId, ActivationError,
    ActivationFailure, ActivationPolicy, ActiveAction, InstancingPolicy, NetExecutionPolicy,
    RegistryError,
};
pub use attribute::{Attribute, AttributeData, AttributeStore};
pub use config::ActionConfig;
pub use content::{ContentError, ContentLibrary, ContentLibraryBuilder};
pub use cooldown::{CooldownEntry, CooldownTracker};
pub use effect::{
    ActiveEffect, ActiveEffectState, DurationPolicy, EffectError, EffectSpec, EffectTemplate,
    EffectTemplateId, ModifierOp, ScalableFloat, StackingPolicy,
};
pub use error::{CoreError, ErrorContext, ErrorSeverity};
pub use event::{EventPayload, PayloadValue, Subscription};
pub use handle::{
    ActionSpecHandle, ActiveActionHandle, ActiveEffectHandle, EntityHandle, EntityId,
    PredictionKey,
};
pub use phase::{BehaviorKind, NetPolicy, PhaseBehavior, PhaseCondition, PhaseData, PhaseInfo, TransitionKind};
pub use replication::{
    ConnectionId, EntityDelta, NetMessage, Outgoing, ProtocolError, Recipient, Replicator,
};
pub use system::{ActionSystem, NetRole, Notification};
pub use tag::{Tag, TagRelationship, TagRelationshipMapping, TagSet};
pub use task::{TaskSpec, TimelineNotify};
pub use world::{EntityRegistry, World, WorldError};
