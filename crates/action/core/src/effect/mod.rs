//! Effect engine data model.
//!
//! An [`EffectTemplate`] is authored content. Applying it produces an
//! [`EffectSpec`] (per-application copy with resolved set-by-caller values and
//! mutable tag sets) which either writes base values once (instant) or is
//! retained as an [`ActiveEffect`] that contributes to current values until it
//! expires or is removed.
//!
//! The application pipeline itself lives on the action system
//! (`system::effects`), because it needs the target's tags, timers, and
//! active actions.
//!
//! # Design Principles
//!
//! - **Lazy magnitudes**: Set-by-caller values are resolved at application
//!   time, never at spec creation
//! - **One removal path**: Expiry, removal by handle, by tag, and remove-all
//!   share the same notify-then-erase sequence
//! - **Captured source**: Executions read source attributes from a capture
//!   taken when the spec was made

mod active;
mod error;
mod execution;
mod spec;
mod template;

pub use active::{ActiveEffect, ActiveEffectState, ActiveEffectsContainer, aggregate};
pub use error::EffectError;
pub use execution::{
    DamageKind, DamageOutcome, Execution, ExecutionContext, cooldown_tag_for, mitigation,
};
pub use spec::{EffectContext, EffectSpec, ResolvedModifier, SourceCapture};
pub use template::{
    DurationPolicy, EffectTemplate, EffectTemplateId, ModifierOp, ModifierTemplate, ScalableFloat,
    StackingPolicy,
};
