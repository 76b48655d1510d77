//! Error classification shared by every action-core error enum.
//!
//! Each subsystem defines its own `thiserror` enum next to the operations it
//! guards (`RegistryError`, `ActivationError`, `EffectError`, ...). They all
//! implement [`CoreError`] so callers can route failures by [`ErrorSeverity`]
//! without matching on concrete variants. Failures are returned or surfaced as
//! notifications; nothing in the engine panics on bad input.

use crate::handle::{ActionSpecHandle, EntityId};

/// How a caller should treat a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorSeverity {
    /// The same request may succeed on a later tick (cooldown, cost, blocking tag).
    Recoverable,

    /// The request is malformed for this peer (unknown handle, grant on a proxy).
    Validation,

    /// Bad content or a protocol desync (missing level row, rehome of an ended instance).
    Internal,

    /// Engine state is corrupt.
    Fatal,
}

impl ErrorSeverity {
    /// Lowercase label used in log fields.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Recoverable => "recoverable",
            Self::Validation => "validation",
            Self::Internal => "internal",
            Self::Fatal => "fatal",
        }
    }

    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable)
    }

    /// Bad data or an engine bug rather than a rejected request.
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal | Self::Fatal)
    }
}

/// Where and when an activation-path error happened.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorContext {
    pub entity: Option<EntityId>,
    pub spec: Option<ActionSpecHandle>,
    /// World clock, in seconds.
    pub time: f32,
    pub note: Option<&'static str>,
}

impl ErrorContext {
    #[must_use]
    pub const fn new(time: f32) -> Self {
        Self {
            entity: None,
            spec: None,
            time,
            note: None,
        }
    }

    #[must_use]
    pub const fn with_entity(mut self, entity: EntityId) -> Self {
        self.entity = Some(entity);
        self
    }

    #[must_use]
    pub const fn with_spec(mut self, spec: ActionSpecHandle) -> Self {
        self.spec = Some(spec);
        self
    }

    #[must_use]
    pub const fn with_note(mut self, note: &'static str) -> Self {
        self.note = Some(note);
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Implemented by every action-core error enum.
pub trait CoreError: core::fmt::Display + core::fmt::Debug {
    fn severity(&self) -> ErrorSeverity;

    fn context(&self) -> Option<&ErrorContext> {
        None
    }

    /// Stable identifier for log filtering and tests.
    fn error_code(&self) -> &'static str {
        core::any::type_name::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_classification() {
        assert!(ErrorSeverity::Recoverable.is_recoverable());
        assert!(!ErrorSeverity::Validation.is_recoverable());
        assert!(ErrorSeverity::Internal.is_internal());
        assert!(ErrorSeverity::Fatal.is_internal());
        assert_eq!(ErrorSeverity::Validation.as_str(), "validation");
    }

    #[test]
    fn context_builder_chains() {
        let ctx = ErrorContext::new(1.5)
            .with_entity(EntityId(3))
            .with_spec(ActionSpecHandle(9))
            .with_note("grant rejected");

        assert_eq!(ctx.entity, Some(EntityId(3)));
        assert_eq!(ctx.spec, Some(ActionSpecHandle(9)));
        assert_eq!(ctx.note, Some("grant rejected"));
        assert_eq!(ctx.time, 1.5);
    }
}
