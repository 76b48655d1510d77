use thiserror::Error;

use crate::error::{CoreError, ErrorContext, ErrorSeverity};
use crate::handle::ActionSpecHandle;
use crate::tag::{Tag, TagSet, names};

use super::ActionTemplateId;

/// Structured precondition failure: the set of `Action.Fail.*` reasons.
#[derive(Clone, Debug, PartialEq)]
pub struct ActivationFailure {
    pub spec: ActionSpecHandle,
    pub reasons: TagSet,
}

impl ActivationFailure {
    pub fn new(spec: ActionSpecHandle) -> Self {
        Self {
            spec,
            reasons: TagSet::new(),
        }
    }

    pub fn single(spec: ActionSpecHandle, reason: &str) -> Self {
        Self {
            spec,
            reasons: TagSet::single(Tag::new(reason)),
        }
    }

    pub fn add(&mut self, reason: Tag) {
        self.reasons.insert(reason);
    }

    pub fn has_reason(&self, reason: &str) -> bool {
        self.reasons.has_tag_exact(&Tag::new(reason))
    }

    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }
}

impl core::fmt::Display for ActivationFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} cannot activate:", self.spec)?;
        for reason in &self.reasons {
            write!(f, " {reason}")?;
        }
        Ok(())
    }
}

/// Errors from activation requests.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ActivationError {
    #[error("{0}")]
    Precondition(ActivationFailure),

    #[error("spec {spec} is not granted")]
    UnknownSpec {
        spec: ActionSpecHandle,
        context: ErrorContext,
    },

    #[error("spec {spec} already has a prediction awaiting confirmation")]
    PredictionPending {
        spec: ActionSpecHandle,
        context: ErrorContext,
    },

    #[error("action template '{0}' is not loaded")]
    MissingTemplate(ActionTemplateId),

    #[error("simulated proxies cannot activate actions")]
    NotLocallyControlled,
}

impl ActivationError {
    pub fn failure(&self) -> Option<&ActivationFailure> {
        match self {
            Self::Precondition(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<ActivationFailure> for ActivationError {
    fn from(failure: ActivationFailure) -> Self {
        Self::Precondition(failure)
    }
}

impl CoreError for ActivationError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Precondition(_) | Self::PredictionPending { .. } => ErrorSeverity::Recoverable,
            Self::UnknownSpec { .. } | Self::NotLocallyControlled => ErrorSeverity::Validation,
            Self::MissingTemplate(_) => ErrorSeverity::Internal,
        }
    }

    fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::UnknownSpec { context, .. } | Self::PredictionPending { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::Precondition(failure) => {
                if failure.has_reason(names::FAIL_IS_DEAD) {
                    "ACTION_OWNER_DEAD"
                } else if failure.has_reason(names::FAIL_COOLDOWN) {
                    "ACTION_ON_COOLDOWN"
                } else if failure.has_reason(names::FAIL_COST)
                    || failure.has_reason(names::FAIL_ADDITIONAL_COST)
                {
                    "ACTION_INSUFFICIENT_COST"
                } else if failure.has_reason(names::FAIL_ALREADY_ACTIVE) {
                    "ACTION_ALREADY_ACTIVE"
                } else {
                    "ACTION_TAG_REQUIREMENTS"
                }
            }
            Self::UnknownSpec { .. } => "ACTION_UNKNOWN_SPEC",
            Self::PredictionPending { .. } => "ACTION_PREDICTION_PENDING",
            Self::MissingTemplate(_) => "ACTION_MISSING_TEMPLATE",
            Self::NotLocallyControlled => "ACTION_NOT_LOCALLY_CONTROLLED",
        }
    }
}

/// Errors from granting and revoking specs.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("action template '{0}' is not loaded")]
    UnknownTemplate(ActionTemplateId),

    #[error("only the authority may {operation}")]
    NotAuthority { operation: &'static str },

    #[error("spec {0} is not granted")]
    UnknownSpec(ActionSpecHandle),
}

impl CoreError for RegistryError {
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Validation
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownTemplate(_) => "REGISTRY_UNKNOWN_TEMPLATE",
            Self::NotAuthority { .. } => "REGISTRY_NOT_AUTHORITY",
            Self::UnknownSpec(_) => "REGISTRY_UNKNOWN_SPEC",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_follows_first_matching_reason() {
        let mut failure = ActivationFailure::single(ActionSpecHandle(1), names::FAIL_COOLDOWN);
        failure.add(Tag::new(names::FAIL_TAGS_BLOCKED));
        let err = ActivationError::from(failure);
        assert_eq!(err.error_code(), "ACTION_ON_COOLDOWN");
        assert!(err.severity().is_recoverable());
        assert!(err.to_string().contains("Action.Fail.Cooldown"));
    }

    #[test]
    fn registry_errors_are_validation() {
        let err = RegistryError::NotAuthority { operation: "grant" };
        assert_eq!(err.severity(), ErrorSeverity::Validation);
        assert_eq!(err.to_string(), "only the authority may grant");
    }
}
