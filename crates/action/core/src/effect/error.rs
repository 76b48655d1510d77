use thiserror::Error;

use crate::error::{CoreError, ErrorSeverity};
use crate::handle::EntityId;
use crate::tag::TagSet;

use super::EffectTemplateId;

/// Reasons an effect application is refused.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum EffectError {
    #[error("effect template '{0}' is not registered")]
    UnknownTemplate(EffectTemplateId),

    #[error("target {0} does not exist")]
    UnknownTarget(EntityId),

    #[error("target is missing required tags {missing:?}")]
    TagsMissing { missing: TagSet },

    #[error("target holds blocking tags {blocking:?}")]
    TagsBlocked { blocking: TagSet },

    #[error("target vetoed effect '{0}'")]
    Vetoed(EffectTemplateId),

    #[error("effect '{effect}' has no level data for level {level}")]
    MissingLevelData { effect: EffectTemplateId, level: u32 },

    #[error("effects are applied by the authority only")]
    NotAuthority,
}

impl CoreError for EffectError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::TagsMissing { .. } | Self::TagsBlocked { .. } | Self::Vetoed(_) => {
                ErrorSeverity::Recoverable
            }
            Self::UnknownTemplate(_) | Self::UnknownTarget(_) | Self::NotAuthority => {
                ErrorSeverity::Validation
            }
            Self::MissingLevelData { .. } => ErrorSeverity::Internal,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownTemplate(_) => "EFFECT_UNKNOWN_TEMPLATE",
            Self::UnknownTarget(_) => "EFFECT_UNKNOWN_TARGET",
            Self::TagsMissing { .. } => "EFFECT_TAGS_MISSING",
            Self::TagsBlocked { .. } => "EFFECT_TAGS_BLOCKED",
            Self::Vetoed(_) => "EFFECT_VETOED",
            Self::MissingLevelData { .. } => "EFFECT_MISSING_LEVEL_DATA",
            Self::NotAuthority => "EFFECT_NOT_AUTHORITY",
        }
    }
}
