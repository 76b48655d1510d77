use thiserror::Error;

use crate::error::{CoreError, ErrorSeverity};
use crate::event::EventPayload;
use crate::handle::{ActionSpecHandle, ActiveActionHandle, EntityId, PredictionKey};
use crate::system::NetRole;
use crate::tag::{Tag, TagSet};

use super::EntityDelta;

/// Every message exchanged between a client world and the server world.
///
/// Client to server: `Execute`, `InputEvent`, `TaskEvent`.
/// Server to client: `Confirm`, `NotifyEnded`, `NotifyFailed`, `Replicate`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NetMessage {
    /// Request to run a spec; `key` is the client's prediction key.
    Execute {
        entity: EntityId,
        spec: ActionSpecHandle,
        key: PredictionKey,
    },
    InputEvent {
        entity: EntityId,
        spec: ActionSpecHandle,
        pressed: bool,
    },
    /// A task event raised by a predicting client.
    TaskEvent {
        entity: EntityId,
        active: ActiveActionHandle,
        key: PredictionKey,
        tag: Tag,
        payload: EventPayload,
    },
    Confirm {
        entity: EntityId,
        key: PredictionKey,
        success: bool,
    },
    NotifyEnded {
        entity: EntityId,
        active: ActiveActionHandle,
        key: PredictionKey,
        cancelled: bool,
    },
    NotifyFailed {
        entity: EntityId,
        spec: ActionSpecHandle,
        reasons: TagSet,
    },
    Replicate(EntityDelta),
}

impl NetMessage {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Execute { .. } => "execute",
            Self::InputEvent { .. } => "input_event",
            Self::TaskEvent { .. } => "task_event",
            Self::Confirm { .. } => "confirm",
            Self::NotifyEnded { .. } => "notify_ended",
            Self::NotifyFailed { .. } => "notify_failed",
            Self::Replicate(_) => "replicate",
        }
    }

    /// Entity the message is about.
    pub fn entity(&self) -> EntityId {
        match self {
            Self::Execute { entity, .. }
            | Self::InputEvent { entity, .. }
            | Self::TaskEvent { entity, .. }
            | Self::Confirm { entity, .. }
            | Self::NotifyEnded { entity, .. }
            | Self::NotifyFailed { entity, .. } => *entity,
            Self::Replicate(delta) => delta.entity,
        }
    }

    pub fn is_client_to_server(&self) -> bool {
        matches!(
            self,
            Self::Execute { .. } | Self::InputEvent { .. } | Self::TaskEvent { .. }
        )
    }
}

/// Where an outgoing message goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Recipient {
    Server,
    /// The connection controlling this entity.
    Owner(EntityId),
    All,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Outgoing {
    pub recipient: Recipient,
    pub message: NetMessage,
}

/// A message a world refused to process.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("message '{kind}' names unknown entity {entity}")]
    UnknownEntity { kind: &'static str, entity: EntityId },

    #[error("message '{kind}' cannot be processed by a {role} entity")]
    WrongRole { kind: &'static str, role: NetRole },
}

impl CoreError for ProtocolError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::UnknownEntity { .. } => ErrorSeverity::Recoverable,
            Self::WrongRole { .. } => ErrorSeverity::Validation,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownEntity { .. } => "PROTOCOL_UNKNOWN_ENTITY",
            Self::WrongRole { .. } => "PROTOCOL_WRONG_ROLE",
        }
    }
}
