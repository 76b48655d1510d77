//! Unified error types surfaced by the runtime API.
//!
//! Wraps failures from worker coordination, the wire codec, and the engine
//! so clients can bubble them up with consistent context.
use action_core::{
    ActionTemplateId, ActivationError, ConnectionId, EffectError, EntityId, ProtocolError,
    RegistryError, WorldError,
};
use thiserror::Error;
use tokio::sync::oneshot;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("{worker} worker command channel closed")]
    CommandChannelClosed { worker: &'static str },

    #[error("worker reply channel closed")]
    ReplyChannelClosed(#[source] oneshot::error::RecvError),

    #[error("worker join failed")]
    WorkerJoin(#[source] tokio::task::JoinError),

    #[error("wire codec failed")]
    Codec(#[from] bincode::Error),

    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: usize, limit: usize },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    World(#[from] WorldError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Activation(#[from] ActivationError),

    #[error(transparent)]
    Effect(#[from] EffectError),

    #[error("unknown client {0}")]
    UnknownClient(ConnectionId),

    #[error("{connection} does not own {entity}")]
    NotOwner {
        connection: ConnectionId,
        entity: EntityId,
    },

    #[error("action template {template} is not granted to {connection}")]
    SpecNotGranted {
        connection: ConnectionId,
        template: ActionTemplateId,
    },

    #[error("link still busy after {rounds} settle rounds")]
    LinkNotSettled { rounds: usize },

    #[error("invalid runtime configuration: {0}")]
    InvalidConfig(String),

    #[error("content library failed validation: {0}")]
    InvalidContent(String),
}
