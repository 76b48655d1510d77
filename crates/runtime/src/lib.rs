//! Async session runtime for the action engine.
//!
//! This crate hosts one authoritative server [`action_core::World`] and one
//! predicting client world per connection, each in its own tokio worker, and
//! joins them with a bincode transport. Consumers embed [`Runtime`] to tick
//! the session, subscribe to events, and drive clients through
//! [`RuntimeHandle`].
//!
//! Modules are organized by responsibility:
//! - [`runtime`] hosts the orchestrator, config and builder
//! - [`api`] exposes the types downstream clients interact with
//! - [`events`] provides topic-based event bus for flexible event routing
//! - [`transport`] holds the wire codec and link plumbing
//! - `workers` keeps background tasks internal to the crate
pub mod api;
pub mod events;
pub mod runtime;
pub mod transport;

mod workers;

pub use api::{
    IdleInputProvider, InputIntent, InputProvider, Result, RuntimeError, RuntimeHandle,
    ScriptedInputProvider,
};
pub use events::{Direction, Event, EventBus, NetworkEvent, NotificationEvent, Peer, Topic};
pub use runtime::{Runtime, RuntimeBuilder, RuntimeConfig};
pub use transport::{Frame, WireCodec};
