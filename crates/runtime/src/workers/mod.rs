//! Worker tasks that back the runtime orchestration.
//!
//! The server worker owns the authoritative world and the replicator; each
//! client worker owns one client world. Workers talk to the handle through
//! command channels and to each other only through the transport.

mod client;
mod server;

pub(crate) use client::{ClientCommand, ClientWorker};
pub(crate) use server::{ServerCommand, ServerWorker};

use action_core::World;

use crate::events::{Event, EventBus, Peer};

/// Publishes every notification queued in `world`.
pub(crate) fn publish_notifications(world: &mut World, peer: Peer, bus: &EventBus) {
    for (entity, notification) in world.drain_notifications() {
        bus.publish(Event::notification(peer, entity, notification));
    }
}
