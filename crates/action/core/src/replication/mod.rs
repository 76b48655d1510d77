//! Wire protocol between client and server worlds.
//!
//! Two channels exist. Reliable RPCs ([`NetMessage`] variants other than
//! `Replicate`) carry activation requests, confirmations, and end notices.
//! State replication carries [`EntityDelta`]s computed by the server-side
//! [`Replicator`]. Within one server step, RPCs are flushed before deltas.

mod delta;
mod messages;
mod replicator;

pub use delta::{
    AttributeValue, CollectionDelta, DeltaFields, EntityDelta, EntitySnapshot, TagCount,
    diff_collection,
};
pub use messages::{NetMessage, Outgoing, ProtocolError, Recipient};
pub use replicator::{ConnectionId, Replicator};
