//! Event payloads carried by the bus.

use std::fmt;

use action_core::{ConnectionId, EntityId, Notification};

/// Which world an event came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Peer {
    Server,
    Client(ConnectionId),
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Peer::Server => f.write_str("server"),
            Peer::Client(connection) => write!(f, "client({connection})"),
        }
    }
}

/// An engine notification raised by one entity of one world.
#[derive(Clone, Debug, PartialEq)]
pub struct NotificationEvent {
    pub peer: Peer,
    pub entity: EntityId,
    pub notification: Notification,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

/// One frame crossing the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkEvent {
    pub peer: Peer,
    pub direction: Direction,
    pub connection: ConnectionId,
    pub kind: &'static str,
    pub bytes: usize,
}
