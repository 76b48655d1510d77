//! Message transport between the server worker and client workers.
//!
//! Every [`NetMessage`] crosses the link as a bincode frame. Links are
//! bounded tokio channels: one uplink shared by all clients (frames tagged with
//! their [`ConnectionId`]) and one downlink per client. Delivery is lossless
//! and in order per direction.

use std::collections::BTreeMap;

use action_core::{ConnectionId, NetMessage};
use tokio::sync::mpsc;

use crate::api::{Result, RuntimeError};

/// Encodes and decodes wire frames.
pub struct WireCodec;

impl WireCodec {
    /// Largest frame either side accepts.
    pub const MAX_FRAME_BYTES: usize = 1 << 20;

    pub fn encode(message: &NetMessage) -> Result<Vec<u8>> {
        let bytes = bincode::serialize(message)?;
        Self::check_size(bytes.len())?;
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<NetMessage> {
        Self::check_size(bytes.len())?;
        Ok(bincode::deserialize(bytes)?)
    }

    fn check_size(size: usize) -> Result<()> {
        if size > Self::MAX_FRAME_BYTES {
            return Err(RuntimeError::FrameTooLarge {
                size,
                limit: Self::MAX_FRAME_BYTES,
            });
        }
        Ok(())
    }
}

/// A client-to-server frame.
#[derive(Debug)]
pub struct Frame {
    pub connection: ConnectionId,
    pub payload: Vec<u8>,
}

/// Server end of every link.
pub(crate) struct ServerLink {
    pub uplink: mpsc::Receiver<Frame>,
    pub downlinks: BTreeMap<ConnectionId, mpsc::Sender<Vec<u8>>>,
}

impl ServerLink {
    pub async fn send(&self, connection: ConnectionId, payload: Vec<u8>) {
        let Some(downlink) = self.downlinks.get(&connection) else {
            tracing::warn!(target: "runtime::transport", %connection, "no downlink for connection");
            return;
        };
        if downlink.send(payload).await.is_err() {
            tracing::warn!(target: "runtime::transport", %connection, "downlink closed; frame dropped");
        }
    }

    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.downlinks.keys().copied()
    }
}

/// Client end of one link.
pub(crate) struct ClientLink {
    pub connection: ConnectionId,
    pub uplink: mpsc::Sender<Frame>,
    pub downlink: mpsc::Receiver<Vec<u8>>,
}

impl ClientLink {
    pub async fn send(&self, payload: Vec<u8>) {
        let frame = Frame {
            connection: self.connection,
            payload,
        };
        if self.uplink.send(frame).await.is_err() {
            tracing::warn!(target: "runtime::transport", connection = %self.connection, "uplink closed; frame dropped");
        }
    }
}

/// Wires one server link to a client link per connection.
pub(crate) fn connect(connections: &[ConnectionId], buffer: usize) -> (ServerLink, Vec<ClientLink>) {
    let buffer = buffer.max(1);
    let (uplink_tx, uplink_rx) = mpsc::channel(buffer);
    let mut downlinks = BTreeMap::new();
    let mut clients = Vec::with_capacity(connections.len());
    for &connection in connections {
        let (down_tx, down_rx) = mpsc::channel(buffer);
        downlinks.insert(connection, down_tx);
        clients.push(ClientLink {
            connection,
            uplink: uplink_tx.clone(),
            downlink: down_rx,
        });
    }
    (
        ServerLink {
            uplink: uplink_rx,
            downlinks,
        },
        clients,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_core::replication::EntityDelta;
    use action_core::{ActionSpecHandle, EntityId, PredictionKey, Tag, TagSet};

    #[test]
    fn frames_decode_to_the_same_message() {
        let messages = [
            NetMessage::Execute {
                entity: EntityId(3),
                spec: ActionSpecHandle::generate(),
                key: PredictionKey(7),
            },
            NetMessage::NotifyFailed {
                entity: EntityId(3),
                spec: ActionSpecHandle::generate(),
                reasons: TagSet::single(Tag::new("Action.Fail.IsDead")),
            },
            NetMessage::Replicate(EntityDelta::full(EntityId(3), &Default::default())),
        ];
        for message in messages {
            let bytes = WireCodec::encode(&message).unwrap();
            assert_eq!(WireCodec::decode(&bytes).unwrap(), message);
        }
    }

    #[test]
    fn garbage_is_a_codec_error() {
        let err = WireCodec::decode(&[0xff; 3]).unwrap_err();
        assert!(matches!(err, RuntimeError::Codec(_)));
    }

    #[test]
    fn oversized_frames_are_refused() {
        let err = WireCodec::decode(&vec![0; WireCodec::MAX_FRAME_BYTES + 1]).unwrap_err();
        assert!(matches!(err, RuntimeError::FrameTooLarge { .. }));
    }

    #[tokio::test]
    async fn uplink_frames_carry_their_connection() {
        let (mut server, clients) = connect(&[ConnectionId(1), ConnectionId(2)], 4);
        clients[1].send(vec![1, 2, 3]).await;
        let frame = server.uplink.recv().await.unwrap();
        assert_eq!(frame.connection, ConnectionId(2));
        assert_eq!(frame.payload, vec![1, 2, 3]);
        assert_eq!(server.connections().count(), 2);
    }
}
