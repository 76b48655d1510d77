//! Server worker that owns the authoritative [`World`].
//!
//! Receives commands from [`crate::RuntimeHandle`] and frames from clients,
//! applies them to the world, and sends RPCs followed by replication deltas
//! back over the transport.

use std::collections::BTreeMap;

use action_core::replication::EntitySnapshot;
use action_core::{
    ActionSpecHandle, ActionTemplateId, ActiveEffectHandle, ConnectionId, EffectTemplateId,
    EntityId, EventPayload, NetMessage, Recipient, Replicator, Tag, World,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::api::{Result, RuntimeError};
use crate::events::{Direction, Event, EventBus, NetworkEvent, Peer};
use crate::transport::{Frame, ServerLink, WireCodec};

use super::publish_notifications;

/// Commands that can be sent to the server worker
pub(crate) enum ServerCommand {
    Grant {
        entity: EntityId,
        template: ActionTemplateId,
        input: Tag,
        level: u32,
        reply: oneshot::Sender<Result<ActionSpecHandle>>,
    },
    ApplyEffect {
        source: EntityId,
        target: EntityId,
        effect: EffectTemplateId,
        level: u32,
        reply: oneshot::Sender<Result<Option<ActiveEffectHandle>>>,
    },
    SendGameplayEvent {
        target: Option<EntityId>,
        tag: Tag,
        payload: EventPayload,
        reply: oneshot::Sender<()>,
    },
    AddTag {
        entity: EntityId,
        tag: Tag,
        count: i32,
        reply: oneshot::Sender<Result<()>>,
    },
    Advance {
        dt: f32,
        reply: oneshot::Sender<f32>,
    },
    Snapshot {
        entity: EntityId,
        reply: oneshot::Sender<Option<EntitySnapshot>>,
    },
    /// Reports how many frames were handled since the previous ping.
    Ping { reply: oneshot::Sender<usize> },
}

pub(crate) struct ServerWorker {
    world: World,
    replicator: Replicator,
    owners: BTreeMap<EntityId, ConnectionId>,
    link: ServerLink,
    commands: mpsc::Receiver<ServerCommand>,
    events: EventBus,
    frames_handled: usize,
}

impl ServerWorker {
    pub fn new(
        world: World,
        owners: BTreeMap<EntityId, ConnectionId>,
        link: ServerLink,
        commands: mpsc::Receiver<ServerCommand>,
        events: EventBus,
    ) -> Self {
        let mut replicator = Replicator::new();
        for connection in link.connections() {
            replicator.add_connection(connection);
        }
        tracing::info!(
            target: "runtime::session",
            entities = world.entities().len(),
            connections = replicator.connections().count(),
            "server worker initialized"
        );
        Self {
            world,
            replicator,
            owners,
            link,
            commands,
            events,
            frames_handled: 0,
        }
    }

    /// Main worker loop. Frames are drained before commands.
    pub async fn run(mut self) {
        self.pump().await;
        loop {
            tokio::select! {
                biased;
                Some(frame) = self.link.uplink.recv() => self.handle_frame(frame).await,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
            }
        }
        tracing::info!(target: "runtime::session", "server worker stopped");
    }

    async fn handle_command(&mut self, command: ServerCommand) {
        match command {
            ServerCommand::Grant {
                entity,
                template,
                input,
                level,
                reply,
            } => {
                let result = self.grant(entity, &template, input, level);
                self.pump().await;
                if reply.send(result).is_err() {
                    debug!(target: "runtime::session", "Grant reply channel closed");
                }
            }
            ServerCommand::ApplyEffect {
                source,
                target,
                effect,
                level,
                reply,
            } => {
                let result = self.apply_effect(source, target, &effect, level);
                self.pump().await;
                if reply.send(result).is_err() {
                    debug!(target: "runtime::session", "ApplyEffect reply channel closed");
                }
            }
            ServerCommand::SendGameplayEvent {
                target,
                tag,
                payload,
                reply,
            } => {
                self.world.send_gameplay_event(target, &tag, &payload);
                self.pump().await;
                let _ = reply.send(());
            }
            ServerCommand::AddTag {
                entity,
                tag,
                count,
                reply,
            } => {
                let result = match self.world.system_mut(entity) {
                    Some(system) => {
                        system.add_tag(&tag, count);
                        Ok(())
                    }
                    None => Err(action_core::WorldError::UnknownEntity(entity).into()),
                };
                self.pump().await;
                let _ = reply.send(result);
            }
            ServerCommand::Advance { dt, reply } => {
                self.world.advance(dt);
                self.pump().await;
                let _ = reply.send(self.world.now());
            }
            ServerCommand::Snapshot { entity, reply } => {
                let snapshot = self.world.system(entity).map(EntitySnapshot::capture);
                let _ = reply.send(snapshot);
            }
            ServerCommand::Ping { reply } => {
                let _ = reply.send(std::mem::take(&mut self.frames_handled));
            }
        }
    }

    fn grant(
        &mut self,
        entity: EntityId,
        template: &ActionTemplateId,
        input: Tag,
        level: u32,
    ) -> Result<ActionSpecHandle> {
        let system = self
            .world
            .system_mut(entity)
            .ok_or(action_core::WorldError::UnknownEntity(entity))?;
        Ok(system.grant(template, input, level)?)
    }

    fn apply_effect(
        &mut self,
        source: EntityId,
        target: EntityId,
        effect: &EffectTemplateId,
        level: u32,
    ) -> Result<Option<ActiveEffectHandle>> {
        let spec = self
            .world
            .system(source)
            .ok_or(action_core::WorldError::UnknownEntity(source))?
            .make_outgoing_spec(effect, level)?;
        Ok(self.world.apply_effect(target, spec)?)
    }

    async fn handle_frame(&mut self, frame: Frame) {
        self.frames_handled += 1;
        let Frame {
            connection,
            payload,
        } = frame;
        let message = match WireCodec::decode(&payload) {
            Ok(message) => message,
            Err(err) => {
                warn!(target: "runtime::transport", %connection, error = %err, "dropping undecodable frame");
                return;
            }
        };
        self.events.publish(Event::Network(NetworkEvent {
            peer: Peer::Server,
            direction: Direction::Received,
            connection,
            kind: message.kind(),
            bytes: payload.len(),
        }));

        if let Err(err) = self.check_sender(connection, &message) {
            warn!(target: "runtime::transport", %connection, error = %err, "rejecting frame");
            return;
        }
        if let Err(err) = self.world.receive(message) {
            warn!(target: "runtime::transport", %connection, error = %err, "message refused");
        }
        self.pump().await;
    }

    /// Clients may only speak for entities they own.
    fn check_sender(&self, connection: ConnectionId, message: &NetMessage) -> Result<()> {
        let entity = message.entity();
        if self.owners.get(&entity) != Some(&connection) {
            return Err(RuntimeError::NotOwner { connection, entity });
        }
        Ok(())
    }

    /// Sends queued RPCs, then each connection's replication delta.
    async fn pump(&mut self) {
        self.world.flush();
        for outgoing in self.world.take_outgoing() {
            let targets: Vec<ConnectionId> = match outgoing.recipient {
                Recipient::Owner(entity) => self.owners.get(&entity).copied().into_iter().collect(),
                Recipient::All => self.link.connections().collect(),
                Recipient::Server => {
                    warn!(target: "runtime::transport", kind = outgoing.message.kind(), "server addressed itself");
                    continue;
                }
            };
            self.send(&targets, &outgoing.message).await;
        }

        for (connection, delta) in self.replicator.replicate(self.world.systems()) {
            self.send(&[connection], &NetMessage::Replicate(delta)).await;
        }
        publish_notifications(&mut self.world, Peer::Server, &self.events);
    }

    async fn send(&self, targets: &[ConnectionId], message: &NetMessage) {
        let payload = match WireCodec::encode(message) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(target: "runtime::transport", kind = message.kind(), error = %err, "failed to encode message");
                return;
            }
        };
        for &connection in targets {
            self.events.publish(Event::Network(NetworkEvent {
                peer: Peer::Server,
                direction: Direction::Sent,
                connection,
                kind: message.kind(),
                bytes: payload.len(),
            }));
            self.link.send(connection, payload.clone()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_core::{
        ActionConfig, ActionTemplate, ContentLibrary, NetRole, PhaseData, PredictionKey,
        TransitionKind,
    };

    use crate::events::Topic;
    use crate::transport;

    const ALICE: ConnectionId = ConnectionId(1);
    const BOB: ConnectionId = ConnectionId(2);

    fn world() -> (World, ActionSpecHandle) {
        let template = ActionTemplate::new("Guard").phase_data(
            PhaseData::new("Phase.Action.Guard").transition(TransitionKind::Manual, "Phase.Action.Done"),
        );
        let content = ContentLibrary::builder().action(template).build();
        let mut world = World::new(content, ActionConfig::default());
        world.spawn(EntityId(1), NetRole::Authority).unwrap();
        world.spawn(EntityId(2), NetRole::Authority).unwrap();
        let spec = world
            .system_mut(EntityId(2))
            .unwrap()
            .grant(&"Guard".into(), Tag::new("Input.Action.Primary"), 1)
            .unwrap();
        (world, spec)
    }

    async fn active_count(commands: &mpsc::Sender<ServerCommand>, entity: EntityId) -> usize {
        let (reply, rx) = oneshot::channel();
        commands.send(ServerCommand::Snapshot { entity, reply }).await.unwrap();
        rx.await.unwrap().unwrap().active.len()
    }

    #[tokio::test]
    async fn frames_for_entities_of_other_connections_are_dropped() {
        let (world, spec) = world();
        let owners = BTreeMap::from([(EntityId(1), ALICE), (EntityId(2), BOB)]);
        let (server_link, clients) = transport::connect(&[ALICE, BOB], 16);
        let (tx, rx) = mpsc::channel(8);
        let bus = EventBus::new();
        let mut network = bus.subscribe(Topic::Network);
        let worker = tokio::spawn(ServerWorker::new(world, owners, server_link, rx, bus).run());

        let execute = NetMessage::Execute {
            entity: EntityId(2),
            spec,
            key: PredictionKey(1),
        };
        let payload = WireCodec::encode(&execute).unwrap();

        clients[0].send(payload.clone()).await;
        assert_eq!(active_count(&tx, EntityId(2)).await, 0);

        clients[1].send(payload).await;
        assert_eq!(active_count(&tx, EntityId(2)).await, 1);

        let mut received = 0;
        while let Ok(event) = network.try_recv() {
            if let Event::Network(NetworkEvent {
                direction: Direction::Received,
                kind,
                ..
            }) = event
            {
                assert_eq!(kind, "execute");
                received += 1;
            }
        }
        assert_eq!(received, 2);

        drop(tx);
        worker.await.unwrap();
    }
}
