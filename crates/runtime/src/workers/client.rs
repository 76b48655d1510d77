//! Client worker that owns one predicting client [`World`].

use action_core::replication::EntitySnapshot;
use action_core::{ActionSpecHandle, ActionTemplateId, EntityId, Recipient, Tag, World};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::api::{Result, RuntimeError};
use crate::events::{Direction, Event, EventBus, NetworkEvent, Peer};
use crate::transport::{ClientLink, WireCodec};

use super::publish_notifications;

/// Commands that can be sent to a client worker
pub(crate) enum ClientCommand {
    InputPressed {
        input: Tag,
        reply: oneshot::Sender<Result<()>>,
    },
    InputReleased {
        input: Tag,
        reply: oneshot::Sender<Result<()>>,
    },
    Activate {
        template: ActionTemplateId,
        reply: oneshot::Sender<Result<ActionSpecHandle>>,
    },
    SetMoving {
        moving: bool,
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
    Ping { reply: oneshot::Sender<usize> },
}

pub(crate) struct ClientWorker {
    world: World,
    player: EntityId,
    link: ClientLink,
    commands: mpsc::Receiver<ClientCommand>,
    events: EventBus,
    frames_handled: usize,
}

impl ClientWorker {
    pub fn new(
        world: World,
        player: EntityId,
        link: ClientLink,
        commands: mpsc::Receiver<ClientCommand>,
        events: EventBus,
    ) -> Self {
        tracing::info!(
            target: "runtime::session",
            connection = %link.connection,
            player = %player,
            "client worker initialized"
        );
        Self {
            world,
            player,
            link,
            commands,
            events,
            frames_handled: 0,
        }
    }

    fn peer(&self) -> Peer {
        Peer::Client(self.link.connection)
    }

    /// Main worker loop. Frames are drained before commands.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                Some(payload) = self.link.downlink.recv() => self.handle_frame(payload).await,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
            }
        }
        tracing::info!(target: "runtime::session", connection = %self.link.connection, "client worker stopped");
    }

    async fn handle_command(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::InputPressed { input, reply } => {
                let result = self.world.input_pressed(self.player, &input).map_err(Into::into);
                self.pump().await;
                let _ = reply.send(result);
            }
            ClientCommand::InputReleased { input, reply } => {
                let result = self.world.input_released(self.player, &input).map_err(Into::into);
                self.pump().await;
                let _ = reply.send(result);
            }
            ClientCommand::Activate { template, reply } => {
                let result = self.activate(&template);
                self.pump().await;
                if reply.send(result).is_err() {
                    debug!(target: "runtime::session", "Activate reply channel closed");
                }
            }
            ClientCommand::SetMoving { moving, reply } => {
                let result = self.world.set_moving(self.player, moving).map_err(Into::into);
                self.pump().await;
                let _ = reply.send(result);
            }
            ClientCommand::Advance { dt, reply } => {
                self.world.advance(dt);
                self.pump().await;
                let _ = reply.send(self.world.now());
            }
            ClientCommand::Snapshot { entity, reply } => {
                let snapshot = self.world.system(entity).map(EntitySnapshot::capture);
                let _ = reply.send(snapshot);
            }
            ClientCommand::Ping { reply } => {
                let _ = reply.send(std::mem::take(&mut self.frames_handled));
            }
        }
    }

    fn activate(&mut self, template: &ActionTemplateId) -> Result<ActionSpecHandle> {
        let connection = self.link.connection;
        let system = self
            .world
            .system_mut(self.player)
            .ok_or(action_core::WorldError::UnknownEntity(self.player))?;
        let spec = system
            .find_spec_by_template(template.as_str())
            .map(|spec| spec.handle)
            .ok_or_else(|| RuntimeError::SpecNotGranted {
                connection,
                template: template.clone(),
            })?;
        system.try_activate(spec)?;
        Ok(spec)
    }

    async fn handle_frame(&mut self, payload: Vec<u8>) {
        self.frames_handled += 1;
        let connection = self.link.connection;
        let message = match WireCodec::decode(&payload) {
            Ok(message) => message,
            Err(err) => {
                warn!(target: "runtime::transport", %connection, error = %err, "dropping undecodable frame");
                return;
            }
        };
        self.events.publish(Event::Network(NetworkEvent {
            peer: self.peer(),
            direction: Direction::Received,
            connection,
            kind: message.kind(),
            bytes: payload.len(),
        }));
        if let Err(err) = self.world.receive(message) {
            warn!(target: "runtime::transport", %connection, error = %err, "message refused");
        }
        self.pump().await;
    }

    /// Sends queued server-bound messages.
    async fn pump(&mut self) {
        self.world.flush();
        let connection = self.link.connection;
        for outgoing in self.world.take_outgoing() {
            if outgoing.recipient != Recipient::Server {
                debug!(target: "runtime::transport", %connection, kind = outgoing.message.kind(), "dropping non-server message");
                continue;
            }
            let payload = match WireCodec::encode(&outgoing.message) {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::error!(target: "runtime::transport", kind = outgoing.message.kind(), error = %err, "failed to encode message");
                    continue;
                }
            };
            self.events.publish(Event::Network(NetworkEvent {
                peer: self.peer(),
                direction: Direction::Sent,
                connection,
                kind: outgoing.message.kind(),
                bytes: payload.len(),
            }));
            self.link.send(payload).await;
        }
        let peer = self.peer();
        publish_notifications(&mut self.world, peer, &self.events);
    }
}
