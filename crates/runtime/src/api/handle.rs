//! Cloneable façade for issuing commands to the runtime.
//!
//! [`RuntimeHandle`] hides channel plumbing and offers async helpers for
//! driving the server and client worlds, stepping the clock, or streaming
//! events from specific topics.
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use action_core::replication::EntitySnapshot;
use action_core::{
    ActionSpecHandle, ActionTemplateId, ActiveEffectHandle, ConnectionId, EffectTemplateId,
    EntityId, EventPayload, Tag,
};
use tokio::sync::{broadcast, mpsc, oneshot};

use super::errors::{Result, RuntimeError};
use crate::events::{Event, EventBus, Topic};
use crate::workers::{ClientCommand, ServerCommand};

#[derive(Clone)]
pub(crate) struct ClientSlot {
    pub commands: mpsc::Sender<ClientCommand>,
    pub player: EntityId,
}

/// Client-facing handle to interact with the runtime
#[derive(Clone)]
pub struct RuntimeHandle {
    server: mpsc::Sender<ServerCommand>,
    clients: Arc<BTreeMap<ConnectionId, ClientSlot>>,
    event_bus: EventBus,
    max_settle_rounds: usize,
}

async fn request<C, T>(
    commands: &mpsc::Sender<C>,
    worker: &'static str,
    make: impl FnOnce(oneshot::Sender<T>) -> C,
) -> Result<T> {
    let (reply_tx, reply_rx) = oneshot::channel();
    commands
        .send(make(reply_tx))
        .await
        .map_err(|_| RuntimeError::CommandChannelClosed { worker })?;
    reply_rx.await.map_err(RuntimeError::ReplyChannelClosed)
}

impl RuntimeHandle {
    pub(crate) fn new(
        server: mpsc::Sender<ServerCommand>,
        clients: BTreeMap<ConnectionId, ClientSlot>,
        event_bus: EventBus,
        max_settle_rounds: usize,
    ) -> Self {
        Self {
            server,
            clients: Arc::new(clients),
            event_bus,
            max_settle_rounds,
        }
    }

    pub fn clients(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.clients.keys().copied()
    }

    /// The entity a client controls.
    pub fn player(&self, client: ConnectionId) -> Result<EntityId> {
        Ok(self.client(client)?.player)
    }

    fn client(&self, client: ConnectionId) -> Result<&ClientSlot> {
        self.clients
            .get(&client)
            .ok_or(RuntimeError::UnknownClient(client))
    }

    // ========================================================================
    // Server
    // ========================================================================

    /// Grants an action on the server; the grant replicates to clients.
    pub async fn grant(
        &self,
        entity: EntityId,
        template: impl Into<ActionTemplateId>,
        input: Tag,
        level: u32,
    ) -> Result<ActionSpecHandle> {
        let template = template.into();
        request(&self.server, "server", |reply| ServerCommand::Grant {
            entity,
            template,
            input,
            level,
            reply,
        })
        .await?
    }

    /// Applies an effect built from `source`'s attributes to `target`.
    pub async fn apply_effect(
        &self,
        source: EntityId,
        target: EntityId,
        effect: impl Into<EffectTemplateId>,
        level: u32,
    ) -> Result<Option<ActiveEffectHandle>> {
        let effect = effect.into();
        request(&self.server, "server", |reply| ServerCommand::ApplyEffect {
            source,
            target,
            effect,
            level,
            reply,
        })
        .await?
    }

    /// Sends a gameplay event on the server to one entity, or to all of them.
    pub async fn send_gameplay_event(
        &self,
        target: Option<EntityId>,
        tag: Tag,
        payload: EventPayload,
    ) -> Result<()> {
        request(&self.server, "server", |reply| ServerCommand::SendGameplayEvent {
            target,
            tag,
            payload,
            reply,
        })
        .await
    }

    /// Adds (or with a negative count, removes) tag stacks on the server.
    pub async fn add_tag(&self, entity: EntityId, tag: Tag, count: i32) -> Result<()> {
        request(&self.server, "server", |reply| ServerCommand::AddTag {
            entity,
            tag,
            count,
            reply,
        })
        .await?
    }

    pub async fn server_snapshot(&self, entity: EntityId) -> Result<Option<EntitySnapshot>> {
        request(&self.server, "server", |reply| ServerCommand::Snapshot { entity, reply }).await
    }

    // ========================================================================
    // Clients
    // ========================================================================

    pub async fn press(&self, client: ConnectionId, input: Tag) -> Result<()> {
        let slot = self.client(client)?;
        request(&slot.commands, "client", |reply| ClientCommand::InputPressed { input, reply }).await?
    }

    pub async fn release(&self, client: ConnectionId, input: Tag) -> Result<()> {
        let slot = self.client(client)?;
        request(&slot.commands, "client", |reply| ClientCommand::InputReleased { input, reply }).await?
    }

    /// Activates (and, for predicted actions, predicts) a granted template.
    pub async fn activate(
        &self,
        client: ConnectionId,
        template: impl Into<ActionTemplateId>,
    ) -> Result<ActionSpecHandle> {
        let slot = self.client(client)?;
        let template = template.into();
        request(&slot.commands, "client", |reply| ClientCommand::Activate { template, reply }).await?
    }

    pub async fn set_moving(&self, client: ConnectionId, moving: bool) -> Result<()> {
        let slot = self.client(client)?;
        request(&slot.commands, "client", |reply| ClientCommand::SetMoving { moving, reply }).await?
    }

    pub async fn client_snapshot(
        &self,
        client: ConnectionId,
        entity: EntityId,
    ) -> Result<Option<EntitySnapshot>> {
        let slot = self.client(client)?;
        request(&slot.commands, "client", |reply| ClientCommand::Snapshot { entity, reply }).await
    }

    // ========================================================================
    // Clock
    // ========================================================================

    /// Advances every world by `dt`, server first, then waits for the link
    /// to go quiet. Returns the server clock.
    pub async fn step(&self, dt: f32) -> Result<f32> {
        let now = request(&self.server, "server", |reply| ServerCommand::Advance { dt, reply }).await?;
        for slot in self.clients.values() {
            request(&slot.commands, "client", |reply| ClientCommand::Advance { dt, reply }).await?;
        }
        self.settle().await?;
        Ok(now)
    }

    /// Waits until no frame is in flight.
    ///
    /// Workers drain frames before commands, so a full ping round in which
    /// no worker handled a frame means nothing was sent during that round.
    pub async fn settle(&self) -> Result<()> {
        for _ in 0..self.max_settle_rounds {
            let mut handled = request(&self.server, "server", |reply| ServerCommand::Ping { reply }).await?;
            for slot in self.clients.values() {
                handled += request(&slot.commands, "client", |reply| ClientCommand::Ping { reply }).await?;
            }
            if handled == 0 {
                return Ok(());
            }
        }
        Err(RuntimeError::LinkNotSettled {
            rounds: self.max_settle_rounds,
        })
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Subscribe to events from a specific topic
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use runtime::Topic;
    ///
    /// let mut cooldowns = handle.subscribe(Topic::Cooldown);
    /// while let Ok(event) = cooldowns.recv().await {
    ///     // update the cooldown HUD
    /// }
    /// ```
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.event_bus.subscribe(topic)
    }

    pub fn subscribe_multiple(&self, topics: &[Topic]) -> HashMap<Topic, broadcast::Receiver<Event>> {
        self.event_bus.subscribe_multiple(topics)
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }
}
