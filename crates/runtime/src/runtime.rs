//! High-level runtime orchestrator.
//!
//! The runtime owns the server worker and one worker per client, wires up
//! command channels, the transport and the event bus, and exposes a
//! builder-based API for driving a session.

use std::collections::BTreeMap;
use std::time::Duration;

use action_core::{
    ActionConfig, ActionTemplateId, ConnectionId, ContentLibrary, EntityId, NetRole, Tag, World,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::api::handle::ClientSlot;
use crate::api::{InputIntent, InputProvider, Result, RuntimeError, RuntimeHandle};
use crate::events::{Event, EventBus, Topic};
use crate::transport;
use crate::workers::{ClientWorker, ServerWorker};

/// Runtime configuration shared across the orchestrator and workers.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub action_config: ActionConfig,
    pub command_buffer_size: usize,
    /// Frames buffered per link direction.
    pub transport_buffer_size: usize,
    /// Capacity of each event bus topic.
    pub event_buffer_size: usize,
    pub tick_interval: Duration,
    pub client_count: u32,
    pub max_settle_rounds: usize,
}

impl RuntimeConfig {
    /// Tick length in simulation seconds.
    pub fn tick_seconds(&self) -> f32 {
        self.tick_interval.as_secs_f32()
    }

    fn validate(&self) -> Result<()> {
        if self.client_count == 0 {
            return Err(RuntimeError::InvalidConfig("client_count must be at least 1".into()));
        }
        if self.tick_interval.is_zero() {
            return Err(RuntimeError::InvalidConfig("tick_interval must be positive".into()));
        }
        if self.max_settle_rounds == 0 {
            return Err(RuntimeError::InvalidConfig("max_settle_rounds must be at least 1".into()));
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            action_config: ActionConfig::default(),
            command_buffer_size: 32,
            transport_buffer_size: 256,
            event_buffer_size: 100,
            tick_interval: Duration::from_millis(50),
            client_count: 1,
            max_settle_rounds: 64,
        }
    }
}

/// A grant every player receives when the session starts.
#[derive(Debug, Clone)]
struct Loadout {
    template: ActionTemplateId,
    input: Tag,
    level: u32,
}

/// A running server/client session.
///
/// Design: Runtime owns workers and the tick counter.
/// [`RuntimeHandle`] provides a cloneable façade for clients.
pub struct Runtime {
    handle: RuntimeHandle,
    config: RuntimeConfig,
    provider: Option<Box<dyn InputProvider>>,
    tick: u64,
    server_worker: JoinHandle<()>,
    client_workers: Vec<JoinHandle<()>>,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn subscribe(&self, topic: Topic) -> tokio::sync::broadcast::Receiver<Event> {
        self.handle.subscribe(topic)
    }

    /// Ticks executed so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn set_input_provider(&mut self, provider: impl InputProvider + 'static) {
        self.provider = Some(Box::new(provider));
    }

    /// Applies this tick's input, then advances every world by one tick.
    pub async fn step(&mut self) -> Result<f32> {
        if let Some(provider) = &self.provider {
            let clients: Vec<ConnectionId> = self.handle.clients().collect();
            for client in clients {
                for intent in provider.provide_inputs(client, self.tick).await {
                    if let Err(err) = apply_intent(&self.handle, client, &intent).await {
                        tracing::info!(
                            target: "runtime::session",
                            %client,
                            tick = self.tick,
                            ?intent,
                            error = %err,
                            "input refused"
                        );
                    }
                }
            }
        }
        self.handle.settle().await?;
        let now = self.handle.step(self.config.tick_seconds()).await?;
        self.tick += 1;
        Ok(now)
    }

    /// Runs `ticks` ticks paced by the configured tick interval.
    pub async fn run(&mut self, ticks: u64) -> Result<()> {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        for _ in 0..ticks {
            interval.tick().await;
            self.step().await?;
        }
        Ok(())
    }

    /// Shuts the workers down once every outstanding handle is dropped.
    pub async fn shutdown(self) -> Result<()> {
        drop(self.handle);
        self.server_worker.await.map_err(RuntimeError::WorkerJoin)?;
        for worker in self.client_workers {
            worker.await.map_err(RuntimeError::WorkerJoin)?;
        }
        tracing::info!(target: "runtime::session", ticks = self.tick, "session shut down");
        Ok(())
    }
}

async fn apply_intent(handle: &RuntimeHandle, client: ConnectionId, intent: &InputIntent) -> Result<()> {
    match intent {
        InputIntent::Press(input) => handle.press(client, input.clone()).await,
        InputIntent::Release(input) => handle.release(client, input.clone()).await,
        InputIntent::Activate(template) => handle.activate(client, template.clone()).await.map(|_| ()),
        InputIntent::SetMoving(moving) => handle.set_moving(client, *moving).await,
    }
}

/// Builder for [`Runtime`] with flexible configuration.
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    content: Option<ContentLibrary>,
    loadout: Vec<Loadout>,
    provider: Option<Box<dyn InputProvider>>,
}

impl RuntimeBuilder {
    fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            content: None,
            loadout: Vec::new(),
            provider: None,
        }
    }

    /// Override runtime configuration
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn action_config(mut self, action_config: ActionConfig) -> Self {
        self.config.action_config = action_config;
        self
    }

    pub fn content(mut self, content: ContentLibrary) -> Self {
        self.content = Some(content);
        self
    }

    pub fn client_count(mut self, count: u32) -> Self {
        self.config.client_count = count;
        self
    }

    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.config.tick_interval = interval;
        self
    }

    pub fn command_buffer_size(mut self, size: usize) -> Self {
        self.config.command_buffer_size = size;
        self
    }

    pub fn transport_buffer_size(mut self, size: usize) -> Self {
        self.config.transport_buffer_size = size;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.config.event_buffer_size = size;
        self
    }

    /// Grants `template` on `input` to every player at startup.
    pub fn grant_to_all(mut self, template: impl Into<ActionTemplateId>, input: &str, level: u32) -> Self {
        self.loadout.push(Loadout {
            template: template.into(),
            input: Tag::new(input),
            level,
        });
        self
    }

    pub fn input_provider(mut self, provider: impl InputProvider + 'static) -> Self {
        self.provider = Some(Box::new(provider));
        self
    }

    /// Spawns the workers and waits for the initial replication.
    ///
    /// Client `n` (1-based) connects as `conn#n` and controls `EntityId(n)`.
    /// Every world holds every player: the server as authority, the owning
    /// client as autonomous proxy, other clients as simulated proxies.
    pub async fn build(self) -> Result<Runtime> {
        self.config.validate()?;
        let content = self.content.unwrap_or_default();
        if let Err(errors) = content.validate() {
            let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
            return Err(RuntimeError::InvalidContent(details.join("; ")));
        }

        let connections: Vec<ConnectionId> = (1..=self.config.client_count).map(ConnectionId).collect();
        let players: Vec<EntityId> = connections.iter().map(|c| EntityId(c.0)).collect();
        let owners: BTreeMap<EntityId, ConnectionId> =
            players.iter().copied().zip(connections.iter().copied()).collect();

        let mut server_world = World::new(content.clone(), self.config.action_config.clone());
        for &player in &players {
            server_world.spawn(player, NetRole::Authority)?;
            let system = server_world
                .system_mut(player)
                .ok_or(action_core::WorldError::UnknownEntity(player))?;
            for grant in &self.loadout {
                system.grant(&grant.template, grant.input.clone(), grant.level)?;
            }
        }

        let event_bus = EventBus::with_capacity(self.config.event_buffer_size);
        let (server_link, client_links) = transport::connect(&connections, self.config.transport_buffer_size);

        let (server_tx, server_rx) = mpsc::channel(self.config.command_buffer_size.max(1));
        let server = ServerWorker::new(server_world, owners, server_link, server_rx, event_bus.clone());
        let server_worker = tokio::spawn(server.run());

        let mut clients = BTreeMap::new();
        let mut client_workers = Vec::with_capacity(client_links.len());
        for (link, &own) in client_links.into_iter().zip(&players) {
            let mut world = World::new(content.clone(), self.config.action_config.clone());
            for &player in &players {
                let role = if player == own {
                    NetRole::AutonomousProxy
                } else {
                    NetRole::SimulatedProxy
                };
                world.spawn(player, role)?;
            }
            let connection = link.connection;
            let (tx, rx) = mpsc::channel(self.config.command_buffer_size.max(1));
            let worker = ClientWorker::new(world, own, link, rx, event_bus.clone());
            client_workers.push(tokio::spawn(worker.run()));
            clients.insert(
                connection,
                ClientSlot {
                    commands: tx,
                    player: own,
                },
            );
        }

        let handle = RuntimeHandle::new(server_tx, clients, event_bus, self.config.max_settle_rounds);
        handle.settle().await?;
        tracing::info!(
            target: "runtime::session",
            clients = self.config.client_count,
            tick_ms = self.config.tick_interval.as_millis() as u64,
            "session started"
        );

        Ok(Runtime {
            handle,
            config: self.config,
            provider: self.provider,
            tick: 0,
            server_worker,
            client_workers,
        })
    }
}
