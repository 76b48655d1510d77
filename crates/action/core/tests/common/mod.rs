#![allow(dead_code)]

use action_core::effect::Execution;
use action_core::tag::names;
use action_core::{
    ActionConfig, ActionSpecHandle, ActionTemplate, ActionTemplateId, ConnectionId,
    ContentLibrary, EffectTemplate, EntityId, NetMessage, NetRole, Outgoing, Recipient,
    Replicator, ScalableFloat, Tag, World,
};
use action_core::action::LevelData;

pub const PLAYER: EntityId = EntityId(1);
/// Another player's entity; a simulated proxy on the client.
pub const OBSERVER: EntityId = EntityId(2);
pub const PRIMARY: &str = "Input.Action.Primary";

/// Cooldown effect driven by the action's level row.
pub fn cooldown_effect(id: &str) -> EffectTemplate {
    EffectTemplate::timed(id, ScalableFloat::SetByCaller(names::tag(names::SET_BY_CALLER_DURATION)))
        .effect_tag(names::EFFECT_TYPE_COOLDOWN)
        .execution(Execution::LevelDataCooldown)
}

pub fn with_cooldown(mut template: ActionTemplate, effect: &str, seconds: f32) -> ActionTemplate {
    template.cooldown_effect = Some(effect.into());
    template.level_data = vec![LevelData {
        cooldown: seconds,
        cost: 0.0,
    }];
    template
}

/// One server world and one client world owning [`PLAYER`], joined by a
/// lossless, zero-latency link.
pub struct Session {
    pub server: World,
    pub client: World,
    pub replicator: Replicator,
}

impl Session {
    pub fn new(content: ContentLibrary) -> Self {
        let mut server = World::new(content.clone(), ActionConfig::default());
        let mut client = World::new(content, ActionConfig::default());
        server.spawn(PLAYER, NetRole::Authority).unwrap();
        client.spawn(PLAYER, NetRole::AutonomousProxy).unwrap();
        let mut replicator = Replicator::new();
        replicator.add_connection(ConnectionId(1));
        Self {
            server,
            client,
            replicator,
        }
    }

    /// Adds [`OBSERVER`], owned by some other connection.
    pub fn with_observer(content: ContentLibrary) -> Self {
        let mut session = Self::new(content);
        session.server.spawn(OBSERVER, NetRole::Authority).unwrap();
        session.client.spawn(OBSERVER, NetRole::SimulatedProxy).unwrap();
        session
    }

    /// Grants on the server and replicates the grant.
    pub fn grant(&mut self, template: &str) -> ActionSpecHandle {
        self.grant_to(PLAYER, template)
    }

    pub fn grant_to(&mut self, entity: EntityId, template: &str) -> ActionSpecHandle {
        let spec = self
            .server
            .system_mut(entity)
            .unwrap()
            .grant(&ActionTemplateId::new(template), Tag::new(PRIMARY), 1)
            .unwrap();
        self.sync();
        spec
    }

    /// Messages the client has queued for the server.
    pub fn client_to_server(&mut self) -> Vec<NetMessage> {
        self.client.flush();
        self.client
            .take_outgoing()
            .into_iter()
            .filter(|out| out.recipient == Recipient::Server)
            .map(|out| out.message)
            .collect()
    }

    /// RPCs first, then replication deltas, as the server sends them.
    pub fn server_to_client(&mut self) -> Vec<NetMessage> {
        self.server.flush();
        let mut out: Vec<NetMessage> = self
            .server
            .take_outgoing()
            .into_iter()
            .filter(|Outgoing { recipient, .. }| *recipient != Recipient::Server)
            .map(|out| out.message)
            .collect();
        out.extend(
            self.replicator
                .replicate(self.server.systems())
                .into_iter()
                .map(|(_, delta)| NetMessage::Replicate(delta)),
        );
        out
    }

    /// Delivers traffic both ways until the link is quiet.
    pub fn sync(&mut self) {
        for _ in 0..16 {
            let up = self.client_to_server();
            for message in &up {
                self.server.receive(message.clone()).unwrap();
            }
            let down = self.server_to_client();
            for message in &down {
                self.client.receive(message.clone()).unwrap();
            }
            if up.is_empty() && down.is_empty() {
                return;
            }
        }
        panic!("link did not settle");
    }

    pub fn step(&mut self, dt: f32) {
        self.server.advance(dt);
        self.client.advance(dt);
        self.sync();
    }
}
