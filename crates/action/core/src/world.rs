//! One peer's simulation: the entity arena, the shared clock, and the pump
//! that carries requests between entities and out to the network.
//!
//! A server world holds every entity as [`NetRole::Authority`]. A client
//! world holds its own avatar as `AutonomousProxy` and everyone else as
//! `SimulatedProxy`. Worlds never talk to each other directly; the host moves
//! [`Outgoing`] messages from [`World::take_outgoing`] into
//! [`World::receive`] on the other side.
//!
//! # Step order
//!
//! [`World::advance`] runs, for a step of `dt` seconds:
//!
//! 1. Input processing on every entity, in entity order
//! 2. Every timer due within the step, in `(fire time, entity)` order, each
//!    with the clock stamped at its own fire time
//! 3. The request pump after every timer, so cross-entity effects and events
//!    land before the next timer fires

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::config::ActionConfig;
use crate::content::ContentLibrary;
use crate::effect::{EffectError, EffectSpec};
use crate::error::{CoreError, ErrorSeverity};
use crate::event::EventPayload;
use crate::handle::{ActiveEffectHandle, EntityHandle, EntityId};
use crate::replication::{NetMessage, Outgoing, ProtocolError};
use crate::system::{ActionSystem, NetRole, Notification, WorldRequest};
use crate::tag::Tag;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorldError {
    #[error("entity {0} already exists")]
    DuplicateEntity(EntityId),

    #[error("entity {0} does not exist")]
    UnknownEntity(EntityId),
}

impl CoreError for WorldError {
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Validation
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::DuplicateEntity(_) => "WORLD_DUPLICATE_ENTITY",
            Self::UnknownEntity(_) => "WORLD_UNKNOWN_ENTITY",
        }
    }
}

/// Entities that receive broadcast gameplay events.
#[derive(Clone, Debug, Default)]
pub struct EntityRegistry {
    ids: BTreeSet<EntityId>,
}

impl EntityRegistry {
    pub fn register(&mut self, entity: EntityId) -> bool {
        self.ids.insert(entity)
    }

    pub fn unregister(&mut self, entity: EntityId) -> bool {
        self.ids.remove(&entity)
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.ids.contains(&entity)
    }

    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.ids.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    system: Option<ActionSystem>,
}

pub struct World {
    content: ContentLibrary,
    config: ActionConfig,
    now: f32,
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_id: BTreeMap<EntityId, EntityHandle>,
    registry: EntityRegistry,
    outgoing: Vec<Outgoing>,
}

impl World {
    pub fn new(content: ContentLibrary, config: ActionConfig) -> Self {
        Self {
            content,
            config,
            now: 0.0,
            slots: Vec::new(),
            free: Vec::new(),
            by_id: BTreeMap::new(),
            registry: EntityRegistry::default(),
            outgoing: Vec::new(),
        }
    }

    pub fn now(&self) -> f32 {
        self.now
    }

    pub fn content(&self) -> &ContentLibrary {
        &self.content
    }

    pub fn config(&self) -> &ActionConfig {
        &self.config
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut EntityRegistry {
        &mut self.registry
    }

    // ========================================================================
    // Arena
    // ========================================================================

    /// Creates an entity with its own action system and registers it for
    /// broadcasts.
    pub fn spawn(&mut self, entity: EntityId, role: NetRole) -> Result<EntityHandle, WorldError> {
        if self.by_id.contains_key(&entity) {
            return Err(WorldError::DuplicateEntity(entity));
        }
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        let handle = EntityHandle::new(index, slot.generation);
        let mut system = ActionSystem::new(
            entity,
            handle,
            role,
            self.content.clone(),
            self.config.clone(),
        );
        system.set_now(self.now);
        slot.system = Some(system);

        self.by_id.insert(entity, handle);
        self.registry.register(entity);
        tracing::info!(target: "action::registry", entity = %entity, handle = %handle, role = %role, "entity spawned");
        Ok(handle)
    }

    /// Removes an entity. Its handle goes stale immediately.
    pub fn despawn(&mut self, entity: EntityId) -> bool {
        let Some(handle) = self.by_id.remove(&entity) else {
            return false;
        };
        self.registry.unregister(entity);
        if let Some(slot) = self.slots.get_mut(handle.index as usize) {
            slot.system = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(handle.index);
        }
        tracing::info!(target: "action::registry", entity = %entity, "entity despawned");
        true
    }

    /// Resolves an arena handle; `None` once the slot was recycled.
    pub fn resolve(&self, handle: EntityHandle) -> Option<&ActionSystem> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.system.as_ref()
    }

    pub fn system(&self, entity: EntityId) -> Option<&ActionSystem> {
        let handle = self.by_id.get(&entity)?;
        self.resolve(*handle)
    }

    pub fn system_mut(&mut self, entity: EntityId) -> Option<&mut ActionSystem> {
        let handle = *self.by_id.get(&entity)?;
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.system.as_mut()
    }

    /// Every live system, in entity order.
    pub fn systems(&self) -> impl Iterator<Item = &ActionSystem> {
        self.by_id.values().filter_map(|handle| self.resolve(*handle))
    }

    pub fn entities(&self) -> Vec<EntityId> {
        self.by_id.keys().copied().collect()
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.by_id.contains_key(&entity)
    }

    // ========================================================================
    // Stepping
    // ========================================================================

    /// Advances the clock by `dt` seconds.
    pub fn advance(&mut self, dt: f32) {
        let target = self.now + dt.max(0.0);
        let entities = self.entities();

        for entity in &entities {
            if let Some(system) = self.system_mut(*entity) {
                system.begin_step();
                system.process_input();
            }
        }
        self.flush();

        while let Some((at, entity)) = self.next_due_timer(target) {
            self.stamp_clock(at);
            if let Some(system) = self.system_mut(entity) {
                system.fire_next_timer(target);
            }
            self.flush();
        }

        self.stamp_clock(target);
        self.flush();
    }

    /// Earliest timer due by `until`; ties go to the lowest entity id.
    fn next_due_timer(&self, until: f32) -> Option<(f32, EntityId)> {
        self.systems()
            .filter_map(|system| system.next_timer_at().map(|at| (at, system.entity())))
            .filter(|(at, _)| *at <= until)
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
    }

    pub fn next_timer_at(&self) -> Option<f32> {
        self.systems()
            .filter_map(ActionSystem::next_timer_at)
            .min_by(f32::total_cmp)
    }

    fn stamp_clock(&mut self, at: f32) {
        let at = at.max(self.now);
        self.now = at;
        for slot in &mut self.slots {
            if let Some(system) = slot.system.as_mut() {
                system.set_now(at);
            }
        }
    }

    /// Drains every entity's outbox until no request is left, or until the
    /// pending-event guard trips.
    pub fn flush(&mut self) {
        let limit = self.config.max_pending_events;
        let mut processed = 0usize;
        loop {
            let mut batch = Vec::new();
            for entity in self.entities() {
                if let Some(system) = self.system_mut(entity) {
                    batch.extend(system.take_requests());
                }
            }
            if batch.is_empty() {
                return;
            }
            for request in batch {
                if let WorldRequest::Send(outgoing) = request {
                    self.outgoing.push(outgoing);
                    continue;
                }
                processed += 1;
                if processed > limit {
                    tracing::error!(
                        target: "action::registry",
                        limit,
                        "pending event limit reached; dropping request"
                    );
                    continue;
                }
                self.dispatch(request);
            }
            if processed > limit {
                return;
            }
        }
    }

    fn dispatch(&mut self, request: WorldRequest) {
        match request {
            WorldRequest::ApplyEffect { target, spec } => {
                if let Err(err) = self.apply_effect_now(target, spec) {
                    tracing::debug!(target: "action::effect", target_entity = %target, error = %err, "effect not applied");
                }
            }
            WorldRequest::GameplayEvent {
                target,
                tag,
                payload,
            } => self.deliver_gameplay_event(target, &tag, &payload),
            WorldRequest::Send(outgoing) => self.outgoing.push(outgoing),
        }
    }

    fn apply_effect_now(
        &mut self,
        target: EntityId,
        spec: EffectSpec,
    ) -> Result<Option<ActiveEffectHandle>, EffectError> {
        self.system_mut(target)
            .ok_or(EffectError::UnknownTarget(target))?
            .apply_effect_spec(spec)
    }

    fn deliver_gameplay_event(&mut self, target: Option<EntityId>, tag: &Tag, payload: &EventPayload) {
        let targets: Vec<EntityId> = match target {
            Some(entity) => vec![entity],
            None => self.registry.iter().collect(),
        };
        for entity in targets {
            match self.system_mut(entity) {
                Some(system) => system.handle_gameplay_event(tag, payload),
                None => tracing::debug!(target: "action::registry", entity = %entity, event = %tag, "event for missing entity"),
            }
        }
    }

    // ========================================================================
    // Host operations
    // ========================================================================

    /// Applies an effect synchronously, then drains the resulting requests.
    pub fn apply_effect(
        &mut self,
        target: EntityId,
        spec: EffectSpec,
    ) -> Result<Option<ActiveEffectHandle>, EffectError> {
        let result = self.apply_effect_now(target, spec);
        self.flush();
        result
    }

    /// Sends a gameplay event to one entity, or to every registered entity.
    pub fn send_gameplay_event(&mut self, target: Option<EntityId>, tag: &Tag, payload: &EventPayload) {
        self.deliver_gameplay_event(target, tag, payload);
        self.flush();
    }

    pub fn set_moving(&mut self, entity: EntityId, moving: bool) -> Result<(), WorldError> {
        self.system_mut(entity)
            .ok_or(WorldError::UnknownEntity(entity))?
            .set_moving(moving);
        self.flush();
        Ok(())
    }

    pub fn input_pressed(&mut self, entity: EntityId, input: &Tag) -> Result<(), WorldError> {
        self.system_mut(entity)
            .ok_or(WorldError::UnknownEntity(entity))?
            .input_pressed(input);
        Ok(())
    }

    pub fn input_released(&mut self, entity: EntityId, input: &Tag) -> Result<(), WorldError> {
        self.system_mut(entity)
            .ok_or(WorldError::UnknownEntity(entity))?
            .input_released(input);
        Ok(())
    }

    // ========================================================================
    // Network
    // ========================================================================

    /// Handles one message from the other side.
    ///
    /// Client-to-server messages are accepted only by authoritative entities
    /// and the rest only by proxies.
    pub fn receive(&mut self, message: NetMessage) -> Result<(), ProtocolError> {
        let entity = message.entity();
        let kind = message.kind();
        let system = self
            .system_mut(entity)
            .ok_or(ProtocolError::UnknownEntity { kind, entity })?;
        let role = system.role();
        if message.is_client_to_server() != role.is_authority() {
            return Err(ProtocolError::WrongRole { kind, role });
        }
        tracing::debug!(target: "action::prediction", entity = %entity, message = kind, "received");

        match message {
            NetMessage::Execute { spec, key, .. } => system.on_execute_request(spec, key),
            NetMessage::InputEvent { spec, pressed, .. } => system.on_remote_input(spec, pressed),
            NetMessage::TaskEvent {
                active,
                key,
                tag,
                payload,
                ..
            } => system.on_remote_task_event(active, key, &tag, &payload),
            NetMessage::Confirm { key, success, .. } => system.on_confirm(key, success),
            NetMessage::NotifyEnded {
                active,
                key,
                cancelled,
                ..
            } => system.on_notify_ended(active, key, cancelled),
            NetMessage::NotifyFailed { spec, reasons, .. } => system.on_notify_failed(spec, reasons),
            NetMessage::Replicate(delta) => system.apply_delta(&delta),
        }
        self.flush();
        Ok(())
    }

    /// RPCs queued since the last call, in send order.
    pub fn take_outgoing(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outgoing)
    }

    /// Notifications of every entity, in entity order.
    pub fn drain_notifications(&mut self) -> Vec<(EntityId, Notification)> {
        let mut out = Vec::new();
        for entity in self.entities() {
            if let Some(system) = self.system_mut(entity) {
                out.extend(
                    system
                        .drain_notifications()
                        .into_iter()
                        .map(|notification| (entity, notification)),
                );
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Attribute;
    use crate::effect::{EffectTemplate, ModifierOp, ScalableFloat};
    use crate::handle::{ActionSpecHandle, PredictionKey};
    use crate::replication::Recipient;

    fn world_with(effects: Vec<EffectTemplate>) -> World {
        let mut builder = ContentLibrary::builder();
        for effect in effects {
            builder = builder.effect(effect);
        }
        World::new(builder.build(), ActionConfig::default())
    }

    #[test]
    fn stale_handles_do_not_resolve_after_despawn() {
        let mut world = world_with(Vec::new());
        let handle = world.spawn(EntityId(1), NetRole::Authority).unwrap();
        assert_eq!(
            world.spawn(EntityId(1), NetRole::Authority),
            Err(WorldError::DuplicateEntity(EntityId(1)))
        );

        assert!(world.despawn(EntityId(1)));
        let reused = world.spawn(EntityId(2), NetRole::Authority).unwrap();
        assert_eq!(reused.index, handle.index);
        assert!(world.resolve(handle).is_none());
        assert!(world.resolve(reused).is_some());
        assert!(!world.registry().contains(EntityId(1)));
    }

    #[test]
    fn timers_fire_in_time_then_entity_order() {
        let dot = EffectTemplate::timed("Burn", ScalableFloat::Static(1.0))
            .modifier(Attribute::Health, ModifierOp::Add, ScalableFloat::Static(-10.0))
            .period(0.5);
        let mut world = world_with(vec![dot]);
        world.spawn(EntityId(2), NetRole::Authority).unwrap();
        world.spawn(EntityId(1), NetRole::Authority).unwrap();

        for entity in [EntityId(2), EntityId(1)] {
            let spec = world
                .system(entity)
                .unwrap()
                .make_outgoing_spec(&"Burn".into(), 1)
                .unwrap();
            world.apply_effect(entity, spec).unwrap();
        }
        world.drain_notifications();

        world.advance(0.5);
        let ticks: Vec<EntityId> = world
            .drain_notifications()
            .into_iter()
            .filter(|(_, n)| matches!(n, Notification::AttributeChanged { .. }))
            .map(|(entity, _)| entity)
            .collect();
        assert_eq!(ticks, vec![EntityId(1), EntityId(2)]);
        assert_eq!(world.now(), 0.5);
    }

    #[test]
    fn receive_enforces_message_direction() {
        let mut world = world_with(Vec::new());
        world.spawn(EntityId(1), NetRole::SimulatedProxy).unwrap();

        let execute = NetMessage::Execute {
            entity: EntityId(1),
            spec: ActionSpecHandle(4),
            key: PredictionKey(1),
        };
        assert!(matches!(
            world.receive(execute),
            Err(ProtocolError::WrongRole { .. })
        ));
        assert!(matches!(
            world.receive(NetMessage::Confirm {
                entity: EntityId(9),
                key: PredictionKey(1),
                success: true,
            }),
            Err(ProtocolError::UnknownEntity { .. })
        ));
    }

    #[test]
    fn unknown_spec_execute_is_rejected_to_owner() {
        let mut world = world_with(Vec::new());
        world.spawn(EntityId(1), NetRole::Authority).unwrap();
        world
            .receive(NetMessage::Execute {
                entity: EntityId(1),
                spec: ActionSpecHandle(4),
                key: PredictionKey(7),
            })
            .unwrap();

        let out = world.take_outgoing();
        assert!(out.iter().any(|o| o.recipient == Recipient::Owner(EntityId(1))
            && o.message
                == NetMessage::Confirm {
                    entity: EntityId(1),
                    key: PredictionKey(7),
                    success: false,
                }));
    }

    #[test]
    fn broadcast_reaches_registered_entities_only() {
        let mut world = world_with(Vec::new());
        world.spawn(EntityId(1), NetRole::Authority).unwrap();
        world.spawn(EntityId(2), NetRole::Authority).unwrap();
        world.registry_mut().unregister(EntityId(2));

        let tag = Tag::new("Event.Gameplay.Ping");
        let _one = world.system(EntityId(1)).unwrap().subscribe_gameplay_event(tag.clone());
        let _two = world.system(EntityId(2)).unwrap().subscribe_gameplay_event(tag.clone());
        world.send_gameplay_event(None, &tag, &EventPayload::new());

        let observed: Vec<EntityId> = world
            .drain_notifications()
            .into_iter()
            .filter(|(_, n)| matches!(n, Notification::GameplayEventObserved { .. }))
            .map(|(entity, _)| entity)
            .collect();
        assert_eq!(observed, vec![EntityId(1)]);
    }
}
