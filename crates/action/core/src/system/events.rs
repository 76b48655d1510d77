//! Gameplay and task event routing.

use crate::action::TaskBusHandler;
use crate::event::{EventPayload, Subscription};
use crate::handle::{ActiveActionHandle, EntityId, InstanceId, PredictionKey};
use crate::replication::{NetMessage, Recipient};
use crate::tag::{Tag, names};

use super::{ActionSystem, GameplayHandler, Notification, WorldRequest};

impl ActionSystem {
    // ========================================================================
    // Gameplay bus
    // ========================================================================

    /// Delivers a gameplay event to this entity: bus subscribers first, then
    /// (authority) every spec registered to trigger on the tag.
    pub fn handle_gameplay_event(&mut self, tag: &Tag, payload: &EventPayload) {
        self.broadcast_to_subscribers(tag, payload);
        if self.role().is_authority() {
            self.try_activate_by_event(tag, payload);
        }
    }

    /// Routes `tag` to every current subscriber of the gameplay bus.
    pub fn broadcast_to_subscribers(&mut self, tag: &Tag, payload: &EventPayload) {
        let handlers = self.gameplay_bus.handlers(tag);
        if handlers.is_empty() {
            return;
        }
        tracing::trace!(
            target: "action::registry",
            entity = %self.entity(),
            event = %tag,
            handlers = handlers.len(),
            "gameplay event"
        );
        for handler in handlers {
            match handler {
                GameplayHandler::PhaseTransition { instance, counter } => {
                    self.handle_transition_event(instance, counter, tag, payload);
                }
                GameplayHandler::MovementInterrupt { instance, counter } => {
                    self.on_movement_interrupt(instance, counter);
                }
                GameplayHandler::Task(task) => self.on_task_gameplay_event(task, payload),
                GameplayHandler::Observe => self.notify(Notification::GameplayEventObserved {
                    tag: tag.clone(),
                    payload: payload.clone(),
                }),
            }
        }
    }

    /// Surfaces matching gameplay events as notifications until the guard drops.
    pub fn subscribe_gameplay_event(&self, tag: Tag) -> Subscription {
        self.gameplay_bus.subscribe(tag, GameplayHandler::Observe)
    }

    /// Queues a gameplay event for another entity, or for every entity.
    pub fn send_gameplay_event_to(
        &mut self,
        target: Option<EntityId>,
        tag: Tag,
        payload: EventPayload,
    ) {
        self.outbox.push(WorldRequest::GameplayEvent {
            target,
            tag,
            payload,
        });
    }

    /// Movement reported by the host; raises the movement started/stopped events.
    pub fn set_moving(&mut self, moving: bool) {
        if self.moving == moving {
            return;
        }
        self.moving = moving;
        let event = if moving {
            names::EVENT_MOVEMENT_STARTED
        } else {
            names::EVENT_MOVEMENT_STOPPED
        };
        let payload = EventPayload::new().with_instigator(self.entity(), self.tags.explicit_tags());
        self.broadcast_to_subscribers(&names::tag(event), &payload);
    }

    // ========================================================================
    // Task bus
    // ========================================================================

    /// Posts an event on an instance's task bus.
    ///
    /// Tags listed in the template's `replicated_event_tags` are forwarded to
    /// the server instead when this entity is locally controlled.
    pub fn post_task_event(&mut self, id: InstanceId, tag: &Tag, payload: &EventPayload) {
        let Some(instance) = self.instances.get(&id) else {
            return;
        };
        if !instance.is_executing() {
            tracing::trace!(target: "action::phase", event = %tag, "owner not executing; task event dropped");
            return;
        }
        let forward = self.role().is_locally_controlled()
            && instance
                .template
                .replicated_event_tags
                .iter()
                .any(|replicated| tag.matches(replicated));
        if forward {
            let message = NetMessage::TaskEvent {
                entity: self.entity(),
                active: instance.active,
                key: instance.key,
                tag: tag.clone(),
                payload: payload.clone(),
            };
            tracing::debug!(target: "action::prediction", event = %tag, "forwarding task event to server");
            self.send(Recipient::Server, message);
            return;
        }
        self.dispatch_task_event(id, tag, payload);
    }

    fn dispatch_task_event(&mut self, id: InstanceId, tag: &Tag, payload: &EventPayload) {
        let Some(instance) = self.instances.get(&id) else {
            return;
        };
        let active = instance.active;
        for handler in instance.task_bus.handlers(tag) {
            match handler {
                TaskBusHandler::PhaseTransition { counter } => {
                    self.handle_transition_event(id, counter, tag, payload);
                }
                TaskBusHandler::ResultStore {
                    source_key,
                    destination_key,
                } => {
                    let value = payload.get(&source_key).cloned();
                    if let (Some(value), Some(instance)) = (value, self.instances.get_mut(&id)) {
                        instance.payload.insert(destination_key, value);
                    }
                }
                TaskBusHandler::Observe => self.notify(Notification::TaskEventObserved {
                    active,
                    tag: tag.clone(),
                    payload: payload.clone(),
                }),
            }
        }
    }

    /// Surfaces an instance's matching task events as notifications until the
    /// guard drops. `None` if the instance does not exist.
    pub fn subscribe_task_event(&self, id: InstanceId, tag: Tag) -> Option<Subscription> {
        let instance = self.instances.get(&id)?;
        Some(instance.task_bus.subscribe(tag, TaskBusHandler::Observe))
    }

    /// A task event forwarded by the owning client.
    pub(crate) fn on_remote_task_event(
        &mut self,
        active: ActiveActionHandle,
        key: PredictionKey,
        tag: &Tag,
        payload: &EventPayload,
    ) {
        let by_handle = self.active.get(&active).and_then(|entry| entry.instance);
        let by_key = || {
            key.is_valid()
                .then(|| {
                    self.active
                        .values()
                        .find(|entry| entry.action.key == key)
                        .and_then(|entry| entry.instance)
                })
                .flatten()
        };
        match by_handle.or_else(by_key) {
            Some(id) => self.dispatch_task_event(id, tag, payload),
            None => tracing::warn!(
                target: "action::prediction",
                active = %active,
                key = %key,
                event = %tag,
                "task event for unknown execution"
            ),
        }
    }
}
