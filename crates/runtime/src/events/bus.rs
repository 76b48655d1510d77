//! Topic-based event bus implementation.

use std::collections::HashMap;
use std::sync::Arc;

use action_core::{EntityId, Notification};
use tokio::sync::broadcast;

use super::types::{NetworkEvent, NotificationEvent, Peer};

/// Topics for event routing
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum Topic {
    /// Activation, phases, prediction, tasks and cues
    Action,
    /// Effects, attributes and tags
    Effect,
    Cooldown,
    /// Frames crossing the transport
    Network,
}

impl Topic {
    pub const ALL: [Topic; 4] = [Topic::Action, Topic::Effect, Topic::Cooldown, Topic::Network];

    fn index(self) -> usize {
        match self {
            Topic::Action => 0,
            Topic::Effect => 1,
            Topic::Cooldown => 2,
            Topic::Network => 3,
        }
    }

    /// Topic an engine notification is published on.
    pub fn of(notification: &Notification) -> Self {
        match notification {
            Notification::EffectApplied { .. }
            | Notification::EffectUpdated { .. }
            | Notification::EffectRemoved { .. }
            | Notification::AttributeChanged { .. }
            | Notification::TagChanged(_) => Topic::Effect,
            Notification::CooldownAdded(_)
            | Notification::CooldownChanged(_)
            | Notification::CooldownRemoved(_) => Topic::Cooldown,
            _ => Topic::Action,
        }
    }
}

/// Event wrapper that carries the topic and typed event
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Action(NotificationEvent),
    Effect(NotificationEvent),
    Cooldown(NotificationEvent),
    Network(NetworkEvent),
}

impl Event {
    pub fn notification(peer: Peer, entity: EntityId, notification: Notification) -> Self {
        let topic = Topic::of(&notification);
        let event = NotificationEvent {
            peer,
            entity,
            notification,
        };
        match topic {
            Topic::Effect => Event::Effect(event),
            Topic::Cooldown => Event::Cooldown(event),
            Topic::Action | Topic::Network => Event::Action(event),
        }
    }

    pub fn topic(&self) -> Topic {
        match self {
            Event::Action(_) => Topic::Action,
            Event::Effect(_) => Topic::Effect,
            Event::Cooldown(_) => Topic::Cooldown,
            Event::Network(_) => Topic::Network,
        }
    }
}

/// Topic-based event bus
///
/// Allows consumers to subscribe to specific topics and only receive
/// events they care about. Publishing never blocks; events published with no
/// subscriber are dropped.
#[derive(Clone)]
pub struct EventBus {
    channels: Arc<[broadcast::Sender<Event>; 4]>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    /// Creates a new event bus with specified capacity per topic
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            channels: Arc::new(std::array::from_fn(|_| broadcast::channel(capacity).0)),
        }
    }

    /// Publish an event to its corresponding topic
    pub fn publish(&self, event: Event) {
        let topic = event.topic();
        if self.channels[topic.index()].send(event).is_err() {
            tracing::trace!(target: "runtime::session", ?topic, "no subscribers for topic");
        }
    }

    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.channels[topic.index()].subscribe()
    }

    /// Subscribe to multiple topics
    pub fn subscribe_multiple(&self, topics: &[Topic]) -> HashMap<Topic, broadcast::Receiver<Event>> {
        topics
            .iter()
            .map(|&topic| (topic, self.subscribe(topic)))
            .collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_core::{CooldownEntry, Tag};

    #[tokio::test]
    async fn notifications_land_on_their_topic() {
        let bus = EventBus::with_capacity(8);
        let mut cooldowns = bus.subscribe(Topic::Cooldown);
        let mut actions = bus.subscribe(Topic::Action);

        let entry = CooldownEntry {
            tag: Tag::new("Action.Cooldown.Primary"),
            start_time: 0.0,
            end_time: 4.0,
            duration: 4.0,
        };
        bus.publish(Event::notification(
            Peer::Server,
            EntityId(1),
            Notification::CooldownAdded(entry.clone()),
        ));

        match cooldowns.recv().await.unwrap() {
            Event::Cooldown(event) => {
                assert_eq!(event.peer, Peer::Server);
                assert_eq!(event.notification, Notification::CooldownAdded(entry));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(actions.try_recv().is_err());
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.publish(Event::notification(
            Peer::Client(action_core::ConnectionId(1)),
            EntityId(1),
            Notification::CooldownRemoved(Tag::new("Action.Cooldown.Primary")),
        ));
    }
}
