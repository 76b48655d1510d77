//! Tag-keyed subscriber lists with RAII subscriptions.
//!
//! Handlers are plain routing values (usually small enums naming the
//! instance or task to notify); the bus never calls back into engine code.
//! Dispatch is two-phase: the caller snapshots the matching handlers with
//! [`EventBus::handlers`], releases the bus, then routes each handler. This
//! keeps handlers free to subscribe or unsubscribe while an event is being
//! delivered.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::tag::Tag;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

trait Detach: Send + Sync {
    fn detach(&self, tag: &Tag, id: SubscriberId);
}

struct BusInner<H> {
    next_id: u64,
    subscribers: BTreeMap<Tag, Vec<(SubscriberId, H)>>,
}

impl<H> BusInner<H> {
    fn remove(&mut self, tag: &Tag, id: SubscriberId) {
        if let Some(list) = self.subscribers.get_mut(tag) {
            list.retain(|(sid, _)| *sid != id);
            if list.is_empty() {
                self.subscribers.remove(tag);
            }
        }
    }
}

impl<H: Send> Detach for Mutex<BusInner<H>> {
    fn detach(&self, tag: &Tag, id: SubscriberId) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(tag, id);
    }
}

/// Subscriber registry keyed by tag.
///
/// A subscriber registered under `A.B` receives events tagged `A.B` and any
/// descendant such as `A.B.C`.
pub struct EventBus<H> {
    inner: Arc<Mutex<BusInner<H>>>,
}

impl<H: Clone + Send + 'static> EventBus<H> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                next_id: 0,
                subscribers: BTreeMap::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BusInner<H>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `handler` for `tag`. Dropping the returned guard unsubscribes.
    pub fn subscribe(&self, tag: Tag, handler: H) -> Subscription {
        let id = {
            let mut inner = self.lock();
            inner.next_id += 1;
            let id = SubscriberId(inner.next_id);
            inner
                .subscribers
                .entry(tag.clone())
                .or_default()
                .push((id, handler));
            id
        };
        let detach: Arc<dyn Detach> = self.inner.clone();
        Subscription {
            bus: Arc::downgrade(&detach),
            tag,
            id,
        }
    }

    /// Handlers interested in `event`, in subscription order.
    pub fn handlers(&self, event: &Tag) -> Vec<H> {
        let inner = self.lock();
        let mut matched: Vec<(SubscriberId, H)> = inner
            .subscribers
            .iter()
            .filter(|(tag, _)| event.matches(tag))
            .flat_map(|(_, list)| list.iter().cloned())
            .collect();
        matched.sort_by_key(|(id, _)| *id);
        matched.into_iter().map(|(_, handler)| handler).collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().subscribers.is_empty()
    }

    /// Drops every registration. Outstanding guards become no-ops.
    pub fn clear(&self) {
        self.lock().subscribers.clear();
    }
}

impl<H: Clone + Send + 'static> Default for EventBus<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> fmt::Debug for EventBus<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("EventBus")
            .field("tags", &inner.subscribers.len())
            .finish()
    }
}

/// Registration guard; unsubscribes on drop.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    bus: Weak<dyn Detach>,
    tag: Tag,
    id: SubscriberId,
}

impl Subscription {
    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    /// False once the bus itself is gone.
    pub fn is_attached(&self) -> bool {
        self.bus.strong_count() > 0
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.detach(&self.tag, self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("tag", &self.tag)
            .field("id", &self.id)
            .finish()
    }
}
