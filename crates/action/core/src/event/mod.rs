//! Event plumbing shared by the gameplay bus and the per-action task bus.

mod bus;
mod payload;

pub use bus::{EventBus, SubscriberId, Subscription};
pub use payload::{EventPayload, PayloadValue, keys};
