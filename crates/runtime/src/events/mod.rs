//! Topic-based event bus for runtime events.
//!
//! Engine notifications from every world and transport traffic are published
//! to topics; consumers subscribe only to the topics they need.

mod bus;
mod types;

pub use bus::{Event, EventBus, Topic};
pub use types::{Direction, NetworkEvent, NotificationEvent, Peer};
