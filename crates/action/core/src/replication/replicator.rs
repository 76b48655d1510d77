use std::collections::{BTreeMap, BTreeSet};

use crate::handle::EntityId;
use crate::system::ActionSystem;

use super::{EntityDelta, EntitySnapshot};

/// Identifier of one client connection on the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ConnectionId(pub u32);

impl core::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Server-side delta producer.
///
/// Keeps the last snapshot each connection was sent for each authoritative
/// entity. A new connection starts from an empty baseline and therefore
/// receives full state on its first replication pass.
#[derive(Debug, Default)]
pub struct Replicator {
    baselines: BTreeMap<ConnectionId, BTreeMap<EntityId, EntitySnapshot>>,
}

impl Replicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_connection(&mut self, connection: ConnectionId) {
        self.baselines.entry(connection).or_default();
    }

    pub fn remove_connection(&mut self, connection: ConnectionId) -> bool {
        self.baselines.remove(&connection).is_some()
    }

    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.baselines.keys().copied()
    }

    /// Produces every non-empty delta for every connection, in connection
    /// then entity order. Only authoritative systems replicate.
    pub fn replicate<'a>(
        &mut self,
        systems: impl IntoIterator<Item = &'a ActionSystem>,
    ) -> Vec<(ConnectionId, EntityDelta)> {
        let snapshots: BTreeMap<EntityId, EntitySnapshot> = systems
            .into_iter()
            .filter(|system| system.role().is_authority())
            .map(|system| (system.entity(), EntitySnapshot::capture(system)))
            .collect();
        let live: BTreeSet<EntityId> = snapshots.keys().copied().collect();

        let mut out = Vec::new();
        for (connection, baselines) in &mut self.baselines {
            baselines.retain(|entity, _| live.contains(entity));
            for (entity, snapshot) in &snapshots {
                let baseline = baselines.entry(*entity).or_default();
                let delta = EntityDelta::between(*entity, baseline, snapshot);
                if delta.is_empty() {
                    continue;
                }
                tracing::trace!(
                    target: "action::replication",
                    connection = %connection,
                    entity = %entity,
                    fields = ?delta.fields(),
                    "entity delta"
                );
                *baseline = snapshot.clone();
                out.push((*connection, delta));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentLibrary;
    use crate::replication::DeltaFields;
    use crate::system::NetRole;
    use crate::tag::Tag;
    use crate::test_utils::bare_system;

    #[test]
    fn first_pass_sends_full_state_then_only_changes() {
        let mut system = bare_system(ContentLibrary::default(), NetRole::Authority);
        let mut replicator = Replicator::new();
        replicator.add_connection(ConnectionId(1));

        let first = replicator.replicate([&system]);
        assert_eq!(first.len(), 1);
        assert!(first[0].1.fields().contains(DeltaFields::ATTRIBUTES));

        assert!(replicator.replicate([&system]).is_empty());

        system.add_tag(&Tag::new("State.Stunned"), 1);
        let second = replicator.replicate([&system]);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].1.fields(), DeltaFields::TAGS);
    }

    #[test]
    fn late_connections_receive_full_state() {
        let system = bare_system(ContentLibrary::default(), NetRole::Authority);
        let mut replicator = Replicator::new();
        replicator.add_connection(ConnectionId(1));
        replicator.replicate([&system]);

        replicator.add_connection(ConnectionId(2));
        let deltas = replicator.replicate([&system]);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].0, ConnectionId(2));
    }

    #[test]
    fn proxies_are_not_replicated() {
        let system = bare_system(ContentLibrary::default(), NetRole::SimulatedProxy);
        let mut replicator = Replicator::new();
        replicator.add_connection(ConnectionId(1));
        assert!(replicator.replicate([&system]).is_empty());
    }
}
