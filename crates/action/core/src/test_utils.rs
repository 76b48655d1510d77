//! Shared fixtures for unit tests.

use crate::action::{ActionSpec, ActionTemplate};
use crate::config::ActionConfig;
use crate::content::ContentLibrary;
use crate::handle::{ActionSpecHandle, EntityHandle, EntityId};
use crate::system::{ActionSystem, NetRole};
use crate::tag::Tag;
use crate::world::World;

pub const PRIMARY: &str = "Input.Action.Primary";

pub fn bare_system(content: ContentLibrary, role: NetRole) -> ActionSystem {
    ActionSystem::new(
        EntityId(1),
        EntityHandle::new(0, 0),
        role,
        content,
        ActionConfig::default(),
    )
}

/// Authority system with `template` granted on the primary input at level 1.
pub fn authority_system(template: ActionTemplate) -> (ActionSystem, ActionSpecHandle) {
    let id = template.id.clone();
    let content = ContentLibrary::builder().action(template).build();
    let mut system = bare_system(content, NetRole::Authority);
    let spec = system
        .grant(&id, Tag::new(PRIMARY), 1)
        .expect("grant on authority");
    (system, spec)
}

/// Mirrors a server grant onto a proxy system.
pub fn granted_spec(system: &mut ActionSystem, template: &str) -> ActionSpecHandle {
    let template = system
        .content()
        .action(&template.into())
        .expect("template registered");
    let spec = ActionSpec::new(&template, Tag::new(PRIMARY), 1);
    let handle = spec.handle;
    system.on_replicated_spec_added(spec);
    handle
}

/// Server world with one authoritative entity holding `template`.
pub fn authority_world(template: ActionTemplate) -> (World, EntityId, ActionSpecHandle) {
    let id = template.id.clone();
    let content = ContentLibrary::builder().action(template).build();
    let mut world = World::new(content, ActionConfig::default());
    let entity = EntityId(1);
    world
        .spawn(entity, NetRole::Authority)
        .expect("fresh entity");
    let spec = world
        .system_mut(entity)
        .expect("spawned")
        .grant(&id, Tag::new(PRIMARY), 1)
        .expect("grant on authority");
    (world, entity, spec)
}
