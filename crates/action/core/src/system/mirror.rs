//! Client-side application of replicated entity state.

use crate::replication::EntityDelta;

use super::{ActionSystem, Notification};

impl ActionSystem {
    /// Applies one server delta. Ignored on the authority.
    ///
    /// Specs arrive before the active actions that reference them and are
    /// removed after, so a single delta can both grant and run a spec.
    pub fn apply_delta(&mut self, delta: &EntityDelta) {
        if self.role().is_authority() {
            tracing::warn!(
                target: "action::replication",
                entity = %self.entity(),
                "authority ignores replicated state"
            );
            return;
        }

        for spec in delta.specs.added.iter().chain(&delta.specs.updated) {
            self.on_replicated_spec_added(spec.clone());
        }

        for value in delta.attributes.added.iter().chain(&delta.attributes.updated) {
            let old = self.attributes.current_or_zero(value.attribute);
            self.attributes.write_replicated(value.attribute, value.data);
            if old != value.data.current {
                self.notify(Notification::AttributeChanged {
                    attribute: value.attribute,
                    old,
                    new: value.data.current,
                });
            }
        }

        self.mirror_tags(delta);
        self.mirror_effects(delta);
        self.mirror_cooldowns(delta);

        for handle in &delta.active.removed {
            self.on_replicated_active_removed(*handle);
        }
        for action in &delta.active.added {
            self.on_replicated_active_added(action.clone());
        }
        for action in &delta.active.updated {
            self.on_replicated_active_changed(action.clone());
        }

        for handle in &delta.specs.removed {
            self.on_replicated_spec_removed(*handle);
        }
    }

    fn mirror_tags(&mut self, delta: &EntityDelta) {
        for entry in delta.tags.added.iter().chain(&delta.tags.updated) {
            let change = self.tags.set_replicated(&entry.tag, entry.count);
            self.notify_tag_change(change);
        }
        for tag in &delta.tags.removed {
            let change = self.tags.set_replicated(tag, 0);
            self.notify_tag_change(change);
        }
    }

    fn mirror_effects(&mut self, delta: &EntityDelta) {
        for state in &delta.effects.added {
            self.notify(Notification::EffectApplied {
                handle: state.handle,
                template: state.template.clone(),
                stacks: state.stacks,
            });
            self.replicated_effects.insert(state.handle, state.clone());
        }
        for state in &delta.effects.updated {
            self.notify(Notification::EffectUpdated {
                handle: state.handle,
                stacks: state.stacks,
                end_time: state.end_time,
            });
            self.replicated_effects.insert(state.handle, state.clone());
        }
        for handle in &delta.effects.removed {
            if let Some(state) = self.replicated_effects.remove(handle) {
                self.notify(Notification::EffectRemoved {
                    handle: *handle,
                    template: state.template,
                });
            }
        }
    }

    fn mirror_cooldowns(&mut self, delta: &EntityDelta) {
        let now = self.now();
        for entry in &delta.cooldowns.added {
            let change = self.cooldowns.apply_replicated_add(entry, now);
            self.notify(change.into());
        }
        for entry in &delta.cooldowns.updated {
            let change = self.cooldowns.apply_replicated_change(entry, now);
            self.notify(change.into());
        }
        for tag in &delta.cooldowns.removed {
            if let Some(change) = self.cooldowns.apply_replicated_remove(tag) {
                self.notify(change.into());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::attribute::{Attribute, AttributeData};
    use crate::content::ContentLibrary;
    use crate::cooldown::CooldownEntry;
    use crate::handle::EntityId;
    use crate::replication::{AttributeValue, EntityDelta, TagCount};
    use crate::system::{NetRole, Notification};
    use crate::tag::Tag;
    use crate::test_utils::bare_system;

    #[test]
    fn mirrors_tags_attributes_and_cooldowns() {
        let mut system = bare_system(ContentLibrary::default(), NetRole::AutonomousProxy);
        let cooldown = Tag::new("Action.Cooldown.Primary");

        let mut delta = EntityDelta {
            entity: EntityId(1),
            ..EntityDelta::default()
        };
        delta.tags.added.push(TagCount {
            tag: cooldown.clone(),
            count: 1,
        });
        delta.attributes.updated.push(AttributeValue {
            attribute: Attribute::Health,
            data: AttributeData {
                base: 70.0,
                current: 70.0,
            },
        });
        delta.cooldowns.added.push(CooldownEntry {
            tag: cooldown.clone(),
            start_time: 40.0,
            end_time: 50.0,
            duration: 10.0,
        });
        system.apply_delta(&delta);

        assert!(system.has_tag(&cooldown));
        assert_eq!(system.attributes().current(Attribute::Health), Some(70.0));
        assert_eq!(system.cooldown_time_remaining(&cooldown), 10.0);
        let notes = system.drain_notifications();
        assert!(notes.iter().any(|n| matches!(n, Notification::CooldownAdded(_))));
        assert!(notes
            .iter()
            .any(|n| matches!(n, Notification::AttributeChanged { new, .. } if *new == 70.0)));

        let mut clear = EntityDelta {
            entity: EntityId(1),
            ..EntityDelta::default()
        };
        clear.tags.removed.push(cooldown.clone());
        clear.cooldowns.removed.push(cooldown.clone());
        system.apply_delta(&clear);
        assert!(!system.has_tag(&cooldown));
        assert_eq!(system.cooldown_time_remaining(&cooldown), 0.0);
    }

    #[test]
    fn mirroring_overwrites_only_the_replicated_layer() {
        let mut system = bare_system(ContentLibrary::default(), NetRole::SimulatedProxy);
        let guard = Tag::new("State.Stance.Guard");
        system.add_local_tag(&guard, 1);

        let mut delta = EntityDelta::default();
        delta.tags.added.push(TagCount {
            tag: guard.clone(),
            count: 1,
        });
        system.apply_delta(&delta);
        assert_eq!(system.tag_count(&guard), 2);
        let changes: Vec<_> = system
            .drain_notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::TagChanged(change) => Some((change.old_count, change.new_count)),
                _ => None,
            })
            .collect();
        assert_eq!(changes, vec![(0, 1), (1, 2)]);

        system.remove_local_tag(&guard, 1);
        assert_eq!(system.tag_count(&guard), 1);
        assert_eq!(system.tags().replicated().count(&guard), 1);
    }

    #[test]
    fn authority_ignores_deltas() {
        let mut system = bare_system(ContentLibrary::default(), NetRole::Authority);
        let mut delta = EntityDelta::default();
        delta.tags.added.push(TagCount {
            tag: Tag::new("State.Stunned"),
            count: 1,
        });
        system.apply_delta(&delta);
        assert!(!system.has_tag(&Tag::new("State.Stunned")));
    }
}
