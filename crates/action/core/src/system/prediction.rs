//! Client prediction: prediction keys, confirmation, rehome, and the
//! replicated active-action and spec lists.
//!
//! A locally controlled client runs an activation immediately on a
//! *predicted* instance and asks the server to execute it under a fresh
//! [`PredictionKey`]. When the server's execution replicates back carrying
//! that key, the predicted instance hands everything it acquired to an
//! *authoritative* instance bound to the server's active handle and retires
//! without running exit behaviors. Nothing is observed twice.

use std::mem;
use std::sync::Arc;

use crate::action::{ActionSpec, ActivationError, ActiveAction, InstancingPolicy, NetExecutionPolicy};
use crate::event::EventBus;
use crate::handle::{ActionSpecHandle, ActiveActionHandle, PredictionKey};
use crate::replication::{NetMessage, Recipient};
use crate::tag::TagSet;

use super::{ActionSystem, ActiveEntry, Notification, PendingPrediction};

impl ActionSystem {
    /// Issues a fresh, never-zero prediction key.
    pub fn create_prediction_key(&mut self) -> PredictionKey {
        self.next_prediction_key = self.next_prediction_key.wrapping_add(1).max(1);
        PredictionKey(self.next_prediction_key)
    }

    // ========================================================================
    // Client activation
    // ========================================================================

    pub(crate) fn predict_activation(&mut self, handle: ActionSpecHandle) -> Result<(), ActivationError> {
        if self.pending_specs.contains(&handle) {
            return Err(ActivationError::PredictionPending {
                spec: handle,
                context: self.error_context(handle, "predict"),
            });
        }
        self.check_activation(handle)?;
        let Some(template) = self.find_spec(handle).and_then(|spec| self.template_of(spec)) else {
            return Err(ActivationError::UnknownSpec {
                spec: handle,
                context: self.error_context(handle, "predict"),
            });
        };

        let key = self.create_prediction_key();
        let entity = self.entity();
        self.pending_specs.insert(handle);

        if template.net_execution == NetExecutionPolicy::ServerOnly {
            self.pending_predictions.insert(
                key,
                PendingPrediction {
                    spec: handle,
                    instance: None,
                },
            );
            tracing::debug!(target: "action::prediction", spec = %handle, key = %key, "requesting server-only execution");
            self.send(Recipient::Server, NetMessage::Execute { entity, spec: handle, key });
            return Ok(());
        }

        let id = self.instance_for_execution(&template, handle);
        if let Some(instance) = self.instances.get_mut(&id) {
            instance.prepare(ActiveActionHandle::INVALID, key);
        }
        self.pending_predictions.insert(
            key,
            PendingPrediction {
                spec: handle,
                instance: Some(id),
            },
        );
        self.send(Recipient::Server, NetMessage::Execute { entity, spec: handle, key });

        tracing::info!(
            target: "action::prediction",
            entity = %entity,
            template = %template.id,
            spec = %handle,
            key = %key,
            "predicting activation"
        );
        self.notify(Notification::ActionActivated {
            spec: handle,
            active: ActiveActionHandle::INVALID,
            key,
        });
        if let Some(tag) = &template.identifier_tag {
            self.grant_instance_tag(id, tag);
        }
        self.execute_instance(id);
        Ok(())
    }

    /// Server reply to an `Execute` request.
    pub(crate) fn on_confirm(&mut self, key: PredictionKey, success: bool) {
        let Some(pending) = self.pending_predictions.get(&key).copied() else {
            tracing::trace!(target: "action::prediction", key = %key, "confirm for unknown key");
            return;
        };
        self.pending_specs.remove(&pending.spec);
        if success {
            // The key stays registered until the execution replicates or ends.
            tracing::debug!(target: "action::prediction", key = %key, "prediction confirmed");
            return;
        }

        self.pending_predictions.remove(&key);
        tracing::info!(
            target: "action::prediction",
            spec = %pending.spec,
            key = %key,
            "prediction rejected; rolling back"
        );
        if let Some(id) = pending.instance {
            self.cancel_action(id);
        }
        self.notify(Notification::PredictionRejected {
            spec: pending.spec,
            key,
        });
    }

    /// Server side of `Execute`.
    pub(crate) fn on_execute_request(&mut self, spec: ActionSpecHandle, key: PredictionKey) {
        if let Err(err) = self.execute_authoritative(spec, key, None) {
            tracing::debug!(target: "action::prediction", spec = %spec, key = %key, error = %err, "remote execution refused");
        }
    }

    /// `NotifyEnded` from the server.
    pub(crate) fn on_notify_ended(&mut self, active: ActiveActionHandle, key: PredictionKey, cancelled: bool) {
        if let Some(entry) = self.active.get(&active) {
            if let Some(id) = entry.instance {
                self.end_instance(id, cancelled);
            }
            return;
        }
        // Ended before its replication ever arrived.
        if key.is_valid()
            && let Some(pending) = self.pending_predictions.remove(&key)
        {
            self.pending_specs.remove(&pending.spec);
            tracing::debug!(target: "action::prediction", active = %active, key = %key, "ending orphaned prediction");
            if let Some(id) = pending.instance {
                self.end_instance(id, cancelled);
            }
            return;
        }
        tracing::trace!(target: "action::prediction", active = %active, "end notice for unknown execution");
    }

    pub(crate) fn on_notify_failed(&mut self, spec: ActionSpecHandle, reasons: TagSet) {
        tracing::info!(target: "action::prediction", spec = %spec, "server refused activation");
        self.notify(Notification::ActionFailed { spec, reasons });
    }

    // ========================================================================
    // Replicated active actions
    // ========================================================================

    pub(crate) fn on_replicated_active_added(&mut self, action: ActiveAction) {
        if self.active.contains_key(&action.handle) {
            self.on_replicated_active_changed(action);
            return;
        }
        if self.role().is_locally_controlled()
            && action.key.is_valid()
            && let Some(pending) = self.pending_predictions.remove(&action.key)
        {
            self.rehome(pending, action);
            return;
        }
        self.start_observed(action);
    }

    pub(crate) fn on_replicated_active_changed(&mut self, action: ActiveAction) {
        let Some(entry) = self.active.get_mut(&action.handle) else {
            self.on_replicated_active_added(action);
            return;
        };
        let info = action.phase.clone();
        entry.action = action;
        if let Some(id) = entry.instance {
            self.on_rep_phase_info(id, &info);
        }
    }

    pub(crate) fn on_replicated_active_removed(&mut self, handle: ActiveActionHandle) {
        let Some(entry) = self.active.remove(&handle) else {
            return;
        };
        if let Some(id) = entry.instance
            && self.is_instance_executing(id)
        {
            tracing::debug!(target: "action::prediction", active = %handle, "execution ended on the server");
            self.end_action(id);
        }
    }

    /// Binds a replicated execution to the predicted instance that ran it.
    fn rehome(&mut self, pending: PendingPrediction, action: ActiveAction) {
        let handle = action.handle;
        let key = action.key;
        let info = action.phase.clone();
        self.pending_specs.remove(&pending.spec);

        let Some(predicted) = pending.instance else {
            // Server-only: nothing ran locally, so start from the first phase.
            self.start_observed(action);
            return;
        };
        if !self.is_instance_executing(predicted) {
            tracing::debug!(target: "action::prediction", key = %key, "prediction already finished locally");
            self.active.insert(handle, ActiveEntry { action, instance: None });
            return;
        }
        let Some(template) = self.instances.get(&predicted).map(|i| Arc::clone(&i.template)) else {
            return;
        };

        if template.instancing == InstancingPolicy::OneInstancePerOwner {
            if let Some(instance) = self.instances.get_mut(&predicted) {
                instance.active = handle;
            }
            self.active.insert(handle, ActiveEntry { action, instance: Some(predicted) });
        } else {
            let target = self.allocate_instance(Arc::clone(&template), pending.spec);
            let Some(mut old) = self.instances.remove(&predicted) else {
                return;
            };
            let moved_tasks = match self.instances.get_mut(&target) {
                Some(instance) => {
                    instance.prepare(handle, key);
                    instance.transfer_state_from(&mut old);
                    instance.task_bus = mem::replace(&mut old.task_bus, EventBus::new());
                    instance.result_stores = mem::take(&mut old.result_stores);
                    instance.tasks.clone()
                }
                None => Vec::new(),
            };
            old.being_rehomed = true;
            self.instances.insert(predicted, old);
            for task in moved_tasks {
                self.rehome_task(task, target);
            }
            self.active.insert(handle, ActiveEntry { action, instance: Some(target) });
            self.end_action(predicted);
            self.instances.remove(&predicted);

            let counter = self.instances.get(&target).map_or(0, |i| i.phase_counter);
            let interruptible = self
                .instances
                .get(&target)
                .and_then(|i| i.phase.as_ref())
                .and_then(|phase| template.phase(phase))
                .is_some_and(|data| data.can_be_interrupted_by_movement);
            if interruptible {
                self.watch_movement(target, counter);
            }
            self.install_phase_transitions(target, true);
        }

        tracing::info!(
            target: "action::prediction",
            key = %key,
            active = %handle,
            "rehomed prediction onto authoritative execution"
        );
        self.notify(Notification::Rehomed { key, active: handle });

        if let Some(id) = self.active.get(&handle).and_then(|entry| entry.instance) {
            self.on_rep_phase_info(id, &info);
        }
    }

    /// Runs someone else's (or an unpredicted) execution locally from its
    /// first phase; phase replication then corrects it.
    fn start_observed(&mut self, action: ActiveAction) {
        let handle = action.handle;
        let key = action.key;
        let spec = action.spec.handle;
        let info = action.phase.clone();
        let Some(template) = self.content.action(&action.spec.template) else {
            tracing::warn!(
                target: "action::prediction",
                template = %action.spec.template,
                "replicated execution of unknown template"
            );
            self.active.insert(handle, ActiveEntry { action, instance: None });
            return;
        };

        let id = self.instance_for_execution(&template, spec);
        if let Some(instance) = self.instances.get_mut(&id) {
            instance.prepare(handle, key);
        }
        self.active.insert(handle, ActiveEntry { action, instance: Some(id) });
        tracing::debug!(target: "action::prediction", template = %template.id, active = %handle, "observing execution");
        self.notify(Notification::ActionActivated { spec, active: handle, key });
        if let Some(tag) = &template.identifier_tag {
            self.grant_instance_tag(id, tag);
        }
        self.execute_instance(id);
        self.on_rep_phase_info(id, &info);
    }

    // ========================================================================
    // Replicated spec list
    // ========================================================================

    pub(crate) fn on_replicated_spec_added(&mut self, spec: ActionSpec) {
        match self.find_spec_mut(spec.handle) {
            Some(existing) => *existing = spec,
            None => {
                tracing::debug!(target: "action::registry", spec = %spec.handle, template = %spec.template, "spec replicated");
                self.specs.push(spec);
            }
        }
    }

    pub(crate) fn on_replicated_spec_removed(&mut self, handle: ActionSpecHandle) {
        for id in self.executing_instances_of(handle) {
            self.cancel_action(id);
        }
        self.pending_specs.remove(&handle);
        self.pending_predictions.retain(|_, pending| pending.spec != handle);
        if let Some(id) = self.owner_instances.remove(&handle) {
            self.instances.remove(&id);
        }
        self.input_held.remove(&handle);
        self.specs.retain(|spec| spec.handle != handle);
    }
}

#[cfg(test)]
mod tests {
    use crate::action::ActionTemplate;
    use crate::content::ContentLibrary;
    use crate::handle::PredictionKey;
    use crate::phase::{PhaseData, TransitionKind};
    use crate::replication::NetMessage;
    use crate::system::{NetRole, Notification, WorldRequest};
    use crate::tag::Tag;
    use crate::test_utils::{bare_system, granted_spec};

    fn held() -> ActionTemplate {
        let mut template = ActionTemplate::new("Guard")
            .phase_data(PhaseData::new("Phase.Action.Hold").transition(TransitionKind::Manual, "Phase.Action.End"));
        template.identifier_tag = Some(Tag::new("Action.Id.Guard"));
        template
    }

    #[test]
    fn keys_are_never_none() {
        let mut system = bare_system(ContentLibrary::default(), NetRole::AutonomousProxy);
        let first = system.create_prediction_key();
        let second = system.create_prediction_key();
        assert!(first.is_valid());
        assert_ne!(first, second);
    }

    #[test]
    fn prediction_sends_execute_and_runs_locally() {
        let content = ContentLibrary::builder().action(held()).build();
        let mut system = bare_system(content, NetRole::AutonomousProxy);
        let spec = granted_spec(&mut system, "Guard");

        system.try_activate(spec).unwrap();
        assert!(system.is_prediction_pending(spec));
        assert!(system.has_tag(&Tag::new("Action.Id.Guard")));
        let execute = system.take_requests().into_iter().any(|request| {
            matches!(request, WorldRequest::Send(out) if matches!(out.message, NetMessage::Execute { .. }))
        });
        assert!(execute);

        let err = system.try_activate(spec).unwrap_err();
        assert!(matches!(err, crate::action::ActivationError::PredictionPending { .. }));
    }

    #[test]
    fn rejection_rolls_back_through_the_end_path() {
        let content = ContentLibrary::builder().action(held()).build();
        let mut system = bare_system(content, NetRole::AutonomousProxy);
        let spec = granted_spec(&mut system, "Guard");
        system.try_activate(spec).unwrap();
        system.drain_notifications();

        system.on_confirm(PredictionKey(1), false);
        assert!(!system.is_prediction_pending(spec));
        assert_eq!(system.pending_prediction_count(), 0);
        assert!(!system.has_tag(&Tag::new("Action.Id.Guard")));
        let notes = system.drain_notifications();
        assert!(notes.iter().any(|n| matches!(n, Notification::ActionEnded { cancelled: true, .. })));
        assert!(notes.iter().any(|n| matches!(n, Notification::PredictionRejected { .. })));
    }

    #[test]
    fn orphan_end_notice_ends_the_prediction() {
        let content = ContentLibrary::builder().action(held()).build();
        let mut system = bare_system(content, NetRole::AutonomousProxy);
        let spec = granted_spec(&mut system, "Guard");
        system.try_activate(spec).unwrap();

        system.on_confirm(PredictionKey(1), true);
        assert!(!system.is_prediction_pending(spec));
        assert_eq!(system.pending_prediction_count(), 1);

        system.on_notify_ended(crate::handle::ActiveActionHandle(77), PredictionKey(1), false);
        assert_eq!(system.pending_prediction_count(), 0);
        assert_eq!(system.tag_count(&Tag::new("Action.Id.Guard")), 0);
    }
}
