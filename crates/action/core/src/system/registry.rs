//! Granting, revoking, cancelling, and end-of-execution bookkeeping.

use std::sync::Arc;

use crate::action::{
    ActionSpec, ActionTemplate, ActionTemplateId, ActivationPolicy, InstancingPolicy, RegistryError,
};
use crate::handle::{ActionSpecHandle, ActiveActionHandle, InstanceId};
use crate::replication::{NetMessage, Recipient};
use crate::tag::{Tag, TagSet};

use super::{ActionSystem, Notification};

impl ActionSystem {
    // ========================================================================
    // Grant & revoke
    // ========================================================================

    /// Grants a template to this entity. Authority only.
    ///
    /// Per-owner templates are granted once; a second grant returns the
    /// existing handle. `OnGrant` templates activate immediately.
    pub fn grant(
        &mut self,
        template: &ActionTemplateId,
        input: Tag,
        level: u32,
    ) -> Result<ActionSpecHandle, RegistryError> {
        if !self.role().is_authority() {
            return Err(RegistryError::NotAuthority { operation: "grant" });
        }
        let template = self
            .content
            .action(template)
            .ok_or_else(|| RegistryError::UnknownTemplate(template.clone()))?;

        if template.instancing == InstancingPolicy::OneInstancePerOwner
            && let Some(existing) = self.specs.iter().find(|s| s.template == template.id)
        {
            tracing::debug!(
                target: "action::registry",
                template = %template.id,
                spec = %existing.handle,
                "per-owner template already granted"
            );
            return Ok(existing.handle);
        }

        let spec = ActionSpec::new(&template, input, level);
        let handle = spec.handle;
        for trigger in &template.trigger_tags {
            self.event_triggers
                .entry(trigger.clone())
                .or_default()
                .push(handle);
        }
        tracing::info!(
            target: "action::registry",
            entity = %self.entity(),
            template = %template.id,
            spec = %handle,
            input = %spec.input_tag,
            level,
            "granted action"
        );
        self.specs.push(spec);

        if matches!(
            template.activation,
            ActivationPolicy::OnGrant | ActivationPolicy::OnGrantAndRemove
        ) && let Err(err) = self.try_activate(handle)
        {
            tracing::debug!(target: "action::registry", spec = %handle, error = %err, "grant-time activation failed");
        }
        Ok(handle)
    }

    /// Revokes a spec, cancelling any execution of it first. Authority only.
    pub fn revoke(&mut self, handle: ActionSpecHandle) -> Result<(), RegistryError> {
        if !self.role().is_authority() {
            return Err(RegistryError::NotAuthority { operation: "revoke" });
        }
        if self.find_spec(handle).is_none() {
            return Err(RegistryError::UnknownSpec(handle));
        }

        for id in self.executing_instances_of(handle) {
            self.cancel_action(id);
        }

        self.event_triggers.retain(|_, specs| {
            specs.retain(|s| *s != handle);
            !specs.is_empty()
        });
        self.input_pressed.retain(|s| *s != handle);
        self.input_released.retain(|s| *s != handle);
        self.input_held.remove(&handle);
        if let Some(id) = self.owner_instances.remove(&handle) {
            self.instances.remove(&id);
        }

        // Ending the execution may already have revoked an OnGrantAndRemove spec.
        if let Some(index) = self.specs.iter().position(|s| s.handle == handle) {
            let spec = self.specs.remove(index);
            tracing::info!(
                target: "action::registry",
                entity = %self.entity(),
                template = %spec.template,
                spec = %handle,
                "revoked action"
            );
        }
        Ok(())
    }

    /// Revokes every granted spec.
    pub fn revoke_all(&mut self) -> Result<(), RegistryError> {
        if !self.role().is_authority() {
            return Err(RegistryError::NotAuthority {
                operation: "revoke_all",
            });
        }
        let handles: Vec<_> = self.specs.iter().map(|s| s.handle).collect();
        for handle in handles {
            match self.revoke(handle) {
                Ok(()) | Err(RegistryError::UnknownSpec(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    /// Cancels every executing action whose spec tags match any of `with`
    /// and none of `without`. An empty `with` cancels nothing.
    pub fn cancel_actions(&mut self, with: &TagSet, without: &TagSet) {
        self.cancel_actions_except(with, without, None);
    }

    pub(crate) fn cancel_actions_except(
        &mut self,
        with: &TagSet,
        without: &TagSet,
        except: Option<InstanceId>,
    ) {
        if with.is_empty() {
            return;
        }
        let targets: Vec<InstanceId> = self
            .instances
            .values()
            .filter(|i| i.is_executing() && Some(i.id) != except)
            .filter(|i| {
                let tags = self
                    .find_spec(i.spec)
                    .map_or(&i.template.action_tags, |s| &s.dynamic_tags);
                tags.has_any(with) && !tags.has_any(without)
            })
            .map(|i| i.id)
            .collect();
        for id in targets {
            tracing::debug!(target: "action::registry", instance = id.0, "cancelled by tag");
            self.cancel_action(id);
        }
    }

    /// Cancels one execution by its active handle.
    pub fn cancel_active(&mut self, handle: ActiveActionHandle) {
        if let Some(id) = self.active.get(&handle).and_then(|entry| entry.instance) {
            self.cancel_action(id);
        }
    }

    /// Ends one execution normally by its active handle.
    pub fn end_active(&mut self, handle: ActiveActionHandle) {
        if let Some(id) = self.active.get(&handle).and_then(|entry| entry.instance) {
            self.end_action(id);
        }
    }

    /// Cancels every local execution of a spec.
    pub fn cancel_spec(&mut self, spec: ActionSpecHandle) {
        for id in self.executing_instances_of(spec) {
            self.cancel_action(id);
        }
    }

    // ========================================================================
    // Instances
    // ========================================================================

    /// Picks the instance an execution runs on, per the template's policy.
    pub(crate) fn instance_for_execution(
        &mut self,
        template: &Arc<ActionTemplate>,
        spec: ActionSpecHandle,
    ) -> InstanceId {
        if template.instancing == InstancingPolicy::OneInstancePerOwner {
            if let Some(id) = self.owner_instances.get(&spec).copied()
                && self.instances.contains_key(&id)
            {
                return id;
            }
            let id = self.allocate_instance(Arc::clone(template), spec);
            self.owner_instances.insert(spec, id);
            return id;
        }
        self.allocate_instance(Arc::clone(template), spec)
    }

    /// Drops an ended instance unless its policy keeps it for reuse.
    fn dispose_instance(&mut self, id: InstanceId) {
        let keep = self
            .instances
            .get(&id)
            .is_some_and(|i| i.template.instancing == InstancingPolicy::OneInstancePerOwner);
        if !keep {
            self.instances.remove(&id);
        }
    }

    // ========================================================================
    // End bookkeeping
    // ========================================================================

    /// Runs after an instance reached `Ended` through the normal path.
    pub(crate) fn on_instance_ended(&mut self, id: InstanceId, cancelled: bool) {
        let Some(instance) = self.instances.get(&id) else {
            return;
        };
        let spec = instance.spec;
        let active = instance.active;
        let template = Arc::clone(&instance.template);
        self.notify(Notification::ActionEnded {
            spec,
            active,
            cancelled,
        });

        if !self.role().is_authority() {
            self.dispose_instance(id);
            for entry in self.active.values_mut() {
                if entry.instance == Some(id) {
                    entry.instance = None;
                }
            }
            return;
        }

        if !self.active.contains_key(&active) {
            self.dispose_instance(id);
            return;
        }
        self.on_action_end(active, &template, cancelled);
        self.dispose_instance(id);
    }

    /// Authority bookkeeping once an execution has finished.
    fn on_action_end(
        &mut self,
        active: ActiveActionHandle,
        template: &ActionTemplate,
        cancelled: bool,
    ) {
        let Some(entry) = self.active.remove(&active) else {
            return;
        };
        let spec = entry.action.spec.handle;
        let key = entry.action.key;

        self.send(
            Recipient::Owner(self.entity()),
            NetMessage::NotifyEnded {
                entity: self.entity(),
                active,
                key,
                cancelled,
            },
        );

        if let Some(spec) = self.find_spec_mut(spec) {
            spec.activation_count = spec.activation_count.saturating_sub(1);
        }
        tracing::info!(
            target: "action::registry",
            entity = %self.entity(),
            template = %template.id,
            active = %active,
            cancelled,
            "action ended"
        );

        if template.activation == ActivationPolicy::OnGrantAndRemove
            && let Err(err) = self.revoke(spec)
        {
            tracing::debug!(target: "action::registry", spec = %spec, error = %err, "auto-revoke skipped");
        }
    }
}
