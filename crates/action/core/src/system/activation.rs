//! Activation: precondition checks and the authoritative execute path.

use std::sync::Arc;

use crate::action::{
    ActionTemplate, ActivationError, ActivationFailure, ActivationPolicy, ActiveAction,
    InstancingPolicy,
};
use crate::effect::{EffectSpec, ExecutionContext, ModifierOp};
use crate::error::ErrorContext;
use crate::event::EventPayload;
use crate::handle::{ActionSpecHandle, ActiveActionHandle, InstanceId, PredictionKey};
use crate::phase::PhaseInfo;
use crate::replication::{NetMessage, Recipient};
use crate::tag::{Tag, TagSet, names};

use super::{ActionSystem, ActiveEntry, NetRole, Notification};

impl ActionSystem {
    /// Requests activation of a granted spec.
    ///
    /// The authority executes directly; an autonomous proxy predicts and asks
    /// the server; a simulated proxy cannot activate anything.
    pub fn try_activate(&mut self, handle: ActionSpecHandle) -> Result<(), ActivationError> {
        if self.find_spec(handle).is_none() {
            return Err(ActivationError::UnknownSpec {
                spec: handle,
                context: self.error_context(handle, "try_activate"),
            });
        }
        match self.role() {
            NetRole::Authority => self
                .execute_authoritative(handle, PredictionKey::NONE, None)
                .map(|_| ()),
            NetRole::AutonomousProxy => self.predict_activation(handle),
            NetRole::SimulatedProxy => Err(ActivationError::NotLocallyControlled),
        }
    }

    pub(crate) fn error_context(&self, spec: ActionSpecHandle, message: &'static str) -> ErrorContext {
        ErrorContext::new(self.now)
            .with_entity(self.entity())
            .with_spec(spec)
            .with_note(message)
    }

    // ========================================================================
    // Preconditions
    // ========================================================================

    /// Checks every activation precondition, stopping at the first failing
    /// stage. Has no side effects.
    pub fn can_activate(&self, handle: ActionSpecHandle) -> Result<(), ActivationFailure> {
        let Some(spec) = self.find_spec(handle) else {
            return Err(ActivationFailure::single(handle, names::FAIL_TARGET_INVALID));
        };
        let Some(template) = self.template_of(spec) else {
            return Err(ActivationFailure::single(handle, names::FAIL_TARGET_INVALID));
        };
        let mut failure = ActivationFailure::new(handle);

        if self.tags.has_tag(&names::tag(names::STATE_DEAD)) {
            failure.add(names::tag(names::FAIL_IS_DEAD));
            return Err(failure);
        }

        let cooldown = spec.cooldown_tag();
        if self.tags.has_tag_exact(&cooldown) && self.tags.count(&spec.stack_tag()) <= 0 {
            failure.add(names::tag(names::FAIL_COOLDOWN));
            return Err(failure);
        }

        self.check_cost(handle, &template, &mut failure);
        if !failure.is_empty() {
            return Err(failure);
        }

        let already_active = template
            .identifier_tag
            .as_ref()
            .is_some_and(|tag| self.tags.has_tag(tag))
            || (template.instancing == InstancingPolicy::OneInstancePerOwner
                && !self.executing_instances_of(handle).is_empty());
        if already_active {
            failure.add(names::tag(names::FAIL_ALREADY_ACTIVE));
            return Err(failure);
        }

        let mut blocked = template.activation_blocked_tags.clone();
        blocked.extend(&self.mapping.blocked_tags(&template.action_tags));
        if self.tags.has_any(&blocked) {
            failure.add(names::tag(names::FAIL_TAGS_BLOCKED));
            return Err(failure);
        }

        let mut required = template.activation_required_tags.clone();
        required.extend(&self.mapping.required_tags(&template.action_tags));
        if !self.tags.has_all(&required) {
            failure.add(names::tag(names::FAIL_TAGS_MISSING));
            return Err(failure);
        }

        Ok(())
    }

    fn check_cost(
        &self,
        handle: ActionSpecHandle,
        template: &ActionTemplate,
        failure: &mut ActivationFailure,
    ) {
        if let Some(effect) = &template.cost_effect {
            match self.cost_preview(handle, effect) {
                Ok(cost) => {
                    for modifier in cost.resolved_modifiers() {
                        if modifier.op != ModifierOp::Add {
                            continue;
                        }
                        let current = self.attributes.current_or_zero(modifier.attribute);
                        if current + modifier.magnitude < 0.0 {
                            failure.add(names::tag(names::FAIL_COST));
                            failure.add(names::tag(names::FAIL_COST).child(modifier.attribute.as_ref()));
                        }
                    }
                }
                Err(err) => {
                    tracing::error!(
                        target: "action::registry",
                        template = %template.id,
                        error = %err,
                        "cost effect cannot be evaluated"
                    );
                    failure.add(names::tag(names::FAIL_COST));
                }
            }
        }
        if !failure.is_empty() {
            return;
        }
        for cost in &template.additional_costs {
            if self.attributes.current_or_zero(cost.attribute) < cost.amount {
                failure.add(names::tag(names::FAIL_ADDITIONAL_COST));
                return;
            }
        }
    }

    /// The cost spec with its executions run, as it would land on the owner.
    fn cost_preview(
        &self,
        handle: ActionSpecHandle,
        effect: &crate::effect::EffectTemplateId,
    ) -> Result<EffectSpec, crate::effect::EffectError> {
        let mut spec = self.make_action_effect_spec(handle, effect)?;
        let ctx = ExecutionContext {
            target: &self.attributes,
            target_entity: self.entity().0,
            rng: &self.rng,
            world_seed: self.config.world_seed,
            nonce: self.effect_nonce,
            min_cooldown: self.config.min_cooldown,
        };
        let template = Arc::clone(&spec.template);
        for execution in &template.executions {
            execution.execute(&mut spec, &ctx)?;
        }
        Ok(spec)
    }

    /// Runs `can_activate` and reports a failure to observers.
    pub(crate) fn check_activation(&mut self, handle: ActionSpecHandle) -> Result<(), ActivationError> {
        if let Err(failure) = self.can_activate(handle) {
            tracing::info!(
                target: "action::registry",
                entity = %self.entity(),
                "{failure}"
            );
            self.notify(Notification::ActionFailed {
                spec: handle,
                reasons: failure.reasons.clone(),
            });
            return Err(failure.into());
        }
        Ok(())
    }

    // ========================================================================
    // Authoritative execution
    // ========================================================================

    /// The server execute path, used for local activation on the authority,
    /// client `Execute` requests, and event triggers.
    pub(crate) fn execute_authoritative(
        &mut self,
        handle: ActionSpecHandle,
        key: PredictionKey,
        payload: Option<EventPayload>,
    ) -> Result<ActiveActionHandle, ActivationError> {
        let Some(spec) = self.find_spec(handle).cloned() else {
            self.reject_remote(handle, key, TagSet::single(names::tag(names::FAIL_NETWORKING)));
            return Err(ActivationError::UnknownSpec {
                spec: handle,
                context: self.error_context(handle, "server execute"),
            });
        };
        let Some(template) = self.template_of(&spec) else {
            self.reject_remote(handle, key, TagSet::single(names::tag(names::FAIL_NETWORKING)));
            return Err(ActivationError::MissingTemplate(spec.template.clone()));
        };

        if let Err(failure) = self.check_activation(handle) {
            if let Some(failure) = failure.failure() {
                self.reject_remote(handle, key, failure.reasons.clone());
            }
            return Err(failure);
        }

        let active = ActiveActionHandle::generate();
        let id = self.instance_for_execution(&template, handle);
        if let Some(instance) = self.instances.get_mut(&id) {
            instance.prepare(active, key);
            if let Some(payload) = payload {
                instance.payload = payload;
            }
        }
        if let Some(tag) = &template.identifier_tag {
            self.grant_instance_tag(id, tag);
        }
        self.active.insert(
            active,
            ActiveEntry {
                action: ActiveAction {
                    handle: active,
                    spec: spec.clone(),
                    key,
                    owner: self.entity(),
                    start_time: self.now,
                    completed: false,
                    phase: PhaseInfo::default(),
                },
                instance: Some(id),
            },
        );

        let mut cancel = template.cancel_actions_with_tag.clone();
        cancel.extend(&self.mapping.cancelled_by_tags(&template.action_tags));
        self.cancel_actions_except(&cancel, &TagSet::new(), Some(id));

        let now = self.now;
        if let Some(spec) = self.find_spec_mut(handle) {
            spec.activation_count += 1;
            spec.dynamic_tags.extend(&template.action_tags);
        }
        if let (Some(spec), Some(entry)) = (self.find_spec(handle).cloned(), self.active.get_mut(&active)) {
            entry.action.spec = spec;
            entry.action.start_time = now;
        }

        self.activate_action(handle, &template);

        tracing::info!(
            target: "action::registry",
            entity = %self.entity(),
            template = %template.id,
            spec = %handle,
            active = %active,
            key = %key,
            "action activated"
        );
        self.execute_instance(id);

        if let Some(spec) = self.find_spec_mut(handle) {
            spec.last_execution_time = now;
        }
        self.notify(Notification::ActionActivated {
            spec: handle,
            active,
            key,
        });
        if key.is_valid() {
            self.send(
                Recipient::Owner(self.entity()),
                NetMessage::Confirm {
                    entity: self.entity(),
                    key,
                    success: true,
                },
            );
        }
        Ok(active)
    }

    fn reject_remote(&mut self, spec: ActionSpecHandle, key: PredictionKey, reasons: TagSet) {
        if !key.is_valid() {
            return;
        }
        let entity = self.entity();
        self.send(
            Recipient::Owner(entity),
            NetMessage::NotifyFailed {
                entity,
                spec,
                reasons,
            },
        );
        self.send(
            Recipient::Owner(entity),
            NetMessage::Confirm {
                entity,
                key,
                success: false,
            },
        );
    }

    /// Commits cost, additional costs, and (optionally) the cooldown.
    fn activate_action(&mut self, handle: ActionSpecHandle, template: &ActionTemplate) {
        if let Some(effect) = &template.cost_effect {
            match self.make_action_effect_spec(handle, effect) {
                Ok(spec) => {
                    if let Err(err) = self.apply_effect_spec(spec) {
                        tracing::warn!(target: "action::effect", effect = %effect, error = %err, "cost not applied");
                    }
                }
                Err(err) => {
                    tracing::error!(target: "action::effect", effect = %effect, error = %err, "cost spec failed");
                }
            }
        }
        for cost in &template.additional_costs {
            self.apply_base_delta(cost.attribute, -cost.amount);
        }
        if template.apply_cooldown_on_start {
            self.commit_cooldown(handle);
        }
    }

    /// Applies the spec's cooldown effect. Authority only.
    pub(crate) fn commit_cooldown(&mut self, handle: ActionSpecHandle) {
        if !self.role().is_authority() {
            return;
        }
        let Some(spec) = self.find_spec(handle) else {
            return;
        };
        let Some(effect) = self.template_of(spec).and_then(|t| t.cooldown_effect.clone()) else {
            return;
        };
        match self.make_action_effect_spec(handle, &effect) {
            Ok(spec) => {
                if let Err(err) = self.apply_effect_spec(spec) {
                    tracing::warn!(target: "action::cooldown", effect = %effect, error = %err, "cooldown not applied");
                }
            }
            Err(err) => {
                tracing::error!(target: "action::cooldown", effect = %effect, error = %err, "cooldown spec failed");
            }
        }
    }

    /// Starts an instance in its first phase (or its single-shot phase).
    pub(crate) fn execute_instance(&mut self, id: InstanceId) {
        let Some(template) = self.instances.get(&id).map(|i| Arc::clone(&i.template)) else {
            return;
        };
        let phase = match template.instancing {
            InstancingPolicy::NonInstanced => template.single_shot_phase(),
            _ => template.initial_phase(),
        };
        let Some(phase) = phase.cloned() else {
            tracing::error!(
                target: "action::phase",
                template = %template.id,
                "template declares no phases; ending action"
            );
            self.end_action(id);
            return;
        };
        self.enter_phase(id, &phase, false);
        if template.instancing == InstancingPolicy::NonInstanced {
            self.end_action(id);
        }
    }

    // ========================================================================
    // Event triggers
    // ========================================================================

    /// Activates every spec registered for `tag` whose preconditions and
    /// source-tag requirements pass. Authority only.
    pub fn try_activate_by_event(&mut self, tag: &Tag, payload: &EventPayload) {
        if !self.role().is_authority() {
            return;
        }
        let mut candidates: Vec<ActionSpecHandle> = Vec::new();
        for (trigger, specs) in &self.event_triggers {
            if tag.matches(trigger) {
                for spec in specs {
                    if !candidates.contains(spec) {
                        candidates.push(*spec);
                    }
                }
            }
        }

        for handle in candidates {
            let Some(template) = self.find_spec(handle).and_then(|s| self.template_of(s)) else {
                continue;
            };
            let source = &payload.instigator_tags;
            if !source.has_all(&template.source_required_tags)
                || source.has_any(&template.source_blocked_tags)
            {
                tracing::debug!(target: "action::registry", spec = %handle, event = %tag, "source tags rejected trigger");
                self.notify(Notification::ActionFailed {
                    spec: handle,
                    reasons: TagSet::single(names::tag(names::FAIL_SOURCE_TAGS)),
                });
                continue;
            }
            if let Err(err) = self.execute_authoritative(handle, PredictionKey::NONE, Some(payload.clone())) {
                tracing::debug!(target: "action::registry", spec = %handle, error = %err, "triggered activation failed");
            }
        }
    }

    /// True when the spec has a live local execution (or, on the authority,
    /// a live active entry).
    pub(crate) fn is_spec_running(&self, handle: ActionSpecHandle) -> bool {
        !self.executing_instances_of(handle).is_empty()
            || self.active.values().any(|e| e.action.spec.handle == handle)
            || self.pending_specs.contains(&handle)
    }

    pub(crate) fn activation_policy_of(&self, handle: ActionSpecHandle) -> Option<ActivationPolicy> {
        let spec = self.find_spec(handle)?;
        self.template_of(spec).map(|t| t.activation)
    }
}

#[cfg(test)]
mod tests {
    use crate::action::{ActionTemplate, AdditionalCost, ActivationError};
    use crate::attribute::Attribute;
    use crate::event::EventPayload;
    use crate::phase::{PhaseData, TransitionKind};
    use crate::system::Notification;
    use crate::tag::{Tag, TagSet, names};
    use crate::test_utils::authority_system;

    fn held(id: &str) -> ActionTemplate {
        ActionTemplate::new(id)
            .phase_data(PhaseData::new("Phase.Action.Hold").transition(TransitionKind::Manual, "Phase.Action.End"))
    }

    fn reasons(err: ActivationError) -> TagSet {
        err.failure().expect("precondition failure").reasons.clone()
    }

    #[test]
    fn dead_owner_fails_before_anything_else() {
        let mut template = held("Q");
        template.activation_required_tags = TagSet::from_iter(["State.Missing"]);
        let (mut system, spec) = authority_system(template);
        system.add_tag(&Tag::new(names::STATE_DEAD), 1);

        let failed = reasons(system.try_activate(spec).unwrap_err());
        assert_eq!(failed, TagSet::from_iter([names::FAIL_IS_DEAD]));
        assert!(
            system
                .drain_notifications()
                .iter()
                .any(|n| matches!(n, Notification::ActionFailed { .. }))
        );
    }

    #[test]
    fn identifier_tag_blocks_reactivation() {
        let mut template = held("Q");
        template.identifier_tag = Some(Tag::new("Action.Id.Q"));
        let (mut system, spec) = authority_system(template);

        system.try_activate(spec).unwrap();
        let failed = reasons(system.try_activate(spec).unwrap_err());
        assert!(failed.has_tag_exact(&Tag::new(names::FAIL_ALREADY_ACTIVE)));
        assert_eq!(system.tag_count(&Tag::new("Action.Id.Q")), 1);
    }

    #[test]
    fn additional_cost_is_checked_and_paid() {
        let mut template = held("Q");
        template.additional_costs.push(AdditionalCost {
            attribute: Attribute::Mana,
            amount: 60.0,
        });
        let (mut system, spec) = authority_system(template);

        system.try_activate(spec).unwrap();
        assert_eq!(system.attributes().current(Attribute::Mana), Some(40.0));

        system.cancel_spec(spec);
        let failed = reasons(system.try_activate(spec).unwrap_err());
        assert!(failed.has_tag_exact(&Tag::new(names::FAIL_ADDITIONAL_COST)));
    }

    #[test]
    fn blocked_and_required_tags() {
        let mut template = held("Q");
        template.activation_blocked_tags = TagSet::from_iter(["State.CrowdControl"]);
        template.activation_required_tags = TagSet::from_iter(["State.Generic.Alive"]);
        let (mut system, spec) = authority_system(template);

        let failed = reasons(system.try_activate(spec).unwrap_err());
        assert!(failed.has_tag_exact(&Tag::new(names::FAIL_TAGS_MISSING)));

        system.add_tag(&Tag::new("State.Generic.Alive"), 1);
        system.add_tag(&Tag::new("State.CrowdControl.Stun"), 1);
        let failed = reasons(system.try_activate(spec).unwrap_err());
        assert!(failed.has_tag_exact(&Tag::new(names::FAIL_TAGS_BLOCKED)));

        system.remove_tag(&Tag::new("State.CrowdControl.Stun"), 1);
        assert!(system.try_activate(spec).is_ok());
    }

    #[test]
    fn trigger_checks_source_tags() {
        let mut template = held("Riposte");
        template.trigger_tags = TagSet::from_iter(["Event.Parried"]);
        template.source_required_tags = TagSet::from_iter(["State.Stance.Guard"]);
        let (mut system, _) = authority_system(template);

        system.handle_gameplay_event(&Tag::new("Event.Parried"), &EventPayload::new());
        assert_eq!(system.active_actions().count(), 0);

        let payload = EventPayload::new().with_instigator(
            crate::handle::EntityId(5),
            TagSet::from_iter(["State.Stance.Guard"]),
        );
        system.handle_gameplay_event(&Tag::new("Event.Parried"), &payload);
        assert_eq!(system.active_actions().count(), 1);
    }
}
