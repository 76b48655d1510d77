//! Phase entry, exit, transition installation, and instance termination.
//!
//! Everything here runs against an [`InstanceId`] and re-resolves the
//! instance after every step that may run arbitrary behaviors, since a
//! behavior can end the very instance that is being driven.

use std::sync::Arc;

use crate::action::{ActiveRule, InstancingPolicy, Lifecycle, TaskBusHandler};
use crate::event::EventPayload;
use crate::handle::{EntityId, InstanceId};
use crate::phase::{BehaviorKind, PhaseBehavior, PhaseInfo, TransitionKind, check_all};
use crate::system::{ActionSystem, GameplayHandler, Notification};
use crate::tag::{Tag, TagSet, names};
use crate::task::TaskSpec;

impl ActionSystem {
    // ========================================================================
    // Entry & exit
    // ========================================================================

    /// Moves an executing instance into `phase`.
    ///
    /// A request arriving while the instance is mid-transition is dropped
    /// unless `force` is set, in which case it is parked and applied once the
    /// current transition completes.
    pub(crate) fn enter_phase(&mut self, id: InstanceId, phase: &Tag, force: bool) {
        let budget = self.config.max_phase_transitions_per_step;
        let Some(instance) = self.instances.get_mut(&id) else {
            return;
        };
        if !instance.is_executing() {
            return;
        }
        if instance.transitioning {
            if force {
                tracing::debug!(
                    target: "action::phase",
                    instance = id.0,
                    phase = %phase,
                    "transition in progress; parking forced phase"
                );
                instance.pending_next_phase = Some(phase.clone());
            }
            return;
        }
        if !force && instance.phase.as_ref() == Some(phase) {
            return;
        }

        let template = Arc::clone(&instance.template);
        let Some(data) = template.phase(phase) else {
            tracing::error!(
                target: "action::phase",
                template = %template.id,
                phase = %phase,
                "phase is not declared by the template; ending action"
            );
            self.end_action(id);
            return;
        };
        if instance.transitions_this_step >= budget {
            tracing::error!(
                target: "action::phase",
                template = %template.id,
                phase = %phase,
                budget,
                "phase transition budget exhausted; ending action"
            );
            self.end_action(id);
            return;
        }

        instance.transitioning = true;
        instance.transitions_this_step += 1;
        instance.phase_counter += 1;
        let counter = instance.phase_counter;
        let spec = instance.spec;
        let active = instance.active;

        self.exit_phase(id);

        let Some(instance) = self.instances.get_mut(&id) else {
            return;
        };
        if !instance.is_executing() {
            return;
        }
        instance.phase = Some(phase.clone());
        if data.can_be_interrupted_by_movement {
            self.watch_movement(id, counter);
        }
        if self.role().is_authority() {
            self.sync_phase_info(id);
        }

        tracing::debug!(
            target: "action::phase",
            template = %template.id,
            phase = %phase,
            counter,
            "entered phase"
        );
        self.notify(Notification::PhaseEntered {
            spec,
            active,
            phase: phase.clone(),
            counter,
        });

        self.run_behaviors(id, &data.on_enter);
        if !self.is_instance_executing(id) {
            return;
        }

        if !data.cancel_actions_with_tag.is_empty() {
            self.cancel_actions_except(&data.cancel_actions_with_tag, &TagSet::new(), Some(id));
        }

        let Some(instance) = self.instances.get_mut(&id) else {
            return;
        };
        if !instance.is_executing() {
            return;
        }
        instance.transitioning = false;

        if phase.as_str() == names::PHASE_END {
            self.end_action(id);
            return;
        }
        if let Some(pending) = instance.pending_next_phase.take() {
            self.enter_phase(id, &pending, true);
            return;
        }
        if template.instancing == InstancingPolicy::NonInstanced {
            return;
        }
        self.install_phase_transitions(id, false);
    }

    /// Leaves the current phase: drops its rules, ends phase-delay tasks,
    /// runs exit behaviors, and clears result stores.
    pub(crate) fn exit_phase(&mut self, id: InstanceId) {
        let Some(instance) = self.instances.get(&id) else {
            return;
        };
        let Some(phase) = instance.phase.clone() else {
            return;
        };
        let template = Arc::clone(&instance.template);

        self.clear_phase_transitions(id);
        if let Some(data) = template.phase(&phase) {
            self.run_behaviors(id, &data.on_exit);
        }
        if let Some(instance) = self.instances.get_mut(&id) {
            instance.result_stores.clear();
        }
        tracing::trace!(target: "action::phase", phase = %phase, "exited phase");
    }

    fn clear_phase_transitions(&mut self, id: InstanceId) {
        let Some(instance) = self.instances.get_mut(&id) else {
            return;
        };
        instance.active_rules.clear();
        instance.movement_watch = None;
        let delays: Vec<_> = instance
            .tasks
            .iter()
            .copied()
            .filter(|task| {
                self.tasks
                    .get(task)
                    .is_some_and(|task| task.spec.is_phase_delay())
            })
            .collect();
        for task in delays {
            self.end_task(task, true);
        }
    }

    fn sync_phase_info(&mut self, id: InstanceId) {
        let Some(instance) = self.instances.get(&id) else {
            return;
        };
        let info = instance.phase_info();
        if let Some(entry) = self.active.get_mut(&instance.active) {
            entry.action.phase = info;
        }
    }

    /// Subscribes the movement interrupt for the phase entered at `counter`.
    pub(crate) fn watch_movement(&mut self, id: InstanceId, counter: u32) {
        let Some(instance) = self.instances.get_mut(&id) else {
            return;
        };
        instance.movement_watch = Some(self.gameplay_bus.subscribe(
            names::tag(names::EVENT_MOVEMENT_STARTED),
            GameplayHandler::MovementInterrupt { instance: id, counter },
        ));
    }

    pub(crate) fn is_instance_executing(&self, id: InstanceId) -> bool {
        self.instances.get(&id).is_some_and(|i| i.is_executing())
    }

    // ========================================================================
    // Transition rules
    // ========================================================================

    /// Installs the current phase's rules.
    ///
    /// With `reuse_running_delay`, an already running phase-delay task is kept
    /// instead of starting a new one (rehome re-installs rules on a phase
    /// whose delay was inherited).
    pub(crate) fn install_phase_transitions(&mut self, id: InstanceId, reuse_running_delay: bool) {
        let Some(instance) = self.instances.get(&id) else {
            return;
        };
        if !instance.is_executing() {
            return;
        }
        let Some(phase) = instance.phase.clone() else {
            return;
        };
        let template = Arc::clone(&instance.template);
        let counter = instance.phase_counter;
        let Some(data) = template.phase(&phase) else {
            return;
        };

        if data.transitions.is_empty() {
            tracing::debug!(
                target: "action::phase",
                template = %template.id,
                phase = %phase,
                "phase declares no transitions; ending action"
            );
            self.end_action(id);
            return;
        }

        for rule in &data.transitions {
            match &rule.kind {
                TransitionKind::Immediate => {
                    self.enter_phase(id, &rule.next_phase, false);
                    return;
                }
                TransitionKind::OnDurationEnd(seconds) => {
                    let event = names::tag(names::TASK_PHASE_DELAY_FINISHED);
                    let Some(instance) = self.instances.get_mut(&id) else {
                        return;
                    };
                    let subscription = instance
                        .task_bus
                        .subscribe(event.clone(), TaskBusHandler::PhaseTransition { counter });
                    instance.active_rules.push(ActiveRule {
                        event_tag: event,
                        next_phase: rule.next_phase.clone(),
                        conditions: Vec::new(),
                        _subscription: subscription,
                    });
                    let running = reuse_running_delay
                        && instance.tasks.iter().any(|task| {
                            self.tasks
                                .get(task)
                                .is_some_and(|t| t.is_running() && t.spec.is_phase_delay())
                        });
                    if !running {
                        self.start_task(id, TaskSpec::WaitPhaseDelay(*seconds));
                    }
                }
                TransitionKind::OnGameplayEvent(tag) => {
                    let subscription = self.gameplay_bus.subscribe(
                        tag.clone(),
                        GameplayHandler::PhaseTransition { instance: id, counter },
                    );
                    if let Some(instance) = self.instances.get_mut(&id) {
                        instance.active_rules.push(ActiveRule {
                            event_tag: tag.clone(),
                            next_phase: rule.next_phase.clone(),
                            conditions: Vec::new(),
                            _subscription: subscription,
                        });
                    }
                }
                TransitionKind::OnTaskEvent { tag, conditions } => {
                    let Some(instance) = self.instances.get_mut(&id) else {
                        return;
                    };
                    let subscription = instance
                        .task_bus
                        .subscribe(tag.clone(), TaskBusHandler::PhaseTransition { counter });
                    instance.active_rules.push(ActiveRule {
                        event_tag: tag.clone(),
                        next_phase: rule.next_phase.clone(),
                        conditions: conditions.clone(),
                        _subscription: subscription,
                    });
                }
                TransitionKind::Manual => {}
            }
        }

        tracing::trace!(
            target: "action::phase",
            phase = %phase,
            rules = data.transitions.len(),
            "installed transition rules"
        );
    }

    /// Evaluates the installed rules against an incoming event.
    ///
    /// `counter` is the phase entry the routing handler was installed for;
    /// handlers collected before a phase change are ignored.
    pub(crate) fn handle_transition_event(
        &mut self,
        id: InstanceId,
        counter: u32,
        tag: &Tag,
        payload: &EventPayload,
    ) {
        let Some(instance) = self.instances.get(&id) else {
            return;
        };
        if !instance.is_executing() || instance.transitioning || instance.phase_counter != counter {
            return;
        }
        let next = instance
            .active_rules
            .iter()
            .find(|rule| tag.matches(&rule.event_tag) && check_all(&rule.conditions, payload, &self.tags))
            .map(|rule| rule.next_phase.clone());
        match next {
            Some(next) => {
                tracing::debug!(
                    target: "action::phase",
                    event = %tag,
                    next = %next,
                    "transition rule passed"
                );
                self.enter_phase(id, &next, false);
            }
            None => {
                tracing::trace!(target: "action::phase", event = %tag, "no rule passed");
            }
        }
    }

    /// Movement started while an interruptible phase is live.
    pub(crate) fn on_movement_interrupt(&mut self, id: InstanceId, counter: u32) {
        let Some(instance) = self.instances.get(&id) else {
            return;
        };
        if !instance.is_executing() || instance.phase_counter != counter {
            return;
        }
        let timeline = instance.tasks.iter().copied().find(|task| {
            self.tasks
                .get(task)
                .is_some_and(|t| t.is_running() && t.spec.is_timeline())
        });
        if let Some(task) = timeline {
            tracing::debug!(target: "action::phase", instance = id.0, "movement interrupted timeline");
            self.end_task(task, true);
            self.post_task_event(
                id,
                &names::tag(names::TASK_MONTAGE_INTERRUPTED),
                &EventPayload::new(),
            );
        }
    }

    /// Reconciles a replicated phase with the local one.
    pub(crate) fn on_rep_phase_info(&mut self, id: InstanceId, info: &PhaseInfo) {
        let Some(instance) = self.instances.get_mut(&id) else {
            return;
        };
        if !instance.is_executing() || info.counter <= instance.phase_counter {
            return;
        }
        let Some(phase) = info.phase.clone() else {
            return;
        };
        tracing::debug!(
            target: "action::phase",
            local = instance.phase_counter,
            replicated = info.counter,
            phase = %phase,
            "local phase is behind; forcing replicated phase"
        );
        instance.phase_counter = info.counter - 1;
        self.enter_phase(id, &phase, true);
    }

    // ========================================================================
    // Behaviors
    // ========================================================================

    fn run_behaviors(&mut self, id: InstanceId, behaviors: &[PhaseBehavior]) {
        for behavior in behaviors {
            let Some(instance) = self.instances.get(&id) else {
                return;
            };
            if matches!(instance.lifecycle, Lifecycle::Inactive | Lifecycle::Ended) {
                return;
            }
            if !behavior.policy.allows(self.role()) {
                continue;
            }
            if instance.template.instancing == InstancingPolicy::NonInstanced
                && behavior.kind.requires_instance()
            {
                tracing::debug!(
                    target: "action::phase",
                    template = %instance.template.id,
                    "non-instanced action skips instance-bound behavior"
                );
                continue;
            }
            self.run_behavior(id, &behavior.kind);
        }
    }

    fn run_behavior(&mut self, id: InstanceId, kind: &BehaviorKind) {
        match kind {
            BehaviorKind::AddTags(tags) => {
                for tag in tags {
                    self.grant_instance_tag(id, tag);
                }
            }
            BehaviorKind::RemoveTags(tags) => {
                for tag in tags {
                    self.release_instance_tag(id, tag, 1);
                }
            }
            BehaviorKind::RunTask(spec) => {
                self.start_task(id, spec.clone());
            }
            BehaviorKind::ApplyEffectToSelf(effect) => {
                let target = self.entity();
                self.apply_action_effect(id, effect, target);
            }
            BehaviorKind::ApplyEffectToTarget(effect) => {
                let target = self.instances.get(&id).and_then(|i| i.payload.target());
                match target {
                    Some(target) => self.apply_action_effect(id, effect, target),
                    None => tracing::warn!(
                        target: "action::phase",
                        effect = %effect,
                        reason = names::FAIL_TARGET_INVALID,
                        "no target in payload; effect skipped"
                    ),
                }
            }
            BehaviorKind::ExecuteCue { tag, magnitude } => {
                let active = self.active_of(id);
                self.notify(Notification::CueExecuted {
                    active,
                    tag: tag.clone(),
                    magnitude: *magnitude,
                });
            }
            BehaviorKind::SpawnResource {
                kind,
                destroy_with_action,
            } => self.spawn_resource(id, kind, *destroy_with_action),
            BehaviorKind::PushViewMode(mode) => {
                let Some(instance) = self.instances.get_mut(&id) else {
                    return;
                };
                if instance.view_modes.try_push(mode.clone()).is_err() {
                    tracing::warn!(target: "action::phase", mode = %mode, "view mode stack is full");
                    return;
                }
                let active = instance.active;
                self.notify(Notification::ViewModePushed {
                    active,
                    mode: mode.clone(),
                });
            }
            BehaviorKind::PopViewMode => {
                let Some(instance) = self.instances.get_mut(&id) else {
                    return;
                };
                let active = instance.active;
                if let Some(mode) = instance.view_modes.pop() {
                    self.notify(Notification::ViewModePopped { active, mode });
                }
            }
            BehaviorKind::EndAction => self.end_action(id),
            BehaviorKind::StoreTaskResult {
                event,
                source_key,
                destination_key,
            } => {
                let Some(instance) = self.instances.get_mut(&id) else {
                    return;
                };
                let subscription = instance.task_bus.subscribe(
                    event.clone(),
                    TaskBusHandler::ResultStore {
                        source_key: source_key.clone(),
                        destination_key: destination_key.clone(),
                    },
                );
                instance.result_stores.push(subscription);
            }
            BehaviorKind::StartCooldown => {
                if let Some(spec) = self.instances.get(&id).map(|i| i.spec) {
                    self.commit_cooldown(spec);
                }
            }
            BehaviorKind::SendGameplayEvent(tag) => {
                let Some(instance) = self.instances.get(&id) else {
                    return;
                };
                let payload = instance
                    .payload
                    .clone()
                    .with_instigator(self.entity(), self.tags.explicit_tags());
                self.handle_gameplay_event(tag, &payload);
            }
        }
    }

    fn active_of(&self, id: InstanceId) -> crate::handle::ActiveActionHandle {
        self.instances
            .get(&id)
            .map_or(crate::handle::ActiveActionHandle::INVALID, |i| i.active)
    }

    /// Adds one local stack of `tag` on the owner, recorded in the instance
    /// ledger.
    pub(crate) fn grant_instance_tag(&mut self, id: InstanceId, tag: &Tag) {
        let Some(instance) = self.instances.get_mut(&id) else {
            return;
        };
        if instance.granted_tags.add_stack(tag, 1).is_some() {
            self.add_local_tag(tag, 1);
        }
    }

    /// Releases up to `count` stacks of `tag` that this instance added.
    pub(crate) fn release_instance_tag(&mut self, id: InstanceId, tag: &Tag, count: i32) {
        let Some(instance) = self.instances.get_mut(&id) else {
            return;
        };
        let held = instance.granted_tags.count(tag).min(count);
        if held <= 0 {
            tracing::trace!(target: "action::phase", tag = %tag, "tag not held by this instance");
            return;
        }
        instance.granted_tags.remove_stack(tag, held);
        self.remove_local_tag(tag, held);
    }

    fn spawn_resource(&mut self, id: InstanceId, kind: &str, destroy_with_action: bool) {
        self.next_resource += 1;
        let resource = crate::action::ResourceId(self.next_resource);
        let Some(instance) = self.instances.get_mut(&id) else {
            return;
        };
        instance.spawned.push(crate::action::SpawnedResource {
            id: resource,
            kind: kind.to_owned(),
            destroy_with_action,
        });
        let active = instance.active;
        tracing::debug!(target: "action::phase", kind, resource = resource.0, "spawned resource");
        self.notify(Notification::ResourceSpawned {
            active,
            resource,
            kind: kind.to_owned(),
        });
    }

    // ========================================================================
    // Termination
    // ========================================================================

    /// Ends an execution normally. Idempotent.
    pub(crate) fn end_action(&mut self, id: InstanceId) {
        self.end_instance(id, false);
    }

    /// Ends an execution as cancelled. Idempotent.
    pub(crate) fn cancel_action(&mut self, id: InstanceId) {
        self.end_instance(id, true);
    }

    /// Tears an execution down: phase exit, tasks, ledger, then the
    /// registry's end bookkeeping.
    ///
    /// A predicted instance being rehomed still runs its phase exit, but
    /// skips the bookkeeping; the authoritative instance owns it from here.
    pub(crate) fn end_instance(&mut self, id: InstanceId, cancelled: bool) {
        let Some(instance) = self.instances.get_mut(&id) else {
            return;
        };
        if instance.lifecycle != Lifecycle::Executing {
            tracing::trace!(target: "action::phase", instance = id.0, "instance is not executing");
            return;
        }

        if instance.being_rehomed {
            // Tasks, ledger and payload already moved to the authoritative
            // instance; whatever the exit itself starts is released below.
            instance.lifecycle = Lifecycle::Ending;
            self.exit_phase(id);
            let Some(instance) = self.instances.get_mut(&id) else {
                return;
            };
            instance.task_bus.clear();
            instance.phase = None;
            instance.lifecycle = Lifecycle::Ended;
            let tasks = std::mem::take(&mut instance.tasks);
            let ledger = std::mem::take(&mut instance.granted_tags);
            for task in tasks {
                self.end_task(task, true);
            }
            for (tag, count) in ledger.iter() {
                self.remove_local_tag(tag, count);
            }
            tracing::debug!(target: "action::prediction", instance = id.0, "retired predicted instance");
            return;
        }

        instance.lifecycle = Lifecycle::Ending;
        instance.cancelled = cancelled;
        tracing::debug!(
            target: "action::phase",
            template = %instance.template.id,
            active = %instance.active,
            cancelled,
            "ending action"
        );

        self.exit_phase(id);

        let Some(instance) = self.instances.get_mut(&id) else {
            return;
        };
        instance.active_rules.clear();
        instance.movement_watch = None;
        instance.result_stores.clear();
        instance.task_bus.clear();
        let tasks = std::mem::take(&mut instance.tasks);
        for task in tasks {
            self.end_task(task, cancelled);
        }

        let Some(instance) = self.instances.get_mut(&id) else {
            return;
        };
        instance.payload.clear();
        instance.phase = None;
        let active = instance.active;
        let spawned = std::mem::take(&mut instance.spawned);
        let mut modes = Vec::new();
        while let Some(mode) = instance.view_modes.pop() {
            modes.push(mode);
        }
        let ledger = std::mem::take(&mut instance.granted_tags);

        for resource in spawned.into_iter().filter(|r| r.destroy_with_action) {
            self.notify(Notification::ResourceDestroyed {
                active,
                resource: resource.id,
            });
        }
        for mode in modes {
            self.notify(Notification::ViewModePopped { active, mode });
        }
        for (tag, count) in ledger.iter() {
            self.remove_local_tag(tag, count);
        }

        if let Some(instance) = self.instances.get_mut(&id) {
            instance.lifecycle = Lifecycle::Ended;
        }
        self.on_instance_ended(id, cancelled);
    }

    /// Applies an action-sourced effect to `target`, locally or via the world.
    pub(crate) fn apply_action_effect(
        &mut self,
        id: InstanceId,
        effect: &crate::effect::EffectTemplateId,
        target: EntityId,
    ) {
        if !self.role().is_authority() {
            return;
        }
        let Some(spec) = self.instances.get(&id).map(|i| i.spec) else {
            return;
        };
        let mut outgoing = match self.make_action_effect_spec(spec, effect) {
            Ok(outgoing) => outgoing,
            Err(err) => {
                tracing::error!(target: "action::effect", effect = %effect, error = %err, "cannot build effect spec");
                return;
            }
        };
        outgoing.context.target = Some(target);
        if target == self.entity() {
            if let Err(err) = self.apply_effect_spec(outgoing) {
                tracing::debug!(target: "action::effect", effect = %effect, error = %err, "effect not applied");
            }
        } else {
            self.outbox.push(crate::system::WorldRequest::ApplyEffect {
                target,
                spec: outgoing,
            });
        }
    }
}
