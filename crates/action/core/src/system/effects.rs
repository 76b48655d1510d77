//! Effect application pipeline, removal, periodic ticks, and cooldown
//! adjustment. Everything here mutates replicated state and is authority-only.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::attribute::{Attribute, EffectModCallback};
use crate::effect::{
    ActiveEffect, DurationPolicy, EffectContext, EffectError, EffectSpec, EffectTemplateId,
    ExecutionContext, ModifierOp, SourceCapture, StackingPolicy,
};
use crate::handle::{ActionSpecHandle, ActiveEffectHandle};
use crate::tag::{Tag, TagSet};
use crate::timer::TimerEvent;

use super::{ActionSystem, Notification};

impl ActionSystem {
    // ========================================================================
    // Spec construction
    // ========================================================================

    /// Builds an outgoing spec sourced from this entity.
    pub fn make_outgoing_spec(&self, effect: &EffectTemplateId, level: u32) -> Result<EffectSpec, EffectError> {
        let template = self
            .content
            .effect(effect)
            .ok_or_else(|| EffectError::UnknownTemplate(effect.clone()))?;
        let mut context = EffectContext::from_source(self.entity());
        context.capture = SourceCapture::from_store(&self.attributes);
        Ok(EffectSpec::make_outgoing(template, level, context))
    }

    /// Outgoing spec for an action-sourced effect: captures the action's level
    /// row and cooldown tag alongside the source attributes.
    pub(crate) fn make_action_effect_spec(
        &self,
        handle: ActionSpecHandle,
        effect: &EffectTemplateId,
    ) -> Result<EffectSpec, EffectError> {
        let spec = self.find_spec(handle);
        let mut outgoing = self.make_outgoing_spec(effect, spec.map_or(1, |s| s.level))?;
        outgoing.context.target = Some(self.entity());
        outgoing.context.action = Some(handle);
        if let Some(spec) = spec {
            outgoing.context.capture.level_data = self
                .template_of(spec)
                .and_then(|template| template.level_data(spec.level));
            outgoing.context.capture.cooldown_tag = Some(spec.cooldown_tag());
        }
        Ok(outgoing)
    }

    /// Applies an effect template sourced from and targeting this entity.
    pub fn apply_effect_to_self(
        &mut self,
        effect: &EffectTemplateId,
        level: u32,
    ) -> Result<Option<ActiveEffectHandle>, EffectError> {
        let mut spec = self.make_outgoing_spec(effect, level)?;
        spec.context.target = Some(self.entity());
        self.apply_effect_spec(spec)
    }

    // ========================================================================
    // Application
    // ========================================================================

    /// Applies a spec to this entity.
    ///
    /// Returns the active handle for retained effects and `None` for instant
    /// ones. Every refusal happens before any state is touched.
    pub fn apply_effect_spec(&mut self, mut spec: EffectSpec) -> Result<Option<ActiveEffectHandle>, EffectError> {
        if !self.role().is_authority() {
            return Err(EffectError::NotAuthority);
        }
        let template = Arc::clone(&spec.template);

        let missing: TagSet = spec
            .application_required_tags
            .iter()
            .filter(|tag| !self.tags.has_tag(tag))
            .cloned()
            .collect();
        if !missing.is_empty() {
            tracing::debug!(target: "action::effect", effect = %template.id, "application tags missing");
            return Err(EffectError::TagsMissing { missing });
        }
        let blocking: TagSet = spec
            .application_blocked_tags
            .iter()
            .filter(|tag| self.tags.has_tag(tag))
            .cloned()
            .collect();
        if !blocking.is_empty() {
            tracing::debug!(target: "action::effect", effect = %template.id, "application blocked");
            return Err(EffectError::TagsBlocked { blocking });
        }

        self.effect_nonce += 1;
        {
            let ctx = ExecutionContext {
                target: &self.attributes,
                target_entity: self.entity().0,
                rng: &self.rng,
                world_seed: self.config.world_seed,
                nonce: self.effect_nonce,
                min_cooldown: self.config.min_cooldown,
            };
            for execution in &template.executions {
                execution.execute(&mut spec, &ctx)?;
            }
        }

        if !self.attributes.pre_effect_execute(&spec) {
            tracing::debug!(target: "action::effect", effect = %template.id, "vetoed by attribute set");
            return Err(EffectError::Vetoed(template.id.clone()));
        }

        if !template.remove_effects_with_tags.is_empty() {
            self.remove_effects_with_tags(&template.remove_effects_with_tags);
        }
        self.cancel_actions(&template.cancel_actions_with_tags, &TagSet::new());

        if template.is_instant() {
            tracing::debug!(
                target: "action::effect",
                entity = %self.entity(),
                effect = %template.id,
                "instant effect executed"
            );
            self.execute_instant(&spec);
            return Ok(None);
        }
        Ok(Some(self.add_or_stack(spec)))
    }

    /// Writes an instant spec's modifiers into base values.
    fn execute_instant(&mut self, spec: &EffectSpec) {
        for modifier in spec.resolved_modifiers() {
            let Some(base) = self.attributes.base(modifier.attribute) else {
                continue;
            };
            let value = apply_op(base, modifier.op, modifier.magnitude);
            self.write_base(modifier.attribute, value, modifier.op, modifier.magnitude);
        }
    }

    /// Base write followed by re-aggregation and the set's post-execute hook.
    fn write_base(&mut self, attribute: Attribute, value: f32, op: ModifierOp, magnitude: f32) {
        let Some((old_base, new_base)) = self.attributes.set_base(attribute, value) else {
            return;
        };
        self.recalculate(attribute);
        self.attributes.post_effect_execute(&EffectModCallback {
            attribute,
            op,
            magnitude,
            old_base,
            new_base,
        });
    }

    /// Adds `delta` straight to a base value (additional costs).
    pub(crate) fn apply_base_delta(&mut self, attribute: Attribute, delta: f32) {
        if let Some(base) = self.attributes.base(attribute) {
            self.write_base(attribute, base + delta, ModifierOp::Add, delta);
        }
    }

    /// Re-aggregates `attribute` from its base and active modifiers.
    pub(crate) fn recalculate(&mut self, attribute: Attribute) {
        let Some(base) = self.attributes.base(attribute) else {
            return;
        };
        let value = self.effects.aggregate(attribute, base);
        if let Some((old, new)) = self.attributes.set_current(attribute, value)
            && old != new
        {
            self.notify(Notification::AttributeChanged { attribute, old, new });
        }
    }

    fn recalculate_for(&mut self, spec: &EffectSpec) {
        let attributes: BTreeSet<Attribute> = spec.modifiers.iter().map(|m| m.attribute).collect();
        for attribute in attributes {
            self.recalculate(attribute);
        }
    }

    fn add_or_stack(&mut self, spec: EffectSpec) -> ActiveEffectHandle {
        if spec.template.stacking != StackingPolicy::None
            && let Some(existing) = self.effects.find_stackable(&spec)
        {
            self.stack_onto(existing, &spec);
            return existing;
        }

        let now = self.now;
        let handle = ActiveEffectHandle::generate();
        let has_duration = spec.template.duration_policy == DurationPolicy::HasDuration;
        let duration = if has_duration {
            spec.calculated_duration().max(0.0)
        } else {
            0.0
        };
        let period = spec.calculated_period().max(0.0);
        let mut effect = ActiveEffect {
            handle,
            start_time: now,
            end_time: has_duration.then_some(now + duration),
            duration,
            period,
            stacks: 1,
            expiry_timer: None,
            period_timer: None,
            spec,
        };
        if has_duration {
            effect.expiry_timer = Some(self.timers.schedule(now + duration, TimerEvent::EffectExpired(handle)));
        }
        if period > 0.0 {
            effect.period_timer = Some(self.timers.schedule(now + period, TimerEvent::EffectPeriod(handle)));
        }

        let granted = effect.spec.granted_tags.clone();
        let template = effect.spec.template.id.clone();
        let cooldown = self.cooldowns.on_effect_changed(&effect);
        let periodic = effect.is_periodic();
        let recalc = effect.spec.clone();
        self.effects.insert(effect);

        for tag in &granted {
            self.add_tag(tag, 1);
        }
        tracing::debug!(
            target: "action::effect",
            entity = %self.entity(),
            effect = %template,
            handle = %handle,
            duration,
            period,
            "effect applied"
        );
        self.notify(Notification::EffectApplied {
            handle,
            template,
            stacks: 1,
        });
        if let Some(change) = cooldown {
            self.notify(change.into());
        }
        if !periodic {
            self.recalculate_for(&recalc);
        }
        handle
    }

    fn stack_onto(&mut self, handle: ActiveEffectHandle, spec: &EffectSpec) {
        let now = self.now;
        let limit = spec.template.stack_limit();
        let replace = spec.template.stacking == StackingPolicy::Replace;
        let Some(effect) = self.effects.get_mut(handle) else {
            return;
        };
        if effect.stacks < limit {
            effect.stacks += 1;
        }
        if replace {
            if effect.end_time.is_some() {
                effect.duration = spec.calculated_duration().max(0.0);
                effect.start_time = now;
                let end = now + effect.duration;
                effect.end_time = Some(end);
                let retimed = effect.expiry_timer.is_some_and(|timer| self.timers.retime(timer, end));
                if !retimed {
                    effect.expiry_timer = Some(self.timers.schedule(end, TimerEvent::EffectExpired(handle)));
                }
            }
            if effect.period > 0.0 {
                if let Some(timer) = effect.period_timer.take() {
                    self.timers.cancel(timer);
                }
                effect.period_timer = Some(self.timers.schedule(now + effect.period, TimerEvent::EffectPeriod(handle)));
            }
        }
        let stacks = effect.stacks;
        let end_time = effect.end_time;
        let periodic = effect.is_periodic();
        let recalc = effect.spec.clone();
        let cooldown = self
            .effects
            .get(handle)
            .and_then(|effect| self.cooldowns.on_effect_changed(effect));

        tracing::debug!(
            target: "action::effect",
            effect = %spec.template.id,
            handle = %handle,
            stacks,
            "effect stacked"
        );
        self.notify(Notification::EffectUpdated {
            handle,
            stacks,
            end_time,
        });
        if let Some(change) = cooldown {
            self.notify(change.into());
        }
        if !periodic {
            self.recalculate_for(&recalc);
        }
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Removes one active effect. Returns `false` if it was already gone.
    pub fn remove_effect(&mut self, handle: ActiveEffectHandle) -> bool {
        let Some(mut effect) = self.effects.remove(handle) else {
            return false;
        };
        tracing::debug!(
            target: "action::effect",
            entity = %self.entity(),
            effect = %effect.spec.template.id,
            handle = %handle,
            "effect removed"
        );
        self.notify(Notification::EffectRemoved {
            handle,
            template: effect.spec.template.id.clone(),
        });
        for tag in &effect.spec.granted_tags {
            self.remove_tag(tag, 1);
        }
        if let Some(timer) = effect.expiry_timer.take() {
            self.timers.cancel(timer);
        }
        if let Some(timer) = effect.period_timer.take() {
            self.timers.cancel(timer);
        }
        if let Some(change) = self.cooldowns.on_effect_removed(handle) {
            self.notify(change.into());
        }
        if !effect.is_periodic() {
            self.recalculate_for(&effect.spec);
        }
        true
    }

    /// Removes every effect whose effect or granted tags match any of `tags`.
    pub fn remove_effects_with_tags(&mut self, tags: &TagSet) -> usize {
        let handles = self.effects.handles_with_tags(tags);
        handles.into_iter().filter(|h| self.remove_effect(*h)).count()
    }

    pub fn remove_all_effects(&mut self) {
        for handle in self.effects.handles() {
            self.remove_effect(handle);
        }
    }

    pub(crate) fn on_effect_expired(&mut self, handle: ActiveEffectHandle) {
        if let Some(effect) = self.effects.get_mut(handle) {
            effect.expiry_timer = None;
            tracing::trace!(target: "action::effect", handle = %handle, "effect expired");
            self.remove_effect(handle);
        }
    }

    /// Applies each modifier to base values, scaled by stacks, then re-arms.
    pub(crate) fn on_periodic_tick(&mut self, handle: ActiveEffectHandle) {
        let Some(effect) = self.effects.get_mut(handle) else {
            return;
        };
        effect.period_timer = None;
        let stacks = effect.stacks;
        let period = effect.period;
        let modifiers = effect.spec.resolved_modifiers();

        for modifier in modifiers {
            let Some(base) = self.attributes.base(modifier.attribute) else {
                continue;
            };
            let magnitude = match modifier.op {
                ModifierOp::Multiply => modifier.magnitude.powi(stacks as i32),
                _ => modifier.magnitude * stacks as f32,
            };
            let value = apply_op(base, modifier.op, magnitude);
            self.write_base(modifier.attribute, value, modifier.op, magnitude);
        }

        let now = self.now;
        if period > 0.0
            && let Some(effect) = self.effects.get_mut(handle)
        {
            effect.period_timer = Some(self.timers.schedule(now + period, TimerEvent::EffectPeriod(handle)));
        }
    }

    // ========================================================================
    // Cooldown adjustment
    // ========================================================================

    /// Retimes the cooldown effect granting `tag` so `new_remaining` seconds
    /// are left. Zero or less expires it at once.
    pub fn adjust_cooldown_timer_by_tag(&mut self, tag: &Tag, new_remaining: f32) -> bool {
        if !self.role().is_authority() {
            return false;
        }
        let Some(handle) = self.effects.find_by_granted_tag(tag) else {
            return false;
        };
        if new_remaining <= 0.0 {
            tracing::debug!(target: "action::cooldown", tag = %tag, "cooldown finished early");
            return self.remove_effect(handle);
        }

        let end = self.now + new_remaining;
        let Some(effect) = self.effects.get_mut(handle) else {
            return false;
        };
        effect.end_time = Some(end);
        let retimed = effect.expiry_timer.is_some_and(|timer| self.timers.retime(timer, end));
        if !retimed {
            effect.expiry_timer = Some(self.timers.schedule(end, TimerEvent::EffectExpired(handle)));
        }
        let stacks = effect.stacks;
        let cooldown = self
            .effects
            .get(handle)
            .and_then(|effect| self.cooldowns.on_effect_changed(effect));

        tracing::debug!(target: "action::cooldown", tag = %tag, remaining = new_remaining, "cooldown retimed");
        self.notify(Notification::EffectUpdated {
            handle,
            stacks,
            end_time: Some(end),
        });
        if let Some(change) = cooldown {
            self.notify(change.into());
        }
        true
    }

    /// Shortens a running cooldown by `seconds`. Authority only.
    pub fn reduce_cooldown(&mut self, tag: &Tag, seconds: f32) -> bool {
        if !self.role().is_authority() {
            return false;
        }
        match self.cooldowns.reduced_remaining(tag, seconds, self.now) {
            Some(remaining) => self.adjust_cooldown_timer_by_tag(tag, remaining),
            None => false,
        }
    }

    /// Shortens a running cooldown by a percentage of its full duration.
    pub fn reduce_cooldown_by_percent(&mut self, tag: &Tag, percent: f32) -> bool {
        if !self.role().is_authority() {
            return false;
        }
        match self.cooldowns.reduced_remaining_by_percent(tag, percent, self.now) {
            Some(remaining) => self.adjust_cooldown_timer_by_tag(tag, remaining),
            None => false,
        }
    }
}

fn apply_op(base: f32, op: ModifierOp, magnitude: f32) -> f32 {
    match op {
        ModifierOp::Add => base + magnitude,
        ModifierOp::Multiply => base * magnitude,
        ModifierOp::Override => magnitude,
    }
}

#[cfg(test)]
mod tests {
    use crate::attribute::Attribute;
    use crate::content::ContentLibrary;
    use crate::effect::{EffectError, EffectTemplate, EffectTemplateId, ModifierOp, ScalableFloat, StackingPolicy};
    use crate::system::{NetRole, Notification};
    use crate::tag::{Tag, names};
    use crate::test_utils::bare_system;

    fn run_until(system: &mut crate::system::ActionSystem, until: f32) {
        while system.fire_next_timer(until) {}
        system.set_now(until);
    }

    #[test]
    fn instant_effect_writes_base_and_notifies() {
        let content = ContentLibrary::builder()
            .effect(EffectTemplate::instant("Hit").modifier(Attribute::Health, ModifierOp::Add, ScalableFloat::Static(-30.0)))
            .build();
        let mut system = bare_system(content, NetRole::Authority);

        let handle = system.apply_effect_to_self(&EffectTemplateId::new("Hit"), 1).unwrap();
        assert!(handle.is_none());
        assert_eq!(system.attributes().base(Attribute::Health), Some(70.0));
        assert_eq!(system.attributes().current(Attribute::Health), Some(70.0));
        assert!(system.drain_notifications().iter().any(|n| matches!(
            n,
            Notification::AttributeChanged { attribute: Attribute::Health, new, .. } if *new == 70.0
        )));
    }

    #[test]
    fn timed_modifier_aggregates_until_expiry() {
        let content = ContentLibrary::builder()
            .effect(
                EffectTemplate::timed("Haste", ScalableFloat::Static(2.0))
                    .modifier(Attribute::MoveSpeed, ModifierOp::Multiply, ScalableFloat::Static(1.5))
                    .granted_tag("State.Buff.Haste"),
            )
            .build();
        let mut system = bare_system(content, NetRole::Authority);
        let base = system.attributes().base(Attribute::MoveSpeed).unwrap();

        system.apply_effect_to_self(&EffectTemplateId::new("Haste"), 1).unwrap();
        assert_eq!(system.attributes().current(Attribute::MoveSpeed), Some(base * 1.5));
        assert!(system.has_tag(&Tag::new("State.Buff")));

        run_until(&mut system, 2.0);
        assert!(system.effects().is_empty());
        assert!(!system.has_tag(&Tag::new("State.Buff")));
        assert_eq!(system.attributes().current(Attribute::MoveSpeed), Some(base));
    }

    #[test]
    fn replace_stacking_caps_and_refreshes() {
        let content = ContentLibrary::builder()
            .effect(
                EffectTemplate::timed("Bleed", ScalableFloat::Static(4.0))
                    .modifier(Attribute::Armor, ModifierOp::Add, ScalableFloat::Static(-5.0))
                    .stacking(StackingPolicy::Replace, 3),
            )
            .build();
        let mut system = bare_system(content, NetRole::Authority);
        let id = EffectTemplateId::new("Bleed");

        let first = system.apply_effect_to_self(&id, 1).unwrap();
        for step in 1..5 {
            run_until(&mut system, step as f32);
            assert_eq!(system.apply_effect_to_self(&id, 1).unwrap(), first);
        }
        let effect = system.effects().get(first.unwrap()).unwrap();
        assert_eq!(effect.stacks, 3);
        assert_eq!(effect.end_time, Some(8.0));
        assert_eq!(system.effects().len(), 1);
    }

    #[test]
    fn application_tags_are_checked_first() {
        let mut template = EffectTemplate::instant("Heal")
            .modifier(Attribute::Health, ModifierOp::Add, ScalableFloat::Static(10.0));
        template.application_blocked_tags = ["State.Debuff.Grievous"].into_iter().collect();
        let content = ContentLibrary::builder().effect(template).build();
        let mut system = bare_system(content, NetRole::Authority);
        system.add_tag(&Tag::new("State.Debuff.Grievous"), 1);

        let err = system.apply_effect_to_self(&EffectTemplateId::new("Heal"), 1).unwrap_err();
        assert!(matches!(err, EffectError::TagsBlocked { .. }));
    }

    #[test]
    fn periodic_ticks_scale_with_stacks() {
        let content = ContentLibrary::builder()
            .effect(
                EffectTemplate::timed("Burn", ScalableFloat::Static(10.0))
                    .period(1.0)
                    .modifier(Attribute::Health, ModifierOp::Add, ScalableFloat::Static(-5.0))
                    .stacking(StackingPolicy::Aggregate, 2),
            )
            .build();
        let mut system = bare_system(content, NetRole::Authority);
        let id = EffectTemplateId::new("Burn");
        system.apply_effect_to_self(&id, 1).unwrap();
        system.apply_effect_to_self(&id, 1).unwrap();

        run_until(&mut system, 2.5);
        assert_eq!(system.attributes().base(Attribute::Health), Some(80.0));
    }

    #[test]
    fn cooldown_reduction_retimes_and_expires() {
        let content = ContentLibrary::builder()
            .effect(
                EffectTemplate::timed("Cooldown.Q", ScalableFloat::Static(10.0))
                    .effect_tag(names::EFFECT_TYPE_COOLDOWN)
                    .granted_tag("Action.Cooldown.Q"),
            )
            .build();
        let mut system = bare_system(content, NetRole::Authority);
        system.apply_effect_to_self(&EffectTemplateId::new("Cooldown.Q"), 1).unwrap();
        let tag = Tag::new("Action.Cooldown.Q");
        assert_eq!(system.cooldown_time_remaining(&tag), 10.0);

        assert!(system.reduce_cooldown_by_percent(&tag, 50.0));
        assert_eq!(system.cooldown_time_remaining(&tag), 5.0);
        assert!(system.reduce_cooldown(&tag, 2.0));
        assert_eq!(system.cooldown_time_remaining(&tag), 3.0);

        assert!(system.reduce_cooldown(&tag, 30.0));
        assert!(system.cooldowns().is_empty());
        assert!(!system.has_tag(&tag));
    }
}
