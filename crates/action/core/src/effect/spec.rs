use std::collections::BTreeMap;
use std::sync::Arc;

use crate::action::LevelData;
use crate::attribute::{Attribute, AttributeStore};
use crate::handle::{ActionSpecHandle, EntityId};
use crate::tag::{Tag, TagSet};

use super::{EffectTemplate, EffectTemplateId, ModifierOp, ModifierTemplate, ScalableFloat};

/// Who applied an effect and from where.
///
/// The identity fields double as the stacking key: two applications of the
/// same template stack only when all four match.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EffectContext {
    pub instigator: Option<EntityId>,
    pub causer: Option<EntityId>,
    pub source: Option<EntityId>,
    pub target: Option<EntityId>,
    /// Spec of the action that produced this effect, if any.
    pub action: Option<ActionSpecHandle>,
    pub capture: SourceCapture,
}

impl EffectContext {
    pub fn from_source(source: EntityId) -> Self {
        Self {
            instigator: Some(source),
            causer: Some(source),
            source: Some(source),
            ..Self::default()
        }
    }

    pub fn same_identity(&self, other: &EffectContext) -> bool {
        self.instigator == other.instigator
            && self.causer == other.causer
            && self.source == other.source
            && self.target == other.target
    }
}

/// Source-side data captured when the spec is made.
///
/// Executions run on the target, so anything they need from the source
/// (attributes, the originating action's level row) travels with the spec.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SourceCapture {
    pub attributes: BTreeMap<Attribute, f32>,
    pub level_data: Option<LevelData>,
    pub cooldown_tag: Option<Tag>,
}

impl SourceCapture {
    pub fn from_store(store: &AttributeStore) -> Self {
        Self {
            attributes: store
                .snapshot()
                .into_iter()
                .map(|(attribute, data)| (attribute, data.current))
                .collect(),
            ..Self::default()
        }
    }

    pub fn attribute(&self, attribute: Attribute) -> Option<f32> {
        self.attributes.get(&attribute).copied()
    }
}

/// A request to mutate a target, resolved from an [`EffectTemplate`].
#[derive(Clone, Debug)]
pub struct EffectSpec {
    pub template: Arc<EffectTemplate>,
    pub level: u32,
    pub context: EffectContext,
    /// Per-application copy of the template modifiers.
    pub modifiers: Vec<ModifierTemplate>,
    pub duration: ScalableFloat,
    pub period: ScalableFloat,
    set_by_caller: BTreeMap<Tag, f32>,
    pub effect_tags: TagSet,
    pub granted_tags: TagSet,
    pub application_required_tags: TagSet,
    pub application_blocked_tags: TagSet,
}

/// A modifier with its magnitude resolved.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolvedModifier {
    pub attribute: Attribute,
    pub op: ModifierOp,
    pub magnitude: f32,
}

impl EffectSpec {
    /// Builds an outgoing spec from a template.
    ///
    /// Set-by-caller placeholders stay unresolved (reading as zero) until a
    /// caller or execution fills them in.
    pub fn make_outgoing(template: Arc<EffectTemplate>, level: u32, context: EffectContext) -> Self {
        Self {
            modifiers: template.modifiers.clone(),
            duration: template.duration.clone(),
            period: template.period.clone(),
            set_by_caller: BTreeMap::new(),
            effect_tags: template.effect_tags.clone(),
            granted_tags: template.granted_tags.clone(),
            application_required_tags: template.application_required_tags.clone(),
            application_blocked_tags: template.application_blocked_tags.clone(),
            template,
            level,
            context,
        }
    }

    pub fn template_id(&self) -> &EffectTemplateId {
        &self.template.id
    }

    pub fn set_by_caller_magnitude(&mut self, tag: Tag, value: f32) {
        self.set_by_caller.insert(tag, value);
    }

    /// Reads a set-by-caller value, falling back to `default`.
    pub fn get_set_by_caller_magnitude(&self, tag: &Tag, warn_if_missing: bool, default: f32) -> f32 {
        match self.set_by_caller.get(tag) {
            Some(value) => *value,
            None => {
                if warn_if_missing {
                    tracing::warn!(
                        target: "action::effect",
                        effect = %self.template.id,
                        tag = %tag,
                        "set-by-caller magnitude requested but never set"
                    );
                }
                default
            }
        }
    }

    pub fn resolve(&self, value: &ScalableFloat) -> f32 {
        match value {
            ScalableFloat::Static(v) => *v,
            ScalableFloat::SetByCaller(tag) => self.get_set_by_caller_magnitude(tag, false, 0.0),
        }
    }

    pub fn calculated_duration(&self) -> f32 {
        self.resolve(&self.duration)
    }

    pub fn calculated_period(&self) -> f32 {
        self.resolve(&self.period)
    }

    pub fn resolved_modifiers(&self) -> Vec<ResolvedModifier> {
        self.modifiers
            .iter()
            .map(|m| ResolvedModifier {
                attribute: m.attribute,
                op: m.op,
                magnitude: self.resolve(&m.magnitude),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::names;

    #[test]
    fn set_by_caller_resolves_lazily() {
        let template = Arc::new(
            EffectTemplate::timed(
                "CD",
                ScalableFloat::SetByCaller(names::tag(names::SET_BY_CALLER_DURATION)),
            )
            .modifier(
                Attribute::Mana,
                ModifierOp::Add,
                ScalableFloat::SetByCaller(names::tag(names::SET_BY_CALLER_COST)),
            ),
        );
        let mut spec = EffectSpec::make_outgoing(template, 1, EffectContext::default());
        assert_eq!(spec.calculated_duration(), 0.0);

        spec.set_by_caller_magnitude(names::tag(names::SET_BY_CALLER_DURATION), 4.0);
        spec.set_by_caller_magnitude(names::tag(names::SET_BY_CALLER_COST), -30.0);
        assert_eq!(spec.calculated_duration(), 4.0);
        assert_eq!(spec.resolved_modifiers()[0].magnitude, -30.0);
        assert_eq!(
            spec.get_set_by_caller_magnitude(&Tag::new("Effect.SetByCaller.Missing"), false, 7.0),
            7.0
        );
    }

    #[test]
    fn context_identity_ignores_capture() {
        let a = EffectContext::from_source(EntityId(1));
        let mut b = a.clone();
        b.capture.cooldown_tag = Some(Tag::new("Action.Cooldown.Q"));
        assert!(a.same_identity(&b));
        b.target = Some(EntityId(2));
        assert!(!a.same_identity(&b));
    }
}
