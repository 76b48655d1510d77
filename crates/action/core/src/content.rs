//! Read-only template library shared by every world.
//!
//! Templates are authored once (in code or by `action-content` loaders) and
//! handed out as `Arc`s, so a world, its systems, and every instance share a
//! single copy. The library itself is cheap to clone.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::action::{ActionTemplate, ActionTemplateId};
use crate::effect::{EffectTemplate, EffectTemplateId};
use crate::error::{CoreError, ErrorSeverity};
use crate::phase::BehaviorKind;
use crate::tag::{Tag, TagRelationshipMapping};

/// Inconsistent template data found by [`ContentLibrary::validate`].
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ContentError {
    #[error("action '{action}' declares no phases")]
    NoPhases { action: ActionTemplateId },

    #[error("action '{action}' declares phase {phase} twice")]
    DuplicatePhase { action: ActionTemplateId, phase: Tag },

    #[error("action '{action}' references unknown effect '{effect}'")]
    UnknownEffect {
        action: ActionTemplateId,
        effect: EffectTemplateId,
    },
}

impl CoreError for ContentError {
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Internal
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::NoPhases { .. } => "CONTENT_NO_PHASES",
            Self::DuplicatePhase { .. } => "CONTENT_DUPLICATE_PHASE",
            Self::UnknownEffect { .. } => "CONTENT_UNKNOWN_EFFECT",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ContentLibrary {
    actions: Arc<BTreeMap<ActionTemplateId, Arc<ActionTemplate>>>,
    effects: Arc<BTreeMap<EffectTemplateId, Arc<EffectTemplate>>>,
    mapping: Arc<TagRelationshipMapping>,
}

impl ContentLibrary {
    pub fn builder() -> ContentLibraryBuilder {
        ContentLibraryBuilder::default()
    }

    pub fn action(&self, id: &ActionTemplateId) -> Option<Arc<ActionTemplate>> {
        self.actions.get(id).cloned()
    }

    pub fn effect(&self, id: &EffectTemplateId) -> Option<Arc<EffectTemplate>> {
        self.effects.get(id).cloned()
    }

    pub fn mapping(&self) -> Arc<TagRelationshipMapping> {
        Arc::clone(&self.mapping)
    }

    pub fn actions(&self) -> impl Iterator<Item = &ActionTemplate> {
        self.actions.values().map(|t| t.as_ref())
    }

    pub fn effects(&self) -> impl Iterator<Item = &EffectTemplate> {
        self.effects.values().map(|t| t.as_ref())
    }

    /// Cross-checks templates: every action has distinct phases and every
    /// referenced effect is registered.
    ///
    /// Transitions to undeclared phases are not errors; entering one ends the
    /// action at runtime.
    pub fn validate(&self) -> Result<(), Vec<ContentError>> {
        let mut errors = Vec::new();
        for action in self.actions.values() {
            if action.phases.is_empty() {
                errors.push(ContentError::NoPhases {
                    action: action.id.clone(),
                });
            }
            for (index, phase) in action.phases.iter().enumerate() {
                if action.phases[..index]
                    .iter()
                    .any(|earlier| earlier.phase_tag == phase.phase_tag)
                {
                    errors.push(ContentError::DuplicatePhase {
                        action: action.id.clone(),
                        phase: phase.phase_tag.clone(),
                    });
                }
            }
            for effect in referenced_effects(action) {
                if !self.effects.contains_key(effect) {
                    errors.push(ContentError::UnknownEffect {
                        action: action.id.clone(),
                        effect: effect.clone(),
                    });
                }
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

fn referenced_effects(action: &ActionTemplate) -> impl Iterator<Item = &EffectTemplateId> {
    let behaviors = action
        .phases
        .iter()
        .flat_map(|phase| phase.on_enter.iter().chain(&phase.on_exit))
        .filter_map(|behavior| match &behavior.kind {
            BehaviorKind::ApplyEffectToSelf(effect) | BehaviorKind::ApplyEffectToTarget(effect) => {
                Some(effect)
            }
            _ => None,
        });
    action
        .cost_effect
        .iter()
        .chain(action.cooldown_effect.iter())
        .chain(behaviors)
}

#[derive(Debug, Default)]
pub struct ContentLibraryBuilder {
    actions: BTreeMap<ActionTemplateId, Arc<ActionTemplate>>,
    effects: BTreeMap<EffectTemplateId, Arc<EffectTemplate>>,
    mapping: TagRelationshipMapping,
}

impl ContentLibraryBuilder {
    /// Registers an action template; a later template with the same id wins.
    #[must_use]
    pub fn action(mut self, template: ActionTemplate) -> Self {
        self.actions.insert(template.id.clone(), Arc::new(template));
        self
    }

    #[must_use]
    pub fn effect(mut self, template: EffectTemplate) -> Self {
        self.effects.insert(template.id.clone(), Arc::new(template));
        self
    }

    #[must_use]
    pub fn mapping(mut self, mapping: TagRelationshipMapping) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn build(self) -> ContentLibrary {
        ContentLibrary {
            actions: Arc::new(self.actions),
            effects: Arc::new(self.effects),
            mapping: Arc::new(self.mapping),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::{PhaseBehavior, PhaseData};

    #[test]
    fn lookups_share_one_copy() {
        let library = ContentLibrary::builder()
            .action(ActionTemplate::new("Q").phase_data(PhaseData::new("Phase.Action.Cast")))
            .build();
        let copy = library.clone();
        let a = library.action(&ActionTemplateId::new("Q")).unwrap();
        let b = copy.action(&ActionTemplateId::new("Q")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(library.action(&ActionTemplateId::new("W")).is_none());
    }

    #[test]
    fn validation_reports_every_problem() {
        let mut costly = ActionTemplate::new("Costly")
            .phase_data(
                PhaseData::new("Phase.Action.Cast").on_enter(PhaseBehavior::all(
                    BehaviorKind::ApplyEffectToTarget(EffectTemplateId::new("Burn")),
                )),
            )
            .phase_data(PhaseData::new("Phase.Action.Cast"));
        costly.cost_effect = Some(EffectTemplateId::new("ManaCost"));
        let library = ContentLibrary::builder()
            .action(costly)
            .action(ActionTemplate::new("Empty"))
            .effect(EffectTemplate::instant("ManaCost"))
            .build();

        let errors = library.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ContentError::NoPhases {
            action: ActionTemplateId::new("Empty")
        }));
        assert!(errors.contains(&ContentError::UnknownEffect {
            action: ActionTemplateId::new("Costly"),
            effect: EffectTemplateId::new("Burn"),
        }));
    }
}
