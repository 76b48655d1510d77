//! Execution calculators.
//!
//! Executions run against an outgoing spec on the target side, before any
//! attribute is touched. They may fill set-by-caller magnitudes, add
//! modifiers, and decorate the spec's tags.

use crate::attribute::{Attribute, AttributeStore};
use crate::rng::{RngOracle, compute_seed};
use crate::tag::{Tag, names};

use super::{EffectError, EffectSpec, ModifierOp, ModifierTemplate, ScalableFloat};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Default, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DamageKind {
    #[default]
    Physical,
    Magical,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Execution {
    /// Mitigated, possibly critical damage written to
    /// `Effect.SetByCaller.Magnitude` as a negative value.
    Damage { kind: DamageKind, base: f32, scale: f32 },
    /// Cooldown duration from the originating action's level row.
    LevelDataCooldown,
    /// Cooldown duration of one attack at the source's attack speed.
    AttackSpeedCooldown,
    /// Resource cost from the originating action's level row.
    LevelDataCost { attribute: Attribute },
}

/// Target-side inputs available to an execution.
pub struct ExecutionContext<'a> {
    pub target: &'a AttributeStore,
    pub target_entity: u32,
    pub rng: &'a dyn RngOracle,
    pub world_seed: u64,
    /// Unique per application; decorrelates successive rolls.
    pub nonce: u64,
    pub min_cooldown: f32,
}

/// Outcome of a damage calculation, exposed for logging and tests.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DamageOutcome {
    pub raw: f32,
    pub mitigation: f32,
    pub critical: bool,
    pub total: f32,
}

/// Armor-style mitigation multiplier: `100 / max(100, 100 + resistance)`.
pub fn mitigation(resistance: f32) -> f32 {
    100.0 / (100.0 + resistance).max(100.0)
}

impl Execution {
    pub fn execute(&self, spec: &mut EffectSpec, ctx: &ExecutionContext<'_>) -> Result<(), EffectError> {
        match self {
            Execution::Damage { kind, base, scale } => {
                let outcome = damage(*kind, *base, *scale, spec, ctx);
                tracing::debug!(
                    target: "action::effect",
                    effect = %spec.template.id,
                    raw = outcome.raw,
                    mitigation = outcome.mitigation,
                    critical = outcome.critical,
                    total = outcome.total,
                    "damage calculated"
                );
                spec.set_by_caller_magnitude(names::tag(names::SET_BY_CALLER_MAGNITUDE), -outcome.total);
                spec.effect_tags.insert(names::tag(match kind {
                    DamageKind::Physical => names::EFFECT_TYPE_PHYSICAL,
                    DamageKind::Magical => names::EFFECT_TYPE_MAGICAL,
                }));
                if outcome.critical {
                    spec.effect_tags.insert(names::tag(names::EFFECT_TYPE_CRITICAL));
                }
                Ok(())
            }
            Execution::LevelDataCooldown => {
                let level = spec
                    .context
                    .capture
                    .level_data
                    .ok_or_else(|| EffectError::MissingLevelData {
                        effect: spec.template.id.clone(),
                        level: spec.level,
                    })?;
                let duration = level.cooldown.max(ctx.min_cooldown);
                apply_cooldown(spec, duration);
                Ok(())
            }
            Execution::AttackSpeedCooldown => {
                let attack_speed = spec
                    .context
                    .capture
                    .attribute(Attribute::AttackSpeed)
                    .unwrap_or(1.0)
                    .max(0.01);
                apply_cooldown(spec, 1.0 / attack_speed);
                Ok(())
            }
            Execution::LevelDataCost { attribute } => {
                let level = spec
                    .context
                    .capture
                    .level_data
                    .ok_or_else(|| EffectError::MissingLevelData {
                        effect: spec.template.id.clone(),
                        level: spec.level,
                    })?;
                let cost_tag = names::tag(names::SET_BY_CALLER_COST);
                let already_modified = spec.modifiers.iter().any(|m| {
                    m.attribute == *attribute
                        && matches!(&m.magnitude, ScalableFloat::SetByCaller(tag) if *tag == cost_tag)
                });
                if !already_modified {
                    spec.modifiers.push(ModifierTemplate {
                        attribute: *attribute,
                        op: ModifierOp::Add,
                        magnitude: ScalableFloat::SetByCaller(cost_tag.clone()),
                    });
                }
                spec.set_by_caller_magnitude(cost_tag, -level.cost);
                Ok(())
            }
        }
    }
}

fn apply_cooldown(spec: &mut EffectSpec, duration: f32) {
    spec.set_by_caller_magnitude(names::tag(names::SET_BY_CALLER_DURATION), duration);
    if let Some(tag) = spec.context.capture.cooldown_tag.clone() {
        spec.granted_tags.insert(tag);
    }
}

fn damage(
    kind: DamageKind,
    base: f32,
    scale: f32,
    spec: &EffectSpec,
    ctx: &ExecutionContext<'_>,
) -> DamageOutcome {
    let capture = &spec.context.capture;
    let (power, resistance) = match kind {
        DamageKind::Physical => (
            capture.attribute(Attribute::AttackDamage).unwrap_or(0.0),
            ctx.target.current_or_zero(Attribute::Armor),
        ),
        DamageKind::Magical => (
            capture.attribute(Attribute::AbilityPower).unwrap_or(0.0),
            ctx.target.current_or_zero(Attribute::MagicResistance),
        ),
    };

    let raw = base + power * scale;
    let mitigation = mitigation(resistance);

    let crit_chance = capture.attribute(Attribute::CritChance).unwrap_or(0.0);
    let roll = ctx.rng.unit(compute_seed(ctx.world_seed, ctx.nonce, ctx.target_entity, 0));
    let critical = roll < crit_chance;
    let crit_multiplier = if critical {
        capture.attribute(Attribute::CritDamage).unwrap_or(1.0)
    } else {
        1.0
    };

    DamageOutcome {
        raw,
        mitigation,
        critical,
        total: (raw * mitigation * crit_multiplier).max(0.0),
    }
}

/// Cooldown tag derived from an input binding (`Input.Action.Q` → `Action.Cooldown.Q`).
pub fn cooldown_tag_for(input: &Tag) -> Tag {
    names::tag(names::COOLDOWN_ROOT).child(input.leaf())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::action::LevelData;
    use crate::effect::{EffectContext, EffectTemplate, SourceCapture};
    use crate::handle::EntityId;
    use crate::rng::PcgRng;

    fn ctx(target: &AttributeStore) -> ExecutionContext<'_> {
        ExecutionContext {
            target,
            target_entity: 2,
            rng: &PcgRng,
            world_seed: 1,
            nonce: 1,
            min_cooldown: 0.1,
        }
    }

    fn spec_with(capture: SourceCapture, template: EffectTemplate) -> EffectSpec {
        let mut context = EffectContext::from_source(EntityId(1));
        context.capture = capture;
        EffectSpec::make_outgoing(Arc::new(template), 1, context)
    }

    #[test]
    fn physical_damage_is_mitigated_by_armor() {
        let source = AttributeStore::with_default_sets();
        let target = AttributeStore::with_default_sets();
        let mut spec = spec_with(SourceCapture::from_store(&source), EffectTemplate::instant("Hit"));

        Execution::Damage {
            kind: DamageKind::Physical,
            base: 40.0,
            scale: 1.0,
        }
        .execute(&mut spec, &ctx(&target))
        .unwrap();

        // (40 + 60 AD) * 100 / 130, no crit chance by default.
        let expected = -(100.0 * 100.0 / 130.0);
        let value = spec.get_set_by_caller_magnitude(&names::tag(names::SET_BY_CALLER_MAGNITUDE), false, 0.0);
        assert!((value - expected).abs() < 1e-3);
        assert!(spec.effect_tags.has_tag_exact(&names::tag(names::EFFECT_TYPE_PHYSICAL)));
        assert!(!spec.effect_tags.has_tag_exact(&names::tag(names::EFFECT_TYPE_CRITICAL)));
    }

    #[test]
    fn guaranteed_crit_multiplies_and_tags() {
        let mut source = AttributeStore::with_default_sets();
        source.set_current(Attribute::CritChance, 1.0);
        let target = AttributeStore::with_default_sets();
        let mut spec = spec_with(SourceCapture::from_store(&source), EffectTemplate::instant("Hit"));

        Execution::Damage {
            kind: DamageKind::Magical,
            base: 100.0,
            scale: 0.0,
        }
        .execute(&mut spec, &ctx(&target))
        .unwrap();

        let value = spec.get_set_by_caller_magnitude(&names::tag(names::SET_BY_CALLER_MAGNITUDE), false, 0.0);
        assert!((value + 100.0 * 100.0 / 130.0 * 1.75).abs() < 1e-3);
        assert!(spec.effect_tags.has_tag_exact(&names::tag(names::EFFECT_TYPE_CRITICAL)));
    }

    #[test]
    fn level_cooldown_has_a_floor_and_grants_the_cooldown_tag() {
        let target = AttributeStore::with_default_sets();
        let capture = SourceCapture {
            level_data: Some(LevelData {
                cooldown: 0.0,
                cost: 0.0,
            }),
            cooldown_tag: Some(Tag::new("Action.Cooldown.Q")),
            ..SourceCapture::default()
        };
        let mut spec = spec_with(capture, EffectTemplate::instant("CD"));

        Execution::LevelDataCooldown.execute(&mut spec, &ctx(&target)).unwrap();
        assert_eq!(
            spec.get_set_by_caller_magnitude(&names::tag(names::SET_BY_CALLER_DURATION), false, 0.0),
            0.1
        );
        assert!(spec.granted_tags.has_tag_exact(&Tag::new("Action.Cooldown.Q")));
    }

    #[test]
    fn missing_level_row_is_an_error() {
        let target = AttributeStore::with_default_sets();
        let mut spec = spec_with(SourceCapture::default(), EffectTemplate::instant("Cost"));
        let err = Execution::LevelDataCost {
            attribute: Attribute::Mana,
        }
        .execute(&mut spec, &ctx(&target))
        .unwrap_err();
        assert!(matches!(err, EffectError::MissingLevelData { .. }));
    }

    #[test]
    fn attack_speed_cooldown_is_reciprocal() {
        let mut source = AttributeStore::with_default_sets();
        source.set_current(Attribute::AttackSpeed, 2.0);
        let target = AttributeStore::with_default_sets();
        let mut spec = spec_with(SourceCapture::from_store(&source), EffectTemplate::instant("AA"));

        Execution::AttackSpeedCooldown.execute(&mut spec, &ctx(&target)).unwrap();
        assert_eq!(
            spec.get_set_by_caller_magnitude(&names::tag(names::SET_BY_CALLER_DURATION), false, 0.0),
            0.5
        );
    }

    #[test]
    fn cooldown_tag_uses_input_leaf() {
        assert_eq!(
            cooldown_tag_for(&Tag::new("Input.Action.Primary")),
            Tag::new("Action.Cooldown.Primary")
        );
    }
}
