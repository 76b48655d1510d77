//! Attribute store: per-entity named floating-point values.
//!
//! Attributes are addressed by the closed [`Attribute`] enum; each variant
//! belongs to exactly one [`AttributeSetKind`]. Sets implement the small
//! [`AttributeSet`] interface (`get` / `get_mut` plus clamp and veto hooks), so
//! effect templates can name an attribute without knowing which set instance
//! holds it.
//!
//! # Design Principles
//!
//! - **Base vs Current**: Instant effects write `base`; duration effects only
//!   ever re-aggregate `current` from `base`
//! - **Set-owned clamping**: Each set clamps its own values (health within
//!   `[0, max_health]`, etc.) before a write lands
//! - **No reflection**: Lookup is a `match` on the enum, never a field path

mod sets;
mod store;

pub use sets::{CombatSet, DefenseSet, MovementSet, ResourceSet};
pub use store::AttributeStore;

use core::fmt;

use crate::effect::{EffectSpec, ModifierOp};

/// Which attribute set owns an attribute.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AttributeSetKind {
    Resource,
    Combat,
    Defense,
    Movement,
}

/// Stable identifier of one attribute.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(ascii_case_insensitive)]
pub enum Attribute {
    // Resource
    Health,
    MaxHealth,
    HealthRegen,
    Mana,
    MaxMana,
    ManaRegen,
    // Combat
    AttackDamage,
    AbilityPower,
    AttackSpeed,
    ActionHaste,
    CritChance,
    CritDamage,
    // Defense
    Armor,
    MagicResistance,
    Tenacity,
    // Movement
    MoveSpeed,
}

impl Attribute {
    pub const ALL: [Attribute; 16] = [
        Attribute::Health,
        Attribute::MaxHealth,
        Attribute::HealthRegen,
        Attribute::Mana,
        Attribute::MaxMana,
        Attribute::ManaRegen,
        Attribute::AttackDamage,
        Attribute::AbilityPower,
        Attribute::AttackSpeed,
        Attribute::ActionHaste,
        Attribute::CritChance,
        Attribute::CritDamage,
        Attribute::Armor,
        Attribute::MagicResistance,
        Attribute::Tenacity,
        Attribute::MoveSpeed,
    ];

    pub const fn set_kind(self) -> AttributeSetKind {
        use Attribute::*;
        match self {
            Health | MaxHealth | HealthRegen | Mana | MaxMana | ManaRegen => {
                AttributeSetKind::Resource
            }
            AttackDamage | AbilityPower | AttackSpeed | ActionHaste | CritChance | CritDamage => {
                AttributeSetKind::Combat
            }
            Armor | MagicResistance | Tenacity => AttributeSetKind::Defense,
            MoveSpeed => AttributeSetKind::Movement,
        }
    }
}

/// Base and current value of one attribute.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttributeData {
    pub base: f32,
    pub current: f32,
}

impl AttributeData {
    pub const fn new(value: f32) -> Self {
        Self {
            base: value,
            current: value,
        }
    }
}

/// Information handed to [`AttributeSet::post_effect_execute`] after an
/// instant modifier landed on a base value.
#[derive(Clone, Debug, PartialEq)]
pub struct EffectModCallback {
    pub attribute: Attribute,
    pub op: ModifierOp,
    pub magnitude: f32,
    pub old_base: f32,
    pub new_base: f32,
}

/// Interface implemented by every attribute set variant.
pub trait AttributeSet: fmt::Debug + Send + Sync {
    fn kind(&self) -> AttributeSetKind;

    /// Attributes owned by this set.
    fn attributes(&self) -> &'static [Attribute];

    fn get(&self, attribute: Attribute) -> Option<&AttributeData>;

    fn get_mut(&mut self, attribute: Attribute) -> Option<&mut AttributeData>;

    /// Clamp hook for a new current value.
    fn pre_attribute_change(&self, _attribute: Attribute, _value: &mut f32) {}

    /// Clamp hook for a new base value. Defaults to the current-value clamp.
    fn pre_attribute_base_change(&self, attribute: Attribute, value: &mut f32) {
        self.pre_attribute_change(attribute, value);
    }

    /// Called after a current value changed.
    fn post_attribute_change(&mut self, _attribute: Attribute, _old: f32, _new: f32) {}

    /// Global veto over an incoming effect (e.g. invulnerability).
    fn pre_effect_execute(&self, _spec: &EffectSpec) -> bool {
        true
    }

    fn post_effect_execute(&mut self, _data: &EffectModCallback) {}

    fn clone_box(&self) -> Box<dyn AttributeSet>;
}

impl Clone for Box<dyn AttributeSet> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
