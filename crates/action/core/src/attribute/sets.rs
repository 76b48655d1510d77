//! Concrete attribute sets.

use super::{Attribute, AttributeData, AttributeSet, AttributeSetKind};

// ============================================================================
// Resource
// ============================================================================

/// Health and mana pools with their maxima and regeneration rates.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceSet {
    pub health: AttributeData,
    pub max_health: AttributeData,
    pub health_regen: AttributeData,
    pub mana: AttributeData,
    pub max_mana: AttributeData,
    pub mana_regen: AttributeData,
}

impl ResourceSet {
    pub const DEFAULT_POOL: f32 = 100.0;

    const ATTRIBUTES: [Attribute; 6] = [
        Attribute::Health,
        Attribute::MaxHealth,
        Attribute::HealthRegen,
        Attribute::Mana,
        Attribute::MaxMana,
        Attribute::ManaRegen,
    ];
}

impl Default for ResourceSet {
    fn default() -> Self {
        Self {
            health: AttributeData::new(Self::DEFAULT_POOL),
            max_health: AttributeData::new(Self::DEFAULT_POOL),
            health_regen: AttributeData::new(0.0),
            mana: AttributeData::new(Self::DEFAULT_POOL),
            max_mana: AttributeData::new(Self::DEFAULT_POOL),
            mana_regen: AttributeData::new(0.0),
        }
    }
}

impl AttributeSet for ResourceSet {
    fn kind(&self) -> AttributeSetKind {
        AttributeSetKind::Resource
    }

    fn attributes(&self) -> &'static [Attribute] {
        &Self::ATTRIBUTES
    }

    fn get(&self, attribute: Attribute) -> Option<&AttributeData> {
        match attribute {
            Attribute::Health => Some(&self.health),
            Attribute::MaxHealth => Some(&self.max_health),
            Attribute::HealthRegen => Some(&self.health_regen),
            Attribute::Mana => Some(&self.mana),
            Attribute::MaxMana => Some(&self.max_mana),
            Attribute::ManaRegen => Some(&self.mana_regen),
            _ => None,
        }
    }

    fn get_mut(&mut self, attribute: Attribute) -> Option<&mut AttributeData> {
        match attribute {
            Attribute::Health => Some(&mut self.health),
            Attribute::MaxHealth => Some(&mut self.max_health),
            Attribute::HealthRegen => Some(&mut self.health_regen),
            Attribute::Mana => Some(&mut self.mana),
            Attribute::MaxMana => Some(&mut self.max_mana),
            Attribute::ManaRegen => Some(&mut self.mana_regen),
            _ => None,
        }
    }

    fn pre_attribute_change(&self, attribute: Attribute, value: &mut f32) {
        match attribute {
            Attribute::Health => *value = value.clamp(0.0, self.max_health.current.max(1.0)),
            Attribute::Mana => *value = value.clamp(0.0, self.max_mana.current.max(1.0)),
            Attribute::MaxHealth | Attribute::MaxMana => *value = value.max(1.0),
            _ => {}
        }
    }

    fn pre_attribute_base_change(&self, attribute: Attribute, value: &mut f32) {
        match attribute {
            Attribute::Health => *value = value.clamp(0.0, self.max_health.base.max(1.0)),
            Attribute::Mana => *value = value.clamp(0.0, self.max_mana.base.max(1.0)),
            _ => self.pre_attribute_change(attribute, value),
        }
    }

    fn post_attribute_change(&mut self, attribute: Attribute, _old: f32, new: f32) {
        // Shrinking a maximum drags the pool down with it.
        match attribute {
            Attribute::MaxHealth => {
                self.health.current = self.health.current.min(new);
                self.health.base = self.health.base.min(new);
            }
            Attribute::MaxMana => {
                self.mana.current = self.mana.current.min(new);
                self.mana.base = self.mana.base.min(new);
            }
            _ => {}
        }
    }

    fn clone_box(&self) -> Box<dyn AttributeSet> {
        Box::new(self.clone())
    }
}

// ============================================================================
// Combat
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct CombatSet {
    pub attack_damage: AttributeData,
    pub ability_power: AttributeData,
    pub attack_speed: AttributeData,
    pub action_haste: AttributeData,
    /// Probability in `[0, 1]`.
    pub crit_chance: AttributeData,
    /// Damage multiplier applied on a critical hit.
    pub crit_damage: AttributeData,
}

impl CombatSet {
    const ATTRIBUTES: [Attribute; 6] = [
        Attribute::AttackDamage,
        Attribute::AbilityPower,
        Attribute::AttackSpeed,
        Attribute::ActionHaste,
        Attribute::CritChance,
        Attribute::CritDamage,
    ];
}

impl Default for CombatSet {
    fn default() -> Self {
        Self {
            attack_damage: AttributeData::new(60.0),
            ability_power: AttributeData::new(0.0),
            attack_speed: AttributeData::new(1.0),
            action_haste: AttributeData::new(0.0),
            crit_chance: AttributeData::new(0.0),
            crit_damage: AttributeData::new(1.75),
        }
    }
}

impl AttributeSet for CombatSet {
    fn kind(&self) -> AttributeSetKind {
        AttributeSetKind::Combat
    }

    fn attributes(&self) -> &'static [Attribute] {
        &Self::ATTRIBUTES
    }

    fn get(&self, attribute: Attribute) -> Option<&AttributeData> {
        match attribute {
            Attribute::AttackDamage => Some(&self.attack_damage),
            Attribute::AbilityPower => Some(&self.ability_power),
            Attribute::AttackSpeed => Some(&self.attack_speed),
            Attribute::ActionHaste => Some(&self.action_haste),
            Attribute::CritChance => Some(&self.crit_chance),
            Attribute::CritDamage => Some(&self.crit_damage),
            _ => None,
        }
    }

    fn get_mut(&mut self, attribute: Attribute) -> Option<&mut AttributeData> {
        match attribute {
            Attribute::AttackDamage => Some(&mut self.attack_damage),
            Attribute::AbilityPower => Some(&mut self.ability_power),
            Attribute::AttackSpeed => Some(&mut self.attack_speed),
            Attribute::ActionHaste => Some(&mut self.action_haste),
            Attribute::CritChance => Some(&mut self.crit_chance),
            Attribute::CritDamage => Some(&mut self.crit_damage),
            _ => None,
        }
    }

    fn pre_attribute_change(&self, attribute: Attribute, value: &mut f32) {
        match attribute {
            Attribute::CritChance => *value = value.clamp(0.0, 1.0),
            Attribute::CritDamage => *value = value.max(1.0),
            Attribute::AttackSpeed => *value = value.max(0.01),
            Attribute::AttackDamage | Attribute::AbilityPower | Attribute::ActionHaste => {
                *value = value.max(0.0)
            }
            _ => {}
        }
    }

    fn clone_box(&self) -> Box<dyn AttributeSet> {
        Box::new(self.clone())
    }
}

// ============================================================================
// Defense
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct DefenseSet {
    pub armor: AttributeData,
    pub magic_resistance: AttributeData,
    pub tenacity: AttributeData,
}

impl DefenseSet {
    const ATTRIBUTES: [Attribute; 3] = [
        Attribute::Armor,
        Attribute::MagicResistance,
        Attribute::Tenacity,
    ];
}

impl Default for DefenseSet {
    fn default() -> Self {
        Self {
            armor: AttributeData::new(30.0),
            magic_resistance: AttributeData::new(30.0),
            tenacity: AttributeData::new(0.0),
        }
    }
}

impl AttributeSet for DefenseSet {
    fn kind(&self) -> AttributeSetKind {
        AttributeSetKind::Defense
    }

    fn attributes(&self) -> &'static [Attribute] {
        &Self::ATTRIBUTES
    }

    fn get(&self, attribute: Attribute) -> Option<&AttributeData> {
        match attribute {
            Attribute::Armor => Some(&self.armor),
            Attribute::MagicResistance => Some(&self.magic_resistance),
            Attribute::Tenacity => Some(&self.tenacity),
            _ => None,
        }
    }

    fn get_mut(&mut self, attribute: Attribute) -> Option<&mut AttributeData> {
        match attribute {
            Attribute::Armor => Some(&mut self.armor),
            Attribute::MagicResistance => Some(&mut self.magic_resistance),
            Attribute::Tenacity => Some(&mut self.tenacity),
            _ => None,
        }
    }

    fn pre_attribute_change(&self, attribute: Attribute, value: &mut f32) {
        match attribute {
            Attribute::Tenacity => *value = value.clamp(0.0, 1.0),
            _ => *value = value.max(0.0),
        }
    }

    fn clone_box(&self) -> Box<dyn AttributeSet> {
        Box::new(self.clone())
    }
}

// ============================================================================
// Movement
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct MovementSet {
    pub move_speed: AttributeData,
}

impl Default for MovementSet {
    fn default() -> Self {
        Self {
            move_speed: AttributeData::new(345.0),
        }
    }
}

impl AttributeSet for MovementSet {
    fn kind(&self) -> AttributeSetKind {
        AttributeSetKind::Movement
    }

    fn attributes(&self) -> &'static [Attribute] {
        &[Attribute::MoveSpeed]
    }

    fn get(&self, attribute: Attribute) -> Option<&AttributeData> {
        (attribute == Attribute::MoveSpeed).then_some(&self.move_speed)
    }

    fn get_mut(&mut self, attribute: Attribute) -> Option<&mut AttributeData> {
        (attribute == Attribute::MoveSpeed).then_some(&mut self.move_speed)
    }

    fn pre_attribute_change(&self, _attribute: Attribute, value: &mut f32) {
        *value = value.max(0.0);
    }

    fn clone_box(&self) -> Box<dyn AttributeSet> {
        Box::new(self.clone())
    }
}
