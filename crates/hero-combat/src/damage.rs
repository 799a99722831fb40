//! Damage events and the damageable capability.

use hero_common::{EntityId, Vec3};
use serde::{Deserialize, Serialize};

/// Type of damage dealt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DamageType {
    /// Physical damage
    #[default]
    Physical,
    /// Fire damage
    Fire,
    /// Ice/cold damage
    Ice,
    /// Lightning damage
    Lightning,
    /// Poison damage
    Poison,
    /// True damage
    True,
}

/// One damage event.
///
/// Immutable once built; mitigation produces a new value through
/// [`DamageInfo::with_amount`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageInfo {
    amount: f32,
    /// Type of damage
    pub damage_type: DamageType,
    /// Entity whose weapon or body delivered the hit
    pub source: Option<EntityId>,
    /// Entity responsible for the hit
    pub instigator: Option<EntityId>,
    /// Contact point in world space
    pub point: Vec3,
    /// Contact normal
    pub normal: Vec3,
    /// Bypasses blocking and the post-hit invulnerability window
    pub unblockable: bool,
}

impl DamageInfo {
    /// Creates a damage event. Negative amounts are clamped to zero.
    #[must_use]
    pub fn new(amount: f32, damage_type: DamageType) -> Self {
        Self {
            amount: amount.max(0.0),
            damage_type,
            source: None,
            instigator: None,
            point: Vec3::ZERO,
            normal: Vec3::Y,
            unblockable: false,
        }
    }

    /// Damage amount (never negative).
    #[must_use]
    pub const fn amount(&self) -> f32 {
        self.amount
    }

    /// Returns a copy carrying a different amount (clamped to zero).
    #[must_use]
    pub fn with_amount(mut self, amount: f32) -> Self {
        self.amount = amount.max(0.0);
        self
    }

    /// Sets the source entity.
    #[must_use]
    pub fn with_source(mut self, source: EntityId) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets the instigator entity.
    #[must_use]
    pub fn with_instigator(mut self, instigator: EntityId) -> Self {
        self.instigator = Some(instigator);
        self
    }

    /// Sets the contact point and normal.
    #[must_use]
    pub fn with_contact(mut self, point: Vec3, normal: Vec3) -> Self {
        self.point = point;
        self.normal = normal;
        self
    }

    /// Marks the damage as unblockable.
    #[must_use]
    pub fn as_unblockable(mut self) -> Self {
        self.unblockable = true;
        self
    }
}

/// Contact information for a resolved hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitContact {
    /// Hit point in world space
    pub point: Vec3,
    /// Hit normal
    pub normal: Vec3,
}

impl HitContact {
    /// Creates a hit contact.
    #[must_use]
    pub const fn new(point: Vec3, normal: Vec3) -> Self {
        Self { point, normal }
    }
}

/// Anything that can be targeted and damaged: heroes, NPCs, destructibles.
pub trait Damageable {
    /// Whether the entity can still take damage.
    fn is_alive(&self) -> bool;

    /// Applies a damage event at simulation time `now`.
    ///
    /// Returns whether health actually changed. Rejected damage (dead,
    /// invulnerable, fully mitigated) is a silent no-op.
    fn apply_damage(&mut self, damage: DamageInfo, now: f32) -> bool;
}

/// Resolves entity handles to damageables at call time.
pub trait DamageableLookup {
    /// Mutable access to the damageable behind `entity`, if it still exists.
    fn damageable_mut(&mut self, entity: EntityId) -> Option<&mut dyn Damageable>;

    /// Liveness of `entity`; unknown ids are not alive.
    fn is_alive(&self, entity: EntityId) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_amount_clamped() {
        let dmg = DamageInfo::new(-5.0, DamageType::Fire);
        assert_eq!(dmg.amount(), 0.0);
        assert_eq!(dmg.with_amount(-1.0).amount(), 0.0);
    }

    #[test]
    fn test_damage_builder() {
        let src = EntityId::from_raw(7);
        let dmg = DamageInfo::new(12.0, DamageType::Physical)
            .with_source(src)
            .with_instigator(src)
            .with_contact(Vec3::X, Vec3::Z)
            .as_unblockable();

        assert_eq!(dmg.amount(), 12.0);
        assert_eq!(dmg.source, Some(src));
        assert_eq!(dmg.point, Vec3::X);
        assert!(dmg.unblockable);
    }

    #[test]
    fn test_with_amount_keeps_other_fields() {
        let dmg = DamageInfo::new(20.0, DamageType::Ice).as_unblockable();
        let mitigated = dmg.with_amount(8.0);
        assert_eq!(mitigated.amount(), 8.0);
        assert_eq!(mitigated.damage_type, DamageType::Ice);
        assert!(mitigated.unblockable);
        assert_eq!(dmg.amount(), 20.0);
    }
}
