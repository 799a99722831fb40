//! Melee weapon hit resolution.
//!
//! A swing samples one sphere around the weapon origin, keeps the colliders
//! inside the frontal cone and strikes the closest one. At most one target
//! takes damage per swing.

use ahash::AHashSet;
use hero_common::{angle_between_deg, clamp_or, ConfigError, EntityId, Transform, Vec3};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::agent::CombatAgent;
use crate::damage::{DamageableLookup, HitContact};
use crate::spatial::{ColliderHit, LayerMask, OverlapFilter, SpatialQuery};

// ============================================================================
// Weapon Configuration
// ============================================================================

/// Shape and strength of a melee swing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeleeWeaponConfig {
    /// Radius of the sampled sphere
    pub attack_radius: f32,
    /// Full cone angle in degrees (1..=360)
    pub attack_angle: f32,
    /// Weapon origin relative to the owner, rotated with it
    pub origin_offset: Vec3,
    /// Layers that can be hit
    pub hit_mask: LayerMask,
    /// Whether trigger volumes can be hit
    pub include_triggers: bool,
    /// Scale passed to the owner's damage roll
    pub damage_multiplier: f32,
}

impl Default for MeleeWeaponConfig {
    fn default() -> Self {
        Self {
            attack_radius: 2.0,
            attack_angle: 120.0,
            origin_offset: Vec3::ZERO,
            hit_mask: LayerMask::ALL,
            include_triggers: false,
            damage_multiplier: 1.0,
        }
    }
}

impl MeleeWeaponConfig {
    /// Sets the attack radius.
    #[must_use]
    pub const fn with_radius(mut self, radius: f32) -> Self {
        self.attack_radius = radius;
        self
    }

    /// Sets the cone angle in degrees.
    #[must_use]
    pub const fn with_angle(mut self, angle: f32) -> Self {
        self.attack_angle = angle;
        self
    }

    /// Sets the origin offset.
    #[must_use]
    pub const fn with_origin_offset(mut self, offset: Vec3) -> Self {
        self.origin_offset = offset;
        self
    }

    /// Sets the damage multiplier.
    #[must_use]
    pub const fn with_damage_multiplier(mut self, multiplier: f32) -> Self {
        self.damage_multiplier = multiplier;
        self
    }

    /// Checks every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_range("weapon", "attack_radius", self.attack_radius, 0.0, f32::MAX)?;
        ConfigError::check_range("weapon", "attack_angle", self.attack_angle, 1.0, 360.0)?;
        ConfigError::check_range(
            "weapon",
            "damage_multiplier",
            self.damage_multiplier,
            0.0,
            f32::MAX,
        )
    }

    /// Returns a copy with every field clamped into range.
    #[must_use]
    pub fn sanitized(self) -> Self {
        let d = Self::default();
        Self {
            attack_radius: clamp_or(self.attack_radius, 0.0, f32::MAX, d.attack_radius),
            attack_angle: clamp_or(self.attack_angle, 1.0, 360.0, d.attack_angle),
            damage_multiplier: clamp_or(self.damage_multiplier, 0.0, f32::MAX, d.damage_multiplier),
            ..self
        }
    }
}

// ============================================================================
// Swing Resolution
// ============================================================================

/// Result of one swing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SwingOutcome {
    /// Owner missing or dead; nothing happened.
    Inactive,
    /// A target was selected and the owner resolved the hit.
    Hit {
        /// Damaged entity
        target: EntityId,
        /// Contact point
        point: Vec3,
        /// Contact normal
        normal: Vec3,
        /// Whether the owner delivered damage
        delivered: bool,
    },
    /// No eligible target.
    Whiff,
}

/// Melee weapon owned by a character.
#[derive(Debug, Default)]
pub struct MeleeWeapon {
    config: MeleeWeaponConfig,
    hit_this_swing: AHashSet<EntityId>,
    hit_buffer: Vec<ColliderHit>,
}

impl MeleeWeapon {
    /// Creates a weapon. Out-of-range config values are clamped.
    #[must_use]
    pub fn new(config: MeleeWeaponConfig) -> Self {
        Self {
            config: config.sanitized(),
            hit_this_swing: AHashSet::new(),
            hit_buffer: Vec::with_capacity(16),
        }
    }

    /// Sanitized configuration.
    #[must_use]
    pub const fn config(&self) -> &MeleeWeaponConfig {
        &self.config
    }

    /// World-space origin of a swing.
    #[must_use]
    pub fn origin(&self, owner_transform: &Transform) -> Vec3 {
        owner_transform.transform_point(self.config.origin_offset)
    }

    /// Performs one swing at the hit moment of an attack.
    ///
    /// `targets` resolves damageable ids to live objects; the owner itself
    /// should not be reachable through it.
    pub fn perform_attack(
        &mut self,
        owner: Option<&mut CombatAgent>,
        owner_transform: &Transform,
        query: &dyn SpatialQuery,
        targets: &mut dyn DamageableLookup,
        now: f32,
    ) -> SwingOutcome {
        let Some(owner) = owner else {
            return SwingOutcome::Inactive;
        };
        if !owner.is_alive() {
            return SwingOutcome::Inactive;
        }

        self.hit_this_swing.clear();
        self.hit_buffer.clear();

        let origin = self.origin(owner_transform);
        let forward = owner_transform.forward();
        let filter = OverlapFilter {
            mask: self.config.hit_mask,
            include_triggers: self.config.include_triggers,
        };
        query.overlap_sphere(origin, self.config.attack_radius, filter, &mut self.hit_buffer);

        let half_angle = self.config.attack_angle * 0.5;
        let mut best: Option<(EntityId, Vec3)> = None;
        let mut best_distance_sq = f32::INFINITY;

        for hit in &self.hit_buffer {
            if hit.root == owner.id() {
                continue;
            }
            let Some(damageable) = hit.damageable else {
                continue;
            };
            if !targets.is_alive(damageable) || self.hit_this_swing.contains(&damageable) {
                continue;
            }

            let to_target = hit.closest_point - origin;
            let distance_sq = to_target.length_squared();
            if distance_sq < f32::EPSILON {
                continue;
            }
            if angle_between_deg(forward, to_target) > half_angle {
                continue;
            }

            if distance_sq < best_distance_sq {
                best_distance_sq = distance_sq;
                best = Some((damageable, hit.closest_point));
            }
        }

        let Some((target, point)) = best else {
            trace!("Swing by {} hit nothing", owner.id());
            owner.notify_attack_animation_complete();
            return SwingOutcome::Whiff;
        };

        let to_point = point - origin;
        let normal = if to_point.length_squared() > f32::EPSILON {
            to_point.normalize()
        } else {
            forward
        };

        trace!("Swing by {} selects {} at {:.2}m", owner.id(), target, best_distance_sq.sqrt());
        let delivered = owner.resolve_attack_hit(
            targets.damageable_mut(target),
            HitContact::new(point, normal),
            self.config.damage_multiplier,
            false,
            now,
        );
        self.hit_this_swing.insert(target);

        SwingOutcome::Hit {
            target,
            point,
            normal,
            delivered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::CombatSettings;
    use crate::damage::{DamageInfo, Damageable};
    use crate::events::Signal;
    use crate::spatial::{ColliderWorld, SphereColliderDesc};
    use ahash::AHashMap;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Damageable stand-in that records every damage event.
    #[derive(Debug)]
    struct Dummy {
        alive: bool,
        taken: Vec<DamageInfo>,
    }

    #[derive(Debug, Default)]
    struct MockTargets {
        dummies: AHashMap<EntityId, Dummy>,
    }

    impl MockTargets {
        fn add(&mut self, id: EntityId, alive: bool) {
            self.dummies.insert(id, Dummy { alive, taken: Vec::new() });
        }

        fn taken(&self, id: EntityId) -> usize {
            self.dummies.get(&id).map_or(0, |d| d.taken.len())
        }
    }

    impl Damageable for Dummy {
        fn is_alive(&self) -> bool {
            self.alive
        }

        fn apply_damage(&mut self, damage: DamageInfo, _now: f32) -> bool {
            self.taken.push(damage);
            true
        }
    }

    impl DamageableLookup for MockTargets {
        fn damageable_mut(&mut self, entity: EntityId) -> Option<&mut dyn Damageable> {
            self.dummies.get_mut(&entity).map(|d| d as &mut dyn Damageable)
        }

        fn is_alive(&self, entity: EntityId) -> bool {
            self.dummies.get(&entity).is_some_and(|d| d.alive)
        }
    }

    struct Scene {
        owner: CombatAgent,
        transform: Transform,
        colliders: ColliderWorld,
        targets: MockTargets,
    }

    impl Scene {
        fn new() -> Self {
            let owner = CombatAgent::new(EntityId::new(), CombatSettings::default().with_variance(0.0)).with_seed(1);
            let mut colliders = ColliderWorld::new();
            colliders.add(SphereColliderDesc::new(owner.id(), 0.4), Vec3::ZERO);
            Self {
                owner,
                transform: Transform::IDENTITY,
                colliders,
                targets: MockTargets::default(),
            }
        }

        fn add_target(&mut self, position: Vec3, alive: bool) -> EntityId {
            let id = EntityId::new();
            self.colliders.add(SphereColliderDesc::new(id, 0.3), position);
            self.targets.add(id, alive);
            id
        }

        fn swing(&mut self, weapon: &mut MeleeWeapon) -> SwingOutcome {
            weapon.perform_attack(
                Some(&mut self.owner),
                &self.transform,
                &self.colliders,
                &mut self.targets,
                1.0,
            )
        }
    }

    fn counter(signal: &mut Signal<()>) -> Rc<RefCell<u32>> {
        let count = Rc::new(RefCell::new(0));
        let c = Rc::clone(&count);
        signal.subscribe(move |()| *c.borrow_mut() += 1);
        count
    }

    #[test]
    fn test_config_sanitized() {
        let cfg = MeleeWeaponConfig::default().with_angle(720.0).with_radius(-1.0).sanitized();
        assert_eq!(cfg.attack_angle, 360.0);
        assert_eq!(cfg.attack_radius, 0.0);
        assert!(MeleeWeaponConfig::default().with_angle(0.0).validate().is_err());
    }

    #[test]
    fn test_strikes_closest_target_in_cone() {
        let mut scene = Scene::new();
        let far = scene.add_target(Vec3::new(0.0, 0.0, 1.8), true);
        let near = scene.add_target(Vec3::new(0.3, 0.0, 1.0), true);
        let mut weapon = MeleeWeapon::new(MeleeWeaponConfig::default());

        let outcome = scene.swing(&mut weapon);
        match outcome {
            SwingOutcome::Hit { target, delivered, normal, .. } => {
                assert_eq!(target, near);
                assert!(delivered);
                assert!((normal.length() - 1.0).abs() < 1e-5);
            },
            other => panic!("expected hit, got {other:?}"),
        }
        assert_eq!(scene.targets.taken(near), 1);
        assert_eq!(scene.targets.taken(far), 0);
        let dmg = scene.targets.dummies[&near].taken[0];
        assert_eq!(dmg.amount(), 10.0);
        assert_eq!(dmg.source, Some(scene.owner.id()));
    }

    #[test]
    fn test_target_behind_is_ignored() {
        let mut scene = Scene::new();
        let behind = scene.add_target(Vec3::new(0.0, 0.0, -1.0), true);
        let mut weapon = MeleeWeapon::new(MeleeWeaponConfig::default());
        let performed = counter(&mut scene.owner.signals_mut().attack_performed);

        assert_eq!(scene.swing(&mut weapon), SwingOutcome::Whiff);
        assert_eq!(scene.targets.taken(behind), 0);
        assert_eq!(*performed.borrow(), 1);
    }

    #[test]
    fn test_dead_and_missing_damageables_skipped() {
        let mut scene = Scene::new();
        scene.add_target(Vec3::new(0.0, 0.0, 1.0), false);
        let prop = EntityId::new();
        scene
            .colliders
            .add(SphereColliderDesc::new(prop, 0.3).with_damageable(None), Vec3::new(0.0, 0.0, 0.8));
        let mut weapon = MeleeWeapon::new(MeleeWeaponConfig::default());

        assert_eq!(scene.swing(&mut weapon), SwingOutcome::Whiff);
    }

    #[test]
    fn test_one_damage_per_swing() {
        let mut scene = Scene::new();
        let id = scene.add_target(Vec3::new(0.0, 0.0, 1.0), true);
        scene
            .colliders
            .add(SphereColliderDesc::new(id, 0.3).with_offset(Vec3::Y * 0.2), Vec3::new(0.0, 0.0, 1.0));
        let mut weapon = MeleeWeapon::new(MeleeWeaponConfig::default());

        assert!(matches!(scene.swing(&mut weapon), SwingOutcome::Hit { .. }));
        assert_eq!(scene.targets.taken(id), 1);
    }

    #[test]
    fn test_rotated_owner_and_offset() {
        let mut scene = Scene::new();
        scene.transform = Transform::looking_along(Vec3::ZERO, Vec3::X);
        let side = scene.add_target(Vec3::new(2.5, 0.0, 0.0), true);
        let mut weapon = MeleeWeapon::new(MeleeWeaponConfig::default().with_origin_offset(Vec3::new(0.0, 0.0, 1.0)));

        assert!((weapon.origin(&scene.transform) - Vec3::X).length() < 1e-5);
        assert!(matches!(scene.swing(&mut weapon), SwingOutcome::Hit { target, .. } if target == side));
    }

    #[test]
    fn test_dead_owner_is_inactive() {
        let mut scene = Scene::new();
        scene.add_target(Vec3::new(0.0, 0.0, 1.0), true);
        scene
            .owner
            .apply_damage(DamageInfo::new(1000.0, crate::damage::DamageType::True), 0.0);
        let mut weapon = MeleeWeapon::new(MeleeWeaponConfig::default());

        assert_eq!(scene.swing(&mut weapon), SwingOutcome::Inactive);
        let mut targets = MockTargets::default();
        assert_eq!(
            weapon.perform_attack(None, &Transform::IDENTITY, &scene.colliders, &mut targets, 0.0),
            SwingOutcome::Inactive
        );
    }
}
