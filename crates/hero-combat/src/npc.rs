//! NPC combat behavior: target acquisition, chase, leash and return.
//!
//! The controller never owns its target. It keeps an [`EntityId`] and asks
//! the [`NpcWorld`] every tick whether the target still exists, where it is
//! and whether it is alive.

use ahash::AHashMap;
use hero_common::{
    clamp_or, flatten, move_towards, turn_towards, ConfigError, EntityId, Transform, Vec3,
    DIRECTION_EPSILON_SQ,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::agent::CombatAgent;
use crate::damage::{DamageableLookup, HitContact};
use crate::spatial::ColliderControl;

/// Stop distance used when neither body radius is known.
pub const DEFAULT_CLEARANCE: f32 = 0.8;

/// Width of the band below the stop distance where the NPC holds position.
pub const RETREAT_HYSTERESIS: f32 = 0.05;

/// Target moves smaller than this (squared) are ignored when picking a goal.
const TARGET_JITTER_SQ: f32 = 0.0001;

/// Squared distance to spawn treated as arrival.
const ARRIVAL_SQ: f32 = 0.01;

// ============================================================================
// Tuning
// ============================================================================

/// NPC behavior parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NpcTuning {
    /// Search for heroes automatically
    pub auto_target_hero: bool,
    /// Radius of the automatic hero search
    pub acquire_range: f32,
    /// Distance at which attacks may start
    pub attack_range: f32,
    /// Turn rate (slerp factor per second)
    pub turn_speed: f32,
    /// Distance to the target beyond which the NPC gives up
    pub leash_range: f32,
    /// Speed when walking back to spawn
    pub return_speed: f32,
    /// Move toward the target
    pub enable_movement: bool,
    /// Sprint when far from the target
    pub allow_sprint: bool,
    /// Chase speed
    pub walk_speed: f32,
    /// Chase speed beyond `sprint_distance`
    pub sprint_speed: f32,
    /// Distance beyond which sprinting starts
    pub sprint_distance: f32,
    /// How far inside attack range the NPC stops
    pub stopping_buffer: f32,
    /// Damage scale for resolved hits
    pub damage_scale: f32,
    /// Minimum seconds between attack attempts
    pub attack_delay: f32,
}

impl Default for NpcTuning {
    fn default() -> Self {
        Self {
            auto_target_hero: true,
            acquire_range: 5.0,
            attack_range: 1.9,
            turn_speed: 8.0,
            leash_range: 10.0,
            return_speed: 3.0,
            enable_movement: true,
            allow_sprint: true,
            walk_speed: 1.5,
            sprint_speed: 3.0,
            sprint_distance: 3.0,
            stopping_buffer: 0.35,
            damage_scale: 1.0,
            attack_delay: 1.0,
        }
    }
}

impl NpcTuning {
    /// Checks every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        const S: &str = "npc";
        for (field, value) in [
            ("acquire_range", self.acquire_range),
            ("attack_range", self.attack_range),
            ("turn_speed", self.turn_speed),
            ("return_speed", self.return_speed),
            ("walk_speed", self.walk_speed),
            ("sprint_speed", self.sprint_speed),
            ("sprint_distance", self.sprint_distance),
            ("stopping_buffer", self.stopping_buffer),
            ("damage_scale", self.damage_scale),
            ("attack_delay", self.attack_delay),
        ] {
            ConfigError::check_range(S, field, value, 0.0, f32::MAX)?;
        }
        ConfigError::check_range(S, "leash_range", self.leash_range, self.attack_range, f32::MAX)?;
        ConfigError::check_range(S, "acquire_range", self.acquire_range, 0.0, self.leash_range)
    }

    /// Returns a copy with non-negative values and
    /// `acquire_range <= leash_range >= attack_range`.
    #[must_use]
    pub fn sanitized(self) -> Self {
        let d = Self::default();
        let pos = |v: f32, fallback: f32| clamp_or(v, 0.0, f32::MAX, fallback);
        let attack_range = pos(self.attack_range, d.attack_range);
        let leash_range = clamp_or(self.leash_range, attack_range, f32::MAX, d.leash_range.max(attack_range));
        Self {
            acquire_range: clamp_or(self.acquire_range, 0.0, leash_range, d.acquire_range.min(leash_range)),
            attack_range,
            turn_speed: pos(self.turn_speed, d.turn_speed),
            leash_range,
            return_speed: pos(self.return_speed, d.return_speed),
            walk_speed: pos(self.walk_speed, d.walk_speed),
            sprint_speed: pos(self.sprint_speed, d.sprint_speed),
            sprint_distance: pos(self.sprint_distance, d.sprint_distance),
            stopping_buffer: pos(self.stopping_buffer, d.stopping_buffer),
            damage_scale: pos(self.damage_scale, d.damage_scale),
            attack_delay: pos(self.attack_delay, d.attack_delay),
            ..self
        }
    }
}

// ============================================================================
// World Interface
// ============================================================================

/// World queries the NPC controller needs.
pub trait NpcWorld {
    /// World position of `entity`, if it still exists.
    fn position_of(&self, entity: EntityId) -> Option<Vec3>;
    /// Whether `entity` exists and is alive.
    fn is_alive(&self, entity: EntityId) -> bool;
    /// Physical radius of `entity`, if known.
    fn body_radius(&self, entity: EntityId) -> Option<f32>;
    /// Nearest living hero within `max_range` of `origin`.
    fn find_hero(&self, origin: Vec3, max_range: f32) -> Option<EntityId>;
}

/// Mock NPC world for testing.
#[derive(Debug, Default)]
pub struct MockNpcWorld {
    bodies: AHashMap<EntityId, MockBody>,
    heroes: Vec<EntityId>,
}

#[derive(Debug, Clone, Copy)]
struct MockBody {
    position: Vec3,
    alive: bool,
    radius: Option<f32>,
}

impl MockNpcWorld {
    /// Creates an empty mock world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a body.
    pub fn set_body(&mut self, entity: EntityId, position: Vec3, radius: Option<f32>) {
        self.bodies.insert(
            entity,
            MockBody {
                position,
                alive: true,
                radius,
            },
        );
    }

    /// Adds a hero body.
    pub fn add_hero(&mut self, entity: EntityId, position: Vec3) {
        self.set_body(entity, position, None);
        self.heroes.push(entity);
    }

    /// Moves a body.
    pub fn move_body(&mut self, entity: EntityId, position: Vec3) {
        if let Some(body) = self.bodies.get_mut(&entity) {
            body.position = position;
        }
    }

    /// Marks a body dead or alive.
    pub fn set_alive(&mut self, entity: EntityId, alive: bool) {
        if let Some(body) = self.bodies.get_mut(&entity) {
            body.alive = alive;
        }
    }

    /// Removes a body.
    pub fn remove(&mut self, entity: EntityId) {
        self.bodies.remove(&entity);
        self.heroes.retain(|h| *h != entity);
    }
}

impl NpcWorld for MockNpcWorld {
    fn position_of(&self, entity: EntityId) -> Option<Vec3> {
        self.bodies.get(&entity).map(|b| b.position)
    }

    fn is_alive(&self, entity: EntityId) -> bool {
        self.bodies.get(&entity).is_some_and(|b| b.alive)
    }

    fn body_radius(&self, entity: EntityId) -> Option<f32> {
        self.bodies.get(&entity).and_then(|b| b.radius)
    }

    fn find_hero(&self, origin: Vec3, max_range: f32) -> Option<EntityId> {
        let mut best = None;
        let mut best_sq = max_range * max_range;
        for hero in &self.heroes {
            let Some(body) = self.bodies.get(hero) else {
                continue;
            };
            let d = (body.position - origin).length_squared();
            if body.alive && d <= best_sq {
                best_sq = d;
                best = Some(*hero);
            }
        }
        best
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Behavior state of an NPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NpcState {
    /// No target
    #[default]
    Idle,
    /// Chasing and attacking a target
    Engaging,
    /// Walking back to the spawn point after losing the target
    ReturningToSpawn,
}

/// Per-NPC decision state.
#[derive(Debug, Clone)]
pub struct NpcCombatController {
    tuning: NpcTuning,
    target: Option<EntityId>,
    override_target: Option<EntityId>,
    spawn: Transform,
    returning: bool,
    last_attack_time: f32,
    last_target_position: Option<Vec3>,
    colliders_disabled: bool,
}

impl NpcCombatController {
    /// Creates a controller. Out-of-range tuning values are clamped.
    #[must_use]
    pub fn new(tuning: NpcTuning) -> Self {
        if let Err(e) = tuning.validate() {
            warn!("{}; clamping NPC tuning", e);
        }
        Self {
            tuning: tuning.sanitized(),
            target: None,
            override_target: None,
            spawn: Transform::IDENTITY,
            returning: false,
            last_attack_time: f32::NEG_INFINITY,
            last_target_position: None,
            colliders_disabled: false,
        }
    }

    /// Sanitized tuning.
    #[must_use]
    pub const fn tuning(&self) -> &NpcTuning {
        &self.tuning
    }

    /// Current behavior state.
    #[must_use]
    pub const fn state(&self) -> NpcState {
        if self.returning {
            NpcState::ReturningToSpawn
        } else if self.target.is_some() {
            NpcState::Engaging
        } else {
            NpcState::Idle
        }
    }

    /// Current target.
    #[must_use]
    pub const fn target(&self) -> Option<EntityId> {
        self.target
    }

    /// Spawn point the NPC returns to.
    #[must_use]
    pub const fn spawn_transform(&self) -> &Transform {
        &self.spawn
    }

    /// Whether the NPC is walking back to spawn.
    #[must_use]
    pub const fn is_returning(&self) -> bool {
        self.returning
    }

    /// Whether the collision volumes were disabled on death.
    #[must_use]
    pub const fn colliders_disabled(&self) -> bool {
        self.colliders_disabled
    }

    /// Records the spawn point and looks for a target.
    pub fn on_activate(&mut self, entity: EntityId, transform: &Transform, world: &dyn NpcWorld) {
        self.spawn = *transform;
        self.acquire_target(transform.position, world);
        debug!("NPC {} activated at {:?}", entity, transform.position);
    }

    /// Sets the target directly and cancels a return to spawn.
    pub fn set_target(&mut self, target: Option<EntityId>) {
        self.target = target;
        self.returning = false;
    }

    /// Target preferred over automatic acquisition while alive.
    pub fn set_override_target(&mut self, target: Option<EntityId>) {
        self.override_target = target;
    }

    fn clear_target(&mut self) {
        self.target = None;
        self.last_attack_time = f32::NEG_INFINITY;
    }

    fn acquire_target(&mut self, origin: Vec3, world: &dyn NpcWorld) {
        if let Some(over) = self.override_target {
            if world.is_alive(over) && world.position_of(over).is_some() {
                self.set_target(Some(over));
                return;
            }
        }
        if !self.tuning.auto_target_hero {
            return;
        }
        if let Some(hero) = world.find_hero(origin, self.tuning.acquire_range) {
            if world.is_alive(hero) {
                debug!("NPC acquired {}", hero);
                self.set_target(Some(hero));
            }
        }
    }

    /// Resolves the current target, dropping or leashing it as needed.
    /// Returns the target position when engaged.
    fn ensure_target(&mut self, position: Vec3, world: &dyn NpcWorld) -> Option<(EntityId, Vec3)> {
        if let Some(target) = self.target {
            if !world.is_alive(target) || world.position_of(target).is_none() {
                trace!("NPC dropped target {}", target);
                self.target = None;
            }
        }
        if self.target.is_none() {
            self.acquire_target(position, world);
        }

        // Applies to a target acquired on this tick as well
        let target = self.target?;
        let target_pos = world.position_of(target)?;
        let leash = self.tuning.leash_range;
        if (target_pos - position).length_squared() > leash * leash {
            debug!("NPC leashed from {}; returning to spawn", target);
            self.clear_target();
            self.returning = true;
            return None;
        }
        Some((target, target_pos))
    }

    /// Advances the NPC by one tick. Does nothing while `agent` is dead.
    pub fn tick(
        &mut self,
        agent: &mut CombatAgent,
        transform: &mut Transform,
        world: &dyn NpcWorld,
        now: f32,
        dt: f32,
    ) -> NpcState {
        if !agent.is_alive() {
            return self.state();
        }

        match self.ensure_target(transform.position, world) {
            Some((target, target_pos)) => self.engage(agent, transform, world, target, target_pos, now, dt),
            None if self.returning => self.return_to_spawn(transform, dt),
            None => {},
        }
        self.state()
    }

    #[allow(clippy::too_many_arguments)]
    fn engage(
        &mut self,
        agent: &mut CombatAgent,
        transform: &mut Transform,
        world: &dyn NpcWorld,
        target: EntityId,
        target_pos: Vec3,
        now: f32,
        dt: f32,
    ) {
        let tuning = self.tuning;
        let to_target = target_pos - transform.position;
        let mut distance_sq = to_target.length_squared();
        let flat = flatten(to_target);

        if flat.length_squared() > DIRECTION_EPSILON_SQ {
            transform.rotation = turn_towards(transform.rotation, flat, dt * tuning.turn_speed);
        }

        if tuning.enable_movement && distance_sq > DIRECTION_EPSILON_SQ {
            let distance = distance_sq.sqrt();
            let clearance = match (world.body_radius(agent.id()), world.body_radius(target)) {
                (None, None) => DEFAULT_CLEARANCE,
                (a, b) => a.unwrap_or(0.0) + b.unwrap_or(0.0),
            };
            let stop = (tuning.attack_range - tuning.stopping_buffer).max(clearance);
            let move_dir = flat.normalize_or_zero();

            if distance > stop {
                let goal = match self.last_target_position {
                    Some(last) if (target_pos - last).length_squared() < TARGET_JITTER_SQ => last,
                    _ => {
                        self.last_target_position = Some(target_pos);
                        target_pos
                    },
                };
                let speed = if tuning.allow_sprint && distance > tuning.sprint_distance {
                    tuning.sprint_speed
                } else {
                    tuning.walk_speed
                };
                let desired = goal - move_dir * stop;
                let next = move_towards(transform.position, desired, speed * dt);
                transform.position = Vec3::new(next.x, transform.position.y, next.z);
                distance_sq = (target_pos - transform.position).length_squared();
            } else if distance < stop - RETREAT_HYSTERESIS {
                let step = (tuning.walk_speed * dt).min(stop - distance);
                transform.position -= move_dir * step;
            }
        }

        let range = tuning.attack_range;
        if distance_sq <= range * range
            && now >= self.last_attack_time + tuning.attack_delay
            && agent.try_start_attack(now)
        {
            trace!("NPC {} attacks {}", agent.id(), target);
            self.last_attack_time = now;
        }
    }

    fn return_to_spawn(&mut self, transform: &mut Transform, dt: f32) {
        let to_spawn = self.spawn.position - transform.position;
        let distance_sq = to_spawn.length_squared();
        if distance_sq <= ARRIVAL_SQ {
            self.arrive(transform);
            return;
        }

        let flat = flatten(to_spawn);
        if flat.length_squared() > DIRECTION_EPSILON_SQ {
            transform.rotation = turn_towards(transform.rotation, flat, dt * self.tuning.turn_speed);
        }

        let step = self.tuning.return_speed * dt;
        if step >= distance_sq.sqrt() {
            self.arrive(transform);
            return;
        }
        transform.position += flat.normalize_or_zero() * step;
    }

    fn arrive(&mut self, transform: &mut Transform) {
        *transform = self.spawn;
        self.returning = false;
        self.last_target_position = None;
        debug!("NPC back at spawn");
    }

    /// Hit moment of an NPC attack driven by an external animation event.
    ///
    /// Falls back to a whiff when the target is gone or dead.
    pub fn notify_attack_hit(
        &self,
        agent: &mut CombatAgent,
        targets: &mut dyn DamageableLookup,
        point: Vec3,
        normal: Vec3,
        now: f32,
    ) -> bool {
        match self.target {
            Some(target) if targets.is_alive(target) => agent.resolve_attack_hit(
                targets.damageable_mut(target),
                HitContact::new(point, normal),
                self.tuning.damage_scale,
                false,
                now,
            ),
            _ => {
                agent.notify_attack_animation_complete();
                false
            },
        }
    }

    /// Disables the NPC's collision volumes once after death.
    pub fn handle_died(&mut self, entity: EntityId, colliders: &mut dyn ColliderControl) {
        if self.colliders_disabled {
            return;
        }
        colliders.set_colliders_enabled(entity, false);
        self.colliders_disabled = true;
    }

    /// Re-enables collision volumes disabled by [`Self::handle_died`].
    pub fn handle_revived(&mut self, entity: EntityId, colliders: &mut dyn ColliderControl) {
        if !self.colliders_disabled {
            return;
        }
        colliders.set_colliders_enabled(entity, true);
        self.colliders_disabled = false;
    }
}

impl Default for NpcCombatController {
    fn default() -> Self {
        Self::new(NpcTuning::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::CombatSettings;
    use crate::registry::CombatRegistry;
    use crate::spatial::{ColliderWorld, SphereColliderDesc};
    use std::cell::RefCell;
    use std::rc::Rc;

    const DT: f32 = 0.1;

    struct Rig {
        npc: NpcCombatController,
        agent: CombatAgent,
        transform: Transform,
        world: MockNpcWorld,
        now: f32,
    }

    impl Rig {
        fn new(tuning: NpcTuning) -> Self {
            let agent = CombatAgent::new(EntityId::new(), CombatSettings::default()).with_seed(3);
            let mut world = MockNpcWorld::new();
            world.set_body(agent.id(), Vec3::ZERO, None);
            Self {
                npc: NpcCombatController::new(tuning),
                agent,
                transform: Transform::IDENTITY,
                world,
                now: 0.0,
            }
        }

        fn tick(&mut self) -> NpcState {
            self.now += DT;
            let state = self
                .npc
                .tick(&mut self.agent, &mut self.transform, &self.world, self.now, DT);
            self.world.move_body(self.agent.id(), self.transform.position);
            state
        }

        fn distance_to(&self, pos: Vec3) -> f32 {
            (pos - self.transform.position).length()
        }
    }

    fn attack_counter(agent: &mut CombatAgent) -> Rc<RefCell<u32>> {
        let count = Rc::new(RefCell::new(0));
        let c = Rc::clone(&count);
        agent.signals_mut().attack_started.subscribe(move |()| *c.borrow_mut() += 1);
        count
    }

    #[test]
    fn test_tuning_sanitized() {
        let t = NpcTuning {
            attack_range: 4.0,
            leash_range: 2.0,
            walk_speed: -1.0,
            ..NpcTuning::default()
        };
        assert!(t.validate().is_err());
        let t = t.sanitized();
        assert_eq!(t.leash_range, 4.0);
        assert_eq!(t.walk_speed, 0.0);
        assert!(NpcTuning::default().validate().is_ok());
    }

    #[test]
    fn test_acquire_range_capped_by_leash() {
        let t = NpcTuning {
            acquire_range: 15.0,
            leash_range: 10.0,
            ..NpcTuning::default()
        };
        assert!(matches!(
            t.validate(),
            Err(ConfigError::OutOfRange {
                field: "acquire_range",
                ..
            })
        ));
        assert_eq!(t.sanitized().acquire_range, 10.0);
        assert!(t.sanitized().validate().is_ok());
    }

    #[test]
    fn test_target_beyond_leash_is_never_chased() {
        let mut rig = Rig::new(NpcTuning {
            auto_target_hero: false,
            ..NpcTuning::default()
        });
        let far = EntityId::new();
        rig.world.set_body(far, Vec3::new(0.0, 0.0, 20.0), None);
        rig.npc.set_override_target(Some(far));

        for _ in 0..10 {
            assert_ne!(rig.tick(), NpcState::Engaging);
            assert_eq!(rig.npc.target(), None);
            assert_eq!(rig.transform.position, Vec3::ZERO);
        }
    }

    #[test]
    fn test_hero_acquired_past_leash_is_dropped() {
        // Unsanitized tuning reached through a direct field write
        let mut rig = Rig::new(NpcTuning::default());
        rig.npc.tuning.acquire_range = 15.0;
        let hero = EntityId::new();
        rig.world.add_hero(hero, Vec3::new(0.0, 0.0, 12.0));

        for _ in 0..10 {
            assert_ne!(rig.tick(), NpcState::Engaging);
            assert_eq!(rig.transform.position, Vec3::ZERO);
        }
    }

    #[test]
    fn test_idle_without_hero_in_range() {
        let mut rig = Rig::new(NpcTuning::default());
        rig.world.add_hero(EntityId::new(), Vec3::new(0.0, 0.0, 6.0));
        assert_eq!(rig.tick(), NpcState::Idle);
        assert_eq!(rig.transform.position, Vec3::ZERO);
    }

    #[test]
    fn test_sprints_then_walks_toward_hero() {
        let mut rig = Rig::new(NpcTuning::default());
        let hero = EntityId::new();
        let hero_pos = Vec3::new(0.0, 0.0, 4.0);
        rig.world.add_hero(hero, hero_pos);

        assert_eq!(rig.tick(), NpcState::Engaging);
        assert_eq!(rig.npc.target(), Some(hero));
        assert!((rig.transform.position.z - 0.3).abs() < 1e-4);

        // 3.7 away is still sprinting, then walking inside sprint distance
        rig.tick();
        rig.tick();
        rig.tick();
        let before = rig.transform.position.z;
        rig.tick();
        assert!((rig.transform.position.z - before - 0.15).abs() < 1e-4);
    }

    #[test]
    fn test_faces_target() {
        let mut rig = Rig::new(NpcTuning {
            enable_movement: false,
            ..NpcTuning::default()
        });
        rig.world.add_hero(EntityId::new(), Vec3::new(3.0, 0.0, 0.0));
        for _ in 0..30 {
            rig.tick();
        }
        assert!((rig.transform.forward() - Vec3::X).length() < 1e-3);
        assert_eq!(rig.transform.position, Vec3::ZERO);
    }

    #[test]
    fn test_closes_gap_and_attacks_same_tick() {
        let mut rig = Rig::new(NpcTuning::default());
        let started = attack_counter(&mut rig.agent);
        rig.world.add_hero(EntityId::new(), Vec3::new(0.0, 0.0, 2.0));

        rig.tick();
        assert!(rig.distance_to(Vec3::new(0.0, 0.0, 2.0)) < 1.9);
        assert_eq!(*started.borrow(), 1);
    }

    #[test]
    fn test_attack_delay_gates_attempts() {
        let mut rig = Rig::new(NpcTuning {
            enable_movement: false,
            ..NpcTuning::default()
        });
        let started = attack_counter(&mut rig.agent);
        rig.world.add_hero(EntityId::new(), Vec3::new(0.0, 0.0, 1.0));

        for _ in 0..5 {
            rig.tick();
        }
        assert_eq!(*started.borrow(), 1);
        for _ in 0..7 {
            rig.tick();
        }
        assert_eq!(*started.borrow(), 2);
    }

    #[test]
    fn test_retreats_when_too_close() {
        let mut rig = Rig::new(NpcTuning::default());
        let hero_pos = Vec3::new(0.0, 0.0, 0.5);
        rig.world.add_hero(EntityId::new(), hero_pos);

        rig.tick();
        assert!((rig.distance_to(hero_pos) - 0.65).abs() < 1e-4);
    }

    #[test]
    fn test_holds_inside_hysteresis_band() {
        let mut rig = Rig::new(NpcTuning::default());
        // stop distance is 1.55; 1.52 is inside the band
        let hero_pos = Vec3::new(0.0, 0.0, 1.52);
        rig.world.add_hero(EntityId::new(), hero_pos);
        rig.tick();
        assert_eq!(rig.transform.position, Vec3::ZERO);
    }

    #[test]
    fn test_body_radii_set_clearance() {
        let mut rig = Rig::new(NpcTuning::default());
        rig.world.set_body(rig.agent.id(), Vec3::ZERO, Some(1.0));
        let hero = EntityId::new();
        rig.world.add_hero(hero, Vec3::new(0.0, 0.0, 4.0));
        rig.world.set_body(hero, Vec3::new(0.0, 0.0, 4.0), Some(1.0));
        for _ in 0..40 {
            rig.tick();
        }
        assert!((rig.distance_to(Vec3::new(0.0, 0.0, 4.0)) - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_leash_and_return_to_spawn() {
        let mut rig = Rig::new(NpcTuning::default());
        let hero = EntityId::new();
        rig.world.add_hero(hero, Vec3::new(0.0, 0.0, 4.0));
        rig.npc.on_activate(rig.agent.id(), &rig.transform, &rig.world);
        assert_eq!(rig.npc.state(), NpcState::Engaging);

        for _ in 0..5 {
            rig.tick();
        }
        assert!(rig.transform.position.z > 0.5);

        rig.world.move_body(hero, Vec3::new(0.0, 0.0, 20.0));
        assert_eq!(rig.tick(), NpcState::ReturningToSpawn);
        assert_eq!(rig.npc.target(), None);

        let mut state = NpcState::ReturningToSpawn;
        for _ in 0..50 {
            state = rig.tick();
            if state == NpcState::Idle {
                break;
            }
        }
        assert_eq!(state, NpcState::Idle);
        assert_eq!(rig.transform, *rig.npc.spawn_transform());
    }

    #[test]
    fn test_reacquire_cancels_return() {
        let mut rig = Rig::new(NpcTuning::default());
        let hero = EntityId::new();
        rig.world.add_hero(hero, Vec3::new(0.0, 0.0, 4.0));
        rig.tick();
        rig.world.move_body(hero, Vec3::new(0.0, 0.0, 20.0));
        assert_eq!(rig.tick(), NpcState::ReturningToSpawn);

        rig.npc.set_target(Some(hero));
        assert!(!rig.npc.is_returning());
        assert_eq!(rig.npc.state(), NpcState::Engaging);
    }

    #[test]
    fn test_dead_target_dropped_and_replaced() {
        let mut rig = Rig::new(NpcTuning {
            enable_movement: false,
            ..NpcTuning::default()
        });
        let first = EntityId::new();
        let second = EntityId::new();
        rig.world.add_hero(first, Vec3::new(0.0, 0.0, 2.0));
        rig.world.add_hero(second, Vec3::new(0.0, 0.0, 3.0));

        rig.tick();
        assert_eq!(rig.npc.target(), Some(first));
        rig.world.set_alive(first, false);
        rig.tick();
        assert_eq!(rig.npc.target(), Some(second));

        rig.world.remove(second);
        assert_eq!(rig.tick(), NpcState::Idle);
    }

    #[test]
    fn test_override_target_wins() {
        let mut rig = Rig::new(NpcTuning {
            auto_target_hero: false,
            ..NpcTuning::default()
        });
        let hero = EntityId::new();
        let decoy = EntityId::new();
        rig.world.add_hero(hero, Vec3::new(0.0, 0.0, 2.0));
        rig.world.set_body(decoy, Vec3::new(0.0, 0.0, 8.0), None);

        assert_eq!(rig.tick(), NpcState::Idle);
        rig.npc.set_override_target(Some(decoy));
        assert_eq!(rig.tick(), NpcState::Engaging);
        assert_eq!(rig.npc.target(), Some(decoy));
    }

    #[test]
    fn test_dead_agent_does_nothing() {
        let mut rig = Rig::new(NpcTuning::default());
        rig.world.add_hero(EntityId::new(), Vec3::new(0.0, 0.0, 2.0));
        rig.agent
            .apply_damage(crate::damage::DamageInfo::new(1000.0, crate::damage::DamageType::True), 0.0);
        assert_eq!(rig.tick(), NpcState::Idle);
        assert_eq!(rig.transform, Transform::IDENTITY);
    }

    #[test]
    fn test_notify_attack_hit() {
        let mut registry = CombatRegistry::new();
        let hero = CombatAgent::new(EntityId::new(), CombatSettings::default());
        let hero_id = hero.id();
        registry.insert(hero).unwrap();

        let mut npc_agent = CombatAgent::new(EntityId::new(), CombatSettings::default().with_variance(0.0));
        let mut npc = NpcCombatController::new(NpcTuning {
            damage_scale: 2.0,
            ..NpcTuning::default()
        });

        assert!(!npc.notify_attack_hit(&mut npc_agent, &mut registry, Vec3::ZERO, Vec3::Z, 1.0));

        npc.set_target(Some(hero_id));
        assert!(npc.notify_attack_hit(&mut npc_agent, &mut registry, Vec3::ZERO, Vec3::Z, 1.0));
        assert_eq!(registry.get(hero_id).unwrap().current_health(), 80.0);
    }

    #[test]
    fn test_collider_toggle_is_idempotent() {
        let mut colliders = ColliderWorld::new();
        let entity = EntityId::new();
        colliders.add(SphereColliderDesc::new(entity, 0.5), Vec3::ZERO);
        let mut npc = NpcCombatController::default();

        npc.handle_revived(entity, &mut colliders);
        assert!(colliders.has_enabled_colliders(entity));

        npc.handle_died(entity, &mut colliders);
        npc.handle_died(entity, &mut colliders);
        assert!(npc.colliders_disabled());
        assert!(!colliders.has_enabled_colliders(entity));

        npc.handle_revived(entity, &mut colliders);
        assert!(!npc.colliders_disabled());
        assert!(colliders.has_enabled_colliders(entity));
    }
}
