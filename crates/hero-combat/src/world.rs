//! Host-loop composition of agents, bodies, colliders, weapons and NPC brains.
//!
//! [`CombatWorld`] owns everything by entity id. It does not run a loop of
//! its own: the host calls the tick methods in its chosen order, typically
//! NPC decisions, then animation, then attack windows, then event dispatch.

use ahash::AHashMap;
use hero_common::{EntityId, Transform, Vec3};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::agent::{CombatAgent, CombatSettings};
use crate::attack_window::{AnimatorLookup, AttackWindow, AttackWindowDriver};
use crate::events::{CombatEvent, EventBus};
use crate::melee::{MeleeWeapon, MeleeWeaponConfig, SwingOutcome};
use crate::npc::{NpcCombatController, NpcState, NpcTuning, NpcWorld};
use crate::registry::CombatRegistry;
use crate::spatial::{ColliderWorld, SphereColliderDesc};

/// Errors from world bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    /// No character with this id
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),
    /// Id already in use
    #[error("entity {0} is already registered")]
    AlreadyRegistered(EntityId),
    /// Character has no NPC controller
    #[error("entity {0} is not an NPC")]
    NotAnNpc(EntityId),
}

/// Result type for world operations.
pub type WorldResult<T> = Result<T, WorldError>;

/// Physical body of a character.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    /// Position and facing
    pub transform: Transform,
    /// Collision radius
    pub radius: f32,
    /// Whether NPCs may auto-target this body
    pub hero: bool,
}

/// Parameters for [`CombatWorld::spawn_character`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnParams {
    /// Combat settings
    pub settings: CombatSettings,
    /// Initial transform
    pub transform: Transform,
    /// Collision radius
    pub radius: f32,
    /// Hero flag
    pub hero: bool,
    /// Collider layer
    pub layer: u8,
    /// Damage-variance seed
    pub seed: Option<u64>,
}

impl SpawnParams {
    /// Non-hero character at `transform` with default settings.
    #[must_use]
    pub fn new(transform: Transform) -> Self {
        Self {
            settings: CombatSettings::default(),
            transform,
            radius: 0.4,
            hero: false,
            layer: 0,
            seed: None,
        }
    }

    /// Sets combat settings.
    #[must_use]
    pub const fn with_settings(mut self, settings: CombatSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Marks the character as a hero.
    #[must_use]
    pub const fn as_hero(mut self) -> Self {
        self.hero = true;
        self
    }

    /// Sets the collision radius.
    #[must_use]
    pub const fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    /// Sets the collider layer.
    #[must_use]
    pub const fn with_layer(mut self, layer: u8) -> Self {
        self.layer = layer;
        self
    }

    /// Seeds the damage-variance generator.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Read-only world view handed to NPC controllers.
struct WorldView<'a> {
    registry: &'a CombatRegistry,
    bodies: &'a AHashMap<EntityId, Body>,
    heroes: &'a [EntityId],
}

impl NpcWorld for WorldView<'_> {
    fn position_of(&self, entity: EntityId) -> Option<Vec3> {
        self.bodies.get(&entity).map(|b| b.transform.position)
    }

    fn is_alive(&self, entity: EntityId) -> bool {
        self.registry.get(entity).is_some_and(CombatAgent::is_alive)
    }

    fn body_radius(&self, entity: EntityId) -> Option<f32> {
        self.bodies.get(&entity).map(|b| b.radius)
    }

    fn find_hero(&self, origin: Vec3, max_range: f32) -> Option<EntityId> {
        let mut best = None;
        let mut best_sq = max_range * max_range;
        for hero in self.heroes {
            if !self.is_alive(*hero) {
                continue;
            }
            let Some(pos) = self.position_of(*hero) else {
                continue;
            };
            let d = (pos - origin).length_squared();
            if d <= best_sq && (best.is_none() || d < best_sq) {
                best_sq = d;
                best = Some(*hero);
            }
        }
        best
    }
}

/// Every combat participant of a scene.
#[derive(Debug, Default)]
pub struct CombatWorld {
    registry: CombatRegistry,
    bodies: AHashMap<EntityId, Body>,
    colliders: ColliderWorld,
    weapons: AHashMap<EntityId, MeleeWeapon>,
    drivers: Vec<(EntityId, AttackWindowDriver)>,
    npcs: Vec<(EntityId, NpcCombatController)>,
    heroes: Vec<EntityId>,
    bus: EventBus,
}

impl CombatWorld {
    /// Creates an empty world with a default-sized event bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty world with an event bus of `capacity`.
    #[must_use]
    pub fn with_event_capacity(capacity: usize) -> Self {
        Self {
            bus: EventBus::new(capacity),
            ..Self::default()
        }
    }

    // ====== Spawning ======

    /// Spawns a character with a body, one sphere collider and a combat agent.
    pub fn spawn_character(&mut self, params: SpawnParams) -> WorldResult<EntityId> {
        let id = EntityId::new();
        let mut agent = CombatAgent::new(id, params.settings);
        if let Some(seed) = params.seed {
            agent = agent.with_seed(seed);
        }
        self.bus.attach(&mut agent);
        agent.on_activate();
        self.registry.insert(agent)?;

        let radius = params.radius.max(0.0);
        self.bodies.insert(
            id,
            Body {
                transform: params.transform,
                radius,
                hero: params.hero,
            },
        );
        self.colliders.add(
            SphereColliderDesc::new(id, radius).with_layer(params.layer),
            params.transform.position,
        );
        if params.hero {
            self.heroes.push(id);
        }
        info!("Spawned {} {}", if params.hero { "hero" } else { "character" }, id);
        Ok(id)
    }

    /// Gives a character a melee weapon, replacing any previous one.
    pub fn equip_weapon(&mut self, entity: EntityId, config: MeleeWeaponConfig) -> WorldResult<()> {
        self.require(entity)?;
        self.weapons.insert(entity, MeleeWeapon::new(config));
        Ok(())
    }

    /// Drives the character's weapon from animation windows.
    pub fn attach_attack_windows(&mut self, entity: EntityId, windows: Vec<AttackWindow>) -> WorldResult<()> {
        self.require(entity)?;
        let driver = AttackWindowDriver::new(windows);
        match self.drivers.iter_mut().find(|(id, _)| *id == entity) {
            Some((_, existing)) => *existing = driver,
            None => self.drivers.push((entity, driver)),
        }
        Ok(())
    }

    /// Gives a character an NPC brain and records its spawn point.
    pub fn make_npc(&mut self, entity: EntityId, tuning: NpcTuning) -> WorldResult<()> {
        let body = *self.bodies.get(&entity).ok_or(WorldError::UnknownEntity(entity))?;
        let mut npc = NpcCombatController::new(tuning);
        let view = WorldView {
            registry: &self.registry,
            bodies: &self.bodies,
            heroes: &self.heroes,
        };
        npc.on_activate(entity, &body.transform, &view);
        match self.npcs.iter_mut().find(|(id, _)| *id == entity) {
            Some((_, existing)) => *existing = npc,
            None => self.npcs.push((entity, npc)),
        }
        Ok(())
    }

    /// Removes a character and everything attached to it.
    pub fn despawn(&mut self, entity: EntityId) -> WorldResult<CombatAgent> {
        let agent = self.registry.remove(entity).ok_or(WorldError::UnknownEntity(entity))?;
        self.bodies.remove(&entity);
        self.colliders.remove_root(entity);
        self.weapons.remove(&entity);
        self.drivers.retain(|(id, _)| *id != entity);
        self.npcs.retain(|(id, _)| *id != entity);
        self.heroes.retain(|id| *id != entity);
        debug!("Despawned {}", entity);
        Ok(agent)
    }

    fn require(&self, entity: EntityId) -> WorldResult<()> {
        if self.registry.contains(entity) {
            Ok(())
        } else {
            Err(WorldError::UnknownEntity(entity))
        }
    }

    // ====== Accessors ======

    /// Combat agent of `entity`.
    #[must_use]
    pub fn agent(&self, entity: EntityId) -> Option<&CombatAgent> {
        self.registry.get(entity)
    }

    /// Mutable combat agent of `entity`.
    pub fn agent_mut(&mut self, entity: EntityId) -> Option<&mut CombatAgent> {
        self.registry.get_mut(entity)
    }

    /// Body of `entity`.
    #[must_use]
    pub fn body(&self, entity: EntityId) -> Option<&Body> {
        self.bodies.get(&entity)
    }

    /// Current transform of `entity`.
    #[must_use]
    pub fn transform(&self, entity: EntityId) -> Option<Transform> {
        self.bodies.get(&entity).map(|b| b.transform)
    }

    /// Moves a character and its colliders.
    pub fn set_transform(&mut self, entity: EntityId, transform: Transform) -> WorldResult<()> {
        let body = self.bodies.get_mut(&entity).ok_or(WorldError::UnknownEntity(entity))?;
        body.transform = transform;
        self.colliders.sync_root(entity, transform.position);
        Ok(())
    }

    /// NPC controller of `entity`.
    #[must_use]
    pub fn npc(&self, entity: EntityId) -> Option<&NpcCombatController> {
        self.npcs.iter().find(|(id, _)| *id == entity).map(|(_, n)| n)
    }

    /// Mutable NPC controller of `entity`.
    pub fn npc_mut(&mut self, entity: EntityId) -> Option<&mut NpcCombatController> {
        self.npcs.iter_mut().find(|(id, _)| *id == entity).map(|(_, n)| n)
    }

    /// Behavior state of the NPC `entity`.
    #[must_use]
    pub fn npc_state(&self, entity: EntityId) -> Option<NpcState> {
        self.npc(entity).map(NpcCombatController::state)
    }

    /// Ids of NPCs in tick order.
    pub fn npc_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.npcs.iter().map(|(id, _)| *id)
    }

    /// Ids of heroes in spawn order.
    #[must_use]
    pub fn heroes(&self) -> &[EntityId] {
        &self.heroes
    }

    /// Agent registry.
    #[must_use]
    pub const fn registry(&self) -> &CombatRegistry {
        &self.registry
    }

    /// Collider world.
    #[must_use]
    pub const fn colliders(&self) -> &ColliderWorld {
        &self.colliders
    }

    /// Event bus.
    #[must_use]
    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }

    // ====== Ticking ======

    /// Runs one decision step for every NPC in spawn order.
    pub fn tick_npcs(&mut self, now: f32, dt: f32) {
        let Self {
            registry,
            bodies,
            colliders,
            npcs,
            heroes,
            ..
        } = self;

        for (id, npc) in npcs.iter_mut() {
            let Some(before) = bodies.get(id).map(|b| b.transform) else {
                continue;
            };
            let mut transform = before;
            registry.with_checked_out(*id, |agent, rest| {
                let view = WorldView {
                    registry: rest,
                    bodies: &*bodies,
                    heroes: heroes.as_slice(),
                };
                npc.tick(agent, &mut transform, &view, now, dt);
            });
            if transform != before {
                if let Some(body) = bodies.get_mut(id) {
                    body.transform = transform;
                }
                colliders.sync_root(*id, transform.position);
            }
        }
    }

    /// Polls every attack-window driver and swings weapons whose window opened.
    pub fn tick_attack_windows(&mut self, now: f32, animators: &dyn AnimatorLookup) -> Vec<(EntityId, SwingOutcome)> {
        let Self {
            registry,
            bodies,
            colliders,
            weapons,
            drivers,
            ..
        } = self;

        let mut outcomes = Vec::new();
        for (id, driver) in drivers.iter_mut() {
            let id = *id;
            driver.tick(animators.animator(id), |_| {
                let outcome = swing(registry, bodies, colliders, weapons, id, now);
                outcomes.push((id, outcome));
            });
        }
        outcomes
    }

    /// Swings the weapon of `entity` immediately.
    pub fn perform_attack(&mut self, entity: EntityId, now: f32) -> WorldResult<SwingOutcome> {
        self.require(entity)?;
        Ok(swing(
            &mut self.registry,
            &self.bodies,
            &self.colliders,
            &mut self.weapons,
            entity,
            now,
        ))
    }

    /// Starts an attack on `entity` if its cooldown allows.
    pub fn try_start_attack(&mut self, entity: EntityId, now: f32) -> WorldResult<bool> {
        let agent = self.registry.get_mut(entity).ok_or(WorldError::UnknownEntity(entity))?;
        Ok(agent.try_start_attack(now))
    }

    /// Resolves an NPC attack against its current target.
    pub fn notify_npc_attack_hit(&mut self, entity: EntityId, point: Vec3, normal: Vec3, now: f32) -> WorldResult<bool> {
        self.require(entity)?;
        let npc = self
            .npcs
            .iter()
            .find(|(id, _)| *id == entity)
            .map(|(_, n)| n)
            .ok_or(WorldError::NotAnNpc(entity))?;
        self.registry
            .with_checked_out(entity, |agent, rest| npc.notify_attack_hit(agent, rest, point, normal, now))
            .ok_or(WorldError::UnknownEntity(entity))
    }

    /// Drains pending combat events and syncs NPC colliders with life state.
    ///
    /// Colliders follow each agent's alive flag rather than the drained
    /// `Died`/`Revived` events, so a saturated bus cannot leave a corpse
    /// with live hitboxes. Returns the drained events in publish order.
    pub fn dispatch_events(&mut self) -> Vec<CombatEvent> {
        let events = self.bus.drain();
        let Self { registry, colliders, npcs, .. } = self;
        for (id, npc) in npcs.iter_mut() {
            let alive = registry.get(*id).is_some_and(CombatAgent::is_alive);
            if !alive && !npc.colliders_disabled() {
                npc.handle_died(*id, colliders);
            } else if alive && npc.colliders_disabled() {
                npc.handle_revived(*id, colliders);
            }
        }
        events
    }
}

fn swing(
    registry: &mut CombatRegistry,
    bodies: &AHashMap<EntityId, Body>,
    colliders: &ColliderWorld,
    weapons: &mut AHashMap<EntityId, MeleeWeapon>,
    entity: EntityId,
    now: f32,
) -> SwingOutcome {
    let Some(weapon) = weapons.get_mut(&entity) else {
        warn!("{} swung without a weapon", entity);
        return SwingOutcome::Inactive;
    };
    let Some(transform) = bodies.get(&entity).map(|b| b.transform) else {
        return SwingOutcome::Inactive;
    };
    registry
        .with_checked_out(entity, |agent, rest| {
            weapon.perform_attack(Some(agent), &transform, colliders, rest, now)
        })
        .unwrap_or(SwingOutcome::Inactive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attack_window::{AnimationStateInfo, AnimationStateSource};
    use crate::damage::{DamageInfo, DamageType};
    use crate::spatial::SpatialQuery;

    fn duel() -> (CombatWorld, EntityId, EntityId) {
        let mut world = CombatWorld::new();
        let hero = world
            .spawn_character(
                SpawnParams::new(Transform::IDENTITY)
                    .as_hero()
                    .with_settings(CombatSettings::default().with_variance(0.0))
                    .with_seed(1),
            )
            .unwrap();
        let npc = world
            .spawn_character(
                SpawnParams::new(Transform::looking_along(Vec3::new(0.0, 0.0, 4.0), Vec3::NEG_Z))
                    .with_settings(CombatSettings::default().with_variance(0.0))
                    .with_seed(2),
            )
            .unwrap();
        world.equip_weapon(hero, MeleeWeaponConfig::default()).unwrap();
        world.equip_weapon(npc, MeleeWeaponConfig::default()).unwrap();
        world.make_npc(npc, NpcTuning::default()).unwrap();
        world.dispatch_events();
        (world, hero, npc)
    }

    struct FixedAnimator {
        time: f32,
    }

    impl AnimationStateSource for FixedAnimator {
        fn layer_count(&self) -> usize {
            2
        }

        fn current_state(&self, layer: usize) -> Option<AnimationStateInfo<'_>> {
            (layer == 1).then_some(AnimationStateInfo {
                name: "Attack",
                normalized_time: self.time,
                looping: false,
            })
        }
    }

    struct Animators {
        entity: EntityId,
        animator: FixedAnimator,
    }

    impl AnimatorLookup for Animators {
        fn animator(&self, entity: EntityId) -> Option<&dyn AnimationStateSource> {
            (entity == self.entity).then_some(&self.animator as &dyn AnimationStateSource)
        }
    }

    #[test]
    fn test_spawn_publishes_initial_health() {
        let mut world = CombatWorld::new();
        let id = world.spawn_character(SpawnParams::new(Transform::IDENTITY)).unwrap();
        let events = world.dispatch_events();
        assert_eq!(
            events,
            vec![CombatEvent::HealthChanged {
                entity: id,
                current: 100.0,
                max: 100.0
            }]
        );
        assert_eq!(world.colliders().len(), 1);
    }

    #[test]
    fn test_npc_acquires_and_closes_in() {
        let (mut world, hero, npc) = duel();
        assert_eq!(world.npc_state(npc), Some(NpcState::Engaging));
        assert_eq!(world.npc(npc).unwrap().target(), Some(hero));

        let mut now = 0.0;
        let mut started = false;
        for _ in 0..30 {
            now += 0.1;
            world.tick_npcs(now, 0.1);
            started |= world
                .dispatch_events()
                .iter()
                .any(|e| matches!(e, CombatEvent::AttackStarted { entity } if *entity == npc));
        }
        assert!(started);
        let pos = world.transform(npc).unwrap().position;
        assert!(pos.z < 2.0);

        let mut hits = Vec::new();
        world
            .colliders()
            .overlap_sphere(pos, 0.01, Default::default(), &mut hits);
        assert!(hits.iter().any(|h| h.root == npc));
    }

    #[test]
    fn test_hero_swing_damages_npc() {
        let (mut world, hero, npc) = duel();
        world
            .set_transform(npc, Transform::looking_along(Vec3::new(0.0, 0.0, 1.5), Vec3::NEG_Z))
            .unwrap();

        let outcome = world.perform_attack(hero, 1.0).unwrap();
        assert!(matches!(outcome, SwingOutcome::Hit { target, delivered: true, .. } if target == npc));
        assert_eq!(world.agent(npc).unwrap().current_health(), 90.0);

        let events = world.dispatch_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, CombatEvent::DamageTaken { entity, .. } if *entity == npc)));
        assert!(events
            .iter()
            .any(|e| matches!(e, CombatEvent::AttackPerformed { entity } if *entity == hero)));
    }

    #[test]
    fn test_npc_death_toggles_colliders() {
        let (mut world, _hero, npc) = duel();
        world
            .agent_mut(npc)
            .unwrap()
            .apply_damage(DamageInfo::new(500.0, DamageType::True), 1.0);
        world.dispatch_events();
        assert!(world.npc(npc).unwrap().colliders_disabled());
        assert!(!world.colliders().has_enabled_colliders(npc));

        world.agent_mut(npc).unwrap().revive(1.0);
        world.dispatch_events();
        assert!(world.colliders().has_enabled_colliders(npc));
    }

    #[test]
    fn test_colliders_follow_death_when_bus_overflows() {
        let mut world = CombatWorld::with_event_capacity(2);
        let npc = world.spawn_character(SpawnParams::new(Transform::IDENTITY)).unwrap();
        world.make_npc(npc, NpcTuning::default()).unwrap();
        world.dispatch_events();

        // Damage, health and death events overflow a two-slot bus
        world
            .agent_mut(npc)
            .unwrap()
            .apply_damage(DamageInfo::new(500.0, DamageType::True), 1.0);
        let events = world.dispatch_events();
        assert!(!events.iter().any(|e| matches!(e, CombatEvent::Died { .. })));
        assert!(world.npc(npc).unwrap().colliders_disabled());
        assert!(!world.colliders().has_enabled_colliders(npc));

        world.agent_mut(npc).unwrap().revive(1.0);
        world.dispatch_events();
        assert!(!world.npc(npc).unwrap().colliders_disabled());
        assert!(world.colliders().has_enabled_colliders(npc));
    }

    #[test]
    fn test_attack_window_drives_swing() {
        let (mut world, hero, npc) = duel();
        world
            .set_transform(npc, Transform::looking_along(Vec3::new(0.0, 0.0, 1.2), Vec3::NEG_Z))
            .unwrap();
        world.attach_attack_windows(hero, vec![AttackWindow::default()]).unwrap();

        let mut animators = Animators {
            entity: hero,
            animator: FixedAnimator { time: 0.1 },
        };
        assert!(world.tick_attack_windows(0.5, &animators).is_empty());

        animators.animator.time = 0.3;
        let outcomes = world.tick_attack_windows(0.6, &animators);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].0, hero);

        animators.animator.time = 0.35;
        assert!(world.tick_attack_windows(0.7, &animators).is_empty());
        assert_eq!(world.agent(npc).unwrap().current_health(), 90.0);
    }

    #[test]
    fn test_npc_attack_hit_resolves_against_target() {
        let (mut world, hero, npc) = duel();
        assert!(world.notify_npc_attack_hit(npc, Vec3::ZERO, Vec3::NEG_Z, 1.0).unwrap());
        assert_eq!(world.agent(hero).unwrap().current_health(), 90.0);
        assert_eq!(
            world.notify_npc_attack_hit(hero, Vec3::ZERO, Vec3::Z, 1.0),
            Err(WorldError::NotAnNpc(hero))
        );
    }

    #[test]
    fn test_missing_weapon_is_inactive() {
        let mut world = CombatWorld::new();
        let id = world.spawn_character(SpawnParams::new(Transform::IDENTITY)).unwrap();
        assert_eq!(world.perform_attack(id, 0.0), Ok(SwingOutcome::Inactive));
    }

    #[test]
    fn test_despawn_cleans_up() {
        let (mut world, hero, npc) = duel();
        let agent = world.despawn(hero).unwrap();
        assert_eq!(agent.id(), hero);
        assert!(world.heroes().is_empty());
        assert!(world.agent(hero).is_none());
        assert!(!world.colliders().has_enabled_colliders(hero));
        assert_eq!(world.despawn(hero).unwrap_err(), WorldError::UnknownEntity(hero));
        assert_eq!(world.perform_attack(hero, 0.0), Err(WorldError::UnknownEntity(hero)));

        world.tick_npcs(1.0, 0.1);
        assert_eq!(world.npc_state(npc), Some(NpcState::Idle));
    }

    #[test]
    fn test_try_start_attack_respects_cooldown() {
        let (mut world, hero, _npc) = duel();
        assert_eq!(world.try_start_attack(hero, 1.0), Ok(true));
        assert_eq!(world.try_start_attack(hero, 1.2), Ok(false));
        assert_eq!(world.npc_ids().count(), 1);
    }
}
