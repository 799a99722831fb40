//! Duel runner.
//!
//! One fixed step runs, in order: the hero script, NPC decisions, event
//! dispatch (new attacks start their clips), animation, NPC hit moments,
//! attack windows, and a final event dispatch.

use crate::animation::AnimatorBank;
use crate::config::{ClipConfig, ScenarioConfig};
use crate::hero::{HeroAction, HeroScript};
use crate::timing::SimClock;
use anyhow::{Context, Result};
use hero_combat::prelude::{CombatEvent, CombatHud, CombatWorld, DamageInfo, SpawnParams, SwingOutcome};
use hero_common::{flatten, EntityId, Quat, Transform, Vec3};
use tracing::{debug, info, trace, warn};

/// Frame length fed to the clock; the clock turns it into fixed steps.
const FRAME_DT: f32 = 1.0 / 30.0;

/// Extra animator layers beyond the highest configured one.
const BASE_LAYERS: usize = 1;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every NPC died
    HeroWon,
    /// The hero died
    HeroDied,
    /// Duration elapsed with both sides standing
    TimedOut,
}

/// Counters collected over a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DuelStats {
    /// Hero swings that connected
    pub hero_hits: u32,
    /// Hero swings with no target
    pub hero_whiffs: u32,
    /// NPC attacks that delivered damage
    pub npc_hits: u32,
    /// Damage taken by the hero
    pub hero_damage_taken: f32,
    /// Damage dealt by the hero
    pub hero_damage_dealt: f32,
}

/// Logs the hero's health as a HUD would display it.
#[derive(Debug, Default)]
struct LogHud {
    last_shown: Option<f32>,
}

impl CombatHud for LogHud {
    fn handle_health_changed(&mut self, current: f32, max: f32) {
        if self.last_shown != Some(current) {
            info!("HUD health {:.0}/{:.0}", current, max);
            self.last_shown = Some(current);
        }
    }

    fn handle_block_state(&mut self, blocking: bool) {
        debug!("HUD block {}", if blocking { "up" } else { "down" });
    }

    fn handle_death(&mut self) {
        info!("HUD: hero down");
    }
}

/// Per-NPC host state.
#[derive(Debug, Clone)]
struct NpcRig {
    entity: EntityId,
    name: String,
    clip: ClipConfig,
    impact_time: f32,
    impact_pending: bool,
}

/// A running duel.
#[derive(Debug)]
pub struct Simulation {
    world: CombatWorld,
    animators: AnimatorBank,
    clock: SimClock,
    duration: f32,
    hero: EntityId,
    hero_clip: ClipConfig,
    hero_script: HeroScript,
    npcs: Vec<NpcRig>,
    stats: DuelStats,
}

impl Simulation {
    /// Builds the world described by `config`.
    pub fn new(config: &ScenarioConfig) -> Result<Self> {
        let mut world = CombatWorld::new();
        let mut animators = AnimatorBank::new();

        let hero_cfg = &config.hero;
        let hero = world
            .spawn_character(
                SpawnParams::new(Transform::from_position(hero_cfg.position))
                    .as_hero()
                    .with_settings(hero_cfg.settings)
                    .with_radius(hero_cfg.radius)
                    .with_seed(config.seed),
            )
            .context("spawning hero")?;
        world.equip_weapon(hero, hero_cfg.weapon)?;
        world.attach_attack_windows(hero, hero_cfg.attack_windows.clone())?;
        if let Some(agent) = world.agent_mut(hero) {
            agent.attach_hud(Box::new(LogHud::default()));
        }
        let hero_layers = hero_cfg
            .attack_windows
            .iter()
            .map(|w| w.layer_index)
            .chain(std::iter::once(hero_cfg.attack_clip.layer))
            .max()
            .unwrap_or(0);
        animators.insert(hero, hero_layers + 1 + BASE_LAYERS);

        let mut npcs = Vec::with_capacity(config.npcs.len());
        for (i, npc_cfg) in config.npcs.iter().enumerate() {
            let transform = Transform::new(npc_cfg.position, Quat::from_rotation_y(npc_cfg.facing_deg.to_radians()));
            let entity = world
                .spawn_character(
                    SpawnParams::new(transform)
                        .with_settings(npc_cfg.settings)
                        .with_radius(npc_cfg.radius)
                        .with_seed(config.seed.wrapping_add(i as u64 + 1)),
                )
                .with_context(|| format!("spawning npc '{}'", npc_cfg.name))?;
            world.make_npc(entity, npc_cfg.tuning)?;
            animators.insert(entity, npc_cfg.attack_clip.layer + 1 + BASE_LAYERS);
            info!("NPC '{}' is {}", npc_cfg.name, entity);
            npcs.push(NpcRig {
                entity,
                name: npc_cfg.name.clone(),
                clip: npc_cfg.attack_clip.clone(),
                impact_time: npc_cfg.impact_time,
                impact_pending: false,
            });
        }

        // Spawn-time announcements are not interesting to the duel log
        world.dispatch_events();

        Ok(Self {
            world,
            animators,
            clock: SimClock::new(config.tick_rate),
            duration: config.duration,
            hero,
            hero_clip: hero_cfg.attack_clip.clone(),
            hero_script: HeroScript::from_config(hero_cfg),
            npcs,
            stats: DuelStats::default(),
        })
    }

    /// The combat world.
    #[must_use]
    pub fn world(&self) -> &CombatWorld {
        &self.world
    }

    /// Hero entity.
    #[must_use]
    pub fn hero(&self) -> EntityId {
        self.hero
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> &DuelStats {
        &self.stats
    }

    /// Simulated seconds elapsed.
    #[must_use]
    pub fn now(&self) -> f32 {
        self.clock.now()
    }

    /// Outcome if the run is over.
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome> {
        let alive = |id: EntityId| self.world.agent(id).is_some_and(|a| a.is_alive());
        if !alive(self.hero) {
            Some(Outcome::HeroDied)
        } else if self.npcs.iter().all(|rig| !alive(rig.entity)) {
            Some(Outcome::HeroWon)
        } else if self.clock.now() >= self.duration {
            Some(Outcome::TimedOut)
        } else {
            None
        }
    }

    /// Runs one fixed step.
    pub fn step(&mut self) -> Result<()> {
        let now = self.clock.now();
        let dt = self.clock.fixed_dt();

        let swinging = self
            .animators
            .get(self.hero)
            .is_some_and(|a| a.is_playing(self.hero_clip.layer, &self.hero_clip.state_name));
        let action = self.hero_script.tick(&mut self.world, self.hero, swinging, now, dt)?;
        match action {
            HeroAction::Attack(target) => debug!("hero swings at {}", self.label(target)),
            HeroAction::Approach(target) | HeroAction::Hold(target) => trace!("hero on {}", target),
            HeroAction::Dead | HeroAction::Idle => {},
        }

        self.world.tick_npcs(now, dt);
        let events = self.world.dispatch_events();
        self.handle_events(&events);

        for (entity, clip) in self.animators.advance(dt) {
            debug!("{} finished '{}'", entity, clip);
        }
        self.resolve_npc_impacts(now)?;

        for (entity, outcome) in self.world.tick_attack_windows(now, &self.animators) {
            self.record_swing(entity, outcome);
        }
        let events = self.world.dispatch_events();
        self.handle_events(&events);

        self.clock.advance();
        Ok(())
    }

    /// Runs until an outcome is reached.
    pub fn run(&mut self) -> Result<Outcome> {
        loop {
            for _ in 0..self.clock.accumulate(FRAME_DT) {
                self.step()?;
                if let Some(outcome) = self.outcome() {
                    return Ok(outcome);
                }
            }
        }
    }

    fn handle_events(&mut self, events: &[CombatEvent]) {
        for event in events {
            match event {
                CombatEvent::AttackStarted { entity } => self.start_attack_clip(*entity),
                CombatEvent::DamageTaken {
                    entity,
                    damage,
                    current_health,
                } => self.record_damage(*entity, damage, *current_health),
                CombatEvent::Died { entity } => {
                    info!("{} died at {:.2}s", self.label(*entity), self.clock.now());
                    if let Some(animator) = self.animators.get_mut(*entity) {
                        animator.stop_all();
                    }
                    if let Some(rig) = self.npcs.iter_mut().find(|r| r.entity == *entity) {
                        rig.impact_pending = false;
                    }
                },
                CombatEvent::BlockChanged { entity, blocking } => {
                    debug!("{} block {}", self.label(*entity), blocking);
                },
                _ => {},
            }
        }
    }

    fn start_attack_clip(&mut self, entity: EntityId) {
        let clip = if entity == self.hero {
            Some(&self.hero_clip)
        } else if let Some(rig) = self.npcs.iter_mut().find(|r| r.entity == entity) {
            rig.impact_pending = true;
            Some(&rig.clip)
        } else {
            None
        };
        let Some(clip) = clip else {
            return;
        };
        match self.animators.get_mut(entity) {
            Some(animator) => animator.play(clip.layer, &clip.state_name, clip.length, false),
            None => warn!("{} attacked without an animator", entity),
        }
    }

    /// Lands NPC hits whose clip reached the impact time or already ended.
    fn resolve_npc_impacts(&mut self, now: f32) -> Result<()> {
        for rig in &mut self.npcs {
            if !rig.impact_pending {
                continue;
            }
            let progress = self
                .animators
                .get(rig.entity)
                .filter(|a| a.is_playing(rig.clip.layer, &rig.clip.state_name))
                .and_then(|a| a.normalized_time(rig.clip.layer));
            if progress.is_some_and(|t| t < rig.impact_time) {
                continue;
            }
            rig.impact_pending = false;

            let (point, normal) = contact_for(&self.world, rig.entity);
            if self.world.notify_npc_attack_hit(rig.entity, point, normal, now)? {
                self.stats.npc_hits += 1;
                debug!("'{}' landed a hit", rig.name);
            } else {
                debug!("'{}' missed", rig.name);
            }
        }
        Ok(())
    }

    fn record_swing(&mut self, entity: EntityId, outcome: SwingOutcome) {
        if entity != self.hero {
            return;
        }
        match outcome {
            SwingOutcome::Hit { target, delivered, .. } => {
                self.stats.hero_hits += 1;
                debug!("hero hit {} (delivered: {})", self.label(target), delivered);
            },
            SwingOutcome::Whiff => {
                self.stats.hero_whiffs += 1;
                debug!("hero swing whiffed");
            },
            SwingOutcome::Inactive => {},
        }
    }

    fn record_damage(&mut self, entity: EntityId, damage: &DamageInfo, current_health: f32) {
        if entity == self.hero {
            self.stats.hero_damage_taken += damage.amount();
        } else if damage.source == Some(self.hero) {
            self.stats.hero_damage_dealt += damage.amount();
        }
        info!(
            "{} took {:.1} {:?} damage, {:.1} left",
            self.label(entity),
            damage.amount(),
            damage.damage_type,
            current_health
        );
    }

    fn label(&self, entity: EntityId) -> String {
        if entity == self.hero {
            "hero".to_string()
        } else if let Some(rig) = self.npcs.iter().find(|r| r.entity == entity) {
            format!("'{}'", rig.name)
        } else {
            entity.to_string()
        }
    }
}

/// Contact on the NPC's current target, facing back toward the NPC.
fn contact_for(world: &CombatWorld, npc: EntityId) -> (Vec3, Vec3) {
    let own = world.transform(npc).map(|t| t.position).unwrap_or(Vec3::ZERO);
    let target_pos = world
        .npc(npc)
        .and_then(|c| c.target())
        .and_then(|t| world.transform(t))
        .map(|t| t.position);
    match target_pos {
        Some(pos) => (pos, flatten(own - pos).normalize_or_zero()),
        None => (own, Vec3::ZERO),
    }
}

/// Runs `config` to completion and logs a summary.
pub fn run(config: &ScenarioConfig) -> Result<(Outcome, DuelStats)> {
    info!(
        "Running '{}': {} NPC(s), {} Hz, {:.0}s limit",
        config.name,
        config.npcs.len(),
        config.tick_rate,
        config.duration
    );

    let mut sim = Simulation::new(config)?;
    let outcome = sim.run()?;

    let hero_health = sim.world().agent(sim.hero()).map_or(0.0, |a| a.current_health());
    let stats = sim.stats();
    info!(
        "{:?} after {:.2}s ({} ticks), hero health {:.1}",
        outcome,
        sim.now(),
        sim.clock.ticks(),
        hero_health
    );
    info!(
        "hero: {} hits, {} whiffs, {:.1} dealt, {:.1} taken; NPC hits: {}",
        stats.hero_hits, stats.hero_whiffs, stats.hero_damage_dealt, stats.hero_damage_taken, stats.npc_hits
    );
    Ok((outcome, sim.stats().clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NpcConfig;
    use hero_combat::prelude::{CombatSettings, NpcState};

    #[test]
    fn test_strong_hero_wins() {
        let mut config = ScenarioConfig::default();
        config.hero.settings = CombatSettings::default().with_attack_damage(100.0).with_variance(0.0);

        let (outcome, stats) = run(&config).unwrap();
        assert_eq!(outcome, Outcome::HeroWon);
        assert!(stats.hero_hits >= 1);
        assert!(stats.hero_damage_dealt >= 60.0);
    }

    #[test]
    fn test_weak_hero_dies() {
        let mut config = ScenarioConfig::default();
        config.hero.settings = CombatSettings::default().with_max_health(10.0).with_attack_damage(0.0);
        config.npcs[0].settings = CombatSettings::default()
            .with_attack_damage(50.0)
            .with_variance(0.0)
            .with_cooldown(0.2);

        let (outcome, stats) = run(&config).unwrap();
        assert_eq!(outcome, Outcome::HeroDied);
        assert!(stats.npc_hits >= 1);
        assert!(stats.hero_damage_taken >= 10.0);
    }

    #[test]
    fn test_unreachable_npc_times_out() {
        let mut config = ScenarioConfig::default();
        config.duration = 2.0;
        config.hero.move_speed = 0.0;
        config.npcs[0].position = Vec3::new(0.0, 0.0, 50.0);

        let (outcome, stats) = run(&config).unwrap();
        assert_eq!(outcome, Outcome::TimedOut);
        assert_eq!(stats, DuelStats::default());
    }

    #[test]
    fn test_npc_engages_approaching_hero() {
        let mut config = ScenarioConfig::default();
        config.npcs = vec![NpcConfig {
            position: Vec3::new(0.0, 0.0, 4.0),
            ..NpcConfig::default()
        }];
        let mut sim = Simulation::new(&config).unwrap();
        let npc = sim.npcs[0].entity;

        for _ in 0..5 {
            sim.step().unwrap();
        }
        assert_eq!(sim.world().npc_state(npc), Some(NpcState::Engaging));
        assert_eq!(sim.world().npc(npc).and_then(|c| c.target()), Some(sim.hero()));
    }

    #[test]
    fn test_hero_attack_starts_clip() {
        let mut config = ScenarioConfig::default();
        config.npcs[0].position = Vec3::new(0.0, 0.0, 1.0);
        let mut sim = Simulation::new(&config).unwrap();

        sim.step().unwrap();
        let animator = sim.animators.get(sim.hero()).unwrap();
        assert!(animator.is_playing(config.hero.attack_clip.layer, &config.hero.attack_clip.state_name));
    }
}
