//! Scripted hero: walks to the nearest living NPC and swings when in range.

use crate::config::HeroConfig;
use hero_combat::prelude::{CombatWorld, WorldError, WorldResult};
use hero_common::{flatten, move_towards, yaw_look_rotation, EntityId, Transform};

/// What the hero did on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeroAction {
    /// Hero is dead
    Dead,
    /// No living opponent
    Idle,
    /// Walking toward `target`
    Approach(EntityId),
    /// Started a swing at `target`
    Attack(EntityId),
    /// In range of `target`, waiting for the swing to finish or the cooldown
    Hold(EntityId),
}

/// Decision rules of the scripted hero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeroScript {
    move_speed: f32,
    engage_range: f32,
    block_below: f32,
}

impl HeroScript {
    /// Builds the script from the hero section of a scenario.
    #[must_use]
    pub fn from_config(config: &HeroConfig) -> Self {
        Self {
            move_speed: config.move_speed,
            engage_range: config.engage_range,
            block_below: config.block_below,
        }
    }

    /// Runs one decision step. `swinging` is true while the attack clip plays.
    pub fn tick(
        &self,
        world: &mut CombatWorld,
        hero: EntityId,
        swinging: bool,
        now: f32,
        dt: f32,
    ) -> WorldResult<HeroAction> {
        let agent = world.agent(hero).ok_or(WorldError::UnknownEntity(hero))?;
        if !agent.is_alive() {
            return Ok(HeroAction::Dead);
        }
        let low_health = agent.health_fraction() < self.block_below;
        let ready = agent.can_attack(now);

        let mut transform = world.transform(hero).ok_or(WorldError::UnknownEntity(hero))?;
        let Some((target, target_pos)) = nearest_opponent(world, transform.position) else {
            set_blocking(world, hero, false)?;
            return Ok(HeroAction::Idle);
        };

        let to_target = flatten(target_pos - transform.position);
        if let Some(rotation) = yaw_look_rotation(to_target) {
            transform.rotation = rotation;
        }

        let distance = to_target.length();
        let action = if swinging {
            HeroAction::Hold(target)
        } else if distance > self.engage_range {
            let step = (self.move_speed * dt).min(distance - self.engage_range);
            let goal = transform.position + to_target;
            transform.position = move_towards(transform.position, goal, step);
            set_blocking(world, hero, false)?;
            HeroAction::Approach(target)
        } else if ready {
            set_blocking(world, hero, false)?;
            if world.try_start_attack(hero, now)? {
                HeroAction::Attack(target)
            } else {
                HeroAction::Hold(target)
            }
        } else {
            set_blocking(world, hero, low_health)?;
            HeroAction::Hold(target)
        };

        world.set_transform(hero, transform)?;
        Ok(action)
    }
}

fn nearest_opponent(world: &CombatWorld, origin: glam::Vec3) -> Option<(EntityId, glam::Vec3)> {
    world
        .npc_ids()
        .filter(|id| world.agent(*id).is_some_and(|a| a.is_alive()))
        .filter_map(|id| world.transform(id).map(|t: Transform| (id, t.position)))
        .min_by(|(_, a), (_, b)| {
            let da = (*a - origin).length_squared();
            let db = (*b - origin).length_squared();
            da.total_cmp(&db)
        })
}

fn set_blocking(world: &mut CombatWorld, hero: EntityId, active: bool) -> WorldResult<()> {
    world
        .agent_mut(hero)
        .ok_or(WorldError::UnknownEntity(hero))?
        .set_blocking(active);
    Ok(())
}
