//! Per-character combat state: health, damage intake, blocking and attack cadence.
//!
//! A [`CombatAgent`] is shared by heroes and NPCs. It never reads a clock;
//! every timing-sensitive operation takes the simulation time `now` in
//! seconds from the host.

use hero_common::{clamp_or, ConfigError, EntityId, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::damage::{DamageInfo, DamageType, Damageable, HitContact};
use crate::events::{CombatHud, CombatSignals, DamageTaken, HealthChange, HudId};

/// Tunable combat values of one agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatSettings {
    /// Maximum health (at least 1)
    pub max_health: f32,
    /// Fraction of max health at spawn (0..=1)
    pub starting_health_fraction: f32,
    /// Base damage of one attack
    pub attack_damage: f32,
    /// Random spread applied to attack damage (0..=1)
    pub attack_damage_variance: f32,
    /// Seconds between attack starts
    pub attack_cooldown: f32,
    /// Incoming damage multiplier while blocking (0 = full negate, 1 = no mitigation)
    pub block_damage_multiplier: f32,
    /// Seconds after accepted damage during which new damage is ignored
    pub post_hit_invulnerability: f32,
    /// Damage type of outgoing attacks
    pub default_attack_damage_type: DamageType,
}

impl Default for CombatSettings {
    fn default() -> Self {
        Self {
            max_health: 100.0,
            starting_health_fraction: 1.0,
            attack_damage: 10.0,
            attack_damage_variance: 0.3,
            attack_cooldown: 0.6,
            block_damage_multiplier: 0.4,
            post_hit_invulnerability: 0.15,
            default_attack_damage_type: DamageType::Physical,
        }
    }
}

impl CombatSettings {
    /// Sets max health.
    #[must_use]
    pub const fn with_max_health(mut self, max_health: f32) -> Self {
        self.max_health = max_health;
        self
    }

    /// Sets base attack damage.
    #[must_use]
    pub const fn with_attack_damage(mut self, damage: f32) -> Self {
        self.attack_damage = damage;
        self
    }

    /// Sets damage variance.
    #[must_use]
    pub const fn with_variance(mut self, variance: f32) -> Self {
        self.attack_damage_variance = variance;
        self
    }

    /// Sets attack cooldown.
    #[must_use]
    pub const fn with_cooldown(mut self, cooldown: f32) -> Self {
        self.attack_cooldown = cooldown;
        self
    }

    /// Sets the post-hit invulnerability window.
    #[must_use]
    pub const fn with_invulnerability(mut self, seconds: f32) -> Self {
        self.post_hit_invulnerability = seconds;
        self
    }

    /// Sets the block damage multiplier.
    #[must_use]
    pub const fn with_block_multiplier(mut self, multiplier: f32) -> Self {
        self.block_damage_multiplier = multiplier;
        self
    }

    /// Sets the starting health fraction.
    #[must_use]
    pub const fn with_starting_fraction(mut self, fraction: f32) -> Self {
        self.starting_health_fraction = fraction;
        self
    }

    /// Checks every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        const S: &str = "combat";
        ConfigError::check_range(S, "max_health", self.max_health, 1.0, f32::MAX)?;
        ConfigError::check_range(
            S,
            "starting_health_fraction",
            self.starting_health_fraction,
            0.0,
            1.0,
        )?;
        ConfigError::check_range(S, "attack_damage", self.attack_damage, 0.0, f32::MAX)?;
        ConfigError::check_range(
            S,
            "attack_damage_variance",
            self.attack_damage_variance,
            0.0,
            1.0,
        )?;
        ConfigError::check_range(S, "attack_cooldown", self.attack_cooldown, 0.0, f32::MAX)?;
        ConfigError::check_range(
            S,
            "block_damage_multiplier",
            self.block_damage_multiplier,
            0.0,
            1.0,
        )?;
        ConfigError::check_range(
            S,
            "post_hit_invulnerability",
            self.post_hit_invulnerability,
            0.0,
            f32::MAX,
        )
    }

    /// Returns a copy with every field clamped into range.
    #[must_use]
    pub fn sanitized(self) -> Self {
        let d = Self::default();
        Self {
            max_health: clamp_or(self.max_health, 1.0, f32::MAX, d.max_health),
            starting_health_fraction: clamp_or(
                self.starting_health_fraction,
                0.0,
                1.0,
                d.starting_health_fraction,
            ),
            attack_damage: clamp_or(self.attack_damage, 0.0, f32::MAX, d.attack_damage),
            attack_damage_variance: clamp_or(
                self.attack_damage_variance,
                0.0,
                1.0,
                d.attack_damage_variance,
            ),
            attack_cooldown: clamp_or(self.attack_cooldown, 0.0, f32::MAX, d.attack_cooldown),
            block_damage_multiplier: clamp_or(
                self.block_damage_multiplier,
                0.0,
                1.0,
                d.block_damage_multiplier,
            ),
            post_hit_invulnerability: clamp_or(
                self.post_hit_invulnerability,
                0.0,
                f32::MAX,
                d.post_hit_invulnerability,
            ),
            default_attack_damage_type: self.default_attack_damage_type,
        }
    }
}

/// Float comparison with a relative tolerance.
fn approximately(a: f32, b: f32) -> bool {
    (b - a).abs() < (1e-6 * a.abs().max(b.abs())).max(f32::EPSILON * 8.0)
}

/// Health, damage intake, blocking and attack cadence of one character.
pub struct CombatAgent {
    id: EntityId,
    settings: CombatSettings,
    health: f32,
    alive: bool,
    blocking: bool,
    last_attack_time: f32,
    last_damage_time: f32,
    rng: fastrand::Rng,
    signals: CombatSignals,
    huds: Vec<(HudId, Box<dyn CombatHud>)>,
    next_hud: u32,
}

impl std::fmt::Debug for CombatAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombatAgent")
            .field("id", &self.id)
            .field("health", &self.health)
            .field("max_health", &self.settings.max_health)
            .field("alive", &self.alive)
            .field("blocking", &self.blocking)
            .field("huds", &self.huds.len())
            .finish_non_exhaustive()
    }
}

impl CombatAgent {
    /// Creates an agent at its spawn health. Out-of-range settings are clamped.
    #[must_use]
    pub fn new(id: EntityId, settings: CombatSettings) -> Self {
        if let Err(e) = settings.validate() {
            warn!("Agent {}: {}; clamping combat settings", id, e);
        }
        let mut agent = Self {
            id,
            settings: settings.sanitized(),
            health: 0.0,
            alive: true,
            blocking: false,
            last_attack_time: f32::NEG_INFINITY,
            last_damage_time: f32::NEG_INFINITY,
            rng: fastrand::Rng::new(),
            signals: CombatSignals::default(),
            huds: Vec::new(),
            next_hud: 0,
        };
        agent.reset_health_internal();
        agent
    }

    /// Seeds the damage-variance generator.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = fastrand::Rng::with_seed(seed);
        self
    }

    /// Entity this agent belongs to.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Sanitized settings.
    #[must_use]
    pub const fn settings(&self) -> &CombatSettings {
        &self.settings
    }

    /// Current health.
    #[must_use]
    pub const fn current_health(&self) -> f32 {
        self.health
    }

    /// Maximum health.
    #[must_use]
    pub const fn max_health(&self) -> f32 {
        self.settings.max_health
    }

    /// Current health as a fraction of max.
    #[must_use]
    pub fn health_fraction(&self) -> f32 {
        self.health / self.settings.max_health
    }

    /// Whether the agent is alive.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.alive
    }

    /// Whether the agent is blocking.
    #[must_use]
    pub const fn is_blocking(&self) -> bool {
        self.blocking
    }

    /// Time of the last started attack.
    #[must_use]
    pub const fn last_attack_time(&self) -> f32 {
        self.last_attack_time
    }

    /// Observer lists of this agent.
    pub fn signals_mut(&mut self) -> &mut CombatSignals {
        &mut self.signals
    }

    /// Whether an attack may start at `now`.
    #[must_use]
    pub fn can_attack(&self, now: f32) -> bool {
        self.alive && now >= self.last_attack_time + self.settings.attack_cooldown
    }

    /// Seconds until the cooldown elapses (0 when ready).
    #[must_use]
    pub fn cooldown_remaining(&self, now: f32) -> f32 {
        (self.last_attack_time + self.settings.attack_cooldown - now).max(0.0)
    }

    /// Re-announces health and block state to observers.
    ///
    /// Call once after observers are wired.
    pub fn on_activate(&mut self) {
        self.raise_health_changed();
        if self.blocking {
            self.raise_block_changed();
        }
    }

    // ====== Attacks ======

    /// Starts an attack if alive and off cooldown.
    pub fn try_start_attack(&mut self, now: f32) -> bool {
        if !self.can_attack(now) {
            return false;
        }
        self.last_attack_time = now;
        self.signals.attack_started.emit(&());
        true
    }

    /// Resolves the hit moment of an attack against `target`.
    ///
    /// Fires `attack_performed` whenever the attacker is alive, even if the
    /// target is missing or dead. Returns whether damage was delivered.
    pub fn resolve_attack_hit(
        &mut self,
        target: Option<&mut dyn Damageable>,
        contact: HitContact,
        damage_scale: f32,
        unblockable: bool,
        now: f32,
    ) -> bool {
        if !self.alive {
            return false;
        }

        self.signals.attack_performed.emit(&());

        let Some(target) = target else {
            return false;
        };
        if !target.is_alive() {
            return false;
        }

        let amount = self.apply_damage_variance(self.settings.attack_damage * damage_scale.max(0.0));
        let mut damage = DamageInfo::new(amount, self.settings.default_attack_damage_type)
            .with_source(self.id)
            .with_instigator(self.id)
            .with_contact(contact.point, contact.normal);
        damage.unblockable = unblockable;

        trace!("Agent {} delivers {:.2} damage", self.id, amount);
        target.apply_damage(damage, now);
        true
    }

    /// Signals a finished attack that hit nothing.
    pub fn notify_attack_animation_complete(&mut self) {
        self.signals.attack_performed.emit(&());
    }

    /// Builds an outgoing damage event originating at `origin`.
    pub fn create_damage_info(&mut self, damage_scale: f32, unblockable: bool, origin: Vec3) -> DamageInfo {
        let amount = self.apply_damage_variance(self.settings.attack_damage * damage_scale.max(0.0));
        let mut damage = DamageInfo::new(amount, self.settings.default_attack_damage_type)
            .with_source(self.id)
            .with_instigator(self.id)
            .with_contact(origin, Vec3::Y);
        damage.unblockable = unblockable;
        damage
    }

    fn apply_damage_variance(&mut self, amount: f32) -> f32 {
        if amount <= 0.0 {
            return 0.0;
        }
        let variance = self.settings.attack_damage_variance.clamp(0.0, 1.0);
        if variance <= 0.0 {
            return amount;
        }
        let scale = (1.0 - variance) + self.rng.f32() * 2.0 * variance;
        (amount * scale).max(0.0)
    }

    // ====== Defense ======

    /// Toggles blocking. Fires `block_changed` only on a transition.
    pub fn set_blocking(&mut self, active: bool) {
        if self.blocking == active {
            return;
        }
        self.blocking = active;
        self.raise_block_changed();
    }

    /// Applies incoming damage. Returns whether health changed.
    pub fn apply_damage(&mut self, damage: DamageInfo, now: f32) -> bool {
        if !self.alive {
            return false;
        }

        let invulnerability = self.settings.post_hit_invulnerability;
        if invulnerability > 0.0 && now - self.last_damage_time < invulnerability && !damage.unblockable {
            trace!("Agent {} ignores damage during invulnerability", self.id);
            return false;
        }

        let mut mitigated = damage.amount();
        if self.blocking && !damage.unblockable {
            mitigated *= self.settings.block_damage_multiplier;
        }
        let mitigated = mitigated.max(0.0);
        if mitigated <= 0.0 {
            return false;
        }

        self.last_damage_time = now;
        let damage = damage.with_amount(mitigated);
        self.health = (self.health - mitigated).max(0.0);
        self.check_invariants();

        self.signals.damage_taken.emit(&DamageTaken {
            damage,
            current_health: self.health,
        });
        // HUDs see the health change before the damage entry; signal subscribers see the reverse
        self.raise_health_changed();
        let (current, max) = (self.health, self.settings.max_health);
        for (_, hud) in &mut self.huds {
            hud.handle_damage_taken(&damage, current, max);
        }

        if self.health <= 0.0 {
            self.handle_death();
        }
        true
    }

    /// Restores health. Ignored when dead or for non-positive amounts.
    pub fn heal(&mut self, amount: f32) {
        if !self.alive || amount.is_nan() || amount <= 0.0 {
            return;
        }
        let previous = self.health;
        self.health = (self.health + amount).min(self.settings.max_health);
        self.check_invariants();
        if !approximately(previous, self.health) {
            self.raise_health_changed();
        }
    }

    /// Brings the agent back with `fraction` of max health (at least 1).
    pub fn revive(&mut self, fraction: f32) {
        let fraction = clamp_or(fraction, 0.0, 1.0, 1.0);
        self.health = (self.settings.max_health * fraction).max(1.0);
        self.alive = true;
        self.check_invariants();
        debug!("Agent {} revived at {:.1}", self.id, self.health);

        let change = self.health_change();
        self.signals.revived.emit(&change);
        self.raise_health_changed();
        for (_, hud) in &mut self.huds {
            hud.handle_revive(change.current, change.max);
        }
        if self.blocking {
            self.raise_block_changed();
        }
    }

    /// Restores spawn health and announces it.
    pub fn reset_health(&mut self) {
        self.reset_health_internal();
        self.raise_health_changed();
    }

    fn reset_health_internal(&mut self) {
        let max = self.settings.max_health;
        self.health = max * self.settings.starting_health_fraction.clamp(0.0, 1.0);
        if approximately(self.health, 0.0) {
            self.health = max;
        }
        self.alive = self.health > 0.0;
        self.check_invariants();
    }

    fn handle_death(&mut self) {
        if !self.alive {
            return;
        }
        self.alive = false;
        debug!("Agent {} died", self.id);
        self.signals.died.emit(&());
        for (_, hud) in &mut self.huds {
            hud.handle_death();
        }
    }

    // ====== HUD ======

    /// Attaches a HUD sink and immediately syncs it.
    pub fn attach_hud(&mut self, mut hud: Box<dyn CombatHud>) -> HudId {
        hud.handle_health_changed(self.health, self.settings.max_health);
        hud.handle_block_state(self.blocking);
        if !self.alive {
            hud.handle_death();
        }
        let id = HudId(self.next_hud);
        self.next_hud += 1;
        self.huds.push((id, hud));
        id
    }

    /// Detaches a HUD sink, handing it back.
    pub fn detach_hud(&mut self, id: HudId) -> Option<Box<dyn CombatHud>> {
        let index = self.huds.iter().position(|(h, _)| *h == id)?;
        Some(self.huds.remove(index).1)
    }

    /// Number of attached HUD sinks.
    #[must_use]
    pub fn hud_count(&self) -> usize {
        self.huds.len()
    }

    fn health_change(&self) -> HealthChange {
        HealthChange {
            current: self.health,
            max: self.settings.max_health,
        }
    }

    fn raise_health_changed(&mut self) {
        let change = self.health_change();
        self.signals.health_changed.emit(&change);
        for (_, hud) in &mut self.huds {
            hud.handle_health_changed(change.current, change.max);
        }
    }

    fn raise_block_changed(&mut self) {
        let blocking = self.blocking;
        self.signals.block_changed.emit(&blocking);
        for (_, hud) in &mut self.huds {
            hud.handle_block_state(blocking);
        }
    }

    fn check_invariants(&self) {
        debug_assert!(
            (0.0..=self.settings.max_health).contains(&self.health),
            "health {} outside [0, {}]",
            self.health,
            self.settings.max_health
        );
    }
}

impl Damageable for CombatAgent {
    fn is_alive(&self) -> bool {
        self.alive
    }

    fn apply_damage(&mut self, damage: DamageInfo, now: f32) -> bool {
        CombatAgent::apply_damage(self, damage, now)
    }
}
