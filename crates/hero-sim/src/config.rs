//! Scenario configuration.
//!
//! A scenario describes one duel: the scripted hero, the NPCs facing it and
//! the fixed-step clock. Files are TOML by default, RON when the extension is
//! `.ron`.

use glam::Vec3;
use hero_combat::prelude::{AttackWindow, CombatSettings, MeleeWeaponConfig, NpcTuning};
use hero_common::{ConfigError, HeroError, HeroResult, SchemaVersion};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Animation clip played when an attack starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipConfig {
    /// Animator state name
    pub state_name: String,
    /// Animator layer
    pub layer: usize,
    /// Clip length in seconds
    pub length: f32,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            state_name: "Attack".to_string(),
            layer: 1,
            length: 0.8,
        }
    }
}

/// The scripted hero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeroConfig {
    /// Spawn position
    pub position: Vec3,
    /// Body radius
    pub radius: f32,
    /// Approach speed in m/s
    pub move_speed: f32,
    /// Distance at which the hero stops and swings
    pub engage_range: f32,
    /// Health fraction below which the hero blocks between swings (0 = never)
    pub block_below: f32,
    /// Combat values
    pub settings: CombatSettings,
    /// Weapon shape
    pub weapon: MeleeWeaponConfig,
    /// Attack clip
    pub attack_clip: ClipConfig,
    /// Hit windows on the attack clip
    pub attack_windows: Vec<AttackWindow>,
}

impl Default for HeroConfig {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            radius: 0.4,
            move_speed: 3.0,
            engage_range: 1.6,
            block_below: 0.3,
            settings: CombatSettings::default().with_attack_damage(25.0),
            weapon: MeleeWeaponConfig::default(),
            attack_clip: ClipConfig::default(),
            attack_windows: vec![AttackWindow::default()],
        }
    }
}

/// One NPC opponent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NpcConfig {
    /// Label used in logs
    pub name: String,
    /// Spawn position
    pub position: Vec3,
    /// Spawn yaw in degrees (0 faces +Z)
    pub facing_deg: f32,
    /// Body radius
    pub radius: f32,
    /// Normalized clip time at which the hit lands
    pub impact_time: f32,
    /// Combat values
    pub settings: CombatSettings,
    /// Behavior
    pub tuning: NpcTuning,
    /// Attack clip
    pub attack_clip: ClipConfig,
}

impl Default for NpcConfig {
    fn default() -> Self {
        Self {
            name: "grunt".to_string(),
            position: Vec3::new(0.0, 0.0, 8.0),
            facing_deg: 180.0,
            radius: 0.4,
            impact_time: 0.5,
            settings: CombatSettings::default().with_max_health(60.0).with_attack_damage(8.0),
            tuning: NpcTuning::default(),
            attack_clip: ClipConfig {
                length: 1.0,
                ..ClipConfig::default()
            },
        }
    }
}

/// Complete scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Scenario name
    pub name: String,
    /// Base seed for damage variance
    pub seed: u64,
    /// Fixed updates per second
    pub tick_rate: u32,
    /// Simulated seconds before the run stops
    pub duration: f32,
    /// File schema version
    pub version: SchemaVersion,
    /// The hero
    pub hero: HeroConfig,
    /// Opponents
    pub npcs: Vec<NpcConfig>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            name: "duel".to_string(),
            seed: 7,
            tick_rate: 60,
            duration: 30.0,
            version: SchemaVersion::SCENARIO,
            hero: HeroConfig::default(),
            npcs: vec![NpcConfig::default()],
        }
    }
}

/// On-disk format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Toml,
    Ron,
}

impl Format {
    fn of(path: &Path) -> Self {
        if path.extension().is_some_and(|ext| ext == "ron") {
            Self::Ron
        } else {
            Self::Toml
        }
    }
}

impl ScenarioConfig {
    /// Loads a scenario file and clamps invalid values.
    ///
    /// Unlike engine settings a missing or malformed scenario is an error.
    pub fn load_from<P: AsRef<Path>>(path: P) -> HeroResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let mut config = Self::parse(&contents, Format::of(path))?;

        if !SchemaVersion::SCENARIO.is_compatible_with(&config.version) {
            return Err(HeroError::VersionMismatch {
                expected: SchemaVersion::SCENARIO.to_string(),
                actual: config.version.to_string(),
            });
        }

        config.validate();
        info!("Loaded scenario '{}' from {}", config.name, path.display());
        Ok(config)
    }

    fn parse(contents: &str, format: Format) -> HeroResult<Self> {
        match format {
            Format::Toml => toml::from_str(contents).map_err(|e| HeroError::Serialization(e.to_string())),
            Format::Ron => ron::from_str(contents).map_err(|e| HeroError::Serialization(e.to_string())),
        }
    }

    /// Saves the scenario, creating parent directories as needed.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> HeroResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = match Format::of(path) {
            Format::Toml => toml::to_string_pretty(self).map_err(|e| HeroError::Serialization(e.to_string()))?,
            Format::Ron => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| HeroError::Serialization(e.to_string()))?,
        };
        fs::write(path, contents)?;

        info!("Saved scenario to {}", path.display());
        Ok(())
    }

    /// Clamps every section into range, logging what changed.
    pub fn validate(&mut self) {
        self.tick_rate = self.tick_rate.clamp(10, 240);
        if !(self.duration.is_finite() && self.duration > 0.0) {
            warn!("scenario duration {} invalid, using 30s", self.duration);
            self.duration = 30.0;
        }

        let hero = &mut self.hero;
        hero.move_speed = clamp_logged("hero", "move_speed", hero.move_speed, 0.0, 50.0);
        hero.engage_range = clamp_logged("hero", "engage_range", hero.engage_range, 0.1, 50.0);
        hero.block_below = clamp_logged("hero", "block_below", hero.block_below, 0.0, 1.0);
        hero.radius = clamp_logged("hero", "radius", hero.radius, 0.0, 10.0);
        hero.attack_clip.length = clamp_logged("hero", "attack_clip.length", hero.attack_clip.length, 0.05, 10.0);
        sanitize_with(&mut hero.settings, CombatSettings::validate, CombatSettings::sanitized);
        sanitize_with(&mut hero.weapon, MeleeWeaponConfig::validate, MeleeWeaponConfig::sanitized);
        for window in &mut hero.attack_windows {
            if let Err(e) = window.validate() {
                warn!("{e}; clamping");
                *window = window.clone().sanitized();
            }
        }

        for npc in &mut self.npcs {
            npc.radius = clamp_logged("npc", "radius", npc.radius, 0.0, 10.0);
            npc.impact_time = clamp_logged("npc", "impact_time", npc.impact_time, 0.0, 1.0);
            npc.attack_clip.length = clamp_logged("npc", "attack_clip.length", npc.attack_clip.length, 0.05, 10.0);
            sanitize_with(&mut npc.settings, CombatSettings::validate, CombatSettings::sanitized);
            sanitize_with(&mut npc.tuning, NpcTuning::validate, NpcTuning::sanitized);
        }
    }
}

fn clamp_logged(section: &'static str, field: &'static str, value: f32, min: f32, max: f32) -> f32 {
    match ConfigError::check_range(section, field, value, min, max) {
        Ok(()) => value,
        Err(e) => {
            warn!("{e}; clamping");
            hero_common::clamp_or(value, min, max, min)
        },
    }
}

fn sanitize_with<T: Copy>(value: &mut T, validate: fn(&T) -> Result<(), ConfigError>, sanitized: fn(T) -> T) {
    if let Err(e) = validate(value) {
        warn!("{e}; clamping");
        *value = sanitized(*value);
    }
}
