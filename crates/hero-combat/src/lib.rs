//! # Hero Combat
//!
//! Combat and NPC decision core shared by hero and NPC characters.
//!
//! This crate provides:
//! - Damage events and the damageable capability
//! - Combat agents (health, blocking, cooldowns, invulnerability)
//! - Observer signals, HUD sinks and the combat event bus
//! - A sphere-overlap spatial query contract with a collider world
//! - Melee weapons with cone-filtered closest-target selection
//! - Attack windows polled from animation playback
//! - NPC controllers with acquisition, chase, leash and return
//! - A registry and world composing all of the above
//!
//! Nothing here reads a clock or spawns threads. The host supplies `now`
//! and `dt` and calls the tick methods in its own order.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod agent;
pub mod attack_window;
pub mod damage;
pub mod events;
pub mod melee;
pub mod npc;
pub mod registry;
pub mod spatial;
pub mod world;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::agent::{CombatAgent, CombatSettings};
    pub use crate::attack_window::{
        AnimationStateInfo, AnimationStateSource, AnimatorLookup, AttackWindow, AttackWindowDriver,
    };
    pub use crate::damage::{DamageInfo, DamageType, Damageable, DamageableLookup, HitContact};
    pub use crate::events::{
        CombatEvent, CombatHud, CombatSignals, DamageTaken, EventBus, HealthChange, HudId, Signal,
        SubscriptionId,
    };
    pub use crate::melee::{MeleeWeapon, MeleeWeaponConfig, SwingOutcome};
    pub use crate::npc::{NpcCombatController, NpcState, NpcTuning, NpcWorld};
    pub use crate::registry::CombatRegistry;
    pub use crate::spatial::{
        ColliderControl, ColliderHit, ColliderWorld, LayerMask, OverlapFilter, SpatialQuery,
        SphereColliderDesc,
    };
    pub use crate::world::{Body, CombatWorld, SpawnParams, WorldError, WorldResult};
}
