//! Slot storage of combat agents keyed by entity id.

use ahash::AHashMap;
use hero_common::EntityId;

use crate::agent::CombatAgent;
use crate::damage::{Damageable, DamageableLookup};
use crate::world::WorldError;

/// Owns every combat agent of a world.
///
/// Agents live in slots so one of them can be lent out mutably while the
/// rest of the registry still answers damageable lookups.
#[derive(Debug, Default)]
pub struct CombatRegistry {
    slots: Vec<Option<CombatAgent>>,
    index: AHashMap<EntityId, usize>,
    free: Vec<usize>,
}

impl CombatRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an agent under its own id.
    pub fn insert(&mut self, agent: CombatAgent) -> Result<(), WorldError> {
        let id = agent.id();
        if self.index.contains_key(&id) {
            return Err(WorldError::AlreadyRegistered(id));
        }
        let slot = if let Some(slot) = self.free.pop() {
            self.slots[slot] = Some(agent);
            slot
        } else {
            self.slots.push(Some(agent));
            self.slots.len() - 1
        };
        self.index.insert(id, slot);
        Ok(())
    }

    /// Removes an agent. A checked-out agent cannot be removed.
    pub fn remove(&mut self, id: EntityId) -> Option<CombatAgent> {
        let slot = *self.index.get(&id)?;
        let agent = self.slots.get_mut(slot)?.take()?;
        self.index.remove(&id);
        self.free.push(slot);
        Some(agent)
    }

    /// Agent by id.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&CombatAgent> {
        let slot = *self.index.get(&id)?;
        self.slots.get(slot)?.as_ref()
    }

    /// Mutable agent by id.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut CombatAgent> {
        let slot = *self.index.get(&id)?;
        self.slots.get_mut(slot)?.as_mut()
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.index.contains_key(&id)
    }

    /// Number of registered agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Iterates over agents that are not checked out.
    pub fn iter(&self) -> impl Iterator<Item = &CombatAgent> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Lends the agent `id` to `f` together with the rest of the registry.
    ///
    /// While `f` runs, `id` resolves to nothing through the registry.
    /// Returns `None` if `id` is unknown or already checked out.
    pub fn with_checked_out<R>(
        &mut self,
        id: EntityId,
        f: impl FnOnce(&mut CombatAgent, &mut Self) -> R,
    ) -> Option<R> {
        let slot = *self.index.get(&id)?;
        let mut agent = self.slots.get_mut(slot)?.take()?;
        let result = f(&mut agent, self);
        self.slots[slot] = Some(agent);
        Some(result)
    }
}

impl DamageableLookup for CombatRegistry {
    fn damageable_mut(&mut self, entity: EntityId) -> Option<&mut dyn Damageable> {
        self.get_mut(entity).map(|a| a as &mut dyn Damageable)
    }

    fn is_alive(&self, entity: EntityId) -> bool {
        self.get(entity).is_some_and(CombatAgent::is_alive)
    }
}
