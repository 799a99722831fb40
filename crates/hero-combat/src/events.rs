//! Observer signals, HUD sinks and the combat event bus.
//!
//! Every agent owns one [`Signal`] per observable event. Handlers run
//! synchronously in registration order and only see the payload, so they
//! cannot reach back into the agent that fired them. The [`EventBus`] is one
//! more observer: it forwards signals into a bounded channel the host drains
//! once per tick.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use hero_common::EntityId;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::agent::CombatAgent;
use crate::damage::DamageInfo;

/// Handle returned by [`Signal::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A list of observers for one event kind.
pub struct Signal<T> {
    handlers: Vec<(SubscriptionId, Box<dyn FnMut(&T)>)>,
    next_id: u64,
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            next_id: 0,
        }
    }
}

impl<T> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl<T> Signal<T> {
    /// Registers a handler.
    pub fn subscribe(&mut self, handler: impl FnMut(&T) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Removes a handler. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(h, _)| *h != id);
        self.handlers.len() != before
    }

    /// Invokes every handler in registration order.
    pub fn emit(&mut self, payload: &T) {
        for (_, handler) in &mut self.handlers {
            handler(payload);
        }
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Health snapshot carried by health and revive notifications.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthChange {
    /// Current health
    pub current: f32,
    /// Maximum health
    pub max: f32,
}

/// Payload of the damage-taken signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageTaken {
    /// Damage after mitigation
    pub damage: DamageInfo,
    /// Health after the damage was applied
    pub current_health: f32,
}

/// The observable events of one combat agent.
#[derive(Debug, Default)]
pub struct CombatSignals {
    /// Health value changed (also re-announced on activation)
    pub health_changed: Signal<HealthChange>,
    /// Damage was accepted
    pub damage_taken: Signal<DamageTaken>,
    /// Agent died
    pub died: Signal<()>,
    /// Agent was revived
    pub revived: Signal<HealthChange>,
    /// Blocking toggled
    pub block_changed: Signal<bool>,
    /// An attack was started
    pub attack_started: Signal<()>,
    /// An attack resolved (hit or whiff)
    pub attack_performed: Signal<()>,
}

/// Handle for an attached HUD sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HudId(pub(crate) u32);

/// Presentation sink for combat state. All methods default to no-ops.
pub trait CombatHud {
    /// Health changed.
    fn handle_health_changed(&mut self, _current: f32, _max: f32) {}
    /// Damage was taken.
    fn handle_damage_taken(&mut self, _damage: &DamageInfo, _current: f32, _max: f32) {}
    /// Blocking state changed.
    fn handle_block_state(&mut self, _blocking: bool) {}
    /// The agent died.
    fn handle_death(&mut self) {}
    /// The agent was revived.
    fn handle_revive(&mut self, _current: f32, _max: f32) {}
}

/// Combat event tagged with the entity that raised it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CombatEvent {
    /// Health changed
    HealthChanged {
        /// Entity
        entity: EntityId,
        /// Current health
        current: f32,
        /// Max health
        max: f32,
    },
    /// Damage accepted
    DamageTaken {
        /// Entity that took the damage
        entity: EntityId,
        /// Mitigated damage
        damage: DamageInfo,
        /// Health afterwards
        current_health: f32,
    },
    /// Entity died
    Died {
        /// Entity
        entity: EntityId,
    },
    /// Entity revived
    Revived {
        /// Entity
        entity: EntityId,
        /// Current health
        current: f32,
        /// Max health
        max: f32,
    },
    /// Blocking toggled
    BlockChanged {
        /// Entity
        entity: EntityId,
        /// New blocking state
        blocking: bool,
    },
    /// Attack started
    AttackStarted {
        /// Entity
        entity: EntityId,
    },
    /// Attack resolved
    AttackPerformed {
        /// Entity
        entity: EntityId,
    },
}

impl CombatEvent {
    /// Entity that raised the event.
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        match self {
            Self::HealthChanged { entity, .. }
            | Self::DamageTaken { entity, .. }
            | Self::Died { entity }
            | Self::Revived { entity, .. }
            | Self::BlockChanged { entity, .. }
            | Self::AttackStarted { entity }
            | Self::AttackPerformed { entity } => *entity,
        }
    }
}

/// Bounded channel collecting combat events for the host.
#[derive(Debug)]
pub struct EventBus {
    sender: Sender<CombatEvent>,
    receiver: Receiver<CombatEvent>,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventBus {
    /// Creates a new event bus with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self {
            sender,
            receiver,
            capacity: capacity.max(1),
        }
    }

    /// Publishes an event. Never blocks; a full bus drops the event.
    pub fn publish(&self, event: CombatEvent) {
        forward(&self.sender, event);
    }

    /// Drains all pending events in publish order.
    pub fn drain(&self) -> Vec<CombatEvent> {
        self.receiver.try_iter().collect()
    }

    /// Returns the number of pending events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Returns the channel capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Creates a new sender handle for publishing events.
    #[must_use]
    pub fn sender(&self) -> Sender<CombatEvent> {
        self.sender.clone()
    }

    /// Subscribes the bus to every signal of `agent`.
    pub fn attach(&self, agent: &mut CombatAgent) {
        let entity = agent.id();
        let signals = agent.signals_mut();

        let tx = self.sender();
        signals.health_changed.subscribe(move |h| {
            forward(
                &tx,
                CombatEvent::HealthChanged {
                    entity,
                    current: h.current,
                    max: h.max,
                },
            );
        });
        let tx = self.sender();
        signals.damage_taken.subscribe(move |d| {
            forward(
                &tx,
                CombatEvent::DamageTaken {
                    entity,
                    damage: d.damage,
                    current_health: d.current_health,
                },
            );
        });
        let tx = self.sender();
        signals
            .died
            .subscribe(move |()| forward(&tx, CombatEvent::Died { entity }));
        let tx = self.sender();
        signals.revived.subscribe(move |h| {
            forward(
                &tx,
                CombatEvent::Revived {
                    entity,
                    current: h.current,
                    max: h.max,
                },
            );
        });
        let tx = self.sender();
        signals.block_changed.subscribe(move |blocking| {
            forward(
                &tx,
                CombatEvent::BlockChanged {
                    entity,
                    blocking: *blocking,
                },
            );
        });
        let tx = self.sender();
        signals
            .attack_started
            .subscribe(move |()| forward(&tx, CombatEvent::AttackStarted { entity }));
        let tx = self.sender();
        signals
            .attack_performed
            .subscribe(move |()| forward(&tx, CombatEvent::AttackPerformed { entity }));
    }
}

fn forward(sender: &Sender<CombatEvent>, event: CombatEvent) {
    match sender.try_send(event) {
        Ok(()) => {},
        Err(TrySendError::Full(event)) => {
            warn!("Combat event bus full, dropping {:?}", event);
        },
        Err(TrySendError::Disconnected(_)) => {
            trace!("Combat event bus closed");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_signal_order_and_unsubscribe() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut signal = Signal::<u32>::default();

        let l = Rc::clone(&log);
        let first = signal.subscribe(move |v| l.borrow_mut().push(("a", *v)));
        let l = Rc::clone(&log);
        signal.subscribe(move |v| l.borrow_mut().push(("b", *v)));

        signal.emit(&1);
        assert!(signal.unsubscribe(first));
        assert!(!signal.unsubscribe(first));
        signal.emit(&2);

        assert_eq!(*log.borrow(), vec![("a", 1), ("b", 1), ("b", 2)]);
        assert_eq!(signal.len(), 1);
    }

    #[test]
    fn test_event_bus_drops_when_full() {
        let bus = EventBus::new(2);
        let entity = EntityId::from_raw(1);
        for _ in 0..3 {
            bus.publish(CombatEvent::AttackStarted { entity });
        }
        assert_eq!(bus.pending_count(), 2);
        assert_eq!(bus.drain().len(), 2);
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_event_entity_tag() {
        let entity = EntityId::from_raw(9);
        let ev = CombatEvent::BlockChanged {
            entity,
            blocking: true,
        };
        assert_eq!(ev.entity(), entity);
    }
}
