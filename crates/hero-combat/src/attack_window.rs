//! Fires melee swings from animation playback windows.
//!
//! The driver polls the animator once per tick and compares the normalized
//! playback time of a named state against configured windows, so hero and
//! NPC can share clips without per-clip callbacks.

use hero_common::{clamp_or, ConfigError, EntityId};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

/// Snapshot of the active state on one animator layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationStateInfo<'a> {
    /// State name
    pub name: &'a str,
    /// Raw normalized time; the integer part counts completed cycles
    pub normalized_time: f32,
    /// Whether the state loops
    pub looping: bool,
}

/// Read-only view of an animator.
pub trait AnimationStateSource {
    /// Number of layers.
    fn layer_count(&self) -> usize;

    /// Active state on `layer`, if any.
    fn current_state(&self, layer: usize) -> Option<AnimationStateInfo<'_>>;
}

/// Resolves the animator driving an entity.
pub trait AnimatorLookup {
    /// Animator of `entity`, if it has one.
    fn animator(&self, entity: EntityId) -> Option<&dyn AnimationStateSource>;
}

/// A normalized-time window on one animation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttackWindow {
    /// Animation state that carries the swing
    pub state_name: String,
    /// Animator layer index
    pub layer_index: usize,
    /// Window start (normalized time)
    pub start: f32,
    /// Window end (normalized time)
    pub end: f32,
    /// Distance past `end` before the window re-arms
    pub reset_buffer: f32,
}

impl Default for AttackWindow {
    fn default() -> Self {
        Self {
            state_name: "Attack".to_string(),
            layer_index: 1,
            start: 0.25,
            end: 0.4,
            reset_buffer: 0.05,
        }
    }
}

impl AttackWindow {
    /// Creates a window on `state_name`.
    #[must_use]
    pub fn new(state_name: impl Into<String>, layer_index: usize, start: f32, end: f32) -> Self {
        Self {
            state_name: state_name.into(),
            layer_index,
            start,
            end,
            ..Self::default()
        }
    }

    /// Sets the reset buffer.
    #[must_use]
    pub const fn with_reset_buffer(mut self, buffer: f32) -> Self {
        self.reset_buffer = buffer;
        self
    }

    /// Checks the window definition.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.state_name.is_empty() {
            return Err(ConfigError::EmptyStateName {
                layer: self.layer_index,
            });
        }
        ConfigError::check_range("attack_window", "start", self.start, 0.0, 1.0)?;
        ConfigError::check_range("attack_window", "end", self.end, 0.0, 1.0)?;
        ConfigError::check_range("attack_window", "reset_buffer", self.reset_buffer, 0.0, f32::MAX)?;
        if self.start > self.end {
            return Err(ConfigError::InvertedWindow {
                state: self.state_name.clone(),
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Returns a copy with `0 <= start <= end <= 1` and a non-negative buffer.
    #[must_use]
    pub fn sanitized(self) -> Self {
        let start = clamp_or(self.start, 0.0, 1.0, 0.0);
        let end = clamp_or(self.end, 0.0, 1.0, 1.0).max(start);
        Self {
            start,
            end,
            reset_buffer: clamp_or(self.reset_buffer, 0.0, f32::MAX, 0.0),
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct WindowLatch {
    triggered: bool,
    last_raw: Option<f32>,
}

impl WindowLatch {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Polls an animator and fires once per entry into each window per cycle.
#[derive(Debug)]
pub struct AttackWindowDriver {
    windows: Vec<AttackWindow>,
    latches: Vec<WindowLatch>,
    warned_missing_animator: bool,
}

impl Default for AttackWindowDriver {
    fn default() -> Self {
        Self::new(vec![AttackWindow::default()])
    }
}

impl AttackWindowDriver {
    /// Creates a driver. Invalid windows are logged and clamped.
    #[must_use]
    pub fn new(windows: Vec<AttackWindow>) -> Self {
        let windows: Vec<_> = windows
            .into_iter()
            .map(|w| {
                if let Err(e) = w.validate() {
                    warn!("{}; clamping", e);
                }
                w.sanitized()
            })
            .collect();
        let latches = vec![WindowLatch::default(); windows.len()];
        Self {
            windows,
            latches,
            warned_missing_animator: false,
        }
    }

    /// Configured windows.
    #[must_use]
    pub fn windows(&self) -> &[AttackWindow] {
        &self.windows
    }

    /// Whether window `index` has fired and not yet re-armed.
    #[must_use]
    pub fn is_triggered(&self, index: usize) -> bool {
        self.latches.get(index).is_some_and(|l| l.triggered)
    }

    /// Re-arms every window.
    pub fn reset(&mut self) {
        self.latches.iter_mut().for_each(WindowLatch::reset);
    }

    /// Polls `animator` once. Calls `on_fire(window_index)` for every window
    /// entered this tick and returns how many fired.
    pub fn tick(&mut self, animator: Option<&dyn AnimationStateSource>, mut on_fire: impl FnMut(usize)) -> usize {
        let Some(animator) = animator else {
            if !self.warned_missing_animator {
                warn!("Attack window driver has no animator; swings will not fire");
                self.warned_missing_animator = true;
            }
            return 0;
        };

        let mut fired = 0;
        for (index, (window, latch)) in self.windows.iter().zip(self.latches.iter_mut()).enumerate() {
            if window.state_name.is_empty() {
                continue;
            }
            if window.layer_index >= animator.layer_count() {
                latch.reset();
                continue;
            }

            let state = match animator.current_state(window.layer_index) {
                Some(state) if state.name == window.state_name => state,
                _ => {
                    if latch.triggered || latch.last_raw.is_some() {
                        latch.reset();
                    }
                    continue;
                },
            };

            let raw = state.normalized_time;
            if let Some(prev) = latch.last_raw {
                let new_cycle = raw < prev || (state.looping && raw.floor() > prev.floor());
                if new_cycle {
                    latch.triggered = false;
                }
            }
            latch.last_raw = Some(raw);

            let normalized = if state.looping { raw - raw.floor() } else { raw.clamp(0.0, 1.0) };

            if !latch.triggered && normalized >= window.start && normalized <= window.end {
                trace!("Window '{}' fired at {:.3}", window.state_name, normalized);
                latch.triggered = true;
                fired += 1;
                on_fire(index);
            }

            if normalized > window.end + window.reset_buffer {
                latch.triggered = false;
            }
        }
        fired
    }
}
