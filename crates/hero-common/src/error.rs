//! Error types for the hero combat core.
//!
//! Combat operations themselves never fail with an error: a rejected action
//! (dead agent, cooldown, invulnerability, missing target) is reported through
//! a `bool` or is a silent no-op. The types here cover configuration and I/O.

use thiserror::Error;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum HeroError {
    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Schema version mismatch
    #[error("Schema version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Expected version
        expected: String,
        /// Actual version found
        actual: String,
    },
}

/// A configuration value outside the range the simulation accepts.
///
/// Loaders usually log these and clamp the value instead of failing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Numeric field outside its allowed range
    #[error("{section}.{field} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        /// Config section (e.g. "combat")
        section: &'static str,
        /// Field name
        field: &'static str,
        /// Offending value
        value: f32,
        /// Inclusive minimum
        min: f32,
        /// Inclusive maximum
        max: f32,
    },

    /// Attack window starts after it ends
    #[error("attack window '{state}' is inverted: start {start} > end {end}")]
    InvertedWindow {
        /// Animation state name
        state: String,
        /// Window start (normalized time)
        start: f32,
        /// Window end (normalized time)
        end: f32,
    },

    /// Attack window without a state name
    #[error("attack window on layer {layer} has an empty state name")]
    EmptyStateName {
        /// Animator layer index
        layer: usize,
    },
}

impl ConfigError {
    /// Checks `value` against an inclusive range.
    pub fn check_range(
        section: &'static str,
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    ) -> Result<(), Self> {
        if value.is_nan() || value < min || value > max {
            return Err(Self::OutOfRange {
                section,
                field,
                value,
                min,
                max,
            });
        }
        Ok(())
    }
}

/// Clamps `value` into `[min, max]`; NaN becomes `fallback`.
#[must_use]
pub fn clamp_or(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}

/// Result type alias for fallible hero operations.
pub type HeroResult<T> = Result<T, HeroError>;
