//! # Hero Common
//!
//! Common types, utilities, and shared abstractions for the hero combat core.
//!
//! This crate provides foundational types used across the combat crates:
//! - ID types (EntityId, ColliderId)
//! - Y-up vector helpers and the body `Transform`
//! - Version information for config schemas
//! - Common error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod ids;
pub mod math;
pub mod version;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::*;
    pub use crate::ids::*;
    pub use crate::math::*;
    pub use crate::version::*;
    pub use glam::{Quat, Vec3};
}

pub use prelude::*;
