//! Vector helpers for a Y-up world.
//!
//! Characters only turn around the vertical axis; `forward` is +Z as in most
//! host engines.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Squared length below which a direction is considered degenerate.
pub const DIRECTION_EPSILON_SQ: f32 = f32::EPSILON;

/// Position and orientation of a character body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// World-space position.
    pub position: Vec3,
    /// World-space rotation.
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    /// Transform at the origin facing +Z.
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    /// Creates a transform.
    #[must_use]
    pub const fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Creates an unrotated transform at a position.
    #[must_use]
    pub const fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    /// Creates a transform at `position` facing along the horizontal part of `direction`.
    #[must_use]
    pub fn looking_along(position: Vec3, direction: Vec3) -> Self {
        Self {
            position,
            rotation: yaw_look_rotation(direction).unwrap_or(Quat::IDENTITY),
        }
    }

    /// Unit forward vector (+Z rotated by this transform).
    #[must_use]
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }

    /// Transforms a local offset into world space (rotation then translation).
    #[must_use]
    pub fn transform_point(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation * local
    }
}

/// Drops the vertical component.
#[must_use]
pub fn flatten(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Yaw-only rotation that faces the horizontal part of `direction`.
///
/// Returns `None` when the horizontal part is degenerate.
#[must_use]
pub fn yaw_look_rotation(direction: Vec3) -> Option<Quat> {
    let flat = flatten(direction);
    if flat.length_squared() <= DIRECTION_EPSILON_SQ {
        return None;
    }
    Some(Quat::from_rotation_y(flat.x.atan2(flat.z)))
}

/// Spherically interpolates `from` toward a yaw rotation facing `direction`.
///
/// `t` is clamped to [0, 1]. A degenerate direction leaves `from` unchanged.
#[must_use]
pub fn turn_towards(from: Quat, direction: Vec3, t: f32) -> Quat {
    match yaw_look_rotation(direction) {
        Some(target) => from.slerp(target, t.clamp(0.0, 1.0)),
        None => from,
    }
}

/// Moves `current` toward `target` by at most `max_delta`, never overshooting.
#[must_use]
pub fn move_towards(current: Vec3, target: Vec3, max_delta: f32) -> Vec3 {
    let delta = target - current;
    let distance = delta.length();
    if distance <= max_delta || distance <= f32::EPSILON {
        target
    } else {
        current + delta / distance * max_delta
    }
}

/// Unsigned angle between two vectors in degrees (0..=180).
///
/// Returns 0 when either vector is degenerate.
#[must_use]
pub fn angle_between_deg(a: Vec3, b: Vec3) -> f32 {
    let denom = (a.length_squared() * b.length_squared()).sqrt();
    if denom < 1e-15 {
        return 0.0;
    }
    let cos = (a.dot(b) / denom).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_follows_yaw() {
        let t = Transform::looking_along(Vec3::ZERO, Vec3::X);
        assert!((t.forward() - Vec3::X).length() < 1e-5);

        let t = Transform::looking_along(Vec3::ZERO, Vec3::new(0.0, 5.0, -2.0));
        assert!((t.forward() - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn test_vertical_direction_has_no_yaw() {
        assert!(yaw_look_rotation(Vec3::Y).is_none());
        let q = turn_towards(Quat::IDENTITY, Vec3::Y, 1.0);
        assert_eq!(q, Quat::IDENTITY);
    }

    #[test]
    fn test_turn_towards_full_step() {
        let q = turn_towards(Quat::IDENTITY, Vec3::X, 5.0);
        assert!(((q * Vec3::Z) - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn test_move_towards_does_not_overshoot() {
        let p = move_towards(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), 5.0);
        assert_eq!(p, Vec3::new(1.0, 0.0, 0.0));

        let p = move_towards(Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0), 2.0);
        assert!((p.x - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_angle_between() {
        assert!((angle_between_deg(Vec3::Z, Vec3::X) - 90.0).abs() < 1e-3);
        assert!((angle_between_deg(Vec3::Z, Vec3::NEG_Z) - 180.0).abs() < 1e-3);
        assert_eq!(angle_between_deg(Vec3::ZERO, Vec3::X), 0.0);
    }

    #[test]
    fn test_transform_point_rotates_offset() {
        let t = Transform::looking_along(Vec3::new(1.0, 0.0, 1.0), Vec3::X);
        let p = t.transform_point(Vec3::new(0.0, 1.0, 1.0));
        assert!((p - Vec3::new(2.0, 1.0, 1.0)).length() < 1e-5);
    }
}
