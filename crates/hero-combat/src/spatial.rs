//! Spatial query contract and a sphere-collider world.
//!
//! Combat code only needs "which colliders overlap this sphere". The host
//! engine normally answers that; [`ColliderWorld`] is a small stand-alone
//! implementation used by the simulation binary and the tests.

use hero_common::{ColliderId, EntityId, Vec3};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Bit mask over 32 collision layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerMask(pub u32);

impl LayerMask {
    /// Every layer.
    pub const ALL: Self = Self(u32::MAX);
    /// No layer.
    pub const NONE: Self = Self(0);

    /// Mask containing a single layer.
    #[must_use]
    pub const fn layer(layer: u8) -> Self {
        if layer < 32 {
            Self(1 << layer)
        } else {
            Self::NONE
        }
    }

    /// Whether `layer` is in the mask.
    #[must_use]
    pub const fn contains(self, layer: u8) -> bool {
        layer < 32 && self.0 & (1 << layer) != 0
    }

    /// Mask with `layer` removed.
    #[must_use]
    pub const fn without(self, layer: u8) -> Self {
        Self(self.0 & !Self::layer(layer).0)
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Filter applied to overlap queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OverlapFilter {
    /// Layers to consider
    pub mask: LayerMask,
    /// Whether trigger volumes are reported
    pub include_triggers: bool,
}

/// One collider returned by an overlap query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColliderHit {
    /// Collider handle
    pub collider: ColliderId,
    /// Root of the collider's hierarchy (the owning character)
    pub root: EntityId,
    /// Entity exposing the damageable capability, if any
    pub damageable: Option<EntityId>,
    /// Closest point on the collider surface to the query center
    pub closest_point: Vec3,
}

/// Sphere overlap queries.
pub trait SpatialQuery {
    /// Appends every collider overlapping the sphere to `out`.
    fn overlap_sphere(&self, center: Vec3, radius: f32, filter: OverlapFilter, out: &mut Vec<ColliderHit>);
}

/// Enables and disables the collision volumes of a character.
pub trait ColliderControl {
    /// Toggles every collider whose root is `root`.
    fn set_colliders_enabled(&mut self, root: EntityId, enabled: bool);
}

/// Description of a sphere collider to add.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SphereColliderDesc {
    /// Owning character
    pub root: EntityId,
    /// Entity damaged when this collider is hit
    pub damageable: Option<EntityId>,
    /// Offset from the root position
    pub offset: Vec3,
    /// Sphere radius
    pub radius: f32,
    /// Collision layer (0..32)
    pub layer: u8,
    /// Trigger volume
    pub trigger: bool,
}

impl SphereColliderDesc {
    /// A solid collider on layer 0 that damages its root.
    #[must_use]
    pub fn new(root: EntityId, radius: f32) -> Self {
        Self {
            root,
            damageable: Some(root),
            offset: Vec3::ZERO,
            radius: radius.max(0.0),
            layer: 0,
            trigger: false,
        }
    }

    /// Sets the damageable entity.
    #[must_use]
    pub const fn with_damageable(mut self, damageable: Option<EntityId>) -> Self {
        self.damageable = damageable;
        self
    }

    /// Sets the offset from the root.
    #[must_use]
    pub const fn with_offset(mut self, offset: Vec3) -> Self {
        self.offset = offset;
        self
    }

    /// Sets the layer.
    #[must_use]
    pub const fn with_layer(mut self, layer: u8) -> Self {
        self.layer = layer;
        self
    }

    /// Marks the collider as a trigger.
    #[must_use]
    pub const fn as_trigger(mut self) -> Self {
        self.trigger = true;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct SphereCollider {
    id: ColliderId,
    desc: SphereColliderDesc,
    center: Vec3,
    enabled: bool,
}

impl SphereCollider {
    fn closest_point(&self, point: Vec3) -> Vec3 {
        let delta = point - self.center;
        let distance = delta.length();
        if distance <= self.desc.radius {
            point
        } else {
            self.center + delta / distance * self.desc.radius
        }
    }
}

/// Sphere colliders attached to character roots.
#[derive(Debug, Default)]
pub struct ColliderWorld {
    colliders: Vec<SphereCollider>,
    next_id: u32,
}

impl ColliderWorld {
    /// Creates an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a collider whose root currently stands at `root_position`.
    pub fn add(&mut self, desc: SphereColliderDesc, root_position: Vec3) -> ColliderId {
        let id = ColliderId::new(self.next_id);
        self.next_id += 1;
        self.colliders.push(SphereCollider {
            id,
            desc,
            center: root_position + desc.offset,
            enabled: true,
        });
        id
    }

    /// Moves every collider of `root` along with it.
    pub fn sync_root(&mut self, root: EntityId, position: Vec3) {
        for c in self.colliders.iter_mut().filter(|c| c.desc.root == root) {
            c.center = position + c.desc.offset;
        }
    }

    /// Removes every collider of `root`. Returns how many were removed.
    pub fn remove_root(&mut self, root: EntityId) -> usize {
        let before = self.colliders.len();
        self.colliders.retain(|c| c.desc.root != root);
        before - self.colliders.len()
    }

    /// Whether any collider of `root` is enabled.
    #[must_use]
    pub fn has_enabled_colliders(&self, root: EntityId) -> bool {
        self.colliders.iter().any(|c| c.desc.root == root && c.enabled)
    }

    /// Number of colliders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.colliders.len()
    }

    /// Whether the world has no colliders.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colliders.is_empty()
    }
}

impl SpatialQuery for ColliderWorld {
    fn overlap_sphere(&self, center: Vec3, radius: f32, filter: OverlapFilter, out: &mut Vec<ColliderHit>) {
        for c in &self.colliders {
            if !c.enabled || !filter.mask.contains(c.desc.layer) {
                continue;
            }
            if c.desc.trigger && !filter.include_triggers {
                continue;
            }
            let reach = radius + c.desc.radius;
            if (c.center - center).length_squared() > reach * reach {
                continue;
            }
            out.push(ColliderHit {
                collider: c.id,
                root: c.desc.root,
                damageable: c.desc.damageable,
                closest_point: c.closest_point(center),
            });
        }
    }
}

impl ColliderControl for ColliderWorld {
    fn set_colliders_enabled(&mut self, root: EntityId, enabled: bool) {
        let mut changed = 0;
        for c in self.colliders.iter_mut().filter(|c| c.desc.root == root) {
            if c.enabled != enabled {
                c.enabled = enabled;
                changed += 1;
            }
        }
        if changed > 0 {
            debug!("{} {} collider(s) of {}", if enabled { "Enabled" } else { "Disabled" }, changed, root);
        }
    }
}
