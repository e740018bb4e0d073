//! # Spatial Queries
//!
//! Queries are described as data so the coordinator can derive a cheap
//! broad-phase test from them before anything is rewound:
//!
//! ```text
//!   Query ──broad_phase()──► BroadPhase::Ray    (ray, max distance)
//!                            BroadPhase::Volume (swept or static AABB)
//! ```
//!
//! Running the query itself is the job of a [`QueryEngine`]. The engine sees
//! the registry with every gated entity already showing its historical pose.

mod engine;

pub use engine::VolumeQueryEngine;

use hitrewind_shared::{Aabb, Quaternion, Ray, Transform, Vec3};
use serde::{Deserialize, Serialize};

use crate::clock::Frame;
use crate::entity::{EntityId, TrackedEntity};
use crate::registry::EntityRegistry;
use crate::snapshot::RewindTarget;

/// A spatial query against hit volumes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Query {
    /// Ray cast.
    Ray {
        /// Ray, unit direction.
        ray: Ray,
        /// Furthest distance reported.
        max_distance: f32,
    },
    /// Sphere swept along a ray.
    SphereCast {
        /// Start center and direction.
        ray: Ray,
        /// Sphere radius.
        radius: f32,
        /// Sweep length.
        max_distance: f32,
    },
    /// Oriented box swept along a ray.
    BoxCast {
        /// Start center and direction.
        ray: Ray,
        /// Box half size.
        half_extents: Vec3,
        /// Box orientation.
        rotation: Quaternion,
        /// Sweep length.
        max_distance: f32,
    },
    /// Capsule swept along a direction.
    CapsuleCast {
        /// First cap center at the start.
        point_a: Vec3,
        /// Second cap center at the start.
        point_b: Vec3,
        /// Capsule radius.
        radius: f32,
        /// Unit sweep direction.
        direction: Vec3,
        /// Sweep length.
        max_distance: f32,
    },
    /// Static sphere overlap.
    OverlapSphere {
        /// Center.
        center: Vec3,
        /// Radius.
        radius: f32,
    },
    /// Static oriented box overlap.
    OverlapBox {
        /// Center.
        center: Vec3,
        /// Half size.
        half_extents: Vec3,
        /// Orientation.
        rotation: Quaternion,
    },
    /// Static capsule overlap.
    OverlapCapsule {
        /// First cap center.
        point_a: Vec3,
        /// Second cap center.
        point_b: Vec3,
        /// Radius.
        radius: f32,
    },
}

/// Cheap pre-filter derived from a [`Query`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BroadPhase {
    /// Entity bounds must be reached by the ray.
    Ray {
        /// Ray.
        ray: Ray,
        /// Furthest distance.
        max_distance: f32,
    },
    /// Entity bounds must overlap the box.
    Volume(Aabb),
}

impl BroadPhase {
    /// Would `entity` pass at `target`?
    #[must_use]
    pub fn test(&self, entity: &TrackedEntity, target: RewindTarget, now: Frame) -> bool {
        match self {
            Self::Ray { ray, max_distance } => entity.ray_reaches_at(target, now, ray, *max_distance),
            Self::Volume(bounds) => entity.overlaps_at(target, now, bounds),
        }
    }
}

/// Unbounded casts are clamped to a finite sweep so bounds stay finite.
fn finite(distance: f32) -> f32 {
    if distance.is_finite() {
        distance.max(0.0)
    } else {
        f32::MAX
    }
}

fn swept(start: Aabb, direction: Vec3, distance: f32) -> Aabb {
    let offset = direction * finite(distance);
    start.union(&Aabb { min: start.min + offset, max: start.max + offset })
}

impl Query {
    /// Ray query from `origin` towards `direction`.
    #[must_use]
    pub fn ray(origin: Vec3, direction: Vec3, max_distance: f32) -> Self {
        Self::Ray { ray: Ray::new(origin, direction), max_distance }
    }

    /// Sphere cast from `origin` towards `direction`.
    #[must_use]
    pub fn sphere_cast(origin: Vec3, radius: f32, direction: Vec3, max_distance: f32) -> Self {
        Self::SphereCast { ray: Ray::new(origin, direction), radius, max_distance }
    }

    /// Static sphere overlap.
    #[must_use]
    pub const fn overlap_sphere(center: Vec3, radius: f32) -> Self {
        Self::OverlapSphere { center, radius }
    }

    /// Bounds of the query shape before any sweep.
    #[must_use]
    pub fn start_bounds(&self) -> Aabb {
        match *self {
            Self::Ray { ray, .. } => Aabb::new(ray.origin, ray.origin),
            Self::SphereCast { ray, radius, .. } => {
                Aabb::from_center_half_extents(ray.origin, Vec3::splat(radius))
            }
            Self::BoxCast { ray, half_extents, rotation, .. } => {
                box_bounds(ray.origin, half_extents, rotation)
            }
            Self::OverlapSphere { center, radius } => {
                Aabb::from_center_half_extents(center, Vec3::splat(radius))
            }
            Self::OverlapBox { center, half_extents, rotation } => {
                box_bounds(center, half_extents, rotation)
            }
            Self::CapsuleCast { point_a, point_b, radius, .. }
            | Self::OverlapCapsule { point_a, point_b, radius } => {
                Aabb::new(point_a, point_b).expanded(radius)
            }
        }
    }

    /// Sweep direction and length, `None` for static overlaps.
    #[must_use]
    pub fn sweep(&self) -> Option<(Vec3, f32)> {
        match *self {
            Self::Ray { ray, max_distance }
            | Self::SphereCast { ray, max_distance, .. }
            | Self::BoxCast { ray, max_distance, .. } => Some((ray.direction, max_distance)),
            Self::CapsuleCast { direction, max_distance, .. } => {
                Some((direction.normalize_or_zero(), max_distance))
            }
            Self::OverlapSphere { .. } | Self::OverlapBox { .. } | Self::OverlapCapsule { .. } => {
                None
            }
        }
    }

    /// Everything the query can touch: start bounds encapsulating end bounds.
    #[must_use]
    pub fn bounds(&self) -> Aabb {
        let start = self.start_bounds();
        match self.sweep() {
            Some((direction, distance)) => swept(start, direction, distance),
            None => start,
        }
    }

    /// Broad-phase test for this query.
    #[must_use]
    pub fn broad_phase(&self) -> BroadPhase {
        match *self {
            Self::Ray { ray, max_distance } => BroadPhase::Ray { ray, max_distance },
            _ => BroadPhase::Volume(self.bounds()),
        }
    }
}

fn box_bounds(center: Vec3, half_extents: Vec3, rotation: Quaternion) -> Aabb {
    Aabb::from_center_half_extents(Vec3::ZERO, half_extents)
        .transformed(&Transform::from_position_rotation(center, rotation))
}

/// One hit reported by a [`QueryEngine`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QueryHit {
    /// Entity hit.
    pub entity: EntityId,
    /// Index of the hit volume.
    pub volume: usize,
    /// Distance along the sweep, 0 for overlaps.
    pub distance: f32,
}

/// Set of collision layers, one bit per layer `0..=31`.
///
/// Entities sit on a single layer (see [`TrackedEntity::layer`]); a query
/// only tests, and the gate only rewinds, entities whose layer is in its
/// mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerMask(u32);

impl LayerMask {
    /// Every layer.
    pub const ALL: Self = Self(u32::MAX);
    /// No layer.
    pub const NONE: Self = Self(0);

    /// Mask from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Mask holding only `layer`.
    #[must_use]
    pub const fn layer(layer: u8) -> Self {
        Self(layer_bit(layer))
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Adds `layer`.
    #[must_use]
    pub const fn with(self, layer: u8) -> Self {
        Self(self.0 | layer_bit(layer))
    }

    /// Removes `layer`.
    #[must_use]
    pub const fn without(self, layer: u8) -> Self {
        Self(self.0 & !layer_bit(layer))
    }

    /// True if `layer` is in the mask.
    #[must_use]
    pub const fn contains(self, layer: u8) -> bool {
        self.0 & layer_bit(layer) != 0
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        Self::ALL
    }
}

const fn layer_bit(layer: u8) -> u32 {
    if layer <= MAX_LAYER {
        1 << layer
    } else {
        0
    }
}

/// Highest usable layer index.
pub const MAX_LAYER: u8 = 31;

/// Which entities a query may touch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueryFilter {
    /// Entity skipped entirely, usually the shooter.
    pub ignore: Option<EntityId>,
    /// Layers tested.
    pub layers: LayerMask,
}

impl QueryFilter {
    /// Every entity on every layer.
    pub const ANY: Self = Self { ignore: None, layers: LayerMask::ALL };

    /// Every entity except `id`.
    #[must_use]
    pub const fn ignoring(id: EntityId) -> Self {
        Self { ignore: Some(id), layers: LayerMask::ALL }
    }

    /// Same filter restricted to `layers`.
    #[must_use]
    pub const fn with_layers(self, layers: LayerMask) -> Self {
        Self { layers, ..self }
    }

    /// True if `entity` passes the filter.
    #[must_use]
    pub fn accepts(&self, entity: &TrackedEntity) -> bool {
        self.ignore != Some(entity.id()) && self.layers.contains(entity.layer())
    }
}

/// Runs queries against the registry's current poses.
pub trait QueryEngine {
    /// Executes `query` against the entities `filter` accepts.
    fn run(&mut self, registry: &EntityRegistry, query: &Query, filter: QueryFilter)
        -> Vec<QueryHit>;
}

impl<F> QueryEngine for F
where
    F: FnMut(&EntityRegistry, &Query, QueryFilter) -> Vec<QueryHit>,
{
    fn run(
        &mut self,
        registry: &EntityRegistry,
        query: &Query,
        filter: QueryFilter,
    ) -> Vec<QueryHit> {
        self(registry, query, filter)
    }
}
