//! Reference query engine.
//!
//! Rays are exact against every hit shape. Casts and overlaps are coarse:
//! casts test the cast center against each volume's world box grown by the
//! cast's half size, overlaps test box against box. Good enough for tests and
//! the demo server; real games plug their physics engine in via
//! [`QueryEngine`].

use hitrewind_shared::{Aabb, Ray, Vec3};

use super::{Query, QueryEngine, QueryFilter, QueryHit};
use crate::entity::TrackedEntity;
use crate::registry::EntityRegistry;

/// Hit-volume query engine working directly on tracked entities.
#[derive(Clone, Copy, Debug, Default)]
pub struct VolumeQueryEngine;

impl VolumeQueryEngine {
    /// Creates the engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn ray_hits(entity: &TrackedEntity, ray: &Ray, max_distance: f32, out: &mut Vec<QueryHit>) {
        for (volume, v) in entity.volumes().iter().enumerate() {
            if let Some(distance) = v.shape.ray_distance(&v.pose, ray) {
                if distance <= max_distance {
                    out.push(QueryHit { entity: entity.id(), volume, distance });
                }
            }
        }
    }

    fn cast_hits(
        entity: &TrackedEntity,
        ray: &Ray,
        half_extents: Vec3,
        max_distance: f32,
        out: &mut Vec<QueryHit>,
    ) {
        for (volume, v) in entity.volumes().iter().enumerate() {
            let bounds = v.shape.world_bounds(&v.pose);
            let grown = Aabb::from_center_half_extents(
                bounds.center(),
                bounds.half_extents() + half_extents,
            );
            if let Some(distance) = grown.ray_distance(ray) {
                if distance <= max_distance {
                    out.push(QueryHit { entity: entity.id(), volume, distance });
                }
            }
        }
    }

    fn overlap_hits(entity: &TrackedEntity, query: &Aabb, out: &mut Vec<QueryHit>) {
        for (volume, v) in entity.volumes().iter().enumerate() {
            if v.shape.world_bounds(&v.pose).intersects(query) {
                out.push(QueryHit { entity: entity.id(), volume, distance: 0.0 });
            }
        }
    }
}

impl QueryEngine for VolumeQueryEngine {
    fn run(
        &mut self,
        registry: &EntityRegistry,
        query: &Query,
        filter: QueryFilter,
    ) -> Vec<QueryHit> {
        let mut hits = Vec::new();
        let start = query.start_bounds();

        for entity in registry.iter().filter(|e| filter.accepts(e)) {
            match *query {
                Query::Ray { ray, max_distance } => {
                    Self::ray_hits(entity, &ray, max_distance, &mut hits);
                }
                Query::SphereCast { ray, max_distance, .. }
                | Query::BoxCast { ray, max_distance, .. } => {
                    Self::cast_hits(entity, &ray, start.half_extents(), max_distance, &mut hits);
                }
                Query::CapsuleCast { direction, max_distance, .. } => {
                    let ray = Ray::new(start.center(), direction);
                    Self::cast_hits(entity, &ray, start.half_extents(), max_distance, &mut hits);
                }
                Query::OverlapSphere { .. }
                | Query::OverlapBox { .. }
                | Query::OverlapCapsule { .. } => Self::overlap_hits(entity, &start, &mut hits),
            }
        }

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.entity.cmp(&b.entity))
                .then(a.volume.cmp(&b.volume))
        });
        hits
    }
}
