//! # Tracked Entities
//!
//! An entity is a root pose plus an ordered, fixed-length list of hit
//! volumes. Each simulation step the coordinator captures it into its own
//! [`SnapshotRing`]; a rewind writes a historical pose over the live one and
//! parks the live pose in a restore slot until [`TrackedEntity::restore`].
//!
//! ```text
//!   Live ──rewind(t)──► Rewound{t} ──rewind(t')──► Rewound{t'}
//!    ▲                      │                          │
//!    └──────restore─────────┴──────────restore─────────┘
//! ```
//!
//! The restore slot is written once per cycle, on the `Live` to `Rewound`
//! edge, so nested windows never save a historical pose as "live".

mod shape;

pub use shape::{HitShape, ShapeAxis};

use std::fmt;

use hitrewind_shared::{Aabb, Ray, Transform, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Frame;
use crate::config::RewindConfig;
use crate::error::{RewindError, RewindResult};
use crate::query::MAX_LAYER;
use crate::snapshot::{RewindTarget, SampleKind, SnapshotRing};

/// Unique identifier for a tracked entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates an entity ID.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Null/invalid entity ID.
    pub const NULL: Self = Self(u64::MAX);

    /// Checks if this entity ID is null/invalid.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("#null")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// Whether an entity shows its live or a historical pose.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum RewindState {
    /// Live simulation pose.
    #[default]
    Live,
    /// Historical pose for `target`.
    Rewound {
        /// Target currently applied.
        target: RewindTarget,
    },
}

/// One hit volume: a shape attached to the root at a local offset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HitVolume {
    /// Collision shape.
    pub shape: HitShape,
    /// Offset from the root pose.
    pub local: Transform,
    /// Current world pose.
    pub pose: Transform,
}

/// Where an entity's broad-phase bounds come from.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum BoundsSource {
    /// Fixed box in root space.
    Local(Aabb),
    /// Union of every hit volume's world bounds, grown by `padding`.
    HitVolumes {
        /// Margin added on every side.
        padding: f32,
    },
}

impl Default for BoundsSource {
    fn default() -> Self {
        Self::HitVolumes { padding: 0.0 }
    }
}

/// Builder for [`TrackedEntity`].
///
/// Hit volumes and the bounds source are handed over here and fixed for the
/// entity's lifetime.
#[derive(Clone, Debug)]
pub struct TrackedEntityBuilder {
    id: EntityId,
    root: Transform,
    volumes: Vec<(HitShape, Transform)>,
    bounds: BoundsSource,
    sampling_interval: Option<usize>,
    layer: u8,
}

impl TrackedEntityBuilder {
    /// Starts a builder for `id` at the identity pose.
    #[must_use]
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            root: Transform::IDENTITY,
            volumes: Vec::new(),
            bounds: BoundsSource::default(),
            sampling_interval: None,
            layer: 0,
        }
    }

    /// Initial root pose.
    #[must_use]
    pub fn root(mut self, root: Transform) -> Self {
        self.root = root;
        self
    }

    /// Appends a hit volume at `local` offset from the root.
    #[must_use]
    pub fn volume(mut self, shape: HitShape, local: Transform) -> Self {
        self.volumes.push((shape, local));
        self
    }

    /// Broad-phase bounds source.
    #[must_use]
    pub fn bounds(mut self, bounds: BoundsSource) -> Self {
        self.bounds = bounds;
        self
    }

    /// Capture a real sample every `interval` frames.
    #[must_use]
    pub fn sampling_interval(mut self, interval: usize) -> Self {
        self.sampling_interval = Some(interval);
        self
    }

    /// Collision layer, `0..=31`. Defaults to 0.
    #[must_use]
    pub fn layer(mut self, layer: u8) -> Self {
        self.layer = layer;
        self
    }

    /// Builds the entity with history sized from `config`.
    #[must_use]
    pub fn build(self, config: &RewindConfig) -> TrackedEntity {
        let depth = config.history_depth.max(1);
        let requested = self.sampling_interval.unwrap_or(config.default_sampling_interval);
        let interval = nearest_divisor(depth, requested);
        if interval != requested {
            warn!(
                entity = %self.id,
                requested,
                coerced = interval,
                history_depth = depth,
                "sampling interval does not divide history depth"
            );
        }

        let layer = self.layer.min(MAX_LAYER);
        if layer != self.layer {
            warn!(entity = %self.id, requested = self.layer, coerced = layer, "layer out of range");
        }

        let volumes: Vec<HitVolume> = self
            .volumes
            .into_iter()
            .map(|(shape, local)| HitVolume { shape, local, pose: self.root.compose(&local) })
            .collect();
        let count = volumes.len();

        TrackedEntity {
            id: self.id,
            layer,
            root: self.root,
            volumes,
            bounds: self.bounds,
            history: SnapshotRing::new(depth, count, interval),
            restore_root: self.root,
            restore_poses: vec![Transform::IDENTITY; count],
            scratch: vec![Transform::IDENTITY; count],
            state: RewindState::Live,
        }
    }
}

/// Divisor of `depth` closest to `requested`; ties go to the smaller one.
fn nearest_divisor(depth: usize, requested: usize) -> usize {
    let requested = requested.clamp(1, depth);
    (1..=depth)
        .filter(|d| depth % d == 0)
        .min_by_key(|d| d.abs_diff(requested))
        .unwrap_or(1)
}

/// An entity whose hit volumes can be rewound.
#[derive(Clone, Debug)]
pub struct TrackedEntity {
    id: EntityId,
    layer: u8,
    root: Transform,
    volumes: Vec<HitVolume>,
    bounds: BoundsSource,
    history: SnapshotRing,
    restore_root: Transform,
    restore_poses: Vec<Transform>,
    scratch: Vec<Transform>,
    state: RewindState,
}

impl TrackedEntity {
    /// Entity ID.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Collision layer.
    #[inline]
    #[must_use]
    pub const fn layer(&self) -> u8 {
        self.layer
    }

    /// Current rewind state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> RewindState {
        self.state
    }

    /// True while a historical pose is applied.
    #[inline]
    #[must_use]
    pub const fn is_rewound(&self) -> bool {
        matches!(self.state, RewindState::Rewound { .. })
    }

    /// Current root pose (historical while rewound).
    #[inline]
    #[must_use]
    pub const fn root(&self) -> &Transform {
        &self.root
    }

    /// Hit volumes with their current poses.
    #[inline]
    #[must_use]
    pub fn volumes(&self) -> &[HitVolume] {
        &self.volumes
    }

    /// Snapshot history.
    #[inline]
    #[must_use]
    pub const fn history(&self) -> &SnapshotRing {
        &self.history
    }

    /// Bounds source.
    #[must_use]
    pub const fn bounds_source(&self) -> BoundsSource {
        self.bounds
    }

    fn bounds_of<'a>(&self, root: &Transform, poses: impl Iterator<Item = &'a Transform>) -> Aabb {
        match self.bounds {
            BoundsSource::Local(local) => local.transformed(root),
            BoundsSource::HitVolumes { padding } => {
                let mut boxes = self.volumes.iter().zip(poses).map(|(v, p)| v.shape.world_bounds(p));
                let first = boxes
                    .next()
                    .unwrap_or_else(|| Aabb::from_center_size(root.position, Vec3::ZERO));
                boxes.fold(first, |acc, b| acc.union(&b)).expanded(padding)
            }
        }
    }

    /// Bounds of the pose currently applied.
    #[must_use]
    pub fn world_bounds(&self) -> Aabb {
        self.bounds_of(&self.root, self.volumes.iter().map(|v| &v.pose))
    }

    /// Bounds of the live pose, even while rewound.
    #[must_use]
    pub fn live_bounds(&self) -> Aabb {
        if self.is_rewound() {
            self.bounds_of(&self.restore_root, self.restore_poses.iter())
        } else {
            self.world_bounds()
        }
    }

    /// Moves the root and re-attaches every hit volume at its local offset.
    ///
    /// # Errors
    ///
    /// [`RewindError::EntityRewound`] while a historical pose is applied.
    pub fn set_root_pose(&mut self, root: Transform) -> RewindResult<()> {
        if self.is_rewound() {
            return Err(RewindError::EntityRewound(self.id));
        }
        self.root = root;
        for volume in &mut self.volumes {
            volume.pose = root.compose(&volume.local);
        }
        Ok(())
    }

    /// Overrides one hit volume's world pose (animation).
    ///
    /// # Errors
    ///
    /// [`RewindError::EntityRewound`] while rewound and
    /// [`RewindError::VolumeIndexOutOfRange`] for a bad index.
    pub fn set_volume_pose(&mut self, index: usize, pose: Transform) -> RewindResult<()> {
        if self.is_rewound() {
            return Err(RewindError::EntityRewound(self.id));
        }
        let count = self.volumes.len();
        let volume = self.volumes.get_mut(index).ok_or(RewindError::VolumeIndexOutOfRange {
            entity: self.id,
            index,
            count,
        })?;
        volume.pose = pose;
        Ok(())
    }

    /// Records the live pose for `frame`.
    ///
    /// # Errors
    ///
    /// [`RewindError::EntityRewound`] while rewound, and
    /// [`RewindError::CaptureOrderViolation`] when `frame` is not newer than
    /// the last capture.
    pub fn capture(&mut self, frame: Frame) -> RewindResult<SampleKind> {
        if self.is_rewound() {
            return Err(RewindError::EntityRewound(self.id));
        }
        for (slot, volume) in self.scratch.iter_mut().zip(&self.volumes) {
            *slot = volume.pose;
        }
        let bounds = self.world_bounds();
        self.history
            .capture(frame, &self.root, &bounds, &self.scratch)
            .map_err(|e| e.for_entity(self.id))
    }

    /// Applies the historical pose for `target`.
    ///
    /// Returns false when already showing `target` or when history cannot
    /// serve it. The live pose is saved only on the first rewind of a cycle.
    pub fn rewind(&mut self, target: RewindTarget, now: Frame) -> bool {
        if self.state == (RewindState::Rewound { target }) {
            return false;
        }
        let Some(resolution) = self.history.resolve(target, now) else {
            warn!(entity = %self.id, %target, now, "no history for rewind target");
            return false;
        };

        if !self.is_rewound() {
            self.restore_root = self.root;
            for (slot, volume) in self.restore_poses.iter_mut().zip(&self.volumes) {
                *slot = volume.pose;
            }
        }

        self.root = self.history.root_at(resolution, &self.restore_root);
        for (index, (volume, live)) in self.volumes.iter_mut().zip(&self.restore_poses).enumerate() {
            volume.pose = self.history.pose_at(resolution, index, live);
        }
        self.state = RewindState::Rewound { target };
        debug!(entity = %self.id, %target, "rewound");
        true
    }

    /// Puts the live pose back exactly as saved.
    ///
    /// Returns false (and does nothing) when already live.
    pub fn restore(&mut self) -> bool {
        if !self.is_rewound() {
            return false;
        }
        self.root = self.restore_root;
        for (volume, live) in self.volumes.iter_mut().zip(&self.restore_poses) {
            volume.pose = *live;
        }
        self.state = RewindState::Live;
        true
    }

    /// Broad-phase: would the bounds at `target` overlap `query`?
    #[must_use]
    pub fn overlaps_at(&self, target: RewindTarget, now: Frame, query: &Aabb) -> bool {
        self.history.overlaps(target, now, query, &self.live_bounds())
    }

    /// Broad-phase: would the bounds at `target` be reached by `ray`?
    #[must_use]
    pub fn ray_reaches_at(
        &self,
        target: RewindTarget,
        now: Frame,
        ray: &Ray,
        max_distance: f32,
    ) -> bool {
        self.history.intersects_ray(target, now, ray, max_distance, &self.live_bounds())
    }

    /// Closest hit volume along `ray` at the current pose.
    #[must_use]
    pub fn raycast_volumes(&self, ray: &Ray, max_distance: f32) -> Option<(usize, f32)> {
        self.volumes
            .iter()
            .enumerate()
            .filter_map(|(i, v)| Some((i, v.shape.ray_distance(&v.pose, ray)?)))
            .filter(|&(_, distance)| distance <= max_distance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hitrewind_shared::Quaternion;

    fn config(depth: usize) -> RewindConfig {
        RewindConfig { history_depth: depth, ..RewindConfig::default() }
    }

    fn entity() -> TrackedEntity {
        TrackedEntityBuilder::new(EntityId::new(1))
            .volume(HitShape::Sphere { radius: 0.5 }, Transform::from_position(Vec3::Y))
            .volume(
                HitShape::Box { half_extents: Vec3::splat(0.25) },
                Transform::from_position(Vec3::ZERO),
            )
            .build(&config(60))
    }

    fn run(entity: &mut TrackedEntity, frames: std::ops::RangeInclusive<Frame>) {
        for frame in frames {
            entity
                .set_root_pose(Transform::from_position(Vec3::new(frame as f32, 0.0, 0.0)))
                .unwrap();
            entity.capture(frame).unwrap();
        }
    }

    #[test]
    fn test_nearest_divisor() {
        assert_eq!(nearest_divisor(60, 5), 5);
        assert_eq!(nearest_divisor(60, 7), 6);
        assert_eq!(nearest_divisor(60, 8), 6); // 6 and 10 tie
        assert_eq!(nearest_divisor(12, 5), 4); // 4 and 6 tie, smaller wins
        assert_eq!(nearest_divisor(60, 0), 1);
        assert_eq!(nearest_divisor(60, 500), 60);
    }

    #[test]
    fn test_builder_coerces_interval() {
        let e = TrackedEntityBuilder::new(EntityId::new(3)).sampling_interval(7).build(&config(60));
        assert_eq!(e.history().sampling_interval(), 6);
        assert_eq!(e.history().capacity(), 60);
    }

    #[test]
    fn test_builder_layer() {
        assert_eq!(entity().layer(), 0);
        let e = TrackedEntityBuilder::new(EntityId::new(3)).layer(9).build(&config(60));
        assert_eq!(e.layer(), 9);
        let e = TrackedEntityBuilder::new(EntityId::new(3)).layer(200).build(&config(60));
        assert_eq!(e.layer(), 31);
    }

    #[test]
    fn test_rewind_clamps_at_history_edge() {
        let mut e = TrackedEntityBuilder::new(EntityId::new(4))
            .volume(HitShape::Sphere { radius: 0.5 }, Transform::IDENTITY)
            .sampling_interval(5)
            .build(&config(60));
        run(&mut e, 1..=90);
        assert!(e.rewind(RewindTarget::Frame(32), 90));
        assert_eq!(e.root().position.x, 35.0);
        assert!(e.restore());
        assert_eq!(e.root().position.x, 90.0);
    }

    #[test]
    fn test_volumes_follow_root() {
        let mut e = entity();
        e.set_root_pose(Transform::from_position(Vec3::new(5.0, 0.0, 0.0))).unwrap();
        assert_eq!(e.volumes()[0].pose.position, Vec3::new(5.0, 1.0, 0.0));
    }

    #[test]
    fn test_rewind_and_restore_bit_exact() {
        let mut e = entity();
        run(&mut e, 1..=90);
        let animated = Transform::new(
            Vec3::new(90.1, 0.2, 0.3),
            Quaternion::from_axis_angle(Vec3::Z, 0.3),
            1.0,
        );
        e.set_volume_pose(1, animated).unwrap();
        let before_root = *e.root();
        let before: Vec<Transform> = e.volumes().iter().map(|v| v.pose).collect();

        assert!(e.rewind(RewindTarget::Frame(60), 90));
        assert_eq!(e.root().position.x, 60.0);
        assert_eq!(e.volumes()[0].pose.position, Vec3::new(60.0, 1.0, 0.0));

        assert!(e.restore());
        assert_eq!(bytemuck::bytes_of(e.root()), bytemuck::bytes_of(&before_root));
        let after: Vec<Transform> = e.volumes().iter().map(|v| v.pose).collect();
        assert_eq!(
            bytemuck::cast_slice::<Transform, u8>(&after),
            bytemuck::cast_slice::<Transform, u8>(&before)
        );
    }

    #[test]
    fn test_restore_when_live_is_noop() {
        let mut e = entity();
        run(&mut e, 1..=10);
        let before = *e.root();
        assert!(!e.restore());
        assert_eq!(*e.root(), before);
    }

    #[test]
    fn test_rewind_same_target_refused() {
        let mut e = entity();
        run(&mut e, 1..=10);
        assert!(e.rewind(RewindTarget::Frame(5), 10));
        assert!(!e.rewind(RewindTarget::Frame(5), 10));
        assert!(e.is_rewound());
    }

    #[test]
    fn test_retarget_keeps_live_restore_slot() {
        let mut e = entity();
        run(&mut e, 1..=10);
        assert!(e.rewind(RewindTarget::Frame(5), 10));
        assert!(e.rewind(RewindTarget::Frame(3), 10));
        assert_eq!(e.root().position.x, 3.0);
        assert!(e.restore());
        assert_eq!(e.root().position.x, 10.0);
    }

    #[test]
    fn test_writes_refused_while_rewound() {
        let mut e = entity();
        run(&mut e, 1..=10);
        assert!(e.rewind(RewindTarget::Frame(5), 10));
        assert_eq!(
            e.set_root_pose(Transform::IDENTITY),
            Err(RewindError::EntityRewound(EntityId::new(1)))
        );
        assert_eq!(e.capture(11), Err(RewindError::EntityRewound(EntityId::new(1))));
        assert!(matches!(
            e.set_volume_pose(0, Transform::IDENTITY),
            Err(RewindError::EntityRewound(_))
        ));
    }

    #[test]
    fn test_capture_order_attributed() {
        let mut e = entity();
        run(&mut e, 1..=10);
        assert_eq!(
            e.capture(10),
            Err(RewindError::CaptureOrderViolation { entity: EntityId::new(1), frame: 10, last: 10 })
        );
    }

    #[test]
    fn test_volume_index_out_of_range() {
        let mut e = entity();
        assert_eq!(
            e.set_volume_pose(2, Transform::IDENTITY),
            Err(RewindError::VolumeIndexOutOfRange { entity: EntityId::new(1), index: 2, count: 2 })
        );
    }

    #[test]
    fn test_rewind_without_history() {
        let mut e = entity();
        run(&mut e, 1..=10);
        assert!(!e.rewind(RewindTarget::Frame(0), 10));
        assert!(!e.is_rewound());
    }

    #[test]
    fn test_live_bounds_while_rewound() {
        let mut e = entity();
        run(&mut e, 1..=10);
        let live = e.world_bounds();
        assert!(e.rewind(RewindTarget::Frame(2), 10));
        assert_eq!(e.live_bounds(), live);
        assert!(e.world_bounds().center().x < 3.0);
    }

    #[test]
    fn test_local_bounds_source() {
        let e = TrackedEntityBuilder::new(EntityId::new(9))
            .root(Transform::from_position(Vec3::new(0.0, 0.0, 4.0)))
            .bounds(BoundsSource::Local(Aabb::from_center_size(Vec3::ZERO, Vec3::splat(2.0))))
            .build(&config(60));
        assert_eq!(e.world_bounds().center(), Vec3::new(0.0, 0.0, 4.0));
    }

    #[test]
    fn test_raycast_volumes_picks_closest() {
        let mut e = entity();
        run(&mut e, 1..=1);
        // Root at x = 1: sphere at (1, 1, 0), box at (1, 0, 0)
        let ray = Ray::new(Vec3::new(1.0, 10.0, 0.0), -Vec3::Y);
        let (index, distance) = e.raycast_volumes(&ray, 100.0).unwrap();
        assert_eq!(index, 0);
        assert!((distance - 8.5).abs() < 1e-4);
        assert!(e.raycast_volumes(&ray, 5.0).is_none());
    }
}
