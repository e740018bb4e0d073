//! # Snapshot History
//!
//! Fixed-capacity ring of historical poses for one entity.
//!
//! ## Layout
//!
//! ```text
//!   slot = frame % capacity
//!
//!   capacity 6, interval 2, last capture 9:
//!
//!   slot:    0     1     2     3     4     5
//!   frame:   6     7     8     9     4     5
//!   real:    yes   no    yes   no    yes   no
//! ```
//!
//! Every slot remembers the frame that last wrote it, so a lookup for a frame
//! that has since been overwritten fails instead of returning a newer pose.
//! Slots are allocated once; capture only copies into them.

use std::fmt;

use hitrewind_shared::{Aabb, Ray, Transform};
use serde::{Deserialize, Serialize};

use crate::clock::Frame;
use crate::entity::EntityId;
use crate::error::{RewindError, RewindResult};

/// Point in the past to rewind to.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum RewindTarget {
    /// A whole frame.
    Frame(Frame),
    /// Part-way between `from` and `to = from + 1`.
    Between {
        /// Earlier frame.
        from: Frame,
        /// Later frame, `from + 1` (saturating).
        to: Frame,
        /// Progress from `from` towards `to`, in (0, 1).
        fraction: f32,
    },
}

impl RewindTarget {
    /// Target between `from` and the next frame.
    #[must_use]
    pub const fn between(from: Frame, fraction: f32) -> Self {
        Self::Between { from, to: from.saturating_add(1), fraction }
    }

    /// Builds a target from a fractional frame position.
    ///
    /// A remainder within `margin` of a whole frame snaps to that frame.
    /// Negative positions and NaN clamp to frame 0; positions past the frame
    /// range map to [`Frame::MAX`], which no history can serve.
    #[must_use]
    pub fn from_position(position: f64, margin: f64) -> Self {
        let position = position.max(0.0);
        if !position.is_finite() || position >= Frame::MAX as f64 {
            return Self::Frame(Frame::MAX);
        }
        let floor = position.floor();
        let remainder = position - floor;
        let from = floor as Frame;

        if remainder <= margin {
            Self::Frame(from)
        } else if remainder >= 1.0 - margin {
            Self::Frame(from + 1)
        } else {
            Self::between(from, remainder as f32)
        }
    }

    /// Whole frame at or below the target.
    #[must_use]
    pub const fn base_frame(&self) -> Frame {
        match *self {
            Self::Frame(frame) => frame,
            Self::Between { from, .. } => from,
        }
    }

    /// Target as a fractional frame number.
    #[must_use]
    pub fn position(&self) -> f64 {
        match *self {
            Self::Frame(frame) => frame as f64,
            Self::Between { from, fraction, .. } => from as f64 + f64::from(fraction),
        }
    }
}

impl fmt::Display for RewindTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Frame(frame) => write!(f, "frame {frame}"),
            Self::Between { from, to, fraction } => {
                write!(f, "frames {from}..{to} at {fraction:.3}")
            }
        }
    }
}

/// Whether a capture stored a readable sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleKind {
    /// Full pose stored.
    Real,
    /// Frame recorded, pose skipped by the sampling interval.
    Skipped,
}

/// Upper end of a blended read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendEnd {
    /// A stored sample.
    Slot(usize),
    /// The entity's live pose; the newer sample has not been captured yet.
    Live,
}

/// How a target maps onto stored samples.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Resolution {
    /// Read one stored sample as-is.
    Exact {
        /// Slot holding the sample.
        slot: usize,
    },
    /// Interpolate between a stored sample and a newer pose.
    Blend {
        /// Slot of the older sample.
        from: usize,
        /// Newer end.
        to: BlendEnd,
        /// Progress from `from` to `to`.
        fraction: f32,
    },
}

/// Read-only view of one stored sample.
#[derive(Clone, Copy, Debug)]
pub struct SampleView<'a> {
    /// Frame of the sample.
    pub frame: Frame,
    /// Root pose.
    pub root: &'a Transform,
    /// World bounds.
    pub bounds: &'a Aabb,
    /// Hit-volume poses, in volume order.
    pub poses: &'a [Transform],
}

#[derive(Clone, Debug)]
struct PoseSnapshot {
    frame: Option<Frame>,
    real: bool,
    root: Transform,
    bounds: Aabb,
    poses: Vec<Transform>,
}

impl PoseSnapshot {
    fn empty(volume_count: usize) -> Self {
        Self {
            frame: None,
            real: false,
            root: Transform::IDENTITY,
            bounds: Aabb::default(),
            poses: vec![Transform::IDENTITY; volume_count],
        }
    }
}

/// Ring buffer of pose snapshots.
#[derive(Clone, Debug)]
pub struct SnapshotRing {
    slots: Vec<PoseSnapshot>,
    volume_count: usize,
    sampling_interval: usize,
    last_frame: Option<Frame>,
}

impl SnapshotRing {
    /// Creates an empty ring.
    ///
    /// `sampling_interval` must divide `capacity`; the entity builder
    /// coerces it before getting here.
    #[must_use]
    pub fn new(capacity: usize, volume_count: usize, sampling_interval: usize) -> Self {
        let capacity = capacity.max(1);
        debug_assert!(sampling_interval > 0 && capacity % sampling_interval == 0);
        Self {
            slots: (0..capacity).map(|_| PoseSnapshot::empty(volume_count)).collect(),
            volume_count,
            sampling_interval: sampling_interval.max(1),
            last_frame: None,
        }
    }

    /// Ring capacity in frames.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Frames between real samples.
    #[inline]
    #[must_use]
    pub const fn sampling_interval(&self) -> usize {
        self.sampling_interval
    }

    /// Hit volumes per sample.
    #[inline]
    #[must_use]
    pub const fn volume_count(&self) -> usize {
        self.volume_count
    }

    /// Last frame offered to [`SnapshotRing::capture`].
    #[inline]
    #[must_use]
    pub const fn last_frame(&self) -> Option<Frame> {
        self.last_frame
    }

    #[inline]
    fn slot_of(&self, frame: Frame) -> usize {
        (frame % self.slots.len() as u64) as usize
    }

    /// Slot of a readable sample for `frame`, if one survives.
    #[must_use]
    pub fn real_slot(&self, frame: Frame) -> Option<usize> {
        let slot = self.slot_of(frame);
        let snapshot = &self.slots[slot];
        (snapshot.frame == Some(frame) && snapshot.real).then_some(slot)
    }

    /// Records `frame`.
    ///
    /// The pose is stored only on frames that are a multiple of the sampling
    /// interval; other frames just claim their slot.
    ///
    /// # Errors
    ///
    /// [`RewindError::CaptureOrderViolation`] when `frame` is not after the
    /// last captured frame, and [`RewindError::VolumeIndexOutOfRange`] when
    /// `poses` does not match the volume count. The entity field is
    /// [`EntityId::NULL`]; callers attribute it with
    /// [`RewindError::for_entity`].
    pub fn capture(
        &mut self,
        frame: Frame,
        root: &Transform,
        bounds: &Aabb,
        poses: &[Transform],
    ) -> RewindResult<SampleKind> {
        if let Some(last) = self.last_frame {
            if frame <= last {
                return Err(RewindError::CaptureOrderViolation {
                    entity: EntityId::NULL,
                    frame,
                    last,
                });
            }
        }
        if poses.len() != self.volume_count {
            return Err(RewindError::VolumeIndexOutOfRange {
                entity: EntityId::NULL,
                index: poses.len(),
                count: self.volume_count,
            });
        }

        let real = frame % self.sampling_interval as u64 == 0;
        let slot = self.slot_of(frame);
        let snapshot = &mut self.slots[slot];
        snapshot.frame = Some(frame);
        snapshot.real = real;
        if real {
            snapshot.root = *root;
            snapshot.bounds = *bounds;
            snapshot.poses.copy_from_slice(poses);
        }
        self.last_frame = Some(frame);

        Ok(if real { SampleKind::Real } else { SampleKind::Skipped })
    }

    /// Maps `target` onto stored samples.
    ///
    /// The lower sample is the nearest real frame at or below the target.
    /// When the next real frame has not been captured yet the read blends
    /// towards the live pose over the remaining distance to `now`.
    ///
    /// If the lower sample was overwritten but the target itself is still
    /// inside the ring, the oldest surviving real sample is read exactly.
    /// Returns `None` when no sample at or after the lower frame can serve.
    #[must_use]
    pub fn resolve(&self, target: RewindTarget, now: Frame) -> Option<Resolution> {
        let interval = self.sampling_interval as u64;
        let (base, sub_frame) = match target {
            RewindTarget::Frame(frame) => (frame, 0.0),
            RewindTarget::Between { from, fraction, .. } => (from, f64::from(fraction)),
        };
        let lower = base - base % interval;
        let Some(from) = self.real_slot(lower) else {
            return self.oldest_in_window(base, lower);
        };

        if matches!(target, RewindTarget::Frame(_)) && base == lower {
            return Some(Resolution::Exact { slot: from });
        }

        let offset = (base - lower) as f64 + sub_frame;
        let upper = lower + interval;
        if let Some(to) = self.real_slot(upper) {
            return Some(Resolution::Blend {
                from,
                to: BlendEnd::Slot(to),
                fraction: (offset / interval as f64) as f32,
            });
        }

        let upper_pending = self.last_frame.map_or(true, |last| upper > last);
        if upper_pending && now > lower {
            let span = (now - lower) as f64;
            return Some(Resolution::Blend {
                from,
                to: BlendEnd::Live,
                fraction: (offset / span).clamp(0.0, 1.0) as f32,
            });
        }
        None
    }

    /// Exact read of the next real sample when `lower` has fallen off the
    /// back of the ring but `base` has not.
    fn oldest_in_window(&self, base: Frame, lower: Frame) -> Option<Resolution> {
        let capacity = self.slots.len() as u64;
        let last = self.last_frame?;
        let overwritten = last >= lower.saturating_add(capacity);
        let in_window = base.saturating_add(capacity) > last;
        if !(overwritten && in_window) {
            return None;
        }
        let upper = lower.checked_add(self.sampling_interval as u64)?;
        self.real_slot(upper).map(|slot| Resolution::Exact { slot })
    }

    fn read<T: Copy>(
        &self,
        resolution: Resolution,
        live: T,
        field: impl Fn(&PoseSnapshot) -> T,
        blend: impl Fn(&T, &T, f32) -> T,
    ) -> T {
        match resolution {
            Resolution::Exact { slot } => field(&self.slots[slot]),
            Resolution::Blend { from, to, fraction } => {
                let upper = match to {
                    BlendEnd::Slot(slot) => field(&self.slots[slot]),
                    BlendEnd::Live => live,
                };
                blend(&field(&self.slots[from]), &upper, fraction)
            }
        }
    }

    /// Interpolated root pose.
    #[must_use]
    pub fn root_at(&self, resolution: Resolution, live: &Transform) -> Transform {
        self.read(resolution, *live, |s| s.root, Transform::interpolate)
    }

    /// Interpolated world bounds.
    #[must_use]
    pub fn bounds_at(&self, resolution: Resolution, live: &Aabb) -> Aabb {
        self.read(resolution, *live, |s| s.bounds, Aabb::lerp)
    }

    /// Interpolated pose of hit volume `index`.
    ///
    /// `index` must be below [`SnapshotRing::volume_count`].
    #[must_use]
    pub fn pose_at(&self, resolution: Resolution, index: usize, live: &Transform) -> Transform {
        self.read(resolution, *live, |s| s.poses[index], Transform::interpolate)
    }

    /// Broad-phase: would the bounds at `target` overlap `query`?
    ///
    /// Approximate, since interpolated bounds are not a swept hull.
    #[must_use]
    pub fn overlaps(&self, target: RewindTarget, now: Frame, query: &Aabb, live: &Aabb) -> bool {
        self.resolve(target, now)
            .is_some_and(|resolution| self.bounds_at(resolution, live).intersects(query))
    }

    /// Broad-phase: would `ray` reach the bounds at `target` within `max_distance`?
    #[must_use]
    pub fn intersects_ray(
        &self,
        target: RewindTarget,
        now: Frame,
        ray: &Ray,
        max_distance: f32,
        live: &Aabb,
    ) -> bool {
        self.resolve(target, now).is_some_and(|resolution| {
            self.bounds_at(resolution, live)
                .ray_distance(ray)
                .is_some_and(|distance| distance <= max_distance)
        })
    }

    /// Readable samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = SampleView<'_>> + '_ {
        let last = self.last_frame.unwrap_or(0);
        let first = last.saturating_sub(self.slots.len() as u64 - 1).max(1);
        let frames = if self.last_frame.is_some() { first..=last } else { 1..=0 };

        frames.filter_map(move |frame| {
            let snapshot = &self.slots[self.real_slot(frame)?];
            Some(SampleView {
                frame,
                root: &snapshot.root,
                bounds: &snapshot.bounds,
                poses: &snapshot.poses,
            })
        })
    }

    /// Forgets every sample.
    pub fn clear(&mut self) {
        for snapshot in &mut self.slots {
            snapshot.frame = None;
            snapshot.real = false;
        }
        self.last_frame = None;
    }
}
