//! # Rewind Coordinator
//!
//! Owns the clock and the registry, captures every entity once per step and
//! manages rewind windows.
//!
//! ## Windows
//!
//! ```text
//!   rewind(t1) ──► window 1 ──query──► gate rewinds A, B to t1
//!                     │
//!                     └─ scope.rewind(t2) ──► window 2 ──query──► B re-posed to t2
//!                                               │                 C rewound to t2
//!                                               close ──► C restored, B back to t1
//!                     close ──► A, B restored
//! ```
//!
//! Windows form a stack. Only the top window gates queries, and closing a
//! window undoes exactly what it disturbed. Nesting only happens through an
//! open [`RewindScope`], which holds the coordinator's unique borrow, so two
//! independent windows can never overlap.

use hitrewind_shared::Ray;
use tracing::{debug, error, warn};

use crate::clock::{Frame, SimulationClock};
use crate::config::RewindConfig;
use crate::entity::{EntityId, RewindState, TrackedEntity};
use crate::error::{RewindError, RewindResult, TargetRejection};
use crate::query::{BroadPhase, Query, QueryFilter};
use crate::registry::EntityRegistry;
use crate::scope::RewindScope;
use crate::snapshot::RewindTarget;

/// How far back a rewind should go.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RewindRequest {
    /// Absolute frame.
    AtFrame(Frame),
    /// Frames before the current one.
    FramesAgo(u64),
    /// Seconds before the current frame, converted with the fixed step.
    SecondsAgo(f64),
}

/// Identifier of an open rewind window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WindowId(u64);

#[derive(Debug)]
struct OpenWindow {
    id: WindowId,
    target: RewindTarget,
    /// Entities this window moved, with the target they showed before.
    disturbed: Vec<(EntityId, Option<RewindTarget>)>,
}

/// Coordinator counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// Frames advanced.
    pub frames: u64,
    /// Windows opened.
    pub windows_opened: u64,
    /// Rewind requests refused.
    pub windows_rejected: u64,
    /// Broad-phase tests run.
    pub broad_phase_tests: u64,
    /// Entity rewinds applied by the gate.
    pub entities_rewound: u64,
    /// Entities restored on window close.
    pub entities_restored: u64,
    /// Entities found still rewound at the next capture.
    pub forward_recoveries: u64,
    /// Captures that failed.
    pub capture_errors: u64,
}

/// Drives capture and rewinds for a set of entities.
#[derive(Debug)]
pub struct RewindCoordinator {
    config: RewindConfig,
    clock: SimulationClock,
    registry: EntityRegistry,
    windows: Vec<OpenWindow>,
    next_window: u64,
    stats: CoordinatorStats,
}

impl RewindCoordinator {
    /// Creates a coordinator at frame 0.
    ///
    /// # Errors
    ///
    /// [`RewindError::InvalidConfig`] when `config` fails validation.
    pub fn new(config: RewindConfig) -> RewindResult<Self> {
        config.validate()?;
        Ok(Self {
            clock: SimulationClock::with_tick_rate(config.tick_rate),
            config,
            registry: EntityRegistry::new(),
            windows: Vec::new(),
            next_window: 0,
            stats: CoordinatorStats::default(),
        })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &RewindConfig {
        &self.config
    }

    /// Simulation clock.
    #[must_use]
    pub const fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    /// Current frame.
    #[inline]
    #[must_use]
    pub const fn frame(&self) -> Frame {
        self.clock.frame()
    }

    /// Registered entities.
    #[must_use]
    pub const fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Mutable access for moving entities between steps.
    #[must_use]
    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut TrackedEntity> {
        self.registry.get_mut(id)
    }

    /// Counters.
    #[must_use]
    pub const fn stats(&self) -> &CoordinatorStats {
        &self.stats
    }

    /// Adds an entity. Returns false if its id is already registered.
    ///
    /// # Errors
    ///
    /// [`RewindError::HistoryDepthMismatch`] when the entity's history was
    /// built for another depth.
    pub fn register(&mut self, entity: TrackedEntity) -> RewindResult<bool> {
        let actual = entity.history().capacity();
        if actual != self.config.history_depth {
            return Err(RewindError::HistoryDepthMismatch {
                entity: entity.id(),
                expected: self.config.history_depth,
                actual,
            });
        }
        Ok(self.registry.insert(entity))
    }

    /// Removes an entity, restoring it first if rewound.
    pub fn unregister(&mut self, id: EntityId) -> Option<TrackedEntity> {
        self.registry.remove(id)
    }

    /// Steps the clock and captures every entity.
    ///
    /// Entities still rewound at this point are restored first with a
    /// warning, so a leaked window never lands in history.
    pub fn advance(&mut self) -> Frame {
        if !self.windows.is_empty() {
            warn!(open = self.windows.len(), "rewind windows still open at advance; dropping");
            self.windows.clear();
        }

        let frame = self.clock.tick();
        self.stats.frames += 1;

        for entity in self.registry.iter_mut() {
            if entity.restore() {
                self.stats.forward_recoveries += 1;
                warn!(entity = %entity.id(), frame, "entity still rewound at capture; restored");
            }
            let result = entity.capture(frame);
            if let Err(err) = &result {
                self.stats.capture_errors += 1;
                error!(entity = %entity.id(), frame, %err, "capture failed");
            }
            debug_assert!(result.is_ok(), "capture failed: {result:?}");
        }
        frame
    }

    /// Turns a request into a validated target for the current frame.
    ///
    /// Valid targets lie strictly inside `(now - history_depth, now)`.
    ///
    /// # Errors
    ///
    /// [`RewindError::InvalidRewindTarget`] describing the rejection.
    pub fn resolve_request(&self, request: RewindRequest) -> RewindResult<RewindTarget> {
        let now = self.frame();
        let target = match request {
            RewindRequest::AtFrame(frame) => RewindTarget::Frame(frame),
            RewindRequest::FramesAgo(frames) => RewindTarget::Frame(now.saturating_sub(frames)),
            RewindRequest::SecondsAgo(seconds) => RewindTarget::from_position(
                now as f64 - self.clock.seconds_to_frames(seconds),
                self.config.time_error_margin,
            ),
        };
        self.check_target(target).map(|()| target)
    }

    fn check_target(&self, target: RewindTarget) -> RewindResult<()> {
        let now = self.frame();
        let depth = self.config.history_depth as u64;
        let base = target.base_frame();

        let reason = if base >= now {
            TargetRejection::InFuture
        } else if base + depth <= now {
            TargetRejection::TooOld { oldest: now + 1 - depth }
        } else if base == 0 {
            TargetRejection::NoHistory
        } else {
            return Ok(());
        };
        Err(RewindError::InvalidRewindTarget { target, current: now, reason })
    }

    /// Opens a rewind window.
    ///
    /// An invalid request yields an inert scope: queries run unrewound and
    /// [`RewindScope::error`] reports why.
    pub fn rewind(&mut self, request: RewindRequest) -> RewindScope<'_> {
        let window = self.open_window(request);
        RewindScope::new(self, window)
    }

    /// Opens a window at an absolute frame.
    pub fn rewind_to_frame(&mut self, frame: Frame) -> RewindScope<'_> {
        self.rewind(RewindRequest::AtFrame(frame))
    }

    /// Opens a window `frames` before now.
    pub fn rewind_frames(&mut self, frames: u64) -> RewindScope<'_> {
        self.rewind(RewindRequest::FramesAgo(frames))
    }

    /// Opens a window `seconds` before now.
    pub fn rewind_seconds(&mut self, seconds: f64) -> RewindScope<'_> {
        self.rewind(RewindRequest::SecondsAgo(seconds))
    }

    pub(crate) fn open_window(
        &mut self,
        request: RewindRequest,
    ) -> RewindResult<(WindowId, RewindTarget)> {
        let target = match self.resolve_request(request) {
            Ok(target) => target,
            Err(err) => {
                self.stats.windows_rejected += 1;
                warn!(?request, %err, "rewind rejected");
                return Err(err);
            }
        };

        let id = WindowId(self.next_window);
        self.next_window += 1;
        self.windows.push(OpenWindow { id, target, disturbed: Vec::new() });
        self.stats.windows_opened += 1;
        debug!(window = id.0, %target, depth = self.windows.len(), "rewind window opened");
        Ok((id, target))
    }

    /// Target of the innermost open window.
    #[must_use]
    pub fn current_target(&self) -> Option<RewindTarget> {
        self.windows.last().map(|w| w.target)
    }

    /// Number of open windows.
    #[must_use]
    pub fn open_windows(&self) -> usize {
        self.windows.len()
    }

    /// Rewinds every entity that `filter` accepts and that passes
    /// `broad_phase` at the innermost window's target.
    ///
    /// Entities an outer window left at another target are always re-posed,
    /// so the query never sees a pose from the wrong time. If one has no
    /// history for the inner target it is shown live until the inner window
    /// closes. Returns how many entities were moved; 0 when no window is open.
    pub fn prepare_query(&mut self, broad_phase: &BroadPhase, filter: QueryFilter) -> usize {
        let Some(window) = self.windows.last_mut() else {
            return 0;
        };
        let target = window.target;
        let now = self.clock.frame();
        let mut moved = 0;

        for entity in self.registry.iter_mut() {
            if !filter.accepts(entity) {
                continue;
            }
            let id = entity.id();
            let previous = match entity.state() {
                RewindState::Rewound { target: current } if current == target => continue,
                RewindState::Rewound { target: current } => Some(current),
                RewindState::Live => {
                    self.stats.broad_phase_tests += 1;
                    if !broad_phase.test(entity, target, now) {
                        continue;
                    }
                    None
                }
            };
            if entity.rewind(target, now) {
                window.disturbed.push((id, previous));
                self.stats.entities_rewound += 1;
                moved += 1;
            } else if let Some(outer) = previous {
                entity.restore();
                warn!(entity = %id, %target, %outer, "cannot re-target, showing live pose");
                window.disturbed.push((id, previous));
                moved += 1;
            }
        }
        moved
    }

    /// Gate for `query`; see [`RewindCoordinator::prepare_query`].
    pub fn prepare(&mut self, query: &Query, filter: QueryFilter) -> usize {
        self.prepare_query(&query.broad_phase(), filter)
    }

    /// Gate for a bare ray.
    pub fn prepare_ray(&mut self, ray: &Ray, max_distance: f32, filter: QueryFilter) -> usize {
        self.prepare_query(&BroadPhase::Ray { ray: *ray, max_distance }, filter)
    }

    /// Closes `window` and every window opened after it.
    ///
    /// Entities first rewound under a closed window are restored; entities
    /// it re-targeted go back to the target they showed before. Returns false
    /// if the window is not open (already closed).
    pub fn end_rewind(&mut self, window: WindowId) -> bool {
        let Some(position) = self.windows.iter().rposition(|w| w.id == window) else {
            return false;
        };
        if position + 1 != self.windows.len() {
            warn!(
                window = window.0,
                inner = self.windows.len() - position - 1,
                "closing window with inner windows open"
            );
        }

        let now = self.clock.frame();
        while self.windows.len() > position {
            let Some(closing) = self.windows.pop() else { break };
            for &(id, previous) in closing.disturbed.iter().rev() {
                let Some(entity) = self.registry.get_mut(id) else {
                    continue;
                };
                let restored = match previous {
                    Some(outer) => entity.rewind(outer, now) || entity.restore(),
                    None => entity.restore(),
                };
                if restored {
                    self.stats.entities_restored += 1;
                }
            }
            debug!(window = closing.id.0, restored = closing.disturbed.len(), "rewind window closed");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{HitShape, TrackedEntityBuilder};
    use crate::query::LayerMask;
    use hitrewind_shared::{Transform, Vec3};

    fn coordinator(depth: usize) -> RewindCoordinator {
        RewindCoordinator::new(RewindConfig { history_depth: depth, ..RewindConfig::default() })
            .unwrap()
    }

    fn add(c: &mut RewindCoordinator, id: u64) {
        let entity = TrackedEntityBuilder::new(EntityId::new(id))
            .volume(HitShape::Sphere { radius: 0.5 }, Transform::IDENTITY)
            .build(c.config());
        assert!(c.register(entity).unwrap());
    }

    #[test]
    fn test_first_advance_is_frame_one() {
        let mut c = coordinator(60);
        assert_eq!(c.frame(), 0);
        assert_eq!(c.advance(), 1);
        assert_eq!(c.stats().frames, 1);
    }

    #[test]
    fn test_target_validation() {
        let mut c = coordinator(60);
        for _ in 0..90 {
            c.advance();
        }
        let reason = |r: RewindRequest| match c.resolve_request(r) {
            Err(RewindError::InvalidRewindTarget { reason, .. }) => Some(reason),
            _ => None,
        };
        assert_eq!(reason(RewindRequest::AtFrame(90)), Some(TargetRejection::InFuture));
        assert_eq!(reason(RewindRequest::AtFrame(95)), Some(TargetRejection::InFuture));
        let too_old = Some(TargetRejection::TooOld { oldest: 31 });
        assert_eq!(reason(RewindRequest::AtFrame(30)), too_old);
        assert_eq!(reason(RewindRequest::FramesAgo(200)), too_old);
        assert_eq!(reason(RewindRequest::AtFrame(31)), QueryFilter::ANY);
        assert_eq!(reason(RewindRequest::FramesAgo(1)), QueryFilter::ANY);
    }

    #[test]
    fn test_frame_zero_has_no_history() {
        let mut c = coordinator(60);
        for _ in 0..10 {
            c.advance();
        }
        assert!(matches!(
            c.resolve_request(RewindRequest::AtFrame(0)),
            Err(RewindError::InvalidRewindTarget { reason: TargetRejection::NoHistory, .. })
        ));
        assert!(matches!(
            coordinator(60).resolve_request(RewindRequest::AtFrame(0)),
            Err(RewindError::InvalidRewindTarget { reason: TargetRejection::InFuture, .. })
        ));
    }

    #[test]
    fn test_seconds_snap_to_frame() {
        let mut c = coordinator(60);
        for _ in 0..90 {
            c.advance();
        }
        // 0.5 s at 60 Hz is exactly 30 frames
        assert_eq!(c.resolve_request(RewindRequest::SecondsAgo(0.5)), Ok(RewindTarget::Frame(60)));
        let half_frame = 0.5 / 60.0;
        assert_eq!(
            c.resolve_request(RewindRequest::SecondsAgo(0.5 + half_frame)),
            Ok(RewindTarget::between(59, 0.5))
        );
        assert!(c.resolve_request(RewindRequest::SecondsAgo(-1.0)).is_err());
    }

    #[test]
    fn test_non_finite_seconds_rejected() {
        let mut c = coordinator(60);
        for _ in 0..90 {
            c.advance();
        }
        let reason = |seconds: f64| match c.resolve_request(RewindRequest::SecondsAgo(seconds)) {
            Err(RewindError::InvalidRewindTarget { reason, .. }) => Some(reason),
            _ => None,
        };
        assert_eq!(reason(f64::NEG_INFINITY), Some(TargetRejection::InFuture));
        assert_eq!(reason(-1.0e300), Some(TargetRejection::InFuture));
        assert_eq!(reason(f64::INFINITY), Some(TargetRejection::TooOld { oldest: 31 }));
        assert_eq!(reason(f64::NAN), Some(TargetRejection::TooOld { oldest: 31 }));

        let scope = c.rewind_seconds(f64::NEG_INFINITY);
        assert!(!scope.is_valid());
        drop(scope);
        assert_eq!(c.open_windows(), 0);
    }

    #[test]
    fn test_register_rejects_depth_mismatch() {
        let mut c = coordinator(60);
        let wrong = TrackedEntityBuilder::new(EntityId::new(1))
            .build(&RewindConfig { history_depth: 30, ..RewindConfig::default() });
        assert_eq!(
            c.register(wrong),
            Err(RewindError::HistoryDepthMismatch {
                entity: EntityId::new(1),
                expected: 60,
                actual: 30
            })
        );
    }

    #[test]
    fn test_gate_rewinds_only_broad_phase_hits() {
        let mut c = coordinator(60);
        add(&mut c, 1);
        add(&mut c, 2);
        for frame in 1..=20u64 {
            let x = frame as f32;
            for (id, y) in [(1, 0.0), (2, 50.0)] {
                c.entity_mut(EntityId::new(id))
                    .unwrap()
                    .set_root_pose(Transform::from_position(Vec3::new(x, y, 0.0)))
                    .unwrap();
            }
            c.advance();
        }

        let (window, _) = c.open_window(RewindRequest::AtFrame(10)).unwrap();
        let query = Query::overlap_sphere(Vec3::new(10.0, 0.0, 0.0), 1.0);
        assert_eq!(c.prepare(&query, QueryFilter::ANY), 1);
        assert!(c.registry().get(EntityId::new(1)).unwrap().is_rewound());
        assert!(!c.registry().get(EntityId::new(2)).unwrap().is_rewound());

        // Already at the target: nothing more to do
        assert_eq!(c.prepare(&query, QueryFilter::ANY), 0);

        assert!(c.end_rewind(window));
        assert!(!c.end_rewind(window));
        assert!(!c.registry().get(EntityId::new(1)).unwrap().is_rewound());
        assert_eq!(c.stats().entities_restored, 1);
    }

    #[test]
    fn test_gate_skips_ignored_entity() {
        let mut c = coordinator(60);
        add(&mut c, 1);
        for _ in 0..5 {
            c.advance();
        }
        let (window, _) = c.open_window(RewindRequest::FramesAgo(2)).unwrap();
        let query = Query::overlap_sphere(Vec3::ZERO, 10.0);
        assert_eq!(c.prepare(&query, QueryFilter::ignoring(EntityId::new(1))), 0);
        assert_eq!(c.prepare(&query, QueryFilter::ANY), 1);
        c.end_rewind(window);
    }

    #[test]
    fn test_advance_recovers_leaked_rewind() {
        let mut c = coordinator(60);
        add(&mut c, 1);
        for _ in 0..5 {
            c.advance();
        }
        c.open_window(RewindRequest::FramesAgo(2)).unwrap();
        c.prepare(&Query::overlap_sphere(Vec3::ZERO, 10.0), QueryFilter::ANY);

        c.advance();
        assert_eq!(c.open_windows(), 0);
        assert_eq!(c.stats().forward_recoveries, 1);
        assert!(!c.registry().get(EntityId::new(1)).unwrap().is_rewound());
        assert_eq!(c.stats().capture_errors, 0);
    }

    #[test]
    fn test_gate_respects_layers() {
        let mut c = coordinator(60);
        add(&mut c, 1);
        let wall = TrackedEntityBuilder::new(EntityId::new(2))
            .volume(HitShape::Sphere { radius: 0.5 }, Transform::IDENTITY)
            .layer(3)
            .build(c.config());
        c.register(wall).unwrap();
        for _ in 0..5 {
            c.advance();
        }
        let (window, _) = c.open_window(RewindRequest::FramesAgo(2)).unwrap();
        let query = Query::overlap_sphere(Vec3::ZERO, 10.0);
        let walls_only = QueryFilter::ANY.with_layers(LayerMask::layer(3));
        assert_eq!(c.prepare(&query, walls_only), 1);
        assert!(!c.registry().get(EntityId::new(1)).unwrap().is_rewound());
        assert!(c.registry().get(EntityId::new(2)).unwrap().is_rewound());
        c.end_rewind(window);
    }

    #[test]
    fn test_nested_retarget_without_history_shows_live() {
        let mut c = coordinator(60);
        add(&mut c, 1);
        let late = EntityId::new(2);
        let place = |c: &mut RewindCoordinator, id: u64, x: f32| {
            c.entity_mut(EntityId::new(id))
                .unwrap()
                .set_root_pose(Transform::from_position(Vec3::new(x, 0.0, 0.0)))
                .unwrap();
        };
        for frame in 1..=90u64 {
            if frame == 50 {
                add(&mut c, 2);
            }
            place(&mut c, 1, frame as f32);
            if frame >= 50 {
                place(&mut c, 2, frame as f32 + 0.25);
            }
            c.advance();
        }
        let everything = Query::overlap_sphere(Vec3::ZERO, 1000.0);

        let (outer, _) = c.open_window(RewindRequest::AtFrame(70)).unwrap();
        assert_eq!(c.prepare(&everything, QueryFilter::ANY), 2);
        assert_eq!(c.registry().get(late).unwrap().root().position.x, 70.25);

        // Entity 2 has no history at frame 40: it must not keep its frame-70 pose
        let (inner, _) = c.open_window(RewindRequest::AtFrame(40)).unwrap();
        assert_eq!(c.prepare(&everything, QueryFilter::ANY), 2);
        assert_eq!(c.registry().get(late).unwrap().state(), RewindState::Live);
        assert_eq!(c.registry().get(late).unwrap().root().position.x, 90.25);
        assert_eq!(c.registry().get(EntityId::new(1)).unwrap().root().position.x, 40.0);
        // Still no history on a repeat query
        assert_eq!(c.prepare(&everything, QueryFilter::ANY), 0);

        assert!(c.end_rewind(inner));
        assert_eq!(
            c.registry().get(late).unwrap().state(),
            RewindState::Rewound { target: RewindTarget::Frame(70) }
        );
        assert_eq!(c.registry().get(late).unwrap().root().position.x, 70.25);

        assert!(c.end_rewind(outer));
        for entity in c.registry().iter() {
            assert!(!entity.is_rewound());
        }
        assert_eq!(c.registry().get(late).unwrap().root().position.x, 90.25);
    }

    #[test]
    fn test_prepare_without_window() {
        let mut c = coordinator(60);
        add(&mut c, 1);
        c.advance();
        c.advance();
        assert_eq!(c.prepare(&Query::overlap_sphere(Vec3::ZERO, 10.0), QueryFilter::ANY), 0);
    }
}
