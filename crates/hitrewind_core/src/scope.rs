//! # Scoped Rewind
//!
//! [`RewindScope`] is the only way to hold a rewind window open. It borrows
//! the coordinator mutably and ends its window on drop, including during a
//! panic unwind, so no exit path can leave entities at a historical pose.

use hitrewind_shared::{Ray, Vec3};

use crate::coordinator::{RewindCoordinator, RewindRequest, WindowId};
use crate::error::{RewindError, RewindResult};
use crate::query::{Query, QueryEngine, QueryFilter, QueryHit};
use crate::registry::EntityRegistry;
use crate::snapshot::RewindTarget;

/// An open (or refused) rewind window.
///
/// ```rust,ignore
/// let mut scope = coordinator.rewind_seconds(latency);
/// let hit = scope.raycast(&mut engine, &ray, 100.0, QueryFilter::ignoring(shooter));
/// drop(scope); // every rewound entity is live again
/// ```
pub struct RewindScope<'a> {
    coordinator: &'a mut RewindCoordinator,
    window: RewindResult<(WindowId, RewindTarget)>,
    open: bool,
}

impl<'a> RewindScope<'a> {
    pub(crate) fn new(
        coordinator: &'a mut RewindCoordinator,
        window: RewindResult<(WindowId, RewindTarget)>,
    ) -> Self {
        let open = window.is_ok();
        Self { coordinator, window, open }
    }

    /// True if the request was accepted.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.window.is_ok()
    }

    /// Target of this window, `None` if the request was refused.
    #[must_use]
    pub fn target(&self) -> Option<RewindTarget> {
        self.window.as_ref().ok().map(|&(_, target)| target)
    }

    /// Why the request was refused.
    #[must_use]
    pub fn error(&self) -> Option<&RewindError> {
        self.window.as_ref().err()
    }

    /// Registry as currently posed.
    #[must_use]
    pub fn registry(&self) -> &EntityRegistry {
        self.coordinator.registry()
    }

    /// Runs `query` against the rewound world.
    ///
    /// Entities passing the broad phase are rewound first. On a refused or
    /// closed scope the query runs against live poses.
    pub fn query<E: QueryEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        query: &Query,
        filter: QueryFilter,
    ) -> Vec<QueryHit> {
        if self.open {
            self.coordinator.prepare(query, filter);
        }
        engine.run(self.coordinator.registry(), query, filter)
    }

    /// Closest hit along `ray`.
    pub fn raycast<E: QueryEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        ray: &Ray,
        max_distance: f32,
        filter: QueryFilter,
    ) -> Option<QueryHit> {
        let query = Query::Ray { ray: *ray, max_distance };
        self.query(engine, &query, filter)
            .into_iter()
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    /// Every hit volume overlapping a sphere.
    pub fn overlap<E: QueryEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        center: Vec3,
        radius: f32,
        filter: QueryFilter,
    ) -> Vec<QueryHit> {
        self.query(engine, &Query::overlap_sphere(center, radius), filter)
    }

    /// Opens a nested window; it overrides this one until dropped.
    pub fn rewind(&mut self, request: RewindRequest) -> RewindScope<'_> {
        let window = self.coordinator.open_window(request);
        RewindScope::new(self.coordinator, window)
    }

    /// Ends the window now.
    pub fn close(mut self) {
        self.end();
    }

    fn end(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Ok(&(id, _)) = self.window.as_ref() {
            self.coordinator.end_rewind(id);
        }
    }
}

impl Drop for RewindScope<'_> {
    fn drop(&mut self) {
        self.end();
    }
}

impl std::fmt::Debug for RewindScope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewindScope")
            .field("window", &self.window)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}
