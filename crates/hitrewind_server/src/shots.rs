//! # Shot Intake and Resolution
//!
//! Clients push [`ShotRequest`]s into a bounded channel from any thread.
//! The simulation thread drains it once per step and resolves each shot
//! against the world as the shooter saw it.
//!
//! ```text
//! ┌──────────────┐  ShotRequest   ┌──────────────┐  rewind_seconds  ┌─────────────┐
//! │ client thread│ ─────────────> │ ShotResolver │ ───────────────> │ Coordinator │
//! └──────────────┘   (bounded)    └──────────────┘  raycast, drop   └─────────────┘
//! ```

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use hitrewind_core::{
    EntityId, Frame, LayerMask, Query, QueryEngine, QueryFilter, QueryHit, RewindCoordinator,
    RewindError, RewindTarget,
};
use hitrewind_shared::{Ray, Vec3};
use tracing::{debug, warn};

use crate::error::{ServerError, ServerResult};

/// A shot as fired on a client.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShotRequest {
    /// Entity that fired; never hits itself.
    pub shooter: EntityId,
    /// Entity the client was aiming at, if any.
    pub intended: Option<EntityId>,
    /// Shot ray in world space.
    pub ray: Ray,
    /// Range of the weapon.
    pub max_distance: f32,
    /// Server frame the client was displaying when it fired.
    pub view_frame: Frame,
    /// Layers the shot can hit.
    pub layers: LayerMask,
}

impl ShotRequest {
    /// Shot from `from` aimed straight at `at`.
    #[must_use]
    pub fn aimed(
        shooter: EntityId,
        from: Vec3,
        intended: EntityId,
        at: Vec3,
        max_distance: f32,
        view_frame: Frame,
    ) -> Self {
        Self {
            shooter,
            intended: Some(intended),
            ray: Ray::new(from, at - from),
            max_distance,
            view_frame,
            layers: LayerMask::ALL,
        }
    }

    /// Entities this shot may hit.
    #[must_use]
    pub const fn filter(&self) -> QueryFilter {
        QueryFilter::ignoring(self.shooter).with_layers(self.layers)
    }
}

/// What a shot did.
#[derive(Clone, Debug, PartialEq)]
pub struct ShotOutcome {
    /// The shot.
    pub shot: ShotRequest,
    /// Time the world was rewound to, `None` if resolved live.
    pub target: Option<RewindTarget>,
    /// Closest hit.
    pub hit: Option<QueryHit>,
    /// Why the rewind was refused, if it was.
    pub rejection: Option<RewindError>,
}

impl ShotOutcome {
    /// True if the shot hit the entity it was aimed at.
    #[must_use]
    pub fn hit_intended(&self) -> bool {
        match (self.hit, self.shot.intended) {
            (Some(hit), Some(intended)) => hit.entity == intended,
            _ => false,
        }
    }
}

/// Shot counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShotStats {
    /// Shots taken off the channel.
    pub received: u64,
    /// Shots that hit anything.
    pub hits: u64,
    /// Shots that hit their intended entity.
    pub intended_hits: u64,
    /// Shots that hit nothing.
    pub misses: u64,
    /// Shots whose rewind was refused and fell back to live poses.
    pub rejected: u64,
}

impl ShotStats {
    /// Share of shots that hit their intended entity.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        if self.received == 0 {
            return 0.0;
        }
        self.intended_hits as f64 / self.received as f64
    }
}

/// Creates a bounded shot channel.
#[must_use]
pub fn shot_channel(capacity: usize, lag_compensation: bool) -> (ShotSender, ShotResolver) {
    let (sender, receiver) = bounded(capacity);
    (
        ShotSender { sender },
        ShotResolver { receiver, lag_compensation, stats: ShotStats::default() },
    )
}

/// Producer end of the shot channel.
#[derive(Clone, Debug)]
pub struct ShotSender {
    sender: Sender<ShotRequest>,
}

impl ShotSender {
    /// Queues a shot. Returns false if the queue is full and the shot was
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Disconnected`] once the resolver is gone.
    pub fn send(&self, shot: ShotRequest) -> ServerResult<bool> {
        match self.sender.try_send(shot) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => {
                warn!(shooter = %shot.shooter, "shot queue full, shot dropped");
                Ok(false)
            }
            Err(TrySendError::Disconnected(_)) => Err(ServerError::Disconnected("shot resolver")),
        }
    }
}

/// Consumer end of the shot channel; lives on the simulation thread.
#[derive(Debug)]
pub struct ShotResolver {
    receiver: Receiver<ShotRequest>,
    lag_compensation: bool,
    stats: ShotStats,
}

impl ShotResolver {
    /// Resolves every queued shot.
    pub fn drain<E: QueryEngine + ?Sized>(
        &mut self,
        coordinator: &mut RewindCoordinator,
        engine: &mut E,
    ) -> Vec<ShotOutcome> {
        let mut outcomes = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(shot) => outcomes.push(self.resolve(coordinator, engine, shot)),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        outcomes
    }

    /// Resolves one shot.
    ///
    /// The world is rewound by the time between the shooter's view frame
    /// and now. A shot fired on the current frame, or with compensation
    /// off, is resolved against live poses.
    pub fn resolve<E: QueryEngine + ?Sized>(
        &mut self,
        coordinator: &mut RewindCoordinator,
        engine: &mut E,
        shot: ShotRequest,
    ) -> ShotOutcome {
        let behind = coordinator.frame().saturating_sub(shot.view_frame);
        let outcome = if self.lag_compensation && behind > 0 {
            let latency = coordinator.clock().frames_to_seconds(behind);
            let mut scope = coordinator.rewind_seconds(latency);
            let target = scope.target();
            let rejection = scope.error().cloned();
            let hit = scope.raycast(engine, &shot.ray, shot.max_distance, shot.filter());
            ShotOutcome { shot, target, hit, rejection }
        } else {
            let query = Query::Ray { ray: shot.ray, max_distance: shot.max_distance };
            let hit = engine
                .run(coordinator.registry(), &query, shot.filter())
                .into_iter()
                .min_by(|a, b| a.distance.total_cmp(&b.distance));
            ShotOutcome { shot, target: None, hit, rejection: None }
        };

        self.record(&outcome);
        outcome
    }

    fn record(&mut self, outcome: &ShotOutcome) {
        self.stats.received += 1;
        match outcome.hit {
            Some(hit) => {
                self.stats.hits += 1;
                debug!(
                    shooter = %outcome.shot.shooter,
                    entity = %hit.entity,
                    volume = hit.volume,
                    distance = hit.distance,
                    "shot hit"
                );
            }
            None => self.stats.misses += 1,
        }
        if outcome.hit_intended() {
            self.stats.intended_hits += 1;
        }
        if let Some(reason) = &outcome.rejection {
            self.stats.rejected += 1;
            warn!(shooter = %outcome.shot.shooter, %reason, "shot resolved on live poses");
        }
    }

    /// True if shots are resolved against the rewound world.
    #[must_use]
    pub const fn lag_compensation(&self) -> bool {
        self.lag_compensation
    }

    /// Counters so far.
    #[must_use]
    pub const fn stats(&self) -> &ShotStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hitrewind_core::{HitShape, RewindConfig, TrackedEntityBuilder, VolumeQueryEngine};
    use hitrewind_shared::Transform;

    const SHOOTER: EntityId = EntityId::new(1);
    const TARGET: EntityId = EntityId::new(2);

    /// Target slides +1 on x per frame, 90 frames captured.
    fn world() -> RewindCoordinator {
        let config = RewindConfig::default();
        let mut c = RewindCoordinator::new(config.clone()).unwrap();
        for id in [SHOOTER, TARGET] {
            c.register(
                TrackedEntityBuilder::new(id)
                    .volume(HitShape::Sphere { radius: 0.5 }, Transform::IDENTITY)
                    .build(&config),
            )
            .unwrap();
        }
        for frame in 1..=90u64 {
            c.entity_mut(SHOOTER)
                .unwrap()
                .set_root_pose(Transform::from_position(Vec3::new(0.0, 0.0, -20.0)))
                .unwrap();
            c.entity_mut(TARGET)
                .unwrap()
                .set_root_pose(Transform::from_position(Vec3::new(frame as f32, 0.0, 0.0)))
                .unwrap();
            c.advance();
        }
        c
    }

    fn shot_at(x: f32, view_frame: Frame) -> ShotRequest {
        ShotRequest::aimed(
            SHOOTER,
            Vec3::new(x, 0.0, -20.0),
            TARGET,
            Vec3::new(x, 0.0, 0.0),
            100.0,
            view_frame,
        )
    }

    #[test]
    fn test_compensated_shot_hits_seen_pose() {
        let mut c = world();
        let (sender, mut resolver) = shot_channel(8, true);
        assert!(sender.send(shot_at(84.0, 84)).unwrap());

        let outcomes = resolver.drain(&mut c, &mut VolumeQueryEngine);
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].hit_intended());
        assert_eq!(outcomes[0].target, Some(RewindTarget::Frame(84)));
        assert_eq!(c.registry().get(TARGET).unwrap().root().position.x, 90.0);
        assert_eq!(resolver.stats().intended_hits, 1);
    }

    #[test]
    fn test_uncompensated_shot_misses_moved_target() {
        let mut c = world();
        let (sender, mut resolver) = shot_channel(8, false);
        sender.send(shot_at(84.0, 84)).unwrap();

        let outcomes = resolver.drain(&mut c, &mut VolumeQueryEngine);
        assert!(outcomes[0].hit.is_none());
        assert_eq!(outcomes[0].target, None);
        assert_eq!(resolver.stats().misses, 1);
    }

    #[test]
    fn test_current_frame_shot_resolves_live() {
        let mut c = world();
        let (_, mut resolver) = shot_channel(8, true);
        let outcome = resolver.resolve(&mut c, &mut VolumeQueryEngine, shot_at(90.0, 90));
        assert!(outcome.hit_intended());
        assert_eq!(outcome.target, None);
        assert_eq!(c.stats().windows_opened, 0);
    }

    #[test]
    fn test_too_old_shot_falls_back_to_live() {
        let mut c = world();
        let (_, mut resolver) = shot_channel(8, true);
        let outcome = resolver.resolve(&mut c, &mut VolumeQueryEngine, shot_at(20.0, 20));
        assert!(outcome.hit.is_none());
        assert!(matches!(outcome.rejection, Some(RewindError::InvalidRewindTarget { .. })));
        assert_eq!(resolver.stats().rejected, 1);
    }

    #[test]
    fn test_uncompensated_shot_takes_closest_hit() {
        let mut c = world();
        let (_, mut resolver) = shot_channel(8, false);
        // Engine that reports hits furthest first
        let mut engine = |_: &hitrewind_core::EntityRegistry, _: &Query, filter: QueryFilter| {
            assert_eq!(filter.ignore, Some(SHOOTER));
            vec![
                QueryHit { entity: EntityId::new(9), volume: 0, distance: 40.0 },
                QueryHit { entity: TARGET, volume: 0, distance: 19.5 },
                QueryHit { entity: EntityId::new(8), volume: 0, distance: 25.0 },
            ]
        };
        let outcome = resolver.resolve(&mut c, &mut engine, shot_at(90.0, 90));
        assert_eq!(outcome.hit.map(|h| h.entity), Some(TARGET));
        assert!(outcome.hit_intended());
    }

    #[test]
    fn test_shot_layers_reach_engine() {
        let mut c = world();
        let (_, mut resolver) = shot_channel(8, true);
        let shot = ShotRequest { layers: LayerMask::layer(2), ..shot_at(84.0, 84) };
        let outcome = resolver.resolve(&mut c, &mut VolumeQueryEngine, shot);
        // Target sits on layer 0
        assert!(outcome.hit.is_none());
        assert!(outcome.rejection.is_none());
        assert!(!c.registry().get(TARGET).unwrap().is_rewound());
    }

    #[test]
    fn test_full_queue_drops_and_disconnect_errors() {
        let (sender, resolver) = shot_channel(1, true);
        assert!(sender.send(shot_at(0.0, 1)).unwrap());
        assert!(!sender.send(shot_at(0.0, 1)).unwrap());
        drop(resolver);
        assert!(matches!(
            sender.send(shot_at(0.0, 1)),
            Err(ServerError::Disconnected(_))
        ));
    }
}
