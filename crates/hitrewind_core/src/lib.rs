//! # HITREWIND Core Engine
//!
//! Server-side lag compensation. Every step the coordinator captures each
//! tracked entity's hit volumes; a shot fired at a past time rewinds just the
//! entities its query can touch, runs the query, and restores them.
//!
//! ## Architecture Rules
//!
//! 1. **History is never polluted** - rewound entities refuse live writes and
//!    are restored before the next capture
//! 2. **Every rewind is undone** - windows only exist inside a [`RewindScope`]
//!    that restores on drop
//! 3. **Deterministic order** - entities are visited in id order
//!
//! ## Example
//!
//! ```rust,ignore
//! use hitrewind_core::{QueryFilter, RewindCoordinator, RewindConfig, VolumeQueryEngine};
//!
//! let mut coordinator = RewindCoordinator::new(RewindConfig::default())?;
//! coordinator.register(entity)?;
//! coordinator.advance();
//!
//! let mut scope = coordinator.rewind_seconds(shooter_latency);
//! let hit = scope.raycast(&mut VolumeQueryEngine, &ray, 100.0, QueryFilter::ignoring(shooter));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod entity;
pub mod error;
pub mod query;
pub mod registry;
pub mod scope;
pub mod snapshot;

pub use clock::{FixedStepLoop, Frame, SimulationClock, StepStats};
pub use config::RewindConfig;
pub use coordinator::{CoordinatorStats, RewindCoordinator, RewindRequest, WindowId};
pub use entity::{
    BoundsSource, EntityId, HitShape, HitVolume, RewindState, ShapeAxis, TrackedEntity,
    TrackedEntityBuilder,
};
pub use error::{RewindError, RewindResult, TargetRejection};
pub use query::{
    BroadPhase, LayerMask, Query, QueryEngine, QueryFilter, QueryHit, VolumeQueryEngine, MAX_LAYER,
};
pub use registry::EntityRegistry;
pub use scope::RewindScope;
pub use snapshot::{BlendEnd, Resolution, RewindTarget, SampleKind, SampleView, SnapshotRing};
