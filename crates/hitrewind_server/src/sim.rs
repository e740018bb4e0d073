//! # Bot Simulation
//!
//! Bots wander between random waypoints on a flat square arena. Every step
//! writes their poses into the rewind engine and captures a frame.
//!
//! ```text
//!   +y  head sphere  r=0.25 at (0, 1.3, 0)
//!    |  body capsule r=0.40, half height 0.6, along Y
//!    o---- root (arena floor is y = 0 for the body center)
//! ```

use hitrewind_core::{
    EntityId, Frame, HitShape, RewindConfig, RewindCoordinator, ShapeAxis, TrackedEntity,
    TrackedEntityBuilder,
};
use hitrewind_shared::{Quaternion, Transform, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::client::WorldView;
use crate::error::ServerResult;
use crate::scenario::ScenarioConfig;

/// Height of the head above the root; clients fire from here.
pub const EYE_HEIGHT: f32 = 1.3;

/// Height above the root that clients aim at.
pub const CHEST_HEIGHT: f32 = 0.3;

/// One wandering bot.
#[derive(Clone, Copy, Debug)]
pub struct Bot {
    /// Tracked entity of this bot.
    pub id: EntityId,
    /// Current root position.
    pub position: Vec3,
    /// Facing angle around +Y, radians.
    pub heading: f32,
    waypoint: Vec3,
}

/// Fixed-step world of bots backed by a [`RewindCoordinator`].
#[derive(Debug)]
pub struct Simulation {
    coordinator: RewindCoordinator,
    bots: Vec<Bot>,
    rng: ChaCha8Rng,
    arena_half: f32,
    speed: f32,
}

impl Simulation {
    /// Spawns `bot_count` bots at random positions and registers them.
    ///
    /// # Errors
    ///
    /// Returns the engine's error if the rewind config is rejected.
    pub fn new(config: &ScenarioConfig) -> ServerResult<Self> {
        let mut coordinator = RewindCoordinator::new(config.rewind.clone())?;
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let arena_half = config.arena_size * 0.5;

        let mut bots = Vec::with_capacity(config.bot_count);
        for index in 0..config.bot_count {
            let id = EntityId::new(index as u64 + 1);
            let position = random_point(&mut rng, arena_half);
            let waypoint = random_point(&mut rng, arena_half);
            coordinator.register(bot_entity(id, position, &config.rewind))?;
            bots.push(Bot { id, position, heading: 0.0, waypoint });
        }

        info!(bots = bots.len(), arena = config.arena_size, "simulation ready");
        Ok(Self { coordinator, bots, rng, arena_half, speed: config.bot_speed })
    }

    /// Moves every bot one step and captures the frame.
    ///
    /// # Errors
    ///
    /// Fails only if a bot is still rewound, which the scoped API prevents.
    pub fn step(&mut self) -> ServerResult<Frame> {
        let dt = self.coordinator.config().fixed_step() as f32;
        let stride = self.speed * dt;

        for bot in &mut self.bots {
            let to = bot.waypoint - bot.position;
            let distance = to.length();
            if distance <= stride {
                bot.position = bot.waypoint;
                bot.waypoint = random_point(&mut self.rng, self.arena_half);
                debug!(bot = %bot.id, "waypoint reached");
            } else {
                bot.position = bot.position + to * (stride / distance);
                bot.heading = to.x.atan2(to.z);
            }

            let root = Transform::from_position_rotation(
                bot.position,
                Quaternion::from_axis_angle(Vec3::Y, bot.heading),
            );
            if let Some(entity) = self.coordinator.entity_mut(bot.id) {
                entity.set_root_pose(root)?;
            }
        }

        Ok(self.coordinator.advance())
    }

    /// What a client would be sent for the current frame.
    #[must_use]
    pub fn view(&self) -> WorldView {
        let registry = self.coordinator.registry();
        WorldView {
            frame: self.coordinator.frame(),
            bots: self
                .bots
                .iter()
                .filter_map(|bot| registry.get(bot.id).map(|e| (bot.id, e.root().position)))
                .collect(),
        }
    }

    /// Current frame.
    #[must_use]
    pub const fn frame(&self) -> Frame {
        self.coordinator.frame()
    }

    /// Bots in spawn order.
    #[must_use]
    pub fn bots(&self) -> &[Bot] {
        &self.bots
    }

    /// Rewind engine.
    #[must_use]
    pub const fn coordinator(&self) -> &RewindCoordinator {
        &self.coordinator
    }

    /// Rewind engine, mutably (for shot resolution).
    pub fn coordinator_mut(&mut self) -> &mut RewindCoordinator {
        &mut self.coordinator
    }
}

/// Hit volumes of a bot standing at `position`.
fn bot_entity(id: EntityId, position: Vec3, config: &RewindConfig) -> TrackedEntity {
    TrackedEntityBuilder::new(id)
        .root(Transform::from_position(position))
        .volume(
            HitShape::Capsule { radius: 0.4, half_height: 0.6, axis: ShapeAxis::Y },
            Transform::IDENTITY,
        )
        .volume(
            HitShape::Sphere { radius: 0.25 },
            Transform::from_position(Vec3::new(0.0, EYE_HEIGHT, 0.0)),
        )
        .build(config)
}

fn random_point(rng: &mut ChaCha8Rng, half: f32) -> Vec3 {
    Vec3::new(rng.gen_range(-half..=half), 0.0, rng.gen_range(-half..=half))
}
