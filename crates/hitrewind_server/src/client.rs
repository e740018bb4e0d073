//! # Lagged Client
//!
//! Stands in for every connected player at once. Views arrive from the
//! server, sit in a queue for the configured delay, and only then become
//! visible. Bots fire at what is visible, so every shot is aimed at the
//! past.

use std::collections::VecDeque;

use hitrewind_core::{EntityId, Frame};
use hitrewind_shared::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::scenario::ScenarioConfig;
use crate::shots::ShotRequest;
use crate::sim::{CHEST_HEIGHT, EYE_HEIGHT};

/// Keeps the client's RNG stream apart from the simulation's.
const CLIENT_SEED_SALT: u64 = 0x00C1_1E47;

/// Bot positions the server sent for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct WorldView {
    /// Frame the positions were captured at.
    pub frame: Frame,
    /// Root position of every bot.
    pub bots: Vec<(EntityId, Vec3)>,
}

/// Delays views and turns them into shots.
#[derive(Debug)]
pub struct LaggedClient {
    delay: u64,
    pending: VecDeque<WorldView>,
    rng: ChaCha8Rng,
    fire_chance: f32,
    max_distance: f32,
    fired: u64,
}

impl LaggedClient {
    /// Creates a client that sees the world `delay` frames late.
    #[must_use]
    pub fn new(delay: u64, fire_chance: f32, max_distance: f32, seed: u64) -> Self {
        Self {
            delay,
            pending: VecDeque::with_capacity(delay as usize + 1),
            rng: ChaCha8Rng::seed_from_u64(seed),
            fire_chance,
            max_distance,
            fired: 0,
        }
    }

    /// Client matching a scenario.
    #[must_use]
    pub fn from_scenario(config: &ScenarioConfig) -> Self {
        Self::new(
            config.latency_frames(),
            config.fire_chance,
            config.arena_size * 2.0,
            config.seed ^ CLIENT_SEED_SALT,
        )
    }

    /// Receives the newest view and returns shots fired at views that have
    /// become visible.
    pub fn observe(&mut self, view: WorldView) -> Vec<ShotRequest> {
        let newest = view.frame;
        self.pending.push_back(view);

        let mut shots = Vec::new();
        while self.pending.front().is_some_and(|v| v.frame + self.delay <= newest) {
            if let Some(visible) = self.pending.pop_front() {
                self.fire_at(&visible, &mut shots);
            }
        }
        shots
    }

    fn fire_at(&mut self, visible: &WorldView, shots: &mut Vec<ShotRequest>) {
        let count = visible.bots.len();
        if count < 2 {
            return;
        }
        for (index, &(shooter, from)) in visible.bots.iter().enumerate() {
            if self.rng.gen::<f32>() >= self.fire_chance {
                continue;
            }
            let mut pick = self.rng.gen_range(0..count - 1);
            if pick >= index {
                pick += 1;
            }
            let (target, at) = visible.bots[pick];
            shots.push(ShotRequest::aimed(
                shooter,
                from + Vec3::new(0.0, EYE_HEIGHT, 0.0),
                target,
                at + Vec3::new(0.0, CHEST_HEIGHT, 0.0),
                self.max_distance,
                visible.frame,
            ));
            self.fired += 1;
        }
    }

    /// View delay in frames.
    #[must_use]
    pub const fn delay(&self) -> u64 {
        self.delay
    }

    /// Shots fired so far.
    #[must_use]
    pub const fn fired(&self) -> u64 {
        self.fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(frame: Frame) -> WorldView {
        WorldView {
            frame,
            bots: vec![
                (EntityId::new(1), Vec3::new(0.0, 0.0, 0.0)),
                (EntityId::new(2), Vec3::new(10.0, 0.0, 0.0)),
            ],
        }
    }

    #[test]
    fn test_views_visible_after_delay() {
        let mut client = LaggedClient::new(3, 1.0, 100.0, 1);
        for frame in 1..=3 {
            assert!(client.observe(view(frame)).is_empty());
        }
        let shots = client.observe(view(4));
        assert_eq!(shots.len(), 2);
        assert!(shots.iter().all(|s| s.view_frame == 1));
        assert_eq!(client.fired(), 2);
    }

    #[test]
    fn test_shots_aim_at_other_bot() {
        let mut client = LaggedClient::new(0, 1.0, 100.0, 7);
        let shots = client.observe(view(1));
        assert_eq!(shots.len(), 2);
        for shot in shots {
            let intended = shot.intended.unwrap();
            assert_ne!(intended, shot.shooter);
            assert_eq!(shot.ray.origin.y, EYE_HEIGHT);
        }
    }

    #[test]
    fn test_zero_fire_chance_never_fires() {
        let mut client = LaggedClient::new(0, 0.0, 100.0, 7);
        for frame in 1..=50 {
            assert!(client.observe(view(frame)).is_empty());
        }
    }
}
