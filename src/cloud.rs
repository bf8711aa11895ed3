//! Clouds and the destruction choreography
//!
//! ## Table of Contents
//! - **Cloud**: Wandering weather agent
//! - **DestructionPhase / DestructionSequence**: Three-phase tower removal
//! - **CloudReturnPath**: Post-destruction drift back to an idle position
//!
//! A cloud is normally a free wanderer. Once a destruction sequence claims
//! it, the sequence owns its movement until the finale; afterwards a return
//! path owns it for a few more seconds. The tick loop enforces that the two
//! ownership sets stay disjoint.

use crate::config::DestructionConfig;
use crate::types::{CloudId, TowerId};
use glam::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Distance from a player at which a cloud triggers a destruction sequence.
pub const TRIGGER_DISTANCE: f32 = 15.0;

/// A wandering cloud.
#[derive(Debug, Clone)]
pub struct Cloud {
    /// Stable identity, assigned at startup
    pub id: CloudId,
    /// World position; y stays at the configured cloud altitude
    pub position: Vec3,
    /// Unit horizontal travel direction (y = 0)
    pub direction: Vec3,
    /// Travel speed in world units per second, within [0.5, 2.0]
    pub speed: f32,
}

impl Cloud {
    /// Spawn a cloud at a random position inside the world bounds.
    pub fn spawn(id: CloudId, half_size: f32, altitude: f32, rng: &mut impl Rng) -> Self {
        let angle = rng.gen_range(0.0..std::f32::consts::TAU);
        Self {
            id,
            position: Vec3::new(
                rng.gen_range(-half_size..half_size),
                altitude,
                rng.gen_range(-half_size..half_size),
            ),
            direction: Vec3::new(angle.sin(), 0.0, angle.cos()),
            speed: rng.gen_range(0.5..2.0),
        }
    }

    /// Advance the background wander by `dt` seconds.
    ///
    /// Crossing a world boundary reflects that axis of the direction and
    /// perturbs the heading slightly so clouds do not ping-pong forever on
    /// the same line.
    pub fn wander(&mut self, half_size: f32, dt: f32, rng: &mut impl Rng) {
        self.position.x += self.direction.x * self.speed * dt;
        self.position.z += self.direction.z * self.speed * dt;

        let mut reflected = false;
        if self.position.x.abs() > half_size {
            self.direction.x = -self.direction.x;
            reflected = true;
        }
        if self.position.z.abs() > half_size {
            self.direction.z = -self.direction.z;
            reflected = true;
        }

        if reflected {
            self.direction.x += rng.gen_range(-0.1..0.1);
            self.direction.z += rng.gen_range(-0.1..0.1);
            let length = self.direction.length();
            if length > 0.0 {
                self.direction /= length;
            }
        }
    }
}

/// Phase of an active destruction sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestructionPhase {
    /// Cloud is traveling to the target tower
    Moving,
    /// Cloud rains over the tower
    Raining,
    /// Cloud floods the tower base
    Flooding,
}

/// An active cloud-driven tower destruction.
#[derive(Debug, Clone)]
pub struct DestructionSequence {
    /// The cloud carrying out the destruction
    pub cloud_id: CloudId,
    /// Target tower identity
    pub tower_id: TowerId,
    /// Target tower index at sequence start (wire field)
    pub tower_index: usize,
    /// Target tower ground position
    pub tower_position: Vec3,
    /// Cloud position when the sequence started
    pub start_position: Vec3,
    /// Current phase
    pub phase: DestructionPhase,
    /// Instant the sequence started
    pub start_time: Instant,
}

impl DestructionSequence {
    /// Start a sequence for `cloud` against the given tower.
    pub fn new(
        cloud_id: CloudId,
        tower_id: TowerId,
        tower_index: usize,
        tower_position: Vec3,
        start_position: Vec3,
        now: Instant,
    ) -> Self {
        Self {
            cloud_id,
            tower_id,
            tower_index,
            tower_position,
            start_position,
            phase: DestructionPhase::Moving,
            start_time: now,
        }
    }

    /// Phase the sequence should be in after `elapsed`, or `None` once the
    /// flooding phase has run its course and the tower must fall.
    pub fn phase_at(&self, elapsed: Duration, timings: &DestructionConfig) -> Option<DestructionPhase> {
        let ms = elapsed.as_millis() as u64;
        if ms < timings.moving_ms {
            Some(DestructionPhase::Moving)
        } else if ms < timings.moving_ms + timings.raining_ms {
            Some(DestructionPhase::Raining)
        } else if ms < timings.moving_ms + timings.raining_ms + timings.flooding_ms {
            Some(DestructionPhase::Flooding)
        } else {
            None
        }
    }

    /// Cloud x/z during the moving phase: linear travel from the start
    /// position to the tower, altitude held.
    pub fn moving_position(&self, elapsed: Duration, timings: &DestructionConfig) -> Vec3 {
        let t = (elapsed.as_secs_f32() / (timings.moving_ms as f32 / 1000.0)).clamp(0.0, 1.0);
        Vec3::new(
            self.start_position.x + (self.tower_position.x - self.start_position.x) * t,
            self.start_position.y,
            self.start_position.z + (self.tower_position.z - self.start_position.z) * t,
        )
    }
}

/// Post-destruction drift back to an idle spot.
#[derive(Debug, Clone)]
pub struct CloudReturnPath {
    /// The returning cloud
    pub cloud_id: CloudId,
    /// Position the return starts from (over the destroyed tower)
    pub start_position: Vec3,
    /// Idle destination
    pub end_position: Vec3,
    /// Instant the return started
    pub start_time: Instant,
    /// Total travel time
    pub duration: Duration,
}

impl CloudReturnPath {
    /// Interpolated cloud position after `elapsed`, and whether the path
    /// has completed.
    pub fn position_at(&self, elapsed: Duration) -> (Vec3, bool) {
        let t = (elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0);
        (self.start_position.lerp(self.end_position, t), t >= 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DestructionConfig;

    #[test]
    fn test_wander_reflects_at_bounds() {
        let mut rng = rand::thread_rng();
        let mut cloud = Cloud::spawn(CloudId::new(0), 50.0, 40.0, &mut rng);
        cloud.position = Vec3::new(49.9, 40.0, 0.0);
        cloud.direction = Vec3::new(1.0, 0.0, 0.0);
        cloud.speed = 2.0;

        cloud.wander(50.0, 0.5, &mut rng);
        assert!(cloud.direction.x < 0.0, "x axis should reflect");
        assert!((cloud.direction.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_phase_timeline() {
        let timings = DestructionConfig::default();
        let now = Instant::now();
        let seq = DestructionSequence::new(
            CloudId::new(0),
            TowerId::new(1),
            0,
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(0.0, 40.0, 0.0),
            now,
        );

        assert_eq!(
            seq.phase_at(Duration::from_millis(0), &timings),
            Some(DestructionPhase::Moving)
        );
        assert_eq!(
            seq.phase_at(Duration::from_millis(3500), &timings),
            Some(DestructionPhase::Raining)
        );
        assert_eq!(
            seq.phase_at(Duration::from_millis(5500), &timings),
            Some(DestructionPhase::Flooding)
        );
        assert_eq!(seq.phase_at(Duration::from_millis(7001), &timings), None);
    }

    #[test]
    fn test_moving_interpolation_holds_altitude() {
        let timings = DestructionConfig::default();
        let seq = DestructionSequence::new(
            CloudId::new(0),
            TowerId::new(1),
            0,
            Vec3::new(10.0, 0.0, 20.0),
            Vec3::new(0.0, 40.0, 0.0),
            Instant::now(),
        );

        let halfway = seq.moving_position(Duration::from_millis(1500), &timings);
        assert!((halfway.x - 5.0).abs() < 1e-4);
        assert!((halfway.z - 10.0).abs() < 1e-4);
        assert!((halfway.y - 40.0).abs() < 1e-4);

        let done = seq.moving_position(Duration::from_millis(9000), &timings);
        assert!((done.x - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_return_path_completes() {
        let path = CloudReturnPath {
            cloud_id: CloudId::new(0),
            start_position: Vec3::new(0.0, 40.0, 0.0),
            end_position: Vec3::new(30.0, 40.0, -30.0),
            start_time: Instant::now(),
            duration: Duration::from_secs(5),
        };

        let (mid, done) = path.position_at(Duration::from_millis(2500));
        assert!(!done);
        assert!((mid.x - 15.0).abs() < 1e-4);

        let (end, done) = path.position_at(Duration::from_secs(6));
        assert!(done);
        assert_eq!(end, path.end_position);
    }
}
