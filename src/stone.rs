//! Stone rigid bodies
//!
//! ## Table of Contents
//! - **Stone**: Mobile body with held/thrown/static lifecycle flags
//! - **step**: Per-tick integrator (gravity, water advection, ground response)
//! - **carried_pose**: Pose-following for stones in a player's hands
//!
//! Stones are the only free-moving bodies in the world. The integrator is
//! deliberately frame-locked to the tick loop: friction and slope forces
//! are applied once per tick, matching the client's expectations about how
//! quickly a thrown stone dies down.

use crate::config::GameConfig;
use crate::terrain::Terrain;
use crate::types::{PlayerId, StoneId};
use glam::{Vec3, Vec3Swizzles};
use rand::Rng;
use std::f32::consts::{FRAC_PI_2, TAU};
use std::time::Instant;

/// Stone collision radius in world units.
pub const STONE_RADIUS: f32 = 0.5;

/// Vertical impact speed under which a landing no longer bounces.
const BOUNCE_CUTOFF: f32 = -0.05;

/// Fraction of the inward wave force applied as upward lift.
const WAVE_LIFT: f32 = 0.16;

/// A stone body owned by the world state.
#[derive(Debug, Clone)]
pub struct Stone {
    /// Stable identity, allocated by the world
    pub id: StoneId,
    /// World position of the stone center
    pub position: Vec3,
    /// Velocity in world units per second
    pub velocity: Vec3,
    /// Euler rotation, kept in [0, 2π) by the roll kinematics
    pub rotation: Vec3,
    /// Holder, when carried; `None` for free stones
    pub held_by: Option<PlayerId>,
    /// Set once a player has thrown this stone
    pub is_thrown: bool,
    /// Instant of the most recent throw
    pub throw_time: Option<Instant>,
    /// True when the stone has come to rest
    pub is_static: bool,
}

impl Stone {
    /// Create a free stone at the given position.
    pub fn new(id: StoneId, position: Vec3) -> Self {
        Self {
            id,
            position,
            velocity: Vec3::ZERO,
            rotation: Vec3::ZERO,
            held_by: None,
            is_thrown: false,
            throw_time: None,
            is_static: false,
        }
    }

    /// Whether a player is carrying this stone.
    pub fn is_held(&self) -> bool {
        self.held_by.is_some()
    }

    /// Whether this stone participates in tower formation: thrown by a
    /// player, not in anyone's hands, and at rest.
    pub fn is_settled(&self) -> bool {
        !self.is_held() && self.is_thrown && self.is_static
    }

    /// Put the stone into a player's hands.
    ///
    /// Velocity is zeroed and a small random tilt is applied so carried
    /// stacks do not look machine-aligned.
    pub fn pick_up(&mut self, player: PlayerId, rng: &mut impl Rng) {
        self.held_by = Some(player);
        self.velocity = Vec3::ZERO;
        self.is_static = false;
        self.is_thrown = false;
        self.rotation.x = rng.gen_range(-0.1..0.1);
        self.rotation.z = rng.gen_range(-0.1..0.1);
    }

    /// Release the stone as thrown with the given velocity.
    pub fn release_thrown(&mut self, velocity: Vec3, now: Instant) {
        self.held_by = None;
        self.velocity = velocity;
        self.is_thrown = true;
        self.throw_time = Some(now);
        self.is_static = false;
    }

    /// Advance the stone by `dt` seconds.
    ///
    /// Held stones are skipped; their pose is written by [`carried_pose`]
    /// from the holder. Returns true when the pose or rest state changed,
    /// which is what decides membership in the per-tick `stone_update`.
    pub fn step(&mut self, terrain: &Terrain, config: &GameConfig, dt: f32) -> bool {
        if self.is_held() {
            return false;
        }

        let before_position = self.position;
        let before_static = self.is_static;

        let m = config.physics.speed_multiplier;
        let mg = config.gravity_multiplier();
        let stone = &config.stone;
        let prev = self.position.xz();

        self.velocity.y += config.world.gravity * dt * mg;

        self.position.x += self.velocity.x * dt * m;
        self.position.y += self.velocity.y * dt * mg;
        self.position.z += self.velocity.z * dt * m;

        // Rolling: horizontal travel turns the stone about the crossing axis.
        let travel = self.position.xz() - prev;
        self.rotation.z = (self.rotation.z - travel.x).rem_euclid(TAU);
        self.rotation.x = (self.rotation.x + travel.y).rem_euclid(TAU);

        // Water advection: past the shore line the sea pushes stones back
        // toward the island center and lifts them slightly. Applied once
        // per tick like friction and slope, not scaled by dt; the lift is
        // what hops washed-in stones over the beach line instead of
        // letting them stall on it.
        let half = config.half_size();
        let radial = self.position.xz().length();
        let beach = half * config.world.shore_radius;
        if radial > beach {
            let depth_factor = ((radial - beach) / (0.1 * half)).min(1.0);
            let pull = stone.wave_strength * m * depth_factor;
            self.velocity.x += (-self.position.x / radial) * pull;
            self.velocity.z += (-self.position.z / radial) * pull;
            self.velocity.y += WAVE_LIFT * pull;
        }

        // Ground collision against the heightfield.
        let ground = terrain.height(self.position.x, self.position.z);
        let rest_y = ground + stone.depth * 0.5 + 0.01;
        if self.position.y < rest_y {
            self.position.y = rest_y;

            if self.velocity.y < BOUNCE_CUTOFF {
                self.velocity.y = -self.velocity.y * stone.bounce;
            } else {
                self.velocity.y = 0.0;
            }

            let horizontal = self.velocity.xz().length();
            self.velocity.x *= stone.friction;
            self.velocity.z *= stone.friction;

            if horizontal < 0.5 * stone.stop_threshold {
                self.velocity.x = 0.0;
                self.velocity.z = 0.0;
                if self.velocity.y.abs() < 0.01 {
                    self.is_static = true;
                    self.position.y = rest_y;
                }
            } else {
                let slope = terrain.slope(self.position.x, self.position.z);
                self.velocity.x += slope.x * stone.roll_factor * m;
                self.velocity.z += slope.y * stone.roll_factor * m;
            }
        }

        let speed = self.velocity.length();
        if speed > stone.max_velocity {
            self.velocity *= stone.max_velocity / speed;
        }

        let horizontal = self.velocity.xz().length();
        if horizontal < stone.stop_threshold {
            self.is_static = true;
        } else if self.is_static {
            self.is_static = false;
        }

        self.position != before_position || self.is_static != before_static
    }
}

/// Pose of a carried stone, derived from the holder's pose.
///
/// `ordinal` is the 0-based index of the stone in the holder's held list;
/// each successive stone sits 0.9 units higher, forming a visible stack on
/// the holder's right-forward side.
pub fn carried_pose(holder_position: Vec3, yaw: f32, ordinal: usize) -> (Vec3, Vec3) {
    let side = yaw + FRAC_PI_2;
    let position = Vec3::new(
        holder_position.x - yaw.sin() + side.sin() * 0.9,
        holder_position.y - 0.5 + ordinal as f32 * 0.9,
        holder_position.z - yaw.cos() + side.cos() * 0.9,
    );
    let rotation = Vec3::new(0.2, side, 0.2);
    (position, rotation)
}
