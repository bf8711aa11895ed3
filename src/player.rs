//! Player sessions
//!
//! ## Table of Contents
//! - **PlayerSession**: Per-connection identity, pose and held stones

use crate::types::{PlayerId, StoneId};
use glam::Vec3;
use std::time::Instant;

/// Authoritative per-player state, owned by the world.
///
/// The session holds stone *ids* only; the stones themselves live in the
/// world's stone map and are resolved at each site of use.
#[derive(Debug, Clone)]
pub struct PlayerSession {
    /// Client-supplied identity
    pub id: PlayerId,
    /// Display name
    pub username: String,
    /// Last reported position
    pub position: Vec3,
    /// Last reported euler rotation
    pub rotation: Vec3,
    /// Carried stones in pickup order
    pub held_stones: Vec<StoneId>,
    /// Instant of the last inbound update
    pub last_update: Instant,
}

impl PlayerSession {
    /// Register a new session from a join message.
    pub fn new(id: PlayerId, username: String, position: Vec3, rotation: Vec3) -> Self {
        Self {
            id,
            username,
            position,
            rotation,
            held_stones: Vec::new(),
            last_update: Instant::now(),
        }
    }

    /// Facing angle about the vertical axis.
    pub fn yaw(&self) -> f32 {
        self.rotation.y
    }

    /// Ordinal of a held stone in pickup order, if held by this session.
    pub fn held_ordinal(&self, stone: StoneId) -> Option<usize> {
        self.held_stones.iter().position(|&s| s == stone)
    }
}
