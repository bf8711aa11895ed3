//! Game configuration
//!
//! ## Table of Contents
//! - **WorldConfig**: Terrain shape, gravity, cloud population
//! - **StoneConfig**: Spawner cap and physics coefficients
//! - **TowerConfig**: Formation thresholds
//! - **PhysicsConfig**: Global time scaling
//! - **DestructionConfig**: Cloud destruction phase durations
//! - **GameConfig**: The complete read-only record loaded at startup

use crate::error::{Result, ServerError};
use serde::{Deserialize, Serialize};

/// World and terrain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorldConfig {
    /// Terrain side length in world units
    pub size: f32,
    /// Grid samples per side of the heightfield
    pub resolution: usize,
    /// Gravitational acceleration (negative)
    pub gravity: f32,
    /// Upper height clamp for terrain samples
    pub max_terrain_height: f32,
    /// Lower height clamp for terrain samples
    pub min_terrain_height: f32,
    /// Heightmap sine period divisor on the first grid axis
    pub terrain_x_scale: f32,
    /// Heightmap sine period divisor on the second grid axis
    pub terrain_y_scale: f32,
    /// Edge falloff exponent (island shape)
    pub edge_falloff: f32,
    /// Fraction of the half-world-size at which ground ends and water begins
    pub shore_radius: f32,
    /// Default altitude for cloud spawn and return
    pub cloud_height: f32,
    /// Number of clouds created at startup
    pub cloud_count: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            size: 200.0,
            resolution: 200,
            gravity: -9.8,
            max_terrain_height: 15.0,
            min_terrain_height: -2.0,
            terrain_x_scale: 20.0,
            terrain_y_scale: 20.0,
            edge_falloff: 2.0,
            shore_radius: 0.9,
            cloud_height: 40.0,
            cloud_count: 5,
        }
    }
}

/// Stone spawner and physics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoneConfig {
    /// Spawner cap on active stones
    pub max_count: usize,
    /// Minimum milliseconds between beach spawns
    pub spawn_interval_ms: u64,
    /// Vertical restitution on ground impact
    pub bounce: f32,
    /// Horizontal velocity retained per grounded tick
    pub friction: f32,
    /// Slope force coefficient while grounded
    pub roll_factor: f32,
    /// Euclidean speed cap
    pub max_velocity: f32,
    /// Horizontal speed under which a stone is at rest
    pub stop_threshold: f32,
    /// Inward water force magnitude
    pub wave_strength: f32,
    /// Stone block height, used for collision half-height and tower tops
    pub depth: f32,
}

impl Default for StoneConfig {
    fn default() -> Self {
        Self {
            max_count: 20,
            spawn_interval_ms: 1000,
            bounce: 0.3,
            friction: 0.92,
            roll_factor: 2.0,
            max_velocity: 30.0,
            stop_threshold: 0.35,
            wave_strength: 3.0,
            depth: 0.5,
        }
    }
}

/// Tower formation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TowerConfig {
    /// Horizontal radius inside which a player is "on" the tower
    pub base_radius: f32,
    /// Horizontal distance under which stones cluster
    pub group_radius: f32,
    /// Stones consumed per level
    pub stones_per_level: usize,
}

impl Default for TowerConfig {
    fn default() -> Self {
        Self {
            base_radius: 2.5,
            group_radius: 3.0,
            stones_per_level: 3,
        }
    }
}

/// Global physics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhysicsConfig {
    /// Global time scaling multiplier
    pub speed_multiplier: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            speed_multiplier: 1.0,
        }
    }
}

/// Cloud destruction sequence phase durations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DestructionConfig {
    /// Cloud travel phase duration in milliseconds
    pub moving_ms: u64,
    /// Raining phase duration in milliseconds
    pub raining_ms: u64,
    /// Flooding phase duration in milliseconds
    pub flooding_ms: u64,
    /// Post-destruction return path duration in milliseconds
    pub return_ms: u64,
}

impl Default for DestructionConfig {
    fn default() -> Self {
        Self {
            moving_ms: 3000,
            raining_ms: 2000,
            flooding_ms: 2000,
            return_ms: 5000,
        }
    }
}

/// Complete game configuration, read-only after startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameConfig {
    /// World and terrain options
    pub world: WorldConfig,
    /// Stone spawner and physics options
    pub stone: StoneConfig,
    /// Tower formation options
    pub tower: TowerConfig,
    /// Global physics options
    pub physics: PhysicsConfig,
    /// Destruction sequence timings
    pub destruction: DestructionConfig,
}

impl GameConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the world options
    pub fn with_world(mut self, world: WorldConfig) -> Self {
        self.world = world;
        self
    }

    /// Set the stone options
    pub fn with_stone(mut self, stone: StoneConfig) -> Self {
        self.stone = stone;
        self
    }

    /// Set the tower options
    pub fn with_tower(mut self, tower: TowerConfig) -> Self {
        self.tower = tower;
        self
    }

    /// Set the physics options
    pub fn with_physics(mut self, physics: PhysicsConfig) -> Self {
        self.physics = physics;
        self
    }

    /// Set the destruction timings
    pub fn with_destruction(mut self, destruction: DestructionConfig) -> Self {
        self.destruction = destruction;
        self
    }

    /// Gravity scaled by the configured multipliers.
    ///
    /// Vertical integration runs at one fifth of the horizontal time
    /// scale; stones fall slowly relative to their travel.
    pub fn gravity_multiplier(&self) -> f32 {
        0.2 * self.physics.speed_multiplier
    }

    /// Half of the world side length
    pub fn half_size(&self) -> f32 {
        self.world.size / 2.0
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.world.size <= 0.0 {
            return Err(ServerError::config("world size must be positive"));
        }
        if self.world.resolution < 2 {
            return Err(ServerError::config("terrain resolution must be at least 2"));
        }
        if self.world.gravity >= 0.0 {
            return Err(ServerError::config("gravity must be negative"));
        }
        if !(0.0..=1.0).contains(&self.world.shore_radius) || self.world.shore_radius == 0.0 {
            return Err(ServerError::config("shore radius must be in (0, 1]"));
        }
        if self.stone.max_count == 0 {
            return Err(ServerError::config("stone max count must be positive"));
        }
        if !(0.0..=1.0).contains(&self.stone.bounce) {
            return Err(ServerError::config("bounce must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.stone.friction) {
            return Err(ServerError::config("friction must be in [0, 1]"));
        }
        if self.stone.depth <= 0.0 {
            return Err(ServerError::config("stone depth must be positive"));
        }
        if self.tower.stones_per_level < 2 {
            return Err(ServerError::config("stones per level must be at least 2"));
        }
        if self.tower.base_radius <= 0.0 || self.tower.group_radius <= 0.0 {
            return Err(ServerError::config("tower radii must be positive"));
        }
        if self.physics.speed_multiplier <= 0.0 {
            return Err(ServerError::config("speed multiplier must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(GameConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_gravity_rejected() {
        let mut config = GameConfig::default();
        config.world.gravity = 9.8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_formation_threshold_rejected() {
        let mut config = GameConfig::default();
        config.tower.stones_per_level = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_gravity_multiplier_tracks_speed() {
        let config = GameConfig::default().with_physics(PhysicsConfig {
            speed_multiplier: 2.0,
        });
        assert!((config.gravity_multiplier() - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn test_camel_case_wire_shape() {
        let json = serde_json::to_value(StoneConfig::default()).unwrap();
        assert!(json.get("spawnIntervalMs").is_some());
        assert!(json.get("stopThreshold").is_some());
    }
}
