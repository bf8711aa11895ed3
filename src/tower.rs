//! Towers
//!
//! ## Table of Contents
//! - **Tower**: Stationary leveled structure at a fixed ground position
//!
//! Towers are created and destroyed exclusively by the rules in the tick
//! loop and by the destack handler; they never move.

use crate::types::TowerId;
use glam::{Vec3, Vec3Swizzles};

/// A stationary tower.
#[derive(Debug, Clone)]
pub struct Tower {
    /// Stable identity, allocated by the world
    pub id: TowerId,
    /// Ground position of the tower base
    pub position: Vec3,
    /// Current level, always at least 1
    pub level: u32,
}

impl Tower {
    /// Create a level-1 tower at the given ground position.
    pub fn new(id: TowerId, position: Vec3) -> Self {
        Self {
            id,
            position,
            level: 1,
        }
    }

    /// Altitude of the tower top.
    ///
    /// Each level stands four stone blocks tall.
    pub fn top_height(&self, stone_depth: f32) -> f32 {
        self.position.y + self.level as f32 * 4.0 * stone_depth
    }

    /// Horizontal distance from a world point to the tower center.
    pub fn horizontal_distance(&self, point: Vec3) -> f32 {
        (point.xz() - self.position.xz()).length()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_height_scales_with_level() {
        let mut tower = Tower::new(TowerId::new(1), Vec3::new(0.0, 2.0, 0.0));
        assert!((tower.top_height(0.5) - 4.0).abs() < 1e-5);
        tower.level = 3;
        assert!((tower.top_height(0.5) - 8.0).abs() < 1e-5);
    }

    #[test]
    fn test_horizontal_distance_ignores_height() {
        let tower = Tower::new(TowerId::new(1), Vec3::new(0.0, 5.0, 0.0));
        let d = tower.horizontal_distance(Vec3::new(3.0, 50.0, 4.0));
        assert!((d - 5.0).abs() < 1e-5);
    }
}
