//! Island heightfield terrain
//!
//! ## Table of Contents
//! - **Terrain**: Immutable square heightfield with bilinear lookup
//! - **slope sampling**: Finite-difference gradient for rolling stones
//!
//! The island is a sine-product heightfield attenuated toward the map edge
//! so the coast falls away into water on all four sides. Heights are baked
//! once at startup; every later query is pure interpolation.

use crate::config::WorldConfig;
use glam::Vec2;

/// Sample distance for finite-difference slope estimation, in world units.
const SLOPE_SAMPLE_DISTANCE: f32 = 2.0;

/// Immutable heightfield over the square island.
#[derive(Debug, Clone)]
pub struct Terrain {
    size: f32,
    resolution: usize,
    heights: Vec<f32>,
}

impl Terrain {
    /// Bake the heightfield from the world configuration.
    pub fn generate(world: &WorldConfig) -> Self {
        let n = world.resolution;
        let mut heights = vec![0.0; n * n];

        for i in 0..n {
            for j in 0..n {
                // Normalized grid coordinates in [-1, 1]
                let nx = (i as f32 / (n - 1) as f32) * 2.0 - 1.0;
                let ny = (j as f32 / (n - 1) as f32) * 2.0 - 1.0;

                let edge = (1.0 - nx.abs().max(ny.abs()).powf(world.edge_falloff)).max(0.0);
                let raw = (i as f32 / world.terrain_x_scale).sin()
                    * (j as f32 / world.terrain_y_scale).sin()
                    * world.max_terrain_height
                    * edge;

                heights[i * n + j] = raw.max(world.min_terrain_height);
            }
        }

        Self {
            size: world.size,
            resolution: n,
            heights,
        }
    }

    /// Terrain side length in world units.
    pub fn size(&self) -> f32 {
        self.size
    }

    /// Interpolated terrain height at world coordinates `(x, z)`.
    ///
    /// Coordinates outside the grid yield 0. The grid is indexed with x
    /// and z swapped; the deployed client samples its heightmap the same
    /// way, and the two must agree or stones rest above/below the visible
    /// ground. Keep the swap until the client changes.
    pub fn height(&self, x: f32, z: f32) -> f32 {
        let n = self.resolution;
        let last = (n - 1) as f32;

        // x/z swap: the first grid axis is driven by z, the second by x.
        let gi = (z / self.size + 0.5) * last;
        let gj = (x / self.size + 0.5) * last;

        if gi < 0.0 || gj < 0.0 || gi > last || gj > last {
            return 0.0;
        }

        let i0 = (gi.floor() as usize).min(n - 2);
        let j0 = (gj.floor() as usize).min(n - 2);
        let fi = gi - i0 as f32;
        let fj = gj - j0 as f32;

        let h00 = self.heights[i0 * n + j0];
        let h01 = self.heights[i0 * n + j0 + 1];
        let h10 = self.heights[(i0 + 1) * n + j0];
        let h11 = self.heights[(i0 + 1) * n + j0 + 1];

        let top = h00 * (1.0 - fj) + h01 * fj;
        let bottom = h10 * (1.0 - fj) + h11 * fj;
        top * (1.0 - fi) + bottom * fi
    }

    /// Finite-difference terrain gradient at `(x, z)`.
    ///
    /// Returns `(slope_x, slope_z)`: positive components point downhill,
    /// so the vector can be added to a velocity directly.
    pub fn slope(&self, x: f32, z: f32) -> Vec2 {
        let d = SLOPE_SAMPLE_DISTANCE;
        let west = self.height(x - d, z);
        let east = self.height(x + d, z);
        let north = self.height(x, z - d);
        let south = self.height(x, z + d);

        Vec2::new((west - east) / (2.0 * d), (north - south) / (2.0 * d))
    }
}
