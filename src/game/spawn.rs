//! Spawn point selection

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::movement::ArenaBounds;

/// Fixed spawn location with initial facing (radians)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub x: f32,
    pub z: f32,
    #[serde(default)]
    pub facing: f32,
}

/// Arena layout loaded from the `arena` asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaLayout {
    #[serde(default)]
    pub spawn_points: Vec<SpawnPoint>,
    /// Playable area; also the fallback spawn region when no points exist
    #[serde(default)]
    pub bounds: ArenaBounds,
}

impl Default for ArenaLayout {
    fn default() -> Self {
        Self {
            spawn_points: Vec::new(),
            bounds: ArenaBounds::default(),
        }
    }
}

impl ArenaLayout {
    /// Pick a spawn uniformly from the configured set, or uniformly inside the
    /// bounds when the set is empty
    pub fn pick_spawn<R: Rng>(&self, rng: &mut R) -> SpawnPoint {
        if !self.spawn_points.is_empty() {
            let idx = rng.gen_range(0..self.spawn_points.len());
            return self.spawn_points[idx];
        }

        let b = &self.bounds;
        SpawnPoint {
            x: rng.gen_range(b.min_x..=b.max_x),
            z: rng.gen_range(b.min_z..=b.max_z),
            facing: rng.gen_range(0.0..std::f32::consts::TAU),
        }
    }
}
