//! Combatant movement and arena bounds

use serde::{Deserialize, Serialize};

/// Axis-aligned playable area on the ground plane
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArenaBounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_z: f32,
    pub max_z: f32,
}

impl ArenaBounds {
    pub fn contains(&self, x: f32, z: f32) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_z..=self.max_z).contains(&z)
    }

    pub fn clamp(&self, x: f32, z: f32) -> (f32, f32) {
        (x.clamp(self.min_x, self.max_x), z.clamp(self.min_z, self.max_z))
    }

    /// Bounds with inverted or non-finite edges cannot be sampled from
    pub fn is_valid(&self) -> bool {
        [self.min_x, self.max_x, self.min_z, self.max_z]
            .iter()
            .all(|v| v.is_finite())
            && self.min_x < self.max_x
            && self.min_z < self.max_z
    }
}

impl Default for ArenaBounds {
    fn default() -> Self {
        Self {
            min_x: -20.0,
            max_x: 20.0,
            min_z: -20.0,
            max_z: 20.0,
        }
    }
}

/// Kinematic movement for melee combatants
pub struct MovementSystem;

impl MovementSystem {
    /// Advance a combatant by one tick of stick input.
    /// Returns (new_x, new_z, new_facing)
    pub fn step(
        x: f32,
        z: f32,
        facing: f32,
        move_x: f32,
        move_z: f32,
        speed: f32,
        dt: f32,
        bounds: &ArenaBounds,
    ) -> (f32, f32, f32) {
        if !move_x.is_finite() || !move_z.is_finite() {
            return (x, z, facing);
        }

        // Diagonals are no faster than straight lines
        let len = (move_x * move_x + move_z * move_z).sqrt();
        if len < 1e-3 {
            return (x, z, facing);
        }
        let scale = if len > 1.0 { 1.0 / len } else { 1.0 };
        let dir_x = move_x * scale;
        let dir_z = move_z * scale;

        let (new_x, new_z) = bounds.clamp(x + dir_x * speed * dt, z + dir_z * speed * dt);
        let new_facing = dir_x.atan2(dir_z).rem_euclid(std::f32::consts::TAU);

        (new_x, new_z, new_facing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagonal_input_is_normalized() {
        let bounds = ArenaBounds::default();
        let (x, z, _) = MovementSystem::step(0.0, 0.0, 0.0, 1.0, 1.0, 10.0, 1.0, &bounds);
        let dist = (x * x + z * z).sqrt();
        assert!((dist - 10.0).abs() < 1e-3);
    }

    #[test]
    fn movement_is_clamped_to_bounds() {
        let bounds = ArenaBounds::default();
        let (x, z, _) = MovementSystem::step(19.0, 0.0, 0.0, 1.0, 0.0, 10.0, 1.0, &bounds);
        assert_eq!((x, z), (20.0, 0.0));
    }

    #[test]
    fn idle_input_keeps_facing() {
        let bounds = ArenaBounds::default();
        let out = MovementSystem::step(1.0, 2.0, 0.5, 0.0, 0.0, 10.0, 1.0, &bounds);
        assert_eq!(out, (1.0, 2.0, 0.5));
        let nan = MovementSystem::step(1.0, 2.0, 0.5, f32::NAN, 0.0, 10.0, 1.0, &bounds);
        assert_eq!(nan, (1.0, 2.0, 0.5));
    }

    #[test]
    fn inverted_bounds_are_invalid() {
        let bounds = ArenaBounds {
            min_x: 5.0,
            max_x: -5.0,
            ..ArenaBounds::default()
        };
        assert!(!bounds.is_valid());
        assert!(ArenaBounds::default().is_valid());
    }
}
