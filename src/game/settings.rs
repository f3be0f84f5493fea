//! Match tuning shared by every peer in a room

use std::time::Duration;

use super::spawn::ArenaLayout;

/// Rules every participant of a room agrees on
#[derive(Debug, Clone)]
pub struct MatchSettings {
    /// Rounds in a match
    pub total_rounds: u32,
    /// Participants needed before the first round is started
    pub min_players: usize,
    /// Health at spawn
    pub max_health: f32,
    /// Damage per landed hit
    pub attack_damage: f32,
    /// Minimum interval between attacks
    pub attack_cooldown: Duration,
    /// How long a swing can connect after the attack starts
    pub hit_window: Duration,
    /// Countdown between round announcement and round start
    pub countdown: Duration,
    /// Pause between round resolution and the next countdown
    pub round_end_delay: Duration,
    /// Delay before ending a forfeited match, so final scores replicate
    pub disconnect_grace: Duration,
    /// Movement speed in units per second
    pub move_speed: f32,
    pub arena: ArenaLayout,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            total_rounds: 3,
            min_players: 2,
            max_health: 100.0,
            attack_damage: 20.0,
            attack_cooldown: Duration::from_millis(500),
            hit_window: Duration::from_millis(300),
            countdown: Duration::from_secs(3),
            round_end_delay: Duration::from_secs(3),
            disconnect_grace: Duration::from_secs(1),
            move_speed: 6.0,
            arena: ArenaLayout::default(),
        }
    }
}
