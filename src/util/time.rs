//! Time utilities for the simulation loops

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::time::Instant as TokioInstant;

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick rate configuration
pub const SIMULATION_TPS: u32 = 30; // input sampling and local simulation
pub const SYNC_TPS: u32 = 10; // full combatant state replication

/// Calculate delta time for movement (in seconds)
pub fn tick_delta() -> f32 {
    1.0 / SIMULATION_TPS as f32
}

/// Duration of one simulation tick
pub fn tick_duration() -> Duration {
    Duration::from_micros(1_000_000 / SIMULATION_TPS as u64)
}

/// Monotonic session clock. Game logic works on offsets from session start so
/// it can be driven with synthetic time in tests. Follows the tokio clock,
/// so a paused runtime pauses the session too.
#[derive(Debug, Clone)]
pub struct SessionClock {
    start: TokioInstant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: TokioInstant::now(),
        }
    }

    /// Time elapsed since the session started
    pub fn now(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a duration to whole milliseconds for the wire
pub fn as_millis(d: Duration) -> u64 {
    d.as_millis().min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_rate_is_below_simulation_rate() {
        assert!(SYNC_TPS < SIMULATION_TPS);
        assert_eq!(SIMULATION_TPS % SYNC_TPS, 0);
    }

    #[test]
    fn tick_duration_matches_delta() {
        let secs = tick_duration().as_secs_f32();
        assert!((secs - tick_delta()).abs() < 1e-4);
    }
}
