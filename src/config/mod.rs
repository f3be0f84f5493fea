//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::game::settings::MatchSettings;
use crate::game::spawn::ArenaLayout;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub log_json: bool,
    /// Allowed client origins for CORS, comma-separated; `*` allows any
    pub client_origin: String,

    /// Relay capacity per room
    pub max_players_per_room: usize,

    pub total_rounds: u32,
    pub min_players: usize,
    pub max_health: f32,
    pub attack_damage: f32,
    pub attack_cooldown: Duration,
    pub hit_window: Duration,
    pub countdown: Duration,
    pub round_end_delay: Duration,
    pub disconnect_grace: Duration,
    pub move_speed: f32,

    /// Directory holding JSON assets
    pub assets_dir: PathBuf,
    /// Arena layout asset name (without extension)
    pub arena_name: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let config = Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("LOG_FORMAT")
                .map(|f| f.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),

            max_players_per_room: parse_var("MAX_PLAYERS_PER_ROOM", 8)?,

            total_rounds: parse_var("TOTAL_ROUNDS", 3)?,
            min_players: parse_var("MIN_PLAYERS", 2)?,
            max_health: parse_var("MAX_HEALTH", 100.0)?,
            attack_damage: parse_var("ATTACK_DAMAGE", 20.0)?,
            attack_cooldown: millis_var("ATTACK_COOLDOWN_MS", 500)?,
            hit_window: millis_var("HIT_WINDOW_MS", 300)?,
            countdown: millis_var("COUNTDOWN_MS", 3000)?,
            round_end_delay: millis_var("ROUND_END_DELAY_MS", 3000)?,
            disconnect_grace: millis_var("DISCONNECT_GRACE_MS", 1000)?,
            move_speed: parse_var("MOVE_SPEED", 6.0)?,

            assets_dir: env::var("ASSETS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("assets")),
            arena_name: env::var("ARENA_NAME").unwrap_or_else(|_| "arena".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.total_rounds == 0 {
            return Err(ConfigError::Invalid("TOTAL_ROUNDS", "must be at least 1".into()));
        }
        if self.min_players < 2 {
            return Err(ConfigError::Invalid("MIN_PLAYERS", "must be at least 2".into()));
        }
        if self.max_players_per_room < self.min_players {
            return Err(ConfigError::Invalid(
                "MAX_PLAYERS_PER_ROOM",
                "must not be below MIN_PLAYERS".into(),
            ));
        }
        if !(self.max_health.is_finite() && self.max_health > 0.0) {
            return Err(ConfigError::Invalid("MAX_HEALTH", "must be positive".into()));
        }
        if !(self.attack_damage.is_finite() && self.attack_damage > 0.0) {
            return Err(ConfigError::Invalid("ATTACK_DAMAGE", "must be positive".into()));
        }
        if !(self.move_speed.is_finite() && self.move_speed >= 0.0) {
            return Err(ConfigError::Invalid("MOVE_SPEED", "must not be negative".into()));
        }
        Ok(())
    }

    /// Match rules for new rooms, using the loaded arena
    pub fn match_settings(&self, arena: ArenaLayout) -> MatchSettings {
        MatchSettings {
            total_rounds: self.total_rounds,
            min_players: self.min_players,
            max_health: self.max_health,
            attack_damage: self.attack_damage,
            attack_cooldown: self.attack_cooldown,
            hit_window: self.hit_window,
            countdown: self.countdown,
            round_end_delay: self.round_end_delay,
            disconnect_grace: self.disconnect_grace,
            move_speed: self.move_speed,
            arena,
        }
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(key, format!("cannot parse {raw:?}"))),
        Err(_) => Ok(default),
    }
}

fn millis_var(key: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    parse_var(key, default_ms).map(Duration::from_millis)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    // Keys below are unique to each test so parallel tests don't collide

    #[test]
    fn unset_variable_uses_default() {
        assert_eq!(parse_var::<u32>("ARENA_TEST_UNSET_ROUNDS", 3).unwrap(), 3);
    }

    #[test]
    fn set_variable_is_parsed() {
        env::set_var("ARENA_TEST_COUNTDOWN_MS", " 1500 ");
        assert_eq!(
            millis_var("ARENA_TEST_COUNTDOWN_MS", 3000).unwrap(),
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn garbage_is_rejected() {
        env::set_var("ARENA_TEST_BAD_HEALTH", "lots");
        let err = parse_var::<f32>("ARENA_TEST_BAD_HEALTH", 100.0).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("ARENA_TEST_BAD_HEALTH", _)));
    }

    #[test]
    fn match_settings_carry_config_values() {
        let config = Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "info".into(),
            log_json: false,
            client_origin: "*".into(),
            max_players_per_room: 4,
            total_rounds: 5,
            min_players: 2,
            max_health: 50.0,
            attack_damage: 10.0,
            attack_cooldown: Duration::from_millis(250),
            hit_window: Duration::from_millis(200),
            countdown: Duration::from_secs(1),
            round_end_delay: Duration::from_secs(2),
            disconnect_grace: Duration::from_millis(500),
            move_speed: 4.0,
            assets_dir: PathBuf::from("assets"),
            arena_name: "arena".into(),
        };
        assert!(config.validate().is_ok());

        let settings = config.match_settings(ArenaLayout::default());
        assert_eq!(settings.total_rounds, 5);
        assert_eq!(settings.max_health, 50.0);
        assert_eq!(settings.countdown, Duration::from_secs(1));

        let bad = Config {
            min_players: 1,
            ..config
        };
        assert!(bad.validate().is_err());
    }
}
