//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::MatchSettings;
use crate::rooms::RoomRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub rooms: Arc<RoomRegistry>,
}

impl AppState {
    pub fn new(config: Config, settings: MatchSettings) -> Self {
        let config = Arc::new(config);
        let rooms = Arc::new(RoomRegistry::new(
            Arc::new(settings),
            config.max_players_per_room,
        ));

        Self { config, rooms }
    }
}
