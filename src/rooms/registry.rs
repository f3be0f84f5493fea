//! Room registry - creates rooms on first join and closes them when empty

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::game::coordinator::{MatchRecord, RoundPhase, MATCH_PROPERTY};
use crate::game::{GameMessage, MatchSettings, Peer, PeerHandle};
use crate::relay::{ActorId, Relay};

use super::{validate_room_name, RoomError};

/// Handle to a live room
#[derive(Clone)]
pub struct RoomHandle {
    pub name: String,
    /// Unique per room lifetime; a reopened name gets a new session
    pub session_id: Uuid,
    pub relay: Relay<GameMessage>,
    pub created_at: DateTime<Utc>,
}

impl RoomHandle {
    fn new(name: &str, capacity: usize) -> Self {
        Self {
            name: name.to_string(),
            session_id: Uuid::new_v4(),
            relay: Relay::new(name, capacity),
            created_at: Utc::now(),
        }
    }

    pub fn player_count(&self) -> usize {
        self.relay.member_count()
    }

    /// Match record as last published by the room authority
    pub fn match_record(&self) -> Option<MatchRecord> {
        let value = self.relay.room_property(MATCH_PROPERTY)?;
        serde_json::from_value(value).ok()
    }

    pub fn summary(&self) -> RoomSummary {
        let record = self.match_record();
        RoomSummary {
            name: self.name.clone(),
            session_id: self.session_id,
            players: self.relay.members(),
            capacity: self.relay.capacity(),
            authority: self.relay.authority(),
            round: record.as_ref().map(|r| r.current_round).unwrap_or(0),
            total_rounds: record.as_ref().map(|r| r.total_rounds),
            phase: record.map(|r| r.phase).unwrap_or(RoundPhase::Lobby),
            created_at: self.created_at,
        }
    }
}

/// Public view of a room
#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary {
    pub name: String,
    pub session_id: Uuid,
    pub players: Vec<ActorId>,
    pub capacity: usize,
    pub authority: Option<ActorId>,
    pub round: u32,
    pub total_rounds: Option<u32>,
    pub phase: RoundPhase,
    pub created_at: DateTime<Utc>,
}

/// Registry of active rooms
pub struct RoomRegistry {
    rooms: DashMap<String, RoomHandle>,
    max_players: usize,
    settings: Arc<MatchSettings>,
}

impl RoomRegistry {
    pub fn new(settings: Arc<MatchSettings>, max_players: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            max_players,
            settings,
        }
    }

    pub fn settings(&self) -> &Arc<MatchSettings> {
        &self.settings
    }

    /// Join (or open) a room and start a peer task for the new member
    pub fn join(self: &Arc<Self>, name: &str) -> Result<PeerHandle, RoomError> {
        validate_room_name(name)?;

        // Join under the map entry so a concurrent close can't orphan us
        let endpoint = {
            let entry = self.rooms.entry(name.to_string()).or_insert_with(|| {
                info!(room = %name, capacity = self.max_players, "Room opened");
                RoomHandle::new(name, self.max_players)
            });
            entry.relay.join()
        };

        let endpoint = match endpoint {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!(room = %name, error = %e, "Room join rejected");
                self.release(name);
                return Err(e.into());
            }
        };

        let (peer, handle) = Peer::new(endpoint, self.settings.clone(), rand::random());
        let registry = Arc::clone(self);
        let room = name.to_string();
        tokio::spawn(async move {
            peer.run().await;
            registry.release(&room);
        });

        Ok(handle)
    }

    /// Close the room if nobody is left in it
    pub fn release(&self, name: &str) {
        if let Some((_, handle)) = self
            .rooms
            .remove_if(name, |_, handle| handle.player_count() == 0)
        {
            info!(room = %name, session_id = %handle.session_id, "Room closed");
        }
    }

    pub fn get(&self, name: &str) -> Option<RoomHandle> {
        self.rooms.get(name).map(|r| r.value().clone())
    }

    pub fn list(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<RoomSummary> = self.rooms.iter().map(|r| r.value().summary()).collect();
        rooms.sort_by(|a, b| a.name.cmp(&b.name));
        rooms
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn total_players(&self) -> usize {
        self.rooms.iter().map(|r| r.value().player_count()).sum()
    }
}
