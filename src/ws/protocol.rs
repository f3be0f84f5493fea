//! WebSocket protocol message definitions
//! These are the wire types between a client and its peer

use serde::{Deserialize, Serialize};

use crate::game::coordinator::RoundPhase;
use crate::game::messages::{CombatantState, MatchResult, ResolveReason, ScoreEntry};
use crate::game::spawn::SpawnPoint;
use crate::relay::ActorId;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Movement input, held until the next input message
    Input {
        /// Sequence number for client-side prediction reconciliation
        seq: u32,
        /// Strafe axis (-1.0 .. 1.0)
        move_x: f32,
        /// Forward axis (-1.0 .. 1.0)
        move_z: f32,
    },

    /// Attack trigger
    Attack,

    /// Physics contact between this client's swing and another combatant
    HitDetected { victim: ActorId },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Leave the room
    Leave,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after joining a room
    Welcome {
        actor: ActorId,
        room: String,
        authority: Option<ActorId>,
        round: u32,
        phase: RoundPhase,
        server_time: u64,
    },

    PlayerJoined {
        actor: ActorId,
    },

    PlayerLeft {
        actor: ActorId,
    },

    AuthorityChanged {
        authority: ActorId,
    },

    /// Countdown to the next round
    RoundStarting {
        round: u32,
        countdown_ms: u64,
    },

    /// Round is live; the client's combatant was reset to `spawn`
    RoundStarted {
        round: u32,
        spawn: SpawnPoint,
    },

    RoundResolved {
        round: u32,
        winner: Option<ActorId>,
        reason: ResolveReason,
    },

    MatchEnded {
        result: MatchResult,
        scores: Vec<ScoreEntry>,
    },

    /// Another combatant swung (animation trigger)
    Attack {
        actor: ActorId,
    },

    /// This client's combatant took a hit
    Damaged {
        victim: ActorId,
        attacker: ActorId,
        health: f32,
    },

    Died {
        victim: ActorId,
        attacker: ActorId,
    },

    ScoreChanged {
        actor: ActorId,
        score: u32,
    },

    /// Combatant states (sent at the sync rate)
    Snapshot {
        /// Peer tick number
        tick: u64,
        round: u32,
        phase: RoundPhase,
        /// The client's own combatant first
        combatants: Vec<CombatantState>,
    },

    /// Error message
    Error {
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

impl ServerMsg {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMsg::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_client_input() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"input","seq":4,"move_x":0.5,"move_z":-1.0}"#).unwrap();
        match msg {
            ClientMsg::Input { seq, move_x, move_z } => {
                assert_eq!(seq, 4);
                assert_eq!(move_x, 0.5);
                assert_eq!(move_z, -1.0);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn parses_hit_detected_with_plain_actor_number() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"hit_detected","victim":3}"#).unwrap();
        assert!(matches!(msg, ClientMsg::HitDetected { victim } if victim == ActorId(3)));
    }

    #[test]
    fn serializes_round_resolved() {
        let json = serde_json::to_value(ServerMsg::RoundResolved {
            round: 2,
            winner: Some(ActorId(1)),
            reason: ResolveReason::Knockout,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "round_resolved",
                "round": 2,
                "winner": 1,
                "reason": "knockout"
            })
        );
    }
}
