//! Typed events exchanged between peers over the relay

use serde::{Deserialize, Serialize};

use crate::relay::{ActorId, Payload};

/// A landed melee hit, sent by the attacker to the victim's owner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Round the attacker was fighting in when the hit landed
    pub round: u32,
    pub attacker: ActorId,
    pub victim: ActorId,
    pub damage: f32,
}

/// Death of a combatant, reported once by its owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathReport {
    pub round: u32,
    pub victim: ActorId,
    /// Attacker attributed on the killing hit
    pub attacker: ActorId,
}

/// Replicated combatant state, owner-authoritative
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombatantState {
    pub actor: ActorId,
    pub round: u32,
    pub x: f32,
    pub z: f32,
    pub facing: f32,
    pub health: f32,
    pub alive: bool,
}

/// Why a round was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveReason {
    /// A combatant reached zero health; the attacker scores
    Knockout,
    /// Exactly one combatant left alive
    LastStanding,
    /// Only one participant remains in the room
    Forfeit,
    /// No attributable winner; the round is replayed
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub actor: ActorId,
    pub score: u32,
}

/// Final outcome of a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchResult {
    Winner { actor: ActorId, score: u32 },
    Draw { tied: Vec<ActorId>, score: u32 },
}

impl MatchResult {
    /// Highest score wins; a shared highest score is a draw
    pub fn from_scores(scores: &[ScoreEntry]) -> Self {
        let best = scores.iter().map(|s| s.score).max().unwrap_or(0);
        let leaders: Vec<ActorId> = scores
            .iter()
            .filter(|s| s.score == best)
            .map(|s| s.actor)
            .collect();

        match leaders.as_slice() {
            [only] => MatchResult::Winner {
                actor: *only,
                score: best,
            },
            _ => MatchResult::Draw {
                tied: leaders,
                score: best,
            },
        }
    }
}

/// Everything peers say to each other
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameMessage {
    /// Authority: countdown for a round has begun
    RoundStarting { round: u32, countdown_ms: u64 },
    /// Authority: round is live; every owner resets its combatant
    RoundStarted { round: u32 },
    /// Authority: round is over; input is disabled until the next start
    RoundResolved {
        round: u32,
        winner: Option<ActorId>,
        reason: ResolveReason,
    },
    /// Authority: match is over
    MatchEnded {
        result: MatchResult,
        scores: Vec<ScoreEntry>,
    },
    /// Owner: attack animation trigger
    Attack { actor: ActorId, round: u32 },
    /// Attacker: hit landed on the victim
    Hit(Hit),
    /// Victim owner: life ended
    Died(DeathReport),
    /// Owner: periodic state replication
    State(CombatantState),
}

impl Payload for GameMessage {
    fn authority_only(&self) -> bool {
        matches!(
            self,
            GameMessage::RoundStarting { .. }
                | GameMessage::RoundStarted { .. }
                | GameMessage::RoundResolved { .. }
                | GameMessage::MatchEnded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(actor: u32, score: u32) -> ScoreEntry {
        ScoreEntry {
            actor: ActorId(actor),
            score,
        }
    }

    #[test]
    fn highest_score_wins() {
        let result = MatchResult::from_scores(&[entry(1, 2), entry(2, 1)]);
        assert_eq!(
            result,
            MatchResult::Winner {
                actor: ActorId(1),
                score: 2
            }
        );
    }

    #[test]
    fn tied_leaders_draw() {
        let result = MatchResult::from_scores(&[entry(1, 1), entry(2, 1), entry(3, 0)]);
        assert_eq!(
            result,
            MatchResult::Draw {
                tied: vec![ActorId(1), ActorId(2)],
                score: 1
            }
        );
    }

    #[test]
    fn round_control_is_authority_only() {
        assert!(GameMessage::RoundStarted { round: 1 }.authority_only());
        assert!(!GameMessage::Attack {
            actor: ActorId(1),
            round: 1
        }
        .authority_only());
    }

    #[test]
    fn messages_use_tagged_json() {
        let json = serde_json::to_value(GameMessage::RoundStarted { round: 2 }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "round_started", "round": 2}));
    }
}
