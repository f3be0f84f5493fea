//! In-process relay: ordered delivery, membership and authority arbitration
//!
//! A relay room is the session transport every participant talks through.
//! It assigns actor numbers in join order, designates exactly one authority,
//! re-designates on authority loss, fans messages out in a single total order
//! and stores per-player and per-room properties with change notification.

mod room;

pub use room::{Relay, RelayEndpoint};

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Relay-assigned participant number, strictly increasing in join order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub u32);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Custom property table (player or room scoped)
pub type Properties = BTreeMap<String, serde_json::Value>;

/// Anything the relay carries between participants
pub trait Payload: Clone + Send + 'static {
    /// Whether only the current authority may originate this message
    fn authority_only(&self) -> bool;
}

/// Delivery target for a relayed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every member, sender included
    All,
    /// Every member except the sender
    Others,
    /// A single member
    Actor(ActorId),
    /// The current authority
    Authority,
}

/// Events delivered to a member, in room order
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent<M> {
    MemberJoined {
        actor: ActorId,
    },
    MemberLeft {
        actor: ActorId,
    },
    AuthorityChanged {
        authority: ActorId,
    },
    Message {
        from: ActorId,
        payload: M,
    },
    PlayerPropertyChanged {
        actor: ActorId,
        key: String,
        value: serde_json::Value,
    },
    RoomPropertyChanged {
        key: String,
        value: serde_json::Value,
    },
}

/// Room state as seen by a member at the instant it joined. Every event the
/// member receives afterwards happened after this snapshot.
#[derive(Debug, Clone, Default)]
pub struct RoomSnapshot {
    pub members: Vec<ActorId>,
    pub authority: Option<ActorId>,
    pub room_properties: Properties,
    pub player_properties: BTreeMap<ActorId, Properties>,
}

/// Relay errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("Room {room} is full ({capacity} players)")]
    RoomFull { room: String, capacity: usize },

    #[error("Actor {0} is not a member of this room")]
    UnknownActor(ActorId),

    #[error("Actor {0} is not the room authority")]
    NotAuthority(ActorId),

    #[error("Room has no authority")]
    NoAuthority,
}
