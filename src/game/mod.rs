//! Game simulation modules

pub mod combatant;
pub mod coordinator;
pub mod messages;
pub mod movement;
pub mod peer;
pub mod settings;
pub mod spawn;
pub mod sync;

pub use combatant::{Combatant, HitOutcome};
pub use coordinator::{MatchRecord, RoundCoordinator, RoundPhase};
pub use messages::GameMessage;
pub use peer::{Peer, PeerHandle};
pub use settings::MatchSettings;
