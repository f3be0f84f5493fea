//! State replication cadence and snapshot building

use std::collections::BTreeMap;

use crate::relay::ActorId;
use crate::ws::protocol::ServerMsg;

use super::coordinator::RoundPhase;
use super::messages::CombatantState;

/// Decides which simulation ticks carry a full state sync
pub struct SyncScheduler {
    /// Tick counter since last sync
    ticks_since_sync: u32,
    /// Sync interval in ticks
    sync_interval: u32,
}

impl SyncScheduler {
    pub fn new(sync_interval: u32) -> Self {
        Self {
            ticks_since_sync: 0,
            sync_interval: sync_interval.max(1),
        }
    }

    /// Check if it's time to sync
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_sync += 1;
        if self.ticks_since_sync >= self.sync_interval {
            self.ticks_since_sync = 0;
            true
        } else {
            false
        }
    }

    /// Force a sync on the next check (deaths and resets)
    pub fn force_next(&mut self) {
        self.ticks_since_sync = self.sync_interval;
    }
}

/// Build the snapshot a peer shows its own client
pub fn build_snapshot(
    tick: u64,
    round: u32,
    phase: RoundPhase,
    own: CombatantState,
    observed: &BTreeMap<ActorId, CombatantState>,
) -> ServerMsg {
    let mut combatants = Vec::with_capacity(observed.len() + 1);
    combatants.push(own);
    combatants.extend(observed.values().filter(|s| s.actor != own.actor).copied());

    ServerMsg::Snapshot {
        tick,
        round,
        phase,
        combatants,
    }
}
