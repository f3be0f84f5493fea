//! Relay room and member endpoints

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{ActorId, Payload, Properties, RelayError, RelayEvent, RoomSnapshot, Target};

struct Member<M> {
    tx: mpsc::UnboundedSender<RelayEvent<M>>,
}

/// Everything a room owns. All mutation happens under one lock, and every
/// event is pushed to member channels while it is held, so all members
/// observe the same order.
struct RoomState<M> {
    next_actor: u32,
    members: BTreeMap<ActorId, Member<M>>,
    authority: Option<ActorId>,
    room_properties: Properties,
    player_properties: BTreeMap<ActorId, Properties>,
}

impl<M: Payload> RoomState<M> {
    fn push(&self, to: ActorId, event: RelayEvent<M>) {
        if let Some(member) = self.members.get(&to) {
            if member.tx.send(event).is_err() {
                debug!(actor = %to, "Member channel closed, dropping event");
            }
        }
    }

    fn broadcast(&self, event: RelayEvent<M>, except: Option<ActorId>) {
        for (actor, member) in &self.members {
            if Some(*actor) == except {
                continue;
            }
            if member.tx.send(event.clone()).is_err() {
                debug!(actor = %actor, "Member channel closed, dropping event");
            }
        }
    }

    fn require_member(&self, actor: ActorId) -> Result<(), RelayError> {
        if self.members.contains_key(&actor) {
            Ok(())
        } else {
            Err(RelayError::UnknownActor(actor))
        }
    }

    fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            members: self.members.keys().copied().collect(),
            authority: self.authority,
            room_properties: self.room_properties.clone(),
            player_properties: self.player_properties.clone(),
        }
    }
}

/// A relay room shared by all of its members
#[derive(Clone)]
pub struct Relay<M> {
    name: Arc<str>,
    capacity: usize,
    state: Arc<Mutex<RoomState<M>>>,
}

impl<M: Payload> Relay<M> {
    pub fn new(name: impl Into<Arc<str>>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            state: Arc::new(Mutex::new(RoomState {
                next_actor: 0,
                members: BTreeMap::new(),
                authority: None,
                room_properties: Properties::new(),
                player_properties: BTreeMap::new(),
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Join the room. The first member of an empty room becomes authority.
    pub fn join(&self) -> Result<RelayEndpoint<M>, RelayError> {
        let mut state = self.state.lock();

        if state.members.len() >= self.capacity {
            return Err(RelayError::RoomFull {
                room: self.name.to_string(),
                capacity: self.capacity,
            });
        }

        state.next_actor += 1;
        let actor = ActorId(state.next_actor);
        let (tx, rx) = mpsc::unbounded_channel();

        state.broadcast(RelayEvent::MemberJoined { actor }, None);
        state.members.insert(actor, Member { tx });
        state.player_properties.insert(actor, Properties::new());

        if state.authority.is_none() {
            state.authority = Some(actor);
            info!(room = %self.name, actor = %actor, "Authority assigned");
        }

        let snapshot = state.snapshot();
        info!(
            room = %self.name,
            actor = %actor,
            members = state.members.len(),
            "Member joined relay room"
        );

        Ok(RelayEndpoint {
            actor,
            relay: self.clone(),
            rx,
            snapshot,
            left: false,
        })
    }

    pub fn member_count(&self) -> usize {
        self.state.lock().members.len()
    }

    pub fn members(&self) -> Vec<ActorId> {
        self.state.lock().members.keys().copied().collect()
    }

    pub fn authority(&self) -> Option<ActorId> {
        self.state.lock().authority
    }

    pub fn room_property(&self, key: &str) -> Option<serde_json::Value> {
        self.state.lock().room_properties.get(key).cloned()
    }

    pub fn player_property(&self, actor: ActorId, key: &str) -> Option<serde_json::Value> {
        self.state
            .lock()
            .player_properties
            .get(&actor)
            .and_then(|props| props.get(key).cloned())
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        self.state.lock().snapshot()
    }

    fn leave(&self, actor: ActorId) {
        let mut state = self.state.lock();
        if state.members.remove(&actor).is_none() {
            return;
        }
        state.player_properties.remove(&actor);
        state.broadcast(RelayEvent::MemberLeft { actor }, None);

        info!(
            room = %self.name,
            actor = %actor,
            members = state.members.len(),
            "Member left relay room"
        );

        if state.authority == Some(actor) {
            // Lowest remaining actor number takes over.
            state.authority = state.members.keys().next().copied();
            match state.authority {
                Some(next) => {
                    info!(room = %self.name, from = %actor, to = %next, "Authority migrated");
                    state.broadcast(RelayEvent::AuthorityChanged { authority: next }, None);
                }
                None => debug!(room = %self.name, "Room empty, no authority"),
            }
        }
    }

    fn send(&self, from: ActorId, target: Target, payload: M) -> Result<(), RelayError> {
        let state = self.state.lock();
        state.require_member(from)?;

        if payload.authority_only() && state.authority != Some(from) {
            warn!(room = %self.name, actor = %from, "Rejected authority message from non-authority");
            return Err(RelayError::NotAuthority(from));
        }

        let event = RelayEvent::Message { from, payload };
        match target {
            Target::All => state.broadcast(event, None),
            Target::Others => state.broadcast(event, Some(from)),
            Target::Actor(to) => {
                state.require_member(to)?;
                state.push(to, event);
            }
            Target::Authority => {
                let to = state.authority.ok_or(RelayError::NoAuthority)?;
                state.push(to, event);
            }
        }
        Ok(())
    }

    fn set_player_property(
        &self,
        from: ActorId,
        actor: ActorId,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), RelayError> {
        let mut state = self.state.lock();
        state.require_member(from)?;
        state.require_member(actor)?;
        if from != actor && state.authority != Some(from) {
            return Err(RelayError::NotAuthority(from));
        }

        state
            .player_properties
            .entry(actor)
            .or_default()
            .insert(key.to_string(), value.clone());
        state.broadcast(
            RelayEvent::PlayerPropertyChanged {
                actor,
                key: key.to_string(),
                value,
            },
            None,
        );
        Ok(())
    }

    fn set_room_property(
        &self,
        from: ActorId,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), RelayError> {
        let mut state = self.state.lock();
        state.require_member(from)?;
        if state.authority != Some(from) {
            return Err(RelayError::NotAuthority(from));
        }

        state.room_properties.insert(key.to_string(), value.clone());
        state.broadcast(
            RelayEvent::RoomPropertyChanged {
                key: key.to_string(),
                value,
            },
            None,
        );
        Ok(())
    }

    fn transfer_authority(&self, from: ActorId, to: ActorId) -> Result<(), RelayError> {
        let mut state = self.state.lock();
        if state.authority != Some(from) {
            return Err(RelayError::NotAuthority(from));
        }
        state.require_member(to)?;
        if from == to {
            return Ok(());
        }

        state.authority = Some(to);
        info!(room = %self.name, from = %from, to = %to, "Authority transferred");
        state.broadcast(RelayEvent::AuthorityChanged { authority: to }, None);
        Ok(())
    }
}

/// One member's connection to a relay room. Dropping it leaves the room.
pub struct RelayEndpoint<M: Payload> {
    actor: ActorId,
    relay: Relay<M>,
    rx: mpsc::UnboundedReceiver<RelayEvent<M>>,
    snapshot: RoomSnapshot,
    left: bool,
}

impl<M: Payload> RelayEndpoint<M> {
    pub fn actor(&self) -> ActorId {
        self.actor
    }

    pub fn room(&self) -> &str {
        self.relay.name()
    }

    /// Room state at the moment this member joined
    pub fn welcome(&self) -> &RoomSnapshot {
        &self.snapshot
    }

    pub fn send(&self, target: Target, payload: M) -> Result<(), RelayError> {
        self.relay.send(self.actor, target, payload)
    }

    pub async fn recv(&mut self) -> Option<RelayEvent<M>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<RelayEvent<M>> {
        self.rx.try_recv().ok()
    }

    pub fn set_player_property(
        &self,
        actor: ActorId,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), RelayError> {
        self.relay.set_player_property(self.actor, actor, key, value)
    }

    pub fn set_room_property(&self, key: &str, value: serde_json::Value) -> Result<(), RelayError> {
        self.relay.set_room_property(self.actor, key, value)
    }

    pub fn transfer_authority(&self, to: ActorId) -> Result<(), RelayError> {
        self.relay.transfer_authority(self.actor, to)
    }

    pub fn leave(mut self) {
        self.left = true;
        self.relay.leave(self.actor);
    }
}

impl<M: Payload> Drop for RelayEndpoint<M> {
    fn drop(&mut self) {
        if !self.left {
            self.relay.leave(self.actor);
        }
    }
}
