//! One participant's session loop
//!
//! A peer owns its combatant (write-authoritative for position, health and
//! alive), mirrors everyone else's, and runs a [`RoundCoordinator`] that
//! drives the match while this peer holds relay authority and mirrors it
//! otherwise.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::relay::{ActorId, RelayEndpoint, RelayEvent, Target};
use crate::util::time::{tick_delta, tick_duration, unix_millis, SessionClock, SIMULATION_TPS, SYNC_TPS};
use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::combatant::{Combatant, HitOutcome};
use super::coordinator::{Directive, MatchRecord, RoundCoordinator, MATCH_PROPERTY, SCORE_PROPERTY};
use super::messages::{CombatantState, GameMessage, Hit};
use super::settings::MatchSettings;
use super::sync::{build_snapshot, SyncScheduler};

const INPUT_BUFFER: usize = 64;
const VIEW_BUFFER: usize = 64;

/// What the connection layer holds on to
#[derive(Debug)]
pub struct PeerHandle {
    pub actor: ActorId,
    /// Client input into the peer loop
    pub input_tx: mpsc::Sender<ClientMsg>,
    /// Everything the client should see, closed when the peer stops
    pub view_rx: broadcast::Receiver<ServerMsg>,
}

pub struct Peer {
    endpoint: RelayEndpoint<GameMessage>,
    settings: Arc<MatchSettings>,
    combatant: Combatant,
    /// Last replicated state of every other combatant
    observed: BTreeMap<ActorId, CombatantState>,
    coordinator: RoundCoordinator,
    authority: Option<ActorId>,
    /// Whether `coordinator` currently drives the match
    acting_authority: bool,
    rng: ChaCha8Rng,
    sync: SyncScheduler,
    input_rx: mpsc::Receiver<ClientMsg>,
    view_tx: broadcast::Sender<ServerMsg>,
    move_input: (f32, f32),
    last_input_seq: u32,
    tick: u64,
    left: bool,
}

impl Peer {
    /// Build a peer from a freshly joined endpoint, seeding the coordinator
    /// mirror from the room state captured at join time
    pub fn new(
        endpoint: RelayEndpoint<GameMessage>,
        settings: Arc<MatchSettings>,
        seed: u64,
    ) -> (Self, PeerHandle) {
        let actor = endpoint.actor();
        let welcome = endpoint.welcome().clone();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let mut coordinator = RoundCoordinator::new(settings.clone());
        for member in &welcome.members {
            coordinator.observe_member(*member, true);
        }
        for (member, props) in &welcome.player_properties {
            if let Some(score) = props.get(SCORE_PROPERTY).and_then(parse_score) {
                coordinator.observe_score(*member, score);
            }
        }
        if let Some(value) = welcome.room_properties.get(MATCH_PROPERTY) {
            match serde_json::from_value::<MatchRecord>(value.clone()) {
                Ok(record) => coordinator.observe_record(record),
                Err(e) => warn!(actor = %actor, error = %e, "Unreadable match record"),
            }
        }

        let spawn = settings.arena.pick_spawn(&mut rng);
        let combatant = Combatant::new(actor, settings.max_health, spawn);

        let (input_tx, input_rx) = mpsc::channel(INPUT_BUFFER);
        let (view_tx, view_rx) = broadcast::channel(VIEW_BUFFER);

        let peer = Self {
            endpoint,
            settings,
            combatant,
            observed: BTreeMap::new(),
            coordinator,
            authority: welcome.authority,
            acting_authority: false,
            rng,
            sync: SyncScheduler::new(SIMULATION_TPS / SYNC_TPS),
            input_rx,
            view_tx,
            move_input: (0.0, 0.0),
            last_input_seq: 0,
            tick: 0,
            left: false,
        };

        let handle = PeerHandle {
            actor,
            input_tx,
            view_rx,
        };
        (peer, handle)
    }

    pub fn actor(&self) -> ActorId {
        self.endpoint.actor()
    }

    pub fn combatant(&self) -> &Combatant {
        &self.combatant
    }

    pub fn coordinator(&self) -> &RoundCoordinator {
        &self.coordinator
    }

    pub fn observed(&self) -> &BTreeMap<ActorId, CombatantState> {
        &self.observed
    }

    pub fn authority(&self) -> Option<ActorId> {
        self.authority
    }

    pub fn is_authority(&self) -> bool {
        self.acting_authority
    }

    pub fn has_left(&self) -> bool {
        self.left
    }

    /// Main peer loop, one iteration per simulation tick
    pub async fn run(mut self) {
        let clock = SessionClock::new();
        let mut ticker = interval(tick_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let dt = tick_delta();

        info!(room = %self.endpoint.room(), actor = %self.actor(), "Peer loop started");
        self.emit(ServerMsg::Welcome {
            actor: self.actor(),
            room: self.endpoint.room().to_string(),
            authority: self.authority,
            round: self.coordinator.current_round(),
            phase: self.coordinator.phase(),
            server_time: unix_millis(),
        });

        loop {
            ticker.tick().await;
            let now = clock.now();

            loop {
                match self.input_rx.try_recv() {
                    Ok(msg) => self.handle_input(msg, now),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.left = true;
                        break;
                    }
                }
            }
            if self.left {
                break;
            }

            self.step(now, dt);
        }

        info!(room = %self.endpoint.room(), actor = %self.actor(), "Peer loop stopped");
        self.endpoint.leave();
    }

    /// Apply one client input
    pub fn handle_input(&mut self, msg: ClientMsg, now: Duration) {
        match msg {
            ClientMsg::Input { seq, move_x, move_z } => {
                if seq < self.last_input_seq {
                    debug!(actor = %self.actor(), seq, "Dropping out-of-order input");
                    return;
                }
                self.last_input_seq = seq;
                self.move_input = (move_x, move_z);
            }
            ClientMsg::Attack => {
                let started = self.combatant.try_attack(
                    now,
                    self.settings.attack_cooldown,
                    self.settings.hit_window,
                );
                if started {
                    let attack = GameMessage::Attack {
                        actor: self.actor(),
                        round: self.combatant.round(),
                    };
                    self.relay(Target::Others, attack);
                }
            }
            ClientMsg::HitDetected { victim } => {
                if let Some(hit) =
                    self.combatant
                        .register_contact(victim, now, self.settings.attack_damage)
                {
                    debug!(attacker = %hit.attacker, victim = %victim, round = hit.round, "Hit landed");
                    self.relay(Target::Actor(victim), GameMessage::Hit(hit));
                }
            }
            ClientMsg::Ping { t } => self.emit(ServerMsg::Pong { t }),
            ClientMsg::Leave => self.left = true,
        }
    }

    /// Advance one tick: relay events, movement, authority timers, sync
    pub fn step(&mut self, now: Duration, dt: f32) {
        if self.authority == Some(self.actor()) && !self.acting_authority {
            self.become_authority(now);
        }

        while let Some(event) = self.endpoint.try_recv() {
            self.handle_event(event, now);
        }

        let (move_x, move_z) = self.move_input;
        self.combatant.step_movement(
            move_x,
            move_z,
            self.settings.move_speed,
            dt,
            &self.settings.arena.bounds,
        );

        if self.acting_authority {
            let directives = self.coordinator.tick(now);
            self.execute(directives);
        }

        self.tick += 1;
        if self.sync.should_send() {
            let state = self.combatant.state();
            self.relay(Target::Others, GameMessage::State(state));
            self.emit(build_snapshot(
                self.tick,
                self.coordinator.current_round(),
                self.coordinator.phase(),
                state,
                &self.observed,
            ));
        }
    }

    fn become_authority(&mut self, now: Duration) {
        info!(actor = %self.actor(), round = self.coordinator.current_round(), "Peer took round authority");
        self.acting_authority = true;
        let directives = self.coordinator.assume_authority(now);
        self.execute(directives);
    }

    fn handle_event(&mut self, event: RelayEvent<GameMessage>, now: Duration) {
        match event {
            RelayEvent::MemberJoined { actor } => {
                if self.acting_authority {
                    let directives = self.coordinator.on_member_joined(actor, now);
                    self.execute(directives);
                } else {
                    self.coordinator.observe_member(actor, true);
                }
                // Let the newcomer see us right away
                self.sync.force_next();
                self.emit(ServerMsg::PlayerJoined { actor });
            }
            RelayEvent::MemberLeft { actor } => {
                self.observed.remove(&actor);
                if self.acting_authority {
                    let directives = self.coordinator.on_member_left(actor, now);
                    self.execute(directives);
                } else {
                    self.coordinator.observe_member(actor, false);
                }
                self.emit(ServerMsg::PlayerLeft { actor });
            }
            RelayEvent::AuthorityChanged { authority } => {
                self.authority = Some(authority);
                if authority == self.actor() {
                    if !self.acting_authority {
                        self.become_authority(now);
                    }
                } else if self.acting_authority {
                    info!(actor = %self.actor(), to = %authority, "Round authority handed over");
                    self.acting_authority = false;
                }
                self.emit(ServerMsg::AuthorityChanged { authority });
            }
            RelayEvent::Message { from, payload } => self.handle_message(from, payload, now),
            RelayEvent::PlayerPropertyChanged { actor, key, value } => {
                if key != SCORE_PROPERTY {
                    return;
                }
                let Some(score) = parse_score(&value) else {
                    warn!(actor = %actor, value = %value, "Ignoring malformed score property");
                    return;
                };
                if !self.acting_authority {
                    self.coordinator.observe_score(actor, score);
                }
                self.emit(ServerMsg::ScoreChanged { actor, score });
            }
            RelayEvent::RoomPropertyChanged { key, value } => {
                if key != MATCH_PROPERTY || self.acting_authority {
                    return;
                }
                match serde_json::from_value::<MatchRecord>(value) {
                    Ok(record) => self.coordinator.observe_record(record),
                    Err(e) => warn!(error = %e, "Ignoring malformed match record"),
                }
            }
        }
    }

    fn handle_message(&mut self, from: ActorId, msg: GameMessage, now: Duration) {
        if let GameMessage::Died(report) = &msg {
            if report.victim != from {
                warn!(from = %from, victim = %report.victim, "Dropping death report for a combatant the sender does not own");
                return;
            }
        }

        if !self.acting_authority {
            self.coordinator.observe(&msg);
        }

        match msg {
            GameMessage::RoundStarting { round, countdown_ms } => {
                self.emit(ServerMsg::RoundStarting { round, countdown_ms });
            }
            GameMessage::RoundStarted { round } => {
                let spawn = self.settings.arena.pick_spawn(&mut self.rng);
                self.combatant.respawn(round, spawn);
                self.combatant.set_input_enabled(true);
                self.observed.clear();
                self.sync.force_next();
                self.emit(ServerMsg::RoundStarted { round, spawn });
            }
            GameMessage::RoundResolved {
                round,
                winner,
                reason,
            } => {
                self.combatant.set_input_enabled(false);
                self.move_input = (0.0, 0.0);
                self.emit(ServerMsg::RoundResolved {
                    round,
                    winner,
                    reason,
                });
            }
            GameMessage::MatchEnded { result, scores } => {
                self.combatant.set_input_enabled(false);
                self.move_input = (0.0, 0.0);
                self.emit(ServerMsg::MatchEnded { result, scores });
            }
            GameMessage::Attack { actor, .. } => {
                if actor == from {
                    self.emit(ServerMsg::Attack { actor });
                }
            }
            GameMessage::Hit(hit) => self.receive_hit(from, hit),
            GameMessage::Died(report) => {
                if let Some(state) = self.observed.get_mut(&report.victim) {
                    state.alive = false;
                    state.health = 0.0;
                }
                if self.acting_authority {
                    let directives = self.coordinator.on_death(report, now);
                    self.execute(directives);
                }
                self.emit(ServerMsg::Died {
                    victim: report.victim,
                    attacker: report.attacker,
                });
            }
            GameMessage::State(state) => {
                if state.actor != from {
                    warn!(from = %from, claimed = %state.actor, "Dropping state for a combatant the sender does not own");
                    return;
                }
                self.observed.insert(state.actor, state);
            }
        }
    }

    fn receive_hit(&mut self, from: ActorId, hit: Hit) {
        if hit.attacker != from {
            warn!(from = %from, attacker = %hit.attacker, "Dropping hit attributed to another actor");
            return;
        }

        match self.combatant.apply_hit(&hit) {
            HitOutcome::Damaged { health } => {
                self.sync.force_next();
                self.emit(ServerMsg::Damaged {
                    victim: hit.victim,
                    attacker: hit.attacker,
                    health,
                });
            }
            HitOutcome::Killed(report) => {
                info!(victim = %report.victim, attacker = %report.attacker, round = report.round, "Combatant killed");
                self.sync.force_next();
                self.emit(ServerMsg::Damaged {
                    victim: hit.victim,
                    attacker: hit.attacker,
                    health: 0.0,
                });
                self.relay(Target::All, GameMessage::Died(report));
            }
            HitOutcome::Ignored(reason) => {
                debug!(attacker = %hit.attacker, reason = ?reason, "Ignored hit");
            }
        }
    }

    fn execute(&mut self, directives: Vec<Directive>) {
        for directive in directives {
            let result = match directive {
                Directive::Broadcast(msg) => self.endpoint.send(Target::All, msg),
                Directive::PublishScore { actor, score } => {
                    self.endpoint
                        .set_player_property(actor, SCORE_PROPERTY, serde_json::json!(score))
                }
                Directive::PublishRecord(record) => match serde_json::to_value(&record) {
                    Ok(value) => self.endpoint.set_room_property(MATCH_PROPERTY, value),
                    Err(e) => {
                        warn!(error = %e, "Failed to encode match record");
                        Ok(())
                    }
                },
            };
            if let Err(e) = result {
                warn!(actor = %self.actor(), error = %e, "Relay rejected coordinator directive");
            }
        }
    }

    fn relay(&self, target: Target, msg: GameMessage) {
        if let Err(e) = self.endpoint.send(target, msg) {
            warn!(actor = %self.actor(), error = %e, "Relay send failed");
        }
    }

    fn emit(&self, msg: ServerMsg) {
        // No subscribers just means the client is gone
        let _ = self.view_tx.send(msg);
    }
}

fn parse_score(value: &serde_json::Value) -> Option<u32> {
    value.as_u64().and_then(|v| u32::try_from(v).ok())
}
