//! Round coordinator - authoritative round/score state machine
//!
//! Exactly one peer, the relay authority, drives transitions. Every other
//! peer keeps a mirror fed by the authority's broadcasts and the replicated
//! `match` and `score` properties, so whichever peer is designated next can
//! resume the match instead of restarting it.
//!
//! Transitions: `Lobby -> RoundStarting -> RoundActive -> RoundResolved ->
//! (RoundStarting | MatchEnded)`. The coordinator never talks to the relay
//! itself; it returns [`Directive`]s for its peer to execute.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::relay::ActorId;
use crate::util::time::as_millis;

use super::messages::{DeathReport, GameMessage, MatchResult, ResolveReason, ScoreEntry};
use super::settings::MatchSettings;

/// Room property holding the serialized [`MatchRecord`]
pub const MATCH_PROPERTY: &str = "match";
/// Player property holding that player's score
pub const SCORE_PROPERTY: &str = "score";

/// Round lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// Waiting for enough participants
    Lobby,
    /// Countdown before a round
    RoundStarting,
    /// Round in progress
    RoundActive,
    /// Round decided, waiting for the next countdown or match end
    RoundResolved,
    /// Match over
    MatchEnded,
}

/// Match state replicated read-only to every participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub total_rounds: u32,
    /// 0 in the lobby, `total_rounds + 1` once the match has run out of rounds
    pub current_round: u32,
    /// Rounds that produced a point; always equals the sum of all scores
    pub completed_rounds: u32,
    pub ended: bool,
    pub phase: RoundPhase,
    /// The next countdown replays `current_round` instead of advancing
    #[serde(default)]
    pub replay_round: bool,
    /// Every participant's score, including those who already left
    #[serde(default)]
    pub standings: Vec<ScoreEntry>,
}

impl MatchRecord {
    pub fn new(total_rounds: u32) -> Self {
        Self {
            total_rounds,
            current_round: 0,
            completed_rounds: 0,
            ended: false,
            phase: RoundPhase::Lobby,
            replay_round: false,
            standings: Vec::new(),
        }
    }

    pub fn started(&self) -> bool {
        self.current_round > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timer {
    BeginRound,
    NextRound,
    EndMatch,
}

/// Side effects the owning peer must carry out, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Broadcast(GameMessage),
    PublishScore { actor: ActorId, score: u32 },
    PublishRecord(MatchRecord),
}

/// Session-scoped round/score state, one per peer
pub struct RoundCoordinator {
    settings: Arc<MatchSettings>,
    record: MatchRecord,
    /// Includes participants who already left, so points are never lost
    scores: BTreeMap<ActorId, u32>,
    members: BTreeSet<ActorId>,
    /// Combatants still standing in the active round
    alive: BTreeSet<ActorId>,
    /// Mirror only: first knockout of the active round not yet resolved by
    /// the authority
    pending_death: Option<DeathReport>,
    deadline: Option<(Duration, Timer)>,
}

impl RoundCoordinator {
    pub fn new(settings: Arc<MatchSettings>) -> Self {
        let record = MatchRecord::new(settings.total_rounds);
        Self {
            settings,
            record,
            scores: BTreeMap::new(),
            members: BTreeSet::new(),
            alive: BTreeSet::new(),
            pending_death: None,
            deadline: None,
        }
    }

    pub fn record(&self) -> &MatchRecord {
        &self.record
    }

    pub fn phase(&self) -> RoundPhase {
        self.record.phase
    }

    pub fn current_round(&self) -> u32 {
        self.record.current_round
    }

    pub fn is_ended(&self) -> bool {
        self.record.ended
    }

    pub fn scores(&self) -> &BTreeMap<ActorId, u32> {
        &self.scores
    }

    pub fn score(&self, actor: ActorId) -> u32 {
        self.scores.get(&actor).copied().unwrap_or(0)
    }

    pub fn members(&self) -> &BTreeSet<ActorId> {
        &self.members
    }

    pub fn alive(&self) -> &BTreeSet<ActorId> {
        &self.alive
    }

    /// When the next scheduled transition fires, if any
    pub fn next_deadline(&self) -> Option<Duration> {
        self.deadline.map(|(at, _)| at)
    }

    pub fn standings(&self) -> Vec<ScoreEntry> {
        self.scores
            .iter()
            .map(|(actor, score)| ScoreEntry {
                actor: *actor,
                score: *score,
            })
            .collect()
    }

    /// Winner among participants still present (everyone who scored if the
    /// room is empty); a shared top score is a draw
    pub fn result(&self) -> MatchResult {
        let present: Vec<ScoreEntry> = self
            .standings()
            .into_iter()
            .filter(|s| self.members.contains(&s.actor))
            .collect();
        if present.is_empty() {
            MatchResult::from_scores(&self.standings())
        } else {
            MatchResult::from_scores(&present)
        }
    }

    fn min_players(&self) -> usize {
        // A single participant would immediately forfeit the match to itself
        self.settings.min_players.max(2)
    }

    // ------------------------------------------------------------------
    // Authority side
    // ------------------------------------------------------------------

    pub fn on_member_joined(&mut self, actor: ActorId, now: Duration) -> Vec<Directive> {
        let mut out = Vec::new();
        if !self.members.insert(actor) {
            return out;
        }

        if !self.scores.contains_key(&actor) {
            self.scores.insert(actor, 0);
            out.push(Directive::PublishScore { actor, score: 0 });
        }

        if self.record.phase == RoundPhase::Lobby && self.members.len() >= self.min_players() {
            self.begin_countdown(now, &mut out);
        }
        out
    }

    pub fn on_member_left(&mut self, actor: ActorId, now: Duration) -> Vec<Directive> {
        let mut out = Vec::new();
        if !self.members.remove(&actor) {
            return out;
        }
        self.alive.remove(&actor);
        self.apply_population_rules(now, &mut out);
        out
    }

    /// Handle a death report from a victim's owner. The first valid report
    /// of the active round resolves it; later ones are discarded.
    pub fn on_death(&mut self, report: DeathReport, now: Duration) -> Vec<Directive> {
        let mut out = Vec::new();

        if self.record.phase != RoundPhase::RoundActive || report.round != self.record.current_round {
            debug!(
                round = report.round,
                current = self.record.current_round,
                victim = %report.victim,
                "Ignoring death report outside the active round"
            );
            return out;
        }
        if !self.alive.remove(&report.victim) {
            debug!(victim = %report.victim, "Ignoring duplicate death report");
            return out;
        }

        self.credit_death(report, now, &mut out);
        out
    }

    fn credit_death(&mut self, report: DeathReport, now: Duration, out: &mut Vec<Directive>) {
        if report.attacker != report.victim && self.members.contains(&report.attacker) {
            self.award_round(report.attacker, ResolveReason::Knockout, now, out);
        } else {
            warn!(
                round = report.round,
                victim = %report.victim,
                attacker = %report.attacker,
                "Killer not found, dropping scoring event"
            );
            self.resolve_by_survivors(now, out);
        }
    }

    /// Fire any transition whose deadline has passed
    pub fn tick(&mut self, now: Duration) -> Vec<Directive> {
        let mut out = Vec::new();
        let Some((at, timer)) = self.deadline else {
            return out;
        };
        if now < at {
            return out;
        }
        self.deadline = None;

        match timer {
            Timer::BeginRound => self.start_round(&mut out),
            Timer::NextRound => self.begin_countdown(now, &mut out),
            Timer::EndMatch => self.end_match(&mut out),
        }
        out
    }

    /// Become the authority, continuing from the mirrored record and scores
    pub fn assume_authority(&mut self, now: Duration) -> Vec<Directive> {
        let mut out = Vec::new();
        info!(
            round = self.record.current_round,
            phase = ?self.record.phase,
            members = self.members.len(),
            "Assuming round authority"
        );

        let missing: Vec<ActorId> = self
            .members
            .iter()
            .filter(|m| !self.scores.contains_key(m))
            .copied()
            .collect();
        for actor in missing {
            self.scores.insert(actor, 0);
            out.push(Directive::PublishScore { actor, score: 0 });
        }

        match self.record.phase {
            RoundPhase::Lobby => {
                if self.members.len() >= self.min_players() {
                    self.begin_countdown(now, &mut out);
                    return out;
                }
            }
            RoundPhase::RoundStarting => {
                // Restart the countdown; the previous one died with its owner
                self.deadline = Some((now + self.settings.countdown, Timer::BeginRound));
                out.push(Directive::Broadcast(GameMessage::RoundStarting {
                    round: self.record.current_round,
                    countdown_ms: as_millis(self.settings.countdown),
                }));
            }
            RoundPhase::RoundActive => {
                // Relay order guarantees the old authority never saw it
                if let Some(report) = self.pending_death.take() {
                    info!(
                        round = report.round,
                        victim = %report.victim,
                        attacker = %report.attacker,
                        "Resolving knockout left by previous authority"
                    );
                    self.credit_death(report, now, &mut out);
                }
            }
            RoundPhase::RoundResolved => {
                self.deadline = if self.record.current_round > self.record.total_rounds {
                    Some((now + self.settings.disconnect_grace, Timer::EndMatch))
                } else {
                    Some((now + self.settings.round_end_delay, Timer::NextRound))
                };
            }
            RoundPhase::MatchEnded => return out,
        }

        self.apply_population_rules(now, &mut out);
        out
    }

    fn forfeit_pending(&self) -> bool {
        matches!(self.deadline, Some((_, Timer::EndMatch)))
    }

    fn apply_population_rules(&mut self, now: Duration, out: &mut Vec<Directive>) {
        if !self.record.started() || self.record.ended {
            return;
        }
        if self.members.is_empty() {
            info!(round = self.record.current_round, "Room emptied, ending match");
            self.end_match(out);
            return;
        }
        if self.forfeit_pending() {
            return;
        }

        match self.members.len() {
            1 => {
                if let Some(survivor) = self.members.iter().next().copied() {
                    self.forfeit(survivor, now, out);
                }
            }
            _ => {
                if self.record.phase == RoundPhase::RoundActive {
                    self.resolve_by_survivors(now, out);
                }
            }
        }
    }

    fn resolve_by_survivors(&mut self, now: Duration, out: &mut Vec<Directive>) {
        match self.alive.len() {
            1 => {
                if let Some(last) = self.alive.iter().next().copied() {
                    self.award_round(last, ResolveReason::LastStanding, now, out);
                }
            }
            0 => self.void_round(now, out),
            _ => {}
        }
    }

    fn begin_countdown(&mut self, now: Duration, out: &mut Vec<Directive>) {
        if self.record.replay_round {
            self.record.replay_round = false;
        } else {
            self.record.current_round += 1;
        }

        if self.record.current_round > self.record.total_rounds {
            self.end_match(out);
            return;
        }

        self.record.phase = RoundPhase::RoundStarting;
        self.deadline = Some((now + self.settings.countdown, Timer::BeginRound));
        info!(round = self.record.current_round, "Round countdown started");

        out.push(Directive::Broadcast(GameMessage::RoundStarting {
            round: self.record.current_round,
            countdown_ms: as_millis(self.settings.countdown),
        }));
        self.publish_record(out);
    }

    fn start_round(&mut self, out: &mut Vec<Directive>) {
        self.record.phase = RoundPhase::RoundActive;
        self.alive = self.members.clone();
        info!(
            round = self.record.current_round,
            combatants = self.alive.len(),
            "Round started"
        );

        out.push(Directive::Broadcast(GameMessage::RoundStarted {
            round: self.record.current_round,
        }));
        self.publish_record(out);
    }

    fn award_round(
        &mut self,
        winner: ActorId,
        reason: ResolveReason,
        now: Duration,
        out: &mut Vec<Directive>,
    ) {
        let score = {
            let entry = self.scores.entry(winner).or_insert(0);
            *entry += 1;
            *entry
        };
        self.record.completed_rounds += 1;
        self.record.phase = RoundPhase::RoundResolved;
        self.deadline = Some((now + self.settings.round_end_delay, Timer::NextRound));

        info!(
            round = self.record.current_round,
            winner = %winner,
            score,
            reason = ?reason,
            "Round resolved"
        );

        out.push(Directive::PublishScore { actor: winner, score });
        out.push(Directive::Broadcast(GameMessage::RoundResolved {
            round: self.record.current_round,
            winner: Some(winner),
            reason,
        }));
        self.publish_record(out);
    }

    fn void_round(&mut self, now: Duration, out: &mut Vec<Directive>) {
        self.record.phase = RoundPhase::RoundResolved;
        self.record.replay_round = true;
        self.deadline = Some((now + self.settings.round_end_delay, Timer::NextRound));

        warn!(round = self.record.current_round, "No attributable winner, round will be replayed");

        out.push(Directive::Broadcast(GameMessage::RoundResolved {
            round: self.record.current_round,
            winner: None,
            reason: ResolveReason::Void,
        }));
        self.publish_record(out);
    }

    /// Award every remaining round to the last participant, then end the
    /// match after the grace period
    fn forfeit(&mut self, survivor: ActorId, now: Duration, out: &mut Vec<Directive>) {
        let remaining = self
            .record
            .total_rounds
            .saturating_sub(self.record.completed_rounds);
        let round = self.record.current_round.min(self.record.total_rounds);

        let score = {
            let entry = self.scores.entry(survivor).or_insert(0);
            *entry += remaining;
            *entry
        };
        self.record.completed_rounds += remaining;
        self.record.current_round = self.record.total_rounds + 1;
        self.record.replay_round = false;
        self.record.phase = RoundPhase::RoundResolved;
        self.alive.clear();
        self.deadline = Some((now + self.settings.disconnect_grace, Timer::EndMatch));

        info!(survivor = %survivor, awarded = remaining, score, "Last participant standing, match forfeited");

        out.push(Directive::PublishScore { actor: survivor, score });
        out.push(Directive::Broadcast(GameMessage::RoundResolved {
            round,
            winner: Some(survivor),
            reason: ResolveReason::Forfeit,
        }));
        self.publish_record(out);
    }

    fn publish_record(&mut self, out: &mut Vec<Directive>) {
        self.record.standings = self.standings();
        out.push(Directive::PublishRecord(self.record.clone()));
    }

    fn end_match(&mut self, out: &mut Vec<Directive>) {
        self.record.ended = true;
        self.record.phase = RoundPhase::MatchEnded;
        self.deadline = None;
        self.alive.clear();

        let result = self.result();
        info!(result = ?result, "Match ended");

        out.push(Directive::Broadcast(GameMessage::MatchEnded {
            result,
            scores: self.standings(),
        }));
        self.publish_record(out);
    }

    // ------------------------------------------------------------------
    // Mirror side
    // ------------------------------------------------------------------

    pub fn observe_member(&mut self, actor: ActorId, present: bool) {
        if present {
            self.members.insert(actor);
            self.scores.entry(actor).or_insert(0);
        } else {
            self.members.remove(&actor);
            self.alive.remove(&actor);
        }
    }

    pub fn observe_score(&mut self, actor: ActorId, score: u32) {
        self.scores.insert(actor, score);
    }

    /// Take over a replicated record. Scores only grow, so the published
    /// standings never lower a score already observed.
    pub fn observe_record(&mut self, record: MatchRecord) {
        for entry in &record.standings {
            let score = self.scores.entry(entry.actor).or_insert(0);
            *score = (*score).max(entry.score);
        }
        if record.phase != RoundPhase::RoundActive {
            self.pending_death = None;
        }
        self.record = record;
    }

    /// Apply a message received from the authority or another peer
    pub fn observe(&mut self, msg: &GameMessage) {
        match msg {
            GameMessage::RoundStarting { round, .. } => {
                self.record.current_round = *round;
                self.record.phase = RoundPhase::RoundStarting;
                self.record.replay_round = false;
                self.pending_death = None;
            }
            GameMessage::RoundStarted { round } => {
                self.record.current_round = *round;
                self.record.phase = RoundPhase::RoundActive;
                self.alive = self.members.clone();
                self.pending_death = None;
            }
            GameMessage::RoundResolved { reason, .. } => {
                self.record.phase = RoundPhase::RoundResolved;
                self.pending_death = None;
                if *reason == ResolveReason::Void {
                    self.record.replay_round = true;
                }
            }
            GameMessage::MatchEnded { scores, .. } => {
                self.record.ended = true;
                self.record.phase = RoundPhase::MatchEnded;
                self.pending_death = None;
                for entry in scores {
                    self.scores.insert(entry.actor, entry.score);
                }
            }
            GameMessage::Died(report) => {
                if self.record.phase == RoundPhase::RoundActive
                    && report.round == self.record.current_round
                    && self.alive.remove(&report.victim)
                    && self.pending_death.is_none()
                {
                    self.pending_death = Some(*report);
                }
            }
            GameMessage::Attack { .. } | GameMessage::Hit(_) | GameMessage::State(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(total_rounds: u32) -> Arc<MatchSettings> {
        Arc::new(MatchSettings {
            total_rounds,
            ..MatchSettings::default()
        })
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn broadcasts(out: &[Directive]) -> Vec<GameMessage> {
        out.iter()
            .filter_map(|d| match d {
                Directive::Broadcast(msg) => Some(msg.clone()),
                _ => None,
            })
            .collect()
    }

    fn death(round: u32, victim: u32, attacker: u32) -> DeathReport {
        DeathReport {
            round,
            victim: ActorId(victim),
            attacker: ActorId(attacker),
        }
    }

    fn sum_scores(c: &RoundCoordinator) -> u32 {
        c.scores().values().sum()
    }

    /// Feed an authority's directives into a mirror the way the relay would
    fn mirror_apply(mirror: &mut RoundCoordinator, out: &[Directive]) {
        for d in out {
            match d {
                Directive::Broadcast(msg) => mirror.observe(msg),
                Directive::PublishScore { actor, score } => mirror.observe_score(*actor, *score),
                Directive::PublishRecord(record) => mirror.observe_record(record.clone()),
            }
        }
    }

    /// Join `players` and run the first countdown; returns the clock after it
    fn started(total_rounds: u32, players: u32) -> (RoundCoordinator, Duration) {
        let mut c = RoundCoordinator::new(settings(total_rounds));
        for p in 1..=players {
            c.on_member_joined(ActorId(p), Duration::ZERO);
        }
        let now = secs(3);
        c.tick(now);
        assert_eq!(c.phase(), RoundPhase::RoundActive);
        (c, now)
    }

    /// Advance through round end delay and countdown into the next round
    fn next_round(c: &mut RoundCoordinator, now: &mut Duration) {
        *now += secs(3);
        c.tick(*now);
        *now += secs(3);
        c.tick(*now);
    }

    #[test]
    fn lobby_waits_for_enough_players() {
        let mut c = RoundCoordinator::new(settings(3));
        let out = c.on_member_joined(ActorId(1), Duration::ZERO);
        assert_eq!(out, vec![Directive::PublishScore { actor: ActorId(1), score: 0 }]);
        assert_eq!(c.phase(), RoundPhase::Lobby);
        assert_eq!(c.current_round(), 0);

        let out = c.on_member_joined(ActorId(2), Duration::ZERO);
        assert_eq!(c.phase(), RoundPhase::RoundStarting);
        assert_eq!(c.current_round(), 1);
        assert_eq!(
            broadcasts(&out),
            vec![GameMessage::RoundStarting {
                round: 1,
                countdown_ms: 3000
            }]
        );
    }

    #[test]
    fn countdown_starts_round_with_everyone_alive() {
        let mut c = RoundCoordinator::new(settings(3));
        c.on_member_joined(ActorId(1), Duration::ZERO);
        c.on_member_joined(ActorId(2), Duration::ZERO);

        assert!(c.tick(Duration::from_millis(2999)).is_empty());
        let out = c.tick(secs(3));
        assert_eq!(broadcasts(&out), vec![GameMessage::RoundStarted { round: 1 }]);
        assert_eq!(c.alive().len(), 2);
    }

    #[test]
    fn knockout_awards_attacker_and_schedules_next_round() {
        let (mut c, now) = started(3, 2);
        let out = c.on_death(death(1, 2, 1), now);

        assert_eq!(c.phase(), RoundPhase::RoundResolved);
        assert_eq!(c.score(ActorId(1)), 1);
        assert!(out.contains(&Directive::PublishScore {
            actor: ActorId(1),
            score: 1
        }));
        assert_eq!(
            broadcasts(&out),
            vec![GameMessage::RoundResolved {
                round: 1,
                winner: Some(ActorId(1)),
                reason: ResolveReason::Knockout
            }]
        );
        assert_eq!(c.next_deadline(), Some(now + secs(3)));

        let out = c.tick(now + secs(3));
        assert_eq!(
            broadcasts(&out),
            vec![GameMessage::RoundStarting {
                round: 2,
                countdown_ms: 3000
            }]
        );
    }

    #[test]
    fn full_match_keeps_round_and_score_invariants() {
        let (mut c, mut now) = started(3, 2);
        let mut last_round = c.current_round();
        let winners = [1, 2, 1];

        for (i, winner) in winners.iter().enumerate() {
            let round = c.current_round();
            let loser = if *winner == 1 { 2 } else { 1 };
            c.on_death(death(round, loser, *winner), now);
            assert_eq!(sum_scores(&c), i as u32 + 1);
            assert_eq!(c.record().completed_rounds, i as u32 + 1);

            next_round(&mut c, &mut now);
            assert!(c.current_round() >= last_round);
            assert!(c.current_round() <= c.record().total_rounds + 1);
            last_round = c.current_round();
        }

        assert!(c.is_ended());
        assert_eq!(c.phase(), RoundPhase::MatchEnded);
        assert_eq!(c.current_round(), 4);
        assert_eq!(
            c.result(),
            MatchResult::Winner {
                actor: ActorId(1),
                score: 2
            }
        );
    }

    #[test]
    fn tied_scores_end_in_draw() {
        let (mut c, mut now) = started(2, 2);
        c.on_death(death(1, 2, 1), now);
        next_round(&mut c, &mut now);
        c.on_death(death(2, 1, 2), now);
        now += secs(3);
        let out = c.tick(now);

        let ended = broadcasts(&out);
        assert_eq!(
            ended,
            vec![GameMessage::MatchEnded {
                result: MatchResult::Draw {
                    tied: vec![ActorId(1), ActorId(2)],
                    score: 1
                },
                scores: c.standings(),
            }]
        );
    }

    #[test]
    fn simultaneous_death_first_report_wins() {
        let (mut c, now) = started(3, 2);
        // Both combatants dropped in the same tick; the relay delivered
        // actor 2's death first.
        let first = c.on_death(death(1, 2, 1), now);
        let second = c.on_death(death(1, 1, 2), now);

        assert!(!first.is_empty());
        assert!(second.is_empty());
        assert_eq!(c.score(ActorId(1)), 1);
        assert_eq!(c.score(ActorId(2)), 0);
        assert_eq!(sum_scores(&c), 1);
    }

    #[test]
    fn duplicate_and_stale_death_reports_are_ignored() {
        let (mut c, mut now) = started(3, 3);
        c.on_death(death(1, 2, 1), now);
        assert!(c.on_death(death(1, 2, 1), now).is_empty());

        next_round(&mut c, &mut now);
        assert_eq!(c.current_round(), 2);
        assert!(c.on_death(death(1, 3, 1), now).is_empty());
        assert_eq!(c.alive().len(), 3);
    }

    #[test]
    fn missing_killer_falls_back_to_last_standing() {
        let (mut c, now) = started(3, 3);

        // Killer 9 is not in the room: the point is dropped, round goes on
        let out = c.on_death(death(1, 2, 9), now);
        assert!(out.is_empty());
        assert_eq!(c.phase(), RoundPhase::RoundActive);

        // Actor 3 leaves; actor 1 is the only one standing
        let out = c.on_member_left(ActorId(3), now);
        assert_eq!(
            broadcasts(&out),
            vec![GameMessage::RoundResolved {
                round: 1,
                winner: Some(ActorId(1)),
                reason: ResolveReason::LastStanding
            }]
        );
        assert_eq!(c.score(ActorId(1)), 1);
    }

    #[test]
    fn round_without_winner_is_replayed() {
        // A peer that joined mid-round never saw who was fighting; when it
        // is promoted there is nobody it can credit with the round.
        let (authority, mut now) = started(3, 3);
        let mut c = RoundCoordinator::new(settings(3));
        for p in 1..=3 {
            c.observe_member(ActorId(p), true);
        }
        c.observe_record(authority.record().clone());
        c.observe_member(ActorId(1), false);

        let out = c.assume_authority(now);
        assert_eq!(
            broadcasts(&out),
            vec![GameMessage::RoundResolved {
                round: 1,
                winner: None,
                reason: ResolveReason::Void
            }]
        );
        assert_eq!(sum_scores(&c), 0);

        next_round(&mut c, &mut now);
        assert_eq!(c.current_round(), 1);
        assert_eq!(c.phase(), RoundPhase::RoundActive);
        assert_eq!(c.record().completed_rounds, 0);
    }

    #[test]
    fn last_participant_takes_remaining_rounds() {
        let (mut c, mut now) = started(3, 2);
        c.on_death(death(1, 2, 1), now);
        next_round(&mut c, &mut now);
        assert_eq!(c.current_round(), 2);
        let before = c.score(ActorId(2));

        // 2 of 3 rounds remain when actor 1 drops
        let out = c.on_member_left(ActorId(1), now);
        assert_eq!(c.score(ActorId(2)), before + 2);
        assert_eq!(sum_scores(&c), 3);
        assert_eq!(c.current_round(), 4);
        assert!(!c.is_ended());
        assert_eq!(
            broadcasts(&out),
            vec![GameMessage::RoundResolved {
                round: 2,
                winner: Some(ActorId(2)),
                reason: ResolveReason::Forfeit
            }]
        );

        // Grace period for the final score to replicate
        assert!(c.tick(now + Duration::from_millis(500)).is_empty());
        let out = c.tick(now + secs(1));
        assert!(c.is_ended());
        assert_eq!(
            broadcasts(&out),
            vec![GameMessage::MatchEnded {
                result: MatchResult::Winner {
                    actor: ActorId(2),
                    score: 2
                },
                scores: c.standings(),
            }]
        );
    }

    #[test]
    fn leaving_in_lobby_does_not_end_anything() {
        let mut c = RoundCoordinator::new(settings(3));
        c.on_member_joined(ActorId(1), Duration::ZERO);
        assert!(c.on_member_left(ActorId(1), Duration::ZERO).is_empty());
        assert_eq!(c.phase(), RoundPhase::Lobby);
    }

    #[test]
    fn mirror_takes_over_mid_match() {
        let (mut authority, mut now) = started(3, 3);
        let mut mirror = RoundCoordinator::new(settings(3));
        for p in 1..=3 {
            mirror.observe_member(ActorId(p), true);
        }
        mirror.observe_record(authority.record().clone());
        mirror.observe(&GameMessage::RoundStarted { round: 1 });

        let out = authority.on_death(death(1, 3, 2), now);
        mirror_apply(&mut mirror, &out);
        now += secs(3);
        mirror_apply(&mut mirror, &authority.tick(now));
        now += secs(3);
        mirror_apply(&mut mirror, &authority.tick(now));
        assert_eq!(mirror.current_round(), 2);
        assert_eq!(mirror.phase(), RoundPhase::RoundActive);

        // Authority (actor 1) disconnects; actor 2's mirror is promoted
        mirror.observe_member(ActorId(1), false);
        let out = mirror.assume_authority(now);
        assert!(broadcasts(&out).is_empty());
        assert_eq!(mirror.current_round(), 2);
        assert_eq!(mirror.score(ActorId(2)), 1);
        assert_eq!(mirror.alive().len(), 2);

        mirror.on_death(death(2, 3, 2), now);
        assert_eq!(mirror.score(ActorId(2)), 2);
        assert_eq!(mirror.record().completed_rounds, 2);
    }

    #[test]
    fn takeover_between_rounds_reschedules_next_round() {
        let (mut authority, now) = started(3, 3);
        let mut mirror = RoundCoordinator::new(settings(3));
        for p in 1..=3 {
            mirror.observe_member(ActorId(p), true);
        }
        mirror_apply(&mut mirror, &authority.on_death(death(1, 2, 3), now));
        assert_eq!(mirror.phase(), RoundPhase::RoundResolved);

        mirror.observe_member(ActorId(1), false);
        mirror.assume_authority(now + secs(1));
        assert_eq!(mirror.next_deadline(), Some(now + secs(4)));

        let out = mirror.tick(now + secs(4));
        assert_eq!(
            broadcasts(&out),
            vec![GameMessage::RoundStarting {
                round: 2,
                countdown_ms: 3000
            }]
        );
    }

    #[test]
    fn emptied_match_ends_without_waiting_for_grace() {
        let (mut c, now) = started(3, 2);
        c.on_death(death(1, 2, 1), now);
        c.on_member_left(ActorId(2), now);
        assert!(!c.is_ended());

        let out = c.on_member_left(ActorId(1), now);
        assert!(c.is_ended());
        assert_eq!(c.next_deadline(), None);
        assert_eq!(
            broadcasts(&out),
            vec![GameMessage::MatchEnded {
                result: MatchResult::Winner {
                    actor: ActorId(1),
                    score: 3
                },
                scores: c.standings(),
            }]
        );
        assert_eq!(sum_scores(&c), 3);
    }

    #[test]
    fn promoted_mirror_resolves_unhandled_knockout() {
        let (authority, now) = started(3, 4);
        let mut mirror = RoundCoordinator::new(settings(3));
        for p in 1..=4 {
            mirror.observe_member(ActorId(p), true);
        }
        mirror.observe_record(authority.record().clone());
        mirror.observe(&GameMessage::RoundStarted { round: 1 });

        // Actor 3 reported its death; actor 1 left before handling it
        mirror.observe(&GameMessage::Died(death(1, 3, 4)));
        mirror.observe_member(ActorId(1), false);

        let out = mirror.assume_authority(now);
        assert_eq!(
            broadcasts(&out),
            vec![GameMessage::RoundResolved {
                round: 1,
                winner: Some(ActorId(4)),
                reason: ResolveReason::Knockout
            }]
        );
        assert_eq!(mirror.score(ActorId(4)), 1);
        assert_eq!(mirror.record().completed_rounds, 1);
        assert_eq!(mirror.phase(), RoundPhase::RoundResolved);
    }

    #[test]
    fn handled_knockout_is_not_awarded_twice() {
        let (mut authority, now) = started(3, 3);
        let mut mirror = RoundCoordinator::new(settings(3));
        for p in 1..=3 {
            mirror.observe_member(ActorId(p), true);
        }
        mirror.observe(&GameMessage::RoundStarted { round: 1 });

        let report = death(1, 3, 2);
        mirror.observe(&GameMessage::Died(report));
        mirror_apply(&mut mirror, &authority.on_death(report, now));
        mirror.observe_member(ActorId(1), false);

        let out = mirror.assume_authority(now);
        assert!(broadcasts(&out).is_empty());
        assert_eq!(mirror.score(ActorId(2)), 1);
        assert_eq!(sum_scores(&mirror), 1);
    }

    #[test]
    fn late_joiner_learns_departed_scores_from_record() {
        let (mut authority, now) = started(3, 3);
        authority.on_death(death(1, 2, 1), now);
        authority.on_member_left(ActorId(1), now);

        // Actor 4 joins after the scorer left; only the record remembers
        let mut late = RoundCoordinator::new(settings(3));
        for p in [3, 4] {
            late.observe_member(ActorId(p), true);
        }
        late.observe_record(authority.record().clone());
        assert_eq!(late.score(ActorId(1)), 1);

        late.observe_member(ActorId(3), false);
        late.assume_authority(now);
        assert_eq!(late.score(ActorId(4)), 2);
        assert_eq!(sum_scores(&late), late.record().completed_rounds);
        assert_eq!(sum_scores(&late), 3);
    }

    #[test]
    fn record_round_trips_through_room_property() {
        let (c, _) = started(3, 2);
        let value = serde_json::to_value(c.record()).unwrap();
        let back: MatchRecord = serde_json::from_value(value).unwrap();
        assert_eq!(&back, c.record());
    }
}
