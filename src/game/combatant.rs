//! Combatant state - health, attacks, hit resolution, respawn

use std::time::Duration;

use crate::relay::ActorId;

use super::messages::{CombatantState, DeathReport, Hit};
use super::movement::{ArenaBounds, MovementSystem};
use super::spawn::SpawnPoint;

/// Stateless combat rules
pub struct CombatSystem;

impl CombatSystem {
    /// Check if the attack cooldown has elapsed
    pub fn cooldown_ready(last_attack_at: Option<Duration>, now: Duration, cooldown: Duration) -> bool {
        match last_attack_at {
            Some(last) => now.saturating_sub(last) >= cooldown,
            None => true,
        }
    }

    /// Apply damage to health, returns (new_health, is_dead)
    pub fn apply_damage(current_health: f32, damage: f32) -> (f32, bool) {
        let new_health = (current_health - damage).max(0.0);
        (new_health, new_health <= 0.0)
    }

    pub fn valid_damage(damage: f32) -> bool {
        damage.is_finite() && damage >= 0.0
    }
}

/// Why a hit had no effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoredHit {
    /// Addressed to another combatant
    WrongVictim,
    SelfHit,
    InvalidDamage,
    /// Landed in a different life than the current one
    StaleRound { hit_round: u32, life_round: u32 },
    /// Combatant is already dead
    Dead,
}

/// Result of applying a hit to a combatant
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HitOutcome {
    Damaged { health: f32 },
    /// Life ended; reported exactly once per life
    Killed(DeathReport),
    Ignored(IgnoredHit),
}

/// An attack in progress. Contacts inside the window become hits, at most
/// one per victim.
#[derive(Debug, Clone)]
struct Swing {
    until: Duration,
    struck: Vec<ActorId>,
}

/// A participant's fighter, owned and mutated by that participant's peer
#[derive(Debug, Clone)]
pub struct Combatant {
    actor: ActorId,
    max_health: f32,
    health: f32,
    alive: bool,
    /// Round this life belongs to (0 before the first round)
    round: u32,
    pub x: f32,
    pub z: f32,
    pub facing: f32,
    input_enabled: bool,
    last_attack_at: Option<Duration>,
    swing: Option<Swing>,
}

impl Combatant {
    pub fn new(actor: ActorId, max_health: f32, spawn: SpawnPoint) -> Self {
        Self {
            actor,
            max_health,
            health: max_health,
            alive: true,
            round: 0,
            x: spawn.x,
            z: spawn.z,
            facing: spawn.facing,
            input_enabled: false,
            last_attack_at: None,
            swing: None,
        }
    }

    pub fn actor(&self) -> ActorId {
        self.actor
    }

    pub fn health(&self) -> f32 {
        self.health
    }

    pub fn max_health(&self) -> f32 {
        self.max_health
    }

    pub fn alive(&self) -> bool {
        self.alive
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn input_enabled(&self) -> bool {
        self.input_enabled
    }

    pub fn last_attack_at(&self) -> Option<Duration> {
        self.last_attack_at
    }

    pub fn set_input_enabled(&mut self, enabled: bool) {
        self.input_enabled = enabled;
        if !enabled {
            self.swing = None;
        }
    }

    pub fn can_attack(&self, now: Duration, cooldown: Duration) -> bool {
        self.alive
            && self.input_enabled
            && CombatSystem::cooldown_ready(self.last_attack_at, now, cooldown)
    }

    /// Start an attack. No-op (returns false) while dead, disabled or on cooldown.
    pub fn try_attack(&mut self, now: Duration, cooldown: Duration, hit_window: Duration) -> bool {
        if !self.can_attack(now, cooldown) {
            return false;
        }
        self.last_attack_at = Some(now);
        self.swing = Some(Swing {
            until: now + hit_window,
            struck: Vec::new(),
        });
        true
    }

    /// Turn a physics contact into a hit on `victim`, if the current swing
    /// can still connect with it
    pub fn register_contact(&mut self, victim: ActorId, now: Duration, damage: f32) -> Option<Hit> {
        if !self.alive || victim == self.actor {
            return None;
        }
        let swing = self.swing.as_mut()?;
        if now > swing.until || swing.struck.contains(&victim) {
            return None;
        }
        swing.struck.push(victim);

        Some(Hit {
            round: self.round,
            attacker: self.actor,
            victim,
            damage,
        })
    }

    /// Apply a hit addressed to this combatant
    pub fn apply_hit(&mut self, hit: &Hit) -> HitOutcome {
        if hit.victim != self.actor {
            return HitOutcome::Ignored(IgnoredHit::WrongVictim);
        }
        if hit.attacker == self.actor {
            return HitOutcome::Ignored(IgnoredHit::SelfHit);
        }
        if !CombatSystem::valid_damage(hit.damage) {
            return HitOutcome::Ignored(IgnoredHit::InvalidDamage);
        }
        if hit.round != self.round {
            return HitOutcome::Ignored(IgnoredHit::StaleRound {
                hit_round: hit.round,
                life_round: self.round,
            });
        }
        if !self.alive {
            return HitOutcome::Ignored(IgnoredHit::Dead);
        }

        let (new_health, killed) = CombatSystem::apply_damage(self.health, hit.damage);
        self.health = new_health;

        if killed {
            self.alive = false;
            self.swing = None;
            HitOutcome::Killed(DeathReport {
                round: self.round,
                victim: self.actor,
                attacker: hit.attacker,
            })
        } else {
            HitOutcome::Damaged { health: new_health }
        }
    }

    /// Reset for a new round: full health, alive, fresh spawn position
    pub fn respawn(&mut self, round: u32, spawn: SpawnPoint) {
        self.round = round;
        self.health = self.max_health;
        self.alive = true;
        self.x = spawn.x;
        self.z = spawn.z;
        self.facing = spawn.facing;
        self.last_attack_at = None;
        self.swing = None;
    }

    pub fn step_movement(&mut self, move_x: f32, move_z: f32, speed: f32, dt: f32, bounds: &ArenaBounds) {
        if !self.alive || !self.input_enabled {
            return;
        }
        let (x, z, facing) =
            MovementSystem::step(self.x, self.z, self.facing, move_x, move_z, speed, dt, bounds);
        self.x = x;
        self.z = z;
        self.facing = facing;
    }

    pub fn state(&self) -> CombatantState {
        CombatantState {
            actor: self.actor,
            round: self.round,
            x: self.x,
            z: self.z,
            facing: self.facing,
            health: self.health,
            alive: self.alive,
        }
    }
}
