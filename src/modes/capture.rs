//! Capture-and-hold rule engine.
//!
//! Participants spend energy on attack moves to seize a contested resource;
//! the holder ("king") accrues passive score and may spend energy on defense
//! moves. Energy, cooldowns, passive score, and hold milestones are all
//! derived from stored timestamps, never from per-tick accumulation.

use std::collections::BTreeMap;

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::arena::ParticipantId;
use crate::scenario::schema::{CaptureContent, CaptureMove, ModeKind, MoveEffect, MoveKind};
use crate::session::clock;

use super::{
    ActionOutcome, BuffKind, ModeAction, ModeEngine, ModeEvent, ProgressSummary, RejectReason,
};

/// Percentage points subtracted from an attack's success rate per point of
/// the king's defense level.
pub const DEFENSE_RATE_PENALTY: u32 = 5;

/// Floor for the effective success rate: an attack is never impossible.
pub const MIN_SUCCESS_RATE: u32 = 5;

/// Per-participant capture-and-hold state.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Combatant {
    energy: f64,
    last_energy_update_ms: u64,
    score: i64,
    cumulative_king_time_ms: u64,
    times_king: u32,
    /// Move id -> cooldown expiry, unix milliseconds
    cooldowns: BTreeMap<String, u64>,
    /// Score multiplier in percent; 100 = no buff
    score_multiplier_pct: u32,
}

impl Combatant {
    fn new(max_energy: u32, now_ms: u64) -> Self {
        Self {
            energy: f64::from(max_energy),
            last_energy_update_ms: now_ms,
            score: 0,
            cumulative_king_time_ms: 0,
            times_king: 0,
            cooldowns: BTreeMap::new(),
            score_multiplier_pct: 100,
        }
    }

    fn award(&mut self, points: i64) -> i64 {
        let scaled = points * i64::from(self.score_multiplier_pct) / 100;
        self.score = (self.score + scaled).max(0);
        scaled
    }
}

/// Full snapshot-able engine state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CaptureState {
    /// Current crown holder; at most one at any instant
    king: Option<ParticipantId>,
    crowned_at_ms: u64,
    defense_level: u32,
    /// One-shot block armed by the king, consumed by the next incoming attack
    block_armed: bool,
    /// Whole seconds of the current reign already credited as passive score
    reign_credited_sec: u64,
    /// Milestone thresholds already awarded during the current reign
    reign_milestones_awarded: Vec<u64>,
    combatants: BTreeMap<ParticipantId, Combatant>,
}

/// Capture-and-hold mode engine.
pub struct CaptureEngine {
    content: CaptureContent,
    state: CaptureState,
}

impl CaptureEngine {
    /// Creates a fresh engine from scenario content.
    #[must_use]
    pub fn new(content: CaptureContent) -> Self {
        Self {
            content,
            state: CaptureState::default(),
        }
    }

    /// Restores an engine from a [`snapshot`](ModeEngine::snapshot).
    ///
    /// # Errors
    ///
    /// Returns a JSON error if the snapshot shape does not match.
    pub fn restore(
        content: CaptureContent,
        snapshot: &serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        let state: CaptureState = serde_json::from_value(snapshot.clone())?;
        Ok(Self { content, state })
    }

    fn find_move(&self, move_id: &str) -> Option<&CaptureMove> {
        self.content.moves.iter().find(|m| m.id == move_id)
    }

    /// Settles the current reign's passive score and milestone bonuses up
    /// to `now_ms`. Idempotent for a fixed `now_ms`.
    fn settle_reign(&mut self, now_ms: u64) -> Vec<ModeEvent> {
        let mut events = Vec::new();
        let Some(king) = self.state.king.clone() else {
            return events;
        };

        let owed_sec = clock::uncredited_hold_seconds(
            self.state.crowned_at_ms,
            now_ms,
            self.state.reign_credited_sec,
        );
        if owed_sec > 0 {
            self.state.reign_credited_sec += owed_sec;
            if let Some(combatant) = self.state.combatants.get_mut(&king) {
                #[allow(clippy::cast_possible_wrap)]
                combatant.award(owed_sec as i64 * self.content.points_per_second);
            }
        }

        let held_ms = now_ms.saturating_sub(self.state.crowned_at_ms);
        for (threshold_ms, bonus) in [
            (clock::HOLD_MILESTONES_MS[0], self.content.milestone_5s_bonus),
            (
                clock::HOLD_MILESTONES_MS[1],
                self.content.milestone_60s_bonus,
            ),
        ] {
            if held_ms >= threshold_ms
                && !self.state.reign_milestones_awarded.contains(&threshold_ms)
            {
                self.state.reign_milestones_awarded.push(threshold_ms);
                let credited = self
                    .state
                    .combatants
                    .get_mut(&king)
                    .map_or(0, |c| c.award(bonus));
                events.push(ModeEvent::HoldMilestone {
                    participant: king.clone(),
                    held_ms: threshold_ms,
                    bonus: credited,
                });
            }
        }

        events
    }

    /// Ends the current reign: settles score, accrues held time, clears the
    /// crown bookkeeping. Returns the previous king.
    fn end_reign(&mut self, now_ms: u64, events: &mut Vec<ModeEvent>) -> Option<ParticipantId> {
        events.extend(self.settle_reign(now_ms));
        let previous = self.state.king.take()?;
        let held = now_ms.saturating_sub(self.state.crowned_at_ms);
        if let Some(combatant) = self.state.combatants.get_mut(&previous) {
            combatant.cumulative_king_time_ms += held;
        }
        self.state.defense_level = 0;
        self.state.block_armed = false;
        self.state.reign_credited_sec = 0;
        self.state.reign_milestones_awarded.clear();
        Some(previous)
    }

    /// Checks energy and cooldown, then commits the spend. Returns the
    /// rejection on failure without mutating anything.
    fn spend(
        &mut self,
        id: &ParticipantId,
        mv: &CaptureMove,
        now_ms: u64,
    ) -> Result<(), RejectReason> {
        let max_energy = self.content.max_energy;
        let regen = self.content.energy_regen_per_sec;
        let Some(combatant) = self.state.combatants.get_mut(id) else {
            return Err(RejectReason::NotParticipant);
        };

        let energy = clock::energy_at(
            combatant.energy,
            combatant.last_energy_update_ms,
            now_ms,
            regen,
            max_energy,
        );
        if energy < f64::from(mv.energy_cost) {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            return Err(RejectReason::InsufficientEnergy {
                required: mv.energy_cost,
                available: energy.floor() as u32,
            });
        }

        if let Some(expiry) = combatant.cooldowns.get(&mv.id)
            && let Some(remaining_ms) = clock::cooldown_remaining_ms(*expiry, now_ms)
        {
            return Err(RejectReason::CooldownActive { remaining_ms });
        }

        combatant.energy = energy - f64::from(mv.energy_cost);
        combatant.last_energy_update_ms = now_ms;
        if mv.cooldown_ms > 0 {
            combatant
                .cooldowns
                .insert(mv.id.clone(), now_ms + mv.cooldown_ms);
        }
        Ok(())
    }

    /// Effective success rate after the defending king's defense level,
    /// floored so an attack is never impossible.
    fn effective_rate(&self, base_rate: u8) -> u32 {
        u32::from(base_rate)
            .saturating_sub(self.state.defense_level * DEFENSE_RATE_PENALTY)
            .max(MIN_SUCCESS_RATE)
    }

    fn apply_attack(
        &mut self,
        id: &ParticipantId,
        mv: &CaptureMove,
        now_ms: u64,
        rng: &mut StdRng,
    ) -> ActionOutcome {
        if let Err(reason) = self.spend(id, mv, now_ms) {
            return ActionOutcome::rejected(reason);
        }

        let mut events = Vec::new();
        events.extend(self.settle_reign(now_ms));

        // A block armed by the king absorbs the first incoming attack.
        if self.state.block_armed && self.state.king.as_ref() != Some(id) {
            self.state.block_armed = false;
            events.push(ModeEvent::AttackRepelled {
                attacker: id.clone(),
                blocked: true,
            });
            return ActionOutcome::accepted(events);
        }

        let rate = self.effective_rate(mv.success_rate);
        if rng.random_range(0..100_u32) >= rate {
            events.push(ModeEvent::AttackRepelled {
                attacker: id.clone(),
                blocked: false,
            });
            return ActionOutcome::accepted(events);
        }

        match &mv.effect {
            MoveEffect::Capture => {
                let previous = self.end_reign(now_ms, &mut events);
                self.state.king = Some(id.clone());
                self.state.crowned_at_ms = now_ms;
                if let Some(combatant) = self.state.combatants.get_mut(id) {
                    combatant.times_king += 1;
                }
                events.push(ModeEvent::KingChanged {
                    new_king: Some(id.clone()),
                    previous,
                });
            }
            MoveEffect::Points { points } => {
                if let Some(combatant) = self.state.combatants.get_mut(id) {
                    let credited = combatant.award(*points);
                    events.push(ModeEvent::PointsAwarded {
                        participant: id.clone(),
                        points: credited,
                        total: combatant.score,
                    });
                }
            }
            MoveEffect::DefenseLevel { .. } | MoveEffect::Block => {
                // Misauthored scenario: defensive effect on an attack move.
                // The spend stands; the effect is inert.
            }
        }

        ActionOutcome::accepted(events)
    }

    fn apply_defense(
        &mut self,
        id: &ParticipantId,
        mv: &CaptureMove,
        now_ms: u64,
        rng: &mut StdRng,
    ) -> ActionOutcome {
        if self.state.king.as_ref() != Some(id) {
            return ActionOutcome::rejected(RejectReason::NotKing);
        }
        if let Err(reason) = self.spend(id, mv, now_ms) {
            return ActionOutcome::rejected(reason);
        }

        let mut events = self.settle_reign(now_ms);

        if rng.random_range(0..100_u32) >= u32::from(mv.success_rate) {
            return ActionOutcome::accepted(events);
        }

        match &mv.effect {
            MoveEffect::DefenseLevel { bonus } => {
                self.state.defense_level += bonus;
                events.push(ModeEvent::DefenseRaised {
                    level: self.state.defense_level,
                });
            }
            MoveEffect::Block => {
                self.state.block_armed = true;
                events.push(ModeEvent::BlockArmed);
            }
            MoveEffect::Capture | MoveEffect::Points { .. } => {
                // Misauthored scenario: offensive effect on a defense move.
            }
        }

        ActionOutcome::accepted(events)
    }

    /// Current energy of a participant, for snapshots and assertions.
    #[must_use]
    pub fn energy_of(&self, id: &ParticipantId, now_ms: u64) -> Option<f64> {
        self.state.combatants.get(id).map(|c| {
            clock::energy_at(
                c.energy,
                c.last_energy_update_ms,
                now_ms,
                self.content.energy_regen_per_sec,
                self.content.max_energy,
            )
        })
    }

    /// Current crown holder.
    #[must_use]
    pub fn king(&self) -> Option<&ParticipantId> {
        self.state.king.as_ref()
    }

    /// Cumulative crowned time including the live reign.
    #[must_use]
    pub fn held_time_ms(&self, id: &ParticipantId, now_ms: u64) -> u64 {
        let settled = self
            .state
            .combatants
            .get(id)
            .map_or(0, |c| c.cumulative_king_time_ms);
        if self.state.king.as_ref() == Some(id) {
            settled + now_ms.saturating_sub(self.state.crowned_at_ms)
        } else {
            settled
        }
    }

    /// How many times the participant has been crowned.
    #[must_use]
    pub fn times_king(&self, id: &ParticipantId) -> u32 {
        self.state.combatants.get(id).map_or(0, |c| c.times_king)
    }
}

impl ModeEngine for CaptureEngine {
    fn kind(&self) -> ModeKind {
        ModeKind::CaptureHold
    }

    fn register_participant(&mut self, id: &ParticipantId, now_ms: u64) {
        self.state
            .combatants
            .entry(id.clone())
            .or_insert_with(|| Combatant::new(self.content.max_energy, now_ms));
    }

    fn apply(
        &mut self,
        id: &ParticipantId,
        action: &ModeAction,
        now_ms: u64,
        rng: &mut StdRng,
    ) -> ActionOutcome {
        let (move_id, expected_kind) = match action {
            ModeAction::Attack { move_id } => (move_id, MoveKind::Attack),
            ModeAction::Defend { move_id } => (move_id, MoveKind::Defense),
            _ => return ActionOutcome::rejected(RejectReason::WrongMode),
        };
        let Some(mv) = self.find_move(move_id).cloned() else {
            return ActionOutcome::rejected(RejectReason::UnknownTarget {
                id: move_id.clone(),
            });
        };
        if mv.kind != expected_kind {
            return ActionOutcome::rejected(RejectReason::UnknownTarget {
                id: move_id.clone(),
            });
        }
        match expected_kind {
            MoveKind::Attack => self.apply_attack(id, &mv, now_ms, rng),
            MoveKind::Defense => self.apply_defense(id, &mv, now_ms, rng),
        }
    }

    fn tick(&mut self, now_ms: u64) -> Vec<ModeEvent> {
        self.settle_reign(now_ms)
    }

    fn is_complete(&self, _id: &ParticipantId) -> bool {
        // Capture-and-hold has no solve condition; matches run to time.
        false
    }

    fn score_of(&self, id: &ParticipantId) -> i64 {
        self.state.combatants.get(id).map_or(0, |c| c.score)
    }

    fn progress_of(&self, id: &ParticipantId) -> ProgressSummary {
        ProgressSummary {
            done: self
                .state
                .combatants
                .get(id)
                .map_or(0, |c| c.cumulative_king_time_ms / 1000),
            total: 0,
        }
    }

    fn apply_buff(
        &mut self,
        id: &ParticipantId,
        buff: &BuffKind,
        _now_ms: u64,
    ) -> Option<ModeEvent> {
        match buff {
            BuffKind::Block => {
                if self.state.king.as_ref() == Some(id) {
                    self.state.block_armed = true;
                    Some(ModeEvent::BlockArmed)
                } else {
                    None
                }
            }
            BuffKind::ScoreMultiplier { percent } => {
                if let Some(combatant) = self.state.combatants.get_mut(id) {
                    combatant.score_multiplier_pct = *percent;
                }
                None
            }
            BuffKind::Invincible | BuffKind::Hint => None,
        }
    }

    fn finalize(&mut self, now_ms: u64) -> Vec<ModeEvent> {
        let mut events = Vec::new();
        self.end_reign(now_ms, &mut events);
        events
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(&self.state).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn content() -> CaptureContent {
        CaptureContent {
            max_energy: 100,
            energy_regen_per_sec: 2.0,
            points_per_second: 2,
            milestone_5s_bonus: 10,
            milestone_60s_bonus: 100,
            moves: vec![
                CaptureMove {
                    id: "exploit".to_string(),
                    name: "Remote exploit".to_string(),
                    kind: MoveKind::Attack,
                    energy_cost: 15,
                    cooldown_ms: 3_000,
                    success_rate: 100,
                    effect: MoveEffect::Capture,
                },
                CaptureMove {
                    id: "probe".to_string(),
                    name: "Port probe".to_string(),
                    kind: MoveKind::Attack,
                    energy_cost: 5,
                    cooldown_ms: 0,
                    success_rate: 100,
                    effect: MoveEffect::Points { points: 3 },
                },
                CaptureMove {
                    id: "harden".to_string(),
                    name: "Harden service".to_string(),
                    kind: MoveKind::Defense,
                    energy_cost: 10,
                    cooldown_ms: 0,
                    success_rate: 100,
                    effect: MoveEffect::DefenseLevel { bonus: 1 },
                },
                CaptureMove {
                    id: "firewall".to_string(),
                    name: "Emergency firewall".to_string(),
                    kind: MoveKind::Defense,
                    energy_cost: 20,
                    cooldown_ms: 0,
                    success_rate: 100,
                    effect: MoveEffect::Block,
                },
            ],
        }
    }

    fn engine_with(participants: &[&str], now_ms: u64) -> CaptureEngine {
        let mut engine = CaptureEngine::new(content());
        for p in participants {
            engine.register_participant(&ParticipantId::new(*p), now_ms);
        }
        engine
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_capture_uncrowned_server() {
        // Two participants at 100/100 energy; A attacks (cost 15, rate 100)
        // an uncrowned server: A becomes king, energy 85, one king-changed.
        let mut engine = engine_with(&["a", "b"], 0);
        let a = ParticipantId::new("a");

        let outcome = engine.apply(
            &a,
            &ModeAction::Attack {
                move_id: "exploit".to_string(),
            },
            0,
            &mut rng(),
        );

        let ActionOutcome::Accepted { events } = outcome else {
            panic!("attack should be accepted");
        };
        let king_changes: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, ModeEvent::KingChanged { .. }))
            .collect();
        assert_eq!(king_changes.len(), 1, "exactly one king-changed event");
        assert_eq!(engine.king(), Some(&a));
        assert!((engine.energy_of(&a, 0).unwrap() - 85.0).abs() < f64::EPSILON);
        assert_eq!(engine.times_king(&a), 1);
    }

    #[test]
    fn test_insufficient_energy_rejected() {
        let mut engine = engine_with(&["a"], 0);
        let a = ParticipantId::new("a");
        // Drain with captures spaced past the cooldown: 15 energy each,
        // 2/sec regen.
        let attack = ModeAction::Attack {
            move_id: "exploit".to_string(),
        };
        for i in 0..6 {
            let outcome = engine.apply(&a, &attack, i * 4_000, &mut rng());
            assert!(outcome.is_accepted(), "attack {i} should be accepted");
        }
        // After 6 uses: 100 - 90 spent + 40s * 2 regen capped... verify via
        // a deliberately early 7th use at t=20_000 (cooldown long expired).
        let energy = engine.energy_of(&a, 20_001).unwrap();
        let outcome = engine.apply(&a, &attack, 20_001, &mut rng());
        if energy < 15.0 {
            assert!(matches!(
                outcome,
                ActionOutcome::Rejected {
                    reason: RejectReason::InsufficientEnergy { .. }
                }
            ));
        }
        // Regardless of the roll above, energy stays in bounds.
        let e = engine.energy_of(&a, 20_001).unwrap();
        assert!((0.0..=100.0).contains(&e));
    }

    #[test]
    fn test_cooldown_rejected_with_remaining() {
        let mut engine = engine_with(&["a"], 0);
        let a = ParticipantId::new("a");
        let attack = ModeAction::Attack {
            move_id: "exploit".to_string(),
        };
        assert!(engine.apply(&a, &attack, 0, &mut rng()).is_accepted());

        let outcome = engine.apply(&a, &attack, 1_000, &mut rng());
        assert_eq!(
            outcome,
            ActionOutcome::rejected(RejectReason::CooldownActive { remaining_ms: 2_000 })
        );
    }

    #[test]
    fn test_defense_requires_crown() {
        let mut engine = engine_with(&["a", "b"], 0);
        let b = ParticipantId::new("b");
        let outcome = engine.apply(
            &b,
            &ModeAction::Defend {
                move_id: "harden".to_string(),
            },
            0,
            &mut rng(),
        );
        assert_eq!(outcome, ActionOutcome::rejected(RejectReason::NotKing));
    }

    #[test]
    fn test_block_consumed_by_first_incoming_attack() {
        let mut engine = engine_with(&["a", "b"], 0);
        let a = ParticipantId::new("a");
        let b = ParticipantId::new("b");
        let mut r = rng();

        engine.apply(
            &a,
            &ModeAction::Attack {
                move_id: "exploit".to_string(),
            },
            0,
            &mut r,
        );
        assert_eq!(engine.king(), Some(&a));

        let outcome = engine.apply(
            &a,
            &ModeAction::Defend {
                move_id: "firewall".to_string(),
            },
            1_000,
            &mut r,
        );
        let ActionOutcome::Accepted { events } = outcome else {
            panic!("block should be accepted");
        };
        assert!(events.contains(&ModeEvent::BlockArmed));

        // B's first attack is absorbed; the crown stays with A.
        let outcome = engine.apply(
            &b,
            &ModeAction::Attack {
                move_id: "exploit".to_string(),
            },
            2_000,
            &mut r,
        );
        let ActionOutcome::Accepted { events } = outcome else {
            panic!("blocked attack is still an accepted action");
        };
        assert!(events.contains(&ModeEvent::AttackRepelled {
            attacker: b.clone(),
            blocked: true,
        }));
        assert_eq!(engine.king(), Some(&a));

        // The block is one-shot: B's second attack (rate 100) captures.
        let outcome = engine.apply(
            &b,
            &ModeAction::Attack {
                move_id: "exploit".to_string(),
            },
            6_000,
            &mut r,
        );
        assert!(outcome.is_accepted());
        assert_eq!(engine.king(), Some(&b));
    }

    #[test]
    fn test_passive_score_and_milestones_from_elapsed_time() {
        let mut engine = engine_with(&["a"], 0);
        let a = ParticipantId::new("a");
        engine.apply(
            &a,
            &ModeAction::Attack {
                move_id: "exploit".to_string(),
            },
            0,
            &mut rng(),
        );

        // Tick far past the 5s milestone in one jump: passive score and the
        // milestone are both settled from elapsed time.
        let events = engine.tick(10_000);
        let milestones: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, ModeEvent::HoldMilestone { held_ms: 5_000, .. }))
            .collect();
        assert_eq!(milestones.len(), 1);
        // 10 seconds * 2 pps + 10 milestone bonus
        assert_eq!(engine.score_of(&a), 30);

        // Re-ticking the same instant awards nothing further.
        assert!(engine.tick(10_000).is_empty());
        assert_eq!(engine.score_of(&a), 30);

        // The 60s milestone fires exactly once too.
        let events = engine.tick(61_000);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, ModeEvent::HoldMilestone { held_ms: 60_000, .. }))
                .count(),
            1
        );
        assert!(engine.tick(61_500).is_empty());
    }

    #[test]
    fn test_milestones_reset_on_new_reign() {
        let mut engine = engine_with(&["a", "b"], 0);
        let a = ParticipantId::new("a");
        let b = ParticipantId::new("b");
        let mut r = rng();
        let attack = ModeAction::Attack {
            move_id: "exploit".to_string(),
        };

        engine.apply(&a, &attack, 0, &mut r);
        engine.tick(6_000); // A's 5s milestone fires
        engine.apply(&b, &attack, 7_000, &mut r); // B captures
        assert_eq!(engine.king(), Some(&b));

        // B's own 5s milestone fires for the new reign.
        let events = engine.tick(13_000);
        assert!(events.iter().any(|e| matches!(
            e,
            ModeEvent::HoldMilestone {
                participant,
                held_ms: 5_000,
                ..
            } if *participant == b
        )));
    }

    #[test]
    fn test_held_time_accrues_across_reigns() {
        let mut engine = engine_with(&["a", "b"], 0);
        let a = ParticipantId::new("a");
        let b = ParticipantId::new("b");
        let mut r = rng();
        let attack = ModeAction::Attack {
            move_id: "exploit".to_string(),
        };

        engine.apply(&a, &attack, 0, &mut r);
        engine.apply(&b, &attack, 4_000, &mut r);
        engine.finalize(10_000);

        assert_eq!(engine.held_time_ms(&a, 10_000), 4_000);
        assert_eq!(engine.held_time_ms(&b, 10_000), 6_000);
        // Sum of held time never exceeds elapsed session time.
        assert!(engine.held_time_ms(&a, 10_000) + engine.held_time_ms(&b, 10_000) <= 10_000);
    }

    #[test]
    fn test_defense_reduces_effective_rate_with_floor() {
        let mut engine = engine_with(&["a"], 0);
        engine.state.defense_level = 10;
        // 70 - 10*5 = 20
        assert_eq!(engine.effective_rate(70), 20);
        engine.state.defense_level = 30;
        // Floored at 5, never impossible
        assert_eq!(engine.effective_rate(70), MIN_SUCCESS_RATE);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut engine = engine_with(&["a", "b"], 0);
        let a = ParticipantId::new("a");
        let b = ParticipantId::new("b");
        let mut r = rng();
        engine.apply(
            &a,
            &ModeAction::Attack {
                move_id: "exploit".to_string(),
            },
            0,
            &mut r,
        );
        engine.tick(10_000);

        let snapshot = engine.snapshot();
        let restored = CaptureEngine::restore(content(), &snapshot).unwrap();

        for id in [&a, &b] {
            assert_eq!(restored.score_of(id), engine.score_of(id));
            assert_eq!(restored.is_complete(id), engine.is_complete(id));
        }
        assert_eq!(restored.king(), engine.king());
    }

    #[test]
    fn test_unknown_move_rejected() {
        let mut engine = engine_with(&["a"], 0);
        let outcome = engine.apply(
            &ParticipantId::new("a"),
            &ModeAction::Attack {
                move_id: "nope".to_string(),
            },
            0,
            &mut rng(),
        );
        assert!(matches!(
            outcome,
            ActionOutcome::Rejected {
                reason: RejectReason::UnknownTarget { .. }
            }
        ));
    }

    #[test]
    fn test_score_multiplier_applies_at_award_time() {
        let mut engine = engine_with(&["a"], 0);
        let a = ParticipantId::new("a");
        let mut r = rng();
        let probe = ModeAction::Attack {
            move_id: "probe".to_string(),
        };

        engine.apply(&a, &probe, 0, &mut r);
        assert_eq!(engine.score_of(&a), 3);

        engine.apply_buff(&a, &BuffKind::ScoreMultiplier { percent: 200 }, 1_000);
        engine.apply(&a, &probe, 1_000, &mut r);
        // Earlier award untouched; new award doubled.
        assert_eq!(engine.score_of(&a), 9);
    }
}
