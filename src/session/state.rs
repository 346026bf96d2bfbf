//! Arena session state machine.
//!
//! One [`ArenaSession`] owns everything mutable about a match: the arena
//! record, the participant roster, the mode engine, the action ledger, and
//! the seeded RNG. All entry points take an explicit `now_ms` so the state
//! machine is fully deterministic and testable without a runtime.
//!
//! Phase transitions are strictly monotonic
//! (`Waiting -> Started -> Grace -> Ended`, grace optional). A detected
//! regression voids the match instead of corrupting it.

use indexmap::IndexMap;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::arena::{
    ActionId, ActionRecord, Arena, ArenaId, ArenaPhase, ArenaSettings, Participant, ParticipantId,
};
use crate::error::SessionError;
use crate::modes::{
    ActionOutcome, BuffKind, ModeAction, ModeEngine, ModeEvent, ProgressSummary, RejectReason,
    build_engine,
};
use crate::results::{ArenaResult, ResultStatus, compile};
use crate::scenario::schema::Scenario;
use crate::session::clock;
use crate::session::resolver::{ActionLedger, gate};

// ============================================================================
// Items
// ============================================================================

/// A consumable item applied to a running match.
///
/// Inventory ownership and consumption live with the external inventory
/// collaborator; the session only applies the effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ItemKind {
    /// Pushes the hard deadline back
    TimeExtension {
        /// Extra time in milliseconds
        extra_ms: u64,
    },
    /// Arms a one-shot attack block (capture-and-hold king only)
    Block,
    /// Negates the next penalty (vulnerability race)
    Invincible,
    /// Multiplies points at award time
    ScoreMultiplier {
        /// Multiplier in percent; 150 = +50%
        percent: u32,
    },
    /// Reveals a hint for the next open target
    Hint,
}

impl ItemKind {
    /// Stable kebab-case label for logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::TimeExtension { .. } => "time-extension",
            Self::Block => "block",
            Self::Invincible => "invincible",
            Self::ScoreMultiplier { .. } => "score-multiplier",
            Self::Hint => "hint",
        }
    }

    /// The mode-level buff this item maps to, when it is not a
    /// session-level effect.
    #[must_use]
    pub const fn as_buff(&self) -> Option<BuffKind> {
        match self {
            Self::TimeExtension { .. } => None,
            Self::Block => Some(BuffKind::Block),
            Self::Invincible => Some(BuffKind::Invincible),
            Self::ScoreMultiplier { percent } => {
                Some(BuffKind::ScoreMultiplier { percent: *percent })
            }
            Self::Hint => Some(BuffKind::Hint),
        }
    }
}

// ============================================================================
// Session Events
// ============================================================================

/// An event published to session subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SessionEvent {
    /// A participant joined the lobby
    ParticipantJoined {
        /// The joining participant
        participant: ParticipantId,
        /// Resolved display name
        display_name: String,
    },
    /// A participant left or disconnected
    ParticipantLeft {
        /// The departing participant
        participant: ParticipantId,
    },
    /// A participant toggled readiness
    ParticipantReady {
        /// The participant
        participant: ParticipantId,
        /// New readiness
        ready: bool,
    },
    /// The host started the match
    MatchStarted {
        /// Start time, unix milliseconds
        started_at_ms: u64,
        /// Hard deadline, unix milliseconds
        ends_at_ms: u64,
    },
    /// A mode rule engine event
    Mode(ModeEvent),
    /// First completion opened a grace window for everyone else
    GracePeriodStarted {
        /// Window length in whole seconds
        grace_sec: u64,
        /// Human-readable banner
        message: String,
        /// Participants already finished, exempt from the countdown
        exempt: Vec<ParticipantId>,
    },
    /// Every active participant finished before any deadline
    AllCompleted,
    /// The match ended
    Ended {
        /// Why it ended
        status: ResultStatus,
    },
    /// Clients should navigate to the results view
    RedirectToResults {
        /// Result resource path
        redirect_url: String,
    },
    /// An item was consumed
    ItemUsed {
        /// The consuming participant
        participant: ParticipantId,
        /// The item
        item: ItemKind,
    },
    /// A time extension pushed the hard deadline back
    TimeExtended {
        /// New hard deadline, unix milliseconds
        new_ends_at_ms: u64,
    },
}

/// One leaderboard row, recomputed on demand while the match runs.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardRow {
    /// Participant id
    pub participant: ParticipantId,
    /// Display name
    pub display_name: String,
    /// Current score
    pub score: i64,
    /// Coarse progress
    pub progress: ProgressSummary,
    /// Whether the objective is complete
    pub completed: bool,
}

/// Full state snapshot delivered to new subscribers before live events.
#[derive(Debug, Clone, Serialize)]
pub struct GameStateSnapshot {
    /// Arena record
    pub arena: Arena,
    /// Roster in join order
    pub participants: Vec<Participant>,
    /// Current standings
    pub leaderboard: Vec<LeaderboardRow>,
    /// Mode engine state
    pub mode_state: serde_json::Value,
}

// ============================================================================
// Session
// ============================================================================

/// The authoritative state of one match.
pub struct ArenaSession {
    arena: Arena,
    scenario: Scenario,
    /// Roster in join order; entries are marked, never removed
    participants: IndexMap<ParticipantId, Participant>,
    /// Built at match start
    engine: Option<Box<dyn ModeEngine>>,
    ledger: ActionLedger,
    rng: StdRng,
    result: Option<ArenaResult>,
}

impl ArenaSession {
    /// Creates a session in the `Waiting` phase with the host already
    /// joined.
    #[must_use]
    pub fn new(
        id: ArenaId,
        scenario: Scenario,
        host: ParticipantId,
        host_display_name: String,
        settings: ArenaSettings,
        rng_seed: u64,
        now_ms: u64,
    ) -> Self {
        let arena = Arena {
            id,
            mode: scenario.content.kind(),
            difficulty: scenario.difficulty,
            max_participants: scenario.max_participants,
            phase: ArenaPhase::Waiting,
            host: host.clone(),
            settings,
            started_at_ms: None,
            ends_at_ms: None,
            grace_deadline_ms: None,
            scenario_id: scenario.id.clone(),
        };
        let mut participants = IndexMap::new();
        participants.insert(
            host.clone(),
            Participant {
                id: host,
                display_name: host_display_name,
                joined_at_ms: now_ms,
                ready: true,
                left: false,
                completed_at_ms: None,
            },
        );
        Self {
            arena,
            scenario,
            participants,
            engine: None,
            ledger: ActionLedger::new(),
            rng: StdRng::seed_from_u64(rng_seed),
            result: None,
        }
    }

    /// The arena record.
    #[must_use]
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// The scenario the match was built from.
    #[must_use]
    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Roster in join order.
    #[must_use]
    pub fn participants(&self) -> Vec<Participant> {
        self.participants.values().cloned().collect()
    }

    /// The frozen result, once ended.
    #[must_use]
    pub fn result(&self) -> Option<&ArenaResult> {
        self.result.as_ref()
    }

    /// The resolved action audit trail.
    #[must_use]
    pub fn ledger(&self) -> &ActionLedger {
        &self.ledger
    }

    fn active_count(&self) -> usize {
        self.participants.values().filter(|p| p.is_active()).count()
    }

    // ------------------------------------------------------------------
    // Lobby
    // ------------------------------------------------------------------

    /// Adds a participant to the lobby. Idempotent for an already-active
    /// member; a departed member may rejoin while waiting.
    ///
    /// # Errors
    ///
    /// Rejects joins outside the `Waiting` phase or past the cap.
    pub fn join(
        &mut self,
        id: ParticipantId,
        display_name: String,
        now_ms: u64,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        match self.arena.phase {
            ArenaPhase::Waiting => {}
            ArenaPhase::Ended => return Err(SessionError::SessionEnded),
            ArenaPhase::Started | ArenaPhase::Grace => {
                return Err(SessionError::AlreadyStarted);
            }
        }
        if let Some(existing) = self.participants.get_mut(&id) {
            if existing.is_active() {
                return Ok(Vec::new());
            }
            existing.left = false;
            existing.ready = false;
        } else {
            if self.active_count() >= self.arena.max_participants {
                return Err(SessionError::ArenaFull {
                    max: self.arena.max_participants,
                });
            }
            self.participants.insert(
                id.clone(),
                Participant {
                    id: id.clone(),
                    display_name: display_name.clone(),
                    joined_at_ms: now_ms,
                    ready: false,
                    left: false,
                    completed_at_ms: None,
                },
            );
        }
        Ok(vec![SessionEvent::ParticipantJoined {
            participant: id,
            display_name,
        }])
    }

    /// Marks a participant as departed. Membership is append-only, so the
    /// roster entry stays for history and final ranking.
    ///
    /// # Errors
    ///
    /// Rejects ids that never joined.
    pub fn leave(
        &mut self,
        id: &ParticipantId,
        now_ms: u64,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        let Some(participant) = self.participants.get_mut(id) else {
            return Err(SessionError::NotParticipant { id: id.to_string() });
        };
        if !participant.is_active() {
            return Ok(Vec::new());
        }
        participant.left = true;
        let mut events = vec![SessionEvent::ParticipantLeft {
            participant: id.clone(),
        }];

        // Host hand-off keeps the lobby operable.
        if self.arena.phase == ArenaPhase::Waiting && self.arena.host == *id {
            if let Some(next) = self
                .participants
                .values()
                .find(|p| p.is_active())
                .map(|p| p.id.clone())
            {
                self.arena.host = next;
            }
        }

        if self.arena.phase != ArenaPhase::Ended {
            if self.active_count() == 0 {
                events.extend(self.end(ResultStatus::Forced, now_ms));
            } else if matches!(self.arena.phase, ArenaPhase::Started | ArenaPhase::Grace)
                && self.all_active_finished()
            {
                events.push(SessionEvent::AllCompleted);
                events.extend(self.end(ResultStatus::Completed, now_ms));
            }
        }
        Ok(events)
    }

    /// Toggles lobby readiness.
    ///
    /// # Errors
    ///
    /// Only valid while waiting.
    pub fn set_ready(
        &mut self,
        id: &ParticipantId,
        ready: bool,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        if self.arena.phase != ArenaPhase::Waiting {
            return Err(SessionError::AlreadyStarted);
        }
        let Some(participant) = self.participants.get_mut(id) else {
            return Err(SessionError::NotParticipant { id: id.to_string() });
        };
        participant.ready = ready;
        Ok(vec![SessionEvent::ParticipantReady {
            participant: id.clone(),
            ready,
        }])
    }

    /// Starts the match. Host-only; requires the scenario's minimum
    /// participant count and readiness from everyone but the host.
    ///
    /// # Errors
    ///
    /// Returns the specific precondition that failed.
    pub fn start(
        &mut self,
        id: &ParticipantId,
        now_ms: u64,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        if self.arena.phase != ArenaPhase::Waiting {
            return Err(SessionError::AlreadyStarted);
        }
        if self.arena.host != *id {
            return Err(SessionError::NotHost);
        }
        let have = self.active_count();
        if have < self.scenario.min_participants {
            return Err(SessionError::NotEnoughParticipants {
                have,
                need: self.scenario.min_participants,
            });
        }
        let pending = self
            .participants
            .values()
            .filter(|p| p.is_active() && !p.ready && p.id != self.arena.host)
            .count();
        if pending > 0 {
            return Err(SessionError::NotAllReady { pending });
        }

        let mut engine = build_engine(&self.scenario);
        for p in self.participants.values().filter(|p| p.is_active()) {
            engine.register_participant(&p.id, now_ms);
        }
        self.engine = Some(engine);

        let limit = self
            .arena
            .settings
            .hard_time_limit_ms
            .unwrap_or(self.scenario.time_limit);
        self.arena.started_at_ms = Some(now_ms);
        self.arena.ends_at_ms = Some(now_ms + limit);
        self.transition(ArenaPhase::Started)?;

        Ok(vec![SessionEvent::MatchStarted {
            started_at_ms: now_ms,
            ends_at_ms: now_ms + limit,
        }])
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    /// Resolves one mutating action: de-duplicates, gates, applies, and
    /// records. Returns the outcome plus any session-level events it
    /// triggered (completion, grace, end).
    pub fn handle_action(
        &mut self,
        action_id: ActionId,
        id: &ParticipantId,
        action: &ModeAction,
        now_ms: u64,
    ) -> (ActionOutcome, Vec<SessionEvent>) {
        if let Some(record) = self.ledger.lookup(&action_id) {
            // Replay: the recorded outcome, no new effects, no new events.
            return (record.outcome.clone(), Vec::new());
        }

        let outcome = self.resolve(id, action, now_ms);
        self.ledger.record(ActionRecord {
            action_id,
            participant: id.clone(),
            kind: action.kind_label().to_string(),
            at_ms: now_ms,
            outcome: outcome.clone(),
        });

        let mut events: Vec<SessionEvent> = match &outcome {
            ActionOutcome::Accepted { events } => {
                events.iter().cloned().map(SessionEvent::Mode).collect()
            }
            ActionOutcome::Rejected { .. } => Vec::new(),
        };
        if outcome.is_accepted() {
            events.extend(self.after_mutation(id, now_ms));
        }
        (outcome, events)
    }

    fn resolve(&mut self, id: &ParticipantId, action: &ModeAction, now_ms: u64) -> ActionOutcome {
        let gated = gate(
            &self.arena,
            self.participants.get(id),
            self.engine.as_deref(),
            id,
            false,
        );
        if let Err(reason) = gated {
            return ActionOutcome::rejected(reason);
        }
        let Some(engine) = self.engine.as_mut() else {
            return ActionOutcome::rejected(RejectReason::PhaseForbids {
                phase: self.arena.phase,
            });
        };
        engine.apply(id, action, now_ms, &mut self.rng)
    }

    /// Post-action transitions: completion stamping, all-finished end,
    /// first-solve grace.
    fn after_mutation(&mut self, id: &ParticipantId, now_ms: u64) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let Some(engine) = self.engine.as_deref() else {
            return events;
        };

        let newly_finished = engine.is_finished(id)
            && self
                .participants
                .get(id)
                .is_some_and(|p| p.completed_at_ms.is_none());
        let newly_complete = newly_finished && engine.is_complete(id);
        if newly_finished
            && let Some(p) = self.participants.get_mut(id)
        {
            p.completed_at_ms = Some(now_ms);
        }

        if self.all_active_finished() {
            events.push(SessionEvent::AllCompleted);
            events.extend(self.end(ResultStatus::Completed, now_ms));
        } else if newly_complete
            && self.arena.settings.end_on_first_solve
            && self.arena.phase == ArenaPhase::Started
        {
            events.extend(self.enter_grace(now_ms));
        }
        events
    }

    fn all_active_finished(&self) -> bool {
        let Some(engine) = self.engine.as_deref() else {
            return false;
        };
        let mut any = false;
        for p in self.participants.values().filter(|p| p.is_active()) {
            any = true;
            if !engine.is_finished(&p.id) {
                return false;
            }
        }
        any
    }

    /// Applies a consumable item. De-duplicated through the same ledger as
    /// actions, so a retried use consumes the item once.
    pub fn use_item(
        &mut self,
        action_id: ActionId,
        id: &ParticipantId,
        item: &ItemKind,
        now_ms: u64,
    ) -> (ActionOutcome, Vec<SessionEvent>) {
        if let Some(record) = self.ledger.lookup(&action_id) {
            return (record.outcome.clone(), Vec::new());
        }

        let mut events = Vec::new();
        let gated = gate(
            &self.arena,
            self.participants.get(id),
            self.engine.as_deref(),
            id,
            false,
        );
        let outcome = match gated {
            Err(reason) => ActionOutcome::rejected(reason),
            Ok(()) => {
                events.push(SessionEvent::ItemUsed {
                    participant: id.clone(),
                    item: item.clone(),
                });
                match item {
                    ItemKind::TimeExtension { extra_ms } => {
                        if let Some(ends_at) = self.arena.ends_at_ms.as_mut() {
                            *ends_at += extra_ms;
                            events.push(SessionEvent::TimeExtended {
                                new_ends_at_ms: *ends_at,
                            });
                        }
                        ActionOutcome::accepted(Vec::new())
                    }
                    other => {
                        let effect = other.as_buff().and_then(|buff| {
                            self.engine
                                .as_mut()
                                .and_then(|e| e.apply_buff(id, &buff, now_ms))
                        });
                        if let Some(effect) = &effect {
                            events.push(SessionEvent::Mode(effect.clone()));
                        }
                        ActionOutcome::accepted(effect.into_iter().collect())
                    }
                }
            }
        };

        self.ledger.record(ActionRecord {
            action_id,
            participant: id.clone(),
            kind: "use-item".to_string(),
            at_ms: now_ms,
            outcome: outcome.clone(),
        });
        if !outcome.is_accepted() {
            events.clear();
        }
        (outcome, events)
    }

    // ------------------------------------------------------------------
    // Time
    // ------------------------------------------------------------------

    /// Advances time-derived state and enforces deadlines. Called by the
    /// session actor's periodic tick; all totals are derived from elapsed
    /// time, so the cadence does not affect them.
    pub fn tick(&mut self, now_ms: u64) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if !matches!(self.arena.phase, ArenaPhase::Started | ArenaPhase::Grace) {
            return events;
        }
        if let Some(engine) = self.engine.as_mut() {
            events.extend(engine.tick(now_ms).into_iter().map(SessionEvent::Mode));
        }
        if self.arena.phase == ArenaPhase::Grace
            && let Some(deadline) = self.arena.grace_deadline_ms
            && now_ms >= deadline
        {
            events.extend(self.end(ResultStatus::GraceExpired, now_ms));
            return events;
        }
        if let Some(ends_at) = self.arena.ends_at_ms
            && now_ms >= ends_at
        {
            events.extend(self.end(ResultStatus::TimeLimit, now_ms));
        }
        events
    }

    // ------------------------------------------------------------------
    // End
    // ------------------------------------------------------------------

    /// Ends the match early. When a participant id is supplied, only the
    /// host may do it; operator tooling passes `None`.
    ///
    /// # Errors
    ///
    /// Rejects non-host requesters and already-ended sessions.
    pub fn force_end(
        &mut self,
        requester: Option<&ParticipantId>,
        now_ms: u64,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        if self.arena.phase == ArenaPhase::Ended {
            return Err(SessionError::SessionEnded);
        }
        if let Some(requester) = requester
            && self.arena.host != *requester
        {
            return Err(SessionError::NotHost);
        }
        Ok(self.end(ResultStatus::Forced, now_ms))
    }

    fn enter_grace(&mut self, now_ms: u64) -> Vec<SessionEvent> {
        let remaining = self
            .arena
            .ends_at_ms
            .map_or(0, |e| e.saturating_sub(now_ms));
        let grace_ms = self
            .arena
            .settings
            .grace_ms
            .unwrap_or_else(|| clock::grace_duration_ms(remaining));
        self.arena.grace_deadline_ms = Some(now_ms + grace_ms);
        if self.transition(ArenaPhase::Grace).is_err() {
            return self.void(now_ms);
        }

        let exempt: Vec<ParticipantId> = self
            .engine
            .as_deref()
            .map(|engine| {
                self.participants
                    .values()
                    .filter(|p| p.is_active() && engine.is_finished(&p.id))
                    .map(|p| p.id.clone())
                    .collect()
            })
            .unwrap_or_default();

        let grace_sec = grace_ms / 1000;
        vec![SessionEvent::GracePeriodStarted {
            grace_sec,
            message: format!("First solve is in. {grace_sec}s to finish your run."),
            exempt,
        }]
    }

    fn end(&mut self, status: ResultStatus, now_ms: u64) -> Vec<SessionEvent> {
        if self.arena.phase == ArenaPhase::Ended {
            return Vec::new();
        }
        let mut events = Vec::new();
        if let Some(engine) = self.engine.as_mut() {
            events.extend(engine.finalize(now_ms).into_iter().map(SessionEvent::Mode));
        }
        if self.transition(ArenaPhase::Ended).is_err() {
            // Unreachable given the guard above; keep the match sane anyway.
            self.arena.phase = ArenaPhase::Ended;
        }

        let participants: Vec<Participant> = self.participants.values().cloned().collect();
        let result = self.engine.as_deref().map(|engine| {
            compile(
                self.arena.id.clone(),
                self.arena.mode,
                status,
                now_ms,
                self.arena.started_at_ms,
                &participants,
                engine,
            )
        });
        if let Some(result) = result {
            events.push(SessionEvent::Ended { status });
            events.push(SessionEvent::RedirectToResults {
                redirect_url: format!("/arenas/{}/result", self.arena.id),
            });
            self.result = Some(result);
        } else {
            // Ended before start: an empty result with no rankings.
            self.result = Some(ArenaResult {
                arena_id: self.arena.id.clone(),
                mode: self.arena.mode,
                status,
                ended_at_ms: now_ms,
                winner: None,
                rankings: Vec::new(),
            });
            events.push(SessionEvent::Ended { status });
        }
        events
    }

    /// Voids the match after an invariant violation: no rewards stand.
    fn void(&mut self, now_ms: u64) -> Vec<SessionEvent> {
        self.end(ResultStatus::Void, now_ms)
    }

    /// Asserts forward-only phase movement.
    fn transition(&mut self, next: ArenaPhase) -> Result<(), SessionError> {
        if next <= self.arena.phase {
            return Err(SessionError::InvariantViolation(format!(
                "phase regression {} -> {next}",
                self.arena.phase
            )));
        }
        self.arena.phase = next;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Current standings, best first. Cheap enough to recompute per query.
    #[must_use]
    pub fn leaderboard(&self) -> Vec<LeaderboardRow> {
        let Some(engine) = self.engine.as_deref() else {
            return Vec::new();
        };
        let mut rows: Vec<LeaderboardRow> = self
            .participants
            .values()
            .map(|p| LeaderboardRow {
                participant: p.id.clone(),
                display_name: p.display_name.clone(),
                score: engine.score_of(&p.id),
                progress: engine.progress_of(&p.id),
                completed: engine.is_complete(&p.id),
            })
            .collect();
        rows.sort_by(|a, b| b.completed.cmp(&a.completed).then(b.score.cmp(&a.score)));
        rows
    }

    /// Coarse progress of one participant.
    #[must_use]
    pub fn progress_of(&self, id: &ParticipantId) -> ProgressSummary {
        self.engine
            .as_deref()
            .map(|e| e.progress_of(id))
            .unwrap_or_default()
    }

    /// Snapshot delivered to new subscribers before any live event.
    #[must_use]
    pub fn snapshot(&self) -> GameStateSnapshot {
        GameStateSnapshot {
            arena: self.arena.clone(),
            participants: self.participants(),
            leaderboard: self.leaderboard(),
            mode_state: self
                .engine
                .as_deref()
                .map(ModeEngine::snapshot)
                .unwrap_or(serde_json::Value::Null),
        }
    }
}
