//! Mode rule engines.
//!
//! Each game mode implements the [`ModeEngine`] contract: apply an action,
//! advance time, report completion, report score, produce a snapshot. The
//! engine variant is chosen once at session construction via
//! [`build_engine`] and never re-inspected afterwards.
//!
//! Engines are pure with respect to time and randomness: every entry point
//! takes an explicit `now_ms`, and probabilistic resolution draws from the
//! session's seeded RNG passed by the caller. That keeps replays and
//! snapshot round-trips deterministic.

pub mod capture;
pub mod command_race;
pub mod dialogue;
pub mod forensics;
pub mod vuln_race;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::arena::{ArenaPhase, ParticipantId};
use crate::scenario::schema::{ModeContent, ModeKind, Scenario};

pub use capture::CaptureEngine;
pub use command_race::CommandRaceEngine;
pub use dialogue::DialogueEngine;
pub use forensics::ForensicsEngine;
pub use vuln_race::VulnRaceEngine;

// ============================================================================
// Actions
// ============================================================================

/// A mutating player action, already stripped of transport framing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ModeAction {
    /// Command race: submit a command line
    Execute {
        /// Raw command line as typed
        command: String,
    },
    /// Forensics: answer a question
    SubmitAnswer {
        /// Target question id
        question_id: String,
        /// Submitted answer
        answer: String,
    },
    /// Vulnerability race: submit a flag
    SubmitFlag {
        /// Submitted flag string
        flag: String,
    },
    /// Capture-and-hold: use an attack move
    Attack {
        /// Move id from the scenario catalog
        move_id: String,
    },
    /// Capture-and-hold: use a defense move (king only)
    Defend {
        /// Move id from the scenario catalog
        move_id: String,
    },
    /// Dialogue: play a technique for this turn
    DialogueChoice {
        /// Technique id from the scenario catalog
        technique_id: String,
    },
}

impl ModeAction {
    /// Short label used in audit records and metrics.
    #[must_use]
    pub const fn kind_label(&self) -> &'static str {
        match self {
            Self::Execute { .. } => "execute",
            Self::SubmitAnswer { .. } => "submit-answer",
            Self::SubmitFlag { .. } => "submit-flag",
            Self::Attack { .. } => "attack",
            Self::Defend { .. } => "defend",
            Self::DialogueChoice { .. } => "dialogue-choice",
        }
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Result of resolving one action.
///
/// `Rejected` is the normal, non-exceptional shape for resource exhaustion,
/// phase violations, and malformed targets — session state is untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum ActionOutcome {
    /// The action was applied; `events` carries its externally visible
    /// effects for broadcast
    Accepted {
        /// Effects produced by the rule engine
        events: Vec<ModeEvent>,
    },
    /// The action was not applied
    Rejected {
        /// Structured reason code rendered as inline feedback
        reason: RejectReason,
    },
}

impl ActionOutcome {
    /// Convenience constructor for a single-event acceptance.
    #[must_use]
    pub fn accepted(events: Vec<ModeEvent>) -> Self {
        Self::Accepted { events }
    }

    /// Convenience constructor for a rejection.
    #[must_use]
    pub const fn rejected(reason: RejectReason) -> Self {
        Self::Rejected { reason }
    }

    /// True for the `Accepted` variant.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Structured rejection reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum RejectReason {
    /// Sender is not a participant of this arena
    NotParticipant,
    /// The session has ended; no further actions are accepted
    SessionEnded,
    /// The current phase forbids mutation (e.g. still in the lobby)
    PhaseForbids {
        /// The offending phase
        phase: ArenaPhase,
    },
    /// The participant already finished and may only issue read queries
    AlreadyComplete,
    /// Not enough energy for the move
    InsufficientEnergy {
        /// Energy the move costs
        required: u32,
        /// Energy currently available (floored)
        available: u32,
    },
    /// The move is still cooling down
    CooldownActive {
        /// Milliseconds until the move is usable again
        remaining_ms: u64,
    },
    /// Defense moves are usable only by the current king
    NotKing,
    /// The question/vulnerability was already solved by this participant
    AlreadySolved,
    /// The referenced move/question/technique does not exist
    UnknownTarget {
        /// The id that failed to resolve
        id: String,
    },
    /// The action shape does not fit this mode
    WrongMode,
    /// The dialogue is over for this participant
    ConversationOver,
}

// ============================================================================
// Events
// ============================================================================

/// Externally visible effect of an accepted action or a scheduler tick.
///
/// Broadcast to subscribed viewers as deltas; passive state is additionally
/// resynchronized via snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ModeEvent {
    /// Crown changed hands (capture-and-hold); fires exactly once per
    /// reassignment
    KingChanged {
        /// New crown holder (`None` when the resource is uncrowned)
        new_king: Option<ParticipantId>,
        /// Previous holder
        previous: Option<ParticipantId>,
    },
    /// An attack resolved without capturing
    AttackRepelled {
        /// The attacker
        attacker: ParticipantId,
        /// Whether a one-shot block absorbed the attack
        blocked: bool,
    },
    /// The king raised the defense level
    DefenseRaised {
        /// New defense level
        level: u32,
    },
    /// The king armed a one-shot block
    BlockArmed,
    /// Points were awarded
    PointsAwarded {
        /// Receiving participant
        participant: ParticipantId,
        /// Points credited (after any score multiplier)
        points: i64,
        /// Participant's new total
        total: i64,
    },
    /// Continuous-hold milestone crossed (exactly once per reign)
    HoldMilestone {
        /// The king
        participant: ParticipantId,
        /// Continuous hold length that was rewarded, in milliseconds
        held_ms: u64,
        /// Bonus credited
        bonus: i64,
    },
    /// Command race: simulated terminal output
    CommandOutput {
        /// The submitting participant
        participant: ParticipantId,
        /// Terminal output to render
        output: String,
    },
    /// Command race: a new stage was entered; the prompt is delivered
    /// exactly once per stage
    StagePrompt {
        /// The advancing participant
        participant: ParticipantId,
        /// 1-based stage number
        stage: usize,
        /// Stage prompt text
        prompt: String,
    },
    /// Forensics: correct answer
    AnswerAccepted {
        /// The answering participant
        participant: ParticipantId,
        /// The solved question
        question_id: String,
        /// Whether this was the first attempt
        first_try: bool,
    },
    /// Forensics: incorrect answer (accepted action, failed result)
    AnswerRejected {
        /// The answering participant
        participant: ParticipantId,
        /// The attempted question
        question_id: String,
        /// Attempts recorded so far for this question
        attempts: u32,
    },
    /// Vulnerability race: a target was found
    VulnFound {
        /// The finding participant
        participant: ParticipantId,
        /// The found vulnerability id
        vuln_id: String,
    },
    /// Vulnerability race: invalid flag (accepted action, failed result)
    FlagRejected {
        /// The submitting participant
        participant: ParticipantId,
        /// Whether a penalty was applied (false when negated by a buff)
        penalized: bool,
    },
    /// A one-shot invincibility buff negated a penalty
    PenaltyNegated {
        /// The protected participant
        participant: ParticipantId,
    },
    /// Dialogue: the target replied
    DialogueReply {
        /// The acting participant
        participant: ParticipantId,
        /// Target's reply line
        reply: String,
        /// Suspicion after this turn
        suspicion: u32,
        /// Objectives covered so far
        covered: usize,
    },
    /// Dialogue: suspicion threshold crossed, objective failed
    ObjectiveFailed {
        /// The failing participant
        participant: ParticipantId,
        /// Final suspicion score
        suspicion: u32,
    },
    /// A hint was revealed by the hint item
    HintRevealed {
        /// The receiving participant
        participant: ParticipantId,
        /// Hint text
        hint: String,
    },
    /// The participant completed the mode's objective
    Completed {
        /// The completing participant
        participant: ParticipantId,
    },
}

// ============================================================================
// Buffs
// ============================================================================

/// A buff applied to a live match through the inventory collaborator's
/// item-use interface. Each application is idempotent per use-id (the
/// session reuses its action de-duplication memo).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BuffKind {
    /// One-shot block consumed by the next incoming attack (capture king)
    Block,
    /// One-shot negation of the next invalid-submission penalty
    Invincible,
    /// Multiplies points at the moment they are awarded, not retroactively
    ScoreMultiplier {
        /// Multiplier in percent (e.g. 200 doubles awards)
        percent: u32,
    },
    /// Reveal a hint for the next unsolved target
    Hint,
}

// ============================================================================
// Progress
// ============================================================================

/// Coarse progress used in rankings and progress queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ProgressSummary {
    /// Units completed (stages passed, questions answered, vulns found,
    /// objectives covered; crown time seconds for capture-and-hold)
    pub done: u64,
    /// Total units in the scenario (0 when open-ended)
    pub total: u64,
}

// ============================================================================
// Engine Contract
// ============================================================================

/// Common contract implemented by every mode rule engine.
///
/// Implementations own all mode-specific state and perform no I/O; the
/// session actor serializes every call.
pub trait ModeEngine: Send {
    /// The mode this engine implements.
    fn kind(&self) -> ModeKind;

    /// Registers a participant at match start.
    fn register_participant(&mut self, id: &ParticipantId, now_ms: u64);

    /// Applies one action, resolving probabilistic outcomes through `rng`.
    fn apply(
        &mut self,
        id: &ParticipantId,
        action: &ModeAction,
        now_ms: u64,
        rng: &mut StdRng,
    ) -> ActionOutcome;

    /// Advances time-derived state (passive scoring, milestones). Called
    /// by the session's periodic tick; all values are computed from
    /// elapsed time, so tick frequency does not affect totals.
    fn tick(&mut self, now_ms: u64) -> Vec<ModeEvent>;

    /// Whether the participant completed the mode's objective.
    fn is_complete(&self, id: &ParticipantId) -> bool;

    /// Whether the participant can take no further mutating actions.
    ///
    /// Differs from [`is_complete`](Self::is_complete) only for modes with
    /// failure states (dialogue): a failed-out participant is finished but
    /// not complete.
    fn is_finished(&self, id: &ParticipantId) -> bool {
        self.is_complete(id)
    }

    /// Current score, including lazily computed passive accrual.
    fn score_of(&self, id: &ParticipantId) -> i64;

    /// Coarse progress for rankings and progress queries.
    fn progress_of(&self, id: &ParticipantId) -> ProgressSummary;

    /// Applies an item buff. Returns the visible effect, or `None` when
    /// the buff does not apply to this mode/participant.
    fn apply_buff(
        &mut self,
        id: &ParticipantId,
        buff: &BuffKind,
        now_ms: u64,
    ) -> Option<ModeEvent>;

    /// Settles all lazily accrued state at match end.
    fn finalize(&mut self, now_ms: u64) -> Vec<ModeEvent>;

    /// Serializable state snapshot. Feeding it to [`restore_engine`] with
    /// the same scenario reproduces identical `score_of`/`is_complete`
    /// results for every participant.
    fn snapshot(&self) -> serde_json::Value;
}

// ============================================================================
// Construction
// ============================================================================

/// Builds the rule engine for a scenario. Chosen once at session start.
#[must_use]
pub fn build_engine(scenario: &Scenario) -> Box<dyn ModeEngine> {
    match &scenario.content {
        ModeContent::CaptureHold(content) => Box::new(CaptureEngine::new(content.clone())),
        ModeContent::CommandRace(content) => Box::new(CommandRaceEngine::new(content.clone())),
        ModeContent::Forensics(content) => Box::new(ForensicsEngine::new(content.clone())),
        ModeContent::VulnRace(content) => Box::new(VulnRaceEngine::new(content.clone())),
        ModeContent::Dialogue(content) => Box::new(DialogueEngine::new(content.clone())),
    }
}

/// Restores a rule engine from a snapshot produced by
/// [`ModeEngine::snapshot`], for reconnecting state replicas and tests.
///
/// # Errors
///
/// Returns a JSON error if the snapshot does not match the scenario's mode.
pub fn restore_engine(
    scenario: &Scenario,
    snapshot: &serde_json::Value,
) -> Result<Box<dyn ModeEngine>, serde_json::Error> {
    Ok(match &scenario.content {
        ModeContent::CaptureHold(content) => {
            Box::new(CaptureEngine::restore(content.clone(), snapshot)?)
        }
        ModeContent::CommandRace(content) => {
            Box::new(CommandRaceEngine::restore(content.clone(), snapshot)?)
        }
        ModeContent::Forensics(content) => {
            Box::new(ForensicsEngine::restore(content.clone(), snapshot)?)
        }
        ModeContent::VulnRace(content) => {
            Box::new(VulnRaceEngine::restore(content.clone(), snapshot)?)
        }
        ModeContent::Dialogue(content) => {
            Box::new(DialogueEngine::restore(content.clone(), snapshot)?)
        }
    })
}
