//! Final result compilation.
//!
//! Ranks participants once, at the moment the arena ends, and freezes the
//! outcome. Ranking is deterministic: completion beats score, score beats
//! completion time, and join order breaks any remaining tie.

use serde::Serialize;

use crate::arena::{ArenaId, Participant, ParticipantId};
use crate::modes::{ModeEngine, ProgressSummary};
use crate::scenario::schema::ModeKind;

/// Base experience for showing up to a match that ended normally.
const XP_BASE: i64 = 10;
/// Experience per 10 points of score.
const XP_SCORE_DIVISOR: i64 = 10;
/// Experience for completing the objective.
const XP_COMPLETION_BONUS: i64 = 25;
/// Experience for winning the match.
const XP_WINNER_BONUS: i64 = 50;

/// Why the arena ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultStatus {
    /// Every active participant finished
    Completed,
    /// The hard time limit expired
    TimeLimit,
    /// The post-first-solve grace window expired
    GraceExpired,
    /// The host (or an operator) ended the match early
    Forced,
    /// An invariant violation voided the match; no rewards
    Void,
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::TimeLimit => "time-limit",
            Self::GraceExpired => "grace-expired",
            Self::Forced => "forced",
            Self::Void => "void",
        };
        write!(f, "{s}")
    }
}

/// One ranked row of the final scoreboard.
#[derive(Debug, Clone, Serialize)]
pub struct RankedParticipant {
    /// 1-based rank
    pub rank: usize,
    /// Participant id
    pub participant: ParticipantId,
    /// Display name at match time
    pub display_name: String,
    /// Whether the participant completed the objective
    pub completed: bool,
    /// Final score
    pub score: i64,
    /// Milliseconds from match start to completion, when completed
    pub completion_time_ms: Option<u64>,
    /// Coarse progress
    pub progress: ProgressSummary,
    /// Experience awarded
    pub xp: i64,
}

/// Immutable final outcome of one arena.
#[derive(Debug, Clone, Serialize)]
pub struct ArenaResult {
    /// The arena this result belongs to
    pub arena_id: ArenaId,
    /// Game mode played
    pub mode: ModeKind,
    /// Why the match ended
    pub status: ResultStatus,
    /// End time, unix milliseconds
    pub ended_at_ms: u64,
    /// Winner, when any participant completed
    pub winner: Option<ParticipantId>,
    /// Scoreboard, best rank first
    pub rankings: Vec<RankedParticipant>,
}

/// Compiles the final result from the session's frozen state.
///
/// Participants who left mid-match are still ranked; their scores stood
/// when they departed. A `Void` status zeroes all experience.
#[must_use]
pub fn compile(
    arena_id: ArenaId,
    mode: ModeKind,
    status: ResultStatus,
    ended_at_ms: u64,
    started_at_ms: Option<u64>,
    participants: &[Participant],
    engine: &dyn ModeEngine,
) -> ArenaResult {
    struct Row {
        participant: Participant,
        completed: bool,
        score: i64,
        completion_time_ms: Option<u64>,
        progress: ProgressSummary,
        join_index: usize,
    }

    let mut rows: Vec<Row> = participants
        .iter()
        .enumerate()
        .map(|(join_index, p)| {
            let completed = engine.is_complete(&p.id);
            let completion_time_ms = match (completed, p.completed_at_ms, started_at_ms) {
                (true, Some(done), Some(start)) => Some(done.saturating_sub(start)),
                _ => None,
            };
            Row {
                participant: p.clone(),
                completed,
                score: engine.score_of(&p.id),
                completion_time_ms,
                progress: engine.progress_of(&p.id),
                join_index,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.completed
            .cmp(&a.completed)
            .then(b.score.cmp(&a.score))
            .then_with(|| match (a.completion_time_ms, b.completion_time_ms) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
            .then(a.join_index.cmp(&b.join_index))
    });

    let winner = rows
        .first()
        .filter(|r| r.completed)
        .map(|r| r.participant.id.clone());

    let rankings = rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            let is_winner = winner.as_ref() == Some(&row.participant.id);
            let xp = if status == ResultStatus::Void {
                0
            } else {
                XP_BASE
                    + row.score / XP_SCORE_DIVISOR
                    + if row.completed { XP_COMPLETION_BONUS } else { 0 }
                    + if is_winner { XP_WINNER_BONUS } else { 0 }
            };
            RankedParticipant {
                rank: i + 1,
                participant: row.participant.id,
                display_name: row.participant.display_name,
                completed: row.completed,
                score: row.score,
                completion_time_ms: row.completion_time_ms,
                progress: row.progress,
                xp,
            }
        })
        .collect();

    ArenaResult {
        arena_id,
        mode,
        status,
        ended_at_ms,
        winner,
        rankings,
    }
}
