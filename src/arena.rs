//! Shared arena data model.
//!
//! The [`Arena`] record, its participants, the match phase machine's
//! vocabulary, and the append-only action audit trail. All mutation of
//! these types happens inside a session's single-writer actor.

use serde::{Deserialize, Serialize};

use crate::modes::ActionOutcome;
use crate::scenario::schema::{Difficulty, ModeKind};

// ============================================================================
// Identifiers
// ============================================================================

/// Arena (match) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArenaId(pub String);

impl ArenaId {
    /// Creates an id from anything string-like.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl std::fmt::Display for ArenaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Participant (user) identifier, resolved to a display name by the
/// external identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    /// Creates an id from anything string-like.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-supplied action identifier used for de-duplication.
///
/// Replaying an already-recorded id returns the recorded outcome and
/// applies no further effect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub String);

impl ActionId {
    /// Creates an id from anything string-like.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Generates a fresh random id (server-side actions, tests).
    #[must_use]
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

// ============================================================================
// Phase
// ============================================================================

/// Match lifecycle phase.
///
/// Transitions are strictly monotonic: `Waiting < Started < Grace < Ended`.
/// The derived ordering encodes that and is asserted by the session FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArenaPhase {
    /// Lobby: participants joining and readying up
    Waiting,
    /// Match running
    Started,
    /// First solve happened; remaining participants play out the grace window
    Grace,
    /// Terminal: result compiled, all further actions rejected
    Ended,
}

impl std::fmt::Display for ArenaPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Waiting => "waiting",
            Self::Started => "started",
            Self::Grace => "grace",
            Self::Ended => "ended",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Per-arena match settings, fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ArenaSettings {
    /// Whether the first completion opens a grace window instead of the
    /// match running to its time limit
    #[serde(default)]
    pub end_on_first_solve: bool,

    /// Fixed grace duration override in milliseconds; when absent the
    /// grace window is computed from remaining time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_ms: Option<u64>,

    /// Hard time limit override in milliseconds; defaults to the
    /// scenario's time limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard_time_limit_ms: Option<u64>,
}

impl Default for ArenaSettings {
    fn default() -> Self {
        Self {
            end_on_first_solve: false,
            grace_ms: None,
            hard_time_limit_ms: None,
        }
    }
}

// ============================================================================
// Arena
// ============================================================================

/// One timed multiplayer match instance.
///
/// Owned exclusively by its session; immutable once `Ended` except for the
/// final result attachment held by the session.
#[derive(Debug, Clone, Serialize)]
pub struct Arena {
    /// Arena id
    pub id: ArenaId,
    /// Game mode (fixed by the scenario)
    pub mode: ModeKind,
    /// Difficulty tier (from the scenario)
    pub difficulty: Difficulty,
    /// Participant cap
    pub max_participants: usize,
    /// Current lifecycle phase
    pub phase: ArenaPhase,
    /// Host participant (the only one who may start the match)
    pub host: ParticipantId,
    /// Match settings
    pub settings: ArenaSettings,
    /// Match start, unix milliseconds (set on `Started`)
    pub started_at_ms: Option<u64>,
    /// Hard deadline, unix milliseconds (set on `Started`; item time
    /// extensions push it back)
    pub ends_at_ms: Option<u64>,
    /// Grace deadline, unix milliseconds (set on `Grace`)
    pub grace_deadline_ms: Option<u64>,
    /// Scenario the match was built from
    pub scenario_id: String,
}

// ============================================================================
// Participant
// ============================================================================

/// One arena participant.
///
/// Membership is append-only within a session: participants who leave are
/// marked, not removed, so history and scoring stay consistent.
#[derive(Debug, Clone, Serialize)]
pub struct Participant {
    /// Participant id
    pub id: ParticipantId,
    /// Resolved display name
    pub display_name: String,
    /// Join time, unix milliseconds
    pub joined_at_ms: u64,
    /// Lobby readiness flag
    pub ready: bool,
    /// Set on leave/disconnect; never cleared
    pub left: bool,
    /// Completion time, unix milliseconds (set once by the session)
    pub completed_at_ms: Option<u64>,
}

impl Participant {
    /// True when the participant still counts toward end-of-match
    /// conditions.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.left
    }
}

// ============================================================================
// Action Audit Trail
// ============================================================================

/// One appended audit record. Never mutated, never deleted while the
/// session is live.
#[derive(Debug, Clone, Serialize)]
pub struct ActionRecord {
    /// Client-supplied action id
    pub action_id: ActionId,
    /// Acting participant
    pub participant: ParticipantId,
    /// Action kind label (e.g. `"attack"`, `"submit-answer"`)
    pub kind: String,
    /// Server receive time, unix milliseconds
    pub at_ms: u64,
    /// Resolved outcome, replayed verbatim on duplicate ids
    pub outcome: ActionOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_ordering_is_monotonic() {
        assert!(ArenaPhase::Waiting < ArenaPhase::Started);
        assert!(ArenaPhase::Started < ArenaPhase::Grace);
        assert!(ArenaPhase::Grace < ArenaPhase::Ended);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(ArenaPhase::Grace.to_string(), "grace");
        assert_eq!(ArenaPhase::Ended.to_string(), "ended");
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let id = ArenaId::new("arena-42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"arena-42\"");
        let pid: ParticipantId = serde_json::from_str("\"u1\"").unwrap();
        assert_eq!(pid, ParticipantId::new("u1"));
    }

    #[test]
    fn test_settings_default() {
        let settings = ArenaSettings::default();
        assert!(!settings.end_on_first_solve);
        assert!(settings.grace_ms.is_none());
        assert!(settings.hard_time_limit_ms.is_none());
    }

    #[test]
    fn test_left_participant_is_inactive() {
        let p = Participant {
            id: ParticipantId::new("u1"),
            display_name: "u1".to_string(),
            joined_at_ms: 0,
            ready: false,
            left: true,
            completed_at_ms: None,
        };
        assert!(!p.is_active());
    }
}
