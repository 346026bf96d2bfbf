//! Vulnerability race rule engine.
//!
//! Participants submit flag strings against a target list. Each
//! vulnerability scores at most once per participant; invalid submissions
//! cost a penalty (floored at zero) unless negated by a one-shot
//! invincibility buff. Finding every target completes the race.

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::arena::ParticipantId;
use crate::scenario::schema::{ModeKind, VulnRaceContent};

use super::{
    ActionOutcome, BuffKind, ModeAction, ModeEngine, ModeEvent, ProgressSummary, RejectReason,
};

/// Per-participant hunt state.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Hunter {
    found: BTreeSet<String>,
    score: i64,
    invalid_submissions: u32,
    /// One-shot penalty negation armed by the invincibility item
    invincible: bool,
    /// Score multiplier in percent; 100 = no buff
    score_multiplier_pct: u32,
    completed_at_ms: Option<u64>,
}

impl Default for Hunter {
    fn default() -> Self {
        Self {
            found: BTreeSet::new(),
            score: 0,
            invalid_submissions: 0,
            invincible: false,
            score_multiplier_pct: 100,
            completed_at_ms: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HuntState {
    hunters: BTreeMap<ParticipantId, Hunter>,
}

/// Vulnerability race mode engine.
pub struct VulnRaceEngine {
    content: VulnRaceContent,
    state: HuntState,
}

impl VulnRaceEngine {
    /// Creates a fresh engine from scenario content.
    #[must_use]
    pub fn new(content: VulnRaceContent) -> Self {
        Self {
            content,
            state: HuntState::default(),
        }
    }

    /// Restores an engine from a [`snapshot`](ModeEngine::snapshot).
    ///
    /// # Errors
    ///
    /// Returns a JSON error if the snapshot shape does not match.
    pub fn restore(
        content: VulnRaceContent,
        snapshot: &serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        let state: HuntState = serde_json::from_value(snapshot.clone())?;
        Ok(Self { content, state })
    }

    /// Invalid submissions recorded for a participant.
    #[must_use]
    pub fn invalid_submissions_of(&self, id: &ParticipantId) -> u32 {
        self.state
            .hunters
            .get(id)
            .map_or(0, |h| h.invalid_submissions)
    }

    fn resolve_flag(&self, flag: &str) -> Option<(String, i64)> {
        let trimmed = flag.trim();
        self.content
            .vulnerabilities
            .iter()
            .find(|(_, v)| v.flag == trimmed)
            .map(|(id, v)| (id.clone(), v.points))
    }
}

impl ModeEngine for VulnRaceEngine {
    fn kind(&self) -> ModeKind {
        ModeKind::VulnRace
    }

    fn register_participant(&mut self, id: &ParticipantId, _now_ms: u64) {
        self.state.hunters.entry(id.clone()).or_default();
    }

    fn apply(
        &mut self,
        id: &ParticipantId,
        action: &ModeAction,
        now_ms: u64,
        _rng: &mut StdRng,
    ) -> ActionOutcome {
        let ModeAction::SubmitFlag { flag } = action else {
            return ActionOutcome::rejected(RejectReason::WrongMode);
        };
        let resolved = self.resolve_flag(flag);
        let invalid_penalty = self.content.invalid_penalty;
        let total_vulns = self.content.vulnerabilities.len();

        let Some(hunter) = self.state.hunters.get_mut(id) else {
            return ActionOutcome::rejected(RejectReason::NotParticipant);
        };
        if hunter.completed_at_ms.is_some() {
            return ActionOutcome::rejected(RejectReason::AlreadyComplete);
        }

        let Some((vuln_id, points)) = resolved else {
            hunter.invalid_submissions += 1;
            if hunter.invincible {
                hunter.invincible = false;
                return ActionOutcome::accepted(vec![
                    ModeEvent::PenaltyNegated {
                        participant: id.clone(),
                    },
                    ModeEvent::FlagRejected {
                        participant: id.clone(),
                        penalized: false,
                    },
                ]);
            }
            hunter.score = (hunter.score - invalid_penalty).max(0);
            return ActionOutcome::accepted(vec![ModeEvent::FlagRejected {
                participant: id.clone(),
                penalized: true,
            }]);
        };

        if hunter.found.contains(&vuln_id) {
            return ActionOutcome::rejected(RejectReason::AlreadySolved);
        }

        hunter.found.insert(vuln_id.clone());
        let scaled = points * i64::from(hunter.score_multiplier_pct) / 100;
        hunter.score += scaled;

        let mut events = vec![
            ModeEvent::VulnFound {
                participant: id.clone(),
                vuln_id,
            },
            ModeEvent::PointsAwarded {
                participant: id.clone(),
                points: scaled,
                total: hunter.score,
            },
        ];

        if hunter.found.len() == total_vulns {
            hunter.completed_at_ms = Some(now_ms);
            events.push(ModeEvent::Completed {
                participant: id.clone(),
            });
        }

        ActionOutcome::accepted(events)
    }

    fn tick(&mut self, _now_ms: u64) -> Vec<ModeEvent> {
        Vec::new()
    }

    fn is_complete(&self, id: &ParticipantId) -> bool {
        self.state
            .hunters
            .get(id)
            .is_some_and(|h| h.completed_at_ms.is_some())
    }

    fn score_of(&self, id: &ParticipantId) -> i64 {
        self.state.hunters.get(id).map_or(0, |h| h.score)
    }

    fn progress_of(&self, id: &ParticipantId) -> ProgressSummary {
        ProgressSummary {
            done: self.state.hunters.get(id).map_or(0, |h| h.found.len() as u64),
            total: self.content.vulnerabilities.len() as u64,
        }
    }

    fn apply_buff(
        &mut self,
        id: &ParticipantId,
        buff: &BuffKind,
        _now_ms: u64,
    ) -> Option<ModeEvent> {
        match buff {
            BuffKind::Invincible => {
                let hunter = self.state.hunters.get_mut(id)?;
                hunter.invincible = true;
                None
            }
            BuffKind::ScoreMultiplier { percent } => {
                let hunter = self.state.hunters.get_mut(id)?;
                hunter.score_multiplier_pct = *percent;
                None
            }
            BuffKind::Hint => {
                let hunter = self.state.hunters.get(id)?;
                // Reveal the hint of the first unfound target that has one.
                let hint = self
                    .content
                    .vulnerabilities
                    .iter()
                    .find(|(vid, v)| !hunter.found.contains(*vid) && v.hint.is_some())
                    .and_then(|(_, v)| v.hint.clone())?;
                Some(ModeEvent::HintRevealed {
                    participant: id.clone(),
                    hint,
                })
            }
            BuffKind::Block => None,
        }
    }

    fn finalize(&mut self, _now_ms: u64) -> Vec<ModeEvent> {
        Vec::new()
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(&self.state).unwrap_or_default()
    }
}
