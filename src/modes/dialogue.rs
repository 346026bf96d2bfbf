//! Social-engineering dialogue rule engine.
//!
//! Each participant runs their own conversation against a simulated target.
//! Techniques reveal objectives and raise suspicion; crossing the suspicion
//! threshold or exhausting the turn budget fails the conversation, covering
//! every objective succeeds. A failed-out participant is finished but not
//! complete.

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::arena::ParticipantId;
use crate::scenario::schema::{DialogueContent, ModeKind};

use super::{
    ActionOutcome, BuffKind, ModeAction, ModeEngine, ModeEvent, ProgressSummary, RejectReason,
};

/// Terminal conversation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ConversationOutcome {
    /// Every objective covered before failing
    Success,
    /// Suspicion threshold crossed or turns exhausted
    Failed,
}

/// Per-participant conversation state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Operator {
    turns: u32,
    suspicion: u32,
    covered: BTreeSet<String>,
    outcome: Option<ConversationOutcome>,
    completed_at_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DialogueState {
    operators: BTreeMap<ParticipantId, Operator>,
}

/// Dialogue mode engine.
pub struct DialogueEngine {
    content: DialogueContent,
    state: DialogueState,
}

impl DialogueEngine {
    /// Creates a fresh engine from scenario content.
    #[must_use]
    pub fn new(content: DialogueContent) -> Self {
        Self {
            content,
            state: DialogueState::default(),
        }
    }

    /// Restores an engine from a [`snapshot`](ModeEngine::snapshot).
    ///
    /// # Errors
    ///
    /// Returns a JSON error if the snapshot shape does not match.
    pub fn restore(
        content: DialogueContent,
        snapshot: &serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        let state: DialogueState = serde_json::from_value(snapshot.clone())?;
        Ok(Self { content, state })
    }

    /// Current suspicion score of a participant.
    #[must_use]
    pub fn suspicion_of(&self, id: &ParticipantId) -> u32 {
        self.state.operators.get(id).map_or(0, |o| o.suspicion)
    }

    /// Turns used so far by a participant.
    #[must_use]
    pub fn turns_of(&self, id: &ParticipantId) -> u32 {
        self.state.operators.get(id).map_or(0, |o| o.turns)
    }
}

impl ModeEngine for DialogueEngine {
    fn kind(&self) -> ModeKind {
        ModeKind::Dialogue
    }

    fn register_participant(&mut self, id: &ParticipantId, _now_ms: u64) {
        self.state.operators.entry(id.clone()).or_default();
    }

    fn apply(
        &mut self,
        id: &ParticipantId,
        action: &ModeAction,
        now_ms: u64,
        _rng: &mut StdRng,
    ) -> ActionOutcome {
        let ModeAction::DialogueChoice { technique_id } = action else {
            return ActionOutcome::rejected(RejectReason::WrongMode);
        };
        let Some(technique) = self.content.techniques.get(technique_id).cloned() else {
            return ActionOutcome::rejected(RejectReason::UnknownTarget {
                id: technique_id.clone(),
            });
        };
        let threshold = self.content.suspicion_threshold;
        let max_turns = self.content.max_turns;
        let total_objectives = self.content.objectives.len();

        let Some(operator) = self.state.operators.get_mut(id) else {
            return ActionOutcome::rejected(RejectReason::NotParticipant);
        };
        if operator.outcome.is_some() {
            return ActionOutcome::rejected(RejectReason::ConversationOver);
        }

        operator.turns += 1;
        operator.suspicion = operator.suspicion.saturating_add(technique.suspicion_impact);
        for objective in &technique.reveals {
            // Unknown objective ids in scenario content are ignored rather
            // than counted toward coverage.
            if self.content.objectives.contains_key(objective) {
                operator.covered.insert(objective.clone());
            }
        }

        let mut events = vec![ModeEvent::DialogueReply {
            participant: id.clone(),
            reply: technique.reply.clone(),
            suspicion: operator.suspicion,
            covered: operator.covered.len(),
        }];

        // Failure checks run before the success check so that a turn which
        // both crosses the threshold and covers the last objective fails.
        if operator.suspicion >= threshold {
            operator.outcome = Some(ConversationOutcome::Failed);
            events.push(ModeEvent::ObjectiveFailed {
                participant: id.clone(),
                suspicion: operator.suspicion,
            });
        } else if operator.covered.len() == total_objectives {
            operator.outcome = Some(ConversationOutcome::Success);
            operator.completed_at_ms = Some(now_ms);
            events.push(ModeEvent::Completed {
                participant: id.clone(),
            });
        } else if operator.turns >= max_turns {
            operator.outcome = Some(ConversationOutcome::Failed);
            events.push(ModeEvent::ObjectiveFailed {
                participant: id.clone(),
                suspicion: operator.suspicion,
            });
        }

        ActionOutcome::accepted(events)
    }

    fn tick(&mut self, _now_ms: u64) -> Vec<ModeEvent> {
        Vec::new()
    }

    fn is_complete(&self, id: &ParticipantId) -> bool {
        self.state
            .operators
            .get(id)
            .is_some_and(|o| o.outcome == Some(ConversationOutcome::Success))
    }

    fn is_finished(&self, id: &ParticipantId) -> bool {
        self.state
            .operators
            .get(id)
            .is_some_and(|o| o.outcome.is_some())
    }

    fn score_of(&self, id: &ParticipantId) -> i64 {
        self.state.operators.get(id).map_or(0, |o| {
            o.covered.len() as i64 * self.content.objective_points
        })
    }

    fn progress_of(&self, id: &ParticipantId) -> ProgressSummary {
        ProgressSummary {
            done: self
                .state
                .operators
                .get(id)
                .map_or(0, |o| o.covered.len() as u64),
            total: self.content.objectives.len() as u64,
        }
    }

    fn apply_buff(
        &mut self,
        _id: &ParticipantId,
        _buff: &BuffKind,
        _now_ms: u64,
    ) -> Option<ModeEvent> {
        None
    }

    fn finalize(&mut self, _now_ms: u64) -> Vec<ModeEvent> {
        Vec::new()
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(&self.state).unwrap_or_default()
    }
}
