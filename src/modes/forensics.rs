//! Forensics quiz rule engine.
//!
//! Participants answer a fixed question set about an incident artifact.
//! Correct answers award points (with a first-try bonus), incorrect ones
//! cost a penalty floored at zero. Answering the full set grants a perfect
//! bonus and, when configured, a speed bonus measured from match start.

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::arena::ParticipantId;
use crate::scenario::schema::{ForensicsContent, ModeKind};

use super::{
    ActionOutcome, BuffKind, ModeAction, ModeEngine, ModeEvent, ProgressSummary, RejectReason,
};

/// Answers compare trimmed and case-insensitively.
#[must_use]
pub fn normalize_answer(answer: &str) -> String {
    answer.trim().to_lowercase()
}

/// Per-participant quiz state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Analyst {
    answered: BTreeSet<String>,
    /// Wrong attempts per question id
    attempts: BTreeMap<String, u32>,
    score: i64,
    completed_at_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct QuizState {
    analysts: BTreeMap<ParticipantId, Analyst>,
    /// Match start, unix milliseconds; anchors the speed bonus window
    match_start_ms: Option<u64>,
}

/// Forensics mode engine.
pub struct ForensicsEngine {
    content: ForensicsContent,
    state: QuizState,
}

impl ForensicsEngine {
    /// Creates a fresh engine from scenario content.
    #[must_use]
    pub fn new(content: ForensicsContent) -> Self {
        Self {
            content,
            state: QuizState::default(),
        }
    }

    /// Restores an engine from a [`snapshot`](ModeEngine::snapshot).
    ///
    /// # Errors
    ///
    /// Returns a JSON error if the snapshot shape does not match.
    pub fn restore(
        content: ForensicsContent,
        snapshot: &serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        let state: QuizState = serde_json::from_value(snapshot.clone())?;
        Ok(Self { content, state })
    }

    /// Wrong attempts recorded for a participant on a question.
    #[must_use]
    pub fn attempts_of(&self, id: &ParticipantId, question_id: &str) -> u32 {
        self.state
            .analysts
            .get(id)
            .and_then(|a| a.attempts.get(question_id))
            .copied()
            .unwrap_or(0)
    }
}

impl ModeEngine for ForensicsEngine {
    fn kind(&self) -> ModeKind {
        ModeKind::Forensics
    }

    fn register_participant(&mut self, id: &ParticipantId, now_ms: u64) {
        self.state.match_start_ms.get_or_insert(now_ms);
        self.state.analysts.entry(id.clone()).or_default();
    }

    fn apply(
        &mut self,
        id: &ParticipantId,
        action: &ModeAction,
        now_ms: u64,
        _rng: &mut StdRng,
    ) -> ActionOutcome {
        let ModeAction::SubmitAnswer {
            question_id,
            answer,
        } = action
        else {
            return ActionOutcome::rejected(RejectReason::WrongMode);
        };
        let Some(question) = self.content.questions.get(question_id).cloned() else {
            return ActionOutcome::rejected(RejectReason::UnknownTarget {
                id: question_id.clone(),
            });
        };
        let wrong_penalty = self.content.wrong_answer_penalty;
        let first_try_bonus = self.content.first_try_bonus;
        let perfect_bonus = self.content.perfect_bonus;
        let total_questions = self.content.questions.len();
        let speed_bonus = self.content.speed_bonus.clone();
        let match_start_ms = self.state.match_start_ms.unwrap_or(now_ms);

        let Some(analyst) = self.state.analysts.get_mut(id) else {
            return ActionOutcome::rejected(RejectReason::NotParticipant);
        };
        if analyst.completed_at_ms.is_some() {
            return ActionOutcome::rejected(RejectReason::AlreadyComplete);
        }
        if analyst.answered.contains(question_id) {
            return ActionOutcome::rejected(RejectReason::AlreadySolved);
        }

        let normalized = normalize_answer(answer);
        let correct = question
            .answers
            .iter()
            .any(|a| normalize_answer(a) == normalized);

        if !correct {
            let attempts = analyst.attempts.entry(question_id.clone()).or_insert(0);
            *attempts += 1;
            analyst.score = (analyst.score - wrong_penalty).max(0);
            return ActionOutcome::accepted(vec![ModeEvent::AnswerRejected {
                participant: id.clone(),
                question_id: question_id.clone(),
                attempts: *attempts,
            }]);
        }

        let first_try = !analyst.attempts.contains_key(question_id);
        analyst.answered.insert(question_id.clone());
        analyst.score += question.points;
        if first_try {
            analyst.score += first_try_bonus;
        }

        let mut events = vec![ModeEvent::AnswerAccepted {
            participant: id.clone(),
            question_id: question_id.clone(),
            first_try,
        }];

        if analyst.answered.len() == total_questions {
            analyst.score += perfect_bonus;
            if let Some(bonus) = speed_bonus
                && now_ms.saturating_sub(match_start_ms) <= bonus.within
            {
                analyst.score += bonus.points;
            }
            analyst.completed_at_ms = Some(now_ms);
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
            .analysts
            .get(id)
            .is_some_and(|a| a.completed_at_ms.is_some())
    }

    fn score_of(&self, id: &ParticipantId) -> i64 {
        self.state.analysts.get(id).map_or(0, |a| a.score)
    }

    fn progress_of(&self, id: &ParticipantId) -> ProgressSummary {
        ProgressSummary {
            done: self
                .state
                .analysts
                .get(id)
                .map_or(0, |a| a.answered.len() as u64),
            total: self.content.questions.len() as u64,
        }
    }

    fn apply_buff(
        &mut self,
        id: &ParticipantId,
        buff: &BuffKind,
        _now_ms: u64,
    ) -> Option<ModeEvent> {
        if !matches!(buff, BuffKind::Hint) {
            return None;
        }
        let analyst = self.state.analysts.get(id)?;
        // Reveal the hint of the first unanswered question that has one.
        let hint = self
            .content
            .questions
            .iter()
            .find(|(qid, q)| !analyst.answered.contains(*qid) && q.hint.is_some())
            .and_then(|(_, q)| q.hint.clone())?;
        Some(ModeEvent::HintRevealed {
            participant: id.clone(),
            hint,
        })
    }

    fn finalize(&mut self, _now_ms: u64) -> Vec<ModeEvent> {
        Vec::new()
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(&self.state).unwrap_or_default()
    }
}
