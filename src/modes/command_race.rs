//! Command race rule engine.
//!
//! Participants race through an ordered sequence of simulated-terminal
//! stages. Each stage recognizes a set of command lines; matching one can
//! award progress, advance to the next stage, or complete the race.
//! Progress is independent per participant.

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::arena::ParticipantId;
use crate::scenario::schema::{CommandRaceContent, ModeKind, Stage, StageCommand};

use super::{
    ActionOutcome, BuffKind, ModeAction, ModeEngine, ModeEvent, ProgressSummary, RejectReason,
};

/// Trims and collapses internal whitespace so `"  ls   -la "` matches
/// `"ls -la"`. Comparison stays case-sensitive: command lines are.
#[must_use]
pub fn normalize_command(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Per-participant race state.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Racer {
    /// 1-based current stage
    stage: usize,
    progress: i64,
    completed: bool,
}

impl Racer {
    const fn new() -> Self {
        Self {
            stage: 1,
            progress: 0,
            completed: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RaceState {
    racers: BTreeMap<ParticipantId, Racer>,
}

/// Command race mode engine.
pub struct CommandRaceEngine {
    content: CommandRaceContent,
    state: RaceState,
}

impl CommandRaceEngine {
    /// Creates a fresh engine from scenario content.
    #[must_use]
    pub fn new(content: CommandRaceContent) -> Self {
        Self {
            content,
            state: RaceState::default(),
        }
    }

    /// Restores an engine from a [`snapshot`](ModeEngine::snapshot).
    ///
    /// # Errors
    ///
    /// Returns a JSON error if the snapshot shape does not match.
    pub fn restore(
        content: CommandRaceContent,
        snapshot: &serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        let state: RaceState = serde_json::from_value(snapshot.clone())?;
        Ok(Self { content, state })
    }

    fn stage(&self, number: usize) -> Option<&Stage> {
        self.content.stages.get(number.checked_sub(1)?)
    }

    fn match_command<'a>(stage: &'a Stage, normalized: &str) -> Option<&'a StageCommand> {
        stage
            .commands
            .iter()
            .find(|c| normalize_command(&c.input) == normalized)
    }

    /// 1-based current stage of a participant, for queries.
    #[must_use]
    pub fn stage_of(&self, id: &ParticipantId) -> usize {
        self.state.racers.get(id).map_or(1, |r| r.stage)
    }
}

impl ModeEngine for CommandRaceEngine {
    fn kind(&self) -> ModeKind {
        ModeKind::CommandRace
    }

    fn register_participant(&mut self, id: &ParticipantId, _now_ms: u64) {
        self.state.racers.entry(id.clone()).or_insert_with(Racer::new);
    }

    fn apply(
        &mut self,
        id: &ParticipantId,
        action: &ModeAction,
        _now_ms: u64,
        _rng: &mut StdRng,
    ) -> ActionOutcome {
        let ModeAction::Execute { command } = action else {
            return ActionOutcome::rejected(RejectReason::WrongMode);
        };
        let Some(racer) = self.state.racers.get(id).cloned() else {
            return ActionOutcome::rejected(RejectReason::NotParticipant);
        };
        if racer.completed {
            return ActionOutcome::rejected(RejectReason::AlreadyComplete);
        }
        let Some(stage) = self.stage(racer.stage) else {
            return ActionOutcome::rejected(RejectReason::AlreadyComplete);
        };

        let normalized = normalize_command(command);
        let Some(matched) = Self::match_command(stage, &normalized).cloned() else {
            // Unrecognized commands are still valid actions; the simulated
            // terminal answers, nothing else changes.
            let output = stage
                .default_response
                .clone()
                .unwrap_or_else(|| self.content.default_response.clone());
            return ActionOutcome::accepted(vec![ModeEvent::CommandOutput {
                participant: id.clone(),
                output,
            }]);
        };

        let mut events = vec![ModeEvent::CommandOutput {
            participant: id.clone(),
            output: matched.response.clone(),
        }];

        let Some(racer) = self.state.racers.get_mut(id) else {
            return ActionOutcome::rejected(RejectReason::NotParticipant);
        };
        racer.progress = (racer.progress + matched.progress_delta).max(0);

        if matched.completes {
            racer.completed = true;
            events.push(ModeEvent::Completed {
                participant: id.clone(),
            });
        } else if matched.advance_stage {
            racer.stage += 1;
            if let Some(next) = self.content.stages.get(racer.stage - 1) {
                events.push(ModeEvent::StagePrompt {
                    participant: id.clone(),
                    stage: racer.stage,
                    prompt: next.prompt.clone(),
                });
            }
        }

        ActionOutcome::accepted(events)
    }

    fn tick(&mut self, _now_ms: u64) -> Vec<ModeEvent> {
        Vec::new()
    }

    fn is_complete(&self, id: &ParticipantId) -> bool {
        self.state.racers.get(id).is_some_and(|r| r.completed)
    }

    fn score_of(&self, id: &ParticipantId) -> i64 {
        self.state.racers.get(id).map_or(0, |r| r.progress)
    }

    fn progress_of(&self, id: &ParticipantId) -> ProgressSummary {
        let total = self.content.stages.len() as u64;
        let done = self.state.racers.get(id).map_or(0, |r| {
            if r.completed {
                total
            } else {
                (r.stage as u64).saturating_sub(1)
            }
        });
        ProgressSummary { done, total }
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

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn content() -> CommandRaceContent {
        CommandRaceContent {
            stages: vec![
                Stage {
                    prompt: "Enumerate the target directory.".to_string(),
                    commands: vec![
                        StageCommand {
                            input: "ls -la".to_string(),
                            response: "drwxr-xr-x  .ssh\n-rw-------  shadow.bak".to_string(),
                            progress_delta: 10,
                            advance_stage: true,
                            completes: false,
                        },
                        StageCommand {
                            input: "pwd".to_string(),
                            response: "/home/victim".to_string(),
                            progress_delta: 2,
                            advance_stage: false,
                            completes: false,
                        },
                    ],
                    default_response: None,
                },
                Stage {
                    prompt: "Extract the credentials.".to_string(),
                    commands: vec![StageCommand {
                        input: "cat shadow.bak".to_string(),
                        response: "root:$6$salt$hash:19000::::::".to_string(),
                        progress_delta: 20,
                        advance_stage: false,
                        completes: true,
                    }],
                    default_response: Some("permission denied".to_string()),
                },
            ],
            default_response: "command not found".to_string(),
        }
    }

    fn engine_with(participants: &[&str]) -> CommandRaceEngine {
        let mut engine = CommandRaceEngine::new(content());
        for p in participants {
            engine.register_participant(&ParticipantId::new(*p), 0);
        }
        engine
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn execute(engine: &mut CommandRaceEngine, id: &str, command: &str) -> ActionOutcome {
        engine.apply(
            &ParticipantId::new(id),
            &ModeAction::Execute {
                command: command.to_string(),
            },
            0,
            &mut rng(),
        )
    }

    #[test]
    fn test_whitespace_normalized_match_advances_stage() {
        let mut engine = engine_with(&["a"]);
        let a = ParticipantId::new("a");

        // Padded/collapsed whitespace still matches "ls -la".
        let outcome = execute(&mut engine, "a", "  ls    -la ");
        let ActionOutcome::Accepted { events } = outcome else {
            panic!("recognized command should be accepted");
        };
        assert!(events.iter().any(
            |e| matches!(e, ModeEvent::CommandOutput { output, .. } if output.contains("shadow.bak"))
        ));
        assert!(events.iter().any(|e| matches!(
            e,
            ModeEvent::StagePrompt { stage: 2, .. }
        )));
        assert_eq!(engine.stage_of(&a), 2);
        assert_eq!(engine.score_of(&a), 10);
    }

    #[test]
    fn test_case_sensitive_matching() {
        let mut engine = engine_with(&["a"]);
        let outcome = execute(&mut engine, "a", "LS -LA");
        let ActionOutcome::Accepted { events } = outcome else {
            panic!("unrecognized command is still an accepted action");
        };
        assert!(events.contains(&ModeEvent::CommandOutput {
            participant: ParticipantId::new("a"),
            output: "command not found".to_string(),
        }));
        assert_eq!(engine.stage_of(&ParticipantId::new("a")), 1);
    }

    #[test]
    fn test_stage_default_response_overrides_global() {
        let mut engine = engine_with(&["a"]);
        execute(&mut engine, "a", "ls -la");

        let outcome = execute(&mut engine, "a", "sudo su");
        let ActionOutcome::Accepted { events } = outcome else {
            panic!("unrecognized command is still an accepted action");
        };
        assert!(events.contains(&ModeEvent::CommandOutput {
            participant: ParticipantId::new("a"),
            output: "permission denied".to_string(),
        }));
    }

    #[test]
    fn test_stage_commands_do_not_leak_across_stages() {
        let mut engine = engine_with(&["a"]);
        // "cat shadow.bak" belongs to stage 2; at stage 1 it is unrecognized.
        let outcome = execute(&mut engine, "a", "cat shadow.bak");
        let ActionOutcome::Accepted { events } = outcome else {
            panic!("unrecognized command is still an accepted action");
        };
        assert!(events.contains(&ModeEvent::CommandOutput {
            participant: ParticipantId::new("a"),
            output: "command not found".to_string(),
        }));
        assert!(!engine.is_complete(&ParticipantId::new("a")));
    }

    #[test]
    fn test_completion_emits_completed_once() {
        let mut engine = engine_with(&["a"]);
        let a = ParticipantId::new("a");
        execute(&mut engine, "a", "ls -la");
        let outcome = execute(&mut engine, "a", "cat shadow.bak");
        let ActionOutcome::Accepted { events } = outcome else {
            panic!("completing command should be accepted");
        };
        assert!(events.contains(&ModeEvent::Completed {
            participant: a.clone()
        }));
        assert!(engine.is_complete(&a));
        assert_eq!(engine.score_of(&a), 30);

        // Further commands after completion are rejected.
        let outcome = execute(&mut engine, "a", "ls -la");
        assert_eq!(
            outcome,
            ActionOutcome::rejected(RejectReason::AlreadyComplete)
        );
    }

    #[test]
    fn test_progress_is_independent_per_participant() {
        let mut engine = engine_with(&["a", "b"]);
        execute(&mut engine, "a", "ls -la");

        assert_eq!(engine.stage_of(&ParticipantId::new("a")), 2);
        assert_eq!(engine.stage_of(&ParticipantId::new("b")), 1);
        assert_eq!(engine.score_of(&ParticipantId::new("b")), 0);
    }

    #[test]
    fn test_progress_summary_counts_cleared_stages() {
        let mut engine = engine_with(&["a"]);
        let a = ParticipantId::new("a");
        assert_eq!(engine.progress_of(&a), ProgressSummary { done: 0, total: 2 });
        execute(&mut engine, "a", "ls -la");
        assert_eq!(engine.progress_of(&a), ProgressSummary { done: 1, total: 2 });
        execute(&mut engine, "a", "cat shadow.bak");
        assert_eq!(engine.progress_of(&a), ProgressSummary { done: 2, total: 2 });
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut engine = engine_with(&["a", "b"]);
        execute(&mut engine, "a", "ls -la");
        execute(&mut engine, "a", "cat shadow.bak");
        execute(&mut engine, "b", "pwd");

        let restored = CommandRaceEngine::restore(content(), &engine.snapshot()).unwrap();
        for id in ["a", "b"] {
            let id = ParticipantId::new(id);
            assert_eq!(restored.score_of(&id), engine.score_of(&id));
            assert_eq!(restored.is_complete(&id), engine.is_complete(&id));
            assert_eq!(restored.stage_of(&id), engine.stage_of(&id));
        }
    }
}
