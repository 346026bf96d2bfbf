//! Scenario loading pipeline.
//!
//! 1. Read the YAML file (with a size cap)
//! 2. Parse into the typed [`Scenario`] schema
//! 3. Validate structural and mode-specific rules
//!
//! Validation collects every issue instead of stopping at the first, so a
//! scenario author gets the full picture in one pass. Warnings do not
//! prevent loading; errors do.

use std::path::Path;

use crate::error::{ScenarioError, Severity, ValidationIssue};
use crate::scenario::schema::{
    CaptureContent, CommandRaceContent, DialogueContent, ForensicsContent, ModeContent,
    MoveEffect, MoveKind, Scenario, VulnRaceContent,
};

/// Maximum scenario file size in bytes.
pub const MAX_SCENARIO_SIZE: u64 = 1024 * 1024;

/// Loads and validates a single scenario file.
///
/// # Errors
///
/// Returns [`ScenarioError::MissingFile`] when the path does not exist,
/// [`ScenarioError::ParseError`] for malformed YAML, and
/// [`ScenarioError::ValidationError`] when validation finds errors.
pub fn load_file(path: &Path) -> Result<Scenario, ScenarioError> {
    let metadata = std::fs::metadata(path).map_err(|_| ScenarioError::MissingFile {
        path: path.to_path_buf(),
    })?;
    if metadata.len() > MAX_SCENARIO_SIZE {
        return Err(ScenarioError::InvalidValue {
            field: "file size".to_string(),
            value: metadata.len().to_string(),
            expected: format!("at most {MAX_SCENARIO_SIZE} bytes"),
        });
    }

    let raw = std::fs::read_to_string(path).map_err(|_| ScenarioError::MissingFile {
        path: path.to_path_buf(),
    })?;
    let scenario = parse(&raw).map_err(|message| ScenarioError::ParseError {
        path: path.to_path_buf(),
        message,
    })?;

    let issues = validate(&scenario);
    if issues.iter().any(|i| i.severity == Severity::Error) {
        return Err(ScenarioError::ValidationError {
            path: path.display().to_string(),
            issues,
        });
    }
    for issue in &issues {
        tracing::warn!(scenario = %scenario.id, %issue, "scenario validation warning");
    }
    Ok(scenario)
}

/// Parses scenario YAML without touching the filesystem.
///
/// # Errors
///
/// Returns the parser's message on malformed input.
pub fn parse(raw: &str) -> Result<Scenario, String> {
    serde_yaml::from_str(raw).map_err(|e| e.to_string())
}

/// Validates a parsed scenario, collecting every issue.
#[must_use]
pub fn validate(scenario: &Scenario) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if scenario.id.trim().is_empty() {
        error(&mut issues, "id", "scenario id must not be empty");
    } else if scenario.id.contains(char::is_whitespace) {
        error(&mut issues, "id", "scenario id must not contain whitespace");
    }
    if scenario.time_limit == 0 {
        error(&mut issues, "time_limit", "time limit must be positive");
    }
    if scenario.min_participants == 0 {
        error(
            &mut issues,
            "min_participants",
            "minimum participant count must be at least 1",
        );
    }
    if scenario.max_participants < scenario.min_participants {
        error(
            &mut issues,
            "max_participants",
            "maximum participant count is below the minimum",
        );
    }

    match &scenario.content {
        ModeContent::CaptureHold(content) => validate_capture(content, &mut issues),
        ModeContent::CommandRace(content) => validate_command_race(content, &mut issues),
        ModeContent::Forensics(content) => validate_forensics(content, &mut issues),
        ModeContent::VulnRace(content) => validate_vuln_race(content, &mut issues),
        ModeContent::Dialogue(content) => validate_dialogue(content, &mut issues),
    }

    issues
}

fn error(issues: &mut Vec<ValidationIssue>, path: &str, message: &str) {
    issues.push(ValidationIssue {
        path: path.to_string(),
        message: message.to_string(),
        severity: Severity::Error,
    });
}

fn warning(issues: &mut Vec<ValidationIssue>, path: &str, message: &str) {
    issues.push(ValidationIssue {
        path: path.to_string(),
        message: message.to_string(),
        severity: Severity::Warning,
    });
}

fn validate_capture(content: &CaptureContent, issues: &mut Vec<ValidationIssue>) {
    if !content
        .moves
        .iter()
        .any(|m| m.kind == MoveKind::Attack && matches!(m.effect, MoveEffect::Capture))
    {
        error(
            issues,
            "moves",
            "at least one attack move with a capture effect is required",
        );
    }
    let mut seen = std::collections::BTreeSet::new();
    for (i, mv) in content.moves.iter().enumerate() {
        let path = format!("moves[{i}]");
        if !seen.insert(&mv.id) {
            error(issues, &path, "duplicate move id");
        }
        if mv.success_rate > 100 {
            error(issues, &path, "success rate must be at most 100");
        }
        if mv.energy_cost > content.max_energy {
            error(
                issues,
                &path,
                "energy cost exceeds the maximum energy pool",
            );
        }
        match (&mv.kind, &mv.effect) {
            (MoveKind::Attack, MoveEffect::DefenseLevel { .. } | MoveEffect::Block)
            | (MoveKind::Defense, MoveEffect::Capture | MoveEffect::Points { .. }) => {
                warning(issues, &path, "move effect does not match its kind");
            }
            _ => {}
        }
    }
    if content.energy_regen_per_sec <= 0.0 {
        warning(
            issues,
            "energy_regen_per_sec",
            "energy never regenerates; moves are a finite resource",
        );
    }
}

fn validate_command_race(content: &CommandRaceContent, issues: &mut Vec<ValidationIssue>) {
    if content.stages.is_empty() {
        error(issues, "stages", "at least one stage is required");
        return;
    }
    if !content
        .stages
        .iter()
        .any(|s| s.commands.iter().any(|c| c.completes))
    {
        error(issues, "stages", "no command completes the race");
    }
    for (i, stage) in content.stages.iter().enumerate() {
        let path = format!("stages[{i}]");
        if stage.commands.is_empty() {
            error(issues, &path, "stage recognizes no commands");
        }
        let last = i + 1 == content.stages.len();
        if !last
            && !stage
                .commands
                .iter()
                .any(|c| c.advance_stage || c.completes)
        {
            error(issues, &path, "stage has no way forward");
        }
        let mut seen = std::collections::BTreeSet::new();
        for command in &stage.commands {
            if !seen.insert(command.input.split_whitespace().collect::<Vec<_>>().join(" ")) {
                warning(issues, &path, "duplicate command input; first match wins");
            }
        }
    }
}

fn validate_forensics(content: &ForensicsContent, issues: &mut Vec<ValidationIssue>) {
    if content.questions.is_empty() {
        error(issues, "questions", "at least one question is required");
    }
    for (id, question) in &content.questions {
        let path = format!("questions.{id}");
        if question.answers.is_empty() {
            error(issues, &path, "question accepts no answers");
        }
        if question.points < 0 {
            error(issues, &path, "question points must not be negative");
        }
    }
    if content.wrong_answer_penalty < 0 {
        error(
            issues,
            "wrong_answer_penalty",
            "penalty must not be negative",
        );
    }
}

fn validate_vuln_race(content: &VulnRaceContent, issues: &mut Vec<ValidationIssue>) {
    if content.vulnerabilities.is_empty() {
        error(
            issues,
            "vulnerabilities",
            "at least one vulnerability is required",
        );
    }
    let mut flags = std::collections::BTreeSet::new();
    for (id, vuln) in &content.vulnerabilities {
        let path = format!("vulnerabilities.{id}");
        if vuln.flag.trim().is_empty() {
            error(issues, &path, "flag must not be empty");
        } else if !flags.insert(vuln.flag.trim()) {
            error(issues, &path, "duplicate flag; submissions would be ambiguous");
        }
        if vuln.points < 0 {
            error(issues, &path, "vulnerability points must not be negative");
        }
    }
    if content.invalid_penalty < 0 {
        error(issues, "invalid_penalty", "penalty must not be negative");
    }
}

fn validate_dialogue(content: &DialogueContent, issues: &mut Vec<ValidationIssue>) {
    if content.objectives.is_empty() {
        error(issues, "objectives", "at least one objective is required");
    }
    if content.techniques.is_empty() {
        error(issues, "techniques", "at least one technique is required");
    }
    if content.max_turns == 0 {
        error(issues, "max_turns", "turn budget must be positive");
    }
    if content.suspicion_threshold == 0 {
        error(
            issues,
            "suspicion_threshold",
            "suspicion threshold must be positive",
        );
    }
    for objective in content.objectives.keys() {
        if !content
            .techniques
            .values()
            .any(|t| t.reveals.contains(objective))
        {
            error(
                issues,
                &format!("objectives.{objective}"),
                "no technique reveals this objective; success is unreachable",
            );
        }
    }
    for (id, technique) in &content.techniques {
        for reveal in &technique.reveals {
            if !content.objectives.contains_key(reveal) {
                warning(
                    issues,
                    &format!("techniques.{id}"),
                    "reveals an unknown objective id",
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::schema::Difficulty;
    use indexmap::IndexMap;

    const VALID_YAML: &str = r#"
id: webapp-hunt
name: Webapp Vulnerability Hunt
difficulty: medium
time_limit: 10m
min_participants: 1
max_participants: 4
content:
  mode: vuln-race
  vulnerabilities:
    sqli:
      name: Login SQL injection
      flag: "FLAG{union_select}"
      points: 40
    idor:
      name: Profile IDOR
      flag: "FLAG{object_ref}"
      points: 30
  invalid_penalty: 10
"#;

    #[test]
    fn test_parse_valid_scenario() {
        let scenario = parse(VALID_YAML).unwrap();
        assert_eq!(scenario.id, "webapp-hunt");
        assert_eq!(scenario.difficulty, Difficulty::Medium);
        assert_eq!(scenario.time_limit, 600_000);
        assert!(validate(&scenario).is_empty());
    }

    #[test]
    fn test_load_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hunt.yaml");
        std::fs::write(&path, VALID_YAML).unwrap();

        let scenario = load_file(&path).unwrap();
        assert_eq!(scenario.id, "webapp-hunt");
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_file(Path::new("/nonexistent/hunt.yaml")).unwrap_err();
        assert!(matches!(err, ScenarioError::MissingFile { .. }));
    }

    #[test]
    fn test_load_malformed_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "id: [unclosed").unwrap();

        let err = load_file(&path).unwrap_err();
        assert!(matches!(err, ScenarioError::ParseError { .. }));
    }

    #[test]
    fn test_duplicate_flags_rejected() {
        let mut scenario = parse(VALID_YAML).unwrap();
        if let crate::scenario::schema::ModeContent::VulnRace(content) = &mut scenario.content {
            let dup = content.vulnerabilities["sqli"].clone();
            content.vulnerabilities.insert("copy".to_string(), dup);
        }
        let issues = validate(&scenario);
        assert!(
            issues
                .iter()
                .any(|i| i.severity == Severity::Error && i.message.contains("duplicate flag"))
        );
    }

    #[test]
    fn test_participant_bounds_checked() {
        let mut scenario = parse(VALID_YAML).unwrap();
        scenario.min_participants = 5;
        scenario.max_participants = 2;
        let issues = validate(&scenario);
        assert!(issues.iter().any(|i| i.path == "max_participants"));
    }

    #[test]
    fn test_unreachable_dialogue_objective_rejected() {
        let mut objectives = IndexMap::new();
        objectives.insert("badge".to_string(), "Badge vendor".to_string());
        let scenario = Scenario {
            id: "chat".to_string(),
            name: "Chat".to_string(),
            difficulty: Difficulty::Easy,
            time_limit: 300_000,
            min_participants: 1,
            max_participants: 2,
            content: crate::scenario::schema::ModeContent::Dialogue(DialogueContent {
                objectives,
                techniques: IndexMap::new(),
                suspicion_threshold: 100,
                max_turns: 10,
                objective_points: 25,
            }),
        };
        let issues = validate(&scenario);
        assert!(issues.iter().any(|i| i.message.contains("unreachable")));
        assert!(issues.iter().any(|i| i.path == "techniques"));
    }

    #[test]
    fn test_command_race_without_terminal_rejected() {
        let yaml = r#"
id: race
name: Race
time_limit: 5m
content:
  mode: command-race
  stages:
    - prompt: "go"
      commands:
        - input: "ls"
          response: "files"
          advance_stage: true
"#;
        let scenario = parse(yaml).unwrap();
        let issues = validate(&scenario);
        assert!(
            issues
                .iter()
                .any(|i| i.message.contains("no command completes"))
        );
    }
}
