//! Scenario schema types.
//!
//! A scenario is the static authored content defining one playable instance
//! of a mode: stages and commands, vulnerabilities and their flags, questions
//! and accepted answers, the capture-and-hold move catalog, or dialogue
//! techniques. Scenarios are deserialized from YAML files.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ============================================================================
// Mode Kind
// ============================================================================

/// The fixed set of supported arena game modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModeKind {
    /// Contest control of a shared resource; the holder accrues score
    CaptureHold,
    /// Race through staged command-line objectives
    CommandRace,
    /// Digital-forensics question-and-answer
    Forensics,
    /// Race to find vulnerability flags
    VulnRace,
    /// Social-engineering dialogue against a simulated target
    Dialogue,
}

impl std::fmt::Display for ModeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CaptureHold => "capture-hold",
            Self::CommandRace => "command-race",
            Self::Forensics => "forensics",
            Self::VulnRace => "vuln-race",
            Self::Dialogue => "dialogue",
        };
        write!(f, "{s}")
    }
}

/// Scenario difficulty tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Difficulty {
    /// Introductory content
    Easy,
    /// Standard content
    #[default]
    Medium,
    /// Advanced content
    Hard,
}

// ============================================================================
// Top-Level Scenario
// ============================================================================

/// Root scenario definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Scenario {
    /// Unique scenario id (referenced when creating an arena)
    pub id: String,

    /// Human-readable scenario name
    pub name: String,

    /// Difficulty tier
    #[serde(default)]
    pub difficulty: Difficulty,

    /// Match time limit, as a humantime string (e.g. `"5m"`, `"90s"`)
    #[serde(with = "duration_ms")]
    pub time_limit: u64,

    /// Minimum participants required to start
    #[serde(default = "default_min_participants")]
    pub min_participants: usize,

    /// Maximum participants allowed to join
    #[serde(default = "default_max_participants")]
    pub max_participants: usize,

    /// Mode-specific content
    pub content: ModeContent,
}

const fn default_min_participants() -> usize {
    1
}

const fn default_max_participants() -> usize {
    8
}

impl Scenario {
    /// Returns the game mode this scenario is authored for.
    #[must_use]
    pub const fn mode(&self) -> ModeKind {
        self.content.kind()
    }
}

/// Mode-specific scenario content, tagged by `mode`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum ModeContent {
    /// Capture-and-hold move catalog and economy
    CaptureHold(CaptureContent),
    /// Command race stages
    CommandRace(CommandRaceContent),
    /// Forensics questions
    Forensics(ForensicsContent),
    /// Vulnerability race targets
    VulnRace(VulnRaceContent),
    /// Dialogue techniques and objectives
    Dialogue(DialogueContent),
}

impl ModeContent {
    /// Returns the [`ModeKind`] tag of this content.
    #[must_use]
    pub const fn kind(&self) -> ModeKind {
        match self {
            Self::CaptureHold(_) => ModeKind::CaptureHold,
            Self::CommandRace(_) => ModeKind::CommandRace,
            Self::Forensics(_) => ModeKind::Forensics,
            Self::VulnRace(_) => ModeKind::VulnRace,
            Self::Dialogue(_) => ModeKind::Dialogue,
        }
    }
}

// ============================================================================
// Capture-and-Hold Content
// ============================================================================

/// Capture-and-hold economy and move catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CaptureContent {
    /// Maximum energy per participant
    #[serde(default = "default_max_energy")]
    pub max_energy: u32,

    /// Energy regenerated per elapsed second
    #[serde(default = "default_regen")]
    pub energy_regen_per_sec: f64,

    /// Passive score accrued per second of crown holding
    #[serde(default = "default_pps")]
    pub points_per_second: i64,

    /// One-time bonus for 5 seconds of continuous holding
    #[serde(default = "default_milestone_5s")]
    pub milestone_5s_bonus: i64,

    /// One-time bonus for 60 seconds of continuous holding
    #[serde(default = "default_milestone_60s")]
    pub milestone_60s_bonus: i64,

    /// Attack and defense moves available in this scenario
    pub moves: Vec<CaptureMove>,
}

const fn default_max_energy() -> u32 {
    100
}

const fn default_regen() -> f64 {
    2.0
}

const fn default_pps() -> i64 {
    2
}

const fn default_milestone_5s() -> i64 {
    10
}

const fn default_milestone_60s() -> i64 {
    100
}

/// One capture-and-hold move.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CaptureMove {
    /// Move id (referenced by attack/defend actions)
    pub id: String,

    /// Display name
    pub name: String,

    /// Whether this is an attack or a defense move
    pub kind: MoveKind,

    /// Energy consumed per use
    pub energy_cost: u32,

    /// Cooldown between uses, in milliseconds
    #[serde(default)]
    pub cooldown_ms: u64,

    /// Base success probability, in percent (0–100)
    #[serde(default = "default_success_rate")]
    pub success_rate: u8,

    /// Effect applied on success
    pub effect: MoveEffect,
}

const fn default_success_rate() -> u8 {
    100
}

/// Attack vs. defense classification for capture moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MoveKind {
    /// Usable by anyone; targets the current king (or the uncrowned resource)
    Attack,
    /// Usable only by the current king
    Defense,
}

/// Effect of a successful capture-and-hold move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MoveEffect {
    /// Seize the crown
    Capture,
    /// Award fixed points to the attacker
    Points {
        /// Point value awarded
        points: i64,
    },
    /// Raise the king's defense level
    DefenseLevel {
        /// Levels added
        bonus: u32,
    },
    /// Arm a one-shot block consumed by the next incoming attack
    Block,
}

// ============================================================================
// Command Race Content
// ============================================================================

/// Command race stage list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CommandRaceContent {
    /// Ordered stages; the race completes at the terminal stage's
    /// completing command
    pub stages: Vec<Stage>,

    /// Response returned for unrecognized submissions when the stage
    /// defines no default of its own
    #[serde(default = "default_command_response")]
    pub default_response: String,
}

fn default_command_response() -> String {
    "command not found".to_string()
}

/// One command race stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Stage {
    /// Prompt delivered exactly once when the stage is entered
    pub prompt: String,

    /// Commands recognized at this stage
    pub commands: Vec<StageCommand>,

    /// Stage-specific default response for unrecognized submissions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_response: Option<String>,
}

/// One recognized command within a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StageCommand {
    /// The command line to match (whitespace-normalized exact match)
    pub input: String,

    /// Simulated terminal output returned on match
    pub response: String,

    /// Progress points awarded
    #[serde(default)]
    pub progress_delta: i64,

    /// Whether matching advances the participant to the next stage
    #[serde(default)]
    pub advance_stage: bool,

    /// Whether matching completes the race for the participant
    #[serde(default)]
    pub completes: bool,
}

// ============================================================================
// Forensics Content
// ============================================================================

/// Forensics question set and scoring knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ForensicsContent {
    /// Questions, keyed by question id (order preserved for display)
    pub questions: IndexMap<String, Question>,

    /// Score subtracted per incorrect answer (floored at zero)
    #[serde(default = "default_wrong_penalty")]
    pub wrong_answer_penalty: i64,

    /// Bonus for answering a question correctly on the first attempt
    #[serde(default = "default_first_try_bonus")]
    pub first_try_bonus: i64,

    /// Bonus for answering every question correctly
    #[serde(default = "default_perfect_bonus")]
    pub perfect_bonus: i64,

    /// Optional speed bonus for perfect completion within a window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_bonus: Option<SpeedBonus>,
}

const fn default_wrong_penalty() -> i64 {
    5
}

const fn default_first_try_bonus() -> i64 {
    10
}

const fn default_perfect_bonus() -> i64 {
    50
}

/// Speed bonus awarded for perfect completion within a time window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SpeedBonus {
    /// Window measured from match start, as a humantime string
    #[serde(with = "duration_ms")]
    pub within: u64,

    /// Points awarded
    pub points: i64,
}

/// One forensics question.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Question {
    /// Question text shown to participants
    pub prompt: String,

    /// Accepted answers, compared case-insensitively after trimming
    pub answers: Vec<String>,

    /// Points awarded for a correct answer
    pub points: i64,

    /// Optional hint revealed by the hint item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

// ============================================================================
// Vulnerability Race Content
// ============================================================================

/// Vulnerability race target list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VulnRaceContent {
    /// Target vulnerabilities, keyed by id
    pub vulnerabilities: IndexMap<String, Vulnerability>,

    /// Score subtracted per invalid submission (floored at zero)
    #[serde(default = "default_invalid_penalty")]
    pub invalid_penalty: i64,
}

const fn default_invalid_penalty() -> i64 {
    10
}

/// One target vulnerability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Vulnerability {
    /// Display name
    pub name: String,

    /// Secret flag string; submissions are validated by exact match
    pub flag: String,

    /// Points awarded at most once per participant
    pub points: i64,

    /// Optional hint revealed by the hint item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

// ============================================================================
// Dialogue Content
// ============================================================================

/// Social-engineering dialogue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DialogueContent {
    /// Target-information objectives to cover, keyed by id
    pub objectives: IndexMap<String, String>,

    /// Techniques available each turn, keyed by id
    pub techniques: IndexMap<String, Technique>,

    /// Suspicion score at which the objective fails
    #[serde(default = "default_suspicion_threshold")]
    pub suspicion_threshold: u32,

    /// Maximum number of turns
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Points per covered objective
    #[serde(default = "default_objective_points")]
    pub objective_points: i64,
}

const fn default_suspicion_threshold() -> u32 {
    100
}

const fn default_max_turns() -> u32 {
    12
}

const fn default_objective_points() -> i64 {
    25
}

/// One dialogue technique.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Technique {
    /// Display name
    pub name: String,

    /// Suspicion added when the technique is used
    pub suspicion_impact: u32,

    /// Objective ids revealed on use
    #[serde(default)]
    pub reveals: Vec<String>,

    /// Target's reply line
    pub reply: String,
}

// ============================================================================
// Duration (de)serialization
// ============================================================================

/// Serde adapter storing durations as humantime strings (`"5m"`, `"90s"`)
/// and exposing them as milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Deserializes a humantime string into milliseconds.
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string is not a valid
    /// humantime duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let duration = humantime::parse_duration(&s).map_err(serde::de::Error::custom)?;
        u64::try_from(duration.as_millis()).map_err(serde::de::Error::custom)
    }

    /// Serializes milliseconds back to a humantime string.
    ///
    /// # Errors
    ///
    /// Never fails for valid `u64` inputs.
    pub fn serialize<S>(ms: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration = std::time::Duration::from_millis(*ms);
        serializer.serialize_str(&humantime::format_duration(duration).to_string())
    }
}
