//! Error types for `redarena`.
//!
//! Domain-specific error enums aggregated into a single [`RedArenaError`]
//! with exit-code mapping for the CLI. Rejected player actions are *not*
//! errors — they are structured [`ActionOutcome::Rejected`] values returned
//! inline (see `modes`).
//!
//! [`ActionOutcome::Rejected`]: crate::modes::ActionOutcome::Rejected

use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `redarena` CLI operations.
///
/// These codes follow Unix conventions.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Scenario content error (invalid YAML, validation failure)
    pub const SCENARIO_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Transport error (malformed envelope, broken pipe)
    pub const TRANSPORT_ERROR: i32 = 4;

    /// Session error (invalid lifecycle operation, registry conflict)
    pub const SESSION_ERROR: i32 = 5;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `redarena` operations.
///
/// Aggregates all domain-specific errors and provides a unified interface
/// for error handling and exit code mapping.
#[derive(Debug, Error)]
pub enum RedArenaError {
    /// Scenario loading or validation error
    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    /// Session lifecycle error
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Session registry error
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// External collaborator error
    #[error(transparent)]
    External(#[from] ExternalError),

    /// Transport layer error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl RedArenaError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Scenario(_) | Self::Yaml(_) => ExitCode::SCENARIO_ERROR,
            Self::Session(_) | Self::Registry(_) => ExitCode::SESSION_ERROR,
            Self::Transport(_) | Self::Json(_) => ExitCode::TRANSPORT_ERROR,
            Self::External(_) => ExitCode::ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }

    /// Stable machine-readable code carried on wire error replies.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Scenario(e) => match e {
                ScenarioError::UnknownScenario { .. } => "unknown-scenario",
                _ => "scenario-invalid",
            },
            Self::Session(e) => match e {
                SessionError::ArenaFull { .. } => "arena-full",
                SessionError::AlreadyStarted => "already-started",
                SessionError::SessionEnded => "session-ended",
                SessionError::NotHost => "not-host",
                SessionError::NotEnoughParticipants { .. } => "not-enough-participants",
                SessionError::NotAllReady { .. } => "not-all-ready",
                SessionError::NotParticipant { .. } => "not-participant",
                SessionError::InvariantViolation(_) => "internal",
            },
            Self::Registry(e) => match e {
                RegistryError::AlreadyExists { .. } => "arena-exists",
                RegistryError::NotFound { .. } => "arena-not-found",
                RegistryError::StillLive { .. } => "arena-still-live",
                RegistryError::ActorUnavailable { .. } => "arena-unavailable",
            },
            Self::External(ExternalError::Unavailable { .. }) => "external-unavailable",
            Self::External(ExternalError::Rejected { .. }) => "external-rejected",
            Self::Transport(_) | Self::Json(_) => "malformed-request",
            Self::Io(_) => "io",
            Self::Yaml(_) => "scenario-invalid",
        }
    }
}

// ============================================================================
// Scenario Errors
// ============================================================================

/// Scenario loading and validation errors.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the scenario file
        path: PathBuf,
        /// Error message from the parser
        message: String,
    },

    /// Scenario validation failed
    #[error("validation failed for {path}")]
    ValidationError {
        /// Path (or id) of the scenario
        path: String,
        /// List of validation issues found
        issues: Vec<ValidationIssue>,
    },

    /// Referenced scenario file not found
    #[error("scenario file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// No scenario registered under the given id
    #[error("unknown scenario: {id}")]
    UnknownScenario {
        /// The requested scenario id
        id: String,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },
}

/// A single validation issue found during scenario validation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the problematic field (e.g., `"stages[2].commands"`)
    pub path: String,
    /// Description of the validation issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Validation failure that prevents the scenario from being used
    Error,
    /// Potential issue that does not prevent loading
    Warning,
}

// ============================================================================
// Session Errors
// ============================================================================

/// Arena session lifecycle errors.
///
/// These cover operations that fail before reaching a mode rule engine:
/// joining, readiness, starting, and administrative control. Per-action
/// rejections inside a running match are `ActionOutcome::Rejected` instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The arena already holds its maximum number of participants
    #[error("arena is full ({max} participants)")]
    ArenaFull {
        /// Configured participant limit
        max: usize,
    },

    /// Join attempted after the match started
    #[error("arena already started")]
    AlreadyStarted,

    /// Operation attempted on an ended session
    #[error("session has ended")]
    SessionEnded,

    /// Start requested by a non-host participant
    #[error("only the host may start the match")]
    NotHost,

    /// Start requested below the mode's participant minimum
    #[error("not enough participants: have {have}, need {need}")]
    NotEnoughParticipants {
        /// Current participant count
        have: usize,
        /// Required minimum
        need: usize,
    },

    /// Start requested while some participants are not ready
    #[error("{pending} participant(s) not ready")]
    NotAllReady {
        /// Number of participants still not ready
        pending: usize,
    },

    /// The requester is not a participant of this arena
    #[error("not a participant: {id}")]
    NotParticipant {
        /// The unknown participant id
        id: String,
    },

    /// Internal invariant violated; the session was force-ended and voided
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Session registry errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// An arena with this id is already live
    #[error("arena already exists: {id}")]
    AlreadyExists {
        /// The conflicting arena id
        id: String,
    },

    /// No live arena under this id
    #[error("arena not found: {id}")]
    NotFound {
        /// The requested arena id
        id: String,
    },

    /// Destroy requested for a session that has not ended
    #[error("arena {id} is still live (phase {phase})")]
    StillLive {
        /// The arena id
        id: String,
        /// Current phase name
        phase: String,
    },

    /// The session actor's mailbox is closed (actor crashed or shut down)
    #[error("session actor unavailable for arena {id}")]
    ActorUnavailable {
        /// The arena id
        id: String,
    },
}

// ============================================================================
// External Collaborator Errors
// ============================================================================

/// Errors from external collaborators (identity, inventory, progression).
///
/// Always treated as transient: authoritative session state is never
/// mutated on the failing path.
#[derive(Debug, Error)]
pub enum ExternalError {
    /// The collaborator could not be reached
    #[error("{service} unavailable: {message}")]
    Unavailable {
        /// Collaborator name (e.g. `"progression"`)
        service: String,
        /// Underlying failure description
        message: String,
    },

    /// The collaborator rejected the request
    #[error("{service} rejected request: {message}")]
    Rejected {
        /// Collaborator name
        service: String,
        /// Rejection description
        message: String,
    },
}

// ============================================================================
// Transport Errors
// ============================================================================

/// Reference transport errors (stdio NDJSON loop).
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error during transport operations
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed request envelope
    #[error("malformed envelope: {0}")]
    Malformed(String),
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `redarena` operations.
pub type Result<T> = std::result::Result<T, RedArenaError>;
