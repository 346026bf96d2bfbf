//! Metrics collection.
//!
//! Typed convenience functions over the `metrics` facade with label
//! cardinality protection. A recorder (if any) is installed by the
//! embedding process; without one these calls are no-ops.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Known action kind labels, for cardinality protection. Anything else is
/// bucketed as `"__unknown__"` so client-controlled strings cannot grow the
/// label set without bound.
const KNOWN_ACTION_KINDS: [&str; 7] = [
    "execute",
    "submit-answer",
    "submit-flag",
    "attack",
    "defend",
    "dialogue-choice",
    "use-item",
];

/// Sanitizes an action kind for use as a metrics label.
#[must_use]
pub fn sanitize_action_label(kind: &str) -> &str {
    if KNOWN_ACTION_KINDS.contains(&kind) {
        kind
    } else {
        "__unknown__"
    }
}

/// Registers metric descriptions with the global recorder.
pub fn describe_metrics() {
    describe_counter!(
        "redarena_actions_total",
        "Total number of resolved actions by kind and outcome"
    );
    describe_counter!(
        "redarena_actions_replayed_total",
        "Actions answered from the de-duplication ledger"
    );
    describe_counter!(
        "redarena_sessions_created_total",
        "Total number of arena sessions created"
    );
    describe_counter!(
        "redarena_matches_ended_total",
        "Total number of matches ended by status"
    );
    describe_gauge!("redarena_sessions_live", "Currently registered sessions");
    describe_histogram!(
        "redarena_match_duration_seconds",
        "Match duration from start to end in seconds"
    );
    describe_counter!(
        "redarena_phase_transitions_total",
        "Total number of phase transitions"
    );
}

/// Records one resolved action.
pub fn record_action(kind: &str, accepted: bool) {
    let label = sanitize_action_label(kind);
    let outcome = if accepted { "accepted" } else { "rejected" };
    counter!(
        "redarena_actions_total",
        "kind" => label.to_owned(),
        "outcome" => outcome,
    )
    .increment(1);
}

/// Records an action answered from the ledger instead of being re-applied.
pub fn record_replay(kind: &str) {
    let label = sanitize_action_label(kind);
    counter!("redarena_actions_replayed_total", "kind" => label.to_owned()).increment(1);
}

/// Records a session creation.
pub fn record_session_created(mode: &str) {
    counter!("redarena_sessions_created_total", "mode" => mode.to_owned()).increment(1);
}

/// Records a match end with its duration.
pub fn record_match_ended(status: &str, duration_ms: u64) {
    counter!("redarena_matches_ended_total", "status" => status.to_owned()).increment(1);
    #[allow(clippy::cast_precision_loss)]
    histogram!("redarena_match_duration_seconds").record(duration_ms as f64 / 1000.0);
}

/// Sets the number of currently registered sessions.
#[allow(clippy::cast_precision_loss)]
pub fn set_sessions_live(count: u64) {
    gauge!("redarena_sessions_live").set(count as f64);
}

/// Records a phase transition.
pub fn record_phase_transition(phase: &str) {
    counter!("redarena_phase_transitions_total", "phase" => phase.to_owned()).increment(1);
}
