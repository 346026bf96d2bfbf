//! Structured operational event stream.
//!
//! Discrete, typed events emitted while the engine runs, serialized as
//! newline-delimited JSON (JSONL) with a monotonically increasing sequence
//! number for ordering. This is the operator-facing audit stream, separate
//! from the per-session broadcast that players subscribe to.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::arena::{ArenaId, ArenaPhase, ParticipantId};
use crate::results::ResultStatus;
use crate::scenario::schema::ModeKind;

// ---------------------------------------------------------------------------
// Event variants
// ---------------------------------------------------------------------------

/// A discrete operational event.
///
/// Each variant is tagged with `"type"` when serialized to JSON so consumers
/// can dispatch on the event kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// The server has started and is accepting requests.
    ServerStarted {
        /// When the server started.
        timestamp: DateTime<Utc>,
        /// Scenario directory in use.
        scenario_dir: String,
    },

    /// The server has stopped.
    ServerStopped {
        /// When the server stopped.
        timestamp: DateTime<Utc>,
        /// Human-readable stop reason.
        reason: String,
    },

    /// A new arena session was created.
    SessionCreated {
        /// When the session was created.
        timestamp: DateTime<Utc>,
        /// The new arena.
        arena_id: ArenaId,
        /// Game mode.
        mode: ModeKind,
        /// Scenario id.
        scenario_id: String,
        /// Hosting participant.
        host: ParticipantId,
    },

    /// An arena changed phase.
    PhaseChanged {
        /// When the transition occurred.
        timestamp: DateTime<Utc>,
        /// The arena.
        arena_id: ArenaId,
        /// Phase entered.
        phase: ArenaPhase,
    },

    /// An arena ended and its result was compiled.
    MatchEnded {
        /// When the match ended.
        timestamp: DateTime<Utc>,
        /// The arena.
        arena_id: ArenaId,
        /// Why it ended.
        status: ResultStatus,
        /// Winner, if any participant completed.
        winner: Option<ParticipantId>,
        /// Number of ranked participants.
        participants: usize,
    },

    /// A consumable item was applied to a running match.
    ItemApplied {
        /// When the item was applied.
        timestamp: DateTime<Utc>,
        /// The arena.
        arena_id: ArenaId,
        /// The consuming participant.
        participant: ParticipantId,
        /// Item kind label.
        item: String,
    },

    /// A state invariant was violated and the match was voided.
    InvariantViolation {
        /// When the violation was detected.
        timestamp: DateTime<Utc>,
        /// The arena.
        arena_id: ArenaId,
        /// What went wrong.
        detail: String,
    },
}

// ---------------------------------------------------------------------------
// Envelope (adds sequence number via serde flatten)
// ---------------------------------------------------------------------------

/// Wraps an [`Event`] with a monotonically increasing sequence number.
#[derive(Debug, Serialize)]
struct EventEnvelope {
    /// Zero-based, monotonically increasing sequence counter.
    sequence: u64,
    /// The wrapped event (flattened into the same JSON object).
    #[serde(flatten)]
    event: Event,
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Thread-safe, buffered JSONL event writer.
///
/// Sequence numbers are assigned under the writer lock, so the numbers on
/// the wire are dense and match line order even under contention.
/// Serialization and I/O failures are swallowed: the audit stream must
/// never take the server down.
pub struct EventEmitter {
    sink: Mutex<Sink>,
}

struct Sink {
    writer: BufWriter<Box<dyn Write + Send>>,
    next_sequence: u64,
}

// Box<dyn Write> is not Debug.
impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter").finish_non_exhaustive()
    }
}

impl EventEmitter {
    /// Creates an emitter that writes to the given writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Mutex::new(Sink {
                writer: BufWriter::new(writer),
                next_sequence: 0,
            }),
        }
    }

    /// Creates an emitter that writes to stderr, which does not conflict
    /// with the stdio transport's use of stdout.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Creates an emitter that silently discards all events.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Creates an emitter that writes to a file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Emits one event as a single JSONL line.
    pub fn emit(&self, event: Event) {
        let Ok(mut sink) = self.sink.lock() else {
            return;
        };
        let envelope = EventEnvelope {
            sequence: sink.next_sequence,
            event,
        };
        let Ok(mut line) = serde_json::to_vec(&envelope) else {
            return;
        };
        line.push(b'\n');
        sink.next_sequence += 1;
        let _ = sink.writer.write_all(&line);
        let _ = sink.writer.flush();
    }

    /// Returns the number of events emitted so far.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.sink.lock().map_or(0, |sink| sink.next_sequence)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
