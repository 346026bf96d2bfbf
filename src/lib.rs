//! `redarena` — authoritative match engine for offensive-security minigames.
//!
//! Timed multiplayer arenas run as single-writer session actors: capture
//! and hold a contested host, race through staged command lines, answer
//! forensics questions, hunt vulnerability flags, or social-engineer a
//! simulated target. The engine is the sole authority on phase, score,
//! and time; clients only send actions and render what they are told.

pub mod arena;
pub mod broadcast;
pub mod cli;
pub mod error;
pub mod events;
pub mod external;
pub mod modes;
pub mod observability;
pub mod registry;
pub mod results;
pub mod scenario;
pub mod server;
pub mod session;

pub use arena::{ActionId, Arena, ArenaId, ArenaPhase, ArenaSettings, Participant, ParticipantId};
pub use error::{RedArenaError, Result};
pub use registry::{SessionRegistry, SharedRegistry};
pub use results::{ArenaResult, ResultStatus};
pub use scenario::{Scenario, ScenarioStore};
pub use session::{ArenaSession, SessionHandle};
