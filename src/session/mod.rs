//! Session layer: the per-arena state machine and its actor wrapper.

pub mod actor;
pub mod clock;
pub mod resolver;
pub mod state;

pub use actor::{ActorConfig, SessionHandle, spawn, spawn_session, wall_clock_ms};
pub use resolver::ActionLedger;
pub use state::{ArenaSession, GameStateSnapshot, ItemKind, LeaderboardRow, SessionEvent};
