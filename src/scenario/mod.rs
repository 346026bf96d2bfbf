//! Scenario content: schema, loading, validation, and storage.

pub mod loader;
pub mod schema;
pub mod store;

pub use loader::{load_file, validate};
pub use schema::{ModeContent, ModeKind, Scenario};
pub use store::{FsScenarioStore, InMemoryScenarioStore, ScenarioStore, ScenarioSummary};
