//! Scenario storage.
//!
//! Sessions resolve scenarios by id through a [`ScenarioStore`]. The
//! filesystem store scans a directory once at startup; the in-memory store
//! backs tests and embedded use.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::ScenarioError;
use crate::scenario::loader;
use crate::scenario::schema::Scenario;

/// Read-only scenario lookup.
pub trait ScenarioStore: Send + Sync {
    /// Resolves a scenario by id.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError::UnknownScenario`] for unknown ids.
    fn get(&self, id: &str) -> Result<Scenario, ScenarioError>;

    /// Lists all known scenarios, sorted by id.
    fn list(&self) -> Vec<ScenarioSummary>;
}

/// Catalog entry returned by [`ScenarioStore::list`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ScenarioSummary {
    /// Scenario id
    pub id: String,
    /// Display name
    pub name: String,
    /// Game mode
    pub mode: String,
    /// Difficulty tier, kebab-case
    pub difficulty: String,
    /// Time limit in milliseconds
    pub time_limit_ms: u64,
}

impl ScenarioSummary {
    fn of(scenario: &Scenario) -> Self {
        Self {
            id: scenario.id.clone(),
            name: scenario.name.clone(),
            mode: scenario.mode().to_string(),
            difficulty: format!("{:?}", scenario.difficulty).to_lowercase(),
            time_limit_ms: scenario.time_limit,
        }
    }
}

/// Store backed by a directory of `*.yaml` / `*.yml` files.
///
/// The directory is scanned eagerly; files that fail to load are skipped
/// with a warning so one bad file does not take the catalog down.
#[derive(Debug, Default)]
pub struct FsScenarioStore {
    scenarios: BTreeMap<String, Scenario>,
}

impl FsScenarioStore {
    /// Scans `dir` and loads every scenario file in it.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError::MissingFile`] when the directory cannot
    /// be read.
    pub fn scan(dir: &Path) -> Result<Self, ScenarioError> {
        let entries = std::fs::read_dir(dir).map_err(|_| ScenarioError::MissingFile {
            path: dir.to_path_buf(),
        })?;

        let mut scenarios = BTreeMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
            if !is_yaml {
                continue;
            }
            match loader::load_file(&path) {
                Ok(scenario) => {
                    debug!(id = %scenario.id, path = %path.display(), "loaded scenario");
                    if let Some(previous) = scenarios.insert(scenario.id.clone(), scenario) {
                        warn!(
                            id = %previous.id,
                            path = %path.display(),
                            "duplicate scenario id; later file wins"
                        );
                    }
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping scenario file");
                }
            }
        }
        info!(count = scenarios.len(), dir = %dir.display(), "scenario catalog ready");
        Ok(Self { scenarios })
    }

    /// Number of loaded scenarios.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    /// True when the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

impl ScenarioStore for FsScenarioStore {
    fn get(&self, id: &str) -> Result<Scenario, ScenarioError> {
        self.scenarios
            .get(id)
            .cloned()
            .ok_or_else(|| ScenarioError::UnknownScenario { id: id.to_string() })
    }

    fn list(&self) -> Vec<ScenarioSummary> {
        self.scenarios.values().map(ScenarioSummary::of).collect()
    }
}

/// In-memory store for tests and embedded catalogs.
#[derive(Debug, Default)]
pub struct InMemoryScenarioStore {
    scenarios: BTreeMap<String, Scenario>,
}

impl InMemoryScenarioStore {
    /// Builds a store from a list of scenarios.
    #[must_use]
    pub fn new(scenarios: impl IntoIterator<Item = Scenario>) -> Self {
        Self {
            scenarios: scenarios
                .into_iter()
                .map(|s| (s.id.clone(), s))
                .collect(),
        }
    }
}

impl ScenarioStore for InMemoryScenarioStore {
    fn get(&self, id: &str) -> Result<Scenario, ScenarioError> {
        self.scenarios
            .get(id)
            .cloned()
            .ok_or_else(|| ScenarioError::UnknownScenario { id: id.to_string() })
    }

    fn list(&self) -> Vec<ScenarioSummary> {
        self.scenarios.values().map(ScenarioSummary::of).collect()
    }
}
