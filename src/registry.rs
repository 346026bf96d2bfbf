//! Session registry.
//!
//! The concurrent map from arena id to live session handle. This is the
//! only cross-session shared structure; everything per-match lives inside
//! the session actor behind the handle.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::arena::{ArenaId, ArenaPhase};
use crate::error::RegistryError;
use crate::observability::metrics;
use crate::session::actor::SessionHandle;

/// Concurrent registry of live arena sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<ArenaId, SessionHandle>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly spawned session under its id.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyExists`] when the id is taken.
    pub fn insert(&self, handle: SessionHandle) -> Result<(), RegistryError> {
        let id = handle.arena_id().clone();
        match self.sessions.entry(id.clone()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyExists { id: id.to_string() }),
            Entry::Vacant(slot) => {
                slot.insert(handle);
                metrics::set_sessions_live(self.sessions.len() as u64);
                Ok(())
            }
        }
    }

    /// Looks up a live session.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown ids.
    pub fn get(&self, id: &ArenaId) -> Result<SessionHandle, RegistryError> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RegistryError::NotFound { id: id.to_string() })
    }

    /// Removes an ended session and shuts its actor down. Destroying an
    /// already-removed id succeeds, so retries are harmless.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::StillLive`] when the arena has not ended.
    pub async fn destroy(&self, id: &ArenaId) -> Result<(), RegistryError> {
        let Some(handle) = self.sessions.get(id).map(|e| e.value().clone()) else {
            return Ok(());
        };
        let phase = handle
            .arena()
            .await
            .map(|a| a.phase)
            // An unreachable actor cannot be live; allow the removal.
            .unwrap_or(ArenaPhase::Ended);
        if phase != ArenaPhase::Ended {
            return Err(RegistryError::StillLive {
                id: id.to_string(),
                phase: phase.to_string(),
            });
        }
        if let Some((_, handle)) = self.sessions.remove(id) {
            handle.shutdown();
        }
        metrics::set_sessions_live(self.sessions.len() as u64);
        Ok(())
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when no session is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Ids of all registered sessions.
    #[must_use]
    pub fn arena_ids(&self) -> Vec<ArenaId> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }
}

/// Shared registry handle.
pub type SharedRegistry = Arc<SessionRegistry>;
