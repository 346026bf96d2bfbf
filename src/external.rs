//! External collaborator seams.
//!
//! The engine never talks to accounts, progression, or inventory storage
//! directly; it calls these traits. The null implementations keep the
//! server fully functional standalone and are what the test suite runs
//! against.

use async_trait::async_trait;

use crate::arena::ParticipantId;
use crate::error::ExternalError;
use crate::results::ArenaResult;
use crate::session::state::ItemKind;

/// Resolves participant ids to display names at join time.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolves a display name.
    ///
    /// # Errors
    ///
    /// Returns [`ExternalError::Rejected`] for unknown or banned ids, and
    /// [`ExternalError::Unavailable`] when the backing service is down.
    async fn display_name(&self, id: &ParticipantId) -> Result<String, ExternalError>;
}

/// Receives the final result for experience and reward accounting.
#[async_trait]
pub trait Progression: Send + Sync {
    /// Awards the compiled result. Called at most once per arena.
    ///
    /// # Errors
    ///
    /// Returns [`ExternalError::Unavailable`] when the backing service is
    /// down; the result itself is already frozen and is not rolled back.
    async fn award(&self, result: &ArenaResult) -> Result<(), ExternalError>;
}

/// Checks and consumes item ownership before an item effect applies.
#[async_trait]
pub trait Inventory: Send + Sync {
    /// Consumes one instance of the item from the participant's inventory.
    ///
    /// # Errors
    ///
    /// Returns [`ExternalError::Rejected`] when the participant does not
    /// own the item.
    async fn consume(&self, id: &ParticipantId, item: &ItemKind) -> Result<(), ExternalError>;
}

/// Identity resolver that echoes the id as the display name.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullIdentity;

#[async_trait]
impl IdentityResolver for NullIdentity {
    async fn display_name(&self, id: &ParticipantId) -> Result<String, ExternalError> {
        Ok(id.to_string())
    }
}

/// Progression sink that drops results.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgression;

#[async_trait]
impl Progression for NullProgression {
    async fn award(&self, _result: &ArenaResult) -> Result<(), ExternalError> {
        Ok(())
    }
}

/// Inventory that owns infinitely many of everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnlimitedInventory;

#[async_trait]
impl Inventory for UnlimitedInventory {
    async fn consume(
        &self,
        _id: &ParticipantId,
        _item: &ItemKind,
    ) -> Result<(), ExternalError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_identity_echoes_id() {
        let name = NullIdentity
            .display_name(&ParticipantId::new("u1"))
            .await
            .unwrap();
        assert_eq!(name, "u1");
    }

    #[tokio::test]
    async fn test_unlimited_inventory_always_consumes() {
        let result = UnlimitedInventory
            .consume(&ParticipantId::new("u1"), &ItemKind::Hint)
            .await;
        assert!(result.is_ok());
    }
}
