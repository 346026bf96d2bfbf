//! Wire protocol for the NDJSON control channel.
//!
//! Clients send one [`RequestEnvelope`] per line and receive one
//! [`ServerReply`] per line. Session events pushed to subscribers reuse
//! [`SessionEvent`](crate::session::SessionEvent) unchanged, so the live
//! feed and the snapshot share one vocabulary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RedArenaError;
use crate::modes::ModeAction;
use crate::session::ItemKind;

/// One client request line.
///
/// `arena_id` is absent only for catalog-level requests (`create-arena`,
/// `list-scenarios`). `participant_id` identifies the acting participant;
/// requests that act on a session without one are rejected at dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Target arena, when the request addresses one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arena_id: Option<String>,

    /// Acting participant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,

    /// The request body, tagged by `request`
    #[serde(flatten)]
    pub request: ClientRequest,
}

/// Request bodies, tagged by `request`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "kebab-case")]
pub enum ClientRequest {
    /// Create a new arena from a scenario and join as host
    CreateArena {
        /// Scenario id to instantiate
        scenario_id: String,
        /// Host display name
        display_name: String,
        /// Optional per-arena setting overrides
        #[serde(default, skip_serializing_if = "Option::is_none")]
        settings: Option<ArenaSettingsPatch>,
        /// Optional RNG seed for reproducible matches
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seed: Option<u64>,
    },
    /// List the scenario catalog
    ListScenarios,
    /// Join an arena lobby
    Join {
        /// Display name shown on the leaderboard
        display_name: String,
    },
    /// Leave an arena
    Leave,
    /// Set lobby readiness
    SetReady {
        /// Ready flag
        ready: bool,
    },
    /// Start the match (host only)
    Start,
    /// Subscribe to the live event feed
    Subscribe,
    /// Fetch the current full game state
    GetGameState,
    /// Fetch the current leaderboard
    GetLeaderboard,
    /// Fetch the compiled result of an ended match
    GetResult,
    /// Submit a gameplay action
    Action {
        /// Client-generated dedup id
        action_id: String,
        /// The action body, tagged by `type`
        #[serde(flatten)]
        action: ModeAction,
    },
    /// Consume an inventory item
    UseItem {
        /// Client-generated dedup id
        action_id: String,
        /// Item to consume and apply
        item: ItemKind,
    },
    /// End the match early (host only)
    ForceEnd,
    /// Remove an ended arena from the registry
    Destroy,
}

impl ClientRequest {
    /// Wire name of the request, matching its serde tag.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CreateArena { .. } => "create-arena",
            Self::ListScenarios => "list-scenarios",
            Self::Join { .. } => "join",
            Self::Leave => "leave",
            Self::SetReady { .. } => "set-ready",
            Self::Start => "start",
            Self::Subscribe => "subscribe",
            Self::GetGameState => "get-game-state",
            Self::GetLeaderboard => "get-leaderboard",
            Self::GetResult => "get-result",
            Self::Action { .. } => "action",
            Self::UseItem { .. } => "use-item",
            Self::ForceEnd => "force-end",
            Self::Destroy => "destroy",
        }
    }
}

/// Partial arena settings supplied at creation time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArenaSettingsPatch {
    /// Override the scenario's time limit, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard_time_limit_ms: Option<u64>,

    /// End the match via grace period on the first completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_on_first_solve: Option<bool>,

    /// Fixed grace period length, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_ms: Option<u64>,
}

/// One server reply line, tagged by `reply`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "kebab-case")]
pub enum ServerReply {
    /// The request was applied and produced no payload
    Ack {
        /// Arena the request addressed, when any
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arena_id: Option<String>,
    },
    /// Outcome of a gameplay action
    ActionResult {
        /// Whether the action was accepted
        accepted: bool,
        /// Structured outcome payload
        outcome: Value,
    },
    /// Payload for a query request
    Data {
        /// Structured payload
        data: Value,
    },
    /// The request was rejected
    Error {
        /// Stable machine-readable code
        code: String,
        /// Human-readable message
        message: String,
    },
}

impl ServerReply {
    /// Builds an error reply from a domain error, mapping the variant to
    /// a stable code.
    #[must_use]
    pub fn from_error(error: &RedArenaError) -> Self {
        Self::Error {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_request_wire_shape() {
        let line = r#"{"arena_id":"a1","participant_id":"p1","request":"action","action_id":"act-9","type":"submit-flag","flag":"FLAG{x}"}"#;
        let envelope: RequestEnvelope = serde_json::from_str(line).unwrap();
        assert_eq!(envelope.arena_id.as_deref(), Some("a1"));
        let ClientRequest::Action { action_id, action } = envelope.request else {
            panic!("expected action request");
        };
        assert_eq!(action_id, "act-9");
        assert!(matches!(action, ModeAction::SubmitFlag { .. }));
    }

    #[test]
    fn test_create_arena_without_arena_id() {
        let line = r#"{"request":"create-arena","scenario_id":"webapp-hunt","display_name":"neo","seed":7}"#;
        let envelope: RequestEnvelope = serde_json::from_str(line).unwrap();
        assert!(envelope.arena_id.is_none());
        assert!(matches!(
            envelope.request,
            ClientRequest::CreateArena { seed: Some(7), .. }
        ));
    }

    #[test]
    fn test_reply_round_trip() {
        let reply = ServerReply::ActionResult {
            accepted: true,
            outcome: json!({"captured": true}),
        };
        let line = serde_json::to_string(&reply).unwrap();
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["reply"], "action-result");
        assert_eq!(parsed["accepted"], true);
    }

    #[test]
    fn test_error_reply_carries_code() {
        let err = RedArenaError::from(crate::error::RegistryError::NotFound {
            id: "ghost".to_string(),
        });
        let ServerReply::Error { code, .. } = ServerReply::from_error(&err) else {
            panic!("expected error reply");
        };
        assert_eq!(code, "arena-not-found");
    }

    #[test]
    fn test_request_names_match_tags() {
        for (line, expected) in [
            (r#"{"request":"list-scenarios"}"#, "list-scenarios"),
            (r#"{"request":"start"}"#, "start"),
            (r#"{"request":"force-end"}"#, "force-end"),
        ] {
            let envelope: RequestEnvelope = serde_json::from_str(line).unwrap();
            assert_eq!(envelope.request.name(), expected);
        }
    }
}
