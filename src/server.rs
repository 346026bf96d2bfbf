//! Server runtime: the stdio NDJSON control loop.
//!
//! Each stdin line is one [`RequestEnvelope`]; each stdout line is one
//! [`ServerReply`] or, for subscribers, a pushed session event. Dispatch is
//! factored out of the I/O loop so the whole request surface is unit
//! testable without a process boundary.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::arena::{ActionId, ArenaId, ArenaSettings, ParticipantId};
use crate::broadcast::Subscription;
use crate::error::{ExternalError, RedArenaError, Result, TransportError};
use crate::events::{ArenaSettingsPatch, ClientRequest, RequestEnvelope, ServerReply};
use crate::external::{IdentityResolver, Inventory, Progression};
use crate::observability::events::{Event, EventEmitter};
use crate::observability::metrics;
use crate::registry::SharedRegistry;
use crate::scenario::store::ScenarioStore;
use crate::session::actor::{ActorConfig, spawn_session};
use crate::session::state::SessionEvent;

/// Options for constructing a [`Server`].
///
/// Groups the collaborators that `Server::new` needs, avoiding a function
/// signature with too many arguments.
pub struct ServerOptions {
    /// Scenario catalog.
    pub store: Arc<dyn ScenarioStore>,
    /// Live session registry.
    pub registry: SharedRegistry,
    /// Display-name resolution.
    pub identity: Arc<dyn IdentityResolver>,
    /// Item ownership checks.
    pub inventory: Arc<dyn Inventory>,
    /// Result sink for experience accounting.
    pub progression: Arc<dyn Progression>,
    /// Operational event stream.
    pub emitter: Arc<EventEmitter>,
    /// Session actor tuning.
    pub actor_config: ActorConfig,
    /// Token for cooperative shutdown.
    pub cancel: CancellationToken,
}

/// Arena match server.
///
/// Owns no session state itself; everything per-match lives behind the
/// registry's actor handles.
pub struct Server {
    store: Arc<dyn ScenarioStore>,
    registry: SharedRegistry,
    identity: Arc<dyn IdentityResolver>,
    inventory: Arc<dyn Inventory>,
    progression: Arc<dyn Progression>,
    emitter: Arc<EventEmitter>,
    actor_config: ActorConfig,
    cancel: CancellationToken,
}

/// Result of dispatching one request.
pub enum Dispatched {
    /// A single reply line.
    Reply(ServerReply),
    /// A snapshot reply followed by a live event tail.
    Subscribed {
        /// Arena the subscription is for.
        arena_id: ArenaId,
        /// Snapshot plus receiver, taken in one actor turn.
        subscription: Subscription,
    },
}

/// Pushed event line for subscribers. Distinguished from replies by the
/// absence of a `reply` key.
#[derive(Serialize)]
struct PushEnvelope<'a> {
    arena_id: &'a ArenaId,
    #[serde(flatten)]
    event: &'a SessionEvent,
}

impl Server {
    /// Creates a new server from the given options.
    #[must_use]
    pub fn new(opts: ServerOptions) -> Self {
        Self {
            store: opts.store,
            registry: opts.registry,
            identity: opts.identity,
            inventory: opts.inventory,
            progression: opts.progression,
            emitter: opts.emitter,
            actor_config: opts.actor_config,
            cancel: opts.cancel,
        }
    }

    /// Runs the stdio request loop until EOF or cancellation.
    ///
    /// # Errors
    ///
    /// Returns an error only when stdin or stdout fails fatally; per-request
    /// failures are turned into error replies.
    pub async fn run(&self) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        let stdout = Arc::new(Mutex::new(tokio::io::stdout()));

        loop {
            let line = tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("server cancelled");
                    break;
                }
                line = lines.next_line() => line.map_err(TransportError::Io)?,
            };
            let Some(line) = line else {
                debug!("stdin EOF, shutting down");
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            let dispatched = match serde_json::from_str::<RequestEnvelope>(&line) {
                Ok(envelope) => {
                    debug!(request = envelope.request.name(), "dispatching request");
                    self.dispatch(envelope).await
                }
                Err(e) => Dispatched::Reply(ServerReply::Error {
                    code: "malformed-request".to_string(),
                    message: e.to_string(),
                }),
            };

            match dispatched {
                Dispatched::Reply(reply) => write_line(&stdout, &reply).await?,
                Dispatched::Subscribed {
                    arena_id,
                    subscription,
                } => {
                    let snapshot = serde_json::to_value(&subscription.snapshot)
                        .map_err(RedArenaError::from)?;
                    write_line(&stdout, &ServerReply::Data { data: snapshot }).await?;
                    self.spawn_forwarder(arena_id, subscription, Arc::clone(&stdout));
                }
            }
        }
        Ok(())
    }

    /// Forwards a subscription's live events onto stdout until the session
    /// actor drops its broadcaster.
    fn spawn_forwarder(
        &self,
        arena_id: ArenaId,
        subscription: Subscription,
        stdout: Arc<Mutex<tokio::io::Stdout>>,
    ) {
        let cancel = self.cancel.clone();
        let mut rx = subscription.events;
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    () = cancel.cancelled() => break,
                    event = rx.recv() => event,
                };
                match event {
                    Ok(event) => {
                        let push = PushEnvelope {
                            arena_id: &arena_id,
                            event: &event,
                        };
                        if write_line(&stdout, &push).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(arena = %arena_id, missed, "subscriber lagged, events dropped");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Dispatches one request, folding every failure into an error reply.
    pub async fn dispatch(&self, envelope: RequestEnvelope) -> Dispatched {
        match self.dispatch_inner(envelope).await {
            Ok(dispatched) => dispatched,
            Err(e) => Dispatched::Reply(ServerReply::from_error(&e)),
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn dispatch_inner(&self, envelope: RequestEnvelope) -> Result<Dispatched> {
        let RequestEnvelope {
            arena_id,
            participant_id,
            request,
        } = envelope;

        match request {
            ClientRequest::CreateArena {
                scenario_id,
                display_name,
                settings,
                seed,
            } => {
                let host = require_participant(participant_id)?;
                let scenario = self.store.get(&scenario_id)?;
                let name = self.resolve_name(&host, display_name).await?;
                let arena_id = ArenaId::new(uuid::Uuid::new_v4().to_string());
                let seed = seed.unwrap_or_else(rand::random);

                let handle = spawn_session(
                    arena_id.clone(),
                    scenario.clone(),
                    host.clone(),
                    name,
                    merge_settings(settings),
                    seed,
                    &self.actor_config,
                    Arc::clone(&self.emitter),
                    Arc::clone(&self.progression),
                );
                self.registry.insert(handle)?;
                metrics::record_session_created(&scenario.mode().to_string());
                self.emitter.emit(Event::SessionCreated {
                    timestamp: Utc::now(),
                    arena_id: arena_id.clone(),
                    mode: scenario.mode(),
                    scenario_id,
                    host,
                });
                Ok(Dispatched::Reply(ServerReply::Data {
                    data: json!({
                        "arena_id": arena_id,
                        "mode": scenario.mode().to_string(),
                    }),
                }))
            }
            ClientRequest::ListScenarios => Ok(Dispatched::Reply(ServerReply::Data {
                data: serde_json::to_value(self.store.list()).map_err(RedArenaError::from)?,
            })),
            ClientRequest::Join { display_name } => {
                let id = require_participant(participant_id)?;
                let arena_id = require_arena(arena_id)?;
                let name = self.resolve_name(&id, display_name).await?;
                self.registry.get(&arena_id)?.join(id, name).await?;
                Ok(ack(arena_id))
            }
            ClientRequest::Leave => {
                let id = require_participant(participant_id)?;
                let arena_id = require_arena(arena_id)?;
                self.registry.get(&arena_id)?.leave(id).await?;
                Ok(ack(arena_id))
            }
            ClientRequest::SetReady { ready } => {
                let id = require_participant(participant_id)?;
                let arena_id = require_arena(arena_id)?;
                self.registry.get(&arena_id)?.set_ready(id, ready).await?;
                Ok(ack(arena_id))
            }
            ClientRequest::Start => {
                let id = require_participant(participant_id)?;
                let arena_id = require_arena(arena_id)?;
                self.registry.get(&arena_id)?.start(id).await?;
                Ok(ack(arena_id))
            }
            ClientRequest::Subscribe => {
                let arena_id = require_arena(arena_id)?;
                let subscription = self.registry.get(&arena_id)?.subscribe().await?;
                Ok(Dispatched::Subscribed {
                    arena_id,
                    subscription,
                })
            }
            ClientRequest::GetGameState => {
                let arena_id = require_arena(arena_id)?;
                let snapshot = self.registry.get(&arena_id)?.snapshot().await?;
                Ok(Dispatched::Reply(ServerReply::Data {
                    data: serde_json::to_value(snapshot).map_err(RedArenaError::from)?,
                }))
            }
            ClientRequest::GetLeaderboard => {
                let arena_id = require_arena(arena_id)?;
                let rows = self.registry.get(&arena_id)?.leaderboard().await?;
                Ok(Dispatched::Reply(ServerReply::Data {
                    data: serde_json::to_value(rows).map_err(RedArenaError::from)?,
                }))
            }
            ClientRequest::GetResult => {
                let arena_id = require_arena(arena_id)?;
                let result = self.registry.get(&arena_id)?.result().await?;
                Ok(Dispatched::Reply(result.map_or_else(
                    || ServerReply::Error {
                        code: "result-pending".to_string(),
                        message: "match has not ended".to_string(),
                    },
                    |result| ServerReply::Data {
                        data: serde_json::to_value(result).unwrap_or_default(),
                    },
                )))
            }
            ClientRequest::Action { action_id, action } => {
                let id = require_participant(participant_id)?;
                let arena_id = require_arena(arena_id)?;
                let outcome = self
                    .registry
                    .get(&arena_id)?
                    .action(ActionId::new(action_id), id, action)
                    .await?;
                Ok(Dispatched::Reply(ServerReply::ActionResult {
                    accepted: outcome.is_accepted(),
                    outcome: serde_json::to_value(&outcome).map_err(RedArenaError::from)?,
                }))
            }
            ClientRequest::UseItem { action_id, item } => {
                let id = require_participant(participant_id)?;
                let arena_id = require_arena(arena_id)?;
                // Ownership is settled before the effect; a rejected consume
                // leaves session state untouched.
                self.inventory.consume(&id, &item).await?;
                let outcome = self
                    .registry
                    .get(&arena_id)?
                    .use_item(ActionId::new(action_id), id, item)
                    .await?;
                Ok(Dispatched::Reply(ServerReply::ActionResult {
                    accepted: outcome.is_accepted(),
                    outcome: serde_json::to_value(&outcome).map_err(RedArenaError::from)?,
                }))
            }
            ClientRequest::ForceEnd => {
                let id = require_participant(participant_id)?;
                let arena_id = require_arena(arena_id)?;
                self.registry.get(&arena_id)?.force_end(Some(id)).await?;
                Ok(ack(arena_id))
            }
            ClientRequest::Destroy => {
                let arena_id = require_arena(arena_id)?;
                self.registry.destroy(&arena_id).await?;
                Ok(ack(arena_id))
            }
        }
    }

    /// Resolves a display name through the identity collaborator, falling
    /// back to the client-supplied name when the service is down.
    async fn resolve_name(
        &self,
        id: &ParticipantId,
        supplied: String,
    ) -> Result<String> {
        match self.identity.display_name(id).await {
            Ok(name) => Ok(name),
            Err(ExternalError::Unavailable { service, message }) => {
                warn!(%service, %message, "identity unavailable, using supplied name");
                Ok(supplied)
            }
            Err(e @ ExternalError::Rejected { .. }) => Err(e.into()),
        }
    }
}

fn ack(arena_id: ArenaId) -> Dispatched {
    Dispatched::Reply(ServerReply::Ack {
        arena_id: Some(arena_id.to_string()),
    })
}

fn require_arena(arena_id: Option<String>) -> Result<ArenaId> {
    arena_id
        .map(ArenaId::new)
        .ok_or_else(|| TransportError::Malformed("missing arena_id".to_string()).into())
}

fn require_participant(participant_id: Option<String>) -> Result<ParticipantId> {
    participant_id
        .map(ParticipantId::new)
        .ok_or_else(|| TransportError::Malformed("missing participant_id".to_string()).into())
}

fn merge_settings(patch: Option<ArenaSettingsPatch>) -> ArenaSettings {
    let patch = patch.unwrap_or_default();
    ArenaSettings {
        end_on_first_solve: patch.end_on_first_solve.unwrap_or(false),
        grace_ms: patch.grace_ms,
        hard_time_limit_ms: patch.hard_time_limit_ms,
    }
}

async fn write_line<T: Serialize>(
    stdout: &Arc<Mutex<tokio::io::Stdout>>,
    value: &T,
) -> Result<()> {
    let mut line = serde_json::to_vec(value).map_err(RedArenaError::from)?;
    line.push(b'\n');
    let mut out = stdout.lock().await;
    out.write_all(&line).await.map_err(TransportError::Io)?;
    out.flush().await.map_err(TransportError::Io)?;
    Ok(())
}
