//! Session actor.
//!
//! Each arena runs as one tokio task that exclusively owns its
//! [`ArenaSession`]. All access goes through a command mailbox, so state
//! mutation is serialized without locks and two racing flag submissions
//! resolve in mailbox order. The actor also drives the 1 Hz tick that
//! enforces deadlines and settles time-derived scoring.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::arena::{ActionId, Arena, ArenaId, ArenaPhase, ArenaSettings, ParticipantId};
use crate::broadcast::{Broadcaster, Subscription};
use crate::error::{RegistryError, Result, SessionError};
use crate::external::Progression;
use crate::modes::{ActionOutcome, ModeAction};
use crate::observability::events::{Event, EventEmitter};
use crate::observability::metrics;
use crate::results::ArenaResult;
use crate::session::state::{
    ArenaSession, GameStateSnapshot, ItemKind, LeaderboardRow, SessionEvent,
};

/// Wall clock in unix milliseconds.
#[must_use]
pub fn wall_clock_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Actor tuning knobs.
#[derive(Debug, Clone)]
pub struct ActorConfig {
    /// Periodic tick cadence. Totals are derived from elapsed time, so
    /// this only bounds deadline detection latency.
    pub tick_interval: Duration,
    /// Command mailbox depth.
    pub command_buffer: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            command_buffer: 64,
        }
    }
}

/// A command sent to a session actor.
enum SessionCommand {
    Join {
        id: ParticipantId,
        display_name: String,
        reply: oneshot::Sender<std::result::Result<(), SessionError>>,
    },
    Leave {
        id: ParticipantId,
        reply: oneshot::Sender<std::result::Result<(), SessionError>>,
    },
    SetReady {
        id: ParticipantId,
        ready: bool,
        reply: oneshot::Sender<std::result::Result<(), SessionError>>,
    },
    Start {
        id: ParticipantId,
        reply: oneshot::Sender<std::result::Result<(), SessionError>>,
    },
    Action {
        action_id: ActionId,
        id: ParticipantId,
        action: ModeAction,
        reply: oneshot::Sender<ActionOutcome>,
    },
    UseItem {
        action_id: ActionId,
        id: ParticipantId,
        item: ItemKind,
        reply: oneshot::Sender<ActionOutcome>,
    },
    ForceEnd {
        requester: Option<ParticipantId>,
        reply: oneshot::Sender<std::result::Result<(), SessionError>>,
    },
    Subscribe {
        reply: oneshot::Sender<Subscription>,
    },
    Snapshot {
        reply: oneshot::Sender<GameStateSnapshot>,
    },
    Arena {
        reply: oneshot::Sender<Arena>,
    },
    Leaderboard {
        reply: oneshot::Sender<Vec<LeaderboardRow>>,
    },
    FetchResult {
        reply: oneshot::Sender<Option<ArenaResult>>,
    },
}

// ============================================================================
// Handle
// ============================================================================

/// Cheap, cloneable handle to a running session actor.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    arena_id: ArenaId,
    tx: mpsc::Sender<SessionCommand>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Join { .. } => "Join",
            Self::Leave { .. } => "Leave",
            Self::SetReady { .. } => "SetReady",
            Self::Start { .. } => "Start",
            Self::Action { .. } => "Action",
            Self::UseItem { .. } => "UseItem",
            Self::ForceEnd { .. } => "ForceEnd",
            Self::Subscribe { .. } => "Subscribe",
            Self::Snapshot { .. } => "Snapshot",
            Self::Arena { .. } => "Arena",
            Self::Leaderboard { .. } => "Leaderboard",
            Self::FetchResult { .. } => "FetchResult",
        };
        f.write_str(name)
    }
}

impl SessionHandle {
    /// The arena this handle belongs to.
    #[must_use]
    pub fn arena_id(&self) -> &ArenaId {
        &self.arena_id
    }

    /// True once the actor has been told to shut down.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Tells the actor to shut down after draining its mailbox.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn unavailable(&self) -> RegistryError {
        RegistryError::ActorUnavailable {
            id: self.arena_id.to_string(),
        }
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(make(tx))
            .await
            .map_err(|_| self.unavailable())?;
        rx.await.map_err(|_| self.unavailable().into())
    }

    /// Joins the lobby.
    ///
    /// # Errors
    ///
    /// Session preconditions, or actor unavailability.
    pub async fn join(&self, id: ParticipantId, display_name: String) -> Result<()> {
        self.call(|reply| SessionCommand::Join {
            id,
            display_name,
            reply,
        })
        .await??;
        Ok(())
    }

    /// Leaves the arena.
    ///
    /// # Errors
    ///
    /// Session preconditions, or actor unavailability.
    pub async fn leave(&self, id: ParticipantId) -> Result<()> {
        self.call(|reply| SessionCommand::Leave { id, reply }).await??;
        Ok(())
    }

    /// Sets lobby readiness.
    ///
    /// # Errors
    ///
    /// Session preconditions, or actor unavailability.
    pub async fn set_ready(&self, id: ParticipantId, ready: bool) -> Result<()> {
        self.call(|reply| SessionCommand::SetReady { id, ready, reply })
            .await??;
        Ok(())
    }

    /// Starts the match (host only).
    ///
    /// # Errors
    ///
    /// Session preconditions, or actor unavailability.
    pub async fn start(&self, id: ParticipantId) -> Result<()> {
        self.call(|reply| SessionCommand::Start { id, reply }).await??;
        Ok(())
    }

    /// Submits one mutating action.
    ///
    /// # Errors
    ///
    /// Only actor unavailability; in-game rejections come back inside the
    /// [`ActionOutcome`].
    pub async fn action(
        &self,
        action_id: ActionId,
        id: ParticipantId,
        action: ModeAction,
    ) -> Result<ActionOutcome> {
        self.call(|reply| SessionCommand::Action {
            action_id,
            id,
            action,
            reply,
        })
        .await
    }

    /// Applies a consumable item.
    ///
    /// # Errors
    ///
    /// Only actor unavailability.
    pub async fn use_item(
        &self,
        action_id: ActionId,
        id: ParticipantId,
        item: ItemKind,
    ) -> Result<ActionOutcome> {
        self.call(|reply| SessionCommand::UseItem {
            action_id,
            id,
            item,
            reply,
        })
        .await
    }

    /// Ends the match early.
    ///
    /// # Errors
    ///
    /// Session preconditions, or actor unavailability.
    pub async fn force_end(&self, requester: Option<ParticipantId>) -> Result<()> {
        self.call(|reply| SessionCommand::ForceEnd { requester, reply })
            .await??;
        Ok(())
    }

    /// Subscribes to the event stream: a full snapshot first, then live
    /// events from exactly that point, with no gap and no overlap.
    ///
    /// # Errors
    ///
    /// Only actor unavailability.
    pub async fn subscribe(&self) -> Result<Subscription> {
        self.call(|reply| SessionCommand::Subscribe { reply }).await
    }

    /// Fetches the full game state snapshot.
    ///
    /// # Errors
    ///
    /// Only actor unavailability.
    pub async fn snapshot(&self) -> Result<GameStateSnapshot> {
        self.call(|reply| SessionCommand::Snapshot { reply }).await
    }

    /// Fetches the arena record.
    ///
    /// # Errors
    ///
    /// Only actor unavailability.
    pub async fn arena(&self) -> Result<Arena> {
        self.call(|reply| SessionCommand::Arena { reply }).await
    }

    /// Fetches the current standings.
    ///
    /// # Errors
    ///
    /// Only actor unavailability.
    pub async fn leaderboard(&self) -> Result<Vec<LeaderboardRow>> {
        self.call(|reply| SessionCommand::Leaderboard { reply }).await
    }

    /// Fetches the final result, if the match has ended.
    ///
    /// # Errors
    ///
    /// Only actor unavailability.
    pub async fn result(&self) -> Result<Option<ArenaResult>> {
        self.call(|reply| SessionCommand::FetchResult { reply }).await
    }
}

// ============================================================================
// Actor
// ============================================================================

/// Spawns the actor task for a session and returns its handle.
#[must_use]
pub fn spawn(
    session: ArenaSession,
    config: &ActorConfig,
    emitter: Arc<EventEmitter>,
    progression: Arc<dyn Progression>,
) -> SessionHandle {
    let (tx, rx) = mpsc::channel(config.command_buffer);
    let cancel = CancellationToken::new();
    let arena_id = session.arena().id.clone();
    let actor = SessionActor {
        session,
        broadcaster: Broadcaster::default(),
        rx,
        cancel: cancel.clone(),
        tick_interval: config.tick_interval,
        emitter,
        progression,
    };
    tokio::spawn(actor.run());
    SessionHandle {
        arena_id,
        tx,
        cancel,
    }
}

struct SessionActor {
    session: ArenaSession,
    broadcaster: Broadcaster,
    rx: mpsc::Receiver<SessionCommand>,
    cancel: CancellationToken,
    tick_interval: Duration,
    emitter: Arc<EventEmitter>,
    progression: Arc<dyn Progression>,
}

impl SessionActor {
    async fn run(mut self) {
        let arena_id = self.session.arena().id.clone();
        debug!(arena = %arena_id, "session actor started");
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let events = self.session.tick(wall_clock_ms());
                    self.publish(events).await;
                }
                cmd = self.rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    self.handle(cmd).await;
                }
            }
        }
        debug!(arena = %arena_id, "session actor stopped");
    }

    #[allow(clippy::too_many_lines)]
    async fn handle(&mut self, cmd: SessionCommand) {
        let now_ms = wall_clock_ms();
        match cmd {
            SessionCommand::Join {
                id,
                display_name,
                reply,
            } => {
                let result = self.session.join(id, display_name, now_ms);
                match result {
                    Ok(events) => {
                        let _ = reply.send(Ok(()));
                        self.publish(events).await;
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            SessionCommand::Leave { id, reply } => {
                let result = self.session.leave(&id, now_ms);
                match result {
                    Ok(events) => {
                        let _ = reply.send(Ok(()));
                        self.publish(events).await;
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            SessionCommand::SetReady { id, ready, reply } => {
                let result = self.session.set_ready(&id, ready);
                match result {
                    Ok(events) => {
                        let _ = reply.send(Ok(()));
                        self.publish(events).await;
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            SessionCommand::Start { id, reply } => {
                let result = self.session.start(&id, now_ms);
                match result {
                    Ok(events) => {
                        let _ = reply.send(Ok(()));
                        self.publish(events).await;
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            SessionCommand::Action {
                action_id,
                id,
                action,
                reply,
            } => {
                let replay = self.session.ledger().lookup(&action_id).is_some();
                let (outcome, events) =
                    self.session.handle_action(action_id, &id, &action, now_ms);
                if replay {
                    metrics::record_replay(action.kind_label());
                } else {
                    metrics::record_action(action.kind_label(), outcome.is_accepted());
                }
                let _ = reply.send(outcome);
                self.publish(events).await;
            }
            SessionCommand::UseItem {
                action_id,
                id,
                item,
                reply,
            } => {
                let replay = self.session.ledger().lookup(&action_id).is_some();
                let (outcome, events) = self.session.use_item(action_id, &id, &item, now_ms);
                if replay {
                    metrics::record_replay("use-item");
                } else {
                    metrics::record_action("use-item", outcome.is_accepted());
                }
                let _ = reply.send(outcome);
                self.publish(events).await;
            }
            SessionCommand::ForceEnd { requester, reply } => {
                let result = self.session.force_end(requester.as_ref(), now_ms);
                match result {
                    Ok(events) => {
                        let _ = reply.send(Ok(()));
                        self.publish(events).await;
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            SessionCommand::Subscribe { reply } => {
                // Snapshot and receiver are taken in the same actor turn,
                // so the subscriber sees no event older than its snapshot.
                let subscription = Subscription {
                    snapshot: self.session.snapshot(),
                    events: self.broadcaster.subscribe(),
                };
                let _ = reply.send(subscription);
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.session.snapshot());
            }
            SessionCommand::Arena { reply } => {
                let _ = reply.send(self.session.arena().clone());
            }
            SessionCommand::Leaderboard { reply } => {
                let _ = reply.send(self.session.leaderboard());
            }
            SessionCommand::FetchResult { reply } => {
                let _ = reply.send(self.session.result().cloned());
            }
        }
    }

    /// Publishes a batch to subscribers and mirrors the operationally
    /// interesting ones onto the JSONL stream.
    async fn publish(&mut self, events: Vec<SessionEvent>) {
        for event in &events {
            match event {
                SessionEvent::MatchStarted { .. } => {
                    metrics::record_phase_transition("started");
                    self.emitter.emit(Event::PhaseChanged {
                        timestamp: chrono::Utc::now(),
                        arena_id: self.session.arena().id.clone(),
                        phase: ArenaPhase::Started,
                    });
                }
                SessionEvent::GracePeriodStarted { .. } => {
                    metrics::record_phase_transition("grace");
                    self.emitter.emit(Event::PhaseChanged {
                        timestamp: chrono::Utc::now(),
                        arena_id: self.session.arena().id.clone(),
                        phase: ArenaPhase::Grace,
                    });
                }
                SessionEvent::ItemUsed { participant, item } => {
                    self.emitter.emit(Event::ItemApplied {
                        timestamp: chrono::Utc::now(),
                        arena_id: self.session.arena().id.clone(),
                        participant: participant.clone(),
                        item: item.label().to_string(),
                    });
                }
                SessionEvent::Ended { status } => {
                    metrics::record_phase_transition("ended");
                    let arena = self.session.arena();
                    let duration_ms = arena
                        .started_at_ms
                        .map_or(0, |s| wall_clock_ms().saturating_sub(s));
                    metrics::record_match_ended(&status.to_string(), duration_ms);
                    if let Some(result) = self.session.result() {
                        self.emitter.emit(Event::MatchEnded {
                            timestamp: chrono::Utc::now(),
                            arena_id: arena.id.clone(),
                            status: *status,
                            winner: result.winner.clone(),
                            participants: result.rankings.len(),
                        });
                        if let Err(e) = self.progression.award(result).await {
                            warn!(arena = %arena.id, error = %e, "progression award failed");
                        }
                    }
                }
                _ => {}
            }
        }
        self.broadcaster.publish_all(events);
    }
}

/// Convenience constructor used by the registry: builds the session and
/// spawns its actor in one step.
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn spawn_session(
    arena_id: ArenaId,
    scenario: crate::scenario::schema::Scenario,
    host: ParticipantId,
    host_display_name: String,
    settings: ArenaSettings,
    rng_seed: u64,
    config: &ActorConfig,
    emitter: Arc<EventEmitter>,
    progression: Arc<dyn Progression>,
) -> SessionHandle {
    let session = ArenaSession::new(
        arena_id,
        scenario,
        host,
        host_display_name,
        settings,
        rng_seed,
        wall_clock_ms(),
    );
    spawn(session, config, emitter, progression)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::NullProgression;
    use crate::scenario::schema::{
        Difficulty, ModeContent, Scenario, VulnRaceContent, Vulnerability,
    };
    use indexmap::IndexMap;

    fn scenario() -> Scenario {
        let mut vulnerabilities = IndexMap::new();
        vulnerabilities.insert(
            "sqli".to_string(),
            Vulnerability {
                name: "SQLi".to_string(),
                flag: "FLAG{a}".to_string(),
                points: 40,
                hint: None,
            },
        );
        Scenario {
            id: "hunt".to_string(),
            name: "Hunt".to_string(),
            difficulty: Difficulty::Medium,
            time_limit: 600_000,
            min_participants: 1,
            max_participants: 4,
            content: ModeContent::VulnRace(VulnRaceContent {
                vulnerabilities,
                invalid_penalty: 10,
            }),
        }
    }

    fn handle() -> SessionHandle {
        spawn_session(
            ArenaId::new("a1"),
            scenario(),
            ParticipantId::new("host"),
            "host".to_string(),
            ArenaSettings::default(),
            42,
            &ActorConfig::default(),
            Arc::new(EventEmitter::noop()),
            Arc::new(NullProgression),
        )
    }

    #[tokio::test]
    async fn test_lifecycle_through_handle() {
        let h = handle();
        h.join(ParticipantId::new("p2"), "p2".to_string())
            .await
            .unwrap();
        h.set_ready(ParticipantId::new("p2"), true).await.unwrap();
        h.start(ParticipantId::new("host")).await.unwrap();

        let arena = h.arena().await.unwrap();
        assert_eq!(arena.phase, ArenaPhase::Started);

        let outcome = h
            .action(
                ActionId::new("act-1"),
                ParticipantId::new("host"),
                ModeAction::SubmitFlag {
                    flag: "FLAG{a}".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(outcome.is_accepted());
    }

    #[tokio::test]
    async fn test_subscriber_snapshot_precedes_events() {
        let h = handle();
        let subscription = h.subscribe().await.unwrap();
        assert_eq!(subscription.snapshot.arena.phase, ArenaPhase::Waiting);
        let mut rx = subscription.events;

        h.join(ParticipantId::new("p2"), "p2".to_string())
            .await
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, SessionEvent::ParticipantJoined { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_actions_resolve_once() {
        let h = handle();
        h.start(ParticipantId::new("host")).await.unwrap();

        let action = ModeAction::SubmitFlag {
            flag: "FLAG{a}".to_string(),
        };
        let first = h
            .action(
                ActionId::new("dup"),
                ParticipantId::new("host"),
                action.clone(),
            )
            .await
            .unwrap();
        let second = h
            .action(ActionId::new("dup"), ParticipantId::new("host"), action)
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_shutdown_makes_actor_unavailable() {
        let h = handle();
        h.shutdown();
        // The mailbox may accept a few in-flight commands; eventually the
        // actor is gone and calls fail.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let result = h.arena().await;
        assert!(result.is_err());
    }
}
