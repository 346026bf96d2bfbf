//! The `serve` command: run the match engine on stdio.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::args::ServeArgs;
use crate::error::RedArenaError;
use crate::external::{NullIdentity, NullProgression, UnlimitedInventory};
use crate::observability::events::{Event, EventEmitter};
use crate::observability::metrics;
use crate::registry::SessionRegistry;
use crate::scenario::store::FsScenarioStore;
use crate::server::{Server, ServerOptions};
use crate::session::actor::ActorConfig;

/// Start the server.
///
/// # Errors
///
/// Returns a scenario error when the scenario directory cannot be loaded,
/// and transport errors from the request loop.
pub async fn run(args: &ServeArgs, cancel: CancellationToken) -> Result<(), RedArenaError> {
    metrics::describe_metrics();

    let store = FsScenarioStore::scan(&args.scenario_dir)?;
    if store.is_empty() {
        tracing::warn!(dir = %args.scenario_dir.display(), "no scenarios loaded");
    }

    let emitter = match &args.events_file {
        Some(path) => EventEmitter::from_file(path)?,
        None => EventEmitter::stderr(),
    };
    let emitter = Arc::new(emitter);

    emitter.emit(Event::ServerStarted {
        timestamp: Utc::now(),
        scenario_dir: args.scenario_dir.display().to_string(),
    });
    info!(
        scenarios = store.len(),
        tick = ?args.tick_interval,
        "redarena serving on stdio"
    );

    let server = Server::new(ServerOptions {
        store: Arc::new(store),
        registry: Arc::new(SessionRegistry::new()),
        identity: Arc::new(NullIdentity),
        inventory: Arc::new(UnlimitedInventory),
        progression: Arc::new(NullProgression),
        emitter: Arc::clone(&emitter),
        actor_config: ActorConfig {
            tick_interval: args.tick_interval,
            ..ActorConfig::default()
        },
        cancel,
    });
    let result = server.run().await;

    emitter.emit(Event::ServerStopped {
        timestamp: Utc::now(),
        reason: match &result {
            Ok(()) => "EOF".to_string(),
            Err(e) => format!("error: {e}"),
        },
    });
    result
}
