//! Session actor and registry behavior under the tokio runtime.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use redarena::arena::{ActionId, ArenaId, ArenaPhase, ArenaSettings};
use redarena::external::NullProgression;
use redarena::modes::{ModeAction, ModeEvent};
use redarena::observability::events::EventEmitter;
use redarena::registry::SessionRegistry;
use redarena::results::ResultStatus;
use redarena::session::{ActorConfig, SessionEvent, SessionHandle, spawn_session};

use common::{SEED, pid, vuln_race_scenario};

fn spawn(id: &str, settings: ArenaSettings, config: &ActorConfig) -> SessionHandle {
    spawn_session(
        ArenaId::new(id),
        vuln_race_scenario(),
        pid("host"),
        "host".to_string(),
        settings,
        SEED,
        config,
        Arc::new(EventEmitter::noop()),
        Arc::new(NullProgression),
    )
}

fn submit(flag: &str) -> ModeAction {
    ModeAction::SubmitFlag {
        flag: flag.to_string(),
    }
}

#[tokio::test]
async fn test_full_match_through_handle() {
    let handle = spawn("m1", ArenaSettings::default(), &ActorConfig::default());
    let registry = SessionRegistry::new();
    registry.insert(handle.clone()).unwrap();

    let subscription = handle.subscribe().await.unwrap();
    assert_eq!(subscription.snapshot.arena.phase, ArenaPhase::Waiting);

    handle.join(pid("scout"), "scout".to_string()).await.unwrap();
    handle.set_ready(pid("scout"), true).await.unwrap();
    handle.start(pid("host")).await.unwrap();

    let outcome = handle
        .action(
            ActionId::random(),
            pid("host"),
            submit("FLAG{union_select}"),
        )
        .await
        .unwrap();
    assert!(outcome.is_accepted());

    let rows = handle.leaderboard().await.unwrap();
    assert_eq!(rows[0].participant, pid("host"));
    assert_eq!(rows[0].score, 40);

    handle.force_end(None).await.unwrap();
    let result = handle.result().await.unwrap().unwrap();
    assert_eq!(result.status, ResultStatus::Forced);

    registry.destroy(&ArenaId::new("m1")).await.unwrap();
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_concurrent_duplicate_action_ids_resolve_once() {
    let handle = spawn("m2", ArenaSettings::default(), &ActorConfig::default());
    handle.start(pid("host")).await.unwrap();

    // Two racing retries of the same logical submission: the mailbox
    // serializes them and the ledger replays the first outcome.
    let first = handle.clone();
    let second = handle.clone();
    let (a, b) = tokio::join!(
        first.action(
            ActionId::new("dup-1"),
            pid("host"),
            submit("FLAG{union_select}"),
        ),
        second.action(
            ActionId::new("dup-1"),
            pid("host"),
            submit("FLAG{union_select}"),
        ),
    );
    let a = a.unwrap();
    let b = b.unwrap();
    assert!(a.is_accepted());
    assert_eq!(a, b);

    // The flag scored exactly once.
    let rows = handle.leaderboard().await.unwrap();
    assert_eq!(rows[0].score, 40);

    handle.shutdown();
}

#[tokio::test]
async fn test_subscriber_receives_live_mode_events() {
    let handle = spawn("m3", ArenaSettings::default(), &ActorConfig::default());
    let subscription = handle.subscribe().await.unwrap();
    let mut rx = subscription.events;

    handle.start(pid("host")).await.unwrap();
    handle
        .action(
            ActionId::random(),
            pid("host"),
            submit("FLAG{union_select}"),
        )
        .await
        .unwrap();

    let found = timeout(Duration::from_secs(5), async {
        while let Ok(event) = rx.recv().await {
            if matches!(
                event,
                SessionEvent::Mode(ModeEvent::VulnFound { ref vuln_id, .. }) if vuln_id == "sqli"
            ) {
                return true;
            }
        }
        false
    })
    .await
    .unwrap();
    assert!(found);

    handle.shutdown();
}

#[tokio::test]
async fn test_periodic_tick_enforces_deadline() {
    let config = ActorConfig {
        tick_interval: Duration::from_millis(10),
        ..ActorConfig::default()
    };
    let settings = ArenaSettings {
        hard_time_limit_ms: Some(50),
        ..ArenaSettings::default()
    };
    let handle = spawn("m4", settings, &config);
    let subscription = handle.subscribe().await.unwrap();
    let mut rx = subscription.events;

    handle.start(pid("host")).await.unwrap();

    let ended = timeout(Duration::from_secs(5), async {
        while let Ok(event) = rx.recv().await {
            if matches!(
                event,
                SessionEvent::Ended {
                    status: ResultStatus::TimeLimit
                }
            ) {
                return true;
            }
        }
        false
    })
    .await
    .unwrap();
    assert!(ended);

    let result = handle.result().await.unwrap().unwrap();
    assert_eq!(result.status, ResultStatus::TimeLimit);

    handle.shutdown();
}
