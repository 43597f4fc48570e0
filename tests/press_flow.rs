//! End-to-end press flow over injected fakes: memory store, scripted
//! fetcher, manual clock. These exercise the full widget scenario - ten
//! good presses, escalating throttle messages, the simulated crash, and the
//! lazy window reset - without touching the real clock, disk, or network.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use musebox::config::Config;
use musebox::session::{PressOutcome, Session};
use musebox_limiter::ManualClock;
use musebox_store::{KvStore, MemoryStore};
use musebox_supply::PackFetcher;
use musebox_supply::testing::{ScriptedFetcher, pack_payload};

fn manual_clock() -> Arc<ManualClock> {
    let start = DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
        .expect("valid timestamp")
        .with_timezone(&Utc);
    Arc::new(ManualClock::new(start))
}

fn preload_pack(store: &Arc<dyn KvStore>, id: &str, count: usize) {
    let ideas: Vec<String> = (0..count).map(|i| format!("{id} idea {i}")).collect();
    let blob = serde_json::to_string(&ideas).expect("ideas encode");
    store.set(&format!("pack.{id}"), &blob).expect("pack seeds");
}

fn session_over(
    store: &Arc<dyn KvStore>,
    fetcher: ScriptedFetcher,
    clock: &Arc<ManualClock>,
) -> Session {
    let fetcher: Arc<dyn PackFetcher> = Arc::new(fetcher);
    let clock: Arc<dyn musebox_limiter::Clock> = clock.clone();
    let session = Session::assemble(
        Arc::clone(store),
        fetcher,
        None,
        clock,
        &Config::default(),
    );
    session.supply().seed_rng(23);
    session
}

#[tokio::test]
async fn full_throttle_scenario() {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    preload_pack(&store, "starter", 40);
    let clock = manual_clock();
    let mut session = session_over(&store, ScriptedFetcher::new(), &clock);
    session.bootstrap().await;

    // Presses 1-10 each serve an idea, allowance descending 9..0.
    for press in 1..=10u32 {
        match session.press().await {
            PressOutcome::Idea { remaining, .. } => assert_eq!(remaining, 10 - press),
            other => panic!("press {press} should serve an idea, got {other:?}"),
        }
    }

    // Press 11 is the first post-limit press and gets the gentlest warning.
    match session.press().await {
        PressOutcome::Throttled { message, reset_in } => {
            assert_eq!(message, "Still here?");
            assert!(reset_in > std::time::Duration::ZERO);
        }
        other => panic!("press 11 should be throttled, got {other:?}"),
    }

    // Presses 12-29 keep warning; press 30 (the 20th past the limit)
    // crashes.
    for press in 12..=29 {
        assert!(
            matches!(session.press().await, PressOutcome::Throttled { .. }),
            "press {press} should still warn"
        );
    }
    assert!(matches!(session.press().await, PressOutcome::Crashed));

    // Four hours past the window start, the next press behaves as though no
    // history existed.
    clock.advance(TimeDelta::hours(4) + TimeDelta::seconds(1));
    match session.press().await {
        PressOutcome::Idea { remaining, .. } => assert_eq!(remaining, 9),
        other => panic!("press after expiry should serve an idea, got {other:?}"),
    }
}

#[tokio::test]
async fn served_ideas_are_recorded_newest_first() {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    preload_pack(&store, "starter", 10);
    let clock = manual_clock();
    let mut session = session_over(&store, ScriptedFetcher::new(), &clock);

    let mut served = Vec::new();
    for _ in 0..3 {
        match session.press().await {
            PressOutcome::Idea { text, .. } => served.push(text),
            other => panic!("expected an idea, got {other:?}"),
        }
    }

    let history = session.history();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0], served[2], "newest entry first");
    assert_eq!(history[2], served[0]);
}

#[tokio::test]
async fn low_supply_schedules_a_background_fetch() {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    preload_pack(&store, "starter", 1);
    let fetcher = ScriptedFetcher::new()
        .with_index(&["fresh.json"])
        .with_pack(
            "fresh.json",
            pack_payload("fresh", &["f1", "f2", "f3", "f4"]),
        );
    let clock = manual_clock();
    let mut session = session_over(&store, fetcher, &clock);

    // The draw itself succeeds; the fetch it triggers only benefits future
    // presses.
    assert!(matches!(
        session.press().await,
        PressOutcome::Idea { .. }
    ));
    session.drain_background().await;

    assert_eq!(session.total_ideas(), 4);
    assert_eq!(session.packs(), vec![("fresh".to_string(), 4)]);
}

#[tokio::test]
async fn state_survives_between_sessions() {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    preload_pack(&store, "starter", 10);
    let clock = manual_clock();

    let mut session = session_over(&store, ScriptedFetcher::new(), &clock);
    for _ in 0..3 {
        assert!(matches!(session.press().await, PressOutcome::Idea { .. }));
    }
    drop(session);

    // A new session over the same store picks up where the last left off.
    let mut session = session_over(&store, ScriptedFetcher::new(), &clock);
    let report = session.status();
    assert_eq!(report.remaining_allowance, 7);
    assert_eq!(report.total_ideas, 7);
    assert_eq!(session.history().len(), 3);
}

#[tokio::test]
async fn corrupt_storage_degrades_to_fresh_state() {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    store.set("rate_limit", "{broken").expect("seed");
    store.set("history", "broken too").expect("seed");
    store.set("pack.starter", "[not ideas").expect("seed");
    let clock = manual_clock();
    let mut session = session_over(&store, ScriptedFetcher::new(), &clock);

    // Nothing usable was loaded, so the press is allowed but dry.
    match session.press().await {
        PressOutcome::Dry { remaining } => assert_eq!(remaining, 9),
        other => panic!("expected a dry press, got {other:?}"),
    }
    assert!(session.history().is_empty());
    // The corrupt pack blob was self-healed away.
    assert_eq!(store.get("pack.starter").expect("readable"), None);
}

#[tokio::test]
async fn reset_deletes_all_persisted_state() {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    preload_pack(&store, "starter", 5);
    let clock = manual_clock();
    let mut session = session_over(&store, ScriptedFetcher::new(), &clock);

    for _ in 0..2 {
        assert!(matches!(session.press().await, PressOutcome::Idea { .. }));
    }
    session.reset();

    assert!(store.keys().expect("readable").is_empty());
    let report = session.status();
    assert_eq!(report.remaining_allowance, 10);
    assert_eq!(report.total_ideas, 0);
    assert!(session.history().is_empty());
}
