mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use meetdash::db;
use meetdash::scheduler::{SyncScheduler, TickSummary};
use support::{dummy_oauth, page, remote_meeting, seed_connection, setup_pool, ScriptedProvider};

#[tokio::test]
async fn tick_isolates_per_user_failures() {
    let pool = setup_pool().await;

    // user-a holds an expired token and nothing to refresh with, so its sync
    // fails before reaching the provider. user-b is healthy.
    let expired = Utc::now().timestamp() - 10;
    db::upsert_connection_tokens(&pool, "user-a", "stale", None, expired)
        .await
        .unwrap();
    seed_connection(&pool, "user-b").await;

    let provider = Arc::new(ScriptedProvider::with_pages(vec![Ok(page(
        vec![remote_meeting(Some("rec-1"), "Standup", "2024-05-01T09:00:00Z")],
        None,
    ))]));

    let scheduler = SyncScheduler::new(
        pool.clone(),
        Arc::new(dummy_oauth()),
        provider,
        Duration::from_secs(1800),
    );

    let summary = scheduler.run_once().await;
    assert_eq!(summary, TickSummary { synced: 1, failed: 1 });

    // The healthy user's import landed despite the failing one.
    assert!(db::meeting_exists(&pool, "user-b", "rec-1").await.unwrap());
    assert!(!db::meeting_exists(&pool, "user-a", "rec-1").await.unwrap());
}

#[tokio::test]
async fn tick_with_no_connections_is_a_no_op() {
    let pool = setup_pool().await;
    let provider = Arc::new(ScriptedProvider::default());

    let scheduler = SyncScheduler::new(
        pool,
        Arc::new(dummy_oauth()),
        provider.clone(),
        Duration::from_secs(1800),
    );

    let summary = scheduler.run_once().await;
    assert_eq!(summary, TickSummary::default());
    assert_eq!(
        provider.list_calls.load(std::sync::atomic::Ordering::SeqCst),
        0
    );
}

#[tokio::test]
async fn started_scheduler_shuts_down_cleanly() {
    let pool = setup_pool().await;
    let provider: Arc<ScriptedProvider> = Arc::new(ScriptedProvider::default());

    let scheduler = SyncScheduler::new(
        pool,
        Arc::new(dummy_oauth()),
        provider,
        Duration::from_secs(1800),
    );

    // The first tick only fires after a full interval, so shutting down
    // immediately must return without syncing anyone.
    let handle = scheduler.start();
    handle.shutdown().await;
}
