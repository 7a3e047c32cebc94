mod support;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use meetdash::db;
use meetdash::http::{router, AppState};
use support::{dummy_oauth, page, remote_meeting, seed_connection, setup_pool, ScriptedProvider};

/// Serve the app on an ephemeral port and return its base URL.
async fn spawn_app(pool: sqlx::SqlitePool, provider: Arc<ScriptedProvider>) -> String {
    let state = AppState {
        pool,
        oauth: Arc::new(dummy_oauth()),
        provider,
        redirect_uri: "http://localhost:3000/api/meetings/callback".into(),
    };
    let app = router("meetings", state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api/meetings")
}

/// The webhook acks before the insert lands; poll for the row.
async fn wait_for_meeting(pool: &sqlx::SqlitePool, user_id: &str, external_id: &str) -> bool {
    for _ in 0..100 {
        if db::meeting_exists(pool, user_id, external_id).await.unwrap() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn webhook_stores_once_and_suppresses_duplicates() {
    let pool = setup_pool().await;
    let base = spawn_app(pool.clone(), Arc::new(ScriptedProvider::default())).await;
    let client = reqwest::Client::new();

    let payload = json!({
        "recording_id": "rec-9",
        "meeting_title": "Pushed meeting",
        "transcript": [{ "text": "hello" }],
        "created_at": "2024-05-01T09:00:00Z"
    });

    let res = client
        .post(format!("{base}/webhook/u1"))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], json!(true));
    assert!(body.get("duplicate").is_none());

    assert!(wait_for_meeting(&pool, "u1", "rec-9").await);

    // Redelivery of the same recording is acknowledged but not re-stored.
    let res = client
        .post(format!("{base}/webhook/u1"))
        .json(&payload)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["duplicate"], json!(true));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM meetings")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn webhook_rejects_payload_without_recording_id() {
    let pool = setup_pool().await;
    let base = spawn_app(pool.clone(), Arc::new(ScriptedProvider::default())).await;

    let res = reqwest::Client::new()
        .post(format!("{base}/webhook/u1"))
        .json(&json!({ "title": "no id here" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 422);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM meetings")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn status_reflects_stored_credentials() {
    let pool = setup_pool().await;
    seed_connection(&pool, "u1").await;
    let base = spawn_app(pool, Arc::new(ScriptedProvider::default())).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .get(format!("{base}/status?user_id=u1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["connected"], json!(true));

    let body: Value = client
        .get(format!("{base}/status?user_id=stranger"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["connected"], json!(false));

    let res = client
        .get(format!("{base}/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
}

#[tokio::test]
async fn import_runs_a_sync_pass_and_reports_counts() {
    let pool = setup_pool().await;
    seed_connection(&pool, "u1").await;
    let provider = Arc::new(ScriptedProvider::with_pages(vec![Ok(page(
        vec![
            remote_meeting(Some("rec-1"), "Design review", "2024-05-01T09:00:00Z"),
            remote_meeting(None, "Broken", "2024-05-01T10:00:00Z"),
        ],
        None,
    ))]));
    let base = spawn_app(pool.clone(), provider).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{base}/import?user_id=u1"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["imported"], json!(1));
    assert_eq!(body["skipped"], json!(1));
    assert_eq!(body["is_incremental"], json!(false));
    assert_eq!(body["skipped_meetings"][0]["reason"], json!("no_recording_id"));

    // The stored meeting is visible through the list endpoint.
    let body: Value = client
        .get(format!("{base}/meetings?user_id=u1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["meetings"].as_array().unwrap().len(), 1);
    assert_eq!(body["meetings"][0]["external_id"], json!("rec-1"));
}

#[tokio::test]
async fn import_for_unconnected_user_returns_server_error() {
    let pool = setup_pool().await;
    let base = spawn_app(pool, Arc::new(ScriptedProvider::default())).await;

    let res = reqwest::Client::new()
        .post(format!("{base}/import?user_id=ghost"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 500);
    let body: Value = res.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("not connected"));
}
