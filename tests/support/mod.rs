#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

use meetdash::auth::OAuthClient;
use meetdash::db;
use meetdash::model::TranscriptEntry;
use meetdash::provider::{MeetingsPage, MeetingsProvider, RemoteMeeting};

/// A second pool connection to `sqlite::memory:` would be a separate, empty
/// database, so the test pool is capped at one connection.
pub async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

/// OAuth client pointing nowhere; used when the stored token is valid and no
/// refresh should happen.
pub fn dummy_oauth() -> OAuthClient {
    OAuthClient::new(
        "http://localhost:1/oauth2/authorize",
        "http://localhost:1/oauth2/token",
        "cid".into(),
        "secret".into(),
        "public_api".into(),
    )
    .unwrap()
}

/// Seed a connection whose access token stays valid for the whole test.
pub async fn seed_connection(pool: &sqlx::SqlitePool, user_id: &str) {
    let expires_at = Utc::now().timestamp() + 3_600;
    db::upsert_connection_tokens(pool, user_id, "test-token", Some("test-refresh"), expires_at)
        .await
        .unwrap();
}

pub fn ts(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
}

pub fn remote_meeting(recording_id: Option<&str>, title: &str, created_at: &str) -> RemoteMeeting {
    RemoteMeeting {
        recording_id: recording_id.map(str::to_string),
        title: Some(title.to_string()),
        meeting_title: None,
        created_at: Some(ts(created_at)),
        recording_start_time: Some(ts(created_at)),
        recording_end_time: Some(ts(created_at) + chrono::Duration::minutes(30)),
    }
}

pub fn page(items: Vec<RemoteMeeting>, next_cursor: Option<&str>) -> MeetingsPage {
    MeetingsPage {
        items,
        next_cursor: next_cursor.map(str::to_string),
    }
}

fn transcript_entries(n: usize) -> Vec<TranscriptEntry> {
    (0..n)
        .map(|i| {
            serde_json::from_value(serde_json::json!({
                "timestamp": format!("00:{i:02}"),
                "text": format!("line {i}"),
            }))
            .unwrap()
        })
        .collect()
}

/// Scripted provider fake: list pages are consumed front-to-back, transcript
/// fetches succeed with a fixed number of entries unless the recording id is
/// marked as failing.
#[derive(Default)]
pub struct ScriptedProvider {
    pages: Mutex<VecDeque<Result<MeetingsPage>>>,
    pub failing_transcripts: HashSet<String>,
    pub transcript_items: usize,
    pub list_calls: AtomicUsize,
    pub transcript_calls: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn with_pages(pages: Vec<Result<MeetingsPage>>) -> Self {
        Self {
            pages: Mutex::new(VecDeque::from(pages)),
            transcript_items: 3,
            ..Default::default()
        }
    }

    pub fn failing_transcript(mut self, recording_id: &str) -> Self {
        self.failing_transcripts.insert(recording_id.to_string());
        self
    }

    pub async fn transcript_calls(&self) -> Vec<String> {
        self.transcript_calls.lock().await.clone()
    }
}

#[async_trait]
impl MeetingsProvider for ScriptedProvider {
    async fn list_meetings(
        &self,
        _access_token: &str,
        _cursor: Option<&str>,
    ) -> Result<MeetingsPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut pages = self.pages.lock().await;
        pages.pop_front().unwrap_or_else(|| Ok(MeetingsPage::default()))
    }

    async fn fetch_transcript(
        &self,
        _access_token: &str,
        recording_id: &str,
    ) -> Result<Vec<TranscriptEntry>> {
        self.transcript_calls
            .lock()
            .await
            .push(recording_id.to_string());
        if self.failing_transcripts.contains(recording_id) {
            return Err(anyhow!("API returned 500"));
        }
        Ok(transcript_entries(self.transcript_items))
    }
}
