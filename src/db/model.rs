//! Database row models used by repositories.
//!
//! Keep these structs focused on the data written to or returned by queries.
//! Business logic lives in higher layers.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Insert payload for one remote recording.
#[derive(Debug, Clone)]
pub struct NewMeeting {
    pub user_id: String,
    pub external_id: String,
    pub title: Option<String>,
    /// Serialized JSON array of transcript entries.
    pub transcript_json: String,
    pub call_duration_minutes: Option<i64>,
    pub call_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Meeting slice returned to API callers.
#[derive(Debug, Clone, Serialize)]
pub struct StoredMeeting {
    pub external_id: String,
    pub title: Option<String>,
    pub transcript: serde_json::Value,
    pub call_duration_minutes: Option<i64>,
    pub call_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
