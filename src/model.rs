use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored OAuth credential state for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub user_id: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Epoch seconds; 0 means "expired / unknown".
    pub token_expires_at: i64,
    /// Sync watermark. None forces a full sync.
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl Connection {
    /// A connection counts as usable when it holds a non-expired access token.
    pub fn is_connected(&self, now_epoch: i64) -> bool {
        self.access_token.is_some() && self.token_expires_at >= now_epoch
    }
}

/// One utterance in a transcript. The provider's shape varies, so every
/// field is optional and unknown keys are dropped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TranscriptEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<Speaker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Speaker {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Why a remote meeting was not imported.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoRecordingId,
    AlreadyExists,
    Error,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoRecordingId => "no_recording_id",
            SkipReason::AlreadyExists => "already_exists",
            SkipReason::Error => "error",
        }
    }
}

/// Summary of a meeting imported during a sync pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportedMeeting {
    pub external_id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub transcript_items: usize,
}

/// A remote meeting the pass saw but did not import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedMeeting {
    pub external_id: Option<String>,
    pub title: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub reason: SkipReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated outcome of one sync pass. Transient, never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub imported: usize,
    pub skipped: usize,
    pub meetings: Vec<ImportedMeeting>,
    pub skipped_meetings: Vec<SkippedMeeting>,
    pub is_incremental: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncReport {
    /// A pass that failed before touching any remote record.
    pub fn failed(is_incremental: bool, error: impl Into<String>) -> Self {
        Self {
            is_incremental,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}
