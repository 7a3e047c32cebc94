//! HTTP client for the meetings provider's list and transcript APIs.
//!
//! The sync engine talks to [`MeetingsProvider`] so tests can substitute a
//! recording fake; [`HttpMeetingsProvider`] is the real reqwest-backed
//! implementation with a base-URL override for integration tests.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

use crate::config::Config;
use crate::model::TranscriptEntry;

/// One meeting as returned by the provider's list endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteMeeting {
    pub recording_id: Option<String>,
    pub title: Option<String>,
    pub meeting_title: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub recording_start_time: Option<DateTime<Utc>>,
    pub recording_end_time: Option<DateTime<Utc>>,
}

impl RemoteMeeting {
    /// Preferred display title: the explicit meeting title wins.
    pub fn display_title(&self) -> Option<String> {
        self.meeting_title.clone().or_else(|| self.title.clone())
    }

    /// Call length in whole minutes, rounded, when both timestamps are
    /// present and the range is positive.
    pub fn duration_minutes(&self) -> Option<i64> {
        let (start, end) = (self.recording_start_time?, self.recording_end_time?);
        let secs = (end - start).num_seconds();
        if secs <= 0 {
            return None;
        }
        Some(((secs as f64) / 60.0).round() as i64)
    }
}

/// One page of the provider's paginated meetings list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeetingsPage {
    #[serde(default)]
    pub items: Vec<RemoteMeeting>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Provider API surface the sync engine depends on. Iteration restarts from
/// the first page on every call chain; no cursor is persisted across passes.
#[async_trait]
pub trait MeetingsProvider: Send + Sync {
    async fn list_meetings(
        &self,
        access_token: &str,
        cursor: Option<&str>,
    ) -> Result<MeetingsPage>;

    async fn fetch_transcript(
        &self,
        access_token: &str,
        recording_id: &str,
    ) -> Result<Vec<TranscriptEntry>>;
}

#[derive(Clone)]
pub struct HttpMeetingsProvider {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for HttpMeetingsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpMeetingsProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpMeetingsProvider {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let mut base = cfg.provider.api_base.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        Self::with_base_url(Url::parse(&base).context("invalid provider.api_base")?)
    }

    pub fn with_base_url(base_url: Url) -> Result<Self> {
        let http = Client::builder()
            .user_agent("meetdash/0.1")
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, base_url })
    }
}

#[async_trait]
impl MeetingsProvider for HttpMeetingsProvider {
    async fn list_meetings(
        &self,
        access_token: &str,
        cursor: Option<&str>,
    ) -> Result<MeetingsPage> {
        let mut url = self.base_url.join("meetings")?;
        if let Some(cursor) = cursor {
            url.query_pairs_mut().append_pair("cursor", cursor);
        }

        let res = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .context("failed to reach meetings list endpoint")?;
        if !res.status().is_success() {
            return Err(anyhow!(
                "meetings list error {}: {}",
                res.status(),
                res.text().await.unwrap_or_default()
            ));
        }
        res.json::<MeetingsPage>()
            .await
            .context("invalid meetings list response")
    }

    async fn fetch_transcript(
        &self,
        access_token: &str,
        recording_id: &str,
    ) -> Result<Vec<TranscriptEntry>> {
        let url = self
            .base_url
            .join(&format!("recordings/{recording_id}/transcript"))?;

        let res = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .context("failed to reach transcript endpoint")?;
        if !res.status().is_success() {
            return Err(anyhow!(
                "transcript error {}: {}",
                res.status(),
                res.text().await.unwrap_or_default()
            ));
        }

        let payload: Value = res.json().await.context("invalid transcript response")?;
        parse_transcript(payload)
    }
}

/// The provider has shipped the transcript as a bare array and as an object
/// wrapping the array under `transcript` or `items`; accept all three.
pub fn parse_transcript(payload: Value) -> Result<Vec<TranscriptEntry>> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("transcript").or_else(|| map.remove("items")) {
            Some(Value::Array(items)) => items,
            _ => return Err(anyhow!("transcript response has no entry array")),
        },
        _ => return Err(anyhow!("transcript response has no entry array")),
    };
    items
        .into_iter()
        .map(|item| serde_json::from_value(item).context("malformed transcript entry"))
        .collect()
}
