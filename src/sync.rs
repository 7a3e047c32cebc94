//! The sync engine: one idempotent "fetch remote meetings and merge into
//! local storage" pass per user.
//!
//! The watermark (`connections.last_sync_at`) bounds incremental passes and
//! only advances after an uninterrupted page iteration, so a pass that dies
//! mid-list leaves the window unchanged and the next pass re-scans it. The
//! storage UNIQUE constraint makes the re-scan safe: re-inserting an
//! already-imported meeting is the `already_exists` outcome, never a
//! duplicate row.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::auth::{self, OAuthClient};
use crate::db::{self, NewMeeting, Pool};
use crate::model::{
    ImportedMeeting, SkipReason, SkippedMeeting, SyncReport, TranscriptEntry,
};
use crate::provider::{MeetingsProvider, RemoteMeeting};

/// Run one sync pass for `user_id`. Never returns `Err`: whole-pass failures
/// (missing credentials, rejected refresh, unreachable list endpoint) come
/// back as a report with `error` set and zero progress, per-record failures
/// are absorbed into `skipped_meetings`.
#[instrument(skip_all)]
pub async fn sync_user(
    pool: &Pool,
    oauth: &OAuthClient,
    provider: &dyn MeetingsProvider,
    user_id: &str,
) -> SyncReport {
    // Determine mode. A storage error here degrades to a full sync: the
    // existence checks below make re-processing safe.
    let watermark = match db::fetch_connection(pool, user_id).await {
        Ok(connection) => connection.and_then(|c| c.last_sync_at),
        Err(err) => {
            warn!(user_id, error = %format!("{err:#}"), "could not read watermark; running full sync");
            None
        }
    };
    let is_incremental = watermark.is_some();
    if is_incremental {
        debug!(user_id, ?watermark, "incremental sync");
    } else {
        debug!(user_id, "full sync");
    }

    let access_token = match auth::get_valid_access_token(pool, oauth, user_id).await {
        Ok(token) => token,
        Err(err) => return SyncReport::failed(is_incremental, err.to_string()),
    };

    let mut report = SyncReport {
        is_incremental,
        ..Default::default()
    };
    let mut cursor: Option<String> = None;
    let mut first_page = true;
    let mut completed = false;

    loop {
        let page = match provider
            .list_meetings(&access_token, cursor.as_deref())
            .await
        {
            Ok(page) => page,
            Err(err) if first_page => {
                return SyncReport::failed(
                    is_incremental,
                    format!("failed to list meetings: {err:#}"),
                );
            }
            Err(err) => {
                // Later-page failure: keep what this pass already did, but
                // the iteration is interrupted and must not move the
                // watermark past meetings we never saw.
                warn!(user_id, error = %format!("{err:#}"), "page fetch failed; aborting remaining pages");
                report.error = Some(format!("failed to fetch meetings page: {err:#}"));
                break;
            }
        };
        first_page = false;
        debug!(user_id, meetings = page.items.len(), "processing page");

        for meeting in page.items {
            process_meeting(
                pool,
                provider,
                &access_token,
                user_id,
                watermark,
                meeting,
                &mut report,
            )
            .await;
        }

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => {
                completed = true;
                break;
            }
        }
    }

    report.imported = report.meetings.len();
    report.skipped = report.skipped_meetings.len();

    // Finalize: the watermark advances only after a full, uninterrupted
    // iteration that touched at least one remote record. An empty pass
    // leaves it untouched so a transient empty response cannot silently
    // move the window forward.
    if completed && report.imported + report.skipped > 0 {
        if let Err(err) = db::set_last_sync_at(pool, user_id, Utc::now()).await {
            warn!(user_id, error = %format!("{err:#}"), "failed to advance sync watermark");
        }
    }

    info!(
        user_id,
        imported = report.imported,
        skipped = report.skipped,
        incremental = report.is_incremental,
        interrupted = !completed,
        "sync pass finished"
    );
    report
}

async fn process_meeting(
    pool: &Pool,
    provider: &dyn MeetingsProvider,
    access_token: &str,
    user_id: &str,
    watermark: Option<DateTime<Utc>>,
    meeting: RemoteMeeting,
    report: &mut SyncReport,
) {
    // Malformed upstream data, not an error.
    let Some(external_id) = meeting.recording_id.clone() else {
        report.skipped_meetings.push(SkippedMeeting {
            external_id: None,
            title: meeting.display_title(),
            created_at: meeting.created_at,
            reason: SkipReason::NoRecordingId,
            error: None,
        });
        return;
    };

    // Incremental window filter: older meetings are simply out of scope for
    // this pass, not skipped.
    if let (Some(watermark), Some(created_at)) = (watermark, meeting.created_at) {
        if created_at <= watermark {
            return;
        }
    }

    // Classification check only; the INSERT below is the real guard.
    match db::meeting_exists(pool, user_id, &external_id).await {
        Ok(true) => {
            report.skipped_meetings.push(SkippedMeeting {
                external_id: Some(external_id),
                title: meeting.display_title(),
                created_at: meeting.created_at,
                reason: SkipReason::AlreadyExists,
                error: None,
            });
            return;
        }
        Ok(false) => {}
        Err(err) => {
            warn!(user_id, external_id, error = %format!("{err:#}"), "existence check failed; relying on insert conflict");
        }
    }

    let transcript = match provider.fetch_transcript(access_token, &external_id).await {
        Ok(transcript) => transcript,
        Err(err) => {
            report.skipped_meetings.push(SkippedMeeting {
                external_id: Some(external_id),
                title: meeting.display_title(),
                created_at: meeting.created_at,
                reason: SkipReason::Error,
                error: Some(format!("{err:#}")),
            });
            return;
        }
    };

    let created_at = meeting.created_at.unwrap_or_else(Utc::now);
    let record = NewMeeting {
        user_id: user_id.to_string(),
        external_id: external_id.clone(),
        title: meeting.display_title(),
        transcript_json: serde_json::to_string(&transcript).unwrap_or_else(|_| "[]".into()),
        call_duration_minutes: meeting.duration_minutes(),
        call_date: meeting.recording_start_time.or(meeting.created_at),
        created_at,
    };

    match db::insert_meeting(pool, &record).await {
        Ok(true) => {
            debug!(user_id, external_id, items = transcript.len(), "imported meeting");
            report.meetings.push(ImportedMeeting {
                external_id,
                title: record.title,
                created_at,
                transcript_items: transcript.len(),
            });
        }
        // Conflict: a concurrent writer got there first.
        Ok(false) => {
            report.skipped_meetings.push(SkippedMeeting {
                external_id: Some(external_id),
                title: record.title,
                created_at: meeting.created_at,
                reason: SkipReason::AlreadyExists,
                error: None,
            });
        }
        Err(err) => {
            report.skipped_meetings.push(SkippedMeeting {
                external_id: Some(external_id),
                title: record.title,
                created_at: meeting.created_at,
                reason: SkipReason::Error,
                error: Some(format!("{err:#}")),
            });
        }
    }
}

/// Push payload delivered to the webhook ingress.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookMeeting {
    pub recording_id: Option<String>,
    pub title: Option<String>,
    pub meeting_title: Option<String>,
    #[serde(default)]
    pub transcript: Vec<TranscriptEntry>,
    pub created_at: Option<DateTime<Utc>>,
}

impl WebhookMeeting {
    pub fn display_title(&self) -> Option<String> {
        self.meeting_title.clone().or_else(|| self.title.clone())
    }

    /// Build the insert record. The dedup invariant is keyed on the external
    /// id, so a payload without one is rejected rather than stored.
    pub fn into_new_meeting(self, user_id: &str) -> Option<NewMeeting> {
        let external_id = self.recording_id.clone()?;
        let title = self.display_title();
        Some(NewMeeting {
            user_id: user_id.to_string(),
            external_id,
            title,
            transcript_json: serde_json::to_string(&self.transcript)
                .unwrap_or_else(|_| "[]".into()),
            call_duration_minutes: None,
            call_date: self.created_at,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        })
    }
}
