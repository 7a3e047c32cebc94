use super::model::{NewMeeting, StoredMeeting};
use crate::model::Connection;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the
/// parent directory exists. Leaves in-memory URLs untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match path_part.strip_prefix("~/") {
        Some(rest) => match std::env::var("HOME") {
            Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
            Err(_) => path_part.to_string(),
        },
        None => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = format!("sqlite://{expanded_path}");
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Create or overwrite the stored token set for a user. Called after the
/// initial code exchange and after every refresh; leaves the watermark alone.
#[instrument(skip_all)]
pub async fn upsert_connection_tokens(
    pool: &Pool,
    user_id: &str,
    access_token: &str,
    refresh_token: Option<&str>,
    token_expires_at: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO connections (user_id, access_token, refresh_token, token_expires_at) \
         VALUES (?, ?, ?, ?) \
         ON CONFLICT(user_id) DO UPDATE SET \
             access_token = excluded.access_token, \
             refresh_token = excluded.refresh_token, \
             token_expires_at = excluded.token_expires_at, \
             updated_at = CURRENT_TIMESTAMP",
    )
    .bind(user_id)
    .bind(access_token)
    .bind(refresh_token)
    .bind(token_expires_at)
    .execute(pool)
    .await
    .context("failed to persist connection tokens")?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn fetch_connection(pool: &Pool, user_id: &str) -> Result<Option<Connection>> {
    let row = sqlx::query(
        "SELECT user_id, access_token, refresh_token, token_expires_at, last_sync_at \
         FROM connections WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some(Connection {
        user_id: row.get("user_id"),
        access_token: row.try_get("access_token").ok().flatten(),
        refresh_token: row.try_get("refresh_token").ok().flatten(),
        token_expires_at: row.get("token_expires_at"),
        last_sync_at: row
            .try_get::<Option<DateTime<Utc>>, _>("last_sync_at")
            .ok()
            .flatten(),
    }))
}

/// Advance the sync watermark. Only called after an uninterrupted pass.
#[instrument(skip_all)]
pub async fn set_last_sync_at(pool: &Pool, user_id: &str, at: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        "UPDATE connections SET last_sync_at = ?, updated_at = CURRENT_TIMESTAMP \
         WHERE user_id = ?",
    )
    .bind(at)
    .bind(user_id)
    .execute(pool)
    .await
    .context("failed to update last_sync_at")?;
    Ok(())
}

/// User ids eligible for scheduled sync: every connection holding a token.
#[instrument(skip_all)]
pub async fn list_connected_user_ids(pool: &Pool) -> Result<Vec<String>> {
    let ids = sqlx::query_scalar::<_, String>(
        "SELECT user_id FROM connections WHERE access_token IS NOT NULL ORDER BY user_id",
    )
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

#[instrument(skip_all)]
pub async fn meeting_exists(pool: &Pool, user_id: &str, external_id: &str) -> Result<bool> {
    let hit = sqlx::query_scalar::<_, i64>(
        "SELECT 1 FROM meetings WHERE user_id = ? AND external_id = ?",
    )
    .bind(user_id)
    .bind(external_id)
    .fetch_optional(pool)
    .await?;
    Ok(hit.is_some())
}

/// Insert a meeting, treating a (user_id, external_id) conflict as a no-op.
/// Returns true when a row was written, false when it already existed. The
/// UNIQUE constraint is the dedup invariant; callers never pre-lock.
#[instrument(skip_all)]
pub async fn insert_meeting(pool: &Pool, meeting: &NewMeeting) -> Result<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO meetings \
         (user_id, external_id, title, transcript, call_duration_minutes, call_date, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&meeting.user_id)
    .bind(&meeting.external_id)
    .bind(&meeting.title)
    .bind(&meeting.transcript_json)
    .bind(meeting.call_duration_minutes)
    .bind(meeting.call_date)
    .bind(meeting.created_at)
    .execute(pool)
    .await
    .context("failed to insert meeting")?;
    Ok(result.rows_affected() == 1)
}

#[instrument(skip_all)]
pub async fn list_meetings(pool: &Pool, user_id: &str) -> Result<Vec<StoredMeeting>> {
    let rows = sqlx::query(
        "SELECT external_id, title, transcript, call_duration_minutes, call_date, created_at \
         FROM meetings WHERE user_id = ? ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let meetings = rows
        .into_iter()
        .map(|row| {
            let transcript_json: String = row.get("transcript");
            StoredMeeting {
                external_id: row.get("external_id"),
                title: row.try_get("title").ok().flatten(),
                transcript: serde_json::from_str(&transcript_json)
                    .unwrap_or(serde_json::Value::Array(Vec::new())),
                call_duration_minutes: row.try_get("call_duration_minutes").ok().flatten(),
                call_date: row
                    .try_get::<Option<DateTime<Utc>>, _>("call_date")
                    .ok()
                    .flatten(),
                created_at: row.get("created_at"),
            }
        })
        .collect();
    Ok(meetings)
}
