//! REST surface: OAuth connect/callback, connection status, stored meetings,
//! manual import, and the webhook ingress.
//!
//! Routes are mounted under `/api/{provider.name}`. All handlers take the
//! user id from the query string (or the path, for webhooks) — there is no
//! session layer in front of this service.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::auth::{self, AuthError, OAuthClient};
use crate::db::{self, Pool};
use crate::provider::MeetingsProvider;
use crate::sync::{self, WebhookMeeting};

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub oauth: Arc<OAuthClient>,
    pub provider: Arc<dyn MeetingsProvider>,
    /// OAuth redirect URI registered with the provider.
    pub redirect_uri: String,
}

/// Build the application router, nesting all routes under the provider name.
pub fn router(provider_name: &str, state: AppState) -> Router {
    let api = Router::new()
        .route("/connect", get(connect))
        .route("/callback", get(callback))
        .route("/status", get(status))
        .route("/meetings", get(meetings))
        .route("/import", post(import))
        .route("/webhook/{user_id}", post(webhook))
        .with_state(state);
    Router::new().nest(&format!("/api/{provider_name}"), api)
}

#[derive(Debug, Deserialize)]
struct UserQuery {
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn require_user_id(raw: Option<String>) -> Result<String, Response> {
    match raw {
        Some(id) if !id.trim().is_empty() => Ok(id.trim().to_string()),
        _ => Err(bad_request(
            "user_id is required. Provide it as a query parameter: ?user_id=your-user-id",
        )),
    }
}

/// GET /connect — redirect the browser to the provider consent screen.
async fn connect(State(state): State<AppState>, Query(query): Query<UserQuery>) -> Response {
    let user_id = match require_user_id(query.user_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let url = state.oauth.authorize_redirect(&state.redirect_uri, &user_id);
    Redirect::to(url.as_str()).into_response()
}

/// GET /callback — finish the OAuth flow: exchange the code and store tokens.
async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(code) = query.code.filter(|c| !c.trim().is_empty()) else {
        return bad_request("No authorization code");
    };
    let user_id = match require_user_id(query.state) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match auth::exchange_authorization_code(
        &state.pool,
        &state.oauth,
        &user_id,
        &code,
        &state.redirect_uri,
    )
    .await
    {
        Ok(()) => {
            info!(user_id, "OAuth connection established");
            let encoded: String =
                url::form_urlencoded::byte_serialize(user_id.as_bytes()).collect();
            Redirect::to(&format!("/?user_id={encoded}&connected=true")).into_response()
        }
        Err(err) => {
            error!(user_id, error = %err, "OAuth callback failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": err.to_string(), "user_id": user_id })),
            )
                .into_response()
        }
    }
}

/// GET /status — `connected` means a stored, unexpired access token.
async fn status(State(state): State<AppState>, Query(query): Query<UserQuery>) -> Response {
    let user_id = match require_user_id(query.user_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match db::fetch_connection(&state.pool, &user_id).await {
        Ok(connection) => {
            let connected = connection
                .map(|c| c.is_connected(chrono::Utc::now().timestamp()))
                .unwrap_or(false);
            Json(json!({ "connected": connected, "user_id": user_id })).into_response()
        }
        Err(err) => {
            error!(user_id, error = %format!("{err:#}"), "status check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to check connection status" })),
            )
                .into_response()
        }
    }
}

/// GET /meetings — stored meetings for the user, newest first.
async fn meetings(State(state): State<AppState>, Query(query): Query<UserQuery>) -> Response {
    let user_id = match require_user_id(query.user_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match db::list_meetings(&state.pool, &user_id).await {
        Ok(meetings) => Json(json!({ "meetings": meetings })).into_response(),
        Err(err) => {
            error!(user_id, error = %format!("{err:#}"), "failed to list meetings");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to fetch meetings" })),
            )
                .into_response()
        }
    }
}

/// POST /import — run one synchronous sync pass and report the outcome.
async fn import(State(state): State<AppState>, Query(query): Query<UserQuery>) -> Response {
    let user_id = match require_user_id(query.user_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    info!(user_id, "manual sync requested");
    let report = sync::sync_user(
        &state.pool,
        &state.oauth,
        state.provider.as_ref(),
        &user_id,
    )
    .await;

    if let Some(error) = &report.error {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": error,
                "imported": report.imported,
                "skipped": report.skipped,
                "is_incremental": report.is_incremental,
            })),
        )
            .into_response();
    }

    Json(json!({
        "success": true,
        "imported": report.imported,
        "skipped": report.skipped,
        "meetings": report.meetings,
        "skipped_meetings": report.skipped_meetings,
        "is_incremental": report.is_incremental,
    }))
    .into_response()
}

/// POST /webhook/{user_id} — push-based single-record insert.
///
/// The caller is acknowledged right after the dedup check; the write runs on
/// a spawned task. A crash between ack and write drops the record — accepted
/// so the provider never times out and re-delivers.
async fn webhook(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(payload): Json<WebhookMeeting>,
) -> Response {
    let user_id = match require_user_id(Some(user_id)) {
        Ok(id) => id,
        Err(response) => return response,
    };
    debug!(user_id, title = ?payload.display_title(), "webhook received");

    let Some(record) = payload.into_new_meeting(&user_id) else {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "success": false, "error": "recording_id is required" })),
        )
            .into_response();
    };

    match db::meeting_exists(&state.pool, &user_id, &record.external_id).await {
        Ok(true) => {
            debug!(user_id, external_id = %record.external_id, "webhook duplicate suppressed");
            Json(json!({ "success": true, "duplicate": true })).into_response()
        }
        Ok(false) => {
            let pool = state.pool.clone();
            tokio::spawn(async move {
                match db::insert_meeting(&pool, &record).await {
                    Ok(true) => {
                        info!(user_id = %record.user_id, external_id = %record.external_id, "webhook meeting stored");
                    }
                    Ok(false) => {
                        debug!(user_id = %record.user_id, external_id = %record.external_id, "webhook meeting raced an existing row");
                    }
                    Err(err) => {
                        warn!(user_id = %record.user_id, external_id = %record.external_id, error = %format!("{err:#}"), "webhook insert failed");
                    }
                }
            });
            Json(json!({ "success": true })).into_response()
        }
        Err(err) => {
            error!(user_id, error = %format!("{err:#}"), "webhook dedup check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "storage unavailable" })),
            )
                .into_response()
        }
    }
}
