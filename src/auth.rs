//! OAuth token lifecycle: code exchange, persistence, transparent refresh.
//!
//! Tokens are stored per user in the `connections` table. Reads go through
//! [`get_valid_access_token`], which only touches the network when the stored
//! token is inside the refresh buffer.

use crate::config::Config;
use crate::db::{self, Pool};
use anyhow::Context;
use chrono::Utc;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

/// A token is never handed out within this many seconds of real expiry, so
/// slow downstream calls cannot race the provider-side expiration.
pub const TOKEN_REFRESH_BUFFER_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user has not connected the meetings provider yet")]
    NotConnected,
    #[error("token refresh rejected by provider ({status}): {body}")]
    RefreshFailed { status: StatusCode, body: String },
    #[error("authorization code exchange rejected by provider ({status}): {body}")]
    ExchangeFailed { status: StatusCode, body: String },
    #[error("token endpoint request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Successful response from the provider token endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: i64,
}

/// Client for the provider's OAuth endpoints.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: Client,
    authorize_url: Url,
    token_url: Url,
    client_id: String,
    client_secret: String,
    scope: String,
}

impl OAuthClient {
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        Self::new(
            &cfg.provider.authorize_url,
            &cfg.provider.token_url,
            cfg.provider.client_id.clone(),
            cfg.provider.client_secret.clone(),
            cfg.provider.scope.clone(),
        )
    }

    pub fn new(
        authorize_url: &str,
        token_url: &str,
        client_id: String,
        client_secret: String,
        scope: String,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent("meetdash/0.1")
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            authorize_url: Url::parse(authorize_url).context("invalid provider.authorize_url")?,
            token_url: Url::parse(token_url).context("invalid provider.token_url")?,
            client_id,
            client_secret,
            scope,
        })
    }

    /// Consent URL the user is redirected to when connecting. The opaque
    /// user id travels in `state` and comes back on the callback.
    pub fn authorize_redirect(&self, redirect_uri: &str, user_id: &str) -> Url {
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &self.scope)
            .append_pair("state", user_id);
        url
    }

    async fn request_token(
        &self,
        params: &[(&str, &str)],
    ) -> Result<(StatusCode, String), AuthError> {
        let res = self
            .http
            .post(self.token_url.clone())
            .form(params)
            .send()
            .await?;
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        Ok((status, body))
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        let (status, body) = self
            .request_token(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .await?;
        if !status.is_success() {
            return Err(AuthError::RefreshFailed { status, body });
        }
        serde_json::from_str(&body)
            .context("invalid token endpoint response")
            .map_err(AuthError::Storage)
    }

    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, AuthError> {
        let (status, body) = self
            .request_token(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .await?;
        if !status.is_success() {
            return Err(AuthError::ExchangeFailed { status, body });
        }
        serde_json::from_str(&body)
            .context("invalid token endpoint response")
            .map_err(AuthError::Storage)
    }
}

/// Return a currently-valid access token for `user_id`, refreshing and
/// persisting a new token set when the stored one is expired or about to be.
pub async fn get_valid_access_token(
    pool: &Pool,
    oauth: &OAuthClient,
    user_id: &str,
) -> Result<String, AuthError> {
    let connection = db::fetch_connection(pool, user_id)
        .await?
        .ok_or(AuthError::NotConnected)?;
    let access_token = connection
        .access_token
        .clone()
        .ok_or(AuthError::NotConnected)?;

    let now = Utc::now().timestamp();
    if connection.token_expires_at > now + TOKEN_REFRESH_BUFFER_SECS {
        debug!(user_id, "stored access token still valid");
        return Ok(access_token);
    }

    let refresh_token = connection
        .refresh_token
        .clone()
        .ok_or(AuthError::NotConnected)?;

    let grant = oauth.refresh(&refresh_token).await?;
    let expires_at = now + grant.expires_in - TOKEN_REFRESH_BUFFER_SECS;
    let kept_refresh = grant.refresh_token.as_deref().unwrap_or(&refresh_token);
    db::upsert_connection_tokens(pool, user_id, &grant.access_token, Some(kept_refresh), expires_at)
        .await?;

    info!(user_id, "refreshed provider access token");
    Ok(grant.access_token)
}

/// Complete the OAuth callback: trade the authorization code for tokens and
/// upsert the connection row.
pub async fn exchange_authorization_code(
    pool: &Pool,
    oauth: &OAuthClient,
    user_id: &str,
    code: &str,
    redirect_uri: &str,
) -> Result<(), AuthError> {
    let grant = oauth.exchange_code(code, redirect_uri).await?;
    let expires_at = Utc::now().timestamp() + grant.expires_in - TOKEN_REFRESH_BUFFER_SECS;
    db::upsert_connection_tokens(
        pool,
        user_id,
        &grant.access_token,
        grant.refresh_token.as_deref(),
        expires_at,
    )
    .await?;
    info!(user_id, "stored initial provider tokens");
    Ok(())
}
