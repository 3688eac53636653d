use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::Account;

const DEFAULT_TOKEN_URL: &str = "https://accounts.google.com/o/oauth2/token";

/// Development override: skips the refresh-token exchange entirely.
const TOKEN_ENV: &str = "GDRIVE_TOKEN";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("token endpoint returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
}

/// Exchanges the account's refresh token for a short-lived access token.
/// The interactive authorization wizard that minted the refresh token is a
/// separate concern; the daemon only ever refreshes.
pub async fn refresh_access_token(
    http: &Client,
    token_url: &str,
    account: &Account,
) -> Result<String, AuthError> {
    let params = [
        ("client_id", account.client_id.as_str()),
        ("client_secret", account.client_secret.as_str()),
        ("refresh_token", account.refresh_token.as_str()),
        ("grant_type", "refresh_token"),
    ];
    let response = http.post(token_url).form(&params).send().await?;
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::Api { status, body });
    }
    let token: TokenResponse = response.json().await?;
    debug!(expires_in = token.expires_in, "access token refreshed");
    Ok(token.access_token)
}

/// Access token for the account: the `GDRIVE_TOKEN` env var when set,
/// otherwise a fresh token from the Google token endpoint.
pub async fn resolve_access_token(account: &Account) -> Result<String, AuthError> {
    if let Ok(token) = std::env::var(TOKEN_ENV) {
        return Ok(token);
    }
    refresh_access_token(&Client::new(), DEFAULT_TOKEN_URL, account).await
}
