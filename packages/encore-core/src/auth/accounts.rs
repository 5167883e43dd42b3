//! Credential exchange with the provider's accounts service.
//!
//! Two endpoints are supported behind [`TokenEndpoint`]:
//! - [`AccountsClient`] talks to the accounts service directly with the app's
//!   client credentials (used by the auth server).
//! - [`ProxyTokenEndpoint`] talks to the app backend's refresh route so tabs
//!   never hold the client secret.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol_constants::{
    AUTHORIZE_URL, HTTP_TIMEOUT_SECS, PLAYBACK_SCOPES, REFRESH_PROXY_PATH, TOKEN_URL,
};

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur while exchanging credentials.
#[derive(Debug, Error)]
pub enum AuthError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The grant was rejected; the refresh token or code is no longer usable.
    #[error("credentials rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// Endpoint returned another non-success status.
    #[error("HTTP error {0}: {1}")]
    HttpStatus(u16, String),

    /// Endpoint answered 2xx with a body that is not a token grant.
    #[error("invalid token grant: {0}")]
    InvalidGrant(String),
}

/// Convenient Result alias for credential operations.
pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// Returns true if retrying can never succeed and the session must be dropped.
    ///
    /// The accounts service answers `400 invalid_grant` for revoked refresh
    /// tokens and `401` for bad client credentials; both are permanent.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(self, AuthError::Rejected { .. })
    }

    /// Classifies a non-success response.
    fn from_status(status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => AuthError::Rejected {
                status: status.as_u16(),
                body,
            },
            _ => AuthError::HttpStatus(status.as_u16(), body),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Token grant
// ─────────────────────────────────────────────────────────────────────────────

/// Token endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Present on code exchange; usually absent on refresh.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Lifetime of `access_token` in seconds.
    pub expires_in: u64,
}

/// Capability to renew an access token.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Exchanges a refresh token for a fresh grant.
    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenGrant>;
}

async fn read_grant(response: reqwest::Response) -> AuthResult<TokenGrant> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::from_status(status, body));
    }
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| AuthError::InvalidGrant(e.to_string()))
}

fn http_client() -> AuthResult<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Direct accounts client
// ─────────────────────────────────────────────────────────────────────────────

/// Client for the accounts service using the app's client credentials.
pub struct AccountsClient {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl AccountsClient {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> AuthResult<Self> {
        Ok(Self {
            client: http_client()?,
            token_url: TOKEN_URL.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
        })
    }

    /// Overrides the token URL (used against a local fake in tests).
    #[must_use]
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    /// Builds the consent page URL for the authorization code flow.
    #[must_use]
    pub fn authorize_url(&self, state: Option<&str>) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", PLAYBACK_SCOPES);
        if let Some(state) = state {
            query.append_pair("state", state);
        }
        format!("{}?{}", AUTHORIZE_URL, query.finish())
    }

    /// Exchanges an authorization code for a grant that includes a refresh token.
    pub async fn exchange_code(&self, code: &str) -> AuthResult<TokenGrant> {
        log::info!("[Accounts] Exchanging authorization code");
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;
        read_grant(response).await
    }
}

#[async_trait]
impl TokenEndpoint for AccountsClient {
    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenGrant> {
        log::info!("[Accounts] Refreshing access token");
        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;
        read_grant(response).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend proxy
// ─────────────────────────────────────────────────────────────────────────────

/// Refreshes through the app backend (`GET /api/spotify/refresh_token`).
pub struct ProxyTokenEndpoint {
    client: Client,
    base_url: String,
}

impl ProxyTokenEndpoint {
    pub fn new(base_url: impl Into<String>) -> AuthResult<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TokenEndpoint for ProxyTokenEndpoint {
    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenGrant> {
        let url = format!("{}{}", self.base_url, REFRESH_PROXY_PATH);
        log::info!("[Accounts] Refreshing access token via {}", url);
        let response = self
            .client
            .get(&url)
            .query(&[("refresh_token", refresh_token)])
            .send()
            .await?;
        read_grant(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_statuses_are_permanent() {
        assert!(AuthError::from_status(StatusCode::BAD_REQUEST, String::new()).is_permanent());
        assert!(AuthError::from_status(StatusCode::UNAUTHORIZED, String::new()).is_permanent());
        assert!(!AuthError::from_status(StatusCode::BAD_GATEWAY, String::new()).is_permanent());
        assert!(!AuthError::InvalidGrant("eof".into()).is_permanent());
    }

    #[test]
    fn authorize_url_carries_scopes_and_redirect() {
        let client =
            AccountsClient::new("client-1", "secret", "http://127.0.0.1:3001/api/spotify/callback")
                .unwrap();
        let url = client.authorize_url(Some("xyz"));

        assert!(url.starts_with(AUTHORIZE_URL));
        assert!(url.contains("client_id=client-1"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A3001%2Fapi%2Fspotify%2Fcallback"));
        assert!(url.contains("scope=streaming+user-read-email"));
        assert!(url.contains("state=xyz"));
    }

    #[test]
    fn grant_deserializes_without_refresh_token() {
        let grant: TokenGrant = serde_json::from_str(
            r#"{"access_token":"a","token_type":"Bearer","expires_in":3600,"scope":"streaming"}"#,
        )
        .unwrap();
        assert_eq!(grant.refresh_token, None);
        assert_eq!(grant.expires_in, 3600);
    }

    #[test]
    fn proxy_base_url_is_normalized() {
        let endpoint = ProxyTokenEndpoint::new("http://localhost:3001/").unwrap();
        assert_eq!(endpoint.base_url, "http://localhost:3001");
    }
}
