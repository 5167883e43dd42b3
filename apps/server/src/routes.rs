//! HTTP route handlers for the credential exchange.
//!
//! All handlers are thin - they delegate to [`AccountsClient`].

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use encore_core::auth::{AccountsClient, AuthError, TokenEndpoint, TokenGrant};
use encore_core::ErrorCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

const SERVICE_ID: &str = "encore-auth-server";

#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountsClient>,
    /// Base URL the callback redirects to.
    pub frontend_url: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/spotify/authorize", get(authorize))
        .route("/api/spotify/callback", get(callback))
        .route("/api/spotify/refresh_token", get(refresh_token))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

/// JSON error body for the refresh route.
///
/// Rejections keep the accounts service's status so callers can tell a dead
/// refresh token (400/401) from a transient failure.
struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let status = match &err {
            AuthError::Rejected { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST)
            }
            _ => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.code,
            message: self.message,
            status: self.status.as_u16(),
        };
        (self.status, Json(body)).into_response()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": SERVICE_ID }))
}

/// Redirects the browser to the provider's consent page.
async fn authorize(State(state): State<AppState>) -> Redirect {
    Redirect::to(&state.accounts.authorize_url(None))
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
}

/// Exchanges the authorization code and hands the grant to the frontend in the
/// URL fragment, so it never reaches a server log.
async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        log::warn!("[Callback] Request without authorization code");
        return Redirect::to(&error_redirect(&state.frontend_url, "no_code"));
    };

    match state.accounts.exchange_code(&code).await {
        Ok(grant) => {
            log::info!("[Callback] Authorization code exchanged");
            Redirect::to(&grant_redirect(&state.frontend_url, &grant))
        }
        Err(e) => {
            log::warn!("[Callback] Token exchange failed: {}", e);
            Redirect::to(&error_redirect(&state.frontend_url, "token_exchange_failed"))
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefreshParams {
    refresh_token: Option<String>,
}

async fn refresh_token(
    State(state): State<AppState>,
    Query(params): Query<RefreshParams>,
) -> Result<Json<TokenGrant>, ApiError> {
    let Some(refresh_token) = params.refresh_token.filter(|t| !t.is_empty()) else {
        return Err(ApiError {
            status: StatusCode::BAD_REQUEST,
            code: "missing_refresh_token",
            message: "refresh_token query parameter is required".to_string(),
        });
    };

    let grant = state.accounts.refresh(&refresh_token).await?;
    Ok(Json(grant))
}

// ─────────────────────────────────────────────────────────────────────────────
// Redirect targets
// ─────────────────────────────────────────────────────────────────────────────

fn grant_redirect(frontend_url: &str, grant: &TokenGrant) -> String {
    let mut fragment = url::form_urlencoded::Serializer::new(String::new());
    fragment.append_pair("access_token", &grant.access_token);
    if let Some(refresh_token) = &grant.refresh_token {
        fragment.append_pair("refresh_token", refresh_token);
    }
    fragment.append_pair("expires_in", &grant.expires_in.to_string());
    format!("{}/#{}", frontend_url.trim_end_matches('/'), fragment.finish())
}

fn error_redirect(frontend_url: &str, error: &str) -> String {
    format!("{}/#error={}", frontend_url.trim_end_matches('/'), error)
}
