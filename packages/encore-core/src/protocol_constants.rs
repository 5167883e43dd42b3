//! Fixed protocol constants that should NOT be changed.
//!
//! Storage key names are shared with every other tab (and with the web frontend
//! that wrote them first), and the provider endpoints are defined by the provider.
//! Tunable timings live in [`crate::config::CoordinatorConfig`] instead.

// ─────────────────────────────────────────────────────────────────────────────
// Shared Storage Layout
// ─────────────────────────────────────────────────────────────────────────────

/// Key holding the current OAuth access token.
pub const ACCESS_TOKEN_KEY: &str = "spotify_token";

/// Key holding the OAuth refresh token.
pub const REFRESH_TOKEN_KEY: &str = "spotify_refresh_token";

/// Key holding the access token expiry (Unix milliseconds, decimal string).
pub const EXPIRES_AT_KEY: &str = "spotify_token_expires_at";

/// Key holding the identifier of the tab that currently owns playback.
pub const PRIMARY_TAB_KEY: &str = "spotify_primary_tab";

/// Key holding the leader's last heartbeat (Unix milliseconds, decimal string).
pub const PRIMARY_TAB_TIMESTAMP_KEY: &str = "spotify_primary_tab_timestamp";

// ─────────────────────────────────────────────────────────────────────────────
// Provider Endpoints
// ─────────────────────────────────────────────────────────────────────────────

/// Base URL of the provider's Web API.
pub const WEB_API_BASE_URL: &str = "https://api.spotify.com/v1";

/// Provider consent page for the authorization code flow.
pub const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";

/// Provider token endpoint (authorization code and refresh token grants).
pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Scopes required to register a playback device and control it.
pub const PLAYBACK_SCOPES: &str =
    "streaming user-read-email user-read-private user-modify-playback-state user-read-playback-state";

/// Path of the app backend's refresh route, relative to its base URL.
pub const REFRESH_PROXY_PATH: &str = "/api/spotify/refresh_token";

// ─────────────────────────────────────────────────────────────────────────────
// HTTP
// ─────────────────────────────────────────────────────────────────────────────

/// Timeout for provider and credential HTTP requests (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 10;

/// Backoff delays between attempts of a transient provider failure (milliseconds).
pub const RETRY_DELAYS_MS: [u64; 3] = [200, 500, 1000];

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of the broadcast channel fanning events out to subscribers.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;
