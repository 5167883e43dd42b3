//! reqwest client for the provider's Web API player endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::error::{ProviderError, ProviderResult};
use super::retry::with_retry;
use super::types::{DeviceInfo, PlayTarget, PlayerStatePush, TrackInfo};
use super::PlaybackApi;
use crate::protocol_constants::{HTTP_TIMEOUT_SECS, WEB_API_BASE_URL};

/// Web API client. Stateless apart from the connection pool; the access token
/// is passed per call so a refreshed token is picked up immediately.
#[derive(Clone)]
pub struct WebApiClient {
    client: Client,
    base_url: String,
}

impl WebApiClient {
    pub fn new() -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self::with_client(client, WEB_API_BASE_URL))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn request(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(token)
    }

    /// Sends a player command, discarding the (empty) response body.
    async fn command(
        &self,
        action: &str,
        method: Method,
        path: &str,
        token: &str,
        query: &[(&str, String)],
        body: serde_json::Value,
    ) -> ProviderResult<()> {
        let device = query
            .iter()
            .find(|(k, _)| *k == "device_id")
            .map(|(_, v)| v.as_str());
        with_retry(action, || async {
            let response = self
                .request(method.clone(), path, token)
                .query(query)
                .json(&body)
                .send()
                .await?;
            check(response, device).await.map(|_| ())
        })
        .await
    }

    /// Returns the current playback state, or `None` when nothing is playing
    /// on any device.
    pub async fn current_playback(&self, token: &str) -> ProviderResult<Option<PlayerStatePush>> {
        with_retry("current_playback", || async {
            let response = self.request(Method::GET, "/me/player", token).send().await?;
            let response = check(response, None).await?;
            if response.status() == StatusCode::NO_CONTENT {
                return Ok(None);
            }
            let body = response.text().await?;
            parse_playback(&body)
        })
        .await
    }

    /// Lists the devices registered for the user.
    pub async fn devices(&self, token: &str) -> ProviderResult<Vec<DeviceInfo>> {
        #[derive(Deserialize)]
        struct Devices {
            devices: Vec<DeviceInfo>,
        }

        with_retry("devices", || async {
            let response = self
                .request(Method::GET, "/me/player/devices", token)
                .send()
                .await?;
            let body = check(response, None).await?.text().await?;
            serde_json::from_str::<Devices>(&body)
                .map(|d| d.devices)
                .map_err(|e| ProviderError::Parse(e.to_string()))
        })
        .await
    }
}

#[async_trait]
impl PlaybackApi for WebApiClient {
    async fn transfer_playback(&self, token: &str, device_id: &str, play: bool) -> ProviderResult<()> {
        log::debug!("[WebApi] Transferring playback to {} (play={})", device_id, play);
        self.command(
            "transfer_playback",
            Method::PUT,
            "/me/player",
            token,
            &[],
            json!({ "device_ids": [device_id], "play": play }),
        )
        .await
    }

    async fn play(&self, token: &str, device_id: &str, target: &PlayTarget) -> ProviderResult<()> {
        log::debug!("[WebApi] Play {:?} on {}", target, device_id);
        self.command(
            "play",
            Method::PUT,
            "/me/player/play",
            token,
            &[("device_id", device_id.to_string())],
            target.to_body(),
        )
        .await
    }

    async fn pause(&self, token: &str, device_id: &str) -> ProviderResult<()> {
        self.command(
            "pause",
            Method::PUT,
            "/me/player/pause",
            token,
            &[("device_id", device_id.to_string())],
            json!({}),
        )
        .await
    }

    async fn resume(&self, token: &str, device_id: &str) -> ProviderResult<()> {
        self.command(
            "resume",
            Method::PUT,
            "/me/player/play",
            token,
            &[("device_id", device_id.to_string())],
            json!({}),
        )
        .await
    }

    async fn seek(&self, token: &str, device_id: &str, position_ms: u64) -> ProviderResult<()> {
        self.command(
            "seek",
            Method::PUT,
            "/me/player/seek",
            token,
            &[
                ("position_ms", position_ms.to_string()),
                ("device_id", device_id.to_string()),
            ],
            json!({}),
        )
        .await
    }

    async fn next(&self, token: &str, device_id: &str) -> ProviderResult<()> {
        self.command(
            "next",
            Method::POST,
            "/me/player/next",
            token,
            &[("device_id", device_id.to_string())],
            json!({}),
        )
        .await
    }

    async fn previous(&self, token: &str, device_id: &str) -> ProviderResult<()> {
        self.command(
            "previous",
            Method::POST,
            "/me/player/previous",
            token,
            &[("device_id", device_id.to_string())],
            json!({}),
        )
        .await
    }

    async fn set_volume(&self, token: &str, device_id: &str, percent: u8) -> ProviderResult<()> {
        self.command(
            "set_volume",
            Method::PUT,
            "/me/player/volume",
            token,
            &[
                ("volume_percent", percent.min(100).to_string()),
                ("device_id", device_id.to_string()),
            ],
            json!({}),
        )
        .await
    }
}

async fn check(response: Response, device_id: Option<&str>) -> ProviderResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();
    Err(error_for_status(status, retry_after, body, device_id))
}

fn error_for_status(
    status: StatusCode,
    retry_after_secs: Option<u64>,
    body: String,
    device_id: Option<&str>,
) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED => ProviderError::Unauthorized,
        StatusCode::NOT_FOUND => {
            ProviderError::DeviceNotFound(device_id.map(str::to_string).unwrap_or(body))
        }
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited { retry_after_secs },
        _ => ProviderError::HttpStatus(status.as_u16(), body),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response parsing
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct PlaybackResponse {
    #[serde(default)]
    is_playing: bool,
    #[serde(default)]
    progress_ms: Option<u64>,
    item: Option<ItemResponse>,
}

#[derive(Deserialize)]
struct ItemResponse {
    uri: String,
    name: String,
    #[serde(default)]
    duration_ms: u64,
    #[serde(default)]
    artists: Vec<NamedResponse>,
    album: Option<AlbumResponse>,
}

#[derive(Deserialize)]
struct NamedResponse {
    name: String,
}

#[derive(Deserialize)]
struct AlbumResponse {
    #[serde(default)]
    images: Vec<ImageResponse>,
}

#[derive(Deserialize)]
struct ImageResponse {
    url: String,
}

fn parse_playback(body: &str) -> ProviderResult<Option<PlayerStatePush>> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    let playback: PlaybackResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;

    let duration_ms = playback.item.as_ref().map_or(0, |i| i.duration_ms);
    let track = playback.item.map(|item| TrackInfo {
        uri: item.uri,
        name: item.name,
        artist: item.artists.into_iter().next().map(|a| a.name),
        album_art_url: item
            .album
            .and_then(|a| a.images.into_iter().next())
            .map(|img| img.url),
    });

    Ok(Some(PlayerStatePush {
        track,
        paused: !playback.is_playing,
        position_ms: playback.progress_ms.unwrap_or(0).min(duration_ms),
        duration_ms,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(
            error_for_status(StatusCode::UNAUTHORIZED, None, String::new(), Some("d")),
            ProviderError::Unauthorized
        ));
        assert!(matches!(
            error_for_status(StatusCode::NOT_FOUND, None, "gone".into(), Some("dev-1")),
            ProviderError::DeviceNotFound(id) if id == "dev-1"
        ));
        assert!(matches!(
            error_for_status(StatusCode::TOO_MANY_REQUESTS, Some(3), String::new(), None),
            ProviderError::RateLimited {
                retry_after_secs: Some(3)
            }
        ));
        assert!(matches!(
            error_for_status(StatusCode::FORBIDDEN, None, "premium required".into(), None),
            ProviderError::HttpStatus(403, _)
        ));
    }

    #[test]
    fn parses_current_playback() {
        let body = r#"{
            "device": {"id": "dev-1", "name": "Grammys Prediction Player"},
            "is_playing": true,
            "progress_ms": 61000,
            "item": {
                "uri": "spotify:track:abc",
                "name": "Song",
                "duration_ms": 200000,
                "artists": [{"name": "First"}, {"name": "Second"}],
                "album": {"images": [{"url": "https://i.scdn.co/image/large"}]}
            }
        }"#;
        let state = parse_playback(body).unwrap().unwrap();

        assert!(!state.paused);
        assert_eq!(state.position_ms, 61_000);
        assert_eq!(state.duration_ms, 200_000);
        let track = state.track.unwrap();
        assert_eq!(track.artist.as_deref(), Some("First"));
        assert_eq!(
            track.album_art_url.as_deref(),
            Some("https://i.scdn.co/image/large")
        );
    }

    #[test]
    fn playback_without_item_has_zero_duration() {
        let state = parse_playback(r#"{"is_playing": false, "progress_ms": 500, "item": null}"#)
            .unwrap()
            .unwrap();
        assert!(state.paused);
        assert_eq!(state.track, None);
        assert_eq!(state.position_ms, 0);
        assert!(parse_playback("").unwrap().is_none());
    }
}
