//! Boundary to the external playback provider.
//!
//! The coordinator never speaks the provider's protocol directly. It depends on
//! two capabilities:
//! - [`DeviceConnector`]: registers a playback device and reports readiness,
//!   errors and state pushes as [`DeviceEvent`]s
//! - [`PlaybackApi`]: device activation, play and transport commands
//!
//! [`WebApiClient`] implements the commands over HTTP and
//! [`RemoteDeviceConnector`] derives device events by polling the same API.

mod error;
mod remote_device;
mod retry;
mod types;
mod web_api;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use error::{ProviderError, ProviderResult};
pub use remote_device::{PlayerStateSource, RemoteDeviceConnector};
pub use types::{DeviceInfo, PlayTarget, PlayerStatePush, TrackInfo};
pub use web_api::WebApiClient;

/// Supplies the current access token on demand. Called on every provider
/// request so refreshed tokens are used without reconnecting.
pub type TokenProvider = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Options for registering the playback device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceOptions {
    /// Name the device is listed under.
    pub name: String,
    /// Initial volume (0.0 - 1.0).
    pub volume: f32,
}

/// Events reported by a device connection, in the order they occurred.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// Device registered and can receive playback.
    Ready { device_id: String },
    /// Device went offline.
    NotReady { device_id: String },
    /// Device could not be initialized.
    InitializationError(String),
    /// Provider rejected the access token.
    AuthenticationError(String),
    /// Account cannot use playback (e.g. not premium).
    AccountError(String),
    /// Authoritative player state. `None` when this device is not playing.
    StateChanged(Option<PlayerStatePush>),
}

/// Registers a playback device with the provider.
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    /// Opens a device connection. Events are sent to `events` until
    /// [`disconnect`](Self::disconnect) is called. An error means the
    /// connection never opened.
    async fn connect(
        &self,
        options: &DeviceOptions,
        token: TokenProvider,
        events: mpsc::UnboundedSender<DeviceEvent>,
    ) -> ProviderResult<()>;

    /// Closes the current connection, if any. No events are sent afterwards.
    async fn disconnect(&self);
}

/// Provider commands. Every call takes the access token explicitly.
#[async_trait]
pub trait PlaybackApi: Send + Sync {
    /// Makes `device_id` the active device. With `play = false` the current
    /// item is not started.
    async fn transfer_playback(&self, token: &str, device_id: &str, play: bool) -> ProviderResult<()>;

    async fn play(&self, token: &str, device_id: &str, target: &PlayTarget) -> ProviderResult<()>;

    async fn pause(&self, token: &str, device_id: &str) -> ProviderResult<()>;

    async fn resume(&self, token: &str, device_id: &str) -> ProviderResult<()>;

    async fn seek(&self, token: &str, device_id: &str, position_ms: u64) -> ProviderResult<()>;

    async fn next(&self, token: &str, device_id: &str) -> ProviderResult<()>;

    async fn previous(&self, token: &str, device_id: &str) -> ProviderResult<()>;

    /// Sets the device volume in percent (0 - 100).
    async fn set_volume(&self, token: &str, device_id: &str, percent: u8) -> ProviderResult<()>;
}
