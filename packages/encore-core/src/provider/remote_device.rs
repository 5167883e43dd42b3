//! Device connector for an externally running player (a desktop app, a
//! speaker, a headless client) that registers itself with the provider under a
//! known name.
//!
//! Readiness is derived from the user's device list and state pushes from the
//! current playback state, both polled at a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::error::{ProviderError, ProviderResult};
use super::types::{DeviceInfo, PlayerStatePush};
use super::web_api::WebApiClient;
use super::{DeviceConnector, DeviceEvent, DeviceOptions, TokenProvider};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Read-only view of the provider the connector polls.
#[async_trait]
pub trait PlayerStateSource: Send + Sync {
    async fn devices(&self, token: &str) -> ProviderResult<Vec<DeviceInfo>>;

    async fn current_playback(&self, token: &str) -> ProviderResult<Option<PlayerStatePush>>;
}

#[async_trait]
impl PlayerStateSource for WebApiClient {
    async fn devices(&self, token: &str) -> ProviderResult<Vec<DeviceInfo>> {
        WebApiClient::devices(self, token).await
    }

    async fn current_playback(&self, token: &str) -> ProviderResult<Option<PlayerStatePush>> {
        WebApiClient::current_playback(self, token).await
    }
}

/// Polling [`DeviceConnector`].
pub struct RemoteDeviceConnector {
    source: Arc<dyn PlayerStateSource>,
    poll_interval: Duration,
    active: Mutex<Option<CancellationToken>>,
}

impl RemoteDeviceConnector {
    pub fn new(source: Arc<dyn PlayerStateSource>) -> Self {
        Self {
            source,
            poll_interval: DEFAULT_POLL_INTERVAL,
            active: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[async_trait]
impl DeviceConnector for RemoteDeviceConnector {
    async fn connect(
        &self,
        options: &DeviceOptions,
        token: TokenProvider,
        events: mpsc::UnboundedSender<DeviceEvent>,
    ) -> ProviderResult<()> {
        if token().is_none() {
            return Err(ProviderError::Unauthorized);
        }

        let cancel = CancellationToken::new();
        if let Some(previous) = self.active.lock().replace(cancel.clone()) {
            previous.cancel();
        }

        log::info!(
            "[RemoteDevice] Waiting for device '{}' to appear",
            options.name
        );
        tokio::spawn(poll_device(
            Arc::clone(&self.source),
            options.name.clone(),
            token,
            events,
            self.poll_interval,
            cancel,
        ));
        Ok(())
    }

    async fn disconnect(&self) {
        if let Some(cancel) = self.active.lock().take() {
            log::info!("[RemoteDevice] Disconnecting");
            cancel.cancel();
        }
    }
}

/// Sends an event unless the connection was closed meanwhile. Returns false
/// when polling should stop.
fn emit(
    events: &mpsc::UnboundedSender<DeviceEvent>,
    cancel: &CancellationToken,
    event: DeviceEvent,
) -> bool {
    !cancel.is_cancelled() && events.send(event).is_ok()
}

/// Reports a polling failure. Returns true when the failure ends the connection.
fn report_failure(
    error: ProviderError,
    events: &mpsc::UnboundedSender<DeviceEvent>,
    cancel: &CancellationToken,
) -> bool {
    if error.is_transient() {
        log::debug!("[RemoteDevice] Transient poll failure: {}", error);
        return false;
    }
    let event = match error {
        ProviderError::Unauthorized => {
            DeviceEvent::AuthenticationError("access token rejected".to_string())
        }
        ProviderError::HttpStatus(403, body) => DeviceEvent::AccountError(body),
        other => DeviceEvent::InitializationError(other.to_string()),
    };
    emit(events, cancel, event);
    true
}

async fn poll_device(
    source: Arc<dyn PlayerStateSource>,
    name: String,
    token: TokenProvider,
    events: mpsc::UnboundedSender<DeviceEvent>,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ready: Option<String> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(access_token) = token() else {
            emit(
                &events,
                &cancel,
                DeviceEvent::AuthenticationError("no access token".to_string()),
            );
            break;
        };

        let devices = match source.devices(&access_token).await {
            Ok(devices) => devices,
            Err(e) => {
                if report_failure(e, &events, &cancel) {
                    break;
                }
                continue;
            }
        };

        let ours = devices
            .into_iter()
            .find(|d| d.name == name && d.id.is_some() && !d.is_restricted);

        let Some(device) = ours else {
            if let Some(device_id) = ready.take() {
                log::info!("[RemoteDevice] Device {} went offline", device_id);
                if !emit(&events, &cancel, DeviceEvent::NotReady { device_id }) {
                    break;
                }
            }
            continue;
        };

        let device_id = device.id.unwrap_or_default();
        if ready.as_deref() != Some(device_id.as_str()) {
            log::info!("[RemoteDevice] Device ready with ID {}", device_id);
            ready = Some(device_id.clone());
            if !emit(&events, &cancel, DeviceEvent::Ready { device_id }) {
                break;
            }
        }

        let state = if device.is_active {
            match source.current_playback(&access_token).await {
                Ok(state) => state,
                Err(e) => {
                    if report_failure(e, &events, &cancel) {
                        break;
                    }
                    continue;
                }
            }
        } else {
            None
        };

        if !emit(&events, &cancel, DeviceEvent::StateChanged(state)) {
            break;
        }
    }

    log::debug!("[RemoteDevice] Polling stopped");
}
