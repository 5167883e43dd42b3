//! Per-tab playback device session.
//!
//! A single task owns the device lifecycle and handles, strictly in order:
//! - leadership changes from the [`TabCoordinator`]
//! - device events, tagged with the connection they came from
//! - inputs produced by background work, tagged with the leadership epoch
//! - credential changes, including ones other tabs wrote to shared storage
//! - the position tick, which also polls shared storage for credentials
//!
//! Every state change goes through [`transition`]; this module only carries out
//! the resulting effects. Anything that completes asynchronously is applied only
//! if this tab still leads under the epoch it was issued in.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::device::{transition, DeviceEffect, DeviceInput, DeviceState, Transition};
use super::transport::{TransportModel, TransportSnapshot};
use super::{DisplayState, PlaybackError, UserNotice};
use crate::auth::{RefreshOutcome, RefreshScheduler, TokenStore};
use crate::clock::Clock;
use crate::config::CoordinatorConfig;
use crate::error::FailureKind;
use crate::events::{EventEmitter, SessionEvent, TransportEvent};
use crate::leadership::{LeadershipStatus, TabCoordinator};
use crate::provider::{
    DeviceConnector, DeviceEvent, DeviceOptions, PlayTarget, PlaybackApi, ProviderError,
    TokenProvider,
};

/// Session settings derived from [`CoordinatorConfig`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub device: DeviceOptions,
    pub position_tick: Duration,
    /// Initialization attempts before playback is reported unavailable.
    pub max_connect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl From<&CoordinatorConfig> for SessionConfig {
    fn from(config: &CoordinatorConfig) -> Self {
        Self {
            device: DeviceOptions {
                name: config.device_name.clone(),
                volume: config.initial_volume,
            },
            position_tick: config.position_tick(),
            max_connect_attempts: config.max_connect_attempts,
            reconnect_delay: config.reconnect_delay(),
        }
    }
}

enum SessionMessage {
    /// Event from the connection opened as generation `connection`.
    Device { connection: u64, event: DeviceEvent },
    /// Input produced by work issued while leading under `epoch`.
    Input { epoch: u64, input: DeviceInput },
    /// A play request found the device down while leading under `epoch`.
    ConnectRequested { epoch: u64 },
}

#[derive(Debug, Clone, Copy)]
enum TransportCommand {
    Pause,
    Resume,
    Next,
    Previous,
    Volume(u8),
    Seek(u64),
}

impl TransportCommand {
    fn name(&self) -> &'static str {
        match self {
            TransportCommand::Pause => "pause",
            TransportCommand::Resume => "resume",
            TransportCommand::Next => "next",
            TransportCommand::Previous => "previous",
            TransportCommand::Volume(_) => "set_volume",
            TransportCommand::Seek(_) => "seek",
        }
    }
}

struct SessionInner {
    state: DeviceState,
    transport: TransportModel,
    /// Generation of the current connection. Bumped on open and close so
    /// events from earlier connections are recognisable.
    connection: u64,
    /// Leadership epoch the current connection was opened under.
    connection_epoch: u64,
    connect_attempts: u32,
    /// Last failure shown to the user; cleared on ready and on successful play.
    failure: Option<String>,
    volume: f32,
}

/// Owns this tab's provider connection while it leads.
pub struct DeviceSession {
    coordinator: Arc<TabCoordinator>,
    store: Arc<TokenStore>,
    refresher: Arc<RefreshScheduler>,
    connector: Arc<dyn DeviceConnector>,
    api: Arc<dyn PlaybackApi>,
    clock: Arc<dyn Clock>,
    emitter: Arc<dyn EventEmitter>,
    config: SessionConfig,
    inner: Mutex<SessionInner>,
    state_tx: watch::Sender<DeviceState>,
    messages_tx: mpsc::UnboundedSender<SessionMessage>,
    messages_rx: Mutex<Option<mpsc::UnboundedReceiver<SessionMessage>>>,
}

impl DeviceSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        coordinator: Arc<TabCoordinator>,
        store: Arc<TokenStore>,
        refresher: Arc<RefreshScheduler>,
        connector: Arc<dyn DeviceConnector>,
        api: Arc<dyn PlaybackApi>,
        clock: Arc<dyn Clock>,
        emitter: Arc<dyn EventEmitter>,
        config: SessionConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(DeviceState::Disconnected);
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        let volume = config.device.volume;
        Self {
            coordinator,
            store,
            refresher,
            connector,
            api,
            clock,
            emitter,
            config,
            inner: Mutex::new(SessionInner {
                state: DeviceState::Disconnected,
                transport: TransportModel::new(),
                connection: 0,
                connection_epoch: 0,
                connect_attempts: 0,
                failure: None,
                volume,
            }),
            state_tx,
            messages_tx,
            messages_rx: Mutex::new(Some(messages_rx)),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Observation
    // ─────────────────────────────────────────────────────────────────────────

    #[must_use]
    pub fn state(&self) -> DeviceState {
        self.inner.lock().state.clone()
    }

    /// Subscribes to device state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<DeviceState> {
        self.state_tx.subscribe()
    }

    #[must_use]
    pub fn transport(&self) -> TransportSnapshot {
        self.inner.lock().transport.snapshot()
    }

    /// Builds the host-facing display state.
    #[must_use]
    pub fn display(&self) -> DisplayState {
        let leader = self.coordinator.status().state;
        let has_credentials = self.has_credentials();
        let inner = self.inner.lock();
        DisplayState {
            notice: UserNotice::derive(
                has_credentials,
                leader,
                &inner.state,
                inner.failure.is_some(),
            ),
            leader,
            device: inner.state.clone(),
            transport: inner.transport.snapshot(),
            volume: inner.volume,
        }
    }

    fn has_credentials(&self) -> bool {
        match self.store.get() {
            Ok(creds) => creds.is_some(),
            Err(e) => {
                log::warn!("[DeviceSession] Failed to read credentials: {}", e);
                false
            }
        }
    }

    /// True if unexpired credentials exist. Expired ones are renewed first; the
    /// resulting credential change resumes whatever was waiting on them.
    fn has_valid_credentials(&self) -> bool {
        match self.store.get() {
            Ok(Some(creds)) if !creds.is_expired(self.clock.now_millis()) => true,
            Ok(Some(_)) => {
                log::info!("[DeviceSession] Access token expired, renewing before use");
                self.spawn_refresh();
                false
            }
            Ok(None) => false,
            Err(e) => {
                log::warn!("[DeviceSession] Failed to read credentials: {}", e);
                false
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────────

    /// Leadership epoch, device and token for a command, or why it cannot run.
    fn command_target(&self) -> Result<(u64, String, String), PlaybackError> {
        if !self.coordinator.is_leader() {
            return Err(PlaybackError::NotLeader);
        }
        let epoch = self.coordinator.status().epoch;
        let creds = self.store.get()?.ok_or(PlaybackError::NoCredentials)?;
        if creds.is_expired(self.clock.now_millis()) {
            log::info!("[DeviceSession] Access token expired, renewing before the command");
            self.spawn_refresh();
            return Err(PlaybackError::AuthenticationRequired);
        }
        let device_id = self
            .inner
            .lock()
            .state
            .device_id()
            .map(str::to_string)
            .ok_or(PlaybackError::DeviceNotReady)?;
        Ok((epoch, device_id, creds.access_token))
    }

    fn ensure_current(&self, epoch: u64) -> Result<(), PlaybackError> {
        if self.coordinator.is_current(epoch) {
            Ok(())
        } else {
            log::debug!("[DeviceSession] Dropping completion from epoch {}", epoch);
            Err(PlaybackError::Superseded)
        }
    }

    /// Routes an unauthorized response to the auth-error path instead of
    /// retrying it.
    fn provider_failure(&self, epoch: u64, action: &str, error: ProviderError) -> PlaybackError {
        if error.is_unauthorized() {
            log::warn!("[DeviceSession] {} rejected with 401, renewing credentials", action);
            self.send_input(
                epoch,
                DeviceInput::AuthenticationFailed(format!("{} unauthorized", action)),
            );
            PlaybackError::AuthenticationRequired
        } else {
            log::warn!(
                "[DeviceSession] {} failed ({:?}): {}",
                action,
                FailureKind::from(&error),
                error
            );
            PlaybackError::Provider(error)
        }
    }

    fn send_input(&self, epoch: u64, input: DeviceInput) {
        if self
            .messages_tx
            .send(SessionMessage::Input { epoch, input })
            .is_err()
        {
            log::trace!("[DeviceSession] Session loop gone, dropping input");
        }
    }

    /// Activates the device (without autoplay) and plays `uri` on it.
    ///
    /// The play command is sent exactly once; transient failures are retried
    /// inside the provider client, an unauthorized response is not.
    pub async fn play(&self, uri: &str) -> Result<(), PlaybackError> {
        let (epoch, device_id, token) = self.command_target()?;
        let target = PlayTarget::from_uri(uri);
        log::info!("[DeviceSession] Playing {} on {}", uri, device_id);

        let activated = self.api.transfer_playback(&token, &device_id, false).await;
        self.ensure_current(epoch)?;
        if let Err(e) = activated {
            return Err(self.play_failed(epoch, uri, "transfer_playback", e));
        }

        let played = self.api.play(&token, &device_id, &target).await;
        self.ensure_current(epoch)?;
        if let Err(e) = played {
            return Err(self.play_failed(epoch, uri, "play", e));
        }

        {
            let mut inner = self.inner.lock();
            inner.transport.set_pending_track(uri);
            inner.failure = None;
        }
        self.publish_transport();
        self.emitter.emit_session(SessionEvent::PlaybackStarted {
            uri: uri.to_string(),
            timestamp: self.clock.now_millis(),
        });
        Ok(())
    }

    fn play_failed(&self, epoch: u64, uri: &str, action: &str, error: ProviderError) -> PlaybackError {
        let error = self.provider_failure(epoch, action, error);
        if !matches!(error, PlaybackError::AuthenticationRequired) {
            self.report_play_failed(uri, &error);
        }
        error
    }

    /// Shows a dropped play request to the user until the next success.
    pub fn report_play_failed(&self, uri: &str, error: &PlaybackError) {
        self.inner.lock().failure = Some(error.to_string());
        self.emitter.emit_session(SessionEvent::PlaybackFailed {
            uri: uri.to_string(),
            error: error.to_string(),
            timestamp: self.clock.now_millis(),
        });
    }

    /// Asks the session loop to connect with a fresh attempt budget if the
    /// device is down. Ignored unless this tab still leads when it is handled.
    pub fn request_connect(&self) {
        if !matches!(self.state(), DeviceState::Disconnected | DeviceState::AuthError) {
            return;
        }
        let epoch = self.coordinator.status().epoch;
        if self
            .messages_tx
            .send(SessionMessage::ConnectRequested { epoch })
            .is_err()
        {
            log::trace!("[DeviceSession] Session loop gone, dropping connect request");
        }
    }

    async fn send_command(&self, command: TransportCommand) -> Result<(), PlaybackError> {
        let (epoch, device_id, token) = self.command_target()?;
        let api = &self.api;
        let result = match command {
            TransportCommand::Pause => api.pause(&token, &device_id).await,
            TransportCommand::Resume => api.resume(&token, &device_id).await,
            TransportCommand::Next => api.next(&token, &device_id).await,
            TransportCommand::Previous => api.previous(&token, &device_id).await,
            TransportCommand::Volume(percent) => api.set_volume(&token, &device_id, percent).await,
            TransportCommand::Seek(position_ms) => api.seek(&token, &device_id, position_ms).await,
        };
        self.ensure_current(epoch)?;
        result.map_err(|e| self.provider_failure(epoch, command.name(), e))
    }

    pub async fn pause(&self) -> Result<(), PlaybackError> {
        self.send_command(TransportCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<(), PlaybackError> {
        self.send_command(TransportCommand::Resume).await
    }

    /// Pauses when playing, resumes when paused.
    pub async fn toggle_play(&self) -> Result<(), PlaybackError> {
        let paused = self.inner.lock().transport.is_paused();
        if paused {
            self.resume().await
        } else {
            self.pause().await
        }
    }

    pub async fn next(&self) -> Result<(), PlaybackError> {
        self.send_command(TransportCommand::Next).await
    }

    pub async fn previous(&self) -> Result<(), PlaybackError> {
        self.send_command(TransportCommand::Previous).await
    }

    /// Sets the volume (0.0 - 1.0, clamped).
    pub async fn set_volume(&self, volume: f32) -> Result<(), PlaybackError> {
        let volume = volume.clamp(0.0, 1.0);
        self.inner.lock().volume = volume;
        let percent = (volume * 100.0).round() as u8;
        self.send_command(TransportCommand::Volume(percent)).await
    }

    /// Seek slider grabbed: pushes and ticking stop moving the position.
    pub fn begin_seek(&self) {
        self.inner.lock().transport.begin_seek();
        self.publish_transport();
    }

    /// Seek slider moved.
    pub fn drag_seek(&self, position_ms: u64) {
        self.inner.lock().transport.drag_seek(position_ms);
        self.publish_transport();
    }

    /// Seek slider released. Pushes regain authority once the provider
    /// acknowledges (or rejects) the seek.
    pub async fn commit_seek(&self, target_ms: u64) -> Result<(), PlaybackError> {
        let target_ms = self.inner.lock().transport.commit_seek(target_ms);
        self.publish_transport();

        let result = self.send_command(TransportCommand::Seek(target_ms)).await;
        {
            let mut inner = self.inner.lock();
            match &result {
                Ok(()) => inner
                    .transport
                    .seek_acknowledged(target_ms, self.clock.now_millis()),
                Err(_) => inner.transport.seek_failed(),
            }
        }
        self.publish_transport();
        if result.is_ok() {
            log::debug!("[DeviceSession] Seeked to {}ms", target_ms);
        }
        result
    }

    // ─────────────────────────────────────────────────────────────────────────
    // State machine driver
    // ─────────────────────────────────────────────────────────────────────────

    /// Applies one transition and returns its effects.
    fn step(&self, input: DeviceInput) -> Vec<DeviceEffect> {
        let (effects, changed) = {
            let mut inner = self.inner.lock();
            let Transition { next, effects } = transition(&inner.state, input);
            if next == inner.state {
                (effects, None)
            } else {
                if matches!(next, DeviceState::Ready { .. }) {
                    inner.connect_attempts = 0;
                    inner.failure = None;
                }
                inner.state = next.clone();
                (effects, Some(next))
            }
        };

        if let Some(state) = changed {
            log::info!("[DeviceSession] Device state -> {:?}", state);
            self.state_tx.send_replace(state.clone());
            self.emitter.emit_session(SessionEvent::DeviceStateChanged {
                state,
                timestamp: self.clock.now_millis(),
            });
        }
        effects
    }

    /// Runs an input and every input its effects produce, breadth-first.
    async fn dispatch(self: &Arc<Self>, input: DeviceInput) {
        let mut pending = VecDeque::from([input]);
        while let Some(input) = pending.pop_front() {
            for effect in self.step(input) {
                if let Some(follow_up) = self.execute(effect).await {
                    pending.push_back(follow_up);
                }
            }
        }
    }

    async fn execute(self: &Arc<Self>, effect: DeviceEffect) -> Option<DeviceInput> {
        match effect {
            DeviceEffect::OpenConnection => self.open_connection().await,
            DeviceEffect::CloseConnection => {
                self.close_connection().await;
                None
            }
            DeviceEffect::TransferPlayback { device_id } => {
                self.spawn_transfer(device_id);
                None
            }
            DeviceEffect::RequestTokenRefresh => {
                self.spawn_refresh();
                None
            }
            DeviceEffect::ScheduleReconnect => {
                self.schedule_reconnect();
                None
            }
            DeviceEffect::ReportUnavailable(reason) => {
                self.report_unavailable(reason);
                None
            }
        }
    }

    async fn open_connection(&self) -> Option<DeviceInput> {
        let epoch = self.coordinator.status().epoch;
        let connection = {
            let mut inner = self.inner.lock();
            inner.connection += 1;
            inner.connection_epoch = epoch;
            inner.connection
        };

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let forward = self.messages_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                if forward
                    .send(SessionMessage::Device { connection, event })
                    .is_err()
                {
                    break;
                }
            }
        });

        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);
        let token: TokenProvider = Arc::new(move || store.access_token(clock.now_millis()));

        log::info!(
            "[DeviceSession] Connecting device '{}' (connection {})",
            self.config.device.name,
            connection
        );
        match self.connector.connect(&self.config.device, token, events_tx).await {
            Ok(()) => None,
            Err(e) if e.is_unauthorized() => Some(DeviceInput::AuthenticationFailed(e.to_string())),
            Err(e) => {
                log::warn!("[DeviceSession] Failed to open connection: {}", e);
                Some(DeviceInput::InitializationFailed(e.to_string()))
            }
        }
    }

    async fn close_connection(&self) {
        {
            let mut inner = self.inner.lock();
            inner.connection += 1;
            inner.transport.reset();
        }
        self.connector.disconnect().await;
        self.publish_transport();
    }

    fn spawn_transfer(self: &Arc<Self>, device_id: String) {
        let epoch = self.coordinator.status().epoch;
        let Some(token) = self.store.access_token(self.clock.now_millis()) else {
            log::debug!("[DeviceSession] No valid token, skipping transfer to {}", device_id);
            return;
        };
        let session = Arc::clone(self);
        tokio::spawn(async move {
            match session.api.transfer_playback(&token, &device_id, false).await {
                Ok(()) => log::info!("[DeviceSession] Playback transferred to {}", device_id),
                Err(e) if e.is_unauthorized() => session.send_input(
                    epoch,
                    DeviceInput::AuthenticationFailed("transfer_playback unauthorized".to_string()),
                ),
                Err(e) => log::warn!("[DeviceSession] Failed to transfer playback: {}", e),
            }
        });
    }

    /// Renews credentials after an authentication error. Reconnecting is driven
    /// by the resulting credential change.
    fn spawn_refresh(&self) {
        let refresher = Arc::clone(&self.refresher);
        tokio::spawn(async move {
            match refresher.refresh_now().await {
                RefreshOutcome::Refreshed { .. } => {
                    log::info!("[DeviceSession] Credentials renewed after authentication error")
                }
                RefreshOutcome::ReauthRequired => {
                    log::warn!("[DeviceSession] Credentials rejected, reauthorization required")
                }
                other => log::debug!("[DeviceSession] Refresh after auth error: {:?}", other),
            }
        });
    }

    fn schedule_reconnect(&self) {
        let (attempts, epoch) = {
            let mut inner = self.inner.lock();
            inner.connect_attempts += 1;
            (inner.connect_attempts, inner.connection_epoch)
        };

        if attempts >= self.config.max_connect_attempts {
            self.report_unavailable(format!(
                "device failed to initialize after {} attempts",
                attempts
            ));
            return;
        }

        let delay = self.config.reconnect_delay;
        log::info!(
            "[DeviceSession] Reconnecting in {}ms (attempt {}/{})",
            delay.as_millis(),
            attempts + 1,
            self.config.max_connect_attempts
        );
        let tx = self.messages_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let input = DeviceInput::Connect;
            if tx.send(SessionMessage::Input { epoch, input }).is_err() {
                log::trace!("[DeviceSession] Session loop gone, dropping reconnect");
            }
        });
    }

    fn report_unavailable(&self, reason: String) {
        log::warn!("[DeviceSession] Playback unavailable: {}", reason);
        self.inner.lock().failure = Some(reason.clone());
        self.emitter.emit_session(SessionEvent::PlaybackUnavailable {
            reason,
            timestamp: self.clock.now_millis(),
        });
    }

    fn publish_transport(&self) {
        let snapshot = self.inner.lock().transport.snapshot();
        self.emitter.emit_transport(TransportEvent::Updated {
            snapshot,
            timestamp: self.clock.now_millis(),
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event handlers
    // ─────────────────────────────────────────────────────────────────────────

    /// Connects if this tab leads and credentials exist.
    async fn try_connect(self: &Arc<Self>) {
        if !self.coordinator.is_leader() {
            return;
        }
        if !self.has_valid_credentials() {
            log::info!("[DeviceSession] No valid credentials, waiting before connecting");
            return;
        }
        self.dispatch(DeviceInput::Connect).await;
    }

    /// Connects with a fresh attempt budget.
    async fn connect_fresh(self: &Arc<Self>) {
        {
            let mut inner = self.inner.lock();
            if !inner.state.has_connection() {
                inner.connect_attempts = 0;
            }
        }
        self.try_connect().await;
    }

    async fn on_leadership(self: &Arc<Self>, status: LeadershipStatus) {
        if !status.is_leader() {
            self.dispatch(DeviceInput::LeadershipLost).await;
            return;
        }

        // Demoted and promoted again between two observations: the open
        // connection belongs to the old epoch.
        let stale = {
            let inner = self.inner.lock();
            inner.state.has_connection() && inner.connection_epoch != status.epoch
        };
        if stale {
            self.dispatch(DeviceInput::LeadershipLost).await;
        }
        self.connect_fresh().await;
    }

    async fn on_credentials_changed(self: &Arc<Self>) {
        if self.has_credentials() {
            let state = self.state();
            if matches!(state, DeviceState::Disconnected | DeviceState::AuthError) {
                self.connect_fresh().await;
            }
            return;
        }

        if self.state().has_connection() {
            log::info!("[DeviceSession] Credentials cleared, closing device");
            self.dispatch(DeviceInput::Disconnect).await;
        }
    }

    async fn handle_message(self: &Arc<Self>, message: SessionMessage) {
        match message {
            SessionMessage::Device { connection, event } => {
                let current = {
                    let inner = self.inner.lock();
                    inner.connection == connection
                        && self.coordinator.is_current(inner.connection_epoch)
                };
                if !current {
                    log::debug!("[DeviceSession] Dropping event from stale connection: {:?}", event);
                    return;
                }
                self.on_device_event(event).await;
            }
            SessionMessage::Input { epoch, input } => {
                if !self.coordinator.is_current(epoch) {
                    log::debug!("[DeviceSession] Dropping {:?} from epoch {}", input, epoch);
                    return;
                }
                if input == DeviceInput::Connect {
                    self.try_connect().await;
                } else {
                    self.dispatch(input).await;
                }
            }
            SessionMessage::ConnectRequested { epoch } => {
                if !self.coordinator.is_current(epoch) {
                    log::debug!("[DeviceSession] Dropping connect request from epoch {}", epoch);
                    return;
                }
                self.connect_fresh().await;
            }
        }
    }

    async fn on_device_event(self: &Arc<Self>, event: DeviceEvent) {
        match event {
            DeviceEvent::Ready { device_id } => {
                log::info!("[DeviceSession] Device ready with ID {}", device_id);
                self.dispatch(DeviceInput::ProviderReady { device_id }).await;
            }
            DeviceEvent::NotReady { device_id } => {
                log::info!("[DeviceSession] Device {} has gone offline", device_id);
                self.dispatch(DeviceInput::ProviderNotReady { device_id }).await;
            }
            DeviceEvent::InitializationError(message) => {
                log::warn!("[DeviceSession] Failed to initialize device: {}", message);
                self.dispatch(DeviceInput::InitializationFailed(message)).await;
            }
            DeviceEvent::AuthenticationError(message) => {
                log::warn!("[DeviceSession] Failed to authenticate device: {}", message);
                self.dispatch(DeviceInput::AuthenticationFailed(message)).await;
            }
            DeviceEvent::AccountError(message) => {
                log::warn!("[DeviceSession] Failed to validate account: {}", message);
                self.dispatch(DeviceInput::AccountFailed(message)).await;
            }
            DeviceEvent::StateChanged(push) => {
                let now = self.clock.now_millis();
                let applied = self.inner.lock().transport.apply_push(push.as_ref(), now);
                self.dispatch(DeviceInput::PlaybackObserved {
                    active: push.is_some(),
                })
                .await;
                if applied {
                    self.publish_transport();
                }
            }
        }
    }

    fn on_tick(&self) {
        if let Err(e) = self.store.sync() {
            log::debug!("[DeviceSession] Failed to poll credentials: {}", e);
        }

        let now = self.clock.now_millis();
        let changed = {
            let mut inner = self.inner.lock();
            let active = inner.state.is_active();
            inner.transport.tick(now, active)
        };
        if changed {
            self.publish_transport();
        }
    }

    /// Runs the session until cancelled, then closes the device.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let Some(mut messages) = self.messages_rx.lock().take() else {
            log::error!("[DeviceSession] Session loop is already running");
            return;
        };
        let mut leadership = self.coordinator.subscribe();
        let mut credentials = self.store.subscribe();
        let mut ticker = tokio::time::interval(self.config.position_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::info!(
            "[DeviceSession] Session started for tab {}",
            self.coordinator.tab_id()
        );
        let initial = *leadership.borrow_and_update();
        self.on_leadership(initial).await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Ok(()) = leadership.changed() => {
                    let status = *leadership.borrow_and_update();
                    self.on_leadership(status).await;
                }
                Some(message) = messages.recv() => self.handle_message(message).await,
                Ok(()) = credentials.changed() => self.on_credentials_changed().await,
                _ = ticker.tick() => self.on_tick(),
            }
        }

        self.dispatch(DeviceInput::Disconnect).await;
        log::info!("[DeviceSession] Session stopped");
    }
}
