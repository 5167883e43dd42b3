//! Shared test doubles for the session and router tests.
//!
//! The mocks record every provider call as a short string (`"play:dev-1:uri"`)
//! so tests can assert on exact call sequences.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use super::session::{DeviceSession, SessionConfig};
use crate::auth::{AuthResult, RefreshScheduler, SessionCredentials, TokenEndpoint, TokenGrant, TokenStore};
use crate::clock::{Clock, TokioClock};
use crate::events::NoopEventEmitter;
use crate::leadership::{StorageLeadershipRegister, TabCoordinator, TabId};
use crate::provider::{
    DeviceConnector, DeviceEvent, DeviceOptions, PlayTarget, PlaybackApi, PlayerStatePush,
    ProviderResult, TokenProvider, TrackInfo,
};
use crate::storage::MemoryStorage;

pub const START_MS: u64 = 1_700_000_000_000;
pub const DEVICE_ID: &str = "dev-1";

// ─────────────────────────────────────────────────────────────────────────────
// Provider mocks
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockConnector {
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    /// Token the device saw at each connect.
    tokens: Mutex<Vec<Option<String>>>,
    sender: Mutex<Option<mpsc::UnboundedSender<DeviceEvent>>>,
    /// Events sent right after every connect.
    on_connect: Mutex<Vec<DeviceEvent>>,
}

impl MockConnector {
    pub fn on_connect(&self, events: Vec<DeviceEvent>) {
        *self.on_connect.lock() = events;
    }

    /// Sends an event on the current connection. False if none is open.
    pub fn emit(&self, event: DeviceEvent) -> bool {
        self.sender
            .lock()
            .as_ref()
            .map(|tx| tx.send(event).is_ok())
            .unwrap_or(false)
    }

    /// Keeps a handle to the current connection's sender, so a test can send
    /// events that arrive after the connection was closed.
    pub fn sender(&self) -> Option<mpsc::UnboundedSender<DeviceEvent>> {
        self.sender.lock().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn tokens(&self) -> Vec<Option<String>> {
        self.tokens.lock().clone()
    }
}

#[async_trait]
impl DeviceConnector for MockConnector {
    async fn connect(
        &self,
        _options: &DeviceOptions,
        token: TokenProvider,
        events: mpsc::UnboundedSender<DeviceEvent>,
    ) -> ProviderResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().push(token());
        for event in self.on_connect.lock().clone() {
            let _ = events.send(event);
        }
        *self.sender.lock() = Some(events);
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.sender.lock().take();
    }
}

#[derive(Default)]
pub struct MockApi {
    pub calls: Mutex<Vec<String>>,
    play_results: Mutex<VecDeque<ProviderResult<()>>>,
    seek_results: Mutex<VecDeque<ProviderResult<()>>>,
    play_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockApi {
    pub fn push_play_result(&self, result: ProviderResult<()>) {
        self.play_results.lock().push_back(result);
    }

    pub fn push_seek_result(&self, result: ProviderResult<()>) {
        self.seek_results.lock().push_back(result);
    }

    /// Makes every play call wait until the returned gate is notified.
    pub fn gate_play(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.play_gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl PlaybackApi for MockApi {
    async fn transfer_playback(&self, _token: &str, device_id: &str, play: bool) -> ProviderResult<()> {
        self.record(format!("transfer:{}:{}", device_id, play));
        Ok(())
    }

    async fn play(&self, _token: &str, device_id: &str, target: &PlayTarget) -> ProviderResult<()> {
        self.record(format!("play:{}:{}", device_id, target.uri().unwrap_or_default()));
        let gate = self.play_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.play_results.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn pause(&self, _token: &str, device_id: &str) -> ProviderResult<()> {
        self.record(format!("pause:{}", device_id));
        Ok(())
    }

    async fn resume(&self, _token: &str, device_id: &str) -> ProviderResult<()> {
        self.record(format!("resume:{}", device_id));
        Ok(())
    }

    async fn seek(&self, _token: &str, device_id: &str, position_ms: u64) -> ProviderResult<()> {
        self.record(format!("seek:{}:{}", device_id, position_ms));
        self.seek_results.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn next(&self, _token: &str, device_id: &str) -> ProviderResult<()> {
        self.record(format!("next:{}", device_id));
        Ok(())
    }

    async fn previous(&self, _token: &str, device_id: &str) -> ProviderResult<()> {
        self.record(format!("previous:{}", device_id));
        Ok(())
    }

    async fn set_volume(&self, _token: &str, device_id: &str, percent: u8) -> ProviderResult<()> {
        self.record(format!("volume:{}:{}", device_id, percent));
        Ok(())
    }
}

/// Token endpoint returning queued results, then fresh one-hour grants.
#[derive(Default)]
pub struct MockEndpoint {
    pub calls: AtomicUsize,
    results: Mutex<VecDeque<AuthResult<TokenGrant>>>,
}

impl MockEndpoint {
    pub fn push_result(&self, result: AuthResult<TokenGrant>) {
        self.results.lock().push_back(result);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenEndpoint for MockEndpoint {
    async fn refresh(&self, _refresh_token: &str) -> AuthResult<TokenGrant> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.results.lock().pop_front().unwrap_or_else(|| {
            Ok(TokenGrant {
                access_token: "renewed".to_string(),
                refresh_token: None,
                expires_in: 3600,
            })
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tab harness
// ─────────────────────────────────────────────────────────────────────────────

pub fn credentials(expires_at_ms: u64) -> SessionCredentials {
    SessionCredentials {
        access_token: "access".to_string(),
        refresh_token: "refresh".to_string(),
        expires_at_ms,
    }
}

pub fn state_push(position_ms: u64, duration_ms: u64) -> PlayerStatePush {
    PlayerStatePush {
        track: Some(TrackInfo {
            uri: "spotify:track:nominee".to_string(),
            name: "Nominee".to_string(),
            artist: Some("Artist".to_string()),
            album_art_url: None,
        }),
        paused: false,
        position_ms,
        duration_ms,
    }
}

pub fn session_config() -> SessionConfig {
    SessionConfig {
        device: DeviceOptions {
            name: "Encore Test".to_string(),
            volume: 0.5,
        },
        position_tick: Duration::from_millis(500),
        max_connect_attempts: 3,
        reconnect_delay: Duration::from_secs(2),
    }
}

/// One simulated tab with mocked provider and token endpoint. Heartbeats are
/// driven by hand; the session loop runs once `start` is called.
pub struct TabHarness {
    pub storage: MemoryStorage,
    pub clock: Arc<dyn Clock>,
    pub coordinator: Arc<TabCoordinator>,
    pub store: Arc<TokenStore>,
    pub endpoint: Arc<MockEndpoint>,
    pub refresher: Arc<RefreshScheduler>,
    pub connector: Arc<MockConnector>,
    pub api: Arc<MockApi>,
    pub session: Arc<DeviceSession>,
    pub cancel: CancellationToken,
}

impl TabHarness {
    pub fn new(name: &str, storage: &MemoryStorage) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::starting_at(START_MS));
        let coordinator = Arc::new(TabCoordinator::new(
            TabId::from(name),
            Arc::new(StorageLeadershipRegister::new(Arc::new(storage.clone()))),
            Arc::clone(&clock),
            Arc::new(NoopEventEmitter),
            Duration::from_secs(2),
            Duration::from_secs(5),
        ));
        let store = Arc::new(TokenStore::new(Arc::new(storage.clone())));
        let endpoint = Arc::new(MockEndpoint::default());
        let refresher = Arc::new(RefreshScheduler::new(
            Arc::clone(&store),
            endpoint.clone(),
            Arc::clone(&clock),
            Arc::new(NoopEventEmitter),
            Duration::from_secs(300),
            Duration::from_secs(30),
            Duration::from_secs(2),
        ));
        let connector = Arc::new(MockConnector::default());
        let api = Arc::new(MockApi::default());
        let session = Arc::new(DeviceSession::new(
            Arc::clone(&coordinator),
            Arc::clone(&store),
            Arc::clone(&refresher),
            connector.clone(),
            api.clone(),
            Arc::clone(&clock),
            Arc::new(NoopEventEmitter),
            session_config(),
        ));

        Self {
            storage: storage.clone(),
            clock,
            coordinator,
            store,
            endpoint,
            refresher,
            connector,
            api,
            session,
            cancel: CancellationToken::new(),
        }
    }

    /// Stores credentials valid for an hour.
    pub fn authorize(&self) {
        self.store
            .set(&credentials(self.clock.now_millis() + 3_600_000))
            .unwrap();
    }

    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(Arc::clone(&self.session).run(self.cancel.clone()))
    }

    /// Brings this tab to an active device: lead, connect, ready, first push.
    pub async fn make_active(&self) {
        self.coordinator.heartbeat();
        settle().await;
        assert!(self.connector.emit(DeviceEvent::Ready {
            device_id: DEVICE_ID.to_string()
        }));
        assert!(self
            .connector
            .emit(DeviceEvent::StateChanged(Some(state_push(1_000, 200_000)))));
        settle().await;
    }
}

/// Lets every runnable task finish before returning (time is paused in tests).
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
