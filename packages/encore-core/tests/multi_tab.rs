//! Several tabs sharing one storage area, wired the way a host wires them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use encore_core::auth::{AuthResult, SessionCredentials, TokenEndpoint, TokenGrant};
use encore_core::clock::TokioClock;
use encore_core::provider::{
    DeviceConnector, DeviceEvent, DeviceOptions, PlayTarget, PlaybackApi, ProviderResult,
    TokenProvider,
};
use encore_core::{
    bootstrap_tab, BroadcastEvent, CoordinatorConfig, DeviceState, MemoryStorage, SessionEvent,
    TabDependencies, TabId, TabServices,
};

const START_MS: u64 = 1_700_000_000_000;

/// Calls from every tab, in order, as `"<command>:<device>"`.
type CallLog = Arc<Mutex<Vec<String>>>;

/// Registers immediately as `device_id`.
struct InstantDevice {
    device_id: String,
}

#[async_trait]
impl DeviceConnector for InstantDevice {
    async fn connect(
        &self,
        _options: &DeviceOptions,
        token: TokenProvider,
        events: mpsc::UnboundedSender<DeviceEvent>,
    ) -> ProviderResult<()> {
        assert!(token().is_some());
        let _ = events.send(DeviceEvent::Ready {
            device_id: self.device_id.clone(),
        });
        Ok(())
    }

    async fn disconnect(&self) {}
}

struct RecordingApi {
    log: CallLog,
}

impl RecordingApi {
    fn record(&self, command: &str, device_id: &str) -> ProviderResult<()> {
        self.log.lock().push(format!("{}:{}", command, device_id));
        Ok(())
    }
}

#[async_trait]
impl PlaybackApi for RecordingApi {
    async fn transfer_playback(&self, _: &str, device_id: &str, _: bool) -> ProviderResult<()> {
        self.record("transfer", device_id)
    }

    async fn play(&self, _: &str, device_id: &str, _: &PlayTarget) -> ProviderResult<()> {
        self.record("play", device_id)
    }

    async fn pause(&self, _: &str, device_id: &str) -> ProviderResult<()> {
        self.record("pause", device_id)
    }

    async fn resume(&self, _: &str, device_id: &str) -> ProviderResult<()> {
        self.record("resume", device_id)
    }

    async fn seek(&self, _: &str, device_id: &str, _: u64) -> ProviderResult<()> {
        self.record("seek", device_id)
    }

    async fn next(&self, _: &str, device_id: &str) -> ProviderResult<()> {
        self.record("next", device_id)
    }

    async fn previous(&self, _: &str, device_id: &str) -> ProviderResult<()> {
        self.record("previous", device_id)
    }

    async fn set_volume(&self, _: &str, device_id: &str, _: u8) -> ProviderResult<()> {
        self.record("volume", device_id)
    }
}

struct FreshGrants;

#[async_trait]
impl TokenEndpoint for FreshGrants {
    async fn refresh(&self, _refresh_token: &str) -> AuthResult<TokenGrant> {
        Ok(TokenGrant {
            access_token: "renewed".to_string(),
            refresh_token: None,
            expires_in: 3600,
        })
    }
}

fn spawn_tab(name: &str, storage: &MemoryStorage, log: &CallLog) -> TabServices {
    let mut deps = TabDependencies::new(
        Arc::new(storage.clone()),
        Arc::new(FreshGrants),
        Arc::new(InstantDevice {
            device_id: format!("device-{}", name),
        }),
        Arc::new(RecordingApi {
            log: Arc::clone(log),
        }),
    );
    deps.clock = Arc::new(TokioClock::starting_at(START_MS));
    deps.tab_id = Some(TabId::from(name));

    let services = bootstrap_tab(&CoordinatorConfig::default(), deps).unwrap();
    services.start_background_tasks();
    services
}

/// Stores credentials valid for an hour from the start of the test.
fn authorize(tab: &TabServices) {
    tab.store
        .set(&SessionCredentials {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at_ms: START_MS + 3_600_000,
        })
        .unwrap();
}

fn leaders(tabs: &[&TabServices]) -> Vec<String> {
    tabs.iter()
        .filter(|tab| tab.coordinator.is_leader())
        .map(|tab| tab.coordinator.tab_id().to_string())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn one_leader_and_one_play_across_tabs() {
    let storage = MemoryStorage::new();
    let log: CallLog = Arc::default();
    let a = spawn_tab("a", &storage, &log);
    let b = spawn_tab("b", &storage, &log);
    let c = spawn_tab("c", &storage, &log);
    authorize(&a);

    tokio::time::sleep(Duration::from_secs(3)).await;
    let tabs = [&a, &b, &c];
    let current = leaders(&tabs);
    assert_eq!(current.len(), 1, "leaders: {:?}", current);

    let (leader, followers): (Vec<&TabServices>, Vec<&TabServices>) = tabs
        .iter()
        .copied()
        .partition(|tab| tab.coordinator.is_leader());
    let leader = leader[0];
    assert!(leader.session.state().is_playable());
    for follower in &followers {
        assert_eq!(follower.session.state(), DeviceState::Disconnected);
    }

    // A play request issued in a follower moves playback there.
    let target = followers[0];
    let target_id = target.coordinator.tab_id().to_string();
    let mut events = target.event_bridge.subscribe();
    target.play("spotify:track:album-of-the-year").await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(leaders(&tabs), vec![target_id.clone()]);
    assert_eq!(leader.session.state(), DeviceState::Disconnected);
    let plays: Vec<String> = log
        .lock()
        .iter()
        .filter(|call| call.starts_with("play:"))
        .cloned()
        .collect();
    assert_eq!(plays, vec![format!("play:device-{}", target_id)]);

    let mut started = false;
    while let Ok(event) = events.try_recv() {
        if let BroadcastEvent::Session(SessionEvent::PlaybackStarted { uri, .. }) = event {
            assert_eq!(uri, "spotify:track:album-of-the-year");
            started = true;
        }
    }
    assert!(started);

    for tab in [&a, &b, &c] {
        tab.shutdown().await;
    }
}

#[tokio::test(start_paused = true)]
async fn closing_the_leader_hands_over_within_a_heartbeat() {
    let storage = MemoryStorage::new();
    let log: CallLog = Arc::default();
    let a = spawn_tab("a", &storage, &log);
    let b = spawn_tab("b", &storage, &log);
    authorize(&a);
    tokio::time::sleep(Duration::from_secs(1)).await;
    let (leader, follower) = if a.coordinator.is_leader() { (&a, &b) } else { (&b, &a) };
    assert!(!follower.coordinator.is_leader());

    leader.shutdown().await;
    tokio::time::sleep(Duration::from_millis(2_100)).await;

    assert!(follower.coordinator.is_leader());
    assert!(follower.session.state().is_playable());
    follower.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn credentials_left_by_a_closed_tab_stay_fresh() {
    let storage = MemoryStorage::new();
    let log: CallLog = Arc::default();
    let a = spawn_tab("a", &storage, &log);
    let b = spawn_tab("b", &storage, &log);
    b.store
        .set(&SessionCredentials {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at_ms: START_MS + 600_000,
        })
        .unwrap();
    b.shutdown().await;

    tokio::time::sleep(Duration::from_secs(3_600)).await;

    let creds = a.store.get().unwrap().unwrap();
    assert_eq!(creds.access_token, "renewed");
    assert!(creds.expires_at_ms > START_MS + 3_600_000);
    assert!(a.coordinator.is_leader());
    assert!(a.session.state().is_playable());
    a.shutdown().await;
}
