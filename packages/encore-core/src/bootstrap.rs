//! Tab bootstrap and dependency wiring.
//!
//! This module is the composition root for one tab: every service is created
//! and wired here, in dependency order. Hosts supply the platform pieces
//! (shared storage, token endpoint, device connector, playback API) through
//! [`TabDependencies`]; tests swap them for mocks.

use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::{RefreshScheduler, SessionCredentials, TokenEndpoint, TokenStore};
use crate::clock::{Clock, SystemClock};
use crate::config::CoordinatorConfig;
use crate::error::{EncoreError, EncoreResult};
use crate::events::{BroadcastEventBridge, EventEmitter};
use crate::leadership::{StorageLeadershipRegister, TabCoordinator, TabId};
use crate::playback::{
    DeviceSession, DisplayState, PlayRequest, PlaybackError, PlaybackRouter, SessionConfig,
};
use crate::protocol_constants::EVENT_CHANNEL_CAPACITY;
use crate::provider::{DeviceConnector, PlaybackApi};
use crate::storage::SharedStorage;

/// Platform pieces a tab is built from.
pub struct TabDependencies {
    /// Storage shared with every other tab.
    pub storage: Arc<dyn SharedStorage>,
    pub token_endpoint: Arc<dyn TokenEndpoint>,
    pub connector: Arc<dyn DeviceConnector>,
    pub api: Arc<dyn PlaybackApi>,
    pub clock: Arc<dyn Clock>,
    /// Receives every event in addition to the broadcast channel.
    pub external_emitter: Option<Arc<dyn EventEmitter>>,
    /// Fixed identity; generated when `None`.
    pub tab_id: Option<TabId>,
}

impl TabDependencies {
    /// Dependencies using the system clock and a generated tab identity.
    pub fn new(
        storage: Arc<dyn SharedStorage>,
        token_endpoint: Arc<dyn TokenEndpoint>,
        connector: Arc<dyn DeviceConnector>,
        api: Arc<dyn PlaybackApi>,
    ) -> Self {
        Self {
            storage,
            token_endpoint,
            connector,
            api,
            clock: Arc::new(SystemClock),
            external_emitter: None,
            tab_id: None,
        }
    }
}

/// Container for one tab's wired services.
pub struct TabServices {
    pub coordinator: Arc<TabCoordinator>,
    pub store: Arc<TokenStore>,
    pub refresher: Arc<RefreshScheduler>,
    pub session: Arc<DeviceSession>,
    pub router: Arc<PlaybackRouter>,
    /// Event bridge for subscribers (display, status printer).
    pub event_bridge: Arc<BroadcastEventBridge>,
    clock: Arc<dyn Clock>,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TabServices {
    /// Spawns the leadership heartbeat, the refresh scheduler and the device
    /// session loop. Must be called from within a Tokio runtime.
    pub fn start_background_tasks(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            log::warn!("[Bootstrap] Background tasks already running");
            return;
        }

        tasks.push(tokio::spawn(
            Arc::clone(&self.coordinator).run(self.cancel_token.clone()),
        ));
        tasks.push(tokio::spawn(
            Arc::clone(&self.refresher).run(self.cancel_token.clone()),
        ));
        tasks.push(tokio::spawn(
            Arc::clone(&self.session).run(self.cancel_token.clone()),
        ));
        log::info!(
            "[Bootstrap] Tab {} started",
            self.coordinator.tab_id()
        );
    }

    /// Stores credentials from an authorization callback fragment
    /// (`access_token=...&refresh_token=...&expires_in=...`).
    pub fn authorize_from_fragment(&self, fragment: &str) -> EncoreResult<()> {
        let creds = SessionCredentials::from_fragment(fragment, self.clock.now_millis())
            .ok_or_else(|| {
                EncoreError::Configuration("callback fragment carries no credentials".to_string())
            })?;
        self.store.set(&creds)?;
        log::info!("[Bootstrap] Stored credentials from authorization callback");
        Ok(())
    }

    /// Routes a play request issued in this tab.
    pub async fn play(&self, uri: &str) -> Result<(), PlaybackError> {
        let request = PlayRequest::new(uri, self.clock.now_millis());
        self.router.submit(request).await
    }

    #[must_use]
    pub fn display(&self) -> DisplayState {
        self.session.display()
    }

    /// Stops the background tasks. The heartbeat task resigns leadership and
    /// the session closes the device on the way out.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");
        self.cancel_token.cancel();

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for result in join_all(tasks).await {
            if let Err(e) = result {
                log::warn!("[Bootstrap] Background task ended abnormally: {}", e);
            }
        }
        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Bootstraps one tab's services.
///
/// The wiring order follows the dependencies:
///
/// 1. Event bridge
/// 2. Leadership coordinator (storage register)
/// 3. Token store and refresh scheduler
/// 4. Device session (coordinator, store, scheduler, provider)
/// 5. Playback router (coordinator, session)
///
/// # Errors
///
/// Returns [`EncoreError::Configuration`] if the configuration is invalid.
pub fn bootstrap_tab(config: &CoordinatorConfig, deps: TabDependencies) -> EncoreResult<TabServices> {
    config.validate().map_err(EncoreError::Configuration)?;

    let TabDependencies {
        storage,
        token_endpoint,
        connector,
        api,
        clock,
        external_emitter,
        tab_id,
    } = deps;

    let event_bridge = Arc::new(BroadcastEventBridge::new(EVENT_CHANNEL_CAPACITY));
    if let Some(emitter) = external_emitter {
        event_bridge.set_external_emitter(emitter);
    }
    let emitter = Arc::clone(&event_bridge) as Arc<dyn EventEmitter>;

    let tab_id = tab_id.unwrap_or_else(TabId::generate);
    log::info!("[Bootstrap] Bootstrapping tab {}", tab_id);

    let coordinator = Arc::new(TabCoordinator::new(
        tab_id,
        Arc::new(StorageLeadershipRegister::new(Arc::clone(&storage))),
        Arc::clone(&clock),
        Arc::clone(&emitter),
        config.heartbeat_interval(),
        config.leader_timeout(),
    ));

    let store = Arc::new(TokenStore::new(storage));
    let refresher = Arc::new(RefreshScheduler::new(
        Arc::clone(&store),
        token_endpoint,
        Arc::clone(&clock),
        Arc::clone(&emitter),
        config.refresh_safety_margin(),
        config.refresh_retry(),
        config.heartbeat_interval(),
    ));

    let session = Arc::new(DeviceSession::new(
        Arc::clone(&coordinator),
        Arc::clone(&store),
        Arc::clone(&refresher),
        connector,
        api,
        Arc::clone(&clock),
        emitter,
        SessionConfig::from(config),
    ));

    let router = Arc::new(PlaybackRouter::new(
        Arc::clone(&coordinator),
        Arc::clone(&session),
        config.handoff_timeout(),
    ));

    Ok(TabServices {
        coordinator,
        store,
        refresher,
        session,
        router,
        event_bridge,
        clock,
        cancel_token: CancellationToken::new(),
        tasks: Mutex::new(Vec::new()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::test_fixtures::{MockApi, MockConnector, MockEndpoint};
    use crate::storage::MemoryStorage;

    fn deps(storage: &MemoryStorage) -> TabDependencies {
        TabDependencies::new(
            Arc::new(storage.clone()),
            Arc::new(MockEndpoint::default()),
            Arc::new(MockConnector::default()),
            Arc::new(MockApi::default()),
        )
    }

    #[test]
    fn rejects_invalid_config() {
        let config = CoordinatorConfig {
            heartbeat_interval_ms: 6_000,
            ..Default::default()
        };
        let result = bootstrap_tab(&config, deps(&MemoryStorage::new()));
        assert!(matches!(result, Err(EncoreError::Configuration(_))));
    }

    #[tokio::test]
    async fn lone_tab_leads_and_resigns_on_shutdown() {
        let storage = MemoryStorage::new();
        let mut tab_deps = deps(&storage);
        tab_deps.tab_id = Some(TabId::from("solo"));
        let services = bootstrap_tab(&CoordinatorConfig::default(), tab_deps).unwrap();
        let mut events = services.event_bridge.subscribe();

        services.start_background_tasks();
        let first = tokio::time::timeout(std::time::Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(first, crate::events::BroadcastEvent::Leadership(_)));
        assert!(services.coordinator.is_leader());

        services.shutdown().await;
        assert!(!services.coordinator.is_leader());
        let register = StorageLeadershipRegister::new(Arc::new(storage));
        assert_eq!(crate::leadership::LeadershipRegister::read(&register).unwrap(), None);
    }

    #[test]
    fn fragment_authorization_fills_the_store() {
        let services =
            bootstrap_tab(&CoordinatorConfig::default(), deps(&MemoryStorage::new())).unwrap();

        services
            .authorize_from_fragment("access_token=abc&refresh_token=def&expires_in=3600")
            .unwrap();
        assert_eq!(
            services.store.access_token(services.clock.now_millis()).as_deref(),
            Some("abc")
        );

        assert!(services.authorize_from_fragment("error=access_denied").is_err());
    }
}
