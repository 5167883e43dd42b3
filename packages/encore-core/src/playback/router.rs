//! Play request routing.
//!
//! A play request can originate in any tab. A follower takes leadership first,
//! waits for its own device to become playable, then plays. The play command
//! itself is sent exactly once, by whichever tab ends up leading. A request that
//! cannot be played in time is dropped and shown as a playback failure.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::session::DeviceSession;
use super::PlaybackError;
use crate::leadership::TabCoordinator;

/// A request to play a track or context from this tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayRequest {
    pub target_uri: String,
    pub issued_at_ms: u64,
}

impl PlayRequest {
    pub fn new(target_uri: impl Into<String>, issued_at_ms: u64) -> Self {
        Self {
            target_uri: target_uri.into(),
            issued_at_ms,
        }
    }
}

pub struct PlaybackRouter {
    coordinator: Arc<TabCoordinator>,
    session: Arc<DeviceSession>,
    handoff_timeout: Duration,
}

impl PlaybackRouter {
    pub fn new(
        coordinator: Arc<TabCoordinator>,
        session: Arc<DeviceSession>,
        handoff_timeout: Duration,
    ) -> Self {
        Self {
            coordinator,
            session,
            handoff_timeout,
        }
    }

    /// Plays the request in this tab, taking leadership first if needed.
    ///
    /// Fails with [`PlaybackError::HandoffTimedOut`] if this tab does not lead
    /// with a playable device within the hand-off timeout.
    pub async fn submit(&self, request: PlayRequest) -> Result<(), PlaybackError> {
        if !self.coordinator.is_leader() {
            log::info!(
                "[Router] Tab {} taking over playback for {}",
                self.coordinator.tab_id(),
                request.target_uri
            );
            self.coordinator.request_handoff()?;
        }
        self.session.request_connect();

        let mut device = self.session.subscribe_state();
        // The borrow returned by `wait_for` holds the watch lock; release it
        // before the session publishes again.
        let ready = tokio::time::timeout(self.handoff_timeout, async {
            device.wait_for(|state| state.is_playable()).await.map(|_| ())
        })
        .await;

        match ready {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => {
                log::warn!("[Router] Device session closed during hand-off");
                return Err(PlaybackError::DeviceNotReady);
            }
            Err(_) => {
                log::warn!(
                    "[Router] Device not ready after {}ms, dropping {}",
                    self.handoff_timeout.as_millis(),
                    request.target_uri
                );
                let error = PlaybackError::HandoffTimedOut;
                self.session.report_play_failed(&request.target_uri, &error);
                return Err(error);
            }
        }

        if !self.coordinator.is_leader() {
            return Err(PlaybackError::NotLeader);
        }
        self.session.play(&request.target_uri).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leadership::LeaderState;
    use crate::playback::test_fixtures::{settle, TabHarness, DEVICE_ID};
    use crate::playback::{DeviceState, UserNotice};
    use crate::provider::DeviceEvent;
    use crate::storage::MemoryStorage;

    fn router(tab: &TabHarness) -> PlaybackRouter {
        PlaybackRouter::new(
            Arc::clone(&tab.coordinator),
            Arc::clone(&tab.session),
            Duration::from_secs(10),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn leader_with_ready_device_plays_directly() {
        let storage = MemoryStorage::new();
        let tab = TabHarness::new("a", &storage);
        tab.authorize();
        let _task = tab.start();
        tab.make_active().await;

        router(&tab)
            .submit(PlayRequest::new("spotify:track:best-song", 0))
            .await
            .unwrap();

        assert_eq!(tab.api.count("play:"), 1);
        assert_eq!(
            tab.session.transport().track.map(|t| t.uri),
            Some("spotify:track:best-song".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn follower_takes_over_and_plays_once() {
        let storage = MemoryStorage::new();
        let leader = TabHarness::new("a", &storage);
        let follower = TabHarness::new("b", &storage);
        leader.authorize();
        let _leader_task = leader.start();
        let _follower_task = follower.start();
        leader.make_active().await;
        follower.coordinator.heartbeat();
        settle().await;

        let router = router(&follower);
        let submit = router.submit(PlayRequest::new("spotify:track:best-song", 0));
        let ready = async {
            settle().await;
            leader.coordinator.heartbeat();
            assert!(follower.connector.emit(DeviceEvent::Ready {
                device_id: "dev-2".to_string()
            }));
        };
        let (result, ()) = tokio::join!(submit, ready);
        result.unwrap();
        settle().await;

        assert!(follower.coordinator.is_leader());
        assert!(!leader.coordinator.is_leader());
        assert_eq!(follower.api.count("play:dev-2:spotify:track:best-song"), 1);
        assert_eq!(leader.api.count("play:"), 0);
        assert_eq!(leader.connector.disconnect_count(), 1);
        assert_eq!(leader.session.state(), DeviceState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_device_never_becomes_ready() {
        let storage = MemoryStorage::new();
        let tab = TabHarness::new("a", &storage);
        tab.authorize();
        let _task = tab.start();

        let result = router(&tab)
            .submit(PlayRequest::new("spotify:track:x", 0))
            .await;

        assert!(matches!(result, Err(PlaybackError::HandoffTimedOut)));
        assert_eq!(tab.coordinator.status().state, LeaderState::Leader);
        assert_eq!(tab.connector.connect_count(), 1);
        assert_eq!(tab.api.count("play:"), 0);
        assert_eq!(tab.session.display().notice, UserNotice::PlaybackFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn leader_reconnects_a_failed_device_for_play() {
        let storage = MemoryStorage::new();
        let tab = TabHarness::new("a", &storage);
        tab.connector
            .on_connect(vec![DeviceEvent::InitializationError("sdk failed".into())]);
        tab.authorize();
        let _task = tab.start();
        tab.coordinator.heartbeat();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(tab.connector.connect_count(), 3);
        assert_eq!(tab.session.state(), DeviceState::Disconnected);

        tab.connector.on_connect(vec![DeviceEvent::Ready {
            device_id: DEVICE_ID.to_string(),
        }]);
        router(&tab)
            .submit(PlayRequest::new("spotify:track:again", 0))
            .await
            .unwrap();

        assert_eq!(tab.connector.connect_count(), 4);
        assert_eq!(tab.api.count("play:dev-1:spotify:track:again"), 1);
        assert_eq!(tab.session.display().notice, UserNotice::None);
    }

    #[tokio::test(start_paused = true)]
    async fn leader_plays_with_credentials_stored_by_another_tab() {
        let storage = MemoryStorage::new();
        let leader = TabHarness::new("a", &storage);
        let other = TabHarness::new("b", &storage);
        leader.connector.on_connect(vec![DeviceEvent::Ready {
            device_id: DEVICE_ID.to_string(),
        }]);
        let _task = leader.start();
        leader.coordinator.heartbeat();
        settle().await;
        assert_eq!(leader.connector.connect_count(), 0);

        other.authorize();
        router(&leader)
            .submit(PlayRequest::new("spotify:track:shared", 0))
            .await
            .unwrap();

        assert_eq!(leader.connector.connect_count(), 1);
        assert_eq!(leader.api.count("play:dev-1:spotify:track:shared"), 1);
    }
}
