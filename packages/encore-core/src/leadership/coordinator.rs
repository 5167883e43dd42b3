//! Heartbeat-driven leader election between tabs.
//!
//! Each tick reads the shared record and applies three rules:
//! - record absent or stale: claim it and lead
//! - record names this tab: refresh the heartbeat and lead
//! - otherwise: follow
//!
//! Two tabs can both believe they lead for up to one heartbeat interval after
//! racing claims; the next tick of the losing tab reads the winner's write and
//! demotes itself.
//!
//! A leader also stops acting as one once its own last heartbeat is older than
//! the timeout, which is when peers are allowed to take over. The published
//! status keeps saying `Leader` until the next heartbeat settles it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::record::{LeadershipRecord, LeadershipRegister, TabId};
use crate::clock::Clock;
use crate::events::{EventEmitter, LeadershipEvent};
use crate::storage::StorageResult;

/// Leadership state of one tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LeaderState {
    /// No heartbeat has run yet.
    Unknown,
    Follower,
    Leader,
}

/// Current state plus the leadership epoch.
///
/// The epoch increments every time this tab becomes leader. Work issued while
/// leading captures it and is discarded if the epoch has moved on by the time it
/// completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeadershipStatus {
    pub state: LeaderState,
    pub epoch: u64,
}

impl LeadershipStatus {
    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.state == LeaderState::Leader
    }
}

/// Elects one leader among tabs sharing a [`LeadershipRegister`].
pub struct TabCoordinator {
    tab_id: TabId,
    register: Arc<dyn LeadershipRegister>,
    clock: Arc<dyn Clock>,
    emitter: Arc<dyn EventEmitter>,
    heartbeat_interval: Duration,
    timeout: Duration,
    status: watch::Sender<LeadershipStatus>,
    /// When this tab last wrote its heartbeat (Unix milliseconds).
    last_heartbeat_ms: AtomicU64,
}

impl TabCoordinator {
    pub fn new(
        tab_id: TabId,
        register: Arc<dyn LeadershipRegister>,
        clock: Arc<dyn Clock>,
        emitter: Arc<dyn EventEmitter>,
        heartbeat_interval: Duration,
        timeout: Duration,
    ) -> Self {
        let (status, _) = watch::channel(LeadershipStatus {
            state: LeaderState::Unknown,
            epoch: 0,
        });
        Self {
            tab_id,
            register,
            clock,
            emitter,
            heartbeat_interval,
            timeout,
            status,
            last_heartbeat_ms: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn tab_id(&self) -> &TabId {
        &self.tab_id
    }

    #[must_use]
    pub fn status(&self) -> LeadershipStatus {
        *self.status.borrow()
    }

    /// True if this tab leads and its own heartbeat has not gone stale.
    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.status().is_leader() && self.heartbeat_is_fresh()
    }

    /// True while this tab still leads under `epoch`.
    #[must_use]
    pub fn is_current(&self, epoch: u64) -> bool {
        self.is_leader() && self.status().epoch == epoch
    }

    fn heartbeat_is_fresh(&self) -> bool {
        let age = self
            .clock
            .now_millis()
            .saturating_sub(self.last_heartbeat_ms.load(Ordering::SeqCst));
        age < self.timeout.as_millis() as u64
    }

    /// Subscribes to leadership changes.
    pub fn subscribe(&self) -> watch::Receiver<LeadershipStatus> {
        self.status.subscribe()
    }

    /// Runs one heartbeat: read the record, then claim, refresh or follow.
    ///
    /// Storage failures leave the state unchanged; the next tick retries.
    pub fn heartbeat(&self) -> LeadershipStatus {
        let now = self.clock.now_millis();
        let record = match self.register.read() {
            Ok(record) => record,
            Err(e) => {
                log::warn!("[Leadership] Failed to read leadership record: {}", e);
                return self.status();
            }
        };

        let timeout_ms = self.timeout.as_millis() as u64;
        match record {
            Some(record) if record.is_owned_by(&self.tab_id) => self.claim(now),
            Some(record) if !record.is_stale(now, timeout_ms) => {
                self.set_state(LeaderState::Follower)
            }
            Some(record) => {
                log::info!(
                    "[Leadership] Leader {} silent for {}ms, taking over",
                    record.owner_id,
                    now.saturating_sub(record.last_heartbeat_ms)
                );
                self.claim(now)
            }
            None => self.claim(now),
        }
    }

    /// Forces leadership onto this tab regardless of the current record.
    ///
    /// Other tabs demote themselves on their next heartbeat.
    pub fn request_handoff(&self) -> StorageResult<LeadershipStatus> {
        let now = self.clock.now_millis();
        log::info!("[Leadership] Hand-off requested by tab {}", self.tab_id);
        self.register.write(&LeadershipRecord {
            owner_id: self.tab_id.to_string(),
            last_heartbeat_ms: now,
        })?;
        self.last_heartbeat_ms.store(now, Ordering::SeqCst);
        Ok(self.set_state(LeaderState::Leader))
    }

    /// Gives up leadership on orderly shutdown so peers need not wait for the
    /// timeout.
    pub fn resign(&self) -> StorageResult<()> {
        if self.register.release(self.tab_id.as_str())? {
            log::info!("[Leadership] Tab {} resigned leadership", self.tab_id);
        }
        if self.status().state != LeaderState::Unknown {
            self.set_state(LeaderState::Follower);
        }
        Ok(())
    }

    fn claim(&self, now: u64) -> LeadershipStatus {
        let record = LeadershipRecord {
            owner_id: self.tab_id.to_string(),
            last_heartbeat_ms: now,
        };
        if let Err(e) = self.register.write(&record) {
            log::warn!("[Leadership] Failed to write heartbeat: {}", e);
            return self.status();
        }
        self.last_heartbeat_ms.store(now, Ordering::SeqCst);
        self.set_state(LeaderState::Leader)
    }

    fn set_state(&self, next: LeaderState) -> LeadershipStatus {
        let changed = self.status.send_if_modified(|status| {
            if status.state == next {
                return false;
            }
            if next == LeaderState::Leader {
                status.epoch += 1;
            }
            status.state = next;
            true
        });

        let status = self.status();
        if changed {
            log::info!(
                "[Leadership] Tab {} is now {:?} (epoch {})",
                self.tab_id,
                status.state,
                status.epoch
            );
            self.emitter.emit_leadership(LeadershipEvent::Changed {
                tab_id: self.tab_id.to_string(),
                state: status.state,
                epoch: status.epoch,
                timestamp: self.clock.now_millis(),
            });
        }
        status
    }

    /// Runs the heartbeat loop until cancelled, then resigns.
    ///
    /// The first heartbeat runs immediately.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::info!(
            "[Leadership] Tab {} started (heartbeat {}ms, timeout {}ms)",
            self.tab_id,
            self.heartbeat_interval.as_millis(),
            self.timeout.as_millis()
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.heartbeat();
                }
            }
        }

        if let Err(e) = self.resign() {
            log::warn!("[Leadership] Failed to resign: {}", e);
        }
        log::info!("[Leadership] Tab {} stopped", self.tab_id);
    }
}
