//! Proactive access-token renewal.
//!
//! The scheduler keeps one one-shot timer armed for `expires_at - safety_margin`
//! and re-plans whenever credentials change. Shared storage is polled as well,
//! so credentials stored or renewed by another tab arm this tab's timer even if
//! that tab has since closed. When the timer fires it re-reads the store first;
//! only credentials that are still due are refreshed.
//!
//! Outcomes:
//! - success replaces the credentials and re-arms against the new expiry
//! - a rejected grant clears the store and emits `ReauthenticationRequired`
//! - any other failure re-arms for the short retry interval

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::accounts::TokenEndpoint;
use super::token_store::{SessionCredentials, TokenStore};
use crate::clock::Clock;
use crate::events::{AuthEvent, EventEmitter};

/// When the next refresh is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPlan {
    /// No credentials: nothing to refresh, no timer armed.
    Idle,
    /// Already inside the safety margin (or expired): refresh now.
    Immediate,
    /// Refresh at this instant (Unix milliseconds).
    At(u64),
}

/// Computes the refresh plan for the given credentials.
#[must_use]
pub fn plan_refresh(
    creds: Option<&SessionCredentials>,
    now_ms: u64,
    safety_margin: Duration,
) -> RefreshPlan {
    let Some(creds) = creds else {
        return RefreshPlan::Idle;
    };
    let refresh_at = creds
        .expires_at_ms
        .saturating_sub(safety_margin.as_millis() as u64);
    if refresh_at <= now_ms {
        RefreshPlan::Immediate
    } else {
        RefreshPlan::At(refresh_at)
    }
}

/// Result of one refresh attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New credentials stored.
    Refreshed { expires_at_ms: u64 },
    /// Another refresh is already running in this tab; nothing was sent.
    InFlight,
    /// Store is empty; nothing was sent.
    NoCredentials,
    /// Grant rejected; the store was cleared.
    ReauthRequired,
    /// Transient failure; retry armed.
    RetryScheduled { retry_at_ms: u64 },
}

/// Resets the in-flight flag and wakes the scheduler loop, even if the refresh
/// future is dropped mid-request.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
    done: &'a Notify,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
        self.done.notify_one();
    }
}

/// Renews credentials ahead of expiry. One per tab.
pub struct RefreshScheduler {
    store: Arc<TokenStore>,
    endpoint: Arc<dyn TokenEndpoint>,
    clock: Arc<dyn Clock>,
    emitter: Arc<dyn EventEmitter>,
    safety_margin: Duration,
    retry_interval: Duration,
    /// How often shared storage is re-read for other tabs' writes.
    poll_interval: Duration,
    in_flight: AtomicBool,
    /// Pending retry after a transient failure; postpones an `Immediate` plan.
    retry_at: Mutex<Option<u64>>,
    wake: Notify,
}

impl RefreshScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<TokenStore>,
        endpoint: Arc<dyn TokenEndpoint>,
        clock: Arc<dyn Clock>,
        emitter: Arc<dyn EventEmitter>,
        safety_margin: Duration,
        retry_interval: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            endpoint,
            clock,
            emitter,
            safety_margin,
            retry_interval,
            poll_interval,
            in_flight: AtomicBool::new(false),
            retry_at: Mutex::new(None),
            wake: Notify::new(),
        }
    }

    /// Performs one refresh now. Serialized per tab: returns
    /// [`RefreshOutcome::InFlight`] without calling the endpoint when another
    /// refresh is running.
    pub async fn refresh_now(&self) -> RefreshOutcome {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            log::debug!("[TokenRefresh] Refresh already in flight, skipping");
            return RefreshOutcome::InFlight;
        }
        let _guard = InFlightGuard {
            flag: &self.in_flight,
            done: &self.wake,
        };

        let creds = match self.store.get() {
            Ok(Some(creds)) => creds,
            Ok(None) => {
                log::debug!("[TokenRefresh] No credentials to refresh");
                return RefreshOutcome::NoCredentials;
            }
            Err(e) => return self.defer(format!("storage read failed: {}", e)),
        };

        log::info!("[TokenRefresh] Refreshing access token");

        match self.endpoint.refresh(&creds.refresh_token).await {
            Ok(grant) => {
                let now = self.clock.now_millis();
                let Some(next) =
                    SessionCredentials::from_grant(&grant, Some(&creds.refresh_token), now)
                else {
                    return self.defer("grant carried no refresh token".to_string());
                };
                if let Err(e) = self.store.set(&next) {
                    return self.defer(format!("storage write failed: {}", e));
                }
                *self.retry_at.lock() = None;
                log::info!(
                    "[TokenRefresh] Token refreshed, valid for {}s",
                    next.expires_at_ms.saturating_sub(now) / 1000
                );
                self.emitter.emit_auth(AuthEvent::TokenRefreshed {
                    expires_at_ms: next.expires_at_ms,
                    timestamp: now,
                });
                RefreshOutcome::Refreshed {
                    expires_at_ms: next.expires_at_ms,
                }
            }
            Err(e) if e.is_permanent() => {
                log::warn!("[TokenRefresh] Refresh rejected, clearing session: {}", e);
                if let Err(clear_err) = self.store.clear() {
                    log::error!("[TokenRefresh] Failed to clear credentials: {}", clear_err);
                }
                *self.retry_at.lock() = None;
                self.emitter.emit_auth(AuthEvent::ReauthenticationRequired {
                    reason: e.to_string(),
                    timestamp: self.clock.now_millis(),
                });
                RefreshOutcome::ReauthRequired
            }
            Err(e) => self.defer(e.to_string()),
        }
    }

    fn defer(&self, error: String) -> RefreshOutcome {
        let now = self.clock.now_millis();
        let retry_at_ms = now.saturating_add(self.retry_interval.as_millis() as u64);
        log::warn!(
            "[TokenRefresh] Refresh failed, retrying in {}s: {}",
            self.retry_interval.as_secs(),
            error
        );
        *self.retry_at.lock() = Some(retry_at_ms);
        self.emitter.emit_auth(AuthEvent::RefreshDeferred {
            retry_at_ms,
            error,
            timestamp: now,
        });
        RefreshOutcome::RetryScheduled { retry_at_ms }
    }

    /// Returns when the next refresh is due, or `None` to stay idle.
    fn next_due(&self, now: u64) -> Option<u64> {
        let creds = match self.store.get() {
            Ok(creds) => creds,
            Err(e) => {
                log::warn!("[TokenRefresh] Failed to read credentials: {}", e);
                return Some(now.saturating_add(self.retry_interval.as_millis() as u64));
            }
        };

        let mut retry_at = self.retry_at.lock();
        match plan_refresh(creds.as_ref(), now, self.safety_margin) {
            RefreshPlan::Idle => {
                *retry_at = None;
                None
            }
            RefreshPlan::At(at) => {
                *retry_at = None;
                Some(at)
            }
            RefreshPlan::Immediate => Some(retry_at.unwrap_or(now)),
        }
    }

    /// Runs the scheduling loop until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut changes = self.store.subscribe();
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        log::info!(
            "[TokenRefresh] Scheduler started (safety margin {}s)",
            self.safety_margin.as_secs()
        );

        loop {
            let now = self.clock.now_millis();
            let due = self.next_due(now);

            if let Some(at) = due.filter(|at| *at <= now) {
                log::debug!("[TokenRefresh] Refresh due (at {})", at);
                if self.refresh_now().await == RefreshOutcome::InFlight {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = self.wake.notified() => {}
                    }
                }
                continue;
            }

            let sleep_for = due.map(|at| Duration::from_millis(at.saturating_sub(now)));
            if let Some(d) = sleep_for {
                log::debug!("[TokenRefresh] Next refresh in {}s", d.as_secs());
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = changes.changed() => {}
                _ = self.wake.notified() => {}
                _ = poll.tick() => {
                    if let Err(e) = self.store.sync() {
                        log::debug!("[TokenRefresh] Failed to poll credentials: {}", e);
                    }
                }
                _ = async {
                    match sleep_for {
                        Some(d) => tokio::time::sleep(d).await,
                        None => std::future::pending::<()>().await,
                    }
                } => {}
            }
        }

        log::info!("[TokenRefresh] Scheduler stopped");
    }
}
