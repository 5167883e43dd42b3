//! Event system for observing the coordinator from the host application.
//!
//! This module provides:
//! - [`EventEmitter`] trait for coordinator components to emit events
//! - [`BroadcastEventBridge`] for fan-out to any number of host subscribers
//! - Event types for each component (leadership, device session, auth, transport)

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::leadership::LeaderState;
use crate::playback::device::DeviceState;
use crate::playback::transport::TransportSnapshot;

/// Events broadcast to host subscribers.
///
/// Each category has its own inner event type with specific variants.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Tab leadership changes.
    Leadership(LeadershipEvent),

    /// Playback device session changes.
    Session(SessionEvent),

    /// Credential lifecycle.
    Auth(AuthEvent),

    /// Position and transport state.
    Transport(TransportEvent),
}

/// Events related to tab leadership.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LeadershipEvent {
    /// This tab's leadership state changed.
    Changed {
        /// Identifier of this tab.
        #[serde(rename = "tabId")]
        tab_id: String,
        /// New leadership state.
        state: LeaderState,
        /// Leadership epoch (increments each time this tab becomes leader).
        epoch: u64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Events related to the playback device session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// Device session moved to a new state.
    DeviceStateChanged {
        /// New device state.
        state: DeviceState,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A play command was accepted by the provider.
    PlaybackStarted {
        /// The URI that was played.
        uri: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A play command failed after retries.
    PlaybackFailed {
        /// The URI that failed to play.
        uri: String,
        /// Error message describing the failure.
        error: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The device could not be brought up within the attempt budget.
    PlaybackUnavailable {
        /// Human-readable reason.
        reason: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Events related to session credentials.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AuthEvent {
    /// Access token was renewed.
    TokenRefreshed {
        /// New expiry (Unix milliseconds).
        #[serde(rename = "expiresAtMs")]
        expires_at_ms: u64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A refresh failed transiently and will be retried.
    RefreshDeferred {
        /// When the retry is due (Unix milliseconds).
        #[serde(rename = "retryAtMs")]
        retry_at_ms: u64,
        /// Error message describing the failure.
        error: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// Credentials were rejected; the user must authorize again.
    ReauthenticationRequired {
        /// Human-readable reason.
        reason: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Events related to playback position and transport.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransportEvent {
    /// Display-relevant transport state changed.
    Updated {
        /// Current transport snapshot.
        snapshot: TransportSnapshot,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

// From implementations for converting inner events to BroadcastEvent
impl From<LeadershipEvent> for BroadcastEvent {
    fn from(event: LeadershipEvent) -> Self {
        BroadcastEvent::Leadership(event)
    }
}

impl From<SessionEvent> for BroadcastEvent {
    fn from(event: SessionEvent) -> Self {
        BroadcastEvent::Session(event)
    }
}

impl From<AuthEvent> for BroadcastEvent {
    fn from(event: AuthEvent) -> Self {
        BroadcastEvent::Auth(event)
    }
}

impl From<TransportEvent> for BroadcastEvent {
    fn from(event: TransportEvent) -> Self {
        BroadcastEvent::Transport(event)
    }
}
