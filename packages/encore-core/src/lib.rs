//! Encore Core - playback session coordination for Encore.
//!
//! Several open tabs of the same app share one browser-side storage area and one
//! account with the music provider, but only one of them may own the playback
//! device at a time. This crate keeps them in agreement.
//!
//! # Architecture
//!
//! - [`leadership`]: last-write-wins tab leadership with heartbeats and hand-off
//! - [`auth`]: shared token store, credential exchange and the refresh scheduler
//! - [`playback`]: device state machine, position model, session actor and router
//! - [`provider`]: the provider's Web API and device connection
//! - [`storage`]: the storage area shared by all tabs
//! - [`events`]: domain events fanned out to subscribers
//! - [`bootstrap`]: composition root wiring one tab together
//!
//! # Abstraction Traits
//!
//! Platform pieces are traits so hosts and tests can supply their own:
//!
//! - [`SharedStorage`](storage::SharedStorage): cross-tab key/value storage
//! - [`TokenEndpoint`](auth::TokenEndpoint): refresh-token exchange
//! - [`DeviceConnector`](provider::DeviceConnector): playback device registration
//! - [`PlaybackApi`](provider::PlaybackApi): remote-control commands
//! - [`Clock`](clock::Clock): wall-clock time
//! - [`EventEmitter`](events::EventEmitter): emitting domain events

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod leadership;
pub mod playback;
pub mod protocol_constants;
pub mod provider;
pub mod storage;
pub mod utils;

// Re-export commonly used types at the crate root
pub use auth::{
    AccountsClient, AuthError, ProxyTokenEndpoint, RefreshScheduler, SessionCredentials,
    TokenEndpoint, TokenStore,
};
pub use clock::{Clock, SystemClock};
pub use config::CoordinatorConfig;
pub use error::{EncoreError, EncoreResult, ErrorCode, FailureKind};
pub use events::{
    AuthEvent, BroadcastEvent, BroadcastEventBridge, EventEmitter, LeadershipEvent,
    LoggingEventEmitter, NoopEventEmitter, SessionEvent, TransportEvent,
};
pub use leadership::{LeaderState, LeadershipStatus, TabCoordinator, TabId};
pub use playback::{
    DeviceSession, DeviceState, DisplayState, PlayRequest, PlaybackError, PlaybackRouter,
    TransportSnapshot, UserNotice,
};
pub use provider::{
    DeviceConnector, DeviceEvent, PlaybackApi, ProviderError, RemoteDeviceConnector, WebApiClient,
};
pub use storage::{FileStorage, MemoryStorage, SharedStorage, StorageError};
pub use utils::{format_time, now_millis};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_tab, TabDependencies, TabServices};
