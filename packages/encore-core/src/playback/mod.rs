//! The playback device session and everything that drives it.
//!
//! - [`device`]: the device state machine
//! - [`transport`]: position interpolation and seeking
//! - [`session`]: the per-tab actor that owns the provider connection
//! - [`router`]: turns play requests into hand-off plus provider calls

pub mod device;
pub mod router;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_fixtures;

use serde::Serialize;
use thiserror::Error;

use crate::leadership::LeaderState;
use crate::provider::ProviderError;
use crate::storage::StorageError;
use crate::utils::format_time;

pub use device::{transition, DeviceEffect, DeviceInput, DeviceState, Transition};
pub use router::{PlayRequest, PlaybackRouter};
pub use session::{DeviceSession, SessionConfig};
pub use transport::{SeekPhase, TransportModel, TransportSnapshot};

/// Errors returned by playback commands.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("playback is active in another tab")]
    NotLeader,

    #[error("no session credentials")]
    NoCredentials,

    #[error("playback device is not ready")]
    DeviceNotReady,

    #[error("timed out waiting for leadership and a ready device")]
    HandoffTimedOut,

    /// The access token expired or was rejected; a refresh was requested.
    #[error("access token expired or rejected, renewing session")]
    AuthenticationRequired,

    /// Leadership moved while the command was in flight; its result was dropped.
    #[error("leadership changed before the command completed")]
    Superseded,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// What the user should be told, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UserNotice {
    /// No valid session: prompt to connect the account.
    ConnectAccount,
    /// Device not ready yet.
    PlayerInitializing,
    /// Playback failed after retries, or the device is unavailable.
    PlaybackFailed,
    /// Another tab holds the device.
    ActiveInAnotherTab,
    None,
}

impl UserNotice {
    /// Derives the notice from the session's observable state. Earlier checks
    /// win: missing credentials hide every other problem.
    #[must_use]
    pub fn derive(
        has_credentials: bool,
        leader: LeaderState,
        device: &DeviceState,
        failed: bool,
    ) -> Self {
        if !has_credentials {
            return UserNotice::ConnectAccount;
        }
        match leader {
            LeaderState::Follower => return UserNotice::ActiveInAnotherTab,
            LeaderState::Unknown => return UserNotice::PlayerInitializing,
            LeaderState::Leader => {}
        }
        if failed {
            return UserNotice::PlaybackFailed;
        }
        if device.is_playable() {
            UserNotice::None
        } else {
            UserNotice::PlayerInitializing
        }
    }

    #[must_use]
    pub fn message(&self) -> Option<&'static str> {
        match self {
            UserNotice::ConnectAccount => Some("Connect your account to listen"),
            UserNotice::PlayerInitializing => Some("Player initializing..."),
            UserNotice::PlaybackFailed => Some("Playback failed, retry"),
            UserNotice::ActiveInAnotherTab => Some("Playback is active in another tab"),
            UserNotice::None => None,
        }
    }
}

/// Everything the host needs to render the player.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayState {
    pub notice: UserNotice,
    pub leader: LeaderState,
    pub device: DeviceState,
    pub transport: TransportSnapshot,
    /// Device volume (0.0 - 1.0).
    pub volume: f32,
}

impl DisplayState {
    /// `"m:ss / m:ss"`.
    #[must_use]
    pub fn progress_label(&self) -> String {
        format!(
            "{} / {}",
            format_time(self.transport.position_ms),
            format_time(self.transport.duration_ms)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> DeviceState {
        DeviceState::Ready {
            device_id: "dev".into(),
        }
    }

    #[test]
    fn notice_precedence() {
        assert_eq!(
            UserNotice::derive(false, LeaderState::Leader, &ready(), true),
            UserNotice::ConnectAccount
        );
        assert_eq!(
            UserNotice::derive(true, LeaderState::Follower, &ready(), false),
            UserNotice::ActiveInAnotherTab
        );
        assert_eq!(
            UserNotice::derive(true, LeaderState::Leader, &ready(), true),
            UserNotice::PlaybackFailed
        );
        assert_eq!(
            UserNotice::derive(true, LeaderState::Leader, &DeviceState::Connecting, false),
            UserNotice::PlayerInitializing
        );
        assert_eq!(
            UserNotice::derive(true, LeaderState::Leader, &ready(), false),
            UserNotice::None
        );
        assert_eq!(UserNotice::None.message(), None);
    }

    #[test]
    fn progress_label_formats_both_times() {
        let display = DisplayState {
            notice: UserNotice::None,
            leader: LeaderState::Leader,
            device: ready(),
            transport: TransportSnapshot {
                track: None,
                paused: false,
                position_ms: 65_000,
                duration_ms: 200_000,
                seek: SeekPhase::Idle,
            },
            volume: 0.5,
        };
        assert_eq!(display.progress_label(), "1:05 / 3:20");
    }
}
