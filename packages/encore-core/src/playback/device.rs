//! Playback device state machine.
//!
//! All rules live in [`transition`], a pure function from the current state and
//! an input to the next state plus the effects the session must carry out. The
//! session owns the I/O; this module owns the decisions.

use serde::Serialize;

/// Readiness of this tab's playback device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum DeviceState {
    /// No connection.
    Disconnected,
    /// Connection open, waiting for the provider to register the device.
    Connecting,
    /// Registered; nothing observed playing yet.
    #[serde(rename_all = "camelCase")]
    Ready { device_id: String },
    /// Registered and currently the provider's playing device.
    #[serde(rename_all = "camelCase")]
    Active { device_id: String },
    /// Registered but playback is on another device (or stopped).
    #[serde(rename_all = "camelCase")]
    Inactive { device_id: String },
    /// Provider rejected the access token; connection closed until credentials
    /// are renewed.
    AuthError,
}

impl DeviceState {
    #[must_use]
    pub fn device_id(&self) -> Option<&str> {
        match self {
            DeviceState::Ready { device_id }
            | DeviceState::Active { device_id }
            | DeviceState::Inactive { device_id } => Some(device_id),
            _ => None,
        }
    }

    /// True when play commands can be sent.
    #[must_use]
    pub fn is_playable(&self) -> bool {
        self.device_id().is_some()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, DeviceState::Active { .. })
    }

    /// True while a provider connection is open.
    #[must_use]
    pub fn has_connection(&self) -> bool {
        matches!(self, DeviceState::Connecting) || self.is_playable()
    }
}

/// Something that happened to the device session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceInput {
    /// Leader with credentials: open a connection.
    Connect,
    ProviderReady { device_id: String },
    ProviderNotReady { device_id: String },
    InitializationFailed(String),
    AuthenticationFailed(String),
    AccountFailed(String),
    /// A state push arrived; `active` is whether this device is playing.
    PlaybackObserved { active: bool },
    LeadershipLost,
    Disconnect,
}

/// Work the session performs after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEffect {
    OpenConnection,
    CloseConnection,
    /// Make the device active without starting playback.
    TransferPlayback { device_id: String },
    RequestTokenRefresh,
    ScheduleReconnect,
    ReportUnavailable(String),
}

/// Next state and the effects to run, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: DeviceState,
    pub effects: Vec<DeviceEffect>,
}

impl Transition {
    fn stay(state: &DeviceState) -> Self {
        Self {
            next: state.clone(),
            effects: Vec::new(),
        }
    }

    fn to(next: DeviceState, effects: Vec<DeviceEffect>) -> Self {
        Self { next, effects }
    }
}

/// Applies one input. Inputs that make no sense in the current state (a late
/// event from a closed connection, a duplicate connect) leave it unchanged.
#[must_use]
pub fn transition(state: &DeviceState, input: DeviceInput) -> Transition {
    use DeviceEffect as E;
    use DeviceState as S;

    match input {
        DeviceInput::Connect => match state {
            S::Disconnected | S::AuthError => Transition::to(S::Connecting, vec![E::OpenConnection]),
            _ => Transition::stay(state),
        },

        DeviceInput::ProviderReady { device_id } if state.has_connection() => {
            Transition::to(
                S::Ready {
                    device_id: device_id.clone(),
                },
                vec![E::TransferPlayback { device_id }],
            )
        }

        DeviceInput::ProviderNotReady { device_id } if state.device_id() == Some(device_id.as_str()) => {
            Transition::to(S::Connecting, Vec::new())
        }

        DeviceInput::InitializationFailed(_) if state.has_connection() => Transition::to(
            S::Disconnected,
            vec![E::CloseConnection, E::ScheduleReconnect],
        ),

        DeviceInput::AuthenticationFailed(_) if state.has_connection() => Transition::to(
            S::AuthError,
            vec![E::CloseConnection, E::RequestTokenRefresh],
        ),

        DeviceInput::AccountFailed(reason) if state.has_connection() => Transition::to(
            S::Disconnected,
            vec![E::CloseConnection, E::ReportUnavailable(reason)],
        ),

        DeviceInput::PlaybackObserved { active } => match state.device_id() {
            Some(id) => {
                let device_id = id.to_string();
                let next = if active {
                    S::Active { device_id }
                } else {
                    S::Inactive { device_id }
                };
                Transition::to(next, Vec::new())
            }
            None => Transition::stay(state),
        },

        DeviceInput::LeadershipLost | DeviceInput::Disconnect => {
            let effects = if state.has_connection() {
                vec![E::CloseConnection]
            } else {
                Vec::new()
            };
            Transition::to(S::Disconnected, effects)
        }

        _ => Transition::stay(state),
    }
}
