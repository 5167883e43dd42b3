//! Centralized error types for the Encore core library.
//!
//! This module provides a unified error handling system that:
//! - Gives every layer error a machine-readable code ([`ErrorCode`])
//! - Classifies failures into the coordinator's recovery taxonomy ([`FailureKind`])
//! - Defines the crate-wide [`EncoreError`] used at host-facing boundaries

use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::playback::PlaybackError;
use crate::provider::ProviderError;
use crate::storage::StorageError;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;
}

impl ErrorCode for StorageError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "storage_io_failed",
            Self::Encoding(_) => "storage_encoding_failed",
        }
    }
}

impl ErrorCode for AuthError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http_request_failed",
            Self::Rejected { .. } => "credentials_rejected",
            Self::HttpStatus(_, _) => "http_error_status",
            Self::InvalidGrant(_) => "invalid_grant",
        }
    }
}

impl ErrorCode for ProviderError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http_request_failed",
            Self::Unauthorized => "unauthorized",
            Self::DeviceNotFound(_) => "device_not_found",
            Self::RateLimited { .. } => "rate_limited",
            Self::HttpStatus(_, _) => "http_error_status",
            Self::Parse(_) => "provider_parse_error",
        }
    }
}

impl ErrorCode for PlaybackError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotLeader => "not_leader",
            Self::NoCredentials => "no_credentials",
            Self::DeviceNotReady => "device_not_ready",
            Self::HandoffTimedOut => "handoff_timed_out",
            Self::AuthenticationRequired => "authentication_required",
            Self::Superseded => "superseded",
            Self::Provider(e) => e.code(),
            Self::Storage(e) => e.code(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Failure taxonomy
// ─────────────────────────────────────────────────────────────────────────────

/// How a failure is recovered from.
///
/// Every asynchronous boundary in the coordinator converts its error into one of
/// these kinds; none of them propagate into the host's control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network hiccup: retry the call with backoff, no state change.
    Transient,
    /// Credentials rejected: clear them and ask the user to authorize again.
    AuthRejected,
    /// Device offline or provider unavailable: fall back to reconnecting.
    DeviceUnavailable,
    /// Two tabs briefly both leader: resolved by the next heartbeat, never reported.
    LeadershipRace,
    /// Anything else: reported to the host as a failed playback.
    Fatal,
}

impl From<&ProviderError> for FailureKind {
    fn from(err: &ProviderError) -> Self {
        if err.is_unauthorized() {
            FailureKind::AuthRejected
        } else if err.is_transient() {
            FailureKind::Transient
        } else if matches!(err, ProviderError::DeviceNotFound(_)) {
            FailureKind::DeviceUnavailable
        } else {
            FailureKind::Fatal
        }
    }
}

impl From<&AuthError> for FailureKind {
    fn from(err: &AuthError) -> Self {
        if err.is_permanent() {
            FailureKind::AuthRejected
        } else {
            FailureKind::Transient
        }
    }
}

impl From<&PlaybackError> for FailureKind {
    fn from(err: &PlaybackError) -> Self {
        match err {
            PlaybackError::Provider(e) => e.into(),
            PlaybackError::AuthenticationRequired | PlaybackError::NoCredentials => {
                FailureKind::AuthRejected
            }
            PlaybackError::DeviceNotReady | PlaybackError::HandoffTimedOut => {
                FailureKind::DeviceUnavailable
            }
            PlaybackError::NotLeader | PlaybackError::Superseded => FailureKind::LeadershipRace,
            PlaybackError::Storage(_) => FailureKind::Fatal,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Crate-wide error
// ─────────────────────────────────────────────────────────────────────────────

/// Application-wide error type for host-facing operations.
#[derive(Debug, Error)]
pub enum EncoreError {
    /// Shared storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Credential exchange failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Provider call failed.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Playback command failed.
    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    /// Configuration rejected by validation.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl EncoreError {
    /// Returns a machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Storage(e) => e.code(),
            Self::Auth(e) => e.code(),
            Self::Provider(e) => e.code(),
            Self::Playback(e) => e.code(),
            Self::Configuration(_) => "configuration_error",
        }
    }
}

/// Convenient Result alias for crate-wide operations.
pub type EncoreResult<T> = Result<T, EncoreError>;
