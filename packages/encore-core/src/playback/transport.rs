//! Position and transport model.
//!
//! Two clocks feed the displayed position: authoritative provider pushes and a
//! local estimate advanced by the position tick. [`TransportModel::apply_push`]
//! is the single place where they are reconciled, and it does nothing while a
//! seek is pending, so the seeking guard is not repeated at every call site.

use serde::Serialize;

use crate::provider::{PlayerStatePush, TrackInfo};

/// Progress of a user-initiated seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum SeekPhase {
    Idle,
    /// Slider held; position follows the drag only.
    Dragging,
    /// Seek sent to the provider, waiting for acknowledgement.
    #[serde(rename_all = "camelCase")]
    Committing { target_ms: u64 },
}

/// Transport state as observed by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportSnapshot {
    pub track: Option<TrackInfo>,
    pub paused: bool,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub seek: SeekPhase,
}

impl TransportSnapshot {
    #[must_use]
    pub fn is_seeking(&self) -> bool {
        self.seek != SeekPhase::Idle
    }
}

/// Playback state of one device session.
#[derive(Debug, Clone)]
pub struct TransportModel {
    track: Option<TrackInfo>,
    paused: bool,
    position_ms: u64,
    duration_ms: u64,
    seek: SeekPhase,
    /// Instant of the last push or tick, for wall-clock interpolation.
    last_tick_ms: Option<u64>,
}

impl Default for TransportModel {
    fn default() -> Self {
        Self {
            track: None,
            paused: true,
            position_ms: 0,
            duration_ms: 0,
            seek: SeekPhase::Idle,
            last_tick_ms: None,
        }
    }
}

impl TransportModel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> TransportSnapshot {
        TransportSnapshot {
            track: self.track.clone(),
            paused: self.paused,
            position_ms: self.position_ms,
            duration_ms: self.duration_ms,
            seek: self.seek,
        }
    }

    #[must_use]
    pub fn is_seeking(&self) -> bool {
        self.seek != SeekPhase::Idle
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    #[must_use]
    pub fn position_ms(&self) -> u64 {
        self.position_ms
    }

    /// Applies an authoritative push. Returns false (and changes nothing) while
    /// a seek is pending. An empty push means this device is not playing and
    /// carries no state to apply.
    pub fn apply_push(&mut self, push: Option<&PlayerStatePush>, now_ms: u64) -> bool {
        if self.is_seeking() {
            return false;
        }
        let Some(push) = push else {
            return false;
        };

        self.track = push.track.clone();
        self.paused = push.paused;
        self.duration_ms = push.duration_ms;
        self.position_ms = push.position_ms.min(push.duration_ms);
        self.last_tick_ms = Some(now_ms);
        true
    }

    /// Advances the local estimate by the wall-clock time since the last push
    /// or tick. Only moves while the device is active, playing and not seeking;
    /// never past the duration. Returns whether the position changed.
    pub fn tick(&mut self, now_ms: u64, device_active: bool) -> bool {
        let last = self.last_tick_ms.replace(now_ms);
        if !device_active || self.paused || self.is_seeking() {
            return false;
        }
        let Some(last) = last else {
            return false;
        };

        let next = self
            .position_ms
            .saturating_add(now_ms.saturating_sub(last))
            .min(self.duration_ms);
        let changed = next != self.position_ms;
        self.position_ms = next;
        changed
    }

    /// Slider grabbed.
    pub fn begin_seek(&mut self) {
        self.seek = SeekPhase::Dragging;
    }

    /// Slider moved. Ignored unless dragging.
    pub fn drag_seek(&mut self, position_ms: u64) {
        if self.seek == SeekPhase::Dragging {
            self.position_ms = position_ms.min(self.duration_ms);
        }
    }

    /// Slider released: shows the target and waits for acknowledgement.
    /// Returns the clamped target to send to the provider.
    pub fn commit_seek(&mut self, target_ms: u64) -> u64 {
        let target_ms = target_ms.min(self.duration_ms);
        self.position_ms = target_ms;
        self.seek = SeekPhase::Committing { target_ms };
        target_ms
    }

    /// Provider acknowledged the seek; pushes regain authority.
    pub fn seek_acknowledged(&mut self, target_ms: u64, now_ms: u64) {
        if self.seek == (SeekPhase::Committing { target_ms }) {
            self.seek = SeekPhase::Idle;
            self.position_ms = target_ms;
            self.last_tick_ms = Some(now_ms);
        }
    }

    /// Seek command failed; pushes regain authority and correct the position.
    pub fn seek_failed(&mut self) {
        if matches!(self.seek, SeekPhase::Committing { .. }) {
            self.seek = SeekPhase::Idle;
        }
    }

    /// Sets the track identity right after a play command, until the next push
    /// supplies the real metadata.
    pub fn set_pending_track(&mut self, uri: &str) {
        self.track = Some(TrackInfo::pending(uri));
    }

    /// Forgets everything (device closed).
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
