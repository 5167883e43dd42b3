//! Event emitter abstraction for decoupling components from delivery.
//!
//! Components depend on the [`EventEmitter`] trait rather than concrete broadcast
//! channels, enabling testing and alternative delivery mechanisms.

use super::{AuthEvent, LeadershipEvent, SessionEvent, TransportEvent};

/// Trait for emitting domain events without knowledge of delivery.
pub trait EventEmitter: Send + Sync {
    /// Emits a leadership event.
    fn emit_leadership(&self, event: LeadershipEvent);

    /// Emits a device session event.
    fn emit_session(&self, event: SessionEvent);

    /// Emits a credential lifecycle event.
    fn emit_auth(&self, event: AuthEvent);

    /// Emits a transport event.
    fn emit_transport(&self, event: TransportEvent);
}

/// No-op emitter for headless use or testing.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_leadership(&self, _event: LeadershipEvent) {}

    fn emit_session(&self, _event: SessionEvent) {}

    fn emit_auth(&self, _event: AuthEvent) {}

    fn emit_transport(&self, _event: TransportEvent) {}
}

/// Logging emitter for debugging and development.
///
/// Transport updates arrive on every position tick, so they are logged at
/// trace level; everything else at debug.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_leadership(&self, event: LeadershipEvent) {
        tracing::debug!(?event, "leadership_event");
    }

    fn emit_session(&self, event: SessionEvent) {
        tracing::debug!(?event, "session_event");
    }

    fn emit_auth(&self, event: AuthEvent) {
        tracing::debug!(?event, "auth_event");
    }

    fn emit_transport(&self, event: TransportEvent) {
        tracing::trace!(?event, "transport_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::leadership::LeaderState;

    /// Test emitter that counts events.
    struct CountingEventEmitter {
        leadership_count: AtomicUsize,
        auth_count: AtomicUsize,
    }

    impl EventEmitter for CountingEventEmitter {
        fn emit_leadership(&self, _event: LeadershipEvent) {
            self.leadership_count.fetch_add(1, Ordering::SeqCst);
        }

        fn emit_session(&self, _event: SessionEvent) {}

        fn emit_auth(&self, _event: AuthEvent) {
            self.auth_count.fetch_add(1, Ordering::SeqCst);
        }

        fn emit_transport(&self, _event: TransportEvent) {}
    }

    #[test]
    fn counting_emitter_tracks_events() {
        let emitter = Arc::new(CountingEventEmitter {
            leadership_count: AtomicUsize::new(0),
            auth_count: AtomicUsize::new(0),
        });

        emitter.emit_leadership(LeadershipEvent::Changed {
            tab_id: "tab-a".to_string(),
            state: LeaderState::Leader,
            epoch: 1,
            timestamp: 0,
        });
        emitter.emit_auth(AuthEvent::ReauthenticationRequired {
            reason: "rejected".to_string(),
            timestamp: 0,
        });
        emitter.emit_auth(AuthEvent::TokenRefreshed {
            expires_at_ms: 10,
            timestamp: 0,
        });

        assert_eq!(emitter.leadership_count.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.auth_count.load(Ordering::SeqCst), 2);
    }
}
