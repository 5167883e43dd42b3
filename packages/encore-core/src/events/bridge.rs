//! Bridge implementation that maps domain events to a broadcast channel.
//!
//! The [`BroadcastEventBridge`] lives at the boundary between the coordinator and
//! the host application, fanning typed domain events out to every subscriber
//! (display layer, logging, the tab binary's status printer).

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use super::emitter::EventEmitter;
use super::{AuthEvent, BroadcastEvent, LeadershipEvent, SessionEvent, TransportEvent};

/// Bridges domain events to a `tokio::sync::broadcast` channel.
///
/// The bridge also forwards to an optional external emitter that can be set
/// after construction (e.g. a [`LoggingEventEmitter`](super::LoggingEventEmitter)).
#[derive(Clone)]
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<BroadcastEvent>,
    /// Optional external emitter for additional delivery
    external_emitter: Arc<RwLock<Option<Arc<dyn EventEmitter>>>>,
}

impl BroadcastEventBridge {
    /// Creates a new bridge with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            external_emitter: Arc::new(RwLock::new(None)),
        }
    }

    /// Sets an external emitter that receives every event before broadcast.
    pub fn set_external_emitter(&self, emitter: Arc<dyn EventEmitter>) {
        *self.external_emitter.write() = Some(emitter);
    }

    /// Returns a new receiver for the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }

    /// Returns the broadcast channel as a `Stream`.
    ///
    /// Lagged subscribers see a `BroadcastStreamRecvError::Lagged` item and then
    /// continue with the newest events.
    pub fn stream(&self) -> BroadcastStream<BroadcastEvent> {
        BroadcastStream::new(self.tx.subscribe())
    }
}

/// Generates an [`EventEmitter`] method that forwards to the external emitter
/// (if set) and then sends to the broadcast channel.
macro_rules! impl_emit {
    ($method:ident, $event_ty:ty, $variant:ident) => {
        fn $method(&self, event: $event_ty) {
            if let Some(ref emitter) = *self.external_emitter.read() {
                emitter.$method(event.clone());
            }
            if let Err(e) = self.tx.send(BroadcastEvent::$variant(event)) {
                log::trace!("[EventBridge] No broadcast receivers: {}", e);
            }
        }
    };
}

impl EventEmitter for BroadcastEventBridge {
    impl_emit!(emit_leadership, LeadershipEvent, Leadership);
    impl_emit!(emit_session, SessionEvent, Session);
    impl_emit!(emit_auth, AuthEvent, Auth);
    impl_emit!(emit_transport, TransportEvent, Transport);
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let bridge = BroadcastEventBridge::new(8);
        let mut rx = bridge.subscribe();
        let mut stream = bridge.stream();

        bridge.emit_auth(AuthEvent::ReauthenticationRequired {
            reason: "rejected".to_string(),
            timestamp: 42,
        });

        match rx.recv().await.unwrap() {
            BroadcastEvent::Auth(AuthEvent::ReauthenticationRequired { timestamp, .. }) => {
                assert_eq!(timestamp, 42)
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            stream.next().await,
            Some(Ok(BroadcastEvent::Auth(_)))
        ));
    }

    #[test]
    fn emitting_without_subscribers_does_not_panic() {
        let bridge = BroadcastEventBridge::new(1);
        bridge.emit_session(SessionEvent::PlaybackUnavailable {
            reason: "offline".to_string(),
            timestamp: 0,
        });
    }

    #[test]
    fn events_serialize_with_category_tag() {
        let event: BroadcastEvent = AuthEvent::TokenRefreshed {
            expires_at_ms: 99,
            timestamp: 1,
        }
        .into();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["category"], "auth");
        assert_eq!(json["type"], "tokenRefreshed");
        assert_eq!(json["expiresAtMs"], 99);
    }
}
