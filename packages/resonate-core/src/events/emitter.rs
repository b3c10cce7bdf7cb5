//! Event emitter abstraction for decoupling services from transport.
//!
//! Services depend on the [`EventEmitter`] trait rather than concrete broadcast
//! channels, enabling testing and alternative transport implementations.

use super::{ClientProxyEvent, GroupEvent, ReceiverEvent, SessionEvent};

/// Trait for emitting domain events without knowledge of transport.
///
/// Services use this trait to emit events, decoupling them from the
/// specifics of how events are delivered to subscribers (WebSocket handler
/// loops, tests, logging).
pub trait EventEmitter: Send + Sync {
    /// Emits an event from a server-side client proxy.
    fn emit_client_proxy(&self, event: ClientProxyEvent);

    /// Emits an event from the group manager.
    fn emit_group(&self, event: GroupEvent);

    /// Emits an event from a receiver client state machine.
    fn emit_receiver(&self, event: ReceiverEvent);

    /// Emits an event from an active session's per-client event binding.
    fn emit_session(&self, event: SessionEvent);
}

/// No-op emitter for testing.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_client_proxy(&self, _event: ClientProxyEvent) {}
    fn emit_group(&self, _event: GroupEvent) {}
    fn emit_receiver(&self, _event: ReceiverEvent) {}
    fn emit_session(&self, _event: SessionEvent) {}
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_client_proxy(&self, event: ClientProxyEvent) {
        tracing::debug!(?event, "client_proxy_event");
    }

    fn emit_group(&self, event: GroupEvent) {
        tracing::debug!(?event, "group_event");
    }

    fn emit_receiver(&self, event: ReceiverEvent) {
        tracing::debug!(?event, "receiver_event");
    }

    fn emit_session(&self, event: SessionEvent) {
        tracing::debug!(?event, "session_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Test emitter that counts events.
    struct CountingEventEmitter {
        client_proxy_count: AtomicUsize,
        group_count: AtomicUsize,
    }

    impl CountingEventEmitter {
        fn new() -> Self {
            Self {
                client_proxy_count: AtomicUsize::new(0),
                group_count: AtomicUsize::new(0),
            }
        }
    }

    impl EventEmitter for CountingEventEmitter {
        fn emit_client_proxy(&self, _event: ClientProxyEvent) {
            self.client_proxy_count.fetch_add(1, Ordering::SeqCst);
        }

        fn emit_group(&self, _event: GroupEvent) {
            self.group_count.fetch_add(1, Ordering::SeqCst);
        }

        fn emit_receiver(&self, _event: ReceiverEvent) {}
        fn emit_session(&self, _event: SessionEvent) {}
    }

    #[test]
    fn counting_emitter_tracks_events() {
        let emitter = Arc::new(CountingEventEmitter::new());

        emitter.emit_client_proxy(ClientProxyEvent::Close {
            client_id: "c1".into(),
        });
        emitter.emit_client_proxy(ClientProxyEvent::Hello {
            client_id: "c1".into(),
            info: crate::model::PlayerInfo {
                player_id: "c1".into(),
                name: "test".into(),
                role: "speaker".into(),
                buffer_capacity: 0,
                supported_codecs: vec![],
                supported_channels: vec![],
                supported_sample_rates: vec![],
                supported_bit_depths: vec![],
                supported_stream_types: vec![],
                supported_picture_formats: vec![],
                display_width: None,
                display_height: None,
            },
        });
        emitter.emit_group(GroupEvent::ClientAdded {
            group_id: "g1".into(),
            client_id: "c1".into(),
        });

        assert_eq!(emitter.client_proxy_count.load(Ordering::SeqCst), 2);
        assert_eq!(emitter.group_count.load(Ordering::SeqCst), 1);
    }
}
