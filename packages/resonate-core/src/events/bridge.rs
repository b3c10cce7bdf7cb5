//! Bridge implementation that maps domain events to broadcast transport.
//!
//! The [`BroadcastEventBridge`] lives at the boundary between domain services
//! and transport concerns, fanning typed domain events out to every
//! subscriber of a `tokio::sync::broadcast` channel.

use tokio::sync::broadcast;

use super::emitter::EventEmitter;
use super::{BroadcastEvent, ClientProxyEvent, GroupEvent, ReceiverEvent, SessionEvent};

/// Bridges domain events to a broadcast channel.
///
/// This adapter implements [`EventEmitter`] by forwarding events to a
/// `tokio::sync::broadcast` channel. WebSocket handlers, the group manager,
/// and tests all subscribe to the same channel.
///
/// # Thread Safety
///
/// The bridge is `Send + Sync` and can be shared across async tasks; cloning
/// it clones the underlying sender handle.
#[derive(Clone)]
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<BroadcastEvent>,
}

impl BroadcastEventBridge {
    /// Creates a new bridge with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Creates a new bridge wrapping an existing broadcast sender.
    pub fn with_sender(tx: broadcast::Sender<BroadcastEvent>) -> Self {
        Self { tx }
    }

    /// Returns a new receiver for the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }

    /// Returns a reference to the broadcast sender.
    pub fn sender(&self) -> &broadcast::Sender<BroadcastEvent> {
        &self.tx
    }
}

/// Generates an [`EventEmitter`] method that sends to the broadcast channel,
/// tolerating the no-receivers case.
macro_rules! impl_emit {
    ($method:ident, $event_ty:ty, $variant:ident) => {
        fn $method(&self, event: $event_ty) {
            if let Err(e) = self.tx.send(BroadcastEvent::$variant(event)) {
                log::trace!("[EventBridge] No broadcast receivers: {}", e);
            }
        }
    };
}

impl EventEmitter for BroadcastEventBridge {
    impl_emit!(emit_client_proxy, ClientProxyEvent, ClientProxy);
    impl_emit!(emit_group, GroupEvent, Group);
    impl_emit!(emit_receiver, ReceiverEvent, Receiver);
    impl_emit!(emit_session, SessionEvent, Session);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bridge = BroadcastEventBridge::new(16);
        let mut rx = bridge.subscribe();

        bridge.emit_group(GroupEvent::ClientAdded {
            group_id: "g1".into(),
            client_id: "c1".into(),
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, BroadcastEvent::Group(GroupEvent::ClientAdded { .. })));
    }
}
