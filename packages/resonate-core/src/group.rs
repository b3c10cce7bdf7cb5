//! Group manager (§4.6): membership tracking and at-most-one active
//! session per group.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::client_proxy::ClientProxy;
use crate::codec::GroupState;
use crate::error::{SessionError, SessionResult};
use crate::events::{EventEmitter, GroupEvent};
use crate::model::SessionInfo;
use crate::session::SessionEngine;
use crate::utils::now_micros;

pub struct Group {
    group_id: String,
    members: DashMap<String, Arc<ClientProxy>>,
    session: RwLock<Option<Arc<SessionEngine>>>,
    emitter: Arc<dyn EventEmitter>,
}

impl Group {
    pub fn new(group_id: impl Into<String>, emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            group_id: group_id.into(),
            members: DashMap::new(),
            session: RwLock::new(None),
            emitter,
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn members(&self) -> Vec<Arc<ClientProxy>> {
        self.members.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.members.contains_key(client_id)
    }

    /// Adds `client` to the group and emits `client-added`.
    pub fn add_client(&self, client: Arc<ClientProxy>) {
        let client_id = client.client_id().to_string();
        self.members.insert(client_id.clone(), client);
        self.emitter.emit_group(GroupEvent::ClientAdded {
            group_id: self.group_id.clone(),
            client_id,
        });
    }

    /// Removes `client_id` from the group, emitting `client-removed`. If a
    /// session is active, triggers the session engine's group-driven
    /// removal so the departing client gets a final `session/end`.
    pub fn remove_client(&self, client_id: &str) {
        let removed = self.members.remove(client_id);
        let Some((_, client)) = removed else {
            return;
        };
        if let Some(session) = self.session.read().as_ref() {
            session.remove_client(&client);
        }
        self.emitter.emit_group(GroupEvent::ClientRemoved {
            group_id: self.group_id.clone(),
            client_id: client_id.to_string(),
        });
    }

    /// Starts a new session. Fails if one is already active.
    pub fn start_session(
        &self,
        codec: impl Into<String>,
        sample_rate: u32,
        channels: u8,
        bit_depth: u8,
    ) -> SessionResult<Arc<SessionEngine>> {
        let mut slot = self.session.write();
        if slot.is_some() {
            return Err(SessionError::SessionAlreadyActive);
        }
        let info = SessionInfo {
            session_id: uuid::Uuid::new_v4().to_string(),
            codec: codec.into(),
            sample_rate,
            channels,
            bit_depth,
            now: now_micros(),
            codec_header: None,
        };
        let engine = Arc::new(SessionEngine::new(self.group_id.clone(), info, Arc::clone(&self.emitter)));
        *slot = Some(Arc::clone(&engine));
        Ok(engine)
    }

    pub fn active_session(&self) -> Option<Arc<SessionEngine>> {
        self.session.read().clone()
    }

    /// Ends the active session and clears the reference. Fails if no
    /// session is active (§7 Semantic error).
    pub fn end_session(&self) -> SessionResult<()> {
        let session = self.session.write().take();
        match session {
            Some(session) => {
                session.end(&self.members());
                Ok(())
            }
            None => Err(SessionError::NoSessionActive),
        }
    }

    /// `playing` iff a session is active, `idle` otherwise. `paused` is
    /// reserved and never returned by this implementation.
    pub fn state(&self) -> GroupState {
        if self.session.read().is_some() {
            GroupState::Playing
        } else {
            GroupState::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_proxy::ClientProxy;
    use crate::events::NoopEventEmitter;
    use crate::model::Metadata;
    use tokio::sync::mpsc;

    fn group() -> Group {
        Group::new("g1", Arc::new(NoopEventEmitter))
    }

    fn client() -> Arc<ClientProxy> {
        let (tx, _rx) = mpsc::channel(16);
        Arc::new(ClientProxy::new(tx, Arc::new(NoopEventEmitter)))
    }

    #[test]
    fn starting_a_second_session_fails() {
        let group = group();
        group.start_session("pcm", 48000, 2, 16).unwrap();
        let err = group.start_session("pcm", 48000, 2, 16).unwrap_err();
        assert_eq!(err, SessionError::SessionAlreadyActive);
    }

    #[test]
    fn state_reflects_active_session() {
        let group = group();
        assert_eq!(group.state(), GroupState::Idle);
        group.start_session("pcm", 48000, 2, 16).unwrap();
        assert_eq!(group.state(), GroupState::Playing);
        group.end_session().unwrap();
        assert_eq!(group.state(), GroupState::Idle);
    }

    #[test]
    fn ending_with_no_active_session_is_a_semantic_error() {
        let group = group();
        let err = group.end_session().unwrap_err();
        assert_eq!(err, SessionError::NoSessionActive);
    }

    #[test]
    fn removing_a_client_clears_membership() {
        let group = group();
        let client = client();
        let id = client.client_id().to_string();
        group.add_client(client);
        assert!(group.contains(&id));
        group.remove_client(&id);
        assert!(!group.contains(&id));
    }

    /// Full-stack integration test: group manager + session engine + two
    /// fake client proxies. Covers §8 Scenario 5 (a client leaving the group
    /// mid-session is torn down individually while the remaining member's
    /// session continues uninterrupted) and exercises Scenario 1's
    /// mechanism (a late-activated client receives cached session state on
    /// its first send) with two concurrent clients rather than one.
    fn hello_client(client: &Arc<ClientProxy>, player_id: &str) {
        client
            .handle_incoming(crate::codec::ClientMessage::PlayerHello {
                payload: crate::model::PlayerInfo {
                    player_id: player_id.into(),
                    name: "Kitchen".into(),
                    role: "speaker".into(),
                    buffer_capacity: 1024,
                    supported_codecs: vec!["pcm".into()],
                    supported_channels: vec![2],
                    supported_sample_rates: vec![48000],
                    supported_bit_depths: vec![16],
                    supported_stream_types: vec![],
                    supported_picture_formats: vec![],
                    display_width: None,
                    display_height: None,
                },
            })
            .unwrap();
    }

    #[test]
    fn evicting_one_client_mid_session_leaves_the_other_unaffected() {
        use crate::client_proxy::OutboundFrame;

        let group = group();

        let (tx_a, mut rx_a) = mpsc::channel(16);
        let client_a = Arc::new(ClientProxy::new(tx_a, Arc::new(NoopEventEmitter)));
        hello_client(&client_a, "p1");
        let id_a = client_a.client_id().to_string();

        let (tx_b, mut rx_b) = mpsc::channel(16);
        let client_b = Arc::new(ClientProxy::new(tx_b, Arc::new(NoopEventEmitter)));
        hello_client(&client_b, "p2");
        let id_b = client_b.client_id().to_string();

        group.add_client(client_a.clone());
        group.add_client(client_b.clone());

        let session = group.start_session("pcm", 48000, 2, 16).unwrap();
        session.send_audio(&group.members(), 0, &[1, 2, 3, 4]);

        // Both clients activate on the first send: session/start then audio.
        assert!(matches!(rx_a.try_recv().unwrap(), OutboundFrame::Text(_)));
        assert!(matches!(rx_a.try_recv().unwrap(), OutboundFrame::Binary(_)));
        assert!(matches!(rx_b.try_recv().unwrap(), OutboundFrame::Text(_)));
        assert!(matches!(rx_b.try_recv().unwrap(), OutboundFrame::Binary(_)));
        assert!(session.is_active(&id_a));
        assert!(session.is_active(&id_b));

        // B leaves the group mid-session (e.g. evicted or disconnected).
        group.remove_client(&id_b);
        assert!(!group.contains(&id_b));
        assert!(!session.is_active(&id_b));
        match rx_b.try_recv().unwrap() {
            OutboundFrame::Text(json) => assert!(json.contains("session/end")),
            _ => panic!("expected session/end for the evicted client"),
        }

        // A is untouched and keeps receiving session traffic.
        assert!(session.is_active(&id_a));
        session.send_metadata(
            &group.members(),
            Metadata {
                title: Some("Now Playing".into()),
                ..Default::default()
            },
        );
        match rx_a.try_recv().unwrap() {
            OutboundFrame::Text(json) => assert!(json.contains("metadata/update")),
            _ => panic!("expected metadata/update for the surviving client"),
        }
        assert!(rx_b.try_recv().is_err(), "the evicted client gets nothing further");
    }
}
