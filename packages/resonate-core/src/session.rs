//! Session engine (§4.5): fan-out of audio, metadata, and art to a group's
//! ready clients, with lazy per-client activation and teardown on session
//! end or group departure.
//!
//! A [`SessionEngine`] is owned by exactly one [`crate::group::Group`] for
//! the lifetime of one session. It does not track group membership itself —
//! each send call is handed the group's current member list, since
//! membership can change between sends.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::client_proxy::{ClientProxy, SessionEventSink};
use crate::codec::{encode_audio_chunk, encode_media_art, ServerMessage, SessionEndPayload, StreamCommandPayload};
use crate::error::{SessionError, SessionResult};
use crate::events::{EventEmitter, GroupEvent, SessionEvent};
use crate::model::{ArtFormat, MediaArt, Metadata, PlayerState, SessionInfo};

/// A PCM frame accepted by [`SessionEngine::send_pcm_frame`], in either the
/// wire's native interleaved int16 form or decoded float planes.
pub enum PcmFrame {
    Interleaved(Vec<i16>),
    Planes(Vec<Vec<f32>>),
}

struct Cache {
    metadata: Metadata,
    /// The fully encoded MediaArt frame, resent verbatim on activation.
    art_frame: Option<Vec<u8>>,
    art: Option<MediaArt>,
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            metadata: Metadata::default(),
            art_frame: None,
            art: None,
        }
    }
}

/// Guard owned by `SessionEngine::active` for one activated client. Binds
/// the client's `stream/command`/`player/state` events to the session on
/// construction and unbinds them on drop (§3: "every active-clients entry
/// has a corresponding event binding that must be torn down on removal").
struct EventBinding {
    client: Arc<ClientProxy>,
}

impl Drop for EventBinding {
    fn drop(&mut self) {
        self.client.unbind_session();
    }
}

pub struct SessionEngine {
    group_id: String,
    info: SessionInfo,
    active: RwLock<HashMap<String, EventBinding>>,
    cache: RwLock<Cache>,
    emitter: Arc<dyn EventEmitter>,
}

impl SessionEngine {
    pub fn new(group_id: impl Into<String>, info: SessionInfo, emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            group_id: group_id.into(),
            info,
            active: RwLock::new(HashMap::new()),
            cache: RwLock::new(Cache::default()),
            emitter,
        }
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn session_id(&self) -> &str {
        &self.info.session_id
    }

    pub fn is_active(&self, client_id: &str) -> bool {
        self.active.read().contains_key(client_id)
    }

    /// Ensures `client` has received `session/start` (and any cached
    /// metadata/art) before further sends, and is bound to re-emit its
    /// `stream/command`/`player/state` events on this session's stream
    /// (§4.5 step 5). No-op if already active; removes `client` from the
    /// active set (without error) if it is not ready.
    fn ensure_activated(self: &Arc<Self>, client: &Arc<ClientProxy>) {
        if self.active.read().contains_key(client.client_id()) {
            return;
        }
        if !client.is_ready() {
            self.active.write().remove(client.client_id());
            return;
        }
        if client
            .send(&ServerMessage::SessionStart {
                payload: self.info.clone(),
            })
            .is_err()
        {
            return;
        }
        let cache = self.cache.read();
        if !cache.metadata.is_empty() {
            let _ = client.send(&ServerMessage::MetadataUpdate {
                payload: cache.metadata.clone(),
            });
        }
        if let Some(frame) = &cache.art_frame {
            let _ = client.send_binary(frame.clone());
        }
        drop(cache);
        client.bind_session(Arc::clone(self) as Arc<dyn SessionEventSink>);
        self.active.write().insert(
            client.client_id().to_string(),
            EventBinding {
                client: Arc::clone(client),
            },
        );
    }

    /// Encodes and fans a PlayAudioChunk out to every ready member,
    /// activating each one first if needed.
    pub fn send_audio(self: &Arc<Self>, members: &[Arc<ClientProxy>], timestamp_us: i64, samples_interleaved: &[i16]) {
        let encoded = encode_audio_chunk(timestamp_us, self.info.channels, samples_interleaved);
        for client in members {
            self.ensure_activated(client);
            if self.active.read().contains_key(client.client_id()) {
                let _ = client.send_binary(encoded.clone());
            }
        }
    }

    /// Accepts either interleaved int16 samples or per-channel float planes,
    /// validates the channel count, and fans the resulting PlayAudioChunk
    /// out via [`Self::send_audio`].
    pub fn send_pcm_frame(
        self: &Arc<Self>,
        members: &[Arc<ClientProxy>],
        timestamp_us: i64,
        channels: u8,
        frame: PcmFrame,
    ) -> SessionResult<()> {
        if channels != self.info.channels {
            return Err(SessionError::ChannelMismatch {
                expected: self.info.channels,
                given: channels,
            });
        }
        let interleaved = match frame {
            PcmFrame::Interleaved(samples) => samples,
            PcmFrame::Planes(planes) => crate::codec::encode_samples_i16(&planes),
        };
        self.send_audio(members, timestamp_us, &interleaved);
        Ok(())
    }

    /// Sends a metadata delta, suppressing the send entirely if nothing
    /// changed. The cache is always merged with the new value first.
    pub fn send_metadata(self: &Arc<Self>, members: &[Arc<ClientProxy>], new_metadata: Metadata) {
        let delta = {
            let mut cache = self.cache.write();
            let delta = if cache.metadata.is_empty() {
                new_metadata.clone()
            } else {
                cache.metadata.diff(&new_metadata)
            };
            cache.metadata.merge(&new_metadata);
            delta
        };
        if delta.is_empty() {
            return;
        }
        for client in members {
            self.ensure_activated(client);
            if self.active.read().contains_key(client.client_id()) {
                let _ = client.send(&ServerMessage::MetadataUpdate {
                    payload: delta.clone(),
                });
            }
        }
    }

    /// Sends a MediaArt frame and caches the fully encoded bytes so future
    /// activations can replay it verbatim.
    pub fn send_art(self: &Arc<Self>, members: &[Arc<ClientProxy>], art: MediaArt) {
        let encoded = encode_media_art(art.format, &art.bytes);
        {
            let mut cache = self.cache.write();
            cache.art_frame = Some(encoded.clone());
            cache.art = Some(art);
        }
        for client in members {
            self.ensure_activated(client);
            if self.active.read().contains_key(client.client_id()) {
                let _ = client.send_binary(encoded.clone());
            }
        }
    }

    /// Ends the session: every still-ready active client gets `session/end`
    /// sent directly (bypassing activation, so a client mid-teardown is
    /// never re-activated). Clears all session-owned state, which drops
    /// every [`EventBinding`] and so tears down their event bindings, and
    /// fires `session-end`.
    pub fn end(&self, members: &[Arc<ClientProxy>]) {
        let active_ids: Vec<String> = self.active.read().keys().cloned().collect();
        for client in members {
            if active_ids.contains(&client.client_id().to_string()) && client.is_ready() {
                let _ = client.send(&ServerMessage::SessionEnd {
                    payload: SessionEndPayload {
                        session_id: self.info.session_id.clone(),
                    },
                });
            }
        }
        self.active.write().clear();
        *self.cache.write() = Cache::default();
        self.emitter.emit_group(GroupEvent::SessionEnd {
            group_id: self.group_id.clone(),
            session_id: self.info.session_id.clone(),
        });
    }

    /// Called when the owning group evicts `client` while this session is
    /// active. If `client` is currently active and ready, sends it a final
    /// `session/end` directly. Removing the entry drops its [`EventBinding`],
    /// tearing down the event binding regardless of whether the send
    /// succeeds.
    pub fn remove_client(&self, client: &Arc<ClientProxy>) {
        let was_active = self.active.write().remove(client.client_id()).is_some();
        if was_active && client.is_ready() {
            let _ = client.send(&ServerMessage::SessionEnd {
                payload: SessionEndPayload {
                    session_id: self.info.session_id.clone(),
                },
            });
        }
    }
}

impl SessionEventSink for SessionEngine {
    fn on_stream_command(&self, client_id: &str, command: &StreamCommandPayload) {
        self.emitter.emit_session(SessionEvent::StreamCommand {
            session_id: self.info.session_id.clone(),
            client_id: client_id.to_string(),
            command: command.clone(),
        });
    }

    fn on_player_state(&self, client_id: &str, state: &PlayerState) {
        self.emitter.emit_session(SessionEvent::PlayerState {
            session_id: self.info.session_id.clone(),
            client_id: client_id.to_string(),
            state: state.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_proxy::{ClientProxy, OutboundFrame};
    use crate::events::NoopEventEmitter;
    use tokio::sync::mpsc;

    fn session() -> Arc<SessionEngine> {
        Arc::new(SessionEngine::new(
            "g1",
            SessionInfo {
                session_id: "s1".into(),
                codec: "pcm".into(),
                sample_rate: 48000,
                channels: 2,
                bit_depth: 16,
                now: 0,
                codec_header: None,
            },
            Arc::new(NoopEventEmitter),
        ))
    }

    fn ready_client() -> (Arc<ClientProxy>, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(16);
        let proxy = Arc::new(ClientProxy::new(tx, Arc::new(NoopEventEmitter)));
        proxy
            .handle_incoming(crate::codec::ClientMessage::PlayerHello {
                payload: crate::model::PlayerInfo {
                    player_id: "p1".into(),
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
        (proxy, rx)
    }

    #[test]
    fn first_audio_send_activates_with_session_start_first() {
        let session = session();
        let (client, mut rx) = ready_client();
        session.send_audio(&[client.clone()], 1000, &[1, 2, 3, 4]);

        match rx.try_recv().unwrap() {
            OutboundFrame::Text(json) => assert!(json.contains("session/start")),
            _ => panic!("expected session/start text frame first"),
        }
        match rx.try_recv().unwrap() {
            OutboundFrame::Binary(bytes) => assert_eq!(bytes[0], 0x01),
            _ => panic!("expected binary audio frame"),
        }
        assert!(session.is_active(client.client_id()));
    }

    #[test]
    fn unready_client_is_not_activated() {
        let session = session();
        let (tx, _rx) = mpsc::channel(16);
        let client = Arc::new(ClientProxy::new(tx, Arc::new(NoopEventEmitter)));
        session.send_audio(&[client.clone()], 0, &[0, 0]);
        assert!(!session.is_active(client.client_id()));
    }

    #[test]
    fn metadata_send_is_suppressed_when_unchanged() {
        let session = session();
        let (client, mut rx) = ready_client();
        let md = Metadata {
            title: Some("A".into()),
            ..Default::default()
        };
        session.send_metadata(&[client.clone()], md.clone());
        // drain session/start
        rx.try_recv().unwrap();
        // drain metadata/update
        rx.try_recv().unwrap();

        session.send_metadata(&[client.clone()], md);
        assert!(rx.try_recv().is_err(), "no new frame should be queued");
    }

    #[test]
    fn session_end_sends_directly_and_clears_state() {
        let session = session();
        let (client, mut rx) = ready_client();
        session.send_audio(&[client.clone()], 0, &[0, 0]);
        rx.try_recv().unwrap(); // session/start
        rx.try_recv().unwrap(); // audio

        session.end(&[client.clone()]);
        match rx.try_recv().unwrap() {
            OutboundFrame::Text(json) => assert!(json.contains("session/end")),
            _ => panic!("expected session/end"),
        }
        assert!(!session.is_active(client.client_id()));
    }

    #[test]
    fn channel_mismatch_is_rejected() {
        let session = session();
        let (client, _rx) = ready_client();
        let err = session
            .send_pcm_frame(&[client], 0, 1, PcmFrame::Interleaved(vec![0]))
            .unwrap_err();
        assert_eq!(
            err,
            SessionError::ChannelMismatch {
                expected: 2,
                given: 1
            }
        );
    }

    #[test]
    fn removal_tears_down_the_event_binding() {
        let session = session();
        let (client, mut rx) = ready_client();
        session.send_audio(&[client.clone()], 0, &[0, 0]);
        rx.try_recv().unwrap(); // session/start
        rx.try_recv().unwrap(); // audio
        assert!(session.is_active(client.client_id()));

        session.remove_client(&client);
        assert!(!session.is_active(client.client_id()));

        // Re-activation after removal must bind a fresh EventBinding rather
        // than silently reuse a torn-down one.
        session.send_audio(&[client.clone()], 1, &[0, 0]);
        assert!(session.is_active(client.client_id()));
    }
}
