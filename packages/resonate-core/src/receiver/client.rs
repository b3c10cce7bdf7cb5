//! Receiver client state machine (§4.3).

use std::sync::Arc;

use parking_lot::Mutex;

use crate::client_proxy::OutboundFrame;
use crate::clock::ClockSync;
use crate::codec::{ClientMessage, DecodedAudioChunk, PlayerTimePayload, SourceTimePayload};
use crate::events::{EventEmitter, ReceiverEvent};
use crate::model::{ArtFormat, MediaArt, Metadata, PlayerInfo, ServerInfo, SessionInfo};
use crate::receiver::audio::AudioOutput;

/// Dynamic connection/session state, per §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Disconnected,
    Connecting,
    ConnectedNoSession,
    ConnectedSessionActive,
}

struct Shared {
    state: ReceiverState,
    server: Option<ServerInfo>,
    session: Option<SessionInfo>,
    metadata: Metadata,
    art: Option<MediaArt>,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            state: ReceiverState::Disconnected,
            server: None,
            session: None,
            metadata: Metadata::default(),
            art: None,
        }
    }
}

/// The receiver's protocol and scheduling state machine. One instance per
/// connection to a server.
pub struct ReceiverClient {
    player_info: PlayerInfo,
    shared: Mutex<Shared>,
    clock: Mutex<ClockSync>,
    audio: Arc<dyn AudioOutput>,
    emitter: Arc<dyn EventEmitter>,
    outbound: tokio::sync::mpsc::UnboundedSender<OutboundFrame>,
}

impl ReceiverClient {
    pub fn new(
        player_info: PlayerInfo,
        audio: Arc<dyn AudioOutput>,
        emitter: Arc<dyn EventEmitter>,
        outbound: tokio::sync::mpsc::UnboundedSender<OutboundFrame>,
    ) -> Self {
        Self {
            player_info,
            shared: Mutex::new(Shared::default()),
            clock: Mutex::new(ClockSync::new()),
            audio,
            emitter,
            outbound,
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.shared.lock().state
    }

    pub fn server_info(&self) -> Option<ServerInfo> {
        self.shared.lock().server.clone()
    }

    pub fn session_info(&self) -> Option<SessionInfo> {
        self.shared.lock().session.clone()
    }

    /// Sends `player/hello` and transitions to `connecting`. Called once,
    /// right after the transport opens.
    pub fn on_open(&self) {
        self.shared.lock().state = ReceiverState::Connecting;
        self.send_client_message(&ClientMessage::PlayerHello {
            payload: self.player_info.clone(),
        });
        self.emitter.emit_receiver(ReceiverEvent::Open);
    }

    /// Sends `player/time` to begin or continue the clock-sync exchange;
    /// the caller is responsible for scheduling this on the cadence
    /// described in §4.2 ([`ClockSync::needs_resample`]).
    pub fn send_time_sample(&self, player_transmitted_us: i64) {
        self.send_client_message(&ClientMessage::PlayerTime {
            payload: PlayerTimePayload {
                player_transmitted: player_transmitted_us,
            },
        });
    }

    pub fn needs_resample(&self) -> bool {
        self.clock.lock().needs_resample()
    }

    pub fn clock_offset(&self) -> f64 {
        self.clock.lock().offset()
    }

    /// Handles `source/hello`.
    pub fn on_source_hello(&self, server: ServerInfo) {
        let mut shared = self.shared.lock();
        shared.server = Some(server.clone());
        if shared.state == ReceiverState::Connecting {
            shared.state = ReceiverState::ConnectedNoSession;
        }
        drop(shared);
        self.emitter.emit_receiver(ReceiverEvent::ServerUpdate { server });
    }

    /// Handles `source/time`: completes one clock-sync exchange.
    pub fn on_source_time(&self, payload: SourceTimePayload, player_received_us: i64) {
        self.clock.lock().record_sample(
            payload.player_transmitted,
            payload.source_received,
            payload.source_transmitted,
            player_received_us,
        );
    }

    /// Handles `session/start`.
    pub fn on_session_start(&self, session: SessionInfo) {
        self.shared.lock().state = ReceiverState::ConnectedSessionActive;
        self.shared.lock().session = Some(session.clone());
        self.emitter.emit_receiver(ReceiverEvent::SessionUpdate {
            session: Some(session),
        });
    }

    /// Handles `session/end`: clears session, metadata, and art.
    pub fn on_session_end(&self) {
        {
            let mut shared = self.shared.lock();
            shared.session = None;
            shared.metadata = Metadata::default();
            shared.art = None;
            if shared.state == ReceiverState::ConnectedSessionActive {
                shared.state = ReceiverState::ConnectedNoSession;
            }
        }
        self.emitter.emit_receiver(ReceiverEvent::SessionUpdate { session: None });
        self.emitter.emit_receiver(ReceiverEvent::MetadataUpdate { metadata: None });
        self.emitter.emit_receiver(ReceiverEvent::ArtUpdate { art: None });
    }

    /// Handles `metadata/update`: merges the delta into the cache (an empty
    /// cache makes this a full replace) and emits the merged result.
    pub fn on_metadata_update(&self, delta: Metadata) {
        let merged = {
            let mut shared = self.shared.lock();
            shared.metadata.merge(&delta);
            shared.metadata.clone()
        };
        self.emitter.emit_receiver(ReceiverEvent::MetadataUpdate {
            metadata: Some(merged),
        });
    }

    /// Handles a MediaArt binary frame.
    pub fn on_media_art(&self, format: ArtFormat, bytes: Vec<u8>) {
        let art = MediaArt { format, bytes };
        self.shared.lock().art = Some(art.clone());
        self.emitter.emit_receiver(ReceiverEvent::ArtUpdate { art: Some(art) });
    }

    /// Handles a PlayAudioChunk binary frame: converts to float planes and
    /// hands the result to the audio engine at the computed local instant.
    ///
    /// No-ops outside `connected-session-active`, per §4.3 — chunks
    /// arriving in any other state are logged and dropped.
    pub fn on_audio_chunk(&self, chunk: DecodedAudioChunk, channels: u8) {
        if self.state() != ReceiverState::ConnectedSessionActive {
            log::debug!("[Receiver] dropping audio chunk outside an active session");
            return;
        }
        let planes = deinterleave(&chunk.samples_interleaved, channels);
        let offset = self.clock_offset();
        let start_local = chunk.timestamp_us as f64 / 1_000_000.0 - offset;
        let now = self.audio.now();
        if start_local < now {
            log::warn!(
                "[Receiver] audio chunk arrived {:.3}s late; playing immediately",
                now - start_local
            );
            self.audio.play_at(now, channels, planes);
        } else {
            self.audio.play_at(start_local, channels, planes);
        }
    }

    /// Handles transport close: clears all session state and emits `close`.
    pub fn on_close(&self, expected: bool) {
        *self.shared.lock() = Shared::default();
        self.emitter.emit_receiver(ReceiverEvent::Close { expected });
    }

    fn send_client_message(&self, msg: &ClientMessage) {
        let text = serde_json::to_string(msg).expect("ClientMessage serialization is infallible");
        let _ = self.outbound.send(OutboundFrame::Text(text));
    }
}

/// Converts interleaved int16 samples to per-channel float planes in
/// `[-1, 1]`, matching the encoder's inverse exactly (divide by 32768).
fn deinterleave(samples_interleaved: &[i16], channels: u8) -> Vec<Vec<f32>> {
    let channels = channels.max(1) as usize;
    let sample_count = samples_interleaved.len() / channels;
    let mut planes = vec![Vec::with_capacity(sample_count); channels];
    for (i, sample) in samples_interleaved.iter().enumerate() {
        planes[i % channels].push(*sample as f32 / 32768.0);
    }
    planes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEventEmitter;
    use crate::receiver::audio::NullAudioOutput;

    fn player_info() -> PlayerInfo {
        PlayerInfo {
            player_id: "p1".into(),
            name: "Kitchen".into(),
            role: "speaker".into(),
            buffer_capacity: 65536,
            supported_codecs: vec!["pcm".into()],
            supported_channels: vec![2],
            supported_sample_rates: vec![48000],
            supported_bit_depths: vec![16],
            supported_stream_types: vec![],
            supported_picture_formats: vec!["jpeg".into()],
            display_width: None,
            display_height: None,
        }
    }

    fn client() -> (ReceiverClient, tokio::sync::mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let client = ReceiverClient::new(
            player_info(),
            Arc::new(NullAudioOutput::new()),
            Arc::new(NoopEventEmitter),
            tx,
        );
        (client, rx)
    }

    #[test]
    fn open_sends_hello_and_transitions_to_connecting() {
        let (client, mut rx) = client();
        client.on_open();
        assert_eq!(client.state(), ReceiverState::Connecting);
        match rx.try_recv().unwrap() {
            OutboundFrame::Text(json) => assert!(json.contains("player/hello")),
            _ => panic!("expected text frame"),
        }
    }

    #[test]
    fn session_start_then_end_clears_cached_state() {
        let (client, _rx) = client();
        client.on_open();
        client.on_source_hello(ServerInfo {
            id: "s1".into(),
            name: "Server".into(),
        });
        client.on_metadata_update(Metadata {
            title: Some("Song".into()),
            ..Default::default()
        });
        client.on_session_start(SessionInfo {
            session_id: "sess1".into(),
            codec: "pcm".into(),
            sample_rate: 48000,
            channels: 2,
            bit_depth: 16,
            now: 0,
            codec_header: None,
        });
        assert_eq!(client.state(), ReceiverState::ConnectedSessionActive);

        client.on_session_end();
        assert_eq!(client.state(), ReceiverState::ConnectedNoSession);
        assert!(client.session_info().is_none());
    }

    #[test]
    fn audio_chunk_outside_session_is_dropped_silently() {
        let (client, _rx) = client();
        let chunk = DecodedAudioChunk {
            timestamp_us: 0,
            sample_count: 1,
            samples_interleaved: vec![0, 0],
        };
        // Does not panic even though no session is active.
        client.on_audio_chunk(chunk, 2);
    }

    #[test]
    fn deinterleave_splits_by_channel() {
        let planes = deinterleave(&[1, 2, 3, 4, 5, 6], 2);
        assert_eq!(planes.len(), 2);
        assert_eq!(planes[0].len(), 3);
        assert_eq!(planes[1].len(), 3);
        assert!((planes[0][0] - (1.0 / 32768.0)).abs() < 1e-6);
        assert!((planes[1][0] - (2.0 / 32768.0)).abs() < 1e-6);
    }

    #[test]
    fn clock_offset_updates_after_source_time() {
        let (client, _rx) = client();
        client.on_source_time(
            SourceTimePayload {
                player_transmitted: 1_000_000,
                source_received: 1_050_000,
                source_transmitted: 1_050_500,
            },
            1_100_000,
        );
        assert!((client.clock_offset() - 0.00025).abs() < 1e-9);
    }
}
