//! Wire codec: binary audio/art frames and tagged JSON text messages (§4.1).
//!
//! The codec is pure — no I/O — and symmetric: encoding then decoding any
//! valid frame round-trips exactly (subject to the ≤1 LSB quantization bound
//! on PCM samples, which is a property of the sample format, not the codec).

use serde::{Deserialize, Serialize};

use crate::error::{CodecError, CodecResult};
use crate::model::{ArtFormat, PlayerInfo, PlayerState, SessionInfo};
use crate::protocol_constants::{
    AUDIO_FRAME_HEADER_LEN as AUDIO_HEADER_LEN, FRAME_TYPE_MEDIA_ART as MEDIA_ART_TYPE,
    FRAME_TYPE_PLAY_AUDIO_CHUNK as PLAY_AUDIO_CHUNK_TYPE,
};

/// Text messages sent from receiver to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "player/hello")]
    PlayerHello { payload: PlayerInfo },
    #[serde(rename = "player/time")]
    PlayerTime { payload: PlayerTimePayload },
    #[serde(rename = "player/state")]
    PlayerStateMsg { payload: PlayerState },
    #[serde(rename = "stream/command")]
    StreamCommand { payload: StreamCommandPayload },
    #[serde(rename = "group/join")]
    GroupJoin { payload: GroupJoinPayload },
    #[serde(rename = "group/unjoin")]
    GroupUnjoin { payload: serde_json::Value },
    #[serde(rename = "group/get-list")]
    GroupGetList { payload: serde_json::Value },
}

/// Text messages sent from server to receiver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "source/hello")]
    SourceHello { payload: crate::model::ServerInfo },
    #[serde(rename = "source/time")]
    SourceTime { payload: SourceTimePayload },
    #[serde(rename = "session/start")]
    SessionStart { payload: SessionInfo },
    #[serde(rename = "session/end")]
    SessionEnd { payload: SessionEndPayload },
    #[serde(rename = "metadata/update")]
    MetadataUpdate {
        payload: crate::model::Metadata,
    },
    #[serde(rename = "group/list")]
    GroupList { payload: GroupListPayload },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerTimePayload {
    pub player_transmitted: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceTimePayload {
    pub player_transmitted: i64,
    pub source_received: i64,
    pub source_transmitted: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamCommand {
    Play,
    Pause,
    Stop,
    Seek,
    Volume,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamCommandPayload {
    pub command: StreamCommand,
    #[serde(flatten, default)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupJoinPayload {
    pub group_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionEndPayload {
    pub session_id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GroupState {
    Idle,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupListEntry {
    pub group_id: String,
    pub state: GroupState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupListPayload {
    pub groups: Vec<GroupListEntry>,
}

/// Decodes a UTF-8 JSON text frame into a [`ClientMessage`].
pub fn decode_client_message(text: &str) -> CodecResult<ClientMessage> {
    serde_json::from_str(text).map_err(|e| CodecError::BadJson(e.to_string()))
}

/// Encodes a [`ServerMessage`] to its wire JSON text form.
pub fn encode_server_message(msg: &ServerMessage) -> String {
    serde_json::to_string(msg).expect("ServerMessage serialization is infallible")
}

/// Encodes a PlayAudioChunk binary frame: `[u8 1][i64 ts BE][u32 count BE][int16 LE samples]`.
pub fn encode_audio_chunk(timestamp_us: i64, channels: u8, samples_interleaved: &[i16]) -> Vec<u8> {
    let sample_count = (samples_interleaved.len() / channels.max(1) as usize) as u32;
    let mut buf = Vec::with_capacity(AUDIO_HEADER_LEN + samples_interleaved.len() * 2);
    buf.push(PLAY_AUDIO_CHUNK_TYPE);
    buf.extend_from_slice(&timestamp_us.to_be_bytes());
    buf.extend_from_slice(&sample_count.to_be_bytes());
    for s in samples_interleaved {
        buf.extend_from_slice(&s.to_le_bytes());
    }
    buf
}

/// A decoded PlayAudioChunk frame, still interleaved (decoding to per-channel
/// float planes is the receiver's job — see [`crate::receiver::decode_to_planes`]).
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudioChunk {
    pub timestamp_us: i64,
    pub sample_count: u32,
    pub samples_interleaved: Vec<i16>,
}

/// Encodes a MediaArt binary frame: `[u8 2][u8 format][image bytes]`.
pub fn encode_media_art(format: ArtFormat, bytes: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(2 + bytes.len());
    buf.push(MEDIA_ART_TYPE);
    buf.push(format.as_byte());
    buf.extend_from_slice(bytes);
    buf
}

/// A decoded binary frame: audio chunk or media art.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    Audio(DecodedAudioChunk),
    Art { format: ArtFormat, bytes: Vec<u8> },
}

/// Decodes a binary frame, validating the audio payload length invariant
/// (`payload_len == sample_count * channels * 2`) when `channels` is known.
pub fn decode_binary_frame(buf: &[u8], channels: u8) -> CodecResult<DecodedFrame> {
    let discriminator = *buf.first().ok_or(CodecError::TruncatedHeader {
        needed: 1,
        got: 0,
    })?;

    match discriminator {
        PLAY_AUDIO_CHUNK_TYPE => {
            if buf.len() < AUDIO_HEADER_LEN {
                return Err(CodecError::TruncatedHeader {
                    needed: AUDIO_HEADER_LEN,
                    got: buf.len(),
                });
            }
            let timestamp_us = i64::from_be_bytes(buf[1..9].try_into().unwrap());
            let sample_count = u32::from_be_bytes(buf[9..13].try_into().unwrap());
            let payload = &buf[AUDIO_HEADER_LEN..];
            let expected = sample_count as usize * channels.max(1) as usize * 2;
            if payload.len() != expected {
                return Err(CodecError::DataSizeMismatch {
                    expected,
                    actual: payload.len(),
                });
            }
            let mut samples = Vec::with_capacity(payload.len() / 2);
            for chunk in payload.chunks_exact(2) {
                samples.push(i16::from_le_bytes([chunk[0], chunk[1]]));
            }
            Ok(DecodedFrame::Audio(DecodedAudioChunk {
                timestamp_us,
                sample_count,
                samples_interleaved: samples,
            }))
        }
        MEDIA_ART_TYPE => {
            if buf.len() < 2 {
                return Err(CodecError::TruncatedHeader { needed: 2, got: buf.len() });
            }
            let format = ArtFormat::from_byte(buf[1]).ok_or(CodecError::UnknownFormat(buf[1]))?;
            Ok(DecodedFrame::Art {
                format,
                bytes: buf[2..].to_vec(),
            })
        }
        other => Err(CodecError::UnknownType(other)),
    }
}

/// Converts `f32` samples in `[-1, 1]` to interleaved int16 LE, matching the
/// receiver's inverse exactly: round `sample * 32767`, clamp beforehand.
pub fn encode_samples_i16(planes: &[Vec<f32>]) -> Vec<i16> {
    let channels = planes.len();
    let sample_count = planes.first().map_or(0, Vec::len);
    let mut out = Vec::with_capacity(sample_count * channels);
    for i in 0..sample_count {
        for plane in planes {
            let clamped = plane[i].clamp(-1.0, 1.0);
            out.push((clamped * 32767.0).round() as i16);
        }
    }
    out
}
