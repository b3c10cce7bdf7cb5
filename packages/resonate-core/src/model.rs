//! Core data model shared by the server and receiver sides of the protocol.
//!
//! These types are pure data: no I/O, no transport. Encoding to and from the
//! wire lives in [`crate::codec`].

use serde::{Deserialize, Serialize};

/// Identity of the server instance. Immutable for the server's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub id: String,
    pub name: String,
}

/// Repeat mode for playback, part of [`Metadata`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    Off,
    One,
    All,
}

/// Capability descriptor a receiver announces on connect. Immutable per
/// connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub player_id: String,
    pub name: String,
    pub role: String,
    pub buffer_capacity: u64,
    #[serde(default)]
    pub supported_codecs: Vec<String>,
    #[serde(default)]
    pub supported_channels: Vec<u8>,
    #[serde(default)]
    pub supported_sample_rates: Vec<u32>,
    #[serde(default)]
    pub supported_bit_depths: Vec<u8>,
    #[serde(default)]
    pub supported_stream_types: Vec<String>,
    #[serde(default)]
    pub supported_picture_formats: Vec<String>,
    #[serde(default)]
    pub display_width: Option<u32>,
    #[serde(default)]
    pub display_height: Option<u32>,
}

/// Receiver-reported playback state (volume, transport state, etc).
/// Opaque to the session engine — forwarded as-is on the `player-state` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Parameters of an active audio session. Immutable from creation until
/// session end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    /// Codec tag; `"pcm"` is the only normative value.
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u8,
    pub bit_depth: u8,
    /// Server monotonic clock origin, microseconds.
    pub now: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec_header: Option<Vec<u8>>,
}

/// Sticky display state. The server holds the authoritative current value;
/// delta updates from [`crate::session::SessionEngine::send_metadata`] replace
/// individual fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_members: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_commands: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<RepeatMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shuffle: Option<bool>,
}

impl Metadata {
    /// Merges `delta` into `self`, replacing any field present in `delta`.
    pub fn merge(&mut self, delta: &Metadata) {
        if delta.title.is_some() {
            self.title = delta.title.clone();
        }
        if delta.artist.is_some() {
            self.artist = delta.artist.clone();
        }
        if delta.album.is_some() {
            self.album = delta.album.clone();
        }
        if delta.year.is_some() {
            self.year = delta.year;
        }
        if delta.track.is_some() {
            self.track = delta.track;
        }
        if delta.group_members.is_some() {
            self.group_members = delta.group_members.clone();
        }
        if delta.support_commands.is_some() {
            self.support_commands = delta.support_commands.clone();
        }
        if delta.repeat.is_some() {
            self.repeat = delta.repeat;
        }
        if delta.shuffle.is_some() {
            self.shuffle = delta.shuffle;
        }
    }

    /// Returns the subset of fields in `new` that differ from `self`, using
    /// element-wise (order-sensitive) equality for list fields. `None` means
    /// the field is unchanged and should be omitted from the delta.
    pub fn diff(&self, new: &Metadata) -> Metadata {
        Metadata {
            title: differs(&self.title, &new.title),
            artist: differs(&self.artist, &new.artist),
            album: differs(&self.album, &new.album),
            year: differs(&self.year, &new.year),
            track: differs(&self.track, &new.track),
            group_members: differs(&self.group_members, &new.group_members),
            support_commands: differs(&self.support_commands, &new.support_commands),
            repeat: differs(&self.repeat, &new.repeat),
            shuffle: differs(&self.shuffle, &new.shuffle),
        }
    }

    /// True if no field is set (i.e. this would be an empty delta).
    pub fn is_empty(&self) -> bool {
        self == &Metadata::default()
    }
}

fn differs<T: PartialEq + Clone>(current: &Option<T>, new: &Option<T>) -> Option<T> {
    if new.is_some() && new != current {
        new.clone()
    } else {
        None
    }
}

/// Image format tag for [`MediaArt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtFormat {
    Jpeg = 0,
    Png = 1,
}

impl ArtFormat {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Jpeg),
            1 => Some(Self::Png),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// An opaque image blob with a format tag. At most one current value per
/// session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaArt {
    pub format: ArtFormat,
    pub bytes: Vec<u8>,
}

/// A timestamped run of samples across `channels` channels, decoded to
/// per-channel float planes in `[-1, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Server-clock microsecond instant at which sample 0 plays.
    pub timestamp_us: i64,
    pub channels: u8,
    /// One `Vec<f32>` per channel, each of length `sample_count`.
    pub planes: Vec<Vec<f32>>,
}

impl AudioFrame {
    pub fn sample_count(&self) -> usize {
        self.planes.first().map_or(0, Vec::len)
    }
}
