//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the wire protocol itself; changing them
//! would break interoperability with any receiver built against it.

// ─────────────────────────────────────────────────────────────────────────────
// Clock synchronization (§4.2)
// ─────────────────────────────────────────────────────────────────────────────

/// Maximum number of offset samples retained per connection. Re-exported as
/// [`crate::clock::WINDOW_SIZE`] for callers that only touch the clock module.
pub const CLOCK_WINDOW_SIZE: usize = 50;

/// Below this many samples, the receiver requests another exchange soon
/// rather than waiting for the steady-state cadence.
pub const CLOCK_MIN_SAMPLES: usize = 20;

// ─────────────────────────────────────────────────────────────────────────────
// Wire framing (§4.1)
// ─────────────────────────────────────────────────────────────────────────────

/// Binary discriminator for a PlayAudioChunk frame.
pub const FRAME_TYPE_PLAY_AUDIO_CHUNK: u8 = 0x01;
/// Binary discriminator for a MediaArt frame.
pub const FRAME_TYPE_MEDIA_ART: u8 = 0x02;
/// Length of the PlayAudioChunk header: `[u8][i64 BE][u32 BE]`.
pub const AUDIO_FRAME_HEADER_LEN: usize = 1 + 8 + 4;

// ─────────────────────────────────────────────────────────────────────────────
// Streaming configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of the per-client event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// WebSocket heartbeat timeout (seconds). A connection that sends nothing,
/// not even a ping frame, for this long is considered dead.
pub const WS_HEARTBEAT_TIMEOUT_SECS: u64 = 30;

/// Interval between WebSocket heartbeat checks (seconds).
pub const WS_HEARTBEAT_CHECK_INTERVAL_SECS: u64 = 1;

/// Default PCM sample rate offered when a group has no receivers connected
/// yet to negotiate against.
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Default channel count.
pub const DEFAULT_CHANNELS: u8 = 2;

/// Default bit depth.
pub const DEFAULT_BIT_DEPTH: u8 = 16;

/// Application name used in server identity (`source/hello`).
pub const APP_NAME: &str = "Resonate";
