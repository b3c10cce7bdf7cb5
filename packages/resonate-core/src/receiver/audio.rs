//! Abstract contract for the receiver's local audio engine.
//!
//! Deliberately thin: `resonate-core` schedules *when* a chunk plays, not
//! *how*. A concrete implementation (device selection, ring buffering,
//! resampling to the device's native rate) lives outside this crate.

/// A local audio output device capable of accepting scheduled PCM.
pub trait AudioOutput: Send + Sync {
    /// The audio engine's current clock instant, in seconds, on the same
    /// timeline as the `start_local` values passed to [`Self::play_at`].
    fn now(&self) -> f64;

    /// Schedules `planes` (one `Vec<f32>` per channel, samples in
    /// `[-1, 1]`) to begin playing at local instant `start_local`. If
    /// `start_local` is at or before [`Self::now`], the implementation
    /// plays immediately.
    fn play_at(&self, start_local: f64, channels: u8, planes: Vec<Vec<f32>>);
}

/// No-op engine for tests and headless operation: records calls instead of
/// producing sound.
#[derive(Default)]
pub struct NullAudioOutput {
    clock: std::sync::atomic::AtomicU64,
}

impl NullAudioOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the fake clock, for tests that need to simulate time
    /// passing between a scheduled chunk and "now".
    pub fn advance(&self, seconds: f64) {
        self.clock
            .fetch_add((seconds * 1_000_000.0) as u64, std::sync::atomic::Ordering::Relaxed);
    }
}

impl AudioOutput for NullAudioOutput {
    fn now(&self) -> f64 {
        self.clock.load(std::sync::atomic::Ordering::Relaxed) as f64 / 1_000_000.0
    }

    fn play_at(&self, _start_local: f64, _channels: u8, _planes: Vec<Vec<f32>>) {}
}
