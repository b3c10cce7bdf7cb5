//! Clock synchronization (§4.2): four-timestamp exchange, median-of-window
//! offset estimation.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::protocol_constants::{CLOCK_MIN_SAMPLES, CLOCK_WINDOW_SIZE};

/// Maximum number of offset samples retained.
pub const WINDOW_SIZE: usize = CLOCK_WINDOW_SIZE;
/// Below this many samples, the receiver schedules another exchange soon.
pub const MIN_SAMPLES: usize = CLOCK_MIN_SAMPLES;
/// Delay before the extra exchange fires when under-sampled.
pub const RESAMPLE_DELAY: Duration = Duration::from_millis(10);
/// Steady-state re-sampling cadence once the window is warm.
pub const STEADY_STATE_INTERVAL: Duration = Duration::from_secs(1);

/// Tracks the offset between the server's monotonic clock and the local
/// audio clock, as seconds (`server_clock - local_audio_clock`).
///
/// Samples are never discarded on session end, only on transport reconnect
/// (`reset`).
#[derive(Debug, Default)]
pub struct ClockSync {
    window: VecDeque<f64>,
    last_sample_at: Option<Instant>,
}

impl ClockSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one exchange: `t0` = player_transmitted, `t1` =
    /// source_received, `t2` = source_transmitted, `t3` = player_received
    /// (all microseconds). Returns the new sample, in seconds.
    pub fn record_sample(&mut self, t0: i64, t1: i64, t2: i64, t3: i64) -> f64 {
        let sample_us = ((t1 - t0) + (t2 - t3)) as f64 / 2.0;
        let sample_s = sample_us / 1_000_000.0;

        if self.window.len() >= WINDOW_SIZE {
            self.window.pop_front();
        }
        self.window.push_back(sample_s);
        self.last_sample_at = Some(Instant::now());
        sample_s
    }

    /// Median of the current window, in seconds. `0.0` if no samples yet.
    pub fn offset(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.window.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    }

    /// Whether the window is below [`MIN_SAMPLES`] and an extra exchange
    /// should be scheduled after [`RESAMPLE_DELAY`].
    pub fn needs_resample(&self) -> bool {
        self.window.len() < MIN_SAMPLES
    }

    pub fn sample_count(&self) -> usize {
        self.window.len()
    }

    /// Clears all samples. Called on transport reconnect only.
    pub fn reset(&mut self) {
        self.window.clear();
        self.last_sample_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_single_sample_is_the_sample() {
        // T0=1_000_000, T1=1_050_000, T2=1_050_500, T3=1_100_000 (all us).
        // sample = ((T1-T0) + (T2-T3)) / 2 = (50_000 + (-49_500)) / 2 = 250us = 0.00025s.
        let mut sync = ClockSync::new();
        let sample = sync.record_sample(1_000_000, 1_050_000, 1_050_500, 1_100_000);
        assert!((sample - 0.00025).abs() < 1e-9);
        assert!((sync.offset() - 0.00025).abs() < 1e-9);
    }

    #[test]
    fn window_caps_at_fifty_samples() {
        let mut sync = ClockSync::new();
        for i in 0..70 {
            sync.record_sample(i, i, i, i);
        }
        assert_eq!(sync.sample_count(), WINDOW_SIZE);
    }

    #[test]
    fn under_twenty_samples_requests_resample() {
        let mut sync = ClockSync::new();
        for i in 0..19 {
            sync.record_sample(i, i, i, i);
        }
        assert!(sync.needs_resample());
        sync.record_sample(19, 19, 19, 19);
        assert!(!sync.needs_resample());
    }

    #[test]
    fn offset_is_median_not_mean() {
        let mut sync = ClockSync::new();
        // Three samples: 1s, 2s, 100s offset (as microsecond deltas).
        sync.record_sample(0, 1_000_000, 1_000_000, 0);
        sync.record_sample(0, 2_000_000, 2_000_000, 0);
        sync.record_sample(0, 100_000_000, 100_000_000, 0);
        assert_eq!(sync.offset(), 2.0);
    }

    #[test]
    fn reset_clears_window() {
        let mut sync = ClockSync::new();
        sync.record_sample(0, 1_000_000, 1_000_000, 0);
        sync.reset();
        assert_eq!(sync.sample_count(), 0);
        assert_eq!(sync.offset(), 0.0);
    }
}
