//! Concrete [`AudioOutput`] backed by `cpal`.
//!
//! Unlike a plain FIFO player, scheduling happens against an explicit
//! timeline: [`CpalOutput::now`] reports how many frames the device has
//! actually consumed, and [`CpalOutput::play_at`] pads the pending buffer
//! with silence up to the requested start frame before appending samples.
//! This lets a chunk that arrives early play at exactly the right instant
//! instead of merely next-in-line.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use resonate_core::receiver::AudioOutput;

pub struct CpalOutput {
    _stream: cpal::Stream,
    sample_rate: u32,
    channels: u8,
    /// Frames already pulled by the device callback — the cursor that
    /// defines "now" on the playback timeline.
    consumed_frames: Arc<AtomicU64>,
    buffer: Arc<Mutex<VecDeque<f32>>>,
}

impl CpalOutput {
    pub fn new(sample_rate: u32, channels: u8, device_name: Option<&str>) -> anyhow::Result<Self> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .output_devices()?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| anyhow::anyhow!("output device '{}' not found", name))?,
            None => host
                .default_output_device()
                .ok_or_else(|| anyhow::anyhow!("no default output device available"))?,
        };

        log::info!(
            "[CpalOutput] using device {:?} at {}Hz/{}ch",
            device.name().unwrap_or_default(),
            sample_rate,
            channels
        );

        let config = StreamConfig {
            channels: channels as u16,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let consumed_frames = Arc::new(AtomicU64::new(0));
        let buffer: Arc<Mutex<VecDeque<f32>>> = Arc::new(Mutex::new(VecDeque::new()));

        let callback_buffer = Arc::clone(&buffer);
        let callback_consumed = Arc::clone(&consumed_frames);
        let channels_usize = channels.max(1) as usize;

        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut buf = callback_buffer.lock().expect("audio buffer mutex poisoned");
                for sample_out in data.iter_mut() {
                    *sample_out = buf.pop_front().unwrap_or(0.0);
                }
                drop(buf);
                callback_consumed.fetch_add((data.len() / channels_usize) as u64, Ordering::Relaxed);
            },
            |err| log::error!("[CpalOutput] stream error: {}", err),
            None,
        )?;
        stream.play()?;

        Ok(Self {
            _stream: stream,
            sample_rate,
            channels,
            consumed_frames,
            buffer,
        })
    }
}

impl AudioOutput for CpalOutput {
    fn now(&self) -> f64 {
        self.consumed_frames.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
    }

    fn play_at(&self, start_local: f64, channels: u8, planes: Vec<Vec<f32>>) {
        let target_frame = (start_local * self.sample_rate as f64).round().max(0.0) as u64;
        let mut buf = self.buffer.lock().expect("audio buffer mutex poisoned");

        let consumed = self.consumed_frames.load(Ordering::Relaxed);
        let buffer_end_frame = consumed + buf.len() as u64 / self.channels.max(1) as u64;
        if target_frame > buffer_end_frame {
            let silence_frames = target_frame - buffer_end_frame;
            buf.extend(std::iter::repeat(0.0).take((silence_frames * self.channels.max(1) as u64) as usize));
        }

        let frame_count = planes.first().map_or(0, Vec::len);
        let channels = channels.max(1) as usize;
        for i in 0..frame_count {
            for plane in planes.iter().take(channels) {
                buf.push_back(plane[i]);
            }
        }
    }
}
