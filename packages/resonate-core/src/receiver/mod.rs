//! Receiver client (§4.3): the library-side half of a receiving device.
//!
//! This module owns protocol state and scheduling decisions; it knows
//! nothing about the transport (a concrete WebSocket client lives in the
//! `apps/receiver` binary) or the concrete audio device (a `cpal`-backed
//! [`audio::AudioOutput`] also lives there). That split mirrors the
//! server side, where `resonate-core` owns protocol/session logic and the
//! binary crates own I/O.

pub mod audio;
mod client;

pub use audio::AudioOutput;
pub use client::{ReceiverClient, ReceiverState};
