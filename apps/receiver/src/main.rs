//! Resonate Receiver - headless receiving client for synchronized
//! multi-room audio streaming.
//!
//! Connects to a server over WebSocket, drives [`ReceiverClient`]'s protocol
//! state machine, and renders decoded audio through a `cpal` output device.
//! Exits on transport close or Ctrl+C.

mod cpal_output;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use resonate_core::client_proxy::OutboundFrame;
use resonate_core::codec::{decode_binary_frame, DecodedFrame, ServerMessage};
use resonate_core::events::LoggingEventEmitter;
use resonate_core::model::PlayerInfo;
use resonate_core::protocol_constants::{DEFAULT_BIT_DEPTH, DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE};
use resonate_core::receiver::ReceiverClient;
use resonate_core::utils::now_micros;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::cpal_output::CpalOutput;

/// Resonate Receiver - connects to a Resonate server and plays synchronized audio.
#[derive(Parser, Debug)]
#[command(name = "resonate-receiver")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the server to connect to.
    #[arg(short, long, env = "RESONATE_SERVER_URL")]
    server: String,

    /// Name announced to the server in `player/hello`.
    #[arg(short, long, default_value = "Resonate Receiver", env = "RESONATE_PLAYER_NAME")]
    name: String,

    /// Output device name; the system default is used when omitted.
    #[arg(short, long, env = "RESONATE_OUTPUT_DEVICE")]
    device: Option<String>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "RESONATE_LOG_LEVEL")]
    log_level: log::LevelFilter,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Resonate Receiver v{}", env!("CARGO_PKG_VERSION"));

    let audio: Arc<CpalOutput> = Arc::new(
        CpalOutput::new(DEFAULT_SAMPLE_RATE, DEFAULT_CHANNELS, args.device.as_deref())
            .context("Failed to initialize audio output")?,
    );

    let player_info = PlayerInfo {
        player_id: uuid::Uuid::new_v4().to_string(),
        name: args.name,
        role: "speaker".into(),
        buffer_capacity: 65536,
        supported_codecs: vec!["pcm".into()],
        supported_channels: vec![DEFAULT_CHANNELS],
        supported_sample_rates: vec![DEFAULT_SAMPLE_RATE],
        supported_bit_depths: vec![DEFAULT_BIT_DEPTH],
        supported_stream_types: vec![],
        supported_picture_formats: vec!["jpeg".into(), "png".into()],
        display_width: None,
        display_height: None,
    };

    log::info!("[Receiver] connecting to {}", args.server);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&args.server)
        .await
        .with_context(|| format!("Failed to connect to {}", args.server))?;
    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<OutboundFrame>();
    let client = Arc::new(ReceiverClient::new(
        player_info,
        Arc::clone(&audio) as _,
        Arc::new(LoggingEventEmitter),
        outbound_tx,
    ));

    let forwarder = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let message = match frame {
                OutboundFrame::Text(text) => Message::Text(text.into()),
                OutboundFrame::Binary(bytes) => Message::Binary(bytes.into()),
            };
            if ws_sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let clock_task = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            loop {
                let delay = if client.needs_resample() {
                    resonate_core::clock::RESAMPLE_DELAY
                } else {
                    resonate_core::clock::STEADY_STATE_INTERVAL
                };
                tokio::time::sleep(delay).await;
                client.send_time_sample(now_micros());
            }
        })
    };

    // Tracks the active session's channel count; audio frames before a
    // session starts are impossible per the protocol, so this default is
    // never actually exercised for decoding.
    let channels = Arc::new(AtomicU8::new(DEFAULT_CHANNELS));

    client.on_open();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("[Receiver] Ctrl+C received, shutting down");
                client.on_close(true);
                break;
            }
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(parsed) => handle_server_message(&client, &channels, parsed),
                            Err(e) => log::warn!("[Receiver] malformed server message: {}", e),
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        let current_channels = channels.load(Ordering::Relaxed);
                        match decode_binary_frame(&bytes, current_channels) {
                            Ok(DecodedFrame::Audio(chunk)) => client.on_audio_chunk(chunk, current_channels),
                            Ok(DecodedFrame::Art { format, bytes }) => client.on_media_art(format, bytes),
                            Err(e) => log::warn!("[Receiver] malformed binary frame: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        log::info!("[Receiver] server closed the connection");
                        client.on_close(false);
                        break;
                    }
                    Some(Err(e)) => {
                        log::warn!("[Receiver] transport error: {}", e);
                        client.on_close(false);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    clock_task.abort();
    forwarder.abort();
    Ok(())
}

fn handle_server_message(client: &Arc<ReceiverClient>, channels: &Arc<AtomicU8>, msg: ServerMessage) {
    match msg {
        ServerMessage::SourceHello { payload } => client.on_source_hello(payload),
        ServerMessage::SourceTime { payload } => client.on_source_time(payload, now_micros()),
        ServerMessage::SessionStart { payload } => {
            channels.store(payload.channels, Ordering::Relaxed);
            client.on_session_start(payload);
        }
        ServerMessage::SessionEnd { .. } => client.on_session_end(),
        ServerMessage::MetadataUpdate { payload } => client.on_metadata_update(payload),
        ServerMessage::GroupList { .. } => {
            // Group listings are a server-management concern; this headless
            // receiver has no UI to present them to.
        }
    }
}
