//! WebSocket handler: one connection per receiver, translating transport
//! frames into [`ClientProxy`] calls and draining its outbound queue back
//! onto the socket.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use tokio::sync::mpsc;

use crate::api::AppState;
use crate::client_proxy::{ClientProxy, OutboundFrame};
use crate::codec::decode_client_message;
use crate::protocol_constants::{WS_HEARTBEAT_CHECK_INTERVAL_SECS, WS_HEARTBEAT_TIMEOUT_SECS};

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Main WebSocket connection handler: one per receiver.
async fn handle_ws(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let conn_guard = state.ws_manager.register();
    log::info!("[WS] connection established: {}", conn_guard.id());

    let (outbound_tx, mut outbound_rx) = mpsc::channel(state.max_client_backlog);
    let client = Arc::new(ClientProxy::new(outbound_tx, Arc::clone(&state.event_bridge) as _));
    state.server.accept(Arc::clone(&client));

    let mut last_activity = Instant::now();
    let mut heartbeat_interval = tokio::time::interval(Duration::from_secs(WS_HEARTBEAT_CHECK_INTERVAL_SECS));
    heartbeat_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = conn_guard.cancel_token().cancelled() => {
                log::info!("[WS] connection force-closed: {}", client.client_id());
                break;
            }
            frame = outbound_rx.recv() => {
                match frame {
                    Some(OutboundFrame::Text(text)) => {
                        if sender.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(OutboundFrame::Binary(bytes)) => {
                        if sender.send(Message::Binary(bytes.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            msg = receiver.next() => {
                last_activity = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match decode_client_message(&text) {
                            Ok(parsed) => {
                                if let Err(e) = client.handle_incoming(parsed) {
                                    log::warn!("[WS] protocol error from {}: {}", client.client_id(), e);
                                    break;
                                }
                            }
                            Err(e) => {
                                log::warn!("[WS] malformed message from {}: {}", client.client_id(), e);
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        // Binary frames flow server → receiver only (§4.4);
                        // anything arriving from the client is logged and dropped.
                        log::debug!("[WS] dropping unexpected binary frame from {}", client.client_id());
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            _ = heartbeat_interval.tick() => {
                if last_activity.elapsed() > Duration::from_secs(WS_HEARTBEAT_TIMEOUT_SECS) {
                    log::warn!("[WS] heartbeat timeout: {}", client.client_id());
                    break;
                }
            }
        }
    }

    client.close();
}
