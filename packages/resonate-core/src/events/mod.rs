//! Event system for internal component communication.
//!
//! This module provides:
//! - [`EventEmitter`] trait for domain services to emit events
//! - Event types for the server-side client proxy, the group/session
//!   engine, and the receiver client.
//!
//! The actual transport implementation (WebSocket) is handled separately in
//! the `api` module using [`BroadcastEventBridge`].

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::codec::{GroupJoinPayload, StreamCommandPayload};
use crate::model::{MediaArt, Metadata, PlayerInfo, PlayerState, ServerInfo, SessionInfo};

/// Events broadcast within the server: one category per originating
/// component.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Events raised by a server-side client proxy (§4.4).
    ClientProxy(ClientProxyEvent),
    /// Events raised by the group manager (§4.6).
    Group(GroupEvent),
    /// Events raised by the receiver client state machine (§4.3).
    Receiver(ReceiverEvent),
    /// Events re-emitted on an active session's own stream (§4.5).
    Session(SessionEvent),
}

/// Events raised by a single server-side client proxy, keyed implicitly by
/// the subscriber (one proxy per connection).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientProxyEvent {
    /// The receiver announced itself (`player/hello`).
    Hello { client_id: String, info: PlayerInfo },
    /// The receiver reported playback state (`player/state`).
    PlayerState { client_id: String, state: PlayerState },
    /// The receiver requested a transport action (`stream/command`).
    StreamCommand {
        client_id: String,
        command: StreamCommandPayload,
    },
    /// The receiver asked to join, leave, or list groups.
    GroupCommand {
        client_id: String,
        command: GroupCommand,
    },
    /// The connection closed, by either side.
    Close { client_id: String },
}

/// The three `group/*` commands a receiver may send.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum GroupCommand {
    Join(GroupJoinPayload),
    Unjoin,
    GetList,
}

/// Events raised by the group manager.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GroupEvent {
    /// A client joined a group.
    ClientAdded { group_id: String, client_id: String },
    /// A client left a group, either voluntarily or on disconnect.
    ClientRemoved { group_id: String, client_id: String },
    /// The active session for a group ended.
    SessionEnd { group_id: String, session_id: String },
}

/// Events raised by the receiver client state machine.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ReceiverEvent {
    /// The transport opened; `player/hello` was just sent.
    Open,
    /// The connection closed. `expected` distinguishes a caller-initiated
    /// close from a transport-initiated one.
    Close { expected: bool },
    /// `source/hello` was received.
    ServerUpdate { server: ServerInfo },
    /// A session started (`Some`) or ended (`None`).
    SessionUpdate { session: Option<SessionInfo> },
    /// Metadata changed (`Some`) or was cleared on session end (`None`).
    MetadataUpdate { metadata: Option<Metadata> },
    /// Art changed (`Some`) or was cleared on session end (`None`).
    ArtUpdate { art: Option<MediaArt> },
}

/// Events raised on an active session's own stream once a client is
/// activated (§4.5 step 5): the client's `stream/command` and `player/state`
/// reports, re-emitted scoped to the session that bound them. Each active
/// client gets an [`crate::client_proxy::SessionEventSink`] binding that
/// produces these; the binding is torn down (and emission stops) the moment
/// the client is removed from `active`, per the §3 data-model invariant.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    StreamCommand {
        session_id: String,
        client_id: String,
        command: StreamCommandPayload,
    },
    PlayerState {
        session_id: String,
        client_id: String,
        state: PlayerState,
    },
}

impl From<ClientProxyEvent> for BroadcastEvent {
    fn from(event: ClientProxyEvent) -> Self {
        BroadcastEvent::ClientProxy(event)
    }
}

impl From<GroupEvent> for BroadcastEvent {
    fn from(event: GroupEvent) -> Self {
        BroadcastEvent::Group(event)
    }
}

impl From<ReceiverEvent> for BroadcastEvent {
    fn from(event: ReceiverEvent) -> Self {
        BroadcastEvent::Receiver(event)
    }
}

impl From<SessionEvent> for BroadcastEvent {
    fn from(event: SessionEvent) -> Self {
        BroadcastEvent::Session(event)
    }
}
