//! Resonate Core - shared library for Resonate, a synchronized multi-room
//! audio streaming system.
//!
//! This crate provides the core functionality shared by the two binaries in
//! this workspace: the server (`apps/server`) and the receiving client
//! (`apps/receiver`).
//!
//! # Architecture
//!
//! - [`model`]: Core data model shared across the wire protocol.
//! - [`codec`]: Binary/JSON wire codec (§4.1).
//! - [`clock`]: Clock synchronization (§4.2).
//! - [`protocol_constants`]: Fixed values the wire protocol depends on.
//! - [`client_proxy`]: Server-side representation of one connected receiver (§4.4).
//! - [`session`]: Fan-out engine for an active group session (§4.5).
//! - [`group`]: Group membership and at-most-one-session invariant (§4.6).
//! - [`server`]: Top-level accept/dispatch loop (§4.7).
//! - [`receiver`]: The library-side half of a receiving device (§4.3).
//! - [`events`]: Internal event system used to decouple components.
//! - [`api`]: The HTTP/WebSocket transport layer for the server binary.
//! - [`error`]: Centralized, typed error enums, one per subsystem.

#![warn(clippy::all)]

pub mod api;
pub mod client_proxy;
pub mod clock;
pub mod codec;
pub mod error;
pub mod events;
pub mod group;
pub mod model;
pub mod protocol_constants;
pub mod receiver;
pub mod server;
pub mod session;
pub mod utils;

pub use client_proxy::ClientProxy;
pub use error::{CodecError, ProtocolError, SessionError};
pub use events::{BroadcastEvent, BroadcastEventBridge, EventEmitter};
pub use group::Group;
pub use receiver::{AudioOutput, ReceiverClient, ReceiverState};
pub use server::Server;
pub use session::SessionEngine;

pub use api::{start_server, AppState, ServerError};
