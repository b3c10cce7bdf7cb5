//! Centralized error types, one typed enum per subsystem.

use thiserror::Error;

/// Errors from the pure wire codec (§4.1). Never fatal to the connection;
/// callers log and drop the offending frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unknown binary discriminator: {0}")]
    UnknownType(u8),

    #[error("truncated binary header: need {needed} bytes, have {got}")]
    TruncatedHeader { needed: usize, got: usize },

    #[error("payload length {actual} does not match expected {expected}")]
    DataSizeMismatch { expected: usize, actual: usize },

    #[error("invalid JSON text message: {0}")]
    BadJson(String),

    #[error("unknown art format byte: {0}")]
    UnknownFormat(u8),
}

/// Protocol-level violations on the server side (§7). The client proxy tears
/// the connection down on these.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("send message before player hello")]
    MessageBeforeHello,

    #[error("client is not connected")]
    ClientNotConnected,

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("client outbound backlog exceeded its bound")]
    BacklogExceeded,
}

/// Semantic errors raised to callers of the group/session engine (§4.5/§4.6).
/// Never surfaced on the wire.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session already active for this group")]
    SessionAlreadyActive,

    #[error("no session active for this group")]
    NoSessionActive,

    #[error("channel count {given} does not match session channel count {expected}")]
    ChannelMismatch { expected: u8, given: u8 },

    #[error("group {0} not found")]
    GroupNotFound(String),

    #[error("client {0} not found")]
    ClientNotFound(String),
}

pub type CodecResult<T> = Result<T, CodecError>;
pub type ProtocolResult<T> = Result<T, ProtocolError>;
pub type SessionResult<T> = Result<T, SessionError>;
