//! # Error Types
//!
//! Transport errors are fatal to a connection and surface from `start`.
//! Frame errors never leave the read loop (see `codec::FrameError`).
//! Dispatch errors become response statuses, not Rust errors. What remains
//! here are the local failures a caller or handler author can observe.

use crate::codec::FrameError;
use rpc_bus::BusError;
use rpc_types::{Address, CommandIndex};
use thiserror::Error;

/// Errors from the connection lifecycle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Subscribe/publish bindings could not be established.
    #[error("Transport error: {0}")]
    Transport(#[from] BusError),

    /// The connection was closed and cannot be started again.
    #[error("Connection closed")]
    Closed,

    /// `start` was called while the read loop is already running.
    #[error("Connection already started")]
    AlreadyStarted,
}

/// Errors from publishing a frame.
#[derive(Debug, Error)]
pub enum SendError {
    /// No publish binding yet (connection not started) or already closed.
    #[error("Connection is not ready")]
    NotConnected,

    /// The payload could not be encoded.
    #[error("Failed to encode frame: {0}")]
    Encode(#[from] FrameError),

    /// The bus rejected the frame.
    #[error("Transport error: {0}")]
    Transport(#[from] BusError),
}

/// Errors from the correlation table.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CorrelationError {
    /// A delivery queue already exists for this address.
    #[error("Address {0} is already registered")]
    AddressInUse(Address),
}

/// Errors from issuing a call.
#[derive(Debug, Error)]
pub enum CallError {
    #[error(transparent)]
    Send(#[from] SendError),

    #[error(transparent)]
    Correlation(#[from] CorrelationError),

    /// An argument could not be converted to a wire value.
    #[error("Invalid argument {name}: {reason}")]
    InvalidArgument { name: String, reason: String },
}

/// Command registry misuse.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Command with index {0} already registered")]
    AlreadyRegistered(CommandIndex),

    #[error("Command with index {0} is not registered")]
    NotRegistered(CommandIndex),
}

/// Errors from replying to a request.
#[derive(Debug, Error)]
pub enum ReplyError {
    /// The once-only reply slot for this request was already used.
    #[error("Reply was already sent for this request")]
    AlreadyReplied,

    #[error("Could not convert reply value: {0}")]
    Value(#[from] serde_json::Error),

    #[error(transparent)]
    Send(#[from] SendError),
}
