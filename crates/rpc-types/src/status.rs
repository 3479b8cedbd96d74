//! # Status Codes and Message Kinds
//!
//! Both enumerations are closed: any other integer on the wire is rejected.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of dispatching one request, carried in every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum StatusCode {
    /// The handler produced a value.
    Success = 0,
    /// The request payload could not be decoded.
    BadFormat = 1,
    /// No handler is registered for the command index.
    UnknownCommand = 2,
    /// The argument bundle did not satisfy the handler's parameters.
    BadParams = 3,
    /// The handler failed while executing.
    InternalError = 4,
}

impl StatusCode {
    /// Returns true for `Success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, StatusCode::Success)
    }
}

/// A status integer outside the known vocabulary.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Unknown status code: {0}")]
pub struct UnknownStatus(pub u8);

impl TryFrom<u8> for StatusCode {
    type Error = UnknownStatus;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Success),
            1 => Ok(Self::BadFormat),
            2 => Ok(Self::UnknownCommand),
            3 => Ok(Self::BadParams),
            4 => Ok(Self::InternalError),
            other => Err(UnknownStatus(other)),
        }
    }
}

impl From<StatusCode> for u8 {
    fn from(status: StatusCode) -> Self {
        status as u8
    }
}

/// Frame discriminator: the first byte of every frame on the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Request = 1,
    Response = 2,
}

impl MessageKind {
    /// Map a discriminator byte to a kind; `None` means "unknown type".
    #[must_use]
    pub fn from_discriminator(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Request),
            2 => Some(Self::Response),
            _ => None,
        }
    }

    /// The discriminator byte for this kind.
    #[must_use]
    pub fn discriminator(&self) -> u8 {
        *self as u8
    }
}
