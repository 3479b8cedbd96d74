//! # Request and Response Payloads
//!
//! The logical content of a frame, after the discriminator byte has been
//! stripped. Field names are the short wire names shared with every other
//! implementation on the channel.
//!
//! ## Absent vs. null result
//!
//! A response whose handler explicitly declined to produce a value omits `d`
//! entirely. A handler that returned `null` produces `d: null`. The two are
//! kept distinct through decode: `data` is `None` vs. `Some(Value::Null)`.

use crate::ids::{Address, CommandIndex, NodeId};
use crate::status::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Argument bundle: handler parameter name to value.
pub type Arguments = serde_json::Map<String, Value>;

/// A command invocation broadcast to every node on the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Index of the command to run.
    #[serde(rename = "c")]
    pub command: CommandIndex,

    /// Identity of the sending node.
    #[serde(rename = "n", default, skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeId>,

    /// Correlation address. Absent for fire-and-forget calls.
    #[serde(rename = "a", default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,

    /// Arguments for the handler.
    #[serde(rename = "d", default)]
    pub arguments: Arguments,
}

impl Request {
    /// Create a request with no sender, address or arguments.
    pub fn new(command: CommandIndex) -> Self {
        Self {
            command,
            node: None,
            address: None,
            arguments: Arguments::new(),
        }
    }

    /// Returns true if no reply is possible for this request.
    #[must_use]
    pub fn is_fire_and_forget(&self) -> bool {
        self.address.is_none()
    }
}

/// One reply to a request, tagged with the responder's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "s")]
    pub status: StatusCode,

    /// Identity of the responding node.
    #[serde(rename = "n")]
    pub node: NodeId,

    /// Echo of the request's correlation address.
    #[serde(rename = "a")]
    pub address: Address,

    /// Result value, or a failure description for non-success statuses.
    #[serde(
        rename = "d",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub data: Option<Value>,
}

impl Response {
    pub fn new(status: StatusCode, node: NodeId, address: Address, data: Option<Value>) -> Self {
        Self {
            status,
            node,
            address,
            data,
        }
    }

    /// Returns true if the responder reported success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the result value into a concrete type.
    ///
    /// A missing value decodes as `null`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone().unwrap_or(Value::Null))
    }
}

/// A present `d` field is always `Some`, even when it holds `null`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
