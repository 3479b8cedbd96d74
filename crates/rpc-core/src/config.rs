//! # Configuration
//!
//! Everything an embedder can tune on a connection.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RPC_CHANNEL` | (required) | Channel name, without the `rpc:` prefix |
//! | `RPC_NODE` | fresh UUIDv4 hex | Node identity |
//! | `RPC_DEFAULT_TIMEOUT_MS` | unset (fire-and-forget) | Default call timeout |
//! | `RPC_EXPECT_RESPONSES` | unset (unbounded) | Default expected response count |
//! | `RPC_BUS_CAPACITY` | 1000 | Per-channel buffer of an in-memory bus |

use crate::codec::{CborCodec, DeserializeFn, FnCodec, PayloadCodec, SerializeFn};
use rpc_bus::{InMemoryBus, DEFAULT_CHANNEL_CAPACITY};
use rpc_types::NodeId;
use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Prefix applied to every channel name on the bus.
pub const CHANNEL_PREFIX: &str = "rpc:";

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The channel name is empty or missing.
    #[error("Channel name is required")]
    MissingChannel,

    /// Only one half of the serializer pair was supplied.
    #[error("Serializer and deserializer must be supplied together (missing {missing})")]
    IncompleteCodec { missing: &'static str },

    /// Both a codec object and a serializer pair were supplied.
    #[error("Supply either a codec or a serializer pair, not both")]
    ConflictingCodec,

    /// An environment variable could not be parsed.
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Connection configuration.
#[derive(Clone, Default)]
pub struct RpcConfig {
    /// Channel name (without prefix).
    pub name: String,

    /// Node identity. A fresh one is generated when unset.
    pub node: Option<NodeId>,

    /// Timeout applied to calls that do not give one. `None` makes such
    /// calls fire-and-forget.
    pub default_timeout: Option<Duration>,

    /// Expected response count applied to calls that do not give one.
    pub default_expected_responses: Option<usize>,

    /// Custom payload serializer. Requires `deserializer`.
    pub serializer: Option<SerializeFn>,

    /// Custom payload deserializer. Requires `serializer`.
    pub deserializer: Option<DeserializeFn>,

    /// Custom payload codec object.
    pub codec: Option<Arc<dyn PayloadCodec>>,

    /// Frames buffered per subscriber when the bus is in-process.
    pub bus_capacity: Option<usize>,
}

impl RpcConfig {
    /// Create a configuration for a channel with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Create configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| env::var(key).ok())
    }

    fn from_vars(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let name = get("RPC_CHANNEL").ok_or(ConfigError::MissingChannel)?;
        let mut config = Self::new(name);

        config.node = get("RPC_NODE").map(NodeId::from);

        if let Some(value) = get("RPC_DEFAULT_TIMEOUT_MS") {
            let millis = value.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: "RPC_DEFAULT_TIMEOUT_MS",
                value: value.clone(),
            })?;
            config.default_timeout = Some(Duration::from_millis(millis));
        }

        if let Some(value) = get("RPC_EXPECT_RESPONSES") {
            let count = value.parse::<usize>().map_err(|_| ConfigError::InvalidValue {
                key: "RPC_EXPECT_RESPONSES",
                value: value.clone(),
            })?;
            config.default_expected_responses = Some(count);
        }

        if let Some(value) = get("RPC_BUS_CAPACITY") {
            let capacity = value
                .parse::<usize>()
                .ok()
                .filter(|c| *c > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "RPC_BUS_CAPACITY",
                    value: value.clone(),
                })?;
            config.bus_capacity = Some(capacity);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_node(mut self, node: impl Into<NodeId>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn with_default_expected_responses(mut self, count: usize) -> Self {
        self.default_expected_responses = Some(count);
        self
    }

    pub fn with_serializer(mut self, serializer: SerializeFn) -> Self {
        self.serializer = Some(serializer);
        self
    }

    pub fn with_deserializer(mut self, deserializer: DeserializeFn) -> Self {
        self.deserializer = Some(deserializer);
        self
    }

    pub fn with_codec(mut self, codec: impl PayloadCodec + 'static) -> Self {
        self.codec = Some(Arc::new(codec));
        self
    }

    pub fn with_bus_capacity(mut self, capacity: usize) -> Self {
        self.bus_capacity = Some(capacity);
        self
    }

    /// An in-process bus sized by `bus_capacity`.
    #[must_use]
    pub fn in_memory_bus(&self) -> InMemoryBus {
        InMemoryBus::with_capacity(self.bus_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY))
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// - `ConfigError::MissingChannel` - Empty channel name
    /// - `ConfigError::IncompleteCodec` - Only one of serializer/deserializer
    /// - `ConfigError::ConflictingCodec` - Both a codec and a serializer pair
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingChannel);
        }

        match (&self.serializer, &self.deserializer) {
            (Some(_), None) => {
                return Err(ConfigError::IncompleteCodec {
                    missing: "deserializer",
                })
            }
            (None, Some(_)) => {
                return Err(ConfigError::IncompleteCodec {
                    missing: "serializer",
                })
            }
            (Some(_), Some(_)) if self.codec.is_some() => {
                return Err(ConfigError::ConflictingCodec)
            }
            _ => {}
        }

        Ok(())
    }

    /// The channel name used on the bus.
    #[must_use]
    pub fn channel(&self) -> String {
        format!("{CHANNEL_PREFIX}{}", self.name)
    }

    /// Resolve the payload codec: serializer pair, then codec object, then CBOR.
    pub fn resolve_codec(&self) -> Result<Arc<dyn PayloadCodec>, ConfigError> {
        self.validate()?;
        if let (Some(serialize), Some(deserialize)) = (&self.serializer, &self.deserializer) {
            return Ok(Arc::new(FnCodec::new(serialize.clone(), deserialize.clone())));
        }
        Ok(self
            .codec
            .clone()
            .unwrap_or_else(|| Arc::new(CborCodec) as Arc<dyn PayloadCodec>))
    }
}

impl fmt::Debug for RpcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcConfig")
            .field("name", &self.name)
            .field("node", &self.node)
            .field("default_timeout", &self.default_timeout)
            .field("default_expected_responses", &self.default_expected_responses)
            .field("serializer", &self.serializer.is_some())
            .field("deserializer", &self.deserializer.is_some())
            .field("codec", &self.codec.as_ref().map(|c| c.name()))
            .field("bus_capacity", &self.bus_capacity)
            .finish()
    }
}
