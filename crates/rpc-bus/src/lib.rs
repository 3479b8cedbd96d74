//! # RPC Bus - Broadcast Channel
//!
//! The transport the correlation layer runs on: a named, many-publisher,
//! many-subscriber byte-message bus with deliver-to-all semantics.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │   Node A     │                    │   Node B     │
//! │              │    publish()       │              │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  "rpc:name"  │          │
//!                  │   channel    │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! The bus may drop frames (slow subscribers lag, publishes with no
//! subscribers vanish). Nothing above it compensates beyond timeouts.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod memory;
pub mod subscription;

pub use memory::InMemoryBus;
pub use subscription::Subscription;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Maximum frames to buffer per subscriber before it starts lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Errors from bus operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The bus was shut down.
    #[error("Bus closed")]
    Closed,

    /// A subscription could not be established.
    #[error("Failed to subscribe to {channel}: {reason}")]
    Subscribe { channel: String, reason: String },

    /// A frame could not be handed to the bus.
    #[error("Failed to publish to {channel}: {reason}")]
    Publish { channel: String, reason: String },
}

/// A broadcast bus connection.
///
/// Implementations bind a real broker (Redis pub/sub, NATS, ...) or, for a
/// single process, [`InMemoryBus`].
#[async_trait]
pub trait BroadcastBus: Send + Sync {
    /// Subscribe to every frame published on `channel` from now on.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, BusError>;

    /// Publish a frame to every current subscriber of `channel`.
    ///
    /// # Returns
    ///
    /// The number of subscribers the frame was delivered to. Zero is not an
    /// error: publishing is fire-and-forget.
    async fn publish(&self, channel: &str, frame: Bytes) -> Result<usize, BusError>;
}
