//! # In-Memory Bus
//!
//! Single-process implementation of [`BroadcastBus`].

use crate::subscription::Subscription;
use crate::{BroadcastBus, BusError, DEFAULT_CHANNEL_CAPACITY};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

/// In-memory implementation of the broadcast bus.
///
/// Uses one `tokio::sync::broadcast` channel per channel name, created on
/// first use. Suitable for single-process operation and tests; distributed
/// deployments bind a real broker behind the same trait.
pub struct InMemoryBus {
    /// Broadcast sender per channel name.
    channels: RwLock<HashMap<String, broadcast::Sender<Bytes>>>,

    /// Total frames published.
    frames_published: AtomicU64,

    /// Set once `shutdown` has been called.
    closed: AtomicBool,

    /// Per-channel capacity.
    capacity: usize,
}

impl InMemoryBus {
    /// Create a new in-memory bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new in-memory bus with specified per-channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            frames_published: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            capacity: capacity.max(1),
        }
    }

    /// Get the number of active subscribers on a channel.
    #[must_use]
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .get(channel)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Get the number of channels with a live sender.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }

    /// Get the total number of frames published.
    #[must_use]
    pub fn frames_published(&self) -> u64 {
        self.frames_published.load(Ordering::Relaxed)
    }

    /// Get the per-channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Close the bus.
    ///
    /// Every open subscription stream ends; later subscribes and publishes
    /// fail with [`BusError::Closed`].
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let dropped = {
            let mut channels = self.channels.write();
            std::mem::take(&mut *channels)
        };
        debug!(channels = dropped.len(), "In-memory bus shut down");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BroadcastBus for InMemoryBus {
    async fn subscribe(&self, channel: &str) -> Result<Subscription, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        let receiver = {
            let mut channels = self.channels.write();
            channels
                .entry(channel.to_string())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };

        debug!(channel = channel, "New subscription created");

        Ok(Subscription::from_broadcast(channel, receiver))
    }

    async fn publish(&self, channel: &str, frame: Bytes) -> Result<usize, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        // Always increment counter (frame was attempted)
        self.frames_published.fetch_add(1, Ordering::Relaxed);

        let sender = self.channels.read().get(channel).cloned();
        let Some(sender) = sender else {
            debug!(channel = channel, "Frame dropped (channel has no subscribers)");
            return Ok(0);
        };

        match sender.send(frame) {
            Ok(receivers) => {
                debug!(channel = channel, receivers = receivers, "Frame published");
                Ok(receivers)
            }
            Err(_) => {
                // No receivers - frame is dropped and the idle channel pruned
                let mut channels = self.channels.write();
                if channels.get(channel).is_some_and(|s| s.receiver_count() == 0) {
                    channels.remove(channel);
                }
                debug!(channel = channel, "Frame dropped (no receivers)");
                Ok(0)
            }
        }
    }
}
