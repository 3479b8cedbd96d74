//! # Subscription
//!
//! The receiving side of a bus channel.

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

/// A subscription handle for receiving frames from one channel.
///
/// The stream ends when the bus closes the channel. Dropping the handle
/// unsubscribes.
pub struct Subscription {
    /// Channel this subscription listens on.
    channel: String,

    /// Inbound frames.
    frames: BoxStream<'static, Bytes>,
}

impl Subscription {
    /// Wrap any frame stream as a subscription.
    ///
    /// Bus implementations backed by an external broker use this to adapt
    /// their client's message stream.
    pub fn new(channel: impl Into<String>, frames: BoxStream<'static, Bytes>) -> Self {
        Self {
            channel: channel.into(),
            frames,
        }
    }

    /// Build a subscription from a `tokio::sync::broadcast` receiver.
    ///
    /// Lagged receivers skip the frames they missed.
    pub fn from_broadcast(
        channel: impl Into<String>,
        receiver: broadcast::Receiver<Bytes>,
    ) -> Self {
        let channel = channel.into();
        let name = channel.clone();
        let frames = BroadcastStream::new(receiver).filter_map(move |item| {
            let frame = match item {
                Ok(frame) => Some(frame),
                Err(BroadcastStreamRecvError::Lagged(count)) => {
                    debug!(
                        channel = %name,
                        lagged = count,
                        "Subscriber lagged, some frames dropped"
                    );
                    None
                }
                #[allow(unreachable_patterns)]
                Err(e) => {
                    debug!(channel = %name, error = %e, "Subscriber receive error");
                    None
                }
            };
            futures::future::ready(frame)
        });
        Self::new(channel, frames.boxed())
    }

    /// Receive the next frame.
    ///
    /// # Returns
    ///
    /// - `Some(frame)` - The next frame on the channel
    /// - `None` - The channel was closed
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.frames.next().await
    }

    /// Get the channel name.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Stream for Subscription {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.frames.poll_next_unpin(cx)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}
