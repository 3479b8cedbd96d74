//! # Responses
//!
//! The caller's view of one outstanding call.
//!
//! Exhaustion is checked before every yield:
//! - the expected count was already reached, or
//! - the deadline passed and nothing is left in the queue.
//!
//! The deadline is fixed when the call is issued. Each dequeue waits only
//! for the time that remains, so a trickle of responses cannot stretch the
//! call. On exhaustion the address is deregistered and late responses are
//! dropped by the table instead of piling up.

use crate::correlation::Registration;
use futures::future::BoxFuture;
use futures::{FutureExt, Stream};
use rpc_types::{Address, Response};
use std::future::IntoFuture;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::trace;

struct Pending {
    receiver: mpsc::UnboundedReceiver<Response>,
    registration: Registration,
    deadline: Instant,
    expected: Option<usize>,
}

/// Lazy, time-bounded sequence of responses to one call.
///
/// Consume it one at a time with [`Responses::next`], as a stream with
/// [`Responses::into_stream`], or all at once by awaiting it.
pub struct Responses {
    pending: Option<Pending>,
    seen: usize,
}

impl Responses {
    /// A sequence that is exhausted from the start (fire-and-forget calls).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            pending: None,
            seen: 0,
        }
    }

    /// A sequence fed by `receiver` until `deadline`.
    ///
    /// An expected count of zero means unbounded.
    #[must_use]
    pub fn pending(
        receiver: mpsc::UnboundedReceiver<Response>,
        registration: Registration,
        deadline: Instant,
        expected: Option<usize>,
    ) -> Self {
        Self {
            pending: Some(Pending {
                receiver,
                registration,
                deadline,
                expected: expected.filter(|n| *n > 0),
            }),
            seen: 0,
        }
    }

    /// The call's correlation address, while it is still registered.
    #[must_use]
    pub fn address(&self) -> Option<&Address> {
        self.pending.as_ref().map(|p| p.registration.address())
    }

    #[must_use]
    pub fn responses_seen(&self) -> usize {
        self.seen
    }

    /// Time left before the deadline. Zero once exhausted.
    #[must_use]
    pub fn time_remaining(&self) -> Duration {
        self.pending.as_ref().map_or(Duration::ZERO, |p| {
            p.deadline.saturating_duration_since(Instant::now())
        })
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.pending.is_none()
    }

    /// Wait for the next response.
    ///
    /// Returns `None` once the sequence is exhausted, and on every call after.
    pub async fn next(&mut self) -> Option<Response> {
        let pending = self.pending.as_mut()?;

        if pending.expected.is_some_and(|n| self.seen >= n) {
            self.finish();
            return None;
        }

        let received = match pending.receiver.try_recv() {
            Ok(response) => Some(response),
            Err(_) => timeout_at(pending.deadline, pending.receiver.recv())
                .await
                .ok()
                .flatten(),
        };

        let Some(response) = received else {
            self.finish();
            return None;
        };

        self.seen += 1;
        if pending.expected.is_some_and(|n| self.seen >= n) {
            self.finish();
        }
        Some(response)
    }

    /// Drain every remaining response.
    pub async fn collect(mut self) -> Vec<Response> {
        let mut responses = Vec::new();
        while let Some(response) = self.next().await {
            responses.push(response);
        }
        responses
    }

    /// Adapt into a `Stream` that yields responses as they arrive.
    pub fn into_stream(self) -> impl Stream<Item = Response> + Send + 'static {
        futures::stream::unfold(self, |mut responses| async move {
            responses.next().await.map(|response| (response, responses))
        })
    }

    fn finish(&mut self) {
        if let Some(mut pending) = self.pending.take() {
            pending.registration.release();
            trace!(
                address = %pending.registration.address(),
                seen = self.seen,
                "Call exhausted"
            );
        }
    }
}

impl IntoFuture for Responses {
    type Output = Vec<Response>;
    type IntoFuture = BoxFuture<'static, Vec<Response>>;

    fn into_future(self) -> Self::IntoFuture {
        self.collect().boxed()
    }
}

impl std::fmt::Debug for Responses {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responses")
            .field("address", &self.address())
            .field("seen", &self.seen)
            .field("exhausted", &self.is_exhausted())
            .finish()
    }
}
