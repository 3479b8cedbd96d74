//! # Connection
//!
//! Owns the subscribe/publish bindings for one channel and runs the
//! demultiplexing loop over inbound frames.
//!
//! ```text
//!                  ┌──────────────────────────────┐
//!   bus frames ──► │ Connection::start (one loop) │
//!                  └──────────────┬───────────────┘
//!                                 │ codec::decode
//!               ┌─────────────────┴─────────────────┐
//!               ▼ kind = 1                          ▼ kind = 2
//!   RequestHandler::make_request        ResponseHandler::make_response
//!   RequestHandler::handle_request      ResponseHandler::handle_response
//!   (spawned on the runtime handle)     (inline, keeps arrival order)
//! ```
//!
//! The loop never awaits a handler: a slow command handler cannot hold up
//! response delivery for other calls.

use crate::codec::{self, FrameError, PayloadCodec};
use crate::config::{ConfigError, RpcConfig};
use crate::error::{ConnectionError, SendError};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use rpc_bus::BroadcastBus;
use rpc_types::{MessageKind, NodeId, Request, Response};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle of a connection's bus bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Not started, or the transport ended the stream.
    Idle,
    /// Bindings are established and the read loop is running.
    Ready,
    /// Closed for good.
    Closed,
}

/// A frame whose payload decoded but does not form a valid message.
#[derive(Debug, Clone, Error)]
#[error("Malformed {kind:?} payload: {reason}")]
pub struct MalformedPayload {
    pub kind: MessageKind,
    pub payload: Value,
    pub reason: String,
}

impl MalformedPayload {
    fn new(kind: MessageKind, payload: Value, reason: impl ToString) -> Self {
        Self {
            kind,
            payload,
            reason: reason.to_string(),
        }
    }
}

/// Hook for inbound requests (the server side).
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Build a request from a decoded payload.
    fn make_request(&self, payload: Value) -> Result<Request, MalformedPayload> {
        serde_json::from_value(payload.clone())
            .map_err(|e| MalformedPayload::new(MessageKind::Request, payload, e))
    }

    async fn handle_request(&self, request: Request);

    /// Called for request payloads that `make_request` rejected.
    async fn handle_malformed(&self, malformed: MalformedPayload) {
        debug!(reason = %malformed.reason, "Skipping malformed request");
    }
}

/// Hook for inbound responses (the caller side).
///
/// Runs inline on the read loop, so it must not block.
pub trait ResponseHandler: Send + Sync {
    /// Build a response from a decoded payload.
    fn make_response(&self, payload: Value) -> Result<Response, MalformedPayload> {
        serde_json::from_value(payload.clone())
            .map_err(|e| MalformedPayload::new(MessageKind::Response, payload, e))
    }

    fn handle_response(&self, response: Response);
}

/// Counters shared by the loop and every sender clone.
#[derive(Debug, Default)]
struct Counters {
    frames_received: AtomicU64,
    frames_skipped: AtomicU64,
    requests_sent: AtomicU64,
    responses_sent: AtomicU64,
}

/// Connection statistics snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub frames_received: u64,
    /// Frames dropped by the loop: unknown kind, undecodable, or malformed.
    pub frames_skipped: u64,
    pub requests_sent: u64,
    pub responses_sent: u64,
}

struct SenderInner {
    channel: String,
    node: NodeId,
    codec: Arc<dyn PayloadCodec>,
    bus: RwLock<Option<Arc<dyn BroadcastBus>>>,
    counters: Counters,
}

/// Cloneable publish handle for one connection.
///
/// Valid from the moment the connection is ready until it closes or the
/// stream ends; outside that window sends fail with
/// [`SendError::NotConnected`].
#[derive(Clone)]
pub struct FrameSender {
    inner: Arc<SenderInner>,
}

impl FrameSender {
    fn new(channel: String, node: NodeId, codec: Arc<dyn PayloadCodec>) -> Self {
        Self {
            inner: Arc::new(SenderInner {
                channel,
                node,
                codec,
                bus: RwLock::new(None),
                counters: Counters::default(),
            }),
        }
    }

    /// This process's node identity.
    #[must_use]
    pub fn node(&self) -> &NodeId {
        &self.inner.node
    }

    #[must_use]
    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.bus.read().is_some()
    }

    /// Encode and publish a request frame. Returns the bus receiver count.
    pub async fn send_request(&self, request: &Request) -> Result<usize, SendError> {
        let frame = codec::encode_request(self.inner.codec.as_ref(), request)?;
        let receivers = self.publish(frame).await?;
        self.inner
            .counters
            .requests_sent
            .fetch_add(1, Ordering::Relaxed);
        debug!(
            channel = %self.inner.channel,
            command = request.command,
            address = ?request.address,
            receivers = receivers,
            "Request published"
        );
        Ok(receivers)
    }

    /// Encode and publish a response frame. Returns the bus receiver count.
    pub async fn send_response(&self, response: &Response) -> Result<usize, SendError> {
        let frame = codec::encode_response(self.inner.codec.as_ref(), response)?;
        let receivers = self.publish(frame).await?;
        self.inner
            .counters
            .responses_sent
            .fetch_add(1, Ordering::Relaxed);
        debug!(
            channel = %self.inner.channel,
            address = %response.address,
            status = ?response.status,
            receivers = receivers,
            "Response published"
        );
        Ok(receivers)
    }

    async fn publish(&self, frame: Bytes) -> Result<usize, SendError> {
        let bus = self.inner.bus.read().clone();
        let bus = bus.ok_or(SendError::NotConnected)?;
        bus.publish(&self.inner.channel, frame).await.map_err(|e| {
            warn!(channel = %self.inner.channel, error = %e, "Publish failed");
            SendError::from(e)
        })
    }

    fn bind(&self, bus: Arc<dyn BroadcastBus>) {
        *self.inner.bus.write() = Some(bus);
    }

    fn unbind(&self) {
        self.inner.bus.write().take();
    }
}

impl std::fmt::Debug for FrameSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSender")
            .field("channel", &self.inner.channel)
            .field("node", &self.inner.node)
            .field("codec", &self.inner.codec.name())
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Resets the running flag when the read loop exits by any path.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One channel's bindings, read loop and hook slots.
pub struct Connection {
    sender: FrameSender,
    runtime: Handle,
    state: watch::Sender<LinkState>,
    running: AtomicBool,
    request_handler: RwLock<Option<Arc<dyn RequestHandler>>>,
    response_handler: RwLock<Option<Arc<dyn ResponseHandler>>>,
}

impl Connection {
    /// Create a connection. Request dispatch is spawned on `runtime`.
    pub fn new(config: &RpcConfig, runtime: Handle) -> Result<Self, ConfigError> {
        let codec = config.resolve_codec()?;
        let node = config.node.clone().unwrap_or_else(NodeId::generate);
        let (state, _) = watch::channel(LinkState::Idle);

        Ok(Self {
            sender: FrameSender::new(config.channel(), node, codec),
            runtime,
            state,
            running: AtomicBool::new(false),
            request_handler: RwLock::new(None),
            response_handler: RwLock::new(None),
        })
    }

    /// The bus channel name, including the `rpc:` prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        self.sender.channel()
    }

    #[must_use]
    pub fn node(&self) -> &NodeId {
        self.sender.node()
    }

    /// A publish handle for this connection.
    #[must_use]
    pub fn sender(&self) -> FrameSender {
        self.sender.clone()
    }

    #[must_use]
    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Install the request hook, replacing any previous one.
    pub fn set_request_handler(&self, handler: Arc<dyn RequestHandler>) {
        if self.request_handler.write().replace(handler).is_some() {
            warn!(channel = %self.name(), "Request handler replaced");
        }
    }

    /// Install the response hook, replacing any previous one.
    pub fn set_response_handler(&self, handler: Arc<dyn ResponseHandler>) {
        if self.response_handler.write().replace(handler).is_some() {
            warn!(channel = %self.name(), "Response handler replaced");
        }
    }

    #[must_use]
    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == LinkState::Ready
    }

    /// Wait until the bindings are established.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError::Closed` if the connection is closed first.
    pub async fn wait_until_ready(&self) -> Result<(), ConnectionError> {
        let mut state = self.state.subscribe();
        let ready = {
            let current = state
                .wait_for(|s| *s != LinkState::Idle)
                .await
                .map_err(|_| ConnectionError::Closed)?;
            *current == LinkState::Ready
        };
        if ready {
            Ok(())
        } else {
            Err(ConnectionError::Closed)
        }
    }

    /// Establish the bindings and run the read loop.
    ///
    /// Returns `Ok(())` when the connection is closed or the transport ends
    /// the stream. In the latter case the connection goes back to idle and
    /// may be started again.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::Transport` - The subscription could not be made
    /// - `ConnectionError::Closed` - `close` was already called
    /// - `ConnectionError::AlreadyStarted` - The loop is already running
    pub async fn start(&self, bus: Arc<dyn BroadcastBus>) -> Result<(), ConnectionError> {
        if self.state() == LinkState::Closed {
            return Err(ConnectionError::Closed);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ConnectionError::AlreadyStarted);
        }
        let _running = RunningGuard(&self.running);

        let mut state = self.state.subscribe();
        let mut subscription = match bus.subscribe(self.name()).await {
            Ok(subscription) => subscription,
            Err(e) => {
                error!(channel = %self.name(), error = %e, "Failed to subscribe");
                return Err(e.into());
            }
        };

        self.sender.bind(bus);
        let became_ready = self.state.send_if_modified(|s| {
            if *s == LinkState::Idle {
                *s = LinkState::Ready;
                true
            } else {
                false
            }
        });
        if !became_ready {
            // Closed while subscribing
            self.sender.unbind();
            return Ok(());
        }

        info!(channel = %self.name(), node = %self.node(), "Connection ready");

        loop {
            tokio::select! {
                changed = state.changed() => {
                    let closed =
                        changed.is_err() || *state.borrow_and_update() == LinkState::Closed;
                    if closed {
                        debug!(channel = %self.name(), "Read loop stopping (closed)");
                        break;
                    }
                }
                frame = subscription.recv() => match frame {
                    Some(frame) => self.handle_frame(&frame),
                    None => {
                        info!(channel = %self.name(), "Subscription stream ended");
                        self.sender.unbind();
                        self.state.send_if_modified(|s| {
                            if *s == LinkState::Ready {
                                *s = LinkState::Idle;
                                true
                            } else {
                                false
                            }
                        });
                        break;
                    }
                },
            }
        }

        Ok(())
    }

    /// Run `start` as a task on this connection's runtime.
    pub fn spawn(
        self: &Arc<Self>,
        bus: Arc<dyn BroadcastBus>,
    ) -> JoinHandle<Result<(), ConnectionError>> {
        let connection = Arc::clone(self);
        self.runtime.spawn(async move { connection.start(bus).await })
    }

    /// Release the bindings and stop the read loop. Idempotent.
    pub fn close(&self) {
        let previous = self.state.send_replace(LinkState::Closed);
        if previous != LinkState::Closed {
            self.sender.unbind();
            info!(channel = %self.name(), "Connection closed");
        }
    }

    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        let counters = &self.sender.inner.counters;
        ConnectionStats {
            frames_received: counters.frames_received.load(Ordering::Relaxed),
            frames_skipped: counters.frames_skipped.load(Ordering::Relaxed),
            requests_sent: counters.requests_sent.load(Ordering::Relaxed),
            responses_sent: counters.responses_sent.load(Ordering::Relaxed),
        }
    }

    fn skip(&self) {
        self.sender
            .inner
            .counters
            .frames_skipped
            .fetch_add(1, Ordering::Relaxed);
    }

    fn handle_frame(&self, frame: &[u8]) {
        self.sender
            .inner
            .counters
            .frames_received
            .fetch_add(1, Ordering::Relaxed);

        let raw = match codec::decode(self.sender.inner.codec.as_ref(), frame) {
            Ok(raw) => raw,
            Err(FrameError::UnknownKind(kind)) => {
                self.skip();
                warn!(
                    channel = %self.name(),
                    kind = kind,
                    "Unknown payload type, frame skipped"
                );
                return;
            }
            Err(e) => {
                self.skip();
                debug!(channel = %self.name(), error = %e, "Skipping undecodable frame");
                return;
            }
        };

        match raw.kind {
            MessageKind::Request => {
                let Some(handler) = self.request_handler.read().clone() else {
                    return;
                };
                match handler.make_request(raw.payload) {
                    Ok(request) => {
                        self.runtime
                            .spawn(async move { handler.handle_request(request).await });
                    }
                    Err(malformed) => {
                        self.skip();
                        self.runtime
                            .spawn(async move { handler.handle_malformed(malformed).await });
                    }
                }
            }
            MessageKind::Response => {
                let Some(handler) = self.response_handler.read().clone() else {
                    return;
                };
                match handler.make_response(raw.payload) {
                    Ok(response) => handler.handle_response(response),
                    Err(malformed) => {
                        self.skip();
                        debug!(reason = %malformed.reason, "Skipping malformed response");
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("sender", &self.sender)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
