//! # Command Handlers
//!
//! A handler takes a [`RequestContext`] and its typed argument struct, and
//! returns anything convertible into an [`Outcome`]:
//!
//! ```ignore
//! #[derive(Deserialize)]
//! struct Echo { message: String }
//!
//! dispatcher.register(0, |_ctx: RequestContext, args: Echo| async move {
//!     Outcome::reply(args.message)
//! })?;
//! ```
//!
//! The argument bundle is decoded with serde before the handler runs; a
//! bundle that does not decode is answered with `BadParams`.

use crate::connection::FrameSender;
use crate::error::ReplyError;
use futures::future::BoxFuture;
use futures::FutureExt;
use rpc_types::{Address, Arguments, CommandIndex, NodeId, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// What the dispatcher sends once a handler finishes.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Reply `Success` with this value.
    Reply(Value),
    /// Send nothing.
    NoReply,
    /// Reply `InternalError` with this description.
    Error(String),
}

impl Outcome {
    /// Reply with any serializable value.
    pub fn reply(value: impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => Outcome::Reply(value),
            Err(e) => Outcome::Error(format!("Could not serialize result: {e}")),
        }
    }

    pub fn error(description: impl fmt::Display) -> Self {
        Outcome::Error(description.to_string())
    }
}

impl<T: Serialize, E: fmt::Display> From<Result<T, E>> for Outcome {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Outcome::reply(value),
            Err(e) => Outcome::error(e),
        }
    }
}

/// Argument type for commands that take no arguments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoArgs {}

/// An async command handler taking decoded arguments of type `A`.
pub trait Handler<A>: Send + Sync + 'static {
    fn call(&self, ctx: RequestContext, args: A) -> BoxFuture<'static, Outcome>;
}

impl<F, Fut, A, R> Handler<A> for F
where
    F: Fn(RequestContext, A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: Into<Outcome>,
{
    fn call(&self, ctx: RequestContext, args: A) -> BoxFuture<'static, Outcome> {
        let future = self(ctx, args);
        async move { future.await.into() }.boxed()
    }
}

/// A handler with its argument type erased.
pub(crate) trait ErasedHandler: Send + Sync {
    /// Decode the bundle and start the handler. `Err` describes a bundle
    /// that does not fit the handler's arguments.
    fn call(
        &self,
        ctx: RequestContext,
        arguments: Arguments,
    ) -> Result<BoxFuture<'static, Outcome>, String>;
}

pub(crate) struct TypedHandler<H, A> {
    handler: H,
    _args: PhantomData<fn() -> A>,
}

impl<H, A> TypedHandler<H, A> {
    pub(crate) fn new(handler: H) -> Self {
        Self {
            handler,
            _args: PhantomData,
        }
    }
}

impl<H, A> ErasedHandler for TypedHandler<H, A>
where
    H: Handler<A>,
    A: DeserializeOwned + Send + 'static,
{
    fn call(
        &self,
        ctx: RequestContext,
        arguments: Arguments,
    ) -> Result<BoxFuture<'static, Outcome>, String> {
        let args: A = serde_json::from_value(Value::Object(arguments)).map_err(|e| e.to_string())?;
        Ok(self.handler.call(ctx, args))
    }
}

struct ContextInner {
    command: CommandIndex,
    sender_node: Option<NodeId>,
    address: Option<Address>,
    sender: FrameSender,
    replied: AtomicBool,
}

/// Per-request handle given to a handler.
///
/// Cloning is cheap; every clone shares the same once-only reply slot.
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<ContextInner>,
}

impl RequestContext {
    pub(crate) fn new(sender: FrameSender, request: &Request) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                command: request.command,
                sender_node: request.node.clone(),
                address: request.address.clone(),
                sender,
                replied: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn command(&self) -> CommandIndex {
        self.inner.command
    }

    /// Node identity of the caller, if it sent one.
    #[must_use]
    pub fn sender(&self) -> Option<&NodeId> {
        self.inner.sender_node.as_ref()
    }

    /// Correlation address. `None` for fire-and-forget requests.
    #[must_use]
    pub fn address(&self) -> Option<&Address> {
        self.inner.address.as_ref()
    }

    /// This process's node identity.
    #[must_use]
    pub fn node(&self) -> &NodeId {
        self.inner.sender.node()
    }

    #[must_use]
    pub fn has_replied(&self) -> bool {
        self.inner.replied.load(Ordering::SeqCst)
    }

    /// Send the one reply this request allows.
    ///
    /// Once used, the dispatcher does not send its own terminal reply.
    ///
    /// # Errors
    ///
    /// - `ReplyError::AlreadyReplied` - A reply was already sent
    /// - `ReplyError::Send` - The response could not be published
    pub async fn reply(&self, status: StatusCode, data: Option<Value>) -> Result<(), ReplyError> {
        if self.inner.replied.swap(true, Ordering::SeqCst) {
            return Err(ReplyError::AlreadyReplied);
        }
        self.publish(status, data).await
    }

    /// Send an extra `Success` reply without using up the reply slot.
    ///
    /// Streaming handlers emit each item, then return [`Outcome::NoReply`].
    pub async fn emit(&self, value: impl Serialize) -> Result<(), ReplyError> {
        let value = serde_json::to_value(value)?;
        self.publish(StatusCode::Success, Some(value)).await
    }

    /// The dispatcher's terminal reply. Skipped if the handler replied itself.
    pub(crate) async fn finish(&self, status: StatusCode, data: Option<Value>) {
        match self.reply(status, data).await {
            Ok(()) => {}
            Err(ReplyError::AlreadyReplied) => {
                warn!(
                    command = self.inner.command,
                    status = ?status,
                    "Handler already replied, terminal reply suppressed"
                );
            }
            Err(e) => {
                warn!(command = self.inner.command, error = %e, "Failed to send reply");
            }
        }
    }

    async fn publish(&self, status: StatusCode, data: Option<Value>) -> Result<(), ReplyError> {
        let Some(address) = self.inner.address.clone() else {
            debug!(command = self.inner.command, "Request has no address, reply skipped");
            return Ok(());
        };
        let response = Response::new(status, self.inner.sender.node().clone(), address, data);
        self.inner.sender.send_response(&response).await?;
        Ok(())
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("command", &self.inner.command)
            .field("sender", &self.inner.sender_node)
            .field("address", &self.inner.address)
            .field("replied", &self.has_replied())
            .finish()
    }
}
