//! # Command Dispatcher
//!
//! Server role on a connection: a registry of command index to handler,
//! and the state machine that turns each inbound request into at most one
//! automatic reply.
//!
//! ```text
//! request ─► ignored? ──yes──► (nothing)
//!               │no
//!               ▼
//!          handler found? ──no──► UnknownCommand
//!               │yes
//!               ▼
//!          args decode? ──no──► BadParams(description)
//!               │yes
//!               ▼
//!          run handler ──error/panic──► InternalError(description)
//!               │
//!               ├── NoReply ──► (nothing)
//!               └── Reply(v) ─► Success(v)
//! ```

use crate::connection::{Connection, FrameSender, MalformedPayload, RequestHandler};
use crate::error::RegistryError;
use crate::handler::{ErasedHandler, Handler, Outcome, RequestContext, TypedHandler};
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use rpc_types::{Address, CommandIndex, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Predicate selecting inbound requests the dispatcher must not answer.
pub type IgnoreFn = Box<dyn Fn(&Request) -> bool + Send + Sync>;

pub struct Dispatcher {
    handlers: RwLock<HashMap<CommandIndex, Arc<dyn ErasedHandler>>>,
    sender: FrameSender,
    ignore: Option<IgnoreFn>,
}

impl Dispatcher {
    /// Attach a dispatcher to `connection`, installing its request hook.
    pub fn attach(connection: &Connection) -> Arc<Self> {
        Self::install(connection, None)
    }

    /// Attach a dispatcher that skips requests matching `ignore`.
    pub fn attach_with_filter(
        connection: &Connection,
        ignore: impl Fn(&Request) -> bool + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::install(connection, Some(Box::new(ignore)))
    }

    fn install(connection: &Connection, ignore: Option<IgnoreFn>) -> Arc<Self> {
        let dispatcher = Arc::new(Self {
            handlers: RwLock::new(HashMap::new()),
            sender: connection.sender(),
            ignore,
        });
        connection.set_request_handler(dispatcher.clone());
        dispatcher
    }

    /// Bind `handler` to `index`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::AlreadyRegistered` if the index is taken.
    pub fn register<A, H>(&self, index: CommandIndex, handler: H) -> Result<(), RegistryError>
    where
        H: Handler<A>,
        A: DeserializeOwned + Send + 'static,
    {
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&index) {
            return Err(RegistryError::AlreadyRegistered(index));
        }
        handlers.insert(index, Arc::new(TypedHandler::new(handler)));
        info!(command = index, "Command registered");
        Ok(())
    }

    /// Unbind the handler at `index`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotRegistered` if nothing is bound there.
    pub fn remove(&self, index: CommandIndex) -> Result<(), RegistryError> {
        if self.handlers.write().remove(&index).is_none() {
            return Err(RegistryError::NotRegistered(index));
        }
        info!(command = index, "Command removed");
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, index: CommandIndex) -> bool {
        self.handlers.read().contains_key(&index)
    }

    /// Registered command indices, sorted.
    #[must_use]
    pub fn commands(&self) -> Vec<CommandIndex> {
        let mut commands: Vec<_> = self.handlers.read().keys().copied().collect();
        commands.sort_unstable();
        commands
    }

    async fn dispatch(&self, request: Request) {
        let ctx = RequestContext::new(self.sender.clone(), &request);
        let handler = self.handlers.read().get(&request.command).cloned();

        let Some(handler) = handler else {
            warn!(command = request.command, "Unknown command");
            ctx.finish(StatusCode::UnknownCommand, None).await;
            return;
        };

        let started = std::panic::catch_unwind(AssertUnwindSafe(|| {
            handler.call(ctx.clone(), request.arguments)
        }));
        let future = match started {
            Ok(Ok(future)) => future,
            Ok(Err(reason)) => {
                error!(command = request.command, reason = %reason, "Bad params");
                ctx.finish(StatusCode::BadParams, Some(Value::String(reason)))
                    .await;
                return;
            }
            Err(panic) => {
                self.internal_error(&ctx, panic_message(panic.as_ref())).await;
                return;
            }
        };

        let outcome = match AssertUnwindSafe(future).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Outcome::Error(panic_message(panic.as_ref())),
        };

        match outcome {
            Outcome::Reply(value) => ctx.finish(StatusCode::Success, Some(value)).await,
            Outcome::NoReply => {
                debug!(command = request.command, "Handler sent no reply");
            }
            Outcome::Error(description) => self.internal_error(&ctx, description).await,
        }
    }

    async fn internal_error(&self, ctx: &RequestContext, description: String) {
        error!(command = ctx.command(), error = %description, "Handler failed");
        ctx.finish(StatusCode::InternalError, Some(Value::String(description)))
            .await;
    }
}

#[async_trait]
impl RequestHandler for Dispatcher {
    async fn handle_request(&self, request: Request) {
        if self.ignore.as_ref().is_some_and(|ignore| ignore(&request)) {
            debug!(command = request.command, "Request ignored");
            return;
        }
        info!(
            command = request.command,
            sender = ?request.node,
            address = ?request.address,
            "Command received"
        );
        self.dispatch(request).await;
    }

    /// Answer `BadFormat` when the payload still names an address.
    async fn handle_malformed(&self, malformed: MalformedPayload) {
        let Some(address) = malformed.payload.get("a").and_then(Value::as_str) else {
            debug!(reason = %malformed.reason, "Skipping malformed request");
            return;
        };
        let address = Address::from(address);
        let request = Request {
            address: Some(address.clone()),
            ..Request::new(0)
        };
        if self.ignore.as_ref().is_some_and(|ignore| ignore(&request)) {
            return;
        }

        debug!(address = %address, reason = %malformed.reason, "Replying BadFormat");
        let response = Response::new(
            StatusCode::BadFormat,
            self.sender.node().clone(),
            address,
            Some(Value::String(malformed.reason)),
        );
        if let Err(e) = self.sender.send_response(&response).await {
            warn!(error = %e, "Failed to send BadFormat reply");
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("commands", &self.commands())
            .field("filtered", &self.ignore.is_some())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "Handler panicked".to_string()
    }
}
