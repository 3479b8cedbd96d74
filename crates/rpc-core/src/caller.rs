//! # Caller
//!
//! Issues calls on a connection and routes their responses back through the
//! correlation table.

use crate::config::RpcConfig;
use crate::connection::{Connection, FrameSender};
use crate::correlation::CorrelationTable;
use crate::error::CallError;
use crate::responses::Responses;
use rpc_types::{Address, Arguments, CommandIndex, Request};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Deadline used when a timeout is too large to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Client role on a connection.
#[derive(Clone, Debug)]
pub struct Caller {
    table: Arc<CorrelationTable>,
    sender: FrameSender,
    default_timeout: Option<Duration>,
    default_expected: Option<usize>,
}

impl Caller {
    /// Attach a caller to `connection`, installing its response hook.
    pub fn attach(connection: &Connection, config: &RpcConfig) -> Self {
        let table = Arc::new(CorrelationTable::new());
        connection.set_response_handler(table.clone());
        Self {
            table,
            sender: connection.sender(),
            default_timeout: config.default_timeout,
            default_expected: config.default_expected_responses,
        }
    }

    /// Start building a call to `command`.
    pub fn call(&self, command: CommandIndex) -> CallBuilder<'_> {
        CallBuilder {
            caller: self,
            command,
            arguments: Arguments::new(),
            timeout: None,
            expected: None,
            error: None,
        }
    }

    /// Returns true if `address` belongs to one of our outstanding calls.
    #[must_use]
    pub fn is_pending(&self, address: &Address) -> bool {
        self.table.is_pending(address)
    }

    #[must_use]
    pub fn table(&self) -> &Arc<CorrelationTable> {
        &self.table
    }
}

/// Builder for one call.
///
/// Argument conversion errors are held until [`CallBuilder::send`].
#[must_use = "a call does nothing until `send` is awaited"]
pub struct CallBuilder<'a> {
    caller: &'a Caller,
    command: CommandIndex,
    arguments: Arguments,
    timeout: Option<Duration>,
    expected: Option<usize>,
    error: Option<CallError>,
}

impl CallBuilder<'_> {
    /// Add one named argument.
    pub fn arg(mut self, name: impl Into<String>, value: impl Serialize) -> Self {
        let name = name.into();
        match serde_json::to_value(value) {
            Ok(value) => {
                self.arguments.insert(name, value);
            }
            Err(e) => self.fail(name, e),
        }
        self
    }

    /// Add every entry of an argument bundle.
    pub fn args(mut self, arguments: Arguments) -> Self {
        self.arguments.extend(arguments);
        self
    }

    /// Add the fields of a struct (or map) as arguments.
    pub fn with_args(mut self, arguments: impl Serialize) -> Self {
        match serde_json::to_value(arguments) {
            Ok(Value::Object(map)) => self.arguments.extend(map),
            Ok(other) => self.fail("<bundle>".into(), format!("expected a map, got {other}")),
            Err(e) => self.fail("<bundle>".into(), e),
        }
        self
    }

    /// Wait for responses up to `timeout`. Without one (and without a
    /// configured default) the call is fire-and-forget.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Stop collecting after `count` responses. Zero means unbounded.
    pub fn expect_responses(mut self, count: usize) -> Self {
        self.expected = Some(count);
        self
    }

    /// Publish the request.
    ///
    /// # Errors
    ///
    /// - `CallError::InvalidArgument` - An argument could not be converted
    /// - `CallError::Send` - The request could not be published
    pub async fn send(self) -> Result<Responses, CallError> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let caller = self.caller;
        let mut request = Request::new(self.command);
        request.node = Some(caller.sender.node().clone());
        request.arguments = self.arguments;

        let Some(timeout) = self.timeout.or(caller.default_timeout) else {
            caller.sender.send_request(&request).await?;
            debug!(command = request.command, "Fire-and-forget call sent");
            return Ok(Responses::empty());
        };
        let expected = self.expected.or(caller.default_expected);

        let now = Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or(now + FAR_FUTURE);
        let address = Address::generate();
        let (registration, receiver) = caller.table.register(address.clone())?;
        request.address = Some(address);

        // The registration is dropped (and the entry removed) on failure
        caller.sender.send_request(&request).await?;

        Ok(Responses::pending(receiver, registration, deadline, expected))
    }

    fn fail(&mut self, name: String, reason: impl ToString) {
        if self.error.is_none() {
            self.error = Some(CallError::InvalidArgument {
                name,
                reason: reason.to_string(),
            });
        }
    }
}
