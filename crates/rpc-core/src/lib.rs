//! # RPC Core - Request/Response Correlation
//!
//! Many processes share one broadcast channel. Any of them may issue a
//! command and any number of others may answer; this crate tags each call
//! with an address, routes every reply back to the call that produced it,
//! and turns inbound requests into status-coded replies.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────── Connection ─────────────────────────┐
//! │   subscription ──► decode ──┬── request ──► Dispatcher        │
//! │                             │               (RequestHandler)  │
//! │                             └── response ─► CorrelationTable  │
//! │                                             (ResponseHandler) │
//! │   FrameSender ◄── Caller / RequestContext                     │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`Caller`] registers an address, publishes the request and hands back
//!   [`Responses`], bounded by a deadline and an optional expected count.
//! - [`Dispatcher`] maps command indices to typed handlers and maps every
//!   failure to a [`StatusCode`](rpc_types::StatusCode).
//! - [`Peer`] composes both on one connection and ignores its own requests.
//!
//! ## Example
//!
//! ```ignore
//! let config = RpcConfig::new("example").with_default_timeout(Duration::from_secs(1));
//! let peer = Peer::new(&config, Handle::current())?;
//! peer.register(0, |_ctx: RequestContext, args: Echo| async move {
//!     Outcome::reply(args.message)
//! })?;
//! peer.spawn(bus);
//! peer.wait_until_ready().await?;
//!
//! let replies = peer.call(0).arg("message", "hi").expect_responses(1).send().await?.await;
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod caller;
pub mod codec;
pub mod config;
pub mod connection;
pub mod correlation;
pub mod dispatcher;
pub mod error;
pub mod handler;
#[cfg(test)]
mod log_capture;
pub mod peer;
pub mod responses;

pub use caller::{CallBuilder, Caller};
pub use codec::{
    CborCodec, CodecError, DeserializeFn, FnCodec, JsonCodec, PayloadCodec, SerializeFn,
};
pub use config::{ConfigError, RpcConfig, CHANNEL_PREFIX};
pub use connection::{
    Connection, ConnectionStats, FrameSender, LinkState, MalformedPayload, RequestHandler,
    ResponseHandler,
};
pub use correlation::{CorrelationStats, CorrelationTable, Registration};
pub use dispatcher::Dispatcher;
pub use error::{CallError, ConnectionError, CorrelationError, RegistryError, ReplyError, SendError};
pub use handler::{Handler, NoArgs, Outcome, RequestContext};
pub use peer::Peer;
pub use responses::Responses;
