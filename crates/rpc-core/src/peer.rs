//! # Peer
//!
//! One connection that both calls and serves commands on the same channel.
//!
//! Every request a peer publishes comes back to it on the shared channel.
//! The dispatcher is built with a predicate that drops requests carrying
//! this peer's node identity or an address it is still waiting on, so the
//! peer never answers its own calls.

use crate::caller::{CallBuilder, Caller};
use crate::config::{ConfigError, RpcConfig};
use crate::connection::{Connection, ConnectionStats};
use crate::dispatcher::Dispatcher;
use crate::error::{ConnectionError, RegistryError};
use crate::handler::Handler;
use rpc_bus::BroadcastBus;
use rpc_types::{CommandIndex, NodeId};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct Peer {
    connection: Arc<Connection>,
    caller: Caller,
    dispatcher: Arc<Dispatcher>,
}

impl Peer {
    pub fn new(config: &RpcConfig, runtime: Handle) -> Result<Self, ConfigError> {
        let connection = Arc::new(Connection::new(config, runtime)?);
        let caller = Caller::attach(&connection, config);

        let node = connection.node().clone();
        let table = Arc::clone(caller.table());
        let dispatcher = Dispatcher::attach_with_filter(&connection, move |request| {
            request.node.as_ref() == Some(&node)
                || request
                    .address
                    .as_ref()
                    .is_some_and(|address| table.is_pending(address))
        });

        Ok(Self {
            connection,
            caller,
            dispatcher,
        })
    }

    #[must_use]
    pub fn node(&self) -> &NodeId {
        self.connection.node()
    }

    #[must_use]
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    #[must_use]
    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn call(&self, command: CommandIndex) -> CallBuilder<'_> {
        self.caller.call(command)
    }

    pub fn register<A, H>(&self, index: CommandIndex, handler: H) -> Result<(), RegistryError>
    where
        H: Handler<A>,
        A: DeserializeOwned + Send + 'static,
    {
        self.dispatcher.register(index, handler)
    }

    pub fn remove(&self, index: CommandIndex) -> Result<(), RegistryError> {
        self.dispatcher.remove(index)
    }

    pub async fn start(&self, bus: Arc<dyn BroadcastBus>) -> Result<(), ConnectionError> {
        self.connection.start(bus).await
    }

    pub fn spawn(&self, bus: Arc<dyn BroadcastBus>) -> JoinHandle<Result<(), ConnectionError>> {
        self.connection.spawn(bus)
    }

    pub async fn wait_until_ready(&self) -> Result<(), ConnectionError> {
        self.connection.wait_until_ready().await
    }

    pub fn close(&self) {
        self.connection.close();
    }

    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        self.connection.stats()
    }
}
