//! # Correlation Table
//!
//! Maps a call address to the delivery queue of the call waiting on it.
//!
//! At most one queue exists per address. A response for an address with no
//! queue is for a call nobody is waiting on (already exhausted, or
//! fire-and-forget) and is dropped without complaint.

use crate::connection::ResponseHandler;
use crate::error::CorrelationError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rpc_types::{Address, Response};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Correlation table statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelationStats {
    pub registered: u64,
    pub delivered: u64,
    /// Responses for addresses nobody was waiting on.
    pub dropped: u64,
    pub removed: u64,
    pub pending: usize,
}

#[derive(Debug, Default)]
pub struct CorrelationTable {
    pending: DashMap<Address, mpsc::UnboundedSender<Response>>,
    registered: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    removed: AtomicU64,
}

impl CorrelationTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the delivery queue for `address`.
    ///
    /// The entry lives until the returned [`Registration`] is released or
    /// dropped.
    pub fn register(
        self: &Arc<Self>,
        address: Address,
    ) -> Result<(Registration, mpsc::UnboundedReceiver<Response>), CorrelationError> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.pending.entry(address.clone()) {
            Entry::Occupied(_) => return Err(CorrelationError::AddressInUse(address)),
            Entry::Vacant(slot) => {
                slot.insert(tx);
            }
        }
        self.registered.fetch_add(1, Ordering::Relaxed);
        trace!(address = %address, "Address registered");

        let registration = Registration {
            table: Arc::clone(self),
            address,
            released: false,
        };
        Ok((registration, rx))
    }

    /// Push a response into its call's queue.
    ///
    /// Returns false if no call is waiting on the response's address.
    pub fn deliver(&self, response: Response) -> bool {
        let sender = self
            .pending
            .get(&response.address)
            .map(|entry| entry.value().clone());

        let Some(sender) = sender else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(
                address = %response.address,
                node = %response.node,
                "No pending call for response"
            );
            return false;
        };

        let address = response.address.clone();
        if sender.send(response).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(address = %address, "Pending call stopped listening");
            return false;
        }
        self.delivered.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Remove the queue for `address`. Returns false if there was none.
    pub fn remove(&self, address: &Address) -> bool {
        let removed = self.pending.remove(address).is_some();
        if removed {
            self.removed.fetch_add(1, Ordering::Relaxed);
            trace!(address = %address, "Address removed");
        }
        removed
    }

    #[must_use]
    pub fn is_pending(&self, address: &Address) -> bool {
        self.pending.contains_key(address)
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn stats(&self) -> CorrelationStats {
        CorrelationStats {
            registered: self.registered.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            pending: self.pending.len(),
        }
    }
}

impl ResponseHandler for CorrelationTable {
    fn handle_response(&self, response: Response) {
        self.deliver(response);
    }
}

/// Ownership of one table entry.
///
/// The entry is removed exactly once, by [`Registration::release`] or on
/// drop, whichever comes first.
#[derive(Debug)]
pub struct Registration {
    table: Arc<CorrelationTable>,
    address: Address,
    released: bool,
}

impl Registration {
    #[must_use]
    pub fn address(&self) -> &Address {
        &self.address
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Remove the entry now. Later calls do nothing and return false.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        self.table.remove(&self.address)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.release();
    }
}
