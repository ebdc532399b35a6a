//! Command/response correlation.
//!
//! BGAPI responses carry no transaction id; a response is matched to the
//! oldest outstanding command with the same class and method. Commands
//! that address a connection handle are additionally matched on that
//! handle, so interleaved commands to different connections resolve to the
//! right callers even when the device answers out of order.

use std::collections::BTreeMap;

use bgapi_protocol::{BgapiResponse, PacketKey};
use log::{debug, trace};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::TransportError;

pub type TransactionResult = Result<BgapiResponse, TransportError>;

struct Pending {
    key: PacketKey,
    connection: Option<u8>,
    tx: oneshot::Sender<TransactionResult>,
}

impl Pending {
    fn accepts(&self, response: &BgapiResponse) -> bool {
        if self.key != response.key() {
            return false;
        }
        match (self.connection, response.connection()) {
            (Some(expected), Some(actual)) => expected == actual,
            _ => true,
        }
    }
}

#[derive(Default)]
struct Table {
    next_seq: u64,
    pending: BTreeMap<u64, Pending>,
    closed: bool,
}

/// Table of outstanding transactions, ordered by submission.
#[derive(Default)]
pub struct TransactionManager {
    table: Mutex<Table>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transaction before its command is written.
    ///
    /// Returns the sequence number used to cancel it and the receiver the
    /// outcome is delivered on. Fails once the manager has been closed.
    pub fn register(
        &self,
        key: PacketKey,
        connection: Option<u8>,
    ) -> Result<(u64, oneshot::Receiver<TransactionResult>), TransportError> {
        let mut table = self.table.lock();
        if table.closed {
            return Err(TransportError::ConnectionClosed);
        }
        let seq = table.next_seq;
        table.next_seq += 1;
        let (tx, rx) = oneshot::channel();
        table.pending.insert(seq, Pending { key, connection, tx });
        trace!("Registered transaction {} for {}", seq, key);
        Ok((seq, rx))
    }

    /// Hand a response to the oldest matching transaction.
    ///
    /// Returns the response back if nothing was waiting for it.
    pub fn complete(&self, response: BgapiResponse) -> Result<(), BgapiResponse> {
        let mut response = response;
        loop {
            let pending = {
                let mut table = self.table.lock();
                let seq = table
                    .pending
                    .iter()
                    .find(|(_, p)| p.accepts(&response))
                    .map(|(seq, _)| *seq);
                match seq.and_then(|seq| table.pending.remove(&seq).map(|p| (seq, p))) {
                    Some(found) => found,
                    None => return Err(response),
                }
            };

            let (seq, pending) = pending;
            match pending.tx.send(Ok(response)) {
                Ok(()) => {
                    trace!("Completed transaction {}", seq);
                    return Ok(());
                }
                // Receiver already dropped; try the next candidate.
                Err(returned) => {
                    debug!("Transaction {} abandoned before its response arrived", seq);
                    response = match returned {
                        Ok(r) => r,
                        Err(_) => return Ok(()),
                    };
                }
            }
        }
    }

    /// Remove a transaction without completing it.
    pub fn cancel(&self, seq: u64) -> bool {
        self.table.lock().pending.remove(&seq).is_some()
    }

    /// Complete every outstanding transaction with `error` and refuse new ones.
    pub fn fail_all(&self, error: &TransportError) -> usize {
        let drained = {
            let mut table = self.table.lock();
            table.closed = true;
            std::mem::take(&mut table.pending)
        };
        let count = drained.len();
        for (_, pending) in drained {
            let _ = pending.tx.send(Err(error.clone()));
        }
        if count > 0 {
            debug!("Failed {} outstanding transactions: {}", count, error);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.table.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().pending.is_empty()
    }
}
