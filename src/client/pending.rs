// Outstanding command table
//
// Each command id maps to the one-shot sender its caller is suspended on.
// An entry leaves the table exactly once: on its response, on timeout, when
// the caller abandons the reply, or when the channel closes.

use crate::error::{InspectError, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Default)]
struct Table {
    waiters: HashMap<u64, oneshot::Sender<Result<Value>>>,
    closed: bool,
}

#[derive(Default)]
pub(crate) struct PendingTable {
    table: Mutex<Table>,
}

impl PendingTable {
    /// Register a waiter; fails once the channel has closed
    pub fn register(&self, id: u64) -> Result<oneshot::Receiver<Result<Value>>> {
        let mut table = self.table.lock();
        if table.closed {
            return Err(InspectError::ConnectionLost);
        }
        let (tx, rx) = oneshot::channel();
        table.waiters.insert(id, tx);
        Ok(rx)
    }

    /// Deliver an outcome; false when nothing was waiting on `id`
    pub fn complete(&self, id: u64, outcome: Result<Value>) -> bool {
        let waiter = self.table.lock().waiters.remove(&id);
        match waiter {
            // A dropped receiver means the caller gave up; still counts as matched
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, id: u64) {
        self.table.lock().waiters.remove(&id);
    }

    /// Close the table and fail every waiter with `ConnectionLost`
    pub fn fail_all(&self) -> usize {
        let waiters: Vec<_> = {
            let mut table = self.table.lock();
            table.closed = true;
            table.waiters.drain().collect()
        };
        let count = waiters.len();
        for (_, tx) in waiters {
            let _ = tx.send(Err(InspectError::ConnectionLost));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.table.lock().waiters.len()
    }

    pub fn is_closed(&self) -> bool {
        self.table.lock().closed
    }
}

/// Reply half of an issued command
///
/// Dropping it without waiting abandons the command; a response that
/// arrives afterwards is discarded.
pub struct PendingReply {
    id: u64,
    method: String,
    timeout: Duration,
    rx: oneshot::Receiver<Result<Value>>,
    pending: Arc<PendingTable>,
}

impl PendingReply {
    pub(crate) fn new(
        id: u64,
        method: &str,
        timeout: Duration,
        rx: oneshot::Receiver<Result<Value>>,
        pending: Arc<PendingTable>,
    ) -> Self {
        Self {
            id,
            method: method.to_string(),
            timeout,
            rx,
            pending,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Wait for the response within the command budget
    pub async fn wait(mut self) -> Result<Value> {
        match tokio::time::timeout(self.timeout, &mut self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(InspectError::ConnectionLost),
            Err(_) => {
                self.pending.remove(self.id);
                tracing::debug!(id = self.id, method = %self.method, "command timed out");
                Err(InspectError::Timeout {
                    id: self.id,
                    method: self.method.clone(),
                    timeout_ms: self.timeout.as_millis(),
                })
            }
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.pending.remove(self.id);
    }
}
