//! Response collector
//!
//! Pending request table mapping request ids to the queue their caller is
//! waiting on. Registration happens on the caller's task, routing on the
//! stream's listener task; both go through one mutex.

use crate::metrics::PROTOCOL_ERRORS_TOTAL;
use crate::queue::ResponseQueue;
use crate::types::RequestId;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

struct Table<T> {
    queues: HashMap<RequestId, Arc<ResponseQueue<T>>>,
    /// Set once the collector is torn down. Queues registered afterwards are
    /// created already closed with this error.
    closed: Option<Option<Error>>,
}

pub struct ResponseCollector<T> {
    table: Mutex<Table<T>>,
}

impl<T> ResponseCollector<T> {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                queues: HashMap::new(),
                closed: None,
            }),
        }
    }

    /// Register a new queue for `request_id`.
    ///
    /// Fails if the id is still live. After `close`, the queue is returned
    /// already terminated so the caller can never block on it.
    pub fn queue(&self, request_id: RequestId) -> Result<Arc<ResponseQueue<T>>> {
        let mut table = self.table.lock();
        let queue = Arc::new(ResponseQueue::new());

        if let Some(error) = &table.closed {
            queue.close(error.clone());
            return Ok(queue);
        }

        if table.queues.contains_key(&request_id) {
            return Err(Error::DuplicateRequestId(request_id));
        }

        table.queues.insert(request_id, Arc::clone(&queue));
        debug!(%request_id, pending = table.queues.len(), "Registered response queue");
        Ok(queue)
    }

    /// Look up a queue without removing it
    pub fn get(&self, request_id: &RequestId) -> Option<Arc<ResponseQueue<T>>> {
        self.table.lock().queues.get(request_id).cloned()
    }

    /// Route an inbound response to its queue, keeping the entry for more.
    pub fn collect(&self, request_id: RequestId, value: T) -> Result<()> {
        match self.get(&request_id) {
            Some(queue) => {
                queue.put(value);
                Ok(())
            }
            None => Err(unknown(request_id)),
        }
    }

    /// Route the one and only response of a single-shot exchange and drop the
    /// entry.
    pub fn collect_final(&self, request_id: RequestId, value: T) -> Result<()> {
        match self.remove(&request_id) {
            Some(queue) => {
                queue.put(value);
                Ok(())
            }
            None => Err(unknown(request_id)),
        }
    }

    /// Forget a completed exchange
    pub fn remove(&self, request_id: &RequestId) -> Option<Arc<ResponseQueue<T>>> {
        self.table.lock().queues.remove(request_id)
    }

    /// Number of exchanges still awaiting responses
    pub fn pending(&self) -> usize {
        self.table.lock().queues.len()
    }

    /// Terminate every registered queue with `error` and clear the table.
    pub fn close(&self, error: Option<Error>) {
        let queues = {
            let mut table = self.table.lock();
            if table.closed.is_some() {
                return;
            }
            table.closed = Some(error.clone());
            std::mem::take(&mut table.queues)
        };

        if !queues.is_empty() {
            debug!(pending = queues.len(), "Closing outstanding response queues");
        }
        for (_, queue) in queues {
            queue.close(error.clone());
        }
    }
}

impl<T> Default for ResponseCollector<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown(request_id: RequestId) -> Error {
    warn!(%request_id, "Response for unknown request id");
    PROTOCOL_ERRORS_TOTAL
        .with_label_values(&["unknown_request_id"])
        .inc();
    Error::UnknownRequestId(request_id)
}
