//! Request transmitter and batch dispatchers
//!
//! Each open transaction gets a `Dispatcher` bound to its channel's write side.
//! Requests are buffered and written in batches: the first request after an
//! idle period arms a short timer, and while traffic keeps flowing the buffer
//! is drained on a longer interval. `dispatch_now` skips the wait for requests
//! whose latency matters more than batching.
//!
//! Frames are written while the buffer lock is held, so requests reach the
//! wire in exactly the order they were dispatched, whichever path they took.

use crate::config::TransmitterConfig;
use crate::metrics::{BATCH_SIZE, FRAMES_WRITTEN_TOTAL, REQUESTS_DISPATCHED_TOTAL};
use crate::{Error, Result};
use crossbeam::atomic::AtomicCell;
use parking_lot::Mutex;
use prost::Message;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use txstream_proto::transaction;

/// Owns every live dispatcher and shuts them all down on `close`.
pub struct RequestTransmitter {
    inner: Arc<TransmitterInner>,
}

struct TransmitterInner {
    config: TransmitterConfig,
    runtime: Handle,
    is_open: AtomicCell<bool>,
    next_dispatcher_id: AtomicU64,
    dispatchers: Mutex<HashMap<u64, Arc<DispatcherShared>>>,
}

impl RequestTransmitter {
    /// Create a transmitter driving its flush timers on the current Tokio
    /// runtime.
    pub fn new(config: TransmitterConfig) -> Result<Self> {
        config.validate().map_err(Error::InvalidConfig)?;
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;

        Ok(Self {
            inner: Arc::new(TransmitterInner {
                config,
                runtime,
                is_open: AtomicCell::new(true),
                next_dispatcher_id: AtomicU64::new(0),
                dispatchers: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn config(&self) -> &TransmitterConfig {
        &self.inner.config
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_open.load()
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    /// Create a dispatcher writing to `outbound`
    pub fn dispatcher(&self, outbound: UnboundedSender<transaction::Client>) -> Result<Dispatcher> {
        let mut dispatchers = self.inner.dispatchers.lock();
        if !self.inner.is_open.load() {
            return Err(Error::ClientClosed);
        }

        let id = self.inner.next_dispatcher_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(DispatcherShared {
            id,
            transmitter: Arc::downgrade(&self.inner),
            config: self.inner.config.clone(),
            runtime: self.inner.runtime.clone(),
            write_failed: Notify::new(),
            buffer: Mutex::new(Buffer {
                requests: Vec::new(),
                scheduled: false,
                outbound: Some(outbound),
                closed: None,
            }),
        });
        dispatchers.insert(id, Arc::clone(&shared));
        debug!(dispatcher = id, active = dispatchers.len(), "Created dispatcher");

        Ok(Dispatcher { shared })
    }

    /// Number of dispatchers that have not been closed yet
    pub fn active_dispatchers(&self) -> usize {
        self.inner.dispatchers.lock().len()
    }

    /// Close every dispatcher. Later calls to `dispatcher`, `dispatch` or
    /// `dispatch_now` fail with `ClientClosed`.
    pub fn close(&self) {
        let dispatchers = {
            let mut dispatchers = self.inner.dispatchers.lock();
            if !self.inner.is_open.swap(false) {
                return;
            }
            std::mem::take(&mut *dispatchers)
        };

        info!(dispatchers = dispatchers.len(), "Closing request transmitter");
        for (_, dispatcher) in dispatchers {
            dispatcher.close(Error::ClientClosed);
        }
    }
}

/// Batching front of one duplex channel's write side. Cheap to clone; all
/// clones share one buffer.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<DispatcherShared>,
}

struct DispatcherShared {
    id: u64,
    transmitter: Weak<TransmitterInner>,
    config: TransmitterConfig,
    runtime: Handle,
    write_failed: Notify,
    buffer: Mutex<Buffer>,
}

struct Buffer {
    requests: Vec<transaction::Req>,
    /// A flush task is armed
    scheduled: bool,
    /// `None` once the write side has been ended
    outbound: Option<UnboundedSender<transaction::Client>>,
    closed: Option<Error>,
}

impl Dispatcher {
    /// Buffer a request; it is written by the next timed flush.
    pub fn dispatch(&self, request: transaction::Req) -> Result<()> {
        let mut buffer = self.shared.buffer.lock();
        if let Some(error) = &buffer.closed {
            return Err(error.clone());
        }

        buffer.requests.push(request);
        REQUESTS_DISPATCHED_TOTAL.with_label_values(&["batched"]).inc();

        if !buffer.scheduled {
            buffer.scheduled = true;
            self.shared.schedule(self.shared.config.batch_window_small);
        }
        Ok(())
    }

    /// Buffer a request and write the whole buffer before returning.
    pub fn dispatch_now(&self, request: transaction::Req) -> Result<()> {
        let mut buffer = self.shared.buffer.lock();
        if let Some(error) = &buffer.closed {
            return Err(error.clone());
        }

        buffer.requests.push(request);
        REQUESTS_DISPATCHED_TOTAL.with_label_values(&["immediate"]).inc();
        if let Err(e) = self.shared.flush(&mut buffer) {
            drop(buffer);
            self.shared.deregister();
            return Err(e);
        }

        if !buffer.scheduled {
            buffer.scheduled = true;
            self.shared.schedule(self.shared.config.batch_window_large);
        }
        Ok(())
    }

    /// Write what is still buffered, end the channel's write side and
    /// deregister from the transmitter. Idempotent.
    pub fn close(&self) {
        self.shared.close(Error::TransactionClosed);
    }

    /// Resolves once a frame could not be written because the channel's
    /// write side was dropped. Meant for a single waiter.
    pub async fn write_failed(&self) {
        self.shared.write_failed.notified().await
    }

    pub fn is_closed(&self) -> bool {
        self.shared.buffer.lock().closed.is_some()
    }

    /// Requests buffered but not yet written
    pub fn buffered(&self) -> usize {
        self.shared.buffer.lock().requests.len()
    }
}

impl DispatcherShared {
    fn schedule(self: &Arc<Self>, first_delay: Duration) {
        let shared = Arc::clone(self);
        self.runtime.spawn(async move {
            let mut delay = first_delay;
            loop {
                tokio::time::sleep(delay).await;
                if !shared.flush_scheduled() {
                    break;
                }
                delay = shared.config.batch_window_large;
            }
        });
    }

    /// Timer expiry. Returns false when the dispatcher went idle.
    fn flush_scheduled(&self) -> bool {
        let mut buffer = self.buffer.lock();
        if buffer.requests.is_empty() || buffer.closed.is_some() {
            buffer.scheduled = false;
            return false;
        }
        if self.flush(&mut buffer).is_err() {
            buffer.scheduled = false;
            drop(buffer);
            self.deregister();
            return false;
        }
        true
    }

    /// Write the buffer out. A send failure means the write side is gone: the
    /// dispatcher is marked closed and `write_failed` waiters are woken.
    fn flush(&self, buffer: &mut Buffer) -> Result<()> {
        if buffer.requests.is_empty() {
            return Ok(());
        }
        let requests = std::mem::take(&mut buffer.requests);
        let outbound = match &buffer.outbound {
            Some(outbound) => outbound,
            None => return Ok(()),
        };

        let count = requests.len();
        let frames = split_frames(requests, self.config.max_frame_bytes);
        let frame_count = frames.len();
        for frame in frames {
            BATCH_SIZE.observe(frame.reqs.len() as f64);
            if outbound.send(frame).is_err() {
                warn!(dispatcher = self.id, "Channel write side is gone, closing dispatcher");
                buffer.closed = Some(Error::TransactionClosed);
                buffer.outbound = None;
                self.write_failed.notify_one();
                return Err(Error::TransactionClosed);
            }
            FRAMES_WRITTEN_TOTAL.inc();
        }
        debug!(dispatcher = self.id, reqs = count, frames = frame_count, "Flushed requests");
        Ok(())
    }

    fn close(&self, reason: Error) {
        {
            let mut buffer = self.buffer.lock();
            if buffer.closed.is_some() {
                return;
            }
            // Closing anyway, so a failed final write changes nothing.
            self.flush(&mut buffer).ok();
            buffer.closed = Some(reason);
            buffer.outbound = None;
        }

        self.deregister();
        debug!(dispatcher = self.id, "Closed dispatcher");
    }

    fn deregister(&self) {
        if let Some(transmitter) = self.transmitter.upgrade() {
            transmitter.dispatchers.lock().remove(&self.id);
        }
    }
}

/// Pack requests into frames no larger than `max_bytes`, preserving order. A
/// single request larger than the limit still gets a frame of its own.
fn split_frames(requests: Vec<transaction::Req>, max_bytes: usize) -> Vec<transaction::Client> {
    let mut frames = Vec::new();
    let mut current = Vec::new();
    let mut current_len = 0;

    for request in requests {
        let len = request.encoded_len();
        if !current.is_empty() && current_len + len > max_bytes {
            frames.push(transaction::Client {
                reqs: std::mem::take(&mut current),
            });
            current_len = 0;
        }
        current_len += len;
        current.push(request);
    }
    if !current.is_empty() {
        frames.push(transaction::Client { reqs: current });
    }
    frames
}
